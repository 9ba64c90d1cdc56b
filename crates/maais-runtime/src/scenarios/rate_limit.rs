//! Scenario 2: Runaway Agent
//!
//! One agent loops on a tool call. Its bucket holds a burst of
//! `AGENT_BURST` and never refills within the run, so call
//! `AGENT_BURST + 1` is RATE_LIMITED without reaching the policy engine.
//! A second agent of the same tenant is unaffected, and every rejection is
//! audited.

use maais_admission::{BucketConfig, RateLimitConfig};
use maais_contracts::{
    action::{Action, ActionCategory, AgentId, TenantId},
    error::GateResult,
};

use crate::config::{AlertConfig, AlertMode, RuntimeConfig};
use crate::runtime::Runtime;
use crate::scenarios::ScenarioReport;

pub const AGENT_BURST: u32 = 50;
pub const TENANT: &str = "acme";
pub const RUNAWAY_AGENT: &str = "looping_agent";
pub const QUIET_AGENT: &str = "quiet_agent";

pub const LAST_ADMITTED: &str = "runaway: last call within burst";
pub const FIRST_REJECTED: &str = "runaway: first call over burst";
pub const QUIET_CALL: &str = "quiet: one call";

/// Run Scenario 2.
pub fn run_scenario() -> GateResult<ScenarioReport> {
    println!("=== Scenario 2: Runaway Agent ===");
    println!();

    let config = RuntimeConfig {
        rate_limits: RateLimitConfig {
            agent: BucketConfig::new(AGENT_BURST, 0.0),
            ..RateLimitConfig::default()
        },
        alerts: AlertConfig {
            mode: AlertMode::None,
            ..Default::default()
        },
        ..RuntimeConfig::default()
    };
    let runtime = Runtime::from_config(config)?;
    let mut report = ScenarioReport::new("rate-limit");

    let call = |agent: &str| Action::new(agent, TENANT, ActionCategory::ToolCall, "search_docs");

    for i in 1..AGENT_BURST {
        let decision = runtime.evaluate_action(&call(RUNAWAY_AGENT))?;
        if !decision.permits_execution() {
            report.record(format!("runaway: call {i} unexpectedly blocked"), decision);
        }
    }
    report.record(LAST_ADMITTED, runtime.evaluate_action(&call(RUNAWAY_AGENT))?);
    report.record(FIRST_REJECTED, runtime.evaluate_action(&call(RUNAWAY_AGENT))?);
    report.record(QUIET_CALL, runtime.evaluate_action(&call(QUIET_AGENT))?);

    let remaining = runtime
        .admission()
        .agent_state(&TenantId::from(TENANT), &AgentId::from(RUNAWAY_AGENT))?
        .map_or(0.0, |state| state.tokens);
    let stats = runtime.stats();
    println!();
    println!(
        "  Evaluated: {}, rate limited: {}, runaway tokens left: {remaining:.0}",
        stats.evaluated, stats.rate_limited
    );

    report.chain = runtime.audit().verify_all()?;
    report.print_chain();
    println!();

    Ok(report)
}
