//! Reference scenarios.
//!
//! Each scenario builds its own `Runtime`, drives a short sequence of agent
//! actions through it, prints what the gate decided, and returns a report
//! so the same run can be asserted on in tests.

pub mod exfiltration;
pub mod hot_reload;
pub mod rate_limit;
pub mod tamper;

use maais_audit::ChainVerification;
use maais_contracts::decision::{Decision, Verdict};

/// One labelled decision within a scenario.
#[derive(Debug, Clone)]
pub struct Step {
    pub label: String,
    pub decision: Decision,
}

/// What a scenario run produced.
#[derive(Debug, Clone)]
pub struct ScenarioReport {
    pub name: &'static str,
    pub steps: Vec<Step>,
    /// Result of verifying the scenario's audit chain at the end.
    pub chain: ChainVerification,
}

impl ScenarioReport {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            steps: Vec::new(),
            chain: ChainVerification::Intact { checked: 0 },
        }
    }

    /// Record and print one decision.
    fn record(&mut self, label: impl Into<String>, decision: Decision) {
        let label = label.into();
        print_decision(&label, &decision);
        self.steps.push(Step { label, decision });
    }

    /// The decision recorded under `label`.
    pub fn decision(&self, label: &str) -> Option<&Decision> {
        self.steps
            .iter()
            .find(|step| step.label == label)
            .map(|step| &step.decision)
    }

    pub fn verdicts(&self) -> Vec<Verdict> {
        self.steps.iter().map(|step| step.decision.verdict).collect()
    }

    /// Print the chain verification line.
    fn print_chain(&self) {
        match &self.chain {
            ChainVerification::Intact { checked } => {
                println!("  Audit chain: intact ({checked} records verified)");
            }
            ChainVerification::Broken(b) => {
                println!("  Audit chain: BROKEN at {b}");
            }
        }
    }
}

fn print_decision(label: &str, decision: &Decision) {
    println!("  {label}");
    println!(
        "    → {} (rule: {}, seq: {}, {} µs)",
        decision.verdict,
        decision.rule_id.as_deref().unwrap_or("-"),
        decision.sequence,
        decision.latency_us
    );
    println!("      {}", decision.reason);
}
