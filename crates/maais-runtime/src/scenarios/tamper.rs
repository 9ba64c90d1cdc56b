//! Scenario 4: Audit Tampering
//!
//! Decisions are written to a JSONL audit log. Someone with file access
//! then rewrites one DENY into an ALLOW to cover an agent's tracks.
//! Re-verifying the log pins the break to that record.

use std::path::{Path, PathBuf};

use serde_json::json;

use maais_audit::{verify_log_file, ChainVerification};
use maais_contracts::{
    action::{Action, ActionCategory},
    error::{GateError, GateResult},
};

use crate::config::{AlertMode, RuntimeConfig};
use crate::runtime::Runtime;
use crate::scenarios::ScenarioReport;

pub const ROUTINE_CALL: &str = "routine tool call";
pub const ROUTINE_READ: &str = "routine memory read";
pub const SYSTEM_WRITE: &str = "write to /etc/passwd";
pub const LATER_CALL: &str = "later tool call";

/// Run Scenario 4 with a log in the system temp directory.
pub fn run_scenario() -> GateResult<ScenarioReport> {
    let path = std::env::temp_dir().join(format!("maais-tamper-{}.jsonl", uuid::Uuid::new_v4()));
    let result = run_in(&path);
    // Best effort.
    let _ = std::fs::remove_file(&path);
    result
}

/// Run Scenario 4 writing the audit log to `path`.
pub fn run_in(path: &Path) -> GateResult<ScenarioReport> {
    println!("=== Scenario 4: Audit Tampering ===");
    println!();

    let mut config = RuntimeConfig::default();
    config.alerts.mode = AlertMode::None;
    config.audit.path = Some(PathBuf::from(path));
    let runtime = Runtime::from_config(config)?;
    let mut report = ScenarioReport::new("tamper");

    let agent = "ops_agent";
    let tenant = "acme";
    report.record(
        ROUTINE_CALL,
        runtime.evaluate_action(&Action::new(agent, tenant, ActionCategory::ToolCall, "search_docs"))?,
    );
    report.record(
        ROUTINE_READ,
        runtime.evaluate_action(&Action::new(agent, tenant, ActionCategory::MemoryRead, "runbook"))?,
    );
    report.record(
        SYSTEM_WRITE,
        runtime.evaluate_action(
            &Action::new(agent, tenant, ActionCategory::FileWrite, "/etc/passwd")
                .with_param("content", json!("eve:x:0:0::/root:/bin/sh")),
        )?,
    );
    report.record(
        LATER_CALL,
        runtime.evaluate_action(&Action::new(agent, tenant, ActionCategory::ToolCall, "search_docs"))?,
    );

    println!();
    match runtime.audit().verify_all()? {
        ChainVerification::Intact { checked } => {
            println!("  Before tampering: intact ({checked} records)");
        }
        ChainVerification::Broken(b) => {
            println!("  Before tampering: BROKEN at {b}");
        }
    }
    drop(runtime);

    let target = report
        .decision(SYSTEM_WRITE)
        .map(|d| d.sequence)
        .ok_or_else(|| GateError::Internal {
            reason: "system write was not recorded".to_string(),
        })?;
    rewrite_verdict(path, target)?;
    println!("  Record {target} rewritten from DENY to ALLOW");

    report.chain = verify_log_file(path)?;
    report.print_chain();
    println!();

    Ok(report)
}

fn rewrite_verdict(path: &Path, sequence: u64) -> GateResult<()> {
    let contents = std::fs::read_to_string(path).map_err(|e| GateError::AuditReadFailed {
        reason: format!("failed to read '{}': {e}", path.display()),
    })?;
    let rewritten: Vec<String> = contents
        .lines()
        .enumerate()
        .map(|(i, line)| {
            if i as u64 == sequence {
                line.replacen("\"DENY\"", "\"ALLOW\"", 1)
            } else {
                line.to_string()
            }
        })
        .collect();
    std::fs::write(path, rewritten.join("\n") + "\n").map_err(|e| GateError::AuditWriteFailed {
        reason: format!("failed to write '{}': {e}", path.display()),
    })
}
