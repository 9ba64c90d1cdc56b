//! Scenario 3: Policy Hot Reload
//!
//! An operator tightens the rules while agents keep running. The same
//! action is allowed under version 1 and denied under version 2; a broken
//! policy pushed afterwards is rejected and version 2 keeps serving. A
//! tenant-specific rule set then relaxes the rule for one tenant only.

use serde_json::json;

use maais_contracts::{
    action::{Action, ActionCategory, TenantId},
    error::GateResult,
};
use maais_policy::RuleSet;

use crate::config::{AlertMode, RuntimeConfig};
use crate::runtime::Runtime;
use crate::scenarios::ScenarioReport;

pub const BEFORE_RELOAD: &str = "upload under permissive policy";
pub const AFTER_RELOAD: &str = "upload under tightened policy";
pub const AFTER_BAD_RELOAD: &str = "upload after rejected reload";
pub const TRUSTED_TENANT: &str = "upload from tenant with its own rules";

const PERMISSIVE: &str = r#"
[[rules]]
id = "allow-uploads"
applies_to = ["api-call"]
verdict = "allow"
"#;

const TIGHTENED: &str = r#"
[[rules]]
id = "deny-external-uploads"
applies_to = ["api-call"]
verdict = "deny"
priority = 10
reason = "Uploads to external storage are disabled"

[[rules.condition.matches]]
field = "parameters.bucket"
pattern = "^s3://external-"

[[rules]]
id = "allow-uploads"
applies_to = ["api-call"]
verdict = "allow"
"#;

const BROKEN: &str = r#"
[[rules]]
id = "allow-everything"
applies_to = ["everything"]
verdict = "allow"
"#;

/// Run Scenario 3.
pub fn run_scenario() -> GateResult<ScenarioReport> {
    println!("=== Scenario 3: Policy Hot Reload ===");
    println!();

    let mut config = RuntimeConfig::default();
    config.alerts.mode = AlertMode::None;
    let runtime = Runtime::with_rules(config, RuleSet::from_toml_str(PERMISSIVE)?)?;
    let mut report = ScenarioReport::new("hot-reload");

    let upload = |tenant: &str| {
        Action::new("sync_agent", tenant, ActionCategory::ApiCall, "storage.upload")
            .with_param("bucket", json!("s3://external-backups"))
            .with_param("object", json!("report.pdf"))
    };

    report.record(BEFORE_RELOAD, runtime.evaluate_action(&upload("acme"))?);

    let version = runtime.policy().reload_from_toml_str(TIGHTENED)?;
    println!("  Policy reloaded → version {version}");
    report.record(AFTER_RELOAD, runtime.evaluate_action(&upload("acme"))?);

    match runtime.policy().reload_from_toml_str(BROKEN) {
        Ok(v) => println!("  Unexpectedly accepted broken policy as version {v}"),
        Err(e) => println!("  Broken policy rejected: {e}"),
    }
    report.record(AFTER_BAD_RELOAD, runtime.evaluate_action(&upload("acme"))?);

    let version = runtime
        .policy()
        .replace_tenant(TenantId::from("globex"), RuleSet::from_toml_str(PERMISSIVE)?)?;
    println!("  Tenant 'globex' rules installed → version {version}");
    report.record(TRUSTED_TENANT, runtime.evaluate_action(&upload("globex"))?);

    println!();
    report.chain = runtime.audit().verify_all()?;
    report.print_chain();
    println!();

    Ok(report)
}
