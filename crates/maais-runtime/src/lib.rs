//! # maais-runtime
//!
//! A ready-to-run MAAIS action gate.
//!
//! [`Runtime`] reads a [`RuntimeConfig`] (TOML), loads rule sets, opens the
//! audit log, and wires the policy store, admission controller, audit chain,
//! and alert sink into a `Gateway`. With no configuration at all it serves
//! the built-in baseline policy with an in-memory audit chain.
//!
//! Four reference scenarios exercise it end to end:
//!
//! 1. **Credential Exfiltration**: a compromised agent reads passwords and
//!    tries to post them out; a benign agent works alongside it.
//! 2. **Runaway Agent**: one agent exhausts its burst and is rate limited
//!    while its neighbour is not.
//! 3. **Policy Hot Reload**: rules are tightened mid-run; a broken update is
//!    rejected; one tenant gets its own rules.
//! 4. **Audit Tampering**: a DENY is rewritten to ALLOW in the log file and
//!    verification finds it.

pub mod config;
pub mod runtime;
pub mod scenarios;

pub use config::{AlertConfig, AlertMode, AuditConfig, PolicyConfig, RuntimeConfig};
pub use runtime::{AuditLog, Runtime, BASELINE_POLICY};

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    use serde_json::json;

    use maais_admission::{BucketConfig, RateLimitConfig};
    use maais_audit::{BreakKind, ChainVerification};
    use maais_contracts::{
        action::{Action, ActionCategory},
        decision::Verdict,
        error::GateError,
    };
    use maais_core::ConfirmationMode;
    use maais_policy::RuleSet;

    use crate::scenarios::{exfiltration, hot_reload, rate_limit, tamper};
    use crate::{AlertMode, Runtime, RuntimeConfig};

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn quiet_config() -> RuntimeConfig {
        let mut config = RuntimeConfig::default();
        config.alerts.mode = AlertMode::None;
        config
    }

    fn baseline() -> Runtime {
        Runtime::from_config(quiet_config()).unwrap()
    }

    fn act(category: ActionCategory, target: &str) -> Action {
        Action::new("agent-1", "acme", category, target)
    }

    // ── 1. scenarios ──────────────────────────────────────────────────────────

    #[test]
    fn test_exfiltration_scenario() {
        let report = exfiltration::run_scenario().unwrap();
        assert_eq!(
            report.verdicts(),
            vec![
                Verdict::RequireConfirmation,
                Verdict::Deny,
                Verdict::Allow,
                Verdict::Allow
            ]
        );

        let post = report.decision(exfiltration::EXFIL_POST).unwrap();
        assert_eq!(post.rule_id.as_deref(), Some("deny-credential-exfiltration"));
        assert_eq!(post.reason, "Data exfiltration");
        assert_eq!(post.metadata.threat_taxonomy, vec!["exfiltration"]);

        let read = report.decision(exfiltration::STOLEN_READ).unwrap();
        assert_eq!(read.rule_id.as_deref(), Some("confirm-sensitive-memory-read"));
        assert!(read.pending_confirmation);

        let sequences: Vec<u64> = report.steps.iter().map(|s| s.decision.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2, 3]);
        assert_eq!(report.chain, ChainVerification::Intact { checked: 4 });
    }

    #[test]
    fn test_rate_limit_scenario() {
        let report = rate_limit::run_scenario().unwrap();
        assert_eq!(report.steps.len(), 3, "no call within the burst was blocked");

        assert_eq!(
            report.decision(rate_limit::LAST_ADMITTED).unwrap().verdict,
            Verdict::Allow
        );
        let rejected = report.decision(rate_limit::FIRST_REJECTED).unwrap();
        assert_eq!(rejected.verdict, Verdict::RateLimited);
        assert!(rejected.rule_id.is_none());
        assert!(rejected.reason.contains("agent"), "got: {}", rejected.reason);
        assert_eq!(
            report.decision(rate_limit::QUIET_CALL).unwrap().verdict,
            Verdict::Allow
        );

        let total = u64::from(rate_limit::AGENT_BURST) + 2;
        assert_eq!(report.chain, ChainVerification::Intact { checked: total });
    }

    #[test]
    fn test_hot_reload_scenario() {
        let report = hot_reload::run_scenario().unwrap();
        assert_eq!(
            report.verdicts(),
            vec![Verdict::Allow, Verdict::Deny, Verdict::Deny, Verdict::Allow]
        );
        let versions: Vec<Option<u64>> = report
            .steps
            .iter()
            .map(|s| s.decision.policy_version)
            .collect();
        assert_eq!(versions, vec![Some(1), Some(2), Some(2), Some(3)]);
        assert_eq!(
            report.decision(hot_reload::AFTER_RELOAD).unwrap().rule_id.as_deref(),
            Some("deny-external-uploads")
        );
    }

    #[test]
    fn test_tamper_scenario_locates_rewritten_record() {
        let dir = tempfile::tempdir().unwrap();
        let report = tamper::run_in(&dir.path().join("audit.jsonl")).unwrap();

        let write = report.decision(tamper::SYSTEM_WRITE).unwrap();
        assert_eq!(write.verdict, Verdict::Deny);
        assert_eq!(write.rule_id.as_deref(), Some("deny-critical-path-writes"));

        let ChainVerification::Broken(b) = &report.chain else {
            panic!("tampering went undetected: {:?}", report.chain);
        };
        assert_eq!(b.sequence, write.sequence);
        assert!(matches!(b.kind, BreakKind::DigestMismatch { .. }));
    }

    // ── 2. baseline policy ────────────────────────────────────────────────────

    #[test]
    fn test_baseline_database_rules() {
        let rt = baseline();

        let drop = act(ActionCategory::DatabaseQuery, "users")
            .with_param("query", json!("DROP TABLE users"));
        let d = rt.evaluate_action(&drop).unwrap();
        assert_eq!(d.verdict, Verdict::Deny);
        assert_eq!(d.rule_id.as_deref(), Some("deny-destructive-queries"));

        let select = act(ActionCategory::DatabaseQuery, "users")
            .with_param("query", json!("  select id from users"));
        assert_eq!(rt.evaluate_action(&select).unwrap().verdict, Verdict::Allow);

        let update = act(ActionCategory::DatabaseQuery, "users")
            .with_param("query", json!("UPDATE users SET admin = true"));
        let d = rt.evaluate_action(&update).unwrap();
        assert_eq!(d.verdict, Verdict::Deny);
        assert!(d.is_default(), "unmatched queries fall to the default deny");
    }

    #[test]
    fn test_baseline_critical_writes() {
        let rt = baseline();
        for target in ["/etc/shadow", "/usr/bin/env", "deploy/config.yaml"] {
            let d = rt
                .evaluate_action(&act(ActionCategory::FileWrite, target))
                .unwrap();
            assert_eq!(d.verdict, Verdict::Deny, "{target}");
            assert_eq!(d.rule_id.as_deref(), Some("deny-critical-path-writes"));
        }
        // No rule allows other writes either.
        let d = rt
            .evaluate_action(&act(ActionCategory::FileWrite, "/tmp/scratch.txt"))
            .unwrap();
        assert_eq!(d.verdict, Verdict::Deny);
        assert!(d.rule_id.is_none());
    }

    #[test]
    fn test_confirmation_modes() {
        let tool = act(ActionCategory::ToolCall, "Execute_Command")
            .with_param("cmd", json!("rm -rf /"));

        let blocking = baseline();
        let d = blocking.evaluate_action(&tool).unwrap();
        assert_eq!(d.verdict, Verdict::RequireConfirmation);
        assert!(d.pending_confirmation);
        assert!(!d.permits_execution());

        let mut config = quiet_config();
        config.gateway.confirmation = ConfirmationMode::Flag;
        let flagging = Runtime::from_config(config).unwrap();
        let d = flagging.evaluate_action(&tool).unwrap();
        assert_eq!(d.verdict, Verdict::RequireConfirmation);
        assert!(!d.pending_confirmation);
        assert!(d.permits_execution());
    }

    // ── 3. malformed input ────────────────────────────────────────────────────

    #[test]
    fn test_unparseable_json_is_denied_and_audited() {
        let rt = baseline();
        let d = rt.evaluate_json("{not json").unwrap();
        assert_eq!(d.verdict, Verdict::Deny);
        assert!(d.reason.starts_with("malformed input"), "got: {}", d.reason);

        let records = rt.audit().recent(1).unwrap();
        assert_eq!(records[0].decision.verdict, Verdict::Deny);
        assert_eq!(records[0].action.parameters["raw"], json!("{not json"));
        assert_eq!(rt.stats().malformed, 1);
    }

    #[test]
    fn test_json_missing_identity_is_denied() {
        let rt = baseline();
        let d = rt
            .evaluate_json(r#"{"tenant_id": "acme", "category": "tool-call", "target": "ls"}"#)
            .unwrap();
        assert_eq!(d.verdict, Verdict::Deny);
        assert_eq!(d.reason, "malformed input: agent_id is empty");

        let d = rt
            .evaluate_json(
                r#"{"agent_id": "a", "tenant_id": "acme", "category": "teleport", "target": "x"}"#,
            )
            .unwrap();
        assert_eq!(d.verdict, Verdict::Deny);
        assert!(d.reason.contains("category"), "got: {}", d.reason);

        assert_eq!(rt.audit().len().unwrap(), 2);
        // Malformed input never reaches admission control.
        let global = rt.admission().global_state().unwrap();
        assert_eq!(global.tokens, f64::from(global.capacity));
    }

    #[test]
    fn test_well_formed_json_is_evaluated() {
        let rt = baseline();
        let d = rt
            .evaluate_json(
                r#"{
                    "agent_id": "a",
                    "tenant_id": "acme",
                    "category": "network-request",
                    "target": "http_request",
                    "parameters": {"url": "https://x.example", "body": {"api_key": "k"}}
                }"#,
            )
            .unwrap();
        assert_eq!(d.verdict, Verdict::Deny);
        assert_eq!(d.rule_id.as_deref(), Some("deny-credential-exfiltration"));
    }

    // ── 4. alerts ─────────────────────────────────────────────────────────────

    #[test]
    fn test_channel_alerts_follow_audited_decisions() {
        let mut config = RuntimeConfig::default();
        config.alerts.mode = AlertMode::Channel;
        let rt = Runtime::from_config(config).unwrap();
        let rx = rt.take_alerts().unwrap().unwrap();
        assert!(rt.take_alerts().unwrap().is_none(), "receiver is handed out once");

        rt.evaluate_action(&act(ActionCategory::ToolCall, "search_docs"))
            .unwrap();
        let denied = rt
            .evaluate_action(&act(ActionCategory::FileWrite, "/etc/hosts"))
            .unwrap();

        let alerts: Vec<_> = rx.try_iter().collect();
        assert_eq!(alerts.len(), 1, "allow decisions raise no alert");
        assert_eq!(alerts[0].sequence, denied.sequence);
        assert_eq!(alerts[0].rule_id.as_deref(), Some("deny-critical-path-writes"));
    }

    // ── 5. concurrency ────────────────────────────────────────────────────────

    /// Many workers evaluate while the policy is reloaded underneath them.
    /// Every decision is audited exactly once, the chain stays intact, and
    /// every decision names a rule from the version it reports.
    #[test]
    fn test_concurrent_evaluation_with_reloads() {
        fn generation(n: u64) -> String {
            format!(
                r#"
                [[rules]]
                id = "gen-{n}"
                applies_to = ["tool-call"]
                verdict = "allow"
                "#
            )
        }

        let mut config = quiet_config();
        config.rate_limits = RateLimitConfig::uniform(BucketConfig::new(10_000, 0.0));
        let rt = Arc::new(
            Runtime::with_rules(config, RuleSet::from_toml_str(&generation(1)).unwrap()).unwrap(),
        );

        let workers: Vec<_> = (0..8)
            .map(|w| {
                let rt = Arc::clone(&rt);
                thread::spawn(move || {
                    (0..50)
                        .map(|i| {
                            let a = Action::new(
                                format!("agent-{w}"),
                                "acme",
                                ActionCategory::ToolCall,
                                format!("task-{i}"),
                            );
                            rt.evaluate_action(&a).unwrap()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let reloader = {
            let rt = Arc::clone(&rt);
            thread::spawn(move || {
                for n in 2..=20 {
                    rt.policy().reload_from_toml_str(&generation(n)).unwrap();
                }
            })
        };

        let decisions: Vec<_> = workers
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        reloader.join().unwrap();

        assert_eq!(decisions.len(), 400);
        let sequences: HashSet<u64> = decisions.iter().map(|d| d.sequence).collect();
        assert_eq!(sequences.len(), 400);
        assert_eq!(sequences.iter().max(), Some(&399));

        for d in &decisions {
            let version = d.policy_version.unwrap();
            assert_eq!(d.rule_id, Some(format!("gen-{version}")));
        }

        assert_eq!(rt.audit().len().unwrap(), 400);
        assert_eq!(
            rt.audit().verify_all().unwrap(),
            ChainVerification::Intact { checked: 400 }
        );
    }

    // ── 6. configuration ──────────────────────────────────────────────────────

    #[test]
    fn test_config_file_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("policies")).unwrap();
        std::fs::write(
            dir.path().join("policies/default.toml"),
            r#"
            [[rules]]
            id = "allow-tools"
            applies_to = ["tool-call"]
            verdict = "allow"
            "#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("policies/globex.toml"),
            r#"default_verdict = "deny""#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("gate.toml"),
            r#"
            [gateway]
            latency_budget_ms = 50

            [rate_limits.agent]
            capacity = 5
            refill_per_sec = 1.0

            [audit]
            path = "audit.jsonl"

            [policy]
            path = "policies/default.toml"

            [policy.tenants]
            globex = "policies/globex.toml"

            [alerts]
            mode = "none"
            "#,
        )
        .unwrap();

        let rt = Runtime::from_config_file(&dir.path().join("gate.toml")).unwrap();
        assert_eq!(rt.config().gateway.latency_budget_ms, 50);
        assert_eq!(rt.config().rate_limits.agent.capacity, 5);
        assert_eq!(rt.policy().version().unwrap(), 2, "baseline plus one tenant");

        let acme = Action::new("a", "acme", ActionCategory::ToolCall, "ls");
        let globex = Action::new("a", "globex", ActionCategory::ToolCall, "ls");
        assert_eq!(rt.evaluate_action(&acme).unwrap().verdict, Verdict::Allow);
        assert_eq!(rt.evaluate_action(&globex).unwrap().verdict, Verdict::Deny);

        let log = std::fs::read_to_string(dir.path().join("audit.jsonl")).unwrap();
        assert_eq!(log.lines().count(), 2);
    }

    #[test]
    fn test_reload_policy_from_configured_files() {
        let dir = tempfile::tempdir().unwrap();
        let policy = dir.path().join("policy.toml");
        std::fs::write(&policy, "").unwrap();

        let mut config = quiet_config();
        config.policy.path = Some(policy.clone());
        let rt = Runtime::from_config(config).unwrap();
        let ls = act(ActionCategory::ToolCall, "ls");
        assert_eq!(rt.evaluate_action(&ls).unwrap().verdict, Verdict::Deny);

        std::fs::write(&policy, r#"default_verdict = "allow""#).unwrap();
        assert_eq!(rt.reload_policy().unwrap(), 2);
        assert_eq!(rt.evaluate_action(&ls).unwrap().verdict, Verdict::Allow);

        std::fs::write(&policy, "default_verdict = ").unwrap();
        assert!(matches!(rt.reload_policy(), Err(GateError::PolicyLoad { .. })));
        assert_eq!(rt.policy().version().unwrap(), 2);
        assert_eq!(rt.evaluate_action(&ls).unwrap().verdict, Verdict::Allow);
    }

    #[test]
    fn test_file_audit_log_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = quiet_config();
        config.audit.path = Some(dir.path().join("audit.jsonl"));

        {
            let rt = Runtime::from_config(config.clone()).unwrap();
            for _ in 0..3 {
                rt.evaluate_action(&act(ActionCategory::ToolCall, "ls")).unwrap();
            }
        }

        let rt = Runtime::from_config(config).unwrap();
        let d = rt.evaluate_action(&act(ActionCategory::ToolCall, "ls")).unwrap();
        assert_eq!(d.sequence, 3);
        assert_eq!(
            rt.audit().verify_all().unwrap(),
            ChainVerification::Intact { checked: 4 }
        );
    }

    #[test]
    fn test_invalid_runtime_config_is_rejected() {
        let err = RuntimeConfig::from_toml_str("[gateway]\nlatency_budget = 5").unwrap_err();
        assert!(matches!(err, GateError::ConfigError { .. }), "{err}");

        let err = RuntimeConfig::from_toml_str("[rate_limits.global]\ncapacity = 0\nrefill_per_sec = 1.0")
            .unwrap_err();
        assert!(err.to_string().contains("rate_limits.global"), "{err}");

        let err = RuntimeConfig::from_toml_str("[alerts]\nmode = \"channel\"\nqueue_capacity = 0")
            .unwrap_err();
        assert!(matches!(err, GateError::ConfigError { .. }), "{err}");

        let err = Runtime::from_config_file(std::path::Path::new("/nonexistent/gate.toml"))
            .unwrap_err();
        assert!(matches!(err, GateError::ConfigError { .. }), "{err}");
    }

    #[test]
    fn test_missing_tenant_policy_file_fails_startup() {
        let mut config = quiet_config();
        config
            .policy
            .tenants
            .insert("acme".to_string(), "/nonexistent/acme.toml".into());
        assert!(matches!(
            Runtime::from_config(config),
            Err(GateError::PolicyLoad { .. })
        ));
    }
}
