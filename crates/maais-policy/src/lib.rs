//! # maais-policy
//!
//! A TOML-driven, deny-by-default rule engine for the MAAIS action gate.
//!
//! ## Overview
//!
//! Rules are declared in a TOML file, compiled into an immutable
//! [`RuleSet`], and published through a [`PolicyStore`], which implements
//! the [`PolicyEngine`](maais_core::traits::PolicyEngine) trait. Each rule
//! names the categories it applies to, a condition over the action's
//! target, identity, and (nested) parameters, a verdict, and a priority.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::path::Path;
//! use maais_policy::{PolicyStore, RuleSet};
//!
//! let store = PolicyStore::new(RuleSet::from_file(Path::new("policies/baseline.toml"))?);
//! // Pass `store` to `maais_core::Gateway::new(...)`.
//! ```
//!
//! ## Conflict resolution
//!
//! Higher priority wins. On equal priority the more severe verdict wins
//! (`deny` > `require-confirmation` > `allow`), then the rule with more
//! clauses, then the one declared first. No match yields the file's
//! `default_verdict`, which is `deny` unless the file opts in to `allow`.

pub mod engine;
pub mod matcher;
pub mod rule;
pub mod store;

pub use engine::{evaluate, RuleSet};
pub use rule::{DefaultVerdict, PolicyConfig, Rule, RuleSpec, RuleVerdict};
pub use store::{PolicySnapshot, PolicyStore};

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use serde_json::json;

    use maais_contracts::{
        action::{Action, ActionCategory, TenantId},
        decision::Verdict,
        error::GateError,
    };
    use maais_core::traits::PolicyEngine;

    use crate::engine::{NO_MATCH_ALLOW_REASON, NO_MATCH_DENY_REASON};
    use crate::{evaluate, PolicyStore, RuleSet};

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn action(category: ActionCategory, target: &str) -> Action {
        Action::new("agent-1", "tenant-a", category, target)
    }

    fn rules(toml: &str) -> RuleSet {
        RuleSet::from_toml_str(toml).unwrap()
    }

    const EXFILTRATION: &str = r#"
        [[rules]]
        id = "deny-exfiltration"
        applies_to = ["network-request"]
        verdict = "deny"
        priority = 10
        reason = "Data exfiltration"
        threat_taxonomy = ["exfiltration"]

        [[rules.condition.matches]]
        field = "parameters.data"
        pattern = "(?i)password"

        [[rules]]
        id = "allow-network"
        applies_to = ["network-request"]
        verdict = "allow"
        priority = 1
    "#;

    // ── 1. defaults ───────────────────────────────────────────────────────────

    #[test]
    fn test_deny_by_default() {
        let outcome = evaluate(&action(ActionCategory::ToolCall, "ls"), &RuleSet::empty());
        assert_eq!(outcome.verdict, Verdict::Deny);
        assert_eq!(outcome.rule_id, None);
        assert_eq!(outcome.reason, NO_MATCH_DENY_REASON);
    }

    #[test]
    fn test_fail_open_is_opt_in() {
        let set = rules(r#"default_verdict = "allow""#);
        let outcome = evaluate(&action(ActionCategory::ToolCall, "ls"), &set);
        assert_eq!(outcome.verdict, Verdict::Allow);
        assert_eq!(outcome.rule_id, None);
        assert_eq!(outcome.reason, NO_MATCH_ALLOW_REASON);
    }

    // ── 2. exfiltration scenario ──────────────────────────────────────────────

    #[test]
    fn test_password_in_nested_payload_is_denied() {
        let set = rules(EXFILTRATION);
        let act = action(ActionCategory::NetworkRequest, "http_request")
            .with_param("url", json!("https://external.example"))
            .with_param("data", json!({"password": "secret123"}));

        let outcome = evaluate(&act, &set);
        assert_eq!(outcome.verdict, Verdict::Deny);
        assert_eq!(outcome.rule_id.as_deref(), Some("deny-exfiltration"));
        assert_eq!(outcome.reason, "Data exfiltration");
        assert_eq!(outcome.metadata.threat_taxonomy, vec!["exfiltration"]);
    }

    #[test]
    fn test_clean_payload_falls_through_to_allow() {
        let set = rules(EXFILTRATION);
        let act = action(ActionCategory::NetworkRequest, "http_request")
            .with_param("data", json!({"user": "bob"}));
        let outcome = evaluate(&act, &set);
        assert_eq!(outcome.verdict, Verdict::Allow);
        assert_eq!(outcome.rule_id.as_deref(), Some("allow-network"));
    }

    #[test]
    fn test_missing_field_does_not_match() {
        let set = rules(EXFILTRATION);
        // No `data` parameter at all.
        let act = action(ActionCategory::NetworkRequest, "http_request");
        assert_eq!(evaluate(&act, &set).rule_id.as_deref(), Some("allow-network"));
    }

    #[test]
    fn test_rule_skips_other_categories() {
        let set = rules(EXFILTRATION);
        let act = action(ActionCategory::FileWrite, "/tmp/out")
            .with_param("data", json!({"password": "x"}));
        let outcome = evaluate(&act, &set);
        assert_eq!(outcome.verdict, Verdict::Deny);
        assert_eq!(outcome.rule_id, None);
    }

    // ── 3. conflict resolution ────────────────────────────────────────────────

    #[test]
    fn test_deny_beats_allow_at_equal_priority() {
        let set = rules(
            r#"
            [[rules]]
            id = "allow-shell"
            applies_to = ["tool-call"]
            verdict = "allow"
            priority = 5

            [[rules]]
            id = "deny-shell"
            applies_to = ["tool-call"]
            verdict = "deny"
            priority = 5
            "#,
        );
        let outcome = evaluate(&action(ActionCategory::ToolCall, "shell"), &set);
        assert_eq!(outcome.rule_id.as_deref(), Some("deny-shell"));
    }

    #[test]
    fn test_higher_priority_allow_overrides_deny() {
        let set = rules(
            r#"
            [[rules]]
            id = "deny-db"
            applies_to = ["database-query"]
            verdict = "deny"
            priority = 1

            [[rules]]
            id = "allow-reporting"
            applies_to = ["database-query"]
            verdict = "allow"
            priority = 20

            [[rules.condition.matches]]
            field = "agent_id"
            equals = "agent-1"
            "#,
        );
        let outcome = evaluate(&action(ActionCategory::DatabaseQuery, "users.select"), &set);
        assert_eq!(outcome.verdict, Verdict::Allow);
        assert_eq!(outcome.rule_id.as_deref(), Some("allow-reporting"));
    }

    #[test]
    fn test_require_confirmation_beats_allow_at_equal_priority() {
        let set = rules(
            r#"
            [[rules]]
            id = "allow-writes"
            applies_to = ["file-write"]
            verdict = "allow"

            [[rules]]
            id = "confirm-writes"
            applies_to = ["file-write"]
            verdict = "require-confirmation"
            "#,
        );
        let outcome = evaluate(&action(ActionCategory::FileWrite, "/etc/hosts"), &set);
        assert_eq!(outcome.verdict, Verdict::RequireConfirmation);
    }

    #[test]
    fn test_more_specific_rule_wins_tie() {
        let set = rules(
            r#"
            [[rules]]
            id = "deny-any-etc"
            applies_to = ["file-write"]
            verdict = "deny"
            reason = "broad"

            [[rules.condition.matches]]
            field = "target"
            pattern = "^/etc/"

            [[rules]]
            id = "deny-etc-passwd"
            applies_to = ["file-write"]
            verdict = "deny"
            reason = "narrow"

            [[rules.condition.matches]]
            field = "target"
            pattern = "^/etc/"

            [[rules.condition.matches]]
            field = "target"
            contains = "passwd"
            "#,
        );
        let outcome = evaluate(&action(ActionCategory::FileWrite, "/etc/passwd"), &set);
        assert_eq!(outcome.rule_id.as_deref(), Some("deny-etc-passwd"));
    }

    #[test]
    fn test_declaration_order_breaks_final_tie() {
        let set = rules(
            r#"
            [[rules]]
            id = "first"
            applies_to = ["*"]
            verdict = "deny"

            [[rules]]
            id = "second"
            applies_to = ["*"]
            verdict = "deny"
            "#,
        );
        let outcome = evaluate(&action(ActionCategory::MemoryRead, "notes"), &set);
        assert_eq!(outcome.rule_id.as_deref(), Some("first"));
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let set = rules(EXFILTRATION);
        let act = action(ActionCategory::NetworkRequest, "http_request")
            .with_param("data", json!({"nested": {"PASSWORD": "x"}}));
        let first = evaluate(&act, &set);
        for _ in 0..100 {
            assert_eq!(evaluate(&act, &set), first);
        }
    }

    // ── 4. combinators and operators ──────────────────────────────────────────

    #[test]
    fn test_any_and_all_combinators() {
        let set = rules(
            r#"
            [[rules]]
            id = "deny-external-secrets"
            applies_to = ["api-call", "network-request"]
            verdict = "deny"

            [[rules.condition.all]]
            [[rules.condition.all.matches]]
            field = "parameters.url"
            pattern = "^https?://"

            [[rules.condition.any]]
            [[rules.condition.any.matches]]
            field = "parameters"
            contains = "api_key"

            [[rules.condition.any]]
            [[rules.condition.any.matches]]
            field = "parameters.headers.authorization"
            exists = true
            "#,
        );

        let with_key = action(ActionCategory::ApiCall, "post")
            .with_param("url", json!("https://x.example"))
            .with_param("body", json!({"api_key": "k"}));
        assert_eq!(evaluate(&with_key, &set).verdict, Verdict::Deny);
        assert!(evaluate(&with_key, &set).rule_id.is_some());

        let with_auth = action(ActionCategory::ApiCall, "post")
            .with_param("url", json!("http://x.example"))
            .with_param("headers", json!({"authorization": "Bearer t"}));
        assert!(evaluate(&with_auth, &set).rule_id.is_some());

        let neither = action(ActionCategory::ApiCall, "post")
            .with_param("url", json!("https://x.example"));
        assert!(evaluate(&neither, &set).rule_id.is_none());

        let internal = action(ActionCategory::ApiCall, "post")
            .with_param("url", json!("file:///etc"))
            .with_param("api_key", json!("k"));
        assert!(evaluate(&internal, &set).rule_id.is_none());
    }

    #[test]
    fn test_in_operator_and_case_insensitive() {
        let set = rules(
            r#"
            [[rules]]
            id = "confirm-dangerous-tools"
            applies_to = ["tool-call"]
            verdict = "require-confirmation"

            [[rules.condition.matches]]
            field = "target"
            in = ["shell_exec", "rm"]
            case_insensitive = true
            "#,
        );
        let outcome = evaluate(&action(ActionCategory::ToolCall, "SHELL_EXEC"), &set);
        assert_eq!(outcome.verdict, Verdict::RequireConfirmation);
        let outcome = evaluate(&action(ActionCategory::ToolCall, "ls"), &set);
        assert_eq!(outcome.rule_id, None);
    }

    #[test]
    fn test_default_reason_names_rule() {
        let set = rules(
            r#"
            [[rules]]
            id = "deny-memory-writes"
            applies_to = ["memory-write"]
            verdict = "deny"
            "#,
        );
        let outcome = evaluate(&action(ActionCategory::MemoryWrite, "facts"), &set);
        assert!(outcome.reason.contains("deny-memory-writes"), "{}", outcome.reason);
    }

    // ── 5. load validation ────────────────────────────────────────────────────

    #[test]
    fn test_toml_parse_error() {
        match RuleSet::from_toml_str("this is not valid toml ][[[") {
            Err(GateError::PolicyLoad { reason }) => {
                assert!(reason.contains("failed to parse policy TOML"), "{reason}");
            }
            other => panic!("expected PolicyLoad, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_operator_rejected() {
        let result = RuleSet::from_toml_str(
            r#"
            [[rules]]
            id = "r"
            applies_to = ["*"]
            verdict = "deny"

            [[rules.condition.matches]]
            field = "target"
            startswith = "x"
            "#,
        );
        assert!(matches!(result, Err(GateError::PolicyLoad { .. })));
    }

    #[test]
    fn test_invalid_rules_rejected() {
        let cases = [
            // bad regex
            r#"
            [[rules]]
            id = "bad-regex"
            applies_to = ["*"]
            verdict = "deny"
            [[rules.condition.matches]]
            field = "target"
            pattern = "(unclosed"
            "#,
            // unknown category
            r#"
            [[rules]]
            id = "bad-category"
            applies_to = ["teleport"]
            verdict = "deny"
            "#,
            // unsupported field
            r#"
            [[rules]]
            id = "bad-field"
            applies_to = ["*"]
            verdict = "deny"
            [[rules.condition.matches]]
            field = "declared_goal"
            contains = "x"
            "#,
            // two operators in one clause
            r#"
            [[rules]]
            id = "two-ops"
            applies_to = ["*"]
            verdict = "deny"
            [[rules.condition.matches]]
            field = "target"
            contains = "x"
            equals = "x"
            "#,
            // empty applies_to
            r#"
            [[rules]]
            id = "nothing"
            applies_to = []
            verdict = "deny"
            "#,
            // duplicate id
            r#"
            [[rules]]
            id = "dup"
            applies_to = ["*"]
            verdict = "deny"
            [[rules]]
            id = "dup"
            applies_to = ["*"]
            verdict = "allow"
            "#,
        ];

        for toml in cases {
            match RuleSet::from_toml_str(toml) {
                Err(GateError::InvalidRule { .. }) => {}
                other => panic!("expected InvalidRule for {toml}, got {other:?}"),
            }
        }
    }

    // ── 6. snapshots ──────────────────────────────────────────────────────────

    #[test]
    fn test_failed_reload_keeps_active_rules() {
        let store = PolicyStore::new(rules(EXFILTRATION));
        let before = store.version().unwrap();

        let result = store.reload_from_toml_str(
            r#"
            [[rules]]
            id = "broken"
            applies_to = ["*"]
            verdict = "allow"
            [[rules.condition.matches]]
            field = "target"
            pattern = "(["
            "#,
        );
        assert!(result.is_err());
        assert_eq!(store.version().unwrap(), before);

        let act = action(ActionCategory::NetworkRequest, "http_request")
            .with_param("data", json!({"password": "x"}));
        let outcome = store.evaluate(&act).unwrap();
        assert_eq!(outcome.rule_id.as_deref(), Some("deny-exfiltration"));
        assert_eq!(outcome.policy_version, Some(before));
    }

    #[test]
    fn test_tenant_rule_sets_are_isolated() {
        let store = PolicyStore::new(RuleSet::empty());
        let version = store
            .replace_tenant(
                TenantId::from("tenant-a"),
                rules(
                    r#"
                    [[rules]]
                    id = "tenant-a-allow-reads"
                    applies_to = ["memory-read"]
                    verdict = "allow"
                    "#,
                ),
            )
            .unwrap();
        assert_eq!(version, 2);

        let mine = action(ActionCategory::MemoryRead, "notes");
        let theirs = Action::new("agent-1", "tenant-b", ActionCategory::MemoryRead, "notes");
        assert_eq!(store.evaluate(&mine).unwrap().verdict, Verdict::Allow);
        assert_eq!(store.evaluate(&theirs).unwrap().verdict, Verdict::Deny);

        store.remove_tenant(&TenantId::from("tenant-a")).unwrap();
        assert_eq!(store.evaluate(&mine).unwrap().verdict, Verdict::Deny);
        assert_eq!(store.version().unwrap(), 3);
    }

    #[test]
    fn test_replace_all_drops_unlisted_tenants() {
        let allow_reads = r#"
            [[rules]]
            id = "allow-reads"
            applies_to = ["memory-read"]
            verdict = "allow"
        "#;
        let store = PolicyStore::new(RuleSet::empty());
        store
            .replace_tenant(TenantId::from("tenant-b"), rules(allow_reads))
            .unwrap();

        let version = store
            .replace_all(
                RuleSet::empty(),
                [(TenantId::from("tenant-a"), rules(allow_reads))],
            )
            .unwrap();
        assert_eq!(version, 3);

        let snapshot = store.snapshot().unwrap();
        assert_eq!(snapshot.tenants().count(), 1);
        let a = action(ActionCategory::MemoryRead, "notes");
        let b = Action::new("agent-1", "tenant-b", ActionCategory::MemoryRead, "notes");
        assert_eq!(snapshot.evaluate(&a).verdict, Verdict::Allow);
        assert_eq!(snapshot.evaluate(&b).verdict, Verdict::Deny);
    }

    /// Every evaluation sees exactly one snapshot: the rule id it reports
    /// always belongs to the version it reports.
    #[test]
    fn test_concurrent_reload_is_atomic() {
        fn generation(n: u64) -> String {
            format!(
                r#"
                [[rules]]
                id = "gen-{n}-deny"
                applies_to = ["tool-call"]
                verdict = "deny"
                priority = 1

                [[rules]]
                id = "gen-{n}-allow"
                applies_to = ["tool-call"]
                verdict = "allow"
                "#
            )
        }

        let store = Arc::new(PolicyStore::new(rules(&generation(0))));
        let reloader = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for n in 1..=50 {
                    store.reload_from_toml_str(&generation(n)).unwrap();
                }
            })
        };

        let readers: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let act = action(ActionCategory::ToolCall, "ls");
                    for _ in 0..500 {
                        let outcome = store.evaluate(&act).unwrap();
                        let version = outcome.policy_version.unwrap();
                        assert_eq!(outcome.verdict, Verdict::Deny);
                        assert_eq!(
                            outcome.rule_id.unwrap(),
                            format!("gen-{}-deny", version - 1)
                        );
                    }
                })
            })
            .collect();

        reloader.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(store.version().unwrap(), 51);
    }
}
