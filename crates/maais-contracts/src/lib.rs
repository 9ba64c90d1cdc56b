//! # maais-contracts
//!
//! Shared types and error definitions for the MAAIS action gate.
//!
//! All crates in the workspace import from here. No business logic lives in
//! this crate: only data definitions, input validation, and error types.

pub mod action;
pub mod alert;
pub mod decision;
pub mod error;

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use action::{Action, ActionCategory, ActionId};
    use alert::Alert;
    use decision::{Decision, RuleMetadata, Verdict};
    use error::GateError;

    fn decision(verdict: Verdict, pending_confirmation: bool) -> Decision {
        Decision {
            action_id: ActionId::new(),
            verdict,
            rule_id: Some("r1".to_string()),
            reason: "test".to_string(),
            metadata: RuleMetadata::default(),
            latency_us: 12,
            sequence: 3,
            policy_version: Some(1),
            pending_confirmation,
        }
    }

    // ── ActionCategory ───────────────────────────────────────────────────────

    #[test]
    fn category_parse_accepts_both_separators() {
        assert_eq!(
            ActionCategory::parse("network-request"),
            Some(ActionCategory::NetworkRequest)
        );
        assert_eq!(
            ActionCategory::parse("network_request"),
            Some(ActionCategory::NetworkRequest)
        );
        assert_eq!(ActionCategory::parse(" Tool_Call "), Some(ActionCategory::ToolCall));
        assert_eq!(ActionCategory::parse("teleport"), None);
        assert_eq!(ActionCategory::parse("unknown"), None);
    }

    #[test]
    fn category_deserializes_snake_case_alias() {
        let category: ActionCategory = serde_json::from_str("\"database_query\"").unwrap();
        assert_eq!(category, ActionCategory::DatabaseQuery);
    }

    #[test]
    fn unrecognized_category_deserializes_to_unknown() {
        let category: ActionCategory = serde_json::from_str("\"teleport\"").unwrap();
        assert_eq!(category, ActionCategory::Unknown);
    }

    // ── Action validation ────────────────────────────────────────────────────

    #[test]
    fn well_formed_action_validates() {
        let action = Action::new("agent-1", "acme", ActionCategory::ToolCall, "http_request")
            .with_param("url", json!("https://example.com"))
            .with_goal("fetch docs");
        assert!(action.validate().is_ok());
        assert_eq!(action.parameters["url"], json!("https://example.com"));
        assert_eq!(action.declared_goal, "fetch docs");
    }

    #[test]
    fn action_with_missing_fields_is_malformed() {
        let partial: Action =
            serde_json::from_value(json!({ "agent_id": "a", "target": "x" })).unwrap();

        match partial.validate() {
            Err(GateError::MalformedAction { reason }) => {
                assert!(reason.contains("tenant_id"), "unexpected reason: {reason}");
            }
            other => panic!("expected MalformedAction, got {:?}", other),
        }
    }

    #[test]
    fn action_with_unknown_category_is_malformed() {
        let action: Action = serde_json::from_value(json!({
            "agent_id": "a",
            "tenant_id": "t",
            "category": "teleport",
            "target": "beam",
        }))
        .unwrap();

        let err = action.validate().unwrap_err();
        assert!(err.to_string().contains("category"));
    }

    #[test]
    fn non_object_parameters_are_wrapped() {
        let action = Action::new("a", "t", ActionCategory::ApiCall, "echo")
            .with_parameters(json!([1, 2, 3]));
        assert_eq!(action.parameters["value"], json!([1, 2, 3]));
    }

    // ── Verdict / Decision ───────────────────────────────────────────────────

    #[test]
    fn verdict_wire_names() {
        assert_eq!(
            serde_json::to_string(&Verdict::RequireConfirmation).unwrap(),
            "\"REQUIRE_CONFIRMATION\""
        );
        let decoded: Verdict = serde_json::from_str("\"RATE_LIMITED\"").unwrap();
        assert_eq!(decoded, Verdict::RateLimited);
        assert_eq!(Verdict::Deny.to_string(), "DENY");
    }

    #[test]
    fn deny_is_the_most_severe_verdict() {
        assert!(Verdict::Deny.severity() > Verdict::RequireConfirmation.severity());
        assert!(Verdict::RequireConfirmation.severity() > Verdict::Allow.severity());
        assert!(!Verdict::Allow.is_alerting());
        assert!(Verdict::RateLimited.is_alerting());
    }

    #[test]
    fn only_allow_and_flagged_confirmation_permit_execution() {
        assert!(decision(Verdict::Allow, false).permits_execution());
        assert!(!decision(Verdict::Deny, false).permits_execution());
        assert!(!decision(Verdict::RateLimited, false).permits_execution());
        assert!(!decision(Verdict::RequireConfirmation, true).permits_execution());
        assert!(decision(Verdict::RequireConfirmation, false).permits_execution());
    }

    #[test]
    fn alert_carries_threat_taxonomy_but_not_parameters() {
        let action = Action::new("a", "t", ActionCategory::NetworkRequest, "http_request")
            .with_param("password", json!("hunter2"));
        let mut d = decision(Verdict::Deny, false);
        d.metadata.threat_taxonomy = vec!["exfiltration".to_string()];

        let alert = Alert::new(&action, &d);
        assert_eq!(alert.threat_taxonomy, vec!["exfiltration".to_string()]);
        assert_eq!(alert.sequence, 3);

        let encoded = serde_json::to_string(&alert).unwrap();
        assert!(!encoded.contains("hunter2"));
    }

    // ── GateError display messages ───────────────────────────────────────────

    #[test]
    fn error_malformed_action_display() {
        let err = GateError::MalformedAction {
            reason: "target is empty".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("malformed input"));
        assert!(msg.contains("target is empty"));
    }

    #[test]
    fn error_invalid_rule_display() {
        let err = GateError::InvalidRule {
            rule_id: "deny-exfil".to_string(),
            reason: "regex parse error".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("deny-exfil"));
        assert!(msg.contains("regex parse error"));
    }

    #[test]
    fn error_audit_write_failed_display() {
        let err = GateError::AuditWriteFailed {
            reason: "disk full".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("audit write failed"));
        assert!(msg.contains("disk full"));
    }
}
