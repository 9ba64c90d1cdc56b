//! Alert payloads handed to the notification collaborator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    action::{Action, ActionCategory, ActionId, AgentId, TenantId},
    decision::{Decision, Verdict},
};

/// Emitted after a DENY, RATE_LIMITED, or REQUIRE_CONFIRMATION decision has
/// been audited.
///
/// Carries enough to route the alert and link it back to the audit record;
/// action parameters are deliberately left out so alerts never copy
/// sensitive payloads to a webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub action_id: ActionId,
    pub agent_id: AgentId,
    pub tenant_id: TenantId,
    pub category: ActionCategory,
    pub target: String,
    pub verdict: Verdict,
    pub rule_id: Option<String>,
    pub reason: String,
    pub threat_taxonomy: Vec<String>,
    /// Audit sequence number of the decision.
    pub sequence: u64,
    pub raised_at: DateTime<Utc>,
}

impl Alert {
    /// Build an alert from an audited decision.
    pub fn new(action: &Action, decision: &Decision) -> Self {
        Self {
            action_id: action.id,
            agent_id: action.agent_id.clone(),
            tenant_id: action.tenant_id.clone(),
            category: action.category,
            target: action.target.clone(),
            verdict: decision.verdict,
            rule_id: decision.rule_id.clone(),
            reason: decision.reason.clone(),
            threat_taxonomy: decision.metadata.threat_taxonomy.clone(),
            sequence: decision.sequence,
            raised_at: Utc::now(),
        }
    }
}
