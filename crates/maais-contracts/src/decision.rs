//! Verdicts, decisions, and the intermediate outcomes that produce them.
//!
//! The gate is deny-by-default: only `Verdict::Allow` (and, when the gateway
//! is configured to flag rather than block, `Verdict::RequireConfirmation`)
//! lets an action execute.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::action::ActionId;

/// The final verdict for one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    /// The action may execute.
    Allow,
    /// The action must not execute.
    Deny,
    /// The action needs an explicit external approval.
    RequireConfirmation,
    /// Admission control rejected the action before policy evaluation.
    RateLimited,
}

impl Verdict {
    /// Ordering used to break priority ties: the stricter verdict wins.
    pub fn severity(self) -> u8 {
        match self {
            Verdict::Allow => 0,
            Verdict::RequireConfirmation => 1,
            Verdict::RateLimited => 2,
            Verdict::Deny => 3,
        }
    }

    /// True for the verdicts that are forwarded to the alerting collaborator.
    pub fn is_alerting(self) -> bool {
        !matches!(self, Verdict::Allow)
    }

    /// The upper-case wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Allow => "ALLOW",
            Verdict::Deny => "DENY",
            Verdict::RequireConfirmation => "REQUIRE_CONFIRMATION",
            Verdict::RateLimited => "RATE_LIMITED",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Free-form metadata attached to a rule and echoed on decisions it produces.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleMetadata {
    /// Arbitrary labels, e.g. `"pii"` or `"owner:secops"`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Threat-taxonomy classification, e.g. `"exfiltration"` or an ATLAS ID.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub threat_taxonomy: Vec<String>,
    /// Any other key/value annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl RuleMetadata {
    /// True when no metadata is present.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.threat_taxonomy.is_empty() && self.extra.is_empty()
    }
}

/// What the policy engine concluded for one action.
///
/// `rule_id = None` means no rule matched and the configured default
/// verdict applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyOutcome {
    pub verdict: Verdict,
    pub rule_id: Option<String>,
    pub reason: String,
    #[serde(default, skip_serializing_if = "RuleMetadata::is_empty")]
    pub metadata: RuleMetadata,
    /// Version of the rule-set snapshot that produced this outcome.
    pub policy_version: Option<u64>,
}

/// Which admission bucket rejected an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LimitScope {
    Global,
    Tenant,
    Agent,
}

impl fmt::Display for LimitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LimitScope::Global => "global",
            LimitScope::Tenant => "tenant",
            LimitScope::Agent => "agent",
        })
    }
}

/// Result of the admission check that runs before policy evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum AdmissionOutcome {
    /// One token was taken from each of the global, tenant, and agent buckets.
    Admitted,
    /// At least one bucket was empty; no bucket was decremented.
    Rejected {
        /// The first empty bucket, checked global → tenant → agent.
        scope: LimitScope,
        /// How long until that bucket holds a whole token again.
        /// `None` when the bucket never refills.
        retry_after: Option<Duration>,
    },
}

impl AdmissionOutcome {
    pub fn is_admitted(&self) -> bool {
        matches!(self, AdmissionOutcome::Admitted)
    }
}

/// The gate's answer for one action, as returned to the caller and stored in
/// the audit chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// The action this decision is about.
    pub action_id: ActionId,
    /// Final verdict.
    pub verdict: Verdict,
    /// Rule that produced the verdict; `None` for default verdicts,
    /// admission rejections, and malformed input.
    pub rule_id: Option<String>,
    /// Human-readable rationale.
    pub reason: String,
    /// Metadata of the matched rule (threat taxonomy, tags).
    #[serde(default, skip_serializing_if = "RuleMetadata::is_empty")]
    pub metadata: RuleMetadata,
    /// Time spent in admission and policy evaluation, in microseconds.
    pub latency_us: u64,
    /// Position in the audit chain. Assigned by the chain on append.
    pub sequence: u64,
    /// Rule-set snapshot version, when policy evaluation ran.
    pub policy_version: Option<u64>,
    /// Set for `RequireConfirmation` when the gateway blocks pending an
    /// external approval.
    #[serde(default)]
    pub pending_confirmation: bool,
}

impl Decision {
    /// Whether the caller may execute the action right now.
    pub fn permits_execution(&self) -> bool {
        match self.verdict {
            Verdict::Allow => true,
            Verdict::RequireConfirmation => !self.pending_confirmation,
            Verdict::Deny | Verdict::RateLimited => false,
        }
    }

    /// True when the verdict came from a configured default rather than a rule.
    pub fn is_default(&self) -> bool {
        self.rule_id.is_none()
    }
}

/// Returned by the audit chain once a decision is durably recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReceipt {
    /// Sequence number assigned to the record.
    pub sequence: u64,
    /// Hex SHA-256 digest of the record.
    pub digest: String,
}
