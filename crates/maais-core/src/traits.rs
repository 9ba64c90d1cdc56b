//! Seam traits for the decision pipeline.
//!
//! The gateway owns one implementation of each and calls them in a fixed
//! order:
//!
//! - `AdmissionControl`: cheap rate-limit gate, runs first
//! - `PolicyEngine`: deterministic rule evaluation
//! - `AuditWriter`: hash-chained record of every decision
//! - `AlertSink`: fire-and-forget notification of non-allow verdicts
//!
//! All four are `Send + Sync`: one gateway serves concurrent callers.

use std::sync::Arc;

use maais_contracts::{
    action::Action,
    alert::Alert,
    decision::{AdmissionOutcome, AuditReceipt, Decision, PolicyOutcome},
    error::GateResult,
};

/// Token-bucket admission control across global, tenant, and agent scope.
pub trait AdmissionControl: Send + Sync {
    /// Atomically take one token from each applicable bucket, or none.
    ///
    /// A rejection is a normal outcome, not an error. `Err` means the
    /// controller itself is broken; the gateway then denies the action.
    fn admit(&self, action: &Action) -> GateResult<AdmissionOutcome>;
}

/// The rule evaluator.
///
/// Implementations must be deterministic: the same action against the same
/// rule-set snapshot always yields the same outcome. Avoid I/O here; the
/// gateway's latency budget is a few milliseconds.
pub trait PolicyEngine: Send + Sync {
    fn evaluate(&self, action: &Action) -> GateResult<PolicyOutcome>;
}

/// The append-only audit record of every decision.
///
/// `append` assigns the next sequence number and must persist the record
/// before returning. A failed append is fatal for the request: the gateway
/// surfaces the error and the action is not allowed.
pub trait AuditWriter: Send + Sync {
    fn append(&self, action: &Action, decision: &Decision) -> GateResult<AuditReceipt>;
}

/// Receiver of alerts for DENY, RATE_LIMITED, and REQUIRE_CONFIRMATION.
///
/// Must not block and cannot fail the decision path; implementations drop
/// alerts they cannot deliver.
pub trait AlertSink: Send + Sync {
    fn notify(&self, alert: Alert);
}

impl<T: AdmissionControl + ?Sized> AdmissionControl for Arc<T> {
    fn admit(&self, action: &Action) -> GateResult<AdmissionOutcome> {
        (**self).admit(action)
    }
}

impl<T: PolicyEngine + ?Sized> PolicyEngine for Arc<T> {
    fn evaluate(&self, action: &Action) -> GateResult<PolicyOutcome> {
        (**self).evaluate(action)
    }
}

impl<T: AuditWriter + ?Sized> AuditWriter for Arc<T> {
    fn append(&self, action: &Action, decision: &Decision) -> GateResult<AuditReceipt> {
        (**self).append(action, decision)
    }
}

impl<T: AlertSink + ?Sized> AlertSink for Arc<T> {
    fn notify(&self, alert: Alert) {
        (**self).notify(alert)
    }
}
