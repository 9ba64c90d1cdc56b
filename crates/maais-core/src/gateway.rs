//! The decision gateway: the single entry point every agent action passes.
//!
//! Pipeline per call:
//!
//!   Validate → Admission → Policy → Audit append → Alert → return
//!
//! The security invariant: no `Decision` is returned unless its audit record
//! was appended first. Malformed input, rate limiting, and internal component
//! failures all produce a non-allow decision that is audited like any other.
//! Only an audit failure escapes as `Err`, and callers must treat it as deny.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

use maais_contracts::{
    action::Action,
    alert::Alert,
    decision::{AdmissionOutcome, Decision, PolicyOutcome, RuleMetadata, Verdict},
    error::GateResult,
};

use crate::{
    alert::NullAlertSink,
    config::{ConfirmationMode, GatewayConfig},
    traits::{AdmissionControl, AlertSink, AuditWriter, PolicyEngine},
};

/// Point-in-time copy of the gateway counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatewayStats {
    pub evaluated: u64,
    pub allowed: u64,
    pub denied: u64,
    pub confirmations: u64,
    pub rate_limited: u64,
    pub malformed: u64,
    pub budget_overruns: u64,
    pub audit_failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    evaluated: AtomicU64,
    allowed: AtomicU64,
    denied: AtomicU64,
    confirmations: AtomicU64,
    rate_limited: AtomicU64,
    malformed: AtomicU64,
    budget_overruns: AtomicU64,
    audit_failures: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn record_verdict(&self, verdict: Verdict) {
        Self::bump(&self.evaluated);
        Self::bump(match verdict {
            Verdict::Allow => &self.allowed,
            Verdict::Deny => &self.denied,
            Verdict::RequireConfirmation => &self.confirmations,
            Verdict::RateLimited => &self.rate_limited,
        });
    }

    fn snapshot(&self) -> GatewayStats {
        GatewayStats {
            evaluated: self.evaluated.load(Ordering::Relaxed),
            allowed: self.allowed.load(Ordering::Relaxed),
            denied: self.denied.load(Ordering::Relaxed),
            confirmations: self.confirmations.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            budget_overruns: self.budget_overruns.load(Ordering::Relaxed),
            audit_failures: self.audit_failures.load(Ordering::Relaxed),
        }
    }
}

/// The gate every action goes through exactly once.
///
/// Share one gateway across worker threads behind an `Arc`; all components
/// are `Send + Sync` and the only serialization point is the audit append.
pub struct Gateway {
    admission: Box<dyn AdmissionControl>,
    policy: Box<dyn PolicyEngine>,
    audit: Box<dyn AuditWriter>,
    alerts: Box<dyn AlertSink>,
    config: GatewayConfig,
    counters: Counters,
}

impl Gateway {
    /// Create a gateway with no alert dispatcher.
    pub fn new(
        admission: Box<dyn AdmissionControl>,
        policy: Box<dyn PolicyEngine>,
        audit: Box<dyn AuditWriter>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            admission,
            policy,
            audit,
            alerts: Box::new(NullAlertSink),
            config,
            counters: Counters::default(),
        }
    }

    /// Route non-allow decisions to `alerts`.
    pub fn with_alerts(mut self, alerts: Box<dyn AlertSink>) -> Self {
        self.alerts = alerts;
        self
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn stats(&self) -> GatewayStats {
        self.counters.snapshot()
    }

    /// Decide whether `action` may execute.
    ///
    /// # Pipeline
    ///
    /// 1. Validate required fields; malformed input → DENY "malformed input"
    /// 2. Admission control; an empty bucket → RATE_LIMITED, policy skipped
    /// 3. Policy evaluation; engine failure → DENY with a diagnostic reason
    /// 4. Apply the confirmation mode to REQUIRE_CONFIRMATION
    /// 5. Append to the audit chain, which assigns the sequence number
    /// 6. Alert on any non-allow verdict
    ///
    /// The call never waits on anything but the audit append. Exceeding the
    /// latency budget is logged and counted; the verdict is unaffected.
    ///
    /// # Errors
    ///
    /// Returns `Err` only when the audit append fails. No decision exists in
    /// that case and the action must not execute.
    pub fn evaluate_action(&self, action: &Action) -> GateResult<Decision> {
        let started = Instant::now();

        let mut decision = self.decide(action);
        decision.latency_us = micros(started.elapsed());

        let receipt = match self.audit.append(action, &decision) {
            Ok(receipt) => receipt,
            Err(err) => {
                Counters::bump(&self.counters.audit_failures);
                error!(
                    action_id = %action.id,
                    agent_id = %action.agent_id,
                    verdict = %decision.verdict,
                    error = %err,
                    "audit append failed; failing closed"
                );
                return Err(err);
            }
        };
        decision.sequence = receipt.sequence;

        self.counters.record_verdict(decision.verdict);

        let total = started.elapsed();
        if total > self.config.latency_budget() {
            Counters::bump(&self.counters.budget_overruns);
            warn!(
                action_id = %action.id,
                latency_us = micros(total),
                budget_ms = self.config.latency_budget_ms,
                "latency budget exceeded"
            );
        }

        if decision.verdict.is_alerting() {
            self.alerts.notify(Alert::new(action, &decision));
        }

        debug!(
            action_id = %action.id,
            sequence = decision.sequence,
            verdict = %decision.verdict,
            latency_us = micros(total),
            "decision recorded"
        );

        Ok(decision)
    }

    /// Steps 1–4: everything before the audit append.
    fn decide(&self, action: &Action) -> Decision {
        if let Err(err) = action.validate() {
            Counters::bump(&self.counters.malformed);
            warn!(action_id = %action.id, error = %err, "rejecting malformed action");
            return blank_decision(action, Verdict::Deny, err.to_string());
        }

        match self.admission.admit(action) {
            Ok(AdmissionOutcome::Admitted) => {}
            Ok(AdmissionOutcome::Rejected { scope, retry_after }) => {
                warn!(
                    action_id = %action.id,
                    agent_id = %action.agent_id,
                    tenant_id = %action.tenant_id,
                    scope = %scope,
                    "action rate limited"
                );
                let reason = match retry_after {
                    Some(wait) => format!(
                        "rate limit exceeded for {scope} bucket; retry after {}ms",
                        wait.as_millis()
                    ),
                    None => format!("rate limit exceeded for {scope} bucket"),
                };
                return blank_decision(action, Verdict::RateLimited, reason);
            }
            Err(err) => {
                error!(action_id = %action.id, error = %err, "admission control failed");
                return blank_decision(
                    action,
                    Verdict::Deny,
                    format!("admission control failure: {err}"),
                );
            }
        }

        let outcome = match self.policy.evaluate(action) {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(action_id = %action.id, error = %err, "policy evaluation failed");
                return blank_decision(
                    action,
                    Verdict::Deny,
                    format!("policy evaluation failure: {err}"),
                );
            }
        };

        if outcome.verdict != Verdict::Allow {
            warn!(
                action_id = %action.id,
                agent_id = %action.agent_id,
                target = %action.target,
                verdict = %outcome.verdict,
                rule_id = outcome.rule_id.as_deref().unwrap_or("-"),
                reason = %outcome.reason,
                "policy did not allow action"
            );
        }

        self.from_outcome(action, outcome)
    }

    fn from_outcome(&self, action: &Action, outcome: PolicyOutcome) -> Decision {
        let pending_confirmation = outcome.verdict == Verdict::RequireConfirmation
            && self.config.confirmation == ConfirmationMode::Block;

        Decision {
            action_id: action.id,
            verdict: outcome.verdict,
            rule_id: outcome.rule_id,
            reason: outcome.reason,
            metadata: outcome.metadata,
            latency_us: 0,
            sequence: 0,
            policy_version: outcome.policy_version,
            pending_confirmation,
        }
    }
}

/// A decision that did not come from a rule.
fn blank_decision(action: &Action, verdict: Verdict, reason: String) -> Decision {
    Decision {
        action_id: action.id,
        verdict,
        rule_id: None,
        reason,
        metadata: RuleMetadata::default(),
        latency_us: 0,
        sequence: 0,
        policy_version: None,
        pending_confirmation: false,
    }
}

fn micros(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX)
}

// ── Tests ────────────────────────────────────────────────────────────────────
