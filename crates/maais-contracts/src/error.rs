//! Error types for the action gate.
//!
//! All fallible operations return `GateResult<T>`. Apart from audit
//! failures, these never reach a gateway caller: the gateway turns them into
//! deny decisions.

use thiserror::Error;

/// The unified error type for the gate.
#[derive(Debug, Error)]
pub enum GateError {
    /// A submitted action is missing a required field or names an unknown
    /// category.
    #[error("malformed input: {reason}")]
    MalformedAction { reason: String },

    /// A policy source could not be read or parsed. The previous rule set
    /// stays active.
    #[error("policy load failed: {reason}")]
    PolicyLoad { reason: String },

    /// A rule failed validation (bad regex, unknown category, empty match).
    #[error("invalid rule '{rule_id}': {reason}")]
    InvalidRule { rule_id: String, reason: String },

    /// The audit chain could not persist a record.
    ///
    /// Fatal for the request: an action whose decision cannot be recorded
    /// is never allowed.
    #[error("audit write failed: {reason}")]
    AuditWriteFailed { reason: String },

    /// Stored audit records could not be read back or decoded.
    #[error("audit read failed: {reason}")]
    AuditReadFailed { reason: String },

    /// A required configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },

    /// Internal invariant violation, e.g. a poisoned lock.
    #[error("internal error: {reason}")]
    Internal { reason: String },
}

/// Convenience alias used throughout the gate crates.
pub type GateResult<T> = Result<T, GateError>;
