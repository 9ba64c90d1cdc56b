//! The audit record type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use maais_contracts::{
    action::Action,
    decision::Decision,
    error::{GateError, GateResult},
};

use crate::chain::compute_digest;

/// The `prev_digest` of the first record in every chain.
pub const GENESIS_DIGEST: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// One entry in the hash chain: an action, the decision taken on it, and the
/// digests that link it to its predecessor.
///
/// Never mutated once appended. Changing any field, including anything
/// nested in `action.parameters`, invalidates `digest` and is caught by
/// verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Position in the chain, starting at 0.
    pub sequence: u64,

    /// When the chain appended the record.
    pub recorded_at: DateTime<Utc>,

    pub action: Action,

    /// The decision, with `sequence` equal to this record's.
    pub decision: Decision,

    /// `digest` of the previous record, or `GENESIS_DIGEST`.
    pub prev_digest: String,

    /// SHA-256 (hex) over sequence, `prev_digest`, and the canonical JSON of
    /// `recorded_at`, `action`, and `decision`.
    pub digest: String,
}

impl AuditRecord {
    /// Build and seal a record.
    pub fn seal(
        sequence: u64,
        recorded_at: DateTime<Utc>,
        action: Action,
        decision: Decision,
        prev_digest: String,
    ) -> GateResult<Self> {
        let digest = compute_digest(sequence, &prev_digest, &recorded_at, &action, &decision)?;
        Ok(Self {
            sequence,
            recorded_at,
            action,
            decision,
            prev_digest,
            digest,
        })
    }

    /// Recompute the digest from the record's own fields.
    pub fn recompute_digest(&self) -> GateResult<String> {
        compute_digest(
            self.sequence,
            &self.prev_digest,
            &self.recorded_at,
            &self.action,
            &self.decision,
        )
    }

    /// Serialize to the single-line JSON form kept in stores.
    pub fn to_bytes(&self) -> GateResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| GateError::AuditWriteFailed {
            reason: format!("failed to encode audit record {}: {e}", self.sequence),
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> GateResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| GateError::AuditReadFailed {
            reason: format!("failed to decode audit record: {e}"),
        })
    }
}
