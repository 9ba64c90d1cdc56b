//! Hash-chain primitives: digest computation and chain verification.
//!
//! Digest input layout (bytes, in order):
//!   1. sequence as 8-byte little-endian
//!   2. prev_digest as UTF-8 bytes (64 ASCII hex chars)
//!   3. canonical JSON of `{ recorded_at, action, decision }`
//!
//! JSON objects inside action parameters are key-sorted by `serde_json`, so
//! the encoding of a given record is always the same bytes.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use maais_contracts::{
    action::Action,
    decision::Decision,
    error::{GateError, GateResult},
};

use crate::record::{AuditRecord, GENESIS_DIGEST};

#[derive(Serialize)]
struct DigestBody<'a> {
    recorded_at: &'a DateTime<Utc>,
    action: &'a Action,
    decision: &'a Decision,
}

/// Compute the digest of one record. Lowercase 64-character hex.
pub fn compute_digest(
    sequence: u64,
    prev_digest: &str,
    recorded_at: &DateTime<Utc>,
    action: &Action,
    decision: &Decision,
) -> GateResult<String> {
    let body = serde_json::to_vec(&DigestBody {
        recorded_at,
        action,
        decision,
    })
    .map_err(|e| GateError::AuditWriteFailed {
        reason: format!("failed to encode record {sequence} for hashing: {e}"),
    })?;

    let mut hasher = Sha256::new();
    hasher.update(sequence.to_le_bytes());
    hasher.update(prev_digest.as_bytes());
    hasher.update(&body);

    Ok(hex::encode(hasher.finalize()))
}

/// Why verification stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakKind {
    /// The stored bytes are not an audit record.
    Undecodable(String),
    /// The record claims a different position than the one it occupies.
    SequenceMismatch { found: u64 },
    /// `prev_digest` is not the previous record's digest.
    PrevDigestMismatch { expected: String, found: String },
    /// The stored digest does not match the record's content.
    DigestMismatch { stored: String, computed: String },
}

/// The first broken record in a verified range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainBreak {
    /// Position of the broken record.
    pub sequence: u64,
    pub kind: BreakKind,
}

impl fmt::Display for ChainBreak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "record {}: ", self.sequence)?;
        match &self.kind {
            BreakKind::Undecodable(e) => write!(f, "undecodable ({e})"),
            BreakKind::SequenceMismatch { found } => {
                write!(f, "claims sequence {found}")
            }
            BreakKind::PrevDigestMismatch { expected, found } => {
                write!(f, "prev_digest {found} does not link to {expected}")
            }
            BreakKind::DigestMismatch { stored, computed } => {
                write!(f, "stored digest {stored} but content hashes to {computed}")
            }
        }
    }
}

/// Result of verifying a contiguous range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainVerification {
    Intact { checked: u64 },
    Broken(ChainBreak),
}

impl ChainVerification {
    pub fn is_intact(&self) -> bool {
        matches!(self, ChainVerification::Intact { .. })
    }

    /// Sequence of the first broken record, if any.
    pub fn first_broken(&self) -> Option<u64> {
        match self {
            ChainVerification::Intact { .. } => None,
            ChainVerification::Broken(b) => Some(b.sequence),
        }
    }
}

/// Streaming verifier: feed stored entries in order, stop at the first
/// break.
#[derive(Debug, Clone)]
pub struct ChainVerifier {
    next_sequence: u64,
    prev_digest: String,
    checked: u64,
}

impl ChainVerifier {
    /// Verify from record 0.
    pub fn from_genesis() -> Self {
        Self::anchored(0, GENESIS_DIGEST.to_string())
    }

    /// Verify from `next_sequence`, trusting `prev_digest` as the digest of
    /// the record before it.
    pub fn anchored(next_sequence: u64, prev_digest: String) -> Self {
        Self {
            next_sequence,
            prev_digest,
            checked: 0,
        }
    }

    /// Check one stored entry.
    pub fn feed(&mut self, entry: &[u8]) -> Result<(), ChainBreak> {
        let position = self.next_sequence;
        let broken = |kind| ChainBreak {
            sequence: position,
            kind,
        };

        let record = AuditRecord::from_bytes(entry)
            .map_err(|e| broken(BreakKind::Undecodable(e.to_string())))?;

        if record.sequence != position {
            return Err(broken(BreakKind::SequenceMismatch {
                found: record.sequence,
            }));
        }
        if record.prev_digest != self.prev_digest {
            return Err(broken(BreakKind::PrevDigestMismatch {
                expected: self.prev_digest.clone(),
                found: record.prev_digest,
            }));
        }
        let computed = record
            .recompute_digest()
            .map_err(|e| broken(BreakKind::Undecodable(e.to_string())))?;
        if computed != record.digest {
            return Err(broken(BreakKind::DigestMismatch {
                stored: record.digest,
                computed,
            }));
        }

        self.prev_digest = record.digest;
        self.next_sequence += 1;
        self.checked += 1;
        Ok(())
    }

    pub fn finish(self) -> ChainVerification {
        ChainVerification::Intact {
            checked: self.checked,
        }
    }
}

/// Verify a whole chain held in memory, starting at genesis.
pub fn verify_entries<'a>(entries: impl IntoIterator<Item = &'a [u8]>) -> ChainVerification {
    let mut verifier = ChainVerifier::from_genesis();
    for entry in entries {
        if let Err(b) = verifier.feed(entry) {
            return ChainVerification::Broken(b);
        }
    }
    verifier.finish()
}
