//! `AuditChain`: the serialized writer and reader over an `AuditStore`.
//!
//! Appends go through one `Mutex`. Inside it the chain assigns the next
//! sequence number, hashes the record against the previous digest, and
//! persists it; the head only advances once the store accepts the entry, so
//! a failed append leaves no gap. Nothing but hashing and the store write
//! happens under the lock.
//!
//! Verification and queries read the store in bounded chunks, taking the
//! lock once per chunk so that a long verification never stalls appends for
//! more than one chunk.

use std::ops::Range;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use tracing::{debug, error, info};

use maais_contracts::{
    action::Action,
    decision::{AuditReceipt, Decision},
    error::{GateError, GateResult},
};
use maais_core::traits::AuditWriter;

use crate::chain::{BreakKind, ChainBreak, ChainVerification, ChainVerifier};
use crate::file::JsonlStore;
use crate::record::{AuditRecord, GENESIS_DIGEST};
use crate::store::{AuditStore, MemoryStore};

/// Entries read per lock acquisition during verification and queries.
const READ_CHUNK: u64 = 1024;

pub(crate) struct ChainState<S> {
    pub(crate) store: S,
    next_sequence: u64,
    last_digest: String,
}

/// An append-only, SHA-256 hash-chained audit log.
pub struct AuditChain<S: AuditStore> {
    pub(crate) state: Mutex<ChainState<S>>,
}

impl AuditChain<MemoryStore> {
    /// A chain kept in memory only.
    pub fn in_memory() -> Self {
        Self {
            state: Mutex::new(ChainState {
                store: MemoryStore::new(),
                next_sequence: 0,
                last_digest: GENESIS_DIGEST.to_string(),
            }),
        }
    }
}

impl AuditChain<JsonlStore> {
    /// Open or create a JSONL-backed chain, continuing any existing log.
    pub fn open_file(path: impl AsRef<Path>) -> GateResult<Self> {
        Self::new(JsonlStore::open(path)?)
    }
}

impl<S: AuditStore> AuditChain<S> {
    /// Wrap `store`, recovering the head from its last entry.
    ///
    /// Fails if the last entry cannot be decoded, does not sit at the
    /// position it claims, or no longer matches its own digest; appending
    /// after such an entry would fork the chain.
    pub fn new(store: S) -> GateResult<Self> {
        let len = store.len();
        let (next_sequence, last_digest) = if len == 0 {
            (0, GENESIS_DIGEST.to_string())
        } else {
            let entries = store.read(len - 1..len)?;
            let last = entries.first().ok_or_else(|| GateError::AuditReadFailed {
                reason: format!("store reports {len} entries but returned none"),
            })?;
            let record = AuditRecord::from_bytes(last)?;
            if record.sequence != len - 1 {
                return Err(GateError::AuditReadFailed {
                    reason: format!(
                        "last record claims sequence {} but is entry {}",
                        record.sequence,
                        len - 1
                    ),
                });
            }
            if record.recompute_digest()? != record.digest {
                return Err(GateError::AuditReadFailed {
                    reason: format!(
                        "last record (sequence {}) does not match its digest",
                        record.sequence
                    ),
                });
            }
            info!(
                next_sequence = len,
                last_digest = %record.digest,
                "audit chain recovered"
            );
            (len, record.digest)
        };

        Ok(Self {
            state: Mutex::new(ChainState {
                store,
                next_sequence,
                last_digest,
            }),
        })
    }

    fn lock(&self) -> GateResult<MutexGuard<'_, ChainState<S>>> {
        self.state.lock().map_err(|_| GateError::Internal {
            reason: "audit chain lock poisoned".to_string(),
        })
    }

    /// Append one decision and return the sealed record.
    ///
    /// The stored decision carries the assigned sequence number.
    pub fn append_record(&self, action: &Action, decision: &Decision) -> GateResult<AuditRecord> {
        let mut state = self.lock()?;

        let sequence = state.next_sequence;
        let mut decision = decision.clone();
        decision.sequence = sequence;

        let record = AuditRecord::seal(
            sequence,
            Utc::now(),
            action.clone(),
            decision,
            state.last_digest.clone(),
        )?;
        let bytes = record.to_bytes()?;

        let position = state.store.append(&bytes).map_err(|e| {
            error!(sequence, error = %e, "audit append failed");
            e
        })?;
        if position != sequence {
            return Err(GateError::Internal {
                reason: format!("store placed record {sequence} at position {position}"),
            });
        }

        state.next_sequence += 1;
        state.last_digest = record.digest.clone();
        drop(state);

        debug!(
            sequence,
            action_id = %record.action.id,
            verdict = %record.decision.verdict,
            digest = %record.digest,
            "audit record appended"
        );
        Ok(record)
    }

    /// Number of records in the chain.
    pub fn len(&self) -> GateResult<u64> {
        Ok(self.lock()?.next_sequence)
    }

    pub fn is_empty(&self) -> GateResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Digest of the newest record, or `GENESIS_DIGEST` when empty.
    pub fn head_digest(&self) -> GateResult<String> {
        Ok(self.lock()?.last_digest.clone())
    }

    fn read_raw(&self, range: Range<u64>) -> GateResult<Vec<Vec<u8>>> {
        self.lock()?.store.read(range)
    }

    /// Decoded records in `range`, oldest first.
    pub fn read(&self, range: Range<u64>) -> GateResult<Vec<AuditRecord>> {
        self.read_raw(range)?
            .iter()
            .map(|entry| AuditRecord::from_bytes(entry))
            .collect()
    }

    /// The newest `limit` records, newest first.
    pub fn recent(&self, limit: usize) -> GateResult<Vec<AuditRecord>> {
        let len = self.len()?;
        let start = len.saturating_sub(limit as u64);
        let mut records = self.read(start..len)?;
        records.reverse();
        Ok(records)
    }

    /// Recompute every digest in `range` and check every link.
    ///
    /// For a range not starting at 0, the stored digest of the record just
    /// before it is the anchor. The range is clamped to the chain's length.
    pub fn verify(&self, range: Range<u64>) -> GateResult<ChainVerification> {
        let end = range.end.min(self.len()?);
        if range.start >= end {
            return Ok(ChainVerification::Intact { checked: 0 });
        }

        let mut verifier = if range.start == 0 {
            ChainVerifier::from_genesis()
        } else {
            let anchor = range.start - 1;
            let entries = self.read_raw(anchor..range.start)?;
            let Some(entry) = entries.first() else {
                return Err(GateError::AuditReadFailed {
                    reason: format!("record {anchor} is missing"),
                });
            };
            match AuditRecord::from_bytes(entry) {
                Ok(record) => ChainVerifier::anchored(range.start, record.digest),
                Err(e) => {
                    return Ok(ChainVerification::Broken(ChainBreak {
                        sequence: anchor,
                        kind: BreakKind::Undecodable(e.to_string()),
                    }));
                }
            }
        };

        let mut position = range.start;
        while position < end {
            let chunk_end = (position + READ_CHUNK).min(end);
            let entries = self.read_raw(position..chunk_end)?;
            if entries.len() as u64 != chunk_end - position {
                return Err(GateError::AuditReadFailed {
                    reason: format!(
                        "expected {} records from {position}, store returned {}",
                        chunk_end - position,
                        entries.len()
                    ),
                });
            }
            for entry in &entries {
                if let Err(b) = verifier.feed(entry) {
                    return Ok(ChainVerification::Broken(b));
                }
            }
            position = chunk_end;
        }

        Ok(verifier.finish())
    }

    /// Give back the store, e.g. to reopen it elsewhere.
    pub fn into_store(self) -> GateResult<S> {
        self.state
            .into_inner()
            .map(|state| state.store)
            .map_err(|_| GateError::Internal {
                reason: "audit chain lock poisoned".to_string(),
            })
    }

    /// Verify the whole chain from genesis.
    pub fn verify_all(&self) -> GateResult<ChainVerification> {
        self.verify(0..u64::MAX)
    }
}

impl<S: AuditStore> AuditWriter for AuditChain<S> {
    fn append(&self, action: &Action, decision: &Decision) -> GateResult<AuditReceipt> {
        let record = self.append_record(action, decision)?;
        Ok(AuditReceipt {
            sequence: record.sequence,
            digest: record.digest,
        })
    }
}

impl<S: AuditStore> std::fmt::Debug for AuditChain<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditChain").finish_non_exhaustive()
    }
}

/// Verify a JSONL audit log on disk without opening it for writing.
pub fn verify_log_file(path: impl AsRef<Path>) -> GateResult<ChainVerification> {
    let entries = JsonlStore::read_entries(path)?;
    Ok(crate::chain::verify_entries(entries.iter().map(Vec::as_slice)))
}
