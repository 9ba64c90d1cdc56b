//! Storage backends for the audit chain.
//!
//! A store is an append-only sequence of opaque byte entries addressed by
//! position. The chain owns all hashing and ordering; a store only has to
//! keep what it was given, in order.

use std::ops::Range;

use maais_contracts::error::GateResult;

/// Durable, append-only entry storage.
///
/// Always used from inside the chain's critical section, so implementations
/// need no locking of their own.
pub trait AuditStore: Send {
    /// Persist `entry` and return its position. Must not return before the
    /// entry is durable to the store's standard.
    fn append(&mut self, entry: &[u8]) -> GateResult<u64>;

    /// Entries at positions `range`, clamped to what exists.
    fn read(&self, range: Range<u64>) -> GateResult<Vec<Vec<u8>>>;

    /// Number of entries stored.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Keeps entries in a `Vec`. Nothing survives the process.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    pub(crate) entries: Vec<Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AuditStore for MemoryStore {
    fn append(&mut self, entry: &[u8]) -> GateResult<u64> {
        self.entries.push(entry.to_vec());
        Ok(self.entries.len() as u64 - 1)
    }

    fn read(&self, range: Range<u64>) -> GateResult<Vec<Vec<u8>>> {
        let len = self.entries.len();
        let start = usize::try_from(range.start).unwrap_or(len).min(len);
        let end = usize::try_from(range.end).unwrap_or(len).min(len);
        if start >= end {
            return Ok(Vec::new());
        }
        Ok(self.entries[start..end].to_vec())
    }

    fn len(&self) -> u64 {
        self.entries.len() as u64
    }
}
