//! # maais-audit
//!
//! Immutable, append-only, SHA-256 hash-chained audit trail for the MAAIS
//! action gate.
//!
//! ## Overview
//!
//! Every decision the gateway makes is wrapped in an `AuditRecord` that
//! links to the previous record via its digest. Tampering with any record,
//! even a single byte of a nested parameter, breaks the chain, and
//! verification reports the first broken record.
//!
//! Records are kept in an `AuditStore`: `MemoryStore` for tests and
//! short-lived runs, `JsonlStore` for a durable JSONL file.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use maais_audit::AuditChain;
//!
//! let chain = AuditChain::open_file("audit.jsonl")?;
//! // Pass `chain` to `maais_core::Gateway::new(...)`.
//!
//! assert!(chain.verify_all()?.is_intact());
//! ```

pub mod chain;
pub mod file;
pub mod record;
pub mod store;
pub mod writer;

pub use chain::{compute_digest, verify_entries, BreakKind, ChainBreak, ChainVerification};
pub use file::JsonlStore;
pub use record::{AuditRecord, GENESIS_DIGEST};
pub use store::{AuditStore, MemoryStore};
pub use writer::{verify_log_file, AuditChain};

// ── Tests ─────────────────────────────────────────────────────────────────────
