//! # maais-admission
//!
//! Rate-limit admission for the MAAIS action gate.
//!
//! Every action must take one token from the global bucket, its tenant's
//! bucket, and its agent's bucket before policy evaluation runs. Buckets
//! refill continuously. Admission is atomic across the three scopes: either
//! all three are decremented or none is.
//!
//! ```rust,ignore
//! use maais_admission::{AdmissionController, RateLimitConfig};
//!
//! let admission = AdmissionController::new(RateLimitConfig::default())?;
//! // Pass `admission` to `maais_core::Gateway::new(...)`.
//! ```

pub mod bucket;
pub mod config;
pub mod controller;

pub use bucket::{BucketState, TokenBucket};
pub use config::{BucketConfig, RateLimitConfig};
pub use controller::AdmissionController;
