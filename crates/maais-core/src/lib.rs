//! # maais-core
//!
//! The decision pipeline of the MAAIS action gate.
//!
//! This crate provides:
//! - The seam traits (`AdmissionControl`, `PolicyEngine`, `AuditWriter`, `AlertSink`)
//! - The `Gateway` that runs them in order for every action
//! - Alert sinks for handing non-allow decisions to a dispatcher
//!
//! ## Usage
//!
//! ```rust,ignore
//! use maais_core::{Gateway, GatewayConfig};
//!
//! let gateway = Gateway::new(admission, policy, audit, GatewayConfig::default());
//! let decision = gateway.evaluate_action(&action)?;
//! if decision.permits_execution() {
//!     // run the tool
//! }
//! ```

pub mod alert;
pub mod config;
pub mod gateway;
pub mod traits;

pub use config::{ConfirmationMode, GatewayConfig};
pub use gateway::{Gateway, GatewayStats};
