//! The runtime configuration file.
//!
//! ```toml
//! [gateway]
//! latency_budget_ms = 5
//! confirmation = "block"
//!
//! [rate_limits.agent]
//! capacity = 50
//! refill_per_sec = 20.0
//!
//! [audit]
//! path = "audit.jsonl"
//!
//! [policy]
//! path = "policies/baseline.toml"
//!
//! [policy.tenants]
//! acme = "policies/acme.toml"
//!
//! [alerts]
//! mode = "log"
//! ```
//!
//! Every section is optional. Relative paths are resolved against the
//! directory of the config file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use maais_admission::RateLimitConfig;
use maais_contracts::error::{GateError, GateResult};
use maais_core::GatewayConfig;

/// Where the audit chain is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuditConfig {
    /// JSONL file. In memory when absent.
    pub path: Option<PathBuf>,
    /// `fsync` after every append.
    pub fsync: bool,
}

/// Where rule sets come from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyConfig {
    /// Default rule set. The built-in baseline when absent.
    pub path: Option<PathBuf>,
    /// Tenant-specific rule sets, keyed by tenant id.
    pub tenants: HashMap<String, PathBuf>,
}

/// What happens to alerts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertMode {
    /// Discard.
    None,
    /// Log at `warn`.
    #[default]
    Log,
    /// Queue for a dispatcher; see `Runtime::take_alerts`.
    Channel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AlertConfig {
    pub mode: AlertMode,
    /// Undelivered alerts held before new ones are dropped (`channel` mode).
    pub queue_capacity: usize,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            mode: AlertMode::Log,
            queue_capacity: 1024,
        }
    }
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    pub gateway: GatewayConfig,
    pub rate_limits: RateLimitConfig,
    pub audit: AuditConfig,
    pub policy: PolicyConfig,
    pub alerts: AlertConfig,
}

impl RuntimeConfig {
    /// Parse `s` as TOML. Relative paths are left as written.
    pub fn from_toml_str(s: &str) -> GateResult<Self> {
        let config: RuntimeConfig = toml::from_str(s).map_err(|e| GateError::ConfigError {
            reason: format!("failed to parse runtime config: {e}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read the config at `path` and resolve relative paths against its
    /// directory.
    pub fn from_file(path: &Path) -> GateResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| GateError::ConfigError {
            reason: format!("failed to read runtime config '{}': {e}", path.display()),
        })?;
        let mut config = Self::from_toml_str(&contents)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    /// Check the values serde cannot.
    pub fn validate(&self) -> GateResult<()> {
        self.rate_limits.validate()?;
        if self.alerts.mode == AlertMode::Channel && self.alerts.queue_capacity == 0 {
            return Err(GateError::ConfigError {
                reason: "alerts.queue_capacity must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        if let Some(p) = self.audit.path.as_mut() {
            resolve(p);
        }
        if let Some(p) = self.policy.path.as_mut() {
            resolve(p);
        }
        for p in self.policy.tenants.values_mut() {
            resolve(p);
        }
    }
}
