//! Rate-limit configuration, usually the `[rate_limits]` table of the
//! runtime config file.
//!
//! ```toml
//! [rate_limits.global]
//! capacity = 200
//! refill_per_sec = 100.0
//!
//! [rate_limits.agent]
//! capacity = 50
//! refill_per_sec = 20.0
//!
//! [rate_limits.tenants."tenant-a"]
//! capacity = 10
//! refill_per_sec = 1.0
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use maais_contracts::{
    action::{AgentId, TenantId},
    error::{GateError, GateResult},
};

/// Size and refill rate of one token bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BucketConfig {
    /// Maximum tokens held, i.e. the largest burst admitted at once.
    pub capacity: u32,
    /// Tokens added per second. `0.0` means the bucket never refills.
    pub refill_per_sec: f64,
}

impl BucketConfig {
    pub const fn new(capacity: u32, refill_per_sec: f64) -> Self {
        Self {
            capacity,
            refill_per_sec,
        }
    }

    /// `name` prefixes the error message, e.g. `rate_limits.global`.
    pub fn validate(&self, name: &str) -> GateResult<()> {
        if self.capacity == 0 {
            return Err(GateError::ConfigError {
                reason: format!("{name}: capacity must be at least 1"),
            });
        }
        if !self.refill_per_sec.is_finite() || self.refill_per_sec < 0.0 {
            return Err(GateError::ConfigError {
                reason: format!(
                    "{name}: refill_per_sec must be a finite, non-negative number (got {})",
                    self.refill_per_sec
                ),
            });
        }
        Ok(())
    }
}

/// Limits for the three bucket scopes, with per-tenant and per-agent
/// overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitConfig {
    /// The single bucket shared by all traffic.
    pub global: BucketConfig,
    /// Default for each tenant's bucket.
    pub tenant: BucketConfig,
    /// Default for each agent's bucket.
    pub agent: BucketConfig,
    /// Tenant-specific limits, keyed by tenant id.
    pub tenants: HashMap<String, BucketConfig>,
    /// Agent-specific limits, keyed by agent id. Applied to that agent in
    /// every tenant.
    pub agents: HashMap<String, BucketConfig>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            global: BucketConfig::new(200, 100.0),
            tenant: BucketConfig::new(100, 50.0),
            agent: BucketConfig::new(50, 20.0),
            tenants: HashMap::new(),
            agents: HashMap::new(),
        }
    }
}

impl RateLimitConfig {
    /// Same limits everywhere and no overrides.
    pub fn uniform(bucket: BucketConfig) -> Self {
        Self {
            global: bucket,
            tenant: bucket,
            agent: bucket,
            tenants: HashMap::new(),
            agents: HashMap::new(),
        }
    }

    /// Reject zero capacities and negative or non-finite refill rates.
    pub fn validate(&self) -> GateResult<()> {
        self.global.validate("rate_limits.global")?;
        self.tenant.validate("rate_limits.tenant")?;
        self.agent.validate("rate_limits.agent")?;
        for (tenant, bucket) in &self.tenants {
            bucket.validate(&format!("rate_limits.tenants.{tenant}"))?;
        }
        for (agent, bucket) in &self.agents {
            bucket.validate(&format!("rate_limits.agents.{agent}"))?;
        }
        Ok(())
    }

    pub fn tenant_limits(&self, tenant: &TenantId) -> BucketConfig {
        self.tenants.get(&tenant.0).copied().unwrap_or(self.tenant)
    }

    pub fn agent_limits(&self, agent: &AgentId) -> BucketConfig {
        self.agents.get(&agent.0).copied().unwrap_or(self.agent)
    }
}
