//! The admission controller: one global bucket, one bucket per tenant, and
//! one per (tenant, agent) pair.
//!
//! Admission is all-or-nothing. All three buckets are refilled and checked
//! under a single lock, and tokens are taken only when every bucket has one.
//! A rejection never leaves a partial decrement behind.
//!
//! Tenant and agent buckets are created on first sight. Every
//! `COMPACT_INTERVAL` of admission time, buckets that have refilled
//! completely are dropped, so the maps only hold recently active callers.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use maais_contracts::{
    action::{Action, AgentId, TenantId},
    decision::{AdmissionOutcome, LimitScope},
    error::{GateError, GateResult},
};
use maais_core::traits::AdmissionControl;

use crate::bucket::{BucketState, TokenBucket};
use crate::config::{BucketConfig, RateLimitConfig};

/// How often `admit_at` drops idle, full buckets.
pub const COMPACT_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct Buckets {
    config: RateLimitConfig,
    global: TokenBucket,
    tenants: HashMap<TenantId, TokenBucket>,
    agents: HashMap<(TenantId, AgentId), TokenBucket>,
    last_compact: Instant,
}

impl Buckets {
    fn compact(&mut self, now: Instant) -> usize {
        let before = self.tenants.len() + self.agents.len();
        self.tenants.retain(|_, bucket| {
            bucket.refill(now);
            !bucket.is_full()
        });
        self.agents.retain(|_, bucket| {
            bucket.refill(now);
            !bucket.is_full()
        });
        self.last_compact = now;
        before - (self.tenants.len() + self.agents.len())
    }
}

/// Token-bucket admission across global, tenant, and agent scope.
///
/// Buckets for a tenant or agent are created full on first sight.
#[derive(Debug)]
pub struct AdmissionController {
    state: Mutex<Buckets>,
}

impl AdmissionController {
    /// Build a controller after validating `config`.
    pub fn new(config: RateLimitConfig) -> GateResult<Self> {
        config.validate()?;
        let now = Instant::now();
        Ok(Self {
            state: Mutex::new(Buckets {
                global: TokenBucket::new(config.global, now),
                config,
                tenants: HashMap::new(),
                agents: HashMap::new(),
                last_compact: now,
            }),
        })
    }

    fn lock(&self) -> GateResult<MutexGuard<'_, Buckets>> {
        self.state.lock().map_err(|_| GateError::Internal {
            reason: "admission state lock poisoned".to_string(),
        })
    }

    /// Admit `action` as of `now`.
    ///
    /// Buckets are checked global → tenant → agent; the first empty one is
    /// reported as the rejecting scope.
    pub fn admit_at(&self, action: &Action, now: Instant) -> GateResult<AdmissionOutcome> {
        let mut guard = self.lock()?;
        let due = now
            .checked_duration_since(guard.last_compact)
            .is_some_and(|since| since >= COMPACT_INTERVAL);
        if due {
            let removed = guard.compact(now);
            debug!(removed, "idle admission buckets compacted");
        }

        let Buckets {
            config,
            global,
            tenants,
            agents,
            ..
        } = &mut *guard;

        let tenant_id = &action.tenant_id;
        let agent_id = &action.agent_id;

        global.refill(now);
        let tenant = tenants
            .entry(tenant_id.clone())
            .or_insert_with(|| TokenBucket::new(config.tenant_limits(tenant_id), now));
        tenant.refill(now);
        let agent = agents
            .entry((tenant_id.clone(), agent_id.clone()))
            .or_insert_with(|| TokenBucket::new(config.agent_limits(agent_id), now));
        agent.refill(now);

        let checks = [
            (LimitScope::Global, &*global),
            (LimitScope::Tenant, &*tenant),
            (LimitScope::Agent, &*agent),
        ];
        for (scope, bucket) in checks {
            if !bucket.has_token() {
                let retry_after = bucket.retry_after();
                debug!(
                    action_id = %action.id,
                    tenant_id = %tenant_id,
                    agent_id = %agent_id,
                    scope = %scope,
                    retry_after_ms = retry_after.map(|d| d.as_millis() as u64),
                    "admission rejected"
                );
                return Ok(AdmissionOutcome::Rejected { scope, retry_after });
            }
        }

        global.take();
        tenant.take();
        agent.take();
        Ok(AdmissionOutcome::Admitted)
    }

    /// Current state of the global bucket.
    pub fn global_state(&self) -> GateResult<BucketState> {
        Ok(self.lock()?.global.state())
    }

    /// Current state of a tenant's bucket, if that tenant has been seen.
    pub fn tenant_state(&self, tenant: &TenantId) -> GateResult<Option<BucketState>> {
        Ok(self.lock()?.tenants.get(tenant).map(TokenBucket::state))
    }

    /// Current state of an agent's bucket within a tenant, if seen.
    pub fn agent_state(
        &self,
        tenant: &TenantId,
        agent: &AgentId,
    ) -> GateResult<Option<BucketState>> {
        let key = (tenant.clone(), agent.clone());
        Ok(self.lock()?.agents.get(&key).map(TokenBucket::state))
    }

    /// Override one tenant's limits. An existing bucket keeps its tokens up
    /// to the new capacity.
    pub fn set_tenant_limits(&self, tenant: &TenantId, limits: BucketConfig) -> GateResult<()> {
        limits.validate(&format!("rate_limits.tenants.{tenant}"))?;

        let mut state = self.lock()?;
        state.config.tenants.insert(tenant.0.clone(), limits);
        if let Some(bucket) = state.tenants.get_mut(tenant) {
            bucket.reconfigure(limits);
        }
        info!(
            tenant_id = %tenant,
            capacity = limits.capacity,
            refill_per_sec = limits.refill_per_sec,
            "tenant limits updated"
        );
        Ok(())
    }

    /// Override one agent's limits in every tenant.
    pub fn set_agent_limits(&self, agent: &AgentId, limits: BucketConfig) -> GateResult<()> {
        limits.validate(&format!("rate_limits.agents.{agent}"))?;

        let mut state = self.lock()?;
        state.config.agents.insert(agent.0.clone(), limits);
        for ((_, id), bucket) in state.agents.iter_mut() {
            if id == agent {
                bucket.reconfigure(limits);
            }
        }
        info!(
            agent_id = %agent,
            capacity = limits.capacity,
            refill_per_sec = limits.refill_per_sec,
            "agent limits updated"
        );
        Ok(())
    }

    /// Drop every tenant and agent bucket and refill the global one.
    pub fn reset(&self) -> GateResult<()> {
        let mut state = self.lock()?;
        state.global = TokenBucket::new(state.config.global, Instant::now());
        state.tenants.clear();
        state.agents.clear();
        info!("admission buckets reset");
        Ok(())
    }

    /// Forget tenant and agent buckets that have refilled completely as of
    /// `now`. A forgotten bucket is recreated full, so nothing changes for
    /// callers. Returns how many buckets were removed.
    pub fn compact(&self, now: Instant) -> GateResult<usize> {
        let removed = self.lock()?.compact(now);
        debug!(removed, "idle admission buckets compacted");
        Ok(removed)
    }

    /// Number of tenant and agent buckets currently held.
    pub fn tracked_buckets(&self) -> GateResult<usize> {
        let state = self.lock()?;
        Ok(state.tenants.len() + state.agents.len())
    }
}

impl AdmissionControl for AdmissionController {
    fn admit(&self, action: &Action) -> GateResult<AdmissionOutcome> {
        self.admit_at(action, Instant::now())
    }
}
