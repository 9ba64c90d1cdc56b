//! Versioned rule-set snapshots with atomic replacement.
//!
//! Every evaluation clones the current `Arc<PolicySnapshot>` under a short
//! read lock and then works on that snapshot alone, so a reload running in
//! parallel can never hand an evaluation half of an old rule set and half of
//! a new one. Reloads compile the new rules before taking the write lock; a
//! rule set that fails to compile never replaces the active one.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use tracing::{info, warn};

use maais_contracts::{
    action::{Action, TenantId},
    decision::PolicyOutcome,
    error::{GateError, GateResult},
};
use maais_core::traits::PolicyEngine;

use crate::engine::{self, RuleSet};

/// One immutable generation of policy: the default rule set plus any
/// tenant-specific sets.
#[derive(Debug, Clone)]
pub struct PolicySnapshot {
    version: u64,
    default: Arc<RuleSet>,
    tenants: HashMap<TenantId, Arc<RuleSet>>,
}

impl PolicySnapshot {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn default_rules(&self) -> &RuleSet {
        &self.default
    }

    /// The rule set that governs `tenant`: its own set when one is
    /// installed, otherwise the default.
    pub fn rules_for(&self, tenant: &TenantId) -> &RuleSet {
        self.tenants.get(tenant).map_or(&self.default, |rules| rules)
    }

    pub fn tenants(&self) -> impl Iterator<Item = &TenantId> {
        self.tenants.keys()
    }

    /// Evaluate against this snapshot and stamp the outcome with its version.
    pub fn evaluate(&self, action: &Action) -> PolicyOutcome {
        let mut outcome = engine::evaluate(action, self.rules_for(&action.tenant_id));
        outcome.policy_version = Some(self.version);
        outcome
    }
}

/// The live policy, shared by every gateway thread.
#[derive(Debug)]
pub struct PolicyStore {
    current: RwLock<Arc<PolicySnapshot>>,
}

impl PolicyStore {
    /// Start at version 1 with `default` and no tenant overrides.
    pub fn new(default: RuleSet) -> Self {
        Self {
            current: RwLock::new(Arc::new(PolicySnapshot {
                version: 1,
                default: Arc::new(default),
                tenants: HashMap::new(),
            })),
        }
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> GateResult<Arc<PolicySnapshot>> {
        self.current
            .read()
            .map(|guard| Arc::clone(&*guard))
            .map_err(|_| poisoned())
    }

    pub fn version(&self) -> GateResult<u64> {
        Ok(self.snapshot()?.version)
    }

    /// Replace the default rule set. Returns the new version.
    pub fn replace(&self, rules: RuleSet) -> GateResult<u64> {
        let rules = Arc::new(rules);
        self.swap(|prev| PolicySnapshot {
            version: prev.version + 1,
            default: rules,
            tenants: prev.tenants.clone(),
        })
    }

    /// Install or replace the rule set for one tenant. Returns the new
    /// version.
    pub fn replace_tenant(&self, tenant: TenantId, rules: RuleSet) -> GateResult<u64> {
        let rules = Arc::new(rules);
        self.swap(|prev| {
            let mut tenants = prev.tenants.clone();
            tenants.insert(tenant, rules);
            PolicySnapshot {
                version: prev.version + 1,
                default: Arc::clone(&prev.default),
                tenants,
            }
        })
    }

    /// Drop a tenant's own rule set so it falls back to the default.
    pub fn remove_tenant(&self, tenant: &TenantId) -> GateResult<u64> {
        self.swap(|prev| {
            let mut tenants = prev.tenants.clone();
            tenants.remove(tenant);
            PolicySnapshot {
                version: prev.version + 1,
                default: Arc::clone(&prev.default),
                tenants,
            }
        })
    }

    /// Replace the default rule set and every tenant set in one swap.
    /// Tenants not listed fall back to the new default.
    pub fn replace_all(
        &self,
        default: RuleSet,
        tenants: impl IntoIterator<Item = (TenantId, RuleSet)>,
    ) -> GateResult<u64> {
        let default = Arc::new(default);
        let tenants: HashMap<_, _> = tenants
            .into_iter()
            .map(|(tenant, rules)| (tenant, Arc::new(rules)))
            .collect();
        self.swap(|prev| PolicySnapshot {
            version: prev.version + 1,
            default,
            tenants,
        })
    }

    /// Compile `source` and, if it validates, make it the default rule set.
    ///
    /// On error the active snapshot is untouched.
    pub fn reload_from_toml_str(&self, source: &str) -> GateResult<u64> {
        match RuleSet::from_toml_str(source) {
            Ok(rules) => self.replace(rules),
            Err(e) => {
                warn!(error = %e, "policy reload rejected; keeping active rule set");
                Err(e)
            }
        }
    }

    /// Read and compile `path`, then swap it in as the default rule set.
    pub fn reload_from_file(&self, path: &Path) -> GateResult<u64> {
        match RuleSet::from_file(path) {
            Ok(rules) => self.replace(rules),
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "policy reload rejected; keeping active rule set"
                );
                Err(e)
            }
        }
    }

    fn swap(&self, next: impl FnOnce(&PolicySnapshot) -> PolicySnapshot) -> GateResult<u64> {
        let mut guard = self.current.write().map_err(|_| poisoned())?;
        let snapshot = next(guard.as_ref());
        let version = snapshot.version;
        *guard = Arc::new(snapshot);
        drop(guard);

        info!(version, "policy snapshot installed");
        Ok(version)
    }
}

impl Default for PolicyStore {
    fn default() -> Self {
        Self::new(RuleSet::empty())
    }
}

impl PolicyEngine for PolicyStore {
    fn evaluate(&self, action: &Action) -> GateResult<PolicyOutcome> {
        Ok(self.snapshot()?.evaluate(action))
    }
}

fn poisoned() -> GateError {
    GateError::Internal {
        reason: "policy store lock poisoned".to_string(),
    }
}
