//! `Runtime`: a gateway wired from a `RuntimeConfig`.
//!
//! Owns the shared components (policy store, admission controller, audit
//! chain) so that callers can reload rules, tune limits, and query or verify
//! the audit log while the gateway keeps serving.

use std::ops::Range;
use std::path::Path;
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use maais_admission::AdmissionController;
use maais_audit::{AuditChain, AuditRecord, ChainVerification, JsonlStore, MemoryStore};
use maais_contracts::{
    action::{Action, ActionCategory, TenantId},
    alert::Alert,
    decision::Decision,
    error::{GateError, GateResult},
};
use maais_core::{
    alert::{ChannelAlertSink, NullAlertSink, TracingAlertSink},
    traits::{AlertSink, AuditWriter},
    Gateway, GatewayStats,
};
use maais_policy::{PolicyStore, RuleSet};

use crate::config::{AlertMode, RuntimeConfig};

/// The policy applied when no policy file is configured.
pub const BASELINE_POLICY: &str = include_str!("../policies/baseline.toml");

/// Raw input kept in the audit record of an unparseable submission.
const MAX_RAW_INPUT: usize = 512;

/// The audit chain behind a runtime, in memory or on disk.
#[derive(Debug, Clone)]
pub enum AuditLog {
    Memory(Arc<AuditChain<MemoryStore>>),
    File(Arc<AuditChain<JsonlStore>>),
}

impl AuditLog {
    fn writer(&self) -> Box<dyn AuditWriter> {
        match self {
            AuditLog::Memory(chain) => Box::new(Arc::clone(chain)),
            AuditLog::File(chain) => Box::new(Arc::clone(chain)),
        }
    }

    pub fn len(&self) -> GateResult<u64> {
        match self {
            AuditLog::Memory(chain) => chain.len(),
            AuditLog::File(chain) => chain.len(),
        }
    }

    pub fn is_empty(&self) -> GateResult<bool> {
        Ok(self.len()? == 0)
    }

    pub fn head_digest(&self) -> GateResult<String> {
        match self {
            AuditLog::Memory(chain) => chain.head_digest(),
            AuditLog::File(chain) => chain.head_digest(),
        }
    }

    pub fn read(&self, range: Range<u64>) -> GateResult<Vec<AuditRecord>> {
        match self {
            AuditLog::Memory(chain) => chain.read(range),
            AuditLog::File(chain) => chain.read(range),
        }
    }

    /// The newest `limit` records, newest first.
    pub fn recent(&self, limit: usize) -> GateResult<Vec<AuditRecord>> {
        match self {
            AuditLog::Memory(chain) => chain.recent(limit),
            AuditLog::File(chain) => chain.recent(limit),
        }
    }

    pub fn verify(&self, range: Range<u64>) -> GateResult<ChainVerification> {
        match self {
            AuditLog::Memory(chain) => chain.verify(range),
            AuditLog::File(chain) => chain.verify(range),
        }
    }

    pub fn verify_all(&self) -> GateResult<ChainVerification> {
        self.verify(0..u64::MAX)
    }
}

/// A running action gate.
pub struct Runtime {
    gateway: Gateway,
    policy: Arc<PolicyStore>,
    admission: Arc<AdmissionController>,
    audit: AuditLog,
    alerts: Mutex<Option<Receiver<Alert>>>,
    config: RuntimeConfig,
}

impl Runtime {
    /// Build a runtime, loading rule sets from the configured files.
    pub fn from_config(config: RuntimeConfig) -> GateResult<Self> {
        let default = match &config.policy.path {
            Some(path) => RuleSet::from_file(path)?,
            None => RuleSet::from_toml_str(BASELINE_POLICY)?,
        };
        let runtime = Self::with_rules(config, default)?;

        let mut tenants: Vec<_> = runtime.config.policy.tenants.iter().collect();
        tenants.sort();
        for (tenant, path) in tenants {
            let rules = RuleSet::from_file(path)?;
            runtime
                .policy
                .replace_tenant(TenantId(tenant.clone()), rules)?;
        }
        Ok(runtime)
    }

    /// Build a runtime from the config file at `path`.
    pub fn from_config_file(path: &Path) -> GateResult<Self> {
        Self::from_config(RuntimeConfig::from_file(path)?)
    }

    /// Build a runtime serving `rules` as the default rule set.
    ///
    /// `config.policy` is remembered for `reload_policy` but not read.
    pub fn with_rules(config: RuntimeConfig, rules: RuleSet) -> GateResult<Self> {
        config.validate()?;

        let policy = Arc::new(PolicyStore::new(rules));
        let admission = Arc::new(AdmissionController::new(config.rate_limits.clone())?);
        let audit = match &config.audit.path {
            Some(path) => {
                let store = JsonlStore::open(path)?.with_fsync(config.audit.fsync);
                AuditLog::File(Arc::new(AuditChain::new(store)?))
            }
            None => AuditLog::Memory(Arc::new(AuditChain::in_memory())),
        };

        let mut receiver = None;
        let sink: Box<dyn AlertSink> = match config.alerts.mode {
            AlertMode::None => Box::new(NullAlertSink),
            AlertMode::Log => Box::new(TracingAlertSink),
            AlertMode::Channel => {
                let (sink, rx) = ChannelAlertSink::bounded(config.alerts.queue_capacity);
                receiver = Some(rx);
                Box::new(sink)
            }
        };

        let gateway = Gateway::new(
            Box::new(Arc::clone(&admission)),
            Box::new(Arc::clone(&policy)),
            audit.writer(),
            config.gateway.clone(),
        )
        .with_alerts(sink);

        info!(
            policy_version = policy.version()?,
            audit_records = audit.len()?,
            alerts = ?config.alerts.mode,
            "runtime started"
        );

        Ok(Self {
            gateway,
            policy,
            admission,
            audit,
            alerts: Mutex::new(receiver),
            config,
        })
    }

    /// Decide whether `action` may execute. See `Gateway::evaluate_action`.
    pub fn evaluate_action(&self, action: &Action) -> GateResult<Decision> {
        self.gateway.evaluate_action(action)
    }

    /// Decide on an action submitted as JSON.
    ///
    /// Input that is not a JSON action object is still evaluated, as an
    /// action with no identity, so that it is denied and audited like any
    /// other malformed submission.
    pub fn evaluate_json(&self, input: &str) -> GateResult<Decision> {
        let action = match serde_json::from_str::<Action>(input) {
            Ok(action) => action,
            Err(e) => {
                warn!(error = %e, "unparseable action submission");
                let raw: String = input.chars().take(MAX_RAW_INPUT).collect();
                Action::new("", "", ActionCategory::Unknown, "")
                    .with_param("raw", serde_json::Value::String(raw))
                    .with_param("parse_error", serde_json::Value::String(e.to_string()))
            }
        };
        self.evaluate_action(&action)
    }

    /// Re-read the configured policy files and publish them as one snapshot.
    ///
    /// On any error the serving rules are left untouched.
    pub fn reload_policy(&self) -> GateResult<u64> {
        let default = match &self.config.policy.path {
            Some(path) => RuleSet::from_file(path)?,
            None => RuleSet::from_toml_str(BASELINE_POLICY)?,
        };
        let mut tenants = Vec::with_capacity(self.config.policy.tenants.len());
        for (tenant, path) in &self.config.policy.tenants {
            tenants.push((TenantId(tenant.clone()), RuleSet::from_file(path)?));
        }
        let version = self.policy.replace_all(default, tenants)?;
        info!(version, "policy reloaded from configuration");
        Ok(version)
    }

    /// Take the receiving end of the alert queue (`channel` mode only).
    ///
    /// Returns `None` in other modes or once taken.
    pub fn take_alerts(&self) -> GateResult<Option<Receiver<Alert>>> {
        let mut slot = self.alerts.lock().map_err(|_| GateError::Internal {
            reason: "alert receiver lock poisoned".to_string(),
        })?;
        Ok(slot.take())
    }

    pub fn policy(&self) -> &Arc<PolicyStore> {
        &self.policy
    }

    pub fn admission(&self) -> &Arc<AdmissionController> {
        &self.admission
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn stats(&self) -> GatewayStats {
        self.gateway.stats()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("audit", &self.audit)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
