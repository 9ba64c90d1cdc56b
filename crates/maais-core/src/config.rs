//! Gateway configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How a `REQUIRE_CONFIRMATION` verdict is enforced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfirmationMode {
    /// The action is held until an external approver resolves it.
    #[default]
    Block,
    /// The action proceeds; the verdict is only recorded and alerted.
    Flag,
}

/// Settings for `Gateway`, usually the `[gateway]` table of the runtime
/// config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    /// Target completion time for one `evaluate_action` call. Exceeding it
    /// is logged and counted, never enforced.
    pub latency_budget_ms: u64,
    /// Enforcement of `REQUIRE_CONFIRMATION`.
    pub confirmation: ConfirmationMode,
}

impl GatewayConfig {
    pub fn latency_budget(&self) -> Duration {
        Duration::from_millis(self.latency_budget_ms)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            latency_budget_ms: 5,
            confirmation: ConfirmationMode::Block,
        }
    }
}
