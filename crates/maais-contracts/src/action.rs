//! The canonical representation of an attempted agent action.
//!
//! An `Action` is built by an adapter (tool wrapper, HTTP proxy, DB proxy)
//! and handed to the gateway exactly once. The gateway never mutates it; the
//! same value is evaluated, audited, and echoed back in alerts.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GateError, GateResult};

/// Parameter mapping carried by an action.
///
/// Values are structurally arbitrary (strings, numbers, nested objects,
/// arrays). `serde_json::Value` is the tagged-value tree the rule matcher
/// walks; object keys are kept sorted, so serialization is canonical.
pub type Parameters = serde_json::Map<String, serde_json::Value>;

/// Identifier of the agent that attempted the action.
///
/// Identity is assumed to be pre-validated by whoever submits the action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub String);

/// Identifier of the tenant the agent runs under.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub String);

/// Unique identifier for one submitted action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(pub uuid::Uuid);

impl ActionId {
    /// Create a new, random action ID.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ActionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The fixed set of action categories the gate understands.
///
/// Categories are written kebab-case (`"network-request"`); the snake_case
/// spelling used by older adapters (`"network_request"`) is accepted on input.
/// Anything else deserializes to `Unknown`, which the gateway rejects as
/// malformed input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionCategory {
    #[serde(alias = "tool_call")]
    ToolCall,
    #[serde(alias = "api_call")]
    ApiCall,
    #[serde(alias = "network_request")]
    NetworkRequest,
    #[serde(alias = "database_query")]
    DatabaseQuery,
    #[serde(alias = "file_operation")]
    FileOperation,
    #[serde(alias = "file_write")]
    FileWrite,
    #[serde(alias = "memory_read")]
    MemoryRead,
    #[serde(alias = "memory_write")]
    MemoryWrite,
    /// Unrecognized or missing category.
    #[default]
    #[serde(other)]
    Unknown,
}

impl ActionCategory {
    /// Every category a rule may name, in declaration order.
    pub const KNOWN: [ActionCategory; 8] = [
        ActionCategory::ToolCall,
        ActionCategory::ApiCall,
        ActionCategory::NetworkRequest,
        ActionCategory::DatabaseQuery,
        ActionCategory::FileOperation,
        ActionCategory::FileWrite,
        ActionCategory::MemoryRead,
        ActionCategory::MemoryWrite,
    ];

    /// The canonical kebab-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            ActionCategory::ToolCall => "tool-call",
            ActionCategory::ApiCall => "api-call",
            ActionCategory::NetworkRequest => "network-request",
            ActionCategory::DatabaseQuery => "database-query",
            ActionCategory::FileOperation => "file-operation",
            ActionCategory::FileWrite => "file-write",
            ActionCategory::MemoryRead => "memory-read",
            ActionCategory::MemoryWrite => "memory-write",
            ActionCategory::Unknown => "unknown",
        }
    }

    /// Parse a category name, accepting either `-` or `_` as separator.
    ///
    /// Returns `None` for unrecognized names; `"unknown"` is not parseable
    /// because no rule may target malformed input.
    pub fn parse(name: &str) -> Option<Self> {
        let normalized = name.trim().to_ascii_lowercase().replace('_', "-");
        Self::KNOWN
            .into_iter()
            .find(|category| category.as_str() == normalized)
    }
}

impl fmt::Display for ActionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One operation an agent attempted.
///
/// Missing identity fields deserialize to empty values rather than failing,
/// so that a malformed submission still reaches the gateway, gets denied,
/// and leaves an audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Unique identifier of this attempt.
    #[serde(default)]
    pub id: ActionId,
    /// Agent that attempted the action.
    #[serde(default)]
    pub agent_id: AgentId,
    /// Tenant the agent belongs to.
    #[serde(default)]
    pub tenant_id: TenantId,
    /// What kind of operation this is.
    #[serde(default)]
    pub category: ActionCategory,
    /// The specific operation, e.g. `"http_request"` or `"users.select"`.
    #[serde(default)]
    pub target: String,
    /// Arbitrary, possibly nested, parameters.
    #[serde(default)]
    pub parameters: Parameters,
    /// The agent's stated justification. Advisory only; never evaluated.
    #[serde(default)]
    pub declared_goal: String,
    /// When the adapter submitted the action.
    #[serde(default = "Utc::now")]
    pub submitted_at: DateTime<Utc>,
}

impl Action {
    /// Start building an action with a fresh ID and the current time.
    pub fn new(
        agent_id: impl Into<String>,
        tenant_id: impl Into<String>,
        category: ActionCategory,
        target: impl Into<String>,
    ) -> Self {
        Self {
            id: ActionId::new(),
            agent_id: AgentId(agent_id.into()),
            tenant_id: TenantId(tenant_id.into()),
            category,
            target: target.into(),
            parameters: Parameters::new(),
            declared_goal: String::new(),
            submitted_at: Utc::now(),
        }
    }

    /// Set one parameter.
    pub fn with_param(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }

    /// Replace all parameters with the members of a JSON object.
    ///
    /// Non-object values are stored under the single key `"value"`.
    pub fn with_parameters(mut self, value: serde_json::Value) -> Self {
        self.parameters = match value {
            serde_json::Value::Object(map) => map,
            other => {
                let mut map = Parameters::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        self
    }

    /// Set the declared goal.
    pub fn with_goal(mut self, goal: impl Into<String>) -> Self {
        self.declared_goal = goal.into();
        self
    }

    /// Check the required fields before the action enters evaluation.
    ///
    /// Returns `GateError::MalformedAction` naming the first missing or
    /// invalid field.
    pub fn validate(&self) -> GateResult<()> {
        let missing = if self.agent_id.0.trim().is_empty() {
            Some("agent_id is empty")
        } else if self.tenant_id.0.trim().is_empty() {
            Some("tenant_id is empty")
        } else if self.target.trim().is_empty() {
            Some("target is empty")
        } else if self.category == ActionCategory::Unknown {
            Some("category is missing or not recognized")
        } else {
            None
        };

        match missing {
            Some(reason) => Err(GateError::MalformedAction {
                reason: reason.to_string(),
            }),
            None => Ok(()),
        }
    }
}
