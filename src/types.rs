/// Common types used throughout taskmesh.
///
/// This module defines the core data structures of the coordination board:
/// the composite key that addresses a record, the well-typed lifecycle
/// status, and the record itself.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// The composite key addressing an action record.
///
/// An action is uniquely identified by the agent that owns it together with
/// an action id the agent chose (action ids are only unique per agent, not
/// globally, unless callers namespace them).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionKey {
    /// The owning agent (producer of the work item)
    pub agent_id: String,
    /// The action id within the agent's namespace
    pub action_id: String,
}

impl ActionKey {
    /// Create a new action key.
    pub fn new(agent_id: impl Into<String>, action_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            action_id: action_id.into(),
        }
    }

    /// Get a canonical string representation.
    ///
    /// Format: "agent_id:action_id"
    pub fn to_canonical_string(&self) -> String {
        format!("{}:{}", self.agent_id, self.action_id)
    }
}

impl std::fmt::Display for ActionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.agent_id, self.action_id)
    }
}

/// Lifecycle status of an action.
///
/// The status also lives inside the record payload as a plain string field
/// (payloads are open JSON objects); this enum is the parsed, well-typed
/// copy used for filtering and terminal-state checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    /// Posted but not yet started.
    Pending,
    /// The owning agent is working on it.
    InProgress,
    /// Finished successfully. Terminal.
    Completed,
    /// Explicitly marked failed. Terminal.
    Failed,
}

impl ActionStatus {
    /// Whether this status is terminal (`Completed` or `Failed`).
    ///
    /// Once a record reaches a terminal status it is immutable: further
    /// writes are rejected with `AlreadyCompleted`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ActionStatus::Completed | ActionStatus::Failed)
    }

    /// Parse a status from its payload string form.
    ///
    /// Returns `None` for unrecognized strings; the board maps that to
    /// `InvalidAction`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ActionStatus::Pending),
            "in_progress" => Some(ActionStatus::InProgress),
            "completed" => Some(ActionStatus::Completed),
            "failed" => Some(ActionStatus::Failed),
            _ => None,
        }
    }

    /// The payload string form of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Pending => "pending",
            ActionStatus::InProgress => "in_progress",
            ActionStatus::Completed => "completed",
            ActionStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single unit of work tracked by the coordination board.
///
/// The payload is the open JSON object the owning agent published (type,
/// description, status, arbitrary result data on completion). It is stored
/// in an `Arc` so records can be cloned cheaply to waiters and aggregators
/// without copying the JSON tree.
///
/// `updated_at` is refreshed on every write and exists for staleness
/// diagnostics only; it carries no ordering guarantee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    /// The composite key addressing this record
    pub key: ActionKey,
    /// The full payload as last written (Arc-wrapped for cheap clones)
    #[serde(
        serialize_with = "serialize_arc_json",
        deserialize_with = "deserialize_arc_json"
    )]
    pub payload: Arc<JsonValue>,
    /// Parsed copy of the payload's status field
    pub status: ActionStatus,
    /// When this record was last written
    pub updated_at: DateTime<Utc>,
}

/// Serialize Arc<JsonValue> as plain JsonValue
fn serialize_arc_json<S>(value: &Arc<JsonValue>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    value.as_ref().serialize(serializer)
}

/// Deserialize JsonValue into Arc<JsonValue>
fn deserialize_arc_json<'de, D>(deserializer: D) -> Result<Arc<JsonValue>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = JsonValue::deserialize(deserializer)?;
    Ok(Arc::new(value))
}

impl ActionRecord {
    /// Create a new record, stamping `updated_at` with the current time.
    pub fn new(key: ActionKey, payload: JsonValue, status: ActionStatus) -> Self {
        Self {
            key,
            payload: Arc::new(payload),
            status,
            updated_at: Utc::now(),
        }
    }

    /// The owning agent's id.
    pub fn agent_id(&self) -> &str {
        &self.key.agent_id
    }

    /// The action id within the agent's namespace.
    pub fn action_id(&self) -> &str {
        &self.key.action_id
    }

    /// The payload as a reference.
    pub fn payload(&self) -> &JsonValue {
        &self.payload
    }

    /// Whether this record has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
