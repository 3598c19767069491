/// Error types for taskmesh operations.
///
/// This module provides the error taxonomy for the coordination board. All
/// errors are well-typed and can be pattern-matched for precise handling:
/// callers distinguish a missing record from a completed one from a failing
/// backend without string inspection.
///
/// Two conditions are deliberately NOT errors and never appear here: a
/// dependency wait that runs out of budget (`WaitOutcome::TimedOut`) and a
/// summary that cannot be produced (`SummaryOutcome::Unavailable`). Both are
/// normal outcomes the caller must handle explicitly.
use thiserror::Error;

/// The main error type for taskmesh operations.
///
/// All fallible operations in taskmesh return `Result<T, MeshError>`.
/// This provides a unified error handling interface across the entire API.
#[derive(Error, Debug)]
pub enum MeshError {
    /// No record exists for the `(agent_id, action_id)` key.
    #[error("Action '{action_id}' not found for agent '{agent_id}'")]
    NotFound {
        /// The agent that owns the key
        agent_id: String,
        /// The action that was not found
        action_id: String,
    },

    /// A mutation was attempted on a record that already reached a terminal
    /// state. Completion is a one-way transition; callers that need to redo
    /// work must use a new action id.
    #[error("Action '{action_id}' for agent '{agent_id}' is already terminal")]
    AlreadyCompleted {
        /// The agent that owns the key
        agent_id: String,
        /// The action that is already terminal
        action_id: String,
    },

    /// Malformed input to `post`/`update`: empty ids, a non-object payload,
    /// or required fields missing. Rejected before any store I/O.
    #[error("Invalid action: {reason}")]
    InvalidAction {
        /// Description of what was malformed
        reason: String,
    },

    /// Transport or backend failure from the record store.
    #[error("Store error: {reason}")]
    Store {
        /// Description of the underlying failure
        reason: String,
    },

    /// Serialization error when converting data to/from JSON
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MeshError {
    /// Construct a `NotFound` error for a key.
    pub fn not_found(agent_id: impl Into<String>, action_id: impl Into<String>) -> Self {
        Self::NotFound {
            agent_id: agent_id.into(),
            action_id: action_id.into(),
        }
    }

    /// Construct an `AlreadyCompleted` error for a key.
    pub fn already_completed(agent_id: impl Into<String>, action_id: impl Into<String>) -> Self {
        Self::AlreadyCompleted {
            agent_id: agent_id.into(),
            action_id: action_id.into(),
        }
    }

    /// Construct an `InvalidAction` error with a reason.
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidAction {
            reason: reason.into(),
        }
    }

    /// Construct a `Store` error with a reason.
    pub fn store(reason: impl Into<String>) -> Self {
        Self::Store {
            reason: reason.into(),
        }
    }
}

/// Result type alias for taskmesh operations.
///
/// This is a convenience alias for `Result<T, MeshError>` that makes
/// function signatures more concise throughout the codebase.
pub type MeshResult<T> = Result<T, MeshError>;
