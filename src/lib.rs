//! # taskmesh — Shared Task Coordination Store
//!
//! taskmesh lets several independent automation agents (code generation,
//! review, testing, deployment...) advertise work items, track their
//! progress, and block on one another's completion - without a central
//! in-process scheduler:
//!
//! - **Post, update, complete** - any agent publishes its work as records
//! - **Dependency waits** - any agent blocks until a named action finishes,
//!   subject to a timeout
//! - **Last-write-wins** - per-key overwrite semantics, no merge, no consensus
//! - **Pluggable backend** - an injected store handle, with an in-process
//!   reference implementation included
//!
//! ## Quick Start
//!
//! ```ignore
//! use taskmesh::{ActionBoard, DependencyWaiter, MemoryStore, WaitOutcome};
//! use serde_json::json;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let board = ActionBoard::new(Arc::new(MemoryStore::new()));
//!
//!     // Agent A publishes a work item
//!     board.post("agent-a", "build-1", json!({
//!         "type": "build",
//!         "status": "in_progress",
//!     })).await?;
//!
//!     // Agent B blocks on it (from another task)
//!     let waiter = DependencyWaiter::new(board.clone());
//!     let handle = tokio::spawn({
//!         let waiter = waiter.clone();
//!         async move { waiter.wait("agent-a", "build-1", Duration::from_secs(5)).await }
//!     });
//!
//!     // Agent A finishes
//!     board.complete("agent-a", "build-1", json!({"success": true})).await?;
//!
//!     match handle.await?? {
//!         WaitOutcome::Completed(record) => {
//!             println!("build done: {}", record.payload()["success"]);
//!         }
//!         WaitOutcome::TimedOut => println!("proceeding without the build"),
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! taskmesh is built in four layers:
//!
//! 1. **Record Store** (`storage`) - key-value records addressed by
//!    `(agent_id, action_id)`, behind an injected trait
//! 2. **Action Board** (`core`) - the lifecycle rules: one-way completion,
//!    typed failures, read retries
//! 3. **Dependency Waiter** (`waiter`) - poll-until-terminal with timeout
//!    and cancellation
//! 4. **Status Aggregator** (`summary`) - best-effort per-agent counts for
//!    monitoring callers
//!
//! An event bus (`events`) broadcasts change notifications, and a thin
//! orchestration layer (`orchestrator`) shows the intended consumer call
//! patterns. The `persistence` module round-trips the in-process store to
//! disk across restarts.
//!
//! ## Concurrency model
//!
//! Every agent runs as an independent task calling into the board
//! concurrently. The store serializes writes per key (last-write-wins);
//! only `wait` blocks, and only by polling. Ownership of keys is
//! cooperative: any agent may read any key, but by convention only the
//! owning agent writes its own. Nothing enforces that - this is a
//! cooperative, not adversarial, multi-writer system.
//!
//! ## Thread Safety
//!
//! All taskmesh handles are thread-safe. Clone an `ActionBoard` cheaply
//! and share it across tasks:
//!
//! ```ignore
//! let board = ActionBoard::new(Arc::new(MemoryStore::new()));
//! let board_clone = board.clone(); // Cheap clone (Arc internally)
//!
//! tokio::spawn(async move {
//!     board_clone.post("agent", "job-1", json!({"type": "build"})).await
//! });
//! ```

// Internal modules
mod core;
mod error;
mod types;

// Storage seam (public so adapters can implement RecordStore)
pub mod storage;

// Dependency waiting
pub mod waiter;

// Observability
pub mod events;
pub mod summary;

// Consumer-side helpers
pub mod orchestrator;

// Snapshot persistence for the in-process store
pub mod persistence;

// Public API exports
pub use crate::core::{ActionBoard, RetryPolicy};
pub use error::{MeshError, MeshResult};
pub use storage::{MemoryStore, RecordStore};
pub use types::{ActionKey, ActionRecord, ActionStatus};
pub use waiter::{DependencyWaiter, WaitOutcome, DEFAULT_POLL_INTERVAL};

// Observability exports
pub use events::{ActionEvent, ActionEventKind, EventBus, WatchFilter, WatchId, WatchInfo};
pub use summary::{AgentActivity, CollaborationSummary, StatusAggregator, SummaryOutcome};

// Orchestration exports
pub use orchestrator::{Assignment, GateOutcome, Orchestrator};

// Re-export commonly used external types for convenience
pub use chrono::{DateTime, Utc};
pub use serde_json::{json, Value as JsonValue};

/// Prelude module for convenient imports.
///
/// Import everything you need with:
/// ```ignore
/// use taskmesh::prelude::*;
/// ```
pub mod prelude {
    pub use crate::core::{ActionBoard, RetryPolicy};
    pub use crate::error::{MeshError, MeshResult};
    pub use crate::storage::{MemoryStore, RecordStore};
    pub use crate::types::{ActionKey, ActionRecord, ActionStatus};
    pub use crate::waiter::{DependencyWaiter, WaitOutcome};
    pub use chrono::{DateTime, Utc};
    pub use serde_json::{json, Value as JsonValue};

    // Observability types
    pub use crate::events::{ActionEvent, ActionEventKind, EventBus, WatchFilter};
    pub use crate::summary::{
        AgentActivity, CollaborationSummary, StatusAggregator, SummaryOutcome,
    };

    // Orchestration types
    pub use crate::orchestrator::{Assignment, GateOutcome, Orchestrator};
}
