//! Orchestration helpers - the consumer side of the board.
//!
//! The orchestrator is not a scheduler. It bundles the call patterns an
//! orchestration layer actually uses against the core:
//!
//! - publish assignment records before an assignee begins work
//! - gate a phase on the completion of named dependencies
//! - report aggregate progress for the humans watching the logs
//!
//! Actual execution of the work (code generation, testing, deployment) is
//! an external side effect performed by the agents themselves.

use crate::core::ActionBoard;
use crate::error::MeshResult;
use crate::summary::{StatusAggregator, SummaryOutcome};
use crate::types::ActionRecord;
use crate::waiter::{DependencyWaiter, WaitOutcome};
use futures::future::join_all;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// A work assignment for an agent.
#[derive(Debug, Clone)]
pub struct Assignment {
    /// The agent expected to perform the work.
    pub agent_id: String,
    /// Task type, also used as the action id prefix (e.g. "codegen").
    pub task_type: String,
    /// Human-readable description of the work.
    pub description: String,
}

impl Assignment {
    /// Create an assignment.
    pub fn new(
        agent_id: impl Into<String>,
        task_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            task_type: task_type.into(),
            description: description.into(),
        }
    }
}

/// Outcome of gating a phase on its dependencies.
#[derive(Debug, Clone)]
pub enum GateOutcome {
    /// Every dependency completed; records in the order they were asked for.
    Ready(Vec<ActionRecord>),
    /// A dependency did not finish inside the budget.
    TimedOut {
        /// Owning agent of the dependency that timed out.
        agent_id: String,
        /// Action id of the dependency that timed out.
        action_id: String,
    },
}

impl GateOutcome {
    /// Whether every dependency completed.
    pub fn is_ready(&self) -> bool {
        matches!(self, GateOutcome::Ready(_))
    }
}

/// Thin coordination layer over the board, waiter, and aggregator.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    board: ActionBoard,
    waiter: DependencyWaiter,
    aggregator: StatusAggregator,
}

impl Orchestrator {
    /// Create an orchestrator over a board.
    pub fn new(board: ActionBoard) -> Self {
        let waiter = DependencyWaiter::new(board.clone());
        let aggregator = StatusAggregator::new(board.clone());
        Self {
            board,
            waiter,
            aggregator,
        }
    }

    /// Override the waiter (e.g. to shorten the poll interval).
    pub fn with_waiter(mut self, waiter: DependencyWaiter) -> Self {
        self.waiter = waiter;
        self
    }

    /// The underlying board.
    pub fn board(&self) -> &ActionBoard {
        &self.board
    }

    /// Publish an assignment record for an agent.
    ///
    /// The action id is generated as `"{task_type}-{uuid}"` so repeated
    /// assignments of the same task type never collide. The record starts
    /// `pending`; the assignee moves it forward via `update`/`complete`.
    pub async fn assign(&self, assignment: Assignment) -> MeshResult<ActionRecord> {
        let action_id = format!("{}-{}", assignment.task_type, Uuid::new_v4());

        let record = self
            .board
            .post(
                &assignment.agent_id,
                &action_id,
                json!({
                    "type": assignment.task_type,
                    "description": assignment.description,
                    "assignee": assignment.agent_id,
                    "status": "pending",
                }),
            )
            .await?;

        debug!(
            "assigned {} to {} as {}",
            assignment.task_type, assignment.agent_id, action_id
        );

        Ok(record)
    }

    /// Block until every named dependency completes, under one shared budget.
    ///
    /// Dependencies are waited on concurrently, so the budget applies to
    /// the slowest of them, not to their sum. The first timeout reported
    /// wins; store errors propagate.
    pub async fn await_dependencies(
        &self,
        dependencies: &[(&str, &str)],
        timeout: Duration,
    ) -> MeshResult<GateOutcome> {
        let waits = dependencies
            .iter()
            .map(|(agent_id, action_id)| self.waiter.wait(agent_id, action_id, timeout));

        let mut records = Vec::with_capacity(dependencies.len());
        for ((agent_id, action_id), outcome) in dependencies.iter().zip(join_all(waits).await) {
            match outcome? {
                WaitOutcome::Completed(record) => records.push(record),
                WaitOutcome::TimedOut => {
                    return Ok(GateOutcome::TimedOut {
                        agent_id: agent_id.to_string(),
                        action_id: action_id.to_string(),
                    });
                }
            }
        }

        Ok(GateOutcome::Ready(records))
    }

    /// Summarize the board and report it through the log.
    ///
    /// Returns the outcome so callers can also act on it; the periodic
    /// cadence is the caller's loop, not ours.
    pub async fn log_progress(&self) -> SummaryOutcome {
        let outcome = self.aggregator.summarize().await;

        match &outcome {
            SummaryOutcome::Ready(summary) => {
                info!("{} actions in flight", summary.total_active);
                for (agent_id, activity) in &summary.per_agent {
                    info!(
                        "  {}: {} active, {} completed",
                        agent_id, activity.active, activity.completed
                    );
                }
            }
            SummaryOutcome::Unavailable { reason } => {
                info!("progress summary unavailable: {}", reason);
            }
        }

        outcome
    }
}
