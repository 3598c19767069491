/// Collaboration status aggregation.
///
/// A read-only observability view over the board: who has work in flight,
/// who has finished what. Monitoring callers poll [`StatusAggregator::summarize`]
/// periodically; it never blocks the agents it is watching and never
/// panics on backend trouble - a store failure degrades to
/// [`SummaryOutcome::Unavailable`] instead.
///
/// The aggregator wraps the Action API rather than reading the store
/// directly: active counts come from `list_active`, while the `completed`
/// column is the board's rolling counter of terminal transitions. That
/// keeps completion totals correct even over backends that evict terminal
/// records.
use crate::core::ActionBoard;
use crate::types::ActionRecord;
use serde::Serialize;
use std::collections::HashMap;
use tracing::warn;

/// Per-agent activity counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AgentActivity {
    /// Records currently in a non-terminal state.
    pub active: usize,
    /// Terminal transitions (completions and failures) observed by this
    /// board instance. Per-process; resets on restart.
    pub completed: u64,
}

/// A point-in-time view of every agent's workload.
#[derive(Debug, Clone, Serialize)]
pub struct CollaborationSummary {
    /// Total non-terminal records across all agents.
    pub total_active: usize,
    /// Activity broken down by owning agent.
    pub per_agent: HashMap<String, AgentActivity>,
}

impl CollaborationSummary {
    /// Activity for one agent, if it has any recorded.
    pub fn agent(&self, agent_id: &str) -> Option<&AgentActivity> {
        self.per_agent.get(agent_id)
    }
}

/// Outcome of a summarize pass.
///
/// Aggregation is best-effort: backend failures produce `Unavailable`
/// rather than an error, so a monitoring loop can log and move on.
#[derive(Debug, Clone)]
pub enum SummaryOutcome {
    /// The summary was computed.
    Ready(CollaborationSummary),
    /// The store could not be read; no summary this round.
    Unavailable {
        /// Why the summary could not be produced.
        reason: String,
    },
}

impl SummaryOutcome {
    /// Whether a summary was produced.
    pub fn is_ready(&self) -> bool {
        matches!(self, SummaryOutcome::Ready(_))
    }

    /// The summary, if one was produced.
    pub fn summary(&self) -> Option<&CollaborationSummary> {
        match self {
            SummaryOutcome::Ready(summary) => Some(summary),
            SummaryOutcome::Unavailable { .. } => None,
        }
    }
}

/// Read-only observability view over an [`ActionBoard`].
#[derive(Debug, Clone)]
pub struct StatusAggregator {
    board: ActionBoard,
}

impl StatusAggregator {
    /// Create an aggregator over a board.
    pub fn new(board: ActionBoard) -> Self {
        Self { board }
    }

    /// Produce a point-in-time collaboration summary.
    ///
    /// # Example
    ///
    /// ```ignore
    /// match aggregator.summarize().await {
    ///     SummaryOutcome::Ready(summary) => {
    ///         println!("{} actions in flight", summary.total_active);
    ///     }
    ///     SummaryOutcome::Unavailable { reason } => {
    ///         eprintln!("no summary this round: {}", reason);
    ///     }
    /// }
    /// ```
    pub async fn summarize(&self) -> SummaryOutcome {
        let active: Vec<ActionRecord> = match self.board.list_active().await {
            Ok(records) => records,
            Err(e) => {
                warn!("summary unavailable: {}", e);
                return SummaryOutcome::Unavailable {
                    reason: e.to_string(),
                };
            }
        };

        let mut per_agent: HashMap<String, AgentActivity> = HashMap::new();

        for record in &active {
            per_agent
                .entry(record.agent_id().to_string())
                .or_default()
                .active += 1;
        }

        for (agent_id, completed) in self.board.completion_counts() {
            per_agent.entry(agent_id).or_default().completed = completed;
        }

        SummaryOutcome::Ready(CollaborationSummary {
            total_active: active.len(),
            per_agent,
        })
    }
}
