/// Blocking on another agent's work.
///
/// The dependency waiter lets a caller park until an action produced by a
/// (possibly different) agent reaches a terminal state, or a timeout
/// elapses. It polls [`ActionBoard::get_status`] on a fixed interval: the
/// backing store is not assumed to offer any push channel, so polling is
/// the portable baseline. Consumers that want push-style notification can
/// watch the board's event bus instead; the timeout and fan-out contracts
/// here hold either way.
///
/// Timing out is a normal outcome, not an error: the caller decides
/// whether to retry, escalate, or proceed without the dependency.
///
/// # Cancellation
///
/// The future returned by [`DependencyWaiter::wait`] is cancel-safe.
/// Dropping it - typically via `tokio::select!` against a shutdown signal -
/// stops the polling loop immediately and leaves no side effects on the
/// store.
///
/// # Fan-out
///
/// Any number of waiters may poll the same key concurrently; every one of
/// them independently observes the terminal record. There is no
/// first-observer-wins consumption.
use crate::core::ActionBoard;
use crate::error::{MeshError, MeshResult};
use crate::types::ActionRecord;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// How often [`DependencyWaiter::wait`] polls by default.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Outcome of a dependency wait.
#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome {
    /// The action reached a terminal state before the deadline.
    Completed(ActionRecord),
    /// The timeout budget elapsed first.
    TimedOut,
}

impl WaitOutcome {
    /// Whether the wait ran out of budget.
    pub fn is_timed_out(&self) -> bool {
        matches!(self, WaitOutcome::TimedOut)
    }

    /// The terminal record, if the wait completed.
    pub fn record(&self) -> Option<&ActionRecord> {
        match self {
            WaitOutcome::Completed(record) => Some(record),
            WaitOutcome::TimedOut => None,
        }
    }

    /// Consume the outcome, yielding the terminal record if any.
    pub fn into_record(self) -> Option<ActionRecord> {
        match self {
            WaitOutcome::Completed(record) => Some(record),
            WaitOutcome::TimedOut => None,
        }
    }
}

/// Polls the board until a named action reaches a terminal state.
#[derive(Debug, Clone)]
pub struct DependencyWaiter {
    board: ActionBoard,
    poll_interval: Duration,
}

impl DependencyWaiter {
    /// Create a waiter over a board with the default poll interval.
    pub fn new(board: ActionBoard) -> Self {
        Self {
            board,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the poll interval.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// The configured poll interval.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Block (by polling) until the action is terminal or `timeout` elapses.
    ///
    /// The key is checked immediately, then on every poll tick. A key that
    /// has not been posted yet keeps the wait alive - the producer may
    /// simply not have published it. A store failure that survives the
    /// board's read retries is surfaced as an error; transient blips are
    /// absorbed by the retry policy underneath.
    ///
    /// Returns within `timeout + poll_interval` of wall-clock time.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let waiter = DependencyWaiter::new(board.clone());
    ///
    /// match waiter.wait("builder", "compile-1", Duration::from_secs(5)).await? {
    ///     WaitOutcome::Completed(record) => println!("done: {:?}", record.payload()),
    ///     WaitOutcome::TimedOut => println!("build still running, proceeding without it"),
    /// }
    /// ```
    pub async fn wait(
        &self,
        agent_id: &str,
        action_id: &str,
        timeout: Duration,
    ) -> MeshResult<WaitOutcome> {
        let deadline = Instant::now() + timeout;

        loop {
            match self.board.get_status(agent_id, action_id).await {
                Ok(record) if record.is_terminal() => {
                    trace!("dependency {}:{} is terminal", agent_id, action_id);
                    return Ok(WaitOutcome::Completed(record));
                }
                Ok(record) => {
                    trace!(
                        "dependency {}:{} still {}, polling",
                        agent_id, action_id, record.status
                    );
                }
                Err(MeshError::NotFound { .. }) => {
                    trace!("dependency {}:{} not posted yet, polling", agent_id, action_id);
                }
                Err(e) => return Err(e),
            }

            let now = Instant::now();
            if now >= deadline {
                debug!(
                    "dependency wait for {}:{} timed out after {:?}",
                    agent_id, action_id, timeout
                );
                return Ok(WaitOutcome::TimedOut);
            }

            // Never sleep past the deadline: the final poll happens at most
            // one interval after the budget elapses.
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}
