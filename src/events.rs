/// Change notifications for the coordination board.
///
/// Every successful write through the board emits an [`ActionEvent`] on its
/// [`EventBus`]. Watches can be scoped:
///
/// - **Agent-level**: every change to actions owned by one agent
/// - **Key-level**: changes to a specific `(agent, action)` pair
/// - **Kind-filtered**: only completions, only posts, and so on
///
/// Delivery is best-effort over a bounded broadcast channel: a slow
/// consumer loses old events rather than backpressuring writers.
/// Correctness never depends on event delivery - the dependency waiter
/// polls the store and works with no watch registered at all.
///
/// # Example
///
/// ```ignore
/// use taskmesh::events::{EventBus, WatchFilter};
///
/// let (id, mut rx) = bus.watch(WatchFilter::agent("builder"));
///
/// // In an async context:
/// while let Ok(event) = rx.recv().await {
///     println!("{} {}: {:?}", event.agent_id, event.action_id, event.kind);
/// }
/// ```
use crate::error::{MeshError, MeshResult};
use crate::types::{ActionKey, ActionRecord};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

/// Default channel capacity for watch broadcasts.
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Unique identifier for a watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WatchId(pub u64);

impl std::fmt::Display for WatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "watch-{}", self.0)
    }
}

/// What kind of write produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionEventKind {
    /// A record was created via `post`.
    Posted,
    /// A record was overwritten via `update`.
    Updated,
    /// A record reached `completed`.
    Completed,
    /// A record was explicitly marked `failed`.
    Failed,
    /// A record was removed via `delete`.
    Deleted,
}

/// A change notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionEvent {
    /// What happened.
    pub kind: ActionEventKind,
    /// The owning agent.
    pub agent_id: String,
    /// The affected action.
    pub action_id: String,
    /// The payload after the write (None for deletes).
    pub payload: Option<JsonValue>,
    /// When the write happened.
    pub timestamp: DateTime<Utc>,
}

impl ActionEvent {
    fn from_record(kind: ActionEventKind, record: &ActionRecord) -> Self {
        Self {
            kind,
            agent_id: record.key.agent_id.clone(),
            action_id: record.key.action_id.clone(),
            payload: Some(record.payload().clone()),
            timestamp: record.updated_at,
        }
    }

    /// Event for a freshly posted record.
    pub fn posted(record: &ActionRecord) -> Self {
        Self::from_record(ActionEventKind::Posted, record)
    }

    /// Event for an overwritten record.
    pub fn updated(record: &ActionRecord) -> Self {
        Self::from_record(ActionEventKind::Updated, record)
    }

    /// Event for a completed record.
    pub fn completed(record: &ActionRecord) -> Self {
        Self::from_record(ActionEventKind::Completed, record)
    }

    /// Event for a record explicitly marked failed.
    pub fn failed(record: &ActionRecord) -> Self {
        Self::from_record(ActionEventKind::Failed, record)
    }

    /// Event for a deleted record.
    pub fn deleted(key: &ActionKey) -> Self {
        Self {
            kind: ActionEventKind::Deleted,
            agent_id: key.agent_id.clone(),
            action_id: key.action_id.clone(),
            payload: None,
            timestamp: Utc::now(),
        }
    }
}

/// Scope of a watch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchFilter {
    /// Optional agent filter (None = all agents).
    pub agent_id: Option<String>,
    /// Optional action filter (None = all actions).
    pub action_id: Option<String>,
    /// Event kinds to receive.
    pub kinds: Vec<ActionEventKind>,
    /// Human-readable name for this watch.
    pub name: Option<String>,
}

impl WatchFilter {
    fn every_kind() -> Vec<ActionEventKind> {
        vec![
            ActionEventKind::Posted,
            ActionEventKind::Updated,
            ActionEventKind::Completed,
            ActionEventKind::Failed,
            ActionEventKind::Deleted,
        ]
    }

    /// Match every change on the board.
    pub fn all() -> Self {
        Self {
            agent_id: None,
            action_id: None,
            kinds: Self::every_kind(),
            name: None,
        }
    }

    /// Match every change to actions owned by one agent.
    pub fn agent(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: Some(agent_id.into()),
            action_id: None,
            kinds: Self::every_kind(),
            name: None,
        }
    }

    /// Match changes to a specific `(agent, action)` pair.
    pub fn action(agent_id: impl Into<String>, action_id: impl Into<String>) -> Self {
        Self {
            agent_id: Some(agent_id.into()),
            action_id: Some(action_id.into()),
            kinds: Self::every_kind(),
            name: None,
        }
    }

    /// Restrict to specific event kinds.
    pub fn with_kinds(mut self, kinds: Vec<ActionEventKind>) -> Self {
        self.kinds = kinds;
        self
    }

    /// Only terminal transitions (completions and failures).
    pub fn terminal_only(mut self) -> Self {
        self.kinds = vec![ActionEventKind::Completed, ActionEventKind::Failed];
        self
    }

    /// Set a name for this watch.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Check whether this filter matches an event.
    pub fn matches(&self, event: &ActionEvent) -> bool {
        if !self.kinds.contains(&event.kind) {
            return false;
        }

        if let Some(ref agent_id) = self.agent_id {
            if &event.agent_id != agent_id {
                return false;
            }
        }

        if let Some(ref action_id) = self.action_id {
            if &event.action_id != action_id {
                return false;
            }
        }

        true
    }
}

/// Information about an active watch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchInfo {
    /// The watch id.
    pub id: WatchId,
    /// The watch filter.
    pub filter: WatchFilter,
    /// When this watch was registered.
    pub created_at: DateTime<Utc>,
    /// Number of events delivered so far.
    pub events_delivered: u64,
}

/// Internal watch state.
struct WatchState {
    filter: WatchFilter,
    sender: broadcast::Sender<ActionEvent>,
    created_at: DateTime<Utc>,
    events_delivered: AtomicU64,
}

/// Dispatches board change events to registered watches.
pub struct EventBus {
    watches: DashMap<WatchId, WatchState>,
    next_id: AtomicU64,
    channel_capacity: usize,
}

impl EventBus {
    /// Create a new event bus.
    pub fn new() -> Self {
        Self {
            watches: DashMap::new(),
            next_id: AtomicU64::new(1),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Create a new event bus with a custom channel capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            watches: DashMap::new(),
            next_id: AtomicU64::new(1),
            channel_capacity: capacity,
        }
    }

    /// Register a watch.
    ///
    /// Returns the watch id and a receiver for matching events.
    pub fn watch(&self, filter: WatchFilter) -> (WatchId, broadcast::Receiver<ActionEvent>) {
        let id = WatchId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = broadcast::channel(self.channel_capacity);

        let state = WatchState {
            filter,
            sender,
            created_at: Utc::now(),
            events_delivered: AtomicU64::new(0),
        };

        self.watches.insert(id, state);

        (id, receiver)
    }

    /// Get an additional receiver for an existing watch.
    ///
    /// This allows multiple consumers to receive the same events.
    pub fn receiver(&self, id: WatchId) -> Option<broadcast::Receiver<ActionEvent>> {
        self.watches.get(&id).map(|state| state.sender.subscribe())
    }

    /// Remove a watch.
    pub fn unwatch(&self, id: WatchId) -> MeshResult<()> {
        self.watches
            .remove(&id)
            .ok_or_else(|| MeshError::store(format!("Watch {} not found", id)))?;
        Ok(())
    }

    /// Get information about a watch.
    pub fn watch_info(&self, id: WatchId) -> Option<WatchInfo> {
        self.watches.get(&id).map(|state| WatchInfo {
            id,
            filter: state.filter.clone(),
            created_at: state.created_at,
            events_delivered: state.events_delivered.load(Ordering::Relaxed),
        })
    }

    /// List all active watches.
    pub fn list_watches(&self) -> Vec<WatchInfo> {
        self.watches
            .iter()
            .map(|entry| WatchInfo {
                id: *entry.key(),
                filter: entry.value().filter.clone(),
                created_at: entry.value().created_at,
                events_delivered: entry.value().events_delivered.load(Ordering::Relaxed),
            })
            .collect()
    }

    /// Number of active watches.
    pub fn watch_count(&self) -> usize {
        self.watches.len()
    }

    /// Dispatch an event to every matching watch.
    ///
    /// Called by the board after each successful write. Send failures
    /// (receiver dropped) are ignored.
    pub fn notify(&self, event: ActionEvent) {
        for entry in self.watches.iter() {
            let state = entry.value();
            if state.filter.matches(&event) {
                if state.sender.send(event.clone()).is_ok() {
                    state.events_delivered.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActionStatus;
    use serde_json::json;
    use std::time::Duration;

    fn record(agent: &str, action: &str) -> ActionRecord {
        ActionRecord::new(
            ActionKey::new(agent, action),
            json!({"type": "build", "status": "pending"}),
            ActionStatus::Pending,
        )
    }

    #[test]
    fn test_filter_all() {
        let filter = WatchFilter::all();

        assert!(filter.matches(&ActionEvent::posted(&record("builder", "a1"))));
        assert!(filter.matches(&ActionEvent::deleted(&ActionKey::new("tester", "t1"))));
    }

    #[test]
    fn test_filter_agent() {
        let filter = WatchFilter::agent("builder");

        assert!(filter.matches(&ActionEvent::posted(&record("builder", "a1"))));
        assert!(!filter.matches(&ActionEvent::posted(&record("tester", "t1"))));
    }

    #[test]
    fn test_filter_action() {
        let filter = WatchFilter::action("builder", "a1");

        assert!(filter.matches(&ActionEvent::posted(&record("builder", "a1"))));
        assert!(!filter.matches(&ActionEvent::posted(&record("builder", "a2"))));
    }

    #[test]
    fn test_filter_terminal_only() {
        let filter = WatchFilter::agent("builder").terminal_only();
        let rec = record("builder", "a1");

        assert!(!filter.matches(&ActionEvent::posted(&rec)));
        assert!(!filter.matches(&ActionEvent::updated(&rec)));
        assert!(filter.matches(&ActionEvent::completed(&rec)));
        assert!(filter.matches(&ActionEvent::failed(&rec)));
    }

    #[tokio::test]
    async fn test_bus_delivers_matching_events() {
        let bus = EventBus::new();
        let (id, mut rx) = bus.watch(WatchFilter::agent("builder"));

        bus.notify(ActionEvent::posted(&record("builder", "a1")));

        tokio::select! {
            event = rx.recv() => {
                let event = event.unwrap();
                assert_eq!(event.agent_id, "builder");
                assert_eq!(event.action_id, "a1");
                assert_eq!(event.kind, ActionEventKind::Posted);
            }
            _ = tokio::time::sleep(Duration::from_millis(100)) => {
                panic!("Should have received event");
            }
        }

        bus.unwatch(id).unwrap();
        assert_eq!(bus.watch_count(), 0);
    }

    #[tokio::test]
    async fn test_bus_skips_non_matching_events() {
        let bus = EventBus::new();
        let (_id, mut rx) = bus.watch(WatchFilter::agent("builder"));

        bus.notify(ActionEvent::posted(&record("tester", "t1")));
        bus.notify(ActionEvent::posted(&record("builder", "a1")));

        // Only the builder event arrives.
        let event = rx.try_recv().unwrap();
        assert_eq!(event.agent_id, "builder");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_multiple_watchers_fan_out() {
        let bus = EventBus::new();

        let (_id1, mut rx1) = bus.watch(WatchFilter::all());
        let (_id2, mut rx2) = bus.watch(WatchFilter::all());

        bus.notify(ActionEvent::posted(&record("builder", "a1")));

        assert_eq!(rx1.try_recv().unwrap().action_id, "a1");
        assert_eq!(rx2.try_recv().unwrap().action_id, "a1");
    }

    #[test]
    fn test_watch_info_and_counters() {
        let bus = EventBus::new();
        let (id, _rx) = bus.watch(WatchFilter::agent("builder").with_name("build_watcher"));

        for i in 0..5 {
            bus.notify(ActionEvent::posted(&record("builder", &format!("a{}", i))));
        }

        let info = bus.watch_info(id).unwrap();
        assert_eq!(info.id, id);
        assert_eq!(info.filter.name, Some("build_watcher".to_string()));
        assert_eq!(info.events_delivered, 5);
    }

    #[test]
    fn test_list_watches() {
        let bus = EventBus::new();

        let (_a, _rxa) = bus.watch(WatchFilter::agent("builder"));
        let (_b, _rxb) = bus.watch(WatchFilter::agent("tester"));
        let (_c, _rxc) = bus.watch(WatchFilter::all());

        assert_eq!(bus.list_watches().len(), 3);
    }

    #[test]
    fn test_unwatch_missing_is_error() {
        let bus = EventBus::new();
        assert!(bus.unwatch(WatchId(99)).is_err());
    }
}
