/// Core action board implementation.
///
/// This module provides the main user-facing API of taskmesh. It imposes
/// the action lifecycle on top of the raw record store:
///
/// - `post` publishes a new unit of work
/// - `update` overwrites the payload of a live record
/// - `complete` / `fail` move a record to its terminal state, exactly once
/// - `get_status` / `list_active` read without blocking anyone
///
/// # Design Philosophy
///
/// - **Injected store**: the backend is passed in as an `Arc<dyn RecordStore>`
///   handle, never reached through a module-level singleton
/// - **Typed failures**: every lifecycle violation is a distinct error
/// - **Thread-safe**: clone the board cheaply and share it across tasks
use crate::error::{MeshError, MeshResult};
use crate::events::{ActionEvent, EventBus, WatchFilter, WatchId};
use crate::storage::RecordStore;
use crate::types::{ActionKey, ActionRecord, ActionStatus};
use dashmap::DashMap;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;

/// Retry behavior for idempotent reads.
///
/// Only reads (`get_status`, `list_active`) are retried on store failures.
/// Writes are surfaced immediately: retrying a write that may have landed
/// risks duplicate side effects in the caller's workflow.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts per read, first try included.
    pub max_attempts: u32,
    /// Backoff before the second attempt.
    pub initial_backoff: Duration,
    /// Backoff growth factor between attempts.
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(50),
            multiplier: 2,
        }
    }
}

/// The shared coordination board.
///
/// An `ActionBoard` lets several independent agents advertise work items,
/// track their progress, and observe one another's completions. All state
/// lives in the injected [`RecordStore`]; the board itself only adds
/// lifecycle rules, read retries, and change notifications.
///
/// # Thread Safety
///
/// The board is fully thread-safe and can be cloned cheaply to share
/// across tasks (uses Arc internally). Clones share the store, the event
/// bus, and the completion counters.
///
/// # Example
///
/// ```ignore
/// use taskmesh::{ActionBoard, MemoryStore};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// let board = ActionBoard::new(Arc::new(MemoryStore::new()));
///
/// board.post("builder", "compile-1", json!({
///     "type": "build",
///     "status": "in_progress",
/// })).await?;
///
/// board.complete("builder", "compile-1", json!({"success": true})).await?;
/// ```
#[derive(Clone)]
pub struct ActionBoard {
    /// The injected storage backend
    store: Arc<dyn RecordStore>,
    /// Change notification fan-out
    events: Arc<EventBus>,
    /// Rolling per-agent count of terminal transitions
    completions: Arc<DashMap<String, u64>>,
    /// Read retry behavior
    retry: RetryPolicy,
}

impl std::fmt::Debug for ActionBoard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionBoard")
            .field("retry", &self.retry)
            .finish()
    }
}

impl ActionBoard {
    /// Create a board over an injected store handle.
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            events: Arc::new(EventBus::new()),
            completions: Arc::new(DashMap::new()),
            retry: RetryPolicy::default(),
        }
    }

    /// Override the read retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Get access to the underlying store handle.
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Get access to the event bus.
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Register a watch for board change events.
    pub fn watch(&self, filter: WatchFilter) -> (WatchId, broadcast::Receiver<ActionEvent>) {
        self.events.watch(filter)
    }

    /// Publish a new unit of work.
    ///
    /// The payload must be a JSON object carrying a `type` field; its
    /// `status` field defaults to `"pending"` when absent. Posting over an
    /// existing terminal record is rejected with `AlreadyCompleted`:
    /// completion is one-way, and redone work needs a fresh action id.
    ///
    /// # Example
    ///
    /// ```ignore
    /// board.post("builder", "compile-1", json!({
    ///     "type": "build",
    ///     "description": "compile the service crate",
    /// })).await?;
    /// ```
    pub async fn post(
        &self,
        agent_id: &str,
        action_id: &str,
        data: JsonValue,
    ) -> MeshResult<ActionRecord> {
        let key = validated_key(agent_id, action_id)?;
        let (payload, status) = validated_payload(data)?;

        if let Some(existing) = self.store.get(&key).await? {
            if existing.is_terminal() {
                return Err(MeshError::already_completed(agent_id, action_id));
            }
        }

        let record = ActionRecord::new(key, payload, status);
        self.store.set(record.clone()).await?;
        self.events.notify(ActionEvent::posted(&record));

        Ok(record)
    }

    /// Overwrite the payload of a live record.
    ///
    /// There is no partial patch: callers resend the full desired payload,
    /// validated exactly like `post`. Fails with `NotFound` if the record
    /// was never posted and with `AlreadyCompleted` if it is terminal (the
    /// stored payload is left untouched in that case).
    pub async fn update(
        &self,
        agent_id: &str,
        action_id: &str,
        data: JsonValue,
    ) -> MeshResult<ActionRecord> {
        let key = validated_key(agent_id, action_id)?;
        let (payload, status) = validated_payload(data)?;

        let existing = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| MeshError::not_found(agent_id, action_id))?;
        if existing.is_terminal() {
            return Err(MeshError::already_completed(agent_id, action_id));
        }

        let record = ActionRecord::new(key, payload, status);
        self.store.set(record.clone()).await?;
        self.events.notify(ActionEvent::updated(&record));

        Ok(record)
    }

    /// Move a record to `completed`, exactly once.
    ///
    /// `result` must be a JSON object (or null); its top-level fields are
    /// shallow-merged into the stored payload so waiters receive the
    /// original action description together with the outcome. Fails with
    /// `NotFound` if the record was never posted - completing an unposted
    /// action does NOT create a record - and with `AlreadyCompleted` if it
    /// already reached a terminal state.
    ///
    /// # Example
    ///
    /// ```ignore
    /// board.complete("builder", "compile-1", json!({
    ///     "success": true,
    ///     "artifacts": ["service.bin"],
    /// })).await?;
    /// ```
    pub async fn complete(
        &self,
        agent_id: &str,
        action_id: &str,
        result: JsonValue,
    ) -> MeshResult<ActionRecord> {
        let record = self
            .finish(agent_id, action_id, result, ActionStatus::Completed)
            .await?;
        self.events.notify(ActionEvent::completed(&record));
        Ok(record)
    }

    /// Move a record to `failed`, exactly once.
    ///
    /// The explicit counterpart of [`ActionBoard::complete`] for work that
    /// is abandoned rather than finished: same merge semantics, same
    /// one-way transition, same errors.
    pub async fn fail(
        &self,
        agent_id: &str,
        action_id: &str,
        error: JsonValue,
    ) -> MeshResult<ActionRecord> {
        let record = self
            .finish(agent_id, action_id, error, ActionStatus::Failed)
            .await?;
        self.events.notify(ActionEvent::failed(&record));
        Ok(record)
    }

    /// Shared terminal-write path for `complete` and `fail`.
    async fn finish(
        &self,
        agent_id: &str,
        action_id: &str,
        result: JsonValue,
        status: ActionStatus,
    ) -> MeshResult<ActionRecord> {
        let key = ActionKey::new(agent_id, action_id);

        let existing = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| MeshError::not_found(agent_id, action_id))?;
        if existing.is_terminal() {
            return Err(MeshError::already_completed(agent_id, action_id));
        }

        let mut payload = (*existing.payload).clone();
        merge_result(&mut payload, result)?;
        payload["status"] = JsonValue::String(status.as_str().to_string());

        let record = ActionRecord::new(key, payload, status);
        self.store.set(record.clone()).await?;

        *self
            .completions
            .entry(record.key.agent_id.clone())
            .or_insert(0) += 1;

        Ok(record)
    }

    /// Read the current record for a key.
    ///
    /// Returns `NotFound` when the key has never been written. Store
    /// failures are retried with bounded exponential backoff before being
    /// surfaced.
    pub async fn get_status(&self, agent_id: &str, action_id: &str) -> MeshResult<ActionRecord> {
        let key = ActionKey::new(agent_id, action_id);
        let store = Arc::clone(&self.store);

        let found = self
            .read_with_retry("get", || {
                let store = Arc::clone(&store);
                let key = key.clone();
                async move { store.get(&key).await }
            })
            .await?;

        found.ok_or_else(|| MeshError::not_found(agent_id, action_id))
    }

    /// All records that have not reached a terminal state.
    ///
    /// Ordering is unspecified. Store failures are retried like
    /// [`ActionBoard::get_status`].
    pub async fn list_active(&self) -> MeshResult<Vec<ActionRecord>> {
        let store = Arc::clone(&self.store);

        self.read_with_retry("list_active", || {
            let store = Arc::clone(&store);
            async move { store.list_active().await }
        })
        .await
    }

    /// Remove a record. Idempotent; used by cleanup flows.
    pub async fn delete(&self, agent_id: &str, action_id: &str) -> MeshResult<()> {
        let key = ActionKey::new(agent_id, action_id);

        let existed = self.store.get(&key).await?.is_some();
        self.store.delete(&key).await?;
        if existed {
            self.events.notify(ActionEvent::deleted(&key));
        }

        Ok(())
    }

    /// Rolling per-agent count of terminal transitions observed by this
    /// board (clones included - counters are shared through the Arc).
    ///
    /// The count is per-process and resets on restart; it backs the
    /// aggregator's `completed` column for stores that drop terminal
    /// records.
    pub fn completion_counts(&self) -> HashMap<String, u64> {
        self.completions
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    /// Run an idempotent read, retrying store failures with bounded
    /// exponential backoff.
    async fn read_with_retry<T, F, Fut>(&self, what: &str, op: F) -> MeshResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = MeshResult<T>>,
    {
        let mut backoff = self.retry.initial_backoff;
        let mut attempt = 1;

        loop {
            match op().await {
                Err(MeshError::Store { reason }) if attempt < self.retry.max_attempts => {
                    debug!(
                        "Store {} failed (attempt {}/{}), retrying in {:?}: {}",
                        what, attempt, self.retry.max_attempts, backoff, reason
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= self.retry.multiplier;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

/// Reject empty agent/action ids before any store I/O.
fn validated_key(agent_id: &str, action_id: &str) -> MeshResult<ActionKey> {
    if agent_id.trim().is_empty() {
        return Err(MeshError::invalid("agent_id must not be empty"));
    }
    if action_id.trim().is_empty() {
        return Err(MeshError::invalid("action_id must not be empty"));
    }
    Ok(ActionKey::new(agent_id, action_id))
}

/// Validate a post/update payload and extract its status.
///
/// The payload must be a JSON object with a `type` field. A missing
/// `status` defaults to `"pending"` and is written back into the payload so
/// the stored object always carries one.
fn validated_payload(mut data: JsonValue) -> MeshResult<(JsonValue, ActionStatus)> {
    let Some(obj) = data.as_object_mut() else {
        return Err(MeshError::invalid("payload must be a JSON object"));
    };

    match obj.get("type") {
        Some(JsonValue::String(t)) if !t.trim().is_empty() => {}
        Some(_) => return Err(MeshError::invalid("payload 'type' must be a string")),
        None => return Err(MeshError::invalid("payload must include a 'type' field")),
    }

    let status = match obj.get("status") {
        None => {
            obj.insert(
                "status".to_string(),
                JsonValue::String(ActionStatus::Pending.as_str().to_string()),
            );
            ActionStatus::Pending
        }
        Some(JsonValue::String(s)) => ActionStatus::parse(s).ok_or_else(|| {
            MeshError::invalid(format!(
                "unknown status '{}' (expected pending, in_progress, completed, or failed)",
                s
            ))
        })?,
        Some(_) => return Err(MeshError::invalid("payload 'status' must be a string")),
    };

    Ok((data, status))
}

/// Shallow-merge a completion result into an existing payload.
///
/// Only object (field-by-field) and null (no result data) are accepted;
/// anything else indicates a caller bug and is rejected before the write.
fn merge_result(payload: &mut JsonValue, result: JsonValue) -> MeshResult<()> {
    match result {
        JsonValue::Null => Ok(()),
        JsonValue::Object(fields) => {
            let Some(target) = payload.as_object_mut() else {
                return Err(MeshError::invalid("stored payload is not a JSON object"));
            };
            for (field, value) in fields {
                target.insert(field, value);
            }
            Ok(())
        }
        _ => Err(MeshError::invalid(
            "completion result must be a JSON object or null",
        )),
    }
}
