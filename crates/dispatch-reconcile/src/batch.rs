//! Steady-state batched/coalesced status writes (spec §4.8): a decorator
//! over any `ObjectStore` that coalesces `patch_status` calls to the same
//! object within a 100ms window into a single write, while never delaying
//! a terminal lifecycle transition (Completed/Failed/Canceled must hit the
//! store immediately so a watcher downstream sees it promptly).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dispatch_core::domain::MissionState;
use dispatch_store::{Filter, Kind, ObjectEnvelope, ObjectStore, StoreError, WatchEvent};
use futures::stream::BoxStream;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::warn;

struct PendingWrite {
    expected_version: u64,
    status: serde_json::Value,
    due_at: Instant,
}

/// Wraps an `ObjectStore`, coalescing same-key `patch_status` calls inside
/// `window` unless the status payload represents a terminal mission
/// state, which always flushes immediately.
pub struct BatchingObjectStore<S: ObjectStore> {
    inner: Arc<S>,
    window: Duration,
    pending: Mutex<HashMap<(Kind, String), PendingWrite>>,
}

impl<S: ObjectStore + 'static> BatchingObjectStore<S> {
    pub fn new(inner: Arc<S>, window: Duration) -> Arc<Self> {
        Arc::new(Self { inner, window, pending: Mutex::new(HashMap::new()) })
    }

    fn is_terminal(kind: Kind, status: &serde_json::Value) -> bool {
        if kind != Kind::Mission {
            return false;
        }
        status
            .get("state")
            .and_then(|v| v.as_str())
            .map(|s| matches!(s, "COMPLETED" | "FAILED" | "CANCELED"))
            .unwrap_or(false)
            || serde_json::from_value::<MissionState>(status.clone())
                .map(|s| matches!(s, MissionState::Completed | MissionState::Failed | MissionState::Canceled))
                .unwrap_or(false)
    }

    /// Flushes any write whose window has elapsed. Called by a background
    /// tick in the binary; also safe to call opportunistically.
    pub async fn flush_due(&self) {
        let now = Instant::now();
        let mut due = Vec::new();
        {
            let mut pending = self.pending.lock().await;
            let keys: Vec<(Kind, String)> = pending
                .iter()
                .filter(|(_, w)| w.due_at <= now)
                .map(|(k, _)| k.clone())
                .collect();
            for key in keys {
                if let Some(w) = pending.remove(&key) {
                    due.push((key, w));
                }
            }
        }
        for ((kind, name), write) in due {
            if let Err(err) = self.inner.patch_status(kind, &name, write.expected_version, write.status).await {
                warn!(name, error = %err, "batched status write failed");
            }
        }
    }
}

#[async_trait]
impl<S: ObjectStore + 'static> ObjectStore for BatchingObjectStore<S> {
    async fn get(&self, kind: Kind, name: &str) -> Result<Option<ObjectEnvelope>, StoreError> {
        self.inner.get(kind, name).await
    }

    async fn list(&self, kind: Kind, filter: &Filter) -> Result<Vec<ObjectEnvelope>, StoreError> {
        self.inner.list(kind, filter).await
    }

    async fn patch_status(
        &self,
        kind: Kind,
        name: &str,
        expected_version: u64,
        status: serde_json::Value,
    ) -> Result<ObjectEnvelope, StoreError> {
        if Self::is_terminal(kind, &status) {
            let mut pending = self.pending.lock().await;
            pending.remove(&(kind, name.to_string()));
            drop(pending);
            return self.inner.patch_status(kind, name, expected_version, status).await;
        }

        let mut pending = self.pending.lock().await;
        pending.insert(
            (kind, name.to_string()),
            PendingWrite { expected_version, status, due_at: Instant::now() + self.window },
        );
        // Batched writes are fire-and-forget from the caller's point of
        // view; return the object's current known state so callers that
        // inspect the result (e.g. to read back `version`) still see
        // something coherent.
        self.inner.get(kind, name).await?.ok_or(StoreError::NotFound)
    }

    fn watch(&self, kind: Kind, cursor: Option<String>) -> BoxStream<'static, WatchEvent> {
        self.inner.watch(kind, cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch_store::InMemoryObjectStore;
    use std::collections::HashMap as Map;

    fn robot(name: &str) -> ObjectEnvelope {
        ObjectEnvelope { name: name.to_string(), labels: Map::new(), lifecycle: dispatch_store::Lifecycle::Created, version: 0, spec: serde_json::json!({}), status: serde_json::json!({}) }
    }

    #[tokio::test]
    async fn non_terminal_writes_are_coalesced_until_flush() {
        let inner = InMemoryObjectStore::new();
        inner.put(Kind::Robot, robot("carter01"));
        let batching = BatchingObjectStore::new(inner.clone(), Duration::from_millis(50));

        batching.patch_status(Kind::Robot, "carter01", 0, serde_json::json!({"online": true})).await.unwrap();
        // Not yet applied to the underlying store.
        let still_old = inner.get(Kind::Robot, "carter01").await.unwrap().unwrap();
        assert_eq!(still_old.version, 0);

        tokio::time::sleep(Duration::from_millis(60)).await;
        batching.flush_due().await;
        let updated = inner.get(Kind::Robot, "carter01").await.unwrap().unwrap();
        assert_eq!(updated.version, 1);
    }

    #[tokio::test]
    async fn terminal_mission_state_flushes_immediately() {
        let inner = InMemoryObjectStore::new();
        inner.put(Kind::Mission, ObjectEnvelope { name: "m1".into(), labels: Map::new(), lifecycle: dispatch_store::Lifecycle::Running, version: 0, spec: serde_json::json!({}), status: serde_json::json!({}) });
        let batching = BatchingObjectStore::new(inner.clone(), Duration::from_secs(5));

        batching.patch_status(Kind::Mission, "m1", 0, serde_json::json!({"state": "FAILED"})).await.unwrap();
        let updated = inner.get(Kind::Mission, "m1").await.unwrap().unwrap();
        assert_eq!(updated.version, 1, "a terminal status must not wait for the batch window");
    }
}
