//! In-memory `ObjectStore` test double, grounded on the teacher's
//! `DashMap`-backed session store (baton's `session/store.rs`): concurrent
//! access without a global lock, plus a broadcast channel standing in for
//! the store's watch/long-poll feed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::BoxStream;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::error::StoreError;
use crate::types::{Filter, Kind, ObjectEnvelope, WatchEvent, WatchEventKind};
use crate::ObjectStore;

#[derive(Clone)]
struct Entry {
    object: ObjectEnvelope,
}

/// Test double satisfying the C3 contract entirely in memory. Also used
/// directly by test code to seed/inspect state (`put`, `get_raw`) the way
/// a real external client would mutate `spec`.
pub struct InMemoryObjectStore {
    robots: DashMap<String, Entry>,
    missions: DashMap<String, Entry>,
    cursor: AtomicU64,
    robot_events: broadcast::Sender<WatchEvent>,
    mission_events: broadcast::Sender<WatchEvent>,
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        let (robot_events, _) = broadcast::channel(1024);
        let (mission_events, _) = broadcast::channel(1024);
        Self {
            robots: DashMap::new(),
            missions: DashMap::new(),
            cursor: AtomicU64::new(0),
            robot_events,
            mission_events,
        }
    }
}

impl InMemoryObjectStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn table(&self, kind: Kind) -> &DashMap<String, Entry> {
        match kind {
            Kind::Robot => &self.robots,
            Kind::Mission => &self.missions,
        }
    }

    fn sender(&self, kind: Kind) -> &broadcast::Sender<WatchEvent> {
        match kind {
            Kind::Robot => &self.robot_events,
            Kind::Mission => &self.mission_events,
        }
    }

    fn next_cursor(&self) -> String {
        self.cursor.fetch_add(1, Ordering::SeqCst).to_string()
    }

    /// Seeds or replaces an object's full envelope, as an external fleet
    /// client creating/updating `spec` would. Emits ADD on first insert,
    /// UPDATE thereafter.
    pub fn put(&self, kind: Kind, object: ObjectEnvelope) {
        let cursor = self.next_cursor();
        let is_new = !self.table(kind).contains_key(&object.name);
        self.table(kind).insert(object.name.clone(), Entry { object: object.clone() });
        let event = WatchEvent {
            event: if is_new { WatchEventKind::Add } else { WatchEventKind::Update },
            object,
            cursor,
        };
        let _ = self.sender(kind).send(event);
    }

    /// Removes an object, as an external client deleting it would.
    pub fn delete(&self, kind: Kind, name: &str) {
        if let Some((_, entry)) = self.table(kind).remove(name) {
            let cursor = self.next_cursor();
            let _ = self.sender(kind).send(WatchEvent {
                event: WatchEventKind::Delete,
                object: entry.object,
                cursor,
            });
        }
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn get(&self, kind: Kind, name: &str) -> Result<Option<ObjectEnvelope>, StoreError> {
        Ok(self.table(kind).get(name).map(|e| e.object.clone()))
    }

    async fn list(&self, kind: Kind, filter: &Filter) -> Result<Vec<ObjectEnvelope>, StoreError> {
        let names: Vec<&str> = filter
            .params
            .iter()
            .filter(|(k, _)| k == "names")
            .map(|(_, v)| v.as_str())
            .collect();

        Ok(self
            .table(kind)
            .iter()
            .map(|e| e.object.clone())
            .filter(|o| names.is_empty() || names.contains(&o.name.as_str()))
            .collect())
    }

    async fn patch_status(
        &self,
        kind: Kind,
        name: &str,
        expected_version: u64,
        status: serde_json::Value,
    ) -> Result<ObjectEnvelope, StoreError> {
        let mut entry = self.table(kind).get_mut(name).ok_or(StoreError::NotFound)?;
        if entry.object.version != expected_version {
            return Err(StoreError::VersionConflict {
                expected: expected_version,
                actual: entry.object.version,
            });
        }
        entry.object.status = status;
        entry.object.version += 1;
        let updated = entry.object.clone();
        drop(entry);

        let cursor = self.next_cursor();
        let _ = self.sender(kind).send(WatchEvent {
            event: WatchEventKind::Update,
            object: updated.clone(),
            cursor,
        });
        Ok(updated)
    }

    fn watch(&self, kind: Kind, _cursor: Option<String>) -> BoxStream<'static, WatchEvent> {
        let rx = self.sender(kind).subscribe();
        Box::pin(BroadcastStream::new(rx).filter_map(|r| r.ok()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio_stream::StreamExt as _;

    fn robot(name: &str) -> ObjectEnvelope {
        ObjectEnvelope {
            name: name.to_string(),
            labels: HashMap::new(),
            lifecycle: crate::types::Lifecycle::Created,
            version: 0,
            spec: serde_json::json!({}),
            status: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn patch_status_rejects_stale_version() {
        let store = InMemoryObjectStore::new();
        store.put(Kind::Robot, robot("carter01"));

        let result = store
            .patch_status(Kind::Robot, "carter01", 7, serde_json::json!({"online": true}))
            .await;
        assert!(matches!(result, Err(StoreError::VersionConflict { expected: 7, actual: 0 })));

        let ok = store
            .patch_status(Kind::Robot, "carter01", 0, serde_json::json!({"online": true}))
            .await
            .unwrap();
        assert_eq!(ok.version, 1);
    }

    #[tokio::test]
    async fn patch_status_on_deleted_object_is_not_found() {
        let store = InMemoryObjectStore::new();
        let result = store.patch_status(Kind::Robot, "ghost", 0, serde_json::json!({})).await;
        assert!(matches!(result, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn watch_observes_put_and_delete() {
        let store = InMemoryObjectStore::new();
        let mut events = store.watch(Kind::Robot, None);

        store.put(Kind::Robot, robot("carter01"));
        let first = events.next().await.unwrap();
        assert_eq!(first.event, WatchEventKind::Add);

        store.delete(Kind::Robot, "carter01");
        let second = events.next().await.unwrap();
        assert_eq!(second.event, WatchEventKind::Delete);
    }
}
