//! Object Store Client (component C3): typed CRUD + long-poll watch
//! against the external Mission/Robot store. The controller only ever
//! writes `status`; `spec` belongs to external clients.

mod error;
mod http;
mod memory;
mod types;

pub use error::StoreError;
pub use http::HttpObjectStore;
pub use memory::InMemoryObjectStore;
pub use types::{Filter, Kind, Lifecycle, ObjectEnvelope, WatchEvent, WatchEventKind};

use async_trait::async_trait;
use futures::stream::BoxStream;

/// The contract the controller consumes; satisfied by `HttpObjectStore` in
/// production and `InMemoryObjectStore` in tests (spec §9 design note:
/// "the controller must function with any implementation satisfying the
/// contract, including an in-memory test double").
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, kind: Kind, name: &str) -> Result<Option<ObjectEnvelope>, StoreError>;

    async fn list(&self, kind: Kind, filter: &Filter) -> Result<Vec<ObjectEnvelope>, StoreError>;

    /// Version-conditional status patch (optimistic concurrency). Fails
    /// with `StoreError::VersionConflict` if `expected_version` is stale
    /// and `StoreError::NotFound` if the object was deleted externally.
    async fn patch_status(
        &self,
        kind: Kind,
        name: &str,
        expected_version: u64,
        status: serde_json::Value,
    ) -> Result<ObjectEnvelope, StoreError>;

    /// A lazy, restartable stream of change events, resumable from
    /// `cursor` (pass `None` to start from the current tail).
    fn watch(&self, kind: Kind, cursor: Option<String>) -> BoxStream<'static, WatchEvent>;
}
