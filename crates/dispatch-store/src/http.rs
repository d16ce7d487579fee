//! REST-backed `ObjectStore`, consuming the surface in spec §6:
//! `GET /{kind}?filter=...`, `GET /{kind}/{name}`, `PATCH /{kind}/{name}/status`,
//! `GET /watch/{kind}?cursor=...`.

use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use futures::stream::BoxStream;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::warn;

use crate::error::StoreError;
use crate::types::{Filter, Kind, ObjectEnvelope, WatchEvent, WatchEventKind};
use crate::ObjectStore;

#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    client: Client,
    base_url: String,
}

impl HttpObjectStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[derive(Deserialize)]
struct WatchPage {
    #[serde(default)]
    events: Vec<RawWatchEvent>,
    cursor: String,
}

#[derive(Deserialize)]
struct RawWatchEvent {
    event: String,
    object: ObjectEnvelope,
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn get(&self, kind: Kind, name: &str) -> Result<Option<ObjectEnvelope>, StoreError> {
        let resp = self.client.get(self.url(&format!("/{}/{}", kind.as_str(), name))).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let obj = resp.error_for_status()?.json::<ObjectEnvelope>().await?;
        Ok(Some(obj))
    }

    async fn list(&self, kind: Kind, filter: &Filter) -> Result<Vec<ObjectEnvelope>, StoreError> {
        let query = filter.to_query_string();
        let path = if query.is_empty() {
            format!("/{}", kind.as_str())
        } else {
            format!("/{}?{}", kind.as_str(), query)
        };
        let objs = self.client.get(self.url(&path)).send().await?.error_for_status()?.json().await?;
        Ok(objs)
    }

    async fn patch_status(
        &self,
        kind: Kind,
        name: &str,
        expected_version: u64,
        status: serde_json::Value,
    ) -> Result<ObjectEnvelope, StoreError> {
        let body = serde_json::json!({ "expected_version": expected_version, "status": status });
        let resp = self
            .client
            .patch(self.url(&format!("/{}/{}/status", kind.as_str(), name)))
            .json(&body)
            .send()
            .await?;

        match resp.status() {
            StatusCode::NOT_FOUND => Err(StoreError::NotFound),
            StatusCode::CONFLICT => {
                let conflict: ConflictBody = resp.json().await.unwrap_or(ConflictBody { actual_version: expected_version });
                Err(StoreError::VersionConflict { expected: expected_version, actual: conflict.actual_version })
            }
            _ => Ok(resp.error_for_status()?.json().await?),
        }
    }

    fn watch(&self, kind: Kind, cursor: Option<String>) -> BoxStream<'static, WatchEvent> {
        let client = self.client.clone();
        let base_url = self.base_url.clone();
        let kind_str = kind.as_str();

        Box::pin(stream! {
            let mut cursor = cursor.unwrap_or_default();
            let mut backoff = Duration::from_millis(100);
            loop {
                let url = format!(
                    "{}/watch/{}?cursor={}",
                    base_url.trim_end_matches('/'),
                    kind_str,
                    cursor
                );
                match client.get(&url).send().await.and_then(|r| r.error_for_status()) {
                    Ok(resp) => match resp.json::<WatchPage>().await {
                        Ok(page) => {
                            backoff = Duration::from_millis(100);
                            cursor = page.cursor;
                            for raw in page.events {
                                let event = match raw.event.as_str() {
                                    "ADD" => WatchEventKind::Add,
                                    "UPDATE" => WatchEventKind::Update,
                                    "DELETE" => WatchEventKind::Delete,
                                    other => {
                                        warn!(event = other, "unknown watch event kind, skipping");
                                        continue;
                                    }
                                };
                                yield WatchEvent { event, object: raw.object, cursor: cursor.clone() };
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "malformed watch page, retrying");
                            tokio::time::sleep(backoff).await;
                            backoff = (backoff * 2).min(Duration::from_secs(30));
                        }
                    },
                    Err(e) => {
                        warn!(error = %e, "watch request failed, retrying with backoff");
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(Duration::from_secs(30));
                    }
                }
            }
        })
    }
}

#[derive(Deserialize)]
struct ConflictBody {
    actual_version: u64,
}
