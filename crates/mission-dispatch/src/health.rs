//! Ambient health/readiness endpoints (SPEC_FULL.md §11). Deliberately
//! thin: the fleet's actual state lives in the Object Store, which is the
//! system of record a caller should query for anything beyond
//! "is this process alive and has it made progress recently".

use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Lightweight in-process counters surfaced on `/readyz`, standing in for
/// the metrics exporter SPEC_FULL.md's Non-goals exclude.
#[derive(Default)]
pub struct Metrics {
    pub missions_started: std::sync::atomic::AtomicU64,
    pub missions_completed: std::sync::atomic::AtomicU64,
    pub missions_failed: std::sync::atomic::AtomicU64,
    last_progress_unix: AtomicI64,
}

impl Metrics {
    pub fn mark_progress(&self) {
        self.last_progress_unix.store(chrono::Utc::now().timestamp(), Ordering::Relaxed);
    }
}

#[derive(Serialize)]
struct ReadyBody {
    missions_started: u64,
    missions_completed: u64,
    missions_failed: u64,
    seconds_since_last_progress: i64,
}

async fn healthz() -> &'static str {
    "ok"
}

async fn readyz(metrics: axum::extract::State<Arc<Metrics>>) -> Json<ReadyBody> {
    let now = chrono::Utc::now().timestamp();
    let last = metrics.last_progress_unix.load(Ordering::Relaxed);
    Json(ReadyBody {
        missions_started: metrics.missions_started.load(Ordering::Relaxed),
        missions_completed: metrics.missions_completed.load(Ordering::Relaxed),
        missions_failed: metrics.missions_failed.load(Ordering::Relaxed),
        seconds_since_last_progress: if last == 0 { 0 } else { now - last },
    })
}

pub async fn serve(bind_addr: &str, metrics: Arc<Metrics>, shutdown: CancellationToken) -> anyhow::Result<()> {
    let addr: SocketAddr = bind_addr.parse()?;
    let app = Router::new().route("/healthz", get(healthz)).route("/readyz", get(readyz)).with_state(metrics);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "health server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
