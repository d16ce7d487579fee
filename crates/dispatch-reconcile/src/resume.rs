//! Startup resume (spec §4.8/§9): on boot, RUNNING missions left over from
//! a prior process are matched against incoming `State` telemetry by
//! `orderId` within `resume_timeout_s`. A match re-attaches the mission to
//! its controller; a miss finalizes it `FAILED lost_on_restart`, since
//! nothing else can tell whether the robot finished the order while this
//! process was down.

use std::collections::HashMap;
use std::time::Duration;

use dispatch_core::domain::{error_codes, MissionState, MissionStatus};
use dispatch_proto::StateMessage;
use dispatch_store::{Filter, Kind, ObjectStore};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct ResumeOutcome {
    pub mission_name: String,
    pub order_id: String,
    /// `Some(serial)` if a matching State arrived in time; the caller
    /// should resume driving this mission on that robot's controller.
    pub resumed_on: Option<String>,
}

/// Lists every Mission whose last known status was RUNNING, then races a
/// `resume_timeout_s` window against `state_events` to find a match by
/// `orderId`. Missions with no `order_id` recorded (never actually
/// dispatched a leaf) are treated as immediately resumable with no robot
/// attached.
pub async fn resume_running_missions(
    store: &dyn ObjectStore,
    mut state_events: mpsc::Receiver<(String, StateMessage)>,
    resume_timeout_s: u64,
) -> Vec<ResumeOutcome> {
    let missions = store.list(Kind::Mission, &Filter::new()).await.unwrap_or_default();

    let mut awaiting: HashMap<String, String> = HashMap::new(); // order_id -> mission_name
    let mut outcomes = Vec::new();

    for object in &missions {
        let Ok(status) = serde_json::from_value::<MissionStatus>(object.status.clone()) else { continue };
        if status.state != Some(MissionState::Running) {
            continue;
        }
        match status.order_id {
            Some(order_id) => {
                awaiting.insert(order_id.clone(), object.name.clone());
            }
            None => {
                outcomes.push(ResumeOutcome { mission_name: object.name.clone(), order_id: String::new(), resumed_on: None });
            }
        }
    }

    if awaiting.is_empty() {
        return outcomes;
    }

    info!(count = awaiting.len(), "awaiting state telemetry to resume running missions");
    let deadline = timeout(Duration::from_secs(resume_timeout_s), async {
        let mut remaining = awaiting.clone();
        let mut matches = Vec::new();
        while !remaining.is_empty() {
            let Some((serial, state)) = state_events.recv().await else { break };
            let Some(order_id) = &state.order_id else { continue };
            if let Some(mission_name) = remaining.remove(order_id) {
                matches.push(ResumeOutcome { mission_name, order_id: order_id.clone(), resumed_on: Some(serial) });
            }
        }
        matches
    })
    .await;

    let matched = deadline.unwrap_or_default();
    for m in &matched {
        awaiting.remove(&m.order_id);
    }
    outcomes.extend(matched);

    for (order_id, mission_name) in awaiting {
        warn!(mission = %mission_name, order_id, "no matching state observed before resume timeout, failing mission");
        if let Ok(Some(obj)) = store.get(Kind::Mission, &mission_name).await {
            let mut status: MissionStatus = serde_json::from_value(obj.status.clone()).unwrap_or_default();
            status.state = Some(MissionState::Failed);
            status.node_status.entry(status.current_node.clone().unwrap_or_default()).or_default().error = Some(error_codes::LOST_ON_RESTART.to_string());
            let value = serde_json::to_value(&status).unwrap_or_default();
            let _ = store.patch_status(Kind::Mission, &mission_name, obj.version, value).await;
        }
        outcomes.push(ResumeOutcome { mission_name, order_id, resumed_on: None });
    }

    outcomes
}
