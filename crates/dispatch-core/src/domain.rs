//! The entity envelope, Robot and Mission types of spec §3. `ObjectEnvelope`
//! itself stays untyped JSON in `dispatch-store`; callers deserialize its
//! `spec`/`status` fields directly into the types below with
//! `serde_json::from_value`. `MissionNodeSpec` mirrors the as-ingested JSON
//! shape (name/parent optional, per invariants i/ii) and is what
//! `validate::validate` resolves into the `MissionNode`s a `ValidatedTree`
//! holds.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
    pub map_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorLevel {
    Warning,
    Fatal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotError {
    pub code: String,
    pub description: String,
    pub level: ErrorLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RobotState {
    Idle,
    OnTask,
    Charging,
    MapDeployment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobotSpec {
    pub battery_critical_level: f64,
    pub heartbeat_timeout_s: u64,
}

impl Default for RobotSpec {
    fn default() -> Self {
        Self { battery_critical_level: 0.2, heartbeat_timeout_s: 30 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RobotStatus {
    pub online: bool,
    pub state: Option<RobotState>,
    pub pose: Option<Pose>,
    pub battery_level: f64,
    pub last_seen_ts: Option<DateTime<Utc>>,
    pub last_mission: Option<String>,
    pub errors: Vec<RobotError>,
    pub factsheet_hash: Option<String>,
}

/// One node's behavior-kind; exactly one variant per node per spec §3
/// invariant (iv).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    Sequence,
    Selector,
    Route { waypoints: Vec<Pose> },
    Action { action_type: String, action_parameters: serde_json::Value },
}

impl NodeKind {
    pub fn is_composite(&self) -> bool {
        matches!(self, NodeKind::Sequence | NodeKind::Selector)
    }

    pub fn is_leaf(&self) -> bool {
        !self.is_composite()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionNode {
    pub name: String,
    pub parent: String,
    pub kind: NodeKind,
}

/// A mission node exactly as ingested from the Object Store (spec §3
/// invariants i/ii: `name` defaults to declaration index, `parent`
/// defaults to the implicit root when omitted). `validate::validate`
/// resolves a `Vec<MissionNodeSpec>` into the `MissionNode`s of a
/// `ValidatedTree`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionNodeSpec {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub parent: Option<String>,
    pub kind: NodeKind,
}

pub const ROOT: &str = "root";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MissionState {
    Pending,
    Running,
    Completed,
    Failed,
    Canceled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraversalState {
    Idle,
    Running,
    Success,
    Failure,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeStatusEntry {
    pub state: Option<TraversalState>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionSpec {
    pub robot: String,
    pub mission_tree: Vec<MissionNodeSpec>,
    pub timeout_s: u64,
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub needs_canceled: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MissionStatus {
    pub state: Option<MissionState>,
    pub node_status: HashMap<String, NodeStatusEntry>,
    pub start_ts: Option<DateTime<Utc>>,
    pub end_ts: Option<DateTime<Utc>>,
    pub current_node: Option<String>,
    /// The VDA5050 `orderId` currently in flight for this mission, so a
    /// restarted controller can re-attach to the right robot conversation
    /// by matching this against incoming `State.orderId` (spec resume
    /// semantics).
    pub order_id: Option<String>,
}

/// Well-known error codes from spec §7, used as `RobotError.code` /
/// `NodeStatusEntry.error` / `MissionStatus` failure reasons.
pub mod error_codes {
    pub const VALIDATION_ERROR: &str = "validation_error";
    pub const DEADLINE_EXCEEDED: &str = "deadline_exceeded";
    pub const TIMEOUT: &str = "timeout";
    pub const ROBOT_OFFLINE: &str = "robot_offline";
    pub const ROBOT_UNAVAILABLE: &str = "robot_unavailable";
    pub const ROBOT_DELETED: &str = "robot_deleted";
    pub const ORDER_REJECTED: &str = "order_rejected";
    pub const ACTION_FAILED: &str = "action_failed";
    pub const NODE_FAILED: &str = "node_failed";
    pub const CANCEL_FAILED: &str = "cancel_failed";
    pub const TRANSPORT_BACKPRESSURE: &str = "transport_backpressure";
    pub const LOST_ON_RESTART: &str = "lost_on_restart";
    pub const STORE_CONFLICT: &str = "store_conflict";
}
