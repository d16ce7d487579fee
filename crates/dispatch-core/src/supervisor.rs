//! Robot presence, pose, battery and error bookkeeping (C4, spec §4.4).
//!
//! The supervisor only folds inbound VDA5050 telemetry into a
//! `RobotStatus`; it never decides whether a running mission should fail
//! because a robot went offline. That decision needs a policy the
//! supervisor doesn't have (`heartbeat_timeout_s`, whether a mission is
//! even running), so the controller reads `offline_since()` and applies
//! the timeout itself. This also means a flap that recovers inside the
//! timeout window never touches mission state: `offline_since` clears the
//! instant a Connection(ONLINE) or State arrives.

use chrono::{DateTime, Utc};
use dispatch_proto::{ConnectionMessage, ConnectionState, FactsheetMessage, StateMessage};

use crate::domain::{ErrorLevel, RobotError, RobotState, RobotStatus};

#[derive(Debug)]
pub struct RobotSupervisor {
    status: RobotStatus,
    offline_since: Option<DateTime<Utc>>,
    has_running_order: bool,
    last_node_sequence_id: u32,
    battery_critical_level: f64,
}

impl Default for RobotSupervisor {
    fn default() -> Self {
        Self::new(crate::domain::RobotSpec::default().battery_critical_level)
    }
}

impl RobotSupervisor {
    pub fn new(battery_critical_level: f64) -> Self {
        Self {
            status: RobotStatus::default(),
            offline_since: None,
            has_running_order: false,
            last_node_sequence_id: 0,
            battery_critical_level,
        }
    }

    pub fn status(&self) -> &RobotStatus {
        &self.status
    }

    pub fn offline_since(&self) -> Option<DateTime<Utc>> {
        self.offline_since
    }

    /// The robot's most recently reported `lastNodeSequenceId`, used to
    /// anchor the next Order's node 0 (spec §4.6 rule 2).
    pub fn last_node_sequence_id(&self) -> u32 {
        self.last_node_sequence_id
    }

    /// Tells the supervisor whether the controller currently has a leaf
    /// dispatched to this robot, which feeds the aggregate `RobotState`.
    pub fn set_running_order(&mut self, running: bool) {
        self.has_running_order = running;
        self.recompute_state();
    }

    pub fn on_connection(&mut self, msg: &ConnectionMessage, now: DateTime<Utc>) {
        match msg.connection_state {
            ConnectionState::Online => {
                self.status.online = true;
                self.offline_since = None;
                self.status.last_seen_ts = Some(now);
            }
            ConnectionState::Offline | ConnectionState::Connectionbroken => {
                if self.status.online {
                    self.offline_since.get_or_insert(now);
                }
                self.status.online = false;
            }
        }
        self.recompute_state();
    }

    pub fn on_state(&mut self, msg: &StateMessage, now: DateTime<Utc>) {
        self.status.online = true;
        self.offline_since = None;
        self.status.last_seen_ts = Some(now);
        self.status.battery_level = msg.battery_state.battery_charge;
        self.last_node_sequence_id = msg.last_node_sequence_id;
        if let Some(pos) = &msg.agv_position {
            self.status.pose = Some(crate::domain::Pose {
                x: pos.x,
                y: pos.y,
                theta: pos.theta,
                map_id: pos.map_id.clone(),
            });
        }
        self.merge_errors(msg);
        self.recompute_state();
    }

    pub fn on_factsheet(&mut self, msg: &FactsheetMessage) {
        if let Ok(hash) = dispatch_proto::hash_factsheet(&msg.body) {
            self.status.factsheet_hash = Some(hash);
        }
    }

    pub fn set_last_mission(&mut self, mission: Option<String>) {
        self.status.last_mission = mission;
    }

    /// Replaces the open error set for each `errorType` seen in this
    /// State: an errorType absent from the latest State is considered
    /// cleared, matching VDA5050's "errors reflects current condition"
    /// semantics rather than an ever-growing log.
    fn merge_errors(&mut self, msg: &StateMessage) {
        self.status.errors = msg
            .errors
            .iter()
            .map(|e| RobotError {
                code: e.error_type.clone(),
                description: e.error_description.clone().unwrap_or_default(),
                level: match e.error_level {
                    dispatch_proto::VdaErrorLevel::Warning => ErrorLevel::Warning,
                    dispatch_proto::VdaErrorLevel::Fatal => ErrorLevel::Fatal,
                },
            })
            .collect();
    }

    fn recompute_state(&mut self) {
        self.status.state = if !self.status.online {
            None
        } else if self.has_running_order {
            Some(RobotState::OnTask)
        } else if self.status.battery_level < self.battery_critical_level {
            Some(RobotState::Charging)
        } else {
            Some(RobotState::Idle)
        };
    }
}
