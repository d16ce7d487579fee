use serde::{Deserialize, Serialize};

use crate::header::Header;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionStatus {
    Waiting,
    Initializing,
    Running,
    Paused,
    Finished,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionState {
    #[serde(rename = "actionId")]
    pub action_id: String,
    #[serde(rename = "actionStatus")]
    pub action_status: ActionStatus,
    #[serde(rename = "resultDescription", skip_serializing_if = "Option::is_none")]
    pub result_description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeState {
    #[serde(rename = "nodeId")]
    pub node_id: String,
    #[serde(rename = "sequenceId")]
    pub sequence_id: u32,
    pub released: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeState {
    #[serde(rename = "edgeId")]
    pub edge_id: String,
    #[serde(rename = "sequenceId")]
    pub sequence_id: u32,
    pub released: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VdaErrorLevel {
    Warning,
    Fatal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VdaError {
    #[serde(rename = "errorType")]
    pub error_type: String,
    #[serde(rename = "errorDescription", skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
    #[serde(rename = "errorLevel")]
    pub error_level: VdaErrorLevel,
}

/// The robot's reported pose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgvPosition {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
    #[serde(rename = "mapId")]
    pub map_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatteryState {
    #[serde(rename = "batteryCharge")]
    pub battery_charge: f64,
}

/// Periodic robot telemetry (robot -> controller).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateMessage {
    #[serde(flatten)]
    pub header: Header,
    #[serde(rename = "orderId", skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(rename = "orderUpdateId", skip_serializing_if = "Option::is_none")]
    pub order_update_id: Option<u32>,
    #[serde(rename = "lastNodeId")]
    pub last_node_id: String,
    #[serde(rename = "lastNodeSequenceId")]
    pub last_node_sequence_id: u32,
    #[serde(rename = "nodeStates", default)]
    pub node_states: Vec<NodeState>,
    #[serde(rename = "edgeStates", default)]
    pub edge_states: Vec<EdgeState>,
    #[serde(rename = "actionStates", default)]
    pub action_states: Vec<ActionState>,
    #[serde(rename = "agvPosition", skip_serializing_if = "Option::is_none")]
    pub agv_position: Option<AgvPosition>,
    #[serde(rename = "batteryState")]
    pub battery_state: BatteryState,
    #[serde(default)]
    pub errors: Vec<VdaError>,
    #[serde(rename = "operatingMode", skip_serializing_if = "Option::is_none")]
    pub operating_mode: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn header() -> Header {
        Header {
            header_id: 9,
            timestamp: Utc::now(),
            version: "1.1.0".into(),
            manufacturer: "acme".into(),
            serial_number: "carter01".into(),
        }
    }

    #[test]
    fn state_round_trips_with_action_state() {
        let msg = StateMessage {
            header: header(),
            order_id: Some("U1".into()),
            order_update_id: Some(0),
            last_node_id: "w2".into(),
            last_node_sequence_id: 4,
            node_states: vec![],
            edge_states: vec![],
            action_states: vec![ActionState {
                action_id: "a1".into(),
                action_status: ActionStatus::Finished,
                result_description: None,
            }],
            agv_position: Some(AgvPosition { x: 3.3, y: 2.1, theta: 0.0, map_id: "map".into() }),
            battery_state: BatteryState { battery_charge: 0.8 },
            errors: vec![],
            operating_mode: Some("AUTOMATIC".into()),
        };
        let json = serde_json::to_string(&msg).unwrap();
        let decoded: StateMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn errors_merge_by_error_type_is_a_caller_concern() {
        // StateMessage carries the raw error list; merging/clearing by
        // errorType across successive States is the robot supervisor's
        // job (dispatch-core), not the codec's.
        let e1 = VdaError { error_type: "motor_stall".into(), error_description: None, error_level: VdaErrorLevel::Warning };
        let e2 = e1.clone();
        assert_eq!(e1, e2);
    }
}
