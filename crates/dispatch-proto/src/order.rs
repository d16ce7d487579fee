use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::header::Header;

/// A waypoint or robot pose: `{x, y, theta, map_id}` per spec §3.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePosition {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
    #[serde(rename = "mapId")]
    pub map_id: String,
}

/// One node (released waypoint or the current-pose anchor) in an Order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderNode {
    #[serde(rename = "nodeId")]
    pub node_id: String,
    #[serde(rename = "sequenceId")]
    pub sequence_id: u32,
    pub released: bool,
    #[serde(rename = "nodePosition", skip_serializing_if = "Option::is_none")]
    pub node_position: Option<NodePosition>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEdge {
    #[serde(rename = "edgeId")]
    pub edge_id: String,
    #[serde(rename = "sequenceId")]
    pub sequence_id: u32,
    pub released: bool,
    #[serde(rename = "startNodeId")]
    pub start_node_id: String,
    #[serde(rename = "endNodeId")]
    pub end_node_id: String,
}

/// An Order message (controller -> robot).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    #[serde(flatten)]
    pub header: Header,
    #[serde(rename = "orderId")]
    pub order_id: String,
    #[serde(rename = "orderUpdateId")]
    pub order_update_id: u32,
    pub nodes: Vec<OrderNode>,
    pub edges: Vec<OrderEdge>,
}
