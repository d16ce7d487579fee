//! Order/InstantActions construction and completion tracking (C6, spec
//! §4.6): translates one behavior-tree leaf (a `route` or `action` node)
//! into VDA5050 wire messages, and reads incoming `State` telemetry back
//! into a traversal result.
//!
//! A mission's Order accumulates across its lifetime rather than being
//! replaced leg by leg: each leaf appends released nodes/edges to the
//! tail and bumps `orderUpdateId`, per the "updates may only append, never
//! shrink the released prefix" rule (spec §9).

use dispatch_proto::{
    Action, ActionState, ActionStatus, BlockingType, CodecError, Header, InstantActionsMessage, NodePosition,
    Order, OrderEdge, OrderNode, StateMessage,
};

use crate::domain::{ErrorLevel, Pose, RobotError, TraversalState};

fn to_node_position(pose: &Pose) -> NodePosition {
    NodePosition { x: pose.x, y: pose.y, theta: pose.theta, map_id: pose.map_id.clone() }
}

#[derive(Debug, Clone)]
enum Pending {
    Route { final_node_id: String },
    Action { action_id: String },
}

/// Per-mission Order bookkeeping. One instance lives for the whole mission;
/// the controller calls `append_route`/`append_action` as the interpreter
/// hands it each leaf, and feeds every inbound `StateMessage` to
/// `observe_state`.
#[derive(Debug)]
pub struct Sequencer {
    order_id: String,
    order_update_id: u32,
    next_sequence_id: u32,
    nodes: Vec<OrderNode>,
    edges: Vec<OrderEdge>,
    pending: Option<Pending>,
}

impl Sequencer {
    pub fn new(order_id: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            order_update_id: 0,
            next_sequence_id: 0,
            nodes: Vec::new(),
            edges: Vec::new(),
            pending: None,
        }
    }

    pub fn order_id(&self) -> &str {
        &self.order_id
    }

    fn next_even(&mut self) -> u32 {
        let id = self.next_sequence_id;
        self.next_sequence_id += 2;
        id
    }

    /// Places node 0 at the robot's reported `lastNodeSequenceId`, left
    /// unreleased (spec §4.6 rule 2, §8 invariant 4): it marks the robot's
    /// current pose, not a waypoint the robot has committed to traverse.
    /// Released nodes/edges appended after it start numbering from
    /// `last_node_sequence_id + 2`.
    fn ensure_anchor(&mut self, start: &Pose, last_node_sequence_id: u32) {
        if self.nodes.is_empty() {
            self.nodes.push(OrderNode {
                node_id: "start".to_string(),
                sequence_id: last_node_sequence_id,
                released: false,
                node_position: Some(to_node_position(start)),
                actions: Vec::new(),
            });
            self.next_sequence_id = last_node_sequence_id + 2;
        }
    }

    fn last_node_id(&self) -> String {
        self.nodes.last().map(|n| n.node_id.clone()).unwrap_or_else(|| "start".to_string())
    }

    /// Appends a route leg's waypoints as released nodes/edges and returns
    /// the full Order to publish. `start` anchors the very first node of
    /// the mission if no order has been sent yet, at the robot's reported
    /// `last_node_sequence_id`.
    pub fn append_route(&mut self, header: Header, leaf_name: &str, start: &Pose, waypoints: &[Pose], last_node_sequence_id: u32) -> Order {
        self.ensure_anchor(start, last_node_sequence_id);

        let mut final_node_id = self.last_node_id();
        for (i, waypoint) in waypoints.iter().enumerate() {
            let edge_id = format!("{leaf_name}-e{i}");
            let edge_seq = self.next_sequence_id;
            self.next_sequence_id += 1;
            self.edges.push(OrderEdge {
                edge_id,
                sequence_id: edge_seq,
                released: true,
                start_node_id: final_node_id.clone(),
                end_node_id: format!("{leaf_name}-n{i}"),
            });

            final_node_id = format!("{leaf_name}-n{i}");
            let sequence_id = self.next_even();
            self.nodes.push(OrderNode {
                node_id: final_node_id.clone(),
                sequence_id,
                released: true,
                node_position: Some(to_node_position(waypoint)),
                actions: Vec::new(),
            });
        }

        self.pending = Some(Pending::Route { final_node_id });
        self.build_order(header)
    }

    /// Appends an action leaf as a new released node carrying a single
    /// action, at the robot's current position.
    pub fn append_action(
        &mut self,
        header: Header,
        leaf_name: &str,
        current_pose: &Pose,
        action_type: &str,
        action_parameters: &serde_json::Value,
        blocking_type: BlockingType,
        last_node_sequence_id: u32,
    ) -> Result<Order, CodecError> {
        self.ensure_anchor(current_pose, last_node_sequence_id);

        let action = Action::from_json_parameters(leaf_name, action_type, blocking_type, action_parameters)?;
        let node_id = format!("{leaf_name}-action");
        let sequence_id = self.next_even();
        self.nodes.push(OrderNode {
            node_id: node_id.clone(),
            sequence_id,
            released: true,
            node_position: Some(to_node_position(current_pose)),
            actions: vec![action],
        });

        self.pending = Some(Pending::Action { action_id: leaf_name.to_string() });
        Ok(self.build_order(header))
    }

    fn build_order(&mut self, header: Header) -> Order {
        let order = Order {
            header,
            order_id: self.order_id.clone(),
            order_update_id: self.order_update_id,
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
        };
        self.order_update_id += 1;
        order
    }

    fn cancel_action_id(&self) -> String {
        format!("{}-cancel", self.order_id)
    }

    /// Builds the `cancelOrder` InstantActions message for the mission's
    /// current order.
    pub fn build_cancel(&self, header: Header) -> InstantActionsMessage {
        InstantActionsMessage {
            header,
            actions: vec![Action {
                action_id: self.cancel_action_id(),
                action_type: InstantActionsMessage::CANCEL_ORDER.to_string(),
                action_description: None,
                blocking_type: BlockingType::Hard,
                action_parameters: vec![],
            }],
        }
    }

    /// Reads one inbound `State` for an acknowledgement of the cancel
    /// instant action sent by `build_cancel`. Independent of whatever
    /// route/action leaf is still `pending`, since the robot reports the
    /// cancel's own `actionId`. `None` while no terminal status for it has
    /// arrived yet; `Some(true)` once finished, `Some(false)` if the robot
    /// reports the cancel action itself failed.
    pub fn observe_cancel_ack(&self, state: &StateMessage) -> Option<bool> {
        if state.order_id.as_deref() != Some(self.order_id.as_str()) {
            return None;
        }
        let id = self.cancel_action_id();
        state.action_states.iter().find(|a| a.action_id == id).and_then(|a| match a.action_status {
            ActionStatus::Finished => Some(true),
            ActionStatus::Failed => Some(false),
            _ => None,
        })
    }

    /// Reads one inbound `State` message against the currently pending
    /// leaf. Returns `None` while still in flight, `Some` once the leaf
    /// has a definite outcome. States for a different `orderId` are
    /// ignored (a stale robot echo, or a prior mission's tail).
    pub fn observe_state(&mut self, state: &StateMessage) -> Option<(TraversalState, Option<RobotError>)> {
        if state.order_id.as_deref() != Some(self.order_id.as_str()) {
            return None;
        }

        match self.pending.as_ref()? {
            Pending::Route { final_node_id } => {
                if let Some(fatal) = state.errors.iter().find(|e| e.error_level == dispatch_proto::VdaErrorLevel::Fatal) {
                    self.pending = None;
                    return Some((
                        TraversalState::Failure,
                        Some(RobotError {
                            code: crate::domain::error_codes::ORDER_REJECTED.to_string(),
                            description: fatal.error_description.clone().unwrap_or_else(|| fatal.error_type.clone()),
                            level: ErrorLevel::Fatal,
                        }),
                    ));
                }
                if &state.last_node_id == final_node_id {
                    self.pending = None;
                    return Some((TraversalState::Success, None));
                }
                None
            }
            Pending::Action { action_id } => {
                let matched: Option<&ActionState> = state.action_states.iter().find(|a| &a.action_id == action_id);
                match matched {
                    Some(a) if a.action_status == ActionStatus::Finished => {
                        self.pending = None;
                        Some((TraversalState::Success, None))
                    }
                    Some(a) if a.action_status == ActionStatus::Failed => {
                        self.pending = None;
                        Some((
                            TraversalState::Failure,
                            Some(RobotError {
                                code: crate::domain::error_codes::ACTION_FAILED.to_string(),
                                description: a.result_description.clone().unwrap_or_default(),
                                level: ErrorLevel::Fatal,
                            }),
                        ))
                    }
                    _ => None,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use dispatch_proto::{ActionState, BatteryState};

    fn header() -> Header {
        Header {
            header_id: 0,
            timestamp: Utc::now(),
            version: "1.1.0".into(),
            manufacturer: "acme".into(),
            serial_number: "carter01".into(),
        }
    }

    fn pose(x: f64) -> Pose {
        Pose { x, y: 0.0, theta: 0.0, map_id: "map".into() }
    }

    fn base_state(order_id: &str, last_node_id: &str) -> StateMessage {
        StateMessage {
            header: header(),
            order_id: Some(order_id.into()),
            order_update_id: Some(0),
            last_node_id: last_node_id.into(),
            last_node_sequence_id: 0,
            node_states: vec![],
            edge_states: vec![],
            action_states: vec![],
            agv_position: None,
            battery_state: BatteryState { battery_charge: 1.0 },
            errors: vec![],
            operating_mode: None,
        }
    }

    #[test]
    fn route_completes_when_last_node_reaches_final_waypoint() {
        let mut seq = Sequencer::new("m1-order");
        let order = seq.append_route(header(), "leg1", &pose(0.0), &[pose(1.0), pose(2.0)], 0);
        assert_eq!(order.nodes.len(), 3); // anchor + 2 waypoints
        assert_eq!(order.order_update_id, 0);
        assert!(!order.nodes[0].released, "anchor node must stay unreleased");
        assert_eq!(order.nodes[0].sequence_id, 0);

        let mut state = base_state("m1-order", "leg1-n0");
        assert_eq!(seq.observe_state(&state), None);

        state.last_node_id = "leg1-n1".into();
        assert_eq!(seq.observe_state(&state), Some((TraversalState::Success, None)));
    }

    #[test]
    fn action_completes_on_finished_action_state() {
        let mut seq = Sequencer::new("m1-order");
        let _ = seq
            .append_action(header(), "pick", &pose(0.0), "pick_item", &serde_json::json!({}), BlockingType::Hard, 0)
            .unwrap();

        let mut state = base_state("m1-order", "start");
        state.action_states = vec![ActionState {
            action_id: "pick".into(),
            action_status: ActionStatus::Running,
            result_description: None,
        }];
        assert_eq!(seq.observe_state(&state), None);

        state.action_states[0].action_status = ActionStatus::Finished;
        assert_eq!(seq.observe_state(&state), Some((TraversalState::Success, None)));
    }

    #[test]
    fn second_leaf_appends_rather_than_replaces() {
        let mut seq = Sequencer::new("m1-order");
        let first = seq.append_route(header(), "leg1", &pose(0.0), &[pose(1.0)], 0);
        assert_eq!(first.nodes.len(), 2);

        let state = base_state("m1-order", "leg1-n0");
        assert_eq!(seq.observe_state(&state), Some((TraversalState::Success, None)));

        let second = seq.append_route(header(), "leg2", &pose(1.0), &[pose(3.0)], 0);
        assert_eq!(second.nodes.len(), 3, "earlier nodes must remain in the tail-appended order");
        assert_eq!(second.order_update_id, 1);
    }

    #[test]
    fn anchor_uses_robots_reported_last_node_sequence_id() {
        let mut seq = Sequencer::new("m1-order");
        let order = seq.append_route(header(), "leg1", &pose(0.0), &[pose(1.0)], 4);
        assert_eq!(order.nodes[0].sequence_id, 4);
        assert!(!order.nodes[0].released);
        assert_eq!(order.nodes[1].sequence_id, 6, "released nodes resume numbering above the anchor");
    }

    #[test]
    fn cancel_ack_observed_independently_of_pending_leaf() {
        let mut seq = Sequencer::new("m1-order");
        let _ = seq.append_route(header(), "leg1", &pose(0.0), &[pose(1.0)], 0);

        let mut state = base_state("m1-order", "start");
        assert_eq!(seq.observe_cancel_ack(&state), None);

        state.action_states = vec![ActionState { action_id: "m1-order-cancel".into(), action_status: ActionStatus::Finished, result_description: None }];
        assert_eq!(seq.observe_cancel_ack(&state), Some(true));

        state.action_states[0].action_status = ActionStatus::Failed;
        assert_eq!(seq.observe_cancel_ack(&state), Some(false));
    }
}
