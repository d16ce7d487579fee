//! The per-robot mission controller (C7, spec §4.7): one task per robot
//! that starts missions, drives the interpreter/sequencer against
//! incoming telemetry, applies timeouts and cancellation, and writes
//! mission/robot status back to the Object Store.
//!
//! The step logic (`MissionRun`) is kept synchronous and I/O-free so it
//! can be exercised directly in tests; `RobotController::run` is the thin
//! async shell that wires it to a `RobotChannel` and an `ObjectStore`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dispatch_proto::{BlockingType, Header, HeaderStamper};
use dispatch_store::{Kind, ObjectStore};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::channel::{RobotChannel, RobotEvent};
use crate::domain::{error_codes, MissionSpec, MissionState, MissionStatus, NodeKind, RobotSpec, ROOT};
use crate::interpreter::{Interpreter, StepOutcome};
use crate::sequencer::Sequencer;
use crate::supervisor::RobotSupervisor;
use crate::validate::{self, MissionNodeInput, ValidatedTree};

/// What the controller must do next after a step of the run loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    DispatchRoute { leaf: String },
    DispatchAction { leaf: String },
    SendCancel,
    Finalize(MissionState),
    Noop,
}

/// Pure mission-run state machine: interpreter + sequencer + timing
/// policy, with no knowledge of MQTT or the Object Store.
pub struct MissionRun {
    pub mission_name: String,
    spec: MissionSpec,
    tree: ValidatedTree,
    interpreter: Interpreter,
    pub sequencer: Sequencer,
    pub status: MissionStatus,
    pending_leaf: Option<String>,
    deadline: Option<DateTime<Utc>>,
    cancel_requested: bool,
    cancel_sent_at: Option<DateTime<Utc>>,
    cancel_timeout_s: u64,
}

impl MissionRun {
    pub fn start(
        mission_name: String,
        spec: MissionSpec,
        order_id: String,
        now: DateTime<Utc>,
        cancel_timeout_s: u64,
    ) -> Result<(Self, Command), validate::ValidationError> {
        let inputs: Vec<MissionNodeInput> =
            spec.mission_tree.iter().map(|n| MissionNodeInput { name: n.name.clone(), parent: n.parent.clone(), kind: n.kind.clone() }).collect();
        let tree = validate::validate(inputs)?;

        let deadline = spec.deadline.or_else(|| Some(now + chrono::Duration::seconds(spec.timeout_s as i64)));

        let mut run = Self {
            mission_name,
            spec,
            tree,
            interpreter: Interpreter::new(),
            sequencer: Sequencer::new(order_id.clone()),
            status: MissionStatus {
                state: Some(MissionState::Running),
                start_ts: Some(now),
                order_id: Some(order_id),
                ..Default::default()
            },
            pending_leaf: None,
            deadline,
            cancel_requested: false,
            cancel_sent_at: None,
            cancel_timeout_s,
        };

        // A mission born already marked for cancellation (spec §8 invariant
        // 6) never reaches the robot: no Order is ever dispatched for it.
        if run.spec.needs_canceled {
            let command = run.finish(MissionState::Canceled);
            return Ok((run, command));
        }
        if let Some(deadline) = run.deadline {
            if deadline <= now {
                run.status.node_status.entry(ROOT.to_string()).or_default().error = Some(error_codes::DEADLINE_EXCEEDED.to_string());
                let command = run.finish(MissionState::Failed);
                return Ok((run, command));
            }
        }

        let outcome = run.interpreter.start(&run.tree);
        let command = run.apply_outcome(outcome);
        Ok((run, command))
    }

    pub fn request_cancel(&mut self) {
        self.cancel_requested = true;
    }

    fn apply_outcome(&mut self, outcome: StepOutcome) -> Command {
        self.sync_node_status();
        match outcome {
            StepOutcome::RunLeaf(leaf) => {
                self.pending_leaf = Some(leaf.clone());
                match self.tree.node(&leaf).map(|n| &n.kind) {
                    Some(NodeKind::Route { .. }) => Command::DispatchRoute { leaf },
                    Some(NodeKind::Action { .. }) => Command::DispatchAction { leaf },
                    _ => unreachable!("interpreter only yields leaf nodes"),
                }
            }
            StepOutcome::Done(result) => {
                self.pending_leaf = None;
                let final_state = match result {
                    crate::domain::TraversalState::Success => MissionState::Completed,
                    _ => MissionState::Failed,
                };
                self.finish(final_state)
            }
        }
    }

    fn finish(&mut self, state: MissionState) -> Command {
        self.status.state = Some(state);
        self.status.end_ts = Some(Utc::now());
        self.status.current_node = None;
        Command::Finalize(state)
    }

    fn sync_node_status(&mut self) {
        self.status.current_node = self.pending_leaf.clone();
        for (name, state) in self.interpreter.states() {
            self.status.node_status.entry(name.clone()).or_default().state = Some(*state);
        }
    }

    /// Looks up the leaf node the controller is meant to dispatch next.
    pub fn pending_node(&self) -> Option<&crate::domain::MissionNode> {
        self.pending_leaf.as_deref().and_then(|n| self.tree.node(n))
    }

    pub fn pending_leaf_name(&self) -> Option<&str> {
        self.pending_leaf.as_deref()
    }

    /// Feeds one inbound State message through the sequencer and, if the
    /// pending leaf resolved, advances the interpreter.
    pub fn on_state(&mut self, state: &dispatch_proto::StateMessage) -> Command {
        if self.cancel_requested {
            match self.sequencer.observe_cancel_ack(state) {
                Some(true) => return self.finish(MissionState::Canceled),
                Some(false) => {
                    if let Some(leaf) = self.pending_leaf.clone() {
                        self.status.node_status.entry(leaf).or_default().error = Some(error_codes::CANCEL_FAILED.to_string());
                    }
                    return self.finish(MissionState::Canceled);
                }
                None => {}
            }
        }
        let Some((result, error)) = self.sequencer.observe_state(state) else {
            return Command::Noop;
        };
        if let Some(leaf) = self.pending_leaf.clone() {
            if let Some(err) = error {
                self.status.node_status.entry(leaf.clone()).or_default().error = Some(err.code.clone());
            }
            let outcome = self.interpreter.complete(&self.tree, &leaf, result);
            self.apply_outcome(outcome)
        } else {
            Command::Noop
        }
    }

    /// Applies a robot-unavailable/offline failure to the currently
    /// pending leaf, as the controller decides once `heartbeat_timeout_s`
    /// has elapsed past `offline_since` (spec §4.4/§4.7).
    pub fn fail_pending_leaf(&mut self, code: &str, description: impl Into<String>) -> Command {
        let Some(leaf) = self.pending_leaf.clone() else { return Command::Noop };
        self.status.node_status.entry(leaf.clone()).or_default().error = Some(code.to_string());
        let _ = description.into();
        let outcome = self.interpreter.complete(&self.tree, &leaf, crate::domain::TraversalState::Failure);
        self.apply_outcome(outcome)
    }

    /// Called periodically by the run loop; returns a terminal `Command`
    /// once the mission's deadline has passed or a cancel ack has timed
    /// out.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Command {
        if self.cancel_requested && self.cancel_sent_at.is_none() {
            self.cancel_sent_at = Some(now);
            return Command::SendCancel;
        }
        if let Some(sent_at) = self.cancel_sent_at {
            if now.signed_duration_since(sent_at).num_seconds() as u64 > self.cancel_timeout_s {
                if let Some(leaf) = self.pending_leaf.clone() {
                    self.status.node_status.entry(leaf).or_default().error = Some(error_codes::CANCEL_FAILED.to_string());
                }
                return self.finish(MissionState::Canceled);
            }
        }
        if let Some(deadline) = self.deadline {
            if now > deadline && self.status.state == Some(MissionState::Running) {
                return self.fail_pending_leaf(error_codes::DEADLINE_EXCEEDED, "mission deadline exceeded");
            }
        }
        Command::Noop
    }
}

/// One robot's live mission, if any, plus the supervisor tracking its
/// telemetry regardless of whether a mission is assigned.
pub struct RobotController<C: RobotChannel> {
    pub robot_serial: String,
    manufacturer: String,
    interface_version: String,
    topic_prefix: String,
    channel: C,
    store: Arc<dyn ObjectStore>,
    header_stamper: Arc<HeaderStamper>,
    supervisor: RobotSupervisor,
    robot_spec: RobotSpec,
    cancel_timeout_s: u64,
    current: Option<MissionRun>,
}

impl<C: RobotChannel> RobotController<C> {
    pub fn new(
        robot_serial: String,
        manufacturer: String,
        interface_version: String,
        topic_prefix: String,
        channel: C,
        store: Arc<dyn ObjectStore>,
        header_stamper: Arc<HeaderStamper>,
        robot_spec: RobotSpec,
        cancel_timeout_s: u64,
    ) -> Self {
        Self {
            robot_serial,
            manufacturer,
            interface_version,
            topic_prefix,
            channel,
            store,
            header_stamper,
            supervisor: RobotSupervisor::new(robot_spec.battery_critical_level),
            robot_spec,
            cancel_timeout_s,
            current: None,
        }
    }

    fn order_topic(&self) -> String {
        format!("{}/{}/{}/{}/order", self.topic_prefix, self.interface_version, self.manufacturer, self.robot_serial)
    }

    fn instant_actions_topic(&self) -> String {
        format!("{}/{}/{}/{}/instantActions", self.topic_prefix, self.interface_version, self.manufacturer, self.robot_serial)
    }

    fn stamp(&self, topic: &str) -> Header {
        self.header_stamper.stamp(topic, &self.manufacturer, &self.robot_serial, dispatch_proto::VDA5050_VERSION)
    }

    async fn apply(&mut self, mission_name: &str, command: Command) -> anyhow::Result<()> {
        let status = match (&command, &self.current) {
            (Command::Noop, _) => return Ok(()),
            _ => self.current.as_ref().map(|r| r.status.clone()),
        };

        if let Some(status) = status {
            self.patch_mission_status(mission_name, status).await;
        }

        match command {
            Command::DispatchRoute { leaf } => self.dispatch_route(&leaf).await,
            Command::DispatchAction { leaf } => self.dispatch_action(&leaf).await,
            Command::SendCancel => self.dispatch_cancel().await,
            Command::Finalize(state) => {
                info!(mission = mission_name, ?state, "mission finished");
                self.supervisor.set_running_order(false);
                self.current = None;
                Ok(())
            }
            Command::Noop => Ok(()),
        }
    }

    async fn dispatch_route(&mut self, leaf: &str) -> anyhow::Result<()> {
        let start = self.supervisor.status().pose.clone().unwrap_or(crate::domain::Pose { x: 0.0, y: 0.0, theta: 0.0, map_id: "unknown".into() });
        let last_node_sequence_id = self.supervisor.last_node_sequence_id();
        let header = self.stamp(&self.order_topic());
        let run = self.current.as_mut().expect("dispatch only happens with a current run");
        let node = run.tree.node(leaf).expect("pending leaf exists in tree");
        let NodeKind::Route { waypoints } = &node.kind else { unreachable!() };
        let order = run.sequencer.append_route(header, leaf, &start, waypoints, last_node_sequence_id);
        self.supervisor.set_running_order(true);
        self.channel.publish_order(&order).await
    }

    async fn dispatch_action(&mut self, leaf: &str) -> anyhow::Result<()> {
        let pose = self.supervisor.status().pose.clone().unwrap_or(crate::domain::Pose { x: 0.0, y: 0.0, theta: 0.0, map_id: "unknown".into() });
        let last_node_sequence_id = self.supervisor.last_node_sequence_id();
        let header = self.stamp(&self.order_topic());
        let run = self.current.as_mut().expect("dispatch only happens with a current run");
        let node = run.tree.node(leaf).expect("pending leaf exists in tree");
        let NodeKind::Action { action_type, action_parameters } = &node.kind else { unreachable!() };
        let order = run.sequencer.append_action(header, leaf, &pose, action_type, action_parameters, BlockingType::Hard, last_node_sequence_id)?;
        self.supervisor.set_running_order(true);
        self.channel.publish_order(&order).await
    }

    async fn dispatch_cancel(&mut self) -> anyhow::Result<()> {
        let run = self.current.as_ref().expect("cancel only happens with a current run");
        let header = self.stamp(&self.instant_actions_topic());
        let msg = run.sequencer.build_cancel(header);
        self.channel.publish_instant_actions(&msg).await
    }

    async fn patch_mission_status(&self, mission_name: &str, status: MissionStatus) {
        if let Ok(Some(obj)) = self.store.get(Kind::Mission, mission_name).await {
            let value = serde_json::to_value(&status).unwrap_or(serde_json::Value::Null);
            if let Err(err) = self.store.patch_status(Kind::Mission, mission_name, obj.version, value).await {
                warn!(mission = mission_name, error = %err, "failed to patch mission status");
            }
        }
    }

    async fn patch_robot_status(&self) {
        if let Ok(Some(obj)) = self.store.get(Kind::Robot, &self.robot_serial).await {
            let value = serde_json::to_value(self.supervisor.status()).unwrap_or(serde_json::Value::Null);
            if let Err(err) = self.store.patch_status(Kind::Robot, &self.robot_serial, obj.version, value).await {
                warn!(robot = %self.robot_serial, error = %err, "failed to patch robot status");
            }
        }
    }

    /// Starts a new mission run for this robot and dispatches its first
    /// leaf.
    pub async fn start_mission(&mut self, mission_name: String, spec: MissionSpec) -> anyhow::Result<()> {
        let order_id = format!("{}-{}", mission_name, uuid::Uuid::new_v4());
        let (run, command) = MissionRun::start(mission_name.clone(), spec, order_id, Utc::now(), self.cancel_timeout_s)
            .map_err(|e| anyhow::anyhow!("mission validation failed: {e}"))?;
        self.current = Some(run);
        self.supervisor.set_last_mission(Some(mission_name.clone()));
        self.apply(&mission_name, command).await
    }

    /// The robot-facing event/timer loop for this controller. Runs until
    /// `shutdown` fires or the channel closes.
    pub async fn run(mut self, mut assignment: watch::Receiver<Option<(String, MissionSpec)>>, shutdown: CancellationToken) {
        let mut tick = tokio::time::interval(Duration::from_millis(500));
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!(robot = %self.robot_serial, "controller shutting down");
                    break;
                }
                changed = assignment.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let assigned = assignment.borrow().clone();
                    if let Some((name, spec)) = assigned {
                        if self.current.is_none() {
                            if let Err(err) = self.start_mission(name, spec).await {
                                warn!(robot = %self.robot_serial, error = %err, "failed to start mission");
                            }
                        }
                    } else if let Some(run) = self.current.as_mut() {
                        run.request_cancel();
                    }
                }
                event = self.channel.next_event() => {
                    match event {
                        Some(RobotEvent::State(state)) => {
                            self.supervisor.on_state(&state, Utc::now());
                            self.patch_robot_status().await;
                            if let Some(run) = self.current.as_mut() {
                                let mission_name = run.mission_name.clone();
                                let command = run.on_state(&state);
                                if let Err(err) = self.apply(&mission_name, command).await {
                                    warn!(robot = %self.robot_serial, error = %err, "failed to apply command");
                                }
                            }
                        }
                        Some(RobotEvent::Connection(msg)) => {
                            self.supervisor.on_connection(&msg, Utc::now());
                            self.patch_robot_status().await;
                        }
                        Some(RobotEvent::Factsheet(msg)) => {
                            self.supervisor.on_factsheet(&msg);
                            self.patch_robot_status().await;
                        }
                        Some(RobotEvent::Backpressure) => {
                            if let Some(run) = self.current.as_mut() {
                                let mission_name = run.mission_name.clone();
                                let command = run.fail_pending_leaf(error_codes::TRANSPORT_BACKPRESSURE, "outbound queue overflowed");
                                let _ = self.apply(&mission_name, command).await;
                            }
                        }
                        None => {
                            info!(robot = %self.robot_serial, "robot channel closed");
                            break;
                        }
                    }
                }
                _ = tick.tick() => {
                    let now = Utc::now();
                    if let Some(timeout_s) = self.supervisor.offline_since().map(|since| now.signed_duration_since(since).num_seconds() as u64) {
                        if timeout_s > self.robot_spec.heartbeat_timeout_s {
                            if let Some(run) = self.current.as_mut() {
                                let mission_name = run.mission_name.clone();
                                let command = run.fail_pending_leaf(error_codes::ROBOT_OFFLINE, "robot heartbeat timed out");
                                let _ = self.apply(&mission_name, command).await;
                            }
                        }
                    }
                    if let Some(run) = self.current.as_mut() {
                        let mission_name = run.mission_name.clone();
                        let command = run.tick(now);
                        let _ = self.apply(&mission_name, command).await;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MissionNodeSpec, Pose};
    use dispatch_proto::{ActionState, ActionStatus, BatteryState};

    const CANCEL_TIMEOUT_S: u64 = 15;

    fn header() -> Header {
        Header { header_id: 0, timestamp: Utc::now(), version: "1.1.0".into(), manufacturer: "acme".into(), serial_number: "carter01".into() }
    }

    fn route_mission() -> MissionSpec {
        MissionSpec {
            robot: "carter01".into(),
            mission_tree: vec![MissionNodeSpec {
                name: Some("leg1".into()),
                parent: Some(crate::domain::ROOT.to_string()),
                kind: NodeKind::Route { waypoints: vec![Pose { x: 1.0, y: 0.0, theta: 0.0, map_id: "map".into() }] },
            }],
            timeout_s: 60,
            deadline: None,
            needs_canceled: false,
        }
    }

    fn start(spec: MissionSpec) -> (MissionRun, Command) {
        MissionRun::start("m1".into(), spec, "m1-order".into(), Utc::now(), CANCEL_TIMEOUT_S).unwrap()
    }

    #[test]
    fn start_emits_dispatch_route_for_first_leaf() {
        let (run, command) = start(route_mission());
        assert_eq!(command, Command::DispatchRoute { leaf: "leg1".into() });
        assert_eq!(run.status.state, Some(MissionState::Running));
    }

    #[test]
    fn completing_last_leaf_finalizes_mission_completed() {
        let (mut run, _) = start(route_mission());
        let start_pose = Pose { x: 0.0, y: 0.0, theta: 0.0, map_id: "map".into() };
        let order = run.sequencer.append_route(header(), "leg1", &start_pose, &[Pose { x: 1.0, y: 0.0, theta: 0.0, map_id: "map".into() }], 0);
        let final_node = order.nodes.last().unwrap().node_id.clone();

        let state = dispatch_proto::StateMessage {
            header: header(),
            order_id: Some("m1-order".into()),
            order_update_id: Some(0),
            last_node_id: final_node,
            last_node_sequence_id: 0,
            node_states: vec![],
            edge_states: vec![],
            action_states: vec![],
            agv_position: None,
            battery_state: BatteryState { battery_charge: 0.9 },
            errors: vec![],
            operating_mode: None,
        };
        let command = run.on_state(&state);
        assert_eq!(command, Command::Finalize(MissionState::Completed));
        assert_eq!(run.status.state, Some(MissionState::Completed));
    }

    #[test]
    fn robot_offline_failure_finalizes_mission_failed() {
        let (mut run, _) = start(route_mission());
        let command = run.fail_pending_leaf(error_codes::ROBOT_OFFLINE, "timed out");
        assert_eq!(command, Command::Finalize(MissionState::Failed));
    }

    #[test]
    fn cancel_request_emits_send_cancel_then_times_out_to_canceled() {
        let (mut run, _) = start(route_mission());
        run.request_cancel();
        let t0 = Utc::now();
        assert_eq!(run.tick(t0), Command::SendCancel);
        assert_eq!(run.tick(t0), Command::Noop);
        let later = t0 + chrono::Duration::seconds(CANCEL_TIMEOUT_S as i64 + 1);
        assert_eq!(run.tick(later), Command::Finalize(MissionState::Canceled));
        assert_eq!(run.status.node_status.get("leg1").unwrap().error.as_deref(), Some(error_codes::CANCEL_FAILED));
    }

    #[test]
    fn cancel_ack_finished_finalizes_mission_canceled() {
        let (mut run, _) = start(route_mission());
        run.sequencer.append_route(header(), "leg1", &Pose { x: 0.0, y: 0.0, theta: 0.0, map_id: "map".into() }, &[Pose { x: 1.0, y: 0.0, theta: 0.0, map_id: "map".into() }], 0);
        run.request_cancel();
        run.tick(Utc::now());

        let mut state = dispatch_proto::StateMessage {
            header: header(),
            order_id: Some("m1-order".into()),
            order_update_id: Some(0),
            last_node_id: "start".into(),
            last_node_sequence_id: 0,
            node_states: vec![],
            edge_states: vec![],
            action_states: vec![],
            agv_position: None,
            battery_state: BatteryState { battery_charge: 0.9 },
            errors: vec![],
            operating_mode: None,
        };
        state.action_states = vec![ActionState { action_id: "m1-order-cancel".into(), action_status: ActionStatus::Finished, result_description: None }];
        let command = run.on_state(&state);
        assert_eq!(command, Command::Finalize(MissionState::Canceled));
    }

    #[test]
    fn needs_canceled_short_circuits_to_canceled_without_dispatch() {
        let mut spec = route_mission();
        spec.needs_canceled = true;
        let (run, command) = start(spec);
        assert_eq!(command, Command::Finalize(MissionState::Canceled));
        assert_eq!(run.status.state, Some(MissionState::Canceled));
    }

    #[test]
    fn deadline_already_passed_short_circuits_to_failed_without_dispatch() {
        let mut spec = route_mission();
        spec.deadline = Some(Utc::now() - chrono::Duration::seconds(1));
        let (run, command) = start(spec);
        assert_eq!(command, Command::Finalize(MissionState::Failed));
        assert_eq!(run.status.node_status.get(ROOT).unwrap().error.as_deref(), Some(error_codes::DEADLINE_EXCEEDED));
    }

    #[test]
    fn action_leaf_failure_reports_node_error() {
        let mut spec = route_mission();
        spec.mission_tree = vec![MissionNodeSpec {
            name: Some("pick".into()),
            parent: Some(crate::domain::ROOT.to_string()),
            kind: NodeKind::Action { action_type: "pick_item".into(), action_parameters: serde_json::json!({}) },
        }];
        let (mut run, _) = start(spec);
        let pose = Pose { x: 0.0, y: 0.0, theta: 0.0, map_id: "map".into() };
        run.sequencer.append_action(header(), "pick", &pose, "pick_item", &serde_json::json!({}), BlockingType::Hard, 0).unwrap();

        let state = dispatch_proto::StateMessage {
            header: header(),
            order_id: Some("m1-order".into()),
            order_update_id: Some(0),
            last_node_id: "start".into(),
            last_node_sequence_id: 0,
            node_states: vec![],
            edge_states: vec![],
            action_states: vec![ActionState { action_id: "pick".into(), action_status: ActionStatus::Failed, result_description: Some("gripper jam".into()) }],
            agv_position: None,
            battery_state: BatteryState { battery_charge: 0.9 },
            errors: vec![],
            operating_mode: None,
        };
        let command = run.on_state(&state);
        assert_eq!(command, Command::Finalize(MissionState::Failed));
        assert_eq!(run.status.node_status.get("pick").unwrap().error.as_deref(), Some(error_codes::ACTION_FAILED));
    }
}
