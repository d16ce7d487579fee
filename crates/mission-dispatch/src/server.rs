//! Top-level wiring: object store, MQTT transport, startup resume, and the
//! per-robot controller fleet, all driven from the two watch streams the
//! Object Store exposes (spec §4.8/§6).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dispatch_config::Config;
use dispatch_core::domain::{MissionSpec, MissionState, MissionStatus, RobotSpec};
use dispatch_core::{RobotChannel, RobotController};
use dispatch_proto::HeaderStamper;
use dispatch_reconcile::{resume_running_missions, BatchingObjectStore};
use dispatch_store::{Filter, HttpObjectStore, Kind, Lifecycle, ObjectEnvelope, ObjectStore, WatchEventKind};
use dispatch_transport::{MqttTransport, RobotHandle};
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::health::Metrics;

/// Collects State telemetry from already-registered robot handles for up
/// to `window`, used only during the startup resume phase (spec §4.8). The
/// handles are handed back afterwards so steady-state controllers can keep
/// reading from the same mailboxes without losing anything buffered while
/// we were looking for resume matches.
async fn collect_resume_events(
    handles: &mut HashMap<String, RobotHandle>,
    window: Duration,
) -> Vec<(String, dispatch_proto::StateMessage)> {
    let mut collected = Vec::new();
    let deadline = tokio::time::Instant::now() + window;

    loop {
        if tokio::time::Instant::now() >= deadline {
            break;
        }
        let mut pending: FuturesUnordered<_> = handles
            .iter_mut()
            .map(|(serial, handle)| {
                let serial = serial.clone();
                async move { (serial, handle.next_event().await) }
            })
            .collect();

        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => break,
            next = pending.next() => {
                match next {
                    Some((serial, Some(dispatch_core::RobotEvent::State(state)))) => {
                        collected.push((serial, state));
                    }
                    Some(_) => {}
                    None => break,
                }
            }
        }
    }
    collected
}

/// Reads a Robot envelope's `spec` into a `RobotSpec`, falling back to the
/// configured default heartbeat when the robot was created before this
/// field existed or carries a malformed spec.
fn robot_spec_of(envelope: &ObjectEnvelope, config: &Config) -> RobotSpec {
    serde_json::from_value(envelope.spec.clone()).unwrap_or(RobotSpec {
        battery_critical_level: RobotSpec::default().battery_critical_level,
        heartbeat_timeout_s: config.timeouts.heartbeat_timeout_default_s,
    })
}

async fn spawn_robot_controller(
    serial: String,
    robot_spec: RobotSpec,
    config: &Config,
    transport: &MqttTransport,
    store: Arc<dyn ObjectStore>,
    header_stamper: Arc<HeaderStamper>,
    shutdown: CancellationToken,
    handle: RobotHandle,
) -> (watch::Sender<Option<(String, MissionSpec)>>, JoinHandle<()>) {
    let (tx, rx) = watch::channel(None);
    let controller = RobotController::new(
        serial.clone(),
        config.mqtt.manufacturer.clone(),
        config.mqtt.interface_version.clone(),
        config.mqtt.prefix.clone(),
        handle,
        store,
        header_stamper,
        robot_spec,
        config.timeouts.cancel_timeout_s,
    );
    let task = tokio::spawn(controller.run(rx, shutdown));
    (tx, task)
}

/// One robot's missions currently eligible for selection (spec §4.7.1 C7
/// "Select"): `lifecycle == CREATED` and `state` is absent or `PENDING`.
/// `version` stands in for creation time, which `ObjectEnvelope` doesn't
/// carry explicitly but which only ever increases per object.
#[derive(Clone)]
struct PendingMission {
    spec: MissionSpec,
    version: u64,
}

/// Earliest-deadline-first selection among a robot's pending missions,
/// nulls (no deadline) sorted last, ties broken by ascending `version`.
fn select_pending(pending: &HashMap<String, PendingMission>) -> Option<(String, MissionSpec)> {
    pending
        .iter()
        .min_by_key(|(_, pm)| (pm.spec.deadline.is_none(), pm.spec.deadline, pm.version))
        .map(|(name, pm)| (name.clone(), pm.spec.clone()))
}

/// Runs the fleet forever (until `shutdown` fires), returning once every
/// robot controller has wound down.
pub async fn run(config: Config, metrics: Arc<Metrics>, shutdown: CancellationToken) -> anyhow::Result<()> {
    let raw_store = Arc::new(HttpObjectStore::new(config.database_url.clone()));
    let batching = BatchingObjectStore::new(raw_store, Duration::from_millis(config.ambient.status_flush_interval_ms));
    let store: Arc<dyn ObjectStore> = batching.clone();

    let (transport, _mqtt_task) = MqttTransport::connect(config.mqtt.clone());
    let header_stamper = Arc::new(HeaderStamper::new());

    // Register every currently known robot up front so the resume phase
    // below has somewhere to listen for State telemetry.
    let known_robots = store.list(Kind::Robot, &Filter::new()).await.unwrap_or_default();
    let mut handles = HashMap::new();
    let mut robot_specs: HashMap<String, RobotSpec> = HashMap::new();
    for robot in &known_robots {
        let handle = transport.register_robot(&robot.name, config.transport.backpressure_queue_size).await;
        handles.insert(robot.name.clone(), handle);
        robot_specs.insert(robot.name.clone(), robot_spec_of(robot, &config));
    }

    let resume_window = Duration::from_secs(config.timeouts.resume_timeout_s);
    let events = collect_resume_events(&mut handles, resume_window).await;
    let (tx, rx) = mpsc::channel(events.len().max(1));
    for event in events {
        let _ = tx.send(event).await;
    }
    drop(tx);
    let outcomes = resume_running_missions(store.as_ref(), rx, 0).await;
    for outcome in &outcomes {
        match &outcome.resumed_on {
            Some(serial) => info!(mission = %outcome.mission_name, robot = %serial, "resumed mission after restart"),
            None => warn!(mission = %outcome.mission_name, "mission not resumed, marked failed"),
        }
    }

    let mut assignments: HashMap<String, watch::Sender<Option<(String, MissionSpec)>>> = HashMap::new();
    let mut controller_tasks: HashMap<String, JoinHandle<()>> = HashMap::new();

    for (serial, handle) in handles {
        let robot_spec = robot_specs.get(&serial).cloned().unwrap_or_default();
        let (tx, task) = spawn_robot_controller(
            serial.clone(),
            robot_spec,
            &config,
            &transport,
            store.clone(),
            header_stamper.clone(),
            shutdown.clone(),
            handle,
        )
        .await;
        assignments.insert(serial.clone(), tx);
        controller_tasks.insert(serial, task);
    }

    let mut robot_watch = store.watch(Kind::Robot, None);
    let mut mission_watch = store.watch(Kind::Mission, None);
    let mut flush_tick = tokio::time::interval(Duration::from_millis(config.ambient.status_flush_interval_ms));

    // Per-robot missions currently eligible for selection, keyed by
    // mission name (spec §4.7.1 C7 "Select").
    let mut pending: HashMap<String, HashMap<String, PendingMission>> = HashMap::new();
    // The mission name last sent to each robot's assignment channel, so a
    // mission's own status-patch echoes back through this watch loop
    // without re-triggering `missions_started`.
    let mut last_dispatched: HashMap<String, String> = HashMap::new();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("fleet shutdown requested, waiting for robot controllers to drain");
                break;
            }
            _ = flush_tick.tick() => {
                batching.flush_due().await;
            }
            event = robot_watch.next() => {
                let Some(event) = event else { break };
                match event.event {
                    WatchEventKind::Add if !assignments.contains_key(&event.object.name) => {
                        let serial = event.object.name.clone();
                        let handle = transport.register_robot(&serial, config.transport.backpressure_queue_size).await;
                        let robot_spec = robot_spec_of(&event.object, &config);
                        let (tx, task) = spawn_robot_controller(
                            serial.clone(), robot_spec, &config, &transport, store.clone(), header_stamper.clone(), shutdown.clone(), handle,
                        ).await;
                        assignments.insert(serial.clone(), tx);
                        controller_tasks.insert(serial, task);
                    }
                    WatchEventKind::Delete => {
                        assignments.remove(&event.object.name);
                        pending.remove(&event.object.name);
                        last_dispatched.remove(&event.object.name);
                        if let Some(task) = controller_tasks.remove(&event.object.name) {
                            task.abort();
                        }
                        transport.deregister_robot(&event.object.name).await;
                    }
                    _ => {}
                }
            }
            event = mission_watch.next() => {
                let Some(event) = event else { break };
                let mission_name = event.object.name.clone();
                let Ok(spec) = serde_json::from_value::<MissionSpec>(event.object.spec.clone()) else { continue };
                let robot = spec.robot.clone();

                match event.event {
                    WatchEventKind::Add | WatchEventKind::Update => {
                        let status: MissionStatus = serde_json::from_value(event.object.status.clone()).unwrap_or_default();
                        let eligible = event.object.lifecycle == Lifecycle::Created
                            && matches!(status.state, None | Some(MissionState::Pending));
                        let robot_pending = pending.entry(robot.clone()).or_default();
                        if eligible {
                            robot_pending.insert(mission_name.clone(), PendingMission { spec, version: event.object.version });
                        } else {
                            robot_pending.remove(&mission_name);
                        }

                        // PendingDelete is the only lifecycle transition that
                        // must interrupt whatever is currently running on the
                        // robot; a mission merely leaving the pending set
                        // because it started running must not cancel it.
                        if event.object.lifecycle == Lifecycle::PendingDelete {
                            if let Some(tx) = assignments.get(&robot) {
                                let _ = tx.send(None);
                            }
                            last_dispatched.remove(&robot);
                        } else if let Some(tx) = assignments.get(&robot) {
                            if let Some((name, spec)) = select_pending(pending.get(&robot).unwrap()) {
                                // The watch stream also carries the echoes of
                                // our own status patches; only count this as
                                // a new dispatch when the selection actually
                                // changed for this robot.
                                if last_dispatched.get(&robot) != Some(&name) {
                                    metrics.mark_progress();
                                    metrics.missions_started.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                                    last_dispatched.insert(robot.clone(), name.clone());
                                }
                                let _ = tx.send(Some((name, spec)));
                            } else {
                                last_dispatched.remove(&robot);
                            }
                        }
                        // No matching robot registered; the mission stays
                        // PENDING until one shows up (spec §9 open question,
                        // resolved: never auto-fails).
                    }
                    WatchEventKind::Delete => {
                        if let Some(robot_pending) = pending.get_mut(&robot) {
                            robot_pending.remove(&mission_name);
                        }
                        if last_dispatched.get(&robot) == Some(&mission_name) {
                            last_dispatched.remove(&robot);
                        }
                        if let Some(tx) = assignments.get(&robot) {
                            let _ = tx.send(None);
                        }
                    }
                }
            }
        }
    }

    for (_, task) in controller_tasks {
        let _ = task.await;
    }
    Ok(())
}
