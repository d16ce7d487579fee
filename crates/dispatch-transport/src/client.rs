//! MQTT connection lifecycle, topic subscription and inbound
//! demultiplexing (C2, spec §4.2). One `rumqttc::AsyncClient`/`EventLoop`
//! pair serves the whole process; per-robot handles are registered
//! dynamically as the fleet's Robot objects appear.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dispatch_config::{MqttConfig, MqttTransport as MqttTransportKind};
use dispatch_core::{RobotChannel, RobotEvent};
use dispatch_proto::{Channel, ConnectionMessage, ConnectionState, FactsheetMessage, Header, InstantActionsMessage, Order, StateMessage, Topic};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio::sync::{mpsc, Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::backoff::BackoffConfig;
use crate::error::TransportError;
use crate::queue::{OutboundQueue, QueuedMessage};

/// The process's own presence topic, for a last-will OFFLINE announcement
/// (spec §4.2: "the controller announces its own presence with a
/// last-will").
pub const CONTROLLER_SERIAL: &str = "mission-dispatch";

fn build_mqtt_options(config: &MqttConfig, client_id: &str) -> MqttOptions {
    let mut opts = if config.transport == MqttTransportKind::Websockets {
        MqttOptions::new(client_id, format!("ws://{}:{}{}", config.host, config.port, config.ws_path), config.port)
    } else {
        MqttOptions::new(client_id, &config.host, config.port)
    };
    opts.set_keep_alive(Duration::from_secs(30));
    let will_topic = Topic::new(&config.prefix, &config.interface_version, &config.manufacturer, CONTROLLER_SERIAL, Channel::Connection).to_string();
    let will_payload = serde_json::to_vec(&ConnectionMessage {
        header: Header { header_id: 0, timestamp: chrono::Utc::now(), version: dispatch_proto::VDA5050_VERSION.to_string(), manufacturer: config.manufacturer.clone(), serial_number: CONTROLLER_SERIAL.to_string() },
        connection_state: ConnectionState::Offline,
    })
    .unwrap_or_default();
    opts.set_last_will(rumqttc::LastWill::new(will_topic, will_payload, QoS::AtLeastOnce, true));
    opts
}

struct RobotRegistration {
    events_tx: mpsc::Sender<RobotEvent>,
}

/// Owns the shared MQTT connection and the registry of per-robot
/// mailboxes the receive task demultiplexes into.
pub struct MqttTransport {
    client: AsyncClient,
    config: MqttConfig,
    registry: Arc<RwLock<HashMap<String, RobotRegistration>>>,
}

impl MqttTransport {
    /// Connects to the broker and spawns the single receive task. Returns
    /// the transport plus its background task's join handle, which the
    /// binary should hold (or abort on shutdown).
    pub fn connect(config: MqttConfig) -> (Self, JoinHandle<()>) {
        let options = build_mqtt_options(&config, CONTROLLER_SERIAL);
        let (client, eventloop) = AsyncClient::new(options, 256);

        let registry: Arc<RwLock<HashMap<String, RobotRegistration>>> = Arc::new(RwLock::new(HashMap::new()));
        let transport = Self { client: client.clone(), config: config.clone(), registry: registry.clone() };

        let wildcard_cfg = config.clone();
        let subscribe_client = client.clone();
        let handle = tokio::spawn(async move {
            // Subscribe once on startup; rumqttc re-subscribes automatically
            // is not guaranteed across reconnects, so we also resubscribe
            // whenever we observe a fresh ConnAck below.
            subscribe_all(&subscribe_client, &wildcard_cfg).await;
            run_receive_loop(eventloop, subscribe_client, wildcard_cfg, registry).await;
        });

        (transport, handle)
    }

    /// Registers a robot, returning the handle `dispatch-core`'s
    /// controller drives via the `RobotChannel` trait. `queue_capacity`
    /// is the per-robot outbound bound (spec §4.2 default 64).
    pub async fn register_robot(&self, serial: &str, queue_capacity: usize) -> RobotHandle {
        let (events_tx, events_rx) = mpsc::channel(256);
        self.registry.write().await.insert(serial.to_string(), RobotRegistration { events_tx: events_tx.clone() });

        let order_topic = Topic::new(&self.config.prefix, &self.config.interface_version, &self.config.manufacturer, serial, Channel::Order).to_string();
        let instant_actions_topic = Topic::new(&self.config.prefix, &self.config.interface_version, &self.config.manufacturer, serial, Channel::InstantActions).to_string();

        let handle = RobotHandle {
            client: self.client.clone(),
            queue: Arc::new(Mutex::new(OutboundQueue::new(queue_capacity))),
            notify: Arc::new(Notify::new()),
            events_tx,
            events_rx,
            order_topic,
            instant_actions_topic,
        };
        handle.spawn_serializer();
        handle
    }

    pub async fn deregister_robot(&self, serial: &str) {
        self.registry.write().await.remove(serial);
    }
}

async fn subscribe_all(client: &AsyncClient, config: &MqttConfig) {
    for channel in [Channel::State, Channel::Connection, Channel::Factsheet] {
        let wildcard = Topic::wildcard(&config.prefix, &config.interface_version, &config.manufacturer, channel);
        if let Err(err) = client.subscribe(&wildcard, QoS::AtLeastOnce).await {
            error!(topic = %wildcard, error = %err, "failed to subscribe");
        }
    }
}

async fn run_receive_loop(
    mut eventloop: rumqttc::EventLoop,
    client: AsyncClient,
    config: MqttConfig,
    registry: Arc<RwLock<HashMap<String, RobotRegistration>>>,
) {
    let backoff = BackoffConfig::default();
    let mut attempt: u32 = 0;

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                if attempt > 0 {
                    info!("mqtt reconnected, resubscribing");
                    subscribe_all(&client, &config).await;
                }
                attempt = 0;
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                attempt = 0;
                handle_publish(&config, &registry, &publish.topic, &publish.payload).await;
            }
            Ok(_) => {}
            Err(err) => {
                attempt += 1;
                let delay = backoff.delay_for_attempt(attempt);
                warn!(error = %err, attempt, delay_ms = delay.as_millis(), "mqtt connection error, backing off");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

async fn handle_publish(config: &MqttConfig, registry: &Arc<RwLock<HashMap<String, RobotRegistration>>>, topic: &str, payload: &[u8]) {
    let parsed = match Topic::parse(&config.prefix, &config.interface_version, &config.manufacturer, topic) {
        Ok(t) => t,
        Err(err) => {
            debug!(topic, error = %err, "ignoring message on unrecognized topic");
            return;
        }
    };

    let event = match parsed.channel {
        Channel::State => serde_json::from_slice::<StateMessage>(payload).ok().map(RobotEvent::State),
        Channel::Connection => serde_json::from_slice::<ConnectionMessage>(payload).ok().map(RobotEvent::Connection),
        Channel::Factsheet => serde_json::from_slice::<FactsheetMessage>(payload).ok().map(RobotEvent::Factsheet),
        Channel::Order | Channel::InstantActions => None,
    };

    let Some(event) = event else {
        warn!(topic, "failed to decode payload on recognized topic");
        return;
    };

    let registry = registry.read().await;
    if let Some(reg) = registry.get(&parsed.serial) {
        if reg.events_tx.send(event).await.is_err() {
            warn!(serial = %parsed.serial, "robot mailbox closed, dropping event");
        }
    } else {
        debug!(serial = %parsed.serial, "no controller registered for this robot yet");
    }
}

/// The `RobotChannel` implementation handed to `dispatch-core`'s
/// controller: enqueues outbound messages for this robot's dedicated
/// serializer task and exposes its inbound event mailbox.
pub struct RobotHandle {
    client: AsyncClient,
    queue: Arc<Mutex<OutboundQueue>>,
    notify: Arc<Notify>,
    events_tx: mpsc::Sender<RobotEvent>,
    events_rx: mpsc::Receiver<RobotEvent>,
    order_topic: String,
    instant_actions_topic: String,
}

impl RobotHandle {
    fn spawn_serializer(&self) {
        let client = self.client.clone();
        let queue = self.queue.clone();
        let notify = self.notify.clone();
        tokio::spawn(async move {
            loop {
                notify.notified().await;
                loop {
                    let next = { queue.lock().await.pop() };
                    let Some(msg) = next else { break };
                    if let Err(err) = client.publish(&msg.topic, msg.qos, false, msg.payload).await {
                        error!(topic = %msg.topic, error = %err, "failed to publish");
                    }
                }
            }
        });
    }

    async fn enqueue(&self, topic: String, payload: Vec<u8>, critical: bool) -> Result<(), TransportError> {
        let dropped = {
            let mut q = self.queue.lock().await;
            q.push(QueuedMessage { topic, payload, qos: QoS::AtLeastOnce, critical })
        };
        self.notify.notify_one();
        if dropped {
            let _ = self.events_tx.send(RobotEvent::Backpressure).await;
        }
        Ok(())
    }
}

#[async_trait]
impl RobotChannel for RobotHandle {
    async fn publish_order(&self, order: &Order) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(order).map_err(TransportError::Encode)?;
        self.enqueue(self.order_topic.clone(), payload, false).await?;
        Ok(())
    }

    async fn publish_instant_actions(&self, actions: &InstantActionsMessage) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(actions).map_err(TransportError::Encode)?;
        self.enqueue(self.instant_actions_topic.clone(), payload, true).await?;
        Ok(())
    }

    async fn next_event(&mut self) -> Option<RobotEvent> {
        self.events_rx.recv().await
    }
}
