//! MQTT transport (C2): connection lifecycle with jittered exponential
//! backoff, per-robot bounded outbound queues with a dedicated serializer
//! task each, and inbound demultiplexing by robot serial.

mod backoff;
mod client;
mod error;
mod queue;

pub use backoff::BackoffConfig;
pub use client::{MqttTransport, RobotHandle, CONTROLLER_SERIAL};
pub use error::TransportError;
pub use queue::{OutboundQueue, QueuedMessage};
