//! The seam between the domain/controller layer and the MQTT transport.
//!
//! `dispatch-transport` depends on `dispatch-proto`, and `dispatch-core`
//! needs to both build VDA5050 messages (via `dispatch-proto`) and publish
//! them without creating a `dispatch-core` <-> `dispatch-transport` cycle.
//! `RobotChannel` is the trait `dispatch-transport` implements and
//! `mission-dispatch` wires up; it is the one seam in this crate that
//! uses `anyhow::Error` rather than a `thiserror` enum, since the
//! controller only ever needs to know "did the send succeed" and
//! transport failure detail belongs in the log, not in branching logic.

use async_trait::async_trait;
use dispatch_proto::{InstantActionsMessage, Order};

use crate::domain::RobotState;

/// What the controller needs from the transport for one robot: publish
/// outbound VDA5050 messages and receive a live feed of everything the
/// robot reports. Implemented by `dispatch-transport`'s MQTT client;
/// mocked directly in controller tests.
#[async_trait]
pub trait RobotChannel: Send + Sync {
    async fn publish_order(&self, order: &Order) -> anyhow::Result<()>;
    async fn publish_instant_actions(&self, actions: &InstantActionsMessage) -> anyhow::Result<()>;

    /// Pulls the next inbound event for this robot, or `None` once the
    /// channel has been torn down (robot deleted / controller shutting
    /// down).
    async fn next_event(&mut self) -> Option<RobotEvent>;
}

/// One event demultiplexed to this robot's mailbox by the transport's
/// single MQTT receive task.
#[derive(Debug, Clone)]
pub enum RobotEvent {
    State(dispatch_proto::StateMessage),
    Connection(dispatch_proto::ConnectionMessage),
    Factsheet(dispatch_proto::FactsheetMessage),
    /// The outbound queue for this robot overflowed and a non-critical
    /// message (an Order, never a cancel) was dropped.
    Backpressure,
}

/// Coarse, supervisor-computed summary of a robot's current disposition,
/// used by the controller to decide whether a leaf may be dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Available(RobotState),
    Offline,
    Unavailable,
}
