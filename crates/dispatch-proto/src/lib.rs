//! VDA5050 wire types and topic/header plumbing (component C1).
//!
//! Encodes and decodes the five VDA5050 message kinds exchanged with a
//! robot over MQTT (Order, InstantActions, State, Connection, Factsheet),
//! and owns topic naming and per-topic headerId stamping.

mod action;
mod connection;
mod error;
mod factsheet;
mod header;
mod instant_actions;
mod order;
mod state;
mod topic;

pub use action::{Action, ActionParameter, BlockingType};
pub use connection::{ConnectionMessage, ConnectionState};
pub use error::CodecError;
pub use factsheet::{hash_factsheet, FactsheetMessage};
pub use header::{Header, HeaderStamper};
pub use instant_actions::InstantActionsMessage;
pub use order::{NodePosition, Order, OrderEdge, OrderNode};
pub use state::{ActionState, ActionStatus, AgvPosition, BatteryState, EdgeState, NodeState, StateMessage, VdaError, VdaErrorLevel};
pub use topic::{Channel, Topic};

/// Protocol interface version this codec speaks on the wire.
pub const VDA5050_VERSION: &str = "1.1.0";
