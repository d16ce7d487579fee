//! Domain model, mission tree interpreter, order sequencer, robot
//! supervisor and per-robot mission controller (components C4-C7).

pub mod channel;
pub mod controller;
pub mod domain;
pub mod interpreter;
pub mod sequencer;
pub mod supervisor;
pub mod validate;

pub use channel::{Availability, RobotChannel, RobotEvent};
pub use controller::{Command, MissionRun, RobotController};
pub use interpreter::{Interpreter, StepOutcome};
pub use sequencer::Sequencer;
pub use supervisor::RobotSupervisor;
pub use validate::{validate, MissionNodeInput, ValidatedTree, ValidationError};
