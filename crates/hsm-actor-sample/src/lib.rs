//! # hsm-actor-sample
//!
//! A small machine-automation cell built on the `hsm-actor` runtime: a
//! powered [`door`] with travel deadlines and an obstruction budget, and a
//! [`conveyor`] interlocked against it. The conveyor may only run while
//! the door is fully open; it halts when the door starts closing and
//! faults when the door trips.
//!
//! The [`clients`] module wraps both agents in typed clients, and
//! [`lifecycle::setup_tracing`] wires the log output for the demo binary.

pub mod clients;
pub mod conveyor;
pub mod door;
pub mod lifecycle;
pub mod model;

pub use clients::{ControlError, ConveyorClient, DoorClient};
pub use conveyor::{ConveyorCall, ConveyorController, ConveyorState, ConveyorTrigger};
pub use door::{DoorCall, DoorController, DoorState, DoorTrigger};
pub use model::{ConveyorReport, DoorReport};
