//! Status reports the controllers hand out to callers.

use serde::{Deserialize, Serialize};

/// Snapshot of a door controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoorReport {
    pub state: String,
    /// Completed open cycles.
    pub cycles: u32,
    /// Obstruction reports since the last reset.
    pub obstructions: u32,
    /// Accumulated seconds spent fully open.
    pub open_seconds: f64,
}

/// Snapshot of a conveyor controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConveyorReport {
    pub state: String,
    /// Belt travel since start, in millimeters.
    pub advanced_mm: f64,
}
