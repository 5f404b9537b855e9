use ms_types::{FlightMode, Vector3};

use crate::TaskStatusChange;

#[derive(Debug, Clone)]
pub enum PixhawkEvent {
    /// An autopilot heartbeat. Receiving one means the link is up.
    State { armed: bool, mode: FlightMode },
    /// No autopilot heartbeat within the configured timeout.
    LinkLost,
    /// Local position, already converted to ENU.
    Position { position: Vector3 },
    TaskStatus(TaskStatusChange),
}
