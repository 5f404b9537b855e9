use std::{net::SocketAddr, time::Duration};

use serde::Deserialize;

use crate::TaskStatusConfig;

#[derive(Debug, Deserialize)]
pub struct PixhawkConfig {
    /// Local UDP address to bind. The first peer that sends a packet becomes
    /// the vehicle link.
    pub address: SocketAddr,

    /// MAVLink protocol version, "V1" or "V2".
    pub mavlink: String,

    #[serde(default = "default_system_id")]
    pub system_id: u8,

    #[serde(default = "default_component_id")]
    pub component_id: u8,

    /// The link is considered lost when no autopilot heartbeat arrives for
    /// this long (milliseconds).
    #[serde(default = "default_heartbeat_timeout", with = "serde_millis")]
    pub heartbeat_timeout: Duration,

    /// How long to wait for a COMMAND_ACK (milliseconds).
    #[serde(default = "default_command_timeout", with = "serde_millis")]
    pub command_timeout: Duration,

    pub task_status: Option<TaskStatusConfig>,
}

fn default_system_id() -> u8 {
    1
}

// MAV_COMP_ID_ONBOARD_COMPUTER
fn default_component_id() -> u8 {
    191
}

fn default_heartbeat_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_command_timeout() -> Duration {
    Duration::from_millis(1500)
}
