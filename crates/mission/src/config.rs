use std::time::Duration;

use ms_pixhawk::LandParams;
use ms_types::{FlightMode, Vector3, Waypoint};
use serde::Deserialize;
use thiserror::Error;

/// The control link drops out of offboard mode below this setpoint rate.
pub const MIN_SETPOINT_RATE: f64 = 2.0;

/// Who is responsible for switching into the autonomous mode and arming.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ArmingFlow {
    /// The supervisor requests the autonomous mode, then arms.
    #[default]
    Autonomous,
    /// An operator switches mode and arms; the supervisor only follows.
    Manual,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct WaypointConfig {
    /// Local ENU position in meters.
    pub position: Vector3,

    /// Heading in radians, counter-clockwise from East.
    #[serde(default)]
    pub yaw: f64,
}

impl WaypointConfig {
    pub fn waypoint(&self) -> Waypoint {
        Waypoint::new(self.position, self.yaw)
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MissionConfig {
    /// Control loop and setpoint rate in Hz.
    pub rate: f64,

    /// Setpoints of the first waypoint sent before the mission starts.
    pub priming_setpoints: u32,

    /// Per-axis distance under which a waypoint counts as reached (meters).
    pub tolerance: f64,

    pub autonomous_mode: FlightMode,

    pub arming: ArmingFlow,

    /// Minimum time between mode switch requests (milliseconds).
    #[serde(with = "serde_millis")]
    pub mode_retry_interval: Duration,

    /// Minimum time between arm requests (milliseconds).
    #[serde(with = "serde_millis")]
    pub arm_retry_interval: Duration,

    /// Minimum time between land requests (milliseconds).
    #[serde(with = "serde_millis")]
    pub land_retry_interval: Duration,

    pub waypoint_a: WaypointConfig,
    pub waypoint_b: WaypointConfig,

    pub land: LandParams,
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self {
            rate: 20.0,
            priming_setpoints: 100,
            tolerance: 0.1,
            autonomous_mode: FlightMode::Offboard,
            arming: ArmingFlow::Autonomous,
            mode_retry_interval: Duration::from_secs(5),
            arm_retry_interval: Duration::from_secs(5),
            land_retry_interval: Duration::from_secs(5),
            waypoint_a: WaypointConfig {
                position: Vector3::new(0., 0., 5.),
                yaw: 0.,
            },
            waypoint_b: WaypointConfig {
                position: Vector3::new(0., 5., 5.),
                yaw: 0.,
            },
            land: LandParams::default(),
        }
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum MissionConfigError {
    #[error("setpoint rate {0} Hz is below the minimum of {MIN_SETPOINT_RATE} Hz")]
    RateTooLow(f64),
    #[error("tolerance must be a positive distance, got {0}")]
    InvalidTolerance(f64),
    #[error("at least one priming setpoint is required before switching modes")]
    NoPrimingSetpoints,
    #[error("flight mode {0} cannot be requested")]
    UnrequestableMode(FlightMode),
}

impl MissionConfig {
    pub fn validate(&self) -> Result<(), MissionConfigError> {
        // written so that NaN fails too
        if !(self.rate >= MIN_SETPOINT_RATE) || !self.rate.is_finite() {
            return Err(MissionConfigError::RateTooLow(self.rate));
        }

        if !(self.tolerance > 0.) || !self.tolerance.is_finite() {
            return Err(MissionConfigError::InvalidTolerance(self.tolerance));
        }

        if self.priming_setpoints == 0 {
            return Err(MissionConfigError::NoPrimingSetpoints);
        }

        if self.autonomous_mode.to_px4_main_sub().is_none() {
            return Err(MissionConfigError::UnrequestableMode(self.autonomous_mode));
        }

        Ok(())
    }

    /// Time between two control ticks.
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1. / self.rate)
    }
}
