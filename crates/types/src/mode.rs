use std::{fmt, str::FromStr};

use serde::{de, Deserialize, Deserializer};
use thiserror::Error;

/// PX4 flight modes, named the way mavros reports them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlightMode {
    Manual,
    Altitude,
    Position,
    AutoReady,
    AutoTakeoff,
    AutoLoiter,
    AutoMission,
    AutoRtl,
    AutoLand,
    AutoFollowTarget,
    AutoPrecland,
    Acro,
    Offboard,
    Stabilized,
    Rattitude,
    /// A custom mode word we don't have a name for, or no mode reported yet.
    Unknown(u32),
}

impl Default for FlightMode {
    fn default() -> Self {
        FlightMode::Unknown(0)
    }
}

// PX4 main modes
const MAIN_MANUAL: u8 = 1;
const MAIN_ALTCTL: u8 = 2;
const MAIN_POSCTL: u8 = 3;
const MAIN_AUTO: u8 = 4;
const MAIN_ACRO: u8 = 5;
const MAIN_OFFBOARD: u8 = 6;
const MAIN_STABILIZED: u8 = 7;
const MAIN_RATTITUDE: u8 = 8;

// PX4 auto sub modes
const SUB_AUTO_READY: u8 = 1;
const SUB_AUTO_TAKEOFF: u8 = 2;
const SUB_AUTO_LOITER: u8 = 3;
const SUB_AUTO_MISSION: u8 = 4;
const SUB_AUTO_RTL: u8 = 5;
const SUB_AUTO_LAND: u8 = 6;
const SUB_AUTO_FOLLOW_TARGET: u8 = 8;
const SUB_AUTO_PRECLAND: u8 = 9;

impl FlightMode {
    /// Decodes the `custom_mode` field of a PX4 heartbeat.
    pub fn from_px4_custom_mode(custom_mode: u32) -> Self {
        let main = ((custom_mode >> 16) & 0xff) as u8;
        let sub = ((custom_mode >> 24) & 0xff) as u8;

        match (main, sub) {
            (MAIN_MANUAL, _) => FlightMode::Manual,
            (MAIN_ALTCTL, _) => FlightMode::Altitude,
            (MAIN_POSCTL, _) => FlightMode::Position,
            (MAIN_AUTO, SUB_AUTO_READY) => FlightMode::AutoReady,
            (MAIN_AUTO, SUB_AUTO_TAKEOFF) => FlightMode::AutoTakeoff,
            (MAIN_AUTO, SUB_AUTO_LOITER) => FlightMode::AutoLoiter,
            (MAIN_AUTO, SUB_AUTO_MISSION) => FlightMode::AutoMission,
            (MAIN_AUTO, SUB_AUTO_RTL) => FlightMode::AutoRtl,
            (MAIN_AUTO, SUB_AUTO_LAND) => FlightMode::AutoLand,
            (MAIN_AUTO, SUB_AUTO_FOLLOW_TARGET) => FlightMode::AutoFollowTarget,
            (MAIN_AUTO, SUB_AUTO_PRECLAND) => FlightMode::AutoPrecland,
            (MAIN_ACRO, _) => FlightMode::Acro,
            (MAIN_OFFBOARD, _) => FlightMode::Offboard,
            (MAIN_STABILIZED, _) => FlightMode::Stabilized,
            (MAIN_RATTITUDE, _) => FlightMode::Rattitude,
            _ => FlightMode::Unknown(custom_mode),
        }
    }

    /// Returns the (main mode, sub mode) pair used by `MAV_CMD_DO_SET_MODE`,
    /// or `None` for modes we can't request.
    pub fn to_px4_main_sub(&self) -> Option<(u8, u8)> {
        let pair = match self {
            FlightMode::Manual => (MAIN_MANUAL, 0),
            FlightMode::Altitude => (MAIN_ALTCTL, 0),
            FlightMode::Position => (MAIN_POSCTL, 0),
            FlightMode::AutoReady => (MAIN_AUTO, SUB_AUTO_READY),
            FlightMode::AutoTakeoff => (MAIN_AUTO, SUB_AUTO_TAKEOFF),
            FlightMode::AutoLoiter => (MAIN_AUTO, SUB_AUTO_LOITER),
            FlightMode::AutoMission => (MAIN_AUTO, SUB_AUTO_MISSION),
            FlightMode::AutoRtl => (MAIN_AUTO, SUB_AUTO_RTL),
            FlightMode::AutoLand => (MAIN_AUTO, SUB_AUTO_LAND),
            FlightMode::AutoFollowTarget => (MAIN_AUTO, SUB_AUTO_FOLLOW_TARGET),
            FlightMode::AutoPrecland => (MAIN_AUTO, SUB_AUTO_PRECLAND),
            FlightMode::Acro => (MAIN_ACRO, 0),
            FlightMode::Offboard => (MAIN_OFFBOARD, 0),
            FlightMode::Stabilized => (MAIN_STABILIZED, 0),
            FlightMode::Rattitude => (MAIN_RATTITUDE, 0),
            FlightMode::Unknown(_) => return None,
        };

        Some(pair)
    }

    /// Encodes this mode as a PX4 `custom_mode` word.
    pub fn to_px4_custom_mode(&self) -> Option<u32> {
        match self {
            FlightMode::Unknown(raw) => Some(*raw),
            other => other
                .to_px4_main_sub()
                .map(|(main, sub)| ((main as u32) << 16) | ((sub as u32) << 24)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FlightMode::Manual => "MANUAL",
            FlightMode::Altitude => "ALTCTL",
            FlightMode::Position => "POSCTL",
            FlightMode::AutoReady => "AUTO.READY",
            FlightMode::AutoTakeoff => "AUTO.TAKEOFF",
            FlightMode::AutoLoiter => "AUTO.LOITER",
            FlightMode::AutoMission => "AUTO.MISSION",
            FlightMode::AutoRtl => "AUTO.RTL",
            FlightMode::AutoLand => "AUTO.LAND",
            FlightMode::AutoFollowTarget => "AUTO.FOLLOW_TARGET",
            FlightMode::AutoPrecland => "AUTO.PRECLAND",
            FlightMode::Acro => "ACRO",
            FlightMode::Offboard => "OFFBOARD",
            FlightMode::Stabilized => "STABILIZED",
            FlightMode::Rattitude => "RATTITUDE",
            FlightMode::Unknown(_) => "UNKNOWN",
        }
    }
}

impl fmt::Display for FlightMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlightMode::Unknown(raw) => write!(f, "UNKNOWN({raw:#010x})"),
            other => f.write_str(other.name()),
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("unknown flight mode {0:?}")]
pub struct ParseFlightModeError(pub String);

impl FromStr for FlightMode {
    type Err = ParseFlightModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mode = match s.to_ascii_uppercase().as_str() {
            "MANUAL" => FlightMode::Manual,
            "ALTCTL" => FlightMode::Altitude,
            "POSCTL" => FlightMode::Position,
            "AUTO.READY" => FlightMode::AutoReady,
            "AUTO.TAKEOFF" => FlightMode::AutoTakeoff,
            "AUTO.LOITER" => FlightMode::AutoLoiter,
            "AUTO.MISSION" => FlightMode::AutoMission,
            "AUTO.RTL" => FlightMode::AutoRtl,
            "AUTO.LAND" => FlightMode::AutoLand,
            "AUTO.FOLLOW_TARGET" => FlightMode::AutoFollowTarget,
            "AUTO.PRECLAND" => FlightMode::AutoPrecland,
            "ACRO" => FlightMode::Acro,
            "OFFBOARD" => FlightMode::Offboard,
            "STABILIZED" => FlightMode::Stabilized,
            "RATTITUDE" => FlightMode::Rattitude,
            _ => return Err(ParseFlightModeError(s.to_owned())),
        };

        Ok(mode)
    }
}

impl<'de> Deserialize<'de> for FlightMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offboard_custom_mode() {
        assert_eq!(FlightMode::Offboard.to_px4_custom_mode(), Some(0x0006_0000));
        assert_eq!(FlightMode::from_px4_custom_mode(0x0006_0000), FlightMode::Offboard);
    }

    #[test]
    fn auto_submodes() {
        let land = FlightMode::AutoLand.to_px4_custom_mode().unwrap();
        assert_eq!(land, 0x0604_0000);
        assert_eq!(FlightMode::from_px4_custom_mode(land), FlightMode::AutoLand);
        assert_eq!(
            FlightMode::from_px4_custom_mode(0x0204_0000),
            FlightMode::AutoTakeoff
        );
    }

    #[test]
    fn unrecognized_words_are_preserved() {
        let mode = FlightMode::from_px4_custom_mode(0x0000_2a00);
        assert_eq!(mode, FlightMode::Unknown(0x2a00));
        assert_eq!(mode.to_px4_main_sub(), None);
    }

    #[test]
    fn parse_mavros_names() {
        assert_eq!("OFFBOARD".parse(), Ok(FlightMode::Offboard));
        assert_eq!("auto.land".parse(), Ok(FlightMode::AutoLand));
        assert_eq!(
            "HOVER".parse::<FlightMode>(),
            Err(ParseFlightModeError("HOVER".into()))
        );
        assert_eq!(FlightMode::AutoTakeoff.to_string(), "AUTO.TAKEOFF");
    }
}
