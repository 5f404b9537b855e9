use mavlink::common::{MavCmd, MavModeFlag};
use ms_types::FlightMode;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PixhawkRequest {
    /// Arm (true) or disarm (false) the vehicle.
    Arm(bool),
    SetMode(FlightMode),
    Land(LandParams),
}

pub type PixhawkResponse = ();

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct LandParams {
    #[serde(default = "default_min_pitch")]
    pub min_pitch: f32,

    /// Desired heading on touchdown in degrees, NaN to keep the current one.
    #[serde(default = "default_yaw")]
    pub yaw: f32,
}

impl Default for LandParams {
    fn default() -> Self {
        Self {
            min_pitch: default_min_pitch(),
            yaw: default_yaw(),
        }
    }
}

fn default_min_pitch() -> f32 {
    1.0
}

fn default_yaw() -> f32 {
    f32::NAN
}

impl PixhawkRequest {
    /// Translates the request into a COMMAND_LONG command id and its seven
    /// parameters.
    pub fn to_command_long(&self) -> anyhow::Result<(MavCmd, [f32; 7])> {
        let command = match *self {
            PixhawkRequest::Arm(arm) => (
                MavCmd::MAV_CMD_COMPONENT_ARM_DISARM,
                [if arm { 1. } else { 0. }, 0., 0., 0., 0., 0., 0.],
            ),
            PixhawkRequest::SetMode(mode) => {
                let (main, sub) = mode
                    .to_px4_main_sub()
                    .ok_or_else(|| anyhow::anyhow!("cannot request flight mode {mode}"))?;

                (
                    MavCmd::MAV_CMD_DO_SET_MODE,
                    [
                        MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED.bits() as f32,
                        main as f32,
                        sub as f32,
                        0.,
                        0.,
                        0.,
                        0.,
                    ],
                )
            }
            // latitude, longitude and altitude are left as NaN so the vehicle
            // lands where it is
            PixhawkRequest::Land(params) => (
                MavCmd::MAV_CMD_NAV_LAND,
                [
                    params.min_pitch,
                    0.,
                    0.,
                    params.yaw,
                    f32::NAN,
                    f32::NAN,
                    f32::NAN,
                ],
            ),
        };

        Ok(command)
    }
}
