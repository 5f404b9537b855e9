use std::fmt;

use ms_telemetry::VehicleSnapshot;
use ms_types::{FlightMode, Waypoint};
use tracing::*;

use crate::{ArmingFlow, MissionConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissionPhase {
    AtWaypointA,
    AtWaypointB,
    Landing,
}

impl fmt::Display for MissionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MissionPhase::AtWaypointA => "waypoint A",
            MissionPhase::AtWaypointB => "waypoint B",
            MissionPhase::Landing => "landing",
        })
    }
}

/// A command the vehicle needs before it can fly the mission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bootstrap {
    SetMode(FlightMode),
    Arm,
}

/// Everything one tick of the mission wants done. Whether commands actually
/// go out is up to the gateway's throttles.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    /// Phase after this tick.
    pub phase: MissionPhase,
    pub setpoint: Option<Waypoint>,
    pub bootstrap: Option<Bootstrap>,
    pub land: bool,
}

/// Flies A, then B, then lands. Pure: all input comes from the snapshot
/// passed to [`Mission::step`], all output is the returned [`Decision`].
#[derive(Debug, Clone)]
pub struct Mission {
    waypoint_a: Waypoint,
    waypoint_b: Waypoint,
    tolerance: f64,
    autonomous_mode: FlightMode,
    arming: ArmingFlow,
    phase: MissionPhase,
    /// Set once the controller accepts the land command. Cleared when the
    /// vehicle is armed again after a disarm.
    land_accepted: bool,
    was_armed: bool,
}

impl Mission {
    pub fn new(
        waypoint_a: Waypoint,
        waypoint_b: Waypoint,
        tolerance: f64,
        autonomous_mode: FlightMode,
        arming: ArmingFlow,
    ) -> Self {
        Self {
            waypoint_a,
            waypoint_b,
            tolerance,
            autonomous_mode,
            arming,
            phase: MissionPhase::AtWaypointA,
            land_accepted: false,
            was_armed: false,
        }
    }

    pub fn from_config(config: &MissionConfig) -> Self {
        Self::new(
            config.waypoint_a.waypoint(),
            config.waypoint_b.waypoint(),
            config.tolerance,
            config.autonomous_mode,
            config.arming,
        )
    }

    pub fn phase(&self) -> MissionPhase {
        self.phase
    }

    /// The target streamed before the mission starts.
    pub fn initial_target(&self) -> Waypoint {
        self.waypoint_a
    }

    pub fn land_accepted(&self) -> bool {
        self.land_accepted
    }

    pub fn record_land_accepted(&mut self) {
        self.land_accepted = true;
    }

    fn target(&self) -> Waypoint {
        match self.phase {
            MissionPhase::AtWaypointA => self.waypoint_a,
            // landing holds the last commanded target
            MissionPhase::AtWaypointB | MissionPhase::Landing => self.waypoint_b,
        }
    }

    fn set_phase(&mut self, phase: MissionPhase) {
        if phase != self.phase {
            info!("mission phase {} -> {}", self.phase, phase);
            self.phase = phase;
        }
    }

    pub fn step(&mut self, snapshot: &VehicleSnapshot) -> Decision {
        if snapshot.armed && !self.was_armed && self.land_accepted {
            info!("vehicle re-armed after landing, mission can run again");
            self.land_accepted = false;
        }
        self.was_armed = snapshot.armed;

        // a disarm aborts the mission, it restarts from the first leg
        if !snapshot.armed && self.phase != MissionPhase::AtWaypointA {
            warn!("vehicle disarmed during {}, restarting mission", self.phase);
            self.set_phase(MissionPhase::AtWaypointA);
        }

        // the ack can be lost while the autopilot still carries out the landing
        if self.phase == MissionPhase::Landing
            && !self.land_accepted
            && snapshot.mode == FlightMode::AutoLand
        {
            info!("vehicle reports {}, treating landing as accepted", snapshot.mode);
            self.land_accepted = true;
        }

        let target = self.target();

        // once the land command is accepted the landing routine is in charge
        let setpoint = if self.phase == MissionPhase::Landing && self.land_accepted {
            None
        } else {
            Some(target)
        };

        // proximity is an axis-wise box test, not a Euclidean distance
        if snapshot.armed && snapshot.position.within_box(&target.position, self.tolerance) {
            match self.phase {
                MissionPhase::AtWaypointA => self.set_phase(MissionPhase::AtWaypointB),
                MissionPhase::AtWaypointB => self.set_phase(MissionPhase::Landing),
                MissionPhase::Landing => {}
            }
        }

        let in_autonomous_mode = snapshot.mode == self.autonomous_mode;

        // commands are pointless without a link, they would only time out
        let bootstrap = if snapshot.connected
            && self.arming == ArmingFlow::Autonomous
            && !self.land_accepted
        {
            if !in_autonomous_mode {
                Some(Bootstrap::SetMode(self.autonomous_mode))
            } else if !snapshot.armed {
                Some(Bootstrap::Arm)
            } else {
                None
            }
        } else {
            None
        };

        let land = snapshot.connected
            && self.phase == MissionPhase::Landing
            && in_autonomous_mode
            && !self.land_accepted;

        Decision {
            phase: self.phase,
            setpoint,
            bootstrap,
            land,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ms_types::Vector3;

    const A: Vector3 = Vector3::new(0., 0., 5.);
    const B: Vector3 = Vector3::new(0., 5., 5.);

    fn mission(arming: ArmingFlow) -> Mission {
        Mission::new(
            Waypoint::new(A, 0.),
            Waypoint::new(B, 0.),
            0.1,
            FlightMode::Offboard,
            arming,
        )
    }

    fn flying(position: Vector3) -> VehicleSnapshot {
        VehicleSnapshot {
            connected: true,
            armed: true,
            mode: FlightMode::Offboard,
            position,
        }
    }

    #[test]
    fn reaching_a_advances_to_b() {
        let offsets = [
            (0., 0., 0.),
            (0.099, 0., 0.),
            (0., -0.099, 0.),
            (0., 0., 0.099),
            (-0.05, 0.05, -0.05),
            (0.099, 0.099, 0.099),
        ];

        for (dx, dy, dz) in offsets {
            let mut m = mission(ArmingFlow::Autonomous);
            let decision = m.step(&flying(Vector3::new(A.x + dx, A.y + dy, A.z + dz)));
            assert_eq!(decision.phase, MissionPhase::AtWaypointB, "offset {dx} {dy} {dz}");
            // the target of the phase we were in goes out on this tick
            assert_eq!(decision.setpoint.map(|w| w.position), Some(A));
        }
    }

    #[test]
    fn outside_the_box_stays_at_a() {
        let offsets = [
            (0.1, 0., 0.),
            (0., 0.1, 0.),
            (0., 0., -0.11),
            (0.05, 0.05, 0.2),
            (0., 0., -5.),
        ];

        for (dx, dy, dz) in offsets {
            let mut m = mission(ArmingFlow::Autonomous);
            let decision = m.step(&flying(Vector3::new(A.x + dx, A.y + dy, A.z + dz)));
            assert_eq!(decision.phase, MissionPhase::AtWaypointA, "offset {dx} {dy} {dz}");
        }
    }

    #[test]
    fn phases_advance_in_order() {
        let mut m = mission(ArmingFlow::Autonomous);

        // standing on B first doesn't skip A
        assert_eq!(m.step(&flying(B)).phase, MissionPhase::AtWaypointA);

        assert_eq!(m.step(&flying(A)).phase, MissionPhase::AtWaypointB);
        // staying at A doesn't go anywhere
        let decision = m.step(&flying(A));
        assert_eq!(decision.phase, MissionPhase::AtWaypointB);
        assert_eq!(decision.setpoint.map(|w| w.position), Some(B));

        assert_eq!(m.step(&flying(B)).phase, MissionPhase::Landing);
        // terminal
        assert_eq!(m.step(&flying(A)).phase, MissionPhase::Landing);
    }

    #[test]
    fn disarm_resets_to_a() {
        for position in [A, B, Vector3::default()] {
            let mut m = mission(ArmingFlow::Autonomous);
            m.step(&flying(A));
            m.step(&flying(B));
            assert_eq!(m.phase(), MissionPhase::Landing);

            let decision = m.step(&VehicleSnapshot {
                armed: false,
                ..flying(position)
            });
            assert_eq!(decision.phase, MissionPhase::AtWaypointA);
            assert_eq!(decision.setpoint.map(|w| w.position), Some(A));
            assert!(!decision.land);
        }
    }

    #[test]
    fn disarmed_on_target_does_not_advance() {
        let mut m = mission(ArmingFlow::Autonomous);
        let decision = m.step(&VehicleSnapshot {
            armed: false,
            ..flying(A)
        });
        assert_eq!(decision.phase, MissionPhase::AtWaypointA);
    }

    #[test]
    fn bootstrap_switches_mode_before_arming() {
        let mut m = mission(ArmingFlow::Autonomous);

        let decision = m.step(&VehicleSnapshot {
            connected: true,
            armed: false,
            mode: FlightMode::Manual,
            position: Vector3::default(),
        });
        assert_eq!(
            decision.bootstrap,
            Some(Bootstrap::SetMode(FlightMode::Offboard))
        );

        let decision = m.step(&VehicleSnapshot {
            connected: true,
            armed: false,
            mode: FlightMode::Offboard,
            position: Vector3::default(),
        });
        assert_eq!(decision.bootstrap, Some(Bootstrap::Arm));

        let decision = m.step(&flying(Vector3::default()));
        assert_eq!(decision.bootstrap, None);
    }

    #[test]
    fn manual_flow_never_bootstraps() {
        let mut m = mission(ArmingFlow::Manual);

        let decision = m.step(&VehicleSnapshot {
            connected: true,
            armed: false,
            mode: FlightMode::Manual,
            position: Vector3::default(),
        });
        assert_eq!(decision.bootstrap, None);
        assert_eq!(decision.setpoint.map(|w| w.position), Some(A));
    }

    #[test]
    fn no_commands_without_link() {
        let mut m = mission(ArmingFlow::Autonomous);
        let decision = m.step(&VehicleSnapshot::default());

        assert_eq!(decision.bootstrap, None);
        assert!(!decision.land);
        assert!(decision.setpoint.is_some());
    }

    #[test]
    fn landing_requires_autonomous_mode() {
        let mut m = mission(ArmingFlow::Autonomous);
        m.step(&flying(A));

        let decision = m.step(&flying(B));
        assert_eq!(decision.phase, MissionPhase::Landing);
        assert!(decision.land);
        // B is held until the land command is accepted
        assert_eq!(decision.setpoint.map(|w| w.position), Some(B));

        let decision = m.step(&VehicleSnapshot {
            mode: FlightMode::Position,
            ..flying(B)
        });
        assert!(!decision.land);
        assert_eq!(
            decision.bootstrap,
            Some(Bootstrap::SetMode(FlightMode::Offboard))
        );
    }

    #[test]
    fn observed_auto_land_confirms_landing_without_ack() {
        let mut m = mission(ArmingFlow::Autonomous);
        m.step(&flying(A));
        assert!(m.step(&flying(B)).land);
        // the land ack never arrived, so nothing was recorded
        assert!(!m.land_accepted());

        let decision = m.step(&VehicleSnapshot {
            mode: FlightMode::AutoLand,
            ..flying(B)
        });
        assert_eq!(decision.phase, MissionPhase::Landing);
        assert_eq!(decision.bootstrap, None);
        assert_eq!(decision.setpoint, None);
        assert!(!decision.land);
        assert!(m.land_accepted());
    }

    #[test]
    fn auto_land_outside_landing_phase_is_not_a_confirmation() {
        let mut m = mission(ArmingFlow::Autonomous);
        m.step(&VehicleSnapshot {
            mode: FlightMode::AutoLand,
            ..flying(Vector3::default())
        });
        assert!(!m.land_accepted());
    }

    #[test]
    fn accepted_landing_stops_commands_until_rearmed() {
        let mut m = mission(ArmingFlow::Autonomous);
        m.step(&flying(A));
        m.step(&flying(B));
        m.record_land_accepted();

        let landing = VehicleSnapshot {
            mode: FlightMode::AutoLand,
            ..flying(B)
        };
        let decision = m.step(&landing);
        assert_eq!(decision.setpoint, None);
        assert_eq!(decision.bootstrap, None);
        assert!(!decision.land);

        // touchdown disarms the vehicle; that must not relaunch it
        let landed = VehicleSnapshot {
            armed: false,
            mode: FlightMode::AutoLand,
            ..flying(Vector3::new(0., 5., 0.))
        };
        let decision = m.step(&landed);
        assert_eq!(decision.phase, MissionPhase::AtWaypointA);
        assert_eq!(decision.bootstrap, None);
        assert!(m.land_accepted());

        // an operator arming again starts a fresh mission
        let decision = m.step(&VehicleSnapshot {
            armed: true,
            mode: FlightMode::Position,
            ..landed
        });
        assert!(!m.land_accepted());
        assert_eq!(
            decision.bootstrap,
            Some(Bootstrap::SetMode(FlightMode::Offboard))
        );
    }
}
