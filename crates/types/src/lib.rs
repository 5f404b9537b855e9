use nalgebra::UnitQuaternion;
use serde::{Deserialize, Serialize};

mod mode;

pub use mode::*;

/// A point or displacement in the vehicle's local frame, in meters.
///
/// Mission coordinates are expressed in ENU (x = East, y = North, z = Up).
#[derive(Default, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Converts a NED (North, East, Down) vector into ENU.
    pub fn from_ned(north: f64, east: f64, down: f64) -> Self {
        Self::new(east, north, -down)
    }

    /// Returns this ENU vector as (North, East, Down).
    pub fn to_ned(&self) -> (f64, f64, f64) {
        (self.y, self.x, -self.z)
    }

    /// Axis-wise box test: true when every component differs from `other` by
    /// strictly less than `tolerance`. This is not a Euclidean distance check.
    pub fn within_box(&self, other: &Vector3, tolerance: f64) -> bool {
        (self.x - other.x).abs() < tolerance
            && (self.y - other.y).abs() < tolerance
            && (self.z - other.z).abs() < tolerance
    }
}

/// Converts an ENU heading (0 = East, counter-clockwise) into a NED heading
/// (0 = North, clockwise), wrapped into (-pi, pi].
pub fn enu_yaw_to_ned(yaw: f64) -> f64 {
    use std::f64::consts::{FRAC_PI_2, PI, TAU};

    let mut ned = FRAC_PI_2 - yaw;
    while ned > PI {
        ned -= TAU;
    }
    while ned <= -PI {
        ned += TAU;
    }
    ned
}

/// A position target with the heading the vehicle should hold there.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Waypoint {
    pub position: Vector3,
    pub orientation: UnitQuaternion<f64>,
}

impl Waypoint {
    /// A level attitude with the given ENU heading in radians.
    pub fn new(position: Vector3, yaw: f64) -> Self {
        Self {
            position,
            orientation: UnitQuaternion::from_euler_angles(0., 0., yaw),
        }
    }

    /// Heading about the up axis, in radians.
    pub fn yaw(&self) -> f64 {
        self.orientation.euler_angles().2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn box_test_is_axis_wise() {
        let target = Vector3::new(0., 0., 5.);

        assert!(Vector3::new(0.09, -0.09, 5.09).within_box(&target, 0.1));
        // euclidean distance here is ~0.156 but every axis is inside the box
        assert!(Vector3::new(0.09, 0.09, 4.91).within_box(&target, 0.1));
        assert!(!Vector3::new(0.1, 0., 5.).within_box(&target, 0.1));
        assert!(!Vector3::new(0., 0., 4.5).within_box(&target, 0.1));
    }

    #[test]
    fn ned_conversion() {
        let v = Vector3::from_ned(1., 2., -3.);
        assert_eq!(v, Vector3::new(2., 1., 3.));
        assert_eq!(v.to_ned(), (1., 2., -3.));
    }

    #[test]
    fn waypoint_heading() {
        let origin = Vector3::default();
        assert_eq!(Waypoint::new(origin, 0.).orientation, UnitQuaternion::identity());

        let w = Waypoint::new(origin, 3.14);
        assert!((w.yaw() - 3.14).abs() < 1e-9);

        let (roll, pitch, _) = Waypoint::new(origin, -FRAC_PI_2).orientation.euler_angles();
        assert!(roll.abs() < 1e-9 && pitch.abs() < 1e-9);
        assert!((Waypoint::new(origin, -FRAC_PI_2).yaw() + FRAC_PI_2).abs() < 1e-9);
    }

    #[test]
    fn yaw_frame_conversion() {
        // facing east in ENU is a quarter turn clockwise from north in NED
        assert!((enu_yaw_to_ned(0.) - FRAC_PI_2).abs() < 1e-9);
        // facing north
        assert!(enu_yaw_to_ned(FRAC_PI_2).abs() < 1e-9);
        // facing west wraps to -pi/2
        assert!((enu_yaw_to_ned(PI) + FRAC_PI_2).abs() < 1e-9);
    }
}
