//! # Localisation module
//!
//! Pose and velocity types used throughout the executable, the pose estimator which turns GPS
//! fixes into a vehicle pose, and the coordinate projection from geodetic to projected metric
//! coordinates.
//!
//! Poses are expressed in a Universal Transverse Mercator (UTM) frame, x being easting and y
//! being northing, both in meters. The zone and hemisphere the pose was projected in travel with
//! it as a `UtmOrigin`.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod filter;
mod projection;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use filter::*;
pub use projection::*;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The position and attitude of the vehicle body in the projected frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// The position in the projected frame.
    ///
    /// Units: meters
    pub position_m: Vector3<f64>,

    /// The attitude of the vehicle in the projected frame.
    pub attitude_q: UnitQuaternion<f64>,
}

/// The projection zone and hemisphere a pose is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtmOrigin {
    /// UTM longitude zone, 1 to 60
    pub zone: u8,

    /// True in the northern hemisphere
    pub is_north: bool,
}

/// A pose tagged with the projection it is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UtmPose {
    pub pose: Pose,
    pub origin: UtmOrigin,
}

/// A 6 degree of freedom velocity command.
///
/// Only surge (`dx`) and yaw rate (`drz`) are acted on by the vehicle. Both are normalised
/// efforts, nominally between -1 and +1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Twist {
    pub linear: Vector3<f64>,
    pub angular: Vector3<f64>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Pose {
    /// Create a new pose at the given position with the given heading.
    pub fn new(x_m: f64, y_m: f64, z_m: f64, heading_rad: f64) -> Self {
        Self {
            position_m: Vector3::new(x_m, y_m, z_m),
            attitude_q: UnitQuaternion::from_euler_angles(0.0, 0.0, heading_rad),
        }
    }

    /// Return the heading (angle to the positive X axis) of the vehicle in radians.
    pub fn get_heading(&self) -> f64 {
        self.attitude_q.euler_angles().2
    }

    /// The position in the XY plane.
    pub fn planar(&self) -> [f64; 2] {
        [self.position_m.x, self.position_m.y]
    }

    /// Squared distance to another pose in the XY plane.
    pub fn planar_dist_sq(&self, other: &Pose) -> f64 {
        util::maths::planar_dist_sq(&self.planar(), &other.planar())
    }

    /// The attitude as `[w, i, j, k]`.
    pub fn attitude_array(&self) -> [f64; 4] {
        let q = self.attitude_q.quaternion();
        [q.w, q.i, q.j, q.k]
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            position_m: Vector3::zeros(),
            attitude_q: UnitQuaternion::identity(),
        }
    }
}

impl fmt::Display for UtmOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}",
            self.zone,
            if self.is_north { "North" } else { "South" }
        )
    }
}

impl UtmPose {
    pub fn new(pose: Pose, origin: UtmOrigin) -> Self {
        Self { pose, origin }
    }
}

impl Twist {
    /// A twist demanding no motion.
    pub fn zero() -> Self {
        Self {
            linear: Vector3::zeros(),
            angular: Vector3::zeros(),
        }
    }

    /// Create a twist from a surge effort and a yaw rate effort.
    pub fn new(dx: f64, drz: f64) -> Self {
        Self {
            linear: Vector3::new(dx, 0.0, 0.0),
            angular: Vector3::new(0.0, 0.0, drz),
        }
    }

    /// Create a twist from its six components, `[dx, dy, dz, drx, dry, drz]`.
    pub fn from_array(v: [f64; 6]) -> Self {
        Self {
            linear: Vector3::new(v[0], v[1], v[2]),
            angular: Vector3::new(v[3], v[4], v[5]),
        }
    }

    /// Surge
    pub fn dx(&self) -> f64 {
        self.linear.x
    }

    /// Yaw rate
    pub fn drz(&self) -> f64 {
        self.angular.z
    }
}

impl Default for Twist {
    fn default() -> Self {
        Self::zero()
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_heading() {
        for h in &[0.0, 0.3, -1.2, PI / 2.0, -3.0] {
            assert_abs_diff_eq!(Pose::new(1.0, 2.0, 0.0, *h).get_heading(), *h, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_twist() {
        let t = Twist::new(0.4, -0.2);
        assert_eq!(t.dx(), 0.4);
        assert_eq!(t.drz(), -0.2);
        assert_eq!(Twist::from_array([0.0; 6]), Twist::zero());
    }

    #[test]
    fn test_origin_display() {
        let o = UtmOrigin {
            zone: 17,
            is_north: true,
        };
        assert_eq!(o.to_string(), "17North");
    }
}
