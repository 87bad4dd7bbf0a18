//! Differential hull calculations

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use super::{ActuatorDems, LocoCtrl};
use crate::loc::Twist;
use util::maths::lin_map;

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl LocoCtrl {
    /// Perform the differential hull calculations.
    ///
    /// Each thruster is the surge demand minus (left) or plus (right) the yaw rate demand,
    /// clipped to [-1, 1] then rescaled into the safe thrust range.
    pub(crate) fn calc_differential(&mut self, vel: &Twist) -> ActuatorDems {
        let limit = self.params.safe_differential_thrust;

        let left = self.clip_unit(vel.dx() - vel.drz());
        let right = self.clip_unit(vel.dx() + vel.drz());

        ActuatorDems::Motors {
            m0: lin_map((-1.0, 1.0), (-limit, limit), left),
            m1: lin_map((-1.0, 1.0), (-limit, limit), right),
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
