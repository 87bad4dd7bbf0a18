//! Vectored hull calculations

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
    /// Perform the vectored hull calculations.
    ///
    /// The thruster demand is the clipped surge mapped from [0, 1] into [0, limit]. Reverse
    /// demands are scaled by the same factor. The rudder servo is mounted reversed so the yaw
    /// rate demand is negated.
    pub(crate) fn calc_vectored(&mut self, vel: &Twist) -> ActuatorDems {
        let limit = self.params.safe_vectored_thrust;

        let thrust = self.clip_unit(vel.dx());
        let rudder = self.clip_unit(vel.drz());

        ActuatorDems::ThrustRudder {
            thrust: lin_map((0.0, 1.0), (0.0, limit), thrust),
            rudder: -rudder,
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::loco_ctrl::{InputData, Params};
    use approx::assert_abs_diff_eq;
    use util::module::State;

    fn thrust_rudder(limit: f64, dx: f64, drz: f64) -> (f64, f64) {
        let mut lc = LocoCtrl::default();
        lc.init(Params {
            vehicle_type: "VECTORED".into(),
            safe_vectored_thrust: limit,
            ..Default::default()
        })
        .unwrap();

        let input = InputData {
            velocity: Twist::new(dx, drz),
            ..Default::default()
        };
        match lc.proc(&input).unwrap().0 {
            ActuatorDems::ThrustRudder { thrust, rudder } => (thrust, rudder),
            other => panic!("Unexpected demands {:?}", other),
        }
    }

    #[test]
    fn test_rudder_inverted() {
        assert_eq!(thrust_rudder(1.0, 0.5, 0.3), (0.5, -0.3));
        assert_eq!(thrust_rudder(1.0, 0.0, -2.0), (0.0, 1.0));
    }

    #[test]
    fn test_thrust_limited() {
        let (thrust, _) = thrust_rudder(0.8, 3.0, 0.0);
        assert_abs_diff_eq!(thrust, 0.8, epsilon = 1e-12);

        let (thrust, _) = thrust_rudder(0.8, -0.5, 0.0);
        assert_abs_diff_eq!(thrust, -0.4, epsilon = 1e-12);
    }
}
