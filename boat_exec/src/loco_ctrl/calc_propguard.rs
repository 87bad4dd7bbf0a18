//! Prop guard hull calculations

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use super::{ActuatorDems, LocoCtrl};
use crate::loc::Twist;

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl LocoCtrl {
    /// Perform the prop guard hull calculations.
    ///
    /// The raw thruster demands are the same as a differential hull. If either exceeds 1 in
    /// magnitude both are divided by the larger magnitude, which preserves their ratio. When
    /// the thrusters oppose each other the forward one is divided by the integral thrust gain,
    /// or the default divisor if that gain is zero, since guarded props push harder forwards
    /// than backwards.
    pub(crate) fn calc_propguard(&mut self, vel: &Twist, thrust_gains: &[f64; 3]) -> ActuatorDems {
        let divisor = if thrust_gains[1] == 0.0 {
            self.params.propguard_default_divisor
        } else {
            thrust_gains[1]
        };

        let mut dems = self.scale_down([vel.dx() - vel.drz(), vel.dx() + vel.drz()]);

        if dems[0] > 0.0 && dems[1] < 0.0 {
            dems[0] /= divisor;
            self.report.guard_reduced = true;
        } else if dems[0] < 0.0 && dems[1] > 0.0 {
            dems[1] /= divisor;
            self.report.guard_reduced = true;
        }

        ActuatorDems::Motors {
            m0: dems[0],
            m1: dems[1],
        }
    }

    /// Scale all demands by the same factor so that none exceeds 1 in magnitude.
    fn scale_down(&mut self, raw: [f64; 2]) -> [f64; 2] {
        let max = raw.iter().fold(0f64, |m, v| m.max(v.abs()));

        if max > 1.0 {
            self.report.scaled_down = true;
            [raw[0] / max, raw[1] / max]
        } else {
            raw
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

    fn motors(dx: f64, drz: f64, thrust_gains: [f64; 3]) -> (f64, f64) {
        let mut lc = LocoCtrl::default();
        lc.init(Params {
            vehicle_type: "PROPGUARD".into(),
            ..Default::default()
        })
        .unwrap();

        let input = InputData {
            velocity: Twist::new(dx, drz),
            thrust_gains,
        };
        match lc.proc(&input).unwrap().0 {
            ActuatorDems::Motors { m0, m1 } => (m0, m1),
            other => panic!("Unexpected demands {:?}", other),
        }
    }

    #[test]
    fn test_proportional_scale_down() {
        // raw = [1.5, 0.5]
        let (m0, m1) = motors(1.0, -0.5, [0.5, 0.0, 0.0]);
        assert_abs_diff_eq!(m0, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(m1, 1.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_spin_in_place_reduces_forward() {
        // raw = [1, -1], default divisor
        let (m0, m1) = motors(0.0, -1.0, [0.5, 0.0, 0.0]);
        assert_abs_diff_eq!(m0, 0.2, epsilon = 1e-12);
        assert_abs_diff_eq!(m1, -1.0, epsilon = 1e-12);

        // raw = [-1, 1], divisor from the integral gain
        let (m0, m1) = motors(0.0, 1.0, [0.5, 2.0, 0.0]);
        assert_abs_diff_eq!(m0, -1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(m1, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_in_range_untouched() {
        assert_eq!(motors(0.5, 0.25, [0.5, 0.0, 0.0]), (0.25, 0.75));
    }
}
