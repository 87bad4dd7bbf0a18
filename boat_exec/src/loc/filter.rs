//! Pose estimation from position fixes

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::trace;

use super::UtmPose;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// An estimator producing the vehicle pose from position fixes.
///
/// All times are in milliseconds. Fix times come from the fix source and are only compared
/// with each other, never with the local clock.
pub trait PoseFilter: Send {
    /// Discard the current estimate and replace it with the given pose.
    fn reset(&mut self, pose: UtmPose, time_ms: i64);

    /// Incorporate a new position fix. Returns `false` if the fix was rejected.
    fn gps_update(&mut self, fix: UtmPose, time_ms: i64) -> bool;

    /// The estimated pose at the given time.
    fn pose(&self, time_ms: i64) -> UtmPose;
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Latest-fix estimator.
///
/// Each accepted fix replaces the position and origin while the last known attitude is kept.
/// Fixes older than the last accepted one are dropped.
pub struct SimpleFilter {
    pose: UtmPose,

    last_fix_time_ms: Option<i64>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SimpleFilter {
    pub fn new(initial: UtmPose) -> Self {
        Self {
            pose: initial,
            last_fix_time_ms: None,
        }
    }
}

impl PoseFilter for SimpleFilter {
    fn reset(&mut self, pose: UtmPose, time_ms: i64) {
        self.pose = pose;
        self.last_fix_time_ms = Some(time_ms);
    }

    fn gps_update(&mut self, fix: UtmPose, time_ms: i64) -> bool {
        if let Some(last) = self.last_fix_time_ms {
            if time_ms < last {
                trace!("Dropping stale fix ({} ms < {} ms)", time_ms, last);
                return false;
            }
        }

        self.pose.pose.position_m = fix.pose.position_m;
        self.pose.origin = fix.origin;
        self.last_fix_time_ms = Some(time_ms);

        true
    }

    fn pose(&self, _time_ms: i64) -> UtmPose {
        self.pose
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::loc::{Pose, UtmOrigin};
    use approx::assert_abs_diff_eq;

    fn utm(x: f64, y: f64, heading: f64, zone: u8) -> UtmPose {
        UtmPose::new(
            Pose::new(x, y, 0.0, heading),
            UtmOrigin {
                zone,
                is_north: true,
            },
        )
    }

    #[test]
    fn test_gps_update_keeps_attitude() {
        let mut filter = SimpleFilter::new(utm(0.0, 0.0, 1.0, 17));

        assert!(filter.gps_update(utm(10.0, 20.0, 0.0, 18), 100));

        let p = filter.pose(150);
        assert_eq!(p.pose.planar(), [10.0, 20.0]);
        assert_eq!(p.origin.zone, 18);
        assert_abs_diff_eq!(p.pose.get_heading(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_stale_fix_dropped() {
        let mut filter = SimpleFilter::new(utm(0.0, 0.0, 0.0, 17));

        assert!(filter.gps_update(utm(1.0, 1.0, 0.0, 17), 200));
        assert!(!filter.gps_update(utm(5.0, 5.0, 0.0, 17), 199));
        assert_eq!(filter.pose(0).pose.planar(), [1.0, 1.0]);

        // Equal timestamps are accepted
        assert!(filter.gps_update(utm(2.0, 2.0, 0.0, 17), 200));
    }

    #[test]
    fn test_reset() {
        let mut filter = SimpleFilter::new(utm(0.0, 0.0, 0.0, 17));
        filter.reset(utm(7.0, 8.0, 0.5, 17), 1_000);

        let p = filter.pose(1_000);
        assert_eq!(p.pose.planar(), [7.0, 8.0]);
        assert_abs_diff_eq!(p.pose.get_heading(), 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_fix_older_than_reset_dropped() {
        let mut filter = SimpleFilter::new(utm(0.0, 0.0, 0.0, 17));
        assert!(filter.gps_update(utm(1.0, 1.0, 0.0, 17), 100));

        filter.reset(utm(7.0, 8.0, 0.0, 17), 200);
        assert!(!filter.gps_update(utm(2.0, 2.0, 0.0, 17), 150));
        assert_eq!(filter.pose(200).pose.planar(), [7.0, 8.0]);

        assert!(filter.gps_update(utm(3.0, 3.0, 0.0, 17), 250));
        assert_eq!(filter.pose(250).pose.planar(), [3.0, 3.0]);
    }
}
