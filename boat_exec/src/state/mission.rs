//! Waypoint mission

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use crate::loc::UtmPose;
use crate::traj_ctrl::ControllerKind;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// An ordered list of waypoints and the index of the one being driven to.
///
/// The index is -1 when there is no mission, and equal to the number of waypoints once the last
/// one has been reached. In both cases there is no active leg.
#[derive(Debug, Clone)]
pub struct Mission {
    waypoints: Vec<UtmPose>,

    index: i64,

    controller: ControllerKind,

    /// Incremented every time the mission is replaced or cleared, so that late updates meant
    /// for an old mission can be told apart.
    generation: u64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Mission {
    pub fn waypoints(&self) -> &[UtmPose] {
        &self.waypoints
    }

    pub fn index(&self) -> i64 {
        self.index
    }

    pub fn controller(&self) -> ControllerKind {
        self.controller
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Index of the waypoint currently being driven to, if any.
    pub fn active_leg(&self) -> Option<usize> {
        if self.index >= 0 && (self.index as usize) < self.waypoints.len() {
            Some(self.index as usize)
        } else {
            None
        }
    }

    pub(super) fn replace(&mut self, waypoints: Vec<UtmPose>, controller: ControllerKind) -> u64 {
        self.index = if waypoints.is_empty() { -1 } else { 0 };
        self.waypoints = waypoints;
        self.controller = controller;
        self.generation += 1;
        self.generation
    }

    pub(super) fn clear(&mut self) {
        self.waypoints.clear();
        self.index = -1;
        self.generation += 1;
    }

    pub(super) fn advance(&mut self, generation: u64, from_index: usize) -> bool {
        if generation == self.generation && self.active_leg() == Some(from_index) {
            self.index += 1;
            true
        } else {
            false
        }
    }

    pub(super) fn finish(&mut self, generation: u64) {
        if generation == self.generation {
            self.index = -1;
        }
    }
}

impl Default for Mission {
    fn default() -> Self {
        Self {
            waypoints: Vec::new(),
            index: -1,
            controller: ControllerKind::default(),
            generation: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::loc::{Pose, UtmOrigin};

    fn wps(n: usize) -> Vec<UtmPose> {
        (0..n)
            .map(|i| {
                UtmPose::new(
                    Pose::new(i as f64, 0.0, 0.0, 0.0),
                    UtmOrigin {
                        zone: 17,
                        is_north: true,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_empty_mission_has_no_leg() {
        let mut m = Mission::default();
        assert_eq!(m.index(), -1);
        assert_eq!(m.active_leg(), None);

        m.replace(wps(0), ControllerKind::LineFollow);
        assert_eq!(m.index(), -1);
        assert_eq!(m.active_leg(), None);
    }

    #[test]
    fn test_advance_through_mission() {
        let mut m = Mission::default();
        let gen = m.replace(wps(2), ControllerKind::PointAndShoot);
        assert_eq!(m.active_leg(), Some(0));

        assert!(m.advance(gen, 0));
        // Repeated advance from the same index is ignored
        assert!(!m.advance(gen, 0));
        assert!(m.advance(gen, 1));
        assert_eq!(m.index(), 2);
        assert_eq!(m.active_leg(), None);

        m.finish(gen);
        assert_eq!(m.index(), -1);
    }

    #[test]
    fn test_stale_generation_ignored() {
        let mut m = Mission::default();
        let old = m.replace(wps(3), ControllerKind::LineFollow);
        let new = m.replace(wps(3), ControllerKind::LineFollow);
        assert_ne!(old, new);

        assert!(!m.advance(old, 0));
        m.finish(old);
        assert_eq!(m.index(), 0);

        m.clear();
        assert!(!m.advance(new, 0));
        assert!(m.waypoints().is_empty());
    }
}
