//! # Operator interface module
//!
//! Types shared between the vehicle server and the operator layer commanding it.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Selects which control loop's parameter triple is read or written.
///
/// On the wire axes are addressed by index, see `GainAxis::from_index`.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Copy, Clone, Hash)]
pub enum GainAxis {
    /// Thrust PID gains
    Thrust,
    /// Rudder (heading) PID gains
    Rudder,
    /// Depth winch. Writing moves the winch, reading returns the last known depth.
    Winch,
    /// Water sampler. Writing starts, stops or resets the sampler jars.
    Sampler,
}

/// Progress of a waypoint mission.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Copy, Clone)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WaypointState {
    Going,
    Paused,
    Done,
    Cancelled,
}

/// State of a camera capture job.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Copy, Clone)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CameraState {
    Off,
    Capturing,
    Cancelled,
    Done,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl GainAxis {
    /// Get the axis from its wire index, or `None` if the index is unsupported.
    pub fn from_index(index: i32) -> Option<Self> {
        match index {
            0 => Some(GainAxis::Thrust),
            3 => Some(GainAxis::Winch),
            5 => Some(GainAxis::Rudder),
            7 => Some(GainAxis::Sampler),
            _ => None,
        }
    }

    /// The wire index of this axis.
    pub fn index(&self) -> i32 {
        match self {
            GainAxis::Thrust => 0,
            GainAxis::Winch => 3,
            GainAxis::Rudder => 5,
            GainAxis::Sampler => 7,
        }
    }
}

impl Default for CameraState {
    fn default() -> Self {
        CameraState::Off
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_gain_axis_index() {
        for axis in &[GainAxis::Thrust, GainAxis::Rudder, GainAxis::Winch, GainAxis::Sampler] {
            assert_eq!(GainAxis::from_index(axis.index()), Some(*axis));
        }
        assert_eq!(GainAxis::from_index(1), None);
        assert_eq!(GainAxis::from_index(-1), None);
    }
}
