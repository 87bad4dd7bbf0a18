//! # Trajectory control module
//!
//! Trajectory control drives the vehicle along the legs of a waypoint mission. Each leg runs
//! from the previous waypoint (or from where the vehicle was when the mission started) to the
//! current waypoint. Two controllers are available:
//!
//! - `LINE_FOLLOW` steers towards a point a lookahead distance ahead along the leg line. The
//!   lookahead shrinks as the cross track error grows, pulling the vehicle back onto the line
//!   rather than letting it cut across.
//! - `POINT_AND_SHOOT` steers straight at the destination.
//!
//! Both produce a yaw rate effort from a proportional heading law with gyro damping near zero
//! heading error, and a constant surge effort from the thrust gain.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use params::*;
pub use state::*;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during TrajCtrl operation.
#[derive(Debug, thiserror::Error)]
pub enum TrajCtrlError {
    #[error("Invalid TrajCtrl parameters: {0}")]
    InvalidParams(String),

    #[error("The control period must be positive, got {0} s")]
    InvalidPeriod(f64),

    #[error("Unknown controller: {0}")]
    UnknownController(String),
}

/// The path following law used for a mission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControllerKind {
    LineFollow,
    PointAndShoot,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ControllerKind {
    pub fn name(&self) -> &'static str {
        match self {
            ControllerKind::LineFollow => "LINE_FOLLOW",
            ControllerKind::PointAndShoot => "POINT_AND_SHOOT",
        }
    }
}

impl Default for ControllerKind {
    fn default() -> Self {
        ControllerKind::LineFollow
    }
}

impl fmt::Display for ControllerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ControllerKind {
    type Err = TrajCtrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [ControllerKind::LineFollow, ControllerKind::PointAndShoot]
            .iter()
            .find(|k| k.name().eq_ignore_ascii_case(s.trim()))
            .copied()
            .ok_or_else(|| TrajCtrlError::UnknownController(s.to_string()))
    }
}
