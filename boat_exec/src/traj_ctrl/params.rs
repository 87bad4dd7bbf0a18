//! Parameters structure for TrajCtrl

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for Trajectory control.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Lookahead distance along the leg when the vehicle is on the leg line.
    ///
    /// Units: meters
    pub lookahead_base_m: f64,

    /// Gain on the cross track error inside the lookahead shrinking `tanh`.
    ///
    /// Units: 1/meters
    pub lookahead_tanh_gain: f64,

    /// A waypoint is reached once the vehicle is closer than this.
    ///
    /// Units: meters
    pub sufficient_proximity_m: f64,

    /// Hulls which can't vector their thrust turn in place while the heading error is larger
    /// than this.
    ///
    /// Units: radians
    pub turn_in_place_threshold_rad: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            lookahead_base_m: 5.0,
            lookahead_tanh_gain: 0.2,
            sufficient_proximity_m: 3.0,
            turn_in_place_threshold_rad: 45f64.to_radians(),
        }
    }
}
