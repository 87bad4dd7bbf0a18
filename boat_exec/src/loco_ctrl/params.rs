//! Parameters structure for LocoCtrl

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for Locomotion control.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Name of the hull type, one of `DIFFERENTIAL`, `VECTORED` or `PROPGUARD`.
    pub vehicle_type: String,

    // ---- CAPABILITIES ----
    /// Maximum normalised thruster demand for differential hulls. Demands are rescaled from
    /// [-1, 1] into [-limit, limit].
    pub safe_differential_thrust: f64,

    /// Maximum normalised thruster demand for vectored hulls. Demands are rescaled from [0, 1]
    /// into [0, limit].
    pub safe_vectored_thrust: f64,

    /// Divisor applied to the forward thruster of a prop guard hull spinning in place, used
    /// when the integral thrust gain is zero.
    pub propguard_default_divisor: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            vehicle_type: String::from("DIFFERENTIAL"),
            safe_differential_thrust: 1.0,
            safe_vectored_thrust: 1.0,
            propguard_default_divisor: 5.0,
        }
    }
}
