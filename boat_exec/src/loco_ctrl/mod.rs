//! Locomotion control module
//!
//! Converts the demanded velocity into actuator demands for the configured hull. Three hull
//! types are supported:
//!
//! - `DIFFERENTIAL`: two fixed thrusters steering by speed difference.
//! - `VECTORED`: a single thruster and a rudder servo.
//! - `PROPGUARD`: two fixed thrusters in prop guards, with reduced forward thrust while spinning
//!   in place.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod calc_differential;
mod calc_propguard;
mod calc_vectored;
mod params;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use comms_if::eqpt::McuCommand;

pub use params::*;
pub use state::*;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during LocoCtrl operation.
#[derive(Debug, thiserror::Error)]
pub enum LocoCtrlError {
    #[error("Unknown vehicle type: {0}")]
    UnknownVehicleType(String),

    #[error("Invalid LocoCtrl parameters: {0}")]
    InvalidParams(String),
}

/// The hull and actuator layout of the vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VehicleType {
    Differential,
    Vectored,
    #[serde(rename = "PROPGUARD")]
    PropGuard,
}

/// Actuator demands produced by LocoCtrl.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum ActuatorDems {
    /// Velocity demands for the two thrusters, `m0` and `m1`.
    Motors { m0: f64, m1: f64 },

    /// Velocity demand for the thruster `m0` and position demand for the rudder servo `s0`.
    ThrustRudder { thrust: f64, rudder: f64 },
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl VehicleType {
    pub fn name(&self) -> &'static str {
        match self {
            VehicleType::Differential => "DIFFERENTIAL",
            VehicleType::Vectored => "VECTORED",
            VehicleType::PropGuard => "PROPGUARD",
        }
    }
}

impl fmt::Display for VehicleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for VehicleType {
    type Err = LocoCtrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            VehicleType::Differential,
            VehicleType::Vectored,
            VehicleType::PropGuard,
        ]
        .iter()
        .find(|t| t.name().eq_ignore_ascii_case(s.trim()))
        .copied()
        .ok_or_else(|| LocoCtrlError::UnknownVehicleType(s.to_string()))
    }
}

impl ActuatorDems {
    /// Build the micro-controller command carrying these demands.
    pub fn to_command(&self) -> McuCommand {
        match *self {
            ActuatorDems::Motors { m0, m1 } => McuCommand::new()
                .with_motor_velocity(0, m0)
                .with_motor_velocity(1, m1),
            ActuatorDems::ThrustRudder { thrust, rudder } => McuCommand::new()
                .with_motor_velocity(0, thrust)
                .with_servo_position(0, rudder),
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_vehicle_type_names() {
        assert_eq!("differential".parse::<VehicleType>().unwrap(), VehicleType::Differential);
        assert_eq!("PROPGUARD".parse::<VehicleType>().unwrap(), VehicleType::PropGuard);
        assert!("HOVERCRAFT".parse::<VehicleType>().is_err());
    }

    #[test]
    fn test_dems_to_command() {
        let cmd = ActuatorDems::ThrustRudder {
            thrust: 0.5,
            rudder: -0.25,
        }
        .to_command();
        assert_eq!(cmd.field_f64("m0", "v"), Some(0.5));
        assert_eq!(cmd.field_f64("s0", "p"), Some(-0.25));

        let cmd = ActuatorDems::Motors { m0: -1.0, m1: 1.0 }.to_command();
        assert_eq!(cmd.field_f64("m0", "v"), Some(-1.0));
        assert_eq!(cmd.field_f64("m1", "v"), Some(1.0));
    }
}
