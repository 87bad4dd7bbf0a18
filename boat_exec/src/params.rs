//! # Boat Executable Parameters
//!
//! This module provides parameters for the boat executable. Every field has a default, so a
//! parameter file only needs to list what it changes.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::time::Duration;

use comms_if::eqpt::SensorType;

use crate::{
    failsafe, loco_ctrl,
    loc::{Pose, UtmOrigin, UtmPose},
    state::Gains,
    traj_ctrl,
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoatExecParams {
    /// Period of the update and navigation loops.
    ///
    /// Units: milliseconds
    pub update_period_ms: u64,

    /// The velocity demand is zeroed if it isn't refreshed within this time.
    ///
    /// Units: milliseconds
    pub velocity_timeout_ms: u64,

    /// Configured sensor type of each channel, indexed by channel number.
    pub sensor_types: Vec<SensorType>,

    pub initial_pose: InitialPose,

    pub gains: Gains,

    pub loco_ctrl: loco_ctrl::Params,

    pub traj_ctrl: traj_ctrl::Params,

    pub failsafe: failsafe::Params,

    pub sensor_expect: SensorExpectParams,

    pub mcu_link: McuLinkParams,
}

/// Pose assumed until the first GPS fix arrives. Also the initial home.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialPose {
    /// Easting, northing and altitude.
    ///
    /// Units: meters
    pub position_m: [f64; 3],

    /// Units: radians
    pub heading_rad: f64,

    pub zone: u8,

    pub is_north: bool,
}

/// Parameters of the check that configured sensors report after each connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorExpectParams {
    /// Time allowed for each channel to report.
    ///
    /// Units: milliseconds
    pub slot_wait_ms: u64,

    /// Number of channels checked, starting from channel 1.
    pub num_slots: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct McuLinkParams {
    /// Path of the serial device the micro-controller is attached to
    pub device: String,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl BoatExecParams {
    pub fn update_period(&self) -> Duration {
        Duration::from_millis(self.update_period_ms)
    }

    pub fn velocity_timeout(&self) -> Duration {
        Duration::from_millis(self.velocity_timeout_ms)
    }
}

impl InitialPose {
    pub fn to_utm(&self) -> UtmPose {
        let [x, y, z] = self.position_m;
        UtmPose::new(
            Pose::new(x, y, z, self.heading_rad),
            UtmOrigin {
                zone: self.zone,
                is_north: self.is_north,
            },
        )
    }
}

impl Default for BoatExecParams {
    fn default() -> Self {
        Self {
            update_period_ms: 100,
            velocity_timeout_ms: 10_000,
            sensor_types: vec![SensorType::None; 5],
            initial_pose: InitialPose::default(),
            gains: Gains::default(),
            loco_ctrl: loco_ctrl::Params::default(),
            traj_ctrl: traj_ctrl::Params::default(),
            failsafe: failsafe::Params::default(),
            sensor_expect: SensorExpectParams::default(),
            mcu_link: McuLinkParams::default(),
        }
    }
}

impl Default for InitialPose {
    fn default() -> Self {
        Self {
            position_m: [476608.34, 4671214.40, 172.35],
            heading_rad: 0.0,
            zone: 17,
            is_north: true,
        }
    }
}

impl Default for SensorExpectParams {
    fn default() -> Self {
        Self {
            slot_wait_ms: 1000,
            num_slots: 3,
        }
    }
}

impl Default for McuLinkParams {
    fn default() -> Self {
        Self {
            device: String::from("/dev/ttyACM0"),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_partial_file() {
        let params: BoatExecParams = util::params::from_str(
            r#"
            update_period_ms = 50
            sensor_types = ["NONE", "ES2", "BATTERY", "SAMPLER", "NONE"]

            [loco_ctrl]
            vehicle_type = "VECTORED"

            [failsafe]
            trigger_voltage = 13.5
            "#,
        )
        .unwrap();

        assert_eq!(params.update_period(), Duration::from_millis(50));
        assert_eq!(params.velocity_timeout(), Duration::from_secs(10));
        assert_eq!(params.sensor_types[1], SensorType::Es2);
        assert_eq!(params.loco_ctrl.vehicle_type, "VECTORED");
        assert_eq!(params.loco_ctrl.safe_vectored_thrust, 1.0);
        assert_eq!(params.failsafe.trigger_voltage, 13.5);
        assert_eq!(params.failsafe.heartbeat_max_wait_ms, 60_000);
        assert_eq!(params.gains.rudder, [0.7, 0.0, 0.5]);
        assert_eq!(params.initial_pose.to_utm().origin.zone, 17);
    }
}
