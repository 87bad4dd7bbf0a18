//! Implementations for the LocoCtrl state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{trace, warn};
use serde::Serialize;

// Internal
use super::{ActuatorDems, LocoCtrlError, Params, VehicleType};
use crate::loc::Twist;
use util::module::State;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Locomotion control module state
#[derive(Default)]
pub struct LocoCtrl {
    pub(crate) params: Params,

    /// The parsed hull type, or `None` if the configured name is not recognised.
    pub(crate) vehicle_type: Option<VehicleType>,

    pub(crate) report: StatusReport,

    pub(crate) output: Option<ActuatorDems>,
}

/// Input data to Locomotion Control.
#[derive(Debug, Default, Clone, Copy)]
pub struct InputData {
    /// The demanded velocity.
    pub velocity: Twist,

    /// The current thrust PID gains. The integral term scales forward thrust on prop guard
    /// hulls spinning in place.
    pub thrust_gains: [f64; 3],
}

/// Status report for LocoCtrl processing.
#[derive(Clone, Copy, Default, Serialize, Debug)]
pub struct StatusReport {
    /// One or more demands were clipped to [-1, 1].
    pub clipped: bool,

    /// Demands were scaled down together to keep the largest within [-1, 1].
    pub scaled_down: bool,

    /// The forward thruster was reduced while spinning in place.
    pub guard_reduced: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl State for LocoCtrl {
    type InitData = Params;
    type InitError = LocoCtrlError;

    type InputData = InputData;
    type OutputData = ActuatorDems;
    type StatusReport = StatusReport;
    type ProcError = LocoCtrlError;

    /// Initialise the LocoCtrl module.
    ///
    /// An unrecognised vehicle type is not an initialisation error. It is reported on each
    /// processing cycle instead, so that the rest of the vehicle keeps running.
    fn init(&mut self, init_data: Self::InitData) -> Result<(), Self::InitError> {
        if !(init_data.safe_differential_thrust > 0.0)
            || !(init_data.safe_vectored_thrust > 0.0)
            || !(init_data.propguard_default_divisor > 0.0)
        {
            return Err(LocoCtrlError::InvalidParams(format!(
                "thrust limits and divisor must be positive, got {:?}",
                init_data
            )));
        }

        self.vehicle_type = match init_data.vehicle_type.parse() {
            Ok(t) => Some(t),
            Err(e) => {
                warn!("{}, no actuator demands will be produced", e);
                None
            }
        };

        self.params = init_data;
        self.output = None;

        Ok(())
    }

    /// Perform cyclic processing of Locomotion Control.
    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {
        // Clear the status report
        self.report = StatusReport::default();

        let vehicle_type = match self.vehicle_type {
            Some(t) => t,
            None => {
                return Err(LocoCtrlError::UnknownVehicleType(
                    self.params.vehicle_type.clone(),
                ))
            }
        };

        let output = match vehicle_type {
            VehicleType::Differential => self.calc_differential(&input_data.velocity),
            VehicleType::Vectored => self.calc_vectored(&input_data.velocity),
            VehicleType::PropGuard => {
                self.calc_propguard(&input_data.velocity, &input_data.thrust_gains)
            }
        };

        trace!("LocoCtrl output: {:?}", output);

        self.output = Some(output);

        Ok((output, self.report))
    }
}

impl LocoCtrl {
    /// The hull type being controlled, if it is known.
    pub fn vehicle_type(&self) -> Option<VehicleType> {
        self.vehicle_type
    }

    /// The most recent output, if any.
    pub fn output(&self) -> Option<ActuatorDems> {
        self.output
    }

    /// Clip a demand to [-1, 1], flagging it in the report if it was out of range.
    pub(crate) fn clip_unit(&mut self, value: f64) -> f64 {
        let clipped = util::maths::clip(value, -1.0, 1.0);
        if clipped != value {
            self.report.clipped = true;
        }
        clipped
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_unknown_vehicle_type() {
        let mut lc = LocoCtrl::default();
        lc.init(Params {
            vehicle_type: "AIRSHIP".into(),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(lc.vehicle_type(), None);
        assert!(matches!(
            lc.proc(&InputData::default()),
            Err(LocoCtrlError::UnknownVehicleType(_))
        ));
        assert_eq!(lc.output(), None);
    }

    #[test]
    fn test_invalid_params() {
        let mut lc = LocoCtrl::default();
        assert!(lc
            .init(Params {
                safe_vectored_thrust: 0.0,
                ..Default::default()
            })
            .is_err());
    }
}
