//! Trajectory control module state

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, trace};
use serde::Serialize;
use std::f64::consts::FRAC_PI_2;

// Internal
use super::{ControllerKind, Params, TrajCtrlError};
use crate::loc::{Pose, Twist};
use util::{
    maths::{clip, normalize_angle},
    module::State,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Trajectory control module state.
///
/// One instance follows a single mission. Positions are handled relative to a reference pose
/// captured when the instance is created, which keeps the arithmetic away from the large
/// absolute values of projected coordinates.
pub struct TrajCtrl {
    params: Params,

    kind: ControllerKind,

    /// Reference position all other positions are made relative to
    reference_m: [f64; 2],

    /// The leg currently being followed
    leg: Option<Leg>,

    report: StatusReport,

    heading_error_old_rad: f64,

    heading_error_accum: f64,
}

/// Geometry of a single leg, relative to the reference.
#[derive(Debug, Clone, Copy)]
struct Leg {
    /// The waypoint index this leg ends at
    index: usize,

    source_m: [f64; 2],

    dest_m: [f64; 2],

    bearing_rad: f64,

    length_m: f64,
}

/// Input data to Trajectory Control.
#[derive(Debug, Clone, Copy)]
pub struct InputData {
    /// The current vehicle pose
    pub pose: Pose,

    /// Index of the waypoint being driven to
    pub wp_index: usize,

    /// The waypoint being driven to
    pub destination: Pose,

    /// The waypoint before the destination, or `None` on the first leg of the mission.
    pub previous: Option<Pose>,

    /// Rudder (heading) PID gains
    pub rudder_gains: [f64; 3],

    /// Thrust PID gains
    pub thrust_gains: [f64; 3],

    /// Measured yaw rate.
    ///
    /// Units: radians/second
    pub yaw_rate_rads: f64,

    /// True if the hull can turn while thrusting without any forward speed penalty.
    pub is_vectored: bool,

    /// Time since the previous call.
    ///
    /// Units: seconds
    pub dt_s: f64,
}

/// Output of Trajectory Control.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputData {
    /// The destination has been reached, the mission should move on to the next waypoint.
    Advance,

    /// Drive with the given velocity.
    Command(Twist),
}

/// The status report containing monitoring quantities.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct StatusReport {
    /// Squared planar distance to the destination
    pub dist_to_dest_sq_m2: f64,

    /// Distance along the leg line from the source to the vehicle's projection onto it
    pub along_track_m: f64,

    /// Signed distance from the leg line, positive to the left of the leg
    pub cross_track_m: f64,

    pub lookahead_m: f64,

    pub heading_desired_rad: f64,

    /// Heading error, in [-pi, pi)
    pub heading_error_rad: f64,

    pub heading_error_rate_rads: f64,

    /// Integral of the heading error over the leg, only accumulated while the rudder integral
    /// gain is positive
    pub heading_error_accum: f64,

    /// Thrust was withheld to turn in place
    pub turning_in_place: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl State for TrajCtrl {
    type InitData = Params;
    type InitError = TrajCtrlError;

    type InputData = InputData;
    type OutputData = OutputData;
    type StatusReport = StatusReport;
    type ProcError = TrajCtrlError;

    /// Initialise the TrajCtrl module with the given parameters.
    fn init(&mut self, init_data: Self::InitData) -> Result<(), Self::InitError> {
        if !(init_data.lookahead_base_m >= 0.0)
            || !(init_data.sufficient_proximity_m > 0.0)
            || !(init_data.turn_in_place_threshold_rad >= 0.0)
        {
            return Err(TrajCtrlError::InvalidParams(format!("{:?}", init_data)));
        }

        self.params = init_data;
        self.leg = None;

        Ok(())
    }

    /// Process trajectory control.
    ///
    /// Processing involves:
    ///  1. Starting a new leg if the waypoint index changed since the last call.
    ///  1. Checking if the destination has been reached.
    ///  1. Otherwise calculating the velocity demand from the current pose and leg.
    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {
        if !(input_data.dt_s > 0.0) {
            return Err(TrajCtrlError::InvalidPeriod(input_data.dt_s));
        }

        self.report = StatusReport::default();

        let leg = match self.leg {
            Some(l) if l.index == input_data.wp_index => l,
            _ => self.start_leg(input_data),
        };

        // Arrival test
        let dist_sq = input_data.pose.planar_dist_sq(&input_data.destination);
        self.report.dist_to_dest_sq_m2 = dist_sq;

        if dist_sq < self.params.sufficient_proximity_m.powi(2) {
            debug!("distance^2 = {:.0}, switch to next waypoint", dist_sq);
            return Ok((OutputData::Advance, self.report));
        }

        let current = self.relative(&input_data.pose);
        let lookahead_point = self.calc_lookahead_point(&leg, current);

        let target = match self.kind {
            ControllerKind::LineFollow => lookahead_point,
            ControllerKind::PointAndShoot => leg.dest_m,
        };

        let twist = self.calc_velocity(input_data, current, target);

        trace!("TrajCtrl report: {:?}", self.report);

        Ok((OutputData::Command(twist), self.report))
    }
}

impl TrajCtrl {
    /// Create a new instance using the given controller, with positions made relative to the
    /// given reference pose.
    pub fn new(kind: ControllerKind, reference: &Pose) -> Self {
        Self {
            params: Params::default(),
            kind,
            reference_m: reference.planar(),
            leg: None,
            report: StatusReport::default(),
            heading_error_old_rad: 0.0,
            heading_error_accum: 0.0,
        }
    }

    pub fn kind(&self) -> ControllerKind {
        self.kind
    }

    /// The most recent status report.
    pub fn report(&self) -> StatusReport {
        self.report
    }

    /// Position relative to the reference.
    fn relative(&self, pose: &Pose) -> [f64; 2] {
        let p = pose.planar();
        [p[0] - self.reference_m[0], p[1] - self.reference_m[1]]
    }

    /// Capture the geometry of the leg ending at the input's destination.
    fn start_leg(&mut self, input_data: &InputData) -> Leg {
        let source_m = match input_data.previous {
            Some(ref p) => self.relative(p),
            None => self.relative(&input_data.pose),
        };
        let dest_m = self.relative(&input_data.destination);

        let dx = dest_m[0] - source_m[0];
        let dy = dest_m[1] - source_m[1];

        let leg = Leg {
            index: input_data.wp_index,
            source_m,
            dest_m,
            bearing_rad: dy.atan2(dx),
            length_m: dx.hypot(dy),
        };

        debug!(
            "Starting leg {}: {:.1} m at {:.3} rad",
            leg.index, leg.length_m, leg.bearing_rad
        );

        // Reset any integral terms
        self.heading_error_accum = 0.0;
        self.leg = Some(leg);

        leg
    }

    /// Project the current position onto the leg line and find the point one lookahead
    /// distance further along it, stopping at the destination.
    fn calc_lookahead_point(&mut self, leg: &Leg, current: [f64; 2]) -> [f64; 2] {
        let dx = current[0] - leg.source_m[0];
        let dy = current[1] - leg.source_m[1];
        let dist_from_source = dx.hypot(dy);
        let dth = normalize_angle(leg.bearing_rad - dy.atan2(dx));

        let along_track = dist_from_source * dth.cos();
        let cross_track = dist_from_source * dth.sin();

        let (sin_b, cos_b) = leg.bearing_rad.sin_cos();
        let projected = [
            leg.source_m[0] + along_track * cos_b,
            leg.source_m[1] + along_track * sin_b,
        ];

        let lookahead = self.params.lookahead_base_m
            * (1.0 - (self.params.lookahead_tanh_gain * cross_track.abs()).tanh());

        self.report.along_track_m = along_track;
        self.report.cross_track_m = cross_track;
        self.report.lookahead_m = lookahead;

        if along_track + lookahead > leg.length_m {
            leg.dest_m
        } else {
            [
                projected[0] + lookahead * cos_b,
                projected[1] + lookahead * sin_b,
            ]
        }
    }

    /// Heading and thrust laws.
    fn calc_velocity(&mut self, input_data: &InputData, current: [f64; 2], target: [f64; 2]) -> Twist {
        let heading_desired = (target[1] - current[1]).atan2(target[0] - current[0]);
        let heading_error = normalize_angle(heading_desired - input_data.pose.get_heading());

        let rudder = &input_data.rudder_gains;

        let heading_error_rate = (heading_error - self.heading_error_old_rad) / input_data.dt_s;
        if rudder[1] > 0.0 {
            self.heading_error_accum += input_data.dt_s * heading_error;
        }
        self.heading_error_old_rad = heading_error;

        // Derivative damping fades out as the error approaches 90 degrees
        let envelope = 1.0 - (heading_error.abs() / FRAC_PI_2).min(1.0);

        let heading_signal = clip(
            rudder[0] * heading_error - rudder[2] * input_data.yaw_rate_rads * envelope,
            -1.0,
            1.0,
        );

        let turning_in_place = !input_data.is_vectored
            && heading_error.abs() > self.params.turn_in_place_threshold_rad;
        let thrust_coefficient = if turning_in_place { 0.0 } else { 1.0 };

        self.report.heading_desired_rad = heading_desired;
        self.report.heading_error_rad = heading_error;
        self.report.heading_error_rate_rads = heading_error_rate;
        self.report.heading_error_accum = self.heading_error_accum;
        self.report.turning_in_place = turning_in_place;

        Twist::new(thrust_coefficient * input_data.thrust_gains[0], heading_signal)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
