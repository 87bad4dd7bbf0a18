//! # Vehicle state store
//!
//! Holds all vehicle state shared between the periodic activities and the operator interface.
//!
//! State is partitioned into independently locked groups so that activities running at
//! different periods never wait on each other for unrelated data:
//!
//! | Group             | Guard                    | Written by                              |
//! |-------------------|--------------------------|-----------------------------------------|
//! | pose estimate     | `filter` then `pose`     | update loop, GPS ingest, `set_pose`     |
//! | velocity demand   | `velocity`               | operator, navigation loop, watchdog     |
//! | mission           | `mission`                | operator, navigation loop, failsafe     |
//! | gains             | `gains`                  | operator                                |
//! | home              | `home`                   | operator, first autonomy                |
//! | gyro              | `gyro`                   | operator                                |
//! | winch depth       | `winch_depth`            | sensor ingest                           |
//! | sensor slots      | `sensors`                | operator, sensor ingest, inbound link   |
//! | camera job        | `camera`                 | operator, capture loop                  |
//!
//! No method holds more than one guard at a time, except the pose group where `filter` is always
//! taken before `pose`. Every getter returns a copy so that no guard escapes this module.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod mission;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex,
};

use comms_if::{eqpt::SensorType, tc::CameraState};
use util::sync::lock;

use crate::loc::{PoseFilter, Twist, UtmPose};
use crate::traj_ctrl::ControllerKind;

pub use mission::*;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Shared vehicle state.
pub struct VehicleState {
    filter: Mutex<Box<dyn PoseFilter>>,
    pose: Mutex<UtmPose>,

    velocity: Mutex<Twist>,

    mission: Mutex<Mission>,

    gains: Mutex<Gains>,

    home: Mutex<UtmPose>,

    gyro: Mutex<[f64; 3]>,

    winch_depth: Mutex<f64>,

    sensors: Mutex<SensorSlots>,

    camera: Mutex<CameraJob>,

    autonomous: AtomicBool,

    connected: AtomicBool,

    running: AtomicBool,
}

/// PID gains of the two control loops.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Gains {
    pub thrust: [f64; 3],
    pub rudder: [f64; 3],
}

/// Configured sensor type of each channel and whether that type has been heard from since the
/// link last connected.
#[derive(Debug, Clone)]
struct SensorSlots {
    types: Vec<SensorType>,
    received: Vec<bool>,
}

/// A camera capture job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CameraJob {
    /// Number of frames to capture, 0 for unlimited
    pub num_frames: u32,

    /// Time between frames.
    ///
    /// Units: seconds
    pub interval_s: f64,

    pub width: u32,

    pub height: u32,

    pub frames_captured: u32,

    pub state: CameraState,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Gains {
    fn default() -> Self {
        Self {
            thrust: [0.5, 0.0, 0.0],
            rudder: [0.7, 0.0, 0.5],
        }
    }
}

impl VehicleState {
    /// Create the state with the given initial pose, which is also the initial home.
    pub fn new(
        filter: Box<dyn PoseFilter>,
        initial_pose: UtmPose,
        gains: Gains,
        sensor_types: Vec<SensorType>,
    ) -> Self {
        let num_sensors = sensor_types.len();

        Self {
            filter: Mutex::new(filter),
            pose: Mutex::new(initial_pose),
            velocity: Mutex::new(Twist::zero()),
            mission: Mutex::new(Mission::default()),
            gains: Mutex::new(gains),
            home: Mutex::new(initial_pose),
            gyro: Mutex::new([0.0; 3]),
            winch_depth: Mutex::new(f64::NAN),
            sensors: Mutex::new(SensorSlots {
                types: sensor_types,
                received: vec![false; num_sensors],
            }),
            camera: Mutex::new(CameraJob::default()),
            autonomous: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            running: AtomicBool::new(true),
        }
    }

    // ---- POSE ----

    /// The current pose estimate.
    pub fn pose(&self) -> UtmPose {
        *lock(&self.pose)
    }

    /// Replace the pose estimate with the filter's prediction at the given time.
    pub fn refresh_pose(&self, time_ms: i64) -> UtmPose {
        let predicted = lock(&self.filter).pose(time_ms);
        *lock(&self.pose) = predicted;
        predicted
    }

    /// Reset the filter and the pose estimate to an externally supplied pose.
    pub fn reset_pose(&self, pose: UtmPose, time_ms: i64) {
        lock(&self.filter).reset(pose, time_ms);
        *lock(&self.pose) = pose;
    }

    /// Feed a position fix into the filter. The estimate is picked up on the next refresh.
    pub fn gps_update(&self, fix: UtmPose, time_ms: i64) -> bool {
        lock(&self.filter).gps_update(fix, time_ms)
    }

    // ---- VELOCITY ----

    pub fn velocity(&self) -> Twist {
        *lock(&self.velocity)
    }

    /// Replace the velocity demand.
    ///
    /// This only stores the value, arming the velocity watchdog is the caller's responsibility.
    pub fn set_velocity(&self, velocity: Twist) {
        *lock(&self.velocity) = velocity;
    }

    // ---- MISSION ----

    /// A copy of the current mission.
    pub fn mission(&self) -> Mission {
        lock(&self.mission).clone()
    }

    pub fn waypoint_index(&self) -> i64 {
        lock(&self.mission).index()
    }

    /// Replace the mission, returning the new mission's generation.
    pub fn replace_mission(&self, waypoints: Vec<UtmPose>, controller: ControllerKind) -> u64 {
        lock(&self.mission).replace(waypoints, controller)
    }

    /// Remove all waypoints.
    pub fn clear_mission(&self) {
        lock(&self.mission).clear()
    }

    /// Move on to the waypoint after `from_index`, if the mission is still the one identified by
    /// `generation` and has not already moved on.
    pub fn advance_waypoint(&self, generation: u64, from_index: usize) -> bool {
        lock(&self.mission).advance(generation, from_index)
    }

    /// Mark the mission identified by `generation` as finished.
    pub fn finish_mission(&self, generation: u64) {
        lock(&self.mission).finish(generation)
    }

    // ---- GAINS ----

    pub fn gains(&self) -> Gains {
        *lock(&self.gains)
    }

    pub fn set_thrust_gains(&self, k: [f64; 3]) {
        lock(&self.gains).thrust = k;
    }

    pub fn set_rudder_gains(&self, k: [f64; 3]) {
        lock(&self.gains).rudder = k;
    }

    // ---- HOME ----

    pub fn home(&self) -> UtmPose {
        *lock(&self.home)
    }

    pub fn set_home(&self, home: UtmPose) {
        *lock(&self.home) = home;
    }

    // ---- GYRO ----

    pub fn gyro(&self) -> [f64; 3] {
        *lock(&self.gyro)
    }

    pub fn set_gyro(&self, gyro: [f64; 3]) {
        *lock(&self.gyro) = gyro;
    }

    // ---- WINCH ----

    /// Last depth reported by the winch, `NaN` if it never reported.
    pub fn winch_depth(&self) -> f64 {
        *lock(&self.winch_depth)
    }

    pub fn set_winch_depth(&self, depth: f64) {
        *lock(&self.winch_depth) = depth;
    }

    // ---- SENSORS ----

    pub fn num_sensors(&self) -> usize {
        lock(&self.sensors).types.len()
    }

    /// The configured type of a channel, `SensorType::None` for channels which don't exist.
    pub fn sensor_type(&self, channel: usize) -> SensorType {
        lock(&self.sensors)
            .types
            .get(channel)
            .copied()
            .unwrap_or_default()
    }

    /// Configure the type of a channel. Returns `false` if the channel doesn't exist.
    pub fn set_sensor_type(&self, channel: usize, sensor_type: SensorType) -> bool {
        match lock(&self.sensors).types.get_mut(channel) {
            Some(t) => {
                *t = sensor_type;
                true
            }
            None => false,
        }
    }

    /// Channels configured with the given type.
    pub fn channels_of_type(&self, sensor_type: SensorType) -> Vec<usize> {
        lock(&self.sensors)
            .types
            .iter()
            .enumerate()
            .filter(|(_, t)| **t == sensor_type)
            .map(|(i, _)| i)
            .collect()
    }

    /// Record that a channel reported its configured type.
    pub fn mark_expected_received(&self, channel: usize) {
        if let Some(r) = lock(&self.sensors).received.get_mut(channel) {
            *r = true;
        }
    }

    pub fn expected_received(&self, channel: usize) -> bool {
        lock(&self.sensors)
            .received
            .get(channel)
            .copied()
            .unwrap_or(false)
    }

    /// Forget which channels have reported.
    pub fn reset_expected_received(&self) {
        for r in lock(&self.sensors).received.iter_mut() {
            *r = false;
        }
    }

    // ---- CAMERA ----

    pub fn camera_job(&self) -> CameraJob {
        *lock(&self.camera)
    }

    pub fn set_camera_job(&self, job: CameraJob) {
        *lock(&self.camera) = job;
    }

    /// Count a captured frame, returning the updated job.
    ///
    /// The job becomes `Done` once a limited job has captured all its frames.
    pub fn capture_frame(&self) -> CameraJob {
        let mut job = lock(&self.camera);
        job.frames_captured += 1;

        job.state = if job.num_frames > 0 && job.frames_captured >= job.num_frames {
            CameraState::Done
        } else {
            CameraState::Capturing
        };

        *job
    }

    pub fn set_camera_state(&self, state: CameraState) {
        lock(&self.camera).state = state;
    }

    // ---- FLAGS ----

    pub fn is_autonomous(&self) -> bool {
        self.autonomous.load(Ordering::SeqCst)
    }

    pub fn set_autonomous(&self, autonomous: bool) {
        self.autonomous.store(autonomous, Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Set the connected flag, returning the previous value.
    pub fn set_connected(&self, connected: bool) -> bool {
        self.connected.swap(connected, Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
