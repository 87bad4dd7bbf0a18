//! # Vehicle server
//!
//! The server owns the vehicle state and every activity acting on it, and exposes the control
//! surface used by the operator layer.
//!
//! Activities:
//!
//! | Activity        | Period                  | Started by                         |
//! |-----------------|-------------------------|------------------------------------|
//! | update          | `update_period_ms`      | construction                       |
//! | navigation      | `update_period_ms`      | `start_waypoints`, failsafe        |
//! | capture         | job interval            | `start_camera`                     |
//! | sensor expect   | once                    | each time the link connects        |
//! | failsafe        | `failsafe.period_ms`    | construction                       |
//! | watchdog        | one shot                | every velocity write               |
//! | inbound         | continuous              | construction                       |
//!
//! Activities hold weak references to the server so that dropping the last `VehicleServer`
//! tears everything down.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod loops;

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, error, info, warn};
use serde_json::{json, Map, Value};
use std::{
    convert::TryInto,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::Receiver,
        Arc, Mutex,
    },
    thread,
    time::Duration,
};

use comms_if::{
    eqpt::{ChannelId, McuCommand, SensorType},
    net::Transport,
    tc::{CameraState, GainAxis, WaypointState},
};
use util::{module::State, sync::lock, time::now_millis};

use crate::{
    events::{EventSink, LogEvent, Publisher, VehicleEvent},
    failsafe::{FailsafeMonitor, FailsafeState},
    loc::{Projection, SimpleFilter, Twist, UtmPose, UtmProjection},
    loco_ctrl::{LocoCtrl, LocoCtrlError, VehicleType},
    params::BoatExecParams,
    sched::{spawn_once, spawn_periodic, TaskError, TaskSlot, Watchdog},
    sensors::SensorIngest,
    state::{CameraJob, VehicleState},
    traj_ctrl::{ControllerKind, TrajCtrl, TrajCtrlError},
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Speed the winch is driven at.
const WINCH_SPEED: f64 = 500.0;

/// Channel the winch is attached to.
const WINCH_CHANNEL: u8 = 2;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The vehicle server.
pub struct VehicleServer {
    core: Arc<Core>,
}

/// Everything shared between the control surface and the activities.
struct Core {
    params: BoatExecParams,

    state: Arc<VehicleState>,

    loco_ctrl: Mutex<LocoCtrl>,

    failsafe: Arc<FailsafeMonitor>,

    ingest: SensorIngest,

    transport: Arc<dyn Transport>,

    events: Arc<dyn EventSink>,

    publisher: Arc<Publisher>,

    watchdog: Watchdog,

    update_task: TaskSlot,
    nav_task: TaskSlot,
    capture_task: TaskSlot,
    expect_task: TaskSlot,
    failsafe_task: TaskSlot,

    /// Set once the link reports it is closed for good
    link_closed: AtomicBool,

    shut_down: AtomicBool,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Could not initialise LocoCtrl: {0}")]
    LocoCtrlInitError(LocoCtrlError),

    #[error("Could not initialise TrajCtrl: {0}")]
    TrajCtrlInitError(TrajCtrlError),

    #[error("Could not start an activity: {0}")]
    TaskError(#[from] TaskError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl VehicleServer {
    /// Create the server and start its activities, using a UTM projection for GPS fixes.
    pub fn new(
        params: BoatExecParams,
        transport: Arc<dyn Transport>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self, ServerError> {
        Self::with_projection(params, transport, events, Arc::new(UtmProjection))
    }

    /// Create the server and start its activities.
    pub fn with_projection(
        params: BoatExecParams,
        transport: Arc<dyn Transport>,
        events: Arc<dyn EventSink>,
        projection: Arc<dyn Projection>,
    ) -> Result<Self, ServerError> {
        if params.update_period_ms == 0
            || params.velocity_timeout_ms == 0
            || params.failsafe.period_ms == 0
        {
            return Err(ServerError::InvalidParams(
                "periods and timeouts must be non-zero".into(),
            ));
        }

        // Check the trajectory control parameters now rather than on the first mission
        TrajCtrl::new(ControllerKind::default(), &Default::default())
            .init(params.traj_ctrl)
            .map_err(ServerError::TrajCtrlInitError)?;

        let mut loco_ctrl = LocoCtrl::default();
        loco_ctrl
            .init(params.loco_ctrl.clone())
            .map_err(ServerError::LocoCtrlInitError)?;

        let initial_pose = params.initial_pose.to_utm();
        let state = Arc::new(VehicleState::new(
            Box::new(SimpleFilter::new(initial_pose)),
            initial_pose,
            params.gains,
            params.sensor_types.clone(),
        ));
        let failsafe = Arc::new(FailsafeMonitor::new(params.failsafe.clone()));
        let publisher = Arc::new(Publisher::new());

        let ingest = SensorIngest::new(
            state.clone(),
            failsafe.clone(),
            projection,
            events.clone(),
            publisher.clone(),
        );

        let watchdog_state = state.clone();
        let watchdog = Watchdog::spawn("velocity_watchdog", params.velocity_timeout(), move || {
            info!("No velocity command received in time, stopping");
            watchdog_state.set_velocity(Twist::zero());
        })?;

        let core = Arc::new(Core {
            params,
            state,
            loco_ctrl: Mutex::new(loco_ctrl),
            failsafe,
            ingest,
            transport,
            events,
            publisher,
            watchdog,
            update_task: TaskSlot::new("update"),
            nav_task: TaskSlot::new("navigation"),
            capture_task: TaskSlot::new("capture"),
            expect_task: TaskSlot::new("sensor_expect"),
            failsafe_task: TaskSlot::new("failsafe"),
            link_closed: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
        });

        core.start()?;

        Ok(Self { core })
    }

    // ---- POSE ----

    pub fn get_pose(&self) -> UtmPose {
        self.core.state.pose()
    }

    /// Correct the pose estimate, for example from an external fix.
    pub fn set_pose(&self, pose: UtmPose) {
        self.core.state.reset_pose(pose, now_millis());
        self.core.events.log(LogEvent::pose(&pose));
        self.core.publisher.publish(VehicleEvent::Pose(pose));
    }

    // ---- VELOCITY ----

    pub fn get_velocity(&self) -> Twist {
        self.core.state.velocity()
    }

    /// Demand a velocity. The demand is zeroed if it isn't refreshed within the velocity
    /// timeout.
    pub fn set_velocity(&self, velocity: Twist) {
        self.core.failsafe.heartbeat();
        self.core.command_velocity(velocity);
    }

    // ---- GAINS ----

    /// Read the gains of an axis, see `GainAxis::from_index` for the axis numbers.
    ///
    /// The winch axis returns the last depth reported by the winch. Other axes which don't hold
    /// gains return `NaN`s.
    pub fn get_gains(&self, axis: i32) -> [f64; 3] {
        match GainAxis::from_index(axis) {
            Some(GainAxis::Thrust) => self.core.state.gains().thrust,
            Some(GainAxis::Rudder) => self.core.state.gains().rudder,
            Some(GainAxis::Winch) => [self.core.state.winch_depth(), 0.0, 0.0],
            Some(GainAxis::Sampler) | None => [f64::NAN; 3],
        }
    }

    /// Write the gains of an axis.
    ///
    /// - Thrust and rudder take three values, P, I and D.
    /// - Winch takes one value, the distance to move the winch by. Negative values move it up.
    /// - Sampler takes two values, a jar index (or -1 for all jars) and 1 to start or 0 to stop.
    ///   Starting all jars resets them.
    pub fn set_gains(&self, axis: i32, k: &[f64]) {
        let gain_axis = match GainAxis::from_index(axis) {
            Some(a) => a,
            None => {
                warn!("Unsupported gain axis {}", axis);
                return;
            }
        };

        match gain_axis {
            GainAxis::Winch => {
                self.core.command_winch(k);
                return;
            }
            GainAxis::Thrust | GainAxis::Rudder => {
                let values: [f64; 3] = match k.try_into() {
                    Ok(v) => v,
                    Err(_) => {
                        warn!("{:?} gains need 3 values, got {:?}", gain_axis, k);
                        return;
                    }
                };

                if gain_axis == GainAxis::Thrust {
                    self.core.state.set_thrust_gains(values);
                } else {
                    self.core.state.set_rudder_gains(values);
                }
            }
            GainAxis::Sampler => {
                if !self.core.command_sampler(k) {
                    return;
                }
            }
        }

        self.core.events.log(LogEvent::Gain {
            axis,
            values: k.to_vec(),
        });
    }

    // ---- WAYPOINTS ----

    /// Start a new mission, replacing any current one.
    ///
    /// `controller` names the path following law, `LINE_FOLLOW` or `POINT_AND_SHOOT`.
    pub fn start_waypoints(&self, waypoints: Vec<UtmPose>, controller: &str) {
        self.core.failsafe.heartbeat();
        self.core.start_waypoints(waypoints, controller);
    }

    /// Stop the current mission and remove its waypoints.
    pub fn stop_waypoints(&self) {
        self.core.failsafe.heartbeat();
        self.core.stop_waypoints();
    }

    pub fn get_waypoints(&self) -> Vec<UtmPose> {
        self.core.state.mission().waypoints().to_vec()
    }

    pub fn get_waypoint_status(&self) -> WaypointState {
        if self.core.state.mission().active_leg().is_none() {
            WaypointState::Done
        } else if self.core.state.is_autonomous() {
            WaypointState::Going
        } else {
            WaypointState::Paused
        }
    }

    /// Index of the waypoint being driven to, -1 if there is none.
    ///
    /// The operator polls this, so it also counts as a heartbeat.
    pub fn get_waypoints_index(&self) -> i64 {
        self.core.failsafe.heartbeat();
        let index = self.core.state.waypoint_index();
        debug!("Current waypoint index = {}", index);
        index
    }

    // ---- AUTONOMY ----

    pub fn is_autonomous(&self) -> bool {
        self.core.state.is_autonomous()
    }

    /// Switch autonomous mode on or off. The velocity demand is zeroed either way.
    ///
    /// The first time the vehicle is made autonomous its current pose becomes home.
    pub fn set_autonomous(&self, autonomous: bool) {
        self.core.failsafe.heartbeat();
        self.core.state.set_autonomous(autonomous);

        if autonomous && self.core.failsafe.notify_autonomy_engaged() {
            let home = self.core.state.pose();
            self.core.state.set_home(home);
            info!("Home set to {:?} ({})", home.pose.position_m, home.origin);
        }

        self.core.state.set_velocity(Twist::zero());
    }

    // ---- CAMERA ----

    /// Start a capture job of `num_frames` frames (0 for unlimited), one every `interval_s`
    /// seconds.
    pub fn start_camera(&self, num_frames: u32, interval_s: f64, width: u32, height: u32) {
        if !(interval_s > 0.0) || !interval_s.is_finite() {
            warn!("Invalid capture interval {} s, capture not started", interval_s);
            return;
        }

        info!(
            "Starting capture: {}({}x{}) frames @ {}s",
            num_frames, width, height, interval_s
        );

        let core = &self.core;
        let weak = Arc::downgrade(core);

        let started = core.capture_task.start(|| {
            core.state.set_camera_job(CameraJob {
                num_frames,
                interval_s,
                width,
                height,
                frames_captured: 0,
                state: CameraState::Capturing,
            });

            spawn_periodic("capture", Duration::from_secs_f64(interval_s), move || {
                loops::capture_tick(&weak)
            })
        });

        if let Err(e) = started {
            error!("Could not start capture: {}", e);
            return;
        }

        core.events.log(LogEvent::Img {
            num: num_frames,
            interval: interval_s,
            w: width,
            h: height,
        });
    }

    pub fn stop_camera(&self) {
        self.core.stop_camera();
    }

    pub fn get_camera_status(&self) -> CameraState {
        self.core.state.camera_job().state
    }

    // ---- HOME ----

    pub fn get_home(&self) -> UtmPose {
        self.core.state.home()
    }

    pub fn set_home(&self, home: UtmPose) {
        self.core.state.set_home(home);
    }

    /// Drive straight home, as the failsafe does.
    pub fn start_go_home(&self) {
        self.core.go_home();
    }

    // ---- SENSORS ----

    pub fn get_sensor_type(&self, channel: usize) -> SensorType {
        self.core.state.sensor_type(channel)
    }

    pub fn set_sensor_type(&self, channel: usize, sensor_type: SensorType) {
        if !self.core.state.set_sensor_type(channel, sensor_type) {
            warn!(
                "Cannot set the type of sensor channel {}, there are only {} channels",
                channel,
                self.core.state.num_sensors()
            );
        }
    }

    pub fn get_num_sensors(&self) -> usize {
        self.core.state.num_sensors()
    }

    // ---- GYRO ----

    pub fn get_gyro(&self) -> [f64; 3] {
        self.core.state.gyro()
    }

    /// Update the gyro rates. The yaw rate damps the heading controller.
    pub fn set_gyro(&self, gyro: [f64; 3]) {
        self.core.state.set_gyro(gyro);
    }

    // ---- STATUS ----

    pub fn is_connected(&self) -> bool {
        self.core.transport.is_connected()
    }

    /// True once the link to the micro-controller has closed and will not reconnect.
    pub fn is_link_closed(&self) -> bool {
        self.core.link_closed.load(Ordering::SeqCst)
    }

    /// Receive status updates from now on.
    pub fn subscribe(&self) -> Receiver<VehicleEvent> {
        self.core.publisher.subscribe()
    }

    pub fn failsafe_state(&self) -> FailsafeState {
        self.core.failsafe.state()
    }

    /// Stop every activity and bring the vehicle to rest. Only the first call has any effect.
    pub fn shutdown(&self) {
        self.core.shutdown();
    }
}

impl Drop for VehicleServer {
    fn drop(&mut self) {
        self.core.shutdown();
    }
}

impl Core {
    /// Start the activities which run for the whole life of the server.
    fn start(self: &Arc<Self>) -> Result<(), TaskError> {
        let weak = Arc::downgrade(self);
        self.update_task.start(|| {
            spawn_periodic("update", self.params.update_period(), move || {
                loops::update_tick(&weak)
            })
        })?;

        let weak = Arc::downgrade(self);
        self.failsafe_task.start(|| {
            spawn_periodic(
                "failsafe",
                Duration::from_millis(self.params.failsafe.period_ms),
                move || loops::failsafe_tick(&weak),
            )
        })?;

        let weak = Arc::downgrade(self);
        let transport = self.transport.clone();
        thread::Builder::new()
            .name("inbound".into())
            .spawn(move || loops::inbound(weak, transport))
            .map_err(|e| TaskError::SpawnFailed("inbound".into(), e))?;

        Ok(())
    }

    /// Store a velocity demand and rearm the watchdog.
    fn command_velocity(&self, velocity: Twist) {
        self.watchdog
            .rearm_with(|| self.state.set_velocity(velocity));
    }

    fn vehicle_type(&self) -> Option<VehicleType> {
        lock(&self.loco_ctrl).vehicle_type()
    }

    fn start_waypoints(self: &Arc<Self>, waypoints: Vec<UtmPose>, controller: &str) {
        let kind = controller.parse().unwrap_or_else(|e| {
            warn!("{}, using {}", e, ControllerKind::LineFollow);
            ControllerKind::LineFollow
        });

        info!("Starting waypoints with {}: {} waypoints", kind, waypoints.len());

        let nav_event = LogEvent::Nav {
            controller: kind.name().into(),
            waypoints: waypoints
                .iter()
                .map(|w| {
                    let p = w.pose.position_m;
                    [p.x, p.y, p.z]
                })
                .collect(),
        };

        let mut traj_ctrl = TrajCtrl::new(kind, &self.state.pose().pose);
        if let Err(e) = traj_ctrl.init(self.params.traj_ctrl) {
            error!("Could not initialise TrajCtrl: {}", e);
            return;
        }

        let weak = Arc::downgrade(self);
        let period = self.params.update_period();
        let state = &self.state;

        // The mission and the task driving it are swapped together under the slot lock
        let started = self.nav_task.start(move || {
            let generation = state.replace_mission(waypoints, kind);
            spawn_periodic("navigation", period, move || {
                loops::nav_tick(&weak, &mut traj_ctrl, generation)
            })
        });

        if let Err(e) = started {
            error!("Could not start navigation: {}", e);
        }

        self.events.log(nav_event);
    }

    fn stop_waypoints(&self) {
        if self.nav_task.cancel() {
            self.command_velocity(Twist::zero());
            info!("Waypoints stopped");
        }

        self.state.clear_mission();
        self.publisher
            .publish(VehicleEvent::Waypoint(WaypointState::Cancelled));
    }

    fn stop_camera(&self) {
        self.capture_task.cancel();
        self.state.set_camera_state(CameraState::Cancelled);
        self.publisher
            .publish(VehicleEvent::Camera(CameraState::Cancelled));
    }

    /// Make the vehicle autonomous and drive straight home.
    fn go_home(self: &Arc<Self>) {
        self.failsafe.latch();

        // Going home counts as the first engagement if autonomy was never switched on
        if self.failsafe.notify_autonomy_engaged() {
            let here = self.state.pose();
            self.state.set_home(here);
            info!("Home set to {:?} ({})", here.pose.position_m, here.origin);
        }

        let home = self.state.home();
        info!("Going home to {:?} ({})", home.pose.position_m, home.origin);

        self.state.set_autonomous(true);
        self.start_waypoints(vec![home], ControllerKind::PointAndShoot.name());
    }

    /// Called on each transition of the link from disconnected to connected.
    fn on_connect(self: &Arc<Self>) {
        info!("Micro-controller connected");
        self.state.reset_expected_received();

        let weak = Arc::downgrade(self);
        let slot_wait = Duration::from_millis(self.params.sensor_expect.slot_wait_ms);
        let num_slots = self.params.sensor_expect.num_slots;

        let started = self.expect_task.start(|| {
            spawn_once("sensor_expect", move |ctx| {
                loops::expect_sensors(&weak, ctx, slot_wait, num_slots)
            })
        });

        if let Err(e) = started {
            error!("Could not start the sensor check: {}", e);
        }
    }

    /// Move the winch by `k[0]`.
    fn command_winch(&self, k: &[f64]) {
        let distance = match k.first() {
            Some(d) => *d,
            None => {
                warn!("Winch command needs a distance");
                return;
            }
        };

        let direction = if distance > 0.0 {
            1.0
        } else if distance < 0.0 {
            -1.0
        } else {
            0.0
        };

        let mut cmd = McuCommand::new();
        cmd.set(
            ChannelId::Sensor(WINCH_CHANNEL),
            json!({ "p": distance.abs() as f32, "v": WINCH_SPEED * direction }),
        );

        if let Err(e) = self.transport.send(&cmd) {
            warn!("Unable to send winch command: {}", e);
        }
        self.events.log(LogEvent::Winch(cmd));
    }

    /// Send a sampler command to every sampler channel. Returns `false` if `k` isn't a valid
    /// command.
    fn command_sampler(&self, k: &[f64]) -> bool {
        let (jar, start) = match k {
            [jar, action, ..] if *action == 1.0 => (*jar, true),
            [jar, action, ..] if *action == 0.0 => (*jar, false),
            _ => {
                warn!("Invalid sampler command {:?}", k);
                return false;
            }
        };

        let (key, value, description) = if jar == -1.0 {
            if start {
                ("r", "-1".to_string(), "reset all".to_string())
            } else {
                ("s", "-1".to_string(), "stop all".to_string())
            }
        } else {
            let jar_name = format!("{:?}", jar);
            let jar_number = jar as i64 + 1;
            if start {
                ("e", jar_name, format!("jar # {} start", jar_number))
            } else {
                ("d", jar_name, format!("jar # {} stop", jar_number))
            }
        };

        for channel in self.state.channels_of_type(SensorType::Sampler) {
            let mut fields = Map::new();
            fields.insert(key.into(), Value::String(value.clone()));

            let mut cmd = McuCommand::new();
            cmd.set(ChannelId::Sensor(channel as u8), Value::Object(fields));

            if let Err(e) = self.transport.send(&cmd) {
                warn!("Unable to send sampler command: {}", e);
            }
            self.events.log(LogEvent::Sampler(description.clone()));
        }

        true
    }

    fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        info!("Shutting down the vehicle server");

        // The failsafe could otherwise start a new mission after it is stopped
        self.failsafe_task.cancel();

        self.stop_waypoints();
        self.stop_camera();

        self.state.set_autonomous(false);
        self.state.set_connected(false);
        self.state.set_running(false);

        self.update_task.cancel();
        self.expect_task.cancel();
        self.watchdog.shutdown();

        info!("Vehicle server shut down");
    }
}
