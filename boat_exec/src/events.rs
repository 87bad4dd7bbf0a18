//! # Events
//!
//! Two outputs leave the executable besides actuator commands:
//!
//! - Structured log records, written to an `EventSink`. These are the vehicle's data log: poses,
//!   commands sent, gain changes, sensor readings and state transitions.
//! - Status updates, fanned out to any number of subscribers by the `Publisher`.
//!
//! Neither may block or fail a control loop, so both swallow their own errors.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{info, warn};
use serde::Serialize;
use serde_json::Value;
use std::sync::{
    mpsc::{channel, Receiver, Sender},
    Mutex,
};

use comms_if::{
    eqpt::{McuCommand, SensorReading},
    tc::{CameraState, WaypointState},
};
use util::{logger::EVENT_TARGET, sync::lock};

use crate::loc::UtmPose;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A destination for structured log records.
pub trait EventSink: Send + Sync {
    /// Record an event. Must not block.
    fn log(&self, event: LogEvent);
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// A structured log record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogEvent {
    /// The pose estimate
    Pose {
        p: [f64; 3],
        q: [f64; 4],
        zone: String,
    },

    /// An actuator command sent to the micro-controller
    Cmd(McuCommand),

    /// A gain change
    Gain { axis: i32, values: Vec<f64> },

    /// A winch command
    Winch(McuCommand),

    /// A sampler action
    Sampler(String),

    /// A parsed sensor reading
    Sensor(SensorReading),

    /// A raw sensor payload, kept for payloads carrying more than the parsed reading
    Raw { channel: u8, payload: Value },

    /// A new mission
    Nav {
        controller: String,
        waypoints: Vec<[f64; 3]>,
    },

    /// A new camera job
    Img {
        num: u32,
        interval: f64,
        w: u32,
        h: u32,
    },

    /// The failsafe tripped
    Failsafe { cause: String },
}

/// A status update published to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum VehicleEvent {
    Pose(UtmPose),
    Waypoint(WaypointState),
    Camera(CameraState),
    Sensor(SensorReading),
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Event sink writing each record as JSON through the logger, under the `event` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEventSink;

/// Event sink keeping every record in memory.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<LogEvent>>,
}

/// Fans status updates out to subscribers.
#[derive(Debug, Default)]
pub struct Publisher {
    subscribers: Mutex<Vec<Sender<VehicleEvent>>>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl LogEvent {
    /// Build a pose record.
    pub fn pose(pose: &UtmPose) -> Self {
        let p = pose.pose.position_m;
        LogEvent::Pose {
            p: [p.x, p.y, p.z],
            q: pose.pose.attitude_array(),
            zone: pose.origin.to_string(),
        }
    }
}

impl EventSink for LogEventSink {
    fn log(&self, event: LogEvent) {
        match serde_json::to_string(&event) {
            Ok(s) => info!(target: EVENT_TARGET, "{}", s),
            Err(e) => warn!("Unable to serialize {:?}: {}", event, e),
        }
    }
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of every record so far.
    pub fn events(&self) -> Vec<LogEvent> {
        lock(&self.events).clone()
    }

    /// Records matching the given predicate.
    pub fn find<P>(&self, predicate: P) -> Vec<LogEvent>
    where
        P: Fn(&LogEvent) -> bool,
    {
        lock(&self.events)
            .iter()
            .filter(|e| predicate(e))
            .cloned()
            .collect()
    }
}

impl EventSink for MemoryEventSink {
    fn log(&self, event: LogEvent) {
        lock(&self.events).push(event);
    }
}

impl Publisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber, which receives every update published from now on.
    pub fn subscribe(&self) -> Receiver<VehicleEvent> {
        let (tx, rx) = channel();
        lock(&self.subscribers).push(tx);
        rx
    }

    /// Publish an update. Subscribers which have gone away are dropped.
    pub fn publish(&self, event: VehicleEvent) {
        lock(&self.subscribers).retain(|s| s.send(event.clone()).is_ok());
    }

    pub fn num_subscribers(&self) -> usize {
        lock(&self.subscribers).len()
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
