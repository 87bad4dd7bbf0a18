//! # Failsafe monitor
//!
//! Watches the battery voltage and the operator heartbeat, and decides when the vehicle must be
//! sent home. The monitor only decides, the go-home route itself is started by the server.
//!
//! The monitor stays inert until the vehicle has been made autonomous at least once, since home
//! is only known from that point. Once tripped it latches and never returns to normal.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, error};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
    time::{Duration, Instant},
};

use util::sync::lock;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Failsafe parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Params {
    /// Time between two polls of the monitor.
    ///
    /// Units: milliseconds
    pub period_ms: u64,

    /// The monitor trips when the battery falls below this voltage.
    ///
    /// Units: volts
    pub trigger_voltage: f64,

    /// The monitor trips when no operator heartbeat was received for this long while the vehicle
    /// is not autonomous.
    ///
    /// Units: milliseconds
    pub heartbeat_max_wait_ms: u64,

    /// Battery voltage assumed until the battery monitor first reports.
    ///
    /// Units: volts
    pub initial_battery_v: f64,
}

/// Battery and heartbeat monitor.
#[derive(Debug)]
pub struct FailsafeMonitor {
    params: Params,

    battery_v: Mutex<f64>,

    last_heartbeat: Mutex<Instant>,

    active: AtomicBool,

    autonomy_seen: AtomicBool,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailsafeState {
    Normal,
    Active,
}

/// What tripped the monitor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TripCause {
    /// The battery voltage, in volts
    LowBattery(f64),

    /// Time since the last heartbeat
    HeartbeatLost(Duration),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            period_ms: 10_000,
            trigger_voltage: 14.0,
            heartbeat_max_wait_ms: 60_000,
            initial_battery_v: 16.0,
        }
    }
}

impl FailsafeMonitor {
    pub fn new(params: Params) -> Self {
        Self {
            battery_v: Mutex::new(params.initial_battery_v),
            last_heartbeat: Mutex::new(Instant::now()),
            active: AtomicBool::new(false),
            autonomy_seen: AtomicBool::new(false),
            params,
        }
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Record an operator heartbeat.
    pub fn heartbeat(&self) {
        *lock(&self.last_heartbeat) = Instant::now();
    }

    /// Time since the last operator heartbeat.
    pub fn since_heartbeat(&self) -> Duration {
        lock(&self.last_heartbeat).elapsed()
    }

    pub fn set_battery_voltage(&self, voltage: f64) {
        *lock(&self.battery_v) = voltage;
    }

    pub fn battery_voltage(&self) -> f64 {
        *lock(&self.battery_v)
    }

    /// Note that the vehicle has been made autonomous. Returns `true` only the first time.
    pub fn notify_autonomy_engaged(&self) -> bool {
        !self.autonomy_seen.swap(true, Ordering::SeqCst)
    }

    pub fn autonomy_seen(&self) -> bool {
        self.autonomy_seen.load(Ordering::SeqCst)
    }

    /// Force the monitor into the active state.
    pub fn latch(&self) {
        self.active.store(true, Ordering::SeqCst)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> FailsafeState {
        if self.is_active() {
            FailsafeState::Active
        } else {
            FailsafeState::Normal
        }
    }

    /// Check the trip conditions.
    ///
    /// Returns the cause if the monitor tripped on this poll. A monitor which has already tripped,
    /// or which has not yet seen autonomy, never trips.
    pub fn poll(&self, is_autonomous: bool) -> Option<TripCause> {
        if !self.autonomy_seen() || self.is_active() {
            return None;
        }

        let battery_v = self.battery_voltage();
        let since_heartbeat = self.since_heartbeat();
        debug!(
            "Failsafe poll: battery {:.2} V, {:.1} s since heartbeat",
            battery_v,
            since_heartbeat.as_secs_f64()
        );

        let cause = if battery_v < self.params.trigger_voltage {
            TripCause::LowBattery(battery_v)
        } else if since_heartbeat > Duration::from_millis(self.params.heartbeat_max_wait_ms)
            && !is_autonomous
        {
            TripCause::HeartbeatLost(since_heartbeat)
        } else {
            return None;
        };

        // Only one caller may win the trip
        if self.active.swap(true, Ordering::SeqCst) {
            return None;
        }

        error!("Failsafe triggered: {}", cause);
        Some(cause)
    }
}

impl fmt::Display for TripCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TripCause::LowBattery(v) => write!(f, "low battery ({:.2} V)", v),
            TripCause::HeartbeatLost(d) => {
                write!(f, "no heartbeat for {:.1} s", d.as_secs_f64())
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
