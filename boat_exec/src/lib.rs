//! # Boat library.
//!
//! This library holds the control core of the surface vehicle. The `boat_exec` executable wires
//! it to the micro-controller link, other crates in the workspace may drive it directly.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Structured event records and the status publisher
pub mod events;

/// Failsafe monitor - watches the battery and operator heartbeat once the vehicle has been autonomous
pub mod failsafe;

/// Localisation module - pose types, the pose filter and the GPS projection
pub mod loc;

/// Locomotion control module - converts velocity demands into actuator demands for each hull type
pub mod loco_ctrl;

/// Parameters of the boat executable
pub mod params;

/// Periodic and one shot activities, and the velocity watchdog
pub mod sched;

/// Sensor ingest - parses micro-controller messages into readings
pub mod sensors;

/// The vehicle server exposing the control surface
pub mod server;

/// The shared vehicle state
pub mod state;

/// Trajectory control module - follows the waypoint path
pub mod traj_ctrl;
