//! # Communications interface crate.
//!
//! Provides the interfaces between the vehicle server, the micro-controller it
//! drives and the operator layer that commands it.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Operator-facing enumerations (gain axes, waypoint and camera states)
pub mod tc;

/// Message and command definitions for the micro-controller (motors, servos, sensors)
pub mod eqpt;

/// Transports carrying messages to and from the micro-controller
pub mod net;
