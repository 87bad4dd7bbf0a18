//! # Equipment Interface
//!
//! This module defines the structures exchanged with the vehicle's micro-controller.

pub mod mcu;
pub mod sensor;

pub use mcu::*;
pub use sensor::*;
