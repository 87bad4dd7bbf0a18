//! # Sensor definitions
//!
//! Sensors attached to the micro-controller declare their type in each message. The type a
//! channel is expected to carry is configured on the vehicle, and the two are compared as
//! messages arrive.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// The kind of device attached to a sensor channel.
#[derive(Serialize, Deserialize, Debug, Eq, PartialEq, Copy, Clone, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SensorType {
    /// Nothing attached
    None,
    /// Conductivity and temperature probe
    Es2,
    /// Dissolved oxygen probe
    AtlasDo,
    /// pH probe
    AtlasPh,
    /// Depth sounder emitting NMEA sentences
    Hds,
    /// Battery monitor
    Battery,
    /// Depth winch
    Winch,
    /// Multi-parameter water quality probe emitting vendor sentences
    Bluebox,
    /// Water sampler
    Sampler,
    /// RC receiver
    RcSbus,
}

/// The type tag of a parsed sensor reading.
#[derive(Serialize, Deserialize, Debug, Eq, PartialEq, Copy, Clone, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReadingType {
    /// `[conductivity, temperature]`
    Es2,
    /// `[dissolved oxygen]`
    AtlasDo,
    /// `[ph]`
    AtlasPh,
    /// `[depth]`
    HdsDepth,
    /// `[temperature]`
    HdsTemp,
    /// `[voltage, motor 0 velocity, motor 1 velocity]`
    Battery,
    /// `[depth]`
    WinchDepth,
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A single parsed reading from a sensor channel.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SensorReading {
    /// The channel number the reading arrived on
    pub channel: u8,

    /// What the data represents
    #[serde(rename = "type")]
    pub reading_type: ReadingType,

    /// The values, layout depending on `reading_type`
    pub data: Vec<f64>,
}

/// Error returned when a sensor type name is not recognised.
#[derive(Debug, thiserror::Error, PartialEq)]
#[error("Unknown sensor type \"{0}\"")]
pub struct UnknownSensorType(pub String);

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SensorType {
    /// All sensor types.
    pub const ALL: [SensorType; 10] = [
        SensorType::None,
        SensorType::Es2,
        SensorType::AtlasDo,
        SensorType::AtlasPh,
        SensorType::Hds,
        SensorType::Battery,
        SensorType::Winch,
        SensorType::Bluebox,
        SensorType::Sampler,
        SensorType::RcSbus,
    ];

    /// The name of the type as it appears on the wire and in parameter files.
    pub fn name(&self) -> &'static str {
        match self {
            SensorType::None => "NONE",
            SensorType::Es2 => "ES2",
            SensorType::AtlasDo => "ATLAS_DO",
            SensorType::AtlasPh => "ATLAS_PH",
            SensorType::Hds => "HDS",
            SensorType::Battery => "BATTERY",
            SensorType::Winch => "WINCH",
            SensorType::Bluebox => "BLUEBOX",
            SensorType::Sampler => "SAMPLER",
            SensorType::RcSbus => "RC_SBUS",
        }
    }

    /// True if a device of this type reports typed JSON payloads that can be checked against the
    /// channel configuration.
    pub fn reports_json(&self) -> bool {
        !matches!(
            self,
            SensorType::None | SensorType::RcSbus | SensorType::Hds | SensorType::Sampler
        )
    }
}

impl Default for SensorType {
    fn default() -> Self {
        SensorType::None
    }
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SensorType {
    type Err = UnknownSensorType;

    /// Names are matched case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SensorType::ALL
            .iter()
            .find(|t| t.name().eq_ignore_ascii_case(s.trim()))
            .copied()
            .ok_or_else(|| UnknownSensorType(s.to_string()))
    }
}

impl fmt::Display for ReadingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReadingType::Es2 => "ES2",
            ReadingType::AtlasDo => "ATLAS_DO",
            ReadingType::AtlasPh => "ATLAS_PH",
            ReadingType::HdsDepth => "HDS_DEPTH",
            ReadingType::HdsTemp => "HDS_TEMP",
            ReadingType::Battery => "BATTERY",
            ReadingType::WinchDepth => "WINCH_DEPTH",
        };
        f.write_str(s)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
