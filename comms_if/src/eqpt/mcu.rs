//! # Micro-controller messages
//!
//! Inbound messages are JSON objects whose keys name a channel on the board (`m0`, `s1`, `g0`,
//! ...) and whose values carry that channel's payload. Outbound commands use the same layout.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;

// ------------------------------------------------------------------------------------------------
// TYPES
// ------------------------------------------------------------------------------------------------

/// A message received from the micro-controller.
pub type McuMessage = Map<String, Value>;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A command to be sent to the micro-controller.
///
/// Each entry maps a channel key to the fields to set on that channel, e.g.
/// `{"m0": {"v": 0.5}, "s0": {"p": -0.2}}`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct McuCommand(Map<String, Value>);

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// A channel on the micro-controller.
#[derive(Serialize, Deserialize, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Copy, Clone)]
pub enum ChannelId {
    /// A motor (ESC) channel, key prefix `m`
    Motor(u8),

    /// A sensor or servo channel, key prefix `s`
    Sensor(u8),

    /// A GPS receiver, key prefix `g`
    Gps(u8),
}

/// Reasons a channel key could not be parsed.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ChannelIdError {
    #[error("Channel key \"{0}\" has an unknown prefix")]
    UnknownPrefix(String),

    #[error("Channel key \"{0}\" has no valid channel number")]
    InvalidNumber(String),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl McuCommand {
    /// Create an empty command.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the fields for a given channel, replacing anything already there.
    pub fn set(&mut self, channel: ChannelId, fields: Value) {
        self.0.insert(channel.to_string(), fields);
    }

    /// Add a motor velocity demand (`{"v": ...}`).
    ///
    /// The board works in single precision so demands are narrowed before being sent.
    pub fn with_motor_velocity(mut self, motor: u8, velocity: f64) -> Self {
        self.set(ChannelId::Motor(motor), json!({ "v": velocity as f32 }));
        self
    }

    /// Add a servo position demand (`{"p": ...}`).
    pub fn with_servo_position(mut self, servo: u8, position: f64) -> Self {
        self.set(ChannelId::Sensor(servo), json!({ "p": position as f32 }));
        self
    }

    /// Get the fields set for a channel key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Get a single numeric field of a channel, for example `("m0", "v")`.
    pub fn field_f64(&self, key: &str, field: &str) -> Option<f64> {
        self.0.get(key)?.get(field)?.as_f64()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Convert the command into a JSON value.
    pub fn to_json(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

impl From<Map<String, Value>> for McuCommand {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl ChannelId {
    /// The channel number, without the prefix.
    pub fn number(&self) -> u8 {
        match self {
            ChannelId::Motor(n) | ChannelId::Sensor(n) | ChannelId::Gps(n) => *n,
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelId::Motor(n) => write!(f, "m{}", n),
            ChannelId::Sensor(n) => write!(f, "s{}", n),
            ChannelId::Gps(n) => write!(f, "g{}", n),
        }
    }
}

impl FromStr for ChannelId {
    type Err = ChannelIdError;

    fn from_str(key: &str) -> Result<Self, Self::Err> {
        let mut chars = key.chars();
        let prefix = chars.next();
        let number = chars
            .as_str()
            .parse::<u8>()
            .map_err(|_| ChannelIdError::InvalidNumber(key.to_string()));

        match prefix {
            Some('m') => Ok(ChannelId::Motor(number?)),
            Some('s') => Ok(ChannelId::Sensor(number?)),
            Some('g') => Ok(ChannelId::Gps(number?)),
            _ => Err(ChannelIdError::UnknownPrefix(key.to_string())),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_channel_id() {
        assert_eq!("m0".parse(), Ok(ChannelId::Motor(0)));
        assert_eq!("s3".parse(), Ok(ChannelId::Sensor(3)));
        assert_eq!("g1".parse(), Ok(ChannelId::Gps(1)));
        assert_eq!(
            "x1".parse::<ChannelId>(),
            Err(ChannelIdError::UnknownPrefix("x1".into()))
        );
        assert_eq!(
            "s".parse::<ChannelId>(),
            Err(ChannelIdError::InvalidNumber("s".into()))
        );
        assert_eq!(ChannelId::Sensor(2).to_string(), "s2");
    }

    #[test]
    fn test_command_layout() {
        let cmd = McuCommand::new()
            .with_motor_velocity(0, 0.5)
            .with_servo_position(0, -0.25);

        assert_eq!(cmd.len(), 2);
        assert_eq!(cmd.field_f64("m0", "v"), Some(0.5));
        assert_eq!(cmd.field_f64("s0", "p"), Some(-0.25));
        assert_eq!(
            serde_json::to_string(&cmd).unwrap(),
            r#"{"m0":{"v":0.5},"s0":{"p":-0.25}}"#
        );
    }
}
