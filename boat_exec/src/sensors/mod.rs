//! # Sensor ingest
//!
//! Turns inbound micro-controller messages into sensor readings and state updates.
//!
//! Each message maps channel keys to payloads:
//!
//! - `m*` keys echo motor demands and are ignored.
//! - `s*` keys carry a sensor payload whose `type` field names the device that produced it. The
//!   reported type is checked against the channel's configured type, then the payload is parsed
//!   with that device's grammar (see `parse`).
//! - `g*` keys carry a GPS fix, `{"lat": .., "lon": .., "time": ..}`, which is projected and fed
//!   to the pose filter.
//!
//! A bad entry is logged and skipped without affecting the rest of the message.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod parse;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{debug, trace, warn};
use serde_json::{Map, Value};
use std::sync::Arc;

use comms_if::eqpt::{ChannelId, McuMessage, ReadingType, SensorReading, SensorType};

use crate::events::{EventSink, LogEvent, Publisher, VehicleEvent};
use crate::failsafe::FailsafeMonitor;
use crate::loc::Projection;
use crate::state::VehicleState;

pub use parse::*;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Consumer of inbound micro-controller messages.
pub struct SensorIngest {
    state: Arc<VehicleState>,
    failsafe: Arc<FailsafeMonitor>,
    projection: Arc<dyn Projection>,
    events: Arc<dyn EventSink>,
    publisher: Arc<Publisher>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SensorIngest {
    pub fn new(
        state: Arc<VehicleState>,
        failsafe: Arc<FailsafeMonitor>,
        projection: Arc<dyn Projection>,
        events: Arc<dyn EventSink>,
        publisher: Arc<Publisher>,
    ) -> Self {
        Self {
            state,
            failsafe,
            projection,
            events,
            publisher,
        }
    }

    /// Process one inbound message, returning the readings it produced.
    pub fn ingest(&self, msg: &McuMessage) -> Vec<SensorReading> {
        let mut readings = Vec::new();

        for (key, value) in msg {
            let channel: ChannelId = match key.parse() {
                Ok(c) => c,
                Err(e) => {
                    warn!("Received unknown param: {}", e);
                    continue;
                }
            };

            let payload = match value.as_object() {
                Some(p) => p,
                None => {
                    warn!("Malformed payload for {}: {}", key, value);
                    continue;
                }
            };

            match channel {
                ChannelId::Motor(_) => (),
                ChannelId::Sensor(n) => {
                    if let Some(r) = self.sensor(n, payload) {
                        readings.push(r);
                    }
                }
                ChannelId::Gps(_) => self.gps(payload),
            }
        }

        readings
    }

    fn sensor(&self, channel: u8, payload: &Map<String, Value>) -> Option<SensorReading> {
        let reported = match payload.get("type").and_then(Value::as_str) {
            Some(t) => t,
            None => {
                trace!("s{} payload has no type, ignored", channel);
                return None;
            }
        };

        self.check_type(channel, reported);

        let sensor_type: SensorType = match reported.parse() {
            Ok(t) => t,
            Err(_) => {
                warn!("Received data from sensor of unknown type: {}", reported);
                return None;
            }
        };

        if sensor_type == SensorType::Bluebox {
            self.events.log(LogEvent::Raw {
                channel,
                payload: Value::Object(payload.clone()),
            });
        }

        let (reading_type, data) = match parse_reading(sensor_type, payload) {
            Ok(Some(r)) => r,
            Ok(None) => return None,
            Err(e) => {
                warn!("s{}: {}", channel, e);
                return None;
            }
        };

        match reading_type {
            ReadingType::Battery => self.failsafe.set_battery_voltage(data[0]),
            ReadingType::WinchDepth => self.state.set_winch_depth(data[0]),
            _ => (),
        }

        let reading = SensorReading {
            channel,
            reading_type,
            data,
        };

        self.events.log(LogEvent::Sensor(reading.clone()));
        self.publisher.publish(VehicleEvent::Sensor(reading.clone()));

        Some(reading)
    }

    /// Compare the reported type with the channel's configured type. Battery monitors may report
    /// on any channel.
    fn check_type(&self, channel: u8, reported: &str) {
        if reported.eq_ignore_ascii_case(SensorType::Battery.name()) {
            return;
        }

        let expected = self.state.sensor_type(channel as usize);

        if reported.eq_ignore_ascii_case(expected.name()) {
            self.state.mark_expected_received(channel as usize);
        } else {
            warn!(
                "s{}: expected = {} received = {}",
                channel, expected, reported
            );
        }
    }

    fn gps(&self, payload: &Map<String, Value>) {
        let lat = payload.get("lat").and_then(Value::as_f64);
        let lon = payload.get("lon").and_then(Value::as_f64);
        let time = payload
            .get("time")
            .and_then(|t| t.as_i64().or_else(|| t.as_f64().map(|f| f as i64)));

        let (lat, lon, time_ms) = match (lat, lon, time) {
            (Some(lat), Some(lon), Some(t)) => (lat, lon, t),
            _ => {
                trace!("Incomplete GPS fix ignored: {:?}", payload);
                return;
            }
        };

        match self.projection.to_projected(lat, lon) {
            Some(fix) => {
                if !self.state.gps_update(fix, time_ms) {
                    debug!("Stale GPS fix at {} ignored", time_ms);
                }
            }
            None => warn!("Cannot project GPS fix ({}, {})", lat, lon),
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::events::MemoryEventSink;
    use crate::failsafe::Params as FailsafeParams;
    use crate::loc::{Pose, SimpleFilter, UtmOrigin, UtmPose};
    use crate::state::Gains;
    use serde_json::json;

    /// Projects degrees straight onto metres, so fixes are easy to check.
    struct FlatProjection;

    impl Projection for FlatProjection {
        fn to_projected(&self, lat_deg: f64, lon_deg: f64) -> Option<UtmPose> {
            if lat_deg.abs() > 90.0 {
                return None;
            }
            Some(UtmPose::new(
                Pose::new(lon_deg, lat_deg, 0.0, 0.0),
                UtmOrigin {
                    zone: 17,
                    is_north: true,
                },
            ))
        }
    }

    struct Fixture {
        state: Arc<VehicleState>,
        failsafe: Arc<FailsafeMonitor>,
        events: Arc<MemoryEventSink>,
        publisher: Arc<Publisher>,
        ingest: SensorIngest,
    }

    fn fixture() -> Fixture {
        let origin = UtmPose::new(
            Pose::default(),
            UtmOrigin {
                zone: 17,
                is_north: true,
            },
        );
        let state = Arc::new(VehicleState::new(
            Box::new(SimpleFilter::new(origin)),
            origin,
            Gains {
                thrust: [0.5, 0.0, 0.0],
                rudder: [0.7, 0.0, 0.5],
            },
            vec![
                SensorType::None,
                SensorType::Es2,
                SensorType::Winch,
                SensorType::Bluebox,
                SensorType::None,
            ],
        ));
        let failsafe = Arc::new(FailsafeMonitor::new(FailsafeParams::default()));
        let events = Arc::new(MemoryEventSink::new());
        let publisher = Arc::new(Publisher::new());

        let ingest = SensorIngest::new(
            state.clone(),
            failsafe.clone(),
            Arc::new(FlatProjection),
            events.clone(),
            publisher.clone(),
        );

        Fixture {
            state,
            failsafe,
            events,
            publisher,
            ingest,
        }
    }

    fn msg(v: Value) -> McuMessage {
        match v {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_expected_type_marks_received() {
        let f = fixture();
        let rx = f.publisher.subscribe();

        let readings = f.ingest.ingest(&msg(json!({
            "m0": {"v": 0.1},
            "s1": {"type": "ES2", "data": "300 20"}
        })));

        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].channel, 1);
        assert_eq!(readings[0].data, vec![300.0, 20.0]);
        assert!(f.state.expected_received(1));
        assert_eq!(rx.try_recv().unwrap(), VehicleEvent::Sensor(readings[0].clone()));
        assert_eq!(
            f.events
                .find(|e| matches!(e, LogEvent::Sensor(_)))
                .len(),
            1
        );
    }

    #[test]
    fn test_mismatched_type_still_parsed() {
        let f = fixture();

        let readings = f
            .ingest
            .ingest(&msg(json!({"s2": {"type": "atlas_ph", "data": 7.0}})));

        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].reading_type, ReadingType::AtlasPh);
        assert!(!f.state.expected_received(2));
    }

    #[test]
    fn test_battery_updates_failsafe() {
        let f = fixture();

        f.ingest
            .ingest(&msg(json!({"s4": {"type": "battery", "data": "14.5 0 0"}})));
        assert_eq!(f.failsafe.battery_voltage(), 14.5);
        // Battery readings don't count towards the channel's expectation
        assert!(!f.state.expected_received(4));

        let readings = f
            .ingest
            .ingest(&msg(json!({"s4": {"type": "battery", "data": "abc 1 2"}})));
        assert!(readings.is_empty());
        assert_eq!(f.failsafe.battery_voltage(), 14.5);
    }

    #[test]
    fn test_winch_depth_cached() {
        let f = fixture();

        f.ingest
            .ingest(&msg(json!({"s2": {"type": "winch", "depth": 3.25}})));
        assert_eq!(f.state.winch_depth(), 3.25);
        assert!(f.state.expected_received(2));
    }

    #[test]
    fn test_bluebox_raw_logged() {
        let f = fixture();

        let readings = f.ingest.ingest(&msg(json!({
            "s3": {"type": "bluebox", "data": "$PGO00,a,b,c,Turbidity,4"}
        })));

        assert!(readings.is_empty());
        assert_eq!(
            f.events.find(|e| matches!(e, LogEvent::Raw { channel: 3, .. })).len(),
            1
        );
    }

    #[test]
    fn test_bad_entries_skipped() {
        let f = fixture();

        let readings = f.ingest.ingest(&msg(json!({
            "x1": {"type": "es2"},
            "s1": "not an object",
            "s2": {"data": "no type"},
            "s3": {"type": "sonar", "data": "1"},
            "s4": {"type": "atlas_do", "data": 5.5}
        })));

        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].channel, 4);
    }

    #[test]
    fn test_gps_fix() {
        let f = fixture();

        f.ingest
            .ingest(&msg(json!({"g0": {"lat": 10.0, "lon": 20.0, "time": 1000}})));
        assert_eq!(f.state.refresh_pose(1001).pose.planar(), [20.0, 10.0]);

        // Incomplete, unprojectable and stale fixes are dropped
        f.ingest.ingest(&msg(json!({"g0": {"lat": 1.0, "lon": 1.0}})));
        f.ingest
            .ingest(&msg(json!({"g0": {"lat": 95.0, "lon": 1.0, "time": 2000}})));
        f.ingest
            .ingest(&msg(json!({"g0": {"lat": 1.0, "lon": 1.0, "time": 500}})));
        assert_eq!(f.state.refresh_pose(3000).pose.planar(), [20.0, 10.0]);
    }
}
