//! Payload grammars of the supported sensors

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde_json::{Map, Value};

use comms_if::eqpt::{ReadingType, SensorType};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Depth below transducer sentence, depth in metres is field 3.
const NMEA_DEPTH: &str = "$SDDBT";

/// Water temperature sentence, temperature is field 1.
const NMEA_WATER_TEMP: &str = "$SDMTW";

/// Position sentence from the depth sounder, GPS is read from its own channel instead.
const NMEA_SOUNDER_GPS: &str = "$SDRMC";

const BLUEBOX_GPS: &str = "$GPGGA";

/// Vendor sentence of the form `$PGO00,<..>,<..>,<..>,<sensor>,<value>,...`
const BLUEBOX_READING: &str = "$PGO00";

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SensorParseError {
    #[error("Sensor payload has no \"{0}\" field")]
    MissingField(&'static str),

    #[error("Received malformed {0} sensor data: {1}")]
    Malformed(SensorType, String),

    #[error("Unknown NMEA string: {0}")]
    UnknownSentence(String),

    #[error("Unknown Bluebox message of type: {0}")]
    UnknownBlueboxMessage(String),

    #[error("Unknown Bluebox $PGO00 sensor type: {0}")]
    UnknownBlueboxSensor(String),

    #[error("Bluebox DO sensor returned negative value ({0})")]
    NegativeOxygen(f64),

    #[error("{0} sensors do not report readings")]
    Unsupported(SensorType),
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Parse the payload of a sensor message reporting the given type.
///
/// Returns `Ok(None)` for payloads which are valid but carry nothing to report, for example GPS
/// sentences repeated by a depth sounder.
pub fn parse_reading(
    sensor_type: SensorType,
    payload: &Map<String, Value>,
) -> Result<Option<(ReadingType, Vec<f64>)>, SensorParseError> {
    match sensor_type {
        SensorType::Es2 => parse_es2(payload).map(Some),
        SensorType::AtlasDo => {
            parse_single(sensor_type, payload).map(|v| Some((ReadingType::AtlasDo, vec![v])))
        }
        SensorType::AtlasPh => {
            parse_single(sensor_type, payload).map(|v| Some((ReadingType::AtlasPh, vec![v])))
        }
        SensorType::Hds => parse_hds(payload),
        SensorType::Battery => parse_battery(payload).map(Some),
        SensorType::Winch => number_field(sensor_type, payload, "depth")
            .map(|d| Some((ReadingType::WinchDepth, vec![d]))),
        SensorType::Bluebox => parse_bluebox(payload),
        t => Err(SensorParseError::Unsupported(t)),
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// `"<conductivity> <temperature>"`
fn parse_es2(payload: &Map<String, Value>) -> Result<(ReadingType, Vec<f64>), SensorParseError> {
    let data = parse_words(SensorType::Es2, str_field(payload, "data")?, 2)?;
    Ok((ReadingType::Es2, data))
}

/// `"<voltage> <motor 0 velocity> <motor 1 velocity>"`
fn parse_battery(
    payload: &Map<String, Value>,
) -> Result<(ReadingType, Vec<f64>), SensorParseError> {
    let data = parse_words(SensorType::Battery, str_field(payload, "data")?, 3)?;
    Ok((ReadingType::Battery, data))
}

fn parse_single(
    sensor_type: SensorType,
    payload: &Map<String, Value>,
) -> Result<f64, SensorParseError> {
    number_field(sensor_type, payload, "data")
}

fn parse_hds(
    payload: &Map<String, Value>,
) -> Result<Option<(ReadingType, Vec<f64>)>, SensorParseError> {
    let nmea = str_field(payload, "data")?;

    let (reading_type, field) = if nmea.starts_with(NMEA_DEPTH) {
        (ReadingType::HdsDepth, 3)
    } else if nmea.starts_with(NMEA_WATER_TEMP) {
        (ReadingType::HdsTemp, 1)
    } else if nmea.starts_with(NMEA_SOUNDER_GPS) {
        return Ok(None);
    } else {
        return Err(SensorParseError::UnknownSentence(nmea.to_string()));
    };

    let value = nmea
        .split(',')
        .nth(field)
        .and_then(|f| f.trim().parse::<f64>().ok())
        .ok_or_else(|| SensorParseError::Malformed(SensorType::Hds, nmea.to_string()))?;

    Ok(Some((reading_type, vec![value])))
}

fn parse_bluebox(
    payload: &Map<String, Value>,
) -> Result<Option<(ReadingType, Vec<f64>)>, SensorParseError> {
    let nmea = str_field(payload, "data")?;
    let chunks: Vec<&str> = nmea.split(',').collect();

    match chunks[0] {
        BLUEBOX_GPS => return Ok(None),
        BLUEBOX_READING => (),
        key => return Err(SensorParseError::UnknownBlueboxMessage(key.to_string())),
    }

    let malformed = || SensorParseError::Malformed(SensorType::Bluebox, nmea.to_string());
    let sensor = *chunks.get(4).ok_or_else(malformed)?;
    let value = chunks
        .get(5)
        .and_then(|v| v.trim().parse::<f64>().ok())
        .ok_or_else(malformed)?;

    match sensor {
        "conductivity" => Ok(Some((ReadingType::Es2, vec![value, 0.0]))),
        "temperature" => Ok(Some((ReadingType::Es2, vec![0.0, value]))),
        "Oxygen" if value < 0.0 => Err(SensorParseError::NegativeOxygen(value)),
        "Oxygen" => Ok(Some((ReadingType::AtlasDo, vec![value]))),
        "Turbidity" | "Redox" => Ok(None),
        other => Err(SensorParseError::UnknownBlueboxSensor(other.to_string())),
    }
}

/// Parse the first `count` whitespace separated numbers of `data`. Every one must be valid before
/// any is returned.
fn parse_words(
    sensor_type: SensorType,
    data: &str,
    count: usize,
) -> Result<Vec<f64>, SensorParseError> {
    let values = data
        .split_whitespace()
        .take(count)
        .map(|w| w.parse::<f64>())
        .collect::<Result<Vec<f64>, _>>()
        .map_err(|_| SensorParseError::Malformed(sensor_type, data.to_string()))?;

    if values.len() == count {
        Ok(values)
    } else {
        Err(SensorParseError::Malformed(sensor_type, data.to_string()))
    }
}

fn str_field<'a>(
    payload: &'a Map<String, Value>,
    name: &'static str,
) -> Result<&'a str, SensorParseError> {
    payload
        .get(name)
        .and_then(Value::as_str)
        .ok_or(SensorParseError::MissingField(name))
}

/// A numeric field, given either as a JSON number or as a string holding one.
fn number_field(
    sensor_type: SensorType,
    payload: &Map<String, Value>,
    name: &'static str,
) -> Result<f64, SensorParseError> {
    match payload.get(name) {
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| SensorParseError::Malformed(sensor_type, n.to_string())),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map_err(|_| SensorParseError::Malformed(sensor_type, s.clone())),
        Some(v) => Err(SensorParseError::Malformed(sensor_type, v.to_string())),
        None => Err(SensorParseError::MissingField(name)),
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn payload(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    fn parse(t: SensorType, v: Value) -> Result<Option<(ReadingType, Vec<f64>)>, SensorParseError> {
        parse_reading(t, &payload(v))
    }

    #[test]
    fn test_es2() {
        assert_eq!(
            parse(SensorType::Es2, json!({"type": "es2", "data": " 512 21.5 "})),
            Ok(Some((ReadingType::Es2, vec![512.0, 21.5])))
        );
        assert!(matches!(
            parse(SensorType::Es2, json!({"data": "512"})),
            Err(SensorParseError::Malformed(SensorType::Es2, _))
        ));
    }

    #[test]
    fn test_single_value_probes() {
        assert_eq!(
            parse(SensorType::AtlasDo, json!({"data": 7.25})),
            Ok(Some((ReadingType::AtlasDo, vec![7.25])))
        );
        assert_eq!(
            parse(SensorType::AtlasPh, json!({"data": "6.5"})),
            Ok(Some((ReadingType::AtlasPh, vec![6.5])))
        );
        assert_eq!(
            parse(SensorType::AtlasPh, json!({})),
            Err(SensorParseError::MissingField("data"))
        );
    }

    #[test]
    fn test_hds_sentences() {
        assert_eq!(
            parse(SensorType::Hds, json!({"data": "$SDDBT,10.5,f,3.2,M,1.7,F*05"})),
            Ok(Some((ReadingType::HdsDepth, vec![3.2])))
        );
        assert_eq!(
            parse(SensorType::Hds, json!({"data": "$SDMTW,18.4,C*0A"})),
            Ok(Some((ReadingType::HdsTemp, vec![18.4])))
        );
        assert_eq!(
            parse(SensorType::Hds, json!({"data": "$SDRMC,123519,A"})),
            Ok(None)
        );
        assert!(matches!(
            parse(SensorType::Hds, json!({"data": "$SDXYZ,1"})),
            Err(SensorParseError::UnknownSentence(_))
        ));
        assert!(matches!(
            parse(SensorType::Hds, json!({"data": "$SDDBT,10.5"})),
            Err(SensorParseError::Malformed(SensorType::Hds, _))
        ));
    }

    #[test]
    fn test_battery() {
        assert_eq!(
            parse(SensorType::Battery, json!({"data": "15.2 0.1 -0.1"})),
            Ok(Some((ReadingType::Battery, vec![15.2, 0.1, -0.1])))
        );
        assert!(parse(SensorType::Battery, json!({"data": "abc 1 2"})).is_err());
        assert!(parse(SensorType::Battery, json!({"data": "15.2 1 x"})).is_err());
    }

    #[test]
    fn test_winch() {
        assert_eq!(
            parse(SensorType::Winch, json!({"depth": 4.5})),
            Ok(Some((ReadingType::WinchDepth, vec![4.5])))
        );
    }

    #[test]
    fn test_bluebox() {
        let reading = |s: &str| parse(SensorType::Bluebox, json!({ "data": s }));

        assert_eq!(
            reading("$PGO00,1,2,3,conductivity,250.5"),
            Ok(Some((ReadingType::Es2, vec![250.5, 0.0])))
        );
        assert_eq!(
            reading("$PGO00,1,2,3,temperature,19.0"),
            Ok(Some((ReadingType::Es2, vec![0.0, 19.0])))
        );
        assert_eq!(
            reading("$PGO00,1,2,3,Oxygen,8.1"),
            Ok(Some((ReadingType::AtlasDo, vec![8.1])))
        );
        assert_eq!(
            reading("$PGO00,1,2,3,Oxygen,-1"),
            Err(SensorParseError::NegativeOxygen(-1.0))
        );
        assert_eq!(reading("$PGO00,1,2,3,Turbidity,3"), Ok(None));
        assert_eq!(reading("$GPGGA,123519"), Ok(None));
        assert!(matches!(
            reading("$PGO00,1,2,3,Salinity,3"),
            Err(SensorParseError::UnknownBlueboxSensor(_))
        ));
        assert!(matches!(
            reading("$XX,1"),
            Err(SensorParseError::UnknownBlueboxMessage(_))
        ));
    }

    #[test]
    fn test_unsupported() {
        assert_eq!(
            parse(SensorType::Sampler, json!({"data": "1"})),
            Err(SensorParseError::Unsupported(SensorType::Sampler))
        );
    }
}
