use {
    crate::error::IngestError,
    serde::{Deserialize, Serialize},
};

/// Stress state attached to a moisture record when no reading has been
/// reported for the node yet. Preserved from the deployed firmware, which
/// treats `1` as the baseline "no stress" level.
pub const DEFAULT_STRESS_STATE: i64 = 1;

/// Timestamp format shared by stored rows and the query API's date
/// parameters. Lexicographic order matches chronological order, so
/// `BETWEEN` on the TEXT column is a correct range filter.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Current wall-clock time (UTC) in storage format
pub fn current_timestamp() -> String {
    chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Sensor kind extracted from the third topic segment.
///
/// The wire tokens are the Spanish names published by the node firmware;
/// anything else maps to `Unknown` and is ignored upstream (logged, no
/// state change).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    Name,
    Temperature,
    Humidity,
    SoilMoisture,
    StressState,
    Unknown,
}

impl SensorKind {
    pub fn from_token(token: &str) -> Self {
        match token {
            "nombre" => SensorKind::Name,
            "temperatura" => SensorKind::Temperature,
            "humedad" => SensorKind::Humidity,
            "humedad_suelo" => SensorKind::SoilMoisture,
            "estado_estres" => SensorKind::StressState,
            _ => SensorKind::Unknown,
        }
    }
}

/// A decoded sensor payload, typed per kind.
///
/// Decoding is an explicit parse-or-fail step: a payload that does not
/// match the expected type for its kind is a `PayloadDecode` error and the
/// message is dropped by the caller without touching node state.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorUpdate {
    Name(String),
    Temperature(f64),
    Humidity(f64),
    SoilMoisture(f64),
    StressState(i64),
}

impl SensorUpdate {
    /// Decode a UTF-8 payload for the given kind.
    ///
    /// Returns `Ok(None)` for `SensorKind::Unknown` (ignored, not an
    /// error). Name payloads are JSON-quoted strings, matching what the
    /// firmware publishes; numeric payloads are plain decimal text.
    pub fn decode(kind: SensorKind, payload: &str) -> Result<Option<SensorUpdate>, IngestError> {
        let update = match kind {
            SensorKind::Name => {
                let name: String = serde_json::from_str(payload).map_err(|_| {
                    IngestError::PayloadDecode(format!("name payload is not a JSON string: {payload:?}"))
                })?;
                SensorUpdate::Name(name)
            }
            SensorKind::Temperature => SensorUpdate::Temperature(parse_f64(payload, "temperature")?),
            SensorKind::Humidity => SensorUpdate::Humidity(parse_f64(payload, "humidity")?),
            SensorKind::SoilMoisture => SensorUpdate::SoilMoisture(parse_f64(payload, "soil moisture")?),
            SensorKind::StressState => {
                let value = payload.trim().parse::<i64>().map_err(|_| {
                    IngestError::PayloadDecode(format!("stress state is not an integer: {payload:?}"))
                })?;
                SensorUpdate::StressState(value)
            }
            SensorKind::Unknown => return Ok(None),
        };
        Ok(Some(update))
    }
}

fn parse_f64(payload: &str, field: &str) -> Result<f64, IngestError> {
    payload.trim().parse::<f64>().map_err(|_| {
        IngestError::PayloadDecode(format!("{field} is not a number: {payload:?}"))
    })
}

/// Immutable snapshot emitted when a sensor group completes.
///
/// Handed off by value to the persistence writer and the live broadcaster;
/// serialized with a `sensor_type` tag so API consumers can tell the two
/// schema variants apart in the flat combined sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "sensor_type", rename_all = "snake_case")]
pub enum CompletedRecord {
    Climate(ClimateRecord),
    Moisture(MoistureRecord),
}

impl CompletedRecord {
    pub fn node_id(&self) -> u32 {
        match self {
            CompletedRecord::Climate(r) => r.node_id,
            CompletedRecord::Moisture(r) => r.node_id,
        }
    }
}

/// Paired temperature + humidity reading from one sampling cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClimateRecord {
    pub node_id: u32,
    pub name: String,
    pub temperature: f64,
    pub humidity: f64,
    /// Last-known stress state at flush time; null when the node has never
    /// reported one.
    pub stress_state: Option<i64>,
    pub timestamp: String,
}

/// Self-sufficient soil moisture reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoistureRecord {
    pub node_id: u32,
    pub name: String,
    pub soil_moisture: f64,
    /// Last-known stress state, or `DEFAULT_STRESS_STATE` when the node has
    /// never reported one.
    pub stress_state: i64,
    pub timestamp: String,
}
