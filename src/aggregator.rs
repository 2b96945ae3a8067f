use {
    crate::types::{
        current_timestamp, ClimateRecord, CompletedRecord, MoistureRecord, SensorUpdate,
        DEFAULT_STRESS_STATE,
    },
    std::collections::HashMap,
};

/// Latest partial reading set for one node.
///
/// Created lazily on the first message that references the node and kept
/// for the process lifetime; flushes reset the contributing group's fields
/// but never remove the entry.
#[derive(Debug, Clone)]
pub struct NodeReading {
    pub node_id: u32,
    pub display_name: String,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub soil_moisture: Option<f64>,
    pub stress_state: Option<i64>,
}

impl NodeReading {
    fn new(node_id: u32) -> Self {
        Self {
            node_id,
            display_name: format!("Nodo {}", node_id),
            temperature: None,
            humidity: None,
            soil_moisture: None,
            stress_state: None,
        }
    }
}

/// Per-node completion state machine over the two sensor groups.
///
/// The climate group (temperature + humidity) flushes once both fields are
/// present; the moisture group (soil moisture alone) flushes on every
/// update. Name and stress-state updates never trigger a flush on their
/// own: the name labels later snapshots, and the stress state is captured
/// into whichever group flushes next.
///
/// The aggregator owns its node map outright. The ingestion task is the
/// only mutator, which serializes all read-modify-write cycles without
/// locking; tests construct independent instances.
pub struct Aggregator {
    nodes: HashMap<u32, NodeReading>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self { nodes: HashMap::new() }
    }

    /// Apply one decoded update and return the records it completed.
    ///
    /// Both groups are checked after every update, climate first. A single
    /// update can complete at most its own group, so the returned vec holds
    /// zero or one record in practice.
    pub fn apply(&mut self, node_id: u32, update: SensorUpdate) -> Vec<CompletedRecord> {
        let reading = self
            .nodes
            .entry(node_id)
            .or_insert_with(|| NodeReading::new(node_id));

        match update {
            SensorUpdate::Name(name) => reading.display_name = name,
            SensorUpdate::Temperature(value) => reading.temperature = Some(value),
            SensorUpdate::Humidity(value) => reading.humidity = Some(value),
            SensorUpdate::SoilMoisture(value) => reading.soil_moisture = Some(value),
            SensorUpdate::StressState(value) => reading.stress_state = Some(value),
        }

        let mut flushed = Vec::new();

        if let (Some(temperature), Some(humidity)) = (reading.temperature, reading.humidity) {
            flushed.push(CompletedRecord::Climate(ClimateRecord {
                node_id: reading.node_id,
                name: reading.display_name.clone(),
                temperature,
                humidity,
                // Captured but not cleared: the stress state outlives
                // climate flushes and attaches to later snapshots too.
                stress_state: reading.stress_state,
                timestamp: current_timestamp(),
            }));
            reading.temperature = None;
            reading.humidity = None;
        }

        if let Some(soil_moisture) = reading.soil_moisture.take() {
            flushed.push(CompletedRecord::Moisture(MoistureRecord {
                node_id: reading.node_id,
                name: reading.display_name.clone(),
                soil_moisture,
                stress_state: reading.stress_state.unwrap_or(DEFAULT_STRESS_STATE),
                timestamp: current_timestamp(),
            }));
        }

        flushed
    }

    /// Current partial reading for a node, if it has ever published
    pub fn reading(&self, node_id: u32) -> Option<&NodeReading> {
        self.nodes.get(&node_id)
    }

    /// Clear all of a node's fields, including the stress state. The only
    /// way besides a restart to drop a stale stress value.
    pub fn reset_node(&mut self, node_id: u32) {
        if let Some(reading) = self.nodes.get_mut(&node_id) {
            let display_name = reading.display_name.clone();
            *reading = NodeReading::new(node_id);
            reading.display_name = display_name;
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}
