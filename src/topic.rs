//! Topic classifier for inbound sensor publishes
//!
//! Topics follow the pattern `<namespace>/<node-token>/<sensor-kind>`,
//! e.g. `sensores/nodo_3/temperatura`. The namespace segment is scoped by
//! the subscription filter and ignored here.

use {
    crate::error::IngestError,
    crate::types::SensorKind,
    regex::Regex,
    std::sync::OnceLock,
};

fn node_token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"nodo_(\d+)").expect("node token pattern is valid"))
}

/// Parse a topic into the publishing node's id and the sensor kind.
///
/// Pure and idempotent. Fails with `MalformedTopic` when the topic has
/// fewer than 3 segments or when no node number can be extracted from the
/// node token; an unrecognized kind token is not an error and comes back
/// as `SensorKind::Unknown`.
pub fn classify_topic(topic: &str) -> Result<(u32, SensorKind), IngestError> {
    let segments: Vec<&str> = topic.split('/').collect();
    if segments.len() < 3 {
        return Err(IngestError::MalformedTopic(topic.to_string()));
    }

    let node_id = node_token_pattern()
        .captures(segments[1])
        .and_then(|caps| caps[1].parse::<u32>().ok())
        .ok_or_else(|| IngestError::MalformedTopic(topic.to_string()))?;

    Ok((node_id, SensorKind::from_token(segments[2])))
}
