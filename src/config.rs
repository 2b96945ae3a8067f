use std::env;

/// Configuration loaded from environment variables
///
/// Everything has a default matching the reference deployment, so a bare
/// `agroflow` starts against a local broker and a local database file.
#[derive(Debug, Clone)]
pub struct Config {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    /// Subscription filter; the classifier itself ignores the namespace
    /// segment, so widening this is enough to ingest another namespace.
    pub topic_filter: String,
    pub db_path: String,
    pub schema_dir: String,
    pub http_addr: String,
    /// Remote actuator endpoint for the fire-and-forget UDP command
    pub actuator_addr: String,
    pub broadcast_capacity: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            mqtt_host: env::var("MQTT_HOST").unwrap_or_else(|_| "localhost".to_string()),
            mqtt_port: parse_env("MQTT_PORT", 1883),
            topic_filter: env::var("MQTT_TOPIC_FILTER")
                .unwrap_or_else(|_| "sensores/#".to_string()),
            db_path: env::var("AGROFLOW_DB_PATH").unwrap_or_else(|_| "agroflow.db".to_string()),
            schema_dir: env::var("SCHEMA_DIR").unwrap_or_else(|_| "sql".to_string()),
            http_addr: env::var("HTTP_ADDR").unwrap_or_else(|_| "0.0.0.0:5000".to_string()),
            actuator_addr: env::var("ACTUATOR_ADDR")
                .unwrap_or_else(|_| "[2001:db8:a::2]:12345".to_string()),
            broadcast_capacity: parse_env("BROADCAST_CAPACITY", 64),
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
