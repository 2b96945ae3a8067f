//! Agroflow runtime
//!
//! Wires the whole system together:
//! - bootstraps the SQLite schema (idempotent)
//! - spawns the MQTT ingestion task (the single message-handling context)
//! - serves the query API, the SSE stream, and the actuator endpoint
//!
//! Environment variables (all optional, with defaults):
//!   MQTT_HOST, MQTT_PORT     - broker location (default localhost:1883)
//!   MQTT_TOPIC_FILTER        - subscription filter (default sensores/#)
//!   AGROFLOW_DB_PATH         - SQLite database path (default agroflow.db)
//!   SCHEMA_DIR               - schema file directory (default sql)
//!   HTTP_ADDR                - HTTP bind address (default 0.0.0.0:5000)
//!   ACTUATOR_ADDR            - UDP actuator endpoint
//!   BROADCAST_CAPACITY       - live fan-out channel capacity (default 64)

use agroflow::{
    actuator::ActuatorDispatcher,
    aggregator::Aggregator,
    api::{self, AppState},
    broadcast::Broadcaster,
    config::Config,
    db::{run_schema_bootstrap, RecordWriter, SqliteRecordReader, SqliteRecordWriter},
    ingestion::run_ingestion,
};
use dotenv::dotenv;
use log::{error, info};
use rusqlite::Connection;
use std::future::IntoFuture;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env();

    info!("🚀 Starting agroflow");
    info!("   ├─ Broker: {}:{}", config.mqtt_host, config.mqtt_port);
    info!("   ├─ Topic filter: {}", config.topic_filter);
    info!("   ├─ Database: {}", config.db_path);
    info!("   ├─ HTTP: {}", config.http_addr);
    info!("   └─ Actuator: {}", config.actuator_addr);

    // Idempotent schema bootstrap on a throwaway connection
    info!("🔧 Initializing database...");
    let mut conn = Connection::open(&config.db_path)?;
    run_schema_bootstrap(&mut conn, &config.schema_dir)?;
    drop(conn);

    let writer: Arc<dyn RecordWriter> = Arc::new(SqliteRecordWriter::new(&config.db_path)?);
    let reader = Arc::new(SqliteRecordReader::new(&config.db_path)?);
    let broadcaster = Broadcaster::new(config.broadcast_capacity);
    info!("✅ Database initialized");

    // Single ingestion task owns the aggregator; no other context touches
    // node state.
    let ingestion_config = config.clone();
    let ingestion_broadcaster = broadcaster.clone();
    let ingestion = tokio::spawn(async move {
        run_ingestion(
            ingestion_config,
            Aggregator::new(),
            writer,
            ingestion_broadcaster,
        )
        .await;
    });
    info!("✅ Ingestion task spawned");

    let state = AppState {
        reader,
        broadcaster,
        actuator: ActuatorDispatcher::new(config.actuator_addr.clone()),
    };
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    info!("🌐 Serving HTTP on {}", config.http_addr);

    tokio::select! {
        result = axum::serve(listener, app).into_future() => {
            if let Err(e) = result {
                error!("❌ HTTP server error: {}", e);
            }
        }
        result = ingestion => {
            match result {
                Ok(()) => error!("❌ Ingestion stopped (broker unreachable)"),
                Err(e) => error!("❌ Ingestion task panicked: {}", e),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("⚠️  Received CTRL+C, shutting down...");
        }
    }

    // Let any in-flight write settle before tearing down the process
    tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;

    info!("✅ agroflow stopped");
    Ok(())
}
