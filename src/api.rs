//! HTTP serving surface: query API, actuator command, live stream
//!
//! Read-only projections over the durable store plus the two push/command
//! endpoints. Node state is never read here; the only state shared with
//! the ingestion path is the store and the broadcaster.

use {
    crate::actuator::ActuatorDispatcher,
    crate::broadcast::Broadcaster,
    crate::db::SqliteRecordReader,
    crate::types::TIMESTAMP_FORMAT,
    axum::{
        extract::{Query, State},
        http::StatusCode,
        response::{
            sse::{Event, KeepAlive, Sse},
            IntoResponse, Json,
        },
        routing::{get, post},
        Router,
    },
    futures::Stream,
    serde::Deserialize,
    serde_json::json,
    std::convert::Infallible,
    std::sync::Arc,
    tokio::sync::broadcast::error::RecvError,
    tower_http::cors::CorsLayer,
};

#[derive(Clone)]
pub struct AppState {
    pub reader: Arc<SqliteRecordReader>,
    pub broadcaster: Broadcaster,
    pub actuator: ActuatorDispatcher,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/data", get(get_data))
        .route("/api/last_n_values", get(get_last_n_values))
        .route("/api/stream", get(stream_records))
        .route("/actuator", post(control_actuator))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// --- Query structs ---

#[derive(Deserialize)]
pub struct DataQuery {
    start_date: Option<String>,
    end_date: Option<String>,
}

#[derive(Deserialize)]
pub struct LastNQuery {
    n: Option<u32>,
}

#[derive(Deserialize)]
pub struct ActuatorCommand {
    action: String,
}

/// Default query window: the last 24 hours up to now
fn default_range() -> (String, String) {
    let now = chrono::Utc::now();
    let start = now - chrono::Duration::hours(24);
    (
        start.format(TIMESTAMP_FORMAT).to_string(),
        now.format(TIMESTAMP_FORMAT).to_string(),
    )
}

fn is_valid_action(action: &str) -> bool {
    action == "ON" || action == "OFF"
}

// --- Handlers ---

async fn get_data(
    State(state): State<AppState>,
    Query(params): Query<DataQuery>,
) -> impl IntoResponse {
    let (default_start, default_end) = default_range();
    let start = params.start_date.unwrap_or(default_start);
    let end = params.end_date.unwrap_or(default_end);

    match state.reader.records_in_range(&start, &end) {
        Ok(records) => Json(records).into_response(),
        Err(e) => {
            log::error!("❌ Range query failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "query failed"})),
            )
                .into_response()
        }
    }
}

async fn get_last_n_values(
    State(state): State<AppState>,
    Query(params): Query<LastNQuery>,
) -> impl IntoResponse {
    let n = params.n.unwrap_or(10);

    match state.reader.last_n_records(n) {
        Ok(records) => Json(records).into_response(),
        Err(e) => {
            log::error!("❌ Last-n query failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "query failed"})),
            )
                .into_response()
        }
    }
}

/// Server-sent event stream of completed records.
///
/// Each flush reaches every subscriber connected at that moment as a
/// `new_data` event; there is no backlog and no replay, and a subscriber
/// that falls behind simply skips the records it missed.
async fn stream_records(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.broadcaster.subscribe();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(record) => match Event::default().event("new_data").json_data(&record) {
                    Ok(event) => yield Ok(event),
                    Err(e) => log::warn!("⚠️  Failed to encode record for SSE: {}", e),
                },
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("⚠️  Live subscriber lagged, {} record(s) skipped", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn control_actuator(
    State(state): State<AppState>,
    Json(command): Json<ActuatorCommand>,
) -> impl IntoResponse {
    if !is_valid_action(&command.action) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Invalid action"})),
        )
            .into_response();
    }

    match state.actuator.send(&command.action).await {
        Ok(()) => Json(json!({
            "message": format!("Actuator turned {}", command.action)
        }))
        .into_response(),
        Err(e) => {
            log::error!("❌ Actuator send failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "actuator unreachable"})),
            )
                .into_response()
        }
    }
}
