//! MQTT ingestion - the single inbound-message handling context
//!
//! One task owns the aggregator and processes publishes serially in
//! arrival order; that serialization is what makes the read-modify-write
//! on node state safe without locking. Every per-message failure is
//! contained here: logged, message dropped, loop continues.

use {
    crate::aggregator::Aggregator,
    crate::backoff::ReconnectBackoff,
    crate::broadcast::Broadcaster,
    crate::config::Config,
    crate::db::RecordWriter,
    crate::error::IngestError,
    crate::topic::classify_topic,
    crate::types::SensorUpdate,
    rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS},
    std::sync::Arc,
    std::time::Duration,
};

/// Run the ingestion loop until the broker becomes unreachable for good.
///
/// Connection errors trigger backoff-paced reconnects; after `ConnAck` the
/// subscription is (re)established. Once reconnect attempts run out,
/// ingestion stops with an error log while the HTTP side keeps serving
/// stored data.
pub async fn run_ingestion(
    config: Config,
    mut aggregator: Aggregator,
    writer: Arc<dyn RecordWriter>,
    broadcaster: Broadcaster,
) {
    let mut options = MqttOptions::new("agroflow-ingest", &config.mqtt_host, config.mqtt_port);
    options.set_keep_alive(Duration::from_secs(30));

    let (client, mut eventloop) = AsyncClient::new(options, 64);
    let mut backoff =
        ReconnectBackoff::new(Duration::from_secs(1), Duration::from_secs(60), 10);

    log::info!("📡 Starting MQTT ingestion");
    log::info!("   ├─ Broker: {}:{}", config.mqtt_host, config.mqtt_port);
    log::info!("   └─ Topic filter: {}", config.topic_filter);

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                backoff.reset();
                log::info!("✅ Connected to broker, subscribing to {}", config.topic_filter);
                if let Err(e) = client.subscribe(&config.topic_filter, QoS::AtMostOnce).await {
                    log::error!("❌ Subscribe request failed: {}", e);
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let handled = handle_message(
                    &publish.topic,
                    &publish.payload,
                    &mut aggregator,
                    writer.as_ref(),
                    &broadcaster,
                )
                .await;
                match handled {
                    Ok(0) => {}
                    Ok(n) => log::debug!("Flushed {} record(s) from {}", n, publish.topic),
                    Err(e) => log::warn!("⚠️  Dropped message on {}: {}", publish.topic, e),
                }
            }
            Ok(_) => {}
            Err(e) => {
                log::warn!("⚠️  MQTT connection error: {}", e);
                if backoff.wait().await.is_err() {
                    log::error!("❌ Reconnect attempts exhausted, stopping ingestion");
                    break;
                }
            }
        }
    }
}

/// Classify, decode, and apply one publish; persist and fan out whatever
/// it completed.
///
/// Returns how many records were durably written (and therefore
/// broadcast). Malformed topics and undecodable payloads come back as
/// errors for the caller to log; a storage failure is logged here and the
/// affected record is lost: its fields were already reset at flush time
/// and the push to live subscribers is suppressed.
pub async fn handle_message(
    topic: &str,
    payload: &[u8],
    aggregator: &mut Aggregator,
    writer: &dyn RecordWriter,
    broadcaster: &Broadcaster,
) -> Result<usize, IngestError> {
    let (node_id, kind) = classify_topic(topic)?;

    let text = std::str::from_utf8(payload)
        .map_err(|_| IngestError::PayloadDecode(format!("payload on {} is not UTF-8", topic)))?;

    let Some(update) = SensorUpdate::decode(kind, text)? else {
        log::debug!("Ignoring unrecognized sensor kind on {}", topic);
        return Ok(0);
    };

    let mut delivered = 0;
    for record in aggregator.apply(node_id, update) {
        match writer.write_record(&record).await {
            Ok(()) => {
                let receivers = broadcaster.publish(record);
                delivered += 1;
                log::info!(
                    "💾 Stored record for node {} ({} live subscriber(s))",
                    node_id,
                    receivers
                );
            }
            Err(e) => {
                log::error!("❌ Storage write failed, record for node {} lost: {}", node_id, e);
            }
        }
    }

    Ok(delivered)
}
