//! Integration tests for the ingestion flow over the crate's public API
//!
//! Covers the ordering contract between the persistence writer and the
//! live broadcaster, and interleaved publishes from multiple nodes.

use agroflow::aggregator::Aggregator;
use agroflow::broadcast::Broadcaster;
use agroflow::db::{run_schema_bootstrap, RecordWriter, SqliteRecordReader, SqliteRecordWriter};
use agroflow::error::StorageError;
use agroflow::ingestion::handle_message;
use agroflow::types::CompletedRecord;
use async_trait::async_trait;
use rusqlite::Connection;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::NamedTempFile;

fn create_test_db() -> (NamedTempFile, Arc<SqliteRecordWriter>, SqliteRecordReader) {
    let temp_file = NamedTempFile::new().unwrap();
    let db_path = temp_file.path().to_str().unwrap().to_string();

    let mut conn = Connection::open(&db_path).unwrap();
    run_schema_bootstrap(&mut conn, "sql").unwrap();
    drop(conn);

    let writer = Arc::new(SqliteRecordWriter::new(&db_path).unwrap());
    let reader = SqliteRecordReader::new(&db_path).unwrap();
    (temp_file, writer, reader)
}

/// Writer that fails on the first `fail_first` calls, then accepts
struct FlakyWriter {
    inner: Arc<SqliteRecordWriter>,
    calls: AtomicUsize,
    fail_first: usize,
}

#[async_trait]
impl RecordWriter for FlakyWriter {
    async fn write_record(&self, record: &CompletedRecord) -> Result<(), StorageError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            return Err(StorageError::Database(rusqlite::Error::InvalidQuery));
        }
        self.inner.write_record(record).await
    }
}

#[tokio::test]
async fn test_failed_write_loses_the_record_but_not_the_pipeline() {
    let (_temp, sqlite_writer, reader) = create_test_db();
    let writer = FlakyWriter {
        inner: sqlite_writer,
        calls: AtomicUsize::new(0),
        fail_first: 1,
    };
    let mut aggregator = Aggregator::new();
    let broadcaster = Broadcaster::new(8);
    let mut rx = broadcaster.subscribe();

    // First pair: the write fails, so nothing may reach subscribers
    handle_message("sensores/nodo_1/temperatura", b"21.0", &mut aggregator, &writer, &broadcaster)
        .await
        .unwrap();
    let delivered = handle_message(
        "sensores/nodo_1/humedad",
        b"60.0",
        &mut aggregator,
        &writer,
        &broadcaster,
    )
    .await
    .unwrap();
    assert_eq!(delivered, 0);
    assert!(rx.try_recv().is_err());

    // Second pair flows through normally: the failure was per-record
    handle_message("sensores/nodo_1/temperatura", b"22.0", &mut aggregator, &writer, &broadcaster)
        .await
        .unwrap();
    let delivered = handle_message(
        "sensores/nodo_1/humedad",
        b"61.0",
        &mut aggregator,
        &writer,
        &broadcaster,
    )
    .await
    .unwrap();
    assert_eq!(delivered, 1);

    let pushed = rx.try_recv().unwrap();
    match &pushed {
        CompletedRecord::Climate(r) => assert_eq!(r.temperature, 22.0),
        other => panic!("expected climate record, got {:?}", other),
    }

    // Durable store holds only the second pair
    let stored = reader
        .records_in_range("2000-01-01 00:00:00", "2100-01-01 00:00:00")
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0], pushed);
}

#[tokio::test]
async fn test_interleaved_nodes_complete_independently() {
    let (_temp, writer, reader) = create_test_db();
    let mut aggregator = Aggregator::new();
    let broadcaster = Broadcaster::new(8);

    // Two nodes publish interleaved; each pairs with its own fields only
    let messages: [(&str, &[u8]); 5] = [
        ("sensores/nodo_1/temperatura", b"20.0"),
        ("sensores/nodo_2/temperatura", b"25.0"),
        ("sensores/nodo_2/humedad_suelo", b"12.5"),
        ("sensores/nodo_1/humedad", b"55.0"),
        ("sensores/nodo_2/humedad", b"45.0"),
    ];

    let mut delivered = 0;
    for (topic, payload) in messages {
        delivered += handle_message(topic, payload, &mut aggregator, writer.as_ref(), &broadcaster)
            .await
            .unwrap();
    }
    // nodo_2 moisture + nodo_1 pair + nodo_2 pair
    assert_eq!(delivered, 3);

    let stored = reader
        .records_in_range("2000-01-01 00:00:00", "2100-01-01 00:00:00")
        .unwrap();
    assert_eq!(stored.len(), 3);

    let climate_nodes: Vec<u32> = stored
        .iter()
        .filter(|r| matches!(r, CompletedRecord::Climate(_)))
        .map(|r| r.node_id())
        .collect();
    assert_eq!(climate_nodes, vec![1, 2]);

    match stored.last().unwrap() {
        CompletedRecord::Moisture(r) => {
            assert_eq!(r.node_id, 2);
            assert_eq!(r.soil_moisture, 12.5);
        }
        other => panic!("expected moisture record, got {:?}", other),
    }
}
