//! Durable storage for completed records
//!
//! One append-only table per schema variant: `climate_data` and
//! `moisture_data` (see the `sql/` directory). The writer is synchronous
//! from the aggregator's point of view; the broadcast of a record only
//! happens after its write has returned success.

use {
    crate::error::StorageError,
    crate::types::{ClimateRecord, CompletedRecord, MoistureRecord},
    async_trait::async_trait,
    rusqlite::Connection,
    std::fs,
    std::path::Path,
    std::sync::{Arc, Mutex},
};

/// Sink for completed records.
///
/// A failed write means the record is lost for delivery purposes: the node
/// state was reset at flush time and no retry is attempted.
#[async_trait]
pub trait RecordWriter: Send + Sync {
    async fn write_record(&self, record: &CompletedRecord) -> Result<(), StorageError>;
}

/// Bootstrap the database schema from ordered SQL files.
///
/// Reads every `.sql` file in `schema_dir` sorted by name (`01_`, `02_`, …)
/// and executes it. All files use `IF NOT EXISTS`, so running the bootstrap
/// on every startup is harmless. Also switches the database to WAL so the
/// read-only query connection can run alongside the writer.
pub fn run_schema_bootstrap(conn: &mut Connection, schema_dir: &str) -> Result<(), StorageError> {
    let schema_path = Path::new(schema_dir);
    if !schema_path.exists() {
        return Err(StorageError::SchemaDirMissing(schema_dir.to_string()));
    }

    conn.pragma_update(None, "journal_mode", "WAL")?;

    let mut sql_files: Vec<_> = fs::read_dir(schema_path)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().and_then(|s| s.to_str()) == Some("sql"))
        .collect();
    sql_files.sort_by_key(|entry| entry.file_name());

    for entry in sql_files {
        let path = entry.path();
        log::info!("   ├─ Applying schema file: {}", path.display());
        let sql = fs::read_to_string(&path)?;
        conn.execute_batch(&sql)?;
    }

    log::info!("   └─ ✅ Schema bootstrap complete");
    Ok(())
}

/// SQLite implementation of `RecordWriter`
pub struct SqliteRecordWriter {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRecordWriter {
    /// Open a writer on an existing database. The schema must already have
    /// been bootstrapped (see `run_schema_bootstrap`).
    pub fn new(db_path: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn insert_climate(conn: &Connection, record: &ClimateRecord) -> Result<(), StorageError> {
        conn.execute(
            "INSERT INTO climate_data (node_id, name, temperature, humidity, stress_state, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                record.node_id,
                record.name,
                record.temperature,
                record.humidity,
                record.stress_state,
                record.timestamp,
            ],
        )?;
        Ok(())
    }

    fn insert_moisture(conn: &Connection, record: &MoistureRecord) -> Result<(), StorageError> {
        conn.execute(
            "INSERT INTO moisture_data (node_id, name, soil_moisture, stress_state, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                record.node_id,
                record.name,
                record.soil_moisture,
                record.stress_state,
                record.timestamp,
            ],
        )?;
        Ok(())
    }
}

#[async_trait]
impl RecordWriter for SqliteRecordWriter {
    /// Append one record to the table matching its schema variant.
    ///
    /// No deduplication: a quantity reported twice becomes two rows.
    async fn write_record(&self, record: &CompletedRecord) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();
        match record {
            CompletedRecord::Climate(r) => Self::insert_climate(&conn, r),
            CompletedRecord::Moisture(r) => Self::insert_moisture(&conn, r),
        }
    }
}

/// Node ids surfaced by the query API. The deployment has four reporting
/// nodes; rows from any other id are excluded from query results.
const REPORTED_NODES: &str = "(1, 2, 3, 4)";

/// Read-only view over the stored records, used by the query API.
///
/// Holds its own connection with `query_only` set so the HTTP path can
/// never take a write lock away from the ingestion path.
pub struct SqliteRecordReader {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRecordReader {
    pub fn new(db_path: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(db_path)?;
        conn.execute("PRAGMA query_only = ON", [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// All climate rows followed by all moisture rows within the timestamp
    /// range, each block ordered by (node_id, timestamp).
    pub fn records_in_range(
        &self,
        start: &str,
        end: &str,
    ) -> Result<Vec<CompletedRecord>, StorageError> {
        let conn = self.conn.lock().unwrap();

        let mut records = Self::climate_rows(
            &conn,
            &format!(
                "SELECT node_id, name, temperature, humidity, stress_state, timestamp
                 FROM climate_data
                 WHERE timestamp BETWEEN ?1 AND ?2 AND node_id IN {REPORTED_NODES}
                 ORDER BY node_id, timestamp"
            ),
            rusqlite::params![start, end],
        )?;
        records.extend(Self::moisture_rows(
            &conn,
            &format!(
                "SELECT node_id, name, soil_moisture, stress_state, timestamp
                 FROM moisture_data
                 WHERE timestamp BETWEEN ?1 AND ?2 AND node_id IN {REPORTED_NODES}
                 ORDER BY node_id, timestamp"
            ),
            rusqlite::params![start, end],
        )?);
        Ok(records)
    }

    /// Most recent `n` rows per table, descending by timestamp, climate
    /// rows first.
    pub fn last_n_records(&self, n: u32) -> Result<Vec<CompletedRecord>, StorageError> {
        let conn = self.conn.lock().unwrap();

        let mut records = Self::climate_rows(
            &conn,
            &format!(
                "SELECT node_id, name, temperature, humidity, stress_state, timestamp
                 FROM climate_data
                 WHERE node_id IN {REPORTED_NODES}
                 ORDER BY timestamp DESC
                 LIMIT ?1"
            ),
            rusqlite::params![n],
        )?;
        records.extend(Self::moisture_rows(
            &conn,
            &format!(
                "SELECT node_id, name, soil_moisture, stress_state, timestamp
                 FROM moisture_data
                 WHERE node_id IN {REPORTED_NODES}
                 ORDER BY timestamp DESC
                 LIMIT ?1"
            ),
            rusqlite::params![n],
        )?);
        Ok(records)
    }

    fn climate_rows(
        conn: &Connection,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<CompletedRecord>, StorageError> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, |row| {
            Ok(CompletedRecord::Climate(ClimateRecord {
                node_id: row.get(0)?,
                name: row.get(1)?,
                temperature: row.get(2)?,
                humidity: row.get(3)?,
                stress_state: row.get(4)?,
                timestamp: row.get(5)?,
            }))
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StorageError::from)
    }

    fn moisture_rows(
        conn: &Connection,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<CompletedRecord>, StorageError> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, |row| {
            Ok(CompletedRecord::Moisture(MoistureRecord {
                node_id: row.get(0)?,
                name: row.get(1)?,
                soil_moisture: row.get(2)?,
                stress_state: row.get(3)?,
                timestamp: row.get(4)?,
            }))
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StorageError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn create_test_db() -> (NamedTempFile, SqliteRecordWriter, SqliteRecordReader) {
        let temp_file = NamedTempFile::new().unwrap();
        let db_path = temp_file.path().to_str().unwrap().to_string();

        let mut conn = Connection::open(&db_path).unwrap();
        run_schema_bootstrap(&mut conn, "sql").unwrap();
        drop(conn);

        let writer = SqliteRecordWriter::new(&db_path).unwrap();
        let reader = SqliteRecordReader::new(&db_path).unwrap();
        (temp_file, writer, reader)
    }

    fn climate(node_id: u32, temperature: f64, timestamp: &str) -> CompletedRecord {
        CompletedRecord::Climate(ClimateRecord {
            node_id,
            name: format!("Nodo {}", node_id),
            temperature,
            humidity: 50.0,
            stress_state: None,
            timestamp: timestamp.to_string(),
        })
    }

    fn moisture(node_id: u32, soil_moisture: f64, timestamp: &str) -> CompletedRecord {
        CompletedRecord::Moisture(MoistureRecord {
            node_id,
            name: format!("Nodo {}", node_id),
            soil_moisture,
            stress_state: 1,
            timestamp: timestamp.to_string(),
        })
    }

    #[test]
    fn test_schema_bootstrap_is_idempotent() {
        let temp_file = NamedTempFile::new().unwrap();
        let db_path = temp_file.path().to_str().unwrap();
        let mut conn = Connection::open(db_path).unwrap();
        run_schema_bootstrap(&mut conn, "sql").unwrap();
        run_schema_bootstrap(&mut conn, "sql").unwrap();
    }

    #[test]
    fn test_missing_schema_dir_is_an_error() {
        let temp_file = NamedTempFile::new().unwrap();
        let mut conn = Connection::open(temp_file.path()).unwrap();
        assert!(matches!(
            run_schema_bootstrap(&mut conn, "no_such_dir"),
            Err(StorageError::SchemaDirMissing(_))
        ));
    }

    #[tokio::test]
    async fn test_write_then_read_back_in_range() {
        let (_temp, writer, reader) = create_test_db();

        let record = climate(3, 22.1, "2026-08-06 10:00:00");
        writer.write_record(&record).await.unwrap();
        writer
            .write_record(&moisture(1, 33.2, "2026-08-06 10:05:00"))
            .await
            .unwrap();

        let records = reader
            .records_in_range("2026-08-06 00:00:00", "2026-08-06 23:59:59")
            .unwrap();
        assert_eq!(records.len(), 2);
        // Climate block comes first in the combined sequence
        assert!(matches!(records[0], CompletedRecord::Climate(_)));
        assert!(matches!(records[1], CompletedRecord::Moisture(_)));
        assert_eq!(records[0], record);
    }

    #[tokio::test]
    async fn test_range_filter_and_node_filter() {
        let (_temp, writer, reader) = create_test_db();

        writer.write_record(&climate(1, 20.0, "2026-08-05 10:00:00")).await.unwrap();
        writer.write_record(&climate(2, 21.0, "2026-08-06 10:00:00")).await.unwrap();
        // Node 7 is outside the reported set and never surfaces
        writer.write_record(&climate(7, 22.0, "2026-08-06 11:00:00")).await.unwrap();

        let records = reader
            .records_in_range("2026-08-06 00:00:00", "2026-08-06 23:59:59")
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].node_id(), 2);
    }

    #[tokio::test]
    async fn test_last_n_is_per_table_descending() {
        let (_temp, writer, reader) = create_test_db();

        for hour in 0..5 {
            let ts = format!("2026-08-06 0{}:00:00", hour);
            writer.write_record(&climate(1, 20.0 + hour as f64, &ts)).await.unwrap();
        }
        writer.write_record(&moisture(2, 30.0, "2026-08-06 09:00:00")).await.unwrap();

        let records = reader.last_n_records(2).unwrap();
        // 2 climate rows (newest first) + 1 moisture row
        assert_eq!(records.len(), 3);
        match (&records[0], &records[1]) {
            (CompletedRecord::Climate(a), CompletedRecord::Climate(b)) => {
                assert!(a.timestamp > b.timestamp);
                assert_eq!(a.temperature, 24.0);
            }
            other => panic!("expected two climate records, got {:?}", other),
        }
        assert!(matches!(records[2], CompletedRecord::Moisture(_)));
    }

    #[tokio::test]
    async fn test_no_deduplication_on_repeated_reports() {
        let (_temp, writer, reader) = create_test_db();

        let record = moisture(4, 15.0, "2026-08-06 12:00:00");
        writer.write_record(&record).await.unwrap();
        writer.write_record(&record).await.unwrap();

        let records = reader
            .records_in_range("2026-08-06 00:00:00", "2026-08-06 23:59:59")
            .unwrap();
        assert_eq!(records.len(), 2);
    }
}
