use std::fmt;

/// Per-message ingestion failure. Always contained: the message is dropped,
/// the error is logged by the ingestion loop, and processing continues.
#[derive(Debug)]
pub enum IngestError {
    /// Topic has fewer than 3 segments or no node number in the node token
    MalformedTopic(String),
    /// Payload cannot be parsed to the type its sensor kind requires
    PayloadDecode(String),
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::MalformedTopic(topic) => write!(f, "Malformed topic: {}", topic),
            IngestError::PayloadDecode(detail) => write!(f, "Payload decode failed: {}", detail),
        }
    }
}

impl std::error::Error for IngestError {}

/// Durable-store failure. On the flush path the affected record is lost
/// (node state has already been reset) and the broadcast is suppressed;
/// on the query path it surfaces as a 500.
#[derive(Debug)]
pub enum StorageError {
    Database(rusqlite::Error),
    SchemaDirMissing(String),
    Io(std::io::Error),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Database(err)
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err)
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Database(e) => write!(f, "Database error: {}", e),
            StorageError::SchemaDirMissing(dir) => write!(f, "Schema directory not found: {}", dir),
            StorageError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for StorageError {}
