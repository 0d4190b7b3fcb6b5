use async_trait::async_trait;
use rusqlite::{params, Connection};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::capture::StoreRecord;
use crate::error::{CaptureError, Result};

/// Local collection of capture events
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert(&self, record: &StoreRecord) -> Result<()>;
}

/// SQLite-backed record store; one row per capture. Clones share the
/// connection.
#[derive(Clone)]
pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
    table: String,
    timeout: Duration,
}

impl SqliteRecordStore {
    pub fn open(path: impl AsRef<Path>, collection: &str, timeout: Duration) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| {
            CaptureError::Configuration(format!(
                "cannot open record store {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::init(conn, collection, timeout)
    }

    pub fn in_memory(collection: &str, timeout: Duration) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| CaptureError::Configuration(format!("cannot open record store: {}", e)))?;
        Self::init(conn, collection, timeout)
    }

    fn init(conn: Connection, collection: &str, timeout: Duration) -> Result<Self> {
        let valid = !collection.is_empty()
            && collection
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(CaptureError::Configuration(format!(
                "invalid collection name {:?}",
                collection
            )));
        }

        let setup = |conn: &Connection| -> rusqlite::Result<()> {
            conn.busy_timeout(timeout)?;
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    capture_file TEXT NOT NULL,
                    t INTEGER,
                    sample_count INTEGER,
                    body TEXT NOT NULL
                )",
                collection
            ))
        };
        setup(&conn).map_err(|e| {
            CaptureError::Configuration(format!("record store setup failed: {}", e))
        })?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            table: collection.to_string(),
            timeout,
        })
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", self.table), [], |row| row.get(0))
            .map_err(|e| CaptureError::LocalInsert(e.to_string()))?;
        Ok(count as usize)
    }

    /// Stored events in insertion order.
    pub fn records(&self) -> Result<Vec<Value>> {
        let conn = self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut stmt = conn
            .prepare(&format!("SELECT body FROM {} ORDER BY id", self.table))
            .map_err(|e| CaptureError::LocalInsert(e.to_string()))?;
        let bodies = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| CaptureError::LocalInsert(e.to_string()))?
            .collect::<rusqlite::Result<Vec<String>>>()
            .map_err(|e| CaptureError::LocalInsert(e.to_string()))?;

        bodies
            .iter()
            .map(|body| {
                serde_json::from_str(body).map_err(|e| CaptureError::LocalInsert(e.to_string()))
            })
            .collect()
    }

    /// Capture files referenced by stored events, for reconciling against disk.
    pub fn capture_files(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut stmt = conn
            .prepare(&format!("SELECT capture_file FROM {} ORDER BY id", self.table))
            .map_err(|e| CaptureError::LocalInsert(e.to_string()))?;
        let files = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| CaptureError::LocalInsert(e.to_string()))?
            .collect::<rusqlite::Result<Vec<String>>>()
            .map_err(|e| CaptureError::LocalInsert(e.to_string()))?;
        Ok(files)
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn insert(&self, record: &StoreRecord) -> Result<()> {
        let conn = self.conn.clone();
        let sql = format!(
            "INSERT INTO {} (capture_file, t, sample_count, body) VALUES (?1, ?2, ?3, ?4)",
            self.table
        );
        let capture_file = record.capture_file().to_string();
        let t = record.timestamp();
        let sample_count = record.sample_count().map(|n| n as i64);
        let body = record.to_json();

        let insert = tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            conn.execute(&sql, params![capture_file, t, sample_count, body])
        });

        match tokio::time::timeout(self.timeout, insert).await {
            Ok(Ok(Ok(_))) => Ok(()),
            Ok(Ok(Err(e))) => Err(CaptureError::LocalInsert(e.to_string())),
            Ok(Err(e)) => Err(CaptureError::LocalInsert(format!("insert task failed: {}", e))),
            Err(_) => Err(CaptureError::LocalInsert(format!(
                "insert timed out after {:?}",
                self.timeout
            ))),
        }
    }
}
