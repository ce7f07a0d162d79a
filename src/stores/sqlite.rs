//! SQLite record store: read-only job-run lookups
//!
//! Reads the `prow_job_runs` / `prow_jobs` tables written by the ingestion
//! side. The connection is opened read-only and queried on the blocking
//! pool.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{Connection, OpenFlags, OptionalExtension};

use super::{JobRunRecord, RecordError, RecordStore};

const JOB_RUN_QUERY: &str = "SELECT r.url, j.name
     FROM prow_job_runs r
     JOIN prow_jobs j ON j.id = r.prow_job_id
     WHERE r.id = ?1";

/// Record store handle (read-only)
#[derive(Clone)]
pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRecordStore {
    /// Open the database read-only
    pub fn open_readonly<P: AsRef<Path>>(db_path: P) -> Result<Self, RecordError> {
        let conn = Connection::open_with_flags(
            db_path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| RecordError::Backend(format!("failed to open record DB: {}", e)))?;
        Ok(Self::from_connection(conn))
    }

    /// Wrap an already-open connection
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }
}

fn lookup(conn: &Connection, id: i64) -> Result<JobRunRecord, RecordError> {
    let row: Option<(Option<String>, String)> = conn
        .query_row(JOB_RUN_QUERY, [id], |row| Ok((row.get(0)?, row.get(1)?)))
        .optional()
        .map_err(|e| RecordError::Backend(e.to_string()))?;

    match row {
        Some((url, job_name)) => Ok(JobRunRecord {
            id,
            url: url.unwrap_or_default(),
            job_name,
        }),
        None => Err(RecordError::NotFound(id)),
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn job_run(&self, id: i64) -> Result<JobRunRecord, RecordError> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || -> Result<JobRunRecord, RecordError> {
            let guard = conn
                .lock()
                .map_err(|_| RecordError::Backend("record DB lock poisoned".to_string()))?;
            lookup(&guard, id)
        })
        .await
        .map_err(|e| RecordError::Backend(e.to_string()))?
    }
}
