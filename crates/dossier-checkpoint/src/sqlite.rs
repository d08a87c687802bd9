use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tracing::debug;

use dossier_core::error::{GraphError, Result};

use crate::store::CheckpointStore;
use crate::types::{Checkpoint, CheckpointMetadata, SuspendedTask};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS session_checkpoints (
    session_id TEXT PRIMARY KEY NOT NULL,
    step INTEGER NOT NULL,
    channel_values TEXT NOT NULL,
    suspended TEXT,
    metadata TEXT NOT NULL,
    updated_at TEXT NOT NULL
);";

/// How long a writer waits for another process's lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Durable store: one row per session, replaced on every write.
///
/// The connection sits behind a mutex and every statement runs on the
/// blocking pool. Several processes may open the same file; conditional
/// writes are single statements, so SQLite's own locking makes them atomic.
pub struct SqliteCheckpointStore {
    conn: Arc<Mutex<Connection>>,
}

fn sql_error(context: &'static str) -> impl Fn(rusqlite::Error) -> GraphError {
    move |e| GraphError::Checkpoint(format!("sqlite {context}: {e}"))
}

impl SqliteCheckpointStore {
    /// Open or create the database file at `path`.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "opening checkpoint database");
        Self::with_connection(Connection::open(path).map_err(sql_error("open"))?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory().map_err(sql_error("open"))?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT).map_err(sql_error("configure"))?;
        conn.execute_batch(SCHEMA).map_err(sql_error("schema"))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = lock(&conn)?;
            op(&guard)
        })
            .await
            .map_err(|e| GraphError::Checkpoint(format!("sqlite task failed: {e}")))?
    }
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|_| GraphError::Checkpoint("sqlite connection lock poisoned".into()).into())
}

/// Raw column values; decoding happens outside rusqlite so JSON failures
/// surface as checkpoint errors instead of being silently defaulted.
struct CheckpointRow {
    session_id: String,
    step: i64,
    channel_values: String,
    suspended: Option<String>,
    metadata: String,
    updated_at: String,
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CheckpointRow> {
    Ok(CheckpointRow {
        session_id: row.get(0)?,
        step: row.get(1)?,
        channel_values: row.get(2)?,
        suspended: row.get(3)?,
        metadata: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn decode(row: CheckpointRow) -> Result<Checkpoint> {
    let corrupt = |what: &str, e: &dyn std::fmt::Display| {
        GraphError::Checkpoint(format!(
            "corrupt {what} for session '{}': {e}",
            row.session_id
        ))
    };
    let channel_values: HashMap<String, Value> = serde_json::from_str(&row.channel_values)
        .map_err(|e| corrupt("channel_values", &e))?;
    let suspended: Option<SuspendedTask> = match &row.suspended {
        Some(text) => Some(serde_json::from_str(text).map_err(|e| corrupt("suspended", &e))?),
        None => None,
    };
    let metadata: CheckpointMetadata =
        serde_json::from_str(&row.metadata).map_err(|e| corrupt("metadata", &e))?;
    let updated_at: DateTime<Utc> = row
        .updated_at
        .parse()
        .map_err(|e| corrupt("updated_at", &e))?;

    Ok(Checkpoint {
        session_id: row.session_id,
        step: row.step.max(0) as usize,
        channel_values,
        suspended,
        metadata,
        updated_at,
    })
}

fn encode<T: serde::Serialize>(what: &str, value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| GraphError::Checkpoint(format!("cannot encode {what}: {e}")).into())
}

/// Column values for a write, in `SCHEMA` order.
struct EncodedRow {
    session_id: String,
    step: i64,
    channel_values: String,
    suspended: Option<String>,
    metadata: String,
    updated_at: String,
}

impl EncodedRow {
    fn new(checkpoint: &Checkpoint) -> Result<Self> {
        let suspended = match &checkpoint.suspended {
            Some(task) => Some(encode("suspended", task)?),
            None => None,
        };
        Ok(Self {
            session_id: checkpoint.session_id.clone(),
            step: checkpoint.step as i64,
            channel_values: encode("channel_values", &checkpoint.channel_values)?,
            suspended,
            metadata: encode("metadata", &checkpoint.metadata)?,
            updated_at: checkpoint.updated_at.to_rfc3339(),
        })
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn put(&self, checkpoint: Checkpoint) -> Result<()> {
        let row = EncodedRow::new(&checkpoint)?;
        self.blocking(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO session_checkpoints
                    (session_id, step, channel_values, suspended, metadata, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    row.session_id,
                    row.step,
                    row.channel_values,
                    row.suspended,
                    row.metadata,
                    row.updated_at,
                ],
            )
            .map_err(sql_error("write"))?;
            Ok(())
        })
        .await
    }

    async fn put_if_step(
        &self,
        checkpoint: Checkpoint,
        expected_step: Option<usize>,
    ) -> Result<bool> {
        let row = EncodedRow::new(&checkpoint)?;
        self.blocking(move |conn| {
            let changed = match expected_step {
                None => conn.execute(
                    "INSERT INTO session_checkpoints
                        (session_id, step, channel_values, suspended, metadata, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(session_id) DO NOTHING",
                    params![
                        row.session_id,
                        row.step,
                        row.channel_values,
                        row.suspended,
                        row.metadata,
                        row.updated_at,
                    ],
                ),
                Some(expected) => conn.execute(
                    "UPDATE session_checkpoints
                     SET step = ?2, channel_values = ?3, suspended = ?4,
                         metadata = ?5, updated_at = ?6
                     WHERE session_id = ?1 AND step = ?7",
                    params![
                        row.session_id,
                        row.step,
                        row.channel_values,
                        row.suspended,
                        row.metadata,
                        row.updated_at,
                        expected as i64,
                    ],
                ),
            }
            .map_err(sql_error("conditional write"))?;
            Ok(changed == 1)
        })
        .await
    }

    async fn get(&self, session_id: &str) -> Result<Option<Checkpoint>> {
        let session_id = session_id.to_owned();
        self.blocking(move |conn| {
            conn.query_row(
                "SELECT session_id, step, channel_values, suspended, metadata, updated_at
                 FROM session_checkpoints
                 WHERE session_id = ?1",
                params![session_id],
                read_row,
            )
            .optional()
            .map_err(sql_error("read"))?
            .map(decode)
            .transpose()
        })
        .await
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        let session_id = session_id.to_owned();
        self.blocking(move |conn| {
            conn.execute(
                "DELETE FROM session_checkpoints WHERE session_id = ?1",
                params![session_id],
            )
            .map_err(sql_error("delete"))?;
            Ok(())
        })
        .await
    }

    async fn list_sessions(&self) -> Result<Vec<String>> {
        self.blocking(|conn| {
            let mut stmt = conn
                .prepare("SELECT session_id FROM session_checkpoints ORDER BY session_id")
                .map_err(sql_error("list"))?;
            let ids = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(sql_error("list"))?
                .collect::<rusqlite::Result<Vec<String>>>()
                .map_err(sql_error("list"))?;
            Ok(ids)
        })
        .await
    }
}
