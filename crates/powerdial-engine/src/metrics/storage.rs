//! Call record persistence.
//!
//! A single relational table stands in for the production warehouse; records
//! arrive over an async queue and are committed one at a time, giving
//! at-least-once persistence in enqueue order within this worker. Readers
//! must not assume global chronological order across workers.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error, info};

use super::CallRecord;

/// How long the persistence worker blocks on its queue before waking up.
const QUEUE_RECV_TIMEOUT: Duration = Duration::from_secs(1);

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS CALL_RECORDS(
    agent_id      TEXT NOT NULL,
    called_number TEXT NOT NULL,
    call_start    INTEGER NOT NULL,
    call_end      INTEGER NOT NULL
)";

const CREATE_INDEX: &str = "CREATE INDEX IF NOT EXISTS agent_idx ON CALL_RECORDS(agent_id)";

const INSERT_RECORD: &str = "INSERT INTO CALL_RECORDS (agent_id, called_number, call_start, call_end)
 VALUES (?, ?, ?, ?)";

/// Per-agent aggregate over the persisted call log.
///
/// Serializes for consumers that want the report as JSON rather than the
/// simulator's plain-text rows.
#[derive(Debug, Clone, Serialize)]
pub struct AgentCallReport {
    pub agent_id: String,
    pub calls: i64,
    pub avg_call_seconds: f64,
}

/// SQLite-backed log of completed calls, keyed by agent id.
#[derive(Clone)]
pub struct CallRecordStore {
    pool: SqlitePool,
}

impl CallRecordStore {
    /// Open (creating if missing) the database at `path` and ensure the
    /// schema exists.
    pub async fn new(path: &str) -> Result<Self> {
        info!("Call record database is {}", path);
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(|e| anyhow!("Failed to open call record database {}: {}", path, e))?;
        let store = CallRecordStore { pool };
        store.create_schema().await?;
        Ok(store)
    }

    /// An in-memory store for testing.
    ///
    /// The pool is pinned to one connection that never retires; an in-memory
    /// SQLite database lives and dies with its connection.
    pub async fn new_in_memory() -> Result<Self> {
        let options: SqliteConnectOptions = "sqlite::memory:"
            .parse()
            .map_err(|e| anyhow!("Bad in-memory SQLite options: {}", e))?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| anyhow!("Failed to open in-memory database: {}", e))?;
        let store = CallRecordStore { pool };
        store.create_schema().await?;
        Ok(store)
    }

    async fn create_schema(&self) -> Result<()> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_INDEX).execute(&self.pool).await?;
        Ok(())
    }

    /// Append one completed record. Rejects records that are still open.
    pub async fn insert(&self, record: &CallRecord) -> Result<()> {
        let ended_at = record.ended_at.ok_or_else(|| {
            anyhow!("Call record for agent {} has no end timestamp", record.agent_id)
        })?;
        sqlx::query(INSERT_RECORD)
            .bind(&record.agent_id)
            .bind(&record.number)
            .bind(epoch_seconds(record.started_at))
            .bind(epoch_seconds(ended_at))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Call count and average duration per agent.
    pub async fn agent_report(&self) -> Result<Vec<AgentCallReport>> {
        let rows = sqlx::query(
            "SELECT agent_id, COUNT(agent_id) AS calls, AVG(call_end - call_start) AS avg_call_seconds
             FROM CALL_RECORDS GROUP BY agent_id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(AgentCallReport {
                    agent_id: row.try_get("agent_id")?,
                    calls: row.try_get("calls")?,
                    avg_call_seconds: row.try_get("avg_call_seconds")?,
                })
            })
            .collect()
    }

    /// Total persisted records.
    pub async fn record_count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM CALL_RECORDS")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("count")?)
    }

    /// Wipe the call log. Used for clean-start runs.
    pub async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM CALL_RECORDS").execute(&self.pool).await?;
        Ok(())
    }
}

// Fractional epoch seconds; SQLite stores them fine in the INTEGER column
// and the report math stays in seconds.
fn epoch_seconds(t: DateTime<Utc>) -> f64 {
    t.timestamp_micros() as f64 / 1e6
}

pub(crate) enum StorageMessage {
    Record(CallRecord),
    Shutdown,
}

/// Consumes completed call records and appends them to the store.
pub(crate) struct StorageWorker {
    store: CallRecordStore,
    rx: mpsc::UnboundedReceiver<StorageMessage>,
}

impl StorageWorker {
    pub(crate) fn new(store: CallRecordStore, rx: mpsc::UnboundedReceiver<StorageMessage>) -> Self {
        StorageWorker { store, rx }
    }

    pub(crate) async fn run(mut self) {
        loop {
            match timeout(QUEUE_RECV_TIMEOUT, self.rx.recv()).await {
                Ok(Some(StorageMessage::Record(record))) => {
                    // A record that will not insert is dropped after logging;
                    // the worker keeps going for the next one.
                    if let Err(e) = self.store.insert(&record).await {
                        error!("Dropping call record for agent {}: {}", record.agent_id, e);
                    } else {
                        debug!("Persisted call record for agent {}", record.agent_id);
                    }
                }
                Ok(Some(StorageMessage::Shutdown)) | Ok(None) => {
                    info!("Shutting down call record storage");
                    return;
                }
                Err(_) => continue,
            }
        }
    }
}
