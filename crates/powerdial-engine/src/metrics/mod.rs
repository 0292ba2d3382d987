//! Call metrics: in-flight tracking and the completion pipeline.
//!
//! The [`CallMetricsRecorder`] keeps one in-flight [`CallRecord`] per busy
//! agent and streams completed records through an async queue to the
//! [`storage`] worker. In production the in-flight map would live in a
//! volatile distributed cache and completions would go out via a stream
//! publisher; both are reduced to in-process structures here.

pub mod storage;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::{DialerError, Result};
use storage::{CallRecordStore, StorageMessage, StorageWorker};

pub use storage::AgentCallReport;

/// One call made on behalf of an agent.
///
/// `ended_at` stays `None` while the call is in flight; persistence only
/// ever sees records with both timestamps present.
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub agent_id: String,
    pub number: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl CallRecord {
    fn started_now(agent_id: &str, number: &str) -> Self {
        CallRecord {
            agent_id: agent_id.to_string(),
            number: number.to_string(),
            started_at: Utc::now(),
            ended_at: None,
        }
    }
}

/// Tracks call volume and duration per agent.
///
/// At most one call is in flight per agent id; the event stream for a single
/// agent is serialized, so a second start for the same agent means a
/// protocol violation upstream and displaces the stale entry.
pub struct CallMetricsRecorder {
    in_flight: DashMap<String, CallRecord>,
    completions: mpsc::UnboundedSender<StorageMessage>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl CallMetricsRecorder {
    /// Create a recorder persisting completed calls into `store`.
    ///
    /// Spawns the persistence worker, so this must be called inside a tokio
    /// runtime.
    pub fn new(store: CallRecordStore) -> Self {
        let (completions, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(StorageWorker::new(store, rx).run());
        CallMetricsRecorder {
            in_flight: DashMap::new(),
            completions,
            worker: Mutex::new(Some(handle)),
        }
    }

    /// Record that `agent_id` connected a call to `number`.
    pub fn call_started(&self, agent_id: &str, number: &str) {
        let record = CallRecord::started_now(agent_id, number);
        if let Some(previous) = self.in_flight.insert(agent_id.to_string(), record) {
            warn!(
                "Agent {} started a call to {} while a call to {} was still in flight",
                agent_id, number, previous.number
            );
        }
    }

    /// Record that the call from `agent_id` to `number` ended.
    ///
    /// If no call is in flight for the agent, or the in-flight number does
    /// not match, the half-recorded call is dropped: the stale entry is
    /// removed and nothing reaches persistence.
    pub fn call_ended(&self, agent_id: &str, number: &str) -> Result<()> {
        match self.in_flight.remove(agent_id) {
            None => {
                error!(
                    "Call ended for call not in progress: agent {}, number {}",
                    agent_id, number
                );
            }
            Some((_, record)) if record.number != number => {
                error!(
                    "Call ended for agent {} with number {}, but the call in flight was to {}; dropping the record",
                    agent_id, number, record.number
                );
            }
            Some((_, mut record)) => {
                record.ended_at = Some(Utc::now());
                self.completions
                    .send(StorageMessage::Record(record))
                    .map_err(|_| DialerError::queue("call record queue closed"))?;
            }
        }
        Ok(())
    }

    /// The number of the call currently in flight for `agent_id`, if any.
    pub fn in_flight_number(&self, agent_id: &str) -> Option<String> {
        self.in_flight.get(agent_id).map(|entry| entry.number.clone())
    }

    /// How many calls are in flight across all agents.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Stop the persistence worker after it drains the completion queue.
    pub async fn shutdown(&self) {
        info!("Shutting down call metrics");
        let _ = self.completions.send(StorageMessage::Shutdown);
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Persistence worker did not exit cleanly: {}", e);
            }
        }
    }
}
