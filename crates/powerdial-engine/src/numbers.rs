//! Number selection and redial exclusion.
//!
//! The [`NumberManager`] keeps a volatile cache of recently dialed numbers so
//! nobody gets called twice within the exclusion window, across all agents.
//! The cache key is the normalized number (digits only).
//!
//! The read path and the write path are deliberately split:
//!
//! 1. [`get_number`](NumberManager::get_number) tests candidates against the
//!    recency map under a shared lock and enqueues the chosen number.
//! 2. A single background consumer drains the queue, normalizes and inserts
//!    under the exclusive lock, and sweeps expired entries.
//!
//! Keeping the writer single-threaded keeps the hot path short and the sweep
//! simple. The read path may miss a number that is still in the queue, so a
//! just-chosen number can occasionally be handed out twice; the dialer is
//! lossy-tolerant and accepts the rare duplicate. In production the map would
//! be a distributed KV store and the queue a FIFO topic; both are reduced to
//! in-process structures here.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::leads::{LeadSource, RandomLeadSource};

/// How long the recency worker blocks on its queue before waking up to run
/// housekeeping and re-check its running flag.
const QUEUE_RECV_TIMEOUT: Duration = Duration::from_secs(1);

/// Strip a phone number down to its decimal digits.
///
/// The result is the deduplication key. Idempotent.
pub fn normalize_number(number: &str) -> String {
    number.chars().filter(char::is_ascii_digit).collect()
}

enum RecencyMessage {
    Dialed(String),
    Shutdown,
}

/// Hands out lead numbers that have not been dialed within the exclusion
/// window.
pub struct NumberManager {
    lead_source: Arc<dyn LeadSource>,
    exclude_window: Duration,
    // normalized number -> time it was handed out
    recent: Arc<RwLock<HashMap<String, Instant>>>,
    queue: mpsc::UnboundedSender<RecencyMessage>,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl NumberManager {
    /// Create a manager backed by the synthetic [`RandomLeadSource`].
    ///
    /// Spawns the recency worker, so this must be called inside a tokio
    /// runtime.
    pub fn new(exclude_window: Duration, sweep_period: Duration) -> Self {
        Self::with_lead_source(Arc::new(RandomLeadSource), exclude_window, sweep_period)
    }

    /// Create a manager over a custom lead source.
    pub fn with_lead_source(
        lead_source: Arc<dyn LeadSource>,
        exclude_window: Duration,
        sweep_period: Duration,
    ) -> Self {
        let recent = Arc::new(RwLock::new(HashMap::new()));
        let running = Arc::new(AtomicBool::new(true));
        let (queue, rx) = mpsc::unbounded_channel();

        let worker = RecencyWorker {
            recent: Arc::clone(&recent),
            rx,
            running: Arc::clone(&running),
            exclude_window,
            sweep_period,
            last_expiry: Instant::now(),
        };
        let handle = tokio::spawn(worker.run());

        NumberManager {
            lead_source,
            exclude_window,
            recent,
            queue,
            running,
            worker: Mutex::new(Some(handle)),
        }
    }

    /// Get a number that is not in the recent call cache.
    ///
    /// Pulls candidates from the lead source until one misses the cache; the
    /// domain is large enough that this is practically bounded. The chosen
    /// number is published to the recency queue and returned in its original
    /// formatted form.
    pub fn get_number(&self) -> String {
        let number = loop {
            let candidate = self.lead_source.next_number();
            if !self.recent.read().contains_key(&normalize_number(&candidate)) {
                break candidate;
            }
        };
        if self.queue.send(RecencyMessage::Dialed(number.clone())).is_err() {
            warn!("Recency queue closed; {} will not be excluded from redial", number);
        }
        number
    }

    /// Bulk-load the recency cache, then expire stale entries.
    ///
    /// Keys are normalized on the way in. Used to carry exclusions over a
    /// restart or to seed them from an external do-not-redial feed.
    pub fn warm_cache(&self, entries: HashMap<String, Instant>) {
        {
            let mut recent = self.recent.write();
            for (number, dialed_at) in entries {
                recent.insert(normalize_number(&number), dialed_at);
            }
        }
        expire_entries(&self.recent, self.exclude_window);
    }

    /// Whether `number` (in any formatting) is inside the exclusion window.
    pub fn is_recent(&self, number: &str) -> bool {
        self.recent.read().contains_key(&normalize_number(number))
    }

    /// Normalized numbers currently held in the recency cache.
    pub fn recent_numbers(&self) -> Vec<String> {
        self.recent.read().keys().cloned().collect()
    }

    /// Stop the recency worker and wait for it to exit.
    pub async fn shutdown(&self) {
        info!("Shutting down number manager");
        self.running.store(false, Ordering::Relaxed);
        let _ = self.queue.send(RecencyMessage::Shutdown);
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Recency worker did not exit cleanly: {}", e);
            }
        }
    }
}

fn expire_entries(recent: &RwLock<HashMap<String, Instant>>, window: Duration) {
    let mut map = recent.write();
    let before = map.len();
    map.retain(|_, dialed_at| dialed_at.elapsed() <= window);
    let removed = before - map.len();
    drop(map);
    if removed > 0 {
        debug!("Expired {} recency entries", removed);
    }
}

/// Single consumer owning the write side of the recency map.
struct RecencyWorker {
    recent: Arc<RwLock<HashMap<String, Instant>>>,
    rx: mpsc::UnboundedReceiver<RecencyMessage>,
    running: Arc<AtomicBool>,
    exclude_window: Duration,
    sweep_period: Duration,
    last_expiry: Instant,
}

impl RecencyWorker {
    async fn run(mut self) {
        while self.running.load(Ordering::Relaxed) {
            match timeout(QUEUE_RECV_TIMEOUT, self.rx.recv()).await {
                Ok(Some(RecencyMessage::Dialed(number))) => {
                    let normalized = normalize_number(&number);
                    self.recent.write().insert(normalized, Instant::now());
                    // Sweep if we haven't for a while
                    if self.last_expiry.elapsed() > self.sweep_period {
                        self.sweep();
                    }
                }
                Ok(Some(RecencyMessage::Shutdown)) | Ok(None) => {
                    info!("Exiting recency worker");
                    return;
                }
                Err(_) => {
                    // Queue idle; run the sweep opportunistically
                    self.sweep();
                }
            }
        }
    }

    fn sweep(&mut self) {
        expire_entries(&self.recent, self.exclude_window);
        self.last_expiry = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leads::generate_lead_number;
    use rand::Rng;
    use std::collections::{HashSet, VecDeque};

    const WINDOW: Duration = Duration::from_secs(5);

    /// Replays a fixed list of numbers, repeating the last one forever.
    struct ScriptedLeadSource {
        numbers: Mutex<VecDeque<String>>,
    }

    impl ScriptedLeadSource {
        fn new(numbers: &[&str]) -> Self {
            ScriptedLeadSource {
                numbers: Mutex::new(numbers.iter().map(|n| n.to_string()).collect()),
            }
        }
    }

    impl LeadSource for ScriptedLeadSource {
        fn next_number(&self) -> String {
            let mut numbers = self.numbers.lock();
            if numbers.len() > 1 {
                numbers.pop_front().unwrap()
            } else {
                numbers.front().cloned().unwrap()
            }
        }
    }

    async fn wait_until_recent(manager: &NumberManager, number: &str) {
        for _ in 0..500 {
            if manager.is_recent(number) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{number} never reached the recency cache");
    }

    #[test]
    fn normalize_strips_formatting() {
        assert_eq!(normalize_number("(212) 555-0100"), "2125550100");
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = normalize_number("(212) 555-0100");
        assert_eq!(normalize_number(&once), once);
    }

    #[test]
    fn normalize_keeps_only_digits() {
        let normalized = normalize_number("+1 (212) ext.555-0100#");
        assert!(normalized.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(normalized, "12125550100");
    }

    #[tokio::test]
    async fn get_number_returns_the_original_formatting() {
        let source = Arc::new(ScriptedLeadSource::new(&["(212) 555-0100"]));
        let manager = NumberManager::with_lead_source(source, WINDOW, WINDOW);
        assert_eq!(manager.get_number(), "(212) 555-0100");
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn duplicate_candidates_are_skipped_after_ingest() {
        let source = Arc::new(ScriptedLeadSource::new(&[
            "(212) 555-0100",
            "(212) 555-0100",
            "(212) 555-0101",
        ]));
        let manager = NumberManager::with_lead_source(source, WINDOW, WINDOW);

        assert_eq!(manager.get_number(), "(212) 555-0100");
        wait_until_recent(&manager, "(212) 555-0100").await;

        // The duplicate is ignored and the next unique number comes back
        assert_eq!(manager.get_number(), "(212) 555-0101");
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn warm_cache_expires_entries_outside_the_window() {
        let manager = NumberManager::new(WINDOW, WINDOW);
        let now = Instant::now();

        let mut entries = HashMap::new();
        let mut live = HashSet::new();
        let mut strictly_live = HashSet::new();
        while entries.len() < 100 {
            let number = generate_lead_number();
            if entries.contains_key(&number) {
                continue;
            }
            let age = rand::thread_rng().gen_range(0..=10u64);
            entries.insert(number.clone(), now - Duration::from_secs(age));
            if age <= 5 {
                live.insert(normalize_number(&number));
            }
            if age <= 4 {
                strictly_live.insert(normalize_number(&number));
            }
        }

        manager.warm_cache(entries);
        let surviving: HashSet<String> = manager.recent_numbers().into_iter().collect();

        // Nothing older than the window survives, and everything safely
        // inside the window does.
        assert!(surviving.is_subset(&live));
        assert!(strictly_live.is_subset(&surviving));
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn warm_cache_normalizes_keys() {
        let manager = NumberManager::new(WINDOW, WINDOW);
        let entries = HashMap::from([("(212) 555-0100".to_string(), Instant::now())]);
        manager.warm_cache(entries);
        assert!(manager.is_recent("2125550100"));
        assert!(manager.is_recent("(212) 555-0100"));
        manager.shutdown().await;
    }
}
