//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of calls initiated per idle agent per triggering event.
pub const DEFAULT_DIAL_RATIO: usize = 2;

/// Default minimum time before a normalized number may be redialed.
pub const DEFAULT_CALL_EXCLUDE_WINDOW: Duration = Duration::from_secs(60);

/// Default minimum interval between forced recency-map sweeps.
pub const DEFAULT_EXPIRY_SWEEP_PERIOD: Duration = Duration::from_secs(60);

/// Configuration for a [`DialerEngine`](crate::dialer::DialerEngine).
///
/// The dial ratio is the happy-eyes bet: for each idle agent that many calls
/// are initiated at once, expecting most of them to fail. Raising it improves
/// agent utilisation at the cost of more abandoned calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialerConfig {
    /// Calls initiated per idle agent per triggering event.
    pub dial_ratio: usize,

    /// Minimum time before a normalized number may be redialed.
    pub call_exclude_window: Duration,

    /// Minimum interval between forced sweeps of the recency map.
    pub expiry_sweep_period: Duration,

    /// Path of the SQLite call record database. `None` uses an in-memory
    /// database, which is discarded on shutdown.
    pub database_path: Option<String>,
}

impl Default for DialerConfig {
    fn default() -> Self {
        DialerConfig {
            dial_ratio: DEFAULT_DIAL_RATIO,
            call_exclude_window: DEFAULT_CALL_EXCLUDE_WINDOW,
            expiry_sweep_period: DEFAULT_EXPIRY_SWEEP_PERIOD,
            database_path: None,
        }
    }
}

impl DialerConfig {
    /// Create a configuration with the stock defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the dial ratio.
    pub fn with_dial_ratio(mut self, dial_ratio: usize) -> Self {
        self.dial_ratio = dial_ratio;
        self
    }

    /// Set the redial exclusion window.
    pub fn with_call_exclude_window(mut self, window: Duration) -> Self {
        self.call_exclude_window = window;
        self
    }

    /// Set the recency sweep period.
    pub fn with_expiry_sweep_period(mut self, period: Duration) -> Self {
        self.expiry_sweep_period = period;
        self
    }

    /// Set the call record database path.
    pub fn with_database_path(mut self, path: impl Into<String>) -> Self {
        self.database_path = Some(path.into());
        self
    }
}
