//! # powerdial-engine
//!
//! A predictive outbound dialing engine. The dialer keeps telephone agents
//! utilised by placing more calls than there are idle agents: for each idle
//! agent it initiates `dial_ratio` calls at once, expecting most to fail,
//! so that the calls which do connect roughly match the agents available to
//! take them. Failed calls are replaced immediately; a connected call makes
//! the agent busy and suppresses dialing until it ends.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                  DialerEngine                    │
//! │  ┌───────────────┐  ┌──────────────────────────┐ │
//! │  │ AgentStatus   │  │ NumberManager            │ │
//! │  │ Store         │  │  recency map + worker    │ │
//! │  └───────────────┘  └──────────────────────────┘ │
//! │  ┌───────────────────────────────────────────┐   │
//! │  │ CallMetricsRecorder                       │   │
//! │  │  in-flight map → queue → CallRecordStore  │   │
//! │  └───────────────────────────────────────────┘   │
//! └──────────────────────────────────────────────────┘
//!            │ session(agent_id)
//!   ┌────────▼────────┐
//!   │   PowerDialer   │  on_agent_login / on_agent_logout /
//!   │  (one agent)    │  on_call_started / on_call_failed /
//!   └─────────────────┘  on_call_ended
//! ```
//!
//! Each [`PowerDialer`](dialer::PowerDialer) session validates the agent's
//! lifecycle against a fixed state machine, asks the
//! [`NumberManager`](numbers::NumberManager) for numbers that were not
//! dialed within the exclusion window, performs the outbound
//! [`dial`](leads::dial) side effect, and records call start and end into
//! the [`CallMetricsRecorder`](metrics::CallMetricsRecorder), whose worker
//! persists completed records to SQLite.
//!
//! ## Example
//!
//! ```no_run
//! use powerdial_engine::prelude::*;
//!
//! # async fn example() -> powerdial_engine::error::Result<()> {
//! let engine = DialerEngine::new(DialerConfig::default()).await?;
//!
//! let mut session = engine.session("agent_0001");
//! session.on_agent_login();
//! println!("dialed on login: {:?}", session.numbers);
//!
//! engine.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod dialer;
pub mod error;
pub mod leads;
pub mod metrics;
pub mod numbers;

pub use agent::{AgentState, AgentStatusStore, DialerStateMachine};
pub use config::DialerConfig;
pub use dialer::{DialerEngine, PowerDialer};
pub use error::{DialerError, Result};
pub use leads::{LeadSource, RandomLeadSource};
pub use metrics::{AgentCallReport, CallMetricsRecorder, CallRecord};
pub use numbers::NumberManager;

/// Commonly used types in one import.
pub mod prelude {
    pub use crate::agent::{AgentState, AgentStatusStore, DialerStateMachine, AGENT_TRANSITIONS};
    pub use crate::config::DialerConfig;
    pub use crate::dialer::{DialerEngine, PowerDialer};
    pub use crate::error::{DialerError, Result};
    pub use crate::leads::{generate_lead_number, LeadSource, RandomLeadSource};
    pub use crate::metrics::{AgentCallReport, CallMetricsRecorder, CallRecord};
    pub use crate::numbers::{normalize_number, NumberManager};
}
