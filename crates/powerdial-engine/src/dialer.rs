//! The power dialer: per-agent event handling over the shared services.
//!
//! [`DialerEngine`] is the composition root. It owns the agent status store,
//! the number manager and the call metrics recorder, and hands out
//! short-lived [`PowerDialer`] sessions. Keeping the services explicit (no
//! process-wide singletons) is what lets tests run in parallel with
//! independent engines.
//!
//! A [`PowerDialer`] handles the five lifecycle events for one agent:
//! login, logout, call started, call failed, call ended. The dialing policy
//! is happy-eyes: on login and on call end it initiates `dial_ratio` calls
//! at once, betting that most fail; each failure while the agent is idle is
//! replaced one for one. If two calls connect, the first one wins the agent
//! and the second comes back through the failed path.
//!
//! Every event, however it exits, writes the session's state back to the
//! status store. Handler errors are logged and swallowed; no event ever
//! fails into the caller. Production would surface them through monitoring.

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::agent::{AgentState, AgentStatusStore, DialerStateMachine};
use crate::config::DialerConfig;
use crate::error::{DialerError, Result};
use crate::leads::{dial, LeadSource};
use crate::metrics::storage::CallRecordStore;
use crate::metrics::CallMetricsRecorder;
use crate::numbers::NumberManager;

/// Shared services behind every [`PowerDialer`] session.
pub struct DialerEngine {
    config: DialerConfig,
    status_store: Arc<AgentStatusStore>,
    number_manager: Arc<NumberManager>,
    call_metrics: Arc<CallMetricsRecorder>,
    record_store: CallRecordStore,
}

impl DialerEngine {
    /// Create an engine with the synthetic random lead source.
    pub async fn new(config: DialerConfig) -> Result<Self> {
        let number_manager = Arc::new(NumberManager::new(
            config.call_exclude_window,
            config.expiry_sweep_period,
        ));
        Self::build(config, number_manager).await
    }

    /// Create an engine over a custom lead source.
    pub async fn with_lead_source(
        config: DialerConfig,
        lead_source: Arc<dyn LeadSource>,
    ) -> Result<Self> {
        let number_manager = Arc::new(NumberManager::with_lead_source(
            lead_source,
            config.call_exclude_window,
            config.expiry_sweep_period,
        ));
        Self::build(config, number_manager).await
    }

    async fn build(config: DialerConfig, number_manager: Arc<NumberManager>) -> Result<Self> {
        let record_store = match config.database_path.as_deref() {
            Some(path) => CallRecordStore::new(path).await,
            None => CallRecordStore::new_in_memory().await,
        }
        .map_err(|e| DialerError::database(e.to_string()))?;

        let call_metrics = Arc::new(CallMetricsRecorder::new(record_store.clone()));

        info!("Dialer engine ready (dial ratio {})", config.dial_ratio);
        Ok(DialerEngine {
            config,
            status_store: Arc::new(AgentStatusStore::new()),
            number_manager,
            call_metrics,
            record_store,
        })
    }

    /// Open an event-handling session for one agent.
    ///
    /// Sessions are cheap; the event source typically opens a fresh one per
    /// event. The session loads the agent's current state here and saves it
    /// back after every event.
    pub fn session(&self, agent_id: impl Into<String>) -> PowerDialer {
        let agent_id = agent_id.into();
        let mut machine = DialerStateMachine::agent();
        machine.set_state(self.status_store.get(&agent_id));
        PowerDialer {
            agent_id,
            dial_ratio: self.config.dial_ratio,
            machine,
            numbers: Vec::new(),
            status_store: Arc::clone(&self.status_store),
            number_manager: Arc::clone(&self.number_manager),
            call_metrics: Arc::clone(&self.call_metrics),
        }
    }

    pub fn config(&self) -> &DialerConfig {
        &self.config
    }

    pub fn status_store(&self) -> &Arc<AgentStatusStore> {
        &self.status_store
    }

    pub fn number_manager(&self) -> &Arc<NumberManager> {
        &self.number_manager
    }

    pub fn call_metrics(&self) -> &Arc<CallMetricsRecorder> {
        &self.call_metrics
    }

    /// Direct access to the persisted call log, for reporting.
    pub fn record_store(&self) -> &CallRecordStore {
        &self.record_store
    }

    /// Stop the background workers, draining their queues first.
    pub async fn shutdown(&self) {
        info!("Shutting down dialer engine");
        self.call_metrics.shutdown().await;
        self.number_manager.shutdown().await;
    }
}

/// Event handler for a single agent.
///
/// Events for one agent are serialized by the event source; sessions for
/// different agents run concurrently against the shared services.
pub struct PowerDialer {
    agent_id: String,
    dial_ratio: usize,
    machine: DialerStateMachine,
    /// Numbers dialed during this session, in order. The audit trail the
    /// driving harness reads to learn what was dialed.
    pub numbers: Vec<String>,
    status_store: Arc<AgentStatusStore>,
    number_manager: Arc<NumberManager>,
    call_metrics: Arc<CallMetricsRecorder>,
}

impl PowerDialer {
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// The session's view of the agent state.
    pub fn state(&self) -> AgentState {
        // The machine is seeded at construction, so it always has a state
        self.machine.state().unwrap_or(AgentState::Offline)
    }

    /// The agent logged in and is ready for calls.
    pub fn on_agent_login(&mut self) {
        let result = self.handle_login();
        self.finish("on_agent_login", result);
    }

    /// The agent logged out. Always wins, even mid-call.
    pub fn on_agent_logout(&mut self) {
        let result = self.handle_logout();
        self.finish("on_agent_logout", result);
    }

    /// A dialed call connected to the agent.
    pub fn on_call_started(&mut self, number: &str) {
        let result = self.handle_call_started(number);
        self.finish("on_call_started", result);
    }

    /// A dialed call failed before connecting.
    pub fn on_call_failed(&mut self, number: &str) {
        let result = self.handle_call_failed(number);
        self.finish("on_call_failed", result);
    }

    /// The agent's connected call hung up.
    pub fn on_call_ended(&mut self, number: &str) {
        let result = self.handle_call_ended(number);
        self.finish("on_call_ended", result);
    }

    // Single exit point for every event: failures are logged and swallowed,
    // and the state is written back no matter how the handler went.
    fn finish(&mut self, event: &str, result: Result<()>) {
        if let Err(e) = result {
            error!("Agent {}: {} failed: {}", self.agent_id, event, e);
        }
        self.status_store.set(&self.agent_id, self.state());
    }

    fn handle_login(&mut self) -> Result<()> {
        if !self.machine.transition(AgentState::Idle) {
            warn!("Attempt to login when agent {} already logged in", self.agent_id);
        }
        for _ in 0..self.dial_ratio {
            self.initiate_call();
        }
        Ok(())
    }

    fn handle_logout(&mut self) -> Result<()> {
        if !self.machine.transition(AgentState::Offline) {
            // Should never happen; offline the agent anyway
            warn!("Agent {} attempted to logout while a call was active", self.agent_id);
            self.machine.force_set(AgentState::Offline);
        }
        Ok(())
    }

    fn handle_call_started(&mut self, number: &str) -> Result<()> {
        info!("Call start for {} to {}", self.agent_id, number);
        if self.state() != AgentState::Idle {
            // They are already on the call; repair and carry on
            warn!(
                "Agent {} started call to {} when not idle",
                self.agent_id, number
            );
            self.machine.force_set(AgentState::Idle);
        }
        self.call_metrics.call_started(&self.agent_id, number);
        self.machine.transition(AgentState::Busy);
        Ok(())
    }

    fn handle_call_failed(&mut self, number: &str) -> Result<()> {
        info!("Call failed for {} to {}", self.agent_id, number);
        if self.state() == AgentState::Idle {
            // The agent is still free; replace the failed call
            self.initiate_call();
        }
        // While busy the failure is a sibling dial we accept losing
        Ok(())
    }

    fn handle_call_ended(&mut self, number: &str) -> Result<()> {
        info!("Call ended for {} to {}", self.agent_id, number);
        if self.state() != AgentState::Busy {
            warn!(
                "Call ended for agent {}, but agent was not on a call",
                self.agent_id
            );
            // Repair to idle so the record below lands on a consistent state
            self.machine.force_set(AgentState::Idle);
        }
        self.machine.transition(AgentState::Idle);
        self.call_metrics.call_ended(&self.agent_id, number)?;

        // The agent is free again; there is a small window where one of
        // these connects while earlier siblings are still in flight, but we
        // are optimising utilisation and the extras fail back around.
        for _ in 0..self.dial_ratio {
            self.initiate_call();
        }
        Ok(())
    }

    // Get a lead and initiate a call
    fn initiate_call(&mut self) {
        let number = self.number_manager.get_number();
        self.numbers.push(number.clone());
        dial(&self.agent_id, &number);
    }
}
