//! Shared agent status storage.

use dashmap::DashMap;

use super::state::AgentState;

/// Mapping from agent id to the agent's current [`AgentState`].
///
/// Lookups for unknown agents return [`AgentState::Offline`] without
/// inserting anything. Writes are last-writer-wins per key; there is no
/// cross-key consistency and none is needed, since each agent's events are
/// serialized by the event source.
///
/// Agent status is volatile by design. A production deployment would put
/// this in a shared volatile KV store; a process-wide map stands in for it
/// here.
pub struct AgentStatusStore {
    agents: DashMap<String, AgentState>,
}

impl AgentStatusStore {
    pub fn new() -> Self {
        AgentStatusStore {
            agents: DashMap::new(),
        }
    }

    /// Current state for `agent_id`, defaulting to `Offline` for agents that
    /// have never been stored.
    pub fn get(&self, agent_id: &str) -> AgentState {
        self.agents
            .get(agent_id)
            .map(|entry| *entry.value())
            .unwrap_or(AgentState::Offline)
    }

    /// Record the state for `agent_id`.
    pub fn set(&self, agent_id: &str, state: AgentState) {
        self.agents.insert(agent_id.to_string(), state);
    }

    /// Number of agents with a recorded state.
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Drop every recorded state. Test support.
    pub fn flush(&self) {
        self.agents.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_agent_is_offline() {
        let store = AgentStatusStore::new();
        assert_eq!(store.get("nobody"), AgentState::Offline);
        // The default lookup must not create an entry
        assert!(store.is_empty());
    }

    #[test]
    fn set_then_get() {
        let store = AgentStatusStore::new();
        store.set("agent_0001", AgentState::Idle);
        assert_eq!(store.get("agent_0001"), AgentState::Idle);
        store.set("agent_0001", AgentState::Busy);
        assert_eq!(store.get("agent_0001"), AgentState::Busy);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn flush_empties_the_store() {
        let store = AgentStatusStore::new();
        store.set("agent_0001", AgentState::Idle);
        store.set("agent_0002", AgentState::Busy);
        store.flush();
        assert!(store.is_empty());
        assert_eq!(store.get("agent_0001"), AgentState::Offline);
    }
}
