//! The agent finite state machine.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// What an agent is currently doing.
///
/// `Offline` is the implicit state of any agent the status store has never
/// seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentState {
    /// Not logged in. The default for unknown agents.
    Offline,
    /// Logged in and waiting for a call to connect.
    Idle,
    /// On a connected call.
    Busy,
}

impl AgentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentState::Offline => "offline",
            AgentState::Idle => "idle",
            AgentState::Busy => "busy",
        }
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An allowed state change, ordered (from, to).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: AgentState,
    pub to: AgentState,
}

impl Transition {
    pub const fn new(from: AgentState, to: AgentState) -> Self {
        Transition { from, to }
    }
}

/// The legal transitions for a dialing agent.
///
/// Notably absent: `Busy -> Offline` (logout while on a call),
/// `Busy -> Busy`, `Offline -> Busy` and `Offline -> Offline`.
pub const AGENT_TRANSITIONS: &[Transition] = &[
    Transition::new(AgentState::Offline, AgentState::Idle),
    // Re-login while already idle is tolerated
    Transition::new(AgentState::Idle, AgentState::Idle),
    Transition::new(AgentState::Idle, AgentState::Busy),
    Transition::new(AgentState::Idle, AgentState::Offline),
    Transition::new(AgentState::Busy, AgentState::Idle),
];

/// A mini finite state machine controlling the state of one agent.
///
/// The machine never errors and never panics; both operations report success
/// with a `bool` and leave the current state untouched on refusal. Failed
/// transitions are non-fatal signals and the caller decides whether to log,
/// repair with [`force_set`](Self::force_set), or ignore.
pub struct DialerStateMachine {
    // Reverse lookup: to-state -> set of states it may be reached from
    transitions: HashMap<AgentState, HashSet<AgentState>>,
    current: Option<AgentState>,
}

impl DialerStateMachine {
    /// Build a machine from a transition table with no current state.
    pub fn new(transitions: &[Transition]) -> Self {
        Self::with_state(transitions, None)
    }

    /// Build a machine from a transition table and an optional initial state.
    pub fn with_state(transitions: &[Transition], start: Option<AgentState>) -> Self {
        let mut table: HashMap<AgentState, HashSet<AgentState>> = HashMap::new();
        for t in transitions {
            table.entry(t.to).or_default().insert(t.from);
        }
        DialerStateMachine {
            transitions: table,
            current: start,
        }
    }

    /// A machine over the standard [`AGENT_TRANSITIONS`] table.
    pub fn agent() -> Self {
        Self::new(AGENT_TRANSITIONS)
    }

    /// The current state, `None` until seeded.
    pub fn state(&self) -> Option<AgentState> {
        self.current
    }

    /// Seed the machine state.
    ///
    /// Succeeds only while the current state is unset; every later change has
    /// to go through [`transition`](Self::transition) or
    /// [`force_set`](Self::force_set).
    pub fn set_state(&mut self, state: AgentState) -> bool {
        if self.current.is_none() {
            self.current = Some(state);
            return true;
        }
        false
    }

    /// Attempt a transition to `next`.
    ///
    /// Returns `true` and updates the current state iff (current, next) is in
    /// the table. Otherwise the current state is unchanged.
    pub fn transition(&mut self, next: AgentState) -> bool {
        let legal = match (self.current, self.transitions.get(&next)) {
            (Some(current), Some(from_states)) => from_states.contains(&current),
            _ => false,
        };
        if legal {
            self.current = Some(next);
        }
        legal
    }

    /// Unconditionally coerce the current state.
    ///
    /// Recovery escape hatch for protocol violations. Which state to coerce
    /// to is the caller's policy, not the machine's.
    pub fn force_set(&mut self, state: AgentState) {
        self.current = Some(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATES: [AgentState; 3] = [AgentState::Offline, AgentState::Idle, AgentState::Busy];

    #[test]
    fn set_state_only_once() {
        let mut machine = DialerStateMachine::agent();
        assert_eq!(machine.state(), None);
        assert!(machine.set_state(AgentState::Offline));
        assert_eq!(machine.state(), Some(AgentState::Offline));
        assert!(!machine.set_state(AgentState::Busy));
        assert_eq!(machine.state(), Some(AgentState::Offline));
    }

    #[test]
    fn every_legal_transition_succeeds() {
        for t in AGENT_TRANSITIONS {
            let mut machine = DialerStateMachine::with_state(AGENT_TRANSITIONS, Some(t.from));
            assert!(machine.transition(t.to), "{} -> {} refused", t.from, t.to);
            assert_eq!(machine.state(), Some(t.to));
        }
    }

    #[test]
    fn every_illegal_transition_fails_without_changing_state() {
        for from in ALL_STATES {
            for to in ALL_STATES {
                if AGENT_TRANSITIONS.contains(&Transition::new(from, to)) {
                    continue;
                }
                let mut machine = DialerStateMachine::with_state(AGENT_TRANSITIONS, Some(from));
                assert!(!machine.transition(to), "{} -> {} allowed", from, to);
                assert_eq!(machine.state(), Some(from));
            }
        }
    }

    #[test]
    fn transition_from_unseeded_machine_fails() {
        let mut machine = DialerStateMachine::agent();
        assert!(!machine.transition(AgentState::Idle));
        assert_eq!(machine.state(), None);
    }

    #[test]
    fn force_set_ignores_the_table() {
        let mut machine = DialerStateMachine::with_state(AGENT_TRANSITIONS, Some(AgentState::Busy));
        machine.force_set(AgentState::Offline);
        assert_eq!(machine.state(), Some(AgentState::Offline));
    }
}
