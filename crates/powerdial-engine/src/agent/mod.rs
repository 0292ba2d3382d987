//! Agent state tracking.
//!
//! An agent is a human operator the dialer keeps supplied with calls. This
//! module holds the two pieces that track what an agent is doing:
//!
//! - [`DialerStateMachine`]: a small finite state machine validating
//!   transitions between [`AgentState`] values against a fixed table.
//! - [`AgentStatusStore`]: the shared mapping from agent id to the state
//!   recorded after that agent's last completed event.
//!
//! The machine validates, the store remembers. A
//! [`PowerDialer`](crate::dialer::PowerDialer) session seeds a fresh machine
//! from the store on every event and writes the machine's state back when the
//! event handler exits.

pub mod state;
pub mod store;

pub use state::{AgentState, DialerStateMachine, Transition, AGENT_TRANSITIONS};
pub use store::AgentStatusStore;
