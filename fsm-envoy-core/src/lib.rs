//! Synchronous core of fsm-envoy: the transition table and the transfer
//! engine that chains entry/exit actions.

mod engine;
mod error;
mod event;
mod rule;
mod state;

pub use engine::{Context, Fsm};
pub use error::FsmError;
pub use event::Event;
pub use rule::{EventCode, StateCode, Transition, TransitionRule};
pub use state::{Action, State};
