//! # fsm-envoy
//!
//! Table-driven finite state machines whose entry and exit actions can emit
//! follow-up events, chaining transitions without the caller's help, plus an
//! envoy that runs a machine as a single-consumer Tokio actor.
//!
//! ## Example
//!
//! ```rust
//! use fsm_envoy::{Context, Event, Fsm, TransitionRule};
//!
//! let rule = TransitionRule::new([
//!     ("state0", "event01", "state1"),
//!     ("state0", "event02", "state2"),
//!     ("state0", "event03", "state3"),
//!     ("state2", "event24", "state4"),
//!     ("state2", "event25", "state5"),
//!     ("state5", "event56", "state6"),
//!     ("state5", "event57", "state7"),
//! ]);
//!
//! let mut fsm: Fsm = Fsm::new(rule);
//! fsm.register_exit_action("state0", |_: &mut dyn Context<()>, _: &Event| Event::new("event02"))
//!     .register_entry_action("state2", |_: &mut dyn Context<()>, _: &Event| Event::new("event25"))
//!     .register_entry_action("state5", |_: &mut dyn Context<()>, _: &Event| Event::new("event56"));
//!
//! fsm.start_from("state0").transfer("event01");
//! assert_eq!(fsm.state_code().map(|code| code.as_str()), Some("state6"));
//! ```

mod config;
mod envoy;
mod error;

pub use crate::config::{EnvoyConfig, ShutdownMode};
pub use crate::envoy::{AsyncFsm, Envoy, EnvoyTask, Snapshot};
pub use crate::error::EnvoyError;
#[doc(inline)]
pub use fsm_envoy_core::{
    Action, Context, Event, EventCode, Fsm, FsmError, State, StateCode, Transition, TransitionRule,
};
