use crate::rule::{EventCode, StateCode};

/// Failures recorded in the engine's sticky error slot.
///
/// A `(state, event)` pair with no declared destination is not an error: it
/// is how a chain of transitions ends.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FsmError {
    /// The requested starting state does not appear in the transition rule.
    #[error("invalid starting state: {0}")]
    InvalidStartingState(StateCode),
    /// The event code labels no edge of the transition rule.
    #[error("invalid event: {0}")]
    InvalidEvent(EventCode),
    /// No starting state has been selected yet.
    #[error("current state is not set")]
    NoCurrentState,
}
