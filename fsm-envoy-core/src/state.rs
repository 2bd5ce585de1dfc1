//! Pooled state instances and the actions attached to them.

use std::fmt;
use std::sync::Arc;

use crate::engine::Context;
use crate::event::Event;
use crate::rule::StateCode;

/// User code run when a state is entered or left.
///
/// The returned event, if any, drives the next transition. Returning `None`
/// ends the chain.
///
/// Any `Fn(&mut dyn Context<D>, &Event<P>) -> Option<Event<P>>` closure is an
/// action:
///
/// ```rust
/// use fsm_envoy_core::{Context, Event, Fsm, TransitionRule};
///
/// let mut fsm: Fsm = Fsm::new(TransitionRule::new([("idle", "go", "busy")]));
/// fsm.register_exit_action("idle", |_: &mut dyn Context<()>, _: &Event| None);
/// ```
pub trait Action<D, P>: Send + Sync {
    fn apply(&self, ctx: &mut dyn Context<D>, event: &Event<P>) -> Option<Event<P>>;
}

impl<D, P, F> Action<D, P> for F
where
    F: Fn(&mut dyn Context<D>, &Event<P>) -> Option<Event<P>> + Send + Sync,
{
    fn apply(&self, ctx: &mut dyn Context<D>, event: &Event<P>) -> Option<Event<P>> {
        self(ctx, event)
    }
}

pub(crate) type SharedAction<D, P> = Arc<dyn Action<D, P>>;

/// One long-lived instance per [`StateCode`], owned by the engine's pool.
pub struct State<D = (), P = ()> {
    code: StateCode,
    entry: Option<SharedAction<D, P>>,
    exit: Option<SharedAction<D, P>>,
    data: Option<D>,
}

impl<D, P> State<D, P> {
    pub(crate) fn new(code: StateCode) -> Self {
        Self {
            code,
            entry: None,
            exit: None,
            data: None,
        }
    }

    pub fn code(&self) -> &StateCode {
        &self.code
    }

    /// A copy of the state-local data. The stored value is never handed out.
    pub fn data(&self) -> Option<D>
    where
        D: Clone,
    {
        self.data.clone()
    }

    pub fn has_entry_action(&self) -> bool {
        self.entry.is_some()
    }

    pub fn has_exit_action(&self) -> bool {
        self.exit.is_some()
    }

    pub(crate) fn set_data(&mut self, data: D) {
        self.data = Some(data);
    }

    pub(crate) fn set_entry_action(&mut self, action: SharedAction<D, P>) {
        self.entry = Some(action);
    }

    pub(crate) fn set_exit_action(&mut self, action: SharedAction<D, P>) {
        self.exit = Some(action);
    }

    pub(crate) fn entry_action(&self) -> Option<SharedAction<D, P>> {
        self.entry.clone()
    }

    pub(crate) fn exit_action(&self) -> Option<SharedAction<D, P>> {
        self.exit.clone()
    }
}

impl<D: fmt::Debug, P> fmt::Debug for State<D, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("code", &self.code)
            .field("entry", &self.entry.is_some())
            .field("exit", &self.exit.is_some())
            .field("data", &self.data)
            .finish()
    }
}
