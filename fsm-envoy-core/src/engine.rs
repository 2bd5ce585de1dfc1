//! The synchronous transfer engine.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::error::FsmError;
use crate::event::Event;
use crate::rule::{EventCode, StateCode, TransitionRule};
use crate::state::{Action, State};

/// What an action may touch while it runs: the data of whichever state is
/// current at that moment.
///
/// Exit actions see the state being left, entry actions the state being
/// entered.
pub trait Context<D> {
    /// Replaces the current state's data.
    fn write_into_current_state(&mut self, data: D);

    /// A copy of the current state's data.
    fn read_from_current_state(&mut self) -> Option<D>;

    fn current_state(&self) -> Option<&StateCode>;
}

/// A finite state machine driven by a [`TransitionRule`].
///
/// Every state named by the rule gets exactly one [`State`] instance when the
/// machine is built; transitions move a cursor between those instances.
/// Failures are recorded in a sticky slot read through [`Fsm::error`]
/// instead of being returned.
///
/// ```rust
/// use fsm_envoy_core::{Context, Event, Fsm, TransitionRule};
///
/// let rule = TransitionRule::new([
///     ("state0", "event01", "state1"),
///     ("state0", "event02", "state2"),
///     ("state2", "event25", "state5"),
/// ]);
///
/// let mut fsm: Fsm = Fsm::new(rule);
/// fsm.register_exit_action("state0", |_: &mut dyn Context<()>, _: &Event| {
///     Event::new("event02")
/// })
/// .register_entry_action("state2", |_: &mut dyn Context<()>, _: &Event| {
///     Event::new("event25")
/// });
///
/// let state = fsm.start_from("state0").transfer("event01").state_code();
/// assert_eq!(state.map(|code| code.as_str()), Some("state5"));
/// ```
pub struct Fsm<D = (), P = ()> {
    states: HashMap<StateCode, State<D, P>>,
    rule: Arc<TransitionRule>,
    current: Option<StateCode>,
    err: Option<FsmError>,
}

impl<D, P> Fsm<D, P> {
    /// Builds the machine and its state pool. No state is current until
    /// [`Fsm::start_from`] is called.
    pub fn new(rule: impl Into<Arc<TransitionRule>>) -> Self {
        let rule = rule.into();
        let states = rule
            .states()
            .map(|code| (code.clone(), State::new(code.clone())))
            .collect();
        Self {
            states,
            rule,
            current: None,
            err: None,
        }
    }

    /// Attaches (or replaces) the action run when `state` is entered.
    /// Unknown states are ignored.
    pub fn register_entry_action<A>(&mut self, state: impl Into<StateCode>, action: A) -> &mut Self
    where
        A: Action<D, P> + 'static,
    {
        let state = state.into();
        match self.states.get_mut(&state) {
            Some(instance) => instance.set_entry_action(Arc::new(action)),
            None => trace!(%state, "ignoring entry action for unknown state"),
        }
        self
    }

    /// Attaches (or replaces) the action run when `state` is left.
    /// Unknown states are ignored.
    pub fn register_exit_action<A>(&mut self, state: impl Into<StateCode>, action: A) -> &mut Self
    where
        A: Action<D, P> + 'static,
    {
        let state = state.into();
        match self.states.get_mut(&state) {
            Some(instance) => instance.set_exit_action(Arc::new(action)),
            None => trace!(%state, "ignoring exit action for unknown state"),
        }
        self
    }

    /// Selects the starting state. An unknown state records
    /// [`FsmError::InvalidStartingState`] and leaves the current state alone.
    pub fn start_from(&mut self, state: impl Into<StateCode>) -> &mut Self {
        let state = state.into();
        if self.states.contains_key(&state) {
            self.current = Some(state);
        } else {
            self.fail(FsmError::InvalidStartingState(state));
        }
        self
    }

    /// The current state instance, if a starting state was selected.
    pub fn state(&self) -> Option<&State<D, P>> {
        self.current.as_ref().and_then(|code| self.states.get(code))
    }

    pub fn state_code(&self) -> Option<&StateCode> {
        self.current.as_ref()
    }

    /// Looks up any pooled instance, current or not.
    pub fn state_instance(&self, code: &StateCode) -> Option<&State<D, P>> {
        self.states.get(code)
    }

    /// The last recorded failure. It stays until another failure replaces it
    /// or [`Fsm::take_error`] clears it.
    pub fn error(&self) -> Option<&FsmError> {
        self.err.as_ref()
    }

    pub fn take_error(&mut self) -> Option<FsmError> {
        self.err.take()
    }

    pub fn rule(&self) -> &TransitionRule {
        &self.rule
    }

    fn fail(&mut self, err: FsmError) {
        warn!(error = %err, "fsm operation failed");
        self.err = Some(err);
    }

    /// Destination of `event` from the current state, when it leads somewhere
    /// else.
    fn successor(&self, event: &Event<P>) -> Option<StateCode> {
        let current = self.current.as_ref()?;
        let next = self.rule.find_successor(current, event.code());
        (next != current).then(|| next.clone())
    }
}

impl<D: Clone, P> Fsm<D, P> {
    /// Fires `event` without data. See [`Fsm::transfer_event`].
    pub fn transfer(&mut self, event: impl Into<EventCode>) -> &mut Self {
        self.transfer_event(event.into(), None)
    }

    /// Fires `event` carrying `data`. See [`Fsm::transfer_event`].
    pub fn transfer_with_data(&mut self, event: impl Into<EventCode>, data: P) -> &mut Self {
        self.transfer_event(event.into(), Some(data))
    }

    /// Runs the transfer loop for one external event.
    ///
    /// While the event routes the current state somewhere else:
    /// the current state's exit action runs first and may swap in a new
    /// event (if the new event routes nowhere the loop stops without
    /// moving); the machine then moves to the destination and that state's
    /// entry action supplies the event for the next round. A state without
    /// an entry action ends the chain.
    ///
    /// Chains are not bounded. A cyclic table whose actions always emit
    /// loops forever.
    pub fn transfer_event(&mut self, code: EventCode, data: Option<P>) -> &mut Self {
        if !self.rule.valid_event(&code) {
            self.fail(FsmError::InvalidEvent(code));
            return self;
        }
        if self.current.is_none() {
            self.fail(FsmError::NoCurrentState);
            return self;
        }

        let mut hops = 0_usize;
        let mut pending = Event::from_parts(code, data);
        while let Some(mut event) = pending.take() {
            if self.successor(&event).is_none() {
                break;
            }

            if let Some(exit) = self.state().and_then(State::exit_action) {
                trace!(state = ?self.current, event = %event.code(), "running exit action");
                if let Some(emitted) = exit.apply(self, &event) {
                    event = emitted;
                }
            }

            let Some(next) = self.successor(&event) else {
                trace!(event = %event.code(), "exit action emitted an event with no route");
                break;
            };
            debug!(from = ?self.current, to = %next, event = %event.code(), "state transition");
            self.current = Some(next);
            hops += 1;

            pending = match self.state().and_then(State::entry_action) {
                Some(entry) => {
                    trace!(state = ?self.current, event = %event.code(), "running entry action");
                    entry.apply(self, &event)
                }
                None => None,
            };
        }

        trace!(hops, state = ?self.current, "transfer settled");
        self
    }
}

impl<D: Clone, P> Context<D> for Fsm<D, P> {
    fn write_into_current_state(&mut self, data: D) {
        let Some(code) = self.current.as_ref() else {
            self.fail(FsmError::NoCurrentState);
            return;
        };
        if let Some(state) = self.states.get_mut(code) {
            state.set_data(data);
        }
    }

    fn read_from_current_state(&mut self) -> Option<D> {
        let Some(code) = self.current.as_ref() else {
            self.fail(FsmError::NoCurrentState);
            return None;
        };
        self.states.get(code).and_then(State::data)
    }

    fn current_state(&self) -> Option<&StateCode> {
        self.current.as_ref()
    }
}

impl<D: fmt::Debug, P> fmt::Debug for Fsm<D, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fsm")
            .field("current", &self.current)
            .field("states", &self.states.len())
            .field("err", &self.err)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn rule() -> TransitionRule {
        TransitionRule::new([
            ("state0", "event01", "state1"),
            ("state0", "event02", "state2"),
            ("state0", "event03", "state3"),
            ("state2", "event24", "state4"),
            ("state2", "event25", "state5"),
            ("state5", "event56", "state6"),
            ("state5", "event57", "state7"),
        ])
    }

    fn emit(code: &'static str) -> impl Fn(&mut dyn Context<u32>, &Event) -> Option<Event> {
        move |_, _| Event::new(code)
    }

    fn code(fsm: &Fsm<u32>) -> &str {
        fsm.state_code().map(StateCode::as_str).unwrap_or_default()
    }

    #[test]
    fn plain_transfer() {
        let mut fsm: Fsm<u32> = Fsm::new(rule());
        fsm.start_from("state0").transfer("event01");
        assert_eq!(code(&fsm), "state1");
        assert_eq!(fsm.error(), None);
    }

    #[test]
    fn unknown_starting_state_is_recorded() {
        let mut fsm: Fsm<u32> = Fsm::new(rule());
        fsm.start_from("state9");
        assert_eq!(fsm.error(), Some(&FsmError::InvalidStartingState("state9".into())));
        assert!(fsm.state().is_none());

        fsm.start_from("state2").start_from("state9");
        assert_eq!(code(&fsm), "state2");
    }

    #[test]
    fn invalid_event_leaves_state_unchanged() {
        let mut fsm: Fsm<u32> = Fsm::new(rule());
        fsm.start_from("state0").transfer("event99");
        assert_eq!(code(&fsm), "state0");
        assert_eq!(fsm.error(), Some(&FsmError::InvalidEvent("event99".into())));
    }

    #[test]
    fn rule_is_shared_with_the_engine() {
        let rule = Arc::new(rule());
        let fsm: Fsm<u32> = Fsm::new(rule.clone());

        assert!(std::ptr::eq(fsm.rule(), rule.as_ref()));
        assert_eq!(fsm.rule().len(), 7);
        assert_eq!(fsm.rule().states().count(), 8);
        assert!(fsm.rule().valid_event(&"event57".into()));
        assert!(!fsm.rule().valid_event(&"event99".into()));
    }

    #[test]
    fn transfer_without_starting_state() {
        let mut fsm: Fsm<u32> = Fsm::new(rule());
        fsm.transfer("event01");
        assert_eq!(fsm.error(), Some(&FsmError::NoCurrentState));
    }

    #[test]
    fn invalid_event_is_checked_before_current_state() {
        let mut fsm: Fsm<u32> = Fsm::new(rule());
        fsm.transfer("event99");
        assert_eq!(fsm.error(), Some(&FsmError::InvalidEvent("event99".into())));
    }

    #[test]
    fn error_is_sticky_until_taken() {
        let mut fsm: Fsm<u32> = Fsm::new(rule());
        fsm.start_from("state0").transfer("event99").transfer("event01");
        assert_eq!(code(&fsm), "state1");
        assert_eq!(fsm.error(), Some(&FsmError::InvalidEvent("event99".into())));

        assert!(fsm.take_error().is_some());
        assert_eq!(fsm.error(), None);
    }

    #[test]
    fn unrouted_event_keeps_the_same_instance() {
        let mut fsm: Fsm<u32> = Fsm::new(rule());
        fsm.start_from("state1");
        let before: *const State<u32> = fsm.state().unwrap();

        fsm.transfer("event01");
        let after: *const State<u32> = fsm.state().unwrap();

        assert!(std::ptr::eq(before, after));
        assert_eq!(fsm.error(), None);
    }

    #[test]
    fn actions_chain_transitions() {
        let exits = Arc::new(AtomicUsize::new(0));
        let entries = Arc::new(AtomicUsize::new(0));

        let mut fsm: Fsm<u32> = Fsm::new(rule());
        let counter = exits.clone();
        fsm.register_exit_action("state0", move |_: &mut dyn Context<u32>, _: &Event| {
            counter.fetch_add(1, Ordering::SeqCst);
            Event::new("event02")
        });
        let counter = entries.clone();
        fsm.register_entry_action("state2", move |_: &mut dyn Context<u32>, _: &Event| {
            counter.fetch_add(1, Ordering::SeqCst);
            Event::new("event25")
        });

        fsm.start_from("state0").transfer("event01");

        assert_eq!(code(&fsm), "state5");
        assert_eq!(exits.load(Ordering::SeqCst), 1);
        assert_eq!(entries.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn exit_event_without_route_aborts() {
        let mut fsm: Fsm<u32> = Fsm::new(rule());
        fsm.register_exit_action("state0", emit("event24"))
            .register_entry_action("state1", emit("event99"));

        fsm.start_from("state0").transfer("event01");

        assert_eq!(code(&fsm), "state0");
        assert_eq!(fsm.error(), None);
    }

    #[test]
    fn silent_entry_action_stops_the_chain() {
        let mut fsm: Fsm<u32> = Fsm::new(TransitionRule::new([
            ("a", "next", "b"),
            ("b", "next", "c"),
        ]));
        fsm.register_entry_action("b", |_: &mut dyn Context<u32>, _: &Event| None);

        fsm.start_from("a").transfer("next");
        assert_eq!(code(&fsm), "b");
    }

    #[test]
    fn state_without_entry_action_stops_the_chain() {
        let mut fsm: Fsm<u32> = Fsm::new(TransitionRule::new([
            ("a", "next", "b"),
            ("b", "next", "c"),
        ]));
        fsm.start_from("a").transfer("next");
        assert_eq!(code(&fsm), "b");
    }

    #[test]
    fn exit_action_sees_the_state_being_left() {
        let mut fsm: Fsm<u32> = Fsm::new(rule());
        fsm.register_exit_action("state0", |ctx: &mut dyn Context<u32>, _: &Event| {
            assert_eq!(ctx.current_state().map(StateCode::as_str), Some("state0"));
            ctx.write_into_current_state(10);
            None
        })
        .register_entry_action("state1", |ctx: &mut dyn Context<u32>, _: &Event| {
            assert_eq!(ctx.current_state().map(StateCode::as_str), Some("state1"));
            ctx.write_into_current_state(11);
            None
        });

        fsm.start_from("state0").transfer("event01");

        assert_eq!(fsm.state_instance(&"state0".into()).and_then(State::data), Some(10));
        assert_eq!(fsm.state().and_then(State::data), Some(11));
    }

    #[test]
    fn entry_action_counts_visits() {
        let mut fsm: Fsm<u32> = Fsm::new(TransitionRule::new([
            ("idle", "start", "busy"),
            ("busy", "finish", "idle"),
        ]));
        fsm.register_entry_action("busy", |ctx: &mut dyn Context<u32>, _: &Event| {
            let visits = ctx.read_from_current_state().unwrap_or_default();
            ctx.write_into_current_state(visits + 1);
            None
        });

        fsm.start_from("idle");
        for _ in 0..3 {
            fsm.transfer("start").transfer("finish");
        }

        assert_eq!(code(&fsm), "idle");
        assert_eq!(fsm.state_instance(&"busy".into()).and_then(State::data), Some(3));
    }

    #[test]
    fn event_data_reaches_actions() {
        let mut fsm: Fsm<(), String> = Fsm::new(rule());
        fsm.register_exit_action("state0", |_: &mut dyn Context<()>, event: &Event<String>| {
            let from = event.data().cloned().unwrap_or_default();
            Event::with_data("event02", format!("{from} via state0"))
        })
        .register_entry_action("state2", |_: &mut dyn Context<()>, event: &Event<String>| {
            assert_eq!(event.data().map(String::as_str), Some("external via state0"));
            None
        });

        fsm.start_from("state0")
            .transfer_with_data("event01", "external".to_owned());

        assert_eq!(fsm.state_code().map(StateCode::as_str), Some("state2"));
    }

    #[test]
    fn context_without_current_state_records_error() {
        let mut fsm: Fsm<u32> = Fsm::new(rule());
        fsm.write_into_current_state(1);
        assert_eq!(fsm.error(), Some(&FsmError::NoCurrentState));
        fsm.take_error();
        assert_eq!(fsm.read_from_current_state(), None);
        assert_eq!(fsm.error(), Some(&FsmError::NoCurrentState));
    }

    #[test]
    fn registering_on_unknown_state_is_ignored() {
        let mut fsm: Fsm<u32> = Fsm::new(rule());
        fsm.register_entry_action("state9", emit("event01"));
        assert!(fsm.state_instance(&"state9".into()).is_none());
        assert_eq!(fsm.error(), None);
    }
}
