//! Transition table: `(state, event) -> state`.

use std::borrow::Borrow;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

macro_rules! code_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name(String);

        impl $name {
            /// Creates a new code from anything string-like.
            pub fn new(code: impl Into<String>) -> Self {
                Self(code.into())
            }

            /// Returns the code as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns `true` if the code is the empty string.
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(code: &str) -> Self {
                Self(code.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(code: String) -> Self {
                Self(code)
            }
        }

        impl From<&$name> for $name {
            fn from(code: &$name) -> Self {
                code.clone()
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }
    };
}

code_type! {
    /// Identifier of a state. Compared by value.
    StateCode
}

code_type! {
    /// Identifier of an event. Compared by value.
    EventCode
}

/// One declared edge of the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// State the edge leaves.
    pub src: StateCode,
    /// Event that triggers the edge.
    pub event: EventCode,
    /// State the edge enters.
    pub dst: StateCode,
}

impl Transition {
    /// Declares `src --event--> dst`.
    pub fn new(
        src: impl Into<StateCode>,
        event: impl Into<EventCode>,
        dst: impl Into<StateCode>,
    ) -> Self {
        Self {
            src: src.into(),
            event: event.into(),
            dst: dst.into(),
        }
    }
}

impl<S, E, D> From<(S, E, D)> for Transition
where
    S: Into<StateCode>,
    E: Into<EventCode>,
    D: Into<StateCode>,
{
    fn from((src, event, dst): (S, E, D)) -> Self {
        Self::new(src, event, dst)
    }
}

/// Immutable lookup table built once from a list of [`Transition`]s.
///
/// Registering the same `(state, event)` pair twice keeps the last
/// destination.
#[derive(Debug, Clone, Default)]
pub struct TransitionRule {
    rule: HashMap<StateCode, HashMap<EventCode, StateCode>>,
    states: BTreeSet<StateCode>,
    events: BTreeSet<EventCode>,
}

impl TransitionRule {
    /// Builds the table by folding over `transitions` in order.
    pub fn new<I, T>(transitions: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Transition>,
    {
        transitions
            .into_iter()
            .map(Into::into)
            .fold(Self::default(), |mut rule, transition| {
                rule.register(transition);
                rule
            })
    }

    fn register(&mut self, transition: Transition) {
        let Transition { src, event, dst } = transition;
        self.states.insert(src.clone());
        self.states.insert(dst.clone());
        self.events.insert(event.clone());
        self.rule.entry(src).or_default().insert(event, dst);
    }

    /// Resolves the destination of `event` fired in `state`.
    ///
    /// When the pair is unmapped the very reference passed in as `state` is
    /// handed back. Callers detect "no transition" by comparing the result
    /// against the source, so an unknown pair always reads as a self-loop.
    pub fn find_successor<'a>(&'a self, state: &'a StateCode, event: &EventCode) -> &'a StateCode {
        self.rule
            .get(state)
            .and_then(|edges| edges.get(event))
            .unwrap_or(state)
    }

    /// Returns `true` if `state` appears as a source or destination.
    pub fn valid_state(&self, state: &StateCode) -> bool {
        self.states.contains(state)
    }

    /// Returns `true` if `event` labels at least one edge.
    pub fn valid_event(&self, event: &EventCode) -> bool {
        self.events.contains(event)
    }

    /// Every state mentioned by the table, in sorted order.
    pub fn states(&self) -> impl Iterator<Item = &StateCode> {
        self.states.iter()
    }

    /// Every event mentioned by the table, in sorted order.
    pub fn events(&self) -> impl Iterator<Item = &EventCode> {
        self.events.iter()
    }

    /// Outgoing edges declared for `state` as `(event, destination)` pairs.
    pub fn successors<'a>(
        &'a self,
        state: &StateCode,
    ) -> impl Iterator<Item = (&'a EventCode, &'a StateCode)> + use<'a> {
        self.rule.get(state).into_iter().flat_map(|edges| edges.iter())
    }

    /// Number of distinct `(state, event)` edges.
    pub fn len(&self) -> usize {
        self.rule.values().map(HashMap::len).sum()
    }

    /// Returns `true` if no edge was declared.
    pub fn is_empty(&self) -> bool {
        self.rule.is_empty()
    }
}

impl<T: Into<Transition>> FromIterator<T> for TransitionRule {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::new(iter)
    }
}
