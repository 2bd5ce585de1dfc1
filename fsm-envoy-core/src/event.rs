//! Events fed into the machine and emitted by actions.

use crate::rule::EventCode;

/// An immutable, named occurrence with optional attached data.
///
/// Constructors return `Option<Event>`: an empty code produces `None`, which
/// the engine treats as "do not transition". Actions can therefore return
/// `Event::new(code)` directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event<P = ()> {
    code: EventCode,
    data: Option<P>,
}

impl<P> Event<P> {
    /// An event without data.
    pub fn new(code: impl Into<EventCode>) -> Option<Self> {
        Self::from_parts(code, None)
    }

    /// An event carrying `data`.
    pub fn with_data(code: impl Into<EventCode>, data: P) -> Option<Self> {
        Self::from_parts(code, Some(data))
    }

    /// An event from a code and optional data.
    pub fn from_parts(code: impl Into<EventCode>, data: Option<P>) -> Option<Self> {
        let code = code.into();
        if code.is_empty() {
            return None;
        }
        Some(Self { code, data })
    }

    pub fn code(&self) -> &EventCode {
        &self.code
    }

    /// Data attached by whoever emitted the event, untouched.
    pub fn data(&self) -> Option<&P> {
        self.data.as_ref()
    }

    pub fn into_data(self) -> Option<P> {
        self.data
    }

    pub fn into_parts(self) -> (EventCode, Option<P>) {
        (self.code, self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_code_is_no_event() {
        assert!(Event::<()>::new("").is_none());
        assert!(Event::with_data("", 7_u32).is_none());
    }

    #[test]
    fn keeps_code_and_data() {
        let event = Event::with_data("event01", vec![1, 2, 3]).unwrap();
        assert_eq!(event.code(), "event01");
        assert_eq!(event.data(), Some(&vec![1, 2, 3]));
        assert_eq!(event.into_data(), Some(vec![1, 2, 3]));

        let bare = Event::<String>::new("event02").unwrap();
        assert_eq!(bare.data(), None);
    }
}
