//! Envoy configuration.

/// How the run loop treats events still queued when it is told to stop.
///
/// An event already being transferred always finishes first; a stop request
/// is only observed between events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShutdownMode {
    /// Drain the queue before exiting.
    Graceful,
    /// Exit right after the current transfer. Queued events are discarded,
    /// and a producer still waiting on a zero-capacity hand-off sees
    /// [`EnvoyError::Stopped`](crate::EnvoyError::Stopped).
    #[default]
    Immediate,
}

/// Settings for an [`Envoy`](crate::Envoy).
///
/// `capacity` is how many emitted events may be buffered before producers
/// wait. Zero means every emission waits until the run loop has taken the
/// event off the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EnvoyConfig {
    pub capacity: usize,
    pub shutdown: ShutdownMode,
}

impl EnvoyConfig {
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_shutdown(mut self, shutdown: ShutdownMode) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub(crate) fn is_rendezvous(&self) -> bool {
        self.capacity == 0
    }

    /// Tokio channels need at least one slot; a zero-capacity hand-off uses
    /// one slot plus a dequeue acknowledgement.
    pub(crate) fn channel_size(&self) -> usize {
        self.capacity.max(1)
    }
}
