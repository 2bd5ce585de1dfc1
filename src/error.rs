/// Errors reported by an [`Envoy`](crate::Envoy) handle or its task.
///
/// Failures inside the engine (an unknown event, a missing starting state)
/// are not returned here; they are published in the envoy's
/// [`Snapshot`](crate::Snapshot) like the engine's sticky error.
#[derive(Debug, thiserror::Error)]
pub enum EnvoyError {
    /// A stop was requested, or the run loop has exited.
    #[error("envoy is stopped")]
    Stopped,
    /// `run` was already called on this envoy, or it was spawned.
    #[error("envoy run loop already started")]
    AlreadyStarted,
    /// The queue has no free slot and the caller asked not to wait.
    #[error("envoy queue is full")]
    Full,
    /// The background task panicked or was cancelled.
    #[error("envoy task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}
