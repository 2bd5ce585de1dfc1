//! Single-consumer actor around an [`Fsm`].
//!
//! Producers hold cloneable [`Envoy`] handles and push events into one
//! queue. Exactly one run loop owns the engine, takes events off the queue
//! in FIFO order and transfers them synchronously. Handles observe the
//! engine only through the [`Snapshot`] the loop publishes after each event.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::Poll;

use fsm_envoy_core::{Action, Event, EventCode, Fsm, FsmError, State, StateCode, TransitionRule};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::config::{EnvoyConfig, ShutdownMode};
use crate::error::EnvoyError;

/// What the run loop last published about its engine.
///
/// It reflects the last event fully processed, not the last one emitted.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<D> {
    /// Current state code.
    pub state: Option<StateCode>,
    /// Copy of the current state's data.
    pub data: Option<D>,
    /// The engine's sticky error.
    pub error: Option<FsmError>,
    /// Number of events the run loop has transferred so far.
    pub processed: u64,
}

impl<D: Clone> Snapshot<D> {
    fn capture<P>(fsm: &Fsm<D, P>, processed: u64) -> Self {
        Self {
            state: fsm.state_code().cloned(),
            data: fsm.state().and_then(State::data),
            error: fsm.error().cloned(),
            processed,
        }
    }
}

struct Envelope<P> {
    event: Event<P>,
    /// Completed as soon as the run loop takes the event off the queue.
    dequeued: Option<oneshot::Sender<()>>,
}

/// Builder for an [`Envoy`]: the engine, its actions and the queue settings.
///
/// ```rust
/// use fsm_envoy::{AsyncFsm, Context, Event, TransitionRule};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), fsm_envoy::EnvoyError> {
/// let rule = TransitionRule::new([("idle", "start", "busy"), ("busy", "done", "idle")]);
/// let (envoy, task) = AsyncFsm::<(), ()>::with_capacity(rule, 4)
///     .register_entry_action("busy", |_: &mut dyn Context<()>, _: &Event| Event::new("done"))
///     .start_from("idle")
///     .spawn();
///
/// envoy.emit_event("start").await?;
/// envoy.wait_for(|snapshot| snapshot.processed == 1).await?;
/// assert_eq!(envoy.state().map(|code| code.to_string()), Some("idle".to_owned()));
///
/// envoy.stop();
/// task.await?;
/// # Ok(())
/// # }
/// ```
pub struct AsyncFsm<D = (), P = ()> {
    fsm: Fsm<D, P>,
    config: EnvoyConfig,
}

impl<D, P> AsyncFsm<D, P>
where
    D: Clone + Send + Sync + 'static,
    P: Send + 'static,
{
    /// An envoy with a zero-capacity queue: every emission waits for the
    /// run loop to take it.
    pub fn new(rule: impl Into<Arc<TransitionRule>>) -> Self {
        Self::with_config(rule, EnvoyConfig::default())
    }

    /// An envoy buffering up to `capacity` events before producers wait.
    pub fn with_capacity(rule: impl Into<Arc<TransitionRule>>, capacity: usize) -> Self {
        Self::with_config(rule, EnvoyConfig::default().with_capacity(capacity))
    }

    pub fn with_config(rule: impl Into<Arc<TransitionRule>>, config: EnvoyConfig) -> Self {
        Self {
            fsm: Fsm::new(rule),
            config,
        }
    }

    /// Wraps an engine that was already configured.
    pub fn from_fsm(fsm: Fsm<D, P>, config: EnvoyConfig) -> Self {
        Self { fsm, config }
    }

    #[must_use]
    pub fn register_entry_action<A>(mut self, state: impl Into<StateCode>, action: A) -> Self
    where
        A: Action<D, P> + 'static,
    {
        self.fsm.register_entry_action(state, action);
        self
    }

    #[must_use]
    pub fn register_exit_action<A>(mut self, state: impl Into<StateCode>, action: A) -> Self
    where
        A: Action<D, P> + 'static,
    {
        self.fsm.register_exit_action(state, action);
        self
    }

    /// Selects the starting state. An unknown state is recorded as the
    /// engine's error and shows up in the first [`Snapshot`].
    #[must_use]
    pub fn start_from(mut self, state: impl Into<StateCode>) -> Self {
        self.fsm.start_from(state);
        self
    }

    /// A handle whose [`Envoy::run`] the caller drives, typically on its own
    /// task.
    pub fn envoy(self) -> Envoy<D, P> {
        let (envoy, runner) = self.split();
        *envoy.runner.lock().unwrap_or_else(PoisonError::into_inner) = Some(runner);
        envoy
    }

    /// Starts the run loop on a Tokio task.
    ///
    /// Awaiting the returned [`EnvoyTask`] yields the engine once the loop
    /// has stopped.
    pub fn spawn(self) -> (Envoy<D, P>, EnvoyTask<D, P>) {
        let (envoy, runner) = self.split();
        let handle = tokio::spawn(runner.run());
        (envoy, EnvoyTask { handle })
    }

    fn split(self) -> (Envoy<D, P>, Runner<D, P>) {
        let Self { fsm, config } = self;
        let (event_tx, events) = mpsc::channel(config.channel_size());
        let (snapshot_tx, snapshot_rx) = watch::channel(Snapshot::capture(&fsm, 0));
        let (shutdown_tx, shutdown) = watch::channel(None);

        let runner = Runner {
            fsm,
            events,
            shutdown,
            snapshot_tx,
            processed: 0,
        };
        let envoy = Envoy {
            event_tx,
            snapshot_rx,
            shutdown_tx: Arc::new(shutdown_tx),
            runner: Arc::new(Mutex::new(None)),
            config,
        };
        (envoy, runner)
    }
}

/// Handle to an envoy's queue and published state.
///
/// Clones share the same queue, run loop and stop signal.
pub struct Envoy<D = (), P = ()> {
    event_tx: mpsc::Sender<Envelope<P>>,
    snapshot_rx: watch::Receiver<Snapshot<D>>,
    shutdown_tx: Arc<watch::Sender<Option<ShutdownMode>>>,
    runner: Arc<Mutex<Option<Runner<D, P>>>>,
    config: EnvoyConfig,
}

impl<D, P> Clone for Envoy<D, P> {
    fn clone(&self) -> Self {
        Self {
            event_tx: self.event_tx.clone(),
            snapshot_rx: self.snapshot_rx.clone(),
            shutdown_tx: self.shutdown_tx.clone(),
            runner: self.runner.clone(),
            config: self.config,
        }
    }
}

impl<D, P> Envoy<D, P>
where
    D: Clone + Send + Sync + 'static,
    P: Send + 'static,
{
    /// Queues an event without data.
    ///
    /// With a zero-capacity queue this returns once the run loop has taken
    /// the event; otherwise it waits only while the queue is full. An empty
    /// code is dropped without error.
    pub async fn emit_event(&self, code: impl Into<EventCode>) -> Result<(), EnvoyError> {
        self.emit(Event::new(code)).await
    }

    /// Queues an event carrying `data`. Same waiting rules as
    /// [`Envoy::emit_event`].
    pub async fn emit_event_with_data(
        &self,
        code: impl Into<EventCode>,
        data: P,
    ) -> Result<(), EnvoyError> {
        self.emit(Event::with_data(code, data)).await
    }

    async fn emit(&self, event: Option<Event<P>>) -> Result<(), EnvoyError> {
        self.ensure_open()?;
        let Some(event) = event else {
            trace!("dropping event with empty code");
            return Ok(());
        };

        if !self.config.is_rendezvous() {
            return self
                .event_tx
                .send(Envelope {
                    event,
                    dequeued: None,
                })
                .await
                .map_err(|_| EnvoyError::Stopped);
        }

        let (dequeued, taken) = oneshot::channel();
        self.event_tx
            .send(Envelope {
                event,
                dequeued: Some(dequeued),
            })
            .await
            .map_err(|_| EnvoyError::Stopped)?;
        taken.await.map_err(|_| EnvoyError::Stopped)
    }

    /// Queues an event only if a slot is free right now.
    ///
    /// With a zero-capacity queue the single hand-off slot is used and the
    /// call does not wait for the run loop to take the event.
    pub fn try_emit_event(&self, code: impl Into<EventCode>) -> Result<(), EnvoyError> {
        self.ensure_open()?;
        let Some(event) = Event::new(code) else {
            return Ok(());
        };
        self.event_tx
            .try_send(Envelope {
                event,
                dequeued: None,
            })
            .map_err(|err| match err {
                TrySendError::Full(_) => EnvoyError::Full,
                TrySendError::Closed(_) => EnvoyError::Stopped,
            })
    }

    /// [`Envoy::emit_event`] for producers running on plain threads.
    ///
    /// # Panics
    ///
    /// Panics when called from within an asynchronous execution context.
    pub fn blocking_emit_event(&self, code: impl Into<EventCode>) -> Result<(), EnvoyError> {
        self.blocking_emit(Event::new(code))
    }

    /// [`Envoy::emit_event_with_data`] for producers running on plain
    /// threads.
    ///
    /// # Panics
    ///
    /// Panics when called from within an asynchronous execution context.
    pub fn blocking_emit_event_with_data(
        &self,
        code: impl Into<EventCode>,
        data: P,
    ) -> Result<(), EnvoyError> {
        self.blocking_emit(Event::with_data(code, data))
    }

    fn blocking_emit(&self, event: Option<Event<P>>) -> Result<(), EnvoyError> {
        self.ensure_open()?;
        let Some(event) = event else {
            return Ok(());
        };

        let (dequeued, taken) = if self.config.is_rendezvous() {
            let (tx, rx) = oneshot::channel();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };
        self.event_tx
            .blocking_send(Envelope { event, dequeued })
            .map_err(|_| EnvoyError::Stopped)?;
        match taken {
            Some(taken) => taken.blocking_recv().map_err(|_| EnvoyError::Stopped),
            None => Ok(()),
        }
    }

    /// Runs the consumer loop until a stop is requested or every handle is
    /// gone, then returns the engine.
    ///
    /// Only one run loop may exist per envoy: a second call, or a call on an
    /// envoy created by [`AsyncFsm::spawn`], fails with
    /// [`EnvoyError::AlreadyStarted`]. If a stop was requested before `run`
    /// is called, the loop exits right away.
    pub async fn run(&self) -> Result<Fsm<D, P>, EnvoyError> {
        let runner = self
            .runner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(EnvoyError::AlreadyStarted)?;
        Ok(runner.run().await)
    }

    /// Asks the run loop to stop using the configured [`ShutdownMode`].
    ///
    /// Never waits. The first request wins; later ones are ignored. Once
    /// requested, every emission fails with [`EnvoyError::Stopped`].
    pub fn stop(&self) {
        self.stop_with(self.config.shutdown);
    }

    /// Stops after processing every event already queued, whatever the
    /// configured mode.
    pub fn stop_graceful(&self) {
        self.stop_with(ShutdownMode::Graceful);
    }

    /// Like [`Envoy::stop`] with an explicit mode.
    pub fn stop_with(&self, mode: ShutdownMode) {
        let requested = self.shutdown_tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(mode);
            true
        });
        if requested {
            debug!(?mode, "envoy stop requested");
        }
    }

    /// Returns `true` once a stop has been requested.
    pub fn is_stopped(&self) -> bool {
        self.shutdown_tx.borrow().is_some()
    }

    fn ensure_open(&self) -> Result<(), EnvoyError> {
        if self.is_stopped() {
            return Err(EnvoyError::Stopped);
        }
        Ok(())
    }

    pub fn snapshot(&self) -> Snapshot<D> {
        self.snapshot_rx.borrow().clone()
    }

    /// Current state as of the last processed event.
    pub fn state(&self) -> Option<StateCode> {
        self.snapshot_rx.borrow().state.clone()
    }

    /// Copy of the current state's data as of the last processed event.
    pub fn state_data(&self) -> Option<D> {
        self.snapshot_rx.borrow().data.clone()
    }

    /// The engine's sticky error as of the last processed event.
    pub fn error(&self) -> Option<FsmError> {
        self.snapshot_rx.borrow().error.clone()
    }

    /// Waits until a published snapshot satisfies `predicate`.
    ///
    /// The latest snapshot is checked first. Fails with
    /// [`EnvoyError::Stopped`] if the run loop exits before the predicate
    /// holds.
    pub async fn wait_for(
        &self,
        mut predicate: impl FnMut(&Snapshot<D>) -> bool,
    ) -> Result<Snapshot<D>, EnvoyError> {
        let mut rx = self.snapshot_rx.clone();
        let snapshot = rx
            .wait_for(|snapshot| predicate(snapshot))
            .await
            .map_err(|_| EnvoyError::Stopped)?;
        Ok(snapshot.clone())
    }

    /// Waits for the machine to reach `target`.
    pub async fn wait_for_state(&self, target: impl Into<StateCode>) -> Result<(), EnvoyError> {
        let target = target.into();
        self.wait_for(|snapshot| snapshot.state.as_ref() == Some(&target))
            .await
            .map(|_| ())
    }
}

struct Runner<D, P> {
    fsm: Fsm<D, P>,
    events: mpsc::Receiver<Envelope<P>>,
    shutdown: watch::Receiver<Option<ShutdownMode>>,
    snapshot_tx: watch::Sender<Snapshot<D>>,
    processed: u64,
}

impl<D, P> Runner<D, P>
where
    D: Clone + Send + Sync + 'static,
    P: Send + 'static,
{
    async fn run(mut self) -> Fsm<D, P> {
        debug!(state = ?self.fsm.state_code(), "envoy loop started");
        loop {
            tokio::select! {
                biased;
                changed = self.shutdown.changed() => {
                    // No handle left means no producer left either: whatever
                    // is queued is all that will ever arrive.
                    let mode = match changed {
                        Ok(()) => *self.shutdown.borrow_and_update(),
                        Err(_) => {
                            debug!("all envoy handles dropped");
                            Some(ShutdownMode::Graceful)
                        }
                    };
                    match mode {
                        Some(ShutdownMode::Immediate) => break,
                        Some(ShutdownMode::Graceful) => {
                            // Closing first lets sends already in progress
                            // land; `recv` yields them before returning None.
                            self.events.close();
                            while let Some(envelope) = self.events.recv().await {
                                self.deliver(envelope);
                            }
                            break;
                        }
                        None => {}
                    }
                }
                envelope = self.events.recv() => {
                    let Some(envelope) = envelope else {
                        debug!("all envoy handles dropped");
                        break;
                    };
                    self.deliver(envelope);
                }
            }
        }

        self.events.close();
        let mut dropped = 0_usize;
        while self.events.try_recv().is_ok() {
            dropped += 1;
        }
        debug!(
            processed = self.processed,
            dropped,
            state = ?self.fsm.state_code(),
            "envoy loop stopped"
        );
        self.fsm
    }

    fn deliver(&mut self, envelope: Envelope<P>) {
        let Envelope { event, dequeued } = envelope;
        if let Some(dequeued) = dequeued {
            // The producer may have given up waiting; the event still counts.
            let _ = dequeued.send(());
        }

        let (code, data) = event.into_parts();
        self.fsm.transfer_event(code, data);
        self.processed += 1;
        self.snapshot_tx
            .send_replace(Snapshot::capture(&self.fsm, self.processed));
    }
}

/// The spawned run loop. Awaiting it yields the engine after the loop stops.
pub struct EnvoyTask<D = (), P = ()> {
    handle: JoinHandle<Fsm<D, P>>,
}

impl<D, P> EnvoyTask<D, P> {
    /// Cancels the run loop, possibly in the middle of a transfer.
    pub fn abort(&self) {
        self.handle.abort();
    }
}

impl<D, P> Future for EnvoyTask<D, P> {
    type Output = Result<Fsm<D, P>, EnvoyError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx).map_err(EnvoyError::from)
    }
}
