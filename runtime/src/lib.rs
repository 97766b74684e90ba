//! # Tessera Runtime
//!
//! Runtime implementation for Tessera.
//!
//! This crate provides the Store runtime that coordinates reducer execution
//! and effect handling.
//!
//! ## Core Components
//!
//! - **Store**: The runtime that manages state and executes effects
//! - **Effect Executor**: Executes effect descriptions and feeds actions back to reducers
//! - **Cancellation Registry**: Live effects addressed by [`EffectId`](tessera_core::EffectId)
//! - **Throttle Engine**: Per-identifier throttle windows
//!
//! ## Example
//!
//! ```
//! use tessera_core::{effect::Effect, reducer::Reducer, smallvec, SmallVec};
//! use tessera_runtime::Store;
//!
//! #[derive(Clone, Debug, Default)]
//! struct CounterState {
//!     count: i64,
//! }
//!
//! #[derive(Clone, Debug)]
//! enum CounterAction {
//!     Increment,
//!     IncrementLater,
//! }
//!
//! struct CounterReducer;
//!
//! impl Reducer for CounterReducer {
//!     type State = CounterState;
//!     type Action = CounterAction;
//!     type Environment = ();
//!
//!     fn reduce(
//!         &self,
//!         state: &mut CounterState,
//!         action: CounterAction,
//!         _env: &(),
//!     ) -> SmallVec<[Effect<CounterAction>; 4]> {
//!         match action {
//!             CounterAction::Increment => {
//!                 state.count += 1;
//!                 smallvec![Effect::None]
//!             },
//!             CounterAction::IncrementLater => {
//!                 smallvec![Effect::send(CounterAction::Increment)]
//!             },
//!         }
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), tessera_runtime::StoreError> {
//! let store = Store::new(CounterState::default(), CounterReducer, ());
//!
//! let mut handle = store.send(CounterAction::IncrementLater).await?;
//! handle.wait().await;
//!
//! assert_eq!(store.state(|s| s.count).await, 1);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tessera_core::environment::SchedulerRef;
use tokio::sync::watch;

/// Cancellation registry
pub mod registry;

/// Throttle windows
pub mod throttle;

/// Effect execution
pub mod executor;

/// Tokio-backed scheduler
pub mod scheduler;

/// Prometheus metrics for observability
pub mod metrics;

pub use error::StoreError;
pub use executor::{EffectExecutor, Emit};
pub use registry::{CancellationRegistry, Registration};
pub use scheduler::TokioScheduler;
pub use throttle::{ThrottleDecision, ThrottleEngine};

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    ///
    /// Effect failures are not store errors: they are logged and published
    /// on [`Store::subscribe_failures`](crate::Store::subscribe_failures).
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum StoreError {
        /// Store is shutting down and not accepting new actions
        ///
        /// This error is returned when `send()` is called after shutdown initiated.
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to complete
        ///
        /// The remaining effects were cancelled.
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// Timeout waiting for an action or for effects to finish
        #[error("Timeout waiting for action")]
        Timeout,

        /// Action broadcast channel closed
        #[error("Action broadcast channel closed")]
        ChannelClosed,
    }
}

/// Configuration for Store instances
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use tessera_runtime::{StoreConfig, TokioScheduler};
///
/// let config = StoreConfig::default()
///     .with_broadcast_capacity(256)
///     .with_shutdown_timeout(Duration::from_secs(5))
///     .with_scheduler(Arc::new(TokioScheduler::new()));
///
/// assert_eq!(config.broadcast_capacity, 256);
/// ```
#[derive(Clone)]
pub struct StoreConfig {
    /// Capacity of the action and failure broadcast channels
    pub broadcast_capacity: usize,
    /// Default timeout for graceful shutdown
    pub default_shutdown_timeout: Duration,
    /// Scheduler timing [`Effect::Delay`](tessera_core::effect::Effect::Delay)
    pub scheduler: SchedulerRef,
}

impl StoreConfig {
    /// Set the broadcast channel capacity
    ///
    /// Increase when observers frequently lag.
    #[must_use]
    pub const fn with_broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity;
        self
    }

    /// Set the default shutdown timeout
    #[must_use]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.default_shutdown_timeout = timeout;
        self
    }

    /// Set the scheduler used for delayed actions
    #[must_use]
    pub fn with_scheduler(mut self, scheduler: SchedulerRef) -> Self {
        self.scheduler = scheduler;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: 16,
            default_shutdown_timeout: Duration::from_secs(30),
            scheduler: Arc::new(TokioScheduler::new()),
        }
    }
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("broadcast_capacity", &self.broadcast_capacity)
            .field("default_shutdown_timeout", &self.default_shutdown_timeout)
            .finish_non_exhaustive()
    }
}

/// Handle for tracking effect completion
///
/// Returned by [`Store::send()`] to allow waiting for the effects started by
/// that action. Effects started by actions those effects feed back are not
/// included.
///
/// # Example
///
/// ```ignore
/// let mut handle = store.send(Action::Start).await?;
/// handle.wait_with_timeout(Duration::from_secs(5)).await?;
/// // All effects from Action::Start are now complete
/// ```
#[derive(Clone)]
pub struct EffectHandle {
    effects: Arc<AtomicUsize>,
    completion: watch::Receiver<()>,
}

impl EffectHandle {
    fn new() -> (Self, EffectTracking) {
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = watch::channel(());

        let handle = Self {
            effects: Arc::clone(&counter),
            completion: rx,
        };

        let tracking = EffectTracking {
            counter,
            notifier: Arc::new(tx),
        };

        (handle, tracking)
    }

    /// Create a handle that's already complete
    ///
    /// Useful for initialization in loops where you need a `last_handle`.
    #[must_use]
    pub fn completed() -> Self {
        let (_, rx) = watch::channel(());

        Self {
            effects: Arc::new(AtomicUsize::new(0)),
            completion: rx,
        }
    }

    /// Number of effects from this action still running
    #[must_use]
    pub fn pending(&self) -> usize {
        self.effects.load(Ordering::SeqCst)
    }

    /// Wait for all effects to complete
    pub async fn wait(&mut self) {
        while self.effects.load(Ordering::SeqCst) > 0 {
            if self.completion.changed().await.is_err() {
                // Every tracker is gone, so nothing can still be running.
                break;
            }
        }
    }

    /// Wait for all effects to complete with a timeout
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] if the timeout expires before all
    /// effects complete.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), StoreError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| StoreError::Timeout)
    }
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("pending_effects", &self.effects.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Internal: effect counter shared by the effects of one `send`
#[derive(Clone)]
struct EffectTracking {
    counter: Arc<AtomicUsize>,
    notifier: Arc<watch::Sender<()>>,
}

impl EffectTracking {
    fn increment(&self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement(&self) {
        if self.counter.fetch_sub(1, Ordering::SeqCst) == 1 {
            // Counter reached zero, notify waiters
            self.notifier.send_replace(());
        }
    }
}

/// Internal: RAII guard that decrements effect counter on drop
///
/// Ensures the effect counter is always decremented, even if the effect panics.
struct DecrementGuard(EffectTracking);

impl Drop for DecrementGuard {
    fn drop(&mut self) {
        self.0.decrement();
    }
}

/// Guard that decrements an atomic counter on drop (for shutdown tracking)
struct AtomicCounterGuard(Arc<AtomicUsize>);

impl Drop for AtomicCounterGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Store runtime for coordinating reducer execution and effect handling.
pub mod store {
    use super::{
        Arc, AtomicCounterGuard, AtomicUsize, DecrementGuard, Duration, EffectHandle,
        EffectTracking, Ordering, StoreConfig, StoreError,
    };
    use crate::executor::{EffectExecutor, Emit, effect_kind};
    use crate::metrics::{EffectMetrics, StoreMetrics};
    use futures::FutureExt;
    use futures::future::BoxFuture;
    use std::panic::AssertUnwindSafe;
    use std::sync::atomic::AtomicBool;
    use tessera_core::{CancellationToken, EffectError, EffectId, EffectOutcome, reducer::Reducer};
    use tokio::sync::{RwLock, broadcast, watch};

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind `RwLock` for concurrent access)
    /// 2. Reducer (business logic)
    /// 3. Environment (injected dependencies)
    /// 4. Effect execution (with feedback loop)
    /// 5. The cancellation registry and throttle table its effects share
    ///
    /// Cloning a store yields another handle to the same runtime.
    ///
    /// # Type Parameters
    ///
    /// - `S`: State type
    /// - `A`: Action type
    /// - `E`: Environment type
    /// - `R`: Reducer implementation
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: Arc<R>,
        environment: Arc<E>,
        executor: EffectExecutor<A>,
        root: CancellationToken,
        shutdown: Arc<AtomicBool>,
        pending_effects: Arc<AtomicUsize>,
        default_shutdown_timeout: Duration,
        /// Every action produced by an effect, before it is reduced
        action_broadcast: broadcast::Sender<A>,
        /// Every effect failure
        failure_broadcast: broadcast::Sender<EffectError>,
        /// Bumped after every reduce
        revision: Arc<watch::Sender<u64>>,
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
        A: Send + Clone + 'static,
        S: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        /// Create a new store with initial state, reducer, and environment
        ///
        /// Uses [`StoreConfig::default`]: tokio timers for delayed actions
        /// and broadcast capacity 16.
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self::with_config(initial_state, reducer, environment, StoreConfig::default())
        }

        /// Create a new Store with custom configuration
        ///
        /// # Example
        ///
        /// ```ignore
        /// let config = StoreConfig::default()
        ///     .with_scheduler(Arc::new(test_scheduler.clone()))
        ///     .with_shutdown_timeout(Duration::from_secs(1));
        ///
        /// let store = Store::with_config(SearchState::default(), SearchReducer, env, config);
        /// ```
        #[must_use]
        pub fn with_config(
            initial_state: S,
            reducer: R,
            environment: E,
            config: StoreConfig,
        ) -> Self {
            let (action_broadcast, _) = broadcast::channel(config.broadcast_capacity);
            let (failure_broadcast, _) = broadcast::channel(config.broadcast_capacity);
            let (revision, _) = watch::channel(0);

            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer: Arc::new(reducer),
                environment: Arc::new(environment),
                executor: EffectExecutor::new(config.scheduler),
                root: CancellationToken::new(),
                shutdown: Arc::new(AtomicBool::new(false)),
                pending_effects: Arc::new(AtomicUsize::new(0)),
                default_shutdown_timeout: config.default_shutdown_timeout,
                action_broadcast,
                failure_broadcast,
                revision: Arc::new(revision),
            }
        }

        /// Send an action to the store
        ///
        /// 1. Acquires write lock on state
        /// 2. Calls reducer with (state, action, environment)
        /// 3. Starts the returned effects while still holding the lock, so
        ///    registrations and cancellations happen in dispatch order
        /// 4. Spawns the rest of each effect; actions they produce are fed
        ///    back through `send`
        ///
        /// `send()` returns after starting effect execution, not completion.
        /// Use the returned [`EffectHandle`] to wait for the effects.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        ///
        /// # Panics
        ///
        /// If the reducer panics, the panic propagates to the caller.
        /// Reducers should be pure functions that do not panic.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<EffectHandle, StoreError> {
            if self.shutdown.load(Ordering::Acquire) {
                tracing::warn!("Rejected action: store is shutting down");
                StoreMetrics::record_rejected();
                return Err(StoreError::ShutdownInProgress);
            }

            tracing::debug!("Processing action");

            let (handle, tracking) = EffectHandle::new();
            let feedback = self.feedback();

            let started = {
                let mut state = self.state.write().await;
                tracing::trace!("Acquired write lock on state");

                let start = std::time::Instant::now();
                let effects = self.reducer.reduce(&mut *state, action, &self.environment);
                StoreMetrics::record_action(start.elapsed());
                tracing::trace!("Reducer completed, returned {} effects", effects.len());

                let started: Vec<_> = effects
                    .into_iter()
                    .filter(|effect| !effect.is_none())
                    .map(|effect| {
                        let kind = effect_kind(&effect);
                        StoreMetrics::record_effect_started(kind);
                        (kind, self.executor.start(effect, &self.root, &feedback))
                    })
                    .collect();

                self.revision.send_modify(|revision| *revision += 1);
                started
            };

            for (kind, running) in started {
                self.spawn_effect(kind, running, &tracking);
            }
            tracing::debug!("Action processing completed, returning handle");

            Ok(handle)
        }

        /// Sink feeding effect output back into this store
        fn feedback(&self) -> Emit<A> {
            let store = self.clone();
            Arc::new(move |action: A| {
                let store = store.clone();
                let delivered: BoxFuture<'static, ()> = Box::pin(async move {
                    // Broadcast to observers before the action is reduced
                    let _ = store.action_broadcast.send(action.clone());

                    if let Err(error) = store.send(action).await {
                        tracing::warn!(%error, "Action produced by effect was not reduced");
                    }
                });
                delivered
            })
        }

        fn spawn_effect(
            &self,
            kind: &'static str,
            running: BoxFuture<'static, EffectOutcome>,
            tracking: &EffectTracking,
        ) {
            tracking.increment();
            let guard = DecrementGuard(tracking.clone());

            // Track global pending effects for shutdown
            self.pending_effects.fetch_add(1, Ordering::SeqCst);
            let pending_guard = AtomicCounterGuard(Arc::clone(&self.pending_effects));

            let failures = self.failure_broadcast.clone();

            tokio::spawn(async move {
                let _guard = guard;
                let _pending_guard = pending_guard;

                let outcome = AssertUnwindSafe(running)
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        EffectOutcome::Failed(EffectError::Panicked(panic_message(panic.as_ref())))
                    });

                match outcome {
                    EffectOutcome::Completed => {
                        tracing::trace!(effect = kind, "Effect completed");
                    },
                    EffectOutcome::Cancelled => {
                        tracing::debug!(effect = kind, "Effect cancelled");
                    },
                    EffectOutcome::Failed(error) => {
                        tracing::error!(effect = kind, %error, "Effect failed");
                        EffectMetrics::record_failure();
                        let _ = failures.send(error);
                    },
                }
            });
        }

        /// Send an action and wait for a matching result action
        ///
        /// Subscribes to the action broadcast before sending, then returns
        /// the first action produced by an effect that matches `predicate`.
        ///
        /// # Errors
        ///
        /// - [`StoreError::Timeout`]: Timeout expired before matching action received
        /// - [`StoreError::ChannelClosed`]: Action broadcast channel closed
        /// - [`StoreError::ShutdownInProgress`]: Store is shutting down
        pub async fn send_and_wait_for<F>(
            &self,
            action: A,
            predicate: F,
            timeout: Duration,
        ) -> Result<A, StoreError>
        where
            F: Fn(&A) -> bool,
        {
            // Subscribe BEFORE sending to avoid race condition
            let mut rx = self.action_broadcast.subscribe();

            self.send(action).await?;

            tokio::time::timeout(timeout, async {
                loop {
                    match rx.recv().await {
                        Ok(action) if predicate(&action) => return Ok(action),
                        Ok(_) => {},
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Action observer lagged, {} actions skipped", skipped);
                        },
                        Err(broadcast::error::RecvError::Closed) => {
                            return Err(StoreError::ChannelClosed);
                        },
                    }
                }
            })
            .await
            .map_err(|_| StoreError::Timeout)?
        }

        /// Subscribe to all actions produced by effects
        ///
        /// Actions sent directly through [`Store::send`] are not broadcast.
        #[must_use]
        pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
            self.action_broadcast.subscribe()
        }

        /// Subscribe to effect failures
        #[must_use]
        pub fn subscribe_failures(&self) -> broadcast::Receiver<EffectError> {
            self.failure_broadcast.subscribe()
        }

        /// Watch state changes
        ///
        /// The value is a revision counter bumped after every reduce; read the
        /// state itself with [`Store::state`].
        #[must_use]
        pub fn state_changes(&self) -> watch::Receiver<u64> {
            self.revision.subscribe()
        }

        /// Read current state via a closure
        ///
        /// ```ignore
        /// let query = store.state(|s| s.query.clone()).await;
        /// ```
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&*state)
        }

        /// Cancel every live effect registered under `id`
        ///
        /// Returns the number of effects cancelled.
        pub fn cancel(&self, id: impl Into<EffectId>) -> usize {
            self.executor.cancel(&id.into())
        }

        /// Forget the throttle window and pending value for `id`
        pub fn clear_throttle(&self, id: impl Into<EffectId>) {
            self.executor.throttles().clear(&id.into());
        }

        /// The executor running this store's effects
        #[must_use]
        pub const fn executor(&self) -> &EffectExecutor<A> {
            &self.executor
        }

        /// Number of spawned effects that have not finished
        #[must_use]
        pub fn pending_effects(&self) -> usize {
            self.pending_effects.load(Ordering::Acquire)
        }

        /// Initiate graceful shutdown with the configured default timeout
        ///
        /// # Errors
        ///
        /// See [`Store::shutdown`].
        pub async fn shutdown_default(&self) -> Result<(), StoreError> {
            self.shutdown(self.default_shutdown_timeout).await
        }

        /// Initiate graceful shutdown
        ///
        /// 1. Stops accepting new actions
        /// 2. Waits for in-flight effects to finish
        /// 3. On timeout, cancels every remaining effect
        ///
        /// Throttle state is discarded either way.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] if the timeout expires before
        /// all pending effects complete.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            tracing::info!("Initiating graceful shutdown");

            self.shutdown.store(true, Ordering::Release);

            let start = tokio::time::Instant::now();
            let poll_interval = Duration::from_millis(10);

            let result = loop {
                let pending = self.pending_effects.load(Ordering::Acquire);

                if pending == 0 {
                    tracing::info!("All effects completed, shutdown successful");
                    break Ok(());
                }

                if start.elapsed() >= timeout {
                    tracing::error!(
                        pending_effects = pending,
                        "Shutdown timeout: {} effects still running", pending
                    );
                    break Err(StoreError::ShutdownTimeout(pending));
                }

                tracing::debug!(
                    pending_effects = pending,
                    elapsed_ms = start.elapsed().as_millis(),
                    "Waiting for effects to complete"
                );

                tokio::time::sleep(poll_interval).await;
            };

            self.root.cancel();
            self.executor.throttles().clear_all();
            result
        }
    }

    fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
        panic
            .downcast_ref::<&str>()
            .map(|message| (*message).to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string())
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                reducer: Arc::clone(&self.reducer),
                environment: Arc::clone(&self.environment),
                executor: self.executor.clone(),
                root: self.root.clone(),
                shutdown: Arc::clone(&self.shutdown),
                pending_effects: Arc::clone(&self.pending_effects),
                default_shutdown_timeout: self.default_shutdown_timeout,
                action_broadcast: self.action_broadcast.clone(),
                failure_broadcast: self.failure_broadcast.clone(),
                revision: Arc::clone(&self.revision),
            }
        }
    }
}

// Re-export for convenience
pub use store::Store;
