//! Effect execution.
//!
//! [`EffectExecutor::start`] turns an [`Effect`] description into a future in
//! two phases. Starting is synchronous: registrations, cancellations and
//! timer deadlines happen immediately, in the order effects are started.
//! The returned future is the asynchronous remainder that delivers actions
//! and resolves to the effect's [`EffectOutcome`].

use crate::metrics::ThrottleMetrics;
use crate::registry::CancellationRegistry;
use crate::throttle::{ThrottleDecision, ThrottleEngine};
use futures::future::{self, BoxFuture};
use futures::{FutureExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tessera_core::effect::Effect;
use tessera_core::environment::SchedulerRef;
use tessera_core::{CancellationToken, EffectError, EffectId, EffectOutcome};
use tokio::sync::mpsc;

/// Sink for actions produced by running effects
///
/// The returned future completes once the action has been handed over; for a
/// store this means the action has been reduced.
pub type Emit<A> = Arc<dyn Fn(A) -> BoxFuture<'static, ()> + Send + Sync>;

/// Executes effect descriptions against a cancellation registry and throttle table
///
/// Cloning an executor yields another handle to the same tables.
pub struct EffectExecutor<A> {
    registry: Arc<CancellationRegistry>,
    throttles: Arc<ThrottleEngine<A>>,
    scheduler: SchedulerRef,
}

impl<A> Clone for EffectExecutor<A> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            throttles: Arc::clone(&self.throttles),
            scheduler: Arc::clone(&self.scheduler),
        }
    }
}

impl<A> std::fmt::Debug for EffectExecutor<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectExecutor")
            .field("registry", &self.registry)
            .field("throttles", &self.throttles)
            .finish_non_exhaustive()
    }
}

impl<A: Send + 'static> EffectExecutor<A> {
    /// Create an executor with empty tables
    ///
    /// `scheduler` times [`Effect::Delay`]; every other timed effect carries
    /// its own scheduler.
    #[must_use]
    pub fn new(scheduler: SchedulerRef) -> Self {
        Self {
            registry: Arc::new(CancellationRegistry::new()),
            throttles: Arc::new(ThrottleEngine::new()),
            scheduler,
        }
    }

    /// The cancellation registry shared by every effect this executor starts
    #[must_use]
    pub const fn registry(&self) -> &Arc<CancellationRegistry> {
        &self.registry
    }

    /// The throttle table shared by every effect this executor starts
    #[must_use]
    pub const fn throttles(&self) -> &Arc<ThrottleEngine<A>> {
        &self.throttles
    }

    /// The scheduler timing [`Effect::Delay`]
    #[must_use]
    pub const fn scheduler(&self) -> &SchedulerRef {
        &self.scheduler
    }

    /// Cancel every effect registered under `id`
    ///
    /// A value a throttled effect was holding for `id` is dropped with it;
    /// the throttle window stays. Returns the number of effects cancelled.
    pub fn cancel(&self, id: &EffectId) -> usize {
        self.cancel_many(std::slice::from_ref(id))
    }

    /// Cancel every effect registered under any of `ids`
    pub fn cancel_many(&self, ids: &[EffectId]) -> usize {
        // Tokens first, so a run being cancelled cannot hold a new value afterwards
        let cancelled = self.registry.cancel_many(ids);
        for id in ids {
            if self.throttles.discard_pending(id) {
                tracing::debug!(%id, "Dropped held throttle value");
            }
        }
        cancelled
    }

    /// Start an effect
    ///
    /// Eager work happens before this returns:
    /// - cancellable and throttled effects are registered (cancelling in-flight
    ///   ones when asked to)
    /// - [`Effect::Cancel`] cancels its identifiers
    /// - delay deadlines are fixed against the current scheduler time
    ///
    /// The returned future delivers actions through `emit` and stops
    /// delivering as soon as `token` (or a token derived from it) is
    /// cancelled.
    pub fn start(
        &self,
        effect: Effect<A>,
        token: &CancellationToken,
        emit: &Emit<A>,
    ) -> BoxFuture<'static, EffectOutcome> {
        match effect {
            Effect::None => future::ready(EffectOutcome::Completed).boxed(),

            Effect::Future(computation) => {
                let token = token.clone();
                let emit = Arc::clone(emit);
                async move {
                    let result = tokio::select! {
                        biased;
                        () = token.cancelled() => return EffectOutcome::Cancelled,
                        result = computation => result,
                    };

                    match result {
                        Ok(Some(action)) => deliver(&token, &emit, action).await,
                        Ok(None) => EffectOutcome::Completed,
                        Err(error) => EffectOutcome::Failed(error),
                    }
                }
                .boxed()
            },

            Effect::Stream(mut stream) => {
                let token = token.clone();
                let emit = Arc::clone(emit);
                async move {
                    loop {
                        let next = tokio::select! {
                            biased;
                            () = token.cancelled() => return EffectOutcome::Cancelled,
                            next = stream.next() => next,
                        };

                        match next {
                            None => return EffectOutcome::Completed,
                            Some(Ok(action)) => {
                                if deliver(&token, &emit, action).await.is_cancelled() {
                                    return EffectOutcome::Cancelled;
                                }
                            },
                            Some(Err(error)) => return EffectOutcome::Failed(error),
                        }
                    }
                }
                .boxed()
            },

            Effect::Parallel(effects) => {
                let started: Vec<_> = effects
                    .into_iter()
                    .map(|effect| self.start(effect, token, emit))
                    .collect();

                async move {
                    let tasks: Vec<_> = started.into_iter().map(tokio::spawn).collect();
                    future::join_all(tasks)
                        .await
                        .into_iter()
                        .map(|joined| {
                            joined.unwrap_or_else(|error| {
                                EffectOutcome::Failed(EffectError::Panicked(error.to_string()))
                            })
                        })
                        .fold(EffectOutcome::Completed, EffectOutcome::combine)
                }
                .boxed()
            },

            Effect::Sequential(effects) => {
                let executor = self.clone();
                let token = token.clone();
                let emit = Arc::clone(emit);
                async move {
                    for effect in effects {
                        match executor.start(effect, &token, &emit).await {
                            EffectOutcome::Completed => {},
                            // A step cancelled through its own id; the rest still runs
                            EffectOutcome::Cancelled if !token.is_cancelled() => {},
                            stopped => return stopped,
                        }
                    }
                    EffectOutcome::Completed
                }
                .boxed()
            },

            Effect::Delay { duration, action } => {
                let sleep = self.scheduler.sleep(duration);
                let token = token.clone();
                let emit = Arc::clone(emit);
                async move {
                    tokio::select! {
                        biased;
                        () = token.cancelled() => return EffectOutcome::Cancelled,
                        () = sleep => {},
                    }
                    deliver(&token, &emit, *action).await
                }
                .boxed()
            },

            Effect::Deferred {
                duration,
                scheduler,
                effect,
            } => {
                let sleep = scheduler.sleep(duration);
                let executor = self.clone();
                let token = token.clone();
                let emit = Arc::clone(emit);
                async move {
                    tokio::select! {
                        biased;
                        () = token.cancelled() => return EffectOutcome::Cancelled,
                        () = sleep => {},
                    }
                    executor.start(*effect, &token, &emit).await
                }
                .boxed()
            },

            Effect::Cancellable {
                id,
                cancel_in_flight,
                effect,
            } => {
                let child = token.child_token();
                let registration = self.registry.register(id, child.clone(), cancel_in_flight);
                let running = self.start(*effect, &child, emit);
                async move {
                    let _registration = registration;
                    running.await
                }
                .boxed()
            },

            Effect::Cancel(ids) => {
                self.cancel_many(&ids);
                future::ready(EffectOutcome::Completed).boxed()
            },

            Effect::Throttle {
                id,
                interval,
                scheduler,
                latest,
                effect,
            } => {
                let child = token.child_token();
                let registration = self.registry.register(id.clone(), child.clone(), true);

                let (values_tx, values) = mpsc::unbounded_channel();
                let capture: Emit<A> = Arc::new(move |value: A| {
                    // The receiver only goes away once the throttle has stopped.
                    let _ = values_tx.send(value);
                    future::ready(()).boxed()
                });
                let source = self.start(*effect, &child, &capture);
                drop(capture);

                let run = ThrottleRun {
                    id,
                    interval,
                    latest,
                    scheduler,
                    engine: Arc::clone(&self.throttles),
                    token: child,
                    emit: Arc::clone(emit),
                };
                async move {
                    let _registration = registration;
                    run.drive(source, values).await
                }
                .boxed()
            },
        }
    }
}

/// Label for the `store.effects.started` metric
pub(crate) const fn effect_kind<A>(effect: &Effect<A>) -> &'static str {
    match effect {
        Effect::None => "none",
        Effect::Future(_) => "future",
        Effect::Stream(_) => "stream",
        Effect::Parallel(_) => "parallel",
        Effect::Sequential(_) => "sequential",
        Effect::Delay { .. } => "delay",
        Effect::Deferred { .. } => "deferred",
        Effect::Cancellable { .. } => "cancellable",
        Effect::Cancel(_) => "cancel",
        Effect::Throttle { .. } => "throttle",
    }
}

async fn deliver<A>(token: &CancellationToken, emit: &Emit<A>, action: A) -> EffectOutcome {
    if token.is_cancelled() {
        return EffectOutcome::Cancelled;
    }
    emit(action).await;
    EffectOutcome::Completed
}

async fn wait_on<T>(slot: &mut Option<BoxFuture<'static, T>>) -> T {
    match slot {
        Some(pending) => pending.await,
        None => future::pending().await,
    }
}

/// One running throttled effect
struct ThrottleRun<A> {
    id: EffectId,
    interval: Duration,
    latest: bool,
    scheduler: SchedulerRef,
    engine: Arc<ThrottleEngine<A>>,
    token: CancellationToken,
    emit: Emit<A>,
}

impl<A: Send + 'static> ThrottleRun<A> {
    /// Feed the source's values through the throttle until the source is
    /// done and no trailing emission is outstanding
    ///
    /// Cancellation and source failure drop the outstanding emission; normal
    /// completion lets it fire. The held value itself is dropped on failure
    /// here and on explicit cancellation by [`EffectExecutor::cancel`]; a
    /// newer throttle superseding this one inherits it.
    async fn drive(
        self,
        source: BoxFuture<'static, EffectOutcome>,
        mut values: mpsc::UnboundedReceiver<A>,
    ) -> EffectOutcome {
        let mut source = Some(source);
        let mut scheduled: Option<BoxFuture<'static, ()>> = None;
        let mut finished = EffectOutcome::Completed;

        while source.is_some() || scheduled.is_some() {
            tokio::select! {
                biased;
                () = self.token.cancelled() => return EffectOutcome::Cancelled,
                Some(value) = values.recv(), if source.is_some() => {
                    self.offer(value, &mut scheduled).await;
                },
                outcome = wait_on(&mut source) => {
                    source = None;
                    while let Ok(value) = values.try_recv() {
                        self.offer(value, &mut scheduled).await;
                    }
                    if outcome.is_failed() {
                        self.engine.discard_pending(&self.id);
                        return outcome;
                    }
                    finished = outcome;
                },
                () = wait_on(&mut scheduled) => {
                    scheduled = None;
                    self.fire().await;
                },
            }
        }

        if self.token.is_cancelled() {
            EffectOutcome::Cancelled
        } else {
            finished
        }
    }

    async fn offer(&self, value: A, scheduled: &mut Option<BoxFuture<'static, ()>>) {
        let now = self.scheduler.now();
        match self
            .engine
            .offer(&self.id, value, self.interval, self.latest, now)
        {
            ThrottleDecision::Emit(value) => {
                *scheduled = None;
                ThrottleMetrics::record_leading();
                let _ = deliver(&self.token, &self.emit, value).await;
            },
            ThrottleDecision::Schedule { delay } => {
                tracing::trace!(id = %self.id, ?delay, "Throttled value held");
                ThrottleMetrics::record_scheduled();
                *scheduled = Some(self.scheduler.sleep(delay));
            },
        }
    }

    async fn fire(&self) {
        let now = self.scheduler.now();
        if let Some(value) = self.engine.fire(&self.id, now) {
            ThrottleMetrics::record_trailing();
            let _ = deliver(&self.token, &self.emit, value).await;
        }
    }
}
