//! # Tessera Testing
//!
//! Testing utilities and helpers for Tessera.
//!
//! This crate provides:
//! - Virtual schedulers, so time-based effects run without real sleeping
//! - [`EffectProbe`], which runs an effect and collects what it emits
//! - [`ReducerTest`], a Given-When-Then harness for reducers, and effect
//!   assertions
//!
//! ## Example
//!
//! ```ignore
//! use tessera_testing::TestScheduler;
//! use tessera_runtime::{Store, StoreConfig};
//!
//! #[tokio::test]
//! async fn test_search_debounce() {
//!     let scheduler = TestScheduler::new();
//!     let store = Store::new(SearchState::default(), SearchReducer, env(&scheduler));
//!
//!     store.send(SearchAction::QueryChanged("ru".into())).await?;
//!     scheduler.advance(Duration::from_millis(300)).await;
//!
//!     assert_eq!(store.state(|s| s.results.len()).await, 3);
//! }
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Ergonomic testing utilities for reducers
pub mod reducer_test;

/// Mock schedulers for deterministic time.
pub mod mocks {
    use super::{Mutex, MutexGuard, PoisonError, settle};
    use futures::future::{self, BoxFuture};
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;
    use tessera_core::environment::{Scheduler, SchedulerInstant};
    use tokio::sync::oneshot;

    #[derive(Default)]
    struct VirtualClock {
        now: Duration,
        next_sequence: u64,
        /// Keyed by deadline, then by registration order
        sleepers: BTreeMap<(Duration, u64), oneshot::Sender<()>>,
    }

    /// Manually driven virtual clock
    ///
    /// Time never moves on its own. Sleeps register their deadline when they
    /// are created and complete only when [`TestScheduler::advance`] (or
    /// [`TestScheduler::run`]) moves the clock past it. Clones share the
    /// same clock.
    ///
    /// Use it from a current-thread runtime (the `#[tokio::test]` default).
    /// After each wake-up the clock yields to the runtime so woken tasks can
    /// run; on a multi-thread runtime those tasks may still be running when
    /// `advance` returns.
    ///
    /// # Example
    ///
    /// ```
    /// use std::time::Duration;
    /// use tessera_core::environment::Scheduler;
    /// use tessera_testing::TestScheduler;
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let scheduler = TestScheduler::new();
    /// let sleep = tokio::spawn(scheduler.sleep(Duration::from_millis(300)));
    ///
    /// scheduler.advance(Duration::from_millis(299)).await;
    /// assert!(!sleep.is_finished());
    ///
    /// scheduler.advance(Duration::from_millis(1)).await;
    /// assert!(sleep.is_finished());
    /// assert_eq!(scheduler.now().elapsed(), Duration::from_millis(300));
    /// # }
    /// ```
    #[derive(Clone, Default)]
    pub struct TestScheduler {
        clock: Arc<Mutex<VirtualClock>>,
    }

    impl TestScheduler {
        /// Create a clock at its epoch with no sleepers
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        fn lock(&self) -> MutexGuard<'_, VirtualClock> {
            self.clock.lock().unwrap_or_else(PoisonError::into_inner)
        }

        /// Move the clock forward by `by`
        ///
        /// Sleepers due within the window fire in deadline order; the clock
        /// reads each sleeper's deadline while the tasks it wakes run, so
        /// timers they create are measured from that point.
        pub async fn advance(&self, by: Duration) {
            settle().await;
            let target = self.lock().now.saturating_add(by);

            while let Some(wake) = self.pop_due(target) {
                let _ = wake.send(());
                settle().await;
            }

            {
                let mut clock = self.lock();
                clock.now = clock.now.max(target);
            }
            settle().await;
        }

        /// Fire every pending sleeper, including ones created while running
        ///
        /// Does not return while something keeps scheduling new sleeps.
        pub async fn run(&self) {
            settle().await;
            loop {
                let next = self.lock().sleepers.keys().next().map(|&(deadline, _)| deadline);
                let Some(deadline) = next else { break };
                let now = self.lock().now;
                self.advance(deadline.saturating_sub(now)).await;
            }
        }

        /// Number of sleeps still waiting for their deadline
        #[must_use]
        pub fn pending_sleepers(&self) -> usize {
            self.lock()
                .sleepers
                .values()
                .filter(|wake| !wake.is_closed())
                .count()
        }

        fn pop_due(&self, target: Duration) -> Option<oneshot::Sender<()>> {
            let mut clock = self.lock();
            let entry = clock.sleepers.first_entry()?;
            if entry.key().0 > target {
                return None;
            }
            let ((deadline, _), wake) = entry.remove_entry();
            clock.now = clock.now.max(deadline);
            Some(wake)
        }
    }

    impl Scheduler for TestScheduler {
        fn now(&self) -> SchedulerInstant {
            SchedulerInstant::from_elapsed(self.lock().now)
        }

        fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
            if duration.is_zero() {
                return Box::pin(future::ready(()));
            }

            let (wake, woken) = oneshot::channel();
            {
                let mut clock = self.lock();
                let deadline = clock.now.saturating_add(duration);
                let sequence = clock.next_sequence;
                clock.next_sequence += 1;
                clock.sleepers.insert((deadline, sequence), wake);
            }

            Box::pin(async move {
                if woken.await.is_err() {
                    // The clock went away: the deadline is never reached
                    future::pending::<()>().await;
                }
            })
        }
    }

    impl std::fmt::Debug for TestScheduler {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            let clock = self.lock();
            f.debug_struct("TestScheduler")
                .field("now", &clock.now)
                .field("sleepers", &clock.sleepers.len())
                .finish()
        }
    }

    /// Scheduler whose sleeps complete at once
    ///
    /// Each sleep moves `now` forward by the slept duration, so code that
    /// reads the clock after sleeping still sees time pass. Useful when a
    /// test cares about what happens, not when.
    #[derive(Debug, Clone, Default)]
    pub struct ImmediateScheduler {
        now: Arc<Mutex<Duration>>,
    }

    impl ImmediateScheduler {
        /// Create a clock at its epoch
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl Scheduler for ImmediateScheduler {
        fn now(&self) -> SchedulerInstant {
            SchedulerInstant::from_elapsed(*self.now.lock().unwrap_or_else(PoisonError::into_inner))
        }

        fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
            let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
            *now = now.saturating_add(duration);
            Box::pin(future::ready(()))
        }
    }
}

/// Running effects outside a store.
pub mod probe {
    use futures::FutureExt;
    use futures::future::BoxFuture;
    use std::sync::Arc;
    use tessera_core::effect::Effect;
    use tessera_core::environment::SchedulerRef;
    use tessera_core::{CancellationToken, EffectError, EffectId, EffectOutcome};
    use tessera_runtime::{EffectExecutor, Emit};
    use tokio::sync::mpsc;
    use tokio::task::JoinHandle;

    /// Runs effects against a private executor and records what they emit
    ///
    /// Emitted actions are collected, never reduced. Effects started through
    /// the same probe share its cancellation registry and throttle table.
    ///
    /// # Example
    ///
    /// ```
    /// use std::sync::Arc;
    /// use tessera_core::effect::Effect;
    /// use tessera_testing::{EffectProbe, ImmediateScheduler};
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let probe = EffectProbe::new(Arc::new(ImmediateScheduler::new()));
    /// let (actions, outcome) = probe
    ///     .run(Effect::merge(vec![Effect::send(1), Effect::send(2)]))
    ///     .await;
    ///
    /// assert!(outcome.is_completed());
    /// assert_eq!(actions.len(), 2);
    /// # }
    /// ```
    pub struct EffectProbe<A> {
        executor: EffectExecutor<A>,
        root: CancellationToken,
    }

    impl<A: Send + 'static> EffectProbe<A> {
        /// Create a probe whose [`Effect::Delay`] timers use `scheduler`
        #[must_use]
        pub fn new(scheduler: SchedulerRef) -> Self {
            Self {
                executor: EffectExecutor::new(scheduler),
                root: CancellationToken::new(),
            }
        }

        /// The executor effects run on
        #[must_use]
        pub const fn executor(&self) -> &EffectExecutor<A> {
            &self.executor
        }

        /// Run an effect to completion
        pub async fn run(&self, effect: Effect<A>) -> (Vec<A>, EffectOutcome) {
            self.spawn(effect).finish().await
        }

        /// Start an effect in the background
        ///
        /// Registration and cancellation happen before this returns.
        pub fn spawn(&self, effect: Effect<A>) -> ProbeRun<A> {
            let (sink, actions) = mpsc::unbounded_channel();
            let emit: Emit<A> = Arc::new(move |action: A| {
                let _ = sink.send(action);
                let delivered: BoxFuture<'static, ()> = futures::future::ready(()).boxed();
                delivered
            });

            let running = self.executor.start(effect, &self.root, &emit);
            ProbeRun {
                actions,
                task: tokio::spawn(running),
            }
        }

        /// Cancel every live effect registered under `id`
        pub fn cancel(&self, id: impl Into<EffectId>) -> usize {
            self.executor.cancel(&id.into())
        }

        /// Cancel every effect this probe started
        pub fn cancel_all(&self) {
            self.root.cancel();
        }
    }

    /// An effect started by [`EffectProbe::spawn`]
    pub struct ProbeRun<A> {
        actions: mpsc::UnboundedReceiver<A>,
        task: JoinHandle<EffectOutcome>,
    }

    impl<A> ProbeRun<A> {
        /// Actions emitted since the last drain
        pub fn drain(&mut self) -> Vec<A> {
            let mut drained = Vec::new();
            while let Ok(action) = self.actions.try_recv() {
                drained.push(action);
            }
            drained
        }

        /// Whether the effect has finished
        #[must_use]
        pub fn is_finished(&self) -> bool {
            self.task.is_finished()
        }

        /// Wait for the effect to finish
        ///
        /// Returns the actions not yet drained and the effect's outcome; a
        /// panic inside the effect is reported as [`EffectError::Panicked`].
        pub async fn finish(mut self) -> (Vec<A>, EffectOutcome) {
            let outcome = (&mut self.task)
                .await
                .unwrap_or_else(|error| EffectOutcome::Failed(EffectError::Panicked(error.to_string())));
            (self.drain(), outcome)
        }
    }
}

/// Yield often enough for woken tasks (and the tasks they wake) to run
///
/// On a current-thread runtime every yield lets each ready task poll once,
/// so chains of wake-ups shorter than the yield count finish here.
async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}

// Re-export commonly used items
pub use mocks::{ImmediateScheduler, TestScheduler};
pub use probe::{EffectProbe, ProbeRun};
pub use reducer_test::{ReducerTest, assertions};
