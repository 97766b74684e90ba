//! # Tessera Core
//!
//! Core traits and types for the Tessera effect runtime.
//!
//! This crate provides the fundamental abstractions for building
//! unidirectional, effect-driven applications using the Reducer pattern.
//!
//! ## Core Concepts
//!
//! - **State**: Domain state for a feature
//! - **Action**: All possible inputs to a reducer
//! - **Reducer**: Pure function `(State, Action, Environment) → (State, Effects)`
//! - **Effect**: Side effect descriptions (not execution), cancellable by [`EffectId`]
//! - **Environment**: Injected dependencies, including the [`Scheduler`](environment::Scheduler)
//!
//! ## Architecture Principles
//!
//! - Functional Core, Imperative Shell
//! - Unidirectional Data Flow
//! - Explicit Effects (no hidden I/O)
//! - Cooperative cancellation through tokens passed down the effect tree
//! - Virtual time through an injected logical clock
//!
//! ## Example
//!
//! ```
//! use tessera_core::{effect::Effect, reducer::Reducer, smallvec, SmallVec};
//!
//! #[derive(Clone, Debug, Default)]
//! struct SearchState {
//!     query: String,
//! }
//!
//! #[derive(Clone, Debug)]
//! enum SearchAction {
//!     QueryChanged(String),
//!     Cleared,
//! }
//!
//! struct SearchReducer;
//!
//! impl Reducer for SearchReducer {
//!     type State = SearchState;
//!     type Action = SearchAction;
//!     type Environment = ();
//!
//!     fn reduce(
//!         &self,
//!         state: &mut SearchState,
//!         action: SearchAction,
//!         _env: &(),
//!     ) -> SmallVec<[Effect<SearchAction>; 4]> {
//!         match action {
//!             SearchAction::QueryChanged(query) => {
//!                 state.query = query;
//!                 smallvec![Effect::None]
//!             },
//!             SearchAction::Cleared => {
//!                 state.query.clear();
//!                 smallvec![Effect::cancel("search")]
//!             },
//!         }
//!     }
//! }
//!
//! let mut state = SearchState::default();
//! let _ = SearchReducer.reduce(&mut state, SearchAction::QueryChanged("rust".into()), &());
//! assert_eq!(state.query, "rust");
//! ```

// Re-export commonly used types
pub use smallvec::{smallvec, SmallVec};

/// Cancellation identifiers and tokens
pub mod cancellation;

/// Reducer composition utilities
pub mod composition;

/// Declarative macros for effect construction
pub mod effect_macros;

/// Effect module - Side effect descriptions
pub mod effect;

/// Error taxonomy for effect execution
pub mod error;

pub use cancellation::{CancellationToken, EffectId};
pub use error::{EffectError, EffectOutcome};

/// Reducer module - The core trait for business logic
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`
///
/// They contain all business logic and are deterministic and testable.
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The domain state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    ///
    /// # Example
    ///
    /// ```ignore
    /// impl Reducer for SearchReducer {
    ///     type State = SearchState;
    ///     type Action = SearchAction;
    ///     type Environment = SearchEnvironment;
    ///
    ///     fn reduce(
    ///         &self,
    ///         state: &mut SearchState,
    ///         action: SearchAction,
    ///         env: &SearchEnvironment,
    ///     ) -> SmallVec<[Effect<SearchAction>; 4]> {
    ///         match action {
    ///             SearchAction::QueryChanged(query) => {
    ///                 state.query = query.clone();
    ///                 smallvec![env.search(query).debounce("search", DEBOUNCE, env.scheduler())]
    ///             }
    ///             _ => smallvec![Effect::None],
    ///         }
    ///     }
    /// }
    /// ```
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// This is a pure function that:
        /// 1. Validates the action
        /// 2. Updates state in place
        /// 3. Returns effect descriptions to be executed
        ///
        /// The reducer never suspends; all asynchronous work belongs in the
        /// returned effects.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Environment module - Dependency injection traits
///
/// All time-dependent behavior (delays, debouncing, throttling) goes through
/// a [`Scheduler`](environment::Scheduler) injected via the Environment, so
/// tests can drive time explicitly instead of sleeping.
pub mod environment {
    use futures::future::BoxFuture;
    use std::ops::Add;
    use std::sync::Arc;
    use std::time::Duration;

    /// A point on a scheduler's logical timeline
    ///
    /// Measured as the time elapsed since the scheduler's epoch. Instants
    /// from different schedulers are not comparable.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct SchedulerInstant(Duration);

    impl SchedulerInstant {
        /// The scheduler's epoch
        pub const EPOCH: Self = Self(Duration::ZERO);

        /// Create an instant from the time elapsed since the epoch
        #[must_use]
        pub const fn from_elapsed(elapsed: Duration) -> Self {
            Self(elapsed)
        }

        /// Time elapsed since the epoch
        #[must_use]
        pub const fn elapsed(self) -> Duration {
            self.0
        }

        /// Time elapsed from `earlier` to `self`, or zero if `earlier` is later
        #[must_use]
        pub const fn saturating_duration_since(self, earlier: Self) -> Duration {
            self.0.saturating_sub(earlier.0)
        }
    }

    impl Add<Duration> for SchedulerInstant {
        type Output = Self;

        fn add(self, rhs: Duration) -> Self {
            Self(self.0.saturating_add(rhs))
        }
    }

    /// Scheduler trait - the logical clock effects are timed against
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Production - backed by tokio timers
    /// let scheduler: SchedulerRef = Arc::new(TokioScheduler::new());
    ///
    /// // Test - time only moves when the test says so
    /// let scheduler = TestScheduler::new();
    /// scheduler.advance(Duration::from_millis(300)).await;
    /// ```
    pub trait Scheduler: Send + Sync {
        /// The current logical time
        fn now(&self) -> SchedulerInstant;

        /// A future that resolves once `duration` has elapsed on this scheduler
        ///
        /// The deadline is fixed when this method is called, not when the
        /// returned future is first polled.
        fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
    }

    /// Shared handle to a scheduler, as carried by timed effects
    pub type SchedulerRef = Arc<dyn Scheduler>;
}

#[cfg(test)]
mod tests {
    use super::environment::SchedulerInstant;
    use proptest::prelude::*;
    use std::time::Duration;

    #[test]
    fn test_instant_arithmetic() {
        let start = SchedulerInstant::from_elapsed(Duration::from_millis(300));
        let later = start + Duration::from_millis(700);

        assert_eq!(later.elapsed(), Duration::from_secs(1));
        assert_eq!(later.saturating_duration_since(start), Duration::from_millis(700));
        assert_eq!(start.saturating_duration_since(later), Duration::ZERO);
        assert!(SchedulerInstant::EPOCH < start);
    }

    proptest! {
        #[test]
        fn prop_adding_then_measuring_is_exact(start in 0_u64..1_000_000, step in 0_u64..1_000_000) {
            let from = SchedulerInstant::from_elapsed(Duration::from_millis(start));
            let to = from + Duration::from_millis(step);

            prop_assert_eq!(to.saturating_duration_since(from), Duration::from_millis(step));
            prop_assert_eq!(to.elapsed(), Duration::from_millis(start + step));
            prop_assert!(from <= to);
        }

        #[test]
        fn prop_earlier_instant_measures_zero(a in 0_u64..1_000_000, b in 0_u64..1_000_000) {
            let (a, b) = (
                SchedulerInstant::from_elapsed(Duration::from_millis(a)),
                SchedulerInstant::from_elapsed(Duration::from_millis(b)),
            );
            let (earlier, later) = if a <= b { (a, b) } else { (b, a) };

            prop_assert_eq!(earlier.saturating_duration_since(later), Duration::ZERO);
        }
    }
}
