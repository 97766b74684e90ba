//! Ergonomic testing utilities for reducers
//!
//! This module provides a fluent API for testing reducers with readable Given-When-Then syntax.

#![allow(clippy::module_name_repetitions)] // ReducerTest is the natural name

use tessera_core::{effect::Effect, reducer::Reducer};

/// Type alias for state assertion functions
type StateAssertion<S> = Box<dyn FnOnce(&S)>;

/// Type alias for effect assertion functions
type EffectAssertion<A> = Box<dyn FnOnce(&[Effect<A>])>;

/// Fluent API for testing reducers with Given-When-Then syntax
///
/// Effects are inspected, never run. To see what an effect emits, hand it to
/// an [`EffectProbe`](crate::EffectProbe).
///
/// # Example
///
/// ```ignore
/// use tessera_testing::{ReducerTest, assertions};
///
/// ReducerTest::new(SearchReducer)
///     .with_env(test_environment())
///     .given_state(SearchState::default())
///     .when_action(SearchAction::QueryChanged("rust".into()))
///     .then_state(|state| {
///         assert_eq!(state.query, "rust");
///     })
///     .then_effects(|effects| {
///         assertions::assert_has_cancellable(effects, "search");
///     })
///     .run();
/// ```
pub struct ReducerTest<R, S, A, E>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    reducer: R,
    environment: Option<E>,
    initial_state: Option<S>,
    actions: Vec<A>,
    state_assertions: Vec<StateAssertion<S>>,
    effect_assertions: Vec<EffectAssertion<A>>,
}

impl<R, S, A, E> ReducerTest<R, S, A, E>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    /// Create a new reducer test with the given reducer
    #[must_use]
    pub const fn new(reducer: R) -> Self {
        Self {
            reducer,
            environment: None,
            initial_state: None,
            actions: Vec::new(),
            state_assertions: Vec::new(),
            effect_assertions: Vec::new(),
        }
    }

    /// Set the environment for the test
    #[must_use]
    pub fn with_env(mut self, env: E) -> Self {
        self.environment = Some(env);
        self
    }

    /// Set the initial state (Given)
    #[must_use]
    pub fn given_state(mut self, state: S) -> Self {
        self.initial_state = Some(state);
        self
    }

    /// Add an action to reduce (When)
    ///
    /// Actions are reduced in the order they were added. Effect assertions
    /// see the effects returned by the last one.
    #[must_use]
    pub fn when_action(mut self, action: A) -> Self {
        self.actions.push(action);
        self
    }

    /// Add an assertion about the resulting state (Then)
    #[must_use]
    pub fn then_state<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&S) + 'static,
    {
        self.state_assertions.push(Box::new(assertion));
        self
    }

    /// Add an assertion about the resulting effects (Then)
    #[must_use]
    pub fn then_effects<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&[Effect<A>]) + 'static,
    {
        self.effect_assertions.push(Box::new(assertion));
        self
    }

    /// Run the test and execute all assertions
    ///
    /// # Panics
    ///
    /// Panics if initial state, action, or environment is not set,
    /// or if any assertions fail.
    #[allow(clippy::panic)] // Test code can panic
    #[allow(clippy::expect_used)] // Test code can use expect
    pub fn run(self) {
        let mut state = self
            .initial_state
            .expect("Initial state must be set with given_state()");

        assert!(
            !self.actions.is_empty(),
            "Action must be set with when_action()"
        );

        let env = self
            .environment
            .expect("Environment must be set with with_env()");

        // Execute reducer
        let mut effects = Vec::new();
        for action in self.actions {
            effects = self.reducer.reduce(&mut state, action, &env).into_vec();
        }

        // Run state assertions
        for assertion in self.state_assertions {
            assertion(&state);
        }

        // Run effect assertions
        for assertion in self.effect_assertions {
            assertion(&effects);
        }
    }
}

/// Helper assertions for effects
///
/// Apart from [`assert_effects_count`], these look through combinators:
/// an effect nested in `merge`, `chain`, `cancellable`, `deferred` or
/// `throttle` counts.
pub mod assertions {
    use tessera_core::EffectId;
    use tessera_core::effect::Effect;

    /// Check whether any effect in the tree satisfies `predicate`
    pub fn contains<A>(effects: &[Effect<A>], predicate: &impl Fn(&Effect<A>) -> bool) -> bool {
        effects.iter().any(|effect| {
            predicate(effect)
                || match effect {
                    Effect::Parallel(children) | Effect::Sequential(children) => {
                        contains(children, predicate)
                    },
                    Effect::Cancellable { effect, .. }
                    | Effect::Deferred { effect, .. }
                    | Effect::Throttle { effect, .. } => {
                        contains(std::slice::from_ref(effect.as_ref()), predicate)
                    },
                    _ => false,
                }
        })
    }

    /// Assert that there are no effects
    ///
    /// # Panics
    ///
    /// Panics if effects is not empty.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_no_effects<A: std::fmt::Debug>(effects: &[Effect<A>]) {
        assert!(
            effects.iter().all(Effect::is_none),
            "Expected no effects, but found {}: {:?}",
            effects.len(),
            effects
        );
    }

    /// Assert the number of effects
    ///
    /// # Panics
    ///
    /// Panics if the number of effects doesn't match expected.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_effects_count<A>(effects: &[Effect<A>], expected: usize) {
        assert_eq!(
            effects.len(),
            expected,
            "Expected {} effects, but found {}",
            expected,
            effects.len()
        );
    }

    /// Assert that effects contain at least one Future effect
    ///
    /// # Panics
    ///
    /// Panics if no Future effect is found.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_has_future_effect<A>(effects: &[Effect<A>]) {
        assert!(
            contains(effects, &|e| matches!(e, Effect::Future(_))),
            "Expected at least one Future effect, but none found"
        );
    }

    /// Assert that some effect is cancellable under `id`
    ///
    /// # Panics
    ///
    /// Panics if no effect is registered under `id`.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_has_cancellable<A: std::fmt::Debug>(effects: &[Effect<A>], id: impl Into<EffectId>) {
        let id = id.into();
        assert!(
            contains(effects, &|e| matches!(e, Effect::Cancellable { id: found, .. } if *found == id)),
            "Expected an effect cancellable under {id}, found {effects:?}"
        );
    }

    /// Assert that some effect cancels `id`
    ///
    /// # Panics
    ///
    /// Panics if no `Cancel` effect names `id`.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_cancels<A: std::fmt::Debug>(effects: &[Effect<A>], id: impl Into<EffectId>) {
        let id = id.into();
        assert!(
            contains(effects, &|e| matches!(e, Effect::Cancel(ids) if ids.contains(&id))),
            "Expected an effect cancelling {id}, found {effects:?}"
        );
    }

    /// Assert that some effect is throttled under `id`
    ///
    /// # Panics
    ///
    /// Panics if no effect is throttled under `id`.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_has_throttle<A: std::fmt::Debug>(effects: &[Effect<A>], id: impl Into<EffectId>) {
        let id = id.into();
        assert!(
            contains(effects, &|e| matches!(e, Effect::Throttle { id: found, .. } if *found == id)),
            "Expected an effect throttled under {id}, found {effects:?}"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tessera_core::environment::SchedulerRef;
    use tessera_core::reducer::Reducer;
    use tessera_core::{SmallVec, smallvec};
    use crate::ImmediateScheduler;

    #[derive(Clone, Debug)]
    struct TestState {
        count: i32,
    }

    #[derive(Clone, Debug)]
    enum TestAction {
        Increment,
        Decrement,
        Schedule,
        Stop,
    }

    struct TestReducer;

    struct TestEnv {
        scheduler: SchedulerRef,
    }

    impl Reducer for TestReducer {
        type State = TestState;
        type Action = TestAction;
        type Environment = TestEnv;

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]> {
            match action {
                TestAction::Increment => {
                    state.count += 1;
                    smallvec![Effect::None]
                }
                TestAction::Decrement => {
                    state.count -= 1;
                    smallvec![Effect::None]
                }
                TestAction::Schedule => smallvec![Effect::merge(vec![
                    Effect::send(TestAction::Increment)
                        .debounce("tick", Duration::from_millis(100), Arc::clone(&env.scheduler)),
                    Effect::send(TestAction::Decrement).throttle(
                        "tock",
                        Duration::from_secs(1),
                        Arc::clone(&env.scheduler),
                        true,
                    ),
                ])],
                TestAction::Stop => smallvec![Effect::cancel_all(["tick", "tock"])],
            }
        }
    }

    fn env() -> TestEnv {
        TestEnv {
            scheduler: Arc::new(ImmediateScheduler::new()),
        }
    }

    #[test]
    fn test_reducer_test_increment() {
        ReducerTest::new(TestReducer)
            .with_env(env())
            .given_state(TestState { count: 0 })
            .when_action(TestAction::Increment)
            .then_state(|state| {
                assert_eq!(state.count, 1);
            })
            .then_effects(|effects| {
                assertions::assert_no_effects(effects);
            })
            .run();
    }

    #[test]
    fn test_reducer_test_action_sequence() {
        ReducerTest::new(TestReducer)
            .with_env(env())
            .given_state(TestState { count: 5 })
            .when_action(TestAction::Decrement)
            .when_action(TestAction::Decrement)
            .when_action(TestAction::Increment)
            .then_state(|state| {
                assert_eq!(state.count, 4);
            })
            .run();
    }

    #[test]
    fn test_assertions_look_through_combinators() {
        ReducerTest::new(TestReducer)
            .with_env(env())
            .given_state(TestState { count: 0 })
            .when_action(TestAction::Schedule)
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_has_cancellable(effects, "tick");
                assertions::assert_has_throttle(effects, "tock");
                assertions::assert_has_future_effect(effects);
            })
            .run();
    }

    #[test]
    fn test_assert_cancels() {
        ReducerTest::new(TestReducer)
            .with_env(env())
            .given_state(TestState { count: 0 })
            .when_action(TestAction::Stop)
            .then_effects(|effects| {
                assertions::assert_cancels(effects, "tick");
                assertions::assert_cancels(effects, "tock");
            })
            .run();
    }

    #[test]
    #[should_panic(expected = "Expected an effect cancellable under")]
    fn test_assert_has_cancellable_fails_for_other_id() {
        let effects = vec![Effect::send(1).cancellable("a", false)];
        assertions::assert_has_cancellable(&effects, "b");
    }

    #[test]
    fn test_assertions_no_effects() {
        assertions::assert_no_effects::<TestAction>(&[Effect::None]);
        assertions::assert_no_effects::<TestAction>(&[]);
    }
}
