//! Declarative macros for ergonomic effect construction
//!
//! These macros reduce boilerplate when creating `Effect` values from
//! inline async blocks and when cancelling several identifiers at once.

/// Create an `Effect::Future` from an async block yielding `Option<Action>`
///
/// # Example
///
/// ```
/// use tessera_core::{async_effect, effect::Effect};
///
/// #[derive(Debug)]
/// enum Action {
///     Loaded(u32),
/// }
///
/// let effect: Effect<Action> = async_effect! {
///     let rows = 3;
///     Some(Action::Loaded(rows))
/// };
/// assert!(matches!(effect, Effect::Future(_)));
/// ```
#[macro_export]
macro_rules! async_effect {
    ($($body:tt)*) => {
        $crate::effect::Effect::future(async move { $($body)* })
    };
}

/// Create a fallible `Effect::Future` from an async block yielding `Result<Action, E>`
///
/// The block may use `?`; an `Err` becomes a `ComputationFailed` outcome.
///
/// # Example
///
/// ```
/// use tessera_core::{effect::Effect, try_effect};
///
/// #[derive(Debug)]
/// enum Action {
///     Parsed(u32),
/// }
///
/// let effect: Effect<Action> = try_effect! {
///     let value: u32 = "42".parse()?;
///     Ok::<_, std::num::ParseIntError>(Action::Parsed(value))
/// };
/// assert!(matches!(effect, Effect::Future(_)));
/// ```
#[macro_export]
macro_rules! try_effect {
    ($($body:tt)*) => {
        $crate::effect::Effect::task(async move { $($body)* })
    };
}

/// Create an `Effect::Delay` for scheduling delayed actions
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use tessera_core::{delay, effect::Effect};
///
/// #[derive(Debug)]
/// enum Action {
///     Expired,
/// }
///
/// let effect = delay! {
///     duration: Duration::from_secs(30),
///     action: Action::Expired
/// };
/// assert!(matches!(effect, Effect::Delay { .. }));
/// ```
#[macro_export]
macro_rules! delay {
    (
        duration: $duration:expr,
        action: $action:expr
    ) => {
        $crate::effect::Effect::delay($duration, $action)
    };
}

/// Create an `Effect::Cancel` for one or more identifiers
///
/// # Example
///
/// ```
/// use tessera_core::{cancel, effect::Effect};
///
/// let effect: Effect<()> = cancel!("search", "autosave", 7_u64);
/// assert!(matches!(effect, Effect::Cancel(ref ids) if ids.len() == 3));
/// ```
#[macro_export]
macro_rules! cancel {
    ($($id:expr),+ $(,)?) => {
        $crate::effect::Effect::Cancel(::std::vec![$($crate::cancellation::EffectId::from($id)),+])
    };
}

#[cfg(test)]
mod tests {
    use crate::cancellation::EffectId;
    use crate::effect::Effect;
    use crate::error::EffectError;
    use std::time::Duration;

    #[derive(Clone, Debug, PartialEq)]
    enum TestAction {
        AsyncResult { value: i32 },
        TimeoutExpired,
    }

    #[tokio::test]
    async fn test_async_effect_macro() {
        let effect = async_effect! {
            Some(TestAction::AsyncResult { value: 42 })
        };

        let Effect::Future(future) = effect else {
            unreachable!("async_effect! builds a future");
        };
        assert_eq!(
            future.await,
            Ok(Some(TestAction::AsyncResult { value: 42 }))
        );
    }

    #[tokio::test]
    async fn test_try_effect_macro_surfaces_errors() {
        let effect: Effect<TestAction> = try_effect! {
            let value: i32 = "not a number".parse()?;
            Ok::<_, std::num::ParseIntError>(TestAction::AsyncResult { value })
        };

        let Effect::Future(future) = effect else {
            unreachable!("try_effect! builds a future");
        };
        assert!(matches!(
            future.await,
            Err(EffectError::ComputationFailed(_))
        ));
    }

    #[test]
    fn test_delay_macro() {
        let effect = delay! {
            duration: Duration::from_secs(30),
            action: TestAction::TimeoutExpired
        };

        match effect {
            Effect::Delay { duration, action } => {
                assert_eq!(duration, Duration::from_secs(30));
                assert_eq!(*action, TestAction::TimeoutExpired);
            },
            other => unreachable!("unexpected effect: {other:?}"),
        }
    }

    #[test]
    fn test_cancel_macro() {
        let effect: Effect<TestAction> = cancel!("search", 3_u64);
        match effect {
            Effect::Cancel(ids) => {
                assert_eq!(ids, vec![EffectId::from("search"), EffectId::from(3_u64)]);
            },
            other => unreachable!("unexpected effect: {other:?}"),
        }
    }
}
