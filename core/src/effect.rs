//! Effect descriptions.
//!
//! Effects are NOT executed immediately. They are descriptions of work,
//! returned from reducers and executed by the runtime, which feeds every
//! action they emit back into the reducer.
//!
//! Effects compose with plain combinators:
//!
//! ```
//! use std::time::Duration;
//! use tessera_core::effect::Effect;
//!
//! #[derive(Clone, Debug, PartialEq)]
//! enum Action {
//!     Loaded(u32),
//!     Tick,
//! }
//!
//! let load = Effect::single(async { 42 }).map(Action::Loaded);
//! let tick = Effect::delay(Duration::from_secs(1), Action::Tick);
//!
//! let effect = Effect::merge(vec![load, tick]).cancellable("screen", true);
//! assert!(matches!(effect, Effect::Cancellable { cancel_in_flight: true, .. }));
//! ```

use crate::cancellation::EffectId;
use crate::environment::SchedulerRef;
use crate::error::EffectError;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, Stream, StreamExt};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Effect type - describes a side effect to be executed
///
/// # Type Parameters
///
/// - `Action`: The action type that effects can produce (feedback loop)
#[must_use = "effects do nothing unless returned to the runtime"]
pub enum Effect<Action> {
    /// No-op effect
    None,

    /// One-shot asynchronous computation
    ///
    /// `Ok(Some(action))` feeds the action back into the reducer, `Ok(None)`
    /// completes silently and `Err` is reported as a terminal failure.
    Future(BoxFuture<'static, Result<Option<Action>, EffectError>>),

    /// Asynchronous sequence of actions
    ///
    /// The first `Err` item terminates the stream as a failure.
    Stream(BoxStream<'static, Result<Action, EffectError>>),

    /// Run effects concurrently; actions interleave in emission order
    Parallel(Vec<Effect<Action>>),

    /// Run effects one after another
    Sequential(Vec<Effect<Action>>),

    /// Emit an action after a delay on the runtime's scheduler
    Delay {
        /// How long to wait
        duration: Duration,
        /// Action to dispatch after delay
        action: Box<Action>,
    },

    /// Start an effect after a delay on an explicit scheduler
    Deferred {
        /// How long to wait before starting
        duration: Duration,
        /// Scheduler measuring the delay
        scheduler: SchedulerRef,
        /// Effect started once the delay elapses
        effect: Box<Effect<Action>>,
    },

    /// Effect addressable for cancellation under `id`
    Cancellable {
        /// Cancellation identifier
        id: EffectId,
        /// Cancel effects already running under `id` before starting
        cancel_in_flight: bool,
        /// The wrapped effect
        effect: Box<Effect<Action>>,
    },

    /// Cancel every running effect registered under the given identifiers
    Cancel(Vec<EffectId>),

    /// Let at most one value per `interval` through for `id`
    Throttle {
        /// Throttle (and cancellation) identifier
        id: EffectId,
        /// Minimum spacing between emissions
        interval: Duration,
        /// Scheduler measuring the interval
        scheduler: SchedulerRef,
        /// Emit the latest value of a window instead of the first
        latest: bool,
        /// The source effect
        effect: Box<Effect<Action>>,
    },
}

// Manual Debug implementation since futures and streams don't implement Debug
impl<Action> std::fmt::Debug for Effect<Action>
where
    Action: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Effect::None => write!(f, "Effect::None"),
            Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
            Effect::Stream(_) => write!(f, "Effect::Stream(<stream>)"),
            Effect::Parallel(effects) => {
                f.debug_tuple("Effect::Parallel").field(effects).finish()
            },
            Effect::Sequential(effects) => {
                f.debug_tuple("Effect::Sequential").field(effects).finish()
            },
            Effect::Delay { duration, action } => f
                .debug_struct("Effect::Delay")
                .field("duration", duration)
                .field("action", action)
                .finish(),
            Effect::Deferred {
                duration, effect, ..
            } => f
                .debug_struct("Effect::Deferred")
                .field("duration", duration)
                .field("effect", effect)
                .finish_non_exhaustive(),
            Effect::Cancellable {
                id,
                cancel_in_flight,
                effect,
            } => f
                .debug_struct("Effect::Cancellable")
                .field("id", id)
                .field("cancel_in_flight", cancel_in_flight)
                .field("effect", effect)
                .finish(),
            Effect::Cancel(ids) => f.debug_tuple("Effect::Cancel").field(ids).finish(),
            Effect::Throttle {
                id,
                interval,
                latest,
                effect,
                ..
            } => f
                .debug_struct("Effect::Throttle")
                .field("id", id)
                .field("interval", interval)
                .field("latest", latest)
                .field("effect", effect)
                .finish_non_exhaustive(),
        }
    }
}

impl<Action> Effect<Action> {
    /// An effect that performs no work and produces no actions
    pub const fn none() -> Self {
        Effect::None
    }

    /// Check if this is the no-op effect
    #[must_use]
    pub const fn is_none(&self) -> bool {
        matches!(self, Effect::None)
    }

    /// Combine effects to run in parallel
    pub const fn merge(effects: Vec<Effect<Action>>) -> Effect<Action> {
        Effect::Parallel(effects)
    }

    /// Chain effects to run sequentially
    pub const fn chain(effects: Vec<Effect<Action>>) -> Effect<Action> {
        Effect::Sequential(effects)
    }

    /// Emit `action` after `duration` on the runtime's scheduler
    pub fn delay(duration: Duration, action: Action) -> Self {
        Effect::Delay {
            duration,
            action: Box::new(action),
        }
    }

    /// Cancel every effect running under `id`
    pub fn cancel(id: impl Into<EffectId>) -> Self {
        Effect::Cancel(vec![id.into()])
    }

    /// Cancel every effect running under any of `ids`
    pub fn cancel_all<I, T>(ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<EffectId>,
    {
        Effect::Cancel(ids.into_iter().map(Into::into).collect())
    }

    /// Make this effect cancellable under `id`
    ///
    /// With `cancel_in_flight`, effects already running under `id` are
    /// cancelled before this one starts, so at most one effect per `id`
    /// is live as long as every producer passes `true`.
    pub fn cancellable(self, id: impl Into<EffectId>, cancel_in_flight: bool) -> Self {
        Effect::Cancellable {
            id: id.into(),
            cancel_in_flight,
            effect: Box::new(self),
        }
    }

    /// Start this effect after `duration` on `scheduler`
    pub fn deferred(self, duration: Duration, scheduler: SchedulerRef) -> Self {
        Effect::Deferred {
            duration,
            scheduler,
            effect: Box::new(self),
        }
    }

    /// Start this effect once `duration` passes without another debounce for `id`
    ///
    /// Every new debounce under `id` cancels the pending one and restarts
    /// the delay.
    pub fn debounce(
        self,
        id: impl Into<EffectId>,
        duration: Duration,
        scheduler: SchedulerRef,
    ) -> Self {
        self.deferred(duration, scheduler).cancellable(id, true)
    }

    /// Throttle the values of this effect under `id`
    ///
    /// The first value after a quiet period goes through immediately.
    /// Values arriving within `interval` of the last emission are held and
    /// the held value (the latest one if `latest`, the first one otherwise)
    /// is emitted when the interval ends.
    ///
    /// Throttle state belongs to `id`, not to this effect: every effect
    /// throttled under an equal id shares the same window.
    pub fn throttle(
        self,
        id: impl Into<EffectId>,
        interval: Duration,
        scheduler: SchedulerRef,
        latest: bool,
    ) -> Self {
        Effect::Throttle {
            id: id.into(),
            interval,
            scheduler,
            latest,
            effect: Box::new(self),
        }
    }
}

impl<Action: Send + 'static> Effect<Action> {
    /// Wrap a one-shot computation that may or may not produce an action
    pub fn future<F>(future: F) -> Self
    where
        F: Future<Output = Option<Action>> + Send + 'static,
    {
        Effect::Future(future.map(Ok).boxed())
    }

    /// Wrap a one-shot computation producing exactly one action
    pub fn single<F>(future: F) -> Self
    where
        F: Future<Output = Action> + Send + 'static,
    {
        Effect::Future(future.map(|action| Ok(Some(action))).boxed())
    }

    /// Wrap a fallible one-shot computation
    ///
    /// An `Err` is surfaced as [`EffectError::ComputationFailed`]; use
    /// [`Effect::catch`] to turn it into an action.
    pub fn task<F, E>(future: F) -> Self
    where
        F: Future<Output = Result<Action, E>> + Send + 'static,
        E: Display,
    {
        Effect::Future(
            future
                .map(|result| result.map(Some).map_err(EffectError::computation))
                .boxed(),
        )
    }

    /// Emit `action` immediately
    pub fn send(action: Action) -> Self {
        Effect::Future(futures::future::ready(Ok(Some(action))).boxed())
    }

    /// Wrap a stream of actions
    pub fn stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Action> + Send + 'static,
    {
        Effect::Stream(stream.map(Ok::<Action, EffectError>).boxed())
    }

    /// Wrap a fallible stream of actions; the first `Err` ends it
    pub fn try_stream<S, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<Action, E>> + Send + 'static,
        E: Display,
    {
        Effect::Stream(
            stream
                .map(|item| item.map_err(EffectError::computation))
                .boxed(),
        )
    }

    /// Transform every action this effect emits
    ///
    /// Cancellation and throttle wrappers are preserved: the mapped effect is
    /// addressed by the same identifiers as the original.
    pub fn map<B, F>(self, transform: F) -> Effect<B>
    where
        F: Fn(Action) -> B + Send + Sync + 'static,
        B: Send + 'static,
    {
        self.map_shared(&Arc::new(transform))
    }

    fn map_shared<B, F>(self, transform: &Arc<F>) -> Effect<B>
    where
        F: Fn(Action) -> B + Send + Sync + 'static,
        B: Send + 'static,
    {
        match self {
            Effect::None => Effect::None,
            Effect::Future(future) => {
                let transform = Arc::clone(transform);
                Effect::Future(
                    future
                        .map(move |result| result.map(|action| action.map(&*transform)))
                        .boxed(),
                )
            },
            Effect::Stream(stream) => {
                let transform = Arc::clone(transform);
                Effect::Stream(
                    stream
                        .map(move |item| item.map(&*transform))
                        .boxed(),
                )
            },
            Effect::Parallel(effects) => Effect::Parallel(
                effects
                    .into_iter()
                    .map(|effect| effect.map_shared(transform))
                    .collect(),
            ),
            Effect::Sequential(effects) => Effect::Sequential(
                effects
                    .into_iter()
                    .map(|effect| effect.map_shared(transform))
                    .collect(),
            ),
            Effect::Delay { duration, action } => Effect::Delay {
                duration,
                action: Box::new((**transform)(*action)),
            },
            Effect::Deferred {
                duration,
                scheduler,
                effect,
            } => Effect::Deferred {
                duration,
                scheduler,
                effect: Box::new(effect.map_shared(transform)),
            },
            Effect::Cancellable {
                id,
                cancel_in_flight,
                effect,
            } => Effect::Cancellable {
                id,
                cancel_in_flight,
                effect: Box::new(effect.map_shared(transform)),
            },
            Effect::Cancel(ids) => Effect::Cancel(ids),
            Effect::Throttle {
                id,
                interval,
                scheduler,
                latest,
                effect,
            } => Effect::Throttle {
                id,
                interval,
                scheduler,
                latest,
                effect: Box::new(effect.map_shared(transform)),
            },
        }
    }

    /// Turn terminal failures into a final action
    ///
    /// The failing future or stream emits `on_failure(error)` and completes
    /// instead of failing.
    pub fn catch<F>(self, on_failure: F) -> Self
    where
        F: Fn(EffectError) -> Action + Send + Sync + 'static,
    {
        self.catch_shared(&Arc::new(on_failure))
    }

    fn catch_shared<F>(self, on_failure: &Arc<F>) -> Self
    where
        F: Fn(EffectError) -> Action + Send + Sync + 'static,
    {
        match self {
            Effect::Future(future) => {
                let on_failure = Arc::clone(on_failure);
                Effect::Future(
                    future
                        .map(move |result| Ok(result.unwrap_or_else(|error| Some(on_failure(error)))))
                        .boxed(),
                )
            },
            Effect::Stream(stream) => {
                let on_failure = Arc::clone(on_failure);
                Effect::Stream(
                    futures::stream::unfold(Some(stream), move |stream| {
                        let on_failure = Arc::clone(&on_failure);
                        async move {
                            let mut stream = stream?;
                            match stream.next().await? {
                                Ok(action) => Some((Ok(action), Some(stream))),
                                Err(error) => Some((Ok(on_failure(error)), None)),
                            }
                        }
                    })
                    .boxed(),
                )
            },
            Effect::Parallel(effects) => Effect::Parallel(
                effects
                    .into_iter()
                    .map(|effect| effect.catch_shared(on_failure))
                    .collect(),
            ),
            Effect::Sequential(effects) => Effect::Sequential(
                effects
                    .into_iter()
                    .map(|effect| effect.catch_shared(on_failure))
                    .collect(),
            ),
            Effect::Deferred {
                duration,
                scheduler,
                effect,
            } => Effect::Deferred {
                duration,
                scheduler,
                effect: Box::new(effect.catch_shared(on_failure)),
            },
            Effect::Cancellable {
                id,
                cancel_in_flight,
                effect,
            } => Effect::Cancellable {
                id,
                cancel_in_flight,
                effect: Box::new(effect.catch_shared(on_failure)),
            },
            Effect::Throttle {
                id,
                interval,
                scheduler,
                latest,
                effect,
            } => Effect::Throttle {
                id,
                interval,
                scheduler,
                latest,
                effect: Box::new(effect.catch_shared(on_failure)),
            },
            other @ (Effect::None | Effect::Delay { .. } | Effect::Cancel(_)) => other,
        }
    }
}
