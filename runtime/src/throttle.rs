//! Per-identifier throttle state.
//!
//! The engine only decides; it never sleeps. The executor asks it what to do
//! with each value a throttled effect produces and schedules the trailing
//! emission on the effect's scheduler.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tessera_core::EffectId;
use tessera_core::environment::SchedulerInstant;

/// What to do with a value offered to the throttle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThrottleDecision<A> {
    /// The window is open: deliver the value now
    Emit(A),

    /// The window is closed: the value (or an earlier one) is pending and
    /// should be fired after `delay`
    Schedule {
        /// Time until the window closes
        delay: Duration,
    },
}

struct ThrottleState<A> {
    last_emission: Option<SchedulerInstant>,
    pending: Option<A>,
}

impl<A> Default for ThrottleState<A> {
    fn default() -> Self {
        Self {
            last_emission: None,
            pending: None,
        }
    }
}

/// Throttle table keyed by effect identifier
///
/// State belongs to the identifier, not to a single effect: every effect
/// throttled under an equal id shares the window and the pending value, and
/// the state outlives the effects until [`ThrottleEngine::clear`].
pub struct ThrottleEngine<A> {
    states: Mutex<HashMap<EffectId, ThrottleState<A>>>,
}

impl<A> Default for ThrottleEngine<A> {
    fn default() -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
        }
    }
}

impl<A> std::fmt::Debug for ThrottleEngine<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThrottleEngine")
            .field("ids", &self.lock().len())
            .finish()
    }
}

impl<A> ThrottleEngine<A> {
    /// Create an empty engine
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<EffectId, ThrottleState<A>>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Offer a value produced at `now`
    ///
    /// Emits immediately when nothing was emitted for `id` yet or the last
    /// emission is at least `interval` old. Otherwise the value becomes the
    /// pending one (when `latest`, or when nothing is pending yet) and the
    /// caller is told how long until the window closes.
    pub fn offer(
        &self,
        id: &EffectId,
        value: A,
        interval: Duration,
        latest: bool,
        now: SchedulerInstant,
    ) -> ThrottleDecision<A> {
        let mut states = self.lock();
        let state = states.entry(id.clone()).or_default();

        match state.last_emission {
            Some(last) if now.saturating_duration_since(last) < interval => {
                if latest || state.pending.is_none() {
                    state.pending = Some(value);
                }
                ThrottleDecision::Schedule {
                    delay: (last + interval).saturating_duration_since(now),
                }
            },
            _ => {
                state.last_emission = Some(now);
                state.pending = None;
                ThrottleDecision::Emit(value)
            },
        }
    }

    /// Take the pending value for `id` at `now`, recording the emission
    ///
    /// Returns `None` (and leaves the window untouched) when nothing is pending.
    pub fn fire(&self, id: &EffectId, now: SchedulerInstant) -> Option<A> {
        let mut states = self.lock();
        let state = states.get_mut(id)?;
        let value = state.pending.take()?;
        state.last_emission = Some(now);
        Some(value)
    }

    /// Drop the value waiting for `id`'s window to close
    ///
    /// The window itself is kept, so a later value inside it is still held
    /// back. Returns whether a value was dropped.
    pub fn discard_pending(&self, id: &EffectId) -> bool {
        self.lock()
            .get_mut(id)
            .is_some_and(|state| state.pending.take().is_some())
    }

    /// Forget everything about `id`
    pub fn clear(&self, id: &EffectId) {
        self.lock().remove(id);
    }

    /// Forget every identifier
    pub fn clear_all(&self) {
        self.lock().clear();
    }

    /// When `id` last emitted
    #[must_use]
    pub fn last_emission(&self, id: &EffectId) -> Option<SchedulerInstant> {
        self.lock().get(id).and_then(|state| state.last_emission)
    }

    /// Check whether a value is waiting for the window to close
    #[must_use]
    pub fn has_pending(&self, id: &EffectId) -> bool {
        self.lock()
            .get(id)
            .is_some_and(|state| state.pending.is_some())
    }
}
