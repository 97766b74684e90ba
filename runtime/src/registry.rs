//! Cancellation registry: live effects addressed by [`EffectId`].
//!
//! Every cancellable effect registers its token here when it starts and
//! deregisters when it finishes. Cancelling an identifier cancels every
//! token registered under it.

use crate::metrics::RegistryMetrics;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tessera_core::{CancellationToken, EffectId};

/// Table of live cancellation tokens keyed by effect identifier
///
/// Several tokens may live under one identifier (effects started without
/// `cancel_in_flight`). Registration, deregistration and cancellation all
/// happen under a single lock, so a cancel-in-flight registration can never
/// race a concurrent registration for the same identifier into two live
/// entries.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use tessera_core::CancellationToken;
/// use tessera_runtime::registry::CancellationRegistry;
///
/// let registry = Arc::new(CancellationRegistry::new());
/// let token = CancellationToken::new();
/// let _registration = registry.register("search".into(), token.clone(), false);
///
/// assert_eq!(registry.cancel(&"search".into()), 1);
/// assert!(token.is_cancelled());
/// assert_eq!(registry.cancel(&"search".into()), 0);
/// ```
#[derive(Debug, Default)]
pub struct CancellationRegistry {
    table: Mutex<RegistryTable>,
    next_key: AtomicU64,
}

#[derive(Debug, Default)]
struct RegistryTable {
    entries: HashMap<EffectId, HashMap<u64, CancellationToken>>,
    live: usize,
}

impl RegistryTable {
    fn remove_all(&mut self, id: &EffectId) -> usize {
        let Some(tokens) = self.entries.remove(id) else {
            return 0;
        };

        for token in tokens.values() {
            token.cancel();
        }

        self.live -= tokens.len();
        tokens.len()
    }
}

impl CancellationRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `token` under `id`
    ///
    /// With `cancel_in_flight`, every token already registered under `id` is
    /// cancelled and removed before `token` is inserted, in the same
    /// critical section.
    ///
    /// The returned [`Registration`] removes the entry again when dropped.
    pub fn register(
        self: &Arc<Self>,
        id: EffectId,
        token: CancellationToken,
        cancel_in_flight: bool,
    ) -> Registration {
        let key = self.next_key.fetch_add(1, Ordering::Relaxed);

        let (replaced, live) = {
            let mut table = self.lock();
            let replaced = if cancel_in_flight {
                table.remove_all(&id)
            } else {
                0
            };

            table.entries.entry(id.clone()).or_default().insert(key, token);
            table.live += 1;
            (replaced, table.live)
        };

        if replaced > 0 {
            tracing::debug!(%id, replaced, "Cancelled in-flight effects");
            RegistryMetrics::record_cancelled(replaced);
        }
        RegistryMetrics::record_live(live);

        Registration {
            registry: Arc::clone(self),
            id,
            key,
        }
    }

    /// Cancel and remove every token registered under `id`
    ///
    /// Returns the number of tokens cancelled; an unknown `id` is a no-op
    /// returning zero. Only requests cancellation; it does not wait for the
    /// effects to stop.
    pub fn cancel(&self, id: &EffectId) -> usize {
        self.cancel_many(std::slice::from_ref(id))
    }

    /// Cancel and remove every token registered under any of `ids`
    pub fn cancel_many(&self, ids: &[EffectId]) -> usize {
        let (cancelled, live) = {
            let mut table = self.lock();
            let cancelled: usize = ids.iter().map(|id| table.remove_all(id)).sum();
            (cancelled, table.live)
        };

        if cancelled > 0 {
            RegistryMetrics::record_cancelled(cancelled);
            RegistryMetrics::record_live(live);
        }
        tracing::debug!(?ids, cancelled, "Cancel requested");

        cancelled
    }

    /// Remove the token registered under `id` with `key`, if still present
    ///
    /// Called by [`Registration`] when the effect finishes on its own.
    pub fn deregister(&self, id: &EffectId, key: u64) {
        let live = {
            let mut table = self.lock();
            let Some(tokens) = table.entries.get_mut(id) else {
                return;
            };
            if tokens.remove(&key).is_none() {
                return;
            }
            if tokens.is_empty() {
                table.entries.remove(id);
            }
            table.live -= 1;
            table.live
        };

        RegistryMetrics::record_live(live);
    }

    /// Number of live tokens under `id`
    #[must_use]
    pub fn live_count(&self, id: &EffectId) -> usize {
        self.lock().entries.get(id).map_or(0, HashMap::len)
    }

    /// Number of live tokens across all identifiers
    #[must_use]
    pub fn total_live(&self) -> usize {
        self.lock().live
    }

    /// Check whether no effect is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total_live() == 0
    }
}

/// Handle for one registered token
///
/// Deregisters the token when dropped. Dropping after the token was
/// cancelled (and thereby removed) is a no-op.
#[derive(Debug)]
pub struct Registration {
    registry: Arc<CancellationRegistry>,
    id: EffectId,
    key: u64,
}

impl Registration {
    /// The identifier this registration lives under
    #[must_use]
    pub const fn id(&self) -> &EffectId {
        &self.id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.deregister(&self.id, self.key);
    }
}
