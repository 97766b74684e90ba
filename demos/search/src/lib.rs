//! # Throttled Search
//!
//! A search-as-you-type feature built on Tessera.
//!
//! This example showcases:
//! - Debounced effects: a query is searched once typing pauses
//! - Cancel-in-flight: a newer query cancels the request still running
//! - Explicit cancellation from the reducer
//! - Throttled effects: scroll positions are reported at most once per window
//! - A scheduler injected through the environment, so tests drive time
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tessera_runtime::{Store, TokioScheduler};
//! use throttled_search::{Catalog, SearchAction, SearchEnvironment, SearchReducer, SearchState};
//!
//! # async fn example() -> Result<(), tessera_runtime::StoreError> {
//! let scheduler = Arc::new(TokioScheduler::new());
//! let env = SearchEnvironment::new(Catalog::new(["rust", "rustup", "ruby"], scheduler.clone()), scheduler);
//! let store = Store::new(SearchState::default(), SearchReducer::new(), env);
//!
//! store.send(SearchAction::QueryChanged("rus".into())).await?;
//! # Ok(())
//! # }
//! ```

use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tessera_core::environment::SchedulerRef;
use tessera_core::{effect::Effect, reducer::Reducer, smallvec, EffectId, SmallVec};
use thiserror::Error;

/// How long typing must pause before a query is searched
pub const DEBOUNCE: Duration = Duration::from_millis(300);

/// Minimum spacing between reported scroll positions
pub const SCROLL_WINDOW: Duration = Duration::from_millis(500);

/// Identifier of the search request effect
pub const SEARCH: &str = "search";

/// Identifier of the scroll reporting effect
pub const SCROLL: &str = "scroll";

/// Errors from a [`SearchClient`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SearchError {
    /// The backend could not be reached
    #[error("search backend unavailable")]
    Unavailable,
}

/// Search backend
pub trait SearchClient: Send + Sync + 'static {
    /// Find every entry matching `query`
    fn search(&self, query: &str) -> BoxFuture<'static, Result<Vec<String>, SearchError>>;
}

/// In-memory catalog answering after a fixed latency
///
/// Matches are case-insensitive substring matches, in catalog order.
#[derive(Clone)]
pub struct Catalog {
    entries: Arc<[String]>,
    latency: Duration,
    scheduler: SchedulerRef,
    online: bool,
}

impl Catalog {
    /// Default simulated round trip
    pub const LATENCY: Duration = Duration::from_millis(120);

    /// Create a catalog whose latency is measured on `scheduler`
    pub fn new<I, T>(entries: I, scheduler: SchedulerRef) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            entries: entries.into_iter().map(Into::into).collect::<Vec<String>>().into(),
            latency: Self::LATENCY,
            scheduler,
            online: true,
        }
    }

    /// Set the simulated round trip
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make every request fail
    #[must_use]
    pub const fn offline(mut self) -> Self {
        self.online = false;
        self
    }
}

impl SearchClient for Catalog {
    fn search(&self, query: &str) -> BoxFuture<'static, Result<Vec<String>, SearchError>> {
        let scheduler = Arc::clone(&self.scheduler);
        let latency = self.latency;
        let entries = Arc::clone(&self.entries);
        let online = self.online;
        let needle = query.to_lowercase();

        // The round trip starts when the request is first polled
        Box::pin(async move {
            scheduler.sleep(latency).await;
            if !online {
                return Err(SearchError::Unavailable);
            }
            Ok(entries
                .iter()
                .filter(|entry| entry.to_lowercase().contains(&needle))
                .cloned()
                .collect())
        })
    }
}

/// Search state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchState {
    /// Text currently typed
    pub query: String,
    /// Results of the last completed search
    pub results: Vec<String>,
    /// Whether a search is debouncing or in flight
    pub searching: bool,
    /// Last failure, cleared by the next successful search
    pub error: Option<String>,
    /// Last reported scroll offset
    pub offset: u32,
    /// Scroll reports received
    pub scroll_reports: u32,
}

/// Search actions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchAction {
    /// The user edited the query
    QueryChanged(String),
    /// A search finished
    SearchResponse {
        /// The query searched
        query: String,
        /// Matching entries
        results: Vec<String>,
    },
    /// A search failed
    SearchFailed(String),
    /// The user dismissed the search
    CancelSearch,
    /// The result list scrolled to `offset`
    Scrolled(u32),
    /// A throttled scroll report
    ScrollReported(u32),
}

/// Search environment
///
/// The scheduler times debouncing, throttling and, in the demo, the
/// catalog's latency.
pub struct SearchEnvironment<C: SearchClient> {
    /// Search backend
    pub client: C,
    /// Clock effects are timed against
    pub scheduler: SchedulerRef,
}

impl<C: SearchClient> SearchEnvironment<C> {
    /// Create an environment
    #[must_use]
    pub const fn new(client: C, scheduler: SchedulerRef) -> Self {
        Self { client, scheduler }
    }
}

/// Search reducer
///
/// Generic over the backend so tests can substitute their own.
#[derive(Debug, Clone, Copy)]
pub struct SearchReducer<C> {
    _phantom: std::marker::PhantomData<fn() -> C>,
}

impl<C> SearchReducer<C> {
    /// Create a new search reducer
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<C> Default for SearchReducer<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: SearchClient> SearchReducer<C> {
    fn search(env: &SearchEnvironment<C>, query: String) -> Effect<SearchAction> {
        let request = env.client.search(&query);
        Effect::task(async move {
            let results = request.await?;
            Ok::<_, SearchError>(SearchAction::SearchResponse { query, results })
        })
        .catch(|error| SearchAction::SearchFailed(error.to_string()))
        .debounce(SEARCH, DEBOUNCE, Arc::clone(&env.scheduler))
    }
}

impl<C: SearchClient> Reducer for SearchReducer<C> {
    type State = SearchState;
    type Action = SearchAction;
    type Environment = SearchEnvironment<C>;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            SearchAction::QueryChanged(query) => {
                state.query.clone_from(&query);
                if query.trim().is_empty() {
                    state.results.clear();
                    state.searching = false;
                    return smallvec![Effect::cancel(SEARCH)];
                }
                state.searching = true;
                smallvec![Self::search(env, query)]
            },
            SearchAction::SearchResponse { query, results } => {
                // Responses for a query no longer shown are dropped
                if query == state.query {
                    state.results = results;
                    state.searching = false;
                    state.error = None;
                } else {
                    tracing::debug!(%query, current = %state.query, "Dropping stale search response");
                }
                smallvec![Effect::None]
            },
            SearchAction::SearchFailed(error) => {
                tracing::warn!(%error, "Search failed");
                state.searching = false;
                state.error = Some(error);
                smallvec![Effect::None]
            },
            SearchAction::CancelSearch => {
                state.searching = false;
                smallvec![Effect::cancel(SEARCH)]
            },
            SearchAction::Scrolled(offset) => smallvec![Effect::send(SearchAction::ScrollReported(offset))
                .throttle(SCROLL, SCROLL_WINDOW, Arc::clone(&env.scheduler), true)],
            SearchAction::ScrollReported(offset) => {
                state.offset = offset;
                state.scroll_reports += 1;
                smallvec![Effect::None]
            },
        }
    }
}

/// Identifier of the search request effect
#[must_use]
pub fn search_id() -> EffectId {
    EffectId::from(SEARCH)
}
