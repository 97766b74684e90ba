//! Integration tests for the search feature running in a Store
//!
//! Time is virtual: every test drives a `TestScheduler` shared by the
//! catalog, the debounce and the scroll throttle.

#![allow(clippy::unwrap_used)] // Test code can use unwrap

use std::sync::Arc;
use std::time::Duration;
use tessera_runtime::Store;
use tessera_testing::TestScheduler;
use throttled_search::{
    Catalog, DEBOUNCE, SCROLL_WINDOW, SearchAction, SearchEnvironment, SearchReducer, SearchState,
};

type SearchStore = Store<SearchState, SearchAction, SearchEnvironment<Catalog>, SearchReducer<Catalog>>;

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

fn setup_with(configure: impl FnOnce(Catalog) -> Catalog) -> (TestScheduler, SearchStore) {
    let scheduler = TestScheduler::new();
    let catalog = configure(Catalog::new(
        ["Rust", "Rustup", "Ruby", "Go"],
        Arc::new(scheduler.clone()),
    ))
    .with_latency(ms(100));
    let env = SearchEnvironment::new(catalog, Arc::new(scheduler.clone()));
    (scheduler, Store::new(SearchState::default(), SearchReducer::new(), env))
}

fn setup() -> (TestScheduler, SearchStore) {
    setup_with(|catalog| catalog)
}

#[tokio::test]
async fn test_typing_searches_once_typing_pauses() {
    let (scheduler, store) = setup();
    let mut actions = store.subscribe_actions();

    for query in ["r", "ru", "rus"] {
        let _ = store.send(SearchAction::QueryChanged(query.into())).await.unwrap();
        scheduler.advance(ms(100)).await;
    }

    // Debounce ends 300ms after the last keystroke, then 100ms latency
    scheduler.advance(DEBOUNCE - ms(100) + ms(99)).await;
    assert!(store.state(|s| s.searching).await);

    scheduler.advance(ms(1)).await;
    let state = store.state(Clone::clone).await;
    assert_eq!(state.results, vec!["Rust", "Rustup"]);
    assert!(!state.searching);

    // Exactly one response was produced
    assert_eq!(
        actions.recv().await.unwrap(),
        SearchAction::SearchResponse {
            query: "rus".into(),
            results: vec!["Rust".into(), "Rustup".into()],
        }
    );
    assert!(actions.try_recv().is_err());
}

#[tokio::test]
async fn test_new_query_cancels_request_in_flight() {
    let (scheduler, store) = setup();

    let _ = store.send(SearchAction::QueryChanged("ru".into())).await.unwrap();
    // Debounce over, request in flight
    scheduler.advance(DEBOUNCE + ms(50)).await;

    let _ = store.send(SearchAction::QueryChanged("go".into())).await.unwrap();
    scheduler.run().await;

    let state = store.state(Clone::clone).await;
    assert_eq!(state.query, "go");
    assert_eq!(state.results, vec!["Go"]);
    assert_eq!(store.executor().registry().total_live(), 0);
}

#[tokio::test]
async fn test_cancel_search_drops_the_response() {
    let (scheduler, store) = setup();

    let _ = store.send(SearchAction::QueryChanged("ru".into())).await.unwrap();
    scheduler.advance(DEBOUNCE + ms(50)).await;
    let _ = store.send(SearchAction::CancelSearch).await.unwrap();
    scheduler.run().await;

    let state = store.state(Clone::clone).await;
    assert!(state.results.is_empty());
    assert!(!state.searching);
}

#[tokio::test]
async fn test_backend_failure_is_shown() {
    let (scheduler, store) = setup_with(Catalog::offline);

    let _ = store.send(SearchAction::QueryChanged("ru".into())).await.unwrap();
    scheduler.run().await;

    let state = store.state(Clone::clone).await;
    assert_eq!(state.error.as_deref(), Some("Effect computation failed: search backend unavailable"));
    assert!(!state.searching);
}

#[tokio::test]
async fn test_scroll_reports_are_throttled() {
    let (scheduler, store) = setup();

    // Offsets arrive at 0, 100, ... 400: all inside one window
    for offset in 0..5 {
        if offset > 0 {
            scheduler.advance(ms(100)).await;
        }
        let _ = store.send(SearchAction::Scrolled(offset * 10)).await.unwrap();
    }
    scheduler.advance(Duration::ZERO).await;
    let (offset, reports) = store.state(|s| (s.offset, s.scroll_reports)).await;
    assert_eq!((offset, reports), (0, 1));

    // The window closes at 500 with the latest offset
    scheduler.advance(ms(100)).await;
    let (offset, reports) = store.state(|s| (s.offset, s.scroll_reports)).await;
    assert_eq!((offset, reports), (40, 2));

    scheduler.advance(SCROLL_WINDOW).await;
    assert_eq!(store.state(|s| s.scroll_reports).await, 2);
}
