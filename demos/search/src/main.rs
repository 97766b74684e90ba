//! Throttled search demo binary
//!
//! Simulates a user typing a query, changing their mind, and scrolling
//! through results, then prints the state and the runtime's metrics.

use std::sync::Arc;
use std::time::Duration;
use tessera_core::environment::SchedulerRef;
use tessera_runtime::metrics::install_prometheus;
use tessera_runtime::{Store, TokioScheduler};
use throttled_search::{Catalog, SearchAction, SearchEnvironment, SearchReducer, SearchState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const CATALOG: [&str; 8] = [
    "Rust", "Rustup", "Ruby", "Rune", "Go", "Gleam", "Haskell", "Hare",
];

async fn type_text(
    store: &Store<SearchState, SearchAction, SearchEnvironment<Catalog>, SearchReducer<Catalog>>,
    text: &str,
    keystroke: Duration,
) -> Result<(), tessera_runtime::StoreError> {
    for end in 1..=text.len() {
        println!(">>> Typing: {:?}", &text[..end]);
        let _ = store.send(SearchAction::QueryChanged(text[..end].to_string())).await?;
        tokio::time::sleep(keystroke).await;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "throttled_search=debug,tessera_runtime=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let metrics = install_prometheus()?;

    println!("=== Throttled Search Example: Tessera ===\n");

    let scheduler: SchedulerRef = Arc::new(TokioScheduler::new());
    let env = SearchEnvironment::new(Catalog::new(CATALOG, Arc::clone(&scheduler)), scheduler);
    let store = Store::new(SearchState::default(), SearchReducer::new(), env);

    // Fast typing: only the last query is searched
    type_text(&store, "ru", Duration::from_millis(80)).await?;
    tokio::time::sleep(Duration::from_millis(500)).await;
    let results = store.state(|s| s.results.clone()).await;
    println!("Results for \"ru\": {results:?}\n");

    // The user dismisses a search before it answers
    let _ = store.send(SearchAction::QueryChanged("ha".into())).await?;
    tokio::time::sleep(Duration::from_millis(350)).await;
    println!(">>> Sending: CancelSearch");
    let _ = store.send(SearchAction::CancelSearch).await?;
    tokio::time::sleep(Duration::from_millis(300)).await;
    let results = store.state(|s| s.results.clone()).await;
    println!("Results after cancelling \"ha\": {results:?}\n");

    // Scrolling: one report per window, the latest offset wins
    for offset in (0..=200).step_by(20) {
        let _ = store.send(SearchAction::Scrolled(offset)).await?;
        tokio::time::sleep(Duration::from_millis(40)).await;
    }
    tokio::time::sleep(Duration::from_millis(600)).await;
    let (offset, reports) = store.state(|s| (s.offset, s.scroll_reports)).await;
    println!("Scrolled 11 times, reported {reports} times, last offset {offset}\n");

    store.shutdown(Duration::from_secs(5)).await?;

    println!("=== Metrics ===");
    println!("{}", metrics.render());

    Ok(())
}
