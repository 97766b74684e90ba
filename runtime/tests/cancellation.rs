//! Integration tests for cancellable effects in the Store runtime
//!
//! Effects sleep on a `TestScheduler` from the environment, so the tests
//! decide exactly when each one would complete.

#![allow(clippy::unwrap_used)] // Test code can use unwrap

use std::sync::Arc;
use std::time::Duration;
use tessera_core::environment::{Scheduler, SchedulerRef};
use tessera_core::{effect::Effect, reducer::Reducer, smallvec, SmallVec};
use tessera_runtime::Store;
use tessera_testing::TestScheduler;

#[derive(Clone, Debug, Default)]
struct LoadState {
    loaded: Vec<u32>,
}

#[derive(Clone, Debug)]
enum LoadAction {
    /// Load, replacing any load in flight
    Load(u32),
    /// Load alongside any load in flight
    LoadAlongside(u32),
    Loaded(u32),
    Stop,
    StopUnknown,
}

struct LoadEnvironment {
    scheduler: SchedulerRef,
}

struct LoadReducer;

fn load(env: &LoadEnvironment, value: u32) -> Effect<LoadAction> {
    let sleep = env.scheduler.sleep(Duration::from_millis(100));
    Effect::single(async move {
        sleep.await;
        LoadAction::Loaded(value)
    })
}

impl Reducer for LoadReducer {
    type State = LoadState;
    type Action = LoadAction;
    type Environment = LoadEnvironment;

    fn reduce(
        &self,
        state: &mut LoadState,
        action: LoadAction,
        env: &LoadEnvironment,
    ) -> SmallVec<[Effect<LoadAction>; 4]> {
        match action {
            LoadAction::Load(value) => smallvec![load(env, value).cancellable("load", true)],
            LoadAction::LoadAlongside(value) => smallvec![load(env, value).cancellable("load", false)],
            LoadAction::Loaded(value) => {
                state.loaded.push(value);
                smallvec![Effect::None]
            },
            LoadAction::Stop => smallvec![Effect::cancel("load")],
            LoadAction::StopUnknown => smallvec![Effect::cancel("never-registered")],
        }
    }
}

fn setup() -> (TestScheduler, Store<LoadState, LoadAction, LoadEnvironment, LoadReducer>) {
    let scheduler = TestScheduler::new();
    let env = LoadEnvironment {
        scheduler: Arc::new(scheduler.clone()),
    };
    (scheduler, Store::new(LoadState::default(), LoadReducer, env))
}

#[tokio::test]
async fn test_cancel_in_flight_keeps_only_latest() {
    let (scheduler, store) = setup();

    let mut first = store.send(LoadAction::Load(1)).await.unwrap();
    let mut second = store.send(LoadAction::Load(2)).await.unwrap();

    scheduler.advance(Duration::from_millis(100)).await;
    first.wait().await;
    second.wait().await;

    assert_eq!(store.state(|s| s.loaded.clone()).await, vec![2]);
    assert!(store.executor().registry().is_empty());
}

#[tokio::test]
async fn test_without_cancel_in_flight_both_complete() {
    let (scheduler, store) = setup();

    let _ = store.send(LoadAction::LoadAlongside(1)).await.unwrap();
    let _ = store.send(LoadAction::LoadAlongside(2)).await.unwrap();
    assert_eq!(store.executor().registry().live_count(&"load".into()), 2);

    scheduler.advance(Duration::from_millis(100)).await;

    assert_eq!(store.state(|s| s.loaded.clone()).await, vec![1, 2]);
}

#[tokio::test]
async fn test_cancel_effect_from_reducer() {
    let (scheduler, store) = setup();

    let _ = store.send(LoadAction::LoadAlongside(1)).await.unwrap();
    let _ = store.send(LoadAction::LoadAlongside(2)).await.unwrap();
    let _ = store.send(LoadAction::Stop).await.unwrap();

    scheduler.advance(Duration::from_millis(100)).await;

    assert!(store.state(|s| s.loaded.is_empty()).await);
    assert!(store.executor().registry().is_empty());
}

#[tokio::test]
async fn test_cancel_unknown_id_is_noop() {
    let (scheduler, store) = setup();

    let _ = store.send(LoadAction::Load(1)).await.unwrap();
    let _ = store.send(LoadAction::StopUnknown).await.unwrap();
    assert_eq!(store.cancel("also-unknown"), 0);

    scheduler.advance(Duration::from_millis(100)).await;

    assert_eq!(store.state(|s| s.loaded.clone()).await, vec![1]);
}

#[tokio::test]
async fn test_cancel_from_outside_the_reducer() {
    let (scheduler, store) = setup();

    let mut handle = store.send(LoadAction::Load(1)).await.unwrap();
    assert_eq!(store.cancel("load"), 1);
    handle.wait().await;

    scheduler.advance(Duration::from_millis(100)).await;
    assert!(store.state(|s| s.loaded.is_empty()).await);
}

#[tokio::test]
async fn test_cancelled_registration_is_reusable() {
    let (scheduler, store) = setup();

    let _ = store.send(LoadAction::Load(1)).await.unwrap();
    let _ = store.send(LoadAction::Stop).await.unwrap();
    let _ = store.send(LoadAction::Load(3)).await.unwrap();

    scheduler.advance(Duration::from_millis(100)).await;

    assert_eq!(store.state(|s| s.loaded.clone()).await, vec![3]);
}
