//! Integration tests: virtual schedulers driving a Store and effect probes.

#![allow(clippy::unwrap_used)] // Test code can use unwrap

use std::sync::Arc;
use std::time::Duration;
use tessera_core::environment::Scheduler;
use tessera_core::{effect::Effect, reducer::Reducer, smallvec, SmallVec};
use tessera_runtime::{Store, StoreConfig};
use tessera_testing::{EffectProbe, ImmediateScheduler, TestScheduler};

#[derive(Clone, Debug, Default)]
struct TimerState {
    ticks: u32,
}

#[derive(Clone, Debug)]
enum TimerAction {
    Schedule(u64),
    Tick,
}

struct TimerReducer;

impl Reducer for TimerReducer {
    type State = TimerState;
    type Action = TimerAction;
    type Environment = ();

    fn reduce(
        &self,
        state: &mut TimerState,
        action: TimerAction,
        _env: &(),
    ) -> SmallVec<[Effect<TimerAction>; 4]> {
        match action {
            TimerAction::Schedule(millis) => {
                smallvec![Effect::delay(Duration::from_millis(millis), TimerAction::Tick)]
            },
            TimerAction::Tick => {
                state.ticks += 1;
                smallvec![Effect::None]
            },
        }
    }
}

#[tokio::test]
async fn test_store_delay_on_virtual_clock() {
    let scheduler = TestScheduler::new();
    let config = StoreConfig::default().with_scheduler(Arc::new(scheduler.clone()));
    let store = Store::with_config(TimerState::default(), TimerReducer, (), config);

    let _ = store.send(TimerAction::Schedule(500)).await.unwrap();
    let _ = store.send(TimerAction::Schedule(1500)).await.unwrap();
    assert_eq!(scheduler.pending_sleepers(), 2);

    scheduler.advance(Duration::from_millis(499)).await;
    assert_eq!(store.state(|s| s.ticks).await, 0);

    scheduler.advance(Duration::from_millis(1)).await;
    assert_eq!(store.state(|s| s.ticks).await, 1);

    scheduler.run().await;
    assert_eq!(store.state(|s| s.ticks).await, 2);
    assert_eq!(scheduler.now().elapsed(), Duration::from_millis(1500));
}

#[tokio::test]
async fn test_store_shutdown_with_virtual_timers() {
    let scheduler = TestScheduler::new();
    let config = StoreConfig::default().with_scheduler(Arc::new(scheduler.clone()));
    let store = Store::with_config(TimerState::default(), TimerReducer, (), config);

    let _ = store.send(TimerAction::Schedule(100)).await.unwrap();
    scheduler.advance(Duration::from_millis(100)).await;

    assert_eq!(store.shutdown(Duration::from_secs(1)).await, Ok(()));
    assert_eq!(store.state(|s| s.ticks).await, 1);
}

#[tokio::test]
async fn test_probe_deferred_effect() {
    let scheduler = TestScheduler::new();
    let probe = EffectProbe::new(Arc::new(scheduler.clone()));
    let deferred = Effect::send("hello").deferred(Duration::from_millis(250), Arc::new(scheduler.clone()));

    let mut run = probe.spawn(deferred);
    scheduler.advance(Duration::from_millis(200)).await;
    assert!(run.drain().is_empty());

    scheduler.advance(Duration::from_millis(50)).await;
    let (emitted, outcome) = run.finish().await;
    assert_eq!(emitted, vec!["hello"]);
    assert!(outcome.is_completed());
}

#[tokio::test]
async fn test_probe_debounce_keeps_last() {
    let scheduler = TestScheduler::new();
    let probe = EffectProbe::new(Arc::new(scheduler.clone()));
    let debounce = |value: u32| {
        Effect::send(value).debounce("typing", Duration::from_millis(300), Arc::new(scheduler.clone()))
    };

    let first = probe.spawn(debounce(1));
    scheduler.advance(Duration::from_millis(100)).await;
    let second = probe.spawn(debounce(2));
    scheduler.advance(Duration::from_millis(300)).await;

    let (first_emitted, first_outcome) = first.finish().await;
    let (second_emitted, second_outcome) = second.finish().await;

    assert!(first_emitted.is_empty());
    assert!(first_outcome.is_cancelled());
    assert_eq!(second_emitted, vec![2]);
    assert!(second_outcome.is_completed());
}

#[tokio::test]
async fn test_immediate_scheduler_closes_windows_on_sleep() {
    let scheduler = Arc::new(ImmediateScheduler::new());
    let probe = EffectProbe::new(scheduler.clone());

    let burst = Effect::stream(futures::stream::iter(vec![1, 2, 3]));
    let (emitted, outcome) = probe
        .run(burst.throttle("burst", Duration::from_secs(1), scheduler.clone(), false))
        .await;

    // Scheduling the trailing emission for 2 moves the clock a full
    // interval, so 3 opens a new window and 2 is never delivered.
    assert!(outcome.is_completed());
    assert_eq!(emitted, vec![1, 3]);
    assert_eq!(scheduler.now().elapsed(), Duration::from_secs(1));
}
