//! Behaviour of the scheduling primitives under tokio's paused clock.

use std::time::Duration;

use taleroom_tick::{DeadlineTimers, Expired, TickConfig, TickScheduler};
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Key {
    Turn,
    Buzzer,
    Grace(&'static str),
}

#[tokio::test(start_paused = true)]
async fn test_earliest_deadline_fires_first() {
    let mut timers = DeadlineTimers::new();
    timers.arm(Key::Turn, Duration::from_secs(300));
    let buzzer_gen = timers.arm(Key::Buzzer, Duration::from_secs(2));

    let start = Instant::now();
    let fired = timers.next_expired().await;
    assert_eq!(fired, Expired { key: Key::Buzzer, generation: buzzer_gen });
    assert_eq!(start.elapsed(), Duration::from_secs(2));
    assert!(!timers.is_armed(&Key::Buzzer));
    assert!(timers.is_armed(&Key::Turn));
}

#[tokio::test(start_paused = true)]
async fn test_rearm_replaces_deadline() {
    let mut timers = DeadlineTimers::new();
    let first = timers.arm(Key::Turn, Duration::from_secs(5));
    let second = timers.arm(Key::Turn, Duration::from_secs(10));
    assert_ne!(first, second);
    assert_eq!(timers.len(), 1);

    let start = Instant::now();
    let fired = timers.next_expired().await;
    assert_eq!(fired.generation, second);
    assert_eq!(start.elapsed(), Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_timer_never_fires() {
    let mut timers = DeadlineTimers::new();
    timers.arm(Key::Grace("b"), Duration::from_secs(1));
    timers.arm(Key::Grace("c"), Duration::from_secs(3));
    assert!(timers.cancel(&Key::Grace("b")));
    assert!(!timers.cancel(&Key::Grace("b")));

    assert_eq!(timers.next_expired().await.key, Key::Grace("c"));
    assert!(timers.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_empty_set_pends() {
    let mut timers: DeadlineTimers<Key> = DeadlineTimers::new();
    let res = tokio::time::timeout(Duration::from_secs(60), timers.next_expired()).await;
    assert!(res.is_err(), "nothing armed, nothing fires");
}

#[tokio::test(start_paused = true)]
async fn test_losing_a_select_race_consumes_nothing() {
    let mut timers = DeadlineTimers::new();
    timers.arm(Key::Buzzer, Duration::from_secs(2));

    tokio::select! {
        _ = timers.next_expired() => panic!("should not fire before the sleep"),
        _ = tokio::time::sleep(Duration::from_secs(1)) => {}
    }
    assert!(timers.is_armed(&Key::Buzzer));
    assert_eq!(timers.remaining(&Key::Buzzer), Some(Duration::from_secs(1)));
}

#[tokio::test(start_paused = true)]
async fn test_same_instant_fires_in_arming_order() {
    let mut timers = DeadlineTimers::new();
    let at = Instant::now() + Duration::from_secs(1);
    timers.arm_at(Key::Grace("first"), at);
    timers.arm_at(Key::Grace("second"), at);
    assert_eq!(timers.next_expired().await.key, Key::Grace("first"));
    assert_eq!(timers.next_expired().await.key, Key::Grace("second"));
}

#[tokio::test(start_paused = true)]
async fn test_tick_scheduler_fires_at_rate() {
    let mut clock = TickScheduler::new(TickConfig {
        initial_jitter_us: 0,
        ..TickConfig::with_rate(20)
    });
    let start = Instant::now();
    let info = clock.wait_for_tick().await;
    assert_eq!(info.tick, 1);
    assert_eq!(info.dt, Duration::from_millis(50));
    assert_eq!(start.elapsed(), Duration::from_millis(50));
    clock.record_tick_end();

    clock.wait_for_tick().await;
    assert_eq!(start.elapsed(), Duration::from_millis(100));
    assert_eq!(clock.tick_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_paused_scheduler_pends_and_resume_restarts_interval() {
    let mut clock = TickScheduler::new(TickConfig {
        initial_jitter_us: 0,
        ..TickConfig::with_rate(20)
    });
    clock.pause();
    clock.pause();
    assert!(clock.is_paused());
    let res = tokio::time::timeout(Duration::from_secs(1), clock.wait_for_tick()).await;
    assert!(res.is_err());

    clock.resume();
    let resumed_at = Instant::now();
    let info = clock.wait_for_tick().await;
    assert_eq!(info.ticks_skipped, 0);
    assert_eq!(resumed_at.elapsed(), Duration::from_millis(50));
}

#[tokio::test(start_paused = true)]
async fn test_zero_rate_never_ticks() {
    let mut clock = TickScheduler::with_rate(0);
    assert!(clock.interval().is_none());
    let res = tokio::time::timeout(Duration::from_secs(5), clock.wait_for_tick()).await;
    assert!(res.is_err());
}
