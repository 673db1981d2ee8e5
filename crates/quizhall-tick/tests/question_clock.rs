//! Integration tests for the question countdown clock.
//!
//! Uses `start_paused = true` so Tokio's clock auto-advances to the next
//! timer; every test runs instantly and deterministically.

use std::time::Duration;

use quizhall_tick::{ClockEvent, QuestionClock, TickConfig};
use tokio::time::Instant;

fn default_clock() -> QuestionClock {
    QuestionClock::new(TickConfig::default())
}

// =========================================================================
// Idle clock
// =========================================================================

#[test]
fn test_new_clock_is_idle() {
    let clock = default_clock();
    assert!(!clock.is_armed());
    assert_eq!(clock.remaining(), 0);
    assert_eq!(clock.run(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_idle_clock_never_fires() {
    let mut clock = default_clock();
    let result = tokio::time::timeout(Duration::from_secs(60), clock.wait()).await;
    assert!(result.is_err(), "idle clock should pend forever");
}

// =========================================================================
// Countdown
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_countdown_ticks_down_to_zero_then_elapses() {
    let mut clock = default_clock();
    let run = clock.arm();
    assert!(clock.is_armed());
    assert_eq!(clock.remaining(), 10);

    for expected in (0..10).rev() {
        let event = clock.wait().await;
        assert_eq!(event, ClockEvent::Tick { run, remaining: expected });
    }
    assert_eq!(clock.wait().await, ClockEvent::Elapsed { run });
    assert!(!clock.is_armed());
}

#[tokio::test(start_paused = true)]
async fn test_ticks_are_one_interval_apart() {
    let mut clock = QuestionClock::new(TickConfig::new(Duration::from_millis(250), 4));
    let start = Instant::now();
    clock.arm();

    clock.wait().await;
    assert_eq!(start.elapsed(), Duration::from_millis(250));
    clock.wait().await;
    assert_eq!(start.elapsed(), Duration::from_millis(500));
}

#[tokio::test(start_paused = true)]
async fn test_deadline_fires_at_question_duration() {
    let mut clock = default_clock();
    let start = Instant::now();
    clock.arm();

    loop {
        if let ClockEvent::Elapsed { .. } = clock.wait().await {
            break;
        }
    }
    // The last tick and the deadline share an instant; no extra delay.
    assert_eq!(start.elapsed(), Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn test_rearm_restarts_countdown() {
    let mut clock = default_clock();
    clock.arm();
    clock.wait().await;
    clock.wait().await;
    assert_eq!(clock.remaining(), 8);

    clock.arm();
    assert_eq!(clock.remaining(), 10);
    match clock.wait().await {
        ClockEvent::Tick { remaining, .. } => assert_eq!(remaining, 9),
        other => panic!("expected Tick, got {other:?}"),
    }
}

// =========================================================================
// Cancellation
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_both_timers() {
    let mut clock = default_clock();
    clock.arm();
    clock.wait().await;

    clock.cancel();
    assert!(!clock.is_armed());
    assert_eq!(clock.remaining(), 0);

    let result = tokio::time::timeout(Duration::from_secs(30), clock.wait()).await;
    assert!(result.is_err(), "cancelled clock must not fire");
}

#[tokio::test(start_paused = true)]
async fn test_cancel_starts_new_run() {
    let mut clock = default_clock();
    let first = clock.arm();
    clock.cancel();
    let second = clock.arm();
    assert_ne!(first, second);

    let event = clock.wait().await;
    assert_eq!(event.run(), second);
}

#[test]
fn test_cancel_idle_clock_is_harmless() {
    let mut clock = default_clock();
    clock.cancel();
    clock.cancel();
    assert!(!clock.is_armed());
}

#[tokio::test(start_paused = true)]
async fn test_wait_is_cancel_safe_inside_select() {
    // Dropping a pending wait() (as select! does when another branch
    // wins) must not consume a tick.
    let mut clock = default_clock();
    clock.arm();

    tokio::select! {
        _ = clock.wait() => panic!("tick should not fire before the other branch"),
        _ = tokio::time::sleep(Duration::from_millis(500)) => {}
    }
    assert_eq!(clock.remaining(), 10);

    match clock.wait().await {
        ClockEvent::Tick { remaining, .. } => assert_eq!(remaining, 9),
        other => panic!("expected Tick, got {other:?}"),
    }
}
