//! Integration tests for the sync scheduler.
//!
//! Uses paused Tokio time so `sleep_until` resolves as soon as the clock
//! is advanced, making cadence assertions exact.

use std::time::Duration;

use cardroom_tick::{OverrunPolicy, SyncConfig, SyncScheduler};

// =========================================================================
// Helpers
// =========================================================================

fn config_20hz() -> SyncConfig {
    SyncConfig {
        initial_jitter_us: 0,
        ..SyncConfig::with_rate(20)
    }
}

// =========================================================================
// SyncConfig
// =========================================================================

#[test]
fn test_default_config_is_twenty_per_second() {
    let cfg = SyncConfig::default();
    assert_eq!(cfg.patch_rate_hz, 20);
    assert_eq!(cfg.period(), Some(Duration::from_millis(50)));
    assert_eq!(cfg.policy, OverrunPolicy::Skip);
}

#[test]
fn test_zero_rate_has_no_period() {
    assert_eq!(SyncConfig::with_rate(0).period(), None);
}

#[test]
fn test_validated_clamps_rate_and_threshold() {
    let cfg = SyncConfig {
        patch_rate_hz: 10_000,
        budget_warn_threshold: 3.0,
        ..SyncConfig::default()
    }
    .validated();

    assert_eq!(cfg.patch_rate_hz, SyncConfig::MAX_PATCH_RATE_HZ);
    assert_eq!(cfg.budget_warn_threshold, 1.0);
}

// =========================================================================
// Scheduler creation
// =========================================================================

#[test]
fn test_scheduler_initial_state() {
    let s = SyncScheduler::new(config_20hz());
    assert_eq!(s.tick_count(), 0);
    assert_eq!(s.patch_rate_hz(), 20);
    assert!(!s.is_disabled());
    assert!(!s.is_paused());
    assert_eq!(s.period(), Some(Duration::from_millis(50)));
}

#[test]
fn test_scheduler_with_zero_rate_is_disabled() {
    let s = SyncScheduler::with_rate(0);
    assert!(s.is_disabled());
    assert_eq!(s.period(), None);
}

// =========================================================================
// Tick firing
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_wait_for_tick_reports_elapsed_period() {
    let mut s = SyncScheduler::new(config_20hz());

    let tick = s.wait_for_tick().await;

    assert_eq!(tick.tick, 1);
    assert_eq!(tick.elapsed, Duration::from_millis(50));
    assert!(!tick.overrun);
    assert_eq!(tick.ticks_skipped, 0);
}

#[tokio::test(start_paused = true)]
async fn test_ticks_increment_monotonically() {
    let mut s = SyncScheduler::new(config_20hz());

    for expected in 1..=5 {
        let tick = s.wait_for_tick().await;
        assert_eq!(tick.tick, expected);
        assert_eq!(tick.elapsed, Duration::from_millis(50));
    }
    assert_eq!(s.tick_count(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_scheduler_never_fires() {
    let mut s = SyncScheduler::with_rate(0);

    let result = tokio::time::timeout(Duration::from_secs(5), s.wait_for_tick()).await;
    assert!(result.is_err(), "disabled scheduler should pend forever");
}

// =========================================================================
// Overrun handling
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_skip_policy_reports_late_tick_and_real_elapsed() {
    let mut s = SyncScheduler::new(config_20hz());

    tokio::time::advance(Duration::from_millis(200)).await;
    let tick = s.wait_for_tick().await;

    assert!(tick.overrun);
    assert_eq!(tick.ticks_skipped, 3);
    assert_eq!(tick.elapsed, Duration::from_millis(200));

    // Next tick is a full period after the late one.
    let before = tokio::time::Instant::now();
    s.wait_for_tick().await;
    assert_eq!(before.elapsed(), Duration::from_millis(50));
}

#[tokio::test(start_paused = true)]
async fn test_keep_cadence_policy_fires_missed_deadline_immediately() {
    let mut s = SyncScheduler::new(SyncConfig {
        policy: OverrunPolicy::KeepCadence,
        ..config_20hz()
    });

    tokio::time::advance(Duration::from_millis(200)).await;
    s.wait_for_tick().await;

    let before = tokio::time::Instant::now();
    let tick = s.wait_for_tick().await;
    assert_eq!(before.elapsed(), Duration::ZERO);
    assert_eq!(tick.elapsed, Duration::ZERO);
    assert!(tick.overrun);
}

// =========================================================================
// Pause / Resume
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_pause_prevents_ticks() {
    let mut s = SyncScheduler::new(config_20hz());
    s.wait_for_tick().await;

    s.pause();
    assert!(s.is_paused());

    let result = tokio::time::timeout(Duration::from_secs(1), s.wait_for_tick()).await;
    assert!(result.is_err(), "paused scheduler should pend");
}

#[tokio::test(start_paused = true)]
async fn test_resume_does_not_count_paused_time_as_elapsed() {
    let mut s = SyncScheduler::new(config_20hz());
    s.wait_for_tick().await;

    s.pause();
    tokio::time::advance(Duration::from_secs(3)).await;
    s.resume();
    assert!(!s.is_paused());

    let tick = s.wait_for_tick().await;
    assert_eq!(tick.tick, 2);
    assert_eq!(tick.elapsed, Duration::from_millis(50));
}

#[test]
fn test_pause_resume_idempotent() {
    let mut s = SyncScheduler::new(config_20hz());
    s.pause();
    s.pause();
    assert!(s.is_paused());
    s.resume();
    s.resume();
    assert!(!s.is_paused());
}

#[test]
fn test_record_tick_end_without_tick_is_noop() {
    let mut s = SyncScheduler::new(config_20hz());
    s.record_tick_end();
    assert_eq!(s.tick_count(), 0);
}

// =========================================================================
// select! loop (mirrors the room actor)
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_select_loop_interleaves_commands_and_ticks() {
    let mut s = SyncScheduler::new(config_20hz());
    let (tx, mut rx) = tokio::sync::mpsc::channel::<&str>(10);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(160)).await;
        tx.send("stop").await.ok();
    });

    let mut ticks = 0u64;
    loop {
        tokio::select! {
            Some(cmd) = rx.recv() => {
                assert_eq!(cmd, "stop");
                break;
            }
            tick = s.wait_for_tick() => {
                ticks += 1;
                s.record_tick_end();
                assert_eq!(tick.tick, ticks);
            }
        }
    }

    assert_eq!(ticks, 3);
}
