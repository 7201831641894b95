//! Fixed-cadence state sync scheduler for Cardroom.
//!
//! A room pushes its state to participants at a fixed rate (20 patches per
//! second by default), independent of message traffic. [`SyncScheduler`]
//! is the clock for that: it resolves once per period and reports how much
//! real time elapsed since the previous tick, which the room hands to its
//! game-update hook.
//!
//! # Integration
//!
//! The scheduler sits in the room actor's `tokio::select!` loop, so ticks
//! and inbound commands are serialized against each other:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* handle command */ }
//!         tick = scheduler.wait_for_tick() => {
//!             hooks.update(state, tick.elapsed);
//!             broadcast_if_changed();
//!             scheduler.record_tick_end();
//!         }
//!     }
//! }
//! ```
//!
//! A rate of 0 disables syncing: [`SyncScheduler::wait_for_tick`] pends
//! forever. The same happens while the scheduler is paused, which rooms do
//! when nobody is connected.

use std::time::{Duration, Instant};

use rand::Rng;
use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What to do when the room falls behind its cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverrunPolicy {
    /// Forget the missed ticks and schedule the next one a full period
    /// from now. Keeps a slow room from bursting patches.
    #[default]
    Skip,
    /// Keep the original grid: the next tick is due one period after the
    /// missed deadline, even if that is already in the past.
    KeepCadence,
}

/// Configuration for the sync scheduler.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Patches per second. 0 disables syncing.
    pub patch_rate_hz: u32,
    /// Behavior on overrun.
    pub policy: OverrunPolicy,
    /// Fraction of the period (0.0–1.0) a tick may take before a warning
    /// is logged from [`SyncScheduler::record_tick_end`].
    pub budget_warn_threshold: f64,
    /// Random delay (0–max µs) added before the *first* tick so rooms
    /// created together don't all sync on the same instant.
    pub initial_jitter_us: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            patch_rate_hz: SyncConfig::DEFAULT_PATCH_RATE_HZ,
            policy: OverrunPolicy::default(),
            budget_warn_threshold: 0.80,
            initial_jitter_us: 2_000,
        }
    }
}

impl SyncConfig {
    /// 20 patches per second, one every 50 ms.
    pub const DEFAULT_PATCH_RATE_HZ: u32 = 20;

    /// Upper bound on the patch rate.
    pub const MAX_PATCH_RATE_HZ: u32 = 128;

    /// Config for a specific rate with default settings.
    pub fn with_rate(patch_rate_hz: u32) -> Self {
        Self {
            patch_rate_hz,
            ..Default::default()
        }
    }

    /// Clamps out-of-range values. Called by [`SyncScheduler::new`].
    pub fn validated(mut self) -> Self {
        if self.patch_rate_hz > Self::MAX_PATCH_RATE_HZ {
            warn!(
                rate = self.patch_rate_hz,
                max = Self::MAX_PATCH_RATE_HZ,
                "patch_rate_hz exceeds maximum, clamping"
            );
            self.patch_rate_hz = Self::MAX_PATCH_RATE_HZ;
        }
        self.budget_warn_threshold = self.budget_warn_threshold.clamp(0.0, 1.0);
        self
    }

    /// Length of one sync period, or `None` when syncing is disabled.
    pub fn period(&self) -> Option<Duration> {
        if self.patch_rate_hz == 0 {
            None
        } else {
            Some(Duration::from_secs_f64(1.0 / self.patch_rate_hz as f64))
        }
    }
}

// ---------------------------------------------------------------------------
// SyncTick
// ---------------------------------------------------------------------------

/// One firing of the scheduler, returned by [`SyncScheduler::wait_for_tick`].
#[derive(Debug, Clone)]
pub struct SyncTick {
    /// Tick counter, starting at 1.
    pub tick: u64,
    /// Real time since the previous tick fired (or since the scheduler
    /// was created / resumed, for the first tick after that).
    pub elapsed: Duration,
    /// `true` if this tick fired noticeably late.
    pub overrun: bool,
    /// Whole periods that were skipped because of the overrun.
    pub ticks_skipped: u64,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// The sync clock of a single room.
pub struct SyncScheduler {
    config: SyncConfig,
    period: Option<Duration>,
    tick_count: u64,
    /// When the next tick is due.
    next_tick: Option<TokioInstant>,
    /// When the previous tick fired; the base for `SyncTick::elapsed`.
    last_tick: TokioInstant,
    /// Set by `wait_for_tick`, consumed by `record_tick_end`.
    tick_start: Option<Instant>,
    paused: bool,
}

impl SyncScheduler {
    /// Creates a scheduler. The first tick is due one period from now,
    /// plus jitter.
    pub fn new(config: SyncConfig) -> Self {
        let config = config.validated();
        let period = config.period();
        let now = TokioInstant::now();

        let next_tick = period.map(|p| {
            let jitter = if config.initial_jitter_us > 0 {
                Duration::from_micros(rand::rng().random_range(0..config.initial_jitter_us))
            } else {
                Duration::ZERO
            };
            now + p + jitter
        });

        match period {
            None => debug!("sync scheduler created with syncing disabled"),
            Some(p) => debug!(
                rate_hz = config.patch_rate_hz,
                period_ms = p.as_secs_f64() * 1000.0,
                policy = ?config.policy,
                "sync scheduler created"
            ),
        }

        Self {
            config,
            period,
            tick_count: 0,
            next_tick,
            last_tick: now,
            tick_start: None,
            paused: false,
        }
    }

    /// Scheduler for a given rate with default settings.
    pub fn with_rate(patch_rate_hz: u32) -> Self {
        Self::new(SyncConfig::with_rate(patch_rate_hz))
    }

    /// Waits for the next tick.
    ///
    /// Pends forever when syncing is disabled or the scheduler is paused;
    /// inside `tokio::select!` the other branches keep running.
    pub async fn wait_for_tick(&mut self) -> SyncTick {
        let (due, period) = match (self.next_tick, self.period) {
            (Some(due), Some(period)) if !self.paused => (due, period),
            _ => std::future::pending().await,
        };

        time::sleep_until(due).await;

        let now = TokioInstant::now();
        let elapsed = now.saturating_duration_since(self.last_tick);
        self.last_tick = now;
        self.tick_count += 1;
        self.tick_start = Some(Instant::now());

        let late_by = now.saturating_duration_since(due);
        let overrun = late_by > period / 10;
        let ticks_skipped = if overrun {
            (late_by.as_nanos() / period.as_nanos()) as u64
        } else {
            0
        };

        self.next_tick = Some(match self.config.policy {
            OverrunPolicy::Skip => {
                if ticks_skipped > 0 {
                    warn!(
                        tick = self.tick_count,
                        skipped = ticks_skipped,
                        late_ms = late_by.as_secs_f64() * 1000.0,
                        "sync overrun, skipping ahead"
                    );
                }
                now + period
            }
            OverrunPolicy::KeepCadence => {
                if overrun {
                    warn!(
                        tick = self.tick_count,
                        late_ms = late_by.as_secs_f64() * 1000.0,
                        "sync overrun, keeping cadence"
                    );
                }
                due + period
            }
        });

        trace!(tick = self.tick_count, overrun, "sync tick");

        SyncTick {
            tick: self.tick_count,
            elapsed,
            overrun,
            ticks_skipped,
        }
    }

    /// Marks the end of the work done for the current tick and warns when
    /// it used more than the configured share of the period.
    pub fn record_tick_end(&mut self) {
        let (Some(start), Some(period)) = (self.tick_start.take(), self.period) else {
            return;
        };
        let used = start.elapsed().as_secs_f64() / period.as_secs_f64();
        if used >= self.config.budget_warn_threshold {
            warn!(
                tick = self.tick_count,
                utilization_pct = format!("{:.1}", used * 100.0),
                "sync tick approaching period budget"
            );
        }
    }

    /// Stops ticking until [`resume`](Self::resume). Idempotent.
    pub fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            debug!(tick = self.tick_count, "sync scheduler paused");
        }
    }

    /// Restarts ticking one period from now. The time spent paused is not
    /// reported as `elapsed` on the next tick.
    pub fn resume(&mut self) {
        if self.paused {
            self.paused = false;
            let now = TokioInstant::now();
            self.last_tick = now;
            if let Some(period) = self.period {
                self.next_tick = Some(now + period);
            }
            debug!(tick = self.tick_count, "sync scheduler resumed");
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// `true` when the rate is 0.
    pub fn is_disabled(&self) -> bool {
        self.period.is_none()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn patch_rate_hz(&self) -> u32 {
        self.config.patch_rate_hz
    }

    pub fn period(&self) -> Option<Duration> {
        self.period
    }
}
