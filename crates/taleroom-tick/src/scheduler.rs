//! Fixed-rate tick clock with skip-on-overrun.

use std::time::{Duration, Instant};

use rand::Rng;
use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, trace, warn};

#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Tick rate in Hz. 0 = never tick.
    pub rate_hz: u32,
    /// Fraction of the tick budget (0.0 to 1.0) above which work done
    /// inside a tick is reported with `warn!`.
    pub budget_warn_threshold: f64,
    /// Random 0..n µs added to the first tick so rooms created together
    /// don't all flush on the same instant.
    pub initial_jitter_us: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            rate_hz: 0,
            budget_warn_threshold: 0.80,
            initial_jitter_us: 2_000,
        }
    }
}

impl TickConfig {
    pub const MAX_RATE_HZ: u32 = 128;

    pub fn with_rate(rate_hz: u32) -> Self {
        Self {
            rate_hz,
            ..Default::default()
        }
    }

    /// Clamps out-of-range values. Called by [`TickScheduler::new`].
    pub fn validated(mut self) -> Self {
        if self.rate_hz > Self::MAX_RATE_HZ {
            warn!(rate = self.rate_hz, max = Self::MAX_RATE_HZ, "tick rate clamped");
            self.rate_hz = Self::MAX_RATE_HZ;
        }
        self.budget_warn_threshold = self.budget_warn_threshold.clamp(0.0, 1.0);
        self
    }

    /// `None` when the rate is 0.
    pub fn interval(&self) -> Option<Duration> {
        (self.rate_hz > 0).then(|| Duration::from_nanos(1_000_000_000 / u64::from(self.rate_hz)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickInfo {
    /// Starts at 1.
    pub tick: u64,
    pub dt: Duration,
    /// Whole intervals that passed without a tick because we woke late.
    pub ticks_skipped: u64,
}

/// Drives periodic work for one room.
pub struct TickScheduler {
    config: TickConfig,
    interval: Option<Duration>,
    tick_count: u64,
    next_tick: Option<TokioInstant>,
    work_started: Option<Instant>,
    paused: bool,
}

impl TickScheduler {
    pub fn new(config: TickConfig) -> Self {
        let config = config.validated();
        let interval = config.interval();
        let next_tick = interval.map(|d| {
            let jitter = if config.initial_jitter_us > 0 {
                Duration::from_micros(rand::rng().random_range(0..config.initial_jitter_us))
            } else {
                Duration::ZERO
            };
            TokioInstant::now() + d + jitter
        });
        debug!(rate_hz = config.rate_hz, "tick scheduler created");

        Self {
            config,
            interval,
            tick_count: 0,
            next_tick,
            work_started: None,
            paused: false,
        }
    }

    pub fn with_rate(rate_hz: u32) -> Self {
        Self::new(TickConfig::with_rate(rate_hz))
    }

    /// Resolves at the next tick. Pends forever while paused or when
    /// the rate is 0.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        let (next, dt) = match (self.next_tick, self.interval) {
            (Some(next), Some(dt)) if !self.paused => (next, dt),
            _ => std::future::pending().await,
        };

        time::sleep_until(next).await;

        let now = TokioInstant::now();
        self.tick_count += 1;
        self.work_started = Some(Instant::now());

        let late_by = now.saturating_duration_since(next);
        let ticks_skipped = (late_by.as_nanos() / dt.as_nanos()) as u64;
        if ticks_skipped > 0 {
            warn!(
                tick = self.tick_count,
                skipped = ticks_skipped,
                late_ms = late_by.as_secs_f64() * 1000.0,
                "tick overrun, skipping ahead"
            );
        }
        // Always schedule from now, never from the missed deadline.
        self.next_tick = Some(now + dt);
        trace!(tick = self.tick_count, "tick");

        TickInfo {
            tick: self.tick_count,
            dt,
            ticks_skipped,
        }
    }

    /// Reports the end of the work done for the current tick.
    pub fn record_tick_end(&mut self) {
        let (Some(started), Some(budget)) = (self.work_started.take(), self.interval) else {
            return;
        };
        let used = started.elapsed().as_secs_f64() / budget.as_secs_f64();
        if used >= self.config.budget_warn_threshold {
            warn!(
                tick = self.tick_count,
                utilization_pct = format!("{:.1}", used * 100.0),
                "tick work approaching budget"
            );
        }
    }

    /// Idempotent.
    pub fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            trace!(tick = self.tick_count, "tick scheduler paused");
        }
    }

    /// Restarts the clock one full interval from now, so time spent
    /// paused never turns into a burst of ticks.
    pub fn resume(&mut self) {
        if self.paused {
            self.paused = false;
            if let Some(dt) = self.interval {
                self.next_tick = Some(TokioInstant::now() + dt);
            }
            trace!(tick = self.tick_count, "tick scheduler resumed");
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }
}
