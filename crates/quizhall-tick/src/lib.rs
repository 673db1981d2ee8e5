//! Question countdown clock for Quizhall.
//!
//! Each question is on screen for a fixed number of discrete ticks. The
//! clock owns both timers a question needs: the per-tick interval that
//! drives the remaining-time broadcast, and the question-advance deadline
//! that moves the session on to the next question.
//!
//! # Integration
//!
//! The clock is designed to sit inside a room actor's `tokio::select!` loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* handle commands */ }
//!         event = clock.wait() => {
//!             match event {
//!                 ClockEvent::Tick { remaining, .. } => { /* broadcast */ }
//!                 ClockEvent::Elapsed { .. } => { /* next question */ }
//!             }
//!         }
//!     }
//! }
//! ```
//!
//! [`QuestionClock::wait`] is cancel-safe: it only mutates the clock after
//! its sleep has completed, so dropping it inside `select!` loses nothing.

use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Timing for a single question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickConfig {
    /// Time between remaining-time ticks.
    pub interval: Duration,
    /// Number of ticks a question stays on screen.
    pub ticks: u32,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            ticks: 10,
        }
    }
}

impl TickConfig {
    /// Smallest interval the clock accepts.
    pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

    /// Creates a config with the given interval and tick count.
    pub fn new(interval: Duration, ticks: u32) -> Self {
        Self { interval, ticks }
    }

    /// Clamp out-of-range values so the config is safe to use.
    ///
    /// Called automatically by [`QuestionClock::new`]. A zero interval
    /// would spin the room actor; zero ticks would end every question
    /// before it was shown.
    pub fn validated(mut self) -> Self {
        if self.interval < Self::MIN_INTERVAL {
            warn!(
                interval_ms = self.interval.as_millis() as u64,
                "tick interval below minimum, clamping"
            );
            self.interval = Self::MIN_INTERVAL;
        }
        if self.ticks == 0 {
            warn!("tick count of 0, clamping to 1");
            self.ticks = 1;
        }
        self
    }

    /// How long one question stays open.
    pub fn question_duration(&self) -> Duration {
        self.interval * self.ticks
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// What the clock reports when it wakes up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEvent {
    /// One tick of the countdown elapsed.
    Tick {
        /// The run this countdown was armed under.
        run: u64,
        /// Ticks left on the question after this one.
        remaining: u32,
    },
    /// The question's time is up; the next question is due.
    Elapsed {
        /// The run this countdown was armed under.
        run: u64,
    },
}

impl ClockEvent {
    /// The run this event belongs to.
    pub fn run(&self) -> u64 {
        match self {
            Self::Tick { run, .. } | Self::Elapsed { run } => *run,
        }
    }
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// The countdown for the question currently on screen.
///
/// One clock per room. At most one countdown is armed at a time: arming
/// again replaces the previous countdown, and [`cancel`](Self::cancel)
/// drops both timers and moves the clock to a new run so any event a
/// caller may still be holding can be recognised as stale.
#[derive(Debug)]
pub struct QuestionClock {
    config: TickConfig,
    run: u64,
    remaining: u32,
    next_tick: Option<Instant>,
    deadline: Option<Instant>,
}

impl QuestionClock {
    /// Creates an idle clock.
    pub fn new(config: TickConfig) -> Self {
        let config = config.validated();
        debug!(
            interval_ms = config.interval.as_millis() as u64,
            ticks = config.ticks,
            "question clock created"
        );
        Self {
            config,
            run: 0,
            remaining: 0,
            next_tick: None,
            deadline: None,
        }
    }

    /// Starts the countdown for a new question. Returns the run number
    /// the resulting events will carry.
    pub fn arm(&mut self) -> u64 {
        let now = Instant::now();
        self.remaining = self.config.ticks;
        self.next_tick = Some(now + self.config.interval);
        self.deadline = Some(now + self.config.question_duration());
        trace!(run = self.run, ticks = self.remaining, "countdown armed");
        self.run
    }

    /// Stops both timers and starts a new run.
    ///
    /// Safe to call when nothing is armed.
    pub fn cancel(&mut self) {
        if self.is_armed() {
            debug!(run = self.run, remaining = self.remaining, "countdown cancelled");
        }
        self.next_tick = None;
        self.deadline = None;
        self.remaining = 0;
        self.run += 1;
    }

    /// Waits for the next tick or for the question deadline.
    ///
    /// Pends forever when nothing is armed. When the last tick and the
    /// deadline fall on the same instant, the tick is reported first.
    pub async fn wait(&mut self) -> ClockEvent {
        let (at, is_tick) = match (self.next_tick, self.deadline) {
            (Some(tick), Some(deadline)) if tick <= deadline => (tick, true),
            (_, Some(deadline)) => (deadline, false),
            (Some(tick), None) => (tick, true),
            (None, None) => return std::future::pending().await,
        };

        time::sleep_until(at).await;

        if is_tick {
            self.remaining = self.remaining.saturating_sub(1);
            self.next_tick = if self.remaining == 0 {
                None
            } else {
                Some(at + self.config.interval)
            };
            trace!(run = self.run, remaining = self.remaining, "tick");
            ClockEvent::Tick {
                run: self.run,
                remaining: self.remaining,
            }
        } else {
            self.next_tick = None;
            self.deadline = None;
            trace!(run = self.run, "question elapsed");
            ClockEvent::Elapsed { run: self.run }
        }
    }

    /// Whether a countdown is in progress.
    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Ticks left on the current question (0 when idle).
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// The current run number.
    pub fn run(&self) -> u64 {
        self.run
    }
}
