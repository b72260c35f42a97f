use std::sync::Arc;
use std::time::Duration;

use log::info;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{QuizError, Result};

const MS_PER_MINUTE: u64 = 60_000;

/// Serialized timer state, embedded in the persisted session payload so an
/// interrupted exam resumes with its countdown intact. `remaining_ms` is
/// authoritative on restore; elapsed wall-clock time while the app was gone
/// is not subtracted.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TimerSnapshot {
    pub total_duration_ms: u64,
    pub remaining_ms: u64,
    pub running: bool,
    pub paused: bool,
    /// Minute marks already announced, so thresholds fire at most once per
    /// timer lifetime even across serialize/deserialize.
    pub fired_warning_thresholds: Vec<u64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerPhase {
    Idle,
    Running,
    Paused,
    Stopped,
    Expired,
}

impl TimerPhase {
    fn name(self) -> &'static str {
        match self {
            TimerPhase::Idle => "idle",
            TimerPhase::Running => "running",
            TimerPhase::Paused => "paused",
            TimerPhase::Stopped => "stopped",
            TimerPhase::Expired => "expired",
        }
    }
}

/// What a single tick did. The timer owns no clock and no callbacks; a tick
/// source feeds it elapsed time and the engine dispatches notifications from
/// the outcome.
#[derive(Clone, Debug, Default)]
pub struct TickOutcome {
    pub remaining_ms: u64,
    /// Warning thresholds (minute marks) newly crossed by this tick.
    pub warnings: Vec<u64>,
    pub expired: bool,
    /// False when the tick was ignored (timer not running).
    pub ticked: bool,
}

/// Cancellable countdown: `Idle -> Running <-> Paused -> Stopped/Expired`.
pub struct QuizTimer {
    total_duration_ms: u64,
    remaining_ms: u64,
    phase: TimerPhase,
    warning_thresholds_min: Vec<u64>,
    fired_thresholds: Vec<u64>,
}

impl QuizTimer {
    pub fn new(mut warning_thresholds_min: Vec<u64>) -> Self {
        // Descending, so a large tick crossing several marks reports them
        // in time order.
        warning_thresholds_min.sort_unstable_by(|a, b| b.cmp(a));
        warning_thresholds_min.dedup();
        Self {
            total_duration_ms: 0,
            remaining_ms: 0,
            phase: TimerPhase::Idle,
            warning_thresholds_min,
            fired_thresholds: Vec::new(),
        }
    }

    /// Arms the countdown. Rejected while a countdown is live; a stopped or
    /// expired timer may be started again.
    pub fn start(&mut self, duration_minutes: u64) -> Result<()> {
        if matches!(self.phase, TimerPhase::Running | TimerPhase::Paused) {
            return Err(QuizError::InvalidTimerState {
                action: "start",
                phase: self.phase.name(),
            });
        }
        self.total_duration_ms = duration_minutes * MS_PER_MINUTE;
        self.remaining_ms = self.total_duration_ms;
        self.fired_thresholds.clear();
        self.phase = TimerPhase::Running;
        info!("⏱️ Timer started: {}", format_remaining(self.remaining_ms));
        Ok(())
    }

    /// Freezes the countdown. No-op unless running.
    pub fn pause(&mut self) {
        if self.phase == TimerPhase::Running {
            self.phase = TimerPhase::Paused;
            info!("⏸️ Timer paused at {}", format_remaining(self.remaining_ms));
        }
    }

    /// Resumes from the frozen remaining time. No-op unless paused.
    pub fn resume(&mut self) {
        if self.phase == TimerPhase::Paused {
            self.phase = TimerPhase::Running;
            info!("▶️ Timer resumed at {}", format_remaining(self.remaining_ms));
        }
    }

    /// Zeroes and cancels the countdown. Idempotent.
    pub fn stop(&mut self) {
        if self.phase != TimerPhase::Stopped {
            self.remaining_ms = 0;
            self.phase = TimerPhase::Stopped;
            info!("⏹️ Timer stopped");
        }
    }

    /// Advances the countdown by `elapsed_ms`. Ignored unless running.
    pub fn tick(&mut self, elapsed_ms: u64) -> TickOutcome {
        if self.phase != TimerPhase::Running {
            return TickOutcome {
                remaining_ms: self.remaining_ms,
                ..TickOutcome::default()
            };
        }

        self.remaining_ms = self.remaining_ms.saturating_sub(elapsed_ms);

        let mut warnings = Vec::new();
        for &mark in &self.warning_thresholds_min {
            if self.remaining_ms <= mark * MS_PER_MINUTE
                && !self.fired_thresholds.contains(&mark)
            {
                self.fired_thresholds.push(mark);
                // Expiry supersedes a warning landing on the same tick.
                if self.remaining_ms > 0 {
                    warnings.push(mark);
                }
            }
        }

        let expired = self.remaining_ms == 0;
        if expired {
            self.phase = TimerPhase::Expired;
            info!("⏰ Timer expired");
        }

        TickOutcome {
            remaining_ms: self.remaining_ms,
            warnings,
            expired,
            ticked: true,
        }
    }

    pub fn phase(&self) -> TimerPhase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.phase == TimerPhase::Running
    }

    pub fn remaining_ms(&self) -> u64 {
        self.remaining_ms
    }

    pub fn total_duration_ms(&self) -> u64 {
        self.total_duration_ms
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot {
            total_duration_ms: self.total_duration_ms,
            remaining_ms: self.remaining_ms,
            running: self.phase == TimerPhase::Running,
            paused: self.phase == TimerPhase::Paused,
            fired_warning_thresholds: self.fired_thresholds.clone(),
        }
    }

    /// Rebuilds a timer from a snapshot. Already-fired thresholds stay fired;
    /// remaining time is clamped into `0..=total`.
    pub fn from_snapshot(snapshot: &TimerSnapshot, warning_thresholds_min: Vec<u64>) -> Self {
        let mut timer = Self::new(warning_thresholds_min);
        timer.total_duration_ms = snapshot.total_duration_ms;
        timer.remaining_ms = snapshot.remaining_ms.min(snapshot.total_duration_ms);
        timer.fired_thresholds = snapshot.fired_warning_thresholds.clone();
        timer.phase = if snapshot.paused {
            TimerPhase::Paused
        } else if snapshot.running {
            TimerPhase::Running
        } else if snapshot.total_duration_ms == 0 {
            TimerPhase::Idle
        } else {
            TimerPhase::Stopped
        };
        timer
    }
}

/// `MM:SS`, floor-truncated to the second. Minutes grow past two digits for
/// long countdowns.
pub fn format_remaining(ms: u64) -> String {
    let total_seconds = ms / 1000;
    format!("{:02}:{:02}", total_seconds / 60, total_seconds % 60)
}

/// Periodic tick closure result: `true` keeps the source alive, `false`
/// retires it.
pub type TickFn = Box<dyn FnMut() -> bool + Send>;

/// Handle to a spawned tick loop; cancelling is idempotent.
pub trait TickHandle: Send {
    fn cancel(&mut self);
}

/// Scheduler abstraction the timer loop runs on. Injected into the engine so
/// production uses the tokio clock while tests drive ticks by hand.
pub trait TickSource: Send + Sync {
    fn spawn(&self, period: Duration, tick: TickFn) -> Box<dyn TickHandle>;
}

/// Production tick source: a 1 Hz `tokio::time::interval` task. Requires a
/// tokio runtime to be current when a timed session starts.
pub struct TokioTicker;

struct TokioTickHandle {
    handle: tokio::task::JoinHandle<()>,
}

impl TickHandle for TokioTickHandle {
    fn cancel(&mut self) {
        self.handle.abort();
    }
}

impl TickSource for TokioTicker {
    fn spawn(&self, period: Duration, mut tick: TickFn) -> Box<dyn TickHandle> {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // interval fires immediately once; the countdown starts a full
            // period later.
            interval.tick().await;
            loop {
                interval.tick().await;
                if !tick() {
                    break;
                }
            }
        });
        Box::new(TokioTickHandle { handle })
    }
}

struct ManualSlot {
    tick: Option<TickFn>,
    cancelled: bool,
}

/// Deterministic tick source: holds the tick closure and fires only when
/// told to, so tests advance timers without waiting on a clock.
#[derive(Clone)]
pub struct ManualTicker {
    slot: Arc<Mutex<ManualSlot>>,
}

impl ManualTicker {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(ManualSlot {
                tick: None,
                cancelled: false,
            })),
        }
    }

    /// Fires one tick. Returns false once the loop has retired or was never
    /// spawned.
    pub fn fire(&self) -> bool {
        // Take the closure out so it runs without the slot lock held; the
        // closure itself takes the engine lock.
        let mut tick = {
            let mut slot = self.slot.lock();
            if slot.cancelled {
                return false;
            }
            match slot.tick.take() {
                Some(tick) => tick,
                None => return false,
            }
        };
        let keep = tick();
        let mut slot = self.slot.lock();
        if keep && !slot.cancelled {
            slot.tick = Some(tick);
        }
        keep
    }

    pub fn fire_n(&self, n: usize) {
        for _ in 0..n {
            if !self.fire() {
                break;
            }
        }
    }

    pub fn is_armed(&self) -> bool {
        let slot = self.slot.lock();
        slot.tick.is_some() && !slot.cancelled
    }
}

impl Default for ManualTicker {
    fn default() -> Self {
        Self::new()
    }
}

struct ManualTickHandle {
    slot: Arc<Mutex<ManualSlot>>,
}

impl TickHandle for ManualTickHandle {
    fn cancel(&mut self) {
        let mut slot = self.slot.lock();
        slot.cancelled = true;
        slot.tick = None;
    }
}

impl TickSource for ManualTicker {
    fn spawn(&self, _period: Duration, tick: TickFn) -> Box<dyn TickHandle> {
        let mut slot = self.slot.lock();
        slot.tick = Some(tick);
        slot.cancelled = false;
        Box::new(ManualTickHandle {
            slot: Arc::clone(&self.slot),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running_timer(minutes: u64) -> QuizTimer {
        let mut timer = QuizTimer::new(vec![30, 15, 5, 1]);
        timer.start(minutes).unwrap();
        timer
    }

    #[test]
    fn test_start_rejected_while_running() {
        let mut timer = running_timer(10);
        let err = timer.start(10).unwrap_err();
        assert!(matches!(
            err,
            crate::error::QuizError::InvalidTimerState { action: "start", .. }
        ));
        timer.pause();
        assert!(timer.start(10).is_err());
    }

    #[test]
    fn test_restart_allowed_after_stop() {
        let mut timer = running_timer(10);
        timer.stop();
        assert!(timer.start(5).is_ok());
        assert_eq!(timer.remaining_ms(), 5 * 60_000);
    }

    #[test]
    fn test_tick_decrements_and_pause_freezes() {
        let mut timer = running_timer(1);
        let before = timer.remaining_ms();
        assert!(timer.tick(1000).ticked);
        assert_eq!(timer.remaining_ms(), before - 1000);

        timer.pause();
        let frozen = timer.remaining_ms();
        assert!(!timer.tick(1000).ticked);
        assert_eq!(timer.remaining_ms(), frozen);

        timer.resume();
        assert!(timer.tick(1000).ticked);
        assert_eq!(timer.remaining_ms(), frozen - 1000);
    }

    #[test]
    fn test_warnings_fire_once_each() {
        let mut timer = QuizTimer::new(vec![1]);
        timer.start(2).unwrap();
        // 2:00 -> 1:00 crosses the 1-minute mark.
        let outcome = timer.tick(60_000);
        assert_eq!(outcome.warnings, vec![1]);
        // Further ticks below the mark stay silent.
        let outcome = timer.tick(1000);
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_single_tick_crossing_multiple_thresholds_reports_in_order() {
        let mut timer = QuizTimer::new(vec![5, 15]);
        timer.start(20).unwrap();
        let outcome = timer.tick(16 * 60_000); // 20:00 -> 4:00
        assert_eq!(outcome.warnings, vec![15, 5]);
    }

    #[test]
    fn test_expiry_supersedes_warning_and_fires_once() {
        let mut timer = QuizTimer::new(vec![1]);
        timer.start(1).unwrap();
        let outcome = timer.tick(60_000);
        assert!(outcome.expired);
        assert!(outcome.warnings.is_empty());
        assert_eq!(timer.phase(), TimerPhase::Expired);
        // Expired timers ignore further ticks.
        assert!(!timer.tick(1000).ticked);
    }

    #[test]
    fn test_elapsed_plus_remaining_never_exceeds_total() {
        let mut timer = running_timer(1);
        let total = timer.total_duration_ms();
        let mut elapsed = 0u64;
        while timer.is_running() {
            timer.tick(1000);
            elapsed += 1000;
            assert!(elapsed + timer.remaining_ms() <= total);
        }
        assert_eq!(timer.remaining_ms(), 0);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut timer = QuizTimer::new(vec![30, 15, 5, 1]);
        timer.start(40).unwrap();
        timer.tick(11 * 60_000); // crosses the 30-minute mark
        timer.pause();

        let snapshot = timer.snapshot();
        let restored = QuizTimer::from_snapshot(&snapshot, vec![30, 15, 5, 1]);
        assert_eq!(restored.snapshot(), snapshot);
        assert_eq!(restored.phase(), TimerPhase::Paused);
    }

    #[test]
    fn test_restore_does_not_refire_thresholds() {
        let mut timer = QuizTimer::new(vec![30]);
        timer.start(31).unwrap();
        timer.tick(2 * 60_000); // fires the 30-minute warning
        let snapshot = timer.snapshot();

        let mut restored = QuizTimer::from_snapshot(&snapshot, vec![30]);
        assert!(restored.is_running());
        let outcome = restored.tick(1000);
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_restore_clamps_remaining_to_total() {
        let snapshot = TimerSnapshot {
            total_duration_ms: 60_000,
            remaining_ms: 120_000,
            running: true,
            paused: false,
            fired_warning_thresholds: vec![],
        };
        let restored = QuizTimer::from_snapshot(&snapshot, vec![1]);
        assert_eq!(restored.remaining_ms(), 60_000);
    }

    #[test]
    fn test_format_remaining() {
        assert_eq!(format_remaining(0), "00:00");
        assert_eq!(format_remaining(59_999), "00:59");
        assert_eq!(format_remaining(80 * 60_000), "80:00");
        assert_eq!(format_remaining(125 * 60_000 + 7_000), "125:07");
    }

    #[test]
    fn test_manual_ticker_drives_and_cancels() {
        let ticker = ManualTicker::new();
        let fired = Arc::new(Mutex::new(0u32));
        let counter = Arc::clone(&fired);
        let mut handle = ticker.spawn(
            Duration::from_secs(1),
            Box::new(move || {
                *counter.lock() += 1;
                *counter.lock() < 3
            }),
        );

        assert!(ticker.is_armed());
        ticker.fire_n(10);
        assert_eq!(*fired.lock(), 3); // closure retired itself at 3
        assert!(!ticker.is_armed());

        handle.cancel();
        assert!(!ticker.fire());
    }
}
