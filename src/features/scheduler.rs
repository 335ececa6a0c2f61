//! Working-hours scheduler.
//!
//! Windows are offsets from local midnight and may run past 24h to express a
//! span crossing midnight (`7h30m-29h59m59s` is 07:30 through 05:59:59 the
//! next morning). Inside a window the cycle runs, then the loop sleeps the
//! base interval ± jitter; outside all windows it sleeps until the nearest
//! window opens. The calendar date never matters.

use crate::core::durations::{format_clock, parse_duration, DurationParseError};
use chrono::Timelike;
use rand::distr::{Distribution, Uniform};
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

const DAY: Duration = Duration::from_secs(24 * 3600);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("working hours window '{0}' must look like BEGIN-END, e.g. 7h30m-29h59m59s")]
    Malformed(String),

    #[error("working hours window ends before it begins ({begin} > {end})")]
    Inverted { begin: String, end: String },

    #[error("working hours window may not begin after 24h ({0})")]
    LateBegin(String),

    #[error(transparent)]
    Duration(#[from] DurationParseError),
}

/// Allowed time-of-day range, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkingHoursWindow {
    pub begin: Duration,
    pub end: Duration,
}

impl WorkingHoursWindow {
    pub fn new(begin: Duration, end: Duration) -> Result<Self, ScheduleError> {
        if begin > end {
            return Err(ScheduleError::Inverted {
                begin: format_clock(begin),
                end: format_clock(end),
            });
        }
        if begin >= DAY {
            return Err(ScheduleError::LateBegin(format_clock(begin)));
        }
        Ok(Self { begin, end })
    }

    /// `time_of_day` is taken modulo 24h. A window ending past midnight also
    /// covers the early-morning times that, shifted by a day, fall inside it.
    pub fn contains(&self, time_of_day: Duration) -> bool {
        let t = modulo_day(time_of_day);
        let shifted = t + DAY;
        (self.begin <= t && t <= self.end) || (self.begin <= shifted && shifted <= self.end)
    }

    /// Time from `time_of_day` until this window next begins.
    pub fn until_begin(&self, time_of_day: Duration) -> Duration {
        let t = modulo_day(time_of_day);
        if self.begin >= t {
            self.begin - t
        } else {
            DAY - t + self.begin
        }
    }
}

impl FromStr for WorkingHoursWindow {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (begin, end) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| ScheduleError::Malformed(s.to_string()))?;
        Self::new(parse_duration(begin)?, parse_duration(end)?)
    }
}

fn modulo_day(d: Duration) -> Duration {
    Duration::from_nanos((d.as_nanos() % DAY.as_nanos()) as u64)
}

/// Parses a comma-separated window list: `7h30m-29h59m59s,0s-57m`.
pub fn parse_windows(list: &str) -> Result<Vec<WorkingHoursWindow>, ScheduleError> {
    list.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::parse)
        .collect()
}

#[derive(Debug, Clone)]
pub struct Schedule {
    /// No windows means "always allowed".
    pub windows: Vec<WorkingHoursWindow>,
    pub interval: Duration,
    pub jitter: Duration,
}

impl Schedule {
    pub fn is_allowed(&self, time_of_day: Duration) -> bool {
        self.windows.is_empty() || self.windows.iter().any(|w| w.contains(time_of_day))
    }

    /// Zero when allowed now, otherwise the wait until the nearest window begins.
    pub fn delay_until_next_window(&self, time_of_day: Duration) -> Duration {
        if self.is_allowed(time_of_day) {
            return Duration::ZERO;
        }
        self.windows
            .iter()
            .map(|w| w.until_begin(time_of_day))
            .min()
            .unwrap_or(Duration::ZERO)
    }

    /// Base interval shifted by a uniform offset in `[-jitter, +jitter]`.
    /// Returns the sleep and the signed offset in milliseconds.
    pub fn jittered_interval(&self) -> (Duration, i64) {
        let jitter_ms = self.jitter.as_millis() as i64;
        let offset = if jitter_ms == 0 {
            0
        } else {
            let mut rng = rand::rng();
            match Uniform::new_inclusive(-jitter_ms, jitter_ms) {
                Ok(dist) => dist.sample(&mut rng),
                Err(_) => 0,
            }
        };
        let base = self.interval.as_millis() as i64;
        let total = (base + offset).max(0) as u64;
        (Duration::from_millis(total), offset)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScheduleStatus {
    #[default]
    Blocked,
    Allowed,
}

#[derive(Debug, Clone, Default)]
pub struct ScheduleState {
    pub status: ScheduleStatus,
    /// Time of day at which the loop next wakes.
    pub next_wake: Option<Duration>,
    /// Sum of all jitter offsets applied so far, in milliseconds.
    pub accumulated_jitter_ms: i64,
    pub cycles_run: u64,
}

/// Source of the current local time of day.
pub trait Clock: Send + Sync {
    fn time_of_day(&self) -> Duration;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn time_of_day(&self) -> Duration {
        let now = chrono::Local::now().time();
        Duration::from_secs(now.num_seconds_from_midnight() as u64)
            + Duration::from_nanos((now.nanosecond() % 1_000_000_000) as u64)
    }
}

pub struct Scheduler {
    pub schedule: Schedule,
    clock: Arc<dyn Clock>,
    state: ScheduleState,
}

impl Scheduler {
    pub fn new(schedule: Schedule, clock: Arc<dyn Clock>) -> Self {
        Self {
            schedule,
            clock,
            state: ScheduleState::default(),
        }
    }

    pub fn state(&self) -> &ScheduleState {
        &self.state
    }

    /// Loops until `shutdown` flips to `true`. The cycle itself is awaited to
    /// completion; it is responsible for reacting to the same signal.
    pub async fn run<F, Fut>(&mut self, mut cycle: F, shutdown: &mut watch::Receiver<bool>)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        info!(
            "Scheduler started: {} window(s), interval {} ± {}",
            self.schedule.windows.len(),
            format_clock(self.schedule.interval),
            format_clock(self.schedule.jitter)
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let now = self.clock.time_of_day();
            let wait = if self.schedule.is_allowed(now) {
                self.state.status = ScheduleStatus::Allowed;
                info!("Within working hours ({}), running cycle", format_clock(now));
                cycle().await;
                self.state.cycles_run += 1;

                if *shutdown.borrow() {
                    break;
                }
                let (wait, offset) = self.schedule.jittered_interval();
                self.state.accumulated_jitter_ms += offset;
                wait
            } else {
                self.state.status = ScheduleStatus::Blocked;
                let wait = self.schedule.delay_until_next_window(now);
                info!("Outside working hours ({}), waiting for next window", format_clock(now));
                wait
            };

            let after = self.clock.time_of_day() + wait;
            self.state.next_wake = Some(modulo_day(after));
            info!(
                "Sleeping {} (next wake at {})",
                format_clock(wait),
                format_clock(modulo_day(after))
            );

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown_requested(shutdown) => {
                    warn!("Shutdown during sleep, stopping scheduler");
                    break;
                }
            }
        }

        info!("Scheduler stopped after {} cycle(s)", self.state.cycles_run);
    }
}

/// Resolves once `shutdown` reads `true`. Never resolves if the sender is
/// gone without having signalled.
pub async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Flips the returned receiver to `true` on Ctrl-C or SIGTERM.
pub fn install_shutdown_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = signal(SignalKind::terminate()).ok();
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C"),
                _ = async {
                    if let Some(ref mut s) = sigterm {
                        s.recv().await;
                    } else {
                        futures::future::pending::<()>().await;
                    }
                } => info!("Received SIGTERM"),
            }
        }

        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received Ctrl+C");
        }

        let _ = tx.send(true);
    });
    rx
}
