//! Calendar scanner.
//!
//! Two modes share the month navigation and slot probing below:
//!
//! * [`ScanMode::Full`] opens every enabled day of the next N months.
//! * [`ScanMode::Furthest`] probes a single "frontier" day. Months whose last
//!   enabled working day is also their last working day are treated as full,
//!   and the search follows them forward (see [`FrontierPolicy`]). The result
//!   is cached on the [`Session`] and reused for every later location.
//!
//! Both modes leave the calendar on the month it showed initially.

use crate::core::types::{CalendarMonth, DateCandidate, FurthestDateCache, Location, Queue, SlotFinding};
use crate::features::session::Session;
use crate::scraping::port::{ElementHandle, PortError, PortResult};
use crate::scraping::selectors;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("calendar did not render within {}s", .0.as_secs())]
    CalendarMissing(Duration),

    #[error("unrecognised calendar month label '{0}'")]
    UnreadableMonth(String),

    #[error(transparent)]
    Port(#[from] PortError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    Full,
    #[default]
    Furthest,
}

impl FromStr for ScanMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(ScanMode::Full),
            "furthest" | "last" | "last_date" => Ok(ScanMode::Furthest),
            other => Err(format!("unknown scan mode '{}' (expected full or furthest)", other)),
        }
    }
}

/// Tuning for the frontier search. The "full month" rule is a calibrated
/// guess about how the portal releases dates; revalidate against live
/// behaviour before changing the defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FrontierPolicy {
    /// Number of month views the search may inspect, counting the initial one.
    pub max_months_forward: u32,
    /// Advance past months that are open up to their last working day.
    pub follow_full_months: bool,
}

impl Default for FrontierPolicy {
    fn default() -> Self {
        Self {
            max_months_forward: 3,
            follow_full_months: true,
        }
    }
}

impl FrontierPolicy {
    /// Whether the search should look at the month after `month`, given its
    /// last enabled working day and the current offset.
    pub fn should_advance(&self, month: &CalendarMonth, last_day: u32, offset: u32) -> bool {
        self.follow_full_months
            && offset + 1 < self.max_months_forward
            && last_day == month.last_working_day()
    }
}

#[derive(Debug, Clone)]
pub struct ScannerSettings {
    pub mode: ScanMode,
    pub months_to_check: u32,
    pub frontier: FrontierPolicy,
    /// How long to wait for the calendar after a queue is chosen.
    pub calendar_timeout: Duration,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            mode: ScanMode::Furthest,
            months_to_check: 5,
            frontier: FrontierPolicy::default(),
            calendar_timeout: Duration::from_secs(5),
        }
    }
}

/// One rendered month view.
#[derive(Debug, Clone)]
struct MonthView {
    label: String,
    month: CalendarMonth,
    enabled: Vec<DateCandidate>,
}

impl MonthView {
    fn last_working_enabled(&self) -> Option<u32> {
        self.enabled
            .iter()
            .filter(|c| !c.weekend)
            .map(|c| c.day)
            .max()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Forward,
    Back,
}

#[derive(Debug, Clone)]
pub struct CalendarScanner {
    pub settings: ScannerSettings,
}

impl CalendarScanner {
    pub fn new(settings: ScannerSettings) -> Self {
        Self { settings }
    }

    /// Scans the calendar shown for `location`/`queue`. Every confirmed
    /// finding is pushed to the notifier as soon as it is seen and returned.
    pub async fn scan(
        &self,
        session: &mut Session,
        location: &Location,
        queue: &Queue,
    ) -> Result<Vec<SlotFinding>, ScanError> {
        debug!("waiting for calendar to load...");
        let timeout = self.settings.calendar_timeout;
        match session
            .port()
            .wait_until_present(&selectors::calendar(), timeout)
            .await
        {
            Ok(_) => {}
            Err(PortError::Timeout { .. }) => return Err(ScanError::CalendarMissing(timeout)),
            Err(e) => return Err(e.into()),
        }

        match self.settings.mode {
            ScanMode::Full => self.scan_full(session, location, queue).await,
            ScanMode::Furthest => self.scan_furthest(session, location, queue).await,
        }
    }

    async fn scan_full(
        &self,
        session: &mut Session,
        location: &Location,
        queue: &Queue,
    ) -> Result<Vec<SlotFinding>, ScanError> {
        let mut findings = Vec::new();
        let mut moved = 0u32;
        let result = async {
            let mut empty_streak = 0u32;
            for index in 0..self.settings.months_to_check {
                let view = read_month(session).await?;
                info!("{} enabled cells in {}", view.enabled.len(), view.label);

                if view.enabled.is_empty() {
                    empty_streak += 1;
                    if empty_streak >= 2 {
                        info!("Two consecutive months without dates, stopping scan");
                        break;
                    }
                } else {
                    empty_streak = 0;
                    for candidate in &view.enabled {
                        if let Some(finding) =
                            probe_day(session, location, queue, &view, candidate.day).await?
                        {
                            findings.push(finding);
                        }
                    }
                }

                if index + 1 < self.settings.months_to_check {
                    step_month(session, Step::Forward).await?;
                    moved += 1;
                }
            }
            Ok::<(), ScanError>(())
        }
        .await;

        let restored = restore(session, moved).await;
        result?;
        restored?;
        Ok(findings)
    }

    async fn scan_furthest(
        &self,
        session: &mut Session,
        location: &Location,
        queue: &Queue,
    ) -> Result<Vec<SlotFinding>, ScanError> {
        let mut moved = 0u32;
        let result = async {
            let target = match session.furthest_date().cloned() {
                Some(cache) => {
                    info!(
                        "Reusing furthest date: day {} ({} month(s) forward)",
                        cache.day, cache.months_forward
                    );
                    for _ in 0..cache.months_forward {
                        step_month(session, Step::Forward).await?;
                        moved += 1;
                    }
                    Some(cache)
                }
                None => {
                    let found = self.search_frontier(session, &mut moved).await?;
                    if let Some(cache) = found.clone() {
                        session.remember_furthest_date(cache);
                    }
                    found
                }
            };

            let Some(target) = target else {
                warn!("No available working date for \"{}\" - \"{}\"", location, queue);
                return Ok(None);
            };

            let view = read_month(session).await?;
            if !view.enabled.iter().any(|c| c.day == target.day) {
                info!(
                    "Day {} {} not open for \"{}\", skipping",
                    target.day, view.label, location
                );
                return Ok(None);
            }
            info!("✅ Checking furthest date: {} {}", target.day, view.label);
            probe_day(session, location, queue, &view, target.day).await
        }
        .await;

        let restored = restore(session, moved).await;
        let finding = result?;
        restored?;
        Ok(finding.into_iter().collect())
    }

    /// Frontier search from the current month view. `moved` tracks how far
    /// forward the calendar currently is so the caller can restore it.
    async fn search_frontier(
        &self,
        session: &Session,
        moved: &mut u32,
    ) -> Result<Option<FurthestDateCache>, ScanError> {
        let policy = &self.settings.frontier;
        let mut previous: Option<FurthestDateCache> = None;
        let mut offset = 0u32;

        loop {
            let view = read_month(session).await?;
            info!("{} enabled cells in {}", view.enabled.len(), view.label);

            let Some(last_day) = view.last_working_enabled() else {
                warn!("No non-weekend dates in {}", view.label);
                if let Some(prev) = previous {
                    step_month(session, Step::Back).await?;
                    *moved -= 1;
                    return Ok(Some(prev));
                }
                return Ok(None);
            };

            let here = FurthestDateCache {
                day: last_day,
                month_label: view.label.clone(),
                months_forward: offset,
            };

            if policy.should_advance(&view.month, last_day, offset) {
                info!(
                    "{} open until its last working day ({}), checking next month",
                    view.label, last_day
                );
                previous = Some(here);
                step_month(session, Step::Forward).await?;
                *moved += 1;
                offset += 1;
                continue;
            }

            return Ok(Some(here));
        }
    }
}

/// Reads the current month label and its enabled day cells.
async fn read_month(session: &Session) -> Result<MonthView, ScanError> {
    let port = session.port();
    let label_el = port.find(&selectors::month_label()).await?;
    let label = normalize_label(&port.text(label_el).await?);
    let month =
        CalendarMonth::parse_label(&label).ok_or_else(|| ScanError::UnreadableMonth(label.clone()))?;

    let enabled = enabled_days(session)
        .await?
        .into_iter()
        .map(|(day, _)| DateCandidate::new(&month, day))
        .collect();

    Ok(MonthView {
        label,
        month,
        enabled,
    })
}

fn normalize_label(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Enabled cells of the current view with their day numbers, in grid order.
async fn enabled_days(session: &Session) -> PortResult<Vec<(u32, ElementHandle)>> {
    let port = session.port();
    let mut days = Vec::new();
    for cell in port.find_all(&selectors::enabled_day_cells()).await? {
        match port.text(cell).await?.trim().parse::<u32>() {
            Ok(day) => days.push((day, cell)),
            Err(_) => debug!("ignoring calendar cell without a day number"),
        }
    }
    Ok(days)
}

/// Opens `day` in the current view and checks it for time slots.
async fn probe_day(
    session: &Session,
    location: &Location,
    queue: &Queue,
    view: &MonthView,
    day: u32,
) -> Result<Option<SlotFinding>, ScanError> {
    let cell = enabled_days(session)
        .await?
        .into_iter()
        .find(|(d, _)| *d == day)
        .map(|(_, cell)| cell)
        .ok_or_else(|| PortError::NotFound(format!("calendar day {}", day)))?;

    debug!("check {} {}", day, view.label);
    session.human().before_day().await;
    session.human().click(session.port(), cell).await?;
    session.wait_busy().await?;

    if session.check_challenge().await.is_some() {
        info!("Challenge handled, continuing");
    }

    let slot_count = count_slots(session).await?;
    if slot_count == 0 {
        debug!("no time slots for {} {}", day, view.label);
        return Ok(None);
    }

    let finding = SlotFinding {
        location: location.clone(),
        queue: queue.clone(),
        date_label: day.to_string(),
        month_label: view.label.clone(),
        slot_count,
    };
    let message = finding.message();
    info!("{}", message);
    session.notify(&message).await;
    Ok(Some(finding))
}

/// Number of time-slot tiles. A container without tiles counts as none.
async fn count_slots(session: &Session) -> PortResult<usize> {
    let port = session.port();
    if port.find_all(&selectors::slot_container()).await?.is_empty() {
        return Ok(0);
    }
    Ok(port.find_all(&selectors::slot_tiles()).await?.len())
}

async fn step_month(session: &Session, step: Step) -> PortResult<()> {
    let query = match step {
        Step::Forward => selectors::next_month(),
        Step::Back => selectors::previous_month(),
    };
    session.human().before_month_switch().await;
    let button = session.port().find(&query).await?;
    session.human().click(session.port(), button).await?;
    session.wait_busy().await
}

/// Steps back `moved` months to the initial view.
async fn restore(session: &Session, moved: u32) -> PortResult<()> {
    if moved > 0 {
        debug!("Returning {} month(s) back", moved);
    }
    for _ in 0..moved {
        step_month(session, Step::Back).await?;
    }
    Ok(())
}
