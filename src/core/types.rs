use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An office location as listed by the portal. Portal order is preserved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location(pub String);

/// A queue offered for a selected [`Location`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Queue(pub String);

impl Location {
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl Queue {
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A (year, month) pair parsed from the calendar header, e.g. `"PAŹ 2025"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CalendarMonth {
    pub year: i32,
    pub month: u32,
}

impl CalendarMonth {
    /// Parses `"<abbreviation> <year>"` using the localized abbreviation table.
    pub fn parse_label(label: &str) -> Option<Self> {
        let mut parts = label.split_whitespace();
        let month = crate::core::locale::month_number(parts.next()?)?;
        let year = parts.next()?.parse::<i32>().ok()?;
        NaiveDate::from_ymd_opt(year, month, 1)?;
        Some(Self { year, month })
    }

    pub fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }

    pub fn days_in_month(&self) -> u32 {
        let (y, m) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        NaiveDate::from_ymd_opt(y, m, 1)
            .and_then(|next| next.pred_opt())
            .map(|last| last.day())
            .unwrap_or(28)
    }

    pub fn date(&self, day: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, day)
    }

    /// Saturday or Sunday. Days outside the month are never weekends.
    pub fn is_weekend(&self, day: u32) -> bool {
        self.date(day)
            .map(|d| matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
            .unwrap_or(false)
    }

    /// The last Monday-to-Friday day on or before the month's last day.
    pub fn last_working_day(&self) -> u32 {
        let mut day = self.days_in_month();
        while day > 1 && self.is_weekend(day) {
            day -= 1;
        }
        day
    }
}

impl fmt::Display for CalendarMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// A day number within a calendar view, tagged weekend/non-weekend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateCandidate {
    pub day: u32,
    pub weekend: bool,
}

impl DateCandidate {
    pub fn new(month: &CalendarMonth, day: u32) -> Self {
        Self {
            day,
            weekend: month.is_weekend(day),
        }
    }
}

/// Session-scoped result of the furthest-date search for the first location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FurthestDateCache {
    pub day: u32,
    pub month_label: String,
    /// Offset in months from the calendar's initial view.
    pub months_forward: u32,
}

/// Slots confirmed present for a location/queue on one date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotFinding {
    pub location: Location,
    pub queue: Queue,
    pub date_label: String,
    pub month_label: String,
    pub slot_count: usize,
}

impl SlotFinding {
    /// Operator-facing message.
    pub fn message(&self) -> String {
        format!(
            "🎯 SLOT FOUND! {} {}: {} - {} ({} slots)",
            self.date_label, self.month_label, self.location, self.queue, self.slot_count
        )
    }
}
