//! Compact duration syntax used in configuration: `7h30m`, `29h59m59s`,
//! `15m`, `0s`, `250ms`. A bare integer is read as seconds.

use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

fn compact_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:\d+(?:ms|h|m|s))+$").expect("valid duration pattern"))
}

fn component_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)(ms|h|m|s)").expect("valid duration pattern"))
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DurationParseError {
    #[error("empty duration")]
    Empty,

    #[error("invalid duration '{input}': {reason}")]
    Invalid { input: String, reason: String },
}

pub fn parse_duration(input: &str) -> Result<Duration, DurationParseError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(DurationParseError::Empty);
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    if !compact_pattern().is_match(s) {
        let reason = if s.ends_with(|c: char| c.is_ascii_digit()) {
            "missing unit"
        } else {
            "expected NUMBER+UNIT groups (h, m, s, ms)"
        };
        return Err(DurationParseError::Invalid {
            input: input.to_string(),
            reason: reason.to_string(),
        });
    }

    let mut total = Duration::ZERO;
    for cap in component_pattern().captures_iter(s) {
        let value: u64 = cap[1].parse().map_err(|_| DurationParseError::Invalid {
            input: input.to_string(),
            reason: "number out of range".to_string(),
        })?;
        total += match &cap[2] {
            "h" => Duration::from_secs(value * 3600),
            "m" => Duration::from_secs(value * 60),
            "ms" => Duration::from_millis(value),
            _ => Duration::from_secs(value),
        };
    }
    Ok(total)
}

/// Formats as `HH:MM:SS` (hours may exceed 24).
pub fn format_clock(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

/// Serde adapter for compact duration strings. Plain JSON integers are seconds.
pub mod serde_compact {
    use super::parse_duration;
    use serde::{de, Deserialize, Deserializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Seconds(u64),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Text(s) => parse_duration(&s).map_err(de::Error::custom),
            Raw::Seconds(n) => Ok(Duration::from_secs(n)),
        }
    }
}
