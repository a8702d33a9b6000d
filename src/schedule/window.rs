use std::{fmt, sync::LazyLock};

use chrono::{NaiveTime, Timelike};
use regex::Regex;
use thiserror::Error;

static CLOCK_FORMAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:([01][0-9]|2[0-3]):([0-5][0-9])|(24):(00))$").unwrap());

const MINUTES_PER_DAY: u16 = 24 * 60;

/// Wall-clock time of day at minute resolution, as minutes since midnight.
///
/// Comparing the composed value (never hour and minute separately) is what
/// makes 10:15 fall after 09:45.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockTime(u16);

impl ClockTime {
    pub const END_OF_DAY: ClockTime = ClockTime(MINUTES_PER_DAY);

    pub fn from_hm(hour: u32, minute: u32) -> Option<Self> {
        let minutes = hour.checked_mul(60)?.checked_add(minute)?;
        (minute < 60 && minutes <= u32::from(MINUTES_PER_DAY)).then(|| Self(minutes as u16))
    }

    /// Parse `"HH:MM"`. `"24:00"` is accepted and means end of day.
    pub fn parse(raw: &str) -> Option<Self> {
        let caps = CLOCK_FORMAT.captures(raw)?;
        let (hour, minute) = match (caps.get(1), caps.get(2)) {
            (Some(h), Some(m)) => (h.as_str(), m.as_str()),
            _ => ("24", "00"),
        };
        Self::from_hm(hour.parse().ok()?, minute.parse().ok()?)
    }

    pub fn minutes(self) -> u16 {
        self.0
    }
}

impl From<NaiveTime> for ClockTime {
    fn from(t: NaiveTime) -> Self {
        Self((t.hour() * 60 + t.minute()) as u16)
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WindowError {
    #[error("{0:?} is not a valid HH:MM time")]
    InvalidTime(String),

    /// Covers midnight-crossing windows, which are not supported.
    #[error("end {end} must be after start {start}")]
    EndNotAfterStart { start: ClockTime, end: ClockTime },
}

/// Half-open daily interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: ClockTime,
    pub end: ClockTime,
}

impl TimeWindow {
    pub fn parse(start: &str, end: &str) -> Result<Self, WindowError> {
        let parse = |raw: &str| {
            ClockTime::parse(raw).ok_or_else(|| WindowError::InvalidTime(raw.to_owned()))
        };
        let (start, end) = (parse(start)?, parse(end)?);

        if end <= start {
            return Err(WindowError::EndNotAfterStart { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, now: ClockTime) -> bool {
        (self.start..self.end).contains(&now)
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}
