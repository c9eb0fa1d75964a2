use chrono::{Duration as ChronoDuration, NaiveDate, NaiveDateTime, Timelike};
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    Unscheduled,
    Upcoming,
    InProgress,
    Finished,
}

impl SessionStatus {
    pub const ALL: [SessionStatus; 4] = [
        SessionStatus::Upcoming,
        SessionStatus::InProgress,
        SessionStatus::Finished,
        SessionStatus::Unscheduled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Unscheduled => "unscheduled",
            SessionStatus::Upcoming => "upcoming",
            SessionStatus::InProgress => "inProgress",
            SessionStatus::Finished => "finished",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unscheduled" => Some(SessionStatus::Unscheduled),
            "upcoming" => Some(SessionStatus::Upcoming),
            "inprogress" | "in_progress" => Some(SessionStatus::InProgress),
            "finished" => Some(SessionStatus::Finished),
            _ => None,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// UI chip color for a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorTag {
    Info,
    Success,
    Error,
    Default,
}

pub fn status_color(status: SessionStatus) -> ColorTag {
    match status {
        SessionStatus::Upcoming => ColorTag::Info,
        SessionStatus::InProgress => ColorTag::Success,
        SessionStatus::Finished => ColorTag::Error,
        SessionStatus::Unscheduled => ColorTag::Default,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("invalid date {0:?}, expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("invalid time {0:?}, expected HH:MM")]
    InvalidTime(String),
    #[error("invalid timestamp {0:?}, expected YYYY-MM-DDTHH:MM")]
    InvalidNow(String),
}

/// Wall-clock time of day at minute resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

impl TimeOfDay {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        if hour > 23 || minute > 59 {
            return None;
        }
        Some(Self { hour, minute })
    }

    /// Accepts `H:MM`, `HH:MM` and `HH:MM:SS` (seconds are dropped).
    pub fn parse(raw: &str) -> Result<Self, ScheduleError> {
        let bad = || ScheduleError::InvalidTime(raw.to_string());
        let trimmed = raw.trim();
        let mut parts = trimmed.split(':');
        let (Some(h), Some(m)) = (parts.next(), parts.next()) else {
            return Err(bad());
        };
        let digits = |p: &str, min: usize| {
            (min..=2).contains(&p.len()) && p.bytes().all(|b| b.is_ascii_digit())
        };
        if !digits(h, 1) || !digits(m, 2) {
            return Err(bad());
        }
        if let Some(s) = parts.next() {
            if !digits(s, 2) || s.parse::<u8>().map(|v| v > 59).unwrap_or(true) {
                return Err(bad());
            }
        }
        if parts.next().is_some() {
            return Err(bad());
        }
        let hour = h.parse::<u8>().map_err(|_| bad())?;
        let minute = m.parse::<u8>().map_err(|_| bad())?;
        Self::new(hour, minute).ok_or_else(bad)
    }

    pub fn minutes_since_midnight(self) -> u32 {
        u32::from(self.hour) * 60 + u32::from(self.minute)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

fn clock_minutes(now: &NaiveDateTime) -> u32 {
    now.hour() * 60 + now.minute()
}

pub fn parse_session_date(raw: &str) -> Result<NaiveDate, ScheduleError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| ScheduleError::InvalidDate(raw.to_string()))
}

/// Local timestamp pinned by a request, e.g. `2024-03-01T09:30`.
pub fn parse_now(raw: &str) -> Result<NaiveDateTime, ScheduleError> {
    let trimmed = raw.trim();
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M"))
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M"))
        .map_err(|_| ScheduleError::InvalidNow(raw.to_string()))
}

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S").to_string()
}

/// Derives the temporal status of a session as seen at `now`.
///
/// All four inputs are taken in the same local frame. Missing scheduling
/// data yields `Unscheduled`. Both ends of `[start, end]` count as in progress.
pub fn resolve_status(
    date: Option<NaiveDate>,
    start: Option<TimeOfDay>,
    end: Option<TimeOfDay>,
    now: NaiveDateTime,
) -> SessionStatus {
    let (Some(date), Some(start), Some(end)) = (date, start, end) else {
        return SessionStatus::Unscheduled;
    };

    match date.cmp(&now.date()) {
        Ordering::Greater => SessionStatus::Upcoming,
        Ordering::Less => SessionStatus::Finished,
        Ordering::Equal => {
            let now_minutes = clock_minutes(&now);
            if now_minutes < start.minutes_since_midnight() {
                SessionStatus::Upcoming
            } else if now_minutes > end.minutes_since_midnight() {
                SessionStatus::Finished
            } else {
                SessionStatus::InProgress
            }
        }
    }
}

/// Earliest instant after `now` at which `resolve_status` would return a
/// different value, or `None` once the session can no longer change.
pub fn next_transition(
    date: Option<NaiveDate>,
    start: Option<TimeOfDay>,
    end: Option<TimeOfDay>,
    now: NaiveDateTime,
) -> Option<NaiveDateTime> {
    let (d, s, e) = (date?, start?, end?);
    match resolve_status(date, start, end, now) {
        SessionStatus::Upcoming => d.and_hms_opt(u32::from(s.hour), u32::from(s.minute), 0),
        SessionStatus::InProgress => d
            .and_hms_opt(u32::from(e.hour), u32::from(e.minute), 0)
            .map(|t| t + ChronoDuration::minutes(1)),
        SessionStatus::Finished | SessionStatus::Unscheduled => None,
    }
}
