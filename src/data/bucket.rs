use std::fmt;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// TimeBucket – granularity of a time group key
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeBucket {
    /// Midnight of the day.
    Day,
    /// Monday 00:00 of the ISO week.
    Week,
    /// First instant of the calendar month.
    Month,
    /// Hour of day, 0–23.
    Hour,
    /// Day-of-week name, ordered Monday..Sunday.
    Weekday,
}

impl TimeBucket {
    pub fn key(self, ts: NaiveDateTime) -> GroupValue {
        let date = ts.date();
        match self {
            TimeBucket::Day => GroupValue::Instant(midnight(date)),
            TimeBucket::Week => {
                let back = date.weekday().num_days_from_monday() as i64;
                GroupValue::Instant(midnight(date - Duration::days(back)))
            }
            TimeBucket::Month => {
                // Day 1 exists for every valid (year, month).
                let first = date.with_day(1).unwrap_or(date);
                GroupValue::Instant(midnight(first))
            }
            TimeBucket::Hour => GroupValue::Hour(ts.hour()),
            TimeBucket::Weekday => GroupValue::Weekday(date.weekday().num_days_from_monday()),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TimeBucket::Day => "day",
            TimeBucket::Week => "week",
            TimeBucket::Month => "month",
            TimeBucket::Hour => "hour",
            TimeBucket::Weekday => "weekday",
        }
    }
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

// ---------------------------------------------------------------------------
// GroupValue – one component of a group key
// ---------------------------------------------------------------------------

/// A single component of a group key. Text keys order lexically, time keys
/// chronologically and weekdays Monday first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(untagged)]
pub enum GroupValue {
    /// Record has no value for the dimension.
    Null,
    Text(String),
    Instant(NaiveDateTime),
    Hour(u32),
    /// Days from Monday, 0–6.
    Weekday(u32),
}

impl GroupValue {
    pub fn text(value: impl Into<String>) -> Self {
        GroupValue::Text(value.into())
    }
}

const WEEKDAY_NAMES: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

impl fmt::Display for GroupValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupValue::Null => write!(f, "<null>"),
            GroupValue::Text(s) => write!(f, "{s}"),
            GroupValue::Instant(ts) => write!(f, "{}", ts.format("%Y-%m-%d")),
            GroupValue::Hour(h) => write!(f, "{h:02}:00"),
            GroupValue::Weekday(n) => write!(f, "{}", WEEKDAY_NAMES[*n as usize % 7]),
        }
    }
}
