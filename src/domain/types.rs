use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime};
use chrono_tz::Tz;
use itertools::Itertools;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Interval length assumed when it cannot be inferred from the series (15 minutes).
pub const DEFAULT_INTERVAL_HOURS: f64 = 0.25;

/// Calendar day used to key daily demand peaks.
pub type DayKey = NaiveDate;

// ============================================================================
// Load Series
// ============================================================================

/// One metered demand reading.
///
/// Series are expected in chronological order with a constant interval length.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LoadInterval {
    pub timestamp: DateTime<FixedOffset>,
    pub kw: f64,
}

impl LoadInterval {
    pub fn new(timestamp: DateTime<FixedOffset>, kw: f64) -> Self {
        Self { timestamp, kw }
    }

    /// Wall-clock time of the reading, in `tz` if given, otherwise in the
    /// timestamp's own offset.
    pub fn local_time(&self, tz: Option<Tz>) -> NaiveDateTime {
        match tz {
            Some(tz) => self.timestamp.with_timezone(&tz).naive_local(),
            None => self.timestamp.naive_local(),
        }
    }

    pub fn month_key(&self, tz: Option<Tz>) -> MonthKey {
        MonthKey::from(self.local_time(tz).date())
    }

    pub fn day_key(&self, tz: Option<Tz>) -> DayKey {
        self.local_time(tz).date()
    }
}

/// Interval length in hours, taken from the first pair of consecutive
/// timestamps that are strictly increasing.
pub fn interval_hours(series: &[LoadInterval]) -> f64 {
    series
        .iter()
        .tuple_windows()
        .map(|(a, b)| (b.timestamp - a.timestamp).num_seconds() as f64 / 3600.0)
        .find(|hours| *hours > 0.0)
        .unwrap_or(DEFAULT_INTERVAL_HOURS)
}

/// Largest value of a kW series, or 0 for an empty one.
pub fn peak_kw<I>(values: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    values
        .into_iter()
        .map(OrderedFloat)
        .max()
        .map(|v| v.into_inner())
        .unwrap_or(0.0)
}

// ============================================================================
// Calendar Keys
// ============================================================================

/// Calendar month (local time) used for monthly billing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }
}

impl From<NaiveDate> for MonthKey {
    fn from(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .split_once('-')
            .ok_or_else(|| format!("invalid month key: {s}"))?;
        let year = year
            .parse::<i32>()
            .map_err(|_| format!("invalid year in month key: {s}"))?;
        let month = month
            .parse::<u32>()
            .ok()
            .filter(|m| (1..=12).contains(m))
            .ok_or_else(|| format!("invalid month in month key: {s}"))?;
        Ok(Self { year, month })
    }
}

impl Serialize for MonthKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MonthKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
