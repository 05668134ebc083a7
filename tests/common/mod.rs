//! Load profile builders shared by the integration suites.

#![allow(dead_code)]

use bess_dispatch::domain::LoadInterval;
use chrono::{DateTime, Duration, FixedOffset, TimeZone};

pub fn midnight(year: i32, month: u32, day: u32) -> DateTime<FixedOffset> {
    FixedOffset::east_opt(0)
        .unwrap()
        .with_ymd_and_hms(year, month, day, 0, 0, 0)
        .unwrap()
}

/// Consecutive readings `minutes` apart starting at `start`.
pub fn series(start: DateTime<FixedOffset>, minutes: i64, values: &[f64]) -> Vec<LoadInterval> {
    values
        .iter()
        .enumerate()
        .map(|(i, kw)| LoadInterval::new(start + Duration::minutes(minutes * i as i64), *kw))
        .collect()
}

pub fn hourly(start: DateTime<FixedOffset>, values: &[f64]) -> Vec<LoadInterval> {
    series(start, 60, values)
}
