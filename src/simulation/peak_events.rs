//! Segmentation of a load series into peak events.

use chrono::{DateTime, Duration, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::domain::LoadInterval;

/// A maximal run of consecutive intervals whose demand exceeds a threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakEvent {
    /// Timestamp of the first interval in the run
    pub start: DateTime<FixedOffset>,
    /// End of the last interval in the run (its timestamp plus one interval)
    pub end: DateTime<FixedOffset>,
    pub start_index: usize,
    /// Inclusive
    pub end_index: usize,
    pub duration_hours: f64,
    pub peak_kw: f64,
    /// Energy above the threshold over the run
    pub total_excess_kwh: f64,
}

impl PeakEvent {
    pub fn interval_count(&self) -> usize {
        self.end_index - self.start_index + 1
    }
}

/// Find every maximal run with `kw > threshold_kw`. O(n), no state.
pub fn detect_peak_events(
    series: &[LoadInterval],
    threshold_kw: f64,
    interval_hours: f64,
) -> Vec<PeakEvent> {
    let step = Duration::milliseconds((interval_hours * 3_600_000.0).round() as i64);
    let mut events = Vec::new();
    let mut current: Option<PeakEvent> = None;

    for (index, reading) in series.iter().enumerate() {
        if reading.kw > threshold_kw {
            let excess_kwh = (reading.kw - threshold_kw) * interval_hours;
            match current.as_mut() {
                Some(event) => {
                    event.end = reading.timestamp + step;
                    event.end_index = index;
                    event.duration_hours += interval_hours;
                    event.peak_kw = event.peak_kw.max(reading.kw);
                    event.total_excess_kwh += excess_kwh;
                }
                None => {
                    current = Some(PeakEvent {
                        start: reading.timestamp,
                        end: reading.timestamp + step,
                        start_index: index,
                        end_index: index,
                        duration_hours: interval_hours,
                        peak_kw: reading.kw,
                        total_excess_kwh: excess_kwh,
                    });
                }
            }
        } else if let Some(event) = current.take() {
            events.push(event);
        }
    }
    events.extend(current);
    events
}
