use chrono::{Datelike, Months, NaiveDateTime, Timelike, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use strum::{AsRefStr, Display};

use super::{interval_hours, peak_kw, BatterySpec, DayKey, LoadInterval, MonthKey};

/// Fraction of trailing-12-month peak demand the battery's nameplate power
/// must reach to enroll in a demand-charge program.
pub const DEFAULT_ENROLLMENT_POWER_RATIO: f64 = 0.10;

// ============================================================================
// Applicability
// ============================================================================

/// Local hour-of-day window `[start_hour, end_hour)`.
///
/// A window whose end is before its start wraps past midnight; equal
/// endpoints cover the whole day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourWindow {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl HourWindow {
    pub fn new(start_hour: u32, end_hour: u32) -> Self {
        Self {
            start_hour,
            end_hour,
        }
    }

    pub fn contains(&self, hour: u32) -> bool {
        match self.start_hour.cmp(&self.end_hour) {
            std::cmp::Ordering::Less => hour >= self.start_hour && hour < self.end_hour,
            std::cmp::Ordering::Greater => hour >= self.start_hour || hour < self.end_hour,
            std::cmp::Ordering::Equal => true,
        }
    }
}

/// Predicate deciding whether an interval counts toward a tariff component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Applicability {
    /// Hours that count; empty means every hour.
    #[serde(default)]
    pub windows: Vec<HourWindow>,
    /// Hours removed after `windows` is applied.
    #[serde(default)]
    pub excluded: Vec<HourWindow>,
    #[serde(default)]
    pub weekdays_only: bool,
    /// Calendar months (1-12) that count; empty means every month.
    #[serde(default)]
    pub months: Vec<u32>,
}

impl Applicability {
    pub fn all_hours() -> Self {
        Self::default()
    }

    pub fn between(start_hour: u32, end_hour: u32) -> Self {
        Self {
            windows: vec![HourWindow::new(start_hour, end_hour)],
            ..Self::default()
        }
    }

    pub fn or_between(mut self, start_hour: u32, end_hour: u32) -> Self {
        self.windows.push(HourWindow::new(start_hour, end_hour));
        self
    }

    pub fn excluding(mut self, start_hour: u32, end_hour: u32) -> Self {
        self.excluded.push(HourWindow::new(start_hour, end_hour));
        self
    }

    pub fn weekdays(mut self) -> Self {
        self.weekdays_only = true;
        self
    }

    pub fn in_months(mut self, months: impl IntoIterator<Item = u32>) -> Self {
        self.months.extend(months);
        self
    }

    pub fn applies(&self, local: NaiveDateTime) -> bool {
        let hour = local.hour();
        if self.weekdays_only && matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }
        if !self.months.is_empty() && !self.months.contains(&local.month()) {
            return false;
        }
        let in_window = self.windows.is_empty() || self.windows.iter().any(|w| w.contains(hour));
        in_window && !self.excluded.iter().any(|w| w.contains(hour))
    }
}

// ============================================================================
// Energy Rates
// ============================================================================

/// Named time-of-use bucket with its energy price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TouPeriod {
    pub bucket: String,
    /// $/kWh
    pub rate: f64,
    pub applies: Applicability,
}

/// Energy price as a function of local time. The first matching TOU period wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EnergyRate {
    Flat {
        rate: f64,
    },
    TimeOfUse {
        periods: Vec<TouPeriod>,
        default_rate: f64,
        #[serde(default = "default_bucket")]
        default_bucket: String,
    },
}

fn default_bucket() -> String {
    "off_peak".to_string()
}

impl Default for EnergyRate {
    fn default() -> Self {
        Self::Flat { rate: 0.0 }
    }
}

impl EnergyRate {
    /// `($/kWh, bucket name)` at a local time.
    pub fn rate_at(&self, local: NaiveDateTime) -> (f64, &str) {
        match self {
            Self::Flat { rate } => (*rate, "flat"),
            Self::TimeOfUse {
                periods,
                default_rate,
                default_bucket,
            } => periods
                .iter()
                .find(|p| p.applies.applies(local))
                .map(|p| (p.rate, p.bucket.as_str()))
                .unwrap_or((*default_rate, default_bucket.as_str())),
        }
    }
}

// ============================================================================
// Demand Components
// ============================================================================

/// Billing period over which a demand component takes its maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DemandKind {
    MonthlyMax,
    DailyMax,
}

/// One demand charge: the rate applies to the maximum net load over the
/// applicable intervals of each billing period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandComponent {
    pub kind: DemandKind,
    pub name: String,
    /// $/kW per billing period (month or day, by `kind`)
    pub rate: f64,
    #[serde(default)]
    pub applies: Applicability,
}

impl DemandComponent {
    pub fn monthly(name: impl Into<String>, rate: f64, applies: Applicability) -> Self {
        Self {
            kind: DemandKind::MonthlyMax,
            name: name.into(),
            rate,
            applies,
        }
    }

    pub fn daily(name: impl Into<String>, rate: f64, applies: Applicability) -> Self {
        Self {
            kind: DemandKind::DailyMax,
            name: name.into(),
            rate,
            applies,
        }
    }

    pub fn applies_to(&self, interval: &TariffInterval) -> bool {
        self.applies.applies(interval.local_time)
    }

    pub fn period_of(&self, interval: &TariffInterval) -> BillingPeriod {
        match self.kind {
            DemandKind::MonthlyMax => BillingPeriod::Month(interval.month),
            DemandKind::DailyMax => BillingPeriod::Day(interval.day),
        }
    }
}

/// Key of a single demand-charge billing period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BillingPeriod {
    Month(MonthKey),
    Day(DayKey),
}

impl fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Month(month) => write!(f, "{month}"),
            Self::Day(day) => write!(f, "{}", day.format("%Y-%m-%d")),
        }
    }
}

impl Serialize for BillingPeriod {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ============================================================================
// Tariff Plan
// ============================================================================

/// A utility rate schedule: energy price, demand components, fixed charge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TariffPlan {
    pub name: String,
    #[serde(default)]
    pub energy: EnergyRate,
    #[serde(default)]
    pub demand: Vec<DemandComponent>,
    /// $/month for every calendar month observed in the series
    #[serde(default)]
    pub fixed_monthly_charge: f64,
    /// Zone in which windows and calendar keys are evaluated; defaults to the
    /// offset carried by each timestamp.
    #[serde(default)]
    pub timezone: Option<Tz>,
    #[serde(default = "default_enrollment_ratio")]
    pub enrollment_min_power_ratio: f64,
}

fn default_enrollment_ratio() -> f64 {
    DEFAULT_ENROLLMENT_POWER_RATIO
}

impl Default for TariffPlan {
    fn default() -> Self {
        Self::new("flat", EnergyRate::default())
    }
}

impl TariffPlan {
    pub fn new(name: impl Into<String>, energy: EnergyRate) -> Self {
        Self {
            name: name.into(),
            energy,
            demand: Vec::new(),
            fixed_monthly_charge: 0.0,
            timezone: None,
            enrollment_min_power_ratio: DEFAULT_ENROLLMENT_POWER_RATIO,
        }
    }

    pub fn with_component(mut self, component: DemandComponent) -> Self {
        self.demand.push(component);
        self
    }

    pub fn with_fixed_monthly_charge(mut self, charge: f64) -> Self {
        self.fixed_monthly_charge = charge;
        self
    }

    pub fn with_timezone(mut self, tz: Tz) -> Self {
        self.timezone = Some(tz);
        self
    }

    /// Attach local calendar, TOU and energy information to each reading.
    pub fn intervals(&self, series: &[LoadInterval]) -> Vec<TariffInterval> {
        let hours = interval_hours(series);
        series
            .iter()
            .enumerate()
            .map(|(index, reading)| {
                let local_time = reading.local_time(self.timezone);
                let (energy_rate, bucket) = self.energy.rate_at(local_time);
                TariffInterval {
                    index,
                    local_time,
                    base_load_kw: reading.kw,
                    base_energy_kwh: reading.kw * hours,
                    hours,
                    month: MonthKey::from(local_time.date()),
                    day: local_time.date(),
                    tou_bucket: bucket.to_string(),
                    energy_rate,
                }
            })
            .collect()
    }

    /// Enrollment gate: nameplate power must reach the configured share of
    /// the peak demand over the 12 months ending at the last reading.
    pub fn qualifies(&self, battery: &BatterySpec, series: &[LoadInterval]) -> bool {
        let Some(last) = series.last() else {
            return false;
        };
        let cutoff = last
            .timestamp
            .checked_sub_months(Months::new(12))
            .unwrap_or(last.timestamp);
        let trailing_peak = peak_kw(
            series
                .iter()
                .filter(|r| r.timestamp > cutoff)
                .map(|r| r.kw),
        );
        battery.power_kw > 0.0 && battery.power_kw >= self.enrollment_min_power_ratio * trailing_peak
    }
}

/// A load reading annotated for billing.
#[derive(Debug, Clone, PartialEq)]
pub struct TariffInterval {
    pub index: usize,
    pub local_time: NaiveDateTime,
    pub base_load_kw: f64,
    pub base_energy_kwh: f64,
    pub hours: f64,
    pub month: MonthKey,
    pub day: DayKey,
    pub tou_bucket: String,
    /// $/kWh
    pub energy_rate: f64,
}
