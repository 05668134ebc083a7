//! Per-interval battery physics shared by the heuristic simulator and the
//! cap feasibility oracle.

use crate::domain::{peak_kw, BatterySpec, LoadInterval};

/// Minimum gap kept between a charging interval's load and the threshold.
pub const MIN_CHARGE_MARGIN_KW: f64 = 10.0;
/// Charge margin as a share of the threshold, when larger than the minimum.
pub const CHARGE_MARGIN_RATIO: f64 = 0.05;

/// Margin below `threshold_kw` that charging may not cross, so that charging
/// does not build a new near-threshold peak.
pub fn charge_margin_kw(threshold_kw: f64) -> f64 {
    (CHARGE_MARGIN_RATIO * threshold_kw).max(MIN_CHARGE_MARGIN_KW)
}

/// Largest site demand over `series` once the battery's parasitic load is
/// added. No threshold at or above this needs any discharge to hold.
pub fn demand_peak_kw(series: &[LoadInterval], battery: &BatterySpec) -> f64 {
    let parasitic_kw = battery.parasitic_load_kw();
    peak_kw(series.iter().map(|r| r.kw + parasitic_kw))
}

/// Outcome of one dispatch interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispatchStep {
    pub charge_kw: f64,
    pub discharge_kw: f64,
    /// Site demand after dispatch
    pub net_kw: f64,
    /// SOC at the end of the interval
    pub soc: f64,
    /// Energy taken out of storage (kWh)
    pub removed_kwh: f64,
    /// Energy put into storage (kWh)
    pub added_kwh: f64,
}

/// Stored energy plus the battery limits that bound every step.
#[derive(Debug, Clone)]
pub struct StorageState {
    stored_kwh: f64,
    min_kwh: f64,
    max_kwh: f64,
    usable_kwh: f64,
    min_soc: f64,
    efficiency: f64,
    max_charge_kw: f64,
    max_discharge_kw: f64,
    parasitic_kw: f64,
    /// Charging never lifts demand to within the margin of this line
    peak_limit_kw: f64,
    hours: f64,
}

impl StorageState {
    /// Start at `initial_soc`, or full (max SOC) when not given.
    pub fn new(battery: &BatterySpec, initial_soc: Option<f64>, hours: f64) -> Self {
        let (min_soc, max_soc) = battery.soc_bounds();
        let usable_kwh = battery.usable_capacity_kwh();
        let soc = initial_soc.unwrap_or(max_soc).max(min_soc).min(max_soc);
        Self {
            stored_kwh: soc * usable_kwh,
            min_kwh: min_soc * usable_kwh,
            max_kwh: max_soc * usable_kwh,
            usable_kwh,
            min_soc,
            efficiency: battery.one_way_efficiency(),
            max_charge_kw: battery.max_charge_kw(),
            max_discharge_kw: battery.max_discharge_kw(),
            parasitic_kw: battery.parasitic_load_kw(),
            peak_limit_kw: f64::INFINITY,
            hours: hours.max(f64::EPSILON),
        }
    }

    /// Cap the charging line at `peak_kw`, usually the demand peak of the
    /// series being dispatched, so a threshold above the peak cannot charge
    /// the site into a new one.
    pub fn with_peak_limit(mut self, peak_kw: f64) -> Self {
        self.peak_limit_kw = peak_kw;
        self
    }

    pub fn soc(&self) -> f64 {
        if self.usable_kwh > 0.0 {
            self.stored_kwh / self.usable_kwh
        } else {
            self.min_soc
        }
    }

    pub fn stored_kwh(&self) -> f64 {
        self.stored_kwh
    }

    /// Dispatch one interval of `base_kw` against `threshold_kw`.
    ///
    /// Discharge shaves load above the threshold; charging only happens when
    /// the load sits below `line - margin` and never lifts it above that
    /// level, where `line` is the threshold or the peak limit if lower. The two are exclusive. Power headroom is derated by the one-way
    /// efficiency so the energy drawn from storage never exceeds what is
    /// available above the SOC floor.
    pub fn step(&mut self, base_kw: f64, threshold_kw: f64) -> DispatchStep {
        let demand_kw = base_kw + self.parasitic_kw;
        let line_kw = threshold_kw.min(self.peak_limit_kw);
        let charge_ceiling_kw = line_kw - charge_margin_kw(line_kw);
        let eta = self.efficiency;

        let mut charge_kw = 0.0;
        let mut discharge_kw = 0.0;
        if demand_kw > threshold_kw && self.stored_kwh > self.min_kwh {
            let energy_headroom_kw = (self.stored_kwh - self.min_kwh) * eta / self.hours;
            discharge_kw = self
                .max_discharge_kw
                .min(energy_headroom_kw)
                .min(demand_kw - threshold_kw)
                .max(0.0);
        } else if demand_kw < charge_ceiling_kw && self.stored_kwh < self.max_kwh && eta > 0.0 {
            let room_kw = (self.max_kwh - self.stored_kwh) / eta / self.hours;
            charge_kw = self
                .max_charge_kw
                .min(room_kw)
                .min(charge_ceiling_kw - demand_kw)
                .max(0.0);
        }

        let removed_kwh = if discharge_kw > 0.0 {
            discharge_kw * self.hours / eta
        } else {
            0.0
        };
        let added_kwh = charge_kw * self.hours * eta;
        self.stored_kwh = (self.stored_kwh - removed_kwh + added_kwh)
            .max(self.min_kwh)
            .min(self.max_kwh);

        DispatchStep {
            charge_kw,
            discharge_kw,
            net_kw: demand_kw - discharge_kw + charge_kw,
            soc: self.soc(),
            removed_kwh,
            added_kwh,
        }
    }
}
