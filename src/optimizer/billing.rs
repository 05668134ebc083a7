//! Bill evaluation of a dispatched net-load series under a tariff.

use std::collections::{BTreeMap, BTreeSet};

use super::{BillBreakdown, ComponentPeak, DispatchOptions};
use crate::domain::{BillingPeriod, DayKey, MonthKey, TariffInterval, TariffPlan};

/// Everything the billing engine derives from one net-load series.
#[derive(Debug, Clone, PartialEq)]
pub struct BillEvaluation {
    pub bill: BillBreakdown,
    pub component_peaks: Vec<ComponentPeak>,
    pub monthly_peaks: BTreeMap<MonthKey, f64>,
    pub daily_peaks: BTreeMap<DayKey, f64>,
}

/// Price `net_kw` (aligned with `intervals`) under `plan`.
///
/// `discharge_kw` carries the battery output used for operating cost; pass
/// an empty slice for a load with no battery.
pub fn evaluate_bill(
    intervals: &[TariffInterval],
    net_kw: &[f64],
    discharge_kw: &[f64],
    plan: &TariffPlan,
    options: &DispatchOptions,
) -> BillEvaluation {
    let energy_cost: f64 = intervals
        .iter()
        .zip(net_kw)
        .map(|(interval, net)| interval.energy_rate * net * interval.hours)
        .sum();

    let component_peaks = component_peaks(intervals, net_kw, plan);
    let demand_cost: f64 = component_peaks.iter().map(|p| p.charge).sum();

    let months: BTreeSet<MonthKey> = intervals.iter().map(|i| i.month).collect();
    let fixed_cost = plan.fixed_monthly_charge * months.len() as f64;

    let discharged_kwh: f64 = intervals
        .iter()
        .zip(discharge_kw)
        .map(|(interval, kw)| kw.max(0.0) * interval.hours)
        .sum();
    let operating_cost = discharged_kwh * options.discharge_cost_per_kwh();

    let mut monthly_peaks = BTreeMap::new();
    let mut daily_peaks = BTreeMap::new();
    for (interval, net) in intervals.iter().zip(net_kw) {
        raise(&mut monthly_peaks, interval.month, *net);
        raise(&mut daily_peaks, interval.day, *net);
    }

    BillEvaluation {
        bill: BillBreakdown {
            energy_cost,
            demand_cost,
            fixed_cost,
            operating_cost,
            total: energy_cost + demand_cost + fixed_cost + operating_cost,
        },
        component_peaks,
        monthly_peaks,
        daily_peaks,
    }
}

/// Per component and billing period, the largest net load among the
/// intervals the component applies to. Periods without an applicable
/// interval are omitted.
pub fn component_peaks(
    intervals: &[TariffInterval],
    net_kw: &[f64],
    plan: &TariffPlan,
) -> Vec<ComponentPeak> {
    let mut peaks = Vec::new();
    for component in &plan.demand {
        let mut by_period: BTreeMap<BillingPeriod, f64> = BTreeMap::new();
        for (interval, net) in intervals.iter().zip(net_kw) {
            if component.applies_to(interval) {
                raise(&mut by_period, component.period_of(interval), *net);
            }
        }
        peaks.extend(by_period.into_iter().map(|(period, peak_kw)| ComponentPeak {
            component: component.name.clone(),
            kind: component.kind,
            period,
            peak_kw,
            charge: component.rate * peak_kw.max(0.0),
        }));
    }
    peaks
}

fn raise<K: Ord>(map: &mut BTreeMap<K, f64>, key: K, value: f64) {
    map.entry(key)
        .and_modify(|peak| *peak = peak.max(value))
        .or_insert(value);
}
