//! Economic threshold search on top of the cap feasibility oracle.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use super::SearchBounds;
use crate::domain::{peak_kw, BatterySpec, LoadInterval, MonthKey};
use crate::simulation::{demand_peak_kw, CapFeasibilityOracle};

/// Economics of operating at one threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdCandidate {
    pub threshold_kw: f64,
    pub feasible: bool,
    /// Sum over calendar months of the monthly peak reduction (kW)
    pub peak_reduction_kw: f64,
    pub annual_savings: f64,
    /// `None` when the threshold saves nothing
    pub payback_years: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSearchResult {
    pub threshold_kw: f64,
    pub min_feasible_threshold_kw: f64,
    pub original_peak_kw: f64,
    pub peak_reduction_kw: f64,
    pub annual_savings: f64,
    pub payback_years: Option<f64>,
    pub feasible: bool,
    /// False when no candidate met the payback window and the minimum
    /// feasible threshold was returned instead
    pub within_payback_bounds: bool,
    pub candidates: Vec<ThresholdCandidate>,
}

/// Finds the lowest holdable demand cap, then picks the candidate threshold
/// with the best peak reduction per dollar inside the payback window.
#[derive(Debug, Clone, Default)]
pub struct ThresholdSearchOptimizer {
    pub bounds: SearchBounds,
    pub oracle: CapFeasibilityOracle,
}

impl ThresholdSearchOptimizer {
    pub fn new(bounds: SearchBounds) -> Self {
        Self {
            bounds,
            oracle: CapFeasibilityOracle::default(),
        }
    }

    pub fn with_initial_soc(mut self, initial_soc: Option<f64>) -> Self {
        self.oracle.initial_soc = initial_soc;
        self
    }

    /// Binary search for the lowest cap the battery can hold, to within
    /// `bounds.tolerance_kw`. The bracket tops out at the demand peak
    /// including parasitic load, which needs no discharge to hold.
    pub fn min_feasible_threshold(&self, series: &[LoadInterval], battery: &BatterySpec) -> f64 {
        let mut hi = demand_peak_kw(series, battery);
        let mut lo = self.bounds.min_threshold_kw.unwrap_or(0.0).min(hi);

        if !self.oracle.is_feasible(series, battery, hi) {
            warn!(cap_kw = hi, "demand peak not holdable; returning it unsearched");
            return hi;
        }
        if self.oracle.is_feasible(series, battery, lo) {
            return lo;
        }

        let tolerance = self.bounds.tolerance_kw.max(1e-6);
        let mut iterations = 0;
        while hi - lo > tolerance && iterations < self.bounds.max_iterations {
            let mid = 0.5 * (lo + hi);
            if self.oracle.is_feasible(series, battery, mid) {
                hi = mid;
            } else {
                lo = mid;
            }
            iterations += 1;
        }
        debug!(iterations, min_feasible_kw = hi, "threshold bracket converged");
        hi
    }

    /// Evaluate one threshold against a scalar demand rate ($/kW-month).
    pub fn evaluate(
        &self,
        series: &[LoadInterval],
        battery: &BatterySpec,
        threshold_kw: f64,
        rate_per_kw_month: f64,
        system_cost: f64,
    ) -> ThresholdCandidate {
        let outcome = self.oracle.enforce(series, battery, threshold_kw);
        if !outcome.feasible {
            return ThresholdCandidate {
                threshold_kw,
                feasible: false,
                peak_reduction_kw: 0.0,
                annual_savings: 0.0,
                payback_years: None,
            };
        }

        let before = monthly_peaks(series);
        let after = monthly_peaks(&outcome.net_load);
        let peak_reduction_kw: f64 = before
            .iter()
            .map(|(month, peak)| (peak - after.get(month).copied().unwrap_or(*peak)).max(0.0))
            .sum();

        let months_observed = before.len().max(1) as f64;
        let annual_savings = peak_reduction_kw * (12.0 / months_observed) * rate_per_kw_month;
        let payback_years = (annual_savings > 0.0).then(|| system_cost / annual_savings);

        ThresholdCandidate {
            threshold_kw,
            feasible: true,
            peak_reduction_kw,
            annual_savings,
            payback_years,
        }
    }

    pub fn optimize(
        &self,
        series: &[LoadInterval],
        battery: &BatterySpec,
        rate_per_kw_month: f64,
        system_cost: f64,
    ) -> ThresholdSearchResult {
        let original_peak_kw = peak_kw(series.iter().map(|r| r.kw));
        let min_feasible = self.min_feasible_threshold(series, battery);

        let count = self.bounds.candidate_count.max(1);
        let span = demand_peak_kw(series, battery).max(min_feasible) - min_feasible;
        let candidates: Vec<ThresholdCandidate> = (0..count)
            .map(|i| {
                let threshold_kw = if count == 1 {
                    min_feasible
                } else {
                    min_feasible + span * i as f64 / (count - 1) as f64
                };
                self.evaluate(series, battery, threshold_kw, rate_per_kw_month, system_cost)
            })
            .collect();

        let efficiency = |c: &ThresholdCandidate| {
            if system_cost > 0.0 {
                c.peak_reduction_kw / system_cost
            } else {
                c.peak_reduction_kw
            }
        };
        let mut best: Option<&ThresholdCandidate> = None;
        for candidate in candidates.iter().filter(|c| {
            c.feasible
                && c.payback_years.is_some_and(|years| {
                    years >= self.bounds.min_payback_years && years <= self.bounds.max_payback_years
                })
        }) {
            if best.map_or(true, |b| efficiency(candidate) > efficiency(b)) {
                best = Some(candidate);
            }
        }

        let (chosen, within_payback_bounds) = match best {
            Some(candidate) => (candidate.clone(), true),
            None => {
                warn!(
                    min_feasible_kw = min_feasible,
                    min_payback_years = self.bounds.min_payback_years,
                    max_payback_years = self.bounds.max_payback_years,
                    "no threshold met the payback window; using minimum feasible threshold"
                );
                let fallback = candidates
                    .first()
                    .cloned()
                    .unwrap_or_else(|| {
                        self.evaluate(series, battery, min_feasible, rate_per_kw_month, system_cost)
                    });
                (fallback, false)
            }
        };

        info!(
            threshold_kw = chosen.threshold_kw,
            peak_reduction_kw = chosen.peak_reduction_kw,
            annual_savings = chosen.annual_savings,
            within_payback_bounds,
            "threshold selected"
        );

        ThresholdSearchResult {
            threshold_kw: chosen.threshold_kw,
            min_feasible_threshold_kw: min_feasible,
            original_peak_kw,
            peak_reduction_kw: chosen.peak_reduction_kw,
            annual_savings: chosen.annual_savings,
            payback_years: chosen.payback_years,
            feasible: chosen.feasible,
            within_payback_bounds,
            candidates,
        }
    }
}

/// Peak demand per calendar month, keyed by each timestamp's local date.
///
/// The bill path buckets by `TariffPlan::timezone` instead, so when a plan
/// names a zone the two can place intervals near a month boundary in
/// different months.
pub fn monthly_peaks(series: &[LoadInterval]) -> BTreeMap<MonthKey, f64> {
    let mut peaks = BTreeMap::new();
    for reading in series {
        peaks
            .entry(reading.month_key(None))
            .and_modify(|peak: &mut f64| *peak = peak.max(reading.kw))
            .or_insert(reading.kw);
    }
    peaks
}
