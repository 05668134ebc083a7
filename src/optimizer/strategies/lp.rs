//! LP (Linear Programming) tariff-optimal dispatch
//!
//! Finds the charge/discharge schedule that minimises the bill under an
//! arbitrary set of overlapping demand components.
//!
//! The formulation considers:
//! - Time-varying energy prices
//! - Battery SoC window (with reserve), power limits and C-rates
//! - One-way efficiency applied on each direction
//! - One auxiliary peak variable per demand component and billing period,
//!   bounded below by every applicable interval's net load, so minimising
//!   `rate * peak` prices exactly the maximum
//! - Variable O&M and degradation proxy on discharged energy

use std::collections::BTreeMap;

#[cfg(feature = "optimization")]
use tracing::debug;

use crate::domain::{BatterySpec, BillingPeriod, TariffInterval, TariffPlan};
use crate::optimizer::{DispatchError, DispatchOptions};

/// Above this many intervals the LP gets slow enough to be worth a warning.
pub const LARGE_PROBLEM_INTERVALS: usize = 35_040;

/// Raw LP schedule, aligned with the input intervals.
#[derive(Debug, Clone, PartialEq)]
pub struct LpSchedule {
    pub charge_kw: Vec<f64>,
    pub discharge_kw: Vec<f64>,
    /// Stored energy at each interval boundary (`n + 1` values, kWh)
    pub stored_kwh: Vec<f64>,
}

impl LpSchedule {
    /// Intervals where the solver charged and discharged at the same time.
    pub fn simultaneous_intervals(&self, tolerance_kw: f64) -> usize {
        self.charge_kw
            .iter()
            .zip(&self.discharge_kw)
            .filter(|(c, d)| c.min(**d) > tolerance_kw)
            .count()
    }
}

/// Builds and solves one LP instance per call.
#[derive(Debug, Clone, Default)]
pub struct LpDispatchOptimizer {
    pub options: DispatchOptions,
}

/// Intervals grouped by (demand component index, billing period).
pub(crate) fn demand_groups(
    intervals: &[TariffInterval],
    plan: &TariffPlan,
) -> BTreeMap<(usize, BillingPeriod), Vec<usize>> {
    let mut groups: BTreeMap<(usize, BillingPeriod), Vec<usize>> = BTreeMap::new();
    for (c, component) in plan.demand.iter().enumerate() {
        for interval in intervals.iter().filter(|i| component.applies_to(i)) {
            groups
                .entry((c, component.period_of(interval)))
                .or_default()
                .push(interval.index);
        }
    }
    groups
}

impl LpDispatchOptimizer {
    pub fn new(options: DispatchOptions) -> Self {
        Self { options }
    }

    #[cfg(feature = "optimization")]
    pub fn solve(
        &self,
        intervals: &[TariffInterval],
        battery: &BatterySpec,
        plan: &TariffPlan,
    ) -> Result<LpSchedule, DispatchError> {
        use good_lp::solvers::minilp::minilp;
        use good_lp::{constraint, variable, Expression, ProblemVariables, ResolutionError, Solution, SolverModel};

        use crate::optimizer::SolverStatus;

        let n = intervals.len();
        if n == 0 {
            return Ok(LpSchedule {
                charge_kw: Vec::new(),
                discharge_kw: Vec::new(),
                stored_kwh: Vec::new(),
            });
        }
        if n > LARGE_PROBLEM_INTERVALS {
            tracing::warn!(
                intervals = n,
                components = plan.demand.len(),
                "large LP instance; consider solving month by month"
            );
        }

        let hours = intervals[0].hours;
        let eta = battery.one_way_efficiency();
        // A battery with zero efficiency can only waste energy
        let (max_charge_kw, max_discharge_kw, eta) = if eta > 0.0 {
            (battery.max_charge_kw(), battery.max_discharge_kw(), eta)
        } else {
            (0.0, 0.0, 1.0)
        };
        let parasitic_kw = battery.parasitic_load_kw();
        let (min_kwh, max_kwh) = battery.energy_bounds_kwh();
        let (min_soc, max_soc) = battery.soc_bounds();
        let initial_kwh = self
            .options
            .initial_soc
            .unwrap_or(max_soc)
            .max(min_soc)
            .min(max_soc)
            * battery.usable_capacity_kwh();

        let mut vars = ProblemVariables::new();
        let charge = vars.add_vector(variable().min(0.0).max(max_charge_kw), n);
        let discharge = vars.add_vector(variable().min(0.0).max(max_discharge_kw), n);
        let stored = vars.add_vector(variable().min(min_kwh).max(max_kwh), n + 1);

        let groups = demand_groups(intervals, plan);
        let peaks: Vec<_> = groups
            .keys()
            .map(|_| vars.add(variable().min(0.0)))
            .collect();

        // Objective: energy + demand + discharge operating cost. The base-load
        // energy term is constant and left out.
        let energy_cost = intervals
            .iter()
            .enumerate()
            .map(|(t, interval)| interval.energy_rate * interval.hours * (charge[t] - discharge[t]))
            .sum::<Expression>();

        let demand_cost = groups
            .keys()
            .zip(&peaks)
            .map(|((c, _), peak)| plan.demand[*c].rate * *peak)
            .sum::<Expression>();

        let discharge_cost_per_kwh = self.options.discharge_cost_per_kwh();
        let operating_cost = intervals
            .iter()
            .enumerate()
            .map(|(t, interval)| discharge_cost_per_kwh * interval.hours * discharge[t])
            .sum::<Expression>();

        let objective = energy_cost + demand_cost + operating_cost;
        let mut model = vars.minimise(objective).using(minilp);

        model = model.with(constraint!(stored[0] == initial_kwh));
        for t in 0..n {
            // SoC dynamics
            model = model.with(constraint!(
                stored[t + 1] - stored[t] - (hours * eta) * charge[t] + (hours / eta) * discharge[t] == 0.0
            ));

            if !self.options.allow_export {
                let site_kw = (intervals[t].base_load_kw + parasitic_kw).max(0.0);
                model = model.with(constraint!(discharge[t] - charge[t] <= site_kw));
            }
        }

        // peak >= net load for every applicable interval
        for (members, peak) in groups.values().zip(&peaks) {
            for &t in members {
                let site_kw = intervals[t].base_load_kw + parasitic_kw;
                model = model.with(constraint!(*peak - charge[t] + discharge[t] >= site_kw));
            }
        }

        debug!(
            intervals = n,
            demand_variables = peaks.len(),
            "solving dispatch LP"
        );

        let solution = model.solve().map_err(|err| {
            let status = match err {
                ResolutionError::Infeasible => SolverStatus::Infeasible,
                ResolutionError::Unbounded => SolverStatus::Unbounded,
                _ => SolverStatus::Failed,
            };
            DispatchError::Solver {
                status,
                message: err.to_string(),
            }
        })?;

        Ok(LpSchedule {
            charge_kw: charge.iter().map(|v| solution.value(*v).max(0.0)).collect(),
            discharge_kw: discharge.iter().map(|v| solution.value(*v).max(0.0)).collect(),
            stored_kwh: stored.iter().map(|v| solution.value(*v)).collect(),
        })
    }

    #[cfg(not(feature = "optimization"))]
    pub fn solve(
        &self,
        _intervals: &[TariffInterval],
        _battery: &BatterySpec,
        _plan: &TariffPlan,
    ) -> Result<LpSchedule, DispatchError> {
        Err(DispatchError::Unavailable)
    }
}

#[cfg(all(test, feature = "optimization"))]
mod tests {
    use super::*;
    use crate::domain::{Applicability, DemandComponent, EnergyRate, LoadInterval};
    use chrono::{Duration, FixedOffset, TimeZone};

    fn hourly(values: &[f64]) -> Vec<LoadInterval> {
        let start = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 6, 3, 0, 0, 0)
            .unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, kw)| LoadInterval::new(start + Duration::hours(i as i64), *kw))
            .collect()
    }

    fn demand_only_plan(rate: f64) -> TariffPlan {
        TariffPlan::new("demand", EnergyRate::Flat { rate: 0.0 })
            .with_component(DemandComponent::monthly("facility", rate, Applicability::all_hours()))
    }

    #[test]
    fn test_flattens_peak_to_energy_limit() {
        // One 2 h spike of 100 kW excess; 100 kWh lossless battery can shave
        // 50 kW off both hours.
        let load = hourly(&[50.0, 50.0, 150.0, 150.0, 50.0, 50.0]);
        let plan = demand_only_plan(10.0);
        let intervals = plan.intervals(&load);
        let battery = BatterySpec::new(100.0, 100.0, 1.0);

        let schedule = LpDispatchOptimizer::default()
            .solve(&intervals, &battery, &plan)
            .unwrap();

        let net: Vec<f64> = load
            .iter()
            .zip(schedule.charge_kw.iter().zip(&schedule.discharge_kw))
            .map(|(r, (c, d))| r.kw + c - d)
            .collect();
        let peak = net.iter().cloned().fold(f64::MIN, f64::max);
        assert!((peak - 100.0).abs() < 1e-4, "peak {peak}");
        assert_eq!(schedule.stored_kwh.len(), load.len() + 1);
        assert!((schedule.stored_kwh[0] - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_respects_energy_bounds() {
        let load = hourly(&[300.0, 300.0, 300.0, 300.0]);
        let plan = demand_only_plan(10.0);
        let intervals = plan.intervals(&load);
        let battery = BatterySpec::new(200.0, 500.0, 0.81).with_soc_limits(0.2, 0.9);

        let schedule = LpDispatchOptimizer::default()
            .solve(&intervals, &battery, &plan)
            .unwrap();
        for kwh in &schedule.stored_kwh {
            assert!(*kwh >= 40.0 - 1e-6 && *kwh <= 180.0 + 1e-6, "{kwh}");
        }
        // 140 kWh above the floor, 0.9 one-way: 126 kWh deliverable over 4 h
        let delivered: f64 = schedule.discharge_kw.iter().sum();
        assert!((delivered - 126.0).abs() < 1e-4, "{delivered}");
    }

    #[test]
    fn test_no_export_by_default() {
        let load = hourly(&[10.0, 10.0]);
        let plan = TariffPlan::new("energy", EnergyRate::Flat { rate: 0.5 });
        let intervals = plan.intervals(&load);
        let battery = BatterySpec::new(100.0, 100.0, 1.0);
        let schedule = LpDispatchOptimizer::default()
            .solve(&intervals, &battery, &plan)
            .unwrap();
        for (d, c) in schedule.discharge_kw.iter().zip(&schedule.charge_kw) {
            assert!(d - c <= 10.0 + 1e-6);
        }
    }

    #[test]
    fn test_demand_groups_split_by_period() {
        let load: Vec<_> = (0..48).map(|_| 10.0).collect();
        let plan = TariffPlan::default()
            .with_component(DemandComponent::daily("peak", 1.0, Applicability::between(16, 21)))
            .with_component(DemandComponent::monthly("facility", 1.0, Applicability::all_hours()));
        let intervals = plan.intervals(&hourly(&load));
        let groups = demand_groups(&intervals, &plan);

        assert_eq!(groups.len(), 3);
        let sizes: Vec<usize> = groups.values().map(Vec::len).collect();
        assert_eq!(sizes, vec![5, 5, 48]);
    }
}
