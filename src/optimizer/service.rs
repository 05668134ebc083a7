//! Bill optimization entry points: LP first, heuristic when the LP does not
//! come back optimal.

use tracing::{info, warn};

use super::billing::evaluate_bill;
use super::strategies::{LpDispatchOptimizer, LpSchedule};
use super::threshold::ThresholdSearchOptimizer;
use super::{
    BillBreakdown, DispatchError, DispatchOptions, DispatchPath, DispatchResult, SearchBounds,
    SolverStatus,
};
use crate::domain::{interval_hours, BatterySpec, LoadInterval, TariffInterval, TariffPlan};
use crate::simulation::HeuristicDispatchSimulator;

/// Charge and discharge both above this (kW) in one interval is reported.
pub const SIMULTANEOUS_TOLERANCE_KW: f64 = 1e-6;

#[derive(Debug, Clone, Default)]
pub struct BillOptimizer {
    pub options: DispatchOptions,
    /// Used to pick the fallback threshold when none is configured
    pub search: SearchBounds,
}

impl BillOptimizer {
    pub fn new(options: DispatchOptions, search: SearchBounds) -> Self {
        Self { options, search }
    }

    /// Solve on the calling thread. Never fails; see [`DispatchResult::path`].
    pub fn optimize_bill(
        &self,
        series: &[LoadInterval],
        battery: &BatterySpec,
        plan: &TariffPlan,
    ) -> DispatchResult {
        let intervals = plan.intervals(series);
        let solved = LpDispatchOptimizer::new(self.options.clone()).solve(&intervals, battery, plan);
        self.assemble(series, battery, plan, &intervals, solved)
    }

    /// Run the LP on the blocking pool under `options.solve_timeout()`.
    ///
    /// A timeout is handled like any other non-optimal status. The solver
    /// thread itself cannot be interrupted and finishes in the background.
    pub async fn optimize_bill_async(
        &self,
        series: &[LoadInterval],
        battery: &BatterySpec,
        plan: &TariffPlan,
    ) -> DispatchResult {
        let intervals = plan.intervals(series);
        let limit = self.options.solve_timeout();

        let lp = LpDispatchOptimizer::new(self.options.clone());
        let task_intervals = intervals.clone();
        let task_battery = battery.clone();
        let task_plan = plan.clone();
        let task = tokio::task::spawn_blocking(move || {
            lp.solve(&task_intervals, &task_battery, &task_plan)
        });

        let solved = match tokio::time::timeout(limit, task).await {
            Ok(Ok(solved)) => solved,
            Ok(Err(join_err)) => Err(DispatchError::Solver {
                status: SolverStatus::Failed,
                message: join_err.to_string(),
            }),
            Err(_) => Err(DispatchError::TimedOut(limit)),
        };
        self.assemble(series, battery, plan, &intervals, solved)
    }

    /// Heuristic dispatch priced under `plan`, reported as a fallback from
    /// `reason`.
    pub fn fallback_dispatch(
        &self,
        series: &[LoadInterval],
        battery: &BatterySpec,
        plan: &TariffPlan,
        reason: DispatchError,
    ) -> DispatchResult {
        let intervals = plan.intervals(series);
        self.assemble(series, battery, plan, &intervals, Err(reason))
    }

    fn assemble(
        &self,
        series: &[LoadInterval],
        battery: &BatterySpec,
        plan: &TariffPlan,
        intervals: &[TariffInterval],
        solved: Result<LpSchedule, DispatchError>,
    ) -> DispatchResult {
        let base_kw: Vec<f64> = intervals.iter().map(|i| i.base_load_kw).collect();
        let baseline_bill = evaluate_bill(intervals, &base_kw, &[], plan, &self.options).bill;

        match solved {
            Ok(schedule) => self.from_schedule(series, battery, plan, intervals, schedule, baseline_bill),
            Err(err) => self.fallback(series, battery, plan, intervals, err, baseline_bill),
        }
    }

    fn from_schedule(
        &self,
        series: &[LoadInterval],
        battery: &BatterySpec,
        plan: &TariffPlan,
        intervals: &[TariffInterval],
        schedule: LpSchedule,
        baseline_bill: BillBreakdown,
    ) -> DispatchResult {
        let parasitic_kw = battery.parasitic_load_kw();
        let net_kw: Vec<f64> = intervals
            .iter()
            .zip(schedule.charge_kw.iter().zip(&schedule.discharge_kw))
            .map(|(interval, (c, d))| interval.base_load_kw + parasitic_kw + c - d)
            .collect();

        let usable_kwh = battery.usable_capacity_kwh();
        let (min_soc, _) = battery.soc_bounds();
        let soc: Vec<f64> = schedule
            .stored_kwh
            .iter()
            .skip(1)
            .map(|kwh| if usable_kwh > 0.0 { kwh / usable_kwh } else { min_soc })
            .collect();

        let mut warnings = Vec::new();
        let simultaneous = schedule.simultaneous_intervals(SIMULTANEOUS_TOLERANCE_KW);
        if simultaneous > 0 {
            warn!(intervals = simultaneous, "LP charges and discharges in the same interval");
            warnings.push(format!(
                "{simultaneous} interval(s) charge and discharge simultaneously"
            ));
        }

        let evaluation = evaluate_bill(intervals, &net_kw, &schedule.discharge_kw, plan, &self.options);
        info!(
            intervals = intervals.len(),
            total = evaluation.bill.total,
            baseline_total = baseline_bill.total,
            "LP dispatch solved"
        );

        DispatchResult {
            path: DispatchPath::LinearProgram,
            status: SolverStatus::Optimal,
            warnings,
            bill: evaluation.bill,
            baseline_bill,
            interval_hours: interval_hours(series),
            net_load: series
                .iter()
                .zip(&net_kw)
                .map(|(r, kw)| LoadInterval::new(r.timestamp, *kw))
                .collect(),
            charge_kw: schedule.charge_kw,
            discharge_kw: schedule.discharge_kw,
            soc,
            monthly_peaks: evaluation.monthly_peaks,
            daily_peaks: evaluation.daily_peaks,
            component_peaks: evaluation.component_peaks,
            fallback_threshold_kw: None,
        }
    }

    fn fallback(
        &self,
        series: &[LoadInterval],
        battery: &BatterySpec,
        plan: &TariffPlan,
        intervals: &[TariffInterval],
        err: DispatchError,
        baseline_bill: BillBreakdown,
    ) -> DispatchResult {
        let status = err.status();
        let threshold_kw = self.options.fallback_threshold_kw.unwrap_or_else(|| {
            ThresholdSearchOptimizer::new(self.search.clone())
                .with_initial_soc(self.options.initial_soc)
                .min_feasible_threshold(series, battery)
        });
        warn!(
            %status,
            error = %err,
            threshold_kw,
            "LP dispatch not optimal; falling back to heuristic"
        );

        let simulation = HeuristicDispatchSimulator::new(self.options.initial_soc)
            .simulate(series, battery, threshold_kw);
        let net_kw: Vec<f64> = simulation.net_load.iter().map(|r| r.kw).collect();
        let evaluation = evaluate_bill(intervals, &net_kw, &simulation.discharge_kw, plan, &self.options);

        DispatchResult {
            path: DispatchPath::HeuristicFallback,
            status,
            warnings: vec![format!(
                "{err}; heuristic dispatch at {threshold_kw:.1} kW used instead"
            )],
            bill: evaluation.bill,
            baseline_bill,
            interval_hours: simulation.interval_hours,
            net_load: simulation.net_load,
            charge_kw: simulation.charge_kw,
            discharge_kw: simulation.discharge_kw,
            soc: simulation.soc,
            monthly_peaks: evaluation.monthly_peaks,
            daily_peaks: evaluation.daily_peaks,
            component_peaks: evaluation.component_peaks,
            fallback_threshold_kw: Some(threshold_kw),
        }
    }
}
