//! Threshold-triggered peak shaving simulation.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::dispatch::{demand_peak_kw, StorageState};
use super::peak_events::{detect_peak_events, PeakEvent};
use crate::domain::{interval_hours, peak_kw, BatterySpec, LoadInterval};

/// Result of one heuristic dispatch pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub threshold_kw: f64,
    pub interval_hours: f64,
    pub original_peak_kw: f64,
    pub new_peak_kw: f64,
    /// Site demand after dispatch, on the input timestamps
    pub net_load: Vec<LoadInterval>,
    /// SOC at the end of each interval
    pub soc: Vec<f64>,
    pub charge_kw: Vec<f64>,
    pub discharge_kw: Vec<f64>,
    /// Grid-side energy delivered by discharging (kWh)
    pub energy_discharged_kwh: f64,
    /// Grid-side energy drawn for charging (kWh)
    pub energy_charged_kwh: f64,
    /// Storage-side energy removed (kWh)
    pub energy_removed_kwh: f64,
    /// Storage-side energy added (kWh)
    pub energy_added_kwh: f64,
}

impl SimulationResult {
    pub fn peak_reduction_kw(&self) -> f64 {
        (self.original_peak_kw - self.new_peak_kw).max(0.0)
    }

    /// Peak events still above the threshold after dispatch.
    pub fn residual_peak_events(&self) -> Vec<PeakEvent> {
        detect_peak_events(&self.net_load, self.threshold_kw, self.interval_hours)
    }
}

/// Single forward pass: discharge above the threshold, recharge well below it.
#[derive(Debug, Clone, Default)]
pub struct HeuristicDispatchSimulator {
    /// Starting SOC fraction; full (max SOC) when `None`
    pub initial_soc: Option<f64>,
}

impl HeuristicDispatchSimulator {
    pub fn new(initial_soc: Option<f64>) -> Self {
        Self { initial_soc }
    }

    /// Deterministic and O(n). Never fails: an empty series or a battery with
    /// no power or capacity yields the base load unchanged.
    pub fn simulate(
        &self,
        series: &[LoadInterval],
        battery: &BatterySpec,
        threshold_kw: f64,
    ) -> SimulationResult {
        let hours = interval_hours(series);
        let mut state = StorageState::new(battery, self.initial_soc, hours)
            .with_peak_limit(demand_peak_kw(series, battery));

        let n = series.len();
        let mut result = SimulationResult {
            threshold_kw,
            interval_hours: hours,
            original_peak_kw: peak_kw(series.iter().map(|r| r.kw)),
            new_peak_kw: 0.0,
            net_load: Vec::with_capacity(n),
            soc: Vec::with_capacity(n),
            charge_kw: Vec::with_capacity(n),
            discharge_kw: Vec::with_capacity(n),
            energy_discharged_kwh: 0.0,
            energy_charged_kwh: 0.0,
            energy_removed_kwh: 0.0,
            energy_added_kwh: 0.0,
        };

        for reading in series {
            let step = state.step(reading.kw, threshold_kw);
            result.net_load.push(LoadInterval::new(reading.timestamp, step.net_kw));
            result.soc.push(step.soc);
            result.charge_kw.push(step.charge_kw);
            result.discharge_kw.push(step.discharge_kw);
            result.energy_discharged_kwh += step.discharge_kw * hours;
            result.energy_charged_kwh += step.charge_kw * hours;
            result.energy_removed_kwh += step.removed_kwh;
            result.energy_added_kwh += step.added_kwh;
        }
        result.new_peak_kw = peak_kw(result.net_load.iter().map(|r| r.kw));

        debug!(
            intervals = n,
            threshold_kw,
            original_peak_kw = result.original_peak_kw,
            new_peak_kw = result.new_peak_kw,
            discharged_kwh = result.energy_discharged_kwh,
            "heuristic dispatch simulated"
        );
        result
    }
}

/// Simulate starting from a full battery.
pub fn simulate(series: &[LoadInterval], battery: &BatterySpec, threshold_kw: f64) -> SimulationResult {
    HeuristicDispatchSimulator::default().simulate(series, battery, threshold_kw)
}
