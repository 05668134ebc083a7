//! Hard demand-cap feasibility oracle.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use super::dispatch::{demand_peak_kw, StorageState};
use crate::domain::{interval_hours, peak_kw, BatterySpec, LoadInterval};

/// Slack allowed above the cap before an interval counts as a violation.
pub const CAP_TOLERANCE_KW: f64 = 0.01;

/// First interval whose post-dispatch demand broke the cap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapViolation {
    pub index: usize,
    pub timestamp: DateTime<FixedOffset>,
    pub demand_kw: f64,
    pub excess_kw: f64,
}

/// Oracle verdict. Traces stop at the first violation when infeasible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapOutcome {
    pub cap_kw: f64,
    pub feasible: bool,
    pub new_peak_kw: f64,
    pub net_load: Vec<LoadInterval>,
    pub soc: Vec<f64>,
    pub first_violation: Option<CapViolation>,
}

/// Runs the simulator physics with `cap_kw` as a hard ceiling.
#[derive(Debug, Clone)]
pub struct CapFeasibilityOracle {
    pub initial_soc: Option<f64>,
    pub tolerance_kw: f64,
}

impl Default for CapFeasibilityOracle {
    fn default() -> Self {
        Self {
            initial_soc: None,
            tolerance_kw: CAP_TOLERANCE_KW,
        }
    }
}

impl CapFeasibilityOracle {
    pub fn new(initial_soc: Option<f64>) -> Self {
        Self {
            initial_soc,
            ..Self::default()
        }
    }

    pub fn enforce(&self, series: &[LoadInterval], battery: &BatterySpec, cap_kw: f64) -> CapOutcome {
        let hours = interval_hours(series);
        let mut state = StorageState::new(battery, self.initial_soc, hours)
            .with_peak_limit(demand_peak_kw(series, battery));
        let mut outcome = CapOutcome {
            cap_kw,
            feasible: true,
            new_peak_kw: 0.0,
            net_load: Vec::with_capacity(series.len()),
            soc: Vec::with_capacity(series.len()),
            first_violation: None,
        };

        for (index, reading) in series.iter().enumerate() {
            let step = state.step(reading.kw, cap_kw);
            outcome.net_load.push(LoadInterval::new(reading.timestamp, step.net_kw));
            outcome.soc.push(step.soc);

            if step.net_kw > cap_kw + self.tolerance_kw {
                outcome.feasible = false;
                outcome.first_violation = Some(CapViolation {
                    index,
                    timestamp: reading.timestamp,
                    demand_kw: step.net_kw,
                    excess_kw: step.net_kw - cap_kw,
                });
                break;
            }
        }
        outcome.new_peak_kw = peak_kw(outcome.net_load.iter().map(|r| r.kw));
        outcome
    }

    pub fn is_feasible(&self, series: &[LoadInterval], battery: &BatterySpec, cap_kw: f64) -> bool {
        self.enforce(series, battery, cap_kw).feasible
    }
}

/// Enforce a cap starting from a full battery.
pub fn enforce(series: &[LoadInterval], battery: &BatterySpec, cap_kw: f64) -> CapOutcome {
    CapFeasibilityOracle::default().enforce(series, battery, cap_kw)
}
