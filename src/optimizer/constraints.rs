use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Threshold search limits and payback window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchBounds {
    pub min_payback_years: f64,
    pub max_payback_years: f64,
    /// Evenly spaced thresholds evaluated between the minimum feasible
    /// threshold and the original peak (both ends included)
    pub candidate_count: usize,
    /// Binary search stops once the bracket is narrower than this (kW)
    pub tolerance_kw: f64,
    /// Lower end of the bracket; 0 kW when unset
    pub min_threshold_kw: Option<f64>,
    pub max_iterations: usize,
}

impl Default for SearchBounds {
    fn default() -> Self {
        Self {
            min_payback_years: 0.0,
            max_payback_years: 10.0,
            candidate_count: 20,
            tolerance_kw: 0.1,
            min_threshold_kw: None,
            max_iterations: 64,
        }
    }
}

/// Immutable settings for one bill optimization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchOptions {
    /// SOC fraction at the start of the horizon; max SOC when unset
    pub initial_soc: Option<f64>,
    /// Degradation proxy, $/MWh discharged
    pub degradation_cost_per_mwh: f64,
    /// Variable O&M, $/MWh discharged
    pub variable_om_per_mwh: f64,
    /// Permit discharging below zero net load
    pub allow_export: bool,
    /// Threshold used if the LP fails; minimum feasible cap when unset
    pub fallback_threshold_kw: Option<f64>,
    pub solve_timeout_secs: u64,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            initial_soc: None,
            degradation_cost_per_mwh: 0.0,
            variable_om_per_mwh: 0.0,
            allow_export: false,
            fallback_threshold_kw: None,
            solve_timeout_secs: 60,
        }
    }
}

impl DispatchOptions {
    pub fn solve_timeout(&self) -> Duration {
        Duration::from_secs(self.solve_timeout_secs)
    }

    /// Cost charged per kWh delivered by the battery.
    pub fn discharge_cost_per_kwh(&self) -> f64 {
        (self.degradation_cost_per_mwh + self.variable_om_per_mwh).max(0.0) / 1000.0
    }
}
