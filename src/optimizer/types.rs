use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use strum::{AsRefStr, Display};
use thiserror::Error;

use crate::domain::{BillingPeriod, DayKey, DemandKind, LoadInterval, MonthKey};

/// Terminal status reported by the LP path.
///
/// Only `Optimal` means the LP schedule was used; every other status leads
/// to the heuristic fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SolverStatus {
    Optimal,
    Infeasible,
    Unbounded,
    TimedOut,
    /// Built without the `optimization` feature
    Unavailable,
    Failed,
}

impl SolverStatus {
    pub fn is_optimal(&self) -> bool {
        matches!(self, Self::Optimal)
    }
}

/// Which engine produced a [`DispatchResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DispatchPath {
    LinearProgram,
    HeuristicFallback,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("LP solver returned {status}: {message}")]
    Solver {
        status: SolverStatus,
        message: String,
    },
    #[error("LP solve did not finish within {0:?}")]
    TimedOut(Duration),
    #[error("LP support not compiled in (enable the `optimization` feature)")]
    Unavailable,
}

impl DispatchError {
    pub fn status(&self) -> SolverStatus {
        match self {
            Self::Solver { status, .. } => *status,
            Self::TimedOut(_) => SolverStatus::TimedOut,
            Self::Unavailable => SolverStatus::Unavailable,
        }
    }
}

/// Bill decomposition in tariff currency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BillBreakdown {
    pub energy_cost: f64,
    pub demand_cost: f64,
    pub fixed_cost: f64,
    /// Variable O&M plus degradation proxy on discharged energy
    pub operating_cost: f64,
    pub total: f64,
}

/// Maximum applicable demand of one component over one billing period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentPeak {
    pub component: String,
    pub kind: DemandKind,
    pub period: BillingPeriod,
    pub peak_kw: f64,
    pub charge: f64,
}

/// Bill-optimal (or fallback) dispatch over a load series.
///
/// The shape is identical whichever path produced it; `path`, `status` and
/// `warnings` say how it was obtained.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchResult {
    pub path: DispatchPath,
    pub status: SolverStatus,
    pub warnings: Vec<String>,
    pub bill: BillBreakdown,
    /// Bill of the same load with the battery idle
    pub baseline_bill: BillBreakdown,
    pub interval_hours: f64,
    pub net_load: Vec<LoadInterval>,
    pub charge_kw: Vec<f64>,
    pub discharge_kw: Vec<f64>,
    /// SOC at the end of each interval
    pub soc: Vec<f64>,
    pub monthly_peaks: BTreeMap<MonthKey, f64>,
    pub daily_peaks: BTreeMap<DayKey, f64>,
    pub component_peaks: Vec<ComponentPeak>,
    /// Threshold the heuristic ran at, when the fallback was used
    pub fallback_threshold_kw: Option<f64>,
}

impl DispatchResult {
    pub fn savings(&self) -> f64 {
        self.baseline_bill.total - self.bill.total
    }

    pub fn used_fallback(&self) -> bool {
        self.path == DispatchPath::HeuristicFallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_strings() {
        assert_eq!(SolverStatus::Optimal.to_string(), "optimal");
        assert_eq!(SolverStatus::TimedOut.as_ref(), "timed_out");
        assert_eq!(
            serde_json::to_string(&SolverStatus::Infeasible).unwrap(),
            r#""infeasible""#
        );
        assert!(SolverStatus::Optimal.is_optimal());
        assert!(!SolverStatus::Failed.is_optimal());
    }

    #[test]
    fn test_error_status_mapping() {
        let err = DispatchError::Solver {
            status: SolverStatus::Infeasible,
            message: "no solution".into(),
        };
        assert_eq!(err.status(), SolverStatus::Infeasible);
        assert_eq!(err.to_string(), "LP solver returned infeasible: no solution");
        assert_eq!(
            DispatchError::TimedOut(Duration::from_secs(5)).status(),
            SolverStatus::TimedOut
        );
        assert_eq!(DispatchError::Unavailable.status(), SolverStatus::Unavailable);
    }
}
