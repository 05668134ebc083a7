//! # Dispatch Simulation
//!
//! Physics-based, single-pass battery dispatch over a metered load series.
//!
//! - **Peak events**: maximal runs of intervals above a threshold
//! - **Heuristic**: threshold-triggered peak shaving with SOC tracking
//! - **Cap oracle**: the same physics against a hard ceiling, reporting the
//!   first interval that cannot be held under it
//!
//! All entry points are pure functions of their inputs and never fail.

pub mod cap;
pub mod dispatch;
pub mod heuristic;
pub mod peak_events;

pub use cap::{enforce, CapFeasibilityOracle, CapOutcome, CapViolation, CAP_TOLERANCE_KW};
pub use dispatch::{charge_margin_kw, demand_peak_kw, DispatchStep, StorageState};
pub use heuristic::{simulate, HeuristicDispatchSimulator, SimulationResult};
pub use peak_events::{detect_peak_events, PeakEvent};
