//! Behind-the-meter battery dispatch.
//!
//! Heuristic peak shaving, hard-cap feasibility, economic threshold search
//! and tariff-optimal LP scheduling over a metered load series.

pub mod config;
pub mod domain;
pub mod optimizer;
pub mod simulation;
pub mod telemetry;
