//! Optimization Strategies
//!
//! - LP: tariff-optimal schedule over every demand component (exact solution)

pub mod lp;

pub use lp::*;
