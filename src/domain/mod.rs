pub mod battery;
pub mod tariff;
pub mod types;

pub use battery::*;
pub use tariff::*;
pub use types::*;
