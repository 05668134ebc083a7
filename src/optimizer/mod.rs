pub mod billing;
pub mod constraints;
pub mod service;
pub mod strategies;
pub mod threshold;
pub mod types;

pub use billing::*;
pub use constraints::*;
pub use service::*;
pub use strategies::*;
pub use threshold::*;
pub use types::*;
