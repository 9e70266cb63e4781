//! Radio hardware abstraction layer

/// Radio driver contract and configuration types
pub mod traits;

pub use traits::{ModulationParams, Radio, RxConfig, TxConfig};
