//! LoRaWAN protocol implementation
//!
//! This module contains the core LoRaWAN protocol implementation, including:
//! - Frame encoding and decoding
//! - Regional parameters and the channel plan
//! - MAC state, data service (MCPS) and management service (MLME)
//! - MAC command handling

/// Uplink channel plan
pub mod channels;

/// MAC command handling
pub mod commands;

/// PHY payload codec
pub mod frame;

/// MAC layer state and core
pub mod mac;

/// Data service
pub mod mcps;

/// Management service
pub mod mlme;

/// PHY layer timing and radio configuration
pub mod phy;

/// Regional parameters and configurations
pub mod region;

pub use mac::{ConfirmStatus, Mac, MacError, MacState, Status};
pub use phy::TimingParams;
