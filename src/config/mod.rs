//! Device and network configuration
//!
//! This module contains the identity and tuning types shared by the MAC:
//! - Keys, EUIs and the device address
//! - Activation mode
//! - MAC tunables (receive delays, retransmissions, TX power)

/// Identity types and MAC tunables
pub mod device;

pub use device::{AESKey, ActivationMode, DevAddr, MacConfig, EUI64};
