//! LoRaWAN Class A end-device MAC in Rust
//!
//! This crate implements the medium access control layer of a LoRaWAN 1.0.x
//! Class A end device: frame format, over-the-air activation, uplinks with two
//! receive windows, downlink replay protection, join duty-cycle backoff and a
//! request/confirm/indication service boundary.
//!
//! # Features
//! - OTAA and ABP activation
//! - Confirmed uplinks with retransmission
//! - Link check and network MAC commands
//! - EU868 regional parameters
//! - Radio, timers and random source supplied by the application
//! - Optional `defmt` logging
//!
//! # Example
//! ```ignore
//! use lorawan_mac::{
//!     config::device::{AESKey, MacConfig},
//!     lorawan::{mcps::McpsRequest, mlme::JoinParams, region::EU868, Mac},
//! };
//!
//! // `board` implements `Device`, `app` implements `Upper`
//! let mut mac: Mac<_, _, EU868> = Mac::new(board, app, MacConfig::default());
//!
//! mac.join(&JoinParams {
//!     dev_eui: [0x01; 8],
//!     app_eui: [0x02; 8],
//!     app_key: AESKey::new([0x03; 16]),
//!     datarate: 0,
//! })?;
//!
//! // Feed radio and timer interrupts in until the join confirm arrives
//! loop {
//!     nb::block!(mac.poll(&mut events))?;
//! }
//! ```

#![warn(missing_docs)]
#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[macro_use]
mod fmt;

/// Device class implementations
pub mod class;

/// Device and network configuration
pub mod config;

/// Cryptographic functions
pub mod crypto;

/// Hardware collaborators: radio, timers, random source, events
pub mod device;

/// LoRaWAN protocol implementation
pub mod lorawan;

/// Radio hardware abstraction layer
pub mod radio;

/// Application-facing callbacks
pub mod upper;

pub use lorawan::mac::{Mac, MacError};
