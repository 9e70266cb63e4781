//! LoRaWAN device class implementations
//!
//! Only Class A is provided: bi-directional communication with two receive
//! windows after each uplink. The windows are driven by
//! [`Mac::handle_event`](crate::lorawan::mac::Mac::handle_event).

/// Class A receive window sequencing
pub mod class_a;
