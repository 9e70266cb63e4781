//! Regional parameters
//!
//! Only the subset of the EU868 table a Class A device needs is carried:
//! default channels, datarates, TX power steps, RX2 parameters and payload
//! limits.

use crate::radio::traits::ModulationParams;

/// Maximum number of channels a region may define
pub const MAX_CHANNELS: usize = 16;

/// Data rate identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataRate {
    SF12BW125, // DR0
    SF11BW125, // DR1
    SF10BW125, // DR2
    SF9BW125,  // DR3
    SF8BW125,  // DR4
    SF7BW125,  // DR5
    SF7BW250,  // DR6
}

impl DataRate {
    /// Look up a datarate by its index
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(DataRate::SF12BW125),
            1 => Some(DataRate::SF11BW125),
            2 => Some(DataRate::SF10BW125),
            3 => Some(DataRate::SF9BW125),
            4 => Some(DataRate::SF8BW125),
            5 => Some(DataRate::SF7BW125),
            6 => Some(DataRate::SF7BW250),
            _ => None,
        }
    }

    /// Get spreading factor
    pub fn spreading_factor(&self) -> u8 {
        match self {
            DataRate::SF12BW125 => 12,
            DataRate::SF11BW125 => 11,
            DataRate::SF10BW125 => 10,
            DataRate::SF9BW125 => 9,
            DataRate::SF8BW125 => 8,
            DataRate::SF7BW125 | DataRate::SF7BW250 => 7,
        }
    }

    /// Get bandwidth in Hz
    pub fn bandwidth(&self) -> u32 {
        match self {
            DataRate::SF7BW250 => 250_000,
            _ => 125_000,
        }
    }

    /// LoRa modulation for this datarate (coding rate 4/5)
    pub fn modulation(&self) -> ModulationParams {
        ModulationParams {
            spreading_factor: self.spreading_factor(),
            bandwidth: self.bandwidth(),
            coding_rate: 5,
        }
    }
}

/// Regional parameter table
///
/// Regions are stateless; the mutable channel plan lives in
/// [`ChannelSet`](super::channels::ChannelSet).
pub trait Region {
    /// Channels every device starts with
    const DEFAULT_CHANNELS: &'static [u32];

    /// RX2 frequency in Hz
    const RX2_FREQUENCY: u32;

    /// RX2 datarate index
    const RX2_DATARATE: u8;

    /// Whether a datarate index is usable for uplinks
    fn validate_datarate(dr: u8) -> bool;

    /// Whether a TX power index is defined
    fn validate_tx_power(index: u8) -> bool;

    /// Whether a frequency lies inside the band
    fn validate_frequency(frequency: u32) -> bool;

    /// Maximum MACPayload (FHDR + FPort + FRMPayload) for a datarate
    fn mac_payload_max(dr: u8) -> usize;

    /// Transmit power in dBm for a TX power index
    fn tx_power_dbm(index: u8) -> i8;

    /// Datarate used in RX1 for an uplink datarate and RX1 offset
    fn rx1_datarate(dr_up: u8, offset: u8) -> u8 {
        dr_up.saturating_sub(offset)
    }

    /// Modulation for a datarate index
    fn modulation(dr: u8) -> Option<ModulationParams> {
        DataRate::from_index(dr).map(|rate| rate.modulation())
    }
}

/// EU 863-870 MHz band
#[derive(Debug, Clone, Copy, Default)]
pub struct EU868;

impl EU868 {
    const BAND_MIN: u32 = 863_000_000;
    const BAND_MAX: u32 = 870_000_000;
    const MAX_EIRP: i8 = 16;
}

impl Region for EU868 {
    const DEFAULT_CHANNELS: &'static [u32] = &[868_100_000, 868_300_000, 868_500_000];

    const RX2_FREQUENCY: u32 = 869_525_000;

    const RX2_DATARATE: u8 = 0;

    fn validate_datarate(dr: u8) -> bool {
        DataRate::from_index(dr).is_some()
    }

    fn validate_tx_power(index: u8) -> bool {
        index < 8
    }

    fn validate_frequency(frequency: u32) -> bool {
        (Self::BAND_MIN..=Self::BAND_MAX).contains(&frequency)
    }

    fn mac_payload_max(dr: u8) -> usize {
        match dr {
            0..=2 => 59,
            3 => 123,
            _ => 250,
        }
    }

    fn tx_power_dbm(index: u8) -> i8 {
        Self::MAX_EIRP - 2 * index.min(7) as i8
    }
}
