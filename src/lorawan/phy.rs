use super::region::Region;
use crate::radio::traits::{RxConfig, TxConfig, PUBLIC_SYNC_WORD};

/// PHY layer timing parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimingParams {
    /// RX1 delay in seconds
    pub rx1_delay: u32,
    /// RX2 delay in seconds
    pub rx2_delay: u32,
    /// Join accept delay 1 in seconds
    pub join_accept_delay1: u32,
    /// Join accept delay 2 in seconds
    pub join_accept_delay2: u32,
}

impl Default for TimingParams {
    fn default() -> Self {
        Self {
            rx1_delay: 1,
            rx2_delay: 2,
            join_accept_delay1: 5,
            join_accept_delay2: 6,
        }
    }
}

/// (spreading factor, low datarate optimisation) per datarate row
const SYMBOL_TABLE: [(i32, i32); 6] = [(12, 1), (11, 1), (10, 0), (9, 0), (8, 0), (7, 0)];

/// Time on air of a PHY payload in microseconds
///
/// Assumes an 8-symbol preamble, explicit header, CRC on and coding rate 4/5.
/// Datarates above the table share its last row.
pub fn time_on_air(payload_len: usize, dr: u8) -> u32 {
    let dr = dr.min(6);
    let t_sym: u32 = 1 << (15 - dr as u32);
    // 12.25 symbols
    let t_preamble = (t_sym << 3) + (t_sym << 2) + (t_sym >> 2);

    let (sf, de) = SYMBOL_TABLE[(dr as usize).min(SYMBOL_TABLE.len() - 1)];
    let numerator = 8 * payload_len as i32 - 4 * sf + 28 + 16;
    let denominator = 4 * (sf - 2 * de);
    let blocks = if numerator > 0 {
        (numerator + denominator - 1) / denominator
    } else {
        0
    };
    let payload_symbols = 8 + blocks as u32 * 5;

    t_preamble + t_sym * payload_symbols
}

/// Radio configuration for an uplink
pub fn tx_config<REG: Region>(frequency: u32, dr: u8, tx_power: u8) -> Option<TxConfig> {
    Some(TxConfig {
        power: REG::tx_power_dbm(tx_power),
        frequency,
        modulation: REG::modulation(dr)?,
        sync_word: PUBLIC_SYNC_WORD,
    })
}

/// Radio configuration for a receive window
pub fn rx_config<REG: Region>(frequency: u32, dr: u8, symbol_timeout: u16) -> Option<RxConfig> {
    Some(RxConfig {
        frequency,
        modulation: REG::modulation(dr)?,
        sync_word: PUBLIC_SYNC_WORD,
        iq_invert: true,
        symbol_timeout,
    })
}
