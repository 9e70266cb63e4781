use core::fmt;

use crate::lorawan::phy::TimingParams;

/// EUI-64 (8 bytes), stored in over-the-air order (least significant byte first)
pub type EUI64 = [u8; 8];

/// AES-128 key (16 bytes)
///
/// `Default` yields the all-zero key, which is also what a reset leaves behind.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct AESKey([u8; 16]);

impl AESKey {
    /// Wrap raw key material
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Raw key material
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Overwrite the key material with zeroes
    pub fn clear(&mut self) {
        self.0 = [0; 16];
    }
}

impl fmt::Debug for AESKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AESKey(..)")
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for AESKey {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "AESKey(..)")
    }
}

/// Device address (4 bytes, little-endian on the wire)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DevAddr([u8; 4]);

impl DevAddr {
    /// Create from wire-order bytes
    pub const fn new(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Create from the numeric address
    pub const fn from_u32(addr: u32) -> Self {
        Self(addr.to_le_bytes())
    }

    /// Numeric address
    pub const fn to_u32(self) -> u32 {
        u32::from_le_bytes(self.0)
    }

    /// Wire-order bytes
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

/// How the device obtained its session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ActivationMode {
    /// No session; only a join may be requested
    #[default]
    None,
    /// Activation by personalization (keys and address provisioned)
    Personalization,
    /// Over-the-air activation (session obtained through a join)
    OverTheAir,
}

impl ActivationMode {
    /// Whether a session is established
    pub fn is_activated(self) -> bool {
        self != ActivationMode::None
    }
}

/// MAC layer tunables
#[derive(Debug, Clone, Copy)]
pub struct MacConfig {
    /// Receive window delays
    pub timing: TimingParams,
    /// Total transmissions of a confirmed uplink before giving up
    pub confirmed_transmissions: u8,
    /// Default TX power index
    pub tx_power: u8,
    /// How long RX2 is kept open before the exchange is declared silent, in milliseconds
    pub rx_window_ms: u32,
    /// Preamble symbols the radio waits for before reporting a receive timeout
    pub rx_symbol_timeout: u16,
}

impl Default for MacConfig {
    fn default() -> Self {
        Self {
            timing: TimingParams::default(),
            confirmed_transmissions: 3,
            tx_power: 1,
            rx_window_ms: 1000,
            rx_symbol_timeout: 30,
        }
    }
}
