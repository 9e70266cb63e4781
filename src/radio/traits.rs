/// LoRa sync word of public networks
pub const PUBLIC_SYNC_WORD: u8 = 0x34;

/// Radio modulation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ModulationParams {
    /// Spreading factor (SF7-SF12)
    pub spreading_factor: u8,
    /// Bandwidth in Hz
    pub bandwidth: u32,
    /// Coding rate denominator (5 for 4/5)
    pub coding_rate: u8,
}

/// Radio transmission parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TxConfig {
    /// Transmission power in dBm
    pub power: i8,
    /// Frequency in Hz
    pub frequency: u32,
    /// Modulation parameters
    pub modulation: ModulationParams,
    /// LoRa sync word
    pub sync_word: u8,
}

/// Radio receive parameters
///
/// The radio enters single-shot receive when configured and reports either
/// a received frame or a receive timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RxConfig {
    /// Frequency in Hz
    pub frequency: u32,
    /// Modulation parameters
    pub modulation: ModulationParams,
    /// LoRa sync word
    pub sync_word: u8,
    /// Invert IQ (downlinks are sent with inverted IQ)
    pub iq_invert: bool,
    /// Preamble symbols to wait for before reporting a timeout
    pub symbol_timeout: u16,
}

/// Generic radio interface trait
///
/// Completion is reported back to the MAC as events (`TxDone`, `RxDone`,
/// `RxTimeout`), typically from the driver's interrupt handler.
pub trait Radio {
    /// Error type for radio operations
    type Error;

    /// Configure the radio for transmission
    fn configure_tx(&mut self, config: TxConfig) -> Result<(), Self::Error>;

    /// Transmit data
    fn transmit(&mut self, buffer: &[u8]) -> Result<(), Self::Error>;

    /// Configure the radio for reception and start listening
    fn configure_rx(&mut self, config: RxConfig) -> Result<(), Self::Error>;

    /// Read the last received frame into the provided buffer
    /// Returns the number of bytes received
    fn receive(&mut self, buffer: &mut [u8]) -> Result<usize, Self::Error>;

    /// Put the radio into sleep mode
    fn sleep(&mut self) -> Result<(), Self::Error>;
}
