//! MAC commands carried in FOpts or in a port 0 payload
//!
//! Requests and answers of one exchange share a command identifier; which one
//! a byte sequence holds depends on the direction it travelled.

use heapless::Vec;

use super::frame::FrameError;

/// MAC command identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum CommandIdentifier {
    LinkCheck = 0x02,
    LinkADR = 0x03,
    DutyCycle = 0x04,
    RXParamSetup = 0x05,
    DevStatus = 0x06,
    NewChannel = 0x07,
    RXTimingSetup = 0x08,
}

impl CommandIdentifier {
    /// Look up a command identifier
    pub fn from_u8(cid: u8) -> Option<Self> {
        match cid {
            0x02 => Some(CommandIdentifier::LinkCheck),
            0x03 => Some(CommandIdentifier::LinkADR),
            0x04 => Some(CommandIdentifier::DutyCycle),
            0x05 => Some(CommandIdentifier::RXParamSetup),
            0x06 => Some(CommandIdentifier::DevStatus),
            0x07 => Some(CommandIdentifier::NewChannel),
            0x08 => Some(CommandIdentifier::RXTimingSetup),
            _ => None,
        }
    }

    /// Payload length of the network-to-device command
    pub fn downlink_len(self) -> usize {
        match self {
            CommandIdentifier::LinkCheck => 2,
            CommandIdentifier::LinkADR => 4,
            CommandIdentifier::DutyCycle => 1,
            CommandIdentifier::RXParamSetup => 4,
            CommandIdentifier::DevStatus => 0,
            CommandIdentifier::NewChannel => 5,
            CommandIdentifier::RXTimingSetup => 1,
        }
    }
}

/// MAC command
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MacCommand {
    /// Link check request
    LinkCheckReq,
    /// Link check answer
    LinkCheckAns {
        /// Link margin in dB
        margin: u8,
        /// Number of gateways that received the request
        gateway_count: u8,
    },
    /// Link ADR request
    LinkADRReq {
        /// Data rate
        data_rate: u8,
        /// TX power
        tx_power: u8,
        /// Channel mask
        ch_mask: u16,
        /// Channel mask control
        ch_mask_cntl: u8,
        /// Number of transmissions
        nb_trans: u8,
    },
    /// Link ADR answer
    LinkADRAns {
        /// Power ACK
        power_ack: bool,
        /// Data rate ACK
        data_rate_ack: bool,
        /// Channel mask ACK
        channel_mask_ack: bool,
    },
    /// Duty cycle request
    DutyCycleReq {
        /// Maximum duty cycle
        max_duty_cycle: u8,
    },
    /// Duty cycle answer
    DutyCycleAns,
    /// RX parameter setup request
    RXParamSetupReq {
        /// RX1 data rate offset
        rx1_dr_offset: u8,
        /// RX2 data rate
        rx2_data_rate: u8,
        /// RX2 frequency in Hz
        freq: u32,
    },
    /// RX parameter setup answer
    RXParamSetupAns {
        /// RX1 data rate offset ACK
        rx1_dr_offset_ack: bool,
        /// RX2 data rate ACK
        rx2_data_rate_ack: bool,
        /// Channel ACK
        channel_ack: bool,
    },
    /// Device status request
    DevStatusReq,
    /// Device status answer
    DevStatusAns {
        /// Battery level (0 = external power, 1-254 = level, 255 = unknown)
        battery: u8,
        /// Demodulation margin in dB (6-bit signed)
        margin: i8,
    },
    /// New channel request
    NewChannelReq {
        /// Channel index
        ch_index: u8,
        /// Frequency in Hz
        freq: u32,
        /// Maximum data rate
        max_dr: u8,
        /// Minimum data rate
        min_dr: u8,
    },
    /// New channel answer
    NewChannelAns {
        /// Channel frequency OK
        channel_freq_ok: bool,
        /// Data rate OK
        data_rate_ok: bool,
    },
    /// RX timing setup request
    RXTimingSetupReq {
        /// Delay (0-15)
        delay: u8,
    },
    /// RX timing setup answer
    RXTimingSetupAns,
}

fn freq_from_bytes(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]) * 100
}

impl MacCommand {
    /// Parse a network-to-device command from its identifier and payload
    pub fn from_bytes(cid: u8, payload: &[u8]) -> Option<Self> {
        let id = CommandIdentifier::from_u8(cid)?;
        if payload.len() < id.downlink_len() {
            return None;
        }
        let command = match id {
            CommandIdentifier::LinkCheck => MacCommand::LinkCheckAns {
                margin: payload[0],
                gateway_count: payload[1],
            },
            CommandIdentifier::LinkADR => MacCommand::LinkADRReq {
                data_rate: payload[0] >> 4,
                tx_power: payload[0] & 0x0F,
                ch_mask: u16::from_le_bytes([payload[1], payload[2]]),
                ch_mask_cntl: (payload[3] >> 4) & 0x07,
                nb_trans: payload[3] & 0x0F,
            },
            CommandIdentifier::DutyCycle => MacCommand::DutyCycleReq {
                max_duty_cycle: payload[0] & 0x0F,
            },
            CommandIdentifier::RXParamSetup => MacCommand::RXParamSetupReq {
                rx1_dr_offset: (payload[0] >> 4) & 0x07,
                rx2_data_rate: payload[0] & 0x0F,
                freq: freq_from_bytes(&payload[1..4]),
            },
            CommandIdentifier::DevStatus => MacCommand::DevStatusReq,
            CommandIdentifier::NewChannel => MacCommand::NewChannelReq {
                ch_index: payload[0],
                freq: freq_from_bytes(&payload[1..4]),
                max_dr: payload[4] >> 4,
                min_dr: payload[4] & 0x0F,
            },
            CommandIdentifier::RXTimingSetup => MacCommand::RXTimingSetupReq {
                delay: payload[0] & 0x0F,
            },
        };
        Some(command)
    }

    /// Command identifier
    pub fn cid(&self) -> CommandIdentifier {
        match self {
            MacCommand::LinkCheckReq | MacCommand::LinkCheckAns { .. } => {
                CommandIdentifier::LinkCheck
            }
            MacCommand::LinkADRReq { .. } | MacCommand::LinkADRAns { .. } => {
                CommandIdentifier::LinkADR
            }
            MacCommand::DutyCycleReq { .. } | MacCommand::DutyCycleAns => {
                CommandIdentifier::DutyCycle
            }
            MacCommand::RXParamSetupReq { .. } | MacCommand::RXParamSetupAns { .. } => {
                CommandIdentifier::RXParamSetup
            }
            MacCommand::DevStatusReq | MacCommand::DevStatusAns { .. } => {
                CommandIdentifier::DevStatus
            }
            MacCommand::NewChannelReq { .. } | MacCommand::NewChannelAns { .. } => {
                CommandIdentifier::NewChannel
            }
            MacCommand::RXTimingSetupReq { .. } | MacCommand::RXTimingSetupAns => {
                CommandIdentifier::RXTimingSetup
            }
        }
    }

    /// Get command payload length in bytes
    pub fn len(&self) -> usize {
        match self {
            MacCommand::LinkCheckReq => 0,
            MacCommand::LinkCheckAns { .. } => 2,
            MacCommand::LinkADRReq { .. } => 4,
            MacCommand::LinkADRAns { .. } => 1,
            MacCommand::DutyCycleReq { .. } => 1,
            MacCommand::DutyCycleAns => 0,
            MacCommand::RXParamSetupReq { .. } => 4,
            MacCommand::RXParamSetupAns { .. } => 1,
            MacCommand::DevStatusReq => 0,
            MacCommand::DevStatusAns { .. } => 2,
            MacCommand::NewChannelReq { .. } => 5,
            MacCommand::NewChannelAns { .. } => 1,
            MacCommand::RXTimingSetupReq { .. } => 1,
            MacCommand::RXTimingSetupAns => 0,
        }
    }

    /// Whether the command carries no payload
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a device-to-network command (identifier and payload)
    ///
    /// Nothing is written when the command does not fit.
    pub fn write_to<const N: usize>(&self, buffer: &mut Vec<u8, N>) -> Result<(), FrameError> {
        if buffer.capacity() - buffer.len() < 1 + self.len() {
            return Err(FrameError::TooLong);
        }
        let mut bytes = [0u8; 3];
        bytes[0] = self.cid() as u8;
        match *self {
            MacCommand::LinkADRAns {
                power_ack,
                data_rate_ack,
                channel_mask_ack,
            } => {
                bytes[1] = (power_ack as u8) << 2 | (data_rate_ack as u8) << 1 | channel_mask_ack as u8;
            }
            MacCommand::RXParamSetupAns {
                rx1_dr_offset_ack,
                rx2_data_rate_ack,
                channel_ack,
            } => {
                bytes[1] = (rx1_dr_offset_ack as u8) << 2 | (rx2_data_rate_ack as u8) << 1 | channel_ack as u8;
            }
            MacCommand::DevStatusAns { battery, margin } => {
                bytes[1] = battery;
                bytes[2] = (margin as u8) & 0x3F;
            }
            MacCommand::NewChannelAns {
                channel_freq_ok,
                data_rate_ok,
            } => {
                bytes[1] = (channel_freq_ok as u8) << 1 | data_rate_ok as u8;
            }
            MacCommand::LinkCheckReq | MacCommand::DutyCycleAns | MacCommand::RXTimingSetupAns => {}
            _ => return Err(FrameError::UnexpectedType),
        }
        buffer
            .extend_from_slice(&bytes[..1 + self.len()])
            .map_err(|_| FrameError::TooLong)
    }
}

/// Iterator over the network-to-device commands of an FOpts field or port 0 payload
///
/// Iteration stops at the first unknown identifier or truncated command, since
/// the length of anything after it cannot be known.
#[derive(Debug, Clone)]
pub struct DownlinkCommands<'a> {
    data: &'a [u8],
}

impl<'a> DownlinkCommands<'a> {
    /// Iterate over `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

impl<'a> Iterator for DownlinkCommands<'a> {
    type Item = MacCommand;

    fn next(&mut self) -> Option<Self::Item> {
        let data: &'a [u8] = self.data;
        let (&cid, rest) = data.split_first()?;
        let command = CommandIdentifier::from_u8(cid)
            .filter(|id| rest.len() >= id.downlink_len())
            .and_then(|id| {
                let command = MacCommand::from_bytes(cid, rest)?;
                self.data = &rest[id.downlink_len()..];
                Some(command)
            });
        if command.is_none() {
            debug!("stopping at mac command {=u8:#x}", cid);
            self.data = &[];
        }
        command
    }
}
