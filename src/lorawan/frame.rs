//! PHY payload encoding and decoding
//!
//! Data frames are laid out as
//! `MHDR | DevAddr | FCtrl | FCnt | FOpts | [FPort | FRMPayload] | MIC`,
//! all multi-byte fields little-endian. Join frames carry their own fixed
//! layouts.

use heapless::Vec;

use super::channels::CFLIST_SIZE;
use crate::config::device::{AESKey, DevAddr, EUI64};
use crate::crypto::{self, Direction, MIC_SIZE};

/// Largest PHY payload handled
pub const MAX_FRAME_SIZE: usize = 255;

/// Largest FOpts field
pub const MAX_FOPTS_LEN: usize = 15;

/// Size of a join request
pub const JOIN_REQUEST_SIZE: usize = 23;

/// Size of a join accept without a channel list
pub const JOIN_ACCEPT_SIZE: usize = 17;

/// Size of a join accept carrying a channel list
pub const JOIN_ACCEPT_MAX_SIZE: usize = JOIN_ACCEPT_SIZE + CFLIST_SIZE;

/// Largest forward jump of the downlink counter that is still accepted
pub const MAX_FCNT_GAP: u32 = 16384;

const MHDR_SIZE: usize = 1;
const FHDR_MIN_SIZE: usize = 7;
const MIN_DATA_FRAME_SIZE: usize = MHDR_SIZE + FHDR_MIN_SIZE + MIC_SIZE;

/// Owned buffer holding one encoded frame
pub type FrameBuffer = Vec<u8, MAX_FRAME_SIZE>;

/// Frame codec error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Shorter than the smallest valid frame
    TooShort,
    /// Does not fit the frame buffer or a bounded field
    TooLong,
    /// Field lengths disagree with the frame size
    InvalidLength,
    /// Message integrity code mismatch
    InvalidMic,
    /// MHDR carries a message type this operation does not handle
    UnexpectedType,
}

/// MAC header types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum MType {
    JoinRequest = 0x00,
    JoinAccept = 0x20,
    UnconfirmedDataUp = 0x40,
    UnconfirmedDataDown = 0x60,
    ConfirmedDataUp = 0x80,
    ConfirmedDataDown = 0xA0,
    Rfu = 0xC0,
    Proprietary = 0xE0,
}

impl MType {
    /// Message type held in the top three bits of an MHDR
    pub fn from_mhdr(mhdr: u8) -> Self {
        match mhdr & 0xE0 {
            0x00 => MType::JoinRequest,
            0x20 => MType::JoinAccept,
            0x40 => MType::UnconfirmedDataUp,
            0x60 => MType::UnconfirmedDataDown,
            0x80 => MType::ConfirmedDataUp,
            0xA0 => MType::ConfirmedDataDown,
            0xC0 => MType::Rfu,
            _ => MType::Proprietary,
        }
    }

    /// MHDR byte for this type with LoRaWAN R1 major version
    pub fn mhdr(self) -> u8 {
        self as u8
    }

    /// Whether this type is a data frame in either direction
    pub fn is_data(self) -> bool {
        matches!(
            self,
            MType::UnconfirmedDataUp
                | MType::UnconfirmedDataDown
                | MType::ConfirmedDataUp
                | MType::ConfirmedDataDown
        )
    }
}

/// Read the message type of a frame's MHDR
pub fn get_mtype(mhdr: u8) -> MType {
    MType::from_mhdr(mhdr)
}

/// Frame header flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FCtrl {
    pub adr: bool,
    pub adr_ack_req: bool,
    pub ack: bool,
    pub f_pending: bool,
    pub f_opts_len: u8,
}

impl FCtrl {
    /// Encode to the FCtrl byte
    pub fn to_byte(&self) -> u8 {
        let mut byte = self.f_opts_len & 0x0F;
        if self.adr {
            byte |= 0x80;
        }
        if self.adr_ack_req {
            byte |= 0x40;
        }
        if self.ack {
            byte |= 0x20;
        }
        if self.f_pending {
            byte |= 0x10;
        }
        byte
    }

    /// Decode an FCtrl byte
    pub fn from_byte(byte: u8) -> Self {
        Self {
            adr: (byte & 0x80) != 0,
            adr_ack_req: (byte & 0x40) != 0,
            ack: (byte & 0x20) != 0,
            f_pending: (byte & 0x10) != 0,
            f_opts_len: byte & 0x0F,
        }
    }
}

/// Frame header
#[derive(Debug, Clone)]
pub struct FHDR {
    pub dev_addr: DevAddr,
    pub f_ctrl: FCtrl,
    /// Low 16 bits of the frame counter
    pub f_cnt: u16,
    pub f_opts: Vec<u8, MAX_FOPTS_LEN>,
}

impl FHDR {
    /// Header without options
    pub fn new(dev_addr: DevAddr, f_ctrl: FCtrl, fcnt: u32) -> Self {
        Self {
            dev_addr,
            f_ctrl,
            f_cnt: fcnt as u16,
            f_opts: Vec::new(),
        }
    }

    fn write_to(&self, buffer: &mut FrameBuffer) -> Result<(), FrameError> {
        let f_ctrl = FCtrl {
            f_opts_len: self.f_opts.len() as u8,
            ..self.f_ctrl
        };
        let mut header = [0u8; FHDR_MIN_SIZE];
        header[..4].copy_from_slice(self.dev_addr.as_bytes());
        header[4] = f_ctrl.to_byte();
        header[5..].copy_from_slice(&self.f_cnt.to_le_bytes());
        buffer
            .extend_from_slice(&header)
            .and_then(|_| buffer.extend_from_slice(&self.f_opts))
            .map_err(|_| FrameError::TooLong)
    }
}

/// Downlink settings byte of a join accept
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DlSettings(u8);

impl DlSettings {
    /// Wrap a raw DLSettings byte
    pub const fn new(byte: u8) -> Self {
        Self(byte)
    }

    /// Build from an RX1 datarate offset and RX2 datarate
    pub const fn from_parts(rx1_dr_offset: u8, rx2_datarate: u8) -> Self {
        Self(((rx1_dr_offset & 0x07) << 4) | (rx2_datarate & 0x0F))
    }

    /// RX1 datarate offset
    pub const fn rx1_dr_offset(self) -> u8 {
        (self.0 >> 4) & 0x07
    }

    /// RX2 datarate index
    pub const fn rx2_datarate(self) -> u8 {
        self.0 & 0x0F
    }

    /// Raw byte
    pub const fn to_byte(self) -> u8 {
        self.0
    }
}

/// Encode a data frame
///
/// `payload` must already be encrypted. The MIC is computed over everything
/// before it with the network session key and the full frame counter.
pub fn encode_data_frame(
    mtype: MType,
    fhdr: &FHDR,
    fcnt: u32,
    port: Option<u8>,
    payload: &[u8],
    nwk_skey: &AESKey,
    dir: Direction,
) -> Result<FrameBuffer, FrameError> {
    if !mtype.is_data() {
        return Err(FrameError::UnexpectedType);
    }
    if port.is_none() && !payload.is_empty() {
        return Err(FrameError::InvalidLength);
    }

    let mut frame = FrameBuffer::new();
    frame.push(mtype.mhdr()).map_err(|_| FrameError::TooLong)?;
    fhdr.write_to(&mut frame)?;
    if let Some(port) = port {
        frame.push(port).map_err(|_| FrameError::TooLong)?;
        frame
            .extend_from_slice(payload)
            .map_err(|_| FrameError::TooLong)?;
    }

    let mic = crypto::compute_mic(nwk_skey, &frame, fhdr.dev_addr, fcnt, dir);
    frame
        .extend_from_slice(&mic)
        .map_err(|_| FrameError::TooLong)?;
    Ok(frame)
}

/// Parsed view of a data frame
///
/// Byte ranges refer back into the buffer that was parsed, so the payload can
/// be decrypted in place.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DataFrame {
    pub mtype: MType,
    pub dev_addr: DevAddr,
    pub f_ctrl: FCtrl,
    /// Low 16 bits of the frame counter as carried on the wire
    pub f_cnt: u16,
    pub f_port: Option<u8>,
    f_opts_end: usize,
    payload_start: usize,
    mic_start: usize,
}

impl DataFrame {
    /// Split a data frame into its fields
    pub fn parse(frame: &[u8]) -> Result<Self, FrameError> {
        if frame.len() < MIN_DATA_FRAME_SIZE {
            return Err(FrameError::TooShort);
        }
        if frame.len() > MAX_FRAME_SIZE {
            return Err(FrameError::TooLong);
        }

        let mtype = MType::from_mhdr(frame[0]);
        if !mtype.is_data() {
            return Err(FrameError::UnexpectedType);
        }

        let dev_addr = DevAddr::new([frame[1], frame[2], frame[3], frame[4]]);
        let f_ctrl = FCtrl::from_byte(frame[5]);
        let f_cnt = u16::from_le_bytes([frame[6], frame[7]]);

        let f_opts_end = MHDR_SIZE + FHDR_MIN_SIZE + f_ctrl.f_opts_len as usize;
        let mic_start = frame.len() - MIC_SIZE;
        if f_opts_end > mic_start {
            return Err(FrameError::InvalidLength);
        }

        let (f_port, payload_start) = if f_opts_end == mic_start {
            (None, mic_start)
        } else {
            (Some(frame[f_opts_end]), f_opts_end + 1)
        };

        Ok(Self {
            mtype,
            dev_addr,
            f_ctrl,
            f_cnt,
            f_port,
            f_opts_end,
            payload_start,
            mic_start,
        })
    }

    /// FOpts bytes of the parsed frame
    pub fn f_opts<'a>(&self, frame: &'a [u8]) -> &'a [u8] {
        &frame[MHDR_SIZE + FHDR_MIN_SIZE..self.f_opts_end]
    }

    /// Position of the FRMPayload inside the parsed frame
    pub fn payload_range(&self) -> core::ops::Range<usize> {
        self.payload_start..self.mic_start
    }

    /// FRMPayload bytes of the parsed frame
    pub fn payload<'a>(&self, frame: &'a [u8]) -> &'a [u8] {
        &frame[self.payload_range()]
    }

    /// Length of the MACPayload (FHDR, FPort and FRMPayload)
    pub fn mac_payload_len(&self) -> usize {
        self.mic_start - MHDR_SIZE
    }

    /// Recompute the MIC for a full frame counter and compare it with the received one
    pub fn verify_mic(&self, frame: &[u8], key: &AESKey, fcnt: u32, dir: Direction) -> bool {
        let expected = crypto::compute_mic(key, &frame[..self.mic_start], self.dev_addr, fcnt, dir);
        frame[self.mic_start..] == expected
    }
}

/// Reconstruct a full 32-bit frame counter from its low 16 bits
///
/// The high half is taken from the last accepted counter and rolled forward
/// when the wire value wrapped within reach of the maximum gap.
pub fn reconstruct_fcnt(last: u32, wire: u16) -> u32 {
    let wire = wire as u32;
    let candidate = (last & !0xFFFF) | wire;
    if last as u64 + MAX_FCNT_GAP as u64 >= 0xFFFF && wire < (last & 0xFFFF) {
        candidate.wrapping_add(0x1_0000)
    } else {
        candidate
    }
}

/// Encode a join request
pub fn encode_join_request(
    app_eui: &EUI64,
    dev_eui: &EUI64,
    dev_nonce: u16,
    app_key: &AESKey,
) -> [u8; JOIN_REQUEST_SIZE] {
    let mut frame = [0u8; JOIN_REQUEST_SIZE];
    frame[0] = MType::JoinRequest.mhdr();
    frame[1..9].copy_from_slice(app_eui);
    frame[9..17].copy_from_slice(dev_eui);
    frame[17..19].copy_from_slice(&dev_nonce.to_le_bytes());

    let mic = crypto::compute_join_mic(app_key, &frame[..19]);
    frame[19..].copy_from_slice(&mic);
    frame
}

/// Decoded and authenticated join accept
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct JoinAccept {
    pub app_nonce: [u8; 3],
    pub net_id: [u8; 3],
    pub dev_addr: DevAddr,
    pub dl_settings: DlSettings,
    /// RX1 delay in seconds as carried on the wire (0 means 1)
    pub rx_delay: u8,
    pub cflist: Option<[u8; CFLIST_SIZE]>,
}

impl JoinAccept {
    /// Decrypt and authenticate a join accept
    pub fn decode(frame: &[u8], app_key: &AESKey) -> Result<Self, FrameError> {
        let len = frame.len();
        if len != JOIN_ACCEPT_SIZE && len != JOIN_ACCEPT_MAX_SIZE {
            return Err(FrameError::InvalidLength);
        }
        if MType::from_mhdr(frame[0]) != MType::JoinAccept {
            return Err(FrameError::UnexpectedType);
        }

        let mut buf = [0u8; JOIN_ACCEPT_MAX_SIZE];
        buf[..len].copy_from_slice(frame);
        crypto::decrypt_join_accept(app_key, &mut buf[MHDR_SIZE..len]);

        let mic_start = len - MIC_SIZE;
        if crypto::compute_join_mic(app_key, &buf[..mic_start]) != buf[mic_start..len] {
            return Err(FrameError::InvalidMic);
        }

        let cflist = if len == JOIN_ACCEPT_MAX_SIZE {
            let mut cflist = [0u8; CFLIST_SIZE];
            cflist.copy_from_slice(&buf[13..13 + CFLIST_SIZE]);
            Some(cflist)
        } else {
            None
        };

        Ok(Self {
            app_nonce: [buf[1], buf[2], buf[3]],
            net_id: [buf[4], buf[5], buf[6]],
            dev_addr: DevAddr::new([buf[7], buf[8], buf[9], buf[10]]),
            dl_settings: DlSettings::new(buf[11]),
            rx_delay: buf[12] & 0x0F,
            cflist,
        })
    }

    /// 24-bit network identifier
    pub fn net_id(&self) -> u32 {
        u32::from_le_bytes([self.net_id[0], self.net_id[1], self.net_id[2], 0])
    }
}
