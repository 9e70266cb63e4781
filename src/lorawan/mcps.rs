//! MAC common part sublayer: application data
//!
//! Uplinks are requested with [`Mac::mcps_request`]; their outcome arrives as
//! an [`McpsConfirm`]. Application payloads received in a downlink arrive as an
//! [`McpsIndication`].

use super::frame::{self, DataFrame, FCtrl, MType, FHDR, MAX_FCNT_GAP, MAX_FRAME_SIZE};
use super::mac::{ConfirmStatus, Error, Mac, MacError, MacState, Status};
use super::region::Region;
use crate::crypto::{self, Direction};
use crate::device::{self, Device, Timer};
use crate::upper::Upper;

/// Lowest application port
pub const PORT_MIN: u8 = 1;

/// Highest application port
pub const PORT_MAX: u8 = 223;

/// Fixed part of the ack timeout in milliseconds
const ACK_TIMEOUT_MS: u32 = 1000;

/// Random spread added to the ack timeout in milliseconds
const ACK_TIMEOUT_SPREAD_MS: u32 = 2000;

/// Data uplink request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct McpsRequest<'a> {
    /// Application payload (plaintext)
    pub data: &'a [u8],
    /// Application port, 1 to 223
    pub port: u8,
    /// Ask the network to acknowledge the uplink
    pub confirmed: bool,
    /// Uplink datarate index; `None` uses the datarate assigned by the
    /// network through LinkADRReq
    pub datarate: Option<u8>,
}

/// Kind of data exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum McpsKind {
    /// Acknowledged uplink
    Confirmed,
    /// Fire-and-forget uplink
    Unconfirmed,
}

/// Outcome of a data request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct McpsConfirm {
    /// Kind of the completed exchange
    pub kind: McpsKind,
    /// Outcome
    pub status: ConfirmStatus,
}

/// Application payload received in a downlink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct McpsIndication<'a> {
    /// Application port
    pub port: u8,
    /// Decrypted payload
    pub data: &'a [u8],
    /// Signal strength of the downlink in dBm
    pub rssi: i16,
}

/// Data exchange bookkeeping
#[derive(Debug, Clone, Default)]
pub(crate) struct McpsState {
    /// Counter of the next new uplink
    pub fcnt_up: u32,
    /// Last accepted downlink counter
    pub fcnt_down: Option<u32>,
    /// The last downlink was confirmed; acknowledge it in the next uplink
    pub ack_requested: bool,
    /// The uplink in flight is confirmed
    pub waiting_for_ack: bool,
    /// Transmissions left for the confirmed uplink in flight
    pub transmissions_left: u8,
}

/// Check a downlink counter against the last accepted one
///
/// Returns the full counter when the frame is newer than `last` and no more
/// than [`MAX_FCNT_GAP`] ahead of it.
pub fn accept_fcnt(last: Option<u32>, wire: u16) -> Option<u32> {
    match last {
        None => {
            let fcnt = wire as u32;
            (fcnt <= MAX_FCNT_GAP).then_some(fcnt)
        }
        Some(last) => {
            let fcnt = frame::reconstruct_fcnt(last, wire);
            (fcnt > last && fcnt - last <= MAX_FCNT_GAP).then_some(fcnt)
        }
    }
}

impl<D: Device, U: Upper, REG: Region> Mac<D, U, REG> {
    /// Request a data uplink
    ///
    /// Checks run in order: session, busy, port, datarate, size, off-time.
    /// Nothing is changed when a check fails. On success the frame is on air and the
    /// outcome follows as an [`McpsConfirm`].
    pub fn mcps_request(&mut self, request: &McpsRequest<'_>) -> Result<Status, Error<D>> {
        if !self.ctx.activation.is_activated() {
            debug!("mcps request refused: not connected");
            return Err(MacError::NotConnected);
        }
        if self.ctx.busy {
            debug!("mcps request refused: busy");
            return Err(MacError::Busy);
        }
        if !(PORT_MIN..=PORT_MAX).contains(&request.port) {
            debug!("mcps request refused: port {=u8}", request.port);
            return Err(MacError::BadMessage);
        }
        let datarate = request.datarate.unwrap_or(self.ctx.datarate);
        if !REG::validate_datarate(datarate) {
            debug!("mcps request refused: dr{=u8}", datarate);
            return Err(MacError::InvalidArgument);
        }

        let frame = self.build_uplink(request)?;
        let mac_payload_len = frame.len() - 1 - crypto::MIC_SIZE;
        if mac_payload_len > REG::mac_payload_max(datarate) {
            debug!("mcps request refused: {=usize} bytes", mac_payload_len);
            return Err(MacError::MessageTooLarge);
        }
        if self.ctx.off_time {
            debug!("mcps request refused: off-time running");
            return Err(MacError::QuotaExceeded);
        }

        self.ctx.tx_frame = frame;
        self.ctx.last_dr = datarate;
        self.ctx.busy = true;
        if let Err(e) = self.send_frame() {
            self.finish_exchange();
            return Err(e);
        }

        self.ctx.mcps.ack_requested = false;
        self.ctx.mcps.waiting_for_ack = request.confirmed;
        self.ctx.mcps.transmissions_left = if request.confirmed {
            self.config.confirmed_transmissions.max(1)
        } else {
            1
        };
        self.ctx.mac_answers.clear();
        self.mark_link_check_sent();

        Ok(Status::Deferred)
    }

    fn build_uplink(&self, request: &McpsRequest<'_>) -> Result<frame::FrameBuffer, Error<D>> {
        let fcnt = self.ctx.mcps.fcnt_up;
        let mtype = if request.confirmed {
            MType::ConfirmedDataUp
        } else {
            MType::UnconfirmedDataUp
        };
        let f_ctrl = FCtrl {
            ack: self.ctx.mcps.ack_requested,
            ..FCtrl::default()
        };
        let mut fhdr = FHDR::new(self.ctx.dev_addr, f_ctrl, fcnt);
        fhdr.f_opts = self.build_options();

        let mut payload = [0u8; MAX_FRAME_SIZE];
        let payload = payload
            .get_mut(..request.data.len())
            .ok_or(MacError::MessageTooLarge)?;
        payload.copy_from_slice(request.data);
        crypto::encrypt_payload(
            &self.ctx.app_skey,
            self.ctx.dev_addr,
            fcnt,
            Direction::Up,
            payload,
        );

        frame::encode_data_frame(
            mtype,
            &fhdr,
            fcnt,
            Some(request.port),
            payload,
            &self.ctx.nwk_skey,
            Direction::Up,
        )
        .map_err(|_| MacError::MessageTooLarge)
    }

    /// Close a data exchange with a confirm
    pub(crate) fn end_of_tx(&mut self, kind: McpsKind, status: ConfirmStatus) {
        if status == ConfirmStatus::Success {
            self.ctx.mcps.fcnt_up = self.ctx.mcps.fcnt_up.wrapping_add(1);
        }
        self.ctx.mcps.waiting_for_ack = false;
        self.ctx.mcps.transmissions_left = 0;
        self.finish_exchange();
        self.link_check_timed_out();
        info!("mcps confirm {} {}", kind, status);
        self.upper.mcps_confirm(McpsConfirm { kind, status });
        self.indicate_schedule_uplink();
    }

    /// A confirmed uplink went unacknowledged: retransmit or give up
    fn mcps_no_ack(&mut self) {
        self.ctx.mcps.transmissions_left = self.ctx.mcps.transmissions_left.saturating_sub(1);
        if self.ctx.mcps.transmissions_left == 0 {
            self.end_of_tx(McpsKind::Confirmed, ConfirmStatus::TimedOut);
            return;
        }

        let spread = device::next_u32(self.device.rng()).unwrap_or(0) % ACK_TIMEOUT_SPREAD_MS;
        let delay = ACK_TIMEOUT_MS + spread;
        debug!(
            "no ack, {=u8} transmissions left, retry in {=u32} ms",
            self.ctx.mcps.transmissions_left,
            delay
        );
        self.set_state(MacState::RetransmitDelay);
        self.device.rx_timer().arm(delay);
    }

    /// Both receive windows passed without a frame
    pub(crate) fn mcps_no_rx(&mut self) {
        if self.ctx.mcps.waiting_for_ack {
            self.mcps_no_ack();
        } else {
            self.end_of_tx(McpsKind::Unconfirmed, ConfirmStatus::Success);
        }
    }

    /// Send the confirmed uplink in flight again, with the same counter
    pub(crate) fn retransmit(&mut self) -> Result<(), Error<D>> {
        debug!("retransmitting fcnt {=u32}", self.ctx.mcps.fcnt_up);
        self.send_frame()
    }

    /// Validate and consume a data downlink
    ///
    /// Returns `false` when the frame is dropped; the exchange then carries on
    /// as if nothing had been received.
    pub(crate) fn process_downlink(&mut self, buffer: &mut [u8], rssi: i16) -> bool {
        let frame = match DataFrame::parse(buffer) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("downlink dropped: {}", e);
                return false;
            }
        };
        if !matches!(frame.mtype, MType::UnconfirmedDataDown | MType::ConfirmedDataDown) {
            debug!("downlink dropped: {}", frame.mtype);
            return false;
        }
        if frame.dev_addr != self.ctx.dev_addr {
            debug!("downlink dropped: address {}", frame.dev_addr);
            return false;
        }
        let Some(fcnt) = accept_fcnt(self.ctx.mcps.fcnt_down, frame.f_cnt) else {
            debug!("downlink dropped: fcnt {=u16}", frame.f_cnt);
            return false;
        };
        if frame.f_port == Some(0) && frame.f_ctrl.f_opts_len > 0 {
            debug!("downlink dropped: options on port 0");
            return false;
        }
        if !frame.verify_mic(buffer, &self.ctx.nwk_skey, fcnt, Direction::Down) {
            debug!("downlink dropped: mic");
            return false;
        }

        self.device.rx_timer().cancel();
        self.set_state(MacState::Idle);
        self.ctx.mcps.fcnt_down = Some(fcnt);
        self.ctx.mcps.ack_requested = frame.mtype == MType::ConfirmedDataDown;
        self.ctx.repeat_answers.clear();

        let mut options = [0u8; frame::MAX_FOPTS_LEN];
        let f_opts = frame.f_opts(buffer);
        options[..f_opts.len()].copy_from_slice(f_opts);
        self.process_mac_commands(&options[..f_opts.len()]);

        let range = frame.payload_range();
        match frame.f_port {
            Some(0) => {
                let payload = &mut buffer[range];
                crypto::encrypt_payload(&self.ctx.nwk_skey, self.ctx.dev_addr, fcnt, Direction::Down, payload);
                self.process_mac_commands(payload);
            }
            Some(port) if !range.is_empty() => {
                let payload = &mut buffer[range];
                crypto::encrypt_payload(&self.ctx.app_skey, self.ctx.dev_addr, fcnt, Direction::Down, payload);
                self.upper.mcps_indication(McpsIndication {
                    port,
                    data: payload,
                    rssi,
                });
            }
            _ => {}
        }
        self.link_check_unanswered();

        if frame.f_ctrl.f_pending || self.ctx.mcps.ack_requested {
            self.ctx.schedule_uplink = true;
        }

        if !self.ctx.mcps.waiting_for_ack {
            self.end_of_tx(McpsKind::Unconfirmed, ConfirmStatus::Success);
        } else if frame.f_ctrl.ack {
            self.end_of_tx(McpsKind::Confirmed, ConfirmStatus::Success);
        } else {
            self.mcps_no_ack();
        }
        true
    }
}
