//! MAC layer management entity
//!
//! Covers the join handshake, link checks, the MAC information base and MAC
//! commands sent by the network.

use heapless::Vec;

use super::commands::{DownlinkCommands, MacCommand};
use super::frame::{self, JoinAccept, MAX_FOPTS_LEN};
use super::mac::{ConfirmStatus, Error, Mac, MacError, MacState, Status};
use super::phy;
use super::region::{Region, MAX_CHANNELS};
use crate::config::device::{AESKey, ActivationMode, DevAddr, EUI64};
use crate::crypto;
use crate::device::{Device, Timer};
use crate::upper::Upper;

/// Mask applied to a random draw to get the join jitter in microseconds
const JOIN_JITTER_MASK: u32 = 0x1F_FFFF;

/// Largest RX1 datarate offset accepted from the network
const MAX_RX1_DR_OFFSET: u8 = 5;

/// Over-the-air activation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct JoinParams {
    /// Device EUI
    pub dev_eui: EUI64,
    /// Application (join) EUI
    pub app_eui: EUI64,
    /// Root key shared with the join server
    pub app_key: AESKey,
    /// Datarate of the join request
    pub datarate: u8,
}

/// Management request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MlmeRequest {
    /// Over-the-air activation
    Join(JoinParams),
    /// Ask the network for link quality in the next uplink
    LinkCheck,
    /// Drop the session and return to defaults
    Reset,
    /// Write a MAC information base attribute
    Set(Mib),
}

/// Link quality reported by the network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkCheckAnswer {
    /// Demodulation margin of the last uplink in dB
    pub margin: u8,
    /// Gateways that received the last uplink
    pub gateway_count: u8,
}

/// Outcome of a management request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MlmeConfirm {
    /// Join outcome
    Join(ConfirmStatus),
    /// Link check outcome
    LinkCheck {
        /// Outcome
        status: ConfirmStatus,
        /// Answer, on success
        answer: Option<LinkCheckAnswer>,
    },
}

/// Unsolicited management notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MlmeIndication {
    /// The network has more to send or wants an acknowledgement; send an uplink
    ScheduleUplink,
}

/// MAC information base attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MibAttribute {
    /// Device address
    DevAddr,
    /// Activation mode
    Activation,
    /// RX2 datarate index
    Rx2Datarate,
    /// TX power index
    TxPower,
    /// RX1 delay in seconds
    RxDelay,
    /// Datarate assigned by the network
    Datarate,
    /// Counter of the next uplink
    UplinkCounter,
    /// Last accepted downlink counter
    DownlinkCounter,
    /// Network identifier received in the join accept
    NetId,
}

/// MAC information base value
///
/// Session keys can be written but never read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mib {
    /// Device address
    DevAddr(DevAddr),
    /// Activation mode
    Activation(ActivationMode),
    /// RX2 datarate index
    Rx2Datarate(u8),
    /// TX power index
    TxPower(u8),
    /// RX1 delay in seconds
    RxDelay(u8),
    /// Datarate assigned by the network
    Datarate(u8),
    /// Counter of the next uplink
    UplinkCounter(u32),
    /// Last accepted downlink counter (read only)
    DownlinkCounter(Option<u32>),
    /// Network identifier (read only)
    NetId(u32),
    /// Network session key (write only)
    NwkSKey(AESKey),
    /// Application session key (write only)
    AppSKey(AESKey),
}

/// Link check progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum LinkCheckState {
    Idle,
    /// Requested, not yet carried by an uplink
    Requested,
    /// Carried by the uplink in flight
    InFlight,
}

/// Join in progress
#[derive(Debug, Clone, Default)]
pub(crate) struct JoinState {
    pub app_key: AESKey,
    pub dev_nonce: u16,
}

impl<D: Device, U: Upper, REG: Region> Mac<D, U, REG> {
    /// Issue a management request
    pub fn mlme_request(&mut self, request: MlmeRequest) -> Result<Status, Error<D>> {
        match request {
            MlmeRequest::Join(params) => self.join(&params),
            MlmeRequest::LinkCheck => self.link_check(),
            MlmeRequest::Reset => self.reset(),
            MlmeRequest::Set(value) => self.mib_set(value),
        }
    }

    /// Start an over-the-air activation
    ///
    /// The join request goes out after a random delay of up to about two
    /// seconds; the outcome follows as [`MlmeConfirm::Join`].
    pub fn join(&mut self, params: &JoinParams) -> Result<Status, Error<D>> {
        if self.ctx.activation.is_activated() {
            debug!("join refused: already activated");
            return Err(MacError::InvalidArgument);
        }
        if self.ctx.busy {
            debug!("join refused: busy");
            return Err(MacError::Busy);
        }
        if !REG::validate_datarate(params.datarate) {
            debug!("join refused: dr{=u8}", params.datarate);
            return Err(MacError::InvalidArgument);
        }

        let time_on_air = phy::time_on_air(frame::JOIN_REQUEST_SIZE, params.datarate);
        if !self.ctx.backoff.allows(time_on_air) {
            debug!(
                "join refused: {=u32} us left, {=u32} us needed",
                self.ctx.backoff.budget_us(),
                time_on_air
            );
            return Err(MacError::QuotaExceeded);
        }

        let nonce = self.random()?;
        let jitter = self.random()? & JOIN_JITTER_MASK;

        let dev_nonce = nonce as u16;
        let request = frame::encode_join_request(&params.app_eui, &params.dev_eui, dev_nonce, &params.app_key);
        self.ctx.tx_frame.clear();
        // a join request always fits the frame buffer
        let _ = self.ctx.tx_frame.extend_from_slice(&request);
        self.ctx.join = JoinState {
            app_key: params.app_key,
            dev_nonce,
        };
        self.ctx.last_dr = params.datarate;
        self.ctx.busy = true;

        self.set_state(MacState::JoinDelay);
        self.device.rx_timer().arm(jitter / 1000);
        Ok(Status::Deferred)
    }

    /// Join delay elapsed: put the join request on air
    pub(crate) fn send_join_request(&mut self) -> Result<(), Error<D>> {
        debug!("join request, dev nonce {=u16}", self.ctx.join.dev_nonce);
        self.send_frame()
    }

    /// Consume a join accept received in a join exchange
    pub(crate) fn process_join_accept(&mut self, buffer: &[u8]) {
        self.device.rx_timer().cancel();

        let status = match JoinAccept::decode(buffer, &self.ctx.join.app_key) {
            Ok(accept) => {
                self.apply_join_accept(&accept);
                info!("joined as {}", accept.dev_addr);
                ConfirmStatus::Success
            }
            Err(e) => {
                debug!("join accept rejected: {}", e);
                ConfirmStatus::BadMessage
            }
        };

        self.ctx.join.app_key.clear();
        self.finish_exchange();
        self.upper.mlme_confirm(MlmeConfirm::Join(status));
    }

    fn apply_join_accept(&mut self, accept: &JoinAccept) {
        let (nwk_skey, app_skey) = crypto::derive_session_keys(
            &self.ctx.join.app_key,
            &accept.app_nonce,
            &accept.net_id,
            self.ctx.join.dev_nonce,
        );
        self.ctx.nwk_skey = nwk_skey;
        self.ctx.app_skey = app_skey;
        self.ctx.net_id = accept.net_id();
        self.ctx.dev_addr = accept.dev_addr;

        self.ctx.rx1_dr_offset = accept.dl_settings.rx1_dr_offset();
        let rx2_datarate = accept.dl_settings.rx2_datarate();
        if REG::validate_datarate(rx2_datarate) {
            self.ctx.rx2_datarate = rx2_datarate;
        } else {
            debug!("join accept rx2 dr{=u8} ignored", rx2_datarate);
        }
        self.ctx.rx_delay = accept.rx_delay.max(1);
        if let Some(cflist) = &accept.cflist {
            self.ctx.channels.apply_cflist(cflist);
        }

        self.ctx.mcps.fcnt_up = 0;
        self.ctx.mcps.fcnt_down = None;
        self.ctx.activation = ActivationMode::OverTheAir;
    }

    /// Request a link check
    ///
    /// The request rides on the next data uplink; the outcome follows as
    /// [`MlmeConfirm::LinkCheck`].
    pub fn link_check(&mut self) -> Result<Status, Error<D>> {
        if !self.ctx.activation.is_activated() {
            return Err(MacError::NotConnected);
        }
        if self.ctx.link_check == LinkCheckState::Idle {
            self.ctx.link_check = LinkCheckState::Requested;
        }
        Ok(Status::Deferred)
    }

    /// FOpts for the next uplink: a pending link check request and queued answers
    pub(crate) fn build_options(&self) -> Vec<u8, MAX_FOPTS_LEN> {
        let mut options = Vec::new();
        if self.ctx.link_check != LinkCheckState::Idle {
            let _ = MacCommand::LinkCheckReq.write_to(&mut options);
        }
        // answers are capped one byte short of the field
        let _ = options.extend_from_slice(&self.ctx.repeat_answers);
        let _ = options.extend_from_slice(&self.ctx.mac_answers);
        options
    }

    pub(crate) fn mark_link_check_sent(&mut self) {
        if self.ctx.link_check == LinkCheckState::Requested {
            self.ctx.link_check = LinkCheckState::InFlight;
        }
    }

    /// A downlink arrived without a link check answer; ask again next time
    pub(crate) fn link_check_unanswered(&mut self) {
        if self.ctx.link_check == LinkCheckState::InFlight {
            self.ctx.link_check = LinkCheckState::Requested;
        }
    }

    /// Both receive windows passed without a frame
    pub(crate) fn mlme_no_rx(&mut self) {
        if !self.ctx.activation.is_activated() {
            self.ctx.join.app_key.clear();
            self.finish_exchange();
            info!("join timed out");
            self.upper.mlme_confirm(MlmeConfirm::Join(ConfirmStatus::TimedOut));
        }
    }

    /// The data exchange carrying the link check request ended unanswered
    ///
    /// Retransmissions of a confirmed uplink carry the request too, so this
    /// runs only once the exchange is over.
    pub(crate) fn link_check_timed_out(&mut self) {
        if self.ctx.link_check == LinkCheckState::InFlight {
            self.ctx.link_check = LinkCheckState::Idle;
            self.upper.mlme_confirm(MlmeConfirm::LinkCheck {
                status: ConfirmStatus::TimedOut,
                answer: None,
            });
        }
    }

    /// Drop the session and return to defaults
    ///
    /// Keys are zeroed and counters, channels and receive parameters restored.
    /// The backoff budget is kept.
    pub fn reset(&mut self) -> Result<Status, Error<D>> {
        if self.ctx.busy {
            return Err(MacError::Busy);
        }
        self.ctx.reset(&self.config);
        info!("mac reset");
        Ok(Status::Success)
    }

    /// Read a MAC information base attribute
    pub fn mib_get(&self, attribute: MibAttribute) -> Mib {
        match attribute {
            MibAttribute::DevAddr => Mib::DevAddr(self.ctx.dev_addr),
            MibAttribute::Activation => Mib::Activation(self.ctx.activation),
            MibAttribute::Rx2Datarate => Mib::Rx2Datarate(self.ctx.rx2_datarate),
            MibAttribute::TxPower => Mib::TxPower(self.ctx.tx_power),
            MibAttribute::RxDelay => Mib::RxDelay(self.ctx.rx_delay),
            MibAttribute::Datarate => Mib::Datarate(self.ctx.datarate),
            MibAttribute::UplinkCounter => Mib::UplinkCounter(self.ctx.mcps.fcnt_up),
            MibAttribute::DownlinkCounter => Mib::DownlinkCounter(self.ctx.mcps.fcnt_down),
            MibAttribute::NetId => Mib::NetId(self.ctx.net_id),
        }
    }

    /// Write a MAC information base attribute
    ///
    /// Activation by personalization is set up by writing the address, both
    /// session keys and finally [`ActivationMode::Personalization`]. Writing
    /// [`ActivationMode::None`] drops the session like [`reset`](Self::reset).
    pub fn mib_set(&mut self, value: Mib) -> Result<Status, Error<D>> {
        if self.ctx.busy {
            return Err(MacError::Busy);
        }
        match value {
            Mib::DevAddr(addr) => self.ctx.dev_addr = addr,
            Mib::Activation(ActivationMode::OverTheAir) => return Err(MacError::InvalidArgument),
            Mib::Activation(ActivationMode::None) => self.ctx.reset(&self.config),
            Mib::Activation(mode) => self.ctx.activation = mode,
            Mib::Rx2Datarate(dr) if REG::validate_datarate(dr) => self.ctx.rx2_datarate = dr,
            Mib::TxPower(index) if REG::validate_tx_power(index) => self.ctx.tx_power = index,
            Mib::RxDelay(delay) if (1..=15).contains(&delay) => self.ctx.rx_delay = delay,
            Mib::Datarate(dr) if REG::validate_datarate(dr) => self.ctx.datarate = dr,
            Mib::UplinkCounter(fcnt) => self.ctx.mcps.fcnt_up = fcnt,
            Mib::NwkSKey(key) => self.ctx.nwk_skey = key,
            Mib::AppSKey(key) => self.ctx.app_skey = key,
            Mib::Rx2Datarate(_)
            | Mib::TxPower(_)
            | Mib::RxDelay(_)
            | Mib::Datarate(_)
            | Mib::DownlinkCounter(_)
            | Mib::NetId(_) => return Err(MacError::InvalidArgument),
        }
        Ok(Status::Success)
    }

    /// Act on network commands and queue their answers
    pub(crate) fn process_mac_commands(&mut self, data: &[u8]) {
        for command in DownlinkCommands::new(data) {
            trace!("mac command {}", command);
            match command {
                MacCommand::LinkCheckAns {
                    margin,
                    gateway_count,
                } => {
                    if self.ctx.link_check == LinkCheckState::Idle {
                        continue;
                    }
                    self.ctx.link_check = LinkCheckState::Idle;
                    self.upper.mlme_confirm(MlmeConfirm::LinkCheck {
                        status: ConfirmStatus::Success,
                        answer: Some(LinkCheckAnswer {
                            margin,
                            gateway_count,
                        }),
                    });
                }
                MacCommand::LinkADRReq {
                    data_rate,
                    tx_power,
                    ch_mask,
                    ch_mask_cntl,
                    ..
                } => {
                    let data_rate_ack = data_rate == 0x0F || REG::validate_datarate(data_rate);
                    let power_ack = tx_power == 0x0F || REG::validate_tx_power(tx_power);
                    let channel_mask_ack = self.channel_mask_keeps_plan(ch_mask, ch_mask_cntl);
                    if data_rate_ack && power_ack && channel_mask_ack {
                        if data_rate != 0x0F {
                            self.ctx.datarate = data_rate;
                        }
                        if tx_power != 0x0F {
                            self.ctx.tx_power = tx_power;
                        }
                    }
                    self.ctx.queue_answer(MacCommand::LinkADRAns {
                        power_ack,
                        data_rate_ack,
                        channel_mask_ack,
                    });
                }
                MacCommand::DutyCycleReq { max_duty_cycle } => {
                    self.ctx.duty_cycle = 1 << (max_duty_cycle & 0x0F);
                    self.ctx.queue_answer(MacCommand::DutyCycleAns);
                }
                MacCommand::RXParamSetupReq {
                    rx1_dr_offset,
                    rx2_data_rate,
                    freq,
                } => {
                    let rx1_dr_offset_ack = rx1_dr_offset <= MAX_RX1_DR_OFFSET;
                    let rx2_data_rate_ack = REG::validate_datarate(rx2_data_rate);
                    let channel_ack = REG::validate_frequency(freq);
                    if rx1_dr_offset_ack && rx2_data_rate_ack && channel_ack {
                        self.ctx.rx1_dr_offset = rx1_dr_offset;
                        self.ctx.rx2_datarate = rx2_data_rate;
                        self.ctx.rx2_frequency = freq;
                    }
                    self.ctx.queue_answer(MacCommand::RXParamSetupAns {
                        rx1_dr_offset_ack,
                        rx2_data_rate_ack,
                        channel_ack,
                    });
                }
                MacCommand::DevStatusReq => {
                    self.ctx.queue_answer(MacCommand::DevStatusAns {
                        battery: 255,
                        margin: 0,
                    });
                }
                MacCommand::NewChannelReq {
                    ch_index,
                    freq,
                    max_dr,
                    min_dr,
                } => {
                    let data_rate_ok =
                        min_dr <= max_dr && REG::validate_datarate(min_dr) && REG::validate_datarate(max_dr);
                    let index = ch_index as usize;
                    let channel_freq_ok = index >= REG::DEFAULT_CHANNELS.len()
                        && index < MAX_CHANNELS
                        && REG::validate_frequency(freq);
                    if data_rate_ok && channel_freq_ok {
                        self.ctx.channels.set(index, freq);
                    }
                    self.ctx.queue_answer(MacCommand::NewChannelAns {
                        channel_freq_ok,
                        data_rate_ok,
                    });
                }
                MacCommand::RXTimingSetupReq { delay } => {
                    self.ctx.rx_delay = delay.max(1);
                    self.ctx.queue_answer(MacCommand::RXTimingSetupAns);
                }
                _ => {}
            }
        }
    }

    /// Whether a LinkADRReq channel mask leaves every populated channel enabled
    ///
    /// Channels are never disabled, so only masks that change nothing are
    /// acknowledged.
    fn channel_mask_keeps_plan(&self, ch_mask: u16, ch_mask_cntl: u8) -> bool {
        match ch_mask_cntl {
            0 => (0..MAX_CHANNELS)
                .filter(|&i| self.ctx.channels.get(i).is_some())
                .all(|i| ch_mask & (1 << i) != 0),
            6 => true,
            _ => false,
        }
    }
}
