use core::fmt;

use heapless::Vec;

use super::channels::ChannelSet;
use super::commands::MacCommand;
use super::frame::{FrameBuffer, MAX_FOPTS_LEN};
use super::mcps::McpsState;
use super::mlme::{JoinState, LinkCheckState};
use super::phy;
use super::region::Region;
use crate::config::device::{AESKey, ActivationMode, DevAddr, MacConfig};
use crate::device::backoff::{BackoffState, BACKOFF_TICK_MS};
use crate::device::{self, Device, Timer};
use crate::radio::traits::Radio;
use crate::upper::Upper;

/// MAC layer error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MacError<E> {
    /// A parameter is out of range for the region or the current activation
    InvalidArgument,
    /// An exchange is in flight
    Busy,
    /// The device has no session
    NotConnected,
    /// The backoff budget cannot cover the transmission
    QuotaExceeded,
    /// The port is outside the application range
    BadMessage,
    /// The frame exceeds the maximum payload of the datarate
    MessageTooLarge,
    /// Radio error
    Radio(E),
    /// The random source failed
    Random,
}

impl<E: fmt::Debug> fmt::Display for MacError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MacError::InvalidArgument => f.write_str("invalid argument"),
            MacError::Busy => f.write_str("mac busy"),
            MacError::NotConnected => f.write_str("not connected"),
            MacError::QuotaExceeded => f.write_str("airtime quota exceeded"),
            MacError::BadMessage => f.write_str("bad message"),
            MacError::MessageTooLarge => f.write_str("message too large"),
            MacError::Radio(e) => write!(f, "radio error: {:?}", e),
            MacError::Random => f.write_str("random source failed"),
        }
    }
}

#[cfg(feature = "std")]
impl<E: fmt::Debug> std::error::Error for MacError<E> {}

/// Error type of a MAC running on device `D`
pub type Error<D> = MacError<<<D as Device>::Radio as Radio>::Error>;

/// Synchronous outcome of an accepted request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Status {
    /// Completed immediately
    Success,
    /// Completion will be reported through a confirm
    Deferred,
}

/// Outcome reported in a confirm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfirmStatus {
    /// The exchange completed
    Success,
    /// No answer arrived
    TimedOut,
    /// The answer failed validation
    BadMessage,
}

/// MAC state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MacState {
    /// No exchange in flight
    Idle,
    /// Waiting out the random delay before a join request
    JoinDelay,
    /// Frame handed to the radio
    Transmitting,
    /// Between the end of transmission and the opening of RX2
    RxWindow1,
    /// RX2 open
    RxWindow2,
    /// Waiting out the ack timeout before retransmitting a confirmed uplink
    RetransmitDelay,
}

/// FOpts room for answers; one byte stays free for a link check request
const MAX_ANSWERS_LEN: usize = MAX_FOPTS_LEN - 1;

/// Answers queued for the next uplink
pub(crate) type MacAnswers = Vec<u8, MAX_ANSWERS_LEN>;

/// Everything the MAC remembers between events
#[derive(Debug)]
pub(crate) struct MacContext<REG: Region> {
    pub state: MacState,
    pub busy: bool,
    pub activation: ActivationMode,
    pub dev_addr: DevAddr,
    pub nwk_skey: AESKey,
    pub app_skey: AESKey,
    pub net_id: u32,
    pub channels: ChannelSet<REG>,
    /// Datarate of the last uplink
    pub last_dr: u8,
    /// Frequency of the last uplink, reused for RX1
    pub last_frequency: u32,
    /// Datarate assigned by the network through LinkADRReq
    pub datarate: u8,
    /// Aggregated duty cycle divisor from DutyCycleReq; 1 means no limit
    pub duty_cycle: u16,
    /// The off-time following the last transmission is running
    pub off_time: bool,
    /// A retransmission waits for the off-time to end
    pub retransmit_pending: bool,
    pub tx_power: u8,
    pub rx1_dr_offset: u8,
    pub rx2_datarate: u8,
    pub rx2_frequency: u32,
    /// RX1 delay in seconds
    pub rx_delay: u8,
    pub rx1_opened: bool,
    pub link_check: LinkCheckState,
    pub mac_answers: MacAnswers,
    /// Answers repeated on every uplink until a downlink arrives
    pub repeat_answers: MacAnswers,
    pub schedule_uplink: bool,
    pub backoff: BackoffState,
    pub tx_frame: FrameBuffer,
    pub mcps: McpsState,
    pub join: JoinState,
}

impl<REG: Region> MacContext<REG> {
    pub fn new(config: &MacConfig) -> Self {
        Self {
            state: MacState::Idle,
            busy: false,
            activation: ActivationMode::None,
            dev_addr: DevAddr::default(),
            nwk_skey: AESKey::default(),
            app_skey: AESKey::default(),
            net_id: 0,
            channels: ChannelSet::new(),
            last_dr: 0,
            last_frequency: 0,
            datarate: 0,
            duty_cycle: 1,
            off_time: false,
            retransmit_pending: false,
            tx_power: config.tx_power,
            rx1_dr_offset: 0,
            rx2_datarate: REG::RX2_DATARATE,
            rx2_frequency: REG::RX2_FREQUENCY,
            rx_delay: config.timing.rx1_delay as u8,
            rx1_opened: false,
            link_check: LinkCheckState::Idle,
            mac_answers: Vec::new(),
            repeat_answers: Vec::new(),
            schedule_uplink: false,
            backoff: BackoffState::new(),
            tx_frame: FrameBuffer::new(),
            mcps: McpsState::default(),
            join: JoinState::default(),
        }
    }

    /// Back to power-up defaults, keeping the backoff bookkeeping
    pub fn reset(&mut self, config: &MacConfig) {
        self.nwk_skey.clear();
        self.app_skey.clear();
        self.join.app_key.clear();
        let backoff = core::mem::take(&mut self.backoff);
        *self = Self::new(config);
        self.backoff = backoff;
    }

    /// Queue a MAC command answer for the next uplink
    ///
    /// RXParamSetupAns and RXTimingSetupAns stay queued until a downlink is
    /// received; every other answer is sent once.
    pub fn queue_answer(&mut self, answer: MacCommand) {
        let queued = self.mac_answers.len() + self.repeat_answers.len();
        let target = match &answer {
            MacCommand::RXParamSetupAns { .. } | MacCommand::RXTimingSetupAns => {
                &mut self.repeat_answers
            }
            _ => &mut self.mac_answers,
        };
        if queued + 1 + answer.len() > MAX_ANSWERS_LEN || answer.write_to(target).is_err() {
            debug!("mac answer {} dropped", answer.cid());
        }
    }
}

/// LoRaWAN Class A end-device MAC
///
/// Owns the hardware collaborators and the application callbacks. Requests are
/// made through the MCPS (`mcps_request`) and MLME (`join`, `link_check`,
/// `reset`, `mib_get`, `mib_set`) methods; hardware completions are fed in
/// through [`handle_event`](Self::handle_event).
pub struct Mac<D: Device, U: Upper, REG: Region> {
    pub(crate) device: D,
    pub(crate) upper: U,
    pub(crate) config: MacConfig,
    pub(crate) ctx: MacContext<REG>,
}

impl<D: Device, U: Upper, REG: Region> Mac<D, U, REG> {
    /// Create a MAC and start the backoff clock
    pub fn new(mut device: D, upper: U, config: MacConfig) -> Self {
        let mut ctx = MacContext::new(&config);
        ctx.backoff.tick();
        device.backoff_timer().arm(BACKOFF_TICK_MS);

        Self {
            device,
            upper,
            config,
            ctx,
        }
    }

    /// Hardware collaborators
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Hardware collaborators
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Application callbacks
    pub fn upper(&self) -> &U {
        &self.upper
    }

    /// Application callbacks
    pub fn upper_mut(&mut self) -> &mut U {
        &mut self.upper
    }

    /// MAC tunables
    pub fn config(&self) -> &MacConfig {
        &self.config
    }

    /// Current state machine state
    pub fn state(&self) -> MacState {
        self.ctx.state
    }

    /// Whether an exchange is in flight
    pub fn is_busy(&self) -> bool {
        self.ctx.busy
    }

    /// Backoff bookkeeping
    pub fn backoff(&self) -> &BackoffState {
        &self.ctx.backoff
    }

    /// Uplink channel plan
    pub fn channels(&self) -> &ChannelSet<REG> {
        &self.ctx.channels
    }

    pub(crate) fn random(&mut self) -> Result<u32, Error<D>> {
        device::next_u32(self.device.rng()).ok_or(MacError::Random)
    }

    pub(crate) fn sleep_radio(&mut self) {
        if self.device.radio().sleep().is_err() {
            warn!("radio sleep failed");
        }
    }

    pub(crate) fn set_state(&mut self, state: MacState) {
        trace!("mac state {} -> {}", self.ctx.state, state);
        self.ctx.state = state;
    }

    /// Send the outgoing frame on a random channel at the last datarate
    pub(crate) fn send_frame(&mut self) -> Result<(), Error<D>> {
        let random = self.random()?;
        let frequency = self
            .ctx
            .channels
            .pick_channel(random)
            .ok_or(MacError::InvalidArgument)?;
        let dr = self.ctx.last_dr;
        let config = phy::tx_config::<REG>(frequency, dr, self.ctx.tx_power)
            .ok_or(MacError::InvalidArgument)?;

        let radio = self.device.radio();
        radio.configure_tx(config).map_err(MacError::Radio)?;
        radio
            .transmit(&self.ctx.tx_frame)
            .map_err(MacError::Radio)?;

        let time_on_air = phy::time_on_air(self.ctx.tx_frame.len(), dr);
        self.ctx.backoff.debit(time_on_air);
        self.start_off_time(time_on_air);
        self.ctx.last_frequency = frequency;
        debug!(
            "tx {=usize} bytes on {=u32} dr{=u8}, {=u32} us",
            self.ctx.tx_frame.len(),
            frequency,
            dr,
            time_on_air
        );
        self.set_state(MacState::Transmitting);
        Ok(())
    }

    /// Hold further uplinks for `time_on_air * (duty_cycle - 1)`
    fn start_off_time(&mut self, time_on_air: u32) {
        if self.ctx.duty_cycle <= 1 {
            return;
        }
        let off_ms = u64::from(time_on_air) * u64::from(self.ctx.duty_cycle - 1) / 1000;
        let off_ms = u32::try_from(off_ms).unwrap_or(u32::MAX);
        debug!("off-time {=u32} ms", off_ms);
        self.ctx.off_time = true;
        self.device.duty_cycle_timer().arm(off_ms);
    }

    /// End the current exchange and release the MAC
    pub(crate) fn finish_exchange(&mut self) {
        self.set_state(MacState::Idle);
        self.ctx.busy = false;
        self.ctx.retransmit_pending = false;
        self.ctx.tx_frame.clear();
    }

    /// Hand the application at most one uplink opportunity per exchange
    pub(crate) fn indicate_schedule_uplink(&mut self) {
        if core::mem::take(&mut self.ctx.schedule_uplink) {
            self.upper
                .mlme_indication(super::mlme::MlmeIndication::ScheduleUplink);
        }
    }
}
