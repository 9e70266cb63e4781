#![allow(dead_code)]

use std::convert::Infallible;

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, KeyInit};
use aes::Aes128;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use lorawan_mac::{
    config::device::{AESKey, DevAddr, MacConfig, EUI64},
    crypto::{self, Direction},
    device::{Device, Event, Timer},
    lorawan::{
        frame::{self, DataFrame, DlSettings, FCtrl, MType, FHDR},
        mac::{Mac, MacError, Status},
        mcps::{McpsConfirm, McpsIndication, McpsRequest},
        mlme::{JoinParams, MlmeConfirm, MlmeIndication},
        region::EU868,
    },
    radio::traits::{Radio, RxConfig, TxConfig},
    upper::Upper,
};

pub const DEV_EUI: EUI64 = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
pub const APP_EUI: EUI64 = [0x70, 0xB3, 0xD5, 0x7E, 0xD0, 0x00, 0x00, 0x01];
pub const APP_KEY: [u8; 16] = [
    0x2B, 0x7E, 0x15, 0x16, 0x28, 0xAE, 0xD2, 0xA6, 0xAB, 0xF7, 0x15, 0x88, 0x09, 0xCF, 0x4F, 0x3C,
];
pub const DEV_ADDR: u32 = 0x0102_0304;
pub const APP_NONCE: [u8; 3] = [0x11, 0x22, 0x33];
pub const NET_ID: [u8; 3] = [0x13, 0x00, 0x00];

/// Mock radio error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockError;

/// Mock radio recording everything the MAC asks of it
#[derive(Debug, Default)]
pub struct MockRadio {
    pub transmitted: Vec<Vec<u8>>,
    pub tx_configs: Vec<TxConfig>,
    pub rx_configs: Vec<RxConfig>,
    pub rx_frame: Option<Vec<u8>>,
    pub sleeping: bool,
    pub fail_transmit: bool,
}

impl Radio for MockRadio {
    type Error = MockError;

    fn configure_tx(&mut self, config: TxConfig) -> Result<(), Self::Error> {
        self.sleeping = false;
        self.tx_configs.push(config);
        Ok(())
    }

    fn transmit(&mut self, buffer: &[u8]) -> Result<(), Self::Error> {
        if self.fail_transmit {
            return Err(MockError);
        }
        self.transmitted.push(buffer.to_vec());
        Ok(())
    }

    fn configure_rx(&mut self, config: RxConfig) -> Result<(), Self::Error> {
        self.sleeping = false;
        self.rx_configs.push(config);
        Ok(())
    }

    fn receive(&mut self, buffer: &mut [u8]) -> Result<usize, Self::Error> {
        let frame = self.rx_frame.take().unwrap_or_default();
        let len = frame.len().min(buffer.len());
        buffer[..len].copy_from_slice(&frame[..len]);
        Ok(len)
    }

    fn sleep(&mut self) -> Result<(), Self::Error> {
        self.sleeping = true;
        Ok(())
    }
}

/// Timer that only records what it was asked to do; tests fire it by hand
#[derive(Debug, Default)]
pub struct MockTimer {
    pub armed: Option<u32>,
    pub history: Vec<u32>,
    pub cancels: usize,
}

impl Timer for MockTimer {
    fn arm(&mut self, millis: u32) {
        self.armed = Some(millis);
        self.history.push(millis);
    }

    fn cancel(&mut self) {
        self.armed = None;
        self.cancels += 1;
    }
}

/// Seeded random source
pub struct MockRng(StdRng);

impl MockRng {
    pub fn new(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}

impl embedded_hal::blocking::rng::Read for MockRng {
    type Error = Infallible;

    fn read(&mut self, buffer: &mut [u8]) -> Result<(), Self::Error> {
        self.0.fill_bytes(buffer);
        Ok(())
    }
}

pub struct MockDevice {
    pub radio: MockRadio,
    pub rx_timer: MockTimer,
    pub backoff_timer: MockTimer,
    pub duty_cycle_timer: MockTimer,
    pub rng: MockRng,
}

impl MockDevice {
    pub fn new(seed: u64) -> Self {
        Self {
            radio: MockRadio::default(),
            rx_timer: MockTimer::default(),
            backoff_timer: MockTimer::default(),
            duty_cycle_timer: MockTimer::default(),
            rng: MockRng::new(seed),
        }
    }
}

impl Device for MockDevice {
    type Radio = MockRadio;
    type Timer = MockTimer;
    type Rng = MockRng;

    fn radio(&mut self) -> &mut Self::Radio {
        &mut self.radio
    }

    fn rx_timer(&mut self) -> &mut Self::Timer {
        &mut self.rx_timer
    }

    fn backoff_timer(&mut self) -> &mut Self::Timer {
        &mut self.backoff_timer
    }

    fn duty_cycle_timer(&mut self) -> &mut Self::Timer {
        &mut self.duty_cycle_timer
    }

    fn rng(&mut self) -> &mut Self::Rng {
        &mut self.rng
    }
}

/// Everything the MAC reported to the application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    McpsConfirm(McpsConfirm),
    McpsIndication { port: u8, data: Vec<u8>, rssi: i16 },
    MlmeConfirm(MlmeConfirm),
    MlmeIndication(MlmeIndication),
}

#[derive(Debug, Default)]
pub struct Recorder {
    pub notifications: Vec<Notification>,
}

impl Recorder {
    pub fn mcps_confirms(&self) -> Vec<McpsConfirm> {
        self.notifications
            .iter()
            .filter_map(|n| match n {
                Notification::McpsConfirm(c) => Some(*c),
                _ => None,
            })
            .collect()
    }

    pub fn mlme_confirms(&self) -> Vec<MlmeConfirm> {
        self.notifications
            .iter()
            .filter_map(|n| match n {
                Notification::MlmeConfirm(c) => Some(*c),
                _ => None,
            })
            .collect()
    }

    pub fn mlme_indications(&self) -> Vec<MlmeIndication> {
        self.notifications
            .iter()
            .filter_map(|n| match n {
                Notification::MlmeIndication(i) => Some(*i),
                _ => None,
            })
            .collect()
    }
}

impl Upper for Recorder {
    fn mcps_confirm(&mut self, confirm: McpsConfirm) {
        self.notifications.push(Notification::McpsConfirm(confirm));
    }

    fn mcps_indication(&mut self, indication: McpsIndication<'_>) {
        self.notifications.push(Notification::McpsIndication {
            port: indication.port,
            data: indication.data.to_vec(),
            rssi: indication.rssi,
        });
    }

    fn mlme_confirm(&mut self, confirm: MlmeConfirm) {
        self.notifications.push(Notification::MlmeConfirm(confirm));
    }

    fn mlme_indication(&mut self, indication: MlmeIndication) {
        self.notifications.push(Notification::MlmeIndication(indication));
    }
}

pub type TestMac = Mac<MockDevice, Recorder, EU868>;

pub fn new_mac() -> TestMac {
    new_mac_with(MacConfig::default())
}

pub fn new_mac_with(config: MacConfig) -> TestMac {
    Mac::new(MockDevice::new(7), Recorder::default(), config)
}

pub fn app_key() -> AESKey {
    AESKey::new(APP_KEY)
}

pub fn join_params() -> JoinParams {
    JoinParams {
        dev_eui: DEV_EUI,
        app_eui: APP_EUI,
        app_key: app_key(),
        datarate: 0,
    }
}

/// Join accept as the network sends it: MIC over the plaintext, then AES decrypt
pub fn join_accept(
    app_key: &AESKey,
    dev_addr: u32,
    dl_settings: DlSettings,
    rx_delay: u8,
    cflist: Option<[u8; 16]>,
) -> Vec<u8> {
    let mut frame = vec![MType::JoinAccept.mhdr()];
    frame.extend_from_slice(&APP_NONCE);
    frame.extend_from_slice(&NET_ID);
    frame.extend_from_slice(&dev_addr.to_le_bytes());
    frame.push(dl_settings.to_byte());
    frame.push(rx_delay);
    if let Some(cflist) = cflist {
        frame.extend_from_slice(&cflist);
    }
    let mic = crypto::compute_join_mic(app_key, &frame);
    frame.extend_from_slice(&mic);

    let cipher = Aes128::new(GenericArray::from_slice(app_key.as_bytes()));
    for block in frame[1..].chunks_exact_mut(16) {
        cipher.decrypt_block(GenericArray::from_mut_slice(block));
    }
    frame
}

/// Hand a frame to the MAC as if the radio had just received it
pub fn deliver(mac: &mut TestMac, frame: &[u8], rssi: i16) {
    mac.device_mut().radio.rx_frame = Some(frame.to_vec());
    mac.handle_event(Event::RxDone { rssi }).unwrap();
}

/// End of transmission followed by the opening of RX1
pub fn open_rx1(mac: &mut TestMac) {
    mac.handle_event(Event::TxDone).unwrap();
    mac.handle_event(Event::RxWindowTimer).unwrap();
}

/// End of transmission and both receive windows passing in silence
pub fn silent_windows(mac: &mut TestMac) {
    open_rx1(mac);
    mac.handle_event(Event::RxWindowTimer).unwrap();
    mac.handle_event(Event::RxWindowTimer).unwrap();
}

/// Run a join to completion with the given join accept, returning the device nonce used
pub fn join_with(mac: &mut TestMac, accept: &[u8]) -> u16 {
    assert_eq!(mac.join(&join_params()), Ok(Status::Deferred));
    mac.handle_event(Event::RxWindowTimer).unwrap();
    let request = mac.device().radio.transmitted.last().unwrap().clone();
    let dev_nonce = u16::from_le_bytes([request[17], request[18]]);
    open_rx1(mac);
    deliver(mac, accept, -40);
    dev_nonce
}

/// Network view of a session
pub struct Session {
    pub dev_addr: DevAddr,
    pub nwk_skey: AESKey,
    pub app_skey: AESKey,
}

/// Parameters of a network-built downlink
pub struct Downlink<'a> {
    pub fcnt: u32,
    pub confirmed: bool,
    pub ack: bool,
    pub f_pending: bool,
    pub f_opts: &'a [u8],
    pub port: Option<u8>,
    pub payload: &'a [u8],
    pub dev_addr: Option<DevAddr>,
}

impl Default for Downlink<'_> {
    fn default() -> Self {
        Self {
            fcnt: 0,
            confirmed: false,
            ack: false,
            f_pending: false,
            f_opts: &[],
            port: None,
            payload: &[],
            dev_addr: None,
        }
    }
}

/// Uplink as the network decodes it
pub struct Uplink {
    pub frame: DataFrame,
    pub f_opts: Vec<u8>,
    pub payload: Vec<u8>,
    pub mic_ok: bool,
}

impl Session {
    pub fn downlink(&self, downlink: &Downlink<'_>) -> Vec<u8> {
        let dev_addr = downlink.dev_addr.unwrap_or(self.dev_addr);
        let f_ctrl = FCtrl {
            ack: downlink.ack,
            f_pending: downlink.f_pending,
            ..FCtrl::default()
        };
        let mut fhdr = FHDR::new(dev_addr, f_ctrl, downlink.fcnt);
        fhdr.f_opts.extend_from_slice(downlink.f_opts).unwrap();

        let key = if downlink.port == Some(0) {
            &self.nwk_skey
        } else {
            &self.app_skey
        };
        let mut payload = downlink.payload.to_vec();
        crypto::encrypt_payload(key, dev_addr, downlink.fcnt, Direction::Down, &mut payload);

        let mtype = if downlink.confirmed {
            MType::ConfirmedDataDown
        } else {
            MType::UnconfirmedDataDown
        };
        frame::encode_data_frame(
            mtype,
            &fhdr,
            downlink.fcnt,
            downlink.port,
            &payload,
            &self.nwk_skey,
            Direction::Down,
        )
        .unwrap()
        .to_vec()
    }

    pub fn decode_uplink(&self, bytes: &[u8]) -> Uplink {
        let frame = DataFrame::parse(bytes).unwrap();
        let fcnt = frame.f_cnt as u32;
        let mic_ok = frame.verify_mic(bytes, &self.nwk_skey, fcnt, Direction::Up);
        let mut payload = frame.payload(bytes).to_vec();
        crypto::encrypt_payload(&self.app_skey, frame.dev_addr, fcnt, Direction::Up, &mut payload);
        Uplink {
            f_opts: frame.f_opts(bytes).to_vec(),
            frame,
            payload,
            mic_ok,
        }
    }
}

/// MAC that completed an over-the-air activation with default settings
pub fn joined_mac() -> (TestMac, Session) {
    joined_mac_with(MacConfig::default(), DlSettings::default(), 1)
}

pub fn joined_mac_with(config: MacConfig, dl_settings: DlSettings, rx_delay: u8) -> (TestMac, Session) {
    let mut mac = new_mac_with(config);
    let accept = join_accept(&app_key(), DEV_ADDR, dl_settings, rx_delay, None);
    let dev_nonce = join_with(&mut mac, &accept);
    assert_eq!(
        mac.upper().mlme_confirms(),
        vec![MlmeConfirm::Join(lorawan_mac::lorawan::ConfirmStatus::Success)]
    );
    let (nwk_skey, app_skey) = crypto::derive_session_keys(&app_key(), &APP_NONCE, &NET_ID, dev_nonce);
    mac.upper_mut().notifications.clear();
    (
        mac,
        Session {
            dev_addr: DevAddr::from_u32(DEV_ADDR),
            nwk_skey,
            app_skey,
        },
    )
}

pub fn uplink(
    mac: &mut TestMac,
    data: &[u8],
    port: u8,
    confirmed: bool,
    datarate: u8,
) -> Result<Status, MacError<MockError>> {
    mac.mcps_request(&McpsRequest {
        data,
        port,
        confirmed,
        datarate: Some(datarate),
    })
}

pub fn last_tx(mac: &TestMac) -> Vec<u8> {
    mac.device().radio.transmitted.last().unwrap().clone()
}
