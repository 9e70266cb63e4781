//! Class A receive windows
//!
//! Every uplink is followed by two short receive windows. RX1 opens on the
//! uplink frequency after the RX1 delay; RX2 opens one second later on the
//! fixed RX2 channel. A join exchange uses the longer join accept delays.

use crate::device::backoff::BACKOFF_TICK_MS;
use crate::device::{Device, Event, EventQueue, Timer};
use crate::lorawan::frame::{MType, MAX_FRAME_SIZE};
use crate::lorawan::mac::{Error, Mac, MacError, MacState};
use crate::lorawan::phy;
use crate::lorawan::region::Region;
use crate::radio::traits::Radio;
use crate::upper::Upper;

impl<D: Device, U: Upper, REG: Region> Mac<D, U, REG> {
    /// Feed a hardware event into the MAC
    ///
    /// Events that do not fit the current state are ignored. A radio error
    /// ends the exchange in flight as if nothing had been received and is then
    /// returned.
    pub fn handle_event(&mut self, event: Event) -> Result<(), Error<D>> {
        trace!("event {} in {}", event, self.ctx.state);
        match event {
            Event::TxDone => self.on_tx_done(),
            Event::RxDone { rssi } => self.on_rx_done(rssi),
            Event::RxTimeout => self.on_rx_timeout(),
            Event::RxWindowTimer => self.on_rx_window_timer(),
            Event::BackoffTick => {
                self.ctx.backoff.tick();
                self.device.backoff_timer().arm(BACKOFF_TICK_MS);
                Ok(())
            }
            Event::DutyCycleTimer => self.on_off_time_elapsed(),
        }
    }

    /// Handle the next queued event, if any
    pub fn poll<Q: EventQueue>(&mut self, queue: &mut Q) -> nb::Result<(), Error<D>> {
        let event = queue.dequeue().ok_or(nb::Error::WouldBlock)?;
        self.handle_event(event).map_err(nb::Error::Other)
    }

    fn on_tx_done(&mut self) -> Result<(), Error<D>> {
        if self.ctx.state != MacState::Transmitting {
            return Ok(());
        }
        self.sleep_radio();

        let timing = self.config.timing;
        let delay_s = if self.ctx.activation.is_activated() {
            self.ctx.rx_delay as u32
        } else {
            timing.join_accept_delay1
        };
        self.ctx.rx1_opened = false;
        self.set_state(MacState::RxWindow1);
        self.device.rx_timer().arm(delay_s * 1000);
        Ok(())
    }

    fn on_rx_window_timer(&mut self) -> Result<(), Error<D>> {
        let result = match self.ctx.state {
            MacState::JoinDelay => self.send_join_request(),
            MacState::RetransmitDelay if self.ctx.off_time => {
                debug!("retransmission held for the off-time");
                self.ctx.retransmit_pending = true;
                Ok(())
            }
            MacState::RetransmitDelay => self.retransmit(),
            MacState::RxWindow1 if !self.ctx.rx1_opened => self.open_rx1(),
            MacState::RxWindow1 => self.open_rx2(),
            MacState::RxWindow2 => {
                self.sleep_radio();
                self.no_rx();
                Ok(())
            }
            MacState::Idle | MacState::Transmitting => Ok(()),
        };
        self.abort_on_error(result)
    }

    fn on_off_time_elapsed(&mut self) -> Result<(), Error<D>> {
        self.ctx.off_time = false;
        if self.ctx.state != MacState::RetransmitDelay
            || !core::mem::take(&mut self.ctx.retransmit_pending)
        {
            return Ok(());
        }
        let result = self.retransmit();
        self.abort_on_error(result)
    }

    /// A failed step ends the exchange as if nothing had been received
    fn abort_on_error(&mut self, result: Result<(), Error<D>>) -> Result<(), Error<D>> {
        if result.is_err() {
            warn!("exchange aborted in {}", self.ctx.state);
            self.sleep_radio();
            self.device.rx_timer().cancel();
            self.no_rx();
        }
        result
    }

    fn open_rx1(&mut self) -> Result<(), Error<D>> {
        let dr = REG::rx1_datarate(self.ctx.last_dr, self.rx1_offset());
        self.open_window(self.ctx.last_frequency, dr)?;
        self.ctx.rx1_opened = true;

        let timing = self.config.timing;
        let gap_s = if self.ctx.activation.is_activated() {
            timing.rx2_delay.saturating_sub(timing.rx1_delay)
        } else {
            timing.join_accept_delay2.saturating_sub(timing.join_accept_delay1)
        };
        self.device.rx_timer().arm(gap_s * 1000);
        Ok(())
    }

    fn open_rx2(&mut self) -> Result<(), Error<D>> {
        let (frequency, dr) = if self.ctx.activation.is_activated() {
            (self.ctx.rx2_frequency, self.ctx.rx2_datarate)
        } else {
            (REG::RX2_FREQUENCY, REG::RX2_DATARATE)
        };
        self.set_state(MacState::RxWindow2);
        self.open_window(frequency, dr)?;
        self.device.rx_timer().arm(self.config.rx_window_ms);
        Ok(())
    }

    fn open_window(&mut self, frequency: u32, dr: u8) -> Result<(), Error<D>> {
        let config = phy::rx_config::<REG>(frequency, dr, self.config.rx_symbol_timeout)
            .ok_or(MacError::InvalidArgument)?;
        trace!("rx on {=u32} dr{=u8}", frequency, dr);
        self.device
            .radio()
            .configure_rx(config)
            .map_err(MacError::Radio)
    }

    fn rx1_offset(&self) -> u8 {
        if self.ctx.activation.is_activated() {
            self.ctx.rx1_dr_offset
        } else {
            0
        }
    }

    fn on_rx_timeout(&mut self) -> Result<(), Error<D>> {
        match self.ctx.state {
            // RX2 is opened by the window timer
            MacState::RxWindow1 => self.sleep_radio(),
            MacState::RxWindow2 => {
                self.device.rx_timer().cancel();
                self.sleep_radio();
                self.no_rx();
            }
            _ => {}
        }
        Ok(())
    }

    fn on_rx_done(&mut self, rssi: i16) -> Result<(), Error<D>> {
        if !matches!(self.ctx.state, MacState::RxWindow1 | MacState::RxWindow2) {
            return Ok(());
        }

        let mut buffer = [0u8; MAX_FRAME_SIZE];
        let received = self.device.radio().receive(&mut buffer);
        self.sleep_radio();
        let len = match received {
            Ok(len) => len.min(buffer.len()),
            Err(e) => {
                warn!("radio receive failed");
                self.device.rx_timer().cancel();
                self.no_rx();
                return Err(MacError::Radio(e));
            }
        };
        let frame = &mut buffer[..len];

        let joining = !self.ctx.activation.is_activated();
        match frame.first().map(|&mhdr| MType::from_mhdr(mhdr)) {
            Some(MType::JoinAccept) if joining => self.process_join_accept(frame),
            Some(MType::UnconfirmedDataDown | MType::ConfirmedDataDown) if !joining => {
                self.process_downlink(frame, rssi);
            }
            _ => debug!("frame dropped in {}", self.ctx.state),
        }
        Ok(())
    }

    /// Both windows passed without an acceptable frame
    pub(crate) fn no_rx(&mut self) {
        self.set_state(MacState::Idle);
        self.mlme_no_rx();
        if self.ctx.activation.is_activated() && self.ctx.busy {
            self.mcps_no_rx();
        }
    }
}
