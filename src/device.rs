//! Hardware collaborators of the MAC
//!
//! The MAC drives a radio, three single-shot timers and a random source. Their
//! completions come back as [`Event`]s, delivered either directly through
//! [`Mac::handle_event`](crate::lorawan::mac::Mac::handle_event) or queued
//! and drained with [`Mac::poll`](crate::lorawan::mac::Mac::poll).

use embedded_hal::blocking::rng;
use heapless::Deque;

use crate::radio::traits::Radio;

/// Join duty-cycle backoff
pub mod backoff;

/// Single-shot timer
///
/// When the deadline passes the owner of the timer delivers the matching
/// [`Event`] to the MAC.
pub trait Timer {
    /// Arm the timer; a pending deadline is replaced
    fn arm(&mut self, millis: u32);

    /// Cancel the pending deadline, if any
    fn cancel(&mut self);
}

/// Hardware the MAC runs on
pub trait Device {
    /// Radio driver
    type Radio: Radio;
    /// Timer type used for receive windows, backoff ticks and off-times
    type Timer: Timer;
    /// Random source
    type Rng: rng::Read;

    /// Radio driver
    fn radio(&mut self) -> &mut Self::Radio;

    /// Timer driving receive windows, join jitter and retransmissions
    /// (delivers [`Event::RxWindowTimer`])
    fn rx_timer(&mut self) -> &mut Self::Timer;

    /// Timer driving the backoff clock (delivers [`Event::BackoffTick`])
    fn backoff_timer(&mut self) -> &mut Self::Timer;

    /// Timer ending the off-time imposed by DutyCycleReq
    /// (delivers [`Event::DutyCycleTimer`])
    fn duty_cycle_timer(&mut self) -> &mut Self::Timer;

    /// Random source
    fn rng(&mut self) -> &mut Self::Rng;
}

/// Draw a 32-bit value from a random source
pub fn next_u32<R: rng::Read>(rng: &mut R) -> Option<u32> {
    let mut bytes = [0u8; 4];
    rng.read(&mut bytes).ok()?;
    Some(u32::from_le_bytes(bytes))
}

/// Something that happened outside the MAC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// The radio finished transmitting
    TxDone,
    /// The radio received a frame; read it with [`Radio::receive`]
    RxDone {
        /// Signal strength of the frame in dBm
        rssi: i16,
    },
    /// The radio gave up waiting for a preamble
    RxTimeout,
    /// The receive-window timer expired
    RxWindowTimer,
    /// The backoff timer expired
    BackoffTick,
    /// The off-time timer expired
    DutyCycleTimer,
}

/// Source of pending events
pub trait EventQueue {
    /// Take the oldest pending event
    fn dequeue(&mut self) -> Option<Event>;
}

impl<const N: usize> EventQueue for Deque<Event, N> {
    fn dequeue(&mut self) -> Option<Event> {
        self.pop_front()
    }
}
