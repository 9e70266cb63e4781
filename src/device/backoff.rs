//! Join duty-cycle backoff
//!
//! Airtime is rationed per tier after power-up:
//! - first hour: 36 s
//! - following ten hours: 36 s
//! - every following day: 8.7 s
//!
//! The tier clock advances on an hourly tick driven by the backoff timer.

/// Backoff tick period in milliseconds (one hour)
pub const BACKOFF_TICK_MS: u32 = 3_600_000;

/// Airtime rationing tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BackoffTier {
    /// First hour after start-up
    First,
    /// Hours 1 to 11
    Second,
    /// Every 24 hours afterwards
    Third,
}

impl BackoffTier {
    /// Length of the tier in ticks
    pub fn ticks(self) -> u8 {
        match self {
            BackoffTier::First => 1,
            BackoffTier::Second => 10,
            BackoffTier::Third => 24,
        }
    }

    /// Airtime budget granted when the tier starts, in microseconds
    pub fn budget_us(self) -> u32 {
        match self {
            BackoffTier::First => 36_000_000,
            BackoffTier::Second => 36_000_000,
            BackoffTier::Third => 8_700_000,
        }
    }

    fn next(self) -> Self {
        match self {
            BackoffTier::First => BackoffTier::Second,
            BackoffTier::Second | BackoffTier::Third => BackoffTier::Third,
        }
    }
}

/// Backoff bookkeeping
///
/// A fresh state has no tier; the first [`tick`](Self::tick) enters
/// [`BackoffTier::First`].
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BackoffState {
    tier: Option<BackoffTier>,
    remaining_ticks: u8,
    budget_us: u32,
}

impl BackoffState {
    /// State before the first tick
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the tier clock by one tick
    ///
    /// When the current tier has run out, the next one starts with a fresh
    /// budget; the tick is then counted against it.
    pub fn tick(&mut self) {
        if self.remaining_ticks == 0 {
            let tier = self.tier.map_or(BackoffTier::First, BackoffTier::next);
            if self.tier != Some(tier) {
                debug!("backoff tier {}", tier);
            }
            self.tier = Some(tier);
            self.remaining_ticks = tier.ticks();
            self.budget_us = tier.budget_us();
        }
        self.remaining_ticks -= 1;
    }

    /// Charge a transmission's time on air against the budget
    pub fn debit(&mut self, time_on_air_us: u32) {
        self.budget_us = self.budget_us.saturating_sub(time_on_air_us);
    }

    /// Whether the budget covers a transmission of the given airtime
    pub fn allows(&self, time_on_air_us: u32) -> bool {
        self.budget_us >= time_on_air_us
    }

    /// Remaining airtime in microseconds
    pub fn budget_us(&self) -> u32 {
        self.budget_us
    }

    /// Current tier, if the clock has started
    pub fn tier(&self) -> Option<BackoffTier> {
        self.tier
    }

    /// Ticks left in the current tier
    pub fn remaining_ticks(&self) -> u8 {
        self.remaining_ticks
    }
}
