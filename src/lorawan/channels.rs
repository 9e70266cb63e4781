use core::marker::PhantomData;

use super::region::{Region, MAX_CHANNELS};

/// Size of the optional channel list carried by a join accept
pub const CFLIST_SIZE: usize = 16;

const CFLIST_ENTRIES: usize = 5;

/// Uplink channel plan
///
/// Holds up to [`MAX_CHANNELS`] frequencies. Every populated entry is valid for
/// the region; the set only grows until [`ChannelSet::reset`].
#[derive(Debug, Clone)]
pub struct ChannelSet<REG: Region> {
    channels: [Option<u32>; MAX_CHANNELS],
    region: PhantomData<REG>,
}

impl<REG: Region> Default for ChannelSet<REG> {
    fn default() -> Self {
        Self::new()
    }
}

impl<REG: Region> ChannelSet<REG> {
    /// Channel set holding the region's default channels
    pub fn new() -> Self {
        let mut set = Self {
            channels: [None; MAX_CHANNELS],
            region: PhantomData,
        };
        set.reset();
        set
    }

    /// Restore the region's default channels and drop everything else
    pub fn reset(&mut self) {
        self.channels = [None; MAX_CHANNELS];
        for (slot, &frequency) in self.channels.iter_mut().zip(REG::DEFAULT_CHANNELS) {
            *slot = Some(frequency);
        }
    }

    /// Frequency at a channel index
    pub fn get(&self, index: usize) -> Option<u32> {
        self.channels.get(index).copied().flatten()
    }

    /// Define a channel. The region's default channels cannot be redefined.
    ///
    /// Returns whether the channel was accepted.
    pub fn set(&mut self, index: usize, frequency: u32) -> bool {
        if index < REG::DEFAULT_CHANNELS.len() || index >= MAX_CHANNELS {
            return false;
        }
        if !REG::validate_frequency(frequency) {
            return false;
        }
        self.channels[index] = Some(frequency);
        true
    }

    /// Number of populated channels
    pub fn len(&self) -> usize {
        self.channels.iter().flatten().count()
    }

    /// Whether no channel is populated
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Populated frequencies in index order
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.channels.iter().flatten().copied()
    }

    /// Pick an uplink frequency from a random draw
    ///
    /// The draw is reduced with `1 + random % count` and the populated entries
    /// are walked until that many have been seen. The modulo reduction is
    /// slightly biased towards low indices when `count` does not divide 2^32.
    pub fn pick_channel(&self, random: u32) -> Option<u32> {
        let count = self.len() as u32;
        if count == 0 {
            return None;
        }
        let index = 1 + random % count;
        self.iter().nth((index - 1) as usize)
    }

    /// Apply the channel list of a join accept
    ///
    /// Five 24-bit little-endian frequencies in units of 100 Hz land on the
    /// indices right after the default channels. Zero or out-of-band entries
    /// leave their slot untouched.
    pub fn apply_cflist(&mut self, cflist: &[u8; CFLIST_SIZE]) {
        let first = REG::DEFAULT_CHANNELS.len();
        for (i, entry) in cflist.chunks_exact(3).take(CFLIST_ENTRIES).enumerate() {
            let frequency = u32::from_le_bytes([entry[0], entry[1], entry[2], 0]) * 100;
            if frequency == 0 {
                continue;
            }
            if !self.set(first + i, frequency) {
                debug!("cflist entry {} rejected", i);
            }
        }
    }
}
