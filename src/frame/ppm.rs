//! # PPM Frame Encoder
//!
//! Builds a PPM pulse train from channel pulse widths.
//!
//! ## Frame Layout
//!
//! ```text
//!  ch1 high   gap   ch2 high   gap        chN high   gap        sync (low)
//! ┌────────┐      ┌────────┐           ┌────────┐
//! │        │______│        │___ ... ___│        │______________________________
//! ```
//!
//! - Each channel occupies `pulse_us` in total: `pulse_us - GAP_US` high, then
//!   `GAP_US` low. The high part never drops below `MIN_ACTIVE_US`.
//! - The sync period fills the rest of the nominal frame length and never drops
//!   below `SYNC_FLOOR_US`; receivers detect the frame start from it.
//! - Channel identity is purely positional.

use super::{Frame, FrameEncoder, OutputMode};
use crate::error::{BridgeError, Result};

/// Default nominal frame length in microseconds (20 ms).
pub const PPM_FRAME_LENGTH_US: u32 = 20_000;

/// Default low gap after every channel pulse.
pub const PPM_GAP_US: u32 = 300;

/// Default shortest high period emitted for a channel.
pub const PPM_MIN_ACTIVE_US: u32 = 100;

/// Default shortest sync period.
pub const PPM_SYNC_FLOOR_US: u32 = 8_000;

/// Maximum number of channels in one PPM frame.
pub const PPM_MAX_CHANNELS: usize = 16;

/// Timing parameters of the PPM pulse train.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PpmTiming {
    pub frame_length_us: u32,
    pub gap_us: u32,
    pub min_active_us: u32,
    pub sync_floor_us: u32,
}

impl Default for PpmTiming {
    fn default() -> Self {
        Self {
            frame_length_us: PPM_FRAME_LENGTH_US,
            gap_us: PPM_GAP_US,
            min_active_us: PPM_MIN_ACTIVE_US,
            sync_floor_us: PPM_SYNC_FLOOR_US,
        }
    }
}

/// One channel slot: active-high time followed by the low gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PpmPulse {
    pub high_us: u32,
    pub low_us: u32,
}

impl PpmPulse {
    #[must_use]
    pub fn total_us(&self) -> u32 {
        self.high_us + self.low_us
    }
}

/// A complete PPM frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PpmFrame {
    pub pulses: Vec<PpmPulse>,
    pub sync_us: u32,
}

impl PpmFrame {
    /// Time spent in channel slots (excluding sync).
    #[must_use]
    pub fn channels_us(&self) -> u32 {
        self.pulses.iter().map(PpmPulse::total_us).sum()
    }

    /// Total frame duration including sync.
    #[must_use]
    pub fn total_us(&self) -> u32 {
        self.channels_us() + self.sync_us
    }
}

/// PPM encoder.
///
/// # Examples
///
/// ```
/// use trainer_bridge::frame::{Frame, FrameEncoder, PpmEncoder, PpmTiming};
///
/// let encoder = PpmEncoder::new(PpmTiming::default());
/// let Frame::Ppm(frame) = encoder.encode(&[1500; 8])? else { unreachable!() };
///
/// assert_eq!(frame.pulses[0].high_us, 1200);
/// assert_eq!(frame.pulses[0].low_us, 300);
/// assert_eq!(frame.sync_us, 8000);
/// # Ok::<(), trainer_bridge::error::BridgeError>(())
/// ```
#[derive(Debug, Clone)]
pub struct PpmEncoder {
    timing: PpmTiming,
}

impl PpmEncoder {
    #[must_use]
    pub fn new(timing: PpmTiming) -> Self {
        Self { timing }
    }

    #[must_use]
    pub fn timing(&self) -> &PpmTiming {
        &self.timing
    }

    /// Builds the pulse train without wrapping it in [`Frame`].
    ///
    /// # Errors
    ///
    /// Returns `Encoding` error for an empty channel set or more than
    /// [`PPM_MAX_CHANNELS`] channels.
    pub fn build(&self, pulses: &[u16]) -> Result<PpmFrame> {
        if pulses.is_empty() {
            return Err(BridgeError::Encoding("PPM frame needs at least one channel".to_string()));
        }
        if pulses.len() > PPM_MAX_CHANNELS {
            return Err(BridgeError::Encoding(format!(
                "PPM frame supports at most {} channels, got {}",
                PPM_MAX_CHANNELS,
                pulses.len()
            )));
        }

        let timing = &self.timing;
        let slots: Vec<PpmPulse> = pulses
            .iter()
            .map(|&pulse_us| PpmPulse {
                high_us: u32::from(pulse_us)
                    .saturating_sub(timing.gap_us)
                    .max(timing.min_active_us),
                low_us: timing.gap_us,
            })
            .collect();

        let used: u32 = slots.iter().map(PpmPulse::total_us).sum();
        let sync_us = timing
            .frame_length_us
            .saturating_sub(used)
            .max(timing.sync_floor_us);

        Ok(PpmFrame {
            pulses: slots,
            sync_us,
        })
    }
}

impl FrameEncoder for PpmEncoder {
    fn mode(&self) -> OutputMode {
        OutputMode::Ppm
    }

    fn encode(&self, pulses: &[u16]) -> Result<Frame> {
        self.build(pulses).map(Frame::Ppm)
    }
}
