//! # SBUS Frame Encoder
//!
//! Encodes 16 channels into a 25-byte SBUS frame.
//!
//! ## Frame Layout
//!
//! | Byte | Content |
//! |------|---------|
//! | 0 | Header `0x0F` |
//! | 1-22 | 16 channels × 11 bits, packed LSB first |
//! | 23 | Flags (CH17, CH18, frame lost, failsafe) - always `0x00` here |
//! | 24 | Footer `0x00` |
//!
//! Pulse widths are scaled linearly from `[MIN, MAX]` to `[172, 1811]`.
//! The serial line runs at 100 000 baud; the encoder only builds bytes.

use super::{Frame, FrameEncoder, OutputMode};
use crate::curve::PulseRange;
use crate::error::{BridgeError, Result};

/// SBUS frame header byte
pub const SBUS_HEADER: u8 = 0x0F;

/// SBUS frame footer byte
pub const SBUS_FOOTER: u8 = 0x00;

/// Complete frame size in bytes
pub const SBUS_FRAME_SIZE: usize = 25;

/// Packed channel payload size (16 channels × 11 bits = 176 bits = 22 bytes)
pub const SBUS_PAYLOAD_SIZE: usize = 22;

/// Number of proportional channels
pub const SBUS_NUM_CHANNELS: usize = 16;

/// Bits per channel value
pub const SBUS_CHANNEL_BITS: usize = 11;

/// Channel value range used for the pulse domain
pub const SBUS_VALUE_MIN: u16 = 172;
pub const SBUS_VALUE_MAX: u16 = 1811;

/// Largest value representable in 11 bits
pub const SBUS_VALUE_LIMIT: u16 = 0x7FF;

/// Standard SBUS line rate
pub const SBUS_BAUD_RATE: u32 = 100_000;

/// Flag bits (byte 23)
pub const SBUS_FLAG_CH17: u8 = 0x01;
pub const SBUS_FLAG_CH18: u8 = 0x02;
pub const SBUS_FLAG_FRAME_LOST: u8 = 0x04;
pub const SBUS_FLAG_FAILSAFE: u8 = 0x08;

/// Channel values array type (16 channels, 11-bit values)
pub type SbusChannels = [u16; SBUS_NUM_CHANNELS];

/// A complete 25-byte SBUS frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SbusFrame([u8; SBUS_FRAME_SIZE]);

impl SbusFrame {
    /// Assembles a frame from 16 channel values (clamped to 11 bits).
    #[must_use]
    pub fn from_channels(channels: &SbusChannels) -> Self {
        let mut bytes = [0u8; SBUS_FRAME_SIZE];
        bytes[0] = SBUS_HEADER;
        bytes[1..=SBUS_PAYLOAD_SIZE].copy_from_slice(&pack_channels(channels));
        bytes[SBUS_PAYLOAD_SIZE + 1] = 0;
        bytes[SBUS_FRAME_SIZE - 1] = SBUS_FOOTER;
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; SBUS_FRAME_SIZE] {
        &self.0
    }

    #[must_use]
    pub fn flags(&self) -> u8 {
        self.0[SBUS_PAYLOAD_SIZE + 1]
    }
}

/// Maps a pulse width to an SBUS channel value.
///
/// `round(clamp(172 + (pulse - MIN) * (1811 - 172) / (MAX - MIN), 172, 1811))`
///
/// # Examples
///
/// ```
/// use trainer_bridge::curve::PulseRange;
/// use trainer_bridge::frame::sbus::pulse_to_sbus;
///
/// let range = PulseRange::default();
/// assert_eq!(pulse_to_sbus(988, &range), 172);
/// assert_eq!(pulse_to_sbus(1500, &range), 992);
/// assert_eq!(pulse_to_sbus(2012, &range), 1811);
/// ```
#[must_use]
pub fn pulse_to_sbus(pulse_us: u16, range: &PulseRange) -> u16 {
    let min = f64::from(range.min_us);
    let span = f64::from(range.max_us) - min;
    if span <= 0.0 {
        return (SBUS_VALUE_MIN + SBUS_VALUE_MAX) / 2;
    }

    let out_min = f64::from(SBUS_VALUE_MIN);
    let out_max = f64::from(SBUS_VALUE_MAX);
    let scaled = out_min + (f64::from(pulse_us) - min) * (out_max - out_min) / span;
    scaled.clamp(out_min, out_max).round() as u16
}

/// Packs 16 channels (11 bits each) into 22 bytes.
///
/// Channels are packed as a continuous bitstream, LSB first:
/// ```text
/// Byte 0: Ch1[0:7]
/// Byte 1: Ch1[8:10] | Ch2[0:4]
/// Byte 2: Ch2[5:10] | Ch3[0:1]
/// ...
/// ```
#[must_use]
pub fn pack_channels(channels: &SbusChannels) -> [u8; SBUS_PAYLOAD_SIZE] {
    let mut payload = [0u8; SBUS_PAYLOAD_SIZE];
    let mut bit_index = 0;

    for &channel in channels {
        let value = channel.min(SBUS_VALUE_LIMIT);
        for bit in 0..SBUS_CHANNEL_BITS {
            if (value >> bit) & 1 == 1 {
                payload[bit_index / 8] |= 1 << (bit_index % 8);
            }
            bit_index += 1;
        }
    }

    payload
}

/// SBUS encoder.
///
/// Fewer than 16 pulses are padded with the neutral pulse width.
#[derive(Debug, Clone)]
pub struct SbusEncoder {
    range: PulseRange,
}

impl SbusEncoder {
    #[must_use]
    pub fn new(range: PulseRange) -> Self {
        Self { range }
    }

    /// Converts pulse widths to the 16 SBUS channel values.
    ///
    /// # Errors
    ///
    /// Returns `Encoding` error when more than 16 pulses are given.
    pub fn channel_values(&self, pulses: &[u16]) -> Result<SbusChannels> {
        if pulses.len() > SBUS_NUM_CHANNELS {
            return Err(BridgeError::Encoding(format!(
                "SBUS carries {} channels, got {}",
                SBUS_NUM_CHANNELS,
                pulses.len()
            )));
        }

        let neutral = pulse_to_sbus(self.range.mid_us, &self.range);
        let mut channels = [neutral; SBUS_NUM_CHANNELS];
        for (slot, &pulse) in channels.iter_mut().zip(pulses) {
            *slot = pulse_to_sbus(pulse, &self.range);
        }
        Ok(channels)
    }
}

impl FrameEncoder for SbusEncoder {
    fn mode(&self) -> OutputMode {
        OutputMode::Sbus
    }

    fn encode(&self, pulses: &[u16]) -> Result<Frame> {
        let channels = self.channel_values(pulses)?;
        Ok(Frame::Sbus(SbusFrame::from_channels(&channels)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reads channel `n` back out of a packed payload
    fn unpack(payload: &[u8], n: usize) -> u16 {
        let mut value = 0u16;
        for bit in 0..SBUS_CHANNEL_BITS {
            let index = n * SBUS_CHANNEL_BITS + bit;
            if payload[index / 8] >> (index % 8) & 1 == 1 {
                value |= 1 << bit;
            }
        }
        value
    }

    fn encode(pulses: &[u16]) -> SbusFrame {
        match SbusEncoder::new(PulseRange::default()).encode(pulses).unwrap() {
            Frame::Sbus(frame) => frame,
            other => panic!("Expected SBUS frame, got {:?}", other),
        }
    }

    // ==================== Scaling Tests ====================

    #[test]
    fn test_pulse_to_sbus_reference_points() {
        let range = PulseRange::default();
        assert_eq!(pulse_to_sbus(988, &range), SBUS_VALUE_MIN);
        assert_eq!(pulse_to_sbus(1500, &range), 992);
        assert_eq!(pulse_to_sbus(2012, &range), SBUS_VALUE_MAX);
    }

    #[test]
    fn test_pulse_to_sbus_clamps() {
        let range = PulseRange::default();
        assert_eq!(pulse_to_sbus(500, &range), SBUS_VALUE_MIN);
        assert_eq!(pulse_to_sbus(2500, &range), SBUS_VALUE_MAX);
    }

    #[test]
    fn test_pulse_to_sbus_monotonic_and_in_range() {
        let range = PulseRange::default();
        let mut previous = 0;
        for pulse in 988..=2012 {
            let value = pulse_to_sbus(pulse, &range);
            assert!((SBUS_VALUE_MIN..=SBUS_VALUE_MAX).contains(&value));
            assert!(value >= previous);
            previous = value;
        }
    }

    // ==================== Packing Tests ====================

    #[test]
    fn test_pack_all_zeros() {
        assert_eq!(pack_channels(&[0; 16]), [0u8; 22]);
    }

    #[test]
    fn test_pack_all_max() {
        // 16 channels × 11 bits = 176 bits = 22 bytes, no padding
        assert_eq!(pack_channels(&[SBUS_VALUE_LIMIT; 16]), [0xFFu8; 22]);
    }

    #[test]
    fn test_pack_first_channel() {
        let mut channels = [0u16; 16];
        channels[0] = 0x7FF;
        let payload = pack_channels(&channels);
        assert_eq!(payload[0], 0xFF);
        assert_eq!(payload[1], 0x07);
        assert!(payload[2..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_pack_last_channel() {
        let mut channels = [0u16; 16];
        channels[15] = 0x7FF;
        let payload = pack_channels(&channels);
        // Channel 16 occupies bits 165..176: top 3 bits of byte 20 and byte 21
        assert_eq!(payload[20], 0xE0);
        assert_eq!(payload[21], 0xFF);
    }

    #[test]
    fn test_pack_clamps_to_eleven_bits() {
        let mut channels = [0u16; 16];
        channels[0] = 5000;
        let payload = pack_channels(&channels);
        assert_eq!(unpack(&payload, 0), SBUS_VALUE_LIMIT);
        assert_eq!(unpack(&payload, 1), 0);
    }

    #[test]
    fn test_pack_distinct_values() {
        let channels: SbusChannels = core::array::from_fn(|i| 172 + 100 * i as u16);
        let payload = pack_channels(&channels);
        for (i, &expected) in channels.iter().enumerate() {
            assert_eq!(unpack(&payload, i), expected, "channel {}", i + 1);
        }
    }

    // ==================== Frame Tests ====================

    #[test]
    fn test_frame_structure_for_any_input() {
        for pulses in [vec![988u16; 16], vec![2012; 16], vec![1500; 8], vec![], vec![0, 65535]] {
            let frame = encode(&pulses);
            let bytes = frame.as_bytes();
            assert_eq!(bytes.len(), SBUS_FRAME_SIZE);
            assert_eq!(bytes[0], SBUS_HEADER);
            assert_eq!(bytes[23], 0x00);
            assert_eq!(bytes[24], SBUS_FOOTER);
            assert_eq!(frame.flags(), 0);
        }
    }

    #[test]
    fn test_short_channel_set_padded_with_neutral() {
        let frame = encode(&[988, 2012]);
        let payload = &frame.as_bytes()[1..23];
        assert_eq!(unpack(payload, 0), 172);
        assert_eq!(unpack(payload, 1), 1811);
        for n in 2..16 {
            assert_eq!(unpack(payload, n), 992);
        }
    }

    #[test]
    fn test_too_many_channels_rejected() {
        let encoder = SbusEncoder::new(PulseRange::default());
        assert!(matches!(encoder.encode(&[1500; 17]), Err(BridgeError::Encoding(_))));
    }

    #[test]
    fn test_constants() {
        assert_eq!(SBUS_BAUD_RATE, 100_000);
        assert_eq!(SBUS_NUM_CHANNELS * SBUS_CHANNEL_BITS, SBUS_PAYLOAD_SIZE * 8);
        assert_eq!(SBUS_FLAG_CH17 | SBUS_FLAG_CH18 | SBUS_FLAG_FRAME_LOST | SBUS_FLAG_FAILSAFE, 0x0F);
    }
}
