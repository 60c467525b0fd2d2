//! # Curve Engine
//!
//! Shapes a normalized control reading into a pulse width in microseconds.
//!
//! ## Pipeline
//!
//! 1. Deadzone: readings within the deadzone map to center, the rest is
//!    rescaled to the full range (disabled by default).
//! 2. Expo: `adjusted = (1 - expo) * raw + expo * raw³`
//! 3. Linear scale: `pulse = MIN + (adjusted + 1) / 2 * (MAX - MIN)`
//! 4. Trim: `pulse += trim`
//! 5. Clamp to `[MIN, MAX]` and round to the nearest microsecond.
//!
//! - `expo = 0.0`: linear response (exact identity)
//! - `expo = 0.3`: mild curve
//! - `expo = 0.7`: strong curve
//!
//! ## Usage
//!
//! ```
//! use trainer_bridge::curve::{shape, CurveParams, PulseRange};
//!
//! let range = PulseRange::default();
//! let params = CurveParams::linear();
//!
//! assert_eq!(shape(1.0, &params, &range), 2012);
//! assert_eq!(shape(0.0, &params, &range), 1500);
//! assert_eq!(shape(-1.0, &params, &range), 988);
//! ```

/// Default minimum pulse width in microseconds.
pub const MIN_PULSE_US: u16 = 988;
/// Default neutral pulse width in microseconds.
pub const MID_PULSE_US: u16 = 1500;
/// Default maximum pulse width in microseconds.
pub const MAX_PULSE_US: u16 = 2012;

/// Upper bound for the configurable deadzone.
pub const MAX_DEADZONE: f32 = 0.25;

/// Pulse width domain shared by every channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseRange {
    pub min_us: u16,
    pub mid_us: u16,
    pub max_us: u16,
}

impl Default for PulseRange {
    fn default() -> Self {
        Self {
            min_us: MIN_PULSE_US,
            mid_us: MID_PULSE_US,
            max_us: MAX_PULSE_US,
        }
    }
}

impl PulseRange {
    /// Clamps a pulse width into this range.
    #[inline]
    #[must_use]
    pub fn clamp(&self, pulse_us: u16) -> u16 {
        pulse_us.clamp(self.min_us, self.max_us)
    }

    /// Width of the range in microseconds.
    #[inline]
    #[must_use]
    pub fn span(&self) -> u16 {
        self.max_us - self.min_us
    }
}

/// Per-channel response shaping parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurveParams {
    /// Offset added after shaping, in microseconds.
    pub trim_us: i32,
    /// Exponential curve factor (0.0 to just below 1.0).
    pub expo: f32,
    /// Deadzone as a fraction of full deflection (0.0 to 0.25).
    pub deadzone: f32,
}

impl Default for CurveParams {
    fn default() -> Self {
        Self::linear()
    }
}

impl CurveParams {
    /// Creates curve parameters; expo and deadzone are clamped to their valid ranges.
    ///
    /// # Examples
    ///
    /// ```
    /// use trainer_bridge::curve::CurveParams;
    ///
    /// let params = CurveParams::new(10, 0.3, 0.0);
    /// assert_eq!(params.trim_us, 10);
    /// ```
    #[must_use]
    pub fn new(trim_us: i32, expo: f32, deadzone: f32) -> Self {
        Self {
            trim_us,
            expo: expo.clamp(0.0, 1.0),
            deadzone: deadzone.clamp(0.0, MAX_DEADZONE),
        }
    }

    /// No trim, no expo, no deadzone.
    #[must_use]
    pub fn linear() -> Self {
        Self {
            trim_us: 0,
            expo: 0.0,
            deadzone: 0.0,
        }
    }
}

/// Applies the expo curve to a normalized value.
///
/// Odd function: the sign of the input is always preserved, and `expo <= 0`
/// returns the input unchanged.
///
/// # Examples
///
/// ```
/// use trainer_bridge::curve::apply_expo;
///
/// assert_eq!(apply_expo(0.5, 0.0), 0.5);
/// assert!((apply_expo(0.5, 1.0) - 0.125).abs() < 1e-6);
/// ```
#[inline]
#[must_use]
pub fn apply_expo(value: f32, expo: f32) -> f32 {
    if expo <= 0.0 {
        value
    } else {
        (1.0 - expo) * value + expo * value * value * value
    }
}

/// Applies a symmetric deadzone to a normalized value.
#[inline]
#[must_use]
pub fn apply_deadzone(value: f32, deadzone: f32) -> f32 {
    if deadzone <= 0.0 {
        return value;
    }
    let magnitude = value.abs();
    if magnitude <= deadzone {
        0.0
    } else {
        value.signum() * (magnitude - deadzone) / (1.0 - deadzone)
    }
}

/// Shapes a raw normalized reading into a pulse width.
///
/// The reading is clamped to `[-1.0, 1.0]` first; a NaN reading is treated as
/// center. Inversion must already have been applied by the caller.
#[must_use]
pub fn shape(raw: f32, params: &CurveParams, range: &PulseRange) -> u16 {
    let raw = if raw.is_nan() { 0.0 } else { raw.clamp(-1.0, 1.0) };
    let adjusted = apply_expo(apply_deadzone(raw, params.deadzone), params.expo);

    let min = f32::from(range.min_us);
    let max = f32::from(range.max_us);
    let pulse = min + (adjusted + 1.0) / 2.0 * (max - min) + params.trim_us as f32;

    pulse.clamp(min, max).round() as u16
}

/// Pulse width for a channel whose control may be absent.
///
/// Absent readings (unused channel, disconnected device) yield the neutral
/// pulse width without trim or expo.
#[inline]
#[must_use]
pub fn shape_or_neutral(raw: Option<f32>, params: &CurveParams, range: &PulseRange) -> u16 {
    match raw {
        Some(value) => shape(value, params, range),
        None => range.mid_us,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_pulse(v: f32) -> f32 {
        let min = f32::from(MIN_PULSE_US);
        let max = f32::from(MAX_PULSE_US);
        min + (v + 1.0) / 2.0 * (max - min)
    }

    // ==================== Expo Tests ====================

    #[test]
    fn test_expo_zero_is_identity() {
        for i in -100..=100 {
            let v = i as f32 / 100.0;
            assert_eq!(apply_expo(v, 0.0), v);
        }
    }

    #[test]
    fn test_expo_preserves_sign() {
        for expo in [0.1, 0.3, 0.7, 0.99] {
            for i in 1..=100 {
                let v = i as f32 / 100.0;
                assert!(apply_expo(v, expo) > 0.0);
                assert!(apply_expo(-v, expo) < 0.0);
            }
        }
    }

    #[test]
    fn test_expo_keeps_endpoints() {
        assert!((apply_expo(1.0, 0.7) - 1.0).abs() < 1e-6);
        assert!((apply_expo(-1.0, 0.7) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_expo_softens_center() {
        let v = 0.3;
        assert!(apply_expo(v, 0.5) < v);
        assert!(apply_expo(v, 0.9) < apply_expo(v, 0.5));
    }

    // ==================== Deadzone Tests ====================

    #[test]
    fn test_deadzone_zero_is_identity() {
        assert_eq!(apply_deadzone(0.01, 0.0), 0.01);
        assert_eq!(apply_deadzone(-0.7, 0.0), -0.7);
    }

    #[test]
    fn test_deadzone_suppresses_center() {
        assert_eq!(apply_deadzone(0.04, 0.05), 0.0);
        assert_eq!(apply_deadzone(-0.04, 0.05), 0.0);
        assert!((apply_deadzone(1.0, 0.05) - 1.0).abs() < 1e-6);
    }

    // ==================== Shape Tests ====================

    #[test]
    fn test_shape_concrete_endpoints() {
        let range = PulseRange::default();
        let params = CurveParams::linear();
        assert_eq!(shape(1.0, &params, &range), 2012);
        assert_eq!(shape(-1.0, &params, &range), 988);
        assert_eq!(shape(0.0, &params, &range), 1500);
    }

    #[test]
    fn test_shape_linear_matches_formula() {
        let range = PulseRange::default();
        let params = CurveParams::linear();
        // Quarter steps land on whole microseconds
        for v in [-1.0, -0.75, -0.5, -0.25, 0.0, 0.25, 0.5, 0.75, 1.0] {
            assert_eq!(shape(v, &params, &range) as f32, linear_pulse(v));
        }
    }

    #[test]
    fn test_shape_always_in_range() {
        let range = PulseRange::default();
        for trim in [-600, -100, 0, 100, 600] {
            for expo in [0.0, 0.3, 0.7, 0.99] {
                for i in -100..=100 {
                    let v = i as f32 / 100.0;
                    let pulse = shape(v, &CurveParams::new(trim, expo, 0.0), &range);
                    assert!((MIN_PULSE_US..=MAX_PULSE_US).contains(&pulse));
                }
            }
        }
    }

    #[test]
    fn test_trim_cannot_exceed_bounds() {
        let range = PulseRange::default();
        assert_eq!(shape(1.0, &CurveParams::new(200, 0.0, 0.0), &range), MAX_PULSE_US);
        assert_eq!(shape(-1.0, &CurveParams::new(-200, 0.0, 0.0), &range), MIN_PULSE_US);
        assert_eq!(shape(0.0, &CurveParams::new(25, 0.0, 0.0), &range), 1525);
    }

    #[test]
    fn test_shape_clamps_out_of_domain_input() {
        let range = PulseRange::default();
        let params = CurveParams::linear();
        assert_eq!(shape(3.0, &params, &range), MAX_PULSE_US);
        assert_eq!(shape(-3.0, &params, &range), MIN_PULSE_US);
        assert_eq!(shape(f32::NAN, &params, &range), MID_PULSE_US);
    }

    #[test]
    fn test_inverted_input_mirrors_around_mid() {
        let range = PulseRange::default();
        let params = CurveParams::new(0, 0.4, 0.0);
        for v in [0.25, 0.5, 0.75, 1.0] {
            let pos = i32::from(shape(v, &params, &range));
            let neg = i32::from(shape(-v, &params, &range));
            assert!((pos + neg - 2 * i32::from(MID_PULSE_US)).abs() <= 1);
        }
    }

    #[test]
    fn test_shape_or_neutral_absent_is_mid() {
        let range = PulseRange::default();
        let params = CurveParams::new(100, 0.5, 0.0);
        assert_eq!(shape_or_neutral(None, &params, &range), MID_PULSE_US);
        assert_eq!(shape_or_neutral(Some(-1.0), &params, &range), 1088);
    }

    #[test]
    fn test_curve_params_clamp() {
        let params = CurveParams::new(0, 1.5, 0.9);
        assert_eq!(params.expo, 1.0);
        assert_eq!(params.deadzone, MAX_DEADZONE);
    }

    #[test]
    fn test_pulse_range_helpers() {
        let range = PulseRange::default();
        assert_eq!(range.span(), 1024);
        assert_eq!(range.clamp(500), MIN_PULSE_US);
        assert_eq!(range.clamp(2500), MAX_PULSE_US);
        assert_eq!(range.clamp(1600), 1600);
    }
}
