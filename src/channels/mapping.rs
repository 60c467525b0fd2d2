//! # Mapping Descriptor Parser
//!
//! Parses the per-channel mapping DSL into a typed [`ChannelSpec`].
//!
//! ## Grammar
//!
//! ```text
//! [!]<device_key>:<axis|button|hat>:<index>[:<0|1>]
//! none
//! ```
//!
//! - A leading `!` inverts the control (the normalized value is negated before shaping).
//! - `hat` requires a fourth field: `0` selects the horizontal component, `1` the vertical.
//! - `none` marks an unused channel; it always outputs the neutral pulse width.
//!
//! ## Usage
//!
//! ```
//! use trainer_bridge::channels::mapping::{ChannelSpec, ControlSource, HatSubaxis};
//!
//! let spec = ChannelSpec::parse(1, "!joy0:hat:0:1")?;
//! assert!(spec.invert);
//! assert_eq!(
//!     spec.source,
//!     Some(ControlSource::HatAxis {
//!         device: "joy0".to_string(),
//!         hat: 0,
//!         subaxis: HatSubaxis::Vertical,
//!     })
//! );
//! # Ok::<(), trainer_bridge::channels::MappingError>(())
//! ```

use std::fmt;

use thiserror::Error;

use crate::input::InputSource;

/// Mapping literal for an unused channel.
pub const MAPPING_NONE: &str = "none";

/// Prefix that inverts a mapping.
pub const INVERT_MARKER: char = '!';

/// Reasons a mapping descriptor can be rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    #[error("mapping is empty")]
    Empty,

    #[error("expected <device>:<control>:<index>, got '{0}'")]
    MissingField(String),

    #[error("device key is empty")]
    EmptyDeviceKey,

    #[error("unknown control type '{0}' (expected axis, button or hat)")]
    UnknownControlType(String),

    #[error("invalid index '{0}'")]
    InvalidIndex(String),

    #[error("hat mapping requires a sub-axis (0 = horizontal, 1 = vertical)")]
    MissingHatSubaxis,

    #[error("invalid hat sub-axis '{0}' (expected 0 or 1)")]
    InvalidHatSubaxis(String),

    #[error("unexpected trailing field '{0}'")]
    TrailingField(String),
}

/// Component of a directional hat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HatSubaxis {
    Horizontal,
    Vertical,
}

/// A control on a specific input device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlSource {
    Axis { device: String, index: usize },
    Button { device: String, index: usize },
    HatAxis { device: String, hat: usize, subaxis: HatSubaxis },
}

impl ControlSource {
    /// Key of the device this control lives on.
    #[must_use]
    pub fn device(&self) -> &str {
        match self {
            ControlSource::Axis { device, .. }
            | ControlSource::Button { device, .. }
            | ControlSource::HatAxis { device, .. } => device,
        }
    }

    /// Reads the raw normalized value of this control.
    ///
    /// Buttons read as `-1.0` (released) or `+1.0` (pressed); hat components
    /// read as `-1.0`, `0.0` or `+1.0`. Returns `None` when the device or the
    /// control index is not present.
    pub fn read<I: InputSource + ?Sized>(&self, input: &I) -> Option<f32> {
        match self {
            ControlSource::Axis { device, index } => input.axis(device, *index),
            ControlSource::Button { device, index } => input
                .button(device, *index)
                .map(|pressed| if pressed { 1.0 } else { -1.0 }),
            ControlSource::HatAxis { device, hat, subaxis } => {
                input.hat(device, *hat).map(|(x, y)| match subaxis {
                    HatSubaxis::Horizontal => f32::from(x),
                    HatSubaxis::Vertical => f32::from(y),
                })
            }
        }
    }
}

impl fmt::Display for ControlSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlSource::Axis { device, index } => write!(f, "{device}:axis:{index}"),
            ControlSource::Button { device, index } => write!(f, "{device}:button:{index}"),
            ControlSource::HatAxis { device, hat, subaxis } => {
                let sub = match subaxis {
                    HatSubaxis::Horizontal => 0,
                    HatSubaxis::Vertical => 1,
                };
                write!(f, "{device}:hat:{hat}:{sub}")
            }
        }
    }
}

/// A parsed channel mapping.
///
/// `index` is the 1-based channel number; receivers identify channels purely
/// by position, so the index also fixes the position in the output frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    pub index: usize,
    pub source: Option<ControlSource>,
    pub invert: bool,
}

impl ChannelSpec {
    /// An unused channel (mapping `none`).
    #[must_use]
    pub fn neutral(index: usize) -> Self {
        Self {
            index,
            source: None,
            invert: false,
        }
    }

    /// Parses a mapping descriptor for channel `index`.
    ///
    /// # Errors
    ///
    /// Returns a [`MappingError`] describing the first malformed field.
    pub fn parse(index: usize, descriptor: &str) -> Result<Self, MappingError> {
        let descriptor = descriptor.trim();
        if descriptor.is_empty() {
            return Err(MappingError::Empty);
        }
        if descriptor.eq_ignore_ascii_case(MAPPING_NONE) {
            return Ok(Self::neutral(index));
        }

        let (invert, body) = match descriptor.strip_prefix(INVERT_MARKER) {
            Some(rest) => (true, rest.trim_start()),
            None => (false, descriptor),
        };

        let mut fields = body.split(':').map(str::trim);
        let device = fields.next().unwrap_or_default();
        let (Some(kind), Some(index_field)) = (fields.next(), fields.next()) else {
            return Err(MappingError::MissingField(body.to_string()));
        };
        if device.is_empty() {
            return Err(MappingError::EmptyDeviceKey);
        }
        let control_index = parse_index(index_field)?;
        let device = device.to_string();

        let source = match kind.to_ascii_lowercase().as_str() {
            "axis" => ControlSource::Axis {
                device,
                index: control_index,
            },
            "button" => ControlSource::Button {
                device,
                index: control_index,
            },
            "hat" => {
                let subaxis = match fields.next() {
                    Some("0") => HatSubaxis::Horizontal,
                    Some("1") => HatSubaxis::Vertical,
                    Some(other) => return Err(MappingError::InvalidHatSubaxis(other.to_string())),
                    None => return Err(MappingError::MissingHatSubaxis),
                };
                ControlSource::HatAxis {
                    device,
                    hat: control_index,
                    subaxis,
                }
            }
            other => return Err(MappingError::UnknownControlType(other.to_string())),
        };

        if let Some(extra) = fields.next() {
            return Err(MappingError::TrailingField(extra.to_string()));
        }

        Ok(Self {
            index,
            source: Some(source),
            invert,
        })
    }

    /// Reads this channel's normalized value with inversion applied.
    ///
    /// Returns `None` for unused channels and for controls whose device is not
    /// connected; callers map `None` to the neutral pulse width.
    pub fn read<I: InputSource + ?Sized>(&self, input: &I) -> Option<f32> {
        let raw = self.source.as_ref()?.read(input)?;
        Some(if self.invert { -raw } else { raw })
    }
}

impl fmt::Display for ChannelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            None => f.write_str(MAPPING_NONE),
            Some(source) if self.invert => write!(f, "{INVERT_MARKER}{source}"),
            Some(source) => write!(f, "{source}"),
        }
    }
}

fn parse_index(field: &str) -> Result<usize, MappingError> {
    field
        .parse::<usize>()
        .map_err(|_| MappingError::InvalidIndex(field.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::mocks::MockInput;

    #[test]
    fn test_parse_none() {
        let spec = ChannelSpec::parse(5, "none").unwrap();
        assert_eq!(spec, ChannelSpec::neutral(5));
        assert_eq!(ChannelSpec::parse(5, " NONE ").unwrap().source, None);
    }

    #[test]
    fn test_parse_axis() {
        let spec = ChannelSpec::parse(1, "joy0:axis:2").unwrap();
        assert_eq!(spec.index, 1);
        assert!(!spec.invert);
        assert_eq!(
            spec.source,
            Some(ControlSource::Axis {
                device: "joy0".to_string(),
                index: 2
            })
        );
    }

    #[test]
    fn test_parse_inverted_axis() {
        let spec = ChannelSpec::parse(2, "!joy0:axis:1").unwrap();
        assert!(spec.invert);
        assert_eq!(spec.source.unwrap().device(), "joy0");
    }

    #[test]
    fn test_parse_button() {
        let spec = ChannelSpec::parse(6, "joy1:button:7").unwrap();
        assert_eq!(
            spec.source,
            Some(ControlSource::Button {
                device: "joy1".to_string(),
                index: 7
            })
        );
    }

    #[test]
    fn test_parse_hat_horizontal() {
        let spec = ChannelSpec::parse(7, "joy0:hat:0:0").unwrap();
        assert_eq!(
            spec.source,
            Some(ControlSource::HatAxis {
                device: "joy0".to_string(),
                hat: 0,
                subaxis: HatSubaxis::Horizontal
            })
        );
    }

    #[test]
    fn test_parse_hat_requires_subaxis() {
        assert_eq!(
            ChannelSpec::parse(1, "joy0:hat:0"),
            Err(MappingError::MissingHatSubaxis)
        );
        assert_eq!(
            ChannelSpec::parse(1, "joy0:hat:0:2"),
            Err(MappingError::InvalidHatSubaxis("2".to_string()))
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(ChannelSpec::parse(1, ""), Err(MappingError::Empty));
        assert_eq!(
            ChannelSpec::parse(1, "joy0:axis"),
            Err(MappingError::MissingField("joy0:axis".to_string()))
        );
        assert_eq!(
            ChannelSpec::parse(1, ":axis:0"),
            Err(MappingError::EmptyDeviceKey)
        );
        assert_eq!(
            ChannelSpec::parse(1, "joy0:slider:0"),
            Err(MappingError::UnknownControlType("slider".to_string()))
        );
        assert_eq!(
            ChannelSpec::parse(1, "joy0:axis:x"),
            Err(MappingError::InvalidIndex("x".to_string()))
        );
        assert_eq!(
            ChannelSpec::parse(1, "joy0:axis:-1"),
            Err(MappingError::InvalidIndex("-1".to_string()))
        );
        assert_eq!(
            ChannelSpec::parse(1, "joy0:axis:0:1"),
            Err(MappingError::TrailingField("1".to_string()))
        );
    }

    #[test]
    fn test_display_round_trips_descriptor() {
        for text in ["none", "joy0:axis:3", "!joy1:button:2", "joy0:hat:1:1"] {
            let spec = ChannelSpec::parse(1, text).unwrap();
            assert_eq!(spec.to_string(), text);
        }
    }

    #[test]
    fn test_read_inverts_before_shaping() {
        let mut input = MockInput::new();
        input.connect("joy0");
        input.set_axis("joy0", 1, 0.5);

        let spec = ChannelSpec::parse(2, "!joy0:axis:1").unwrap();
        assert_eq!(spec.read(&input), Some(-0.5));
    }

    #[test]
    fn test_read_button_maps_to_unit_values() {
        let mut input = MockInput::new();
        input.connect("joy0");
        let spec = ChannelSpec::parse(5, "joy0:button:0").unwrap();

        input.set_button("joy0", 0, false);
        assert_eq!(spec.read(&input), Some(-1.0));

        input.set_button("joy0", 0, true);
        assert_eq!(spec.read(&input), Some(1.0));
    }

    #[test]
    fn test_read_hat_components() {
        let mut input = MockInput::new();
        input.connect("joy0");
        input.set_hat("joy0", 0, (-1, 1));

        let x = ChannelSpec::parse(1, "joy0:hat:0:0").unwrap();
        let y = ChannelSpec::parse(2, "!joy0:hat:0:1").unwrap();
        assert_eq!(x.read(&input), Some(-1.0));
        assert_eq!(y.read(&input), Some(-1.0));
    }

    #[test]
    fn test_read_missing_device_is_absent() {
        let input = MockInput::new();
        let spec = ChannelSpec::parse(1, "joy3:axis:0").unwrap();
        assert_eq!(spec.read(&input), None);
    }

    #[test]
    fn test_read_none_is_absent() {
        let mut input = MockInput::new();
        input.connect("joy0");
        assert_eq!(ChannelSpec::neutral(1).read(&input), None);
    }
}
