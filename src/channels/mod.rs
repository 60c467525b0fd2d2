//! # Channel Module
//!
//! Turns live controller state into the ordered set of channel pulse widths.
//!
//! This module handles:
//! - Parsing per-channel mapping descriptors ([`mapping`])
//! - Resolving mappings against the currently connected devices
//! - Shaping each reading through the curve engine
//! - Rendering the channel table for the verbose report
//!
//! Malformed descriptors never stop the pipeline: the channel is kept as
//! `none` and always outputs the neutral pulse width.

pub mod mapping;

use std::fmt::Write as _;

use tracing::{debug, warn};

use crate::config::Config;
use crate::curve::{shape_or_neutral, CurveParams, PulseRange};
use crate::error::{BridgeError, Result};
use crate::input::InputSource;

pub use mapping::{ChannelSpec, ControlSource, HatSubaxis, MappingError};

/// Reported when no device is connected and output is withheld.
pub const REPORT_NO_DEVICE: &str = "No joystick detected, so no output is sent.";

/// Reported while at least one device is connected.
pub const REPORT_DEVICES: &str = "Joystick(s) detected.";

/// One configured output channel.
#[derive(Debug, Clone)]
pub struct Channel {
    pub spec: ChannelSpec,
    pub curve: CurveParams,
    /// Descriptor as written in the configuration
    pub descriptor: String,
    /// Why the descriptor was rejected, if it was
    pub diagnostic: Option<MappingError>,
}

impl Channel {
    /// Builds a channel, degrading a malformed descriptor to `none`.
    #[must_use]
    pub fn from_descriptor(index: usize, descriptor: &str, curve: CurveParams) -> Self {
        let (spec, diagnostic) = match ChannelSpec::parse(index, descriptor) {
            Ok(spec) => (spec, None),
            Err(e) => (ChannelSpec::neutral(index), Some(e)),
        };
        Self {
            spec,
            curve,
            descriptor: descriptor.to_string(),
            diagnostic,
        }
    }
}

/// How a channel resolves against the connected devices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Mapping is `none` or was rejected at load time
    Neutral,
    /// The referenced device is connected
    Bound,
    /// The referenced device is not connected
    DeviceUnavailable(String),
}

/// The ordered channel set with its pulse domain.
#[derive(Debug, Clone)]
pub struct ChannelTable {
    channels: Vec<Channel>,
    range: PulseRange,
}

impl ChannelTable {
    /// Builds the table from channels already in output order.
    #[must_use]
    pub fn new(channels: Vec<Channel>, range: PulseRange) -> Self {
        Self { channels, range }
    }

    /// Builds the table from configuration.
    ///
    /// Malformed descriptors are logged with their channel number and the
    /// channel outputs neutral.
    ///
    /// # Errors
    ///
    /// Returns `Mapping` error for the first malformed descriptor when
    /// `input.strict_mapping` is set.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut channels = Vec::with_capacity(config.channels.len());
        for (i, entry) in config.channels.iter().enumerate() {
            let number = i + 1;
            let curve = CurveParams::new(entry.trim, entry.expo, entry.deadzone);
            let channel = Channel::from_descriptor(number, &entry.map, curve);

            if let Some(e) = &channel.diagnostic {
                if config.input.strict_mapping {
                    return Err(BridgeError::Mapping {
                        channel: number,
                        source: e.clone(),
                    });
                }
                warn!("Channel {} mapping '{}' ignored: {}", number, entry.map, e);
            }
            channels.push(channel);
        }
        Ok(Self::new(channels, config.pulse.range()))
    }

    #[must_use]
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    #[must_use]
    pub fn range(&self) -> &PulseRange {
        &self.range
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Load-time diagnostics as `(channel number, error)`.
    pub fn diagnostics(&self) -> impl Iterator<Item = (usize, &MappingError)> + '_ {
        self.channels
            .iter()
            .filter_map(|c| c.diagnostic.as_ref().map(|e| (c.spec.index, e)))
    }

    /// Checks every mapping against the connected devices.
    ///
    /// Cheap and idempotent; run it whenever the device set changes.
    pub fn resolve<I: InputSource + ?Sized>(&self, input: &I) -> Vec<Resolution> {
        self.channels
            .iter()
            .map(|channel| match &channel.spec.source {
                None => Resolution::Neutral,
                Some(source) if input.has_device(source.device()) => Resolution::Bound,
                Some(source) => Resolution::DeviceUnavailable(source.device().to_string()),
            })
            .collect()
    }

    /// Logs unresolved devices after a device set change.
    pub fn log_resolution<I: InputSource + ?Sized>(&self, input: &I) {
        for (channel, resolution) in self.channels.iter().zip(self.resolve(input)) {
            match resolution {
                Resolution::Bound => debug!("Channel {} bound to {}", channel.spec.index, channel.spec),
                Resolution::DeviceUnavailable(device) => {
                    let err = BridgeError::DeviceUnavailable(device);
                    debug!("Channel {} neutral: {}", channel.spec.index, err);
                }
                Resolution::Neutral => {}
            }
        }
    }

    /// Reads and shapes every channel, in channel order.
    ///
    /// Unused channels and channels whose control is unavailable produce
    /// the neutral pulse width.
    ///
    /// # Examples
    ///
    /// ```
    /// use trainer_bridge::channels::{Channel, ChannelTable};
    /// use trainer_bridge::curve::{CurveParams, PulseRange};
    /// use trainer_bridge::input::{DeviceEvent, InputSource};
    ///
    /// struct NoDevices;
    ///
    /// impl InputSource for NoDevices {
    ///     fn poll(&mut self) -> Vec<DeviceEvent> { Vec::new() }
    ///     fn device_count(&self) -> usize { 0 }
    ///     fn has_device(&self, _: &str) -> bool { false }
    ///     fn axis(&self, _: &str, _: usize) -> Option<f32> { None }
    ///     fn button(&self, _: &str, _: usize) -> Option<bool> { None }
    ///     fn hat(&self, _: &str, _: usize) -> Option<(i8, i8)> { None }
    /// }
    ///
    /// let table = ChannelTable::new(
    ///     vec![
    ///         Channel::from_descriptor(1, "joy0:axis:0", CurveParams::linear()),
    ///         Channel::from_descriptor(2, "none", CurveParams::linear()),
    ///     ],
    ///     PulseRange::default(),
    /// );
    /// assert_eq!(table.read_pulses(&NoDevices), vec![1500, 1500]);
    /// ```
    pub fn read_pulses<I: InputSource + ?Sized>(&self, input: &I) -> Vec<u16> {
        self.channels
            .iter()
            .map(|channel| shape_or_neutral(channel.spec.read(input), &channel.curve, &self.range))
            .collect()
    }

    /// Renders the channel table with the given pulses and a device summary.
    #[must_use]
    pub fn render_report(&self, pulses: &[u16], device_count: usize) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{:<4} {:<20} {:>6}", "CH", "MAPPING", "PULSE");
        for (channel, pulse) in self.channels.iter().zip(pulses) {
            let _ = writeln!(
                out,
                "{:<4} {:<20} {:>6}",
                channel.spec.index, channel.descriptor, pulse
            );
        }
        out.push_str(if device_count == 0 { REPORT_NO_DEVICE } else { REPORT_DEVICES });
        out
    }
}
