//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section and field is optional; missing values fall back to the
//! `default_*` functions below. Channel mappings are kept as text here and
//! parsed by [`crate::channels`].

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::channels::ChannelSpec;
use crate::curve::{PulseRange, MAX_DEADZONE};
use crate::error::{BridgeError, Result};
use crate::frame::ppm::PPM_MAX_CHANNELS;
use crate::frame::sbus::SBUS_NUM_CHANNELS;
use crate::frame::{OutputMode, PpmTiming};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub pulse: PulseConfig,

    #[serde(default)]
    pub ppm: PpmConfig,

    #[serde(default)]
    pub sbus: SbusConfig,

    #[serde(default = "default_channels")]
    pub channels: Vec<ChannelConfig>,

    #[serde(default)]
    pub input: InputConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub status: StatusConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub recorder: RecorderConfig,
}

/// Output selection
#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_output_mode")]
    pub mode: OutputMode,
}

/// Pulse width domain in microseconds
#[derive(Debug, Deserialize, Clone)]
pub struct PulseConfig {
    #[serde(default = "default_min_us")]
    pub min_us: u16,

    #[serde(default = "default_mid_us")]
    pub mid_us: u16,

    #[serde(default = "default_max_us")]
    pub max_us: u16,
}

/// PPM output on a GPIO line
#[derive(Debug, Deserialize, Clone)]
pub struct PpmConfig {
    #[serde(default = "default_gpio_pin")]
    pub gpio_pin: u32,

    #[serde(default = "default_gpio_root")]
    pub gpio_root: PathBuf,

    #[serde(default = "default_frame_length_ms")]
    pub frame_length_ms: f32,

    #[serde(default = "default_gap_us")]
    pub gap_us: u32,

    #[serde(default = "default_min_active_us")]
    pub min_active_us: u32,

    #[serde(default = "default_sync_floor_us")]
    pub sync_floor_us: u32,
}

/// Serial parity setting
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SerialParity {
    None,
    Even,
    Odd,
}

/// SBUS output on a serial port
#[derive(Debug, Deserialize, Clone)]
pub struct SbusConfig {
    #[serde(default = "default_sbus_port")]
    pub port: String,

    #[serde(default = "default_sbus_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_sbus_parity")]
    pub parity: SerialParity,

    #[serde(default = "default_sbus_stop_bits")]
    pub stop_bits: u8,

    #[serde(default = "default_sbus_frame_interval_ms")]
    pub frame_interval_ms: u64,
}

/// One output channel, in channel order
#[derive(Debug, Deserialize, Clone)]
pub struct ChannelConfig {
    /// Mapping descriptor, e.g. `"joy0:axis:0"`, `"!joy1:hat:0:1"` or `"none"`
    #[serde(default = "default_map")]
    pub map: String,

    #[serde(default)]
    pub trim: i32,

    #[serde(default)]
    pub expo: f32,

    #[serde(default)]
    pub deadzone: f32,
}

/// Joystick input
#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    #[serde(default = "default_input_dir")]
    pub dir: PathBuf,

    #[serde(default = "default_rescan_interval_ms")]
    pub rescan_interval_ms: u64,

    /// Reject the whole configuration when any mapping is malformed
    #[serde(default)]
    pub strict_mapping: bool,
}

/// Main loop pacing
#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,

    #[serde(default = "default_completion_poll_ms")]
    pub completion_poll_ms: u64,

    #[serde(default = "default_completion_timeout_ms")]
    pub completion_timeout_ms: u64,
}

/// Status LEDs
#[derive(Debug, Deserialize, Clone)]
pub struct StatusConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_power_led_gpio")]
    pub power_led_gpio: Option<u32>,

    #[serde(default = "default_heartbeat_led_gpio")]
    pub heartbeat_led_gpio: Option<u32>,

    #[serde(default = "default_blink_interval_ms")]
    pub blink_interval_ms: u64,
}

/// Logging
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Periodically log the channel table
    #[serde(default)]
    pub verbose: bool,

    #[serde(default = "default_table_interval_ms")]
    pub table_interval_ms: u64,

    /// Also write logs to a daily-rolling file in this directory
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

/// Frame recorder
#[derive(Debug, Deserialize, Clone)]
pub struct RecorderConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_recorder_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,

    #[serde(default = "default_max_files_to_keep")]
    pub max_files_to_keep: usize,

    #[serde(default = "default_record_interval_ms")]
    pub interval_ms: u64,
}

// Default value functions
fn default_output_mode() -> OutputMode { OutputMode::Ppm }

fn default_min_us() -> u16 { 988 }
fn default_mid_us() -> u16 { 1500 }
fn default_max_us() -> u16 { 2012 }

fn default_gpio_pin() -> u32 { 18 }
fn default_gpio_root() -> PathBuf { PathBuf::from("/sys/class/gpio") }
fn default_frame_length_ms() -> f32 { 20.0 }
fn default_gap_us() -> u32 { 300 }
fn default_min_active_us() -> u32 { 100 }
fn default_sync_floor_us() -> u32 { 8000 }

fn default_sbus_port() -> String { "/dev/serial0".to_string() }
fn default_sbus_baud_rate() -> u32 { 100_000 }
fn default_sbus_parity() -> SerialParity { SerialParity::Even }
fn default_sbus_stop_bits() -> u8 { 2 }
fn default_sbus_frame_interval_ms() -> u64 { 14 }

fn default_map() -> String { "none".to_string() }

fn default_channels() -> Vec<ChannelConfig> {
    ["joy0:axis:0", "joy0:axis:1", "joy0:axis:2", "joy0:axis:4", "none", "none", "none", "none"]
        .iter()
        .map(|map| ChannelConfig {
            map: (*map).to_string(),
            trim: 0,
            expo: 0.0,
            deadzone: 0.0,
        })
        .collect()
}

fn default_input_dir() -> PathBuf { PathBuf::from("/dev/input") }
fn default_rescan_interval_ms() -> u64 { 1000 }

fn default_idle_poll_ms() -> u64 { 100 }
fn default_completion_poll_ms() -> u64 { 1 }
fn default_completion_timeout_ms() -> u64 { 100 }

fn default_power_led_gpio() -> Option<u32> { Some(22) }
fn default_heartbeat_led_gpio() -> Option<u32> { Some(23) }
fn default_blink_interval_ms() -> u64 { 500 }

fn default_table_interval_ms() -> u64 { 500 }

fn default_recorder_log_dir() -> String { "./logs".to_string() }
fn default_max_records_per_file() -> usize { 10000 }
fn default_max_files_to_keep() -> usize { 10 }
fn default_record_interval_ms() -> u64 { 100 }

impl Default for OutputConfig {
    fn default() -> Self {
        Self { mode: default_output_mode() }
    }
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            min_us: default_min_us(),
            mid_us: default_mid_us(),
            max_us: default_max_us(),
        }
    }
}

impl Default for PpmConfig {
    fn default() -> Self {
        Self {
            gpio_pin: default_gpio_pin(),
            gpio_root: default_gpio_root(),
            frame_length_ms: default_frame_length_ms(),
            gap_us: default_gap_us(),
            min_active_us: default_min_active_us(),
            sync_floor_us: default_sync_floor_us(),
        }
    }
}

impl Default for SbusConfig {
    fn default() -> Self {
        Self {
            port: default_sbus_port(),
            baud_rate: default_sbus_baud_rate(),
            parity: default_sbus_parity(),
            stop_bits: default_sbus_stop_bits(),
            frame_interval_ms: default_sbus_frame_interval_ms(),
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            dir: default_input_dir(),
            rescan_interval_ms: default_rescan_interval_ms(),
            strict_mapping: false,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            idle_poll_ms: default_idle_poll_ms(),
            completion_poll_ms: default_completion_poll_ms(),
            completion_timeout_ms: default_completion_timeout_ms(),
        }
    }
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            power_led_gpio: default_power_led_gpio(),
            heartbeat_led_gpio: default_heartbeat_led_gpio(),
            blink_interval_ms: default_blink_interval_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            table_interval_ms: default_table_interval_ms(),
            log_dir: None,
        }
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            log_dir: default_recorder_log_dir(),
            max_records_per_file: default_max_records_per_file(),
            max_files_to_keep: default_max_files_to_keep(),
            interval_ms: default_record_interval_ms(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output: OutputConfig::default(),
            pulse: PulseConfig::default(),
            ppm: PpmConfig::default(),
            sbus: SbusConfig::default(),
            channels: default_channels(),
            input: InputConfig::default(),
            scheduler: SchedulerConfig::default(),
            status: StatusConfig::default(),
            logging: LoggingConfig::default(),
            recorder: RecorderConfig::default(),
        }
    }
}

impl PulseConfig {
    #[must_use]
    pub fn range(&self) -> PulseRange {
        PulseRange {
            min_us: self.min_us,
            mid_us: self.mid_us,
            max_us: self.max_us,
        }
    }
}

impl PpmConfig {
    /// Nominal frame length in microseconds.
    #[must_use]
    pub fn frame_length_us(&self) -> u32 {
        (self.frame_length_ms * 1000.0).round() as u32
    }

    #[must_use]
    pub fn timing(&self) -> PpmTiming {
        PpmTiming {
            frame_length_us: self.frame_length_us(),
            gap_us: self.gap_us,
            min_active_us: self.min_active_us,
            sync_floor_us: self.sync_floor_us,
        }
    }
}

fn invalid(msg: impl Into<String>) -> BridgeError {
    BridgeError::InvalidConfig(msg.into())
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use trainer_bridge::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns error if parsing or validation fails
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Time between frames for the configured output mode.
    #[must_use]
    pub fn frame_interval(&self) -> Duration {
        match self.output.mode {
            OutputMode::Ppm => Duration::from_micros(u64::from(self.ppm.frame_length_us())),
            OutputMode::Sbus => Duration::from_millis(self.sbus.frame_interval_ms),
        }
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` error if any value is out of its valid range,
    /// or `Mapping` error for a malformed descriptor when `strict_mapping` is set
    pub fn validate(&self) -> Result<()> {
        // Pulse domain
        let pulse = &self.pulse;
        if pulse.min_us < 500 || pulse.max_us > 2500 {
            return Err(invalid("pulse range must stay within 500..=2500 us"));
        }
        if !(pulse.min_us < pulse.mid_us && pulse.mid_us < pulse.max_us) {
            return Err(invalid("pulse widths must satisfy min_us < mid_us < max_us"));
        }

        // PPM timing
        let ppm = &self.ppm;
        if !(ppm.frame_length_ms > 0.0 && ppm.frame_length_ms <= 100.0) {
            return Err(invalid("ppm frame_length_ms must be between 0 and 100"));
        }
        if ppm.gap_us == 0 || ppm.gap_us >= u32::from(pulse.min_us) {
            return Err(invalid("ppm gap_us must be greater than 0 and less than pulse min_us"));
        }
        if ppm.min_active_us == 0 {
            return Err(invalid("ppm min_active_us must be greater than 0"));
        }
        if ppm.sync_floor_us == 0 || ppm.sync_floor_us >= ppm.frame_length_us() {
            return Err(invalid("ppm sync_floor_us must be greater than 0 and shorter than the frame"));
        }

        // SBUS line
        let sbus = &self.sbus;
        if sbus.port.is_empty() {
            return Err(invalid("sbus port cannot be empty"));
        }
        if sbus.baud_rate == 0 {
            return Err(invalid("sbus baud_rate must be greater than 0"));
        }
        if !matches!(sbus.stop_bits, 1 | 2) {
            return Err(invalid("sbus stop_bits must be 1 or 2"));
        }
        if sbus.frame_interval_ms == 0 || sbus.frame_interval_ms > 1000 {
            return Err(invalid("sbus frame_interval_ms must be between 1 and 1000"));
        }

        // Channels
        let max_channels = match self.output.mode {
            OutputMode::Ppm => PPM_MAX_CHANNELS,
            OutputMode::Sbus => SBUS_NUM_CHANNELS,
        };
        if self.channels.is_empty() || self.channels.len() > max_channels {
            return Err(invalid(format!(
                "{} output needs between 1 and {} channels, got {}",
                self.output.mode,
                max_channels,
                self.channels.len()
            )));
        }
        for (i, channel) in self.channels.iter().enumerate() {
            let number = i + 1;
            if !(0.0..=1.0).contains(&channel.expo) {
                return Err(invalid(format!("channel {} expo must be between 0.0 and 1.0", number)));
            }
            if !(0.0..=MAX_DEADZONE).contains(&channel.deadzone) {
                return Err(invalid(format!(
                    "channel {} deadzone must be between 0.0 and {}",
                    number, MAX_DEADZONE
                )));
            }
            if channel.trim.abs() > 500 {
                return Err(invalid(format!("channel {} trim must be between -500 and 500", number)));
            }
            if self.input.strict_mapping {
                ChannelSpec::parse(number, &channel.map)
                    .map_err(|source| BridgeError::Mapping { channel: number, source })?;
            }
        }

        // Timing fields
        if self.input.rescan_interval_ms == 0 || self.input.rescan_interval_ms > 60000 {
            return Err(invalid("rescan_interval_ms must be between 1 and 60000"));
        }
        if self.scheduler.idle_poll_ms == 0 || self.scheduler.idle_poll_ms > 10000 {
            return Err(invalid("idle_poll_ms must be between 1 and 10000"));
        }
        if self.scheduler.completion_poll_ms == 0 {
            return Err(invalid("completion_poll_ms must be greater than 0"));
        }
        if self.scheduler.completion_timeout_ms < self.scheduler.completion_poll_ms {
            return Err(invalid("completion_timeout_ms must be at least completion_poll_ms"));
        }
        if self.status.enabled && self.output.mode == OutputMode::Ppm {
            for led in [self.status.power_led_gpio, self.status.heartbeat_led_gpio].into_iter().flatten() {
                if led == self.ppm.gpio_pin {
                    return Err(invalid(format!("status LED GPIO {} is also the PPM output", led)));
                }
            }
        }
        if self.status.power_led_gpio.is_some() && self.status.power_led_gpio == self.status.heartbeat_led_gpio {
            return Err(invalid("power and heartbeat LEDs must use different GPIOs"));
        }
        if self.status.blink_interval_ms == 0 {
            return Err(invalid("blink_interval_ms must be greater than 0"));
        }
        if self.logging.table_interval_ms == 0 {
            return Err(invalid("table_interval_ms must be greater than 0"));
        }

        // Recorder
        let recorder = &self.recorder;
        if recorder.enabled && recorder.log_dir.is_empty() {
            return Err(invalid("recorder log_dir cannot be empty when enabled"));
        }
        if recorder.max_records_per_file == 0 {
            return Err(invalid("max_records_per_file must be greater than 0"));
        }
        if recorder.max_files_to_keep == 0 {
            return Err(invalid("max_files_to_keep must be greater than 0"));
        }
        if recorder.interval_ms == 0 || recorder.interval_ms > 60000 {
            return Err(invalid("recorder interval_ms must be between 1 and 60000"));
        }

        Ok(())
    }
}
