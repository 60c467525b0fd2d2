//! # Input Module
//!
//! Joystick input handling.
//!
//! This module handles:
//! - The [`InputSource`] boundary consumed by the channel pipeline
//! - A device registry keyed by stable device identity ([`registry`])
//! - Joystick detection and state snapshots via evdev ([`joystick`])

pub mod joystick;
pub mod registry;

pub use joystick::EvdevInput;
pub use registry::DeviceRegistry;

/// Hot-plug notification produced by [`InputSource::poll`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    Added { key: String, name: String },
    Removed { key: String },
}

/// Live readings from the set of connected input devices.
///
/// Devices are addressed by key (`joy0`, `joy1`, ...). Every reader returns
/// `None` when the device or the control index does not exist, which the
/// pipeline turns into the neutral pulse width.
pub trait InputSource {
    /// Refreshes device state and detects hot-plug changes.
    fn poll(&mut self) -> Vec<DeviceEvent>;

    /// Number of connected devices.
    fn device_count(&self) -> usize;

    /// Whether a device with this key is connected.
    fn has_device(&self, device: &str) -> bool;

    /// Axis reading normalized to `[-1.0, 1.0]`.
    fn axis(&self, device: &str, index: usize) -> Option<f32>;

    /// Button state, `true` when pressed.
    fn button(&self, device: &str, index: usize) -> Option<bool>;

    /// Hat position as `(x, y)`, each in `{-1, 0, 1}`; `y = 1` is up.
    fn hat(&self, device: &str, index: usize) -> Option<(i8, i8)>;
}
