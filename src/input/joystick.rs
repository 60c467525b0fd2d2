//! # Joystick Input Module
//!
//! Detects joysticks and gamepads through the Linux evdev interface and exposes
//! their state as an [`InputSource`].
//!
//! ## Controller Detection
//!
//! A device under `/dev/input/event*` is treated as a joystick when it reports
//! an `ABS_X` axis and at least one button in the joystick/gamepad range
//! (`BTN_JOYSTICK` 0x120 to `BTN_THUMBR` 0x13e).
//!
//! ## Control Indices
//!
//! Indices follow the SDL/pygame numbering so mappings can be written from any
//! joystick tester:
//!
//! | Control | Order |
//! |---------|-------|
//! | Axes | Absolute axes below `ABS_MISC` in code order, hats excluded |
//! | Buttons | Codes from `BTN_JOYSTICK` upwards, then `BTN_MISC`..`BTN_JOYSTICK` |
//! | Hats | `ABS_HAT0X/Y` .. `ABS_HAT3X/Y` pairs; `y = 1` is up |
//!
//! ## Hot-plug
//!
//! State is read with ioctl snapshots on every poll. A device whose snapshot
//! fails (unplugged) is removed on that same poll; new devices are discovered
//! by rescanning the input directory at a fixed interval.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use evdev::{AbsoluteAxisType, Device, Key};
use tracing::{debug, info, warn};

use super::registry::DeviceRegistry;
use super::{DeviceEvent, InputSource};
use crate::error::{BridgeError, Result};

/// Default directory scanned for event devices.
pub const DEFAULT_INPUT_DIR: &str = "/dev/input";

/// First joystick button code (`BTN_JOYSTICK` / `BTN_TRIGGER`).
const BTN_JOYSTICK: u16 = 0x120;
/// First miscellaneous button code (`BTN_MISC` / `BTN_0`).
const BTN_MISC: u16 = 0x100;
/// End of the joystick + gamepad button block (exclusive).
const BTN_GAMEPAD_END: u16 = 0x140;
/// First axis code that is not a regular joystick axis.
const ABS_MISC: u16 = 0x28;
/// Number of hats evdev can describe.
const MAX_HATS: u16 = 4;

/// Control layout of a joystick, fixed when the device is opened.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoystickLayout {
    pub axes: Vec<AbsoluteAxisType>,
    pub buttons: Vec<Key>,
    pub hats: Vec<(AbsoluteAxisType, AbsoluteAxisType)>,
}

impl JoystickLayout {
    /// Derives the layout from raw supported axis and key lists.
    #[must_use]
    pub fn from_codes(abs: &[AbsoluteAxisType], keys: &[Key]) -> Self {
        let is_hat = |axis: &AbsoluteAxisType| {
            (AbsoluteAxisType::ABS_HAT0X.0..=AbsoluteAxisType::ABS_HAT3Y.0).contains(&axis.0)
        };

        let mut axes: Vec<AbsoluteAxisType> = abs
            .iter()
            .copied()
            .filter(|axis| axis.0 < ABS_MISC && !is_hat(axis))
            .collect();
        axes.sort_by_key(|axis| axis.0);

        let mut hats = Vec::new();
        for hat in 0..MAX_HATS {
            let x = AbsoluteAxisType(AbsoluteAxisType::ABS_HAT0X.0 + 2 * hat);
            let y = AbsoluteAxisType(AbsoluteAxisType::ABS_HAT0Y.0 + 2 * hat);
            if abs.contains(&x) || abs.contains(&y) {
                hats.push((x, y));
            }
        }

        let mut high: Vec<Key> = keys.iter().copied().filter(|k| k.code() >= BTN_JOYSTICK).collect();
        let mut low: Vec<Key> = keys
            .iter()
            .copied()
            .filter(|k| (BTN_MISC..BTN_JOYSTICK).contains(&k.code()))
            .collect();
        high.sort_by_key(|k| k.code());
        low.sort_by_key(|k| k.code());
        high.extend(low);

        Self {
            axes,
            buttons: high,
            hats,
        }
    }

    /// Whether the supported events look like a joystick or gamepad.
    #[must_use]
    pub fn looks_like_joystick(abs: &[AbsoluteAxisType], keys: &[Key]) -> bool {
        abs.contains(&AbsoluteAxisType::ABS_X)
            && keys
                .iter()
                .any(|k| (BTN_JOYSTICK..BTN_GAMEPAD_END).contains(&k.code()))
    }
}

/// Absolute axes and keys the device reports.
fn supported_codes(device: &Device) -> (Vec<AbsoluteAxisType>, Vec<Key>) {
    let abs = device
        .supported_absolute_axes()
        .map(|set| set.iter().collect())
        .unwrap_or_default();
    let keys = device
        .supported_keys()
        .map(|set| set.iter().collect())
        .unwrap_or_default();
    (abs, keys)
}

/// Maps a raw absolute value to `[-1.0, 1.0]` using the axis limits.
#[must_use]
pub fn normalize_abs(value: i32, minimum: i32, maximum: i32) -> f32 {
    if maximum <= minimum {
        return 0.0;
    }
    let span = (i64::from(maximum) - i64::from(minimum)) as f32;
    let offset = (i64::from(value) - i64::from(minimum)) as f32;
    (2.0 * offset / span - 1.0).clamp(-1.0, 1.0)
}

/// Maps raw hat values to `(x, y)` with `y = 1` meaning up.
///
/// evdev reports down as positive, so the vertical component is negated.
#[must_use]
pub fn normalize_hat(raw_x: i32, raw_y: i32) -> (i8, i8) {
    (raw_x.signum() as i8, -(raw_y.signum() as i8))
}

/// An opened joystick with its latest state snapshot.
pub struct Joystick {
    device: Device,
    path: PathBuf,
    name: String,
    layout: JoystickLayout,
    axes: Vec<f32>,
    buttons: Vec<bool>,
    hats: Vec<(i8, i8)>,
}

impl std::fmt::Debug for Joystick {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Joystick")
            .field("path", &self.path)
            .field("name", &self.name)
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

impl Joystick {
    /// Opens the device at `path` if it is a joystick.
    ///
    /// Returns `Ok(None)` for event devices that are not joysticks.
    ///
    /// # Errors
    ///
    /// Returns `Input` error if the device cannot be opened or read.
    pub fn open(path: &Path) -> Result<Option<Self>> {
        let device = Device::open(path)
            .map_err(|e| BridgeError::Input(format!("Failed to open {}: {}", path.display(), e)))?;

        let (abs, keys) = supported_codes(&device);
        if !JoystickLayout::looks_like_joystick(&abs, &keys) {
            return Ok(None);
        }

        let layout = JoystickLayout::from_codes(&abs, &keys);
        let name = device.name().unwrap_or("Unknown joystick").to_string();
        let mut joystick = Self {
            axes: vec![0.0; layout.axes.len()],
            buttons: vec![false; layout.buttons.len()],
            hats: vec![(0, 0); layout.hats.len()],
            device,
            path: path.to_path_buf(),
            name,
            layout,
        };
        joystick
            .refresh()
            .map_err(|e| BridgeError::Input(format!("Failed to read {}: {}", path.display(), e)))?;
        Ok(Some(joystick))
    }

    /// Identifier that survives re-plugging and re-enumeration.
    #[must_use]
    pub fn stable_id(&self) -> String {
        match (self.device.unique_name(), self.device.physical_path()) {
            (Some(uniq), _) if !uniq.is_empty() => format!("uniq:{uniq}|{}", self.name),
            (_, Some(phys)) if !phys.is_empty() => format!("phys:{phys}|{}", self.name),
            _ => format!("path:{}", self.path.display()),
        }
    }

    /// Reads the current state of every control.
    ///
    /// # Errors
    ///
    /// Fails once the device is gone (`ENODEV`).
    pub fn refresh(&mut self) -> std::io::Result<()> {
        let abs = self.device.get_abs_state()?;
        for (slot, axis) in self.layout.axes.iter().enumerate() {
            if let (Some(info), Some(value)) = (abs.get(axis.0 as usize), self.axes.get_mut(slot)) {
                *value = normalize_abs(info.value, info.minimum, info.maximum);
            }
        }
        for (slot, (x, y)) in self.layout.hats.iter().enumerate() {
            let raw_x = abs.get(x.0 as usize).map_or(0, |info| info.value);
            let raw_y = abs.get(y.0 as usize).map_or(0, |info| info.value);
            if let Some(hat) = self.hats.get_mut(slot) {
                *hat = normalize_hat(raw_x, raw_y);
            }
        }

        let keys = self.device.get_key_state()?;
        for (slot, key) in self.layout.buttons.iter().enumerate() {
            if let Some(pressed) = self.buttons.get_mut(slot) {
                *pressed = keys.contains(*key);
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn layout(&self) -> &JoystickLayout {
        &self.layout
    }

    #[must_use]
    pub fn axes(&self) -> &[f32] {
        &self.axes
    }

    #[must_use]
    pub fn buttons(&self) -> &[bool] {
        &self.buttons
    }

    #[must_use]
    pub fn hats(&self) -> &[(i8, i8)] {
        &self.hats
    }
}

/// evdev-backed [`InputSource`] with hot-plug support.
#[derive(Debug)]
pub struct EvdevInput {
    input_dir: PathBuf,
    rescan_interval: Duration,
    last_scan: Option<Instant>,
    registry: DeviceRegistry<Joystick>,
}

impl EvdevInput {
    /// Creates an input source scanning `input_dir` every `rescan_interval`.
    ///
    /// No device is opened until the first [`InputSource::poll`].
    #[must_use]
    pub fn new<P: AsRef<Path>>(input_dir: P, rescan_interval: Duration) -> Self {
        Self {
            input_dir: input_dir.as_ref().to_path_buf(),
            rescan_interval,
            last_scan: None,
            registry: DeviceRegistry::new(),
        }
    }

    /// Connected joysticks in key order.
    pub fn devices(&self) -> impl Iterator<Item = (String, &Joystick)> + '_ {
        self.registry.iter()
    }

    fn rescan_due(&self, now: Instant) -> bool {
        self.last_scan
            .map_or(true, |last| now.duration_since(last) >= self.rescan_interval)
    }

    /// Opens joysticks that appeared since the last scan.
    pub fn scan(&mut self) -> Vec<DeviceEvent> {
        self.last_scan = Some(Instant::now());

        let entries = match std::fs::read_dir(&self.input_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to read {}: {}", self.input_dir.display(), e);
                return Vec::new();
            }
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.file_name()
                    .is_some_and(|name| name.to_string_lossy().starts_with("event"))
            })
            .collect();
        // Deterministic key assignment when several joysticks are present
        paths.sort();

        let mut events = Vec::new();
        for path in paths {
            if self.registry.iter().any(|(_, js)| js.path() == path.as_path()) {
                continue;
            }

            match Joystick::open(&path) {
                Ok(Some(joystick)) => {
                    let stable_id = joystick.stable_id();
                    if self.registry.contains_id(&stable_id) {
                        continue;
                    }
                    let name = joystick.name().to_string();
                    let key = self.registry.insert(&stable_id, joystick);
                    info!("Joystick added: {} ({}) at {}", key, name, path.display());
                    events.push(DeviceEvent::Added { key, name });
                }
                Ok(None) => {}
                Err(e) => {
                    // Permission denied or other errors - skip device
                    debug!("Skipping {}: {}", path.display(), e);
                }
            }
        }
        events
    }
}

impl InputSource for EvdevInput {
    fn poll(&mut self) -> Vec<DeviceEvent> {
        let mut lost = Vec::new();
        for (key, joystick) in self.registry.iter_mut() {
            if let Err(e) = joystick.refresh() {
                debug!("Lost {} ({}): {}", key, joystick.path().display(), e);
                lost.push(key);
            }
        }

        let mut events = Vec::new();
        for key in lost {
            if let Some(joystick) = self.registry.remove_key(&key) {
                info!("Joystick removed: {} ({})", key, joystick.name());
                events.push(DeviceEvent::Removed { key });
            }
        }

        if self.rescan_due(Instant::now()) {
            events.extend(self.scan());
        }
        events
    }

    fn device_count(&self) -> usize {
        self.registry.len()
    }

    fn has_device(&self, device: &str) -> bool {
        self.registry.get(device).is_some()
    }

    fn axis(&self, device: &str, index: usize) -> Option<f32> {
        self.registry.get(device)?.axes.get(index).copied()
    }

    fn button(&self, device: &str, index: usize) -> Option<bool> {
        self.registry.get(device)?.buttons.get(index).copied()
    }

    fn hat(&self, device: &str, index: usize) -> Option<(i8, i8)> {
        self.registry.get(device)?.hats.get(index).copied()
    }
}
