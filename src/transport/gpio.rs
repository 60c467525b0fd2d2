//! # GPIO Output
//!
//! Digital output lines driven through the Linux sysfs GPIO interface, and the
//! microsecond-accurate waveform player used for PPM.
//!
//! A [`SysfsPin`] is exported and configured as an output when created, and is
//! driven low and unexported when dropped, so the line is released on every
//! exit path.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::frame::PpmFrame;

/// Default sysfs GPIO root.
pub const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

/// How long to wait for udev to apply permissions after exporting a pin.
const EXPORT_SETTLE_TIMEOUT: Duration = Duration::from_millis(500);

/// Below this remaining time the player spins instead of sleeping.
const SPIN_THRESHOLD: Duration = Duration::from_micros(200);

/// A digital output line.
pub trait PinWriter: Send {
    /// Drives the line high (`true`) or low (`false`).
    fn set(&mut self, high: bool) -> io::Result<()>;
}

/// A GPIO line exported through sysfs.
#[derive(Debug)]
pub struct SysfsPin {
    pin: u32,
    root: PathBuf,
    value: File,
}

impl SysfsPin {
    /// Exports `pin` under the default sysfs root and configures it as a low output.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when the GPIO cannot be exported.
    pub fn export(pin: u32) -> io::Result<Self> {
        Self::export_at(SYSFS_GPIO_ROOT, pin)
    }

    /// Exports `pin` under a custom sysfs root.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when the GPIO cannot be exported.
    pub fn export_at<P: AsRef<Path>>(root: P, pin: u32) -> io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        let pin_dir = root.join(format!("gpio{pin}"));

        if !pin_dir.exists() {
            fs::write(root.join("export"), pin.to_string())?;
        }

        // The direction file appears (and becomes writable) asynchronously
        let direction = pin_dir.join("direction");
        let deadline = Instant::now() + EXPORT_SETTLE_TIMEOUT;
        loop {
            match fs::write(&direction, "out") {
                Ok(()) => break,
                Err(e) if Instant::now() >= deadline => return Err(e),
                Err(_) => std::thread::sleep(Duration::from_millis(10)),
            }
        }

        let value = OpenOptions::new().write(true).open(pin_dir.join("value"))?;
        let mut pin = Self { pin, root, value };
        pin.set(false)?;
        debug!("Exported GPIO {}", pin.pin);
        Ok(pin)
    }

    #[must_use]
    pub fn pin(&self) -> u32 {
        self.pin
    }
}

impl PinWriter for SysfsPin {
    fn set(&mut self, high: bool) -> io::Result<()> {
        self.value.seek(SeekFrom::Start(0))?;
        self.value.write_all(if high { b"1" } else { b"0" })
    }
}

impl Drop for SysfsPin {
    fn drop(&mut self) {
        if let Err(e) = self.set(false) {
            debug!("Failed to drive GPIO {} low: {}", self.pin, e);
        }
        if let Err(e) = fs::write(self.root.join("unexport"), self.pin.to_string()) {
            debug!("Failed to unexport GPIO {}: {}", self.pin, e);
        }
    }
}

/// Blocks until `deadline`: sleeps while far away, spins for the last stretch.
fn wait_until(deadline: Instant) {
    loop {
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        let remaining = deadline - now;
        if remaining > SPIN_THRESHOLD {
            std::thread::sleep(remaining - SPIN_THRESHOLD);
        } else {
            std::hint::spin_loop();
        }
    }
}

/// Plays one PPM frame on `pin`, blocking for the whole frame duration.
///
/// Edges are scheduled against absolute deadlines so timing errors do not
/// accumulate across channels. The line is low when this returns.
///
/// # Errors
///
/// Returns the first I/O error from the pin; the line is driven low first.
pub fn play_waveform(pin: &mut dyn PinWriter, frame: &PpmFrame) -> io::Result<()> {
    let result = drive_pulses(pin, frame);
    if result.is_err() {
        // Best effort: leave the line idle
        let _ = pin.set(false);
    }
    result
}

fn drive_pulses(pin: &mut dyn PinWriter, frame: &PpmFrame) -> io::Result<()> {
    let mut deadline = Instant::now();
    for pulse in &frame.pulses {
        pin.set(true)?;
        deadline += Duration::from_micros(u64::from(pulse.high_us));
        wait_until(deadline);

        pin.set(false)?;
        deadline += Duration::from_micros(u64::from(pulse.low_us));
        wait_until(deadline);
    }
    deadline += Duration::from_micros(u64::from(frame.sync_us));
    wait_until(deadline);
    Ok(())
}
