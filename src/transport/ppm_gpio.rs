//! # PPM over GPIO
//!
//! Plays PPM frames on a single GPIO line. Each frame is driven on a blocking
//! worker thread so edge timing is not subject to the async scheduler; the
//! transport stays busy until the whole waveform, sync period included, has
//! been played.

use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::debug;

use super::gpio::{play_waveform, PinWriter, SysfsPin};
use super::{expect_mode, OutputTransport, TxHandle};
use crate::error::{BridgeError, Result};
use crate::frame::{Frame, OutputMode};

type SharedPin = Arc<Mutex<Box<dyn PinWriter>>>;

/// PPM transport on a GPIO line.
pub struct PpmGpioTransport {
    pin: SharedPin,
    label: String,
    next_id: u64,
    in_flight: Option<(u64, JoinHandle<io::Result<()>>)>,
}

impl PpmGpioTransport {
    /// Exports the GPIO line and configures it as a low output.
    ///
    /// # Arguments
    ///
    /// * `pin` - GPIO number (BCM numbering on a Raspberry Pi)
    /// * `gpio_root` - sysfs GPIO directory, usually `/sys/class/gpio`
    ///
    /// # Errors
    ///
    /// Returns `TransportInit` error if the line cannot be acquired.
    pub fn open(pin: u32, gpio_root: &Path) -> Result<Self> {
        let writer = SysfsPin::export_at(gpio_root, pin).map_err(|e| {
            BridgeError::TransportInit(format!(
                "Failed to acquire GPIO {} under {}: {}",
                pin,
                gpio_root.display(),
                e
            ))
        })?;
        Ok(Self::with_pin(Box::new(writer), format!("GPIO {pin}")))
    }

    /// Builds the transport around any output line.
    #[must_use]
    pub fn with_pin(pin: Box<dyn PinWriter>, label: impl Into<String>) -> Self {
        Self {
            pin: Arc::new(Mutex::new(pin)),
            label: label.into(),
            next_id: 0,
            in_flight: None,
        }
    }
}

#[async_trait]
impl OutputTransport for PpmGpioTransport {
    fn describe(&self) -> String {
        self.label.clone()
    }

    async fn transmit(&mut self, frame: &Frame) -> Result<TxHandle> {
        expect_mode(frame, OutputMode::Ppm)?;
        let Frame::Ppm(ppm) = frame.clone() else {
            return Err(BridgeError::Encoding("Expected a PPM frame".to_string()));
        };
        if self.in_flight.is_some() {
            return Err(BridgeError::Transport(format!(
                "{}: previous frame not released",
                self.label
            )));
        }

        let pin = Arc::clone(&self.pin);
        let task = tokio::task::spawn_blocking(move || {
            let mut pin = pin
                .lock()
                .map_err(|_| io::Error::new(io::ErrorKind::Other, "GPIO lock poisoned"))?;
            play_waveform(pin.as_mut(), &ppm)
        });

        self.next_id += 1;
        self.in_flight = Some((self.next_id, task));
        Ok(TxHandle::new(self.next_id))
    }

    fn is_busy(&self, handle: &TxHandle) -> bool {
        match &self.in_flight {
            Some((id, task)) if *id == handle.id() => !task.is_finished(),
            _ => false,
        }
    }

    async fn release(&mut self, handle: TxHandle) -> Result<()> {
        let Some((id, task)) = self.in_flight.take() else {
            return Ok(());
        };
        if id != handle.id() {
            debug!("{}: releasing stale handle {}", self.label, handle.id());
        }

        // A waveform is never cut short; wait for the line to go idle
        match task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(BridgeError::Transport(format!("{}: {}", self.label, e))),
            Err(e) => Err(BridgeError::Transport(format!(
                "{}: waveform task failed: {}",
                self.label, e
            ))),
        }
    }
}
