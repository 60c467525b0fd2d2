//! # Output Transport Module
//!
//! Physical transmission of encoded frames.
//!
//! This module handles:
//! - The [`OutputTransport`] boundary used by the scheduler
//! - PPM pulse trains on a GPIO line ([`ppm_gpio`], [`gpio`])
//! - SBUS frames on a serial port at 100 000 baud ([`serial`])
//!
//! A transport accepts one frame at a time: `transmit` starts it, `is_busy`
//! reports whether it is still on the wire, and `release` frees it.

pub mod gpio;
pub mod port_trait;
pub mod ppm_gpio;
pub mod serial;

use async_trait::async_trait;
use tracing::info;

use crate::config::Config;
use crate::error::{BridgeError, Result};
use crate::frame::{Frame, OutputMode};

pub use ppm_gpio::PpmGpioTransport;
pub use serial::SbusSerialTransport;

/// Completion handle for a frame handed to a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxHandle {
    id: u64,
}

impl TxHandle {
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self { id }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Transmits encoded frames, one in flight at a time.
#[async_trait]
pub trait OutputTransport: Send {
    /// Human-readable description for logs (device path, pin).
    fn describe(&self) -> String;

    /// Starts transmitting a frame.
    ///
    /// # Errors
    ///
    /// Returns `Encoding` error if the frame does not match this transport's
    /// wire format, `Transport` error if the hardware rejects it.
    async fn transmit(&mut self, frame: &Frame) -> Result<TxHandle>;

    /// Whether the frame behind `handle` is still being transmitted.
    fn is_busy(&self, handle: &TxHandle) -> bool;

    /// Frees the resources of a completed (or abandoned) transmission.
    ///
    /// # Errors
    ///
    /// Returns `Transport` error if the transmission itself failed.
    async fn release(&mut self, handle: TxHandle) -> Result<()>;
}

/// Opens the transport for the configured output mode.
///
/// # Errors
///
/// Returns `TransportInit` error if the GPIO line or serial port cannot be
/// acquired; the caller must not enter the main loop in that case.
pub fn open_transport(config: &Config) -> Result<Box<dyn OutputTransport>> {
    match config.output.mode {
        OutputMode::Ppm => {
            let transport = PpmGpioTransport::open(config.ppm.gpio_pin, &config.ppm.gpio_root)?;
            info!("PPM output on {}", transport.describe());
            Ok(Box::new(transport))
        }
        OutputMode::Sbus => {
            let transport = SbusSerialTransport::open(&config.sbus)?;
            info!("SBUS output on {}", transport.describe());
            Ok(Box::new(transport))
        }
    }
}

/// Rejects frames of the wrong wire format.
pub(crate) fn expect_mode(frame: &Frame, mode: OutputMode) -> Result<()> {
    if frame.mode() == mode {
        Ok(())
    } else {
        Err(BridgeError::Encoding(format!(
            "{} transport cannot send a {} frame",
            mode,
            frame.mode()
        )))
    }
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    /// Transport that records frames and stays busy for a set number of polls
    #[derive(Clone, Default)]
    pub struct MockTransport {
        pub sent: Arc<Mutex<Vec<Frame>>>,
        pub released: Arc<Mutex<Vec<TxHandle>>>,
        pub busy_polls: Arc<AtomicU32>,
        pub busy_for: u32,
        pub fail_transmit: Arc<AtomicBool>,
        next_id: u64,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Each frame reports busy for `polls` calls to `is_busy`
        pub fn busy_for(polls: u32) -> Self {
            Self {
                busy_for: polls,
                ..Self::default()
            }
        }

        pub fn sent_frames(&self) -> Vec<Frame> {
            self.sent.lock().unwrap().clone()
        }

        pub fn released_count(&self) -> usize {
            self.released.lock().unwrap().len()
        }

        pub fn set_fail_transmit(&self, fail: bool) {
            self.fail_transmit.store(fail, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl OutputTransport for MockTransport {
        fn describe(&self) -> String {
            "mock".to_string()
        }

        async fn transmit(&mut self, frame: &Frame) -> Result<TxHandle> {
            if self.fail_transmit.load(Ordering::SeqCst) {
                return Err(BridgeError::Transport("Mock transmit error".to_string()));
            }
            self.sent.lock().unwrap().push(frame.clone());
            self.busy_polls.store(self.busy_for, Ordering::SeqCst);
            self.next_id += 1;
            Ok(TxHandle::new(self.next_id))
        }

        fn is_busy(&self, _handle: &TxHandle) -> bool {
            self.busy_polls
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }

        async fn release(&mut self, handle: TxHandle) -> Result<()> {
            self.released.lock().unwrap().push(handle);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::PulseRange;
    use crate::frame::{FrameEncoder, PpmEncoder, PpmTiming, SbusEncoder};

    #[test]
    fn test_expect_mode() {
        let ppm = PpmEncoder::new(PpmTiming::default()).encode(&[1500; 8]).unwrap();
        let sbus = SbusEncoder::new(PulseRange::default()).encode(&[1500; 8]).unwrap();

        assert!(expect_mode(&ppm, OutputMode::Ppm).is_ok());
        assert!(expect_mode(&sbus, OutputMode::Sbus).is_ok());
        assert!(matches!(expect_mode(&sbus, OutputMode::Ppm), Err(BridgeError::Encoding(_))));
    }

    #[test]
    fn test_mock_busy_then_released() {
        let frame = SbusEncoder::new(PulseRange::default()).encode(&[1500; 16]).unwrap();
        let mut transport = mocks::MockTransport::busy_for(2);

        let handle = tokio_test::block_on(transport.transmit(&frame)).unwrap();
        assert!(transport.is_busy(&handle));
        assert!(transport.is_busy(&handle));
        assert!(!transport.is_busy(&handle));

        tokio_test::block_on(transport.release(handle)).unwrap();
        assert_eq!(transport.sent_frames(), vec![frame]);
        assert_eq!(transport.released_count(), 1);
    }

    #[test]
    fn test_tx_handle_id() {
        assert_eq!(TxHandle::new(7).id(), 7);
    }

    #[test]
    fn test_open_transport_fails_without_hardware() {
        let mut config = Config::default();
        config.ppm.gpio_root = "/nonexistent/gpio".into();
        assert!(matches!(open_transport(&config), Err(BridgeError::TransportInit(_))));

        config.output.mode = OutputMode::Sbus;
        config.sbus.port = "/dev/nonexistent_sbus_port".to_string();
        assert!(matches!(open_transport(&config), Err(BridgeError::TransportInit(_))));
    }
}
