//! # Status Indicator
//!
//! Optional status LEDs on GPIO lines:
//! - Power LED: on while the bridge is running
//! - Heartbeat LED: blinks while the bridge is running
//!
//! The indicator runs as its own task and only shares the running flag with
//! the control loop. Both LEDs are switched off when the flag clears.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::StatusConfig;
use crate::transport::gpio::{PinWriter, SysfsPin};

/// Status LEDs driven from the auxiliary task.
pub struct StatusIndicator {
    power: Option<Box<dyn PinWriter>>,
    heartbeat: Option<Box<dyn PinWriter>>,
    blink_interval: Duration,
}

impl StatusIndicator {
    #[must_use]
    pub fn new(
        power: Option<Box<dyn PinWriter>>,
        heartbeat: Option<Box<dyn PinWriter>>,
        blink_interval: Duration,
    ) -> Self {
        Self {
            power,
            heartbeat,
            blink_interval,
        }
    }

    /// Acquires the configured LED lines.
    ///
    /// A line that cannot be acquired is logged and left out; the bridge
    /// runs without it.
    #[must_use]
    pub fn from_config(config: &StatusConfig, gpio_root: &Path) -> Self {
        let acquire = |pin: Option<u32>, role: &str| -> Option<Box<dyn PinWriter>> {
            let pin = pin?;
            match SysfsPin::export_at(gpio_root, pin) {
                Ok(line) => {
                    debug!("{} LED on GPIO {}", role, pin);
                    Some(Box::new(line) as Box<dyn PinWriter>)
                }
                Err(e) => {
                    warn!("{} LED on GPIO {} unavailable: {}", role, pin, e);
                    None
                }
            }
        };

        Self::new(
            acquire(config.power_led_gpio, "Power"),
            acquire(config.heartbeat_led_gpio, "Heartbeat"),
            Duration::from_millis(config.blink_interval_ms),
        )
    }

    /// Whether any LED line is available.
    #[must_use]
    pub fn has_leds(&self) -> bool {
        self.power.is_some() || self.heartbeat.is_some()
    }

    /// Runs the indicator until `running` is cleared.
    pub async fn run(mut self, running: Arc<AtomicBool>) {
        info!("Status indicator started");
        set_led(&mut self.power, true);

        let mut lit = false;
        while running.load(Ordering::SeqCst) {
            lit = !lit;
            set_led(&mut self.heartbeat, lit);
            tokio::time::sleep(self.blink_interval).await;
        }

        set_led(&mut self.heartbeat, false);
        set_led(&mut self.power, false);
        info!("Status indicator stopped");
    }

    /// Spawns [`run`](Self::run) on the tokio runtime.
    pub fn spawn(self, running: Arc<AtomicBool>) -> JoinHandle<()> {
        tokio::spawn(self.run(running))
    }
}

fn set_led(led: &mut Option<Box<dyn PinWriter>>, on: bool) {
    if let Some(pin) = led.as_mut() {
        if let Err(e) = pin.set(on) {
            debug!("Failed to set LED: {}", e);
        }
    }
}
