//! # Transmission Scheduler
//!
//! The control loop: reads the joysticks, shapes the channels, encodes a
//! frame and hands it to the output transport, once per cycle.
//!
//! ## Failsafe
//!
//! The scheduler is `Active` while at least one device is connected and
//! `Idle` otherwise. An idle cycle encodes and transmits nothing, so the
//! receiving radio sees the signal disappear and applies its own trainer
//! failsafe. The device count is sampled every cycle:
//!
//! - The first cycle that sees zero devices sends nothing.
//! - The first cycle that sees a device again transmits.
//!
//! ## Cycle
//!
//! ```text
//! poll devices -> (re-resolve on change) -> read + shape -> encode
//!     -> transmit -> wait for completion (bounded) -> release
//! ```
//!
//! A failing encode or transmit skips the cycle; nothing is retried.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::channels::ChannelTable;
use crate::config::Config;
use crate::error::Result;
use crate::frame::{Frame, FrameEncoder};
use crate::input::{DeviceEvent, InputSource};
use crate::recorder::FrameRecorder;
use crate::transport::OutputTransport;

/// Number of frames between status log messages
const LOG_INTERVAL_FRAMES: u64 = 1000;

/// Output state driven by the device count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No device connected; output withheld
    Idle,
    /// At least one device connected; frames are sent
    Active,
}

/// Result of one scheduler cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No device connected, nothing sent
    Idle,
    /// Frame transmitted and released
    Sent(Frame),
    /// Encoding or transmission failed, nothing sent
    Skipped,
}

/// Loop timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    /// Time between frames while active
    pub frame_interval: Duration,
    /// Time between device checks while idle
    pub idle_poll: Duration,
    /// Time between transport completion checks
    pub completion_poll: Duration,
    /// Longest wait for the transport before releasing anyway
    pub completion_timeout: Duration,
    /// Channel table report interval, `None` when not verbose
    pub report_interval: Option<Duration>,
}

impl Pacing {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            frame_interval: config.frame_interval(),
            idle_poll: Duration::from_millis(config.scheduler.idle_poll_ms),
            completion_poll: Duration::from_millis(config.scheduler.completion_poll_ms),
            completion_timeout: Duration::from_millis(config.scheduler.completion_timeout_ms),
            report_interval: config
                .logging
                .verbose
                .then(|| Duration::from_millis(config.logging.table_interval_ms)),
        }
    }
}

/// Paces the loop: fixed frame rate while active, slower polling while idle.
#[derive(Debug)]
pub struct Pacer {
    frame: Interval,
    idle_poll: Duration,
}

impl Pacer {
    /// Creates the pacer. Must be called within a tokio runtime.
    #[must_use]
    pub fn new(frame_interval: Duration, idle_poll: Duration) -> Self {
        let mut frame = tokio::time::interval(frame_interval);
        frame.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { frame, idle_poll }
    }

    /// Waits for the next frame slot.
    pub async fn next_frame(&mut self) {
        self.frame.tick().await;
    }

    /// Waits one idle poll period.
    pub async fn idle(&mut self) {
        tokio::time::sleep(self.idle_poll).await;
        self.frame.reset();
    }
}

/// Owns the whole pipeline from input to transport.
pub struct TransmissionScheduler<I: InputSource> {
    input: I,
    transport: Box<dyn OutputTransport>,
    encoder: Box<dyn FrameEncoder>,
    channels: ChannelTable,
    pacing: Pacing,
    state: SchedulerState,
    recorder: Option<FrameRecorder>,
    last_report: Option<Instant>,
    frames_sent: u64,
    cycles_skipped: u64,
}

impl<I: InputSource> TransmissionScheduler<I> {
    /// Creates a scheduler in the `Idle` state.
    ///
    /// # Arguments
    ///
    /// * `input` - Joystick source
    /// * `transport` - Opened output backend
    /// * `encoder` - Encoder matching the transport's wire format
    /// * `channels` - Parsed channel table
    /// * `pacing` - Loop timing
    pub fn new(
        input: I,
        transport: Box<dyn OutputTransport>,
        encoder: Box<dyn FrameEncoder>,
        channels: ChannelTable,
        pacing: Pacing,
    ) -> Self {
        Self {
            input,
            transport,
            encoder,
            channels,
            pacing,
            state: SchedulerState::Idle,
            recorder: None,
            last_report: None,
            frames_sent: 0,
            cycles_skipped: 0,
        }
    }

    /// Records every transmitted frame.
    #[must_use]
    pub fn with_recorder(mut self, recorder: FrameRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    #[must_use]
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    #[must_use]
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    #[must_use]
    pub fn cycles_skipped(&self) -> u64 {
        self.cycles_skipped
    }

    #[must_use]
    pub fn input(&self) -> &I {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut I {
        &mut self.input
    }

    /// Runs one cycle.
    pub async fn cycle(&mut self) -> CycleOutcome {
        let events = self.input.poll();
        if !events.is_empty() {
            self.on_device_change(&events);
        }

        let device_count = self.input.device_count();
        self.update_state(device_count);

        if self.state == SchedulerState::Idle {
            if self.report_due() {
                let pulses = self.channels.read_pulses(&self.input);
                self.report(&pulses, device_count);
            }
            return CycleOutcome::Idle;
        }

        let pulses = self.channels.read_pulses(&self.input);
        if self.report_due() {
            self.report(&pulses, device_count);
        }

        let frame = match self.encoder.encode(&pulses) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Cycle skipped: {}", e);
                self.cycles_skipped += 1;
                return CycleOutcome::Skipped;
            }
        };

        if let Err(e) = self.transmit(&frame).await {
            warn!("Cycle skipped: {}", e);
            self.cycles_skipped += 1;
            return CycleOutcome::Skipped;
        }

        self.frames_sent += 1;
        debug!("Sent {} frame: {:?}", frame.mode(), pulses);
        if self.frames_sent % LOG_INTERVAL_FRAMES == 0 {
            info!("Sent {} frames ({} skipped)", self.frames_sent, self.cycles_skipped);
        }

        if let Some(recorder) = self.recorder.as_mut() {
            if let Err(e) = recorder.record(frame.mode(), device_count, &pulses) {
                warn!("Failed to record frame: {}", e);
            }
        }

        CycleOutcome::Sent(frame)
    }

    /// Runs cycles until `running` is cleared.
    pub async fn run(&mut self, running: &AtomicBool) {
        info!(
            "Scheduler started: {} channels, {} output on {}",
            self.channels.len(),
            self.encoder.mode(),
            self.transport.describe()
        );
        let mut pacer = Pacer::new(self.pacing.frame_interval, self.pacing.idle_poll);

        while running.load(Ordering::SeqCst) {
            match self.cycle().await {
                CycleOutcome::Idle => pacer.idle().await,
                CycleOutcome::Sent(_) | CycleOutcome::Skipped => pacer.next_frame().await,
            }
        }

        info!(
            "Scheduler stopped: {} frames sent, {} cycles skipped",
            self.frames_sent, self.cycles_skipped
        );
    }

    /// Hands the frame to the transport and waits for it to leave the wire.
    async fn transmit(&mut self, frame: &Frame) -> Result<()> {
        let handle = self.transport.transmit(frame).await?;

        let deadline = Instant::now() + self.pacing.completion_timeout;
        while self.transport.is_busy(&handle) {
            if Instant::now() >= deadline {
                warn!(
                    "Transport still busy after {:?}, releasing frame {}",
                    self.pacing.completion_timeout,
                    handle.id()
                );
                break;
            }
            tokio::time::sleep(self.pacing.completion_poll).await;
        }

        self.transport.release(handle).await
    }

    fn on_device_change(&mut self, events: &[DeviceEvent]) {
        for event in events {
            match event {
                DeviceEvent::Added { key, name } => info!("Joystick {} connected: {}", key, name),
                DeviceEvent::Removed { key } => info!("Joystick {} disconnected", key),
            }
        }
        self.channels.log_resolution(&self.input);
    }

    fn update_state(&mut self, device_count: usize) {
        let next = if device_count > 0 {
            SchedulerState::Active
        } else {
            SchedulerState::Idle
        };
        if next != self.state {
            match next {
                SchedulerState::Active => info!("{} joystick(s) connected, output enabled", device_count),
                SchedulerState::Idle => warn!("No joystick connected, output withheld"),
            }
            self.state = next;
        }
    }

    fn report_due(&self) -> bool {
        match self.pacing.report_interval {
            None => false,
            Some(interval) => self
                .last_report
                .map_or(true, |last| last.elapsed() >= interval),
        }
    }

    fn report(&mut self, pulses: &[u16], device_count: usize) {
        self.last_report = Some(Instant::now());
        info!("\n{}", self.channels.render_report(pulses, device_count));
    }
}
