//! # Trainer Bridge
//!
//! Drive an RC transmitter's trainer port from USB joysticks.
//!
//! Reads every connected joystick, maps controls to channels, and sends the
//! result as PPM (GPIO) or SBUS (serial) to the transmitter's trainer input.
//! Output stops while no joystick is connected.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use trainer_bridge::channels::ChannelTable;
use trainer_bridge::config::Config;
use trainer_bridge::frame::{encoder_for, OutputMode};
use trainer_bridge::input::EvdevInput;
use trainer_bridge::recorder::FrameRecorder;
use trainer_bridge::scheduler::{Pacing, TransmissionScheduler};
use trainer_bridge::status::StatusIndicator;
use trainer_bridge::transport::open_transport;

/// Default configuration file path
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Command line arguments
#[derive(Debug, Parser)]
#[command(name = "trainer-bridge", version, about = "Joystick to PPM/SBUS trainer bridge")]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Output mode override (ppm or sbus)
    #[arg(short, long)]
    mode: Option<OutputMode>,

    /// Periodically log the channel table
    #[arg(short, long)]
    verbose: bool,
}

/// Sets up console logging, plus a daily-rolling log file when configured.
///
/// The returned guard must be kept alive for the file writer to flush.
fn init_logging(log_dir: Option<&PathBuf>) -> Option<WorkerGuard> {
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());
    let registry = tracing_subscriber::registry().with(filter).with(fmt::layer());

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "trainer-bridge.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            registry.init();
            None
        }
    }
}

/// Main entry point for Trainer Bridge
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load and validate configuration, apply command line overrides
///    - Set up logging
///    - Open the output transport (fatal on failure)
///
/// 2. **Main Loop**
///    - Scheduler cycles until Ctrl+C
///    - Status LEDs run as a separate task
///
/// 3. **Graceful Shutdown**
///    - Clear the running flag, wait for the status task
///    - GPIO lines and the serial port are released on drop
///
/// # Errors
///
/// Returns error if the configuration is invalid or the output transport
/// cannot be opened.
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    if let Some(mode) = args.mode {
        config.output.mode = mode;
        config.validate().context("Invalid configuration for selected mode")?;
    }
    if args.verbose {
        config.logging.verbose = true;
    }

    let _log_guard = init_logging(config.logging.log_dir.as_ref());
    info!("Trainer Bridge v{} starting...", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from {}", args.config.display());

    let channels = ChannelTable::from_config(&config)?;
    let rejected = channels.diagnostics().count();
    if rejected > 0 {
        warn!("{} channel mapping(s) rejected, those channels output neutral", rejected);
    }

    let transport = open_transport(&config).context("Failed to open output")?;
    let encoder = encoder_for(config.output.mode, config.pulse.range(), config.ppm.timing());
    let input = EvdevInput::new(
        &config.input.dir,
        Duration::from_millis(config.input.rescan_interval_ms),
    );

    let mut scheduler =
        TransmissionScheduler::new(input, transport, encoder, channels, Pacing::from_config(&config));
    if config.recorder.enabled {
        scheduler = scheduler.with_recorder(FrameRecorder::new(&config.recorder)?);
    }

    let running = Arc::new(AtomicBool::new(true));

    let status_task = config.status.enabled.then(|| {
        StatusIndicator::from_config(&config.status, &config.ppm.gpio_root).spawn(Arc::clone(&running))
    });

    let shutdown_flag = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down..."),
            Err(e) => warn!("Failed to listen for Ctrl+C: {}", e),
        }
        shutdown_flag.store(false, Ordering::SeqCst);
    });

    info!("Press Ctrl+C to exit");
    scheduler.run(&running).await;
    running.store(false, Ordering::SeqCst);

    if let Some(task) = status_task {
        if let Err(e) = task.await {
            warn!("Status task failed: {}", e);
        }
    }

    info!("Trainer Bridge stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["trainer-bridge"]);
        assert_eq!(args.config, PathBuf::from(DEFAULT_CONFIG_PATH));
        assert_eq!(args.mode, None);
        assert!(!args.verbose);
    }

    #[test]
    fn test_args_overrides() {
        let args = Args::parse_from(["trainer-bridge", "-c", "my.toml", "--mode", "sbus", "-v"]);
        assert_eq!(args.config, PathBuf::from("my.toml"));
        assert_eq!(args.mode, Some(OutputMode::Sbus));
        assert!(args.verbose);
    }

    #[test]
    fn test_args_reject_unknown_mode() {
        assert!(Args::try_parse_from(["trainer-bridge", "--mode", "crsf"]).is_err());
    }
}
