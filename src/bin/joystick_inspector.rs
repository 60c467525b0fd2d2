//! # Joystick Inspector
//!
//! Prints every axis, button and hat change of every connected joystick,
//! using the same device keys and indices as the channel mapping syntax
//! (`joy0:axis:1`, `joy0:button:3`, `joy0:hat:0:1`).
//!
//! Press Ctrl+C to exit.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::time::interval;
use tracing_subscriber::EnvFilter;

use trainer_bridge::input::joystick::{Joystick, DEFAULT_INPUT_DIR};
use trainer_bridge::input::{DeviceEvent, EvdevInput, InputSource};

/// Axis changes smaller than this are not printed
const AXIS_PRINT_THRESHOLD: f32 = 0.01;

/// Command line arguments
#[derive(Debug, Parser)]
#[command(name = "joystick-inspector", version, about = "Show joystick control indices for mapping")]
struct Args {
    /// Directory containing evdev nodes
    #[arg(short, long, default_value = DEFAULT_INPUT_DIR)]
    input_dir: PathBuf,

    /// Poll interval in milliseconds
    #[arg(short, long, default_value_t = 10)]
    poll_ms: u64,
}

/// Last printed state of one joystick
#[derive(Debug, Clone, Default, PartialEq)]
struct Snapshot {
    axes: Vec<f32>,
    buttons: Vec<bool>,
    hats: Vec<(i8, i8)>,
}

impl Snapshot {
    fn of(joystick: &Joystick) -> Self {
        Self {
            axes: joystick.axes().to_vec(),
            buttons: joystick.buttons().to_vec(),
            hats: joystick.hats().to_vec(),
        }
    }
}

/// Describes what changed between two snapshots, one line per control.
fn changes(key: &str, name: &str, old: &Snapshot, new: &Snapshot) -> Vec<String> {
    let mut lines = Vec::new();

    for (index, (&before, &after)) in old.axes.iter().zip(&new.axes).enumerate() {
        if (after - before).abs() >= AXIS_PRINT_THRESHOLD {
            lines.push(format!("[{name}] {key}:axis:{index} moved: {after:.3}"));
        }
    }

    for (index, (&before, &after)) in old.buttons.iter().zip(&new.buttons).enumerate() {
        if before != after {
            let state = if after { "pressed" } else { "released" };
            lines.push(format!("[{name}] {key}:button:{index} {state}"));
        }
    }

    for (index, (&before, &after)) in old.hats.iter().zip(&new.hats).enumerate() {
        if before != after {
            lines.push(format!("[{name}] {key}:hat:{index} moved: ({}, {})", after.0, after.1));
        }
    }

    lines
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()))
        .init();

    let args = Args::parse();
    let mut input = EvdevInput::new(&args.input_dir, Duration::from_secs(1));
    let mut snapshots: HashMap<String, Snapshot> = HashMap::new();
    let mut ticker = interval(Duration::from_millis(args.poll_ms.max(1)));

    println!("Monitoring joystick events. Move an axis or press a button to see details.");
    println!("Press Ctrl+C to exit.\n");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for event in input.poll() {
                    match event {
                        DeviceEvent::Added { key, name } => println!("Initialized {key}: {name}"),
                        DeviceEvent::Removed { key } => {
                            snapshots.remove(&key);
                            println!("Disconnected {key}");
                        }
                    }
                }

                for (key, joystick) in input.devices() {
                    let current = Snapshot::of(joystick);
                    match snapshots.get(&key) {
                        Some(previous) => {
                            for line in changes(&key, joystick.name(), previous, &current) {
                                println!("{line}");
                            }
                        }
                        None => {
                            let layout = joystick.layout();
                            println!(
                                "{key}: {} axes, {} buttons, {} hats",
                                layout.axes.len(),
                                layout.buttons.len(),
                                layout.hats.len()
                            );
                        }
                    }
                    snapshots.insert(key, current);
                }
            }

            _ = tokio::signal::ctrl_c() => {
                println!("\nExiting inspector...");
                break;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(axes: &[f32], buttons: &[bool], hats: &[(i8, i8)]) -> Snapshot {
        Snapshot {
            axes: axes.to_vec(),
            buttons: buttons.to_vec(),
            hats: hats.to_vec(),
        }
    }

    #[test]
    fn test_no_changes() {
        let s = snapshot(&[0.0, 0.5], &[false], &[(0, 0)]);
        assert!(changes("joy0", "Pad", &s, &s).is_empty());
    }

    #[test]
    fn test_changes_use_mapping_syntax() {
        let old = snapshot(&[0.0, 0.0], &[false, false], &[(0, 0)]);
        let new = snapshot(&[0.0, -0.75], &[false, true], &[(0, 1)]);
        let lines = changes("joy1", "Pad", &old, &new);
        assert_eq!(
            lines,
            vec![
                "[Pad] joy1:axis:1 moved: -0.750",
                "[Pad] joy1:button:1 pressed",
                "[Pad] joy1:hat:0 moved: (0, 1)",
            ]
        );
    }

    #[test]
    fn test_axis_noise_ignored() {
        let old = snapshot(&[0.0], &[], &[]);
        let new = snapshot(&[0.005], &[], &[]);
        assert!(changes("joy0", "Pad", &old, &new).is_empty());
    }
}
