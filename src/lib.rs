//! # Trainer Bridge Library
//!
//! Drive an RC transmitter's trainer port from USB joysticks.
//!
//! This library provides the core functionality for turning joystick input
//! into PPM pulse trains (GPIO) or SBUS frames (serial), with output withheld
//! whenever no joystick is connected so the radio falls back to its own
//! trainer failsafe.

pub mod channels;
pub mod config;
pub mod curve;
pub mod error;
pub mod frame;
pub mod input;
pub mod recorder;
pub mod scheduler;
pub mod status;
pub mod transport;
