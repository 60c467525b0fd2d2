//! # Error Types
//!
//! Custom error types for Trainer Bridge using `thiserror`.

use thiserror::Error;

use crate::channels::MappingError;

/// Main error type for Trainer Bridge
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Configuration file could not be parsed
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Configuration parsed but a value is out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Channel mapping descriptor could not be parsed
    #[error("Channel {channel} mapping error: {source}")]
    Mapping {
        channel: usize,
        #[source]
        source: MappingError,
    },

    /// A mapping references a device that is not connected
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// A frame could not be produced or was rejected by the transport
    #[error("Encoding failure: {0}")]
    Encoding(String),

    /// The output backend could not be opened
    #[error("Transport initialization failed: {0}")]
    TransportInit(String),

    /// The output backend failed while transmitting
    #[error("Transport error: {0}")]
    Transport(String),

    /// Input device errors
    #[error("Input error: {0}")]
    Input(String),

    /// JSON serialization errors (frame recorder)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Trainer Bridge
pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_error_display_names_channel() {
        let err = BridgeError::Mapping {
            channel: 3,
            source: MappingError::UnknownControlType("slider".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.contains("Channel 3"));
        assert!(msg.contains("slider"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: BridgeError = io.into();
        assert!(matches!(err, BridgeError::Io(_)));
    }
}
