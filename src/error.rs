use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reasons a pairing attempt ends without a session.
///
/// Every variant is terminal for the attempt: it is reported once as a notice
/// and never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PairingError {
    #[error("Bluetooth not supported")]
    Unavailable,

    #[error("Please enable Bluetooth")]
    Disabled,

    #[error("Bike not found. Pair with {name} first.")]
    PeerNotFound { name: String },

    #[error("Failed to connect to bike: {0}")]
    ChannelOpenFailed(String),
}

/// Rejected controller commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    #[error("Connect to bike first.")]
    NotPaired,

    #[error("Service is not running")]
    ServiceStopped,
}

/// Synchronous failure reported by the messaging transport for one recipient
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Send to {recipient} failed: {reason}")]
pub struct TransportError {
    pub recipient: String,
    pub reason: String,
}

impl TransportError {
    pub fn new(recipient: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid config value: {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pairing_messages_match_notices() {
        assert_eq!(PairingError::Unavailable.to_string(), "Bluetooth not supported");
        assert_eq!(PairingError::Disabled.to_string(), "Please enable Bluetooth");
        assert_eq!(
            PairingError::PeerNotFound { name: "ESP32".to_string() }.to_string(),
            "Bike not found. Pair with ESP32 first."
        );
    }

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::new("+15550100", "radio off");
        assert_eq!(err.to_string(), "Send to +15550100 failed: radio off");
    }
}
