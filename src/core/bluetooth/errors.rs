//! Error taxonomy of the link

use bluest::error::ErrorKind;
use thiserror::Error;

use crate::core::bluetooth::types::PeerIdentity;

/// Failures surfaced by the link, either synchronously to a caller or as
/// notices on the event sink.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("Bluetooth permissions denied")]
    PermissionDenied,

    #[error("Bluetooth radio unavailable: {0}")]
    RadioUnavailable(String),

    #[error("Failed to connect to {peer}: {reason}")]
    ConnectFailed { peer: PeerIdentity, reason: String },

    #[error("{peer} does not expose the Chippy service")]
    IncompatiblePeer { peer: PeerIdentity },

    #[error("Lost connection to {peer}")]
    LinkDropped { peer: PeerIdentity },

    #[error("Not connected")]
    SendWhileDisconnected,

    #[error("Message from {peer} was not valid UTF-8 and was decoded lossily")]
    DecodeLossy { peer: PeerIdentity },

    #[error("Failed to deliver message: {0}")]
    WriteFailed(String),

    #[error("Failed to start advertising: {0}")]
    AdvertiseFailed(String),

    #[error("Scan failed: {0}")]
    ScanFailed(String),

    #[error("Cannot {command} while {state}")]
    InvalidCommand {
        command: &'static str,
        state: &'static str,
    },

    #[error("Link manager has stopped")]
    Closed,
}

/// Failures reported by a radio binding
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RadioError {
    #[error("{0} is not supported by this radio")]
    Unsupported(&'static str),

    #[error("Bluetooth permissions denied")]
    PermissionDenied,

    #[error("No Bluetooth adapter available: {0}")]
    Unavailable(String),

    #[error("Device not found with ID: {0}")]
    UnknownPeer(String),

    #[error("No device connected")]
    NotLinked,

    #[error("Characteristic not found: {0}")]
    MissingCharacteristic(uuid::Uuid),

    #[error("{0}")]
    Platform(String),
}

impl LinkError {
    /// Maps a failure to bring the radio up, before any link activity
    pub fn activation(e: RadioError) -> Self {
        match e {
            RadioError::PermissionDenied => LinkError::PermissionDenied,
            RadioError::Unavailable(reason) => LinkError::RadioUnavailable(reason),
            other => LinkError::RadioUnavailable(other.to_string()),
        }
    }
}

impl From<bluest::Error> for RadioError {
    fn from(e: bluest::Error) -> Self {
        match e.kind() {
            ErrorKind::NotAuthorized => RadioError::PermissionDenied,
            ErrorKind::AdapterUnavailable => RadioError::Unavailable(e.to_string()),
            _ => RadioError::Platform(e.to_string()),
        }
    }
}
