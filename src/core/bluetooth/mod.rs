//! Bluetooth functionality for the Chippy messenger
//! This module holds the link state machine, the message channel and the
//! radio binding used to exchange text with a single peer.

mod channel;
mod codec;
mod commands;
mod connection;
mod constants;
mod errors;
mod events;
mod machine;
mod manager;
#[cfg(test)]
pub(crate) mod mock;
mod notification;
mod peripheral;
mod radio;
mod scanner;
mod types;

// Re-export types that should be publicly accessible
pub use codec::{decode, encode};
pub use connection::PlatformRadio;
pub use constants::*; // Re-export all constants
pub use errors::{LinkError, RadioError};
pub use events::Notice;
pub use machine::LinkTimeouts;
pub use manager::{ChatHandle, LinkManager};
pub use radio::{Discovery, LinkStatus, Radio, RadioEvent, RadioEventSender};
pub use types::{
    CharacteristicPermissions, CharacteristicProperties, ConnectionState, Direction,
    MessageRecord, PeerIdentity, Role, ServiceDescriptor,
};
