//! Defines shared data structures for the Bluetooth module.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::Serialize;
use uuid::Uuid;

use crate::core::bluetooth::constants::{CHARACTERISTIC_UUID, SERVICE_UUID};

/// Represents a discovered remote peer
///
/// Two sightings of the same device are the same peer, whatever name they
/// carried, so equality and hashing only look at the address.
#[derive(Debug, Clone, Serialize)]
pub struct PeerIdentity {
    /// Platform address (MAC address on most platforms, an opaque id on macOS)
    pub address: String,
    /// The advertised name of the device, if available
    pub name: Option<String>,
}

impl PeerIdentity {
    /// Creates a new PeerIdentity instance
    pub fn new(address: impl Into<String>, name: Option<String>) -> Self {
        Self {
            address: address.into(),
            name,
        }
    }

    /// Name to show for this peer, falling back to the address
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.address)
    }
}

impl PartialEq for PeerIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for PeerIdentity {}

impl Hash for PeerIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", name, self.address),
            None => f.write_str(&self.address),
        }
    }
}

/// GATT characteristic properties
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacteristicProperties {
    pub read: bool,
    pub write: bool,
    pub notify: bool,
}

/// GATT attribute permissions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacteristicPermissions {
    pub read: bool,
    pub write: bool,
}

/// The service/characteristic pair both roles exchange messages through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub service: Uuid,
    pub characteristic: Uuid,
    pub properties: CharacteristicProperties,
    pub permissions: CharacteristicPermissions,
}

impl ServiceDescriptor {
    /// The Chippy message channel. This is the wire contract between peers.
    pub const CHIPPY: ServiceDescriptor = ServiceDescriptor {
        service: SERVICE_UUID,
        characteristic: CHARACTERISTIC_UUID,
        properties: CharacteristicProperties {
            read: true,
            write: true,
            notify: true,
        },
        permissions: CharacteristicPermissions {
            read: true,
            write: true,
        },
    };
}

impl Default for ServiceDescriptor {
    fn default() -> Self {
        Self::CHIPPY
    }
}

/// Which side of the GATT link the local instance plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Role {
    /// Hosts the service and advertises it
    Server,
    /// Scans for and connects to a server
    Client,
}

/// Link state of the local instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail")]
pub enum ConnectionState {
    Idle,
    Advertising,
    Scanning,
    Connecting(PeerIdentity),
    DiscoveringServices(PeerIdentity),
    Connected(PeerIdentity, Role),
    Disconnecting,
}

impl ConnectionState {
    /// The peer tied to this state, if any
    pub fn peer(&self) -> Option<&PeerIdentity> {
        match self {
            Self::Connecting(peer) | Self::DiscoveringServices(peer) | Self::Connected(peer, _) => {
                Some(peer)
            }
            _ => None,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected(..))
    }

    /// Short state name for logs and status lines
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Advertising => "Advertising",
            Self::Scanning => "Scanning",
            Self::Connecting(_) => "Connecting",
            Self::DiscoveringServices(_) => "DiscoveringServices",
            Self::Connected(..) => "Connected",
            Self::Disconnecting => "Disconnecting",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("Disconnected"),
            Self::Advertising => f.write_str("Advertising..."),
            Self::Scanning => f.write_str("Scanning for devices..."),
            Self::Connecting(peer) => write!(f, "Connecting to {}...", peer.display_name()),
            Self::DiscoveringServices(peer) => {
                write!(f, "Discovering services on {}...", peer.display_name())
            }
            Self::Connected(peer, role) => {
                write!(f, "Connected to {} as {:?}", peer.display_name(), role)
            }
            Self::Disconnecting => f.write_str("Disconnecting..."),
        }
    }
}

/// Direction of a recorded message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    Sent,
    Received,
}

/// One entry of the message log; never mutated after creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageRecord {
    pub direction: Direction,
    pub text: String,
    /// Position in the log, counting both directions
    pub index: u64,
}

impl fmt::Display for MessageRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            Direction::Sent => write!(f, "You: {}", self.text),
            Direction::Received => write!(f, "Received: {}", self.text),
        }
    }
}
