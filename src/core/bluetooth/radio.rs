//! Radio stack seam
//! The core drives the platform BLE stack through [`Radio`] and learns about
//! everything that happens on the air through [`RadioEvent`]s pushed into the
//! link manager's queue.

use futures_util::stream::BoxStream;
use log::debug;
use tokio::sync::mpsc;

use crate::core::bluetooth::errors::RadioError;
use crate::core::bluetooth::manager::Input;
use crate::core::bluetooth::types::{PeerIdentity, ServiceDescriptor};

/// Physical link status reported by the radio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Connected,
    Disconnected,
}

/// Outcome of service discovery on the current link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discovery {
    /// The remote exposes this service/characteristic pair
    Found(ServiceDescriptor),
    NotFound,
}

/// Asynchronous events from the radio stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    ConnectionStateChanged {
        peer: PeerIdentity,
        status: LinkStatus,
    },
    ServicesDiscovered {
        peer: PeerIdentity,
        result: Discovery,
    },
    /// A client wrote the characteristic (server role)
    WriteRequest { peer: PeerIdentity, value: Vec<u8> },
    /// The server notified a new characteristic value (client role)
    CharacteristicChanged { peer: PeerIdentity, value: Vec<u8> },
    PeerDiscovered { generation: u64, peer: PeerIdentity },
    ScanEnded { generation: u64 },
    ScanFailed { generation: u64, reason: String },
    ConnectFailed { peer: PeerIdentity, reason: String },
    DiscoveryFailed { peer: PeerIdentity, reason: String },
    SubscribeFailed { reason: String },
    WriteFailed { reason: String },
    AdvertiseFailed { reason: String },
    AdapterUnavailable { reason: String },
    AdapterAvailable,
}

/// Handle a radio binding uses to push events into the link manager.
///
/// Pushing never blocks; events sent after the manager stopped are dropped.
#[derive(Clone)]
pub struct RadioEventSender {
    inputs: mpsc::UnboundedSender<Input>,
}

impl RadioEventSender {
    pub(crate) fn new(inputs: mpsc::UnboundedSender<Input>) -> Self {
        Self { inputs }
    }

    pub fn send(&self, event: RadioEvent) {
        if self.inputs.send(Input::Radio(event)).is_err() {
            debug!("Link manager stopped, dropping radio event");
        }
    }
}

/// Command interface of the platform BLE stack.
///
/// Every call returns once the platform accepted or finished the operation;
/// the link manager never awaits these on its own task.
#[async_trait::async_trait]
pub trait Radio: Send + Sync {
    /// Registers the service with the local GATT server
    async fn publish_service(&self, descriptor: &ServiceDescriptor) -> Result<(), RadioError>;

    async fn advertise(&self) -> Result<(), RadioError>;

    async fn stop_advertise(&self) -> Result<(), RadioError>;

    /// Starts a scan. The stream runs until dropped.
    async fn scan<'a>(&'a self) -> Result<BoxStream<'a, PeerIdentity>, RadioError>;

    /// Establishes a link; returns once it is up
    async fn connect(&self, peer: &PeerIdentity) -> Result<(), RadioError>;

    async fn discover_services(&self) -> Result<Discovery, RadioError>;

    /// Enables notifications for the characteristic (client role)
    async fn subscribe(&self, descriptor: &ServiceDescriptor) -> Result<(), RadioError>;

    /// Writes the characteristic on the remote server (client role)
    async fn write_characteristic(
        &self,
        descriptor: &ServiceDescriptor,
        value: &[u8],
    ) -> Result<(), RadioError>;

    /// Updates the local characteristic value and notifies the subscriber (server role)
    async fn update_and_notify(
        &self,
        descriptor: &ServiceDescriptor,
        value: &[u8],
    ) -> Result<(), RadioError>;

    async fn disconnect(&self) -> Result<(), RadioError>;

    /// Releases every platform resource held by the binding
    async fn close(&self) -> Result<(), RadioError>;
}
