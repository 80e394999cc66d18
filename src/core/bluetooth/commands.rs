//! Radio commands and their executor
//! The link manager never talks to the radio directly. It queues
//! [`RadioCommand`]s for the [`CommandExecutor`], which runs them on its own
//! task and reports their outcome back as radio events.

use std::sync::Arc;

use futures_util::StreamExt;
use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::radio::{LinkStatus, Radio, RadioEvent, RadioEventSender};
use crate::core::bluetooth::types::{PeerIdentity, ServiceDescriptor};

/// Commands issued to the radio stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioCommand {
    PublishService(ServiceDescriptor),
    Advertise,
    StopAdvertise,
    /// Start scan number `generation`; results are tagged with it
    Scan { generation: u64 },
    StopScan,
    Connect(PeerIdentity),
    DiscoverServices(PeerIdentity),
    Subscribe(ServiceDescriptor),
    WriteCharacteristic {
        descriptor: ServiceDescriptor,
        value: Vec<u8>,
    },
    UpdateAndNotify {
        descriptor: ServiceDescriptor,
        value: Vec<u8>,
    },
    /// Tear the link down; the peer, when known, gets a disconnected event on success
    Disconnect { peer: Option<PeerIdentity> },
    Close,
}

/// Runs radio commands in the order they were issued.
///
/// `Connect` and `DiscoverServices` run detached so a teardown is never stuck
/// behind a link that does not come up. Scans run in a forwarding task that
/// `StopScan` cancels.
pub struct CommandExecutor {
    radio: Arc<dyn Radio>,
    events: RadioEventSender,
    scan_cancel: Option<CancellationToken>,
}

impl CommandExecutor {
    /// Create a new CommandExecutor
    pub fn new(radio: Arc<dyn Radio>, events: RadioEventSender) -> Self {
        Self {
            radio,
            events,
            scan_cancel: None,
        }
    }

    /// Moves the executor onto its own task
    pub fn spawn(self) -> (mpsc::UnboundedSender<RadioCommand>, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(self.run(rx));
        (tx, handle)
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<RadioCommand>) {
        info!("Radio command executor started");
        while let Some(command) = commands.recv().await {
            let closing = matches!(command, RadioCommand::Close);
            self.execute(command).await;
            if closing {
                break;
            }
        }
        self.cancel_scan();
        info!("Radio command executor stopped");
    }

    async fn execute(&mut self, command: RadioCommand) {
        debug!("Executing radio command: {:?}", command);
        match command {
            RadioCommand::PublishService(descriptor) => {
                if let Err(e) = self.radio.publish_service(&descriptor).await {
                    error!("Failed to publish service {}: {}", descriptor.service, e);
                    self.events.send(RadioEvent::AdvertiseFailed {
                        reason: e.to_string(),
                    });
                }
            }
            RadioCommand::Advertise => {
                if let Err(e) = self.radio.advertise().await {
                    error!("Failed to start advertising: {}", e);
                    self.events.send(RadioEvent::AdvertiseFailed {
                        reason: e.to_string(),
                    });
                }
            }
            RadioCommand::StopAdvertise => {
                if let Err(e) = self.radio.stop_advertise().await {
                    warn!("Failed to stop advertising: {}", e);
                }
            }
            RadioCommand::Scan { generation } => self.start_scan(generation),
            RadioCommand::StopScan => self.cancel_scan(),
            RadioCommand::Connect(peer) => {
                let radio = Arc::clone(&self.radio);
                let events = self.events.clone();
                tokio::spawn(async move {
                    info!("Initiating connection to {}...", peer);
                    match radio.connect(&peer).await {
                        Ok(()) => events.send(RadioEvent::ConnectionStateChanged {
                            peer,
                            status: LinkStatus::Connected,
                        }),
                        Err(e) => {
                            warn!("Connection to {} failed: {}", peer, e);
                            events.send(RadioEvent::ConnectFailed {
                                peer,
                                reason: e.to_string(),
                            });
                        }
                    }
                });
            }
            RadioCommand::DiscoverServices(peer) => {
                let radio = Arc::clone(&self.radio);
                let events = self.events.clone();
                tokio::spawn(async move {
                    match radio.discover_services().await {
                        Ok(result) => events.send(RadioEvent::ServicesDiscovered { peer, result }),
                        Err(e) => {
                            warn!("Service discovery on {} failed: {}", peer, e);
                            events.send(RadioEvent::DiscoveryFailed {
                                peer,
                                reason: e.to_string(),
                            });
                        }
                    }
                });
            }
            RadioCommand::Subscribe(descriptor) => {
                if let Err(e) = self.radio.subscribe(&descriptor).await {
                    error!("Failed to subscribe to notifications: {}", e);
                    self.events.send(RadioEvent::SubscribeFailed {
                        reason: e.to_string(),
                    });
                }
            }
            RadioCommand::WriteCharacteristic { descriptor, value } => {
                if let Err(e) = self.radio.write_characteristic(&descriptor, &value).await {
                    error!("Characteristic write failed: {}", e);
                    self.events.send(RadioEvent::WriteFailed {
                        reason: e.to_string(),
                    });
                }
            }
            RadioCommand::UpdateAndNotify { descriptor, value } => {
                if let Err(e) = self.radio.update_and_notify(&descriptor, &value).await {
                    error!("Characteristic notify failed: {}", e);
                    self.events.send(RadioEvent::WriteFailed {
                        reason: e.to_string(),
                    });
                }
            }
            RadioCommand::Disconnect { peer } => match self.radio.disconnect().await {
                Ok(()) => {
                    if let Some(peer) = peer {
                        self.events.send(RadioEvent::ConnectionStateChanged {
                            peer,
                            status: LinkStatus::Disconnected,
                        });
                    }
                }
                Err(e) => warn!("Disconnect failed: {}", e),
            },
            RadioCommand::Close => {
                self.cancel_scan();
                if let Err(e) = self.radio.close().await {
                    warn!("Failed to close radio: {}", e);
                }
            }
        }
    }

    fn start_scan(&mut self, generation: u64) {
        self.cancel_scan();
        let cancel = CancellationToken::new();
        self.scan_cancel = Some(cancel.clone());

        let radio = Arc::clone(&self.radio);
        let events = self.events.clone();
        tokio::spawn(async move {
            let mut peers = match radio.scan().await {
                Ok(peers) => peers,
                Err(e) => {
                    error!("Failed to start scan: {}", e);
                    events.send(RadioEvent::ScanFailed {
                        generation,
                        reason: e.to_string(),
                    });
                    return;
                }
            };
            info!("Scan {} started", generation);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Scan {} cancelled", generation);
                        break;
                    }
                    found = peers.next() => match found {
                        Some(peer) => events.send(RadioEvent::PeerDiscovered { generation, peer }),
                        None => {
                            info!("Bluetooth scan stream has ended.");
                            events.send(RadioEvent::ScanEnded { generation });
                            break;
                        }
                    },
                }
            }
        });
    }

    fn cancel_scan(&mut self) {
        if let Some(cancel) = self.scan_cancel.take() {
            cancel.cancel();
        }
    }
}
