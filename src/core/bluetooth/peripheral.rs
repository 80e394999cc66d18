//! GATT server for the server role
//! Hosts the message characteristic with `ble-peripheral-rust`. The platform
//! peripheral is not `Send`, so it lives on its own thread with a
//! current-thread runtime and is driven through a request channel.

use ble_peripheral_rust::{
    Peripheral as GattPeripheral, PeripheralImpl,
    gatt::{
        characteristic::Characteristic,
        peripheral_event::{
            PeripheralEvent, ReadRequestResponse, RequestResponse, WriteRequestResponse,
        },
        properties::{AttributePermission, CharacteristicProperty},
        service::Service,
    },
};
use log::{debug, error, info, warn};
use tokio::sync::{mpsc, oneshot};

use crate::core::bluetooth::constants::{ADVERTISED_NAME, PERIPHERAL_EVENT_CAPACITY};
use crate::core::bluetooth::errors::RadioError;
use crate::core::bluetooth::radio::{LinkStatus, RadioEvent, RadioEventSender};
use crate::core::bluetooth::types::{PeerIdentity, ServiceDescriptor};

type Reply = oneshot::Sender<Result<(), RadioError>>;

enum ServerRequest {
    Publish(ServiceDescriptor, Reply),
    Advertise(Reply),
    StopAdvertise(Reply),
    Notify { value: Vec<u8>, reply: Reply },
    /// Forgets the subscribed client and stops advertising
    Release(Reply),
}

/// Handle to the GATT server thread
pub struct GattServer {
    requests: mpsc::UnboundedSender<ServerRequest>,
}

impl GattServer {
    /// Starts the server thread. Radio events from remote clients go to `events`.
    pub fn spawn(events: RadioEventSender) -> Self {
        let (requests, rx) = mpsc::unbounded_channel();
        std::thread::spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    error!("Failed to start GATT server runtime: {}", e);
                    return;
                }
            };
            runtime.block_on(run(rx, events));
        });
        Self { requests }
    }

    pub async fn publish(&self, descriptor: &ServiceDescriptor) -> Result<(), RadioError> {
        let descriptor = *descriptor;
        self.request(|reply| ServerRequest::Publish(descriptor, reply))
            .await
    }

    pub async fn advertise(&self) -> Result<(), RadioError> {
        self.request(ServerRequest::Advertise).await
    }

    pub async fn stop_advertise(&self) -> Result<(), RadioError> {
        self.request(ServerRequest::StopAdvertise).await
    }

    /// Stores `value` in the characteristic and notifies the subscribed client
    pub async fn notify(&self, value: &[u8]) -> Result<(), RadioError> {
        let value = value.to_vec();
        self.request(|reply| ServerRequest::Notify { value, reply })
            .await
    }

    pub async fn release(&self) -> Result<(), RadioError> {
        self.request(ServerRequest::Release).await
    }

    async fn request(
        &self,
        build: impl FnOnce(Reply) -> ServerRequest,
    ) -> Result<(), RadioError> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(build(reply))
            .map_err(|_| server_stopped())?;
        rx.await.map_err(|_| server_stopped())?
    }
}

fn server_stopped() -> RadioError {
    RadioError::Unavailable("GATT server is not running".to_string())
}

fn platform(e: impl std::fmt::Display) -> RadioError {
    RadioError::Platform(e.to_string())
}

/// The GATT service hosting `descriptor`'s characteristic
fn chat_service(descriptor: &ServiceDescriptor) -> Service {
    let mut properties = Vec::new();
    if descriptor.properties.read {
        properties.push(CharacteristicProperty::Read);
    }
    if descriptor.properties.write {
        properties.push(CharacteristicProperty::Write);
        properties.push(CharacteristicProperty::WriteWithoutResponse);
    }
    if descriptor.properties.notify {
        properties.push(CharacteristicProperty::Notify);
    }

    let mut permissions = Vec::new();
    if descriptor.permissions.read {
        permissions.push(AttributePermission::Readable);
    }
    if descriptor.permissions.write {
        permissions.push(AttributePermission::Writeable);
    }

    Service {
        uuid: descriptor.service,
        primary: true,
        characteristics: vec![Characteristic {
            uuid: descriptor.characteristic,
            properties,
            permissions,
            value: None,
            descriptors: Vec::new(),
        }],
    }
}

/// The part of `value` a read at `offset` returns
fn read_at(value: &[u8], offset: usize) -> Option<&[u8]> {
    value.get(offset..)
}

async fn run(mut requests: mpsc::UnboundedReceiver<ServerRequest>, events: RadioEventSender) {
    let (event_tx, mut peripheral_events) = mpsc::channel(PERIPHERAL_EVENT_CAPACITY);
    let peripheral = match GattPeripheral::new(event_tx).await {
        Ok(peripheral) => peripheral,
        Err(e) => {
            // Dropping `requests` makes every later call fail as unavailable.
            error!("Failed to open GATT server: {}", e);
            return;
        }
    };
    info!("GATT server started");

    let mut server = ServerTask {
        peripheral,
        events,
        published: None,
        value: Vec::new(),
        client: None,
        advertising: false,
    };

    loop {
        tokio::select! {
            request = requests.recv() => match request {
                Some(request) => server.handle_request(request).await,
                None => break,
            },
            event = peripheral_events.recv() => match event {
                Some(event) => server.handle_event(event),
                None => break,
            },
        }
    }

    if server.advertising {
        let _ = server.peripheral.stop_advertising().await;
    }
    info!("GATT server stopped");
}

struct ServerTask {
    peripheral: GattPeripheral,
    events: RadioEventSender,
    published: Option<ServiceDescriptor>,
    /// Last value written or notified
    value: Vec<u8>,
    /// The central subscribed to our characteristic
    client: Option<PeerIdentity>,
    advertising: bool,
}

impl ServerTask {
    async fn handle_request(&mut self, request: ServerRequest) {
        match request {
            ServerRequest::Publish(descriptor, reply) => {
                let _ = reply.send(self.publish(descriptor).await);
            }
            ServerRequest::Advertise(reply) => {
                let _ = reply.send(self.advertise().await);
            }
            ServerRequest::StopAdvertise(reply) => {
                let _ = reply.send(self.stop_advertise().await);
            }
            ServerRequest::Notify { value, reply } => {
                let _ = reply.send(self.notify(value).await);
            }
            ServerRequest::Release(reply) => {
                if let Some(client) = self.client.take() {
                    info!("Releasing client {}", client);
                }
                let _ = reply.send(self.stop_advertise().await);
            }
        }
    }

    async fn publish(&mut self, descriptor: ServiceDescriptor) -> Result<(), RadioError> {
        if self.published == Some(descriptor) {
            return Ok(());
        }
        self.peripheral
            .add_service(&chat_service(&descriptor))
            .await
            .map_err(platform)?;
        info!("Published service {}", descriptor.service);
        self.published = Some(descriptor);
        Ok(())
    }

    async fn advertise(&mut self) -> Result<(), RadioError> {
        let descriptor = self
            .published
            .ok_or(RadioError::MissingCharacteristic(ServiceDescriptor::CHIPPY.characteristic))?;
        if !self.peripheral.is_powered().await.map_err(platform)? {
            return Err(RadioError::Unavailable("Bluetooth adapter is powered off".into()));
        }
        self.peripheral
            .start_advertising(ADVERTISED_NAME, &[descriptor.service])
            .await
            .map_err(platform)?;
        self.advertising = true;
        info!("Advertising as {}", ADVERTISED_NAME);
        Ok(())
    }

    async fn stop_advertise(&mut self) -> Result<(), RadioError> {
        if !self.advertising {
            return Ok(());
        }
        self.peripheral.stop_advertising().await.map_err(platform)?;
        self.advertising = false;
        info!("Advertising stopped");
        Ok(())
    }

    async fn notify(&mut self, value: Vec<u8>) -> Result<(), RadioError> {
        let descriptor = self.published.ok_or(RadioError::NotLinked)?;
        if self.client.is_none() {
            return Err(RadioError::NotLinked);
        }
        self.peripheral
            .update_characteristic(descriptor.characteristic, value.clone())
            .await
            .map_err(platform)?;
        self.value = value;
        Ok(())
    }

    fn handle_event(&mut self, event: PeripheralEvent) {
        let Some(descriptor) = self.published else {
            debug!("Ignoring peripheral event before the service is published");
            return;
        };

        match event {
            PeripheralEvent::ReadRequest {
                request,
                offset,
                responder,
            } => {
                let response = if request.characteristic != descriptor.characteristic {
                    ReadRequestResponse {
                        value: Vec::new(),
                        response: RequestResponse::RequestNotSupported,
                    }
                } else {
                    match read_at(&self.value, offset as usize) {
                        Some(value) => ReadRequestResponse {
                            value: value.to_vec(),
                            response: RequestResponse::Success,
                        },
                        None => ReadRequestResponse {
                            value: Vec::new(),
                            response: RequestResponse::InvalidOffset,
                        },
                    }
                };
                let _ = responder.send(response);
            }
            PeripheralEvent::WriteRequest {
                request,
                value,
                offset,
                responder,
            } => {
                if request.characteristic != descriptor.characteristic {
                    let _ = responder.send(WriteRequestResponse {
                        response: RequestResponse::RequestNotSupported,
                    });
                    debug!("Write to unknown characteristic {}", request.characteristic);
                    return;
                }
                if offset != 0 {
                    let _ = responder.send(WriteRequestResponse {
                        response: RequestResponse::InvalidOffset,
                    });
                    warn!("Rejected write at offset {}", offset);
                    return;
                }
                let _ = responder.send(WriteRequestResponse {
                    response: RequestResponse::Success,
                });

                let peer = PeerIdentity::new(request.client, None);
                // Some centrals write before subscribing.
                self.link(&peer);
                self.value = value.clone();
                self.events.send(RadioEvent::WriteRequest { peer, value });
            }
            PeripheralEvent::CharacteristicSubscriptionUpdate {
                request,
                subscribed,
            } => {
                if request.characteristic != descriptor.characteristic {
                    return;
                }
                let peer = PeerIdentity::new(request.client, None);
                if subscribed {
                    self.link(&peer);
                } else if self.client.as_ref() == Some(&peer) {
                    info!("{} unsubscribed", peer);
                    self.client = None;
                    self.events.send(RadioEvent::ConnectionStateChanged {
                        peer,
                        status: LinkStatus::Disconnected,
                    });
                }
            }
            PeripheralEvent::StateUpdate { is_powered } => {
                if is_powered {
                    info!("GATT server adapter powered on");
                } else {
                    warn!("GATT server adapter powered off");
                    self.advertising = false;
                    if let Some(peer) = self.client.take() {
                        self.events.send(RadioEvent::ConnectionStateChanged {
                            peer,
                            status: LinkStatus::Disconnected,
                        });
                    }
                }
            }
        }
    }

    /// Reports `peer` as linked the first time it shows up
    fn link(&mut self, peer: &PeerIdentity) {
        if self.client.is_some() {
            return;
        }
        info!("{} subscribed to the message characteristic", peer);
        self.client = Some(peer.clone());
        self.events.send(RadioEvent::ConnectionStateChanged {
            peer: peer.clone(),
            status: LinkStatus::Connected,
        });
    }
}
