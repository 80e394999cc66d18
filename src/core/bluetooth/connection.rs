//! Radio binding over the platform BLE stack
//! The client role runs on `bluest`. `bluest` has no peripheral support, so
//! the server role goes through the GATT server in `peripheral`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bluest::{Adapter, AdapterEvent, Characteristic, Device, Uuid};
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::constants::SERVICE_UUID;
use crate::core::bluetooth::errors::RadioError;
use crate::core::bluetooth::notification::NotificationHandler;
use crate::core::bluetooth::peripheral::GattServer;
use crate::core::bluetooth::radio::{Discovery, Radio, RadioEvent, RadioEventSender};
use crate::core::bluetooth::scanner::{DeviceRegistry, PeerScanner, find_device};
use crate::core::bluetooth::types::{
    CharacteristicPermissions, CharacteristicProperties, PeerIdentity, ServiceDescriptor,
};

static SCAN_SERVICES: [Uuid; 1] = [SERVICE_UUID];

/// The link currently held by the binding
struct Link {
    peer: PeerIdentity,
    device: Device,
    characteristic: Option<Characteristic>,
}

pub struct PlatformRadio {
    adapter: Adapter,
    server: GattServer,
    devices: DeviceRegistry,
    link: tokio::sync::Mutex<Option<Link>>,
    notifications: NotificationHandler,
    min_rssi: Option<i16>,
    watcher: CancellationToken,
}

impl PlatformRadio {
    /// Wraps `adapter`, starts the GATT server and watches adapter availability
    pub fn new(adapter: Adapter, events: RadioEventSender, min_rssi: Option<i16>) -> Self {
        let watcher = CancellationToken::new();
        tokio::spawn(Self::watch_adapter(
            adapter.clone(),
            events.clone(),
            watcher.clone(),
        ));

        Self {
            adapter,
            server: GattServer::spawn(events.clone()),
            devices: Arc::new(Mutex::new(HashMap::new())),
            link: tokio::sync::Mutex::new(None),
            notifications: NotificationHandler::new(events),
            min_rssi,
            watcher,
        }
    }

    async fn watch_adapter(adapter: Adapter, events: RadioEventSender, cancel: CancellationToken) {
        let mut adapter_events = match adapter.events().await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Adapter availability events are not available: {}", e);
                return;
            }
        };

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                next = adapter_events.next() => match next {
                    Some(Ok(AdapterEvent::Available)) => events.send(RadioEvent::AdapterAvailable),
                    Some(Ok(AdapterEvent::Unavailable)) => events.send(RadioEvent::AdapterUnavailable {
                        reason: "Bluetooth adapter turned off".to_string(),
                    }),
                    Some(Err(e)) => {
                        error!("Error in adapter event stream: {}", e);
                        return;
                    }
                    None => return,
                },
            }
        }
    }

    /// The matching characteristic of `device`, if it exposes the descriptor's service
    async fn find_characteristic(
        device: &Device,
        descriptor: &ServiceDescriptor,
    ) -> Result<Option<Characteristic>, RadioError> {
        let services = device.services().await?;
        let Some(service) = services.iter().find(|s| s.uuid() == descriptor.service) else {
            for service in &services {
                info!("Available service: {}", service.uuid());
            }
            return Ok(None);
        };
        info!("Found Chippy service: {}", service.uuid());

        let characteristic = service
            .characteristics()
            .await?
            .into_iter()
            .find(|c| c.uuid() == descriptor.characteristic);
        Ok(characteristic)
    }

    async fn linked_characteristic(&self) -> Result<Characteristic, RadioError> {
        let link = self.link.lock().await;
        let link = link.as_ref().ok_or(RadioError::NotLinked)?;
        link.characteristic
            .clone()
            .ok_or(RadioError::MissingCharacteristic(ServiceDescriptor::CHIPPY.characteristic))
    }
}

#[async_trait::async_trait]
impl Radio for PlatformRadio {
    async fn publish_service(&self, descriptor: &ServiceDescriptor) -> Result<(), RadioError> {
        self.server.publish(descriptor).await
    }

    async fn advertise(&self) -> Result<(), RadioError> {
        self.server.advertise().await
    }

    async fn stop_advertise(&self) -> Result<(), RadioError> {
        self.server.stop_advertise().await
    }

    async fn scan<'a>(&'a self) -> Result<BoxStream<'a, PeerIdentity>, RadioError> {
        PeerScanner::new(&self.adapter, Arc::clone(&self.devices), self.min_rssi)
            .scan(&SCAN_SERVICES)
            .await
    }

    async fn connect(&self, peer: &PeerIdentity) -> Result<(), RadioError> {
        let device = find_device(&self.devices, peer)?;
        info!("Device details - ID: {}, Name: {:?}", device.id(), device.name().ok());

        if !device.is_connected().await {
            self.adapter.connect_device(&device).await?;
        }
        *self.link.lock().await = Some(Link {
            peer: peer.clone(),
            device,
            characteristic: None,
        });
        Ok(())
    }

    async fn discover_services(&self) -> Result<Discovery, RadioError> {
        let device = {
            let link = self.link.lock().await;
            link.as_ref().ok_or(RadioError::NotLinked)?.device.clone()
        };

        let descriptor = ServiceDescriptor::CHIPPY;
        let Some(characteristic) = Self::find_characteristic(&device, &descriptor).await? else {
            return Ok(Discovery::NotFound);
        };

        let properties = characteristic.properties().await?;
        let found = ServiceDescriptor {
            properties: CharacteristicProperties {
                read: properties.read,
                write: properties.write,
                notify: properties.notify,
            },
            permissions: CharacteristicPermissions {
                read: properties.read,
                write: properties.write,
            },
            ..descriptor
        };
        info!("Found message characteristic: {}", characteristic.uuid());

        if let Some(link) = self.link.lock().await.as_mut() {
            link.characteristic = Some(characteristic);
        }
        Ok(Discovery::Found(found))
    }

    async fn subscribe(&self, _descriptor: &ServiceDescriptor) -> Result<(), RadioError> {
        let characteristic = self.linked_characteristic().await?;
        let peer = {
            let link = self.link.lock().await;
            link.as_ref().ok_or(RadioError::NotLinked)?.peer.clone()
        };
        self.notifications
            .setup_notifications(characteristic, peer)
            .await
    }

    async fn write_characteristic(
        &self,
        _descriptor: &ServiceDescriptor,
        value: &[u8],
    ) -> Result<(), RadioError> {
        let characteristic = self.linked_characteristic().await?;
        characteristic.write(value).await?;
        Ok(())
    }

    async fn update_and_notify(
        &self,
        _descriptor: &ServiceDescriptor,
        value: &[u8],
    ) -> Result<(), RadioError> {
        self.server.notify(value).await
    }

    async fn disconnect(&self) -> Result<(), RadioError> {
        if let Err(e) = self.server.release().await {
            warn!("Failed to release GATT server session: {}", e);
        }
        self.notifications.stop().await;
        let Some(link) = self.link.lock().await.take() else {
            info!("No device connected");
            return Ok(());
        };

        if link.device.is_connected().await {
            info!("Disconnecting from device {}", link.device.id());
            self.adapter.disconnect_device(&link.device).await?;
            info!("Successfully disconnected");
        } else {
            info!("Device {} not connected", link.device.id());
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), RadioError> {
        self.watcher.cancel();
        self.disconnect().await
    }
}
