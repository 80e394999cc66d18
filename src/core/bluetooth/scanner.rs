use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use bluest::{Adapter, Device, Uuid};
use futures_util::stream::{self, BoxStream, StreamExt};
use log::{debug, info};
use regex::Regex;

use crate::core::bluetooth::errors::RadioError;
use crate::core::bluetooth::types::PeerIdentity;

static MAC_ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([0-9A-Fa-f]{2}[:-]){5}([0-9A-Fa-f]{2})").expect("MAC address pattern is valid")
});

/// Devices seen by the last scan, keyed by [`PeerIdentity::address`]
pub type DeviceRegistry = Arc<Mutex<HashMap<String, Device>>>;

/// Scans for peers advertising the Chippy service
pub struct PeerScanner<'a> {
    adapter: &'a Adapter,
    devices: DeviceRegistry,
    min_rssi: Option<i16>,
}

impl<'a> PeerScanner<'a> {
    pub fn new(adapter: &'a Adapter, devices: DeviceRegistry, min_rssi: Option<i16>) -> Self {
        Self {
            adapter,
            devices,
            min_rssi,
        }
    }

    /// Starts a scan filtered on `services`. Devices already linked to this
    /// host are reported first.
    pub async fn scan(self, services: &'a [Uuid]) -> Result<BoxStream<'a, PeerIdentity>, RadioError> {
        lock(&self.devices).clear();

        info!("Checking for connected devices");
        let connected = self
            .adapter
            .connected_devices_with_services(services)
            .await?;
        let known: Vec<PeerIdentity> = connected
            .into_iter()
            .map(|device| register(&self.devices, device))
            .collect();

        info!("Starting bluetooth scan for {:?}", services);
        let advertising = self.adapter.scan(services).await?;
        let devices = Arc::clone(&self.devices);
        let min_rssi = self.min_rssi;

        let found = advertising.filter_map(move |discovered| {
            debug!(
                "Found device - Device: {:?}, RSSI: {:?}",
                discovered.device, discovered.rssi
            );
            let peer = strong_enough(discovered.rssi, min_rssi)
                .then(|| register(&devices, discovered.device));
            async move { peer }
        });

        Ok(stream::iter(known).chain(found).boxed())
    }
}

/// Looks up a device found by the last scan
pub fn find_device(devices: &DeviceRegistry, peer: &PeerIdentity) -> Result<Device, RadioError> {
    lock(devices)
        .get(&peer.address)
        .cloned()
        .ok_or_else(|| RadioError::UnknownPeer(peer.address.clone()))
}

fn register(devices: &DeviceRegistry, device: Device) -> PeerIdentity {
    let id = device.id().to_string();
    let address = extract_mac_address(&id).unwrap_or_else(|| id.clone());
    let peer = PeerIdentity::new(address, device.name().ok());
    lock(devices).insert(peer.address.clone(), device);
    peer
}

fn strong_enough(rssi: Option<i16>, min_rssi: Option<i16>) -> bool {
    match (rssi, min_rssi) {
        (_, None) => true,
        (Some(signal), Some(threshold)) => signal >= threshold,
        (None, Some(_)) => false,
    }
}

fn extract_mac_address(device_id: &str) -> Option<String> {
    MAC_ADDRESS
        .find_iter(device_id)
        .last()
        .map(|m| m.as_str().to_uppercase())
}

fn lock(devices: &DeviceRegistry) -> std::sync::MutexGuard<'_, HashMap<String, Device>> {
    devices.lock().unwrap_or_else(PoisonError::into_inner)
}
