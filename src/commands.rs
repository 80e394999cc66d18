//! Application commands
//! This module defines the operations the user interface invokes. Errors are
//! flattened to display strings for the front end.

use log::info;

use crate::core::bluetooth::{MessageRecord, PeerIdentity};
use crate::core::ChatHandle;

/// Starts scanning for peers.
///
/// Found peers show up in [`ChatHandle::peers`] and
/// [`ChatHandle::discovered_peers`] until the scan stops.
pub async fn start_scan(handle: &ChatHandle) -> Result<(), String> {
    handle.start_scan().await.map_err(|e| e.to_string())
}

pub async fn stop_scan(handle: &ChatHandle) -> Result<(), String> {
    handle.stop_scan().await.map_err(|e| e.to_string())
}

/// Publishes the Chippy service and waits for a client as the server
pub async fn start_advertise(handle: &ChatHandle) -> Result<(), String> {
    handle.start_advertise().await.map_err(|e| e.to_string())
}

pub async fn stop_advertise(handle: &ChatHandle) -> Result<(), String> {
    handle.stop_advertise().await.map_err(|e| e.to_string())
}

/// Connects to a peer found by the current scan
///
/// # Arguments
/// * `device_id` - The address of the peer, or its advertised name
pub async fn connect_to_device(handle: &ChatHandle, device_id: &str) -> Result<(), String> {
    let peer = find_peer(handle, device_id)
        .ok_or_else(|| format!("Device not found with ID: {}", device_id))?;
    info!("Connecting to {}", peer);
    handle.connect(peer).await.map_err(|e| e.to_string())
}

/// Sends a line of text. Blank input is ignored and yields `None`.
pub async fn send_message(
    handle: &ChatHandle,
    text: &str,
) -> Result<Option<MessageRecord>, String> {
    if text.trim().is_empty() {
        return Ok(None);
    }
    handle.send(text).await.map(Some).map_err(|e| e.to_string())
}

/// Disconnects from the current peer, or stops advertising or scanning
pub async fn disconnect(handle: &ChatHandle) -> Result<(), String> {
    handle.disconnect().await.map_err(|e| e.to_string())
}

fn find_peer(handle: &ChatHandle, device_id: &str) -> Option<PeerIdentity> {
    let peers = handle.peers();
    let peers = peers.borrow();
    peers
        .iter()
        .find(|p| p.address.eq_ignore_ascii_case(device_id))
        .or_else(|| peers.iter().find(|p| p.name.as_deref() == Some(device_id)))
        .cloned()
}
