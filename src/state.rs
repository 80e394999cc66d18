//! Application state management
//! This module wires the link manager to the platform radio.

use anyhow::Result;
use bluest::Adapter;
use log::info;

use crate::config::AppConfig;
use crate::core::bluetooth::{PlatformRadio, LinkError, LinkManager, RadioError};
use crate::core::ChatHandle;

/// Global application state
pub struct AppState {
    /// Handle to the running link manager
    pub handle: ChatHandle,
    pub config: AppConfig,
}

impl AppState {
    /// Opens the default Bluetooth adapter and starts the link manager
    pub async fn new(config: AppConfig) -> Result<Self> {
        info!("Initializing Bluetooth adapter...");
        let adapter = Adapter::default().await.ok_or_else(|| {
            LinkError::activation(RadioError::Unavailable("No Bluetooth adapter found".into()))
        })?;
        adapter
            .wait_available()
            .await
            .map_err(|e| LinkError::activation(e.into()))?;
        info!("Bluetooth adapter is available");

        let min_rssi = config.link.min_rssi;
        let handle = LinkManager::spawn(&config.link, move |events| {
            PlatformRadio::new(adapter, events, min_rssi)
        });
        Ok(Self { handle, config })
    }

    /// Gets a clone of the chat handle
    pub fn handle(&self) -> ChatHandle {
        self.handle.clone()
    }
}
