//! Constants used throughout the application
//! This module contains the protocol identifiers shared by both roles and
//! the default timing values of the link.

use uuid::Uuid;

/// The UUID of the Chippy message service
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x0000ff00_0000_1000_8000_00805f9b34fb);

/// The UUID of the single read/write/notify message characteristic
pub const CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0x0000ff01_0000_1000_8000_00805f9b34fb);

/// Local name the server role advertises under
pub const ADVERTISED_NAME: &str = "Chippy";

/// Time allowed for a link to come up after `connect`, in milliseconds
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Time allowed for service discovery on a fresh link, in milliseconds
pub const DEFAULT_DISCOVERY_TIMEOUT_MS: u64 = 10_000;

/// Time allowed for the radio to confirm a teardown, in milliseconds
pub const DEFAULT_DISCONNECT_TIMEOUT_MS: u64 = 3_000;

/// Capacity of the transient notice channel
pub const NOTICE_CHANNEL_CAPACITY: usize = 64;

/// Capacity of the per-scan discovery channel
pub const SCAN_CHANNEL_CAPACITY: usize = 64;

/// Capacity of the GATT server's platform event channel
pub const PERIPHERAL_EVENT_CAPACITY: usize = 256;
