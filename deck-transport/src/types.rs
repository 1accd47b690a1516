//! Common types for transport layer

use serde::Serialize;

/// Elgato vendor ID shared by every supported deck
pub const VENDOR_ID: u16 = 0x0fd9;

/// Device identification information
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransportDeviceInfo {
    /// USB Vendor ID
    pub vid: u16,
    /// USB Product ID
    pub pid: u16,
    /// Device path or identifier (transport-specific)
    pub device_path: String,
    /// Serial number if available
    pub serial: Option<String>,
    /// Product name if available
    pub product_name: Option<String>,
}

impl TransportDeviceInfo {
    /// True if this device reports exactly the given serial number
    pub fn has_serial(&self, serial: &str) -> bool {
        self.serial.as_deref() == Some(serial)
    }
}

/// Discovered device that can be opened
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveredDevice {
    /// Device information
    pub info: TransportDeviceInfo,
}
