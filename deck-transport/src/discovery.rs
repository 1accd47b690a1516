//! Device discovery for Stream Deck panels

use hidapi::HidApi;
use tracing::{debug, info};

use crate::error::TransportError;
use crate::hid::HidTransport;
use crate::printer::{PrinterConfig, PrinterTransport};
use crate::types::{DiscoveredDevice, TransportDeviceInfo};
use crate::{BoxedTransport, DeviceDiscovery};

/// HID device discovery backed by hidapi
///
/// A fresh `HidApi` context is created for every call so that devices
/// plugged in after startup (for example during a reconnect loop) show up.
#[derive(Default)]
pub struct HidDiscovery {
    /// Optional printer config for monitoring mode - wraps transports automatically
    printer_config: Option<PrinterConfig>,
}

impl HidDiscovery {
    /// Create a new HID discovery instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with printer config for monitoring mode
    /// All transports opened via open_device() will be wrapped with Printer
    pub fn with_printer_config(config: PrinterConfig) -> Self {
        Self {
            printer_config: Some(config),
        }
    }

    fn api() -> Result<HidApi, TransportError> {
        HidApi::new().map_err(TransportError::from)
    }

    fn matches(
        device_info: &hidapi::DeviceInfo,
        vid: u16,
        pid: Option<u16>,
        serial: Option<&str>,
    ) -> bool {
        device_info.vendor_id() == vid
            && pid.map_or(true, |p| device_info.product_id() == p)
            && serial.map_or(true, |s| device_info.serial_number() == Some(s))
    }

    fn to_info(device_info: &hidapi::DeviceInfo) -> TransportDeviceInfo {
        TransportDeviceInfo {
            vid: device_info.vendor_id(),
            pid: device_info.product_id(),
            device_path: device_info.path().to_string_lossy().to_string(),
            serial: device_info.serial_number().map(|s| s.to_string()),
            product_name: device_info.product_string().map(|s| s.to_string()),
        }
    }
}

impl DeviceDiscovery for HidDiscovery {
    fn list_devices(
        &self,
        vid: u16,
        pid: Option<u16>,
        serial: Option<&str>,
    ) -> Result<Vec<DiscoveredDevice>, TransportError> {
        let api = Self::api()?;
        let mut devices: Vec<DiscoveredDevice> = Vec::new();

        for device_info in api.device_list() {
            if !Self::matches(device_info, vid, pid, serial) {
                continue;
            }
            let info = Self::to_info(device_info);
            // Some platforms list one entry per HID collection
            if devices.iter().any(|d| d.info.device_path == info.device_path) {
                continue;
            }
            debug!(
                "Found device: VID={:04X} PID={:04X} serial={:?} path={}",
                info.vid, info.pid, info.serial, info.device_path
            );
            devices.push(DiscoveredDevice { info });
        }

        debug!("Found {} devices", devices.len());
        Ok(devices)
    }

    fn open_device(
        &self,
        vid: u16,
        pid: u16,
        serial: Option<&str>,
    ) -> Result<BoxedTransport, TransportError> {
        let api = Self::api()?;

        let device_info = api
            .device_list()
            .find(|d| Self::matches(d, vid, Some(pid), serial))
            .ok_or_else(|| {
                TransportError::DeviceNotFound(match serial {
                    Some(s) => format!("{vid:04X}:{pid:04X} with serial {s}"),
                    None => format!("{vid:04X}:{pid:04X}"),
                })
            })?;

        let info = Self::to_info(device_info);
        let device = device_info.open_device(&api)?;

        info!(
            "Opened HID transport for {:04X}:{:04X} ({})",
            info.vid,
            info.pid,
            info.serial.as_deref().unwrap_or("no serial")
        );

        let transport: BoxedTransport = Box::new(HidTransport::new(device, info));

        // Wrap with printer if monitoring is enabled
        Ok(match &self.printer_config {
            Some(config) => PrinterTransport::wrap(transport, config.clone()),
            None => transport,
        })
    }
}
