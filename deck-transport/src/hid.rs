//! HID transport implementation for direct USB connection

use hidapi::HidDevice;
use tracing::debug;

use crate::error::TransportError;
use crate::types::TransportDeviceInfo;
use crate::Transport;

/// HID transport for a deck connected via USB
///
/// Images go out as output reports, commands and queries as feature
/// reports, key states come back as input reports. Dropping the transport
/// closes the handle; `close` does it eagerly.
pub struct HidTransport {
    /// Open handle, `None` once closed
    device: Option<HidDevice>,
    /// Device information
    info: TransportDeviceInfo,
}

impl HidTransport {
    /// Create a new transport from an opened HID device
    pub fn new(device: HidDevice, info: TransportDeviceInfo) -> Self {
        Self {
            device: Some(device),
            info,
        }
    }

    fn device(&self) -> Result<&HidDevice, TransportError> {
        self.device.as_ref().ok_or(TransportError::Closed)
    }
}

impl Transport for HidTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let n = self.device()?.read(buf)?;
        debug!("Read {} bytes: {:02X?}", n, &buf[..n.min(16)]);
        Ok(n)
    }

    fn read_timeout(&mut self, buf: &mut [u8], timeout_ms: i32) -> Result<usize, TransportError> {
        let n = self.device()?.read_timeout(buf, timeout_ms)?;
        if n > 0 {
            debug!("Read {} bytes: {:02X?}", n, &buf[..n.min(16)]);
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let n = self.device()?.write(data)?;
        Ok(n)
    }

    fn get_feature_report(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let n = self.device()?.get_feature_report(buf)?;
        debug!("Got feature report 0x{:02X}: {} bytes", buf[0], n);
        Ok(n)
    }

    fn send_feature_report(&mut self, data: &[u8]) -> Result<(), TransportError> {
        debug!("Sending feature report: {:02X?}", &data[..data.len().min(9)]);
        self.device()?.send_feature_report(data)?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        // HidDevice closes on drop
        match self.device.take() {
            Some(_) => {
                debug!(
                    "Closed {:04X}:{:04X} {}",
                    self.info.vid, self.info.pid, self.info.device_path
                );
                Ok(())
            }
            None => Err(TransportError::Closed),
        }
    }

    fn device_info(&self) -> &TransportDeviceInfo {
        &self.info
    }
}
