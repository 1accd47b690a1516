//! Transport abstraction layer for Stream Deck communication
//!
//! This crate provides the raw HID channel the deck protocol engine talks
//! through, kept separate so the engine can be driven by:
//!
//! - HID (direct USB connection via hidapi)
//! - Printer middleware (monitoring wrapper around any transport)
//! - Mock bus (in-memory devices for tests, behind the `mock` feature)

pub mod error;
pub mod printer;
pub mod types;

mod discovery;
mod hid;

#[cfg(feature = "mock")]
pub mod mock;

pub use discovery::HidDiscovery;
pub use error::TransportError;
pub use hid::HidTransport;
pub use printer::{PacketFilter, PrinterConfig, PrinterTransport};
pub use types::{DiscoveredDevice, TransportDeviceInfo, VENDOR_ID};

/// The core transport trait - all backends implement this
///
/// Every call blocks until the underlying report transfer completes. A
/// transport is owned by exactly one session, so methods take `&mut self`.
pub trait Transport: Send {
    /// Read one input report into `buf`, returning the number of bytes read
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Like `read`, but give up after `timeout_ms` and return 0
    fn read_timeout(&mut self, buf: &mut [u8], timeout_ms: i32) -> Result<usize, TransportError>;

    /// Write one output report
    ///
    /// # Returns
    /// Number of bytes written
    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    /// Get a feature report
    ///
    /// `buf[0]` selects the report; the response overwrites `buf`.
    fn get_feature_report(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Send a feature report (first byte is the report ID)
    fn send_feature_report(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Release the device handle
    fn close(&mut self) -> Result<(), TransportError>;

    /// Get device information
    fn device_info(&self) -> &TransportDeviceInfo;
}

/// Type alias for a boxed transport
pub type BoxedTransport = Box<dyn Transport>;

/// Device discovery abstraction
pub trait DeviceDiscovery: Send + Sync {
    /// List currently attached devices of a vendor
    ///
    /// # Arguments
    /// * `vid` - USB vendor ID
    /// * `pid` - Product ID filter (`None` matches any product)
    /// * `serial` - Serial number filter (`None` matches any serial)
    fn list_devices(
        &self,
        vid: u16,
        pid: Option<u16>,
        serial: Option<&str>,
    ) -> Result<Vec<DiscoveredDevice>, TransportError>;

    /// Open a device, by serial number when one is given, otherwise the first
    /// device matching `vid`/`pid`
    fn open_device(
        &self,
        vid: u16,
        pid: u16,
        serial: Option<&str>,
    ) -> Result<BoxedTransport, TransportError>;
}
