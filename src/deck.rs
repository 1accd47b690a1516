//! Deck sessions
//!
//! A [`Deck`] is bound to one physical panel. It owns the open transport
//! and the serial number used to find the same panel again after it was
//! unplugged; [`Deck::reconnect`] swaps both in place.

use std::sync::Arc;
use std::time::Duration;

use deck_transport::{
    BoxedTransport, DeviceDiscovery, TransportDeviceInfo, TransportError, VENDOR_ID,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::devices::{self, DeviceDescriptor, Model};
use crate::error::{DeckError, Result};
use crate::pipeline::{self, ImageInput, RawImage};
use crate::protocol;

/// The replaceable part of a session
struct Connection {
    transport: BoxedTransport,
    /// Serial the session is bound to, empty if the device reports none
    serial: String,
}

/// An open Stream Deck
pub struct Deck {
    desc: &'static DeviceDescriptor,
    discovery: Arc<dyn DeviceDiscovery>,
    conn: Box<Connection>,
    /// Scratch buffer for feature reports
    buf: Vec<u8>,
}

impl Deck {
    /// Open a deck
    ///
    /// With a `pid` the first device of that model is used, otherwise the
    /// first device of any supported model. A non-empty `serial` restricts
    /// the search to that unit.
    ///
    /// Any half-sent image left by a previous session is discarded by a
    /// key stream reset before the deck is returned.
    pub fn open(
        discovery: Arc<dyn DeviceDiscovery>,
        pid: Option<u16>,
        serial: Option<&str>,
    ) -> Result<Deck> {
        let serial = serial.filter(|s| !s.is_empty());
        let desc = match pid {
            Some(pid) => devices::lookup(pid)?,
            None => first_supported(discovery.as_ref(), serial)?,
        };

        let transport = discovery.open_device(VENDOR_ID, desc.pid(), serial)?;
        let mut deck = Deck {
            desc,
            discovery,
            conn: Box::new(Connection {
                transport,
                serial: serial.unwrap_or_default().to_string(),
            }),
            buf: vec![0u8; desc.max_feature_len()],
        };

        if let Err(e) = deck.reset_key_stream() {
            deck.close_quietly();
            return Err(e);
        }
        if serial.is_none() {
            match deck.query_serial() {
                Ok(serial) => deck.conn.serial = serial,
                Err(e) => {
                    deck.close_quietly();
                    return Err(e);
                }
            }
        }

        info!("Opened {} ({})", desc.model, deck.conn.serial);
        Ok(deck)
    }

    /// Open a deck of a known model
    pub fn open_model(
        discovery: Arc<dyn DeviceDiscovery>,
        model: Model,
        serial: Option<&str>,
    ) -> Result<Deck> {
        Self::open(discovery, Some(model.pid()), serial)
    }

    /// Release the transport
    ///
    /// Closing twice reports whatever the transport reports.
    pub fn close(&mut self) -> Result<()> {
        self.conn.transport.close()?;
        info!("Closed {} ({})", self.desc.model, self.conn.serial);
        Ok(())
    }

    fn close_quietly(&mut self) {
        if let Err(e) = self.conn.transport.close() {
            debug!("Close after failed open: {}", e);
        }
    }

    /// Wait for the device to come back and rebind to it
    ///
    /// Every `delay` the bus is checked for this deck's serial number. Once
    /// present, a fresh session is opened and swapped in, so this `Deck`
    /// stays usable. When `cancel` fires the last error seen is returned,
    /// `NotConnected` if no attempt was made.
    pub fn reconnect(&mut self, delay: Duration, cancel: &CancelToken) -> Result<()> {
        let mut last = DeckError::NotConnected;
        loop {
            if cancel.sleep(delay) {
                info!("Reconnect to {} cancelled", self.conn.serial);
                return Err(last);
            }
            if !self.is_connected() {
                debug!("{} not on the bus yet", self.conn.serial);
                last = DeckError::NotConnected;
                continue;
            }

            let serial = self.conn.serial.clone();
            match Deck::open(
                Arc::clone(&self.discovery),
                Some(self.desc.pid()),
                Some(&serial),
            ) {
                Ok(fresh) => {
                    let mut stale = std::mem::replace(&mut self.conn, fresh.conn);
                    self.desc = fresh.desc;
                    if let Err(e) = stale.transport.close() {
                        debug!("Closing stale handle: {}", e);
                    }
                    info!("Reconnected {} ({})", self.desc.model, serial);
                    return Ok(());
                }
                Err(e) => {
                    warn!("Reconnect to {} failed: {}", serial, e);
                    last = e;
                }
            }
        }
    }

    /// True if this deck's serial is currently enumerable
    pub fn is_connected(&self) -> bool {
        match self
            .discovery
            .list_devices(VENDOR_ID, Some(self.desc.pid()), None)
        {
            Ok(devices) => devices
                .iter()
                .any(|d| d.info.serial.as_deref().unwrap_or_default() == self.conn.serial),
            Err(e) => {
                debug!("Enumeration failed: {}", e);
                false
            }
        }
    }

    /// Classify a transport failure on an established session
    fn check_connected(&self, err: TransportError) -> DeckError {
        if self.is_connected() {
            DeckError::Transport(err)
        } else {
            debug!("{} gone after: {}", self.conn.serial, err);
            DeckError::NotConnected
        }
    }

    pub fn model(&self) -> Model {
        self.desc.model
    }

    pub fn pid(&self) -> u16 {
        self.desc.pid()
    }

    pub fn descriptor(&self) -> &'static DeviceDescriptor {
        self.desc
    }

    pub fn device_info(&self) -> &TransportDeviceInfo {
        self.conn.transport.device_info()
    }

    /// Rows and columns of keys
    pub fn layout(&self) -> (usize, usize) {
        (self.desc.rows, self.desc.cols)
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.desc.key_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Key index for a row and column
    pub fn key(&self, row: usize, col: usize) -> Result<usize> {
        if row >= self.desc.rows {
            return Err(DeckError::OutOfBounds(format!("row {row}")));
        }
        if col >= self.desc.cols {
            return Err(DeckError::OutOfBounds(format!("column {col}")));
        }
        Ok(row * self.desc.cols + col)
    }

    /// Key image size in pixels
    pub fn bounds(&self) -> Result<(u32, u32)> {
        self.desc
            .image
            .map(|image| (image.key_size, image.key_size))
            .ok_or_else(|| DeckError::NotVisual(self.desc.model.to_string()))
    }

    /// Pressed state of every key, row-major
    pub fn key_states(&mut self) -> Result<Vec<bool>> {
        let mut report = vec![0u8; self.desc.key_states_len()];
        let n = match self.conn.transport.read(&mut report) {
            Ok(n) => n,
            Err(e) => return Err(self.check_connected(e)),
        };
        Ok(protocol::parse_key_states(
            &report[..n],
            self.desc.key_states_offset,
            self.desc.key_count(),
        ))
    }

    /// Wait up to `timeout` for a key state report
    ///
    /// Returns `None` if the deck sent nothing in time.
    pub fn poll_key_states(&mut self, timeout: Duration) -> Result<Option<Vec<bool>>> {
        let mut report = vec![0u8; self.desc.key_states_len()];
        let timeout_ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        let n = match self.conn.transport.read_timeout(&mut report, timeout_ms) {
            Ok(n) => n,
            Err(e) => return Err(self.check_connected(e)),
        };
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(protocol::parse_key_states(
            &report[..n],
            self.desc.key_states_offset,
            self.desc.key_count(),
        )))
    }

    /// Send the command in `buf[..len]` as a feature report
    fn send_command(&mut self, len: usize) -> Result<()> {
        match self.conn.transport.send_feature_report(&self.buf[..len]) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.check_connected(e)),
        }
    }

    /// Discard any partially streamed key image
    pub fn reset_key_stream(&mut self) -> Result<()> {
        if !self.desc.is_visual() {
            return Ok(());
        }
        let len = self.desc.payload_len;
        protocol::command(&mut self.buf, len, self.desc.reset_key_stream);
        self.send_command(len)
    }

    /// Clear all key images and show the standby logo
    pub fn reset(&mut self) -> Result<()> {
        if !self.desc.is_visual() {
            return Ok(());
        }
        let len = self.desc.payload_len;
        protocol::command(&mut self.buf, len, self.desc.reset);
        self.send_command(len)
    }

    /// Set the backlight brightness, 0 to 100 percent
    pub fn set_brightness(&mut self, percent: i32) -> Result<()> {
        let percent = u8::try_from(percent)
            .ok()
            .filter(|p| *p <= 100)
            .ok_or_else(|| DeckError::OutOfBounds(format!("brightness {percent}")))?;
        if !self.desc.is_visual() {
            return Ok(());
        }
        let len = self.desc.payload_len;
        protocol::brightness(&mut self.buf, len, self.desc.brightness, percent);
        self.send_command(len)
    }

    /// Render an image for this model without sending it
    pub fn raw_image<'a>(&self, image: impl Into<ImageInput<'a>>) -> Result<RawImage> {
        pipeline::prepare(image.into(), self.desc)
    }

    /// Show an image on the key at `row`, `col`
    ///
    /// A [`RawImage`] rendered for this model is sent as is.
    pub fn set_image<'a>(
        &mut self,
        row: usize,
        col: usize,
        image: impl Into<ImageInput<'a>>,
    ) -> Result<()> {
        let key = self.key(row, col)?;
        let raw = self.raw_image(image)?;
        let Some(format) = self.desc.image else {
            return Err(DeckError::NotVisual(self.desc.model.to_string()));
        };

        let transport = &mut self.conn.transport;
        let result = protocol::stream_image(&format, key as u8, raw.data(), |packet| {
            transport.write(packet).map(|_| ())
        });
        match result {
            Ok(pages) => {
                debug!("Sent key {} image in {} packets", key, pages);
                Ok(())
            }
            Err(e) => Err(self.check_connected(e)),
        }
    }

    /// Issue a string query and parse the answer at `offset`
    fn query(&mut self, prefix: &'static [u8], len: usize, offset: usize) -> Result<String> {
        protocol::query(&mut self.buf, len, prefix);
        match self.conn.transport.get_feature_report(&mut self.buf[..len]) {
            Ok(_) => Ok(protocol::parse_string(&self.buf[..len], offset)),
            Err(e) => Err(self.check_connected(e)),
        }
    }

    fn query_serial(&mut self) -> Result<String> {
        self.query(self.desc.serial, self.desc.serial_len(), self.desc.serial_offset)
    }

    /// Serial number, from the cache when known
    pub fn serial(&mut self) -> Result<String> {
        if !self.conn.serial.is_empty() {
            return Ok(self.conn.serial.clone());
        }
        let serial = self.query_serial()?;
        self.conn.serial = serial.clone();
        Ok(serial)
    }

    /// Firmware version string
    pub fn firmware(&mut self) -> Result<String> {
        self.query(self.desc.firmware, self.desc.payload_len, self.desc.firmware_offset)
    }
}

/// First attached device of any supported model, optionally with `serial`
fn first_supported(
    discovery: &dyn DeviceDiscovery,
    serial: Option<&str>,
) -> Result<&'static DeviceDescriptor> {
    discovery
        .list_devices(VENDOR_ID, None, serial)?
        .iter()
        .find_map(|d| devices::find_device(d.info.pid))
        .ok_or_else(|| {
            DeckError::Transport(TransportError::DeviceNotFound(match serial {
                Some(s) => format!("no supported deck with serial {s}"),
                None => "no supported deck".to_string(),
            }))
        })
}

/// Serial numbers of every attached device of one model
pub fn serials(discovery: &dyn DeviceDiscovery, pid: u16) -> Result<Vec<String>> {
    devices::lookup(pid)?;
    Ok(discovery
        .list_devices(VENDOR_ID, Some(pid), None)?
        .into_iter()
        .filter_map(|d| d.info.serial)
        .collect())
}

/// An attached deck as seen on the bus
#[derive(Debug, Clone, Serialize)]
pub struct DeckInfo {
    #[serde(serialize_with = "serialize_model")]
    pub model: Model,
    pub pid: u16,
    pub serial: Option<String>,
    pub path: String,
}

fn serialize_model<S: serde::Serializer>(
    model: &Model,
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(model.name())
}

/// Every attached deck of a supported model
pub fn list_decks(discovery: &dyn DeviceDiscovery) -> Result<Vec<DeckInfo>> {
    Ok(discovery
        .list_devices(VENDOR_ID, None, None)?
        .into_iter()
        .filter_map(|d| {
            Model::from_pid(d.info.pid).map(|model| DeckInfo {
                model,
                pid: d.info.pid,
                serial: d.info.serial,
                path: d.info.device_path,
            })
        })
        .collect())
}
