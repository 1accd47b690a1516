//! In-memory device bus for exercising code above the transport layer
//!
//! A [`MockBus`] behaves like a USB bus with decks plugged into it. Tests
//! script what each device answers, pull cables, and afterwards inspect the
//! exact reports that were exchanged.
//!
//! ```ignore
//! let bus = MockBus::new();
//! bus.add_device(0x0080, "CL12345");
//! bus.set_feature_response("CL12345", 0x06, b"\x06\x0cCL12345");
//! let transport = bus.open_device(VENDOR_ID, 0x0080, Some("CL12345"))?;
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::types::{DiscoveredDevice, TransportDeviceInfo, VENDOR_ID};
use crate::{BoxedTransport, DeviceDiscovery, Transport, TransportError};

/// One transport call observed by the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockAction {
    Open,
    Write(Vec<u8>),
    /// Read with the requested buffer length
    Read(usize),
    /// Get-feature request buffer as sent by the caller
    GetFeatureReport(Vec<u8>),
    SendFeatureReport(Vec<u8>),
    Close,
}

struct MockDevice {
    info: TransportDeviceInfo,
    plugged: bool,
    /// Bumped on every unplug so stale handles stop working
    generation: u32,
    /// Enumerations left before a pending replug happens
    replug_in: Option<usize>,
    inputs: VecDeque<Vec<u8>>,
    feature_responses: HashMap<u8, Vec<u8>>,
    writes_before_failure: Option<usize>,
    fail_features: bool,
    fail_get_features: bool,
    actions: Vec<MockAction>,
}

#[derive(Default)]
struct BusState {
    devices: Vec<MockDevice>,
    enumerations: usize,
}

impl BusState {
    fn device(&self, serial: &str) -> Option<&MockDevice> {
        self.devices.iter().find(|d| d.info.has_serial(serial))
    }

    fn device_mut(&mut self, serial: &str) -> Option<&mut MockDevice> {
        self.devices.iter_mut().find(|d| d.info.has_serial(serial))
    }

    fn tick_replugs(&mut self) {
        for device in &mut self.devices {
            if let Some(remaining) = device.replug_in {
                if remaining <= 1 {
                    device.replug_in = None;
                    device.plugged = true;
                } else {
                    device.replug_in = Some(remaining - 1);
                }
            }
        }
    }
}

/// Shared in-memory bus; clones refer to the same devices
#[derive(Clone, Default)]
pub struct MockBus {
    state: Arc<Mutex<BusState>>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plug in a device with the given product id and serial number
    pub fn add_device(&self, pid: u16, serial: &str) {
        let mut state = self.state.lock();
        let index = state.devices.len();
        state.devices.push(MockDevice {
            info: TransportDeviceInfo {
                vid: VENDOR_ID,
                pid,
                device_path: format!("mock:{index}"),
                serial: Some(serial.to_string()),
                product_name: Some("Mock Deck".to_string()),
            },
            plugged: true,
            generation: 0,
            replug_in: None,
            inputs: VecDeque::new(),
            feature_responses: HashMap::new(),
            writes_before_failure: None,
            fail_features: false,
            fail_get_features: false,
            actions: Vec::new(),
        });
    }

    /// Pull the cable; open handles start failing
    pub fn unplug(&self, serial: &str) {
        if let Some(device) = self.state.lock().device_mut(serial) {
            device.plugged = false;
            device.generation += 1;
            device.replug_in = None;
        }
    }

    /// Plug the device back in
    pub fn replug(&self, serial: &str) {
        if let Some(device) = self.state.lock().device_mut(serial) {
            device.plugged = true;
            device.replug_in = None;
        }
    }

    /// Unplug now and have the device reappear on the `n`th enumeration from
    /// here on (`n = 1` makes the next enumeration see it)
    pub fn replug_after(&self, serial: &str, n: usize) {
        self.unplug(serial);
        if let Some(device) = self.state.lock().device_mut(serial) {
            if n == 0 {
                device.plugged = true;
            } else {
                device.replug_in = Some(n);
            }
        }
    }

    /// Queue an input report returned by the next read
    pub fn push_input(&self, serial: &str, report: &[u8]) {
        if let Some(device) = self.state.lock().device_mut(serial) {
            device.inputs.push_back(report.to_vec());
        }
    }

    /// Answer get-feature requests for `report_id` with `response`
    pub fn set_feature_response(&self, serial: &str, report_id: u8, response: &[u8]) {
        if let Some(device) = self.state.lock().device_mut(serial) {
            device.feature_responses.insert(report_id, response.to_vec());
        }
    }

    /// Let `after` writes succeed, then fail every following one
    pub fn fail_writes(&self, serial: &str, after: usize) {
        if let Some(device) = self.state.lock().device_mut(serial) {
            device.writes_before_failure = Some(after);
        }
    }

    /// Make feature report calls fail (or succeed again)
    pub fn fail_features(&self, serial: &str, fail: bool) {
        if let Some(device) = self.state.lock().device_mut(serial) {
            device.fail_features = fail;
        }
    }

    /// Make only get-feature requests fail, leaving commands working
    pub fn fail_get_features(&self, serial: &str, fail: bool) {
        if let Some(device) = self.state.lock().device_mut(serial) {
            device.fail_get_features = fail;
        }
    }

    /// Every call made against the device so far
    pub fn actions(&self, serial: &str) -> Vec<MockAction> {
        self.state
            .lock()
            .device(serial)
            .map(|d| d.actions.clone())
            .unwrap_or_default()
    }

    /// Output reports written to the device so far
    pub fn writes(&self, serial: &str) -> Vec<Vec<u8>> {
        self.actions(serial)
            .into_iter()
            .filter_map(|a| match a {
                MockAction::Write(data) => Some(data),
                _ => None,
            })
            .collect()
    }

    pub fn clear_actions(&self, serial: &str) {
        if let Some(device) = self.state.lock().device_mut(serial) {
            device.actions.clear();
        }
    }

    /// Number of `list_devices` calls served
    pub fn enumerations(&self) -> usize {
        self.state.lock().enumerations
    }
}

impl DeviceDiscovery for MockBus {
    fn list_devices(
        &self,
        vid: u16,
        pid: Option<u16>,
        serial: Option<&str>,
    ) -> Result<Vec<DiscoveredDevice>, TransportError> {
        let mut state = self.state.lock();
        state.enumerations += 1;
        state.tick_replugs();

        Ok(state
            .devices
            .iter()
            .filter(|d| d.plugged && d.info.vid == vid)
            .filter(|d| pid.map_or(true, |p| d.info.pid == p))
            .filter(|d| serial.map_or(true, |s| d.info.has_serial(s)))
            .map(|d| DiscoveredDevice {
                info: d.info.clone(),
            })
            .collect())
    }

    fn open_device(
        &self,
        vid: u16,
        pid: u16,
        serial: Option<&str>,
    ) -> Result<BoxedTransport, TransportError> {
        let mut state = self.state.lock();
        let (index, device) = state
            .devices
            .iter_mut()
            .enumerate()
            .find(|(_, d)| {
                d.plugged
                    && d.info.vid == vid
                    && d.info.pid == pid
                    && serial.map_or(true, |s| d.info.has_serial(s))
            })
            .ok_or_else(|| TransportError::DeviceNotFound(format!("{vid:04X}:{pid:04X}")))?;

        device.actions.push(MockAction::Open);
        Ok(Box::new(MockTransport {
            state: Arc::clone(&self.state),
            index,
            generation: device.generation,
            info: device.info.clone(),
            closed: false,
        }))
    }
}

/// Handle to one device on a [`MockBus`]
pub struct MockTransport {
    state: Arc<Mutex<BusState>>,
    index: usize,
    generation: u32,
    info: TransportDeviceInfo,
    closed: bool,
}

impl MockTransport {
    /// Log `action` and run `f` against the device if the handle is still live
    fn with_device<T>(
        &mut self,
        action: MockAction,
        f: impl FnOnce(&mut MockDevice) -> Result<T, TransportError>,
    ) -> Result<T, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let mut state = self.state.lock();
        let device = state
            .devices
            .get_mut(self.index)
            .ok_or_else(|| TransportError::Internal("mock device vanished".into()))?;
        device.actions.push(action);
        if !device.plugged || device.generation != self.generation {
            return Err(TransportError::HidError("No such device".into()));
        }
        f(device)
    }
}

impl Transport for MockTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        self.with_device(MockAction::Read(buf.len()), |device| {
            Ok(match device.inputs.pop_front() {
                Some(report) => {
                    let n = report.len().min(buf.len());
                    buf[..n].copy_from_slice(&report[..n]);
                    n
                }
                None => 0,
            })
        })
    }

    fn read_timeout(&mut self, buf: &mut [u8], _timeout_ms: i32) -> Result<usize, TransportError> {
        // Scripted input never blocks
        self.read(buf)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        self.with_device(MockAction::Write(data.to_vec()), |device| {
            match device.writes_before_failure {
                Some(0) => Err(TransportError::HidError("write failed".into())),
                Some(n) => {
                    device.writes_before_failure = Some(n - 1);
                    Ok(data.len())
                }
                None => Ok(data.len()),
            }
        })
    }

    fn get_feature_report(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let request = buf.to_vec();
        let response = self.with_device(MockAction::GetFeatureReport(request), |device| {
            if device.fail_features || device.fail_get_features {
                return Err(TransportError::HidError("feature report failed".into()));
            }
            Ok(device.feature_responses.get(&buf[0]).cloned())
        })?;

        if let Some(response) = response {
            buf.fill(0);
            let n = response.len().min(buf.len());
            buf[..n].copy_from_slice(&response[..n]);
        }
        Ok(buf.len())
    }

    fn send_feature_report(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.with_device(MockAction::SendFeatureReport(data.to_vec()), |device| {
            if device.fail_features {
                return Err(TransportError::HidError("feature report failed".into()));
            }
            Ok(())
        })
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.closed = true;
        if let Some(device) = self.state.lock().devices.get_mut(self.index) {
            device.actions.push(MockAction::Close);
        }
        Ok(())
    }

    fn device_info(&self) -> &TransportDeviceInfo {
        &self.info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_filters_by_pid_and_serial() {
        let bus = MockBus::new();
        bus.add_device(0x0080, "A");
        bus.add_device(0x0063, "B");

        let all = bus.list_devices(VENDOR_ID, None, None).unwrap();
        assert_eq!(all.len(), 2);

        let mk2 = bus.list_devices(VENDOR_ID, Some(0x0080), None).unwrap();
        assert_eq!(mk2.len(), 1);
        assert!(mk2[0].info.has_serial("A"));

        let b = bus.list_devices(VENDOR_ID, None, Some("B")).unwrap();
        assert_eq!(b[0].info.pid, 0x0063);

        assert!(bus.list_devices(0x1234, None, None).unwrap().is_empty());
        assert_eq!(bus.enumerations(), 4);
    }

    #[test]
    fn test_unplug_invalidates_open_handles() {
        let bus = MockBus::new();
        bus.add_device(0x0080, "A");
        let mut transport = bus.open_device(VENDOR_ID, 0x0080, None).unwrap();
        assert_eq!(transport.write(&[1, 2, 3]).unwrap(), 3);

        bus.unplug("A");
        assert!(transport.write(&[1]).is_err());
        assert!(bus.open_device(VENDOR_ID, 0x0080, None).is_err());

        // A stale handle stays dead after replug
        bus.replug("A");
        assert!(transport.write(&[1]).is_err());
        let mut fresh = bus.open_device(VENDOR_ID, 0x0080, Some("A")).unwrap();
        assert!(fresh.write(&[1]).is_ok());
    }

    #[test]
    fn test_replug_after_counts_enumerations() {
        let bus = MockBus::new();
        bus.add_device(0x0080, "A");
        bus.replug_after("A", 3);

        assert!(bus.list_devices(VENDOR_ID, None, Some("A")).unwrap().is_empty());
        assert!(bus.list_devices(VENDOR_ID, None, Some("A")).unwrap().is_empty());
        assert_eq!(bus.list_devices(VENDOR_ID, None, Some("A")).unwrap().len(), 1);
    }

    #[test]
    fn test_scripted_reports_and_action_log() {
        let bus = MockBus::new();
        bus.add_device(0x0080, "A");
        bus.push_input("A", &[1, 0, 0, 0, 1]);
        bus.set_feature_response("A", 0x05, &[0x05, 0x0c, 0, 0, 0, 0, b'1']);
        bus.fail_writes("A", 1);

        let mut transport = bus.open_device(VENDOR_ID, 0x0080, None).unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(transport.read(&mut buf).unwrap(), 5);
        assert_eq!(buf[4], 1);
        assert_eq!(transport.read(&mut buf).unwrap(), 0);

        let mut feature = [0u8; 8];
        feature[0] = 0x05;
        transport.get_feature_report(&mut feature).unwrap();
        assert_eq!(feature[6], b'1');

        assert!(transport.write(&[9]).is_ok());
        assert!(transport.write(&[9]).is_err());

        transport.close().unwrap();
        assert!(matches!(transport.close(), Err(TransportError::Closed)));

        let actions = bus.actions("A");
        assert_eq!(actions.first(), Some(&MockAction::Open));
        assert_eq!(actions.last(), Some(&MockAction::Close));
        assert_eq!(bus.writes("A").len(), 2);
    }

    #[test]
    fn test_get_feature_failure_spares_commands() {
        let bus = MockBus::new();
        bus.add_device(0x0080, "A");
        bus.fail_get_features("A", true);

        let mut transport = bus.open_device(VENDOR_ID, 0x0080, None).unwrap();
        assert!(transport.send_feature_report(&[0x03, 0x02]).is_ok());
        let mut feature = [0u8; 32];
        feature[0] = 0x06;
        assert!(transport.get_feature_report(&mut feature).is_err());

        bus.fail_get_features("A", false);
        assert!(transport.get_feature_report(&mut feature).is_ok());
    }
}
