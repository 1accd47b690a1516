//! PrinterTransport middleware for monitoring/tracing transport operations
//!
//! This module provides a middleware that wraps any Transport implementation
//! and prints every report passing through it.
//!
//! # Example
//!
//! ```ignore
//! use deck_transport::{DeviceDiscovery, HidDiscovery, PrinterConfig, PrinterTransport};
//!
//! let transport = HidDiscovery::new().open_device(0x0fd9, 0x0080, None)?;
//! let monitored = PrinterTransport::wrap(transport, PrinterConfig::default());
//! // Now all reports will be printed
//! ```

use std::str::FromStr;

use colored::Colorize;

use crate::{BoxedTransport, Transport, TransportDeviceInfo, TransportError};

/// Number of bytes shown when hex dumps are disabled
const SUMMARY_BYTES: usize = 8;

/// Packet filter for selective display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PacketFilter {
    #[default]
    All,
    /// Output reports (image packets)
    Output,
    /// Feature reports (commands and queries)
    Feature,
    /// Input reports (key states)
    Input,
}

impl FromStr for PacketFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all" | "" => Ok(Self::All),
            "output" | "out" | "images" => Ok(Self::Output),
            "feature" | "features" | "cmd" => Ok(Self::Feature),
            "input" | "in" | "keys" => Ok(Self::Input),
            _ => Err(format!("Unknown filter: {}", s)),
        }
    }
}

/// Configuration for the PrinterTransport
#[derive(Debug, Clone, Default)]
pub struct PrinterConfig {
    /// Show full hex dump instead of the first few bytes
    pub show_hex: bool,
    /// Filter for selective display
    pub filter: PacketFilter,
}

impl PrinterConfig {
    /// Create config with hex output setting
    pub fn with_hex(mut self, show: bool) -> Self {
        self.show_hex = show;
        self
    }

    /// Create config with filter
    pub fn with_filter(mut self, filter: PacketFilter) -> Self {
        self.filter = filter;
        self
    }
}

/// Transport middleware that prints all reports
pub struct PrinterTransport {
    inner: BoxedTransport,
    config: PrinterConfig,
}

impl PrinterTransport {
    /// Wrap a transport with printing middleware
    pub fn wrap(transport: BoxedTransport, config: PrinterConfig) -> BoxedTransport {
        Box::new(Self {
            inner: transport,
            config,
        })
    }

    fn should_show(&self, kind: PacketFilter) -> bool {
        self.config.filter == PacketFilter::All || self.config.filter == kind
    }

    fn format_bytes(&self, data: &[u8]) -> String {
        let shown = if self.config.show_hex {
            data
        } else {
            &data[..data.len().min(SUMMARY_BYTES)]
        };
        let hex: Vec<String> = shown.iter().map(|b| format!("{b:02x}")).collect();
        if shown.len() < data.len() {
            format!("{} .. ({} bytes)", hex.join(" "), data.len())
        } else {
            hex.join(" ")
        }
    }

    fn print(&self, kind: PacketFilter, label: &str, data: &[u8], result: &str) {
        if !self.should_show(kind) {
            return;
        }
        let label = format!("{label:<8}");
        let label = match kind {
            PacketFilter::Output => label.cyan().bold(),
            PacketFilter::Feature => label.yellow().bold(),
            _ => label.green().bold(),
        };
        eprintln!("{} [{}] {}", label, self.format_bytes(data), result.dimmed());
    }
}

fn describe<T: std::fmt::Debug>(result: &Result<T, TransportError>) -> String {
    match result {
        Ok(v) => format!("-> {v:?}"),
        Err(e) => format!("-> error: {e}"),
    }
}

impl Transport for PrinterTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let result = self.inner.read(buf);
        let n = *result.as_ref().unwrap_or(&0);
        self.print(PacketFilter::Input, "READ", &buf[..n], &describe(&result));
        result
    }

    fn read_timeout(&mut self, buf: &mut [u8], timeout_ms: i32) -> Result<usize, TransportError> {
        let result = self.inner.read_timeout(buf, timeout_ms);
        // Timeouts are not traffic
        if !matches!(result, Ok(0)) {
            let n = *result.as_ref().unwrap_or(&0);
            self.print(PacketFilter::Input, "READ", &buf[..n], &describe(&result));
        }
        result
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let result = self.inner.write(data);
        self.print(PacketFilter::Output, "WRITE", data, &describe(&result));
        result
    }

    fn get_feature_report(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let result = self.inner.get_feature_report(buf);
        self.print(PacketFilter::Feature, "GET_FEAT", buf, &describe(&result));
        result
    }

    fn send_feature_report(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let result = self.inner.send_feature_report(data);
        self.print(PacketFilter::Feature, "SET_FEAT", data, &describe(&result));
        result
    }

    fn close(&mut self) -> Result<(), TransportError> {
        let result = self.inner.close();
        if self.config.filter == PacketFilter::All {
            eprintln!("{} {}", "CLOSE   ".red().bold(), describe(&result).dimmed());
        }
        result
    }

    fn device_info(&self) -> &TransportDeviceInfo {
        self.inner.device_info()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_parsing() {
        assert_eq!("all".parse::<PacketFilter>(), Ok(PacketFilter::All));
        assert_eq!("".parse::<PacketFilter>(), Ok(PacketFilter::All));
        assert_eq!("images".parse::<PacketFilter>(), Ok(PacketFilter::Output));
        assert_eq!("Feature".parse::<PacketFilter>(), Ok(PacketFilter::Feature));
        assert_eq!("keys".parse::<PacketFilter>(), Ok(PacketFilter::Input));
        assert!("bogus".parse::<PacketFilter>().is_err());
    }

    #[test]
    fn test_config_builders() {
        let config = PrinterConfig::default()
            .with_hex(true)
            .with_filter(PacketFilter::Output);
        assert!(config.show_hex);
        assert_eq!(config.filter, PacketFilter::Output);
    }
}
