//! Command handlers for the CLI application.
//!
//! This module organizes command handlers by category:
//! - `query`: Read-only commands (list, info)
//! - `set`: Setting commands (brightness, reset)
//! - `animations`: Key images and GIF playback (set-image)
//! - `utility`: Utility commands (keys, config)

pub mod animations;
pub mod query;
pub mod set;
pub mod utility;

use std::sync::Arc;

use anyhow::Context;
use deck_driver::{CancelToken, Deck, DeckConfig, Model};
use deck_transport::{DeviceDiscovery, HidDiscovery, PacketFilter, PrinterConfig};
use tracing::info;

/// Result type for command handlers
pub type CommandResult = anyhow::Result<()>;

/// Everything a command needs: settings, the bus and the Ctrl-C token
pub struct Session {
    pub config: DeckConfig,
    pub interrupt: CancelToken,
    discovery: Arc<dyn DeviceDiscovery>,
}

impl Session {
    /// If `printer_config` is Some, every opened transport is wrapped with
    /// Printer for monitoring.
    pub fn new(
        config: DeckConfig,
        printer_config: Option<PrinterConfig>,
        interrupt: CancelToken,
    ) -> Self {
        let discovery = match printer_config {
            Some(config) => HidDiscovery::with_printer_config(config),
            None => HidDiscovery::new(),
        };
        Self {
            config,
            interrupt,
            discovery: Arc::new(discovery),
        }
    }

    pub fn discovery(&self) -> &dyn DeviceDiscovery {
        self.discovery.as_ref()
    }

    /// Open the configured deck and apply the configured brightness
    pub fn open(&self) -> anyhow::Result<Deck> {
        let mut deck = Deck::open(
            Arc::clone(&self.discovery),
            self.config.device.map(Model::pid),
            self.config.serial.as_deref(),
        )
        .context("Failed to open deck")?;
        self.apply_settings(&mut deck)?;
        Ok(deck)
    }

    /// Re-apply settings the deck forgets when power cycled
    pub fn apply_settings(&self, deck: &mut Deck) -> anyhow::Result<()> {
        if let Some(brightness) = self.config.brightness {
            info!("Applying configured brightness {}%", brightness);
            deck.set_brightness(brightness.into())
                .context("Failed to set brightness")?;
        }
        Ok(())
    }
}

/// Create printer config from CLI flags
pub fn create_printer_config(
    monitor: bool,
    hex: bool,
    filter: Option<&str>,
) -> anyhow::Result<Option<PrinterConfig>> {
    if !monitor {
        return Ok(None);
    }

    let filter = match filter {
        Some(f) => f.parse::<PacketFilter>().map_err(anyhow::Error::msg)?,
        None => PacketFilter::All,
    };

    Ok(Some(PrinterConfig::default().with_hex(hex).with_filter(filter)))
}
