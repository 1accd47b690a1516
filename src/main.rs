//! Stream Deck Driver CLI
//!
//! A command-line interface for controlling Elgato Stream Deck panels.

use clap::Parser;
use deck_driver::{CancelToken, DeckConfig};
use tracing::{debug, info};

// CLI definitions
mod cli;
use cli::{Cli, Commands};

// Command handlers
mod commands;
use commands::Session;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    // Load config
    let config_path = cli.config.clone().unwrap_or_else(DeckConfig::default_path);
    debug!("Loading config from {:?}", config_path);
    let mut config = DeckConfig::load(&config_path)?;

    // Command line overrides the file
    if cli.device.is_some() {
        config.device = cli.device;
    }
    if cli.serial.is_some() {
        config.serial = cli.serial.clone();
    }

    // Set up Ctrl-C handler
    let interrupt = CancelToken::new();
    let handler_token = interrupt.clone();
    ctrlc::set_handler(move || {
        info!("Interrupted");
        handler_token.cancel();
    })?;

    let printer_config =
        commands::create_printer_config(cli.monitor, cli.hex, cli.filter.as_deref())?;
    let session = Session::new(config, printer_config, interrupt);

    match cli.command {
        None | Some(Commands::Info) => commands::query::info(&session),
        Some(Commands::List { json }) => commands::query::list(&session, json),

        Some(Commands::Brightness { percent }) => commands::set::brightness(&session, percent),
        Some(Commands::Reset) => commands::set::reset(&session),
        Some(Commands::SetImage {
            file,
            row,
            col,
            all,
            repeat,
        }) => commands::animations::set_image(&session, &file, row, col, all, repeat),

        Some(Commands::Keys { reconnect }) => commands::utility::keys(&session, reconnect),
        Some(Commands::Config { save }) => commands::utility::config(&session, &config_path, save),
    }
}
