// CLI definitions using clap

use clap::{Parser, Subcommand};
use deck_driver::Model;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "deck_driver")]
#[command(author, version, about = "Elgato Stream Deck Linux Driver")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Deck model (e.g. MK2, XL, StreamDeckMini, 0x0080); any supported deck if unset
    #[arg(long, global = true)]
    pub device: Option<Model>,

    /// Serial number of the deck to use
    #[arg(long, global = true)]
    pub serial: Option<String>,

    /// Config file path (default: ~/.config/deck_driver/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable transport monitoring (prints all reports)
    #[arg(long, global = true)]
    pub monitor: bool,

    /// Show full hex dumps in monitor output
    #[arg(long, global = true)]
    pub hex: bool,

    /// Filter monitor output (all, output, feature, input)
    #[arg(long, global = true)]
    pub filter: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    // === Query Commands ===
    /// List connected decks
    #[command(visible_alias = "ls")]
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show model, serial number and firmware version
    #[command(visible_aliases = ["details", "version"])]
    Info,

    // === Set Commands ===
    /// Set backlight brightness
    #[command(visible_alias = "b")]
    Brightness {
        /// Brightness in percent (0-100)
        #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
        percent: u8,
    },

    /// Clear all key images and show the standby logo
    Reset,

    /// Show an image (bmp, gif, jpeg or png) on a key
    #[command(visible_aliases = ["image", "img"])]
    SetImage {
        /// Image file; animated GIFs are played frame by frame
        file: PathBuf,

        /// Row of the target key
        #[arg(long, default_value_t = 0)]
        row: usize,

        /// Column of the target key
        #[arg(long, default_value_t = 0)]
        col: usize,

        /// Show the image on every key
        #[arg(long)]
        all: bool,

        /// Loop an animation until interrupted, whatever its own loop count
        #[arg(long = "loop")]
        repeat: bool,
    },

    // === Utility Commands ===
    /// Print key presses and releases until interrupted
    #[command(visible_alias = "k")]
    Keys {
        /// Wait for the deck to come back when it is unplugged
        #[arg(long)]
        reconnect: bool,
    },

    /// Show the effective configuration
    Config {
        /// Write it to the config file
        #[arg(long)]
        save: bool,
    },
}
