// Elgato Stream Deck Linux Driver - Shared Library
// Device registry, report encoding, key image pipeline and deck sessions

pub mod cancel;
pub mod config;
pub mod deck;
pub mod devices;
pub mod error;
pub mod pipeline;
pub mod protocol;

pub use cancel::CancelToken;
pub use config::DeckConfig;
pub use deck::{list_decks, serials, Deck, DeckInfo};
pub use devices::{find_device, is_supported, lookup, DeviceDescriptor, Model, SUPPORTED_DEVICES};
pub use error::{DeckError, Result};
pub use pipeline::{prepare, ImageInput, RawImage};

pub use deck_transport::VENDOR_ID;
