//! Deck error types

use deck_transport::TransportError;
use thiserror::Error;

/// Errors from deck operations
#[derive(Error, Debug)]
pub enum DeckError {
    /// No descriptor is registered for this product id
    #[error("Unknown model: 0x{0:04x}")]
    UnknownModel(u16),

    /// Row, column or brightness outside the valid range
    #[error("Out of bounds: {0}")]
    OutOfBounds(String),

    /// Imagery requested from a control-only model
    #[error("Model has no key images: {0}")]
    NotVisual(String),

    /// Transport failed and the device is no longer enumerable
    #[error("Device not connected")]
    NotConnected,

    /// Transport layer error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Key image could not be encoded
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, DeckError>;
