//! Setting command handlers.

use super::{CommandResult, Session};

/// Set backlight brightness
pub fn brightness(session: &Session, percent: u8) -> CommandResult {
    let mut deck = session.open()?;
    deck.set_brightness(percent.into())?;
    println!("Brightness set to {}%", percent);
    deck.close()?;
    Ok(())
}

/// Clear all key images
pub fn reset(session: &Session) -> CommandResult {
    let mut deck = session.open()?;
    deck.reset()?;
    println!("{} reset", deck.model());
    deck.close()?;
    Ok(())
}
