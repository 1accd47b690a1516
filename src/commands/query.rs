//! Query command handlers.

use super::{CommandResult, Session};
use deck_driver::{list_decks, serials};

/// List connected decks
pub fn list(session: &Session, json: bool) -> CommandResult {
    let decks = list_decks(session.discovery())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&decks)?);
        return Ok(());
    }

    if decks.is_empty() {
        println!("No Stream Deck found");
        return Ok(());
    }

    println!("Connected decks:");
    for deck in &decks {
        println!(
            "  {:<22} PID={:04x} serial={}",
            deck.model,
            deck.pid,
            deck.serial.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

/// Show model, serial and firmware of the selected deck
pub fn info(session: &Session) -> CommandResult {
    let mut deck = session.open()?;
    let (rows, cols) = deck.layout();

    println!("Model:     {} (PID {:04x})", deck.model(), deck.pid());
    println!("Serial:    {}", deck.serial()?);
    println!("Firmware:  {}", deck.firmware()?);
    println!("Keys:      {} ({} rows x {} columns)", deck.len(), rows, cols);
    match deck.bounds() {
        Ok((width, height)) => println!("Key image: {}x{} px", width, height),
        Err(_) => println!("Key image: none"),
    }

    let others: Vec<String> = serials(session.discovery(), deck.pid())?
        .into_iter()
        .filter(|s| Some(s) != deck.device_info().serial.as_ref())
        .collect();
    if !others.is_empty() {
        println!("Also connected: {}", others.join(", "));
    }

    deck.close()?;
    Ok(())
}
