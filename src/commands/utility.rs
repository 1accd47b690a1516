//! Utility command handlers (keys, config).

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use tracing::warn;

use super::{CommandResult, Session};
use deck_driver::DeckError;

/// How long one key state read may block before Ctrl-C is checked again
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Print key presses and releases until Ctrl-C
pub fn keys(session: &Session, reconnect: bool) -> CommandResult {
    let mut deck = session.open()?;
    let (_, cols) = deck.layout();
    println!(
        "Watching {} keys on {} (Ctrl-C to stop)",
        deck.len(),
        deck.model()
    );

    let mut previous = vec![false; deck.len()];
    while !session.interrupt.is_cancelled() {
        let states = match deck.poll_key_states(POLL_INTERVAL) {
            Ok(Some(states)) => states,
            Ok(None) => continue,
            Err(DeckError::NotConnected) if reconnect => {
                warn!("{} disconnected, waiting for it to return", deck.model());
                println!("Disconnected, waiting...");
                let token = match session.config.reconnect_timeout() {
                    Some(timeout) => session.interrupt.limited(timeout),
                    None => session.interrupt.clone(),
                };
                match deck.reconnect(session.config.reconnect_delay(), &token) {
                    Ok(()) => {}
                    Err(_) if session.interrupt.is_cancelled() => break,
                    Err(e) => return Err(e).context("Deck did not come back"),
                }
                session.apply_settings(&mut deck)?;
                previous.fill(false);
                println!("Reconnected");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        for (index, (&now, &before)) in states.iter().zip(&previous).enumerate() {
            if now != before {
                println!(
                    "key {:2} (row {}, col {}) {}",
                    index,
                    index / cols,
                    index % cols,
                    if now { "pressed" } else { "released" }
                );
            }
        }
        previous = states;
    }

    deck.close()?;
    Ok(())
}

/// Show the effective configuration, optionally writing it to `path`
pub fn config(session: &Session, path: &Path, save: bool) -> CommandResult {
    let text =
        toml::to_string_pretty(&session.config).context("Failed to serialize config")?;
    print!("{}", text);

    if save {
        session.config.save(path)?;
        println!("Saved to {}", path.display());
    }
    Ok(())
}
