//! Key image command handlers (set-image, GIF playback).

use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, DynamicImage, ImageFormat, ImageReader};
use tracing::debug;

use super::{CommandResult, Session};
use deck_driver::{Deck, RawImage};

/// Default frame delay when the GIF does not specify one
const DEFAULT_DELAY_MS: u64 = 100;

/// A decoded image file
enum Picture {
    Still(DynamicImage),
    Animated(Animation),
}

struct Animation {
    /// Fully composited frames with their display time
    frames: Vec<(DynamicImage, Duration)>,
    /// Loop count stored in the file
    repeat: gif::Repeat,
}

/// How many times to play an animation, `None` for endlessly
///
/// A finite loop count of `n` means `n` restarts after the first play.
fn play_count(repeat: gif::Repeat, force_loop: bool) -> Option<u32> {
    match repeat {
        _ if force_loop => None,
        gif::Repeat::Infinite => None,
        gif::Repeat::Finite(n) => Some(u32::from(n) + 1),
    }
}

/// Loop count from the NETSCAPE extension, which precedes the first frame
fn gif_repeat(bytes: &[u8]) -> anyhow::Result<gif::Repeat> {
    let mut decoder = gif::DecodeOptions::new().read_info(bytes)?;
    decoder.next_frame_info()?;
    Ok(decoder.repeat())
}

fn load_gif(bytes: &[u8]) -> anyhow::Result<Picture> {
    let decoder = GifDecoder::new(Cursor::new(bytes))?;

    let mut frames = Vec::new();
    for frame in decoder.into_frames() {
        let frame = frame?;
        let (numer, denom) = frame.delay().numer_denom_ms();
        let delay_ms = (numer / denom.max(1)) as u64;
        let delay_ms = if delay_ms == 0 { DEFAULT_DELAY_MS } else { delay_ms };
        frames.push((
            DynamicImage::ImageRgba8(frame.into_buffer()),
            Duration::from_millis(delay_ms),
        ));
    }

    match frames.len() {
        0 => anyhow::bail!("GIF has no frames"),
        1 => Ok(Picture::Still(frames.remove(0).0)),
        _ => Ok(Picture::Animated(Animation {
            frames,
            repeat: gif_repeat(bytes)?,
        })),
    }
}

/// Decode an image file, picking the codec from its content
fn decode(bytes: &[u8]) -> anyhow::Result<Picture> {
    let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    if reader.format() == Some(ImageFormat::Gif) {
        return load_gif(bytes);
    }
    Ok(Picture::Still(reader.decode()?))
}

fn load(path: &Path) -> anyhow::Result<Picture> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    decode(&bytes).with_context(|| format!("Failed to decode {}", path.display()))
}

/// Keys addressed by the command line
fn targets(deck: &Deck, row: usize, col: usize, all: bool) -> anyhow::Result<Vec<(usize, usize)>> {
    let (rows, cols) = deck.layout();
    if all {
        return Ok((0..rows)
            .flat_map(|r| (0..cols).map(move |c| (r, c)))
            .collect());
    }
    deck.key(row, col)?;
    Ok(vec![(row, col)])
}

fn show(deck: &mut Deck, keys: &[(usize, usize)], raw: &RawImage) -> CommandResult {
    for &(row, col) in keys {
        deck.set_image(row, col, raw)?;
    }
    Ok(())
}

/// Show an image file on one key or on all keys
///
/// Animations play as often as the file asks, or endlessly with `repeat`.
pub fn set_image(
    session: &Session,
    path: &Path,
    row: usize,
    col: usize,
    all: bool,
    repeat: bool,
) -> CommandResult {
    let picture = load(path)?;
    let mut deck = session.open()?;
    let keys = targets(&deck, row, col, all)?;

    match picture {
        Picture::Still(img) => {
            let raw = deck.raw_image(&img)?;
            show(&mut deck, &keys, &raw)?;
            println!("Image set on {} key(s)", keys.len());
        }
        Picture::Animated(animation) => {
            // Encode every frame once, then replay the payloads
            let rendered = animation
                .frames
                .iter()
                .map(|(img, delay)| Ok((deck.raw_image(img)?, *delay)))
                .collect::<anyhow::Result<Vec<_>>>()?;
            let plays = play_count(animation.repeat, repeat);
            debug!("Rendered {} frames, plays {:?}", rendered.len(), plays);
            println!("Playing {} frames (Ctrl-C to stop)", rendered.len());

            let mut played = 0;
            'playback: while plays.map_or(true, |n| played < n) {
                for (raw, delay) in &rendered {
                    show(&mut deck, &keys, raw)?;
                    if session.interrupt.sleep(*delay) {
                        break 'playback;
                    }
                }
                played += 1;
            }
        }
    }

    deck.close()?;
    Ok(())
}
