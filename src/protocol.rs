//! Report encoding for Stream Deck panels
//!
//! Everything here is pure: the functions build or parse report buffers and
//! never touch a transport. `Deck` wires them to the device.

use crate::devices::ImageFormat;

/// Split an encoded key image into output reports and hand each one to `write`
///
/// Every packet is `format.report_len` bytes: the header template with its
/// page/key/done fields filled in, followed by the next slice of `payload`.
/// The body of the final packet is zero padded. Pages are numbered from 0 and
/// written strictly in order; the first error from `write` aborts the stream.
///
/// Returns the number of packets written. An empty payload writes nothing.
pub fn stream_image<E>(
    format: &ImageFormat,
    key: u8,
    payload: &[u8],
    mut write: impl FnMut(&[u8]) -> Result<(), E>,
) -> Result<usize, E> {
    let header_len = format.header.len();
    let body_len = format.body_len();
    let pages = payload.len().div_ceil(body_len);

    let mut packet = vec![0u8; format.report_len];
    packet[..header_len].copy_from_slice(format.header);

    for (page, chunk) in payload.chunks(body_len).enumerate() {
        let done = page + 1 == pages;
        format.header_version.fill(
            &mut packet[..header_len],
            key,
            page as u16,
            chunk.len() as u16,
            done,
        );
        let (body, padding) = packet[header_len..].split_at_mut(chunk.len());
        body.copy_from_slice(chunk);
        padding.fill(0);
        write(&packet)?;
    }
    Ok(pages)
}

/// Zero `buf[..len]` and put `prefix` at its start
pub fn command<'a>(buf: &'a mut [u8], len: usize, prefix: &[u8]) -> &'a mut [u8] {
    let report = &mut buf[..len];
    report.fill(0);
    report[..prefix.len()].copy_from_slice(prefix);
    report
}

/// Brightness report: prefix followed by the percentage byte
pub fn brightness<'a>(buf: &'a mut [u8], len: usize, prefix: &[u8], percent: u8) -> &'a mut [u8] {
    let report = command(buf, len, prefix);
    report[prefix.len()] = percent;
    report
}

/// Serial/firmware query: prefix followed by the report length
pub fn query<'a>(buf: &'a mut [u8], len: usize, prefix: &[u8]) -> &'a mut [u8] {
    let report = command(buf, len, prefix);
    report[prefix.len()] = len as u8;
    report
}

/// Read the NUL-terminated string starting at `offset`
///
/// A response without a terminator is read to its end.
pub fn parse_string(response: &[u8], offset: usize) -> String {
    let field = response.get(offset..).unwrap_or_default();
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Decode one input report into row-major pressed flags
///
/// Each byte from `offset` is one key, non-zero meaning pressed. Keys past
/// the end of a short report read as released.
pub fn parse_key_states(report: &[u8], offset: usize, count: usize) -> Vec<bool> {
    let states = report.get(offset..).unwrap_or_default();
    let mut keys: Vec<bool> = states.iter().take(count).map(|&b| b != 0).collect();
    keys.resize(count, false);
    keys
}
