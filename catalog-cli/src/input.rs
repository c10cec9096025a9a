//! Frame sources: candump logs and raw serial captures
//!
//! candump log lines look like
//! `(1436509052.249713) can0 123#DEADBEEF`. CAN-FD frames use `##` followed by
//! a flags nibble, and remote frames carry `R` instead of data.

use anyhow::{Context, Result};
use catalog_decoder::{DecodedEvent, Frame, SerialDecoder};
use std::fs;
use std::path::Path;
use std::time::UNIX_EPOCH;

/// Serial captures are fed to the framer in chunks of this size
const SERIAL_CHUNK: usize = 4096;

/// Parse one candump log line
///
/// Returns `None` for blank lines, comments and malformed input.
pub fn parse_candump_line(line: &str) -> Option<Frame> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let mut parts = line.split_whitespace();
    let timestamp_us = parse_timestamp(parts.next()?)?;
    let bus = parse_bus(parts.next()?);
    let (id_text, payload) = parts.next()?.split_once('#')?;

    let frame_id = u32::from_str_radix(id_text, 16).ok()?;
    let is_extended = id_text.len() > 3 || frame_id > 0x7FF;

    let (is_fd, data_text) = match payload.strip_prefix('#') {
        // Skip the FD flags nibble
        Some(fd) => (true, fd.get(1..)?),
        None => (false, payload),
    };
    let bytes = if data_text.starts_with('R') {
        Vec::new()
    } else {
        parse_hex_bytes(data_text)?
    };

    Some(Frame {
        frame_id,
        bus,
        bytes,
        timestamp_us,
        is_extended: Some(is_extended),
        is_fd: Some(is_fd),
    })
}

/// `(seconds.micros)` into microseconds
fn parse_timestamp(text: &str) -> Option<u64> {
    let inner = text.strip_prefix('(')?.strip_suffix(')')?;
    let (secs, frac) = inner.split_once('.').unwrap_or((inner, "0"));
    let secs: u64 = secs.parse().ok()?;
    let frac = frac.get(..frac.len().min(6))?;
    let micros: u64 = format!("{:0<6}", frac).parse().ok()?;
    secs.checked_mul(1_000_000)?.checked_add(micros)
}

/// Bus number from the trailing digits of an interface name (`can1` -> 1)
fn parse_bus(interface: &str) -> Option<u8> {
    let digits = interface
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| &interface[i..])?;
    digits.parse().ok()
}

fn parse_hex_bytes(text: &str) -> Option<Vec<u8>> {
    let text: String = text.chars().filter(|c| *c != '.').collect();
    if text.len() % 2 != 0 {
        return None;
    }
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&text[i..i + 2], 16).ok())
        .collect()
}

/// Read every frame of a candump log, skipping malformed lines
pub fn read_candump(path: &Path) -> Result<Vec<Frame>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read log file: {:?}", path))?;

    let mut frames = Vec::new();
    let mut skipped = 0usize;
    for (number, line) in content.lines().enumerate() {
        match parse_candump_line(line) {
            Some(frame) => frames.push(frame),
            None if line.trim().is_empty() || line.trim_start().starts_with('#') => {}
            None => {
                skipped += 1;
                log::debug!("{:?}:{}: unparsable line skipped", path, number + 1);
            }
        }
    }

    if skipped > 0 {
        log::warn!("Skipped {} malformed lines in {:?}", skipped, path);
    }
    log::info!("Read {} frames from {:?}", frames.len(), path);
    Ok(frames)
}

/// Frame and decode a raw serial capture
///
/// All frames carry the capture file's modification time.
pub fn decode_serial_capture(path: &Path, decoder: &mut SerialDecoder) -> Result<Vec<DecodedEvent>> {
    let data =
        fs::read(path).with_context(|| format!("Failed to read serial capture: {:?}", path))?;
    let timestamp_us = fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_micros() as u64);

    let mut events = Vec::new();
    for chunk in data.chunks(SERIAL_CHUNK) {
        events.extend(decoder.feed(chunk, timestamp_us));
    }
    events.extend(decoder.flush(timestamp_us));

    log::info!("Decoded {} serial frames from {:?}", events.len(), path);
    Ok(events)
}
