//! Scaling and display rendering for decoded signals

use crate::types::Endianness;
use chrono::{DateTime, SecondsFormat};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Year 3000 expressed in Unix seconds. Timestamps above this are milliseconds.
pub const YEAR_3000_SECS: i64 = 32_503_680_000;

/// How a signal value is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalFormat {
    /// Canonical decimal string of the scaled value
    #[default]
    #[serde(alias = "decimal", alias = "number")]
    Numeric,
    Hex,
    Enum,
    Ascii,
    #[serde(alias = "utf-8")]
    Utf8,
    #[serde(alias = "timestamp")]
    UnixTime,
}

impl SignalFormat {
    /// Text formats read bytes directly rather than through the integer path
    pub fn is_text(self) -> bool {
        matches!(self, SignalFormat::Ascii | SignalFormat::Utf8)
    }
}

/// Convert a catalog float into a decimal without binary noise (0.1 stays 0.1)
pub fn decimal_from_f64(value: f64) -> Option<Decimal> {
    if !value.is_finite() {
        return None;
    }
    Decimal::from_str(&value.to_string())
        .ok()
        .or_else(|| Decimal::from_f64_retain(value))
}

/// `raw * factor + offset` in decimal arithmetic
///
/// Returns `None` if the intermediate result leaves the decimal range.
pub fn scale(raw: i128, factor: Decimal, offset: Decimal) -> Option<Decimal> {
    let raw = Decimal::try_from_i128_with_scale(raw, 0).ok()?;
    raw.checked_mul(factor)?.checked_add(offset)
}

/// Render a decimal in its canonical form (no trailing zeros)
pub fn render_numeric(value: Decimal) -> String {
    value.normalize().to_string()
}

/// Render the raw bits as space-separated hex bytes
///
/// Bytes appear in the order they occupy on the wire: most significant first for
/// big-endian fields, least significant first for little-endian fields.
pub fn render_hex(raw: u128, bit_length: usize, order: Endianness) -> String {
    let count = ((bit_length + 7) / 8).clamp(1, 16);
    let byte_at = |i: usize| (raw >> (8 * i)) as u8;
    let bytes: Vec<String> = match order {
        Endianness::Big => (0..count).rev().map(|i| format!("{:02X}", byte_at(i))).collect(),
        Endianness::Little => (0..count).map(|i| format!("{:02X}", byte_at(i))).collect(),
    };
    bytes.join(" ")
}

/// Look the raw value up in an enum map, falling back to `Unknown (<raw>)`
pub fn render_enum(raw: i128, map: Option<&BTreeMap<i64, String>>) -> String {
    i64::try_from(raw)
        .ok()
        .and_then(|key| map.and_then(|m| m.get(&key)))
        .cloned()
        .unwrap_or_else(|| format!("Unknown ({})", raw))
}

/// Decode the bytes covered by a field as characters, dropping NUL bytes
///
/// The range is clamped to the payload; an empty result renders as `(empty)`.
pub fn render_text(data: &[u8], start_bit: usize, bit_length: usize, utf8: bool) -> String {
    let first = (start_bit / 8).min(data.len());
    let end = ((start_bit + bit_length + 7) / 8).min(data.len());
    let bytes: Vec<u8> = data[first..end].iter().copied().filter(|b| *b != 0).collect();

    let text = if utf8 {
        String::from_utf8_lossy(&bytes).into_owned()
    } else {
        bytes
            .iter()
            .map(|b| if b.is_ascii() { char::from(*b) } else { char::REPLACEMENT_CHARACTER })
            .collect()
    };

    if text.is_empty() {
        "(empty)".to_string()
    } else {
        text
    }
}

/// Render a scaled value as a UTC timestamp
///
/// Values above the year-3000 threshold are taken as milliseconds, everything
/// else as (possibly fractional) seconds.
pub fn render_unix_time(value: Decimal) -> String {
    let invalid = || format!("Invalid ({})", render_numeric(value));
    let threshold = Decimal::from(YEAR_3000_SECS);

    let datetime = if value.abs() > threshold {
        value.trunc().to_i64().and_then(DateTime::from_timestamp_millis)
    } else {
        let secs = value.floor();
        let nanos = ((value - secs) * Decimal::from(1_000_000_000u32))
            .trunc()
            .to_u32()
            .unwrap_or(0);
        secs.to_i64().and_then(|s| DateTime::from_timestamp(s, nanos))
    };

    match datetime {
        Some(dt) => dt.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        None => invalid(),
    }
}
