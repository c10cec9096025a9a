//! Report generation
//!
//! Writes decoded events as aligned text lines or as JSON Lines.

use crate::config::OutputFormat;
use anyhow::Result;
use catalog_decoder::{CatalogStats, DecodedEvent, DecodedValue};
use chrono::SecondsFormat;
use serde::Serialize;
use std::io::Write;

/// One decoded value in JSON output
#[derive(Debug, Serialize)]
pub struct ValueRecord<'a> {
    pub name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub display: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<&'a str>,
}

impl<'a> From<&'a DecodedValue> for ValueRecord<'a> {
    fn from(value: &'a DecodedValue) -> Self {
        Self {
            name: &value.name,
            // Strings keep 128-bit raws and decimals exact
            raw: value.raw_value.map(|r| r.to_string()),
            value: value.scaled_value.map(|v| v.normalize().to_string()),
            display: &value.display,
            unit: value.unit.as_deref(),
        }
    }
}

/// One event in JSON output
#[derive(Debug, Serialize)]
pub struct EventRecord<'a> {
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bus: Option<u8>,
    pub frame_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<ValueRecord<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub header: Vec<ValueRecord<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub mux: Vec<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum_valid: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_bytes: Option<String>,
}

impl<'a> From<&'a DecodedEvent> for EventRecord<'a> {
    fn from(event: &'a DecodedEvent) -> Self {
        let timestamp = event.timestamp().to_rfc3339_opts(SecondsFormat::Micros, true);
        match event {
            DecodedEvent::Message {
                bus,
                frame_id,
                protocol,
                name,
                values,
                header,
                mux_selectors,
                checksum_valid,
                ..
            } => Self {
                timestamp,
                bus: *bus,
                frame_id: format!("0x{:X}", frame_id),
                protocol: Some(protocol.to_string()),
                name: name.as_deref(),
                values: values.iter().map(ValueRecord::from).collect(),
                header: header.iter().map(ValueRecord::from).collect(),
                mux: mux_selectors.clone(),
                checksum_valid: *checksum_valid,
                raw_bytes: None,
            },
            DecodedEvent::RawFrame {
                bus,
                frame_id,
                bytes,
                ..
            } => Self {
                timestamp,
                bus: *bus,
                frame_id: format!("0x{:X}", frame_id),
                protocol: None,
                name: None,
                values: Vec::new(),
                header: Vec::new(),
                mux: Vec::new(),
                checksum_valid: None,
                raw_bytes: Some(hex_bytes(bytes)),
            },
        }
    }
}

fn hex_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

fn text_values(values: &[DecodedValue]) -> String {
    values
        .iter()
        .map(|v| match &v.unit {
            Some(unit) => format!("{}={} {}", v.name, v.display, unit),
            None => format!("{}={}", v.name, v.display),
        })
        .collect::<Vec<_>>()
        .join("  ")
}

/// Format one event as a text line
pub fn format_text(event: &DecodedEvent) -> String {
    let timestamp = event.timestamp().to_rfc3339_opts(SecondsFormat::Micros, true);
    match event {
        DecodedEvent::Message {
            bus,
            frame_id,
            name,
            values,
            checksum_valid,
            ..
        } => {
            let bus = bus.map_or_else(|| "-".to_string(), |b| b.to_string());
            let mut line = format!(
                "{} {:>3} 0x{:<8X} {:<20} {}",
                timestamp,
                bus,
                frame_id,
                name.as_deref().unwrap_or("?"),
                text_values(values)
            );
            if *checksum_valid == Some(false) {
                line.push_str("  [checksum mismatch]");
            }
            line
        }
        DecodedEvent::RawFrame {
            bus,
            frame_id,
            bytes,
            ..
        } => {
            let bus = bus.map_or_else(|| "-".to_string(), |b| b.to_string());
            format!(
                "{} {:>3} 0x{:<8X} {:<20} [{}]",
                timestamp,
                bus,
                frame_id,
                "(unknown)",
                hex_bytes(bytes)
            )
        }
    }
}

/// Write all events in the requested format
pub fn write_events<W: Write>(
    out: &mut W,
    events: &[DecodedEvent],
    format: OutputFormat,
) -> Result<()> {
    for event in events {
        match format {
            OutputFormat::Text => writeln!(out, "{}", format_text(event))?,
            OutputFormat::Json => {
                serde_json::to_writer(&mut *out, &EventRecord::from(event))?;
                writeln!(out)?;
            }
        }
    }
    Ok(())
}

/// Write catalog statistics
pub fn write_summary<W: Write>(out: &mut W, name: Option<&str>, stats: &CatalogStats) -> Result<()> {
    writeln!(out, "Catalog: {}", name.unwrap_or("(unnamed)"))?;
    writeln!(out, "  Frames:      {}", stats.num_frames)?;
    writeln!(out, "  Signals:     {}", stats.num_signals)?;
    writeln!(out, "  Multiplexed: {}", stats.num_multiplexed)?;
    Ok(())
}
