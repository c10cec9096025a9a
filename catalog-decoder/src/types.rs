//! Core types for the catalog decoder library
//!
//! This module defines the frames the decoder consumes, the values and events it
//! emits, and the error type shared by catalog loading. The decoder is stateless
//! and only outputs decoded values - it does not track signal changes over time.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Timestamp type used throughout the decoder
pub type Timestamp = DateTime<Utc>;

/// Result type for decoder operations
pub type Result<T> = std::result::Result<T, DecoderError>;

/// Protocol namespace a frame is declared in
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Can,
    Serial,
    Modbus,
}

impl Protocol {
    /// Parse a protocol name as written in `meta.default_frame`
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "can" | "canfd" | "can-fd" => Some(Protocol::Can),
            "serial" => Some(Protocol::Serial),
            "modbus" => Some(Protocol::Modbus),
            _ => None,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Can => write!(f, "can"),
            Protocol::Serial => write!(f, "serial"),
            Protocol::Modbus => write!(f, "modbus"),
        }
    }
}

/// Bit ordering used to lay a field out over the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endianness {
    /// Intel order: bit 0 of byte 0 is the first bit, value packed LSB-first
    #[serde(alias = "intel", alias = "le")]
    Little,
    /// Motorola order: bit 7 of byte 0 is the first bit, value packed MSB-first
    #[serde(alias = "motorola", alias = "be")]
    Big,
}

/// Raw frame handed to the decoder by a transport reader or a stream framer
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    /// Frame identifier (CAN ID, serial header ID, Modbus register)
    pub frame_id: u32,
    /// Bus/channel number, if the transport knows it
    pub bus: Option<u8>,
    /// Payload bytes
    pub bytes: Vec<u8>,
    /// Capture timestamp in microseconds since the Unix epoch
    pub timestamp_us: u64,
    /// Extended (29-bit) ID flag as reported by the transport
    pub is_extended: Option<bool>,
    /// CAN-FD flag as reported by the transport
    pub is_fd: Option<bool>,
}

impl Frame {
    pub fn new(frame_id: u32, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            frame_id,
            bytes: bytes.into(),
            ..Self::default()
        }
    }

    pub fn with_bus(mut self, bus: u8) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn with_timestamp_us(mut self, timestamp_us: u64) -> Self {
        self.timestamp_us = timestamp_us;
        self
    }

    /// Convert timestamp from microseconds to DateTime<Utc>
    pub fn timestamp(&self) -> Timestamp {
        let secs = (self.timestamp_us / 1_000_000) as i64;
        let nsecs = ((self.timestamp_us % 1_000_000) * 1_000) as u32;
        DateTime::from_timestamp(secs, nsecs).unwrap_or_default()
    }
}

/// Errors that can occur while loading catalogs or configuring decoders
///
/// Decoding itself never fails: anomalies on the hot path become fallback
/// display strings or omitted values.
#[derive(Debug, thiserror::Error)]
pub enum DecoderError {
    #[error("Failed to parse catalog {path:?}: {message}")]
    CatalogParse { path: Option<PathBuf>, message: String },

    #[error("Failed to serialize catalog: {0}")]
    Serialize(String),

    #[error("Unknown framing encoding: {0}")]
    UnknownFraming(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl DecoderError {
    /// Attach the catalog file path to a parse error
    pub fn with_path(self, path: impl Into<PathBuf>) -> Self {
        match self {
            DecoderError::CatalogParse { message, .. } => DecoderError::CatalogParse {
                path: Some(path.into()),
                message,
            },
            other => other,
        }
    }
}

/// A single decoded signal value
///
/// Produced per decode call and discarded afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodedValue {
    /// Signal name from the catalog
    pub name: String,
    /// Raw integer before scaling, absent for text fields wider than the integer path
    pub raw_value: Option<i128>,
    /// `raw * factor + offset`, absent for text formats
    pub scaled_value: Option<Decimal>,
    /// Rendered value according to the signal format
    pub display: String,
    /// Engineering unit (e.g., "km/h", "°C", "V")
    pub unit: Option<String>,
}

/// Main decoded event type - the primary output of the decoder
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedEvent {
    /// A frame found in the catalog with its decoded signals
    Message {
        timestamp: Timestamp,
        bus: Option<u8>,
        frame_id: u32,
        protocol: Protocol,
        /// Frame name from the catalog (if any)
        name: Option<String>,
        /// Transmitting node from the catalog (if any)
        transmitter: Option<String>,
        /// Decoded signal values in definition order
        values: Vec<DecodedValue>,
        /// Header fields decoded from the protocol configuration
        header: Vec<DecodedValue>,
        /// Selector values of the active mux path, outermost first
        mux_selectors: Vec<u64>,
        /// Checksum verdict when the protocol declares one
        checksum_valid: Option<bool>,
    },

    /// A frame with no catalog entry (only emitted if requested in config)
    RawFrame {
        timestamp: Timestamp,
        bus: Option<u8>,
        frame_id: u32,
        bytes: Vec<u8>,
    },
}

impl DecodedEvent {
    /// Get the timestamp of this event
    pub fn timestamp(&self) -> Timestamp {
        match self {
            DecodedEvent::Message { timestamp, .. } => *timestamp,
            DecodedEvent::RawFrame { timestamp, .. } => *timestamp,
        }
    }

    /// Get the frame ID of this event
    pub fn frame_id(&self) -> u32 {
        match self {
            DecodedEvent::Message { frame_id, .. } => *frame_id,
            DecodedEvent::RawFrame { frame_id, .. } => *frame_id,
        }
    }

    /// Decoded values of a message event, empty for raw frames
    pub fn values(&self) -> &[DecodedValue] {
        match self {
            DecodedEvent::Message { values, .. } => values,
            DecodedEvent::RawFrame { .. } => &[],
        }
    }

    /// Find a decoded value by signal name
    pub fn value(&self, name: &str) -> Option<&DecodedValue> {
        self.values().iter().find(|v| v.name == name)
    }
}
