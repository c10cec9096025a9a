//! Stream framers for serial transports
//!
//! A framer turns an unbounded byte stream into discrete frames. One framer
//! instance serves one stream. Framers never fail: malformed input is recovered
//! from by keeping, shifting or dropping bytes, so a live stream keeps flowing.
//!
//! Supported encodings:
//! - Raw: split on a delimiter byte sequence or a maximum length
//! - SLIP: RFC 1055 escaping around an END byte
//! - Modbus RTU: CRC-16 validated frames found by trying candidate lengths

pub mod modbus_rtu;
pub mod raw;
pub mod slip;

pub use modbus_rtu::ModbusRtuFramer;
pub use raw::RawFramer;
pub use slip::{slip_encode, SlipFramer};

use crate::types::DecoderError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Default cap on the size of a single frame
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 4096;

/// A frame cut from a byte stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramedBytes {
    pub bytes: Vec<u8>,
    /// Stream offset of the frame's first byte
    pub offset: u64,
    /// False for frames cut by a length cap or emitted by `flush`
    pub complete: bool,
}

/// Common interface of all framers
pub trait StreamFramer {
    /// Consume bytes and return every frame they complete
    fn feed(&mut self, data: &[u8]) -> Vec<FramedBytes>;

    /// Emit buffered bytes that never saw a terminator
    fn flush(&mut self) -> Option<FramedBytes>;

    /// Drop all buffered state, keeping the stream offset
    fn reset(&mut self);
}

/// Framing encoding of a serial stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FramingEncoding {
    #[default]
    #[serde(alias = "delimiter")]
    Raw,
    Slip,
    #[serde(alias = "modbus")]
    ModbusRtu,
}

impl FromStr for FramingEncoding {
    type Err = DecoderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" | "delimiter" => Ok(FramingEncoding::Raw),
            "slip" => Ok(FramingEncoding::Slip),
            "modbus_rtu" | "modbus-rtu" | "modbus" => Ok(FramingEncoding::ModbusRtu),
            other => Err(DecoderError::UnknownFraming(other.to_string())),
        }
    }
}

/// Framer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FramerConfig {
    #[serde(default)]
    pub encoding: FramingEncoding,
    /// Raw framing terminator
    #[serde(default)]
    pub delimiter: Vec<u8>,
    #[serde(default = "default_max_frame_length")]
    pub max_frame_length: usize,
    /// Keep the delimiter at the end of raw frames
    #[serde(default)]
    pub include_delimiter: bool,
    /// Only accept Modbus RTU frames addressed to this device
    #[serde(default)]
    pub device_address: Option<u8>,
}

fn default_max_frame_length() -> usize {
    DEFAULT_MAX_FRAME_LENGTH
}

impl FramerConfig {
    pub fn new(encoding: FramingEncoding) -> Self {
        Self {
            encoding,
            delimiter: Vec::new(),
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            include_delimiter: false,
            device_address: None,
        }
    }

    /// Builder method: set the raw framing delimiter
    pub fn with_delimiter(mut self, delimiter: impl Into<Vec<u8>>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    /// Builder method: set the Modbus device address filter
    pub fn with_device_address(mut self, address: u8) -> Self {
        self.device_address = Some(address);
        self
    }

    /// Builder method: set the maximum frame length
    pub fn with_max_frame_length(mut self, max: usize) -> Self {
        self.max_frame_length = max;
        self
    }
}

impl Default for FramerConfig {
    fn default() -> Self {
        Self::new(FramingEncoding::Raw)
    }
}

/// A framer of any supported encoding
#[derive(Debug)]
pub enum SerialFramer {
    Raw(RawFramer),
    Slip(SlipFramer),
    ModbusRtu(ModbusRtuFramer),
}

impl SerialFramer {
    pub fn from_config(config: &FramerConfig) -> Self {
        match config.encoding {
            FramingEncoding::Raw => SerialFramer::Raw(RawFramer::new(
                config.delimiter.clone(),
                config.max_frame_length,
                config.include_delimiter,
            )),
            FramingEncoding::Slip => SerialFramer::Slip(SlipFramer::new(config.max_frame_length)),
            FramingEncoding::ModbusRtu => {
                SerialFramer::ModbusRtu(ModbusRtuFramer::new(config.device_address))
            }
        }
    }

    pub fn encoding(&self) -> FramingEncoding {
        match self {
            SerialFramer::Raw(_) => FramingEncoding::Raw,
            SerialFramer::Slip(_) => FramingEncoding::Slip,
            SerialFramer::ModbusRtu(_) => FramingEncoding::ModbusRtu,
        }
    }
}

impl StreamFramer for SerialFramer {
    fn feed(&mut self, data: &[u8]) -> Vec<FramedBytes> {
        match self {
            SerialFramer::Raw(f) => f.feed(data),
            SerialFramer::Slip(f) => f.feed(data),
            SerialFramer::ModbusRtu(f) => f.feed(data),
        }
    }

    fn flush(&mut self) -> Option<FramedBytes> {
        match self {
            SerialFramer::Raw(f) => f.flush(),
            SerialFramer::Slip(f) => f.flush(),
            SerialFramer::ModbusRtu(f) => f.flush(),
        }
    }

    fn reset(&mut self) {
        match self {
            SerialFramer::Raw(f) => f.reset(),
            SerialFramer::Slip(f) => f.reset(),
            SerialFramer::ModbusRtu(f) => f.reset(),
        }
    }
}
