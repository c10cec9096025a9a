//! Resolved catalog types
//!
//! Everything here is built once per catalog load with all defaults applied, and
//! is read-only afterwards.

use super::mux::MuxNode;
use super::raw::{Confidence, RawCatalog, RegisterType};
use crate::codec::bits;
use crate::codec::{ChecksumSpec, SignalFormat};
use crate::framing::FramerConfig;
use crate::types::{Endianness, Protocol, Result};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// A fully defaulted signal definition
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSignal {
    pub name: String,
    pub start_bit: usize,
    pub bit_length: usize,
    pub signed: bool,
    pub endianness: Endianness,
    /// Word order of multi-register values; `Little` swaps 16-bit words
    pub word_order: Option<Endianness>,
    pub factor: Decimal,
    pub offset: Decimal,
    pub unit: Option<String>,
    pub format: SignalFormat,
    pub enum_map: Option<BTreeMap<i64, String>>,
    pub confidence: Confidence,
    /// True if carried over from a mirrored frame
    pub inherited: bool,
}

impl ResolvedSignal {
    /// One past the last bit of the signal
    pub fn end_bit(&self) -> usize {
        self.start_bit + self.bit_length
    }
}

/// Modbus register addressing of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModbusRegister {
    pub register_type: RegisterType,
    /// Register number as written in the catalog
    pub number: u16,
    /// Protocol address after applying the register base
    pub address: u16,
    pub count: u16,
    pub device_address: Option<u8>,
}

/// A frame with inheritance and defaults resolved
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedFrame {
    pub frame_id: u32,
    pub protocol: Protocol,
    pub name: Option<String>,
    /// Payload length in bytes
    pub length: usize,
    pub is_extended: bool,
    pub is_fd: bool,
    pub transmitter: Option<String>,
    pub interval_ms: Option<u64>,
    pub bus: Option<u8>,
    pub signals: Vec<ResolvedSignal>,
    pub mux: Option<MuxNode>,
    /// Frame whose signals were mirrored, if the reference resolved
    pub mirror_of: Option<u32>,
    /// Frame whose metadata was copied, if the reference resolved
    pub copy_from: Option<u32>,
    pub modbus: Option<ModbusRegister>,
}

impl ResolvedFrame {
    pub fn is_multiplexed(&self) -> bool {
        self.mux.is_some()
    }

    /// Number of signals including every mux case
    pub fn signal_count(&self) -> usize {
        self.signals.len() + self.mux.as_ref().map_or(0, MuxNode::signal_count)
    }
}

/// A named header field of a protocol
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderField {
    pub name: String,
    /// Mask applied to the extracted value (or to the frame ID)
    pub mask: Option<u32>,
    /// Byte range in the frame; `None` reads from the frame ID instead
    pub start_byte: Option<usize>,
    pub bytes: usize,
    pub byte_order: Endianness,
    pub format: SignalFormat,
}

impl HeaderField {
    /// `(start_bit, bit_length)` of the field in the payload, `None` if it overflows
    pub fn bit_range(&self) -> Option<(usize, usize)> {
        let bit_length = self.bytes.checked_mul(8)?;
        let start_bit = match self.start_byte {
            Some(start) => start.checked_mul(8)?,
            None => 0,
        };
        start_bit.checked_add(bit_length)?;
        Some((start_bit, bit_length))
    }

    /// Extract the field value from a frame ID and payload
    ///
    /// Masked values are shifted down by the mask's trailing zeros.
    pub fn extract(&self, frame_id: u32, payload: &[u8]) -> Option<u64> {
        let value = match self.start_byte {
            Some(_) => {
                let (start_bit, bit_length) = self.bit_range()?;
                let value =
                    bits::extract_unsigned(payload, start_bit, bit_length, self.byte_order)?;
                u64::try_from(value).ok()?
            }
            None => u64::from(frame_id),
        };

        Some(match self.mask {
            Some(0) => 0,
            Some(mask) => (value & u64::from(mask)) >> mask.trailing_zeros(),
            None => value,
        })
    }
}

/// Per-protocol defaults with every fallback applied
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolConfig {
    pub protocol: Protocol,
    pub byte_order: Endianness,
    pub interval_ms: Option<u64>,
    pub frame_id_mask: Option<u32>,
    pub default_extended: Option<bool>,
    pub default_fd: Option<bool>,
    pub header_fields: Vec<HeaderField>,
    pub checksum: Option<ChecksumSpec>,
    /// Stream framing for serial transports
    pub framing: Option<FramerConfig>,
    /// 0 = IEC (zero-based) addressing, 1 = traditional
    pub register_base: u16,
    pub device_address: Option<u8>,
}

impl ProtocolConfig {
    pub fn new(protocol: Protocol) -> Self {
        let byte_order = match protocol {
            Protocol::Modbus => Endianness::Big,
            Protocol::Can | Protocol::Serial => Endianness::Little,
        };
        Self {
            protocol,
            byte_order,
            interval_ms: None,
            frame_id_mask: None,
            default_extended: None,
            default_fd: None,
            header_fields: Vec::new(),
            checksum: None,
            framing: None,
            register_base: 0,
            device_address: None,
        }
    }

    pub fn header_field(&self, name: &str) -> Option<&HeaderField> {
        self.header_fields.iter().find(|f| f.name == name)
    }

    /// Frame ID carried in a serial frame's `id` header field
    pub fn frame_id_of(&self, payload: &[u8]) -> Option<u32> {
        self.header_field("id")
            .and_then(|field| field.extract(0, payload))
            .and_then(|id| u32::try_from(id).ok())
    }
}

/// Catalog metadata
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogMeta {
    pub name: Option<String>,
    pub version: Option<String>,
}

/// Lookup key of the frame table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameKey {
    pub protocol: Protocol,
    pub frame_id: u32,
}

/// A resolved catalog: the frame table plus protocol defaults
#[derive(Debug, Clone)]
pub struct Catalog {
    pub meta: CatalogMeta,
    /// Document protocol (explicit `default_frame` or inferred)
    pub protocol: Protocol,
    pub can: ProtocolConfig,
    pub serial: ProtocolConfig,
    pub modbus: ProtocolConfig,
    pub(crate) frames: BTreeMap<FrameKey, ResolvedFrame>,
    pub(crate) raw: RawCatalog,
}

impl Catalog {
    /// Resolve catalog text (see [`super::CatalogResolver`])
    pub fn from_toml(text: &str) -> Result<Self> {
        super::resolve(text)
    }

    pub fn config(&self, protocol: Protocol) -> &ProtocolConfig {
        match protocol {
            Protocol::Can => &self.can,
            Protocol::Serial => &self.serial,
            Protocol::Modbus => &self.modbus,
        }
    }

    /// Exact lookup by protocol and frame ID
    pub fn frame(&self, protocol: Protocol, frame_id: u32) -> Option<&ResolvedFrame> {
        self.frames.get(&FrameKey { protocol, frame_id })
    }

    /// Lookup that falls back to the protocol's frame-ID mask
    pub fn lookup(&self, protocol: Protocol, frame_id: u32) -> Option<&ResolvedFrame> {
        self.frame(protocol, frame_id).or_else(|| {
            let mask = self.config(protocol).frame_id_mask?;
            let masked = frame_id & mask;
            if masked == frame_id {
                return None;
            }
            self.frame(protocol, masked)
        })
    }

    /// Frames of one protocol in ascending ID order
    pub fn frames(&self, protocol: Protocol) -> impl Iterator<Item = &ResolvedFrame> + '_ {
        self.frames
            .range(FrameKey { protocol, frame_id: 0 }..=FrameKey { protocol, frame_id: u32::MAX })
            .map(|(_, frame)| frame)
    }

    /// All frames, grouped by protocol
    pub fn all_frames(&self) -> impl Iterator<Item = &ResolvedFrame> + '_ {
        self.frames.values()
    }

    /// The parsed document as written
    pub fn raw(&self) -> &RawCatalog {
        &self.raw
    }

    /// Serialize the catalog back to TOML
    pub fn to_toml_string(&self) -> Result<String> {
        super::raw::to_toml_string(&self.raw)
    }

    pub fn stats(&self) -> CatalogStats {
        CatalogStats {
            num_frames: self.frames.len(),
            num_signals: self.frames.values().map(ResolvedFrame::signal_count).sum(),
            num_multiplexed: self.frames.values().filter(|f| f.is_multiplexed()).count(),
        }
    }
}

/// Catalog statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogStats {
    pub num_frames: usize,
    /// Signal definitions including all mux cases
    pub num_signals: usize,
    pub num_multiplexed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id_field(mask: Option<u32>, start_byte: Option<usize>, bytes: usize) -> HeaderField {
        HeaderField {
            name: "id".to_string(),
            mask,
            start_byte,
            bytes,
            byte_order: Endianness::Big,
            format: SignalFormat::Numeric,
        }
    }

    #[test]
    fn test_header_field_from_frame_id() {
        // J1939 source address
        let field = id_field(Some(0xFF), None, 0);
        assert_eq!(field.extract(0x18FEF100, &[]), Some(0x00));
        let pgn = id_field(Some(0x03FFFF00), None, 0);
        assert_eq!(pgn.extract(0x18FEF117, &[]), Some(0xFEF1));
    }

    #[test]
    fn test_header_field_from_payload() {
        let field = id_field(None, Some(1), 2);
        assert_eq!(field.extract(0, &[0xAA, 0x12, 0x34, 0x00]), Some(0x1234));
        assert_eq!(field.extract(0, &[0xAA, 0x12]), None);
    }

    #[test]
    fn test_header_field_overflow_reads_nothing() {
        let far = id_field(None, Some(usize::MAX / 4), 1);
        assert_eq!(far.bit_range(), None);
        assert_eq!(far.extract(0, &[0x01, 0x02]), None);

        let wide = id_field(None, Some(0), usize::MAX / 2);
        assert_eq!(wide.extract(0, &[0x01, 0x02]), None);
    }

    #[test]
    fn test_serial_frame_id() {
        let mut config = ProtocolConfig::new(Protocol::Serial);
        assert_eq!(config.frame_id_of(&[0x05]), None);
        config.header_fields.push(id_field(None, Some(0), 1));
        assert_eq!(config.frame_id_of(&[0x05, 0x10]), Some(5));
    }
}
