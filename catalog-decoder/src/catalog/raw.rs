//! Serde model of the catalog text
//!
//! Every field is optional so that a parsed catalog serializes back to the same
//! content. Defaulting happens later, in the resolver. Mux tables stay as raw
//! TOML because their case keys are free-form strings.

use crate::codec::{ChecksumSpec, SignalFormat};
use crate::framing::FramingEncoding;
use crate::types::Endianness;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Top-level catalog document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCatalog {
    #[serde(default)]
    pub meta: RawMeta,
    #[serde(default)]
    pub frame: RawFrameSections,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Free-form version (string or number)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<toml::Value>,
    /// Default protocol namespace (`can`, `serial`, `modbus`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_frame: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub can: Option<RawProtocolDefaults>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial: Option<RawProtocolDefaults>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modbus: Option<RawProtocolDefaults>,
}

/// `[meta.can]`, `[meta.serial]` and `[meta.modbus]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawProtocolDefaults {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_byte_order: Option<Endianness>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_interval: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_id_mask: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_extended: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_fd: Option<bool>,
    /// Header fields keyed by name
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, RawHeaderField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<ChecksumSpec>,

    // Serial stream framing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<FramingEncoding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_frame_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_delimiter: Option<bool>,

    // Modbus addressing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub register_base: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_address: Option<u8>,
}

/// A header field: a mask over the frame ID, or a byte range of the frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawHeaderField {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mask: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_byte: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub byte_order: Option<Endianness>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<SignalFormat>,
}

/// `[frame.can]`, `[frame.serial]`, `[frame.modbus]` keyed by frame-ID string
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawFrameSections {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub can: BTreeMap<String, RawFrame>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub serial: BTreeMap<String, RawFrame>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub modbus: BTreeMap<String, RawFrame>,
}

/// Reference to another frame, written either as a number or as a string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FrameRef {
    Number(u64),
    Text(String),
}

impl FrameRef {
    /// Numeric ID of the referenced frame
    pub fn to_id(&self) -> Option<u32> {
        match self {
            FrameRef::Number(n) => u32::try_from(*n).ok(),
            FrameRef::Text(s) => super::resolver::parse_frame_id(s),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawTx {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<u64>,
}

/// Modbus register table a frame reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterType {
    #[default]
    Holding,
    Input,
    Coil,
    #[serde(alias = "discrete_input")]
    Discrete,
}

impl RegisterType {
    /// Payload size in bytes for `count` registers or bits
    pub fn byte_length(self, count: u16) -> usize {
        match self {
            RegisterType::Holding | RegisterType::Input => usize::from(count) * 2,
            RegisterType::Coil | RegisterType::Discrete => (usize::from(count) + 7) / 8,
        }
    }
}

/// One frame body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawFrame {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(alias = "dlc", skip_serializing_if = "Option::is_none")]
    pub length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transmitter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx: Option<RawTx>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bus: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_extended: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_fd: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mirror_of: Option<FrameRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copy: Option<FrameRef>,

    // Modbus
    #[serde(skip_serializing_if = "Option::is_none")]
    pub register_type: Option<RegisterType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub register_number: Option<u16>,
    #[serde(alias = "count", skip_serializing_if = "Option::is_none")]
    pub register_count: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_address: Option<u8>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub signals: Vec<RawSignal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mux: Option<toml::Table>,
}

impl RawFrame {
    pub fn interval_ms(&self) -> Option<u64> {
        self.tx.as_ref().and_then(|tx| tx.interval_ms)
    }
}

/// How far a signal definition has been verified against real traffic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    #[default]
    None,
    Low,
    Medium,
    High,
}

/// One `[[signals]]` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSignal {
    pub name: String,
    pub start_bit: usize,
    pub bit_length: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factor: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed: Option<bool>,
    #[serde(default, alias = "endianness", skip_serializing_if = "Option::is_none")]
    pub byte_order: Option<Endianness>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_order: Option<Endianness>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<SignalFormat>,
    /// Raw value (as a decimal or hex string) to label
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_map: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
}

impl RawSignal {
    /// Bit position key used to match mirror overrides
    pub fn position(&self) -> (usize, usize) {
        (self.start_bit, self.bit_length)
    }
}

/// Parse catalog text into the raw model
pub fn parse_raw(text: &str) -> crate::types::Result<RawCatalog> {
    toml::from_str(text).map_err(|e| crate::types::DecoderError::CatalogParse {
        path: None,
        message: e.to_string(),
    })
}

/// Serialize the raw model back to catalog text
pub fn to_toml_string(raw: &RawCatalog) -> crate::types::Result<String> {
    toml::to_string(raw).map_err(|e| crate::types::DecoderError::Serialize(e.to_string()))
}
