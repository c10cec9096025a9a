//! Frame checksums
//!
//! Table-driven CRCs plus the simple XOR/sum checks serial devices tend to use.
//! `crc16_modbus` is shared with the Modbus-RTU framer.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

/// Reflected CRC-16/MODBUS polynomial
const CRC16_MODBUS_POLYNOMIAL: u16 = 0xA001;

/// CRC-16/CCITT-FALSE polynomial
const CRC16_CCITT_POLYNOMIAL: u16 = 0x1021;

/// CRC-8 (SMBus) polynomial
const CRC8_POLYNOMIAL: u8 = 0x07;

static CRC16_MODBUS_TABLE: [u16; 256] = generate_crc16_reflected_table(CRC16_MODBUS_POLYNOMIAL);
static CRC16_CCITT_TABLE: [u16; 256] = generate_crc16_table(CRC16_CCITT_POLYNOMIAL);
static CRC8_TABLE: [u8; 256] = generate_crc8_table(CRC8_POLYNOMIAL);

const fn generate_crc16_reflected_table(polynomial: u16) -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;

    while i < 256 {
        let mut crc = i as u16;
        let mut j = 0;

        while j < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ polynomial;
            } else {
                crc >>= 1;
            }
            j += 1;
        }

        table[i] = crc;
        i += 1;
    }

    table
}

const fn generate_crc16_table(polynomial: u16) -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;

    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut j = 0;

        while j < 8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ polynomial;
            } else {
                crc <<= 1;
            }
            j += 1;
        }

        table[i] = crc;
        i += 1;
    }

    table
}

const fn generate_crc8_table(polynomial: u8) -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;

    while i < 256 {
        let mut crc = i as u8;
        let mut j = 0;

        while j < 8 {
            if crc & 0x80 != 0 {
                crc = (crc << 1) ^ polynomial;
            } else {
                crc <<= 1;
            }
            j += 1;
        }

        table[i] = crc;
        i += 1;
    }

    table
}

/// Initial value of a CRC-16/MODBUS computation
pub const CRC16_MODBUS_INIT: u16 = 0xFFFF;

/// Feed one byte into a running CRC-16/MODBUS
#[inline]
pub fn crc16_modbus_update(crc: u16, byte: u8) -> u16 {
    (crc >> 8) ^ CRC16_MODBUS_TABLE[((crc ^ u16::from(byte)) & 0xFF) as usize]
}

/// CRC-16/MODBUS (poly 0xA001 reflected, init 0xFFFF)
pub fn crc16_modbus(data: &[u8]) -> u16 {
    data.iter().fold(CRC16_MODBUS_INIT, |crc, b| crc16_modbus_update(crc, *b))
}

/// CRC-16/CCITT-FALSE (poly 0x1021, init 0xFFFF)
pub fn crc16_ccitt(data: &[u8]) -> u16 {
    data.iter().fold(0xFFFF, |crc: u16, b| {
        (crc << 8) ^ CRC16_CCITT_TABLE[(((crc >> 8) ^ u16::from(*b)) & 0xFF) as usize]
    })
}

/// CRC-8 (poly 0x07, init 0x00)
pub fn crc8(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |crc, b| CRC8_TABLE[(crc ^ *b) as usize])
}

/// Checksum algorithm declared by a protocol configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecksumAlgorithm {
    Xor,
    Sum8,
    Crc8,
    #[serde(alias = "modbus")]
    Crc16Modbus,
    #[serde(alias = "ccitt")]
    Crc16Ccitt,
}

impl ChecksumAlgorithm {
    /// Width of the stored checksum in bytes
    pub fn width(self) -> usize {
        match self {
            ChecksumAlgorithm::Xor | ChecksumAlgorithm::Sum8 | ChecksumAlgorithm::Crc8 => 1,
            ChecksumAlgorithm::Crc16Modbus | ChecksumAlgorithm::Crc16Ccitt => 2,
        }
    }

    pub fn compute(self, data: &[u8]) -> u32 {
        match self {
            ChecksumAlgorithm::Xor => u32::from(data.iter().fold(0u8, |acc, b| acc ^ b)),
            ChecksumAlgorithm::Sum8 => u32::from(data.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))),
            ChecksumAlgorithm::Crc8 => u32::from(crc8(data)),
            ChecksumAlgorithm::Crc16Modbus => u32::from(crc16_modbus(data)),
            ChecksumAlgorithm::Crc16Ccitt => u32::from(crc16_ccitt(data)),
        }
    }
}

/// Where a frame stores its checksum and which bytes it covers
///
/// Byte positions may be negative, counting back from the end of the frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumSpec {
    pub algorithm: ChecksumAlgorithm,
    /// Position of the stored checksum (default: last `width` bytes)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_byte: Option<i64>,
    /// Stored checksum size (default: algorithm width)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub byte_length: Option<usize>,
    /// First covered byte (default: 0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calc_start_byte: Option<i64>,
    /// End of the covered range, exclusive (default: checksum position)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calc_end_byte: Option<i64>,
    /// Stored checksum is most significant byte first
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub big_endian: bool,
}

fn resolve_position(position: i64, len: usize) -> Option<usize> {
    if position < 0 {
        len.checked_sub(position.unsigned_abs() as usize)
    } else {
        usize::try_from(position).ok().filter(|p| *p <= len)
    }
}

impl ChecksumSpec {
    pub fn new(algorithm: ChecksumAlgorithm) -> Self {
        Self {
            algorithm,
            start_byte: None,
            byte_length: None,
            calc_start_byte: None,
            calc_end_byte: None,
            big_endian: false,
        }
    }

    /// Verify the checksum of a frame
    ///
    /// Returns `None` when the declared ranges do not fit the frame.
    pub fn verify(&self, frame: &[u8]) -> Option<bool> {
        let width = self.byte_length.unwrap_or_else(|| self.algorithm.width());
        let stored_at = match self.start_byte {
            Some(pos) => resolve_position(pos, frame.len())?,
            None => frame.len().checked_sub(width)?,
        };
        let stored = frame.get(stored_at..stored_at.checked_add(width)?)?;
        let calc_start = resolve_position(self.calc_start_byte.unwrap_or(0), frame.len())?;
        let calc_end = match self.calc_end_byte {
            Some(pos) => resolve_position(pos, frame.len())?,
            None => stored_at,
        };
        let covered = frame.get(calc_start..calc_end)?;

        let expected = match (width, self.big_endian) {
            (1, _) => u32::from(stored[0]),
            (2, true) => u32::from(BigEndian::read_u16(stored)),
            (2, false) => u32::from(LittleEndian::read_u16(stored)),
            _ => return None,
        };

        Some(self.algorithm.compute(covered) == expected)
    }
}
