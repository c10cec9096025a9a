//! Bit-level codec: field extraction, value rendering and checksums

pub mod bits;
pub mod checksum;
pub mod format;

pub use bits::{extract_bits, extract_unsigned, insert_bits, sign_extend, MAX_FIELD_BITS};
pub use checksum::{ChecksumAlgorithm, ChecksumSpec};
pub use format::SignalFormat;
