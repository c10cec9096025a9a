//! Frame Decoding Engine
//!
//! Turns the payload of a resolved frame into decoded signal values. Plain
//! signals are decoded first, then the signals of the active mux path from the
//! outermost selector inwards. Decoding never fails as a whole: a signal that
//! cannot be read is skipped and the rest of the frame still decodes.

use crate::catalog::{MuxNode, ResolvedFrame, ResolvedSignal, MAX_MUX_DEPTH};
use crate::codec::bits::{self, MAX_FIELD_BITS};
use crate::codec::format::{self, SignalFormat};
use crate::types::{DecodedValue, Endianness};

/// Frame decoder - extracts signals from payloads
pub struct FrameSignalDecoder;

impl FrameSignalDecoder {
    /// Decode every applicable signal of a frame
    pub fn decode(frame: &ResolvedFrame, data: &[u8]) -> Vec<DecodedValue> {
        let mut values = Vec::with_capacity(frame.signals.len());
        let mut selectors = Vec::new();
        Self::decode_into(frame, data, &mut values, &mut selectors);
        values
    }

    /// Decode into caller-owned buffers
    ///
    /// `values` receives the decoded signals and `selectors` the selector value
    /// of each mux level walked. Both are appended to, not cleared, so callers
    /// decoding at high rates can reuse them between frames.
    pub fn decode_into(
        frame: &ResolvedFrame,
        data: &[u8],
        values: &mut Vec<DecodedValue>,
        selectors: &mut Vec<u64>,
    ) {
        values.extend(frame.signals.iter().filter_map(|s| Self::decode_signal(data, s)));

        if let Some(mux) = &frame.mux {
            Self::walk_mux(mux, data, values, selectors);
        }
    }

    /// Follow the active case at each mux level
    fn walk_mux(
        root: &MuxNode,
        data: &[u8],
        values: &mut Vec<DecodedValue>,
        selectors: &mut Vec<u64>,
    ) {
        let mut node = Some(root);
        let mut depth = 0;

        while let Some(current) = node {
            if depth >= MAX_MUX_DEPTH {
                log::debug!("Mux walk stopped at depth {}", depth);
                break;
            }
            depth += 1;

            let Some(value) = current.selector(data) else {
                log::trace!(
                    "Mux selector at bit {} outside {}-byte payload",
                    current.start_bit,
                    data.len()
                );
                break;
            };
            selectors.push(value);

            let Some(case) = current.select(value) else {
                log::trace!("No mux case for selector value {}", value);
                break;
            };

            values.extend(case.signals.iter().filter_map(|s| Self::decode_signal(data, s)));
            node = case.nested.as_deref();
        }
    }

    /// Decode a single signal
    ///
    /// Returns `None` when the signal's range lies outside the payload.
    pub fn decode_signal(data: &[u8], signal: &ResolvedSignal) -> Option<DecodedValue> {
        if !bits::fits(data.len(), signal.start_bit, signal.bit_length) {
            log::trace!(
                "Signal '{}' needs {} bits but payload has {} bytes",
                signal.name,
                signal.end_bit(),
                data.len()
            );
            return None;
        }

        if signal.format.is_text() {
            return Some(Self::decode_text(data, signal));
        }

        let unsigned = Self::extract_raw(data, signal)?;
        let raw = if signal.signed {
            bits::sign_extend(unsigned, signal.bit_length)
        } else {
            unsigned as i128
        };
        let scaled = format::scale(raw, signal.factor, signal.offset);

        let display = match signal.format {
            SignalFormat::Hex => format::render_hex(unsigned, signal.bit_length, signal.endianness),
            SignalFormat::Enum => format::render_enum(raw, signal.enum_map.as_ref()),
            SignalFormat::UnixTime => match scaled {
                Some(value) => format::render_unix_time(value),
                None => format!("Invalid ({})", raw),
            },
            // Text formats were handled above
            SignalFormat::Numeric | SignalFormat::Ascii | SignalFormat::Utf8 => match scaled {
                Some(value) => format::render_numeric(value),
                None => raw.to_string(),
            },
        };

        Some(DecodedValue {
            name: signal.name.clone(),
            raw_value: Some(raw),
            scaled_value: scaled,
            display,
            unit: signal.unit.clone(),
        })
    }

    /// Unsigned field bits, honoring word order
    fn extract_raw(data: &[u8], signal: &ResolvedSignal) -> Option<u128> {
        match signal.word_order {
            Some(Endianness::Little) => bits::extract_word_swapped(
                data,
                signal.start_bit,
                signal.bit_length,
                signal.endianness,
            ),
            _ => bits::extract_unsigned(data, signal.start_bit, signal.bit_length, signal.endianness),
        }
    }

    fn decode_text(data: &[u8], signal: &ResolvedSignal) -> DecodedValue {
        let utf8 = signal.format == SignalFormat::Utf8;
        let raw_value = if signal.bit_length <= MAX_FIELD_BITS {
            bits::extract_unsigned(data, signal.start_bit, signal.bit_length, signal.endianness)
                .map(|v| v as i128)
        } else {
            None
        };

        DecodedValue {
            name: signal.name.clone(),
            raw_value,
            scaled_value: None,
            display: format::render_text(data, signal.start_bit, signal.bit_length, utf8),
            unit: signal.unit.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{resolve, Catalog, CaseKey, Confidence, MuxCase};
    use crate::types::Protocol;
    use rust_decimal::Decimal;
    use std::collections::BTreeMap;

    fn signal(name: &str, start_bit: usize, bit_length: usize) -> ResolvedSignal {
        ResolvedSignal {
            name: name.to_string(),
            start_bit,
            bit_length,
            signed: false,
            endianness: Endianness::Little,
            word_order: None,
            factor: Decimal::ONE,
            offset: Decimal::ZERO,
            unit: None,
            format: SignalFormat::Numeric,
            enum_map: None,
            confidence: Confidence::None,
            inherited: false,
        }
    }

    fn frame(signals: Vec<ResolvedSignal>, mux: Option<MuxNode>) -> ResolvedFrame {
        ResolvedFrame {
            frame_id: 0x100,
            protocol: Protocol::Can,
            name: None,
            length: 8,
            is_extended: false,
            is_fd: false,
            transmitter: None,
            interval_ms: None,
            bus: None,
            signals,
            mux,
            mirror_of: None,
            copy_from: None,
            modbus: None,
        }
    }

    fn mux_catalog() -> Catalog {
        resolve(
            r#"
[frame.can."0x100"]
length = 2

[frame.can."0x100".mux]
start_bit = 0
bit_length = 8

[[frame.can."0x100".mux."0".signals]]
name = "temp"
start_bit = 8
bit_length = 8
factor = 0.5
offset = -40

[[frame.can."0x100".mux."1".signals]]
name = "flags"
start_bit = 8
bit_length = 8
format = "hex"
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_mux_case_zero_scales() {
        let catalog = mux_catalog();
        let frame = catalog.frame(Protocol::Can, 0x100).unwrap();

        let values = FrameSignalDecoder::decode(frame, &[0x00, 0x40]);
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].name, "temp");
        assert_eq!(values[0].display, "-8");
        assert_eq!(values[0].raw_value, Some(0x40));

        let values = FrameSignalDecoder::decode(frame, &[0x00, 0x64]);
        assert_eq!(values[0].display, "10");
    }

    #[test]
    fn test_mux_case_one_hex() {
        let catalog = mux_catalog();
        let frame = catalog.frame(Protocol::Can, 0x100).unwrap();

        let values = FrameSignalDecoder::decode(frame, &[0x01, 0xAB]);
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].name, "flags");
        assert_eq!(values[0].display, "AB");
    }

    #[test]
    fn test_unmatched_mux_case_yields_nothing() {
        let catalog = mux_catalog();
        let frame = catalog.frame(Protocol::Can, 0x100).unwrap();

        let mut values = Vec::new();
        let mut selectors = Vec::new();
        FrameSignalDecoder::decode_into(frame, &[0x07, 0xAB], &mut values, &mut selectors);
        assert!(values.is_empty());
        assert_eq!(selectors, vec![7]);
    }

    #[test]
    fn test_signal_beyond_payload_skipped() {
        let frame = frame(vec![signal("a", 0, 8), signal("b", 8, 16)], None);
        let values = FrameSignalDecoder::decode(&frame, &[0x01, 0x02]);
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].name, "a");
    }

    #[test]
    fn test_enum_miss_renders_unknown() {
        let mut s = signal("state", 0, 8);
        s.format = SignalFormat::Enum;
        s.enum_map = Some(BTreeMap::from([(1, "On".to_string())]));
        let frame = frame(vec![s], None);

        assert_eq!(FrameSignalDecoder::decode(&frame, &[0x01])[0].display, "On");
        assert_eq!(FrameSignalDecoder::decode(&frame, &[0x05])[0].display, "Unknown (5)");
    }

    #[test]
    fn test_signed_big_endian() {
        let mut s = signal("torque", 0, 16);
        s.signed = true;
        s.endianness = Endianness::Big;
        let frame = frame(vec![s], None);

        let values = FrameSignalDecoder::decode(&frame, &[0xFF, 0xFE]);
        assert_eq!(values[0].raw_value, Some(-2));
        assert_eq!(values[0].display, "-2");
    }

    #[test]
    fn test_wide_field() {
        let frame = frame(vec![signal("counter", 0, 48)], None);
        let values = FrameSignalDecoder::decode(&frame, &[0x01, 0x00, 0x00, 0x00, 0x00, 0x01]);
        assert_eq!(values[0].raw_value, Some(0x0100_0000_0001));
    }

    #[test]
    fn test_word_swapped_register_pair() {
        let mut s = signal("energy", 0, 32);
        s.endianness = Endianness::Big;
        s.word_order = Some(Endianness::Little);
        let frame = frame(vec![s], None);

        // Low word 0x5678 first, high word 0x1234 second
        let values = FrameSignalDecoder::decode(&frame, &[0x56, 0x78, 0x12, 0x34]);
        assert_eq!(values[0].raw_value, Some(0x1234_5678));
    }

    #[test]
    fn test_ascii_field() {
        let mut s = signal("vin", 0, 32);
        s.format = SignalFormat::Ascii;
        let frame = frame(vec![s], None);

        let values = FrameSignalDecoder::decode(&frame, b"AB\0C");
        assert_eq!(values[0].display, "ABC");
        assert_eq!(values[0].scaled_value, None);
    }

    #[test]
    fn test_nested_mux_path() {
        let inner = MuxNode {
            name: None,
            start_bit: 8,
            bit_length: 8,
            byte_order: Endianness::Little,
            is_2d: false,
            cases: vec![MuxCase {
                key: CaseKey::Single(2),
                signals: vec![signal("deep", 16, 8)],
                nested: None,
            }],
        };
        let outer = MuxNode {
            name: None,
            start_bit: 0,
            bit_length: 8,
            byte_order: Endianness::Little,
            is_2d: false,
            cases: vec![MuxCase {
                key: CaseKey::Range(0, 3),
                signals: vec![signal("shallow", 24, 8)],
                nested: Some(Box::new(inner)),
            }],
        };
        let frame = frame(vec![signal("plain", 32, 8)], Some(outer));

        let mut values = Vec::new();
        let mut selectors = Vec::new();
        FrameSignalDecoder::decode_into(
            &frame,
            &[0x01, 0x02, 0x33, 0x44, 0x55],
            &mut values,
            &mut selectors,
        );
        let names: Vec<&str> = values.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["plain", "shallow", "deep"]);
        assert_eq!(selectors, vec![1, 2]);
    }
}
