//! Catalog resolution
//!
//! Turns the raw document into the frame table: protocol defaults are applied,
//! `copy`/`mirror_of` inheritance is resolved for CAN frames, Modbus lengths are
//! derived from register counts, and signals that do not fit their frame are
//! dropped. Resolution anomalies are logged at debug level and never fail the
//! load.

use super::model::{
    Catalog, CatalogMeta, FrameKey, HeaderField, ModbusRegister, ProtocolConfig, ResolvedFrame,
    ResolvedSignal,
};
use super::mux::{MuxNode, MuxParser};
use super::raw::{parse_raw, FrameRef, RawCatalog, RawFrame, RawProtocolDefaults, RawSignal};
use crate::codec::format::decimal_from_f64;
use crate::codec::{SignalFormat, MAX_FIELD_BITS};
use crate::framing::{FramerConfig, FramingEncoding};
use crate::types::{Endianness, Protocol, Result};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};

/// Highest standard (11-bit) CAN identifier
const MAX_STANDARD_ID: u32 = 0x7FF;

/// Classic CAN payload length
const CLASSIC_CAN_LENGTH: usize = 8;

/// CAN-FD payload length
const CAN_FD_LENGTH: usize = 64;

/// Parse a frame-ID key written as hex (`0x…`) or decimal
pub fn parse_frame_id(key: &str) -> Option<u32> {
    let key = key.trim();
    match key.strip_prefix("0x").or_else(|| key.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => key.parse().ok(),
    }
}

fn parse_enum_key(key: &str) -> Option<i64> {
    let key = key.trim();
    match key.strip_prefix('-') {
        Some(rest) => parse_frame_id(rest).map(|v| -i64::from(v)),
        None => match key.strip_prefix("0x").or_else(|| key.strip_prefix("0X")) {
            Some(hex) => i64::from_str_radix(hex, 16).ok(),
            None => key.parse().ok(),
        },
    }
}

/// Resolve catalog text into a [`Catalog`]
pub fn resolve(text: &str) -> Result<Catalog> {
    let raw = parse_raw(text)?;
    Ok(resolve_raw(raw))
}

/// Resolve an already parsed document
pub fn resolve_raw(raw: RawCatalog) -> Catalog {
    let parts = CatalogResolver::new(&raw).resolve_parts();
    assemble(parts, raw)
}

fn assemble(parts: Resolved, raw: RawCatalog) -> Catalog {
    let catalog = Catalog {
        meta: parts.meta,
        protocol: parts.protocol,
        can: parts.can,
        serial: parts.serial,
        modbus: parts.modbus,
        frames: parts.frames,
        raw,
    };

    let stats = catalog.stats();
    log::info!(
        "Resolved catalog {:?}: {} frames, {} signals",
        catalog.meta.name.as_deref().unwrap_or("unnamed"),
        stats.num_frames,
        stats.num_signals
    );
    catalog
}

/// Everything resolution produces, before it is paired with the raw document
struct Resolved {
    meta: CatalogMeta,
    protocol: Protocol,
    can: ProtocolConfig,
    serial: ProtocolConfig,
    modbus: ProtocolConfig,
    frames: BTreeMap<FrameKey, ResolvedFrame>,
}

/// Defaults that apply while resolving the signals of one frame
#[derive(Clone, Copy)]
struct SignalScope {
    byte_order: Endianness,
    /// Frame size in bits, if known
    limit_bits: Option<usize>,
    inherited: bool,
}

/// Resolver state scoped to one document
pub struct CatalogResolver<'a> {
    raw: &'a RawCatalog,
    /// CAN frames by numeric ID, for inheritance lookups
    can_index: HashMap<u32, &'a RawFrame>,
}

impl<'a> CatalogResolver<'a> {
    pub fn new(raw: &'a RawCatalog) -> Self {
        let can_index = raw
            .frame
            .can
            .iter()
            .filter_map(|(key, frame)| parse_frame_id(key).map(|id| (id, frame)))
            .collect();
        Self { raw, can_index }
    }

    /// Build the catalog; the raw document is cloned into it
    pub fn resolve(&self) -> Catalog {
        assemble(self.resolve_parts(), self.raw.clone())
    }

    fn resolve_parts(&self) -> Resolved {
        let meta = &self.raw.meta;
        let can = resolve_protocol(Protocol::Can, meta.can.as_ref());
        let serial = resolve_protocol(Protocol::Serial, meta.serial.as_ref());
        let modbus = resolve_protocol(Protocol::Modbus, meta.modbus.as_ref());

        let mut frames = BTreeMap::new();
        let sections = [
            (Protocol::Can, &self.raw.frame.can),
            (Protocol::Serial, &self.raw.frame.serial),
            (Protocol::Modbus, &self.raw.frame.modbus),
        ];
        for (protocol, section) in sections {
            for (key, raw_frame) in section {
                let Some(frame_id) = parse_frame_id(key) else {
                    log::debug!("Skipping {} frame with unparsable ID '{}'", protocol, key);
                    continue;
                };
                let frame = match protocol {
                    Protocol::Can => self.resolve_can_frame(frame_id, raw_frame, &can),
                    Protocol::Serial => resolve_serial_frame(frame_id, raw_frame, &serial),
                    Protocol::Modbus => resolve_modbus_frame(frame_id, raw_frame, &modbus),
                };
                // Keys such as "0x10" and "16" collapse onto one frame. Sections iterate
                // in key string order, so the key that sorts last wins.
                frames.insert(FrameKey { protocol, frame_id }, frame);
            }
        }

        Resolved {
            meta: CatalogMeta {
                name: meta.name.clone(),
                version: meta.version.as_ref().map(|v| match v {
                    toml::Value::String(s) => s.clone(),
                    other => other.to_string(),
                }),
            },
            protocol: self.document_protocol(),
            can,
            serial,
            modbus,
            frames,
        }
    }

    /// Explicit `default_frame`, else the first populated namespace
    fn document_protocol(&self) -> Protocol {
        if let Some(protocol) = self.raw.meta.default_frame.as_deref().and_then(Protocol::from_name) {
            return protocol;
        }
        let sections = &self.raw.frame;
        if !sections.can.is_empty() {
            Protocol::Can
        } else if !sections.serial.is_empty() {
            Protocol::Serial
        } else if !sections.modbus.is_empty() {
            Protocol::Modbus
        } else {
            Protocol::Can
        }
    }

    /// Find the CAN frame an inheritance reference points at
    fn inheritance_source(
        &self,
        reference: Option<&FrameRef>,
        frame_id: u32,
        kind: &str,
    ) -> Option<(u32, &'a RawFrame)> {
        let reference = reference?;
        let source = reference
            .to_id()
            .filter(|id| *id != frame_id)
            .and_then(|id| self.can_index.get(&id).map(|frame| (id, *frame)));
        if source.is_none() {
            log::debug!(
                "Frame 0x{:X}: {} target {:?} not found, no inheritance applied",
                frame_id,
                kind,
                reference
            );
        }
        source
    }

    fn resolve_can_frame(&self, frame_id: u32, raw: &RawFrame, config: &ProtocolConfig) -> ResolvedFrame {
        let copy = self.inheritance_source(raw.copy.as_ref(), frame_id, "copy");
        let mirror = self.inheritance_source(raw.mirror_of.as_ref(), frame_id, "mirror_of");
        let copied = copy.map(|(_, source)| source);

        let declared_length = raw.length.or_else(|| copied.and_then(|s| s.length));
        let transmitter = raw
            .transmitter
            .clone()
            .or_else(|| copied.and_then(|s| s.transmitter.clone()));
        let interval_ms = raw
            .interval_ms()
            .or_else(|| copied.and_then(RawFrame::interval_ms))
            .or(config.interval_ms);

        let is_extended = raw
            .is_extended
            .or(config.default_extended)
            .unwrap_or(frame_id > MAX_STANDARD_ID);
        let explicit_fd = raw.is_fd.or(config.default_fd);
        let length = declared_length.unwrap_or(if explicit_fd == Some(true) {
            CAN_FD_LENGTH
        } else {
            CLASSIC_CAN_LENGTH
        });
        let is_fd = explicit_fd.unwrap_or(length > CLASSIC_CAN_LENGTH);

        let scope = SignalScope {
            byte_order: config.byte_order,
            limit_bits: Some(length.saturating_mul(8)),
            inherited: false,
        };

        let signals = match mirror {
            Some((_, primary)) => mirror_signals(&primary.signals, &raw.signals)
                .into_iter()
                .filter_map(|(signal, inherited)| {
                    resolve_signal(signal, SignalScope { inherited, ..scope })
                })
                .collect(),
            None => resolve_signals(&raw.signals, scope),
        };

        let mux = match (&raw.mux, mirror) {
            (Some(local), _) => parse_mux(local, scope),
            (None, Some((_, primary))) => primary.mux.as_ref().and_then(|m| parse_mux(m, scope)).map(|mut node| {
                node.mark_inherited();
                node
            }),
            (None, None) => None,
        };

        ResolvedFrame {
            frame_id,
            protocol: Protocol::Can,
            name: raw.name.clone(),
            length,
            is_extended,
            is_fd,
            transmitter,
            interval_ms,
            bus: raw.bus,
            signals,
            mux,
            mirror_of: mirror.map(|(id, _)| id),
            copy_from: copy.map(|(id, _)| id),
            modbus: None,
        }
    }
}

/// Merge a mirroring frame's signals over its primary's
///
/// Primary signals come first in their order; a local signal at the same
/// `(start_bit, bit_length)` replaces the primary one. Local signals at new
/// positions are appended. The flag marks signals carried over unchanged.
fn mirror_signals<'r>(primary: &'r [RawSignal], local: &'r [RawSignal]) -> Vec<(&'r RawSignal, bool)> {
    let mut merged: Vec<(&RawSignal, bool)> = primary
        .iter()
        .map(|p| match local.iter().find(|s| s.position() == p.position()) {
            Some(override_signal) => (override_signal, false),
            None => (p, true),
        })
        .collect();

    merged.extend(
        local
            .iter()
            .filter(|s| !primary.iter().any(|p| p.position() == s.position()))
            .map(|s| (s, false)),
    );
    merged
}

fn resolve_protocol(protocol: Protocol, raw: Option<&RawProtocolDefaults>) -> ProtocolConfig {
    let mut config = ProtocolConfig::new(protocol);
    let Some(raw) = raw else {
        return config;
    };

    if let Some(order) = raw.default_byte_order {
        config.byte_order = order;
    }
    config.interval_ms = raw.default_interval;
    config.frame_id_mask = raw.frame_id_mask;
    config.default_extended = raw.default_extended;
    config.default_fd = raw.default_fd;
    config.checksum = raw.checksum.clone();
    config.register_base = raw.register_base.unwrap_or(0);
    config.device_address = raw.device_address;
    config.header_fields = raw
        .fields
        .iter()
        .filter_map(|(name, field)| {
            let field = HeaderField {
                name: name.clone(),
                mask: field.mask,
                start_byte: field.start_byte,
                bytes: field.bytes.unwrap_or(1),
                byte_order: field.byte_order.unwrap_or(config.byte_order),
                format: field.format.unwrap_or_default(),
            };
            if field.start_byte.is_some() && field.bit_range().is_none() {
                log::debug!("{} header field '{}' out of range, dropped", protocol, name);
                return None;
            }
            Some(field)
        })
        .collect();

    if protocol == Protocol::Serial && (raw.encoding.is_some() || raw.delimiter.is_some()) {
        let mut framing = FramerConfig::new(raw.encoding.unwrap_or(FramingEncoding::Raw));
        if let Some(delimiter) = &raw.delimiter {
            framing.delimiter = delimiter.clone();
        }
        if let Some(max) = raw.max_frame_length {
            framing.max_frame_length = max;
        }
        framing.include_delimiter = raw.include_delimiter.unwrap_or(false);
        framing.device_address = raw.device_address;
        config.framing = Some(framing);
    }

    config
}

fn resolve_serial_frame(frame_id: u32, raw: &RawFrame, config: &ProtocolConfig) -> ResolvedFrame {
    let scope = SignalScope {
        byte_order: config.byte_order,
        limit_bits: raw.length.map(|l| l.saturating_mul(8)),
        inherited: false,
    };
    let signals = resolve_signals(&raw.signals, scope);
    let mux = raw.mux.as_ref().and_then(|m| parse_mux(m, scope));
    let length = raw
        .length
        .unwrap_or_else(|| max_end_bit(&signals, mux.as_ref()).div_ceil(8));

    ResolvedFrame {
        frame_id,
        protocol: Protocol::Serial,
        name: raw.name.clone(),
        length,
        is_extended: false,
        is_fd: false,
        transmitter: raw.transmitter.clone(),
        interval_ms: raw.interval_ms().or(config.interval_ms),
        bus: raw.bus,
        signals,
        mux,
        mirror_of: None,
        copy_from: None,
        modbus: None,
    }
}

/// Modbus frames are keyed by register number; `length` doubles as the count
fn resolve_modbus_frame(frame_id: u32, raw: &RawFrame, config: &ProtocolConfig) -> ResolvedFrame {
    let register_type = raw.register_type.unwrap_or_default();
    let count = raw
        .register_count
        .or_else(|| raw.length.and_then(|l| u16::try_from(l).ok()))
        .unwrap_or(1);
    let number = raw
        .register_number
        .or_else(|| u16::try_from(frame_id).ok())
        .unwrap_or(0);
    let length = register_type.byte_length(count);

    let scope = SignalScope {
        byte_order: config.byte_order,
        limit_bits: Some(length * 8),
        inherited: false,
    };

    ResolvedFrame {
        frame_id,
        protocol: Protocol::Modbus,
        name: raw.name.clone(),
        length,
        is_extended: false,
        is_fd: false,
        transmitter: raw.transmitter.clone(),
        interval_ms: raw.interval_ms().or(config.interval_ms),
        bus: raw.bus,
        signals: resolve_signals(&raw.signals, scope),
        mux: raw.mux.as_ref().and_then(|m| parse_mux(m, scope)),
        mirror_of: None,
        copy_from: None,
        modbus: Some(ModbusRegister {
            register_type,
            number,
            address: number.saturating_sub(config.register_base),
            count,
            device_address: raw.device_address.or(config.device_address),
        }),
    }
}

fn resolve_signals(signals: &[RawSignal], scope: SignalScope) -> Vec<ResolvedSignal> {
    signals.iter().filter_map(|s| resolve_signal(s, scope)).collect()
}

fn parse_mux(raw: &toml::Table, scope: SignalScope) -> Option<MuxNode> {
    let resolve_case_signal = move |signal: &RawSignal| resolve_signal(signal, scope);
    MuxParser::new(scope.byte_order, &resolve_case_signal).parse(raw)
}

/// Apply defaults to one signal, dropping it if it cannot be decoded
fn resolve_signal(raw: &RawSignal, scope: SignalScope) -> Option<ResolvedSignal> {
    // The end must also round up to a whole byte count without overflowing
    let Some(end_bit) = raw
        .start_bit
        .checked_add(raw.bit_length)
        .filter(|end| end.checked_add(7).is_some())
    else {
        log::debug!("Signal '{}' bit range overflows, dropped", raw.name);
        return None;
    };
    if raw.bit_length == 0 {
        log::debug!("Signal '{}' has zero length, dropped", raw.name);
        return None;
    }
    if let Some(limit) = scope.limit_bits {
        if end_bit > limit {
            log::debug!(
                "Signal '{}' ends at bit {} beyond frame size of {} bits, dropped",
                raw.name,
                end_bit,
                limit
            );
            return None;
        }
    }

    let enum_map: Option<BTreeMap<i64, String>> = raw.enum_map.as_ref().map(|labels| {
        labels
            .iter()
            .filter_map(|(key, label)| parse_enum_key(key).map(|k| (k, label.clone())))
            .collect()
    });
    let format = raw.format.unwrap_or(if enum_map.is_some() {
        SignalFormat::Enum
    } else {
        SignalFormat::Numeric
    });
    if !format.is_text() && raw.bit_length > MAX_FIELD_BITS {
        log::debug!(
            "Signal '{}' is {} bits wide, more than the {} bit integer limit, dropped",
            raw.name,
            raw.bit_length,
            MAX_FIELD_BITS
        );
        return None;
    }

    let factor = match raw.factor {
        Some(f) => decimal_from_f64(f)?,
        None => Decimal::ONE,
    };
    let offset = match raw.offset {
        Some(o) => decimal_from_f64(o)?,
        None => Decimal::ZERO,
    };

    Some(ResolvedSignal {
        name: raw.name.clone(),
        start_bit: raw.start_bit,
        bit_length: raw.bit_length,
        signed: raw.signed.unwrap_or(false),
        endianness: raw.byte_order.unwrap_or(scope.byte_order),
        word_order: raw.word_order,
        factor,
        offset,
        unit: raw.unit.clone(),
        format,
        enum_map,
        confidence: raw.confidence.unwrap_or_default(),
        inherited: scope.inherited,
    })
}

fn max_end_bit(signals: &[ResolvedSignal], mux: Option<&MuxNode>) -> usize {
    let plain = signals.iter().map(ResolvedSignal::end_bit).max().unwrap_or(0);
    let muxed = mux.map_or(0, |node| {
        let cases = node
            .cases
            .iter()
            .map(|case| max_end_bit(&case.signals, case.nested.as_deref()))
            .max()
            .unwrap_or(0);
        cases.max(node.start_bit + node.bit_length)
    });
    plain.max(muxed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::raw::RegisterType;

    fn positions(frame: &ResolvedFrame) -> Vec<(usize, usize, bool, &str)> {
        frame
            .signals
            .iter()
            .map(|s| (s.start_bit, s.bit_length, s.inherited, s.name.as_str()))
            .collect()
    }

    #[test]
    fn test_parse_frame_id() {
        assert_eq!(parse_frame_id("0x100"), Some(0x100));
        assert_eq!(parse_frame_id("0X1f"), Some(0x1F));
        assert_eq!(parse_frame_id("256"), Some(256));
        assert_eq!(parse_frame_id("engine"), None);
        assert_eq!(parse_enum_key("-3"), Some(-3));
        assert_eq!(parse_enum_key("0x10"), Some(16));
    }

    #[test]
    fn test_mirror_inheritance() {
        let catalog = resolve(
            r#"
            [frame.can."0x100"]
            length = 8
            signals = [
                { name = "a", start_bit = 0, bit_length = 8 },
                { name = "b", start_bit = 8, bit_length = 8 },
            ]

            [frame.can."0x101"]
            mirror_of = "256"
            signals = [
                { name = "b_override", start_bit = 8, bit_length = 8 },
                { name = "c", start_bit = 16, bit_length = 8 },
            ]
            "#,
        )
        .unwrap();

        let mirror = catalog.frame(Protocol::Can, 0x101).unwrap();
        assert_eq!(
            positions(mirror),
            vec![(0, 8, true, "a"), (8, 8, false, "b_override"), (16, 8, false, "c")]
        );
        assert_eq!(mirror.mirror_of, Some(0x100));
    }

    #[test]
    fn test_mirror_inherits_mux_wholesale() {
        let catalog = resolve(
            r#"
            [frame.can."0x100".mux]
            start_bit = 0
            bit_length = 8
            [[frame.can."0x100".mux."0".signals]]
            name = "x"
            start_bit = 8
            bit_length = 8

            [frame.can."0x200"]
            mirror_of = 0x100
            "#,
        )
        .unwrap();

        let mirror = catalog.frame(Protocol::Can, 0x200).unwrap();
        let mux = mirror.mux.as_ref().unwrap();
        assert!(mux.select(0).unwrap().signals[0].inherited);
        let primary = catalog.frame(Protocol::Can, 0x100).unwrap();
        assert!(!primary.mux.as_ref().unwrap().select(0).unwrap().signals[0].inherited);
    }

    #[test]
    fn test_unresolvable_mirror_is_tolerated() {
        let catalog = resolve(
            r#"
            [frame.can."0x300"]
            mirror_of = "0x999"
            copy = "nonsense"
            signals = [{ name = "own", start_bit = 0, bit_length = 8 }]
            "#,
        )
        .unwrap();

        let frame = catalog.frame(Protocol::Can, 0x300).unwrap();
        assert_eq!(frame.mirror_of, None);
        assert_eq!(frame.copy_from, None);
        assert_eq!(positions(frame), vec![(0, 8, false, "own")]);
    }

    #[test]
    fn test_copy_fills_only_missing_metadata() {
        let catalog = resolve(
            r#"
            [frame.can."0x10"]
            length = 4
            transmitter = "ECU_A"
            tx.interval_ms = 50
            signals = [{ name = "hidden", start_bit = 0, bit_length = 8 }]

            [frame.can."0x11"]
            copy = "16"
            transmitter = "ECU_B"
            "#,
        )
        .unwrap();

        let frame = catalog.frame(Protocol::Can, 0x11).unwrap();
        assert_eq!(frame.length, 4);
        assert_eq!(frame.transmitter.as_deref(), Some("ECU_B"));
        assert_eq!(frame.interval_ms, Some(50));
        assert_eq!(frame.copy_from, Some(0x10));
        assert!(frame.signals.is_empty());
    }

    #[test]
    fn test_extended_and_fd_precedence() {
        let catalog = resolve(
            r#"
            [meta.can]
            default_fd = false

            [frame.can."0x7FF"]
            [frame.can."0x800"]
            [frame.can."0x801"]
            is_extended = false
            [frame.can."0x802"]
            is_fd = true
            "#,
        )
        .unwrap();

        let frame = |id| catalog.frame(Protocol::Can, id).unwrap();
        assert!(!frame(0x7FF).is_extended);
        assert!(frame(0x800).is_extended);
        assert!(!frame(0x801).is_extended);
        assert!(!frame(0x800).is_fd);
        assert!(frame(0x802).is_fd);
        assert_eq!(frame(0x802).length, 64);
    }

    #[test]
    fn test_signals_beyond_frame_are_dropped() {
        let catalog = resolve(
            r#"
            [frame.can."0x50"]
            length = 2
            signals = [
                { name = "ok", start_bit = 8, bit_length = 8 },
                { name = "too_far", start_bit = 12, bit_length = 8 },
            ]
            "#,
        )
        .unwrap();
        let frame = catalog.frame(Protocol::Can, 0x50).unwrap();
        assert_eq!(frame.signals.len(), 1);
        assert_eq!(frame.signals[0].name, "ok");
    }

    #[test]
    fn test_unparsable_frame_keys_are_skipped() {
        let catalog = resolve(
            r#"
            [frame.can."engine"]
            [frame.can."0x20"]
            "#,
        )
        .unwrap();
        assert_eq!(catalog.stats().num_frames, 1);
    }

    #[test]
    fn test_document_protocol_inference() {
        let catalog = resolve("[frame.modbus.\"1\"]\n[frame.serial.\"2\"]\n").unwrap();
        assert_eq!(catalog.protocol, Protocol::Serial);

        let catalog = resolve("[meta]\ndefault_frame = \"modbus\"\n[frame.can.\"1\"]\n").unwrap();
        assert_eq!(catalog.protocol, Protocol::Modbus);

        assert_eq!(resolve("").unwrap().protocol, Protocol::Can);
    }

    #[test]
    fn test_modbus_length_and_addressing() {
        let catalog = resolve(
            r#"
            [meta.modbus]
            register_base = 1

            [frame.modbus."40001"]
            register_count = 2
            signals = [{ name = "power", start_bit = 0, bit_length = 32 }]

            [frame.modbus."10"]
            register_type = "coil"
            length = 10
            "#,
        )
        .unwrap();

        let holding = catalog.frame(Protocol::Modbus, 40001).unwrap();
        assert_eq!(holding.length, 4);
        let register = holding.modbus.unwrap();
        assert_eq!(register.address, 40000);
        assert_eq!(register.register_type, RegisterType::Holding);
        assert_eq!(holding.signals[0].endianness, Endianness::Big);

        let coils = catalog.frame(Protocol::Modbus, 10).unwrap();
        assert_eq!(coils.length, 2);
        assert_eq!(coils.modbus.unwrap().count, 10);
    }

    #[test]
    fn test_serial_length_from_signals() {
        let catalog = resolve(
            r#"
            [meta.serial]
            encoding = "slip"
            fields.id = { start_byte = 0, bytes = 1 }

            [frame.serial."0x01"]
            signals = [{ name = "v", start_bit = 8, bit_length = 16 }]
            "#,
        )
        .unwrap();

        let frame = catalog.frame(Protocol::Serial, 1).unwrap();
        assert_eq!(frame.length, 3);
        let framing = catalog.serial.framing.as_ref().unwrap();
        assert_eq!(framing.encoding, FramingEncoding::Slip);
        assert_eq!(catalog.serial.frame_id_of(&[0x01, 0x00, 0x00]), Some(1));
    }

    #[test]
    fn test_enum_defaults_format() {
        let catalog = resolve(
            r#"
            [[frame.can."0x1".signals]]
            name = "state"
            start_bit = 0
            bit_length = 2
            enum = { "0" = "Off", "1" = "On", "bad" = "x" }
            "#,
        )
        .unwrap();
        let signal = &catalog.frame(Protocol::Can, 1).unwrap().signals[0];
        assert_eq!(signal.format, SignalFormat::Enum);
        assert_eq!(signal.enum_map.as_ref().unwrap().len(), 2);
    }

    #[test]
    fn test_equivalent_keys_last_in_key_order_wins() {
        let catalog = resolve(
            r#"
            [frame.can."16"]
            name = "decimal"

            [frame.can."0x10"]
            name = "hex"
            "#,
        )
        .unwrap();

        assert_eq!(catalog.stats().num_frames, 1);
        let frame = catalog.frame(Protocol::Can, 16).unwrap();
        assert_eq!(frame.name.as_deref(), Some("decimal"));
    }

    #[test]
    fn test_overflowing_bit_ranges_are_dropped() {
        let catalog = resolve(&format!(
            r#"
            [frame.serial."1"]
            signals = [
                {{ name = "huge", start_bit = {max}, bit_length = {max}, format = "ascii" }},
                {{ name = "ok", start_bit = 0, bit_length = 8 }},
            ]

            [frame.serial."2"]
            mux = {{ start_bit = {max}, layout = "2d" }}
            "#,
            max = i64::MAX,
        ))
        .unwrap();

        let frame = catalog.frame(Protocol::Serial, 1).unwrap();
        let names: Vec<&str> = frame.signals.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["ok"]);
        assert_eq!(frame.length, 1);

        let far = catalog.frame(Protocol::Serial, 2).unwrap();
        assert!(far.length > 1);
        let decoder = crate::Decoder::new(catalog);
        let frame = crate::Frame::new(2, vec![0x01, 0x02]);
        assert!(decoder.decode_frame(Protocol::Serial, &frame).is_some());
    }

    #[test]
    fn test_out_of_range_header_fields_are_dropped() {
        let catalog = resolve(&format!(
            r#"
            [meta.serial]
            fields.id = {{ start_byte = 0, bytes = 1 }}
            fields.far = {{ start_byte = {max}, bytes = 2 }}
            fields.wide = {{ start_byte = 0, bytes = {max} }}
            "#,
            max = i64::MAX,
        ))
        .unwrap();

        let names: Vec<&str> = catalog
            .serial
            .header_fields
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(names, vec!["id"]);
    }
}
