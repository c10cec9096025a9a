//! Main decoder API
//!
//! This module provides the primary interface for the decoder library.
//! [`Decoder`] pairs a resolved catalog with a [`DecoderConfig`] and turns
//! frames into [`DecodedEvent`]s. [`SerialDecoder`] puts a stream framer in
//! front of it for byte-stream transports.

use crate::catalog::{self, Catalog, CatalogStats, ProtocolConfig, ResolvedFrame};
use crate::codec::format;
use crate::codec::SignalFormat;
use crate::config::DecoderConfig;
use crate::framing::{FramedBytes, FramerConfig, SerialFramer, StreamFramer};
use crate::message_decoder::FrameSignalDecoder;
use crate::types::{DecodedEvent, DecodedValue, Frame, Protocol, Result};
use rust_decimal::Decimal;
use std::path::Path;
use std::sync::Arc;

/// The main decoder struct - entry point for all decoding operations
#[derive(Debug, Clone)]
pub struct Decoder {
    catalog: Arc<Catalog>,
    config: DecoderConfig,
}

impl Decoder {
    /// Create a decoder over a resolved catalog with default settings
    pub fn new(catalog: impl Into<Arc<Catalog>>) -> Self {
        Self::with_config(catalog, DecoderConfig::default())
    }

    pub fn with_config(catalog: impl Into<Arc<Catalog>>, config: DecoderConfig) -> Self {
        Self {
            catalog: catalog.into(),
            config,
        }
    }

    /// Load a catalog file and create a decoder for it
    ///
    /// # Example
    /// ```no_run
    /// use catalog_decoder::Decoder;
    /// use std::path::Path;
    ///
    /// let decoder = Decoder::from_path(Path::new("vehicle.toml")).unwrap();
    /// println!("{} frames", decoder.stats().num_frames);
    /// ```
    pub fn from_path(path: &Path) -> Result<Self> {
        Ok(Self::new(catalog::load_file(path)?))
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Swap in a newly loaded catalog
    pub fn set_catalog(&mut self, catalog: Arc<Catalog>) {
        self.catalog = catalog;
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Get statistics about the loaded catalog
    pub fn stats(&self) -> CatalogStats {
        self.catalog.stats()
    }

    /// Decode one frame
    ///
    /// Returns `None` for filtered frames, and for frames missing from the
    /// catalog unless unknown frames are requested in the config. A frame
    /// declared for another bus counts as missing.
    pub fn decode_frame(&self, protocol: Protocol, frame: &Frame) -> Option<DecodedEvent> {
        if !self.config.should_process_frame(frame.bus, frame.frame_id) {
            return None;
        }

        match self.catalog.lookup(protocol, frame.frame_id) {
            Some(def) if bus_matches(def, frame.bus) => {
                log::trace!("Decoding frame 0x{:X} ({:?})", frame.frame_id, protocol);
                Some(self.decode_known(protocol, def, frame))
            }
            _ => self.unknown(frame),
        }
    }

    /// Decode a sequence of frames lazily
    pub fn decode_frames<'a, I>(
        &'a self,
        protocol: Protocol,
        frames: I,
    ) -> DecodingIterator<'a, I::IntoIter>
    where
        I: IntoIterator<Item = Frame>,
    {
        DecodingIterator {
            frame_iter: frames.into_iter(),
            decoder: self,
            protocol,
        }
    }

    fn decode_known(&self, protocol: Protocol, def: &ResolvedFrame, frame: &Frame) -> DecodedEvent {
        let proto = self.catalog.config(protocol);

        let mut values = Vec::with_capacity(def.signals.len());
        let mut mux_selectors = Vec::new();
        FrameSignalDecoder::decode_into(def, &frame.bytes, &mut values, &mut mux_selectors);

        let header = if self.config.decode_header_fields {
            decode_header(proto, frame)
        } else {
            Vec::new()
        };

        let checksum_valid = if self.config.verify_checksums {
            proto.checksum.as_ref().and_then(|spec| spec.verify(&frame.bytes))
        } else {
            None
        };
        if checksum_valid == Some(false) {
            log::debug!("Checksum mismatch on frame 0x{:X}", frame.frame_id);
        }

        DecodedEvent::Message {
            timestamp: frame.timestamp(),
            bus: frame.bus,
            frame_id: frame.frame_id,
            protocol,
            name: def.name.clone(),
            transmitter: def.transmitter.clone(),
            values,
            header,
            mux_selectors,
            checksum_valid,
        }
    }

    fn unknown(&self, frame: &Frame) -> Option<DecodedEvent> {
        if !self.config.emit_unknown_frames {
            return None;
        }
        log::trace!("Unknown frame ID: 0x{:X}, emitting as raw frame", frame.frame_id);
        Some(DecodedEvent::RawFrame {
            timestamp: frame.timestamp(),
            bus: frame.bus,
            frame_id: frame.frame_id,
            bytes: frame.bytes.clone(),
        })
    }
}

fn bus_matches(def: &ResolvedFrame, bus: Option<u8>) -> bool {
    match (def.bus, bus) {
        (Some(expected), Some(actual)) => expected == actual,
        _ => true,
    }
}

fn decode_header(proto: &ProtocolConfig, frame: &Frame) -> Vec<DecodedValue> {
    proto
        .header_fields
        .iter()
        .filter_map(|field| {
            let value = field.extract(frame.frame_id, &frame.bytes)?;
            let scaled = Decimal::from(value);
            let display = match field.format {
                SignalFormat::Hex => format!("0x{:X}", value),
                _ => format::render_numeric(scaled),
            };
            Some(DecodedValue {
                name: field.name.clone(),
                raw_value: Some(i128::from(value)),
                scaled_value: Some(scaled),
                display,
                unit: None,
            })
        })
        .collect()
}

/// Iterator that decodes frames into events, skipping frames that produce none
pub struct DecodingIterator<'a, I>
where
    I: Iterator<Item = Frame>,
{
    frame_iter: I,
    decoder: &'a Decoder,
    protocol: Protocol,
}

impl<'a, I> Iterator for DecodingIterator<'a, I>
where
    I: Iterator<Item = Frame>,
{
    type Item = DecodedEvent;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let frame = self.frame_iter.next()?;
            if let Some(event) = self.decoder.decode_frame(self.protocol, &frame) {
                return Some(event);
            }
        }
    }
}

/// Decoder for a serial byte stream
///
/// Frames are cut by the configured framer. A frame's ID is read from the
/// serial protocol's `id` header field, or 0 if the catalog declares none.
#[derive(Debug)]
pub struct SerialDecoder {
    decoder: Decoder,
    framer: SerialFramer,
    bus: Option<u8>,
}

impl SerialDecoder {
    /// Create a serial decoder using the catalog's `[meta.serial]` framing
    pub fn new(decoder: Decoder) -> Self {
        let framing = decoder
            .catalog
            .config(Protocol::Serial)
            .framing
            .clone()
            .unwrap_or_default();
        Self::with_framing(decoder, &framing)
    }

    /// Create a serial decoder with explicit framing
    pub fn with_framing(decoder: Decoder, framing: &FramerConfig) -> Self {
        log::debug!("Serial framing: {:?}", framing.encoding);
        Self {
            decoder,
            framer: SerialFramer::from_config(framing),
            bus: None,
        }
    }

    /// Builder method: tag decoded frames with a bus number
    pub fn with_bus(mut self, bus: u8) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn decoder(&self) -> &Decoder {
        &self.decoder
    }

    /// Feed received bytes, decoding every frame they complete
    pub fn feed(&mut self, data: &[u8], timestamp_us: u64) -> Vec<DecodedEvent> {
        self.framer
            .feed(data)
            .into_iter()
            .filter_map(|framed| self.decode_framed(framed, timestamp_us))
            .collect()
    }

    /// Flush the framer, surfacing any trailing bytes
    pub fn flush(&mut self, timestamp_us: u64) -> Option<DecodedEvent> {
        let framed = self.framer.flush()?;
        self.decode_framed(framed, timestamp_us)
    }

    fn decode_framed(&self, framed: FramedBytes, timestamp_us: u64) -> Option<DecodedEvent> {
        let frame_id = self
            .decoder
            .catalog
            .config(Protocol::Serial)
            .frame_id_of(&framed.bytes)
            .unwrap_or(0);
        let frame = Frame {
            frame_id,
            bus: self.bus,
            bytes: framed.bytes,
            timestamp_us,
            is_extended: None,
            is_fd: None,
        };

        if framed.complete {
            self.decoder.decode_frame(Protocol::Serial, &frame)
        } else {
            log::trace!("Incomplete serial frame at offset {}", framed.offset);
            self.decoder.unknown(&frame)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::{slip_encode, FramingEncoding};

    const CATALOG: &str = r#"
[meta]
name = "test"

[frame.can."0x123"]
name = "Status"
length = 2
bus = 1

[[frame.can."0x123".signals]]
name = "speed"
start_bit = 0
bit_length = 16
factor = 0.1
unit = "km/h"

[meta.serial]
encoding = "slip"

[meta.serial.fields.id]
start_byte = 0
bytes = 1

[meta.serial.checksum]
algorithm = "xor"

[frame.serial."0x10"]
length = 4

[[frame.serial."0x10".signals]]
name = "level"
start_bit = 8
bit_length = 8
"#;

    fn decoder() -> Decoder {
        Decoder::new(catalog::resolve(CATALOG).unwrap())
    }

    #[test]
    fn test_decode_known_frame() {
        let frame = Frame::new(0x123, vec![0xE8, 0x03]).with_bus(1);
        let event = decoder().decode_frame(Protocol::Can, &frame).unwrap();

        assert_eq!(event.frame_id(), 0x123);
        let speed = event.value("speed").unwrap();
        assert_eq!(speed.display, "100");
        assert_eq!(speed.unit.as_deref(), Some("km/h"));
    }

    #[test]
    fn test_bus_mismatch_is_unknown() {
        let frame = Frame::new(0x123, vec![0xE8, 0x03]).with_bus(2);
        assert!(decoder().decode_frame(Protocol::Can, &frame).is_none());

        let emitting = Decoder::with_config(
            catalog::resolve(CATALOG).unwrap(),
            DecoderConfig::new().with_unknown_frames(true),
        );
        let event = emitting.decode_frame(Protocol::Can, &frame).unwrap();
        assert!(matches!(event, DecodedEvent::RawFrame { .. }));
    }

    #[test]
    fn test_filtered_frame() {
        let decoder = Decoder::with_config(
            catalog::resolve(CATALOG).unwrap(),
            DecoderConfig::new().with_frame_filter(vec![0x200]).with_unknown_frames(true),
        );
        let frame = Frame::new(0x123, vec![0xE8, 0x03]);
        assert!(decoder.decode_frame(Protocol::Can, &frame).is_none());
    }

    #[test]
    fn test_decode_frames_iterator() {
        let decoder = decoder();
        let frames = vec![
            Frame::new(0x123, vec![0x0A, 0x00]),
            Frame::new(0x999, vec![0x00]),
            Frame::new(0x123, vec![0x14, 0x00]),
        ];
        let events: Vec<_> = decoder.decode_frames(Protocol::Can, frames).collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].value("speed").unwrap().display, "2");
    }

    #[test]
    fn test_serial_stream_with_header_and_checksum() {
        let mut serial = SerialDecoder::new(decoder());
        let body = [0x10, 0x2A, 0x00];
        let xor = body.iter().fold(0u8, |acc, b| acc ^ b);
        let mut payload = body.to_vec();
        payload.push(xor);

        let events = serial.feed(&slip_encode(&payload), 5_000_000);
        assert_eq!(events.len(), 1);
        match &events[0] {
            DecodedEvent::Message {
                frame_id,
                header,
                checksum_valid,
                values,
                ..
            } => {
                assert_eq!(*frame_id, 0x10);
                assert_eq!(header[0].name, "id");
                assert_eq!(header[0].display, "16");
                assert_eq!(*checksum_valid, Some(true));
                assert_eq!(values[0].display, "42");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_serial_explicit_framing() {
        let framing = FramerConfig::new(FramingEncoding::Raw).with_delimiter(*b"\n");
        let mut serial = SerialDecoder::with_framing(decoder(), &framing);
        let events = serial.feed(&[0x10, 0x05, 0x00, 0x15, b'\n'], 0);
        assert_eq!(events[0].value("level").unwrap().display, "5");
        assert!(serial.flush(0).is_none());
    }
}
