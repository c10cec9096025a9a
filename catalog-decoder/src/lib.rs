//! Catalog Decoder Library
//!
//! A stateless, reusable library for decoding field-bus traffic (CAN/CAN-FD,
//! serial, Modbus) with frame and signal definitions from TOML catalogs.
//!
//! # Architecture
//!
//! This library is intentionally focused on decoding:
//! - Resolves catalogs once into an immutable frame table (inheritance, mux trees, defaults)
//! - Extracts bit fields of any width and byte order, scaled in decimal arithmetic
//! - Walks multiplexed frames down the active case path
//! - Cuts serial byte streams into frames (delimiter, SLIP, Modbus RTU)
//!
//! The library does NOT:
//! - Read from transports (serial ports, sockets, CAN interfaces)
//! - Track signal value changes over time
//! - Generate reports
//!
//! All higher-level functionality is in the application layer (catalog-cli).
//!
//! # Example Usage
//!
//! ```no_run
//! use catalog_decoder::{Decoder, DecoderConfig, Frame, Protocol};
//! use std::path::Path;
//!
//! let catalog = catalog_decoder::catalog::load_file(Path::new("vehicle.toml")).unwrap();
//! let config = DecoderConfig::new().with_bus_filter(vec![0, 1]);
//! let decoder = Decoder::with_config(catalog, config);
//!
//! let frame = Frame::new(0x100, vec![0x00, 0x40]).with_bus(0);
//! if let Some(event) = decoder.decode_frame(Protocol::Can, &frame) {
//!     for value in event.values() {
//!         println!("{} = {}", value.name, value.display);
//!     }
//! }
//! ```

// Public modules
pub mod catalog;
pub mod codec;
pub mod config;
pub mod decoder;
pub mod framing;
pub mod message_decoder;
pub mod types;

// Re-export main types for convenience
pub use catalog::{Catalog, CatalogStats, CatalogStore, ResolvedFrame, ResolvedSignal};
pub use codec::SignalFormat;
pub use config::DecoderConfig;
pub use decoder::{Decoder, SerialDecoder};
pub use framing::{FramedBytes, FramerConfig, FramingEncoding, SerialFramer, StreamFramer};
pub use message_decoder::FrameSignalDecoder;
pub use types::{
    DecodedEvent, DecodedValue, DecoderError, Endianness, Frame, Protocol, Result, Timestamp,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
