//! Decoder configuration types
//!
//! Controls which frames the decoder looks at and which optional per-frame
//! work (header fields, checksums) it does. Catalog content is not configured
//! here.

use serde::{Deserialize, Serialize};

/// Configuration for the decoder library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Optional: only decode frames from these buses
    #[serde(default)]
    pub bus_filter: Option<Vec<u8>>,

    /// Optional: only decode these frame IDs
    #[serde(default)]
    pub frame_filter: Option<Vec<u32>>,

    /// Emit frames missing from the catalog as raw events
    #[serde(default)]
    pub emit_unknown_frames: bool,

    /// Decode the protocol's header fields for each frame
    #[serde(default = "default_true")]
    pub decode_header_fields: bool,

    /// Verify the protocol's checksum when one is declared
    #[serde(default = "default_true")]
    pub verify_checksums: bool,
}

fn default_true() -> bool {
    true
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            bus_filter: None,
            frame_filter: None,
            emit_unknown_frames: false,
            decode_header_fields: true,
            verify_checksums: true,
        }
    }
}

impl DecoderConfig {
    /// Create a new decoder configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set bus filter
    pub fn with_bus_filter(mut self, buses: Vec<u8>) -> Self {
        self.bus_filter = Some(buses);
        self
    }

    /// Builder method: set frame ID filter
    pub fn with_frame_filter(mut self, frame_ids: Vec<u32>) -> Self {
        self.frame_filter = Some(frame_ids);
        self
    }

    /// Builder method: emit unknown frames as raw events
    pub fn with_unknown_frames(mut self, enabled: bool) -> Self {
        self.emit_unknown_frames = enabled;
        self
    }

    /// Builder method: enable or disable header field decoding
    pub fn with_header_fields(mut self, enabled: bool) -> Self {
        self.decode_header_fields = enabled;
        self
    }

    /// Builder method: enable or disable checksum verification
    pub fn with_checksums(mut self, enabled: bool) -> Self {
        self.verify_checksums = enabled;
        self
    }

    /// Check if a bus should be processed
    ///
    /// Frames without a bus number pass any filter.
    pub fn should_process_bus(&self, bus: Option<u8>) -> bool {
        match (&self.bus_filter, bus) {
            (Some(buses), Some(bus)) => buses.contains(&bus),
            _ => true,
        }
    }

    /// Check if a frame ID should be processed
    pub fn should_process_frame_id(&self, frame_id: u32) -> bool {
        match &self.frame_filter {
            Some(ids) => ids.contains(&frame_id),
            None => true,
        }
    }

    /// Check if a frame should be processed based on filters
    pub fn should_process_frame(&self, bus: Option<u8>, frame_id: u32) -> bool {
        self.should_process_bus(bus) && self.should_process_frame_id(frame_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_config_builder() {
        let config = DecoderConfig::new()
            .with_bus_filter(vec![0, 1])
            .with_unknown_frames(true)
            .with_checksums(false);

        assert_eq!(config.bus_filter, Some(vec![0, 1]));
        assert!(config.emit_unknown_frames);
        assert!(config.decode_header_fields);
        assert!(!config.verify_checksums);
    }

    #[test]
    fn test_filter_logic() {
        let config = DecoderConfig::new()
            .with_bus_filter(vec![0, 1])
            .with_frame_filter(vec![0x123, 0x456]);

        assert!(config.should_process_frame(Some(0), 0x123));
        assert!(config.should_process_frame(Some(1), 0x456));
        assert!(config.should_process_frame(None, 0x456));
        assert!(!config.should_process_frame(Some(2), 0x123)); // Wrong bus
        assert!(!config.should_process_frame(Some(0), 0x789)); // Wrong frame
    }

    #[test]
    fn test_no_filters() {
        let config = DecoderConfig::new();

        // Without filters, everything should pass
        assert!(config.should_process_frame(Some(0), 0x123));
        assert!(config.should_process_frame(Some(99), 0xFFFFFFFF));
    }

    #[test]
    fn test_deserialize_partial() {
        let config: DecoderConfig = toml::from_str("emit_unknown_frames = true").unwrap();
        assert!(config.emit_unknown_frames);
        assert!(config.verify_checksums);
        assert_eq!(config.frame_filter, None);
    }
}
