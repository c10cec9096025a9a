//! Modbus RTU framing
//!
//! RTU frames are delimited on the wire by silent intervals, which are lost
//! once bytes reach us. Frames are instead located by trying every candidate
//! length from the start of the buffer until the trailing CRC-16 matches.

use super::{FramedBytes, StreamFramer};
use crate::codec::checksum::{crc16_modbus_update, CRC16_MODBUS_INIT};
use byteorder::{ByteOrder, LittleEndian};

/// Address, function code and CRC
pub const MIN_FRAME_LENGTH: usize = 4;
pub const MAX_FRAME_LENGTH: usize = 256;

/// Upper bound on resync attempts within one `feed` call
pub const MAX_RESYNC_ITERATIONS: usize = 4096;

#[derive(Debug)]
pub struct ModbusRtuFramer {
    device_address: Option<u8>,
    buffer: Vec<u8>,
    buffer_offset: u64,
}

impl ModbusRtuFramer {
    pub fn new(device_address: Option<u8>) -> Self {
        Self {
            device_address,
            buffer: Vec::new(),
            buffer_offset: 0,
        }
    }

    /// Shortest candidate length from `start` whose trailing CRC matches
    fn find_frame_at(&self, start: usize) -> Option<usize> {
        let window = &self.buffer[start..];
        if window.len() < MIN_FRAME_LENGTH {
            return None;
        }
        let max = window.len().min(MAX_FRAME_LENGTH);
        let mut crc = CRC16_MODBUS_INIT;
        // CRC over window[..MIN_FRAME_LENGTH - 3] before the first candidate
        for &byte in &window[..MIN_FRAME_LENGTH - 3] {
            crc = crc16_modbus_update(crc, byte);
        }
        for len in MIN_FRAME_LENGTH..=max {
            crc = crc16_modbus_update(crc, window[len - 3]);
            if LittleEndian::read_u16(&window[len - 2..len]) == crc {
                return Some(len);
            }
        }
        None
    }

    fn address_matches(&self, position: usize) -> bool {
        self.device_address
            .map_or(true, |address| self.buffer[position] == address)
    }

    /// First start after the head that yields a frame
    ///
    /// Every start tested counts as a failed attempt.
    fn find_resync(&self, failed: &mut usize) -> Option<usize> {
        for start in 1..=self.buffer.len() - MIN_FRAME_LENGTH {
            if *failed >= MAX_RESYNC_ITERATIONS {
                return None;
            }
            if !self.address_matches(start) {
                continue;
            }
            *failed += 1;
            if self.find_frame_at(start).is_some() {
                return Some(start);
            }
        }
        None
    }

    fn shift(&mut self, count: usize) {
        self.buffer.drain(..count);
        self.buffer_offset += count as u64;
    }
}

impl StreamFramer for ModbusRtuFramer {
    fn feed(&mut self, data: &[u8]) -> Vec<FramedBytes> {
        self.buffer.extend_from_slice(data);
        let mut frames = Vec::new();
        // Emitted frames do not count toward the cap
        let mut failed = 0;

        while self.buffer.len() >= MIN_FRAME_LENGTH {
            if failed >= MAX_RESYNC_ITERATIONS {
                log::warn!(
                    "Modbus RTU: no frame found after {} attempts, dropping {} buffered bytes",
                    MAX_RESYNC_ITERATIONS,
                    self.buffer.len()
                );
                let len = self.buffer.len();
                self.shift(len);
                break;
            }

            if !self.address_matches(0) {
                failed += 1;
                self.shift(1);
                continue;
            }

            if let Some(len) = self.find_frame_at(0) {
                frames.push(FramedBytes {
                    bytes: self.buffer[..len].to_vec(),
                    offset: self.buffer_offset,
                    complete: true,
                });
                self.shift(len);
                continue;
            }
            failed += 1;

            match self.find_resync(&mut failed) {
                Some(skip) => {
                    log::trace!(
                        "Modbus RTU: resync skipped {} bytes at offset {}",
                        skip,
                        self.buffer_offset
                    );
                    self.shift(skip);
                }
                None if self.buffer.len() >= MAX_FRAME_LENGTH || failed >= MAX_RESYNC_ITERATIONS => {
                    self.shift(1)
                }
                // Nothing later matches yet; the head frame may still be arriving
                None => break,
            }
        }

        frames
    }

    fn flush(&mut self) -> Option<FramedBytes> {
        if self.buffer.is_empty() {
            return None;
        }
        let len = self.buffer.len();
        let frame = FramedBytes {
            bytes: self.buffer[..].to_vec(),
            offset: self.buffer_offset,
            complete: false,
        };
        self.shift(len);
        Some(frame)
    }

    fn reset(&mut self) {
        let len = self.buffer.len();
        self.shift(len);
    }
}
