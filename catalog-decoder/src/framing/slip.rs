//! SLIP framing (RFC 1055)

use super::{FramedBytes, StreamFramer};

pub const END: u8 = 0xC0;
pub const ESC: u8 = 0xDB;
pub const ESC_END: u8 = 0xDC;
pub const ESC_ESC: u8 = 0xDD;

/// Escape a payload and wrap it in END bytes
pub fn slip_encode(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 2);
    out.push(END);
    for &byte in payload {
        match byte {
            END => out.extend_from_slice(&[ESC, ESC_END]),
            ESC => out.extend_from_slice(&[ESC, ESC_ESC]),
            b => out.push(b),
        }
    }
    out.push(END);
    out
}

/// Decodes SLIP frames from a byte stream
///
/// A bare ESC followed by anything other than ESC_END or ESC_ESC is kept
/// literally along with the byte after it.
#[derive(Debug)]
pub struct SlipFramer {
    max_frame_length: usize,
    buffer: Vec<u8>,
    buffer_offset: u64,
    position: u64,
    /// Previous byte was an ESC
    escaped: bool,
    /// Bytes have been seen since the last END
    in_frame: bool,
}

impl SlipFramer {
    pub fn new(max_frame_length: usize) -> Self {
        Self {
            max_frame_length: max_frame_length.max(1),
            buffer: Vec::new(),
            buffer_offset: 0,
            position: 0,
            escaped: false,
            in_frame: false,
        }
    }

    fn take(&mut self, complete: bool) -> FramedBytes {
        self.in_frame = false;
        FramedBytes {
            bytes: std::mem::take(&mut self.buffer),
            offset: self.buffer_offset,
            complete,
        }
    }

    fn push(&mut self, byte: u8, frames: &mut Vec<FramedBytes>) {
        self.buffer.push(byte);
        if self.buffer.len() >= self.max_frame_length {
            log::trace!("SLIP frame reached {} bytes, splitting", self.max_frame_length);
            let offset = self.position;
            frames.push(self.take(false));
            // Remaining bytes of the oversized frame start a new chunk
            self.in_frame = true;
            self.buffer_offset = offset;
        }
    }
}

impl StreamFramer for SlipFramer {
    fn feed(&mut self, data: &[u8]) -> Vec<FramedBytes> {
        let mut frames = Vec::new();

        for &byte in data {
            let at = self.position;
            self.position += 1;

            if byte == END {
                if self.escaped {
                    log::debug!("SLIP: ESC before END at offset {}, keeping literal ESC", at);
                    self.escaped = false;
                    self.buffer.push(ESC);
                }
                // Consecutive END bytes delimit nothing
                if !self.buffer.is_empty() {
                    frames.push(self.take(true));
                }
                self.in_frame = false;
                continue;
            }

            if !self.in_frame {
                self.in_frame = true;
                self.buffer_offset = at;
            }

            if self.escaped {
                self.escaped = false;
                match byte {
                    ESC_END => self.push(END, &mut frames),
                    ESC_ESC => self.push(ESC, &mut frames),
                    other => {
                        log::debug!(
                            "SLIP: invalid escape 0x{:02X} at offset {}, keeping literal bytes",
                            other,
                            at
                        );
                        self.push(ESC, &mut frames);
                        self.push(other, &mut frames);
                    }
                }
            } else if byte == ESC {
                self.escaped = true;
            } else {
                self.push(byte, &mut frames);
            }
        }

        frames
    }

    fn flush(&mut self) -> Option<FramedBytes> {
        if self.escaped {
            self.escaped = false;
            self.buffer.push(ESC);
        }
        if self.buffer.is_empty() {
            self.in_frame = false;
            None
        } else {
            Some(self.take(false))
        }
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.escaped = false;
        self.in_frame = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_escapes() {
        assert_eq!(
            slip_encode(&[0x01, END, ESC]),
            vec![END, 0x01, ESC, ESC_END, ESC, ESC_ESC, END]
        );
    }

    #[test]
    fn test_round_trip_with_special_bytes() {
        let payload = vec![0x10, 0xC0, 0x20, 0xDB, 0xDB, 0xC0, 0x30];
        let mut framer = SlipFramer::new(256);
        let frames = framer.feed(&slip_encode(&payload));
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].bytes, payload);
        assert!(frames[0].complete);
        assert_eq!(frames[0].offset, 1);
    }

    #[test]
    fn test_escape_split_across_feeds() {
        let mut framer = SlipFramer::new(256);
        assert!(framer.feed(&[END, 0x01, ESC]).is_empty());
        let frames = framer.feed(&[ESC_END, END]);
        assert_eq!(frames[0].bytes, vec![0x01, END]);
    }

    #[test]
    fn test_invalid_escape_kept_literally() {
        let mut framer = SlipFramer::new(256);
        let frames = framer.feed(&[0x01, ESC, 0x42, 0x02, END]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].bytes, vec![0x01, ESC, 0x42, 0x02]);
        assert_eq!(frames[0].offset, 0);
    }

    #[test]
    fn test_offsets_across_frames() {
        let mut framer = SlipFramer::new(256);
        let mut stream = slip_encode(&[0xAA]);
        stream.extend(slip_encode(&[0xBB, 0xCC]));
        let frames = framer.feed(&stream);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].offset, 1);
        // Second frame follows END,AA,END,END
        assert_eq!(frames[1].offset, 4);
        assert_eq!(frames[1].bytes, vec![0xBB, 0xCC]);
    }

    #[test]
    fn test_flush_incomplete() {
        let mut framer = SlipFramer::new(256);
        framer.feed(&[END, 0x05, 0x06]);
        let tail = framer.flush().unwrap();
        assert_eq!(tail.bytes, vec![0x05, 0x06]);
        assert_eq!(tail.offset, 1);
        assert!(!tail.complete);
        assert!(framer.flush().is_none());
    }
}
