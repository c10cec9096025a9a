//! Delimiter framing

use super::{FramedBytes, StreamFramer};

/// Splits a stream on a delimiter byte sequence, or when a frame reaches the
/// length cap
#[derive(Debug)]
pub struct RawFramer {
    delimiter: Vec<u8>,
    max_frame_length: usize,
    include_delimiter: bool,
    buffer: Vec<u8>,
    /// Stream offset of `buffer[0]`
    buffer_offset: u64,
    /// Total bytes consumed
    position: u64,
}

impl RawFramer {
    pub fn new(delimiter: Vec<u8>, max_frame_length: usize, include_delimiter: bool) -> Self {
        Self {
            delimiter,
            max_frame_length: max_frame_length.max(1),
            include_delimiter,
            buffer: Vec::new(),
            buffer_offset: 0,
            position: 0,
        }
    }

    fn take(&mut self, complete: bool) -> FramedBytes {
        FramedBytes {
            bytes: std::mem::take(&mut self.buffer),
            offset: self.buffer_offset,
            complete,
        }
    }
}

impl StreamFramer for RawFramer {
    fn feed(&mut self, data: &[u8]) -> Vec<FramedBytes> {
        let mut frames = Vec::new();

        for &byte in data {
            if self.buffer.is_empty() {
                self.buffer_offset = self.position;
            }
            self.buffer.push(byte);
            self.position += 1;

            if !self.delimiter.is_empty() && self.buffer.ends_with(&self.delimiter) {
                let mut frame = self.take(true);
                if !self.include_delimiter {
                    frame.bytes.truncate(frame.bytes.len() - self.delimiter.len());
                }
                // Back-to-back delimiters produce no empty frames
                if !frame.bytes.is_empty() {
                    frames.push(frame);
                }
            } else if self.buffer.len() >= self.max_frame_length {
                log::trace!("Raw frame reached {} bytes, splitting", self.max_frame_length);
                frames.push(self.take(false));
            }
        }

        frames
    }

    fn flush(&mut self) -> Option<FramedBytes> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(self.take(false))
        }
    }

    fn reset(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_on_multi_byte_delimiter() {
        let mut framer = RawFramer::new(b"\r\n".to_vec(), 64, false);
        let frames = framer.feed(b"AT\r\nOK\r");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].bytes, b"AT");
        assert_eq!(frames[0].offset, 0);

        let frames = framer.feed(b"\n\r\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].bytes, b"OK");
        assert_eq!(frames[0].offset, 4);
    }

    #[test]
    fn test_include_delimiter() {
        let mut framer = RawFramer::new(vec![0x00], 64, true);
        let frames = framer.feed(&[0x01, 0x02, 0x00]);
        assert_eq!(frames[0].bytes, vec![0x01, 0x02, 0x00]);
    }

    #[test]
    fn test_max_length_split() {
        let mut framer = RawFramer::new(Vec::new(), 3, false);
        let frames = framer.feed(&[1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].bytes, vec![4, 5, 6]);
        assert_eq!(frames[1].offset, 3);
        assert!(!frames[1].complete);

        let tail = framer.flush().unwrap();
        assert_eq!(tail.bytes, vec![7]);
        assert_eq!(tail.offset, 6);
        assert!(framer.flush().is_none());
    }
}
