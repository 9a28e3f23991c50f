//! Segmented byte buffers
//!
//! Output files can grow past what a single allocation should hold, so bytes
//! are kept as a list of frozen segments no larger than a fixed size. Readers
//! walk the segments in order; nothing is concatenated unless asked for.

use bytes::{Bytes, BytesMut};
use std::io::{self, Write};

use crate::config::DEFAULT_SEGMENT_SIZE;

#[derive(Debug, Clone)]
pub struct SegmentedBuffer {
    segments: Vec<Bytes>,
    current: BytesMut,
    segment_size: usize,
    len: u64,
}

impl SegmentedBuffer {
    pub fn new() -> Self {
        Self::with_segment_size(DEFAULT_SEGMENT_SIZE)
    }

    pub fn with_segment_size(segment_size: usize) -> Self {
        Self {
            segments: Vec::new(),
            current: BytesMut::new(),
            segment_size: segment_size.max(1),
            len: 0,
        }
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append bytes, sealing a segment each time it reaches the size cap
    pub fn append(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            let room = self.segment_size - self.current.len();
            let take = room.min(data.len());
            self.current.extend_from_slice(&data[..take]);
            self.len += take as u64;
            data = &data[take..];

            if self.current.len() == self.segment_size {
                self.segments.push(self.current.split().freeze());
            }
        }
    }

    /// Segments in order, the partially filled tail included
    pub fn segments(&self) -> impl Iterator<Item = &[u8]> {
        self.segments
            .iter()
            .map(|s| &s[..])
            .chain(std::iter::once(&self.current[..]))
            .filter(|s| !s.is_empty())
    }

    pub fn segment_count(&self) -> usize {
        self.segments().count()
    }

    /// Stream every segment into `writer`
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<u64> {
        for segment in self.segments() {
            writer.write_all(segment)?;
        }
        Ok(self.len)
    }

    /// Concatenate into one contiguous buffer
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len as usize);
        for segment in self.segments() {
            out.extend_from_slice(segment);
        }
        out
    }
}

impl Default for SegmentedBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Write for SegmentedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.append(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
