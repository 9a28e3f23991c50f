//! Size-bounded mbox file accumulation
//!
//! Records are appended to the current file until the next one would push it
//! past the ceiling (the joining `\n` included). Records are never split; a
//! record larger than the ceiling gets a file of its own.

use std::io::{self, Write};

use super::mbox::MboxRecord;
use super::segments::SegmentedBuffer;
use crate::config::DEFAULT_SEGMENT_SIZE;

const SEPARATOR: &[u8] = b"\n";

/// Records joined by a single newline, with no leading separator
#[derive(Debug, Clone)]
pub struct MboxFile {
    data: SegmentedBuffer,
    record_count: usize,
}

impl MboxFile {
    pub fn new(segment_size: usize) -> Self {
        Self {
            data: SegmentedBuffer::with_segment_size(segment_size),
            record_count: 0,
        }
    }

    pub fn len(&self) -> u64 {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.record_count == 0
    }

    pub fn record_count(&self) -> usize {
        self.record_count
    }

    /// Size after appending `record`
    pub fn len_with(&self, record: &MboxRecord) -> u64 {
        let separator = if self.is_empty() { 0 } else { SEPARATOR.len() };
        self.len() + separator as u64 + record.len() as u64
    }

    pub fn push(&mut self, record: MboxRecord) {
        if !self.is_empty() {
            self.data.append(SEPARATOR);
        }
        self.data.append(record.as_bytes());
        self.record_count += 1;
    }

    pub fn segments(&self) -> impl Iterator<Item = &[u8]> {
        self.data.segments()
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<u64> {
        self.data.write_to(writer)
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.data.to_vec()
    }
}

/// Splits a record sequence into files of at most `ceiling` bytes (0 = unbounded)
pub struct Accumulator {
    ceiling: u64,
    segment_size: usize,
    current: MboxFile,
    files: Vec<MboxFile>,
}

impl Accumulator {
    pub fn new(ceiling: u64) -> Self {
        Self::with_segment_size(ceiling, DEFAULT_SEGMENT_SIZE)
    }

    pub fn with_segment_size(ceiling: u64, segment_size: usize) -> Self {
        Self {
            ceiling,
            segment_size,
            current: MboxFile::new(segment_size),
            files: Vec::new(),
        }
    }

    pub fn push(&mut self, record: MboxRecord) {
        if self.ceiling > 0 && !self.current.is_empty() && self.current.len_with(&record) > self.ceiling {
            let full = std::mem::replace(&mut self.current, MboxFile::new(self.segment_size));
            self.files.push(full);
        }
        self.current.push(record);
    }

    pub fn finish(mut self) -> Vec<MboxFile> {
        if !self.current.is_empty() {
            self.files.push(self.current);
        }
        self.files
    }
}

/// Accumulate a whole record sequence at once
pub fn accumulate<I>(records: I, ceiling: u64) -> Vec<MboxFile>
where
    I: IntoIterator<Item = MboxRecord>,
{
    let mut accumulator = Accumulator::new(ceiling);
    for record in records {
        accumulator.push(record);
    }
    accumulator.finish()
}
