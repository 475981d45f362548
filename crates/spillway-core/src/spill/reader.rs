//! Sequential segment cursor.

use std::fs::File;
use std::io::BufReader;

use spillway_common::types::Tuple;
use spillway_common::utils::error::Result;

use super::format::{self, SegmentHeader};
use crate::codec::CodecReader;

/// Forward-only cursor over the tuples of one segment.
///
/// Yields exactly as many tuples as the header records. After the first
/// error the cursor is exhausted.
pub struct SegmentReader {
    id: u64,
    inner: CodecReader<BufReader<File>>,
    remaining: u64,
    scratch: Vec<u8>,
}

impl SegmentReader {
    pub(crate) fn new(id: u64, reader: BufReader<File>, header: SegmentHeader) -> Result<Self> {
        Ok(Self {
            id,
            inner: CodecReader::new(reader, header.codec)?,
            remaining: header.tuple_count,
            scratch: Vec::new(),
        })
    }

    /// Returns the next tuple, or `None` at the end of the segment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corruption`](spillway_common::Error::Corruption) for
    /// damaged data and [`Error::SpillIo`](spillway_common::Error::SpillIo)
    /// if the file cannot be read.
    pub fn next_tuple(&mut self) -> Result<Option<Tuple>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        match format::read_frame(&mut self.inner, &mut self.scratch) {
            Ok(tuple) => {
                self.remaining -= 1;
                Ok(Some(tuple))
            }
            Err(e) => {
                tracing::warn!(segment = self.id, error = %e, "failed to read spill segment");
                self.remaining = 0;
                Err(e)
            }
        }
    }

    /// Returns the number of tuples not yet read.
    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

impl Iterator for SegmentReader {
    type Item = Result<Tuple>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_tuple().transpose()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = usize::try_from(self.remaining).unwrap_or(usize::MAX);
        (0, Some(n))
    }
}
