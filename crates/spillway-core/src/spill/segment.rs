//! Segment writer and finished segments.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use spillway_common::types::Tuple;
use spillway_common::utils::error::{Error, Result};

use super::format::{self, SegmentHeader};
use super::manager::SpillManager;
use super::reader::SegmentReader;
use crate::codec::{CodecWriter, SpillCodec};

/// Streams tuples into a new segment.
///
/// The file lives under a `.partial` name until [`close`](Self::close)
/// completes; dropping the writer without closing it deletes the file, so
/// an interrupted spill never produces a readable segment.
pub struct SegmentWriter {
    id: u64,
    codec: Option<SpillCodec>,
    partial_path: PathBuf,
    out: Option<CodecWriter<BufWriter<File>>>,
    tuple_count: u64,
    raw_bytes: u64,
    scratch: Vec<u8>,
    committed: bool,
    manager: Arc<SpillManager>,
}

impl SegmentWriter {
    pub(crate) fn create(manager: Arc<SpillManager>, id: u64, codec: Option<SpillCodec>) -> Result<Self> {
        let partial_path = manager.partial_path(id);
        let mut file = manager.create_file(&partial_path)?;

        let mut writer = Self {
            id,
            codec,
            partial_path,
            out: None,
            tuple_count: 0,
            raw_bytes: 0,
            scratch: Vec::new(),
            committed: false,
            manager,
        };

        // Placeholder header; the count is patched in on close. From here on
        // a failure drops `writer`, which removes the partial file.
        SegmentHeader { codec, tuple_count: 0 }.write_to(&mut file)?;
        writer.out = Some(CodecWriter::new(file, codec)?);

        tracing::trace!(segment = id, "began spill segment");
        Ok(writer)
    }

    /// Appends one tuple.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SpillIo`] if the write fails, or
    /// [`Error::Serialization`] if the tuple cannot be encoded.
    pub fn write(&mut self, tuple: &Tuple) -> Result<()> {
        let out = self
            .out
            .as_mut()
            .ok_or(Error::Closed("SegmentWriter"))?;
        let written = format::write_frame(out, tuple, &mut self.scratch)?;
        self.tuple_count += 1;
        self.raw_bytes += written as u64;
        Ok(())
    }

    /// Returns the number of tuples written so far.
    #[must_use]
    pub fn tuple_count(&self) -> u64 {
        self.tuple_count
    }

    /// Finalizes the segment and makes it readable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SpillIo`] if flushing, patching the header, or
    /// publishing the file fails. The partial file is removed in that case.
    pub fn close(mut self) -> Result<SpillSegment> {
        let out = self.out.take().ok_or(Error::Closed("SegmentWriter"))?;

        let mut file = out
            .finish()?
            .into_inner()
            .map_err(io::IntoInnerError::into_error)?;
        let bytes = file.seek(SeekFrom::End(0))?;
        file.seek(SeekFrom::Start(0))?;
        SegmentHeader {
            codec: self.codec,
            tuple_count: self.tuple_count,
        }
        .write_to(&mut file)?;
        file.flush()?;
        drop(file);

        let path = self.manager.segment_path(self.id);
        fs::rename(&self.partial_path, &path)?;
        self.committed = true;

        self.manager
            .record_written(self.tuple_count, bytes, self.raw_bytes);
        tracing::debug!(
            segment = self.id,
            tuples = self.tuple_count,
            bytes,
            raw_bytes = self.raw_bytes,
            codec = self.codec.map_or("none", |c| c.name()),
            "spilled segment"
        );

        Ok(SpillSegment {
            id: self.id,
            path,
            codec: self.codec,
            tuple_count: self.tuple_count,
            bytes,
            discarded: false,
            manager: Arc::clone(&self.manager),
        })
    }
}

impl Drop for SegmentWriter {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        // Close the handle before unlinking.
        self.out = None;
        if let Err(e) = fs::remove_file(&self.partial_path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(segment = self.id, error = %e, "failed to remove partial spill segment");
            }
        }
    }
}

/// A closed, immutable spill segment.
///
/// The segment owns its file: [`discard`](Self::discard) removes it and
/// reports failures, dropping the segment removes it on a best-effort basis.
pub struct SpillSegment {
    id: u64,
    path: PathBuf,
    codec: Option<SpillCodec>,
    tuple_count: u64,
    bytes: u64,
    discarded: bool,
    manager: Arc<SpillManager>,
}

impl SpillSegment {
    /// Returns the segment id, unique within its manager.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the number of tuples in the segment.
    #[must_use]
    pub fn tuple_count(&self) -> u64 {
        self.tuple_count
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Returns the codec the segment was written with.
    #[must_use]
    pub fn codec(&self) -> Option<SpillCodec> {
        self.codec
    }

    /// Returns the path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens a cursor at the first tuple.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or its header does not
    /// match this segment.
    pub fn open(&self) -> Result<SegmentReader> {
        let mut reader = BufReader::new(File::open(&self.path)?);
        let header = SegmentHeader::read_from(&mut reader)?;
        if header.codec != self.codec || header.tuple_count != self.tuple_count {
            return Err(Error::Corruption(format!(
                "segment {} header does not match its writer",
                self.id
            )));
        }

        tracing::trace!(segment = self.id, tuples = self.tuple_count, "opened spill segment");
        SegmentReader::new(self.id, reader, header)
    }

    /// Removes the backing file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SpillIo`] if the file exists but cannot be removed.
    pub fn discard(mut self) -> Result<()> {
        self.discarded = true;
        self.manager.record_discarded();
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

impl Drop for SpillSegment {
    fn drop(&mut self) {
        if self.discarded {
            return;
        }
        self.manager.record_discarded();
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(segment = self.id, error = %e, "failed to remove spill segment");
            }
        }
    }
}

impl std::fmt::Debug for SpillSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpillSegment")
            .field("id", &self.id)
            .field("tuple_count", &self.tuple_count)
            .field("bytes", &self.bytes)
            .field("codec", &self.codec)
            .finish()
    }
}
