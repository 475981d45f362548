//! Spill directory, codec, and statistics shared by a set of segments.

use std::fs::{self, File, OpenOptions};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use spillway_common::SpillConfig;
use spillway_common::utils::error::Result;
use tempfile::TempDir;

use super::segment::SegmentWriter;
use crate::codec::{CodecRegistry, SpillCodec};

/// Counters describing spill activity, as a point-in-time snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SpillStats {
    /// Segments successfully closed.
    pub segments_written: u64,
    /// Segments whose files have been removed.
    pub segments_discarded: u64,
    /// Tuples written into closed segments.
    pub tuples_spilled: u64,
    /// Bytes on disk across closed segments, headers included.
    pub bytes_written: u64,
    /// Frame bytes before compression.
    pub raw_bytes: u64,
}

impl SpillStats {
    /// Segments written and not yet discarded.
    #[must_use]
    pub fn live_segments(&self) -> u64 {
        self.segments_written.saturating_sub(self.segments_discarded)
    }

    /// Raw bytes per on-disk byte (1.0 when nothing was written).
    #[must_use]
    pub fn compression_ratio(&self) -> f64 {
        if self.bytes_written == 0 {
            return 1.0;
        }
        self.raw_bytes as f64 / self.bytes_written as f64
    }
}

#[derive(Default)]
struct StatCounters {
    segments_written: AtomicU64,
    segments_discarded: AtomicU64,
    tuples_spilled: AtomicU64,
    bytes_written: AtomicU64,
    raw_bytes: AtomicU64,
}

/// Owns the spill directory and codec for a group of segments.
///
/// The directory is private to this manager and is removed, along with any
/// segment files still in it, when the last handle to the manager drops.
/// Every segment holds a handle, so the directory outlives its segments.
pub struct SpillManager {
    /// Private spill directory.
    dir: TempDir,
    /// Codec for every segment this manager creates.
    codec: Option<SpillCodec>,
    /// Next segment id.
    next_id: AtomicU64,
    stats: StatCounters,
}

impl SpillManager {
    /// Creates a manager using the built-in codec registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the spill directory cannot be created.
    pub fn new(config: &SpillConfig) -> Result<Arc<Self>> {
        Self::with_registry(config, &CodecRegistry::builtin())
    }

    /// Creates a manager resolving codecs against `registry`.
    ///
    /// The codec is resolved once here, before any segment exists. Each
    /// segment this manager creates records it in its header.
    ///
    /// # Errors
    ///
    /// Returns an error if the spill directory cannot be created.
    pub fn with_registry(config: &SpillConfig, registry: &CodecRegistry) -> Result<Arc<Self>> {
        let codec = registry.resolve(config.codecs.as_slice(), config.compress);

        let mut builder = tempfile::Builder::new();
        builder.prefix("spillway-");
        let dir = match &config.spill_dir {
            Some(parent) => {
                fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)?
            }
            None => builder.tempdir()?,
        };

        tracing::debug!(
            dir = %dir.path().display(),
            codec = codec.map_or("none", |c| c.name()),
            "created spill manager"
        );

        Ok(Arc::new(Self {
            dir,
            codec,
            next_id: AtomicU64::new(0),
            stats: StatCounters::default(),
        }))
    }

    /// Returns the codec new segments are written with.
    #[must_use]
    pub fn codec(&self) -> Option<SpillCodec> {
        self.codec
    }

    /// Returns the spill directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Starts a new segment.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing file cannot be created.
    pub fn begin_segment(self: &Arc<Self>) -> Result<SegmentWriter> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        SegmentWriter::create(Arc::clone(self), id, self.codec)
    }

    /// Returns a snapshot of the spill counters.
    #[must_use]
    pub fn stats(&self) -> SpillStats {
        SpillStats {
            segments_written: self.stats.segments_written.load(Ordering::Relaxed),
            segments_discarded: self.stats.segments_discarded.load(Ordering::Relaxed),
            tuples_spilled: self.stats.tuples_spilled.load(Ordering::Relaxed),
            bytes_written: self.stats.bytes_written.load(Ordering::Relaxed),
            raw_bytes: self.stats.raw_bytes.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn segment_path(&self, id: u64) -> PathBuf {
        self.dir.path().join(format!("{id:08}.spill"))
    }

    pub(crate) fn partial_path(&self, id: u64) -> PathBuf {
        self.dir.path().join(format!("{id:08}.spill.partial"))
    }

    pub(crate) fn create_file(&self, path: &Path) -> Result<BufWriter<File>> {
        let file = OpenOptions::new()
            .create_new(true)
            .read(true)
            .write(true)
            .open(path)?;
        Ok(BufWriter::new(file))
    }

    pub(crate) fn record_written(&self, tuples: u64, bytes: u64, raw_bytes: u64) {
        self.stats.segments_written.fetch_add(1, Ordering::Relaxed);
        self.stats.tuples_spilled.fetch_add(tuples, Ordering::Relaxed);
        self.stats.bytes_written.fetch_add(bytes, Ordering::Relaxed);
        self.stats.raw_bytes.fetch_add(raw_bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_discarded(&self) {
        self.stats.segments_discarded.fetch_add(1, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for SpillManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpillManager")
            .field("dir", &self.dir.path())
            .field("codec", &self.codec)
            .field("stats", &self.stats())
            .finish()
    }
}
