//! Spill segments: immutable on-disk runs of tuples.
//!
//! A spillable collection that outgrows its in-memory threshold writes the
//! buffered run out as a segment and keeps going with an empty buffer. On
//! read the segments are replayed oldest first.
//!
//! # Architecture
//!
//! - [`SpillManager`] - Owns the spill directory and resolved codec, hands
//!   out segment ids, and keeps [`SpillStats`]
//! - [`SegmentWriter`] - Streams tuples into a new segment; only
//!   [`close`](SegmentWriter::close) makes it readable
//! - [`SpillSegment`] - A finished segment; its file is removed when the
//!   segment is discarded or dropped
//! - [`SegmentReader`] - Sequential cursor over one segment
//!
//! # File layout
//!
//! ```text
//! Segment := Header Body
//! Header  := magic "SPWSEG01" | codec tag: u8 | reserved: [u8; 7] | tuple count: u64
//! Body    := codec stream of Frame*
//! Frame   := length: u32 | bincode(Tuple) | crc32: u32
//! ```
//!
//! All integers are little-endian. The header is never compressed; its
//! tuple count is filled in when the writer closes. Segments are private to
//! the process that wrote them.

mod format;
mod manager;
mod reader;
mod segment;

pub use manager::{SpillManager, SpillStats};
pub use reader::SegmentReader;
pub use segment::{SegmentWriter, SpillSegment};
