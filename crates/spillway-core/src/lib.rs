//! # spillway-core
//!
//! Core layer for Spillway: bounded-memory tuple collections that spill to
//! compressed disk segments.
//!
//! This crate holds the whole spill engine. It depends only on
//! `spillway-common`.
//!
//! ## Modules
//!
//! - [`codec`] - Codec registry and streaming compression (LZ4, Zstd)
//! - [`spill`] - Spill segments: writer, reader, and the owning manager
//! - [`collect`] - Spillable tuple list and map
//! - [`transform`] - Per-tuple transforms applied while reading

pub mod codec;
pub mod collect;
pub mod spill;
pub mod transform;

// Re-export commonly used types
pub use codec::{CodecAvailability, CodecRegistry, SpillCodec};
pub use collect::{ListIter, SpillableTupleList, SpillableTupleMap};
pub use spill::{SpillManager, SpillStats};
pub use transform::{ProjectExpr, ProjectTransform, TransformExt, TupleTransform};
