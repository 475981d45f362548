//! Bounded-memory tuple collections.
//!
//! - [`SpillableTupleList`] - append-only, ordered, spills whole runs
//! - [`SpillableTupleMap`] - per-key lists under one aggregate memory cap
//!
//! Both follow a single-writer discipline: all appends happen before any
//! reads. For lists the borrow checker enforces this, since an iterator
//! borrows the list.

mod list;
mod map;

pub use list::{ListIter, SpillableTupleList};
pub use map::SpillableTupleMap;
