//! Append-only tuple list that spills to disk past a threshold.

use std::sync::Arc;

use spillway_common::types::Tuple;
use spillway_common::utils::error::{Error, Result};
use spillway_common::{ConfigError, SpillConfig};

use crate::spill::{SegmentReader, SpillManager, SpillSegment, SpillStats};

/// An ordered, append-only tuple buffer with bounded memory.
///
/// Appends go to an in-memory buffer. When the buffer reaches `threshold`
/// tuples it is written out as a new [`SpillSegment`] before `append`
/// returns, and a fresh buffer starts. Iteration replays the segments
/// oldest first and then the buffer, which is exactly append order.
///
/// One writer, then readers: [`iter`](Self::iter) borrows the list, so it
/// cannot be appended to while an iterator is alive.
///
/// # Examples
///
/// ```
/// use spillway_common::{SpillConfig, Tuple};
/// use spillway_core::collect::SpillableTupleList;
///
/// let config = SpillConfig::default().with_list_threshold(3);
/// let mut list = SpillableTupleList::new(&config)?;
/// for c in ["A", "B", "C", "D", "E"] {
///     list.append(Tuple::single(c))?;
/// }
///
/// assert_eq!(list.segment_count(), 1);
/// assert_eq!(list.in_memory_len(), 2);
///
/// let out: Vec<Tuple> = list.iter()?.collect::<Result<_, _>>()?;
/// assert_eq!(out.len(), 5);
/// # Ok::<(), spillway_common::Error>(())
/// ```
pub struct SpillableTupleList {
    threshold: usize,
    /// Finished runs, oldest first.
    segments: Vec<SpillSegment>,
    /// Current run.
    buffer: Vec<Tuple>,
    len: usize,
    closed: bool,
    manager: Arc<SpillManager>,
}

impl SpillableTupleList {
    /// Creates a list with its own spill manager.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an invalid configuration, or
    /// [`Error::SpillIo`] if the spill directory cannot be created.
    pub fn new(config: &SpillConfig) -> Result<Self> {
        config.validate()?;
        let manager = SpillManager::new(config)?;
        Ok(Self::from_parts(config.list_threshold, manager))
    }

    /// Creates a list that spills through a shared manager.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroListThreshold`] if `threshold` is zero.
    pub fn with_manager(threshold: usize, manager: Arc<SpillManager>) -> Result<Self> {
        if threshold == 0 {
            return Err(ConfigError::ZeroListThreshold.into());
        }
        Ok(Self::from_parts(threshold, manager))
    }

    pub(crate) fn from_parts(threshold: usize, manager: Arc<SpillManager>) -> Self {
        debug_assert!(threshold > 0);
        Self {
            threshold,
            segments: Vec::new(),
            buffer: Vec::new(),
            len: 0,
            closed: false,
            manager,
        }
    }

    /// Appends a tuple, spilling the current run if it reaches the
    /// threshold.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] after [`close`](Self::close), or a spill
    /// failure. A failed append leaves the list exactly as it was, so the
    /// same tuple can be appended again.
    pub fn append(&mut self, tuple: Tuple) -> Result<()> {
        self.ensure_open()?;
        self.buffer.push(tuple);
        self.len += 1;

        if self.buffer.len() >= self.threshold {
            if let Err(e) = self.spill() {
                self.pop_buffered();
                return Err(e);
            }
        }
        Ok(())
    }

    /// Takes back the most recently buffered tuple.
    pub(crate) fn pop_buffered(&mut self) -> Option<Tuple> {
        let tuple = self.buffer.pop()?;
        self.len -= 1;
        Some(tuple)
    }

    /// Appends every tuple from `tuples` in order.
    ///
    /// # Errors
    ///
    /// Stops at the first failing [`append`](Self::append).
    pub fn append_all<I>(&mut self, tuples: I) -> Result<()>
    where
        I: IntoIterator<Item = Tuple>,
    {
        tuples.into_iter().try_for_each(|t| self.append(t))
    }

    /// Writes the current run out as a segment now, returning how many
    /// tuples moved to disk. An empty run writes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] after close, or the spill failure. The run
    /// stays in memory if writing fails.
    pub fn spill(&mut self) -> Result<usize> {
        self.ensure_open()?;
        if self.buffer.is_empty() {
            return Ok(0);
        }

        let mut writer = self.manager.begin_segment()?;
        for tuple in &self.buffer {
            writer.write(tuple)?;
        }
        let segment = writer.close()?;

        let spilled = self.buffer.len();
        self.buffer = Vec::new();
        self.segments.push(segment);
        Ok(spilled)
    }

    /// Total tuples appended, spilled or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if nothing was appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Tuples currently held in memory.
    #[must_use]
    pub fn in_memory_len(&self) -> usize {
        self.buffer.len()
    }

    /// Number of spilled segments.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Spilled segments, oldest first.
    #[must_use]
    pub fn segments(&self) -> &[SpillSegment] {
        &self.segments
    }

    /// The in-memory tuple cap.
    #[must_use]
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Spill counters of the underlying manager (shared with any other
    /// collection using the same manager).
    #[must_use]
    pub fn stats(&self) -> SpillStats {
        self.manager.stats()
    }

    /// Returns `true` after [`close`](Self::close).
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Returns a fresh iterator over every tuple in append order.
    ///
    /// Each call re-opens the segments from the start.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] after close.
    pub fn iter(&self) -> Result<ListIter<'_>> {
        self.ensure_open()?;
        Ok(ListIter::new(&self.segments, &self.buffer))
    }

    /// Drops the buffered run and removes every segment file. Calling it
    /// again does nothing.
    ///
    /// # Errors
    ///
    /// Returns the first file removal failure; every segment is still
    /// released.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.buffer = Vec::new();

        let mut first_error = None;
        for segment in self.segments.drain(..) {
            if let Err(e) = segment.discard() {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Closed("SpillableTupleList"));
        }
        Ok(())
    }
}

impl std::fmt::Debug for SpillableTupleList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpillableTupleList")
            .field("threshold", &self.threshold)
            .field("len", &self.len)
            .field("in_memory", &self.buffer.len())
            .field("segments", &self.segments.len())
            .field("closed", &self.closed)
            .finish()
    }
}

/// Iterator over a [`SpillableTupleList`], spilled runs first.
///
/// Yields `Err` at most once; the iterator is exhausted after an error.
pub struct ListIter<'a> {
    segments: std::slice::Iter<'a, SpillSegment>,
    current: Option<SegmentReader>,
    buffer: std::slice::Iter<'a, Tuple>,
    remaining: usize,
    failed: bool,
}

impl<'a> ListIter<'a> {
    fn new(segments: &'a [SpillSegment], buffer: &'a [Tuple]) -> Self {
        let spilled: u64 = segments.iter().map(SpillSegment::tuple_count).sum();
        Self {
            segments: segments.iter(),
            current: None,
            buffer: buffer.iter(),
            remaining: usize::try_from(spilled).unwrap_or(usize::MAX) + buffer.len(),
            failed: false,
        }
    }

    /// An iterator with nothing in it.
    pub(crate) fn empty() -> Self {
        Self::new(&[], &[])
    }

    fn fail(&mut self, e: Error) -> Option<Result<Tuple>> {
        self.failed = true;
        self.current = None;
        Some(Err(e))
    }
}

impl Iterator for ListIter<'_> {
    type Item = Result<Tuple>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        loop {
            if let Some(reader) = self.current.as_mut() {
                match reader.next_tuple() {
                    Ok(Some(tuple)) => {
                        self.remaining = self.remaining.saturating_sub(1);
                        return Some(Ok(tuple));
                    }
                    Ok(None) => self.current = None,
                    Err(e) => return self.fail(e),
                }
            }

            match self.segments.next() {
                Some(segment) => match segment.open() {
                    Ok(reader) => self.current = Some(reader),
                    Err(e) => return self.fail(e),
                },
                None => {
                    let tuple = self.buffer.next()?;
                    self.remaining = self.remaining.saturating_sub(1);
                    return Some(Ok(tuple.clone()));
                }
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.failed {
            return (0, Some(0));
        }
        (0, Some(self.remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spillway_common::types::Value;

    fn letters(s: &str) -> Vec<Tuple> {
        s.chars().map(|c| Tuple::single(c.to_string())).collect()
    }

    fn list(threshold: usize) -> SpillableTupleList {
        SpillableTupleList::new(&SpillConfig::default().with_list_threshold(threshold)).unwrap()
    }

    fn collect(list: &SpillableTupleList) -> Vec<Tuple> {
        list.iter().unwrap().collect::<Result<_>>().unwrap()
    }

    #[test]
    fn test_threshold_three_five_appends() {
        let mut list = list(3);
        list.append_all(letters("ABCDE")).unwrap();

        assert_eq!(list.len(), 5);
        assert_eq!(list.segment_count(), 1);
        assert_eq!(list.segments()[0].tuple_count(), 3);
        assert_eq!(list.in_memory_len(), 2);
        assert_eq!(collect(&list), letters("ABCDE"));
    }

    #[test]
    fn test_exact_multiple_leaves_empty_buffer() {
        let mut list = list(4);
        list.append_all((0..12i64).map(Tuple::single)).unwrap();

        assert_eq!(list.segment_count(), 3);
        assert_eq!(list.in_memory_len(), 0);
        assert_eq!(collect(&list).len(), 12);
    }

    #[test]
    fn test_spill_is_eager() {
        let mut list = list(2);
        list.append(Tuple::single(1i64)).unwrap();
        assert_eq!(list.segment_count(), 0);
        list.append(Tuple::single(2i64)).unwrap();
        assert_eq!(list.segment_count(), 1);
        assert_eq!(list.in_memory_len(), 0);
    }

    #[test]
    fn test_threshold_one_spills_every_append() {
        let mut list = list(1);
        list.append_all(letters("XYZ")).unwrap();
        assert_eq!(list.segment_count(), 3);
        assert_eq!(collect(&list), letters("XYZ"));
    }

    #[test]
    fn test_under_threshold_is_pure_memory() {
        let mut list = list(100);
        list.append_all(letters("hello")).unwrap();
        assert_eq!(list.segment_count(), 0);
        assert_eq!(list.stats().segments_written, 0);
        assert_eq!(collect(&list), letters("hello"));
    }

    #[test]
    fn test_empty_run_creates_no_segment() {
        let mut list = list(3);
        list.append_all(Vec::new()).unwrap();
        assert_eq!(list.spill().unwrap(), 0);
        assert_eq!(list.segment_count(), 0);
        assert!(list.is_empty());
        assert_eq!(list.iter().unwrap().count(), 0);
    }

    #[test]
    fn test_forced_spill() {
        let mut list = list(100);
        list.append_all(letters("abc")).unwrap();
        assert_eq!(list.spill().unwrap(), 3);
        assert_eq!(list.in_memory_len(), 0);
        list.append_all(letters("d")).unwrap();
        assert_eq!(collect(&list), letters("abcd"));
    }

    #[test]
    fn test_iteration_is_repeatable() {
        let mut list = list(2);
        list.append_all(letters("abcde")).unwrap();

        let mut first = list.iter().unwrap();
        assert_eq!(first.next().unwrap().unwrap(), Tuple::single("a"));
        // A new iterator starts over regardless of the first one.
        assert_eq!(collect(&list), letters("abcde"));
        assert_eq!(first.count(), 4);
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let result = SpillableTupleList::new(&SpillConfig::default().with_list_threshold(0));
        assert!(matches!(result, Err(Error::Config(ConfigError::ZeroListThreshold))));

        let manager = SpillManager::new(&SpillConfig::default()).unwrap();
        let result = SpillableTupleList::with_manager(0, manager);
        assert!(matches!(result, Err(Error::Config(ConfigError::ZeroListThreshold))));
    }

    #[test]
    fn test_use_after_close() {
        let mut list = list(2);
        list.append_all(letters("abc")).unwrap();
        let path = list.segments()[0].path().to_path_buf();

        list.close().unwrap();
        assert!(list.is_closed());
        assert!(!path.exists());

        assert!(matches!(list.append(Tuple::single("x")), Err(Error::Closed(_))));
        assert!(matches!(list.iter(), Err(Error::Closed(_))));
        assert!(matches!(list.spill(), Err(Error::Closed(_))));

        // Idempotent.
        list.close().unwrap();
    }

    #[test]
    fn test_caller_copy_is_independent() {
        let mut list = list(10);
        let mut t = Tuple::single(1i64);
        list.append(t.clone()).unwrap();
        t.push(2i64);

        assert_eq!(collect(&list), vec![Tuple::single(1i64)]);
    }

    #[test]
    fn test_shared_manager_counts_both_lists() {
        let manager = SpillManager::new(&SpillConfig::default()).unwrap();
        let mut a = SpillableTupleList::with_manager(1, Arc::clone(&manager)).unwrap();
        let mut b = SpillableTupleList::with_manager(1, Arc::clone(&manager)).unwrap();
        a.append(Tuple::single(Value::Null)).unwrap();
        b.append(Tuple::single(Value::Null)).unwrap();

        assert_eq!(manager.stats().segments_written, 2);
        assert_ne!(a.segments()[0].id(), b.segments()[0].id());
    }

    #[test]
    fn test_size_hint_upper_bound() {
        let mut list = list(2);
        list.append_all(letters("abcde")).unwrap();
        let mut iter = list.iter().unwrap();
        assert_eq!(iter.size_hint(), (0, Some(5)));
        iter.next();
        iter.next();
        iter.next();
        assert_eq!(iter.size_hint(), (0, Some(2)));
    }

    #[test]
    fn test_missing_segment_file_surfaces_error() {
        let mut list = list(2);
        list.append_all(letters("abc")).unwrap();
        std::fs::remove_file(list.segments()[0].path()).unwrap();

        let mut iter = list.iter().unwrap();
        assert!(matches!(iter.next(), Some(Err(Error::SpillIo(_)))));
        assert!(iter.next().is_none());
    }

    fn partial_files(dir: &std::path::Path) -> usize {
        std::fs::read_dir(dir).map_or(0, |entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.file_name().to_string_lossy().ends_with(".partial"))
                .count()
        })
    }

    #[test]
    fn test_failed_spill_leaves_list_unchanged() {
        let mut list = list(2);
        list.append(Tuple::single("a")).unwrap();

        let dir = list.manager.dir().to_path_buf();
        std::fs::remove_dir_all(&dir).unwrap();

        let err = list.append(Tuple::single("b")).unwrap_err();
        assert!(err.is_spill_io(), "got {err:?}");
        assert_eq!(list.len(), 1);
        assert_eq!(list.in_memory_len(), 1);
        assert_eq!(list.segment_count(), 0);
        assert_eq!(partial_files(&dir), 0);
        assert_eq!(list.stats().segments_written, 0);

        // Once the directory is back, retrying stores the tuple exactly once.
        std::fs::create_dir(&dir).unwrap();
        list.append(Tuple::single("b")).unwrap();
        assert_eq!(list.segment_count(), 1);
        assert_eq!(partial_files(&dir), 0);
        assert_eq!(collect(&list), letters("ab"));
    }

    #[test]
    fn test_failed_forced_spill_keeps_buffer() {
        let mut list = list(10);
        list.append_all(letters("xyz")).unwrap();
        std::fs::remove_dir_all(list.manager.dir()).unwrap();

        assert!(matches!(list.spill(), Err(Error::SpillIo(_))));
        assert_eq!(list.in_memory_len(), 3);
        assert_eq!(collect(&list), letters("xyz"));
    }

    #[test]
    fn test_empty_iter() {
        assert_eq!(ListIter::empty().count(), 0);
    }
}
