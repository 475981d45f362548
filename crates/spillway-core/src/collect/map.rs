//! Key-partitioned tuple map with an aggregate memory bound.

use std::collections::BTreeMap;
use std::hash::Hash;
use std::sync::Arc;

use indexmap::{Equivalent, IndexMap};
use spillway_common::types::Tuple;
use spillway_common::utils::error::{Error, Result};
use spillway_common::{PartitionSpillPolicy, SpillConfig};

use super::list::{ListIter, SpillableTupleList};
use crate::spill::{SpillManager, SpillStats};

type PartitionTable<K> = IndexMap<K, Partition, ahash::RandomState>;

struct Partition {
    list: SpillableTupleList,
    /// Logical clock value of the most recent append.
    last_append: u64,
}

/// Groups tuples by key, keeping at most `threshold` tuples in memory
/// across all keys.
///
/// Each key owns a [`SpillableTupleList`] (its partition). After every
/// [`put`](Self::put), while the map holds more than `threshold` tuples in
/// memory, one partition is chosen by the configured
/// [`PartitionSpillPolicy`] and its buffer is spilled. Keys iterate in first
/// insertion order.
///
/// All partitions share one [`SpillManager`], so the whole map spills into
/// one private directory.
///
/// # Examples
///
/// ```
/// use spillway_common::{SpillConfig, Tuple};
/// use spillway_core::collect::SpillableTupleMap;
///
/// let config = SpillConfig::default().with_map_threshold(2);
/// let mut map = SpillableTupleMap::new(&config)?;
///
/// let (x, y) = (Tuple::single("x"), Tuple::single("y"));
/// map.put(x.clone(), Tuple::single(1i64))?;
/// map.put(y.clone(), Tuple::single(1i64))?;
/// map.put(x.clone(), Tuple::single(2i64))?;
///
/// assert_eq!(map.len(), 3);
/// assert!(map.in_memory_len() <= 2);
///
/// let xs: Vec<Tuple> = map.iter_key(&x)?.collect::<Result<_, _>>()?;
/// assert_eq!(xs, vec![Tuple::single(1i64), Tuple::single(2i64)]);
/// # Ok::<(), spillway_common::Error>(())
/// ```
pub struct SpillableTupleMap<K = Tuple> {
    threshold: usize,
    list_threshold: usize,
    policy: PartitionSpillPolicy,
    partitions: PartitionTable<K>,
    /// Append clock to partition index, for partitions with buffered tuples.
    /// The first entry is the least recently appended one.
    recency: BTreeMap<u64, usize>,
    clock: u64,
    in_memory: usize,
    len: usize,
    closed: bool,
    manager: Arc<SpillManager>,
}

impl<K: Hash + Eq> SpillableTupleMap<K> {
    /// Creates a map with its own spill manager.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an invalid configuration, or
    /// [`Error::SpillIo`] if the spill directory cannot be created.
    pub fn new(config: &SpillConfig) -> Result<Self> {
        config.validate()?;
        let manager = SpillManager::new(config)?;
        Self::with_manager(config, manager)
    }

    /// Creates a map spilling through a shared manager. The manager's codec
    /// applies; the rest of `config` sizes the map.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an invalid configuration.
    pub fn with_manager(config: &SpillConfig, manager: Arc<SpillManager>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            threshold: config.map_threshold,
            list_threshold: config.list_threshold,
            policy: config.spill_policy,
            partitions: IndexMap::with_capacity_and_hasher(
                config.map_capacity_hint(),
                ahash::RandomState::new(),
            ),
            recency: BTreeMap::new(),
            clock: 0,
            in_memory: 0,
            len: 0,
            closed: false,
            manager,
        })
    }

    /// Appends `tuple` to the partition for `key`, creating the partition
    /// on first use, then spills partitions until the map is back within
    /// its threshold.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] after [`close`](Self::close), or a spill
    /// failure. A failed put leaves the map exactly as it was: the tuple is
    /// not stored and a partition created for it is removed again.
    pub fn put(&mut self, key: K, tuple: Tuple) -> Result<()> {
        self.ensure_open()?;

        let manager = &self.manager;
        let list_threshold = self.list_threshold;
        let entry = self.partitions.entry(key);
        let index = entry.index();
        let created = matches!(entry, indexmap::map::Entry::Vacant(_));
        let partition = entry.or_insert_with(|| Partition {
            list: SpillableTupleList::from_parts(list_threshold, Arc::clone(manager)),
            last_append: 0,
        });

        let previous = partition.last_append;
        let mem_before = partition.list.in_memory_len();
        if let Err(e) = partition.list.append(tuple) {
            if created {
                self.partitions.pop();
            }
            return Err(e);
        }
        let mem_after = partition.list.in_memory_len();

        self.clock += 1;
        let now = self.clock;
        self.recency.remove(&previous);
        partition.last_append = now;
        if mem_after > 0 {
            self.recency.insert(now, index);
        }
        // The list may have spilled its own run during the append.
        self.in_memory = self.in_memory - mem_before + mem_after;
        self.len += 1;

        // The map was within its threshold before this put, so at most one
        // spill is attempted here and a failed one has changed nothing else.
        match self.enforce_threshold() {
            Err(e) if mem_after > 0 => {
                self.undo_put(index, created, previous, mem_before, now);
                Err(e)
            }
            result => result,
        }
    }

    /// Takes back a put whose tuple is still the last one buffered in the
    /// partition at `index`.
    fn undo_put(&mut self, index: usize, created: bool, previous: u64, mem_before: usize, now: u64) {
        if let Some((_, partition)) = self.partitions.get_index_mut(index) {
            partition.list.pop_buffered();
            partition.last_append = previous;
        }
        self.recency.remove(&now);
        if mem_before > 0 {
            self.recency.insert(previous, index);
        }
        self.in_memory -= 1;
        self.len -= 1;
        if created {
            self.partitions.pop();
        }
    }

    /// Returns the partition for `key`.
    pub fn get<Q>(&self, key: &Q) -> Option<&SpillableTupleList>
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        self.partitions.get(key).map(|p| &p.list)
    }

    /// Returns `true` if any tuple was put under `key`.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        self.partitions.contains_key(key)
    }

    /// Iterates the tuples put under `key`, in put order. An unknown key
    /// yields nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] after close.
    pub fn iter_key<Q>(&self, key: &Q) -> Result<ListIter<'_>>
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        self.ensure_open()?;
        match self.partitions.get(key) {
            Some(partition) => partition.list.iter(),
            None => Ok(ListIter::empty()),
        }
    }

    /// Keys in first insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.partitions.keys()
    }

    /// Partitions in first insertion order of their keys.
    pub fn partitions(&self) -> impl Iterator<Item = (&K, &SpillableTupleList)> {
        self.partitions.iter().map(|(k, p)| (k, &p.list))
    }

    /// Total tuples put, spilled or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if nothing was put.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Tuples held in memory across all partitions.
    #[must_use]
    pub fn in_memory_len(&self) -> usize {
        self.in_memory
    }

    /// Number of distinct keys.
    #[must_use]
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Spilled segments across all partitions.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.partitions.values().map(|p| p.list.segment_count()).sum()
    }

    /// The aggregate in-memory tuple cap.
    #[must_use]
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// The partition selection policy.
    #[must_use]
    pub fn policy(&self) -> PartitionSpillPolicy {
        self.policy
    }

    /// Spill counters of the underlying manager.
    #[must_use]
    pub fn stats(&self) -> SpillStats {
        self.manager.stats()
    }

    /// Returns `true` after [`close`](Self::close).
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Closes every partition, removing all spill files. Calling it again
    /// does nothing.
    ///
    /// # Errors
    ///
    /// Returns the first partition close failure; every partition is still
    /// closed.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.recency.clear();
        self.in_memory = 0;

        let mut first_error = None;
        for partition in self.partitions.values_mut() {
            if let Err(e) = partition.list.close() {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn enforce_threshold(&mut self) -> Result<()> {
        while self.in_memory > self.threshold {
            let Some(index) = self.select_victim() else {
                break;
            };
            let Some((_, partition)) = self.partitions.get_index_mut(index) else {
                break;
            };

            let spilled = partition.list.spill()?;
            self.recency.remove(&partition.last_append);
            self.in_memory -= spilled;

            tracing::debug!(
                partition = index,
                tuples = spilled,
                in_memory = self.in_memory,
                policy = %self.policy,
                "spilled map partition"
            );
        }
        Ok(())
    }

    fn select_victim(&self) -> Option<usize> {
        match self.policy {
            PartitionSpillPolicy::LeastRecentlyAppended => self.recency.values().next().copied(),
            PartitionSpillPolicy::LargestBuffer => self
                .partitions
                .values()
                .enumerate()
                .filter(|(_, p)| p.list.in_memory_len() > 0)
                // Ties go to the earliest partition.
                .max_by(|(ia, a), (ib, b)| {
                    a.list
                        .in_memory_len()
                        .cmp(&b.list.in_memory_len())
                        .then(ib.cmp(ia))
                })
                .map(|(index, _)| index),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Closed("SpillableTupleMap"));
        }
        Ok(())
    }
}

impl<K> std::fmt::Debug for SpillableTupleMap<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpillableTupleMap")
            .field("threshold", &self.threshold)
            .field("policy", &self.policy)
            .field("partitions", &self.partitions.len())
            .field("len", &self.len)
            .field("in_memory", &self.in_memory)
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spillway_common::ConfigError;

    fn config(threshold: usize) -> SpillConfig {
        SpillConfig::default()
            .with_map_threshold(threshold)
            .with_map_initial_capacity(16)
    }

    fn values(map: &SpillableTupleMap, key: &Tuple) -> Vec<Tuple> {
        map.iter_key(key).unwrap().collect::<Result<_>>().unwrap()
    }

    fn buffered(map: &SpillableTupleMap) -> usize {
        map.partitions().map(|(_, l)| l.in_memory_len()).sum()
    }

    #[test]
    fn test_two_keys_threshold_two() {
        let mut map = SpillableTupleMap::new(&config(2)).unwrap();
        let (x, y) = (Tuple::single("x"), Tuple::single("y"));

        map.put(x.clone(), Tuple::single(1i64)).unwrap();
        map.put(y.clone(), Tuple::single(1i64)).unwrap();
        map.put(x.clone(), Tuple::single(2i64)).unwrap();

        assert_eq!(map.len(), 3);
        assert_eq!(map.partition_count(), 2);
        assert!(map.in_memory_len() <= 2);
        assert_eq!(values(&map, &x), vec![Tuple::single(1i64), Tuple::single(2i64)]);
        assert_eq!(values(&map, &y), vec![Tuple::single(1i64)]);

        // y was touched least recently, so it went to disk.
        assert_eq!(map.get(&y).unwrap().segment_count(), 1);
        assert_eq!(map.get(&x).unwrap().segment_count(), 0);
    }

    #[test]
    fn test_memory_bound_after_every_put() {
        let mut map = SpillableTupleMap::new(&config(5)).unwrap();
        for i in 0..200i64 {
            map.put(Tuple::single(i % 7), Tuple::single(i)).unwrap();
            assert!(map.in_memory_len() <= 5);
            assert_eq!(map.in_memory_len(), buffered(&map));
        }
        assert_eq!(map.len(), 200);
        assert_eq!(map.partition_count(), 7);

        for k in 0..7i64 {
            let got = values(&map, &Tuple::single(k));
            let want: Vec<Tuple> = (0..200i64).filter(|i| i % 7 == k).map(Tuple::single).collect();
            assert_eq!(got, want);
        }
    }

    #[test]
    fn test_largest_buffer_policy() {
        let config = config(3).with_spill_policy(PartitionSpillPolicy::LargestBuffer);
        let mut map = SpillableTupleMap::new(&config).unwrap();
        let (a, b) = (Tuple::single("a"), Tuple::single("b"));

        map.put(a.clone(), Tuple::single(1i64)).unwrap();
        map.put(a.clone(), Tuple::single(2i64)).unwrap();
        map.put(b.clone(), Tuple::single(3i64)).unwrap();
        map.put(b.clone(), Tuple::single(4i64)).unwrap();

        // Both partitions hold two; the earlier one is spilled.
        assert_eq!(map.get(&a).unwrap().segment_count(), 1);
        assert_eq!(map.get(&b).unwrap().segment_count(), 0);
        assert_eq!(map.in_memory_len(), 2);
    }

    #[test]
    fn test_keys_in_insertion_order() {
        let mut map = SpillableTupleMap::new(&config(100)).unwrap();
        for k in ["c", "a", "b", "a", "c"] {
            map.put(Tuple::single(k), Tuple::single(k)).unwrap();
        }
        let keys: Vec<_> = map.keys().cloned().collect();
        assert_eq!(keys, vec![Tuple::single("c"), Tuple::single("a"), Tuple::single("b")]);
    }

    #[test]
    fn test_unknown_key_is_empty() {
        let map: SpillableTupleMap = SpillableTupleMap::new(&config(4)).unwrap();
        assert!(map.get(&Tuple::single("nope")).is_none());
        assert!(!map.contains_key(&Tuple::single("nope")));
        assert_eq!(map.iter_key(&Tuple::single("nope")).unwrap().count(), 0);
        assert!(map.is_empty());
    }

    #[test]
    fn test_partition_list_threshold_applies() {
        let config = config(1000).with_list_threshold(2);
        let mut map = SpillableTupleMap::new(&config).unwrap();
        for i in 0..5i64 {
            map.put(Tuple::single("k"), Tuple::single(i)).unwrap();
        }
        assert_eq!(map.segment_count(), 2);
        assert_eq!(map.in_memory_len(), 1);
        assert_eq!(map.in_memory_len(), buffered(&map));
    }

    #[test]
    fn test_non_tuple_keys() {
        let mut map: SpillableTupleMap<String> = SpillableTupleMap::new(&config(1)).unwrap();
        map.put("left".to_string(), Tuple::single(1i64)).unwrap();
        map.put("right".to_string(), Tuple::single(2i64)).unwrap();

        assert!(map.contains_key("left"));
        let left: Vec<Tuple> = map.iter_key("left").unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(left, vec![Tuple::single(1i64)]);
    }

    #[test]
    fn test_failed_map_spill_rolls_back_put() {
        let mut map = SpillableTupleMap::new(&config(1)).unwrap();
        let (x, y) = (Tuple::single("x"), Tuple::single("y"));
        map.put(x.clone(), Tuple::single(1i64)).unwrap();

        let dir = map.manager.dir().to_path_buf();
        std::fs::remove_dir_all(&dir).unwrap();

        let err = map.put(y.clone(), Tuple::single(1i64)).unwrap_err();
        assert!(err.is_spill_io(), "got {err:?}");
        assert_eq!(map.len(), 1);
        assert_eq!(map.in_memory_len(), 1);
        assert_eq!(map.in_memory_len(), buffered(&map));
        assert_eq!(map.partition_count(), 1);
        assert!(!map.contains_key(&y));
        assert_eq!(map.get(&x).unwrap().segment_count(), 0);

        std::fs::create_dir(&dir).unwrap();
        map.put(y.clone(), Tuple::single(1i64)).unwrap();
        assert_eq!(map.len(), 2);
        // x is still the least recently appended partition.
        assert_eq!(map.get(&x).unwrap().segment_count(), 1);
        assert_eq!(map.get(&y).unwrap().segment_count(), 0);
        assert_eq!(values(&map, &x), vec![Tuple::single(1i64)]);
        assert_eq!(values(&map, &y), vec![Tuple::single(1i64)]);
    }

    #[test]
    fn test_failed_partition_spill_rolls_back_put() {
        let config = config(100).with_list_threshold(1);
        let mut map = SpillableTupleMap::new(&config).unwrap();
        let (k, z) = (Tuple::single("k"), Tuple::single("z"));
        map.put(k.clone(), Tuple::single(1i64)).unwrap();

        let dir = map.manager.dir().to_path_buf();
        std::fs::remove_dir_all(&dir).unwrap();

        assert!(map.put(k.clone(), Tuple::single(2i64)).unwrap_err().is_spill_io());
        assert!(map.put(z.clone(), Tuple::single(1i64)).unwrap_err().is_spill_io());
        assert_eq!(map.len(), 1);
        assert_eq!(map.in_memory_len(), 0);
        assert_eq!(map.partition_count(), 1);
        assert!(!map.contains_key(&z));
        assert_eq!(map.get(&k).unwrap().len(), 1);

        std::fs::create_dir(&dir).unwrap();
        map.put(k.clone(), Tuple::single(2i64)).unwrap();
        map.put(z.clone(), Tuple::single(1i64)).unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(values(&map, &k), vec![Tuple::single(1i64), Tuple::single(2i64)]);
        assert_eq!(values(&map, &z), vec![Tuple::single(1i64)]);
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let result = SpillableTupleMap::<Tuple>::new(&config(0));
        assert!(matches!(result, Err(Error::Config(ConfigError::ZeroMapThreshold))));
    }

    #[test]
    fn test_use_after_close() {
        let mut map = SpillableTupleMap::new(&config(1)).unwrap();
        let key = Tuple::single("k");
        map.put(key.clone(), Tuple::single(1i64)).unwrap();
        map.put(key.clone(), Tuple::single(2i64)).unwrap();
        let written = map.stats().segments_written;
        assert!(written > 0);

        map.close().unwrap();
        assert!(map.is_closed());
        assert_eq!(map.stats().segments_discarded, written);
        assert!(matches!(map.put(key.clone(), Tuple::single(3i64)), Err(Error::Closed(_))));
        assert!(matches!(map.iter_key(&key), Err(Error::Closed(_))));
        assert!(matches!(map.get(&key).unwrap().iter(), Err(Error::Closed(_))));

        map.close().unwrap();
    }
}
