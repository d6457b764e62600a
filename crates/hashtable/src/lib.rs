use std::collections::hash_map::RandomState;
use std::collections::VecDeque;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

use parking_lot::Mutex;

/// Shared handle to a bucket. Multiple directory slots may refer to the
/// same bucket; the bucket is freed when the last slot drops its handle.
type BucketRef<K, V> = Arc<Mutex<Bucket<K, V>>>;

struct Bucket<K, V> {
    entries: VecDeque<(K, V)>,
    capacity: usize,
    local_depth: usize,
}

impl<K, V> Bucket<K, V> {
    fn new(capacity: usize, local_depth: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            local_depth,
        }
    }

    fn shared(capacity: usize, local_depth: usize) -> BucketRef<K, V> {
        Arc::new(Mutex::new(Self::new(capacity, local_depth)))
    }

    fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }
}

impl<K: Eq, V> Bucket<K, V> {
    fn contains(&self, key: &K) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    /// Overwrites the value if the key is present, otherwise appends.
    /// Returns true for a new entry. Callers must leave room before
    /// appending; a full bucket only accepts overwrites.
    fn insert(&mut self, key: K, value: V) -> bool {
        if let Some((_, slot)) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            *slot = value;
            return false;
        }
        debug_assert!(!self.is_full());
        self.entries.push_back((key, value));
        true
    }

    fn remove(&mut self, key: &K) -> bool {
        match self.entries.iter().position(|(k, _)| k == key) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    fn take_entries(&mut self) -> VecDeque<(K, V)> {
        std::mem::take(&mut self.entries)
    }
}

struct TableState<K, V> {
    global_depth: usize,
    num_buckets: usize,
    directory: Vec<BucketRef<K, V>>,
}

/// Thread-safe extendible hash table.
///
/// The directory always holds exactly `2^global_depth` slots; a bucket of
/// local depth `d` is shared by the `2^(global_depth - d)` slots whose low
/// `d` index bits match. Inserting into a full bucket splits it (doubling
/// the directory first when the bucket's local depth has caught up with
/// the global depth) and repeats until the target bucket has room.
///
/// All operations take the table latch for their full duration, so
/// operations on one instance are linearizable.
pub struct ExtendibleHashTable<K, V, S = RandomState> {
    bucket_size: usize,
    hash_builder: S,
    state: Mutex<TableState<K, V>>,
}

impl<K, V> ExtendibleHashTable<K, V, RandomState> {
    /// Creates a table whose buckets hold up to `bucket_size` entries.
    pub fn new(bucket_size: usize) -> Self {
        Self::with_hasher(bucket_size, RandomState::new())
    }
}

impl<K, V, S> ExtendibleHashTable<K, V, S> {
    /// Creates a table using `hash_builder` to hash keys. The hash must be
    /// stable for the lifetime of the table.
    pub fn with_hasher(bucket_size: usize, hash_builder: S) -> Self {
        assert!(bucket_size > 0, "bucket size must be positive");
        Self {
            bucket_size,
            hash_builder,
            state: Mutex::new(TableState {
                global_depth: 0,
                num_buckets: 1,
                directory: vec![Bucket::shared(bucket_size, 0)],
            }),
        }
    }

    /// Returns the global depth of the directory.
    pub fn global_depth(&self) -> usize {
        self.state.lock().global_depth
    }

    /// Returns the local depth of the bucket referenced by `dir_index`.
    ///
    /// # Panics
    ///
    /// Panics if `dir_index >= 2^global_depth`.
    pub fn local_depth(&self, dir_index: usize) -> usize {
        self.state.lock().directory[dir_index].lock().local_depth
    }

    /// Returns the number of distinct buckets reachable from the directory.
    pub fn num_buckets(&self) -> usize {
        self.state.lock().num_buckets
    }
}

impl<K, V, S> ExtendibleHashTable<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    fn hash_of(&self, key: &K) -> u64 {
        self.hash_builder.hash_one(key)
    }

    fn dir_index(&self, key: &K, global_depth: usize) -> usize {
        let mask = (1usize << global_depth) - 1;
        self.hash_of(key) as usize & mask
    }

    /// Returns the value bound to `key`, if any.
    pub fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        let state = self.state.lock();
        let index = self.dir_index(key, state.global_depth);
        let bucket = state.directory[index].lock();
        bucket.get(key)
    }

    /// Binds `key` to `value`, replacing any prior binding.
    ///
    /// Overwriting an existing binding never changes the table structure.
    /// Otherwise the target bucket is split until it has room, doubling
    /// the directory whenever the bucket's local depth equals the global
    /// depth.
    pub fn insert(&self, key: K, value: V) {
        let mut state = self.state.lock();
        loop {
            let index = self.dir_index(&key, state.global_depth);
            let bucket_ref = Arc::clone(&state.directory[index]);
            let mut bucket = bucket_ref.lock();
            if bucket.contains(&key) || !bucket.is_full() {
                bucket.insert(key, value);
                return;
            }
            drop(bucket);
            self.split(&mut state, index);
        }
    }

    /// Deletes the binding for `key`, returning whether one was present.
    pub fn remove(&self, key: &K) -> bool {
        let state = self.state.lock();
        let index = self.dir_index(key, state.global_depth);
        let mut bucket = state.directory[index].lock();
        bucket.remove(key)
    }

    /// Splits the bucket at `index` into two children of one greater
    /// local depth, redistributing its entries by the distributing bit
    /// and rewiring every slot that referred to it. Assumes the table
    /// latch is held.
    fn split(&self, state: &mut TableState<K, V>, index: usize) {
        let origin = Arc::clone(&state.directory[index]);
        let local_depth = origin.lock().local_depth;

        if local_depth == state.global_depth {
            state.global_depth += 1;
            state.directory.extend_from_within(..);
        }

        let zero = Bucket::shared(self.bucket_size, local_depth + 1);
        let one = Bucket::shared(self.bucket_size, local_depth + 1);
        let bit = 1usize << local_depth;
        for (key, value) in origin.lock().take_entries() {
            let child = if self.hash_of(&key) as usize & bit != 0 {
                &one
            } else {
                &zero
            };
            child.lock().insert(key, value);
        }
        state.num_buckets += 1;

        for (slot_index, slot) in state.directory.iter_mut().enumerate() {
            if Arc::ptr_eq(slot, &origin) {
                *slot = if slot_index & bit != 0 {
                    Arc::clone(&one)
                } else {
                    Arc::clone(&zero)
                };
            }
        }
    }
}
