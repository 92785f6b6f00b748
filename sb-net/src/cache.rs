//! Bounded LRU cache of evaluator outputs, keyed by position fingerprint.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// One cached evaluation: value head plus the priors of every move that was
/// part of the query, addressed by policy index.
#[derive(Clone, Debug, PartialEq)]
pub struct CachedEval {
    pub value: f32,
    pub priors: Vec<(u16, f32)>,
}

impl CachedEval {
    /// Prior of one move; 0.0 when the move was not part of the cached query.
    pub fn prior(&self, nn_index: u16) -> f32 {
        self.priors
            .iter()
            .find(|(idx, _)| *idx == nn_index)
            .map(|(_, p)| *p)
            .unwrap_or(0.0)
    }
}

const SHARDS: usize = 16;
const NO_SLOT: u32 = u32::MAX;

struct Slot {
    key: u64,
    eval: CachedEval,
    prev: u32,
    next: u32,
}

/// One shard: an index map over a slab of slots threaded into a recency list
/// (head = most recent). O(1) lookup, insert and eviction.
struct Shard {
    map: FxHashMap<u64, u32>,
    slots: Vec<Slot>,
    free: Vec<u32>,
    head: u32,
    tail: u32,
}

impl Shard {
    fn new() -> Self {
        Self {
            map: FxHashMap::default(),
            slots: Vec::new(),
            free: Vec::new(),
            head: NO_SLOT,
            tail: NO_SLOT,
        }
    }

    fn unlink(&mut self, idx: u32) {
        let (prev, next) = {
            let s = &self.slots[idx as usize];
            (s.prev, s.next)
        };
        match prev {
            NO_SLOT => self.head = next,
            p => self.slots[p as usize].next = next,
        }
        match next {
            NO_SLOT => self.tail = prev,
            n => self.slots[n as usize].prev = prev,
        }
    }

    fn push_front(&mut self, idx: u32) {
        let old_head = self.head;
        {
            let s = &mut self.slots[idx as usize];
            s.prev = NO_SLOT;
            s.next = old_head;
        }
        match old_head {
            NO_SLOT => self.tail = idx,
            h => self.slots[h as usize].prev = idx,
        }
        self.head = idx;
    }

    fn touch(&mut self, idx: u32) {
        if self.head != idx {
            self.unlink(idx);
            self.push_front(idx);
        }
    }

    /// Evict the least recently used entry. Returns false when empty.
    fn evict_lru(&mut self) -> bool {
        let tail = self.tail;
        if tail == NO_SLOT {
            return false;
        }
        self.unlink(tail);
        let key = self.slots[tail as usize].key;
        self.map.remove(&key);
        self.free.push(tail);
        true
    }

    fn insert(&mut self, key: u64, eval: CachedEval) -> bool {
        if let Some(&idx) = self.map.get(&key) {
            self.slots[idx as usize].eval = eval;
            self.touch(idx);
            return false;
        }
        let idx = match self.free.pop() {
            Some(idx) => {
                let s = &mut self.slots[idx as usize];
                s.key = key;
                s.eval = eval;
                idx
            }
            None => {
                let idx = self.slots.len() as u32;
                self.slots.push(Slot {
                    key,
                    eval,
                    prev: NO_SLOT,
                    next: NO_SLOT,
                });
                idx
            }
        };
        self.map.insert(key, idx);
        self.push_front(idx);
        true
    }
}

/// Fixed-capacity associative cache, sharded by the low fingerprint bits.
///
/// Capacity is reconfigurable online; shrinking evicts least-recently-used
/// entries immediately.
pub struct NnCache {
    shards: Vec<Mutex<Shard>>,
    capacity: AtomicUsize,
    len: AtomicUsize,
}

impl NnCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            shards: (0..SHARDS).map(|_| Mutex::new(Shard::new())).collect(),
            capacity: AtomicUsize::new(capacity),
            len: AtomicUsize::new(0),
        }
    }

    fn shard(&self, key: u64) -> &Mutex<Shard> {
        &self.shards[(key as usize) % SHARDS]
    }

    fn shard_capacity(&self) -> usize {
        let cap = self.capacity.load(Ordering::Relaxed);
        if cap == 0 {
            0
        } else {
            (cap / SHARDS).max(1)
        }
    }

    /// Whether `key` is present. Does not update recency.
    pub fn contains(&self, key: u64) -> bool {
        self.shard(key).lock().map.contains_key(&key)
    }

    /// Fetch a copy of the entry for `key`, marking it most recently used.
    pub fn lookup(&self, key: u64) -> Option<CachedEval> {
        let mut shard = self.shard(key).lock();
        let idx = *shard.map.get(&key)?;
        shard.touch(idx);
        Some(shard.slots[idx as usize].eval.clone())
    }

    /// Insert (or refresh) an entry, evicting from the same shard if full.
    pub fn insert(&self, key: u64, eval: CachedEval) {
        let cap = self.shard_capacity();
        if cap == 0 {
            return;
        }
        let mut shard = self.shard(key).lock();
        if shard.insert(key, eval) {
            self.len.fetch_add(1, Ordering::Relaxed);
        }
        while shard.map.len() > cap {
            if shard.evict_lru() {
                self.len.fetch_sub(1, Ordering::Relaxed);
            }
        }
    }

    /// Change the capacity; shrinking evicts LRU entries right away.
    pub fn set_capacity(&self, capacity: usize) {
        self.capacity.store(capacity, Ordering::Relaxed);
        let cap = self.shard_capacity();
        for shard in &self.shards {
            let mut shard = shard.lock();
            while shard.map.len() > cap {
                if shard.evict_lru() {
                    self.len.fetch_sub(1, Ordering::Relaxed);
                }
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        for shard in &self.shards {
            let mut shard = shard.lock();
            while shard.evict_lru() {
                self.len.fetch_sub(1, Ordering::Relaxed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(v: f32) -> CachedEval {
        CachedEval {
            value: v,
            priors: vec![(1, 0.5), (2, 0.5)],
        }
    }

    #[test]
    fn insert_then_lookup_round_trips() {
        let cache = NnCache::new(1000);
        cache.insert(42, eval(0.25));
        assert!(cache.contains(42));
        let got = cache.lookup(42).unwrap();
        assert_eq!(got.value, 0.25);
        assert_eq!(got.prior(1), 0.5);
        assert_eq!(got.prior(9), 0.0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn eviction_is_least_recently_used() {
        // Capacity 16 gives each shard one slot; drive a single shard.
        let cache = NnCache::new(16);
        cache.insert(16, eval(0.1));
        cache.insert(32, eval(0.2));
        assert!(!cache.contains(16));
        assert!(cache.contains(32));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn lookup_refreshes_recency() {
        let cache = NnCache::new(32); // two slots per shard
        cache.insert(16, eval(0.1));
        cache.insert(32, eval(0.2));
        // Touch the older entry, then overflow the shard.
        assert!(cache.lookup(16).is_some());
        cache.insert(48, eval(0.3));
        assert!(cache.contains(16));
        assert!(!cache.contains(32));
    }

    #[test]
    fn shrinking_capacity_evicts_immediately() {
        let cache = NnCache::new(1 << 12);
        for i in 0..256u64 {
            cache.insert(i, eval(i as f32));
        }
        assert_eq!(cache.len(), 256);
        cache.set_capacity(64);
        assert!(cache.len() <= 64);
    }

    #[test]
    fn zero_capacity_disables_the_cache() {
        let cache = NnCache::new(0);
        cache.insert(7, eval(0.5));
        assert!(!cache.contains(7));
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn clear_empties_every_shard() {
        let cache = NnCache::new(1 << 12);
        for i in 0..100u64 {
            cache.insert(i, eval(0.0));
        }
        cache.clear();
        assert_eq!(cache.len(), 0);
        assert!(!cache.contains(1));
    }
}
