//! Cache-aware wrapper around a raw network computation.

use std::sync::Arc;

use crate::backend::{NetError, NetworkComputation};
use crate::cache::{CachedEval, NnCache};
use crate::encoder::Plane;

enum Entry {
    /// Served from the cache at add time.
    Cached(CachedEval),
    /// Pending NN slot; `moves` is kept to build the cache payload after
    /// compute.
    Fresh {
        key: u64,
        slot: usize,
        moves: Vec<u16>,
    },
}

/// Coalesces cache hits and misses into at most one NN call per `compute`.
///
/// Query indices cover hits and misses alike, in insertion order; NN slot
/// indices follow the order misses were added in.
pub struct CachingComputation {
    inner: Box<dyn NetworkComputation>,
    cache: Arc<NnCache>,
    entries: Vec<Entry>,
}

impl CachingComputation {
    pub fn new(inner: Box<dyn NetworkComputation>, cache: Arc<NnCache>) -> Self {
        Self {
            inner,
            cache,
            entries: Vec::new(),
        }
    }

    /// Adds the input only if it is already cached; true on a hit (no NN slot
    /// consumed).
    pub fn add_input_by_hash(&mut self, key: u64) -> bool {
        match self.cache.lookup(key) {
            Some(eval) => {
                self.entries.push(Entry::Cached(eval));
                true
            }
            None => false,
        }
    }

    /// Add one input; serves it from the cache when possible, otherwise
    /// appends it to the pending NN batch. `moves` lists the policy indices
    /// worth keeping for this position.
    pub fn add_input(&mut self, key: u64, planes: Vec<Plane>, moves: Vec<u16>) {
        if let Some(eval) = self.cache.lookup(key) {
            self.entries.push(Entry::Cached(eval));
            return;
        }
        let slot = self.inner.batch_size();
        self.inner.add_input(planes);
        self.entries.push(Entry::Fresh { key, slot, moves });
    }

    /// Number of pending NN slots.
    pub fn cache_misses(&self) -> usize {
        self.inner.batch_size()
    }

    /// Total queries: hits + misses.
    pub fn batch_size(&self) -> usize {
        self.entries.len()
    }

    /// Runs the underlying computation once if there are misses, then inserts
    /// every freshly computed entry into the cache.
    pub fn compute(&mut self) -> Result<(), NetError> {
        if self.inner.batch_size() == 0 {
            return Ok(());
        }
        self.inner.compute()?;
        for entry in &self.entries {
            if let Entry::Fresh { key, slot, moves } = entry {
                let eval = CachedEval {
                    value: self.inner.value(*slot),
                    priors: moves
                        .iter()
                        .map(|&m| (m, self.inner.policy(*slot, m)))
                        .collect(),
                };
                self.cache.insert(*key, eval);
            }
        }
        Ok(())
    }

    /// Value of query `idx`, cached or fresh.
    pub fn value(&self, idx: usize) -> f32 {
        match &self.entries[idx] {
            Entry::Cached(eval) => eval.value,
            Entry::Fresh { slot, .. } => self.inner.value(*slot),
        }
    }

    /// Policy of query `idx` at one move index, cached or fresh.
    pub fn policy(&self, idx: usize, nn_index: u16) -> f32 {
        match &self.entries[idx] {
            Entry::Cached(eval) => eval.prior(nn_index),
            Entry::Fresh { slot, .. } => self.inner.policy(*slot, nn_index),
        }
    }
}
