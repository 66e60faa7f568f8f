//! Memoized graphs keyed by a content hash of their inputs.
//!
//! The graph is computed outside the lock and inserted afterwards. Two
//! callers racing on the same key both compute the same graph and one insert
//! wins; since the key covers every input, whichever wins is correct.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tracing::debug;

use crate::bowtie::BowtieRecord;

use super::{to_graph, BowtieGraph, GraphOptions};

/// blake3 over the serialized records, problem and options, `|`-separated.
pub fn graph_cache_key(
    records: &[BowtieRecord],
    central_problem: &str,
    options: &GraphOptions,
) -> String {
    let records_json = serde_json::to_vec(records).unwrap_or_default();
    let options_json = serde_json::to_vec(options).unwrap_or_default();
    let mut hasher = blake3::Hasher::new();
    hasher.update(&records_json);
    hasher.update(b"|");
    hasher.update(central_problem.trim().as_bytes());
    hasher.update(b"|");
    hasher.update(&options_json);
    hasher.finalize().to_hex().to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

pub struct GraphCache {
    entries: Mutex<HashMap<String, Arc<BowtieGraph>>>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for GraphCache {
    fn default() -> Self {
        Self::new(256)
    }
}

impl GraphCache {
    /// A full cache is emptied before the next insert.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<BowtieGraph>>> {
        // entries are immutable Arcs; a poisoned map is still consistent
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get_or_compute(
        &self,
        records: &[BowtieRecord],
        central_problem: &str,
        options: &GraphOptions,
    ) -> Arc<BowtieGraph> {
        let key = graph_cache_key(records, central_problem, options);
        if let Some(hit) = self.lock().get(&key).cloned() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "graph cache hit");
            return hit;
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, "graph cache miss");

        let graph = Arc::new(to_graph(records, central_problem, options));
        let mut entries = self.lock();
        if entries.len() >= self.capacity && !entries.contains_key(&key) {
            entries.clear();
        }
        Arc::clone(entries.entry(key).or_insert(graph))
    }

    pub fn invalidate(&self) {
        self.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.lock().len(),
        }
    }
}
