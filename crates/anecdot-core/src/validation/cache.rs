//! Bounded LRU memoization of compiler results.

use std::time::Duration;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;

use crate::errors::AnecdotResult;
use crate::ident::content_digest;
use crate::validation::compiler::CompileOptions;
use crate::validation::result::ValidationResult;

pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// Cache key: content digest plus every option that can change the verdict.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    digest: String,
    timeout: Duration,
    strict: bool,
    output_format: String,
}

impl CacheKey {
    pub fn new(dot_source: &str, options: &CompileOptions) -> Self {
        Self {
            digest: content_digest(dot_source),
            timeout: options.timeout,
            strict: options.strict,
            output_format: options.output_format.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub max_size: usize,
    pub hit_rate: f64,
}

#[derive(Default)]
struct CacheState {
    entries: IndexMap<CacheKey, ValidationResult>,
    hits: u64,
    misses: u64,
}

/// Least-recently-used cache of validation results.
///
/// The lock is never held while the compiler runs, so two workers racing
/// on the same key may both compute; the later insert wins.
pub struct ValidationCache {
    max_entries: usize,
    state: Mutex<CacheState>,
}

impl Default for ValidationCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl ValidationCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries: max_entries.max(1),
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Return the cached result for `key`, or run `compute` and remember its
    /// result. Errors from `compute` are passed through and not cached.
    pub fn get_or_compute<F>(&self, key: CacheKey, compute: F) -> AnecdotResult<ValidationResult>
    where
        F: FnOnce() -> AnecdotResult<ValidationResult>,
    {
        {
            let mut state = self.state.lock();
            if let Some(index) = state.entries.get_index_of(&key) {
                // Move to end for LRU
                let last = state.entries.len() - 1;
                state.entries.move_index(index, last);
                state.hits += 1;
                return Ok(state.entries[last].clone());
            }
            state.misses += 1;
        }

        let result = compute()?;

        let mut state = self.state.lock();
        state.entries.shift_remove(&key);
        state.entries.insert(key, result.clone());
        while state.entries.len() > self.max_entries {
            state.entries.shift_remove_index(0);
        }
        Ok(result)
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        let lookups = state.hits + state.misses;
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            size: state.entries.len(),
            max_size: self.max_entries,
            hit_rate: if lookups > 0 {
                state.hits as f64 / lookups as f64
            } else {
                0.0
            },
        }
    }

    /// Drop every entry and reset the counters.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.hits = 0;
        state.misses = 0;
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
