// src/data_loader/options.rs
//!
//! Batching knobs for the affectdl data loader.
//!
//! Builder helpers are provided so callers can write a fluent style:
//!
//! let opts = LoaderOptions::default()
//!     .with_batch_size(128)
//!     .drop_last(true)
//!     .shuffle(true, 42)
//!     .num_workers(8)
//!     .prefetch(4);
//!

use crate::constants::{DEFAULT_BATCH_SIZE, DEFAULT_NUM_WORKERS};

#[derive(Debug, Clone)]
pub struct LoaderOptions {
    /// Number of samples per batch.
    pub batch_size: usize,
    /// Whether to drop the final, possibly incomplete batch.
    pub drop_last: bool,
    /// If true, use a shuffled sampler (deterministic with `seed`).
    pub shuffle: bool,
    /// RNG seed used when `shuffle == true`. Ignored otherwise.
    pub seed: u64,
    /// Number of samples fetched concurrently. `0` means "auto" (use number of CPUs).
    pub num_workers: usize,
    /// Number of finished batches buffered ahead of the consumer. `0` disables prefetching.
    pub prefetch: usize,
    /// Drop samples that fail with `MalformedSample` instead of ending the stream.
    pub skip_malformed: bool,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            drop_last: false,
            shuffle: false,
            seed: 0,
            num_workers: DEFAULT_NUM_WORKERS,
            prefetch: 0,
            skip_malformed: false,
        }
    }
}

impl LoaderOptions {
    /// Builder-style helper: change the batch size.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Builder-style helper: set `drop_last`.
    pub fn drop_last(mut self, yes: bool) -> Self {
        self.drop_last = yes;
        self
    }

    /// Enable/disable shuffling and set seed.
    ///
    /// When `on` is false, the seed is left unchanged but ignored.
    pub fn shuffle(mut self, on: bool, seed: u64) -> Self {
        self.shuffle = on;
        if on {
            self.seed = seed;
        }
        self
    }

    /// Set the number of concurrent `get` calls per batch.
    ///
    /// `0` means "auto", which the loader interprets as the number of CPUs.
    pub fn num_workers(mut self, n: usize) -> Self {
        self.num_workers = n;
        self
    }

    /// Set the number of batches buffered ahead of the consumer.
    ///
    /// `0` disables prefetching.
    pub fn prefetch(mut self, n: usize) -> Self {
        self.prefetch = n;
        self
    }

    /// Skip (and log) malformed samples rather than failing the batch.
    pub fn skip_malformed(mut self, on: bool) -> Self {
        self.skip_malformed = on;
        self
    }

    /// Effective concurrency, resolving `0` to the CPU count.
    pub fn effective_workers(&self) -> usize {
        if self.num_workers == 0 {
            num_cpus::get().max(1)
        } else {
            self.num_workers
        }
    }
}
