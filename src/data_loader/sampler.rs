//! src/data_loader/sampler.rs
//! Visiting order of a map-style dataset.
//!
//! A loader draws one [`SampleOrder`] per run and asks it for an
//! [`EpochPlan`] each epoch.  Shuffled plans are a pure function of
//! `(seed, epoch)`: the seed keys a ChaCha20 generator and the epoch
//! selects its stream, so epochs never reuse each other's permutation
//! and two loaders with the same seed agree batch for batch.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

/// How indices `0..len` are ordered within an epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOrder {
    Sequential,
    Shuffled { seed: u64 },
}

impl SampleOrder {
    pub fn new(shuffle: bool, seed: u64) -> Self {
        if shuffle {
            SampleOrder::Shuffled { seed }
        } else {
            SampleOrder::Sequential
        }
    }

    /// Every index of a `len`-sample dataset, in the order used for `epoch`.
    pub fn permutation(&self, len: usize, epoch: u64) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..len).collect();
        if let SampleOrder::Shuffled { seed } = *self {
            let mut rng = ChaCha20Rng::seed_from_u64(seed);
            rng.set_stream(epoch);
            indices.shuffle(&mut rng);
        }
        indices
    }

    /// Split the epoch's permutation into batches of `batch_size`.
    pub fn plan(&self, len: usize, epoch: u64, batch_size: usize, drop_last: bool) -> EpochPlan {
        EpochPlan {
            indices: self.permutation(len, epoch),
            batch_size: batch_size.max(1),
            drop_last,
        }
    }
}

/// The index batches of one epoch.
#[derive(Debug, Clone)]
pub struct EpochPlan {
    indices: Vec<usize>,
    batch_size: usize,
    drop_last: bool,
}

impl EpochPlan {
    /// Number of batches this plan yields.
    pub fn len(&self) -> usize {
        let n = self.indices.len();
        if self.drop_last {
            n / self.batch_size
        } else {
            n.div_ceil(self.batch_size)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index batches in visiting order; a short tail is kept unless
    /// `drop_last` is set.
    pub fn batches(&self) -> impl Iterator<Item = &[usize]> + '_ {
        self.indices.chunks(self.batch_size).take(self.len())
    }

    pub fn into_batches(self) -> Vec<Vec<usize>> {
        self.batches().map(<[usize]>::to_vec).collect()
    }
}
