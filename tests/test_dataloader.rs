//! Integration tests for the batching DataLoader.
//!
//! We use small, in-memory mock datasets so the tests are deterministic
//! and do not need any data files.

use affectdl::{Collate, DataLoader, Dataset, DatasetError, LoaderOptions};

use async_trait::async_trait;
use futures_util::StreamExt; // for `next()`

// ────────────────────────────────────────────────────────────────────────────
// Helper 1: Map-style dataset with a backing Vec<T>
// ────────────────────────────────────────────────────────────────────────────
#[derive(Clone)]
struct VecDataset {
    data: Vec<i32>,
}

#[async_trait]
impl Dataset for VecDataset {
    type Item = i32;

    fn len(&self) -> usize {
        self.data.len()
    }

    async fn get(&self, index: usize) -> Result<Self::Item, DatasetError> {
        self.data
            .get(index)
            .copied()
            .ok_or(DatasetError::IndexOutOfRange(index))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Helper 2: every multiple of `bad_every` is a malformed sample
// ────────────────────────────────────────────────────────────────────────────
struct FlakyDataset {
    n: usize,
    bad_every: usize,
}

#[async_trait]
impl Dataset for FlakyDataset {
    type Item = usize;

    fn len(&self) -> usize {
        self.n
    }

    async fn get(&self, index: usize) -> Result<Self::Item, DatasetError> {
        if index % self.bad_every == 0 {
            Err(DatasetError::malformed(index, "no text"))
        } else {
            Ok(index)
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Helper 3: reports more samples than it can serve
// ────────────────────────────────────────────────────────────────────────────
struct TruncatedDataset {
    claimed: usize,
    stored: usize,
}

#[async_trait]
impl Dataset for TruncatedDataset {
    type Item = usize;

    fn len(&self) -> usize {
        self.claimed
    }

    async fn get(&self, index: usize) -> Result<Self::Item, DatasetError> {
        if index < self.stored {
            Ok(index)
        } else {
            Err(DatasetError::IndexOutOfRange(index))
        }
    }
}

struct SumCollator;

impl Collate for SumCollator {
    type Item = i32;
    type Batch = i64;

    fn collate(&self, samples: Vec<i32>) -> Result<i64, DatasetError> {
        Ok(samples.into_iter().map(i64::from).sum())
    }
}

async fn flatten<D: Dataset>(loader: &DataLoader<D>) -> Vec<D::Item> {
    loader
        .stream()
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .flat_map(Result::unwrap)
        .collect()
}

#[tokio::test]
async fn map_dataset_batches() {
    let ds = VecDataset {
        data: (0..100).collect(),
    };
    let opts = LoaderOptions::default().with_batch_size(32);
    let loader = DataLoader::new(ds, opts);
    assert_eq!(loader.num_batches(), 4);

    let mut batches = loader.stream();
    let mut sizes = Vec::new();
    let mut flat = Vec::new();
    while let Some(batch) = batches.next().await {
        let batch = batch.expect("no error");
        sizes.push(batch.len());
        flat.extend(batch);
    }

    assert_eq!(sizes, vec![32, 32, 32, 4]);
    assert_eq!(flat, (0..100).collect::<Vec<_>>());
}

#[tokio::test]
async fn map_dataset_drop_last() {
    let ds = VecDataset {
        data: (0..100).collect(),
    };
    let opts = LoaderOptions::default()
        .with_batch_size(32)
        .drop_last(true);
    let loader = DataLoader::new(ds, opts);
    assert_eq!(loader.num_batches(), 3);

    let batches: Vec<_> = loader
        .stream()
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    assert_eq!(batches.len(), 3); // 3 * 32 = 96; last 4 items dropped
    assert_eq!(batches[0].len(), 32);
    assert_eq!(batches[2][31], 95);
}

#[tokio::test]
async fn empty_dataset() {
    let ds = VecDataset { data: vec![] };
    let loader = DataLoader::new(ds, LoaderOptions::default());

    let mut stream = loader.stream();
    assert!(stream.next().await.is_none(), "stream should be empty");
}

#[tokio::test]
async fn only_malformed_samples_are_skipped() {
    let loader = DataLoader::new(
        TruncatedDataset { claimed: 6, stored: 4 },
        LoaderOptions::default().with_batch_size(3).skip_malformed(true),
    );
    let results: Vec<_> = loader.stream().collect().await;
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].as_ref().unwrap(), &vec![0, 1, 2]);
    assert!(matches!(results[1], Err(DatasetError::IndexOutOfRange(4))));
}

/// Two runs with the same shuffle seed must produce identical sequences,
/// and that sequence must differ from the unshuffled order.
#[tokio::test]
async fn shuffle_determinism() {
    let base = VecDataset { data: (0..50).collect() };

    let uns = flatten(&DataLoader::new(
        base.clone(),
        LoaderOptions::default().with_batch_size(1).shuffle(false, 123),
    ))
    .await;

    let shuf_opt = LoaderOptions::default().with_batch_size(7).shuffle(true, 42);
    let shuf1 = flatten(&DataLoader::new(base.clone(), shuf_opt.clone())).await;
    let shuf2 = flatten(&DataLoader::new(base, shuf_opt)).await;

    assert_eq!(shuf1, shuf2, "shuffled outputs with same seed must match");
    assert_ne!(uns, shuf1, "shuffled sequence must differ from unshuffled");

    let mut sorted = shuf1.clone();
    sorted.sort_unstable();
    assert_eq!(sorted, uns, "shuffle must visit every sample once");
}

#[tokio::test]
async fn epochs_reshuffle() {
    let loader = DataLoader::new(
        VecDataset { data: (0..50).collect() },
        LoaderOptions::default().with_batch_size(50).shuffle(true, 3),
    );
    let e0 = loader.stream_epoch(0).next().await.unwrap().unwrap();
    let e1 = loader.stream_epoch(1).next().await.unwrap().unwrap();
    assert_ne!(e0, e1);
    assert_eq!(e0, loader.stream().next().await.unwrap().unwrap());
}

/// Parallel workers + prefetch must not change the output compared to
/// a single-worker loader.
#[tokio::test]
async fn parallel_prefetch_equivalence() {
    let ds = VecDataset { data: (0..100).collect() };

    let serial = flatten(&DataLoader::new(
        ds.clone(),
        LoaderOptions::default().with_batch_size(10).num_workers(1),
    ))
    .await;

    let parallel_opts = LoaderOptions::default()
        .with_batch_size(10)
        .num_workers(4)
        .prefetch(16);
    let parallel = flatten(&DataLoader::new(ds, parallel_opts)).await;

    assert_eq!(serial, parallel, "parallel loader output must match serial");
}

#[tokio::test]
async fn malformed_sample_aborts_by_default() {
    let loader = DataLoader::new(
        FlakyDataset { n: 10, bad_every: 4 },
        LoaderOptions::default().with_batch_size(3),
    );
    let results: Vec<_> = loader.stream().collect().await;
    // index 0 is malformed: the very first batch fails and the stream ends
    assert_eq!(results.len(), 1);
    match &results[0] {
        Err(DatasetError::MalformedSample { index, .. }) => assert_eq!(*index, 0),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn malformed_samples_can_be_skipped() {
    let loader = DataLoader::new(
        FlakyDataset { n: 10, bad_every: 4 },
        LoaderOptions::default().with_batch_size(3).skip_malformed(true),
    );
    let got = flatten(&loader).await;
    assert_eq!(got, vec![1, 2, 3, 5, 6, 7, 9]);
}

#[tokio::test]
async fn collated_loader_applies_collator() {
    let loader = DataLoader::new(
        VecDataset { data: (1..=10).collect() },
        LoaderOptions::default().with_batch_size(4).prefetch(2),
    )
    .collated(SumCollator);
    assert_eq!(loader.num_batches(), 3);

    let sums: Vec<i64> = loader.stream().map(Result::unwrap).collect().await;
    assert_eq!(sums, vec![10, 26, 19]);
}
