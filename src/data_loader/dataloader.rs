//! Batching `DataLoader` over map-style datasets.
//!
//! * Samples are fetched with up to `num_workers` concurrent `get` calls;
//!   batch order always follows the sampler order.
//! * Yields `Result<Vec<Item>, DatasetError>` where each `Vec` is a batch.
//! * [`CollatedLoader`] pairs a loader with a [`Collate`] strategy and
//!   yields finished batch values instead of sample vectors.

use crate::collate::Collate;
use crate::data_loader::dataset::{Dataset, DatasetError, DynStream};
use crate::data_loader::options::LoaderOptions;
use crate::data_loader::prefetch::spawn_prefetch;
use crate::data_loader::sampler::{EpochPlan, SampleOrder};

use async_stream::try_stream;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, warn};

/// High‑level iterator that produces batched samples from a dataset.
pub struct DataLoader<D>
where
    D: Dataset,
{
    dataset: Arc<D>,
    opts: LoaderOptions,
}

impl<D> DataLoader<D>
where
    D: Dataset,
{
    /// Create a new loader.
    pub fn new(dataset: D, opts: LoaderOptions) -> Self {
        Self::from_arc(Arc::new(dataset), opts)
    }

    /// Create a loader over a dataset that is already shared.
    pub fn from_arc(dataset: Arc<D>, opts: LoaderOptions) -> Self {
        Self { dataset, opts }
    }

    pub fn dataset(&self) -> &Arc<D> {
        &self.dataset
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.opts
    }

    /// Number of batches one epoch produces.
    pub fn num_batches(&self) -> usize {
        self.plan(0).len()
    }

    /// Bind a collation strategy to this loader.
    pub fn collated<C>(self, collator: C) -> CollatedLoader<D, C>
    where
        C: Collate<Item = D::Item>,
    {
        CollatedLoader { loader: self, collator: Arc::new(collator) }
    }

    /// Return an **async stream** over the first epoch that yields batches.
    ///
    /// ```ignore
    /// # use affectdl::{DataLoader, LoaderOptions};
    /// # async fn demo<D: affectdl::Dataset>(ds: D) -> anyhow::Result<()> {
    /// let loader = DataLoader::new(ds, LoaderOptions::default());
    /// let mut batches = loader.stream();
    /// while let Some(batch) = batches.next().await {
    ///     let data = batch?; // Vec<D::Item>
    ///     // training step ...
    /// }
    /// # Ok(()) }
    /// ```
    pub fn stream(&self) -> DynStream<Vec<D::Item>> {
        self.stream_epoch(0)
    }

    /// Like [`DataLoader::stream`], with the shuffle drawn for `epoch`.
    pub fn stream_epoch(&self, epoch: u64) -> DynStream<Vec<D::Item>> {
        let s = self.sample_batches(epoch);
        if self.opts.prefetch > 0 {
            spawn_prefetch(self.opts.prefetch, s)
        } else {
            s
        }
    }

    fn plan(&self, epoch: u64) -> EpochPlan {
        SampleOrder::new(self.opts.shuffle, self.opts.seed).plan(
            self.dataset.len(),
            epoch,
            self.opts.batch_size,
            self.opts.drop_last,
        )
    }

    fn sample_batches(&self, epoch: u64) -> DynStream<Vec<D::Item>> {
        let ds = self.dataset.clone();
        let skip_malformed = self.opts.skip_malformed;
        let workers = self.opts.effective_workers();
        let plan = self.plan(epoch);
        debug!(epoch, batches = plan.len(), "epoch plan ready");

        Box::pin(try_stream! {
            for indices in plan.into_batches() {
                let fetched: Vec<Result<D::Item, DatasetError>> = stream::iter(indices)
                    .map(|i| {
                        let ds = Arc::clone(&ds);
                        async move { ds.get(i).await }
                    })
                    .buffered(workers)
                    .collect()
                    .await;

                let mut batch = Vec::with_capacity(fetched.len());
                for item in fetched {
                    match item {
                        Ok(sample) => batch.push(sample),
                        Err(e) if skip_malformed && e.is_malformed_sample() => {
                            warn!("skipping sample: {e}");
                        }
                        Err(e) => Err(e)?,
                    }
                }
                if batch.is_empty() {
                    continue;
                }
                debug!(size = batch.len(), "batch ready");
                yield batch;
            }
        })
    }
}

impl<D> std::fmt::Debug for DataLoader<D>
where
    D: Dataset,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataLoader")
            .field("batch_size", &self.opts.batch_size)
            .field("shuffle", &self.opts.shuffle)
            .field("len", &self.dataset.len())
            .finish()
    }
}

/// A [`DataLoader`] whose batches are run through a collator.
pub struct CollatedLoader<D, C>
where
    D: Dataset,
{
    loader: DataLoader<D>,
    collator: Arc<C>,
}

impl<D, C> CollatedLoader<D, C>
where
    D: Dataset,
    C: Collate<Item = D::Item>,
{
    pub fn loader(&self) -> &DataLoader<D> {
        &self.loader
    }

    pub fn collator(&self) -> &C {
        &self.collator
    }

    pub fn dataset(&self) -> &Arc<D> {
        self.loader.dataset()
    }

    pub fn num_batches(&self) -> usize {
        self.loader.num_batches()
    }

    /// Stream of collated batches for the first epoch.
    pub fn stream(&self) -> DynStream<C::Batch> {
        self.stream_epoch(0)
    }

    /// Stream of collated batches for `epoch`.
    pub fn stream_epoch(&self, epoch: u64) -> DynStream<C::Batch> {
        let collator = self.collator.clone();
        let mut samples = self.loader.sample_batches(epoch);
        let s: DynStream<C::Batch> = Box::pin(try_stream! {
            while let Some(batch) = samples.next().await {
                let batch = batch?;
                yield collator.collate(batch)?;
            }
        });
        match self.loader.opts.prefetch {
            0 => s,
            cap => spawn_prefetch(cap, s),
        }
    }
}

impl<D, C> std::fmt::Debug for CollatedLoader<D, C>
where
    D: Dataset,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollatedLoader")
            .field("loader", &self.loader)
            .finish()
    }
}
