// src/loader.rs
//
// Entry point: load a data file, clean it up and hand back batch streams.

use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::collate::{CollateStrategy, MeldCollator, SentimentCollator};
use crate::config::{AffectConfig, MalformedPolicy};
use crate::data_formats::read_sentiment_npz;
use crate::data_loader::{CollatedLoader, DataLoader, DatasetError, LoaderOptions};
use crate::meld::MeldDataset;
use crate::preprocess::{drop_entry, z_norm_split};
use crate::sentiment::{SentimentDataset, SentimentSplits};

pub type SentimentLoader = CollatedLoader<SentimentDataset, SentimentCollator>;
pub type MeldLoader = CollatedLoader<MeldDataset, MeldCollator>;

/// Loaders for one data file.
#[derive(Debug)]
pub enum AffectLoaders {
    /// mosi / mosei: one loader per split.
    Sentiment {
        train: SentimentLoader,
        valid: SentimentLoader,
        test: SentimentLoader,
    },
    /// meld: a single shuffled loader over the whole file.
    Meld(MeldLoader),
}

impl AffectLoaders {
    pub fn into_sentiment(self) -> Result<(SentimentLoader, SentimentLoader, SentimentLoader), DatasetError> {
        match self {
            AffectLoaders::Sentiment { train, valid, test } => Ok((train, valid, test)),
            AffectLoaders::Meld(_) => Err(DatasetError::Unsupported),
        }
    }

    pub fn into_meld(self) -> Result<MeldLoader, DatasetError> {
        match self {
            AffectLoaders::Meld(loader) => Ok(loader),
            AffectLoaders::Sentiment { .. } => Err(DatasetError::Unsupported),
        }
    }
}

fn loader_options(cfg: &AffectConfig, shuffle: bool) -> LoaderOptions {
    LoaderOptions::default()
        .with_batch_size(cfg.batch_size)
        .num_workers(cfg.num_workers)
        .shuffle(shuffle, cfg.seed)
        .skip_malformed(cfg.malformed == MalformedPolicy::Skip)
}

/// Build the data loaders for the file at `path`.
pub fn get_dataloader(path: impl AsRef<Path>, cfg: &AffectConfig) -> Result<AffectLoaders, DatasetError> {
    if cfg.data_type.is_sentiment() {
        let (train, valid, test) = sentiment_loaders(read_sentiment_npz(path)?, cfg);
        Ok(AffectLoaders::Sentiment { train, valid, test })
    } else {
        Ok(AffectLoaders::Meld(meld_loader(MeldDataset::from_path(path)?, cfg)))
    }
}

/// Drop text-less samples, optionally normalize, and wrap each split.
pub fn sentiment_loaders(
    splits: SentimentSplits,
    cfg: &AffectConfig,
) -> (SentimentLoader, SentimentLoader, SentimentLoader) {
    let splits = splits.map(|name, split| {
        let (split, dropped) = drop_entry(split);
        info!(split = name, kept = split.len(), dropped, "filtered samples without text");
        if cfg.normalize_splits {
            z_norm_split(&split, cfg.max_seq_len)
        } else {
            split
        }
    });

    let opts = cfg.sentiment_options();
    let collator = SentimentCollator::new(CollateStrategy::for_options(&opts));
    let build = |split, shuffle| {
        let ds = Arc::new(SentimentDataset::new(split, opts.clone()));
        DataLoader::from_arc(ds, loader_options(cfg, shuffle)).collated(collator)
    };
    (
        build(splits.train, cfg.train_shuffle),
        build(splits.valid, false),
        build(splits.test, false),
    )
}

pub fn meld_loader(ds: MeldDataset, cfg: &AffectConfig) -> MeldLoader {
    info!(records = ds.records().len(), lav_dim = ?ds.lav_dim(), "meld dataset ready");
    DataLoader::new(ds, loader_options(cfg, true)).collated(MeldCollator)
}
