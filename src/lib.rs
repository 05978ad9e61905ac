// src/lib.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// Crate root: module tree and public re-exports.

pub mod constants;
pub mod config;
pub mod data_formats;
pub mod data_loader;
pub mod preprocess;
pub mod sentiment;
pub mod meld;
pub mod collate;
pub mod loader;

// ===== Re-exports at the crate root =====
pub use crate::data_loader::dataloader::{CollatedLoader, DataLoader};
pub use crate::data_loader::dataset::{Dataset, DatasetError};
pub use crate::data_loader::options::LoaderOptions;
// Module alias so callers can use `affectdl::dataset::DynStream`:
pub use crate::data_loader::dataset;

pub use config::{AffectConfig, DataType, MalformedPolicy, SentimentOptions, Task};
pub use collate::{
    Collate, CollateStrategy, LabelBatch, MeldBatch, MeldCollator, PaddedBatch, SentimentBatch,
    SentimentCollator, SequenceBatch,
};
pub use loader::{get_dataloader, AffectLoaders, MeldLoader, SentimentLoader};
pub use meld::{MeldDataset, MeldRecord};
pub use sentiment::{Label, RawSplit, SentimentDataset, SentimentSample, SentimentSplits};
