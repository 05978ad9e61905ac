// src/data_loader/mod.rs

//! Public API surface for the affectdl data_loader layer.
/// expose the `dataloader` module (file dataloader.rs)
pub mod dataloader;

/// expose the `dataset` module (file dataset.rs)
pub mod dataset;

/// expose the `options` module (file options.rs)
pub mod options;

pub mod prefetch;
pub mod sampler;

// Re‐export the key types at this level:
pub use dataset::{Dataset, DatasetError, DynStream};
pub use dataloader::{CollatedLoader, DataLoader};
pub use options::LoaderOptions;
