//! Core dataset abstractions for the affectdl data-loader.
//!
//! A [`Dataset`] is a read-only, map-style collection of samples.  The
//! loader calls [`Dataset::get`] concurrently from several tasks, so
//! implementors must not mutate shared state after construction.

use async_trait::async_trait;
use futures_core::stream::Stream;
use std::pin::Pin;
use thiserror::Error;
use anyhow::Error as AnyError;

/// A boxed, pinned, sendable async stream of fallible items.
pub type DynStream<T> =
    Pin<Box<dyn Stream<Item = Result<T, DatasetError>> + Send + 'static>>;

/// Item‑level error type for dataset, collation and loader operations.
#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("index out of range: {0}")]
    IndexOutOfRange(usize),

    #[error("operation not supported for this dataset family")]
    Unsupported,

    /// A sample whose content cannot be turned into a valid sequence,
    /// e.g. an all-zero text row when modalities are aligned.
    #[error("malformed sample {index}: {reason}")]
    MalformedSample { index: usize, reason: String },

    /// Array ranks or sizes disagree with the batch structure.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// The input archive is missing entries or holds unreadable arrays.
    #[error("invalid data file: {0}")]
    Format(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Backend(#[from] AnyError),
}

impl DatasetError {
    pub fn malformed(index: usize, reason: impl Into<String>) -> Self {
        DatasetError::MalformedSample { index, reason: reason.into() }
    }

    /// True for per-sample failures a caller may skip over.
    pub fn is_malformed_sample(&self) -> bool {
        matches!(self, DatasetError::MalformedSample { .. })
    }
}

impl From<ndarray::ShapeError> for DatasetError {
    fn from(e: ndarray::ShapeError) -> Self {
        DatasetError::ShapeMismatch(e.to_string())
    }
}

impl From<zip::result::ZipError> for DatasetError {
    fn from(e: zip::result::ZipError) -> Self {
        DatasetError::Format(e.to_string())
    }
}

impl From<String> for DatasetError {
    fn from(s: String) -> Self {
        DatasetError::Backend(AnyError::msg(s))
    }
}

impl From<&str> for DatasetError {
    fn from(s: &str) -> Self {
        DatasetError::Backend(AnyError::msg(s.to_string()))
    }
}

/// A logical collection of **samples** (rows of a modality split,
/// records of an utterance store).
///
/// Implementors support random access through [`Dataset::get`] for every
/// index below [`Dataset::len`].
#[async_trait]
pub trait Dataset: Send + Sync + 'static {
    /// Concrete Rust type produced for each sample.
    type Item: Send + 'static;

    /// Total number of samples.
    fn len(&self) -> usize;

    /// Retrieve a sample by zero‑based index.
    async fn get(&self, index: usize) -> Result<Self::Item, DatasetError>;

    /// Convenience helper.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
