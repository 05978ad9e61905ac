// src/config.rs
//
// Runtime parameters for building affect data loaders.

use clap::ValueEnum;
use std::fmt;
use std::str::FromStr;

use crate::constants::{DEFAULT_BATCH_SIZE, DEFAULT_MAX_SEQ_LEN, DEFAULT_NUM_WORKERS};
use crate::data_loader::DatasetError;

/// Dataset families understood by [`crate::loader::get_dataloader`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum DataType {
    #[default]
    Mosi,
    Mosei,
    Meld,
}

impl DataType {
    /// Continuous sentiment-intensity datasets with train/valid/test splits.
    pub fn is_sentiment(self) -> bool {
        matches!(self, DataType::Mosi | DataType::Mosei)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DataType::Mosi => "mosi",
            DataType::Mosei => "mosei",
            DataType::Meld => "meld",
        })
    }
}

impl FromStr for DataType {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mosi" => Ok(DataType::Mosi),
            "mosei" => Ok(DataType::Mosei),
            "meld" => Ok(DataType::Meld),
            other => Err(DatasetError::from(format!("unknown data type: {other}"))),
        }
    }
}

/// Label interpretation for the continuous family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Task {
    /// Binarize the sentiment score: `1` if positive, else `0`.
    Classification,
    /// Keep the raw score.
    Regression,
}

impl FromStr for Task {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "classification" => Ok(Task::Classification),
            "regression" => Ok(Task::Regression),
            other => Err(DatasetError::from(format!("unknown task: {other}"))),
        }
    }
}

/// Per-sample transformation knobs for [`crate::sentiment::SentimentDataset`].
#[derive(Debug, Clone, PartialEq)]
pub struct SentimentOptions {
    pub flatten: bool,
    pub aligned: bool,
    /// `None` keeps raw scores, like [`Task::Regression`].
    pub task: Option<Task>,
    pub max_pad: bool,
    pub max_pad_num: usize,
    pub z_norm: bool,
}

impl Default for SentimentOptions {
    fn default() -> Self {
        Self {
            flatten: false,
            aligned: true,
            task: None,
            max_pad: false,
            max_pad_num: DEFAULT_MAX_SEQ_LEN,
            z_norm: false,
        }
    }
}

impl SentimentOptions {
    pub fn is_classification(&self) -> bool {
        self.task == Some(Task::Classification)
    }
}

/// What to do with a sample that fails with `MalformedSample`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum MalformedPolicy {
    /// End the batch stream with the error.
    #[default]
    Abort,
    /// Log and leave the sample out of its batch.
    Skip,
}

/// Everything `get_dataloader` needs to know.
#[derive(Debug, Clone)]
pub struct AffectConfig {
    pub batch_size: usize,
    pub max_seq_len: usize,
    pub max_pad: bool,
    pub train_shuffle: bool,
    pub num_workers: usize,
    pub flatten_time_series: bool,
    pub task: Option<Task>,
    pub data_type: DataType,
    pub z_norm: bool,
    /// Also z-normalize whole splits at load time (truncating to `max_seq_len`).
    pub normalize_splits: bool,
    pub seed: u64,
    pub malformed: MalformedPolicy,
}

impl Default for AffectConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_seq_len: DEFAULT_MAX_SEQ_LEN,
            max_pad: false,
            train_shuffle: true,
            num_workers: DEFAULT_NUM_WORKERS,
            flatten_time_series: false,
            task: None,
            data_type: DataType::Mosi,
            z_norm: false,
            normalize_splits: false,
            seed: 0,
            malformed: MalformedPolicy::Abort,
        }
    }
}

impl AffectConfig {
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn max_seq_len(mut self, n: usize) -> Self {
        self.max_seq_len = n;
        self
    }

    pub fn max_pad(mut self, on: bool) -> Self {
        self.max_pad = on;
        self
    }

    pub fn train_shuffle(mut self, on: bool) -> Self {
        self.train_shuffle = on;
        self
    }

    pub fn num_workers(mut self, n: usize) -> Self {
        self.num_workers = n;
        self
    }

    pub fn flatten_time_series(mut self, on: bool) -> Self {
        self.flatten_time_series = on;
        self
    }

    pub fn task(mut self, task: Option<Task>) -> Self {
        self.task = task;
        self
    }

    pub fn data_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    pub fn z_norm(mut self, on: bool) -> Self {
        self.z_norm = on;
        self
    }

    pub fn normalize_splits(mut self, on: bool) -> Self {
        self.normalize_splits = on;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn malformed(mut self, policy: MalformedPolicy) -> Self {
        self.malformed = policy;
        self
    }

    /// Adapter options shared by every split.
    pub fn sentiment_options(&self) -> SentimentOptions {
        SentimentOptions {
            flatten: self.flatten_time_series,
            aligned: true,
            task: self.task,
            max_pad: self.max_pad,
            max_pad_num: self.max_seq_len,
            z_norm: self.z_norm,
        }
    }
}
