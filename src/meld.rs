// src/meld.rs
//
// Map-style dataset over the discrete-emotion family (meld), one record
// per utterance id.

use async_trait::async_trait;
use ndarray::{Array1, Array2, Axis};
use std::path::Path;

use crate::constants::MELD_TEXT_DIM;
use crate::data_loader::{Dataset, DatasetError};

/// One utterance: token ids plus per-frame video and audio features.
#[derive(Debug, Clone, PartialEq)]
pub struct MeldRecord {
    /// Key of the record in the source file.
    pub id: String,
    pub token_ids: Array1<i64>,
    /// `frame × feature`
    pub video_features: Array2<f32>,
    /// `frame × feature`
    pub audio_features: Array2<f32>,
    pub label: i64,
}

impl MeldRecord {
    pub fn token_len(&self) -> usize {
        self.token_ids.len()
    }
}

#[derive(Debug, Clone)]
pub struct MeldDataset {
    records: Vec<MeldRecord>,
    pub visual_size: usize,
    pub acoustic_size: usize,
}

impl MeldDataset {
    /// Feature widths are taken from the first record.
    pub fn new(records: Vec<MeldRecord>) -> Result<Self, DatasetError> {
        let first = records
            .first()
            .ok_or_else(|| DatasetError::Format("meld file holds no records".into()))?;
        let visual_size = first.video_features.len_of(Axis(1));
        let acoustic_size = first.audio_features.len_of(Axis(1));
        Ok(Self { records, visual_size, acoustic_size })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        Self::new(crate::data_formats::read_meld_npz(path)?)
    }

    /// `(text, audio, video)` feature widths for model configuration.
    pub fn lav_dim(&self) -> (usize, usize, usize) {
        (MELD_TEXT_DIM, self.acoustic_size, self.visual_size)
    }

    /// Fixed sequence lengths per modality; `0` means variable.
    pub fn lav_len(&self) -> (usize, usize, usize) {
        (0, 0, 0)
    }

    pub fn records(&self) -> &[MeldRecord] {
        &self.records
    }
}

#[async_trait]
impl Dataset for MeldDataset {
    type Item = MeldRecord;

    fn len(&self) -> usize {
        self.records.len()
    }

    async fn get(&self, index: usize) -> Result<Self::Item, DatasetError> {
        self.records
            .get(index)
            .cloned()
            .ok_or(DatasetError::IndexOutOfRange(index))
    }
}
