// tests/common/mod.rs
//
// Synthetic data files shared by the integration tests.

#![allow(dead_code)]

use affectdl::data_formats::{write_meld_npz, write_sentiment_npz};
use affectdl::{MeldRecord, RawSplit, SentimentSplits};
use ndarray::{s, Array, Array2, ArrayD, IxDyn};
use std::path::PathBuf;
use tempfile::TempDir;

pub const STEPS: usize = 6;

/// `n` samples with `STEPS` steps; sample `i` has `i % 3` leading silent
/// steps, and every index listed in `empty_text` has no text at all.
pub fn split(n: usize, empty_text: &[usize]) -> RawSplit {
    let mut text = Array::from_shape_fn((n, STEPS, 4), |(i, t, f)| ((i + 1) * (t + 2) + f) as f32);
    let mut audio = Array::from_shape_fn((n, STEPS, 3), |(i, t, f)| (i + t * f) as f32 + 0.5);
    let vision = Array::from_shape_fn((n, STEPS, 2), |(i, t, f)| (t * 2 + f + i) as f32 + 1.0);
    for i in 0..n {
        let lead = i % 3;
        text.slice_mut(s![i, ..lead, ..]).fill(0.0);
    }
    for &i in empty_text {
        text.slice_mut(s![i, .., ..]).fill(0.0);
    }
    audio[[0, 0, 0]] = f32::NEG_INFINITY;
    let labels = ArrayD::from_shape_fn(IxDyn(&[n, 1, 1]), |d| d[0] as f32 - 2.0);
    RawSplit::new(text, audio, vision, labels).expect("consistent split")
}

pub fn sentiment_file(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("mosi.npz");
    let splits = SentimentSplits {
        train: split(10, &[3, 7]),
        valid: split(5, &[]),
        test: split(4, &[0]),
    };
    write_sentiment_npz(&path, &splits).expect("write sentiment file");
    path
}

pub fn meld_record(id: &str, tokens: usize, frames: usize, label: i64) -> MeldRecord {
    MeldRecord {
        id: id.to_string(),
        token_ids: Array::from_iter(1..=tokens as i64),
        video_features: Array2::from_elem((frames, 5), 0.5),
        audio_features: Array2::from_elem((frames, 7), -0.5),
        label,
    }
}

pub fn meld_file(dir: &TempDir, records: &[MeldRecord]) -> PathBuf {
    let path = dir.path().join("meld.npz");
    write_meld_npz(&path, records).expect("write meld file");
    path
}
