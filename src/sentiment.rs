// src/sentiment.rs
//
// Map-style dataset over the continuous-sentiment family (mosi / mosei).

use async_trait::async_trait;
use ndarray::{s, Array1, Array2, Array3, ArrayD, ArrayView2, ArrayViewD, Axis};
use tracing::debug;

use crate::config::SentimentOptions;
use crate::constants::{AUDIO, LABELS, SPLITS, TEXT, VISION};
use crate::data_loader::{Dataset, DatasetError};
use crate::preprocess::{clear_neg_inf, first_nonzero_row, z_normalize};

/// One split of a sentiment dataset, sample-major.
///
/// `text`, `audio` and `vision` are `sample × time × feature`; `labels`
/// has the sample count on its first axis and any trailing shape.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSplit {
    pub text: Array3<f32>,
    pub audio: Array3<f32>,
    pub vision: Array3<f32>,
    pub labels: ArrayD<f32>,
}

impl RawSplit {
    /// Build a split, checking that every modality has the same sample count.
    pub fn new(
        text: Array3<f32>,
        audio: Array3<f32>,
        vision: Array3<f32>,
        labels: ArrayD<f32>,
    ) -> Result<Self, DatasetError> {
        let n = text.len_of(Axis(0));
        let counts = [
            (AUDIO, audio.len_of(Axis(0))),
            (VISION, vision.len_of(Axis(0))),
            (LABELS, labels.shape().first().copied().unwrap_or(0)),
        ];
        for (name, count) in counts {
            if count != n {
                return Err(DatasetError::ShapeMismatch(format!(
                    "{name} has {count} samples, {TEXT} has {n}"
                )));
            }
        }
        Ok(Self { text, audio, vision, labels })
    }

    pub fn len(&self) -> usize {
        self.text.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keep only the samples at `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            text: self.text.select(Axis(0), indices),
            audio: self.audio.select(Axis(0), indices),
            vision: self.vision.select(Axis(0), indices),
            labels: self.labels.select(Axis(0), indices),
        }
    }
}

/// The three splits of a sentiment data file.
#[derive(Debug, Clone, PartialEq)]
pub struct SentimentSplits {
    pub train: RawSplit,
    pub valid: RawSplit,
    pub test: RawSplit,
}

impl SentimentSplits {
    /// Apply `f` to every split, tagged with its name.
    pub fn map<F>(self, mut f: F) -> Self
    where
        F: FnMut(&'static str, RawSplit) -> RawSplit,
    {
        let [train, valid, test] = SPLITS;
        Self {
            train: f(train, self.train),
            valid: f(valid, self.valid),
            test: f(test, self.test),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &RawSplit)> {
        SPLITS.into_iter().zip([&self.train, &self.valid, &self.test])
    }
}

/// Per-sample label, always two-dimensional.
#[derive(Debug, Clone, PartialEq)]
pub enum Label {
    /// Binary sentiment class, shape `(1, 1)`.
    Class(Array2<i64>),
    /// Raw score(s).
    Score(Array2<f32>),
}

impl Label {
    pub fn dim(&self) -> (usize, usize) {
        match self {
            Label::Class(a) => a.dim(),
            Label::Score(a) => a.dim(),
        }
    }
}

/// A sample as handed to the collator.
///
/// Sequences are `time × feature` (rank 2) or, when flattened, rank 1.
/// `index` is `None` for max-padded samples.
#[derive(Debug, Clone, PartialEq)]
pub struct SentimentSample {
    pub vision: ArrayD<f32>,
    pub audio: ArrayD<f32>,
    pub text: ArrayD<f32>,
    pub index: Option<usize>,
    pub label: Label,
}

impl SentimentSample {
    /// Sequences in batch order: vision, audio, text.
    pub fn sequences(&self) -> [&ArrayD<f32>; 3] {
        [&self.vision, &self.audio, &self.text]
    }
}

/// Dataset adapter over one [`RawSplit`].
#[derive(Debug, Clone)]
pub struct SentimentDataset {
    split: RawSplit,
    opts: SentimentOptions,
}

impl SentimentDataset {
    pub fn new(mut split: RawSplit, opts: SentimentOptions) -> Self {
        let cleared = clear_neg_inf(&mut split.audio);
        if cleared > 0 {
            debug!(cleared, "replaced -inf audio values");
        }
        Self { split, opts }
    }

    pub fn split(&self) -> &RawSplit {
        &self.split
    }

    pub fn options(&self) -> &SentimentOptions {
        &self.opts
    }

    /// Materialize sample `index`.
    pub fn sample(&self, index: usize) -> Result<SentimentSample, DatasetError> {
        if index >= self.split.len() {
            return Err(DatasetError::IndexOutOfRange(index));
        }
        let vision = self.split.vision.index_axis(Axis(0), index);
        let audio = self.split.audio.index_axis(Axis(0), index);
        let text = self.split.text.index_axis(Axis(0), index);

        let [mut vision, mut audio, mut text] = if self.opts.aligned {
            let start = first_nonzero_row(text)
                .ok_or_else(|| DatasetError::malformed(index, "text is entirely zero"))?;
            [
                tail(vision, start, index, VISION)?,
                tail(audio, start, index, AUDIO)?,
                tail(text, start, index, TEXT)?,
            ]
        } else {
            [
                own_tail(vision, index, VISION)?,
                own_tail(audio, index, AUDIO)?,
                own_tail(text, index, TEXT)?,
            ]
        };

        if self.opts.z_norm {
            vision = z_normalize(vision.view(), 1.0);
            audio = z_normalize(audio.view(), 1.0);
            text = z_normalize(text.view(), 1.0);
        }

        let label = self.label(index)?;

        if self.opts.flatten {
            return Ok(SentimentSample {
                vision: flatten(&vision),
                audio: flatten(&audio),
                text: flatten(&text),
                index: Some(index),
                label,
            });
        }

        if self.opts.max_pad {
            let n = self.opts.max_pad_num;
            return Ok(SentimentSample {
                vision: pad_rows(vision.view(), n).into_dyn(),
                audio: pad_rows(audio.view(), n).into_dyn(),
                text: pad_rows(text.view(), n).into_dyn(),
                index: None,
                label,
            });
        }

        Ok(SentimentSample {
            vision: vision.into_dyn(),
            audio: audio.into_dyn(),
            text: text.into_dyn(),
            index: Some(index),
            label,
        })
    }

    fn label(&self, index: usize) -> Result<Label, DatasetError> {
        let raw = as_matrix(self.split.labels.index_axis(Axis(0), index), index)?;
        if !self.opts.is_classification() {
            return Ok(Label::Score(raw));
        }
        match raw.as_slice() {
            Some([flag]) => Ok(Label::Class(Array2::from_elem((1, 1), i64::from(*flag > 0.0)))),
            _ => Err(DatasetError::ShapeMismatch(format!(
                "classification needs a scalar label, sample {index} has shape {:?}",
                raw.dim()
            ))),
        }
    }
}

#[async_trait]
impl Dataset for SentimentDataset {
    type Item = SentimentSample;

    fn len(&self) -> usize {
        self.split.len()
    }

    async fn get(&self, index: usize) -> Result<Self::Item, DatasetError> {
        self.sample(index)
    }
}

fn tail(x: ArrayView2<'_, f32>, start: usize, index: usize, name: &str) -> Result<Array2<f32>, DatasetError> {
    if start > x.nrows() {
        return Err(DatasetError::ShapeMismatch(format!(
            "sample {index}: {name} has {} steps, text starts at {start}",
            x.nrows()
        )));
    }
    Ok(x.slice(s![start.., ..]).to_owned())
}

fn own_tail(x: ArrayView2<'_, f32>, index: usize, name: &str) -> Result<Array2<f32>, DatasetError> {
    let start = first_nonzero_row(x)
        .ok_or_else(|| DatasetError::malformed(index, format!("{name} is entirely zero")))?;
    Ok(x.slice(s![start.., ..]).to_owned())
}

fn flatten(x: &Array2<f32>) -> ArrayD<f32> {
    Array1::from_iter(x.iter().copied()).into_dyn()
}

/// Truncate to `n` time steps, then zero-pad on the right to exactly `n`.
pub(crate) fn pad_rows(x: ArrayView2<'_, f32>, n: usize) -> Array2<f32> {
    let mut out = Array2::zeros((n, x.ncols()));
    let k = x.nrows().min(n);
    out.slice_mut(s![..k, ..]).assign(&x.slice(s![..k, ..]));
    out
}

fn as_matrix(label: ArrayViewD<'_, f32>, index: usize) -> Result<Array2<f32>, DatasetError> {
    let shape = match label.ndim() {
        0 => (1, 1),
        1 => (1, label.len()),
        2 => (label.shape()[0], label.shape()[1]),
        _ => {
            return Err(DatasetError::ShapeMismatch(format!(
                "sample {index}: label has rank {}",
                label.ndim()
            )))
        }
    };
    Ok(Array2::from_shape_vec(shape, label.iter().copied().collect())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Task;
    use ndarray::{array, Array, Ix2, IxDyn};

    /// Three samples, 4 steps; sample 1 has one leading silent step and
    /// sample 2 has no text at all.
    fn split() -> RawSplit {
        let mut text = Array::from_shape_fn((3, 4, 2), |(i, t, f)| (i + t + f) as f32 + 1.0);
        text.slice_mut(s![1, 0, ..]).fill(0.0);
        text.slice_mut(s![2, .., ..]).fill(0.0);
        let mut audio = Array::from_shape_fn((3, 4, 3), |(i, t, f)| (i * 100 + t * 10 + f) as f32 + 1.0);
        audio[[0, 3, 2]] = f32::NEG_INFINITY;
        let vision = Array::from_shape_fn((3, 4, 1), |(_, t, _)| t as f32 + 1.0);
        let labels = ArrayD::from_shape_vec(IxDyn(&[3, 1, 1]), vec![1.5, -0.5, 0.0]).unwrap();
        RawSplit::new(text, audio, vision, labels).unwrap()
    }

    #[test]
    fn rejects_mismatched_sample_counts() {
        let s = split();
        let err = RawSplit::new(s.text, s.audio.slice(s![..2, .., ..]).to_owned(), s.vision, s.labels);
        assert!(matches!(err, Err(DatasetError::ShapeMismatch(_))));
    }

    #[test]
    fn neg_inf_audio_cleared_on_construction() {
        let ds = SentimentDataset::new(split(), SentimentOptions::default());
        assert_eq!(ds.split().audio[[0, 3, 2]], 0.0);
    }

    #[test]
    fn aligned_offset_comes_from_text() {
        let ds = SentimentDataset::new(split(), SentimentOptions::default());
        let s = ds.sample(1).unwrap();
        assert_eq!(s.text.shape(), &[3, 2]);
        assert_eq!(s.audio.shape(), &[3, 3]);
        assert_eq!(s.vision.shape(), &[3, 1]);
        assert_eq!(s.vision[[0, 0]], 2.0);
        assert_eq!(s.index, Some(1));
        assert_eq!(s.label, Label::Score(array![[-0.5f32]]));
    }

    #[test]
    fn all_zero_text_is_a_malformed_sample() {
        let ds = SentimentDataset::new(split(), SentimentOptions::default());
        match ds.sample(2) {
            Err(DatasetError::MalformedSample { index, .. }) => assert_eq!(index, 2),
            other => panic!("expected malformed sample, got {other:?}"),
        }
    }

    #[test]
    fn unaligned_trims_each_modality_independently() {
        let opts = SentimentOptions { aligned: false, ..Default::default() };
        let ds = SentimentDataset::new(split(), opts);
        let s = ds.sample(1).unwrap();
        assert_eq!(s.text.shape(), &[3, 2]);
        assert_eq!(s.vision.shape(), &[4, 1]);
        assert_eq!(s.audio.shape(), &[4, 3]);
    }

    #[test]
    fn classification_binarizes_label() {
        let opts = SentimentOptions { task: Some(Task::Classification), ..Default::default() };
        let ds = SentimentDataset::new(split(), opts);
        assert_eq!(ds.sample(0).unwrap().label, Label::Class(array![[1i64]]));
        assert_eq!(ds.sample(1).unwrap().label, Label::Class(array![[0i64]]));
    }

    #[test]
    fn z_norm_standardizes_each_modality() {
        let opts = SentimentOptions { z_norm: true, ..Default::default() };
        let ds = SentimentDataset::new(split(), opts);
        let s = ds.sample(0).unwrap();
        let text = s.text.into_dimensionality::<Ix2>().unwrap();
        for col in text.columns() {
            let mean = col.mean().unwrap();
            let std = col.std(1.0);
            assert!(mean.abs() < 1e-5);
            assert!((std - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn max_pad_truncates_and_pads() {
        for n in [2, 6] {
            let opts = SentimentOptions { max_pad: true, max_pad_num: n, ..Default::default() };
            let ds = SentimentDataset::new(split(), opts);
            let s = ds.sample(1).unwrap();
            assert_eq!(s.index, None);
            for seq in s.sequences() {
                assert_eq!(seq.shape()[0], n);
            }
            if n == 6 {
                assert!(s.text.slice(s![3.., ..]).iter().all(|&v| v == 0.0));
            }
        }
    }

    #[test]
    fn flatten_round_trips_by_reshape() {
        let ds = SentimentDataset::new(split(), SentimentOptions::default());
        let seq = ds.sample(0).unwrap();
        let flat_ds = SentimentDataset::new(
            split(),
            SentimentOptions { flatten: true, ..Default::default() },
        );
        let flat = flat_ds.sample(0).unwrap();
        assert_eq!(flat.audio.ndim(), 1);
        let back = flat.audio.clone().into_shape(seq.audio.shape()).unwrap();
        assert_eq!(back, seq.audio);
    }

    #[tokio::test]
    async fn dataset_get_checks_bounds() {
        let ds = SentimentDataset::new(split(), SentimentOptions::default());
        assert_eq!(ds.len(), 3);
        assert!(matches!(ds.get(3).await, Err(DatasetError::IndexOutOfRange(3))));
    }
}
