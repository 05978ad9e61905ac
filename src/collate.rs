// src/collate.rs
//
// Batch collation: turn a vector of independently sized samples into one
// fixed-shape batch.

use ndarray::{Array1, Array2, Array3, ArrayD, ArrayViewD, Axis, IxDyn, Slice};
use tracing::debug;

use crate::config::SentimentOptions;
use crate::constants::{AUDIO, TEXT, VISION};
use crate::data_loader::DatasetError;
use crate::meld::MeldRecord;
use crate::sentiment::{Label, SentimentSample};

/// Combines a batch of samples into a single value.
pub trait Collate: Send + Sync + 'static {
    type Item: Send + 'static;
    type Batch: Send + 'static;

    fn collate(&self, samples: Vec<Self::Item>) -> Result<Self::Batch, DatasetError>;
}

/// Right-pad every sequence along its first axis to the longest one and
/// stack them into `batch × time × ...`.
pub fn pad_sequence<A>(seqs: &[ArrayViewD<'_, A>]) -> Result<ArrayD<A>, DatasetError>
where
    A: Clone + Default,
{
    let first = seqs
        .first()
        .ok_or_else(|| DatasetError::ShapeMismatch("cannot pad an empty batch".into()))?;
    if first.ndim() == 0 {
        return Err(DatasetError::ShapeMismatch("cannot pad rank-0 values".into()));
    }
    let trailing = &first.shape()[1..];
    if let Some(bad) = seqs.iter().find(|x| x.ndim() != first.ndim() || &x.shape()[1..] != trailing) {
        return Err(DatasetError::ShapeMismatch(format!(
            "sequence shapes {:?} and {:?} differ beyond the time axis",
            first.shape(),
            bad.shape()
        )));
    }
    let max_len = seqs.iter().map(|x| x.len_of(Axis(0))).max().unwrap_or(0);

    let mut shape = vec![seqs.len(), max_len];
    shape.extend_from_slice(trailing);
    let mut out = ArrayD::from_elem(IxDyn(&shape), A::default());
    for (mut row, seq) in out.outer_iter_mut().zip(seqs) {
        row.slice_axis_mut(Axis(0), Slice::from(..seq.len_of(Axis(0))))
            .assign(seq);
    }
    Ok(out)
}

/// Insert one default-valued step at the front of axis 1 (the time axis
/// of a batch).
fn prepend_step<A>(x: &ArrayD<A>) -> ArrayD<A>
where
    A: Clone + Default,
{
    let mut shape = x.shape().to_vec();
    shape[1] += 1;
    let mut out = ArrayD::from_elem(IxDyn(&shape), A::default());
    out.slice_axis_mut(Axis(1), Slice::from(1..)).assign(x);
    out
}

fn time_lengths(seqs: &[ArrayViewD<'_, f32>]) -> Array1<i64> {
    seqs.iter().map(|x| x.len_of(Axis(0)) as i64).collect()
}

// ────────────────────────────────────────────────────────────────────────────
// Continuous family
// ────────────────────────────────────────────────────────────────────────────

/// Batch labels as a `(batch, 1)` column.
#[derive(Debug, Clone, PartialEq)]
pub enum LabelBatch {
    Class(Array2<i64>),
    Score(Array2<f32>),
}

impl LabelBatch {
    pub fn len(&self) -> usize {
        match self {
            LabelBatch::Class(a) => a.nrows(),
            LabelBatch::Score(a) => a.nrows(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Keep the first `rows` values of a multi-column label, as if it were
/// reshaped to `(cols, rows)` and its first row taken.
fn label_values<A: Copy>(label: &Array2<A>) -> Vec<A> {
    let (rows, cols) = label.dim();
    if cols > 1 {
        label.iter().take(rows).copied().collect()
    } else {
        label.iter().copied().collect()
    }
}

fn column<A: Copy>(values: Vec<A>, batch: usize) -> Result<Array2<A>, DatasetError> {
    let n = values.len();
    Array2::from_shape_vec((batch, 1), values).map_err(|_| {
        DatasetError::ShapeMismatch(format!("{n} label values do not form a ({batch}, 1) column"))
    })
}

/// Collect per-sample labels into a `(batch, 1)` column vector.
pub fn collate_labels(labels: &[&Label]) -> Result<LabelBatch, DatasetError> {
    let batch = labels.len();
    match labels.first() {
        Some(Label::Class(_)) => {
            let mut values = Vec::with_capacity(batch);
            for label in labels {
                match label {
                    Label::Class(a) => values.extend(label_values(a)),
                    Label::Score(_) => return Err(mixed_labels()),
                }
            }
            Ok(LabelBatch::Class(column(values, batch)?))
        }
        _ => {
            let mut values = Vec::with_capacity(batch);
            for label in labels {
                match label {
                    Label::Score(a) => values.extend(label_values(a)),
                    Label::Class(_) => return Err(mixed_labels()),
                }
            }
            Ok(LabelBatch::Score(column(values, batch)?))
        }
    }
}

fn mixed_labels() -> DatasetError {
    DatasetError::ShapeMismatch("batch mixes class and score labels".into())
}

/// Output of the unpadded strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceBatch {
    /// Vision, audio, text; each `batch × max_len × feature` (or
    /// `batch × max_len` for flattened samples), zero padded.
    pub inputs: [ArrayD<f32>; 3],
    /// True time-axis length of every sample, per modality.
    pub lengths: [Array1<i64>; 3],
    /// `(batch, 1)` sample indices.
    pub indices: Array2<i64>,
    pub labels: LabelBatch,
}

/// Output of the pre-padded strategy; every sequence is `max_pad_num` long.
#[derive(Debug, Clone, PartialEq)]
pub struct PaddedBatch {
    pub vision: ArrayD<f32>,
    pub audio: ArrayD<f32>,
    pub text: ArrayD<f32>,
    pub labels: LabelBatch,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SentimentBatch {
    Sequence(SequenceBatch),
    Padded(PaddedBatch),
}

impl SentimentBatch {
    pub fn len(&self) -> usize {
        match self {
            SentimentBatch::Sequence(b) => b.labels.len(),
            SentimentBatch::Padded(b) => b.labels.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn labels(&self) -> &LabelBatch {
        match self {
            SentimentBatch::Sequence(b) => &b.labels,
            SentimentBatch::Padded(b) => &b.labels,
        }
    }
}

fn modality_views(samples: &[SentimentSample], m: usize) -> Vec<ArrayViewD<'_, f32>> {
    samples
        .iter()
        .map(|s| {
            let seq: &ArrayD<f32> = s.sequences()[m];
            seq.view()
        })
        .collect()
}

/// Pad each modality to the batch maximum and record true lengths.
pub fn collate_unpadded(samples: &[SentimentSample]) -> Result<SequenceBatch, DatasetError> {
    let views = [0, 1, 2].map(|m| modality_views(samples, m));
    let lengths = views.each_ref().map(|v| time_lengths(v));
    let [vision, audio, text] = &views;
    let inputs = [pad_sequence(vision)?, pad_sequence(audio)?, pad_sequence(text)?];

    let indices = samples
        .iter()
        .map(|s| {
            s.index.map(|i| i as i64).ok_or_else(|| {
                DatasetError::ShapeMismatch("unpadded collation needs sample indices".into())
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let labels: Vec<&Label> = samples.iter().map(|s| &s.label).collect();

    Ok(SequenceBatch {
        inputs,
        lengths,
        indices: column(indices, samples.len())?,
        labels: collate_labels(&labels)?,
    })
}

/// Stack samples that are already padded to a common length.
pub fn collate_prepadded(samples: &[SentimentSample]) -> Result<PaddedBatch, DatasetError> {
    let stack = |m: usize| -> Result<ArrayD<f32>, DatasetError> {
        let views = modality_views(samples, m);
        let Some(first) = views.first() else {
            return Err(DatasetError::ShapeMismatch("cannot stack an empty batch".into()));
        };
        if views.iter().any(|v| v.shape() != first.shape()) {
            let shapes: Vec<&[usize]> = views.iter().map(|v| v.shape()).collect();
            return Err(DatasetError::ShapeMismatch(format!(
                "{} samples are not padded to a common shape: {shapes:?}",
                [VISION, AUDIO, TEXT][m]
            )));
        }
        Ok(ndarray::stack(Axis(0), &views)?)
    };
    let labels: Vec<&Label> = samples.iter().map(|s| &s.label).collect();
    Ok(PaddedBatch {
        vision: stack(0)?,
        audio: stack(1)?,
        text: stack(2)?,
        labels: collate_labels(&labels)?,
    })
}

/// Which of the two continuous collation routines a loader uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollateStrategy {
    /// Variable-length samples, padded per batch.
    Unpadded,
    /// Samples padded to `max_pad_num` by the dataset.
    Prepadded,
}

impl CollateStrategy {
    /// Fixed-length stacking only applies to padded, unflattened samples;
    /// flattened samples differ in length and take the unpadded path.
    pub fn for_options(opts: &SentimentOptions) -> Self {
        if opts.max_pad && !opts.flatten {
            CollateStrategy::Prepadded
        } else {
            CollateStrategy::Unpadded
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SentimentCollator {
    strategy: CollateStrategy,
}

impl SentimentCollator {
    pub fn new(strategy: CollateStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> CollateStrategy {
        self.strategy
    }
}

impl Collate for SentimentCollator {
    type Item = SentimentSample;
    type Batch = SentimentBatch;

    fn collate(&self, samples: Vec<SentimentSample>) -> Result<SentimentBatch, DatasetError> {
        match self.strategy {
            CollateStrategy::Unpadded => collate_unpadded(&samples).map(SentimentBatch::Sequence),
            CollateStrategy::Prepadded => collate_prepadded(&samples).map(SentimentBatch::Padded),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Discrete family
// ────────────────────────────────────────────────────────────────────────────

/// A meld batch, sorted by ascending token length.
///
/// Every modality starts with one reserved all-zero step, so `lengths`
/// are the token counts plus one.
#[derive(Debug, Clone, PartialEq)]
pub struct MeldBatch {
    /// `batch × (max_tokens + 1)`
    pub text: Array2<i64>,
    /// `batch × (max_frames + 1) × visual_size`
    pub visual: Array3<f32>,
    /// `batch × (max_frames + 1) × acoustic_size`
    pub acoustic: Array3<f32>,
    pub labels: Array1<i64>,
    pub lengths: Array1<i64>,
    /// Reserved auxiliary slots; this collator leaves them empty.
    pub extra: [Option<ArrayD<f32>>; 2],
    /// `mask[[b, t]]` is true while `t < lengths[b]`.
    pub mask: Array2<bool>,
    /// Record ids in batch order.
    pub ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MeldCollator;

impl Collate for MeldCollator {
    type Item = MeldRecord;
    type Batch = MeldBatch;

    fn collate(&self, mut batch: Vec<MeldRecord>) -> Result<MeldBatch, DatasetError> {
        batch.sort_by_key(MeldRecord::token_len);

        let tokens: Vec<_> = batch.iter().map(|r| r.token_ids.view().into_dyn()).collect();
        let video: Vec<_> = batch.iter().map(|r| r.video_features.view().into_dyn()).collect();
        let audio: Vec<_> = batch.iter().map(|r| r.audio_features.view().into_dyn()).collect();

        let text: Array2<i64> = prepend_step(&pad_sequence(&tokens)?).into_dimensionality()?;
        let visual: Array3<f32> = prepend_step(&pad_sequence(&video)?).into_dimensionality()?;
        let acoustic: Array3<f32> = prepend_step(&pad_sequence(&audio)?).into_dimensionality()?;

        let lengths: Array1<i64> = batch.iter().map(|r| r.token_len() as i64 + 1).collect();
        let mask = Array2::from_shape_fn((batch.len(), text.ncols()), |(b, t)| (t as i64) < lengths[b]);
        debug!(batch = batch.len(), steps = text.ncols(), "meld batch");

        Ok(MeldBatch {
            labels: batch.iter().map(|r| r.label).collect(),
            ids: batch.into_iter().map(|r| r.id).collect(),
            text,
            visual,
            acoustic,
            lengths,
            extra: [None, None],
            mask,
        })
    }
}
