// src/preprocess.rs
//
// Array-level cleanup shared by the loaders: entry dropping, sentinel
// removal and z-normalization.

use ndarray::{s, Array2, Array3, ArrayView2, Axis};
use tracing::debug;

use crate::sentiment::RawSplit;

/// Index of the first time step holding any non-zero feature.
pub fn first_nonzero_row(x: ArrayView2<'_, f32>) -> Option<usize> {
    x.outer_iter().position(|row| row.iter().any(|&v| v != 0.0))
}

/// Standardize every feature column of `x` along the time axis.
///
/// `ddof` is the delta degrees of freedom of the standard deviation
/// (`0.0` population, `1.0` sample).  Results that are not finite, as
/// produced by constant columns or a single time step, become `0.0`.
pub fn z_normalize(x: ArrayView2<'_, f32>, ddof: f32) -> Array2<f32> {
    let n = x.nrows();
    let Some(mean) = x.mean_axis(Axis(0)) else {
        return x.to_owned();
    };
    let centered = &x - &mean.insert_axis(Axis(0));
    let var = centered.mapv(|v| v * v).sum_axis(Axis(0)) / (n as f32 - ddof);
    let std = var.mapv(f32::sqrt);
    let mut out = &centered / &std.insert_axis(Axis(0));
    out.mapv_inplace(|v| if v.is_finite() { v } else { 0.0 });
    out
}

/// Replace `-inf` entries (codec padding in acoustic features) with `0.0`.
pub fn clear_neg_inf(x: &mut Array3<f32>) -> usize {
    let mut replaced = 0;
    x.mapv_inplace(|v| {
        if v == f32::NEG_INFINITY {
            replaced += 1;
            0.0
        } else {
            v
        }
    });
    replaced
}

/// Remove samples whose text sums to zero from every modality.
///
/// Returns the filtered split and the number of samples dropped.
pub fn drop_entry(split: RawSplit) -> (RawSplit, usize) {
    let keep: Vec<usize> = split
        .text
        .outer_iter()
        .enumerate()
        .filter(|(_, t)| t.sum() != 0.0)
        .map(|(i, _)| i)
        .collect();
    let dropped = split.len() - keep.len();
    if dropped == 0 {
        return (split, 0);
    }
    debug!(dropped, kept = keep.len(), "dropping samples without text");
    (split.select(&keep), dropped)
}

/// Truncate each sequence modality to `max_seq_len` steps and z-normalize
/// every sample with the population standard deviation.  Labels pass
/// through untouched.
pub fn z_norm_split(split: &RawSplit, max_seq_len: usize) -> RawSplit {
    let norm = |x: &Array3<f32>| {
        let t = x.len_of(Axis(1)).min(max_seq_len);
        let mut out = x.slice(s![.., ..t, ..]).to_owned();
        for mut sample in out.outer_iter_mut() {
            let z = z_normalize(sample.view(), 0.0);
            sample.assign(&z);
        }
        out
    };
    RawSplit {
        text: norm(&split.text),
        audio: norm(&split.audio),
        vision: norm(&split.vision),
        labels: split.labels.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array, ArrayD, IxDyn};

    fn column_stats(x: &Array2<f32>, ddof: f32) -> (Vec<f32>, Vec<f32>) {
        let n = x.nrows() as f32;
        let mean = x.mean_axis(Axis(0)).unwrap();
        let var = x.var_axis(Axis(0), ddof);
        assert!(n > ddof);
        (mean.to_vec(), var.mapv(f32::sqrt).to_vec())
    }

    #[test]
    fn z_normalize_standardizes_columns() {
        let x = array![[1.0f32, 10.0], [2.0, 20.0], [3.0, 60.0], [6.0, 10.0]];
        for ddof in [0.0, 1.0] {
            let z = z_normalize(x.view(), ddof);
            let (mean, std) = column_stats(&z, ddof);
            for (m, s) in mean.iter().zip(&std) {
                assert!(m.abs() < 1e-5, "mean {m}");
                assert!((s - 1.0).abs() < 1e-4, "std {s}");
            }
        }
    }

    #[test]
    fn constant_columns_become_zero() {
        let x = array![[5.0f32, 1.0], [5.0, 2.0], [5.0, 4.0]];
        let z = z_normalize(x.view(), 1.0);
        assert!(z.column(0).iter().all(|&v| v == 0.0));
        assert!(z.column(1).iter().all(|v| v.is_finite() && *v != 0.0));
    }

    #[test]
    fn single_step_with_sample_std_is_zero() {
        let x = array![[3.0f32, -2.0]];
        let z = z_normalize(x.view(), 1.0);
        assert_eq!(z, array![[0.0f32, 0.0]]);
    }

    #[test]
    fn first_nonzero_skips_leading_padding() {
        let x = array![[0.0f32, 0.0], [0.0, 0.5], [1.0, 1.0]];
        assert_eq!(first_nonzero_row(x.view()), Some(1));
        assert_eq!(first_nonzero_row(Array2::<f32>::zeros((3, 2)).view()), None);
    }

    #[test]
    fn neg_inf_is_cleared() {
        let mut x = Array3::from_elem((1, 2, 2), 1.0f32);
        x[[0, 1, 0]] = f32::NEG_INFINITY;
        x[[0, 1, 1]] = f32::INFINITY;
        assert_eq!(clear_neg_inf(&mut x), 1);
        assert_eq!(x[[0, 1, 0]], 0.0);
        assert_eq!(x[[0, 1, 1]], f32::INFINITY);
    }

    fn split_with_text(text: Array3<f32>) -> RawSplit {
        let n = text.len_of(Axis(0));
        let audio = Array::from_shape_fn((n, 3, 1), |(i, t, _)| (i * 10 + t) as f32);
        let vision = Array::from_shape_fn((n, 3, 2), |(i, _, f)| (i + f) as f32);
        let labels = ArrayD::from_shape_fn(IxDyn(&[n, 1, 1]), |d| d[0] as f32);
        RawSplit::new(text, audio, vision, labels).unwrap()
    }

    #[test]
    fn drop_entry_filters_all_modalities() {
        let mut text = Array3::<f32>::zeros((4, 3, 2));
        text[[0, 2, 1]] = 1.0;
        text[[2, 0, 0]] = 0.5;
        let (split, dropped) = drop_entry(split_with_text(text));

        assert_eq!(dropped, 2);
        assert_eq!(split.len(), 2);
        assert!(split.text.outer_iter().all(|t| t.sum() != 0.0));
        assert_eq!(split.audio.len_of(Axis(0)), 2);
        assert_eq!(split.vision.len_of(Axis(0)), 2);
        // samples 0 and 2 survive, in order
        assert_eq!(split.audio[[1, 0, 0]], 20.0);
        assert_eq!(split.labels.as_slice().unwrap(), &[0.0, 2.0]);
    }

    #[test]
    fn z_norm_split_truncates_time_axis() {
        let text = Array::from_shape_fn((2, 3, 2), |(i, t, f)| (i + t * 2 + f) as f32 + 1.0);
        let split = split_with_text(text);
        let normed = z_norm_split(&split, 2);
        assert_eq!(normed.text.dim(), (2, 2, 2));
        assert_eq!(normed.vision.dim(), (2, 2, 2));
        assert_eq!(normed.labels, split.labels);
        // vision is constant over time per sample
        assert!(normed.vision.iter().all(|&v| v == 0.0));
    }
}
