//! Pair feature assembly.
//!
//! Each row of the feature matrix is a reference patch (row-major) followed
//! by the probe patch, so a 50×50 pair yields 5000 features.

use crate::gallery::Subject;
use crate::types::{Patch, FEATURE_LEN, PATCH_PIXELS, PATCH_SIZE};
use ndarray::{s, Array2, ArrayView2, ArrayViewMut1};
use std::fmt;
use thiserror::Error;

const RAW_SCALE: f32 = 1.0 / 255.0;

/// Which half of a pair failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairSide {
    Reference,
    Probe,
}

impl fmt::Display for PairSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairSide::Reference => f.write_str("reference"),
            PairSide::Probe => f.write_str("probe"),
        }
    }
}

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("pair {pair}: {side} patch is {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        pair: usize,
        side: PairSide,
        expected: (usize, usize),
        actual: (usize, usize),
    },
}

/// Build the (N, 5000) feature matrix for N `(reference, probe)` pairs.
///
/// A patch holding any value above 1.0 is taken as raw 0–255 intensities and
/// divided by 255. Every output value is clamped into [0, 1].
pub fn build_dataset<'a, I>(pairs: I) -> Result<Array2<f32>, DatasetError>
where
    I: IntoIterator<Item = (ArrayView2<'a, f32>, ArrayView2<'a, f32>)>,
{
    let pairs: Vec<_> = pairs.into_iter().collect();

    for (pair, (reference, probe)) in pairs.iter().enumerate() {
        check_shape(pair, PairSide::Reference, reference)?;
        check_shape(pair, PairSide::Probe, probe)?;
    }

    let mut features = Array2::<f32>::zeros((pairs.len(), FEATURE_LEN));
    for (mut row, (reference, probe)) in features.rows_mut().into_iter().zip(&pairs) {
        write_normalized(row.slice_mut(s![..PATCH_PIXELS]), reference);
        write_normalized(row.slice_mut(s![PATCH_PIXELS..]), probe);
    }

    tracing::debug!(rows = pairs.len(), cols = FEATURE_LEN, "feature matrix built");
    Ok(features)
}

/// Pair a probe with every subject, preserving subject order.
pub fn pair_with_subjects<'a>(
    probe: &'a Patch,
    subjects: &'a [Subject],
) -> Vec<(ArrayView2<'a, f32>, ArrayView2<'a, f32>)> {
    subjects
        .iter()
        .map(|subject| (subject.patch.view(), probe.view()))
        .collect()
}

fn check_shape(
    pair: usize,
    side: PairSide,
    patch: &ArrayView2<'_, f32>,
) -> Result<(), DatasetError> {
    let expected = (PATCH_SIZE, PATCH_SIZE);
    if patch.dim() != expected {
        return Err(DatasetError::ShapeMismatch {
            pair,
            side,
            expected,
            actual: patch.dim(),
        });
    }
    Ok(())
}

fn write_normalized(mut out: ArrayViewMut1<'_, f32>, patch: &ArrayView2<'_, f32>) {
    let scale = if patch.iter().any(|&v| v > 1.0) { RAW_SCALE } else { 1.0 };
    for (dst, &src) in out.iter_mut().zip(patch.iter()) {
        *dst = (src * scale).clamp(0.0, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn test_build_dataset_shape() {
        let reference = Array2::<f32>::zeros((50, 50));
        let probe = Array2::<f32>::ones((50, 50));

        let x = build_dataset([(reference.view(), probe.view())]).unwrap();
        assert_eq!(x.dim(), (1, 5000));
    }

    #[test]
    fn test_build_dataset_value_range_raw_input() {
        let reference = Array2::<f32>::zeros((50, 50)) * 255.0;
        let probe = Array2::<f32>::ones((50, 50)) * 255.0;

        let x = build_dataset([(reference.view(), probe.view())]).unwrap();
        let min = x.iter().copied().fold(f32::INFINITY, f32::min);
        let max = x.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        assert!(min >= 0.0);
        assert!(max <= 1.0);
        assert!((max - 1.0).abs() < 1e-6, "raw 255 should scale to 1.0");
    }

    #[test]
    fn test_build_dataset_reference_then_probe() {
        let reference = Array2::from_shape_fn((50, 50), |(r, c)| ((r * 50 + c) % 7) as f32 / 10.0);
        let probe = Array2::<f32>::from_elem((50, 50), 0.25);

        let x = build_dataset([(reference.view(), probe.view())]).unwrap();
        let flat: Vec<f32> = reference.iter().copied().collect();
        assert_eq!(x.slice(s![0, ..2500]).to_vec(), flat);
        assert!(x.slice(s![0, 2500..]).iter().all(|&v| v == 0.25));
    }

    #[test]
    fn test_build_dataset_preserves_pair_order() {
        let a = Array2::<f32>::from_elem((50, 50), 0.1);
        let b = Array2::<f32>::from_elem((50, 50), 0.9);
        let probe = Array2::<f32>::from_elem((50, 50), 0.5);

        let x = build_dataset([(a.view(), probe.view()), (b.view(), probe.view())]).unwrap();
        assert_eq!(x.dim(), (2, 5000));
        assert!((x[[0, 0]] - 0.1).abs() < 1e-6);
        assert!((x[[1, 0]] - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_build_dataset_clamps_negative_values() {
        let reference = Array2::<f32>::from_elem((50, 50), -0.5);
        let probe = Array2::<f32>::from_elem((50, 50), 0.5);

        let x = build_dataset([(reference.view(), probe.view())]).unwrap();
        assert!(x.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_build_dataset_shape_mismatch() {
        let reference = Array2::<f32>::zeros((50, 50));
        let probe = Array2::<f32>::zeros((40, 50));

        let err = build_dataset([(reference.view(), probe.view())]).unwrap_err();
        match err {
            DatasetError::ShapeMismatch { pair, side, actual, .. } => {
                assert_eq!(pair, 0);
                assert_eq!(side, PairSide::Probe);
                assert_eq!(actual, (40, 50));
            }
        }
    }

    #[test]
    fn test_build_dataset_empty() {
        let x = build_dataset(Vec::<(ArrayView2<f32>, ArrayView2<f32>)>::new()).unwrap();
        assert_eq!(x.dim(), (0, 5000));
    }

    #[test]
    fn test_pair_with_subjects_order() {
        let probe = Patch::from_gray(&GrayImage::from_pixel(50, 50, Luma([0])));
        let subjects = vec![
            Subject::new("b", Patch::from_gray(&GrayImage::from_pixel(50, 50, Luma([255])))),
            Subject::new("a", Patch::from_gray(&GrayImage::from_pixel(50, 50, Luma([51])))),
        ];

        let x = build_dataset(pair_with_subjects(&probe, &subjects)).unwrap();
        assert_eq!(x.dim(), (2, 5000));
        assert!((x[[0, 0]] - 1.0).abs() < 1e-6);
        assert!((x[[1, 0]] - 0.2).abs() < 1e-6);
        assert_eq!(x[[0, 4999]], 0.0);
    }
}
