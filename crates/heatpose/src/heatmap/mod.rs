//! Heatmap containers and peak extraction.
//!
//! Heatmaps are `(instance, channel, row, col)` arrays of non-negative
//! confidences, i.e. `[N, K, H, W]`.

use ndarray::{Array4, ArrayView4};

use crate::error::{Error, Result};

mod maximum;

pub use maximum::{get_max_preds, heatmap_maximum};

/// Batch of heatmaps in `[N, K, H, W]` layout.
pub type Heatmaps = Array4<f32>;

/// Build a [`Heatmaps`] batch from a dynamic shape and flat row-major data.
///
/// Fails when `shape` is not 4-D, when the planes are empty, or when the data
/// length disagrees with the shape.
pub fn heatmaps_from_shape_vec(shape: &[usize], data: Vec<f32>) -> Result<Heatmaps> {
    if shape.len() != 4 {
        return Err(Error::InvalidRank {
            expected: 4,
            got: shape.len(),
        });
    }
    if shape[2] == 0 || shape[3] == 0 {
        return Err(Error::EmptyHeatmap);
    }
    let expected: usize = shape.iter().product();
    if expected != data.len() {
        return Err(Error::ShapeMismatch {
            what: "heatmap data length",
            expected: vec![expected],
            got: vec![data.len()],
        });
    }
    Array4::from_shape_vec((shape[0], shape[1], shape[2], shape[3]), data).map_err(|_| {
        Error::ShapeMismatch {
            what: "heatmap shape",
            expected: shape.to_vec(),
            got: vec![expected],
        }
    })
}

/// Reject batches whose planes have no pixels.
pub(crate) fn ensure_non_empty(heatmaps: &ArrayView4<f32>) -> Result<()> {
    let (_, _, h, w) = heatmaps.dim();
    if h == 0 || w == 0 {
        return Err(Error::EmptyHeatmap);
    }
    Ok(())
}

/// Returns `true` for the `(-1, -1)` invalid-keypoint sentinel.
#[inline]
pub(crate) fn is_sentinel(xy: [f32; 2]) -> bool {
    xy[0] < 0.0 || xy[1] < 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_shape_vec_accepts_4d() {
        let hm = heatmaps_from_shape_vec(&[1, 2, 3, 4], vec![0.0; 24]).unwrap();
        assert_eq!(hm.dim(), (1, 2, 3, 4));
    }

    #[test]
    fn from_shape_vec_rejects_wrong_rank() {
        let err = heatmaps_from_shape_vec(&[2, 3, 4], vec![0.0; 24]).unwrap_err();
        assert!(matches!(err, Error::InvalidRank { expected: 4, got: 3 }));
    }

    #[test]
    fn from_shape_vec_rejects_length_mismatch() {
        let err = heatmaps_from_shape_vec(&[1, 1, 4, 4], vec![0.0; 15]).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn from_shape_vec_rejects_empty_planes() {
        let err = heatmaps_from_shape_vec(&[1, 1, 0, 4], Vec::new()).unwrap_err();
        assert!(matches!(err, Error::EmptyHeatmap));
    }
}
