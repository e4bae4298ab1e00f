//! Heatmap → image-space keypoint decoding.
//!
//! [`keypoints_from_heatmaps`] is the full pipeline:
//!
//! 1. optional Gaussian blur (inside the Taylor/DARK refiners, or the
//!    combined-target decoder),
//! 2. per-channel maximum finding,
//! 3. sub-pixel refinement with the configured
//!    [`RefineMethod`](crate::refine::RefineMethod),
//! 4. per-instance transform back to the image with the instance's
//!    [`CenterScale`].
//!
//! Instances never depend on each other; with the `parallel` feature they
//! are decoded on the rayon pool.

use ndarray::{Array1, Array2, Array3, ArrayView3, ArrayView4, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::heatmap::{ensure_non_empty, heatmap_maximum};
use crate::transform::{transform_preds, CenterScale};

mod combined;
mod config;

pub use config::{DecodeConfig, TargetType};

/// One decoded keypoint in image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KeypointPrediction {
    pub x: f32,
    pub y: f32,
    /// Peak heatmap value; `<= 0` marks a keypoint that was not found.
    pub score: f32,
}

/// Output of [`keypoints_from_heatmaps`].
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedKeypoints {
    /// Image-space coordinates, `[N, K, 2]`.
    pub keypoints: Array3<f32>,
    /// Peak confidences, `[N, K, 1]`.
    pub scores: Array3<f32>,
}

impl DecodedKeypoints {
    pub fn num_instances(&self) -> usize {
        self.keypoints.len_of(Axis(0))
    }

    pub fn num_keypoints(&self) -> usize {
        self.keypoints.len_of(Axis(1))
    }

    /// Flatten into per-instance rows of [`KeypointPrediction`].
    pub fn predictions(&self) -> Vec<Vec<KeypointPrediction>> {
        (0..self.num_instances())
            .map(|i| {
                (0..self.num_keypoints())
                    .map(|k| KeypointPrediction {
                        x: self.keypoints[[i, k, 0]],
                        y: self.keypoints[[i, k, 1]],
                        score: self.scores[[i, k, 0]],
                    })
                    .collect()
            })
            .collect()
    }
}

/// Heatmap-space peaks and scores of one instance.
fn locate_instance(
    heatmaps: ArrayView3<f32>,
    config: &DecodeConfig,
) -> Result<(Array2<f32>, Array1<f32>)> {
    match config.target_type {
        TargetType::GaussianHeatmap => {
            let k = heatmaps.len_of(Axis(0));
            let mut coords = Array2::<f32>::zeros((k, 2));
            let mut maxvals = Array1::<f32>::zeros(k);
            for (j, plane) in heatmaps.axis_iter(Axis(0)).enumerate() {
                let (xy, v) = heatmap_maximum(plane);
                coords[[j, 0]] = xy[0];
                coords[[j, 1]] = xy[1];
                maxvals[j] = v;
            }
            if config.post_process {
                coords = config
                    .refine
                    .refine(coords.view(), heatmaps, config.blur_kernel)?;
            }
            Ok((coords, maxvals))
        }
        TargetType::CombinedTarget => {
            combined::decode_combined_instance(heatmaps, config.blur_kernel, config.kpd)
        }
    }
}

fn decode_instance(
    heatmaps: ArrayView3<f32>,
    cs: &CenterScale,
    config: &DecodeConfig,
) -> Result<(Array2<f32>, Array1<f32>)> {
    let (_, h, w) = heatmaps.dim();
    let (coords, maxvals) = locate_instance(heatmaps, config)?;
    Ok((transform_preds(coords.view(), cs, [w, h], config.use_udp), maxvals))
}

/// Decode `[N, K, H, W]` heatmaps into image-space keypoints and scores.
///
/// `center_scales` holds one box descriptor per instance. With
/// [`TargetType::CombinedTarget`] the channel count must be `3K` and the
/// output has `K` keypoints.
pub fn keypoints_from_heatmaps(
    heatmaps: ArrayView4<f32>,
    center_scales: &[CenterScale],
    config: &DecodeConfig,
) -> Result<DecodedKeypoints> {
    config.validate()?;
    ensure_non_empty(&heatmaps)?;
    let (n, channels, h, w) = heatmaps.dim();
    if center_scales.len() != n {
        return Err(Error::ShapeMismatch {
            what: "center/scale count",
            expected: vec![n],
            got: vec![center_scales.len()],
        });
    }
    let per_kp = config.target_type.channels_per_keypoint();
    if channels % per_kp != 0 {
        return Err(Error::CombinedTargetChannels { channels });
    }
    let k = channels / per_kp;
    tracing::debug!(
        n,
        k,
        h,
        w,
        post_process = config.post_process,
        refine = %config.refine,
        target = %config.target_type,
        use_udp = config.use_udp,
        "decoding heatmaps"
    );
    for (i, cs) in center_scales.iter().enumerate() {
        if cs.scale.iter().any(|s| !(s.is_finite() && *s > 0.0)) {
            tracing::warn!(instance = i, scale = ?cs.scale, "non-positive instance scale");
        }
    }

    let decode_one =
        |i: usize| decode_instance(heatmaps.index_axis(Axis(0), i), &center_scales[i], config);

    #[cfg(feature = "parallel")]
    let per_instance: Vec<(Array2<f32>, Array1<f32>)> = {
        use rayon::prelude::*;
        (0..n)
            .into_par_iter()
            .map(decode_one)
            .collect::<Result<Vec<_>>>()?
    };
    #[cfg(not(feature = "parallel"))]
    let per_instance: Vec<(Array2<f32>, Array1<f32>)> =
        (0..n).map(decode_one).collect::<Result<Vec<_>>>()?;

    let mut keypoints = Array3::<f32>::zeros((n, k, 2));
    let mut scores = Array3::<f32>::zeros((n, k, 1));
    for (i, (coords, maxvals)) in per_instance.into_iter().enumerate() {
        keypoints.index_axis_mut(Axis(0), i).assign(&coords);
        scores
            .index_axis_mut(Axis(0), i)
            .index_axis_move(Axis(1), 0)
            .assign(&maxvals);
    }
    Ok(DecodedKeypoints { keypoints, scores })
}
