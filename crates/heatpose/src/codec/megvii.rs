use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView2, ArrayView3, Axis};
use serde::{Deserialize, Serialize};

use super::{check_decode_input, check_encode_inputs, feature_stride, EncodedHeatmaps, KeypointCodec};
use crate::blur::{gaussian_blur_2d, modulate_plane, BorderMode};
use crate::error::{ensure_odd_kernel, Result};
use crate::heatmap::{heatmap_maximum, is_sentinel};
use crate::refine::shift_keypoint;

/// Peak value of an encoded Megvii target.
const TARGET_PEAK: f32 = 255.0;

/// Parameters of [`MegviiHeatmap`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MegviiHeatmapConfig {
    /// Input image size `[w, h]`.
    pub input_size: [usize; 2],
    /// Heatmap size `[W, H]`.
    pub heatmap_size: [usize; 2],
    /// Odd Gaussian kernel used for both encoding and decode modulation.
    pub kernel_size: usize,
}

/// Blurred one-hot heatmap codec.
#[derive(Debug, Clone)]
pub struct MegviiHeatmap {
    config: MegviiHeatmapConfig,
    stride: [f32; 2],
}

impl MegviiHeatmap {
    pub fn new(config: MegviiHeatmapConfig) -> Result<Self> {
        let stride = feature_stride(config.input_size, config.heatmap_size)?;
        ensure_odd_kernel(config.kernel_size)?;
        Ok(Self { config, stride })
    }

    pub fn config(&self) -> &MegviiHeatmapConfig {
        &self.config
    }
}

impl KeypointCodec for MegviiHeatmap {
    fn heatmap_size(&self) -> [usize; 2] {
        self.config.heatmap_size
    }

    fn encode(
        &self,
        keypoints: ArrayView2<f32>,
        visible: ArrayView1<f32>,
    ) -> Result<EncodedHeatmaps> {
        let k = check_encode_inputs(&keypoints, &visible)?;
        let [w, h] = self.config.heatmap_size;
        let mut heatmaps = Array3::<f32>::zeros((k, h, w));
        let mut keypoint_weights = Array1::<f32>::ones(k);

        for (j, mut plane) in heatmaps.axis_iter_mut(Axis(0)).enumerate() {
            if visible[j] < 0.5 {
                keypoint_weights[j] = 0.0;
                continue;
            }
            let kx = (keypoints[[j, 0]] / self.stride[0]).floor();
            let ky = (keypoints[[j, 1]] / self.stride[1]).floor();
            if kx < 0.0 || ky < 0.0 || kx >= w as f32 || ky >= h as f32 {
                tracing::trace!(keypoint = j, kx, ky, "keypoint outside heatmap, weight 0");
                keypoint_weights[j] = 0.0;
                continue;
            }
            let (kx, ky) = (kx as usize, ky as usize);
            let mut one_hot = Array2::<f32>::zeros((h, w));
            one_hot[[ky, kx]] = 1.0;
            let mut blurred = gaussian_blur_2d(
                one_hot.view(),
                self.config.kernel_size,
                0.0,
                BorderMode::Reflect101,
            )?;
            let peak = blurred[[ky, kx]];
            if peak > 0.0 {
                blurred.mapv_inplace(|v| v / peak * TARGET_PEAK);
            }
            plane.assign(&blurred);
        }
        Ok(EncodedHeatmaps {
            heatmaps,
            keypoint_weights,
        })
    }

    /// Scores are `max / 255 + 0.5` of the modulated heatmap. Channels with
    /// no positive response decode to `(-1, -1)`.
    fn decode(&self, heatmaps: ArrayView3<f32>) -> Result<(Array2<f32>, Array1<f32>)> {
        check_decode_input(&heatmaps, self.config.heatmap_size)?;
        let k = heatmaps.len_of(Axis(0));
        let mut keypoints = Array2::<f32>::zeros((k, 2));
        let mut scores = Array1::<f32>::zeros(k);

        for (j, raw) in heatmaps.axis_iter(Axis(0)).enumerate() {
            let plane = modulate_plane(raw, self.config.kernel_size)?;
            let (h, w) = plane.dim();
            let (mut xy, v) = heatmap_maximum(plane.view());
            if !is_sentinel(xy) {
                let (px, py) = (xy[0] as usize, xy[1] as usize);
                if 1 < px && px + 1 < w && 1 < py && py + 1 < h {
                    let shifted = shift_keypoint(plane.view(), xy);
                    xy = [shifted[0] + 0.5, shifted[1] + 0.5];
                }
            }
            if !is_sentinel(xy) {
                xy = [xy[0] * self.stride[0], xy[1] * self.stride[1]];
            }
            keypoints[[j, 0]] = xy[0];
            keypoints[[j, 1]] = xy[1];
            scores[j] = v / TARGET_PEAK + 0.5;
        }
        Ok((keypoints, scores))
    }
}
