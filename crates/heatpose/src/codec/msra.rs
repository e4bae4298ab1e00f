use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView2, ArrayView3, Axis};
use serde::{Deserialize, Serialize};

use super::{check_decode_input, check_encode_inputs, feature_stride, EncodedHeatmaps, KeypointCodec};
use crate::error::{ensure_odd_kernel, Error, Result};
use crate::heatmap::{heatmap_maximum, is_sentinel};
use crate::refine::{refine_shift, refine_taylor};

fn default_blur_kernel() -> usize {
    11
}

/// Parameters of [`MsraHeatmap`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsraHeatmapConfig {
    /// Input image size `[w, h]`.
    pub input_size: [usize; 2],
    /// Heatmap size `[W, H]`.
    pub heatmap_size: [usize; 2],
    /// Gaussian sigma in heatmap pixels.
    pub sigma: f32,
    /// Exact sub-pixel targets and Taylor decoding.
    #[serde(default)]
    pub unbiased: bool,
    /// Modulation kernel for unbiased decoding.
    #[serde(default = "default_blur_kernel")]
    pub blur_kernel_size: usize,
}

/// Gaussian heatmap codec.
#[derive(Debug, Clone)]
pub struct MsraHeatmap {
    config: MsraHeatmapConfig,
    stride: [f32; 2],
}

impl MsraHeatmap {
    pub fn new(config: MsraHeatmapConfig) -> Result<Self> {
        let stride = feature_stride(config.input_size, config.heatmap_size)?;
        if !(config.sigma.is_finite() && config.sigma > 0.0) {
            return Err(Error::InvalidArgument(format!(
                "sigma must be finite and positive, got {}",
                config.sigma
            )));
        }
        if config.unbiased {
            ensure_odd_kernel(config.blur_kernel_size)?;
        }
        Ok(Self { config, stride })
    }

    pub fn config(&self) -> &MsraHeatmapConfig {
        &self.config
    }

    /// Gaussian patch radius in heatmap pixels.
    fn radius(&self) -> f32 {
        3.0 * self.config.sigma
    }

    /// `true` when the `±radius` window around `mu` misses the heatmap.
    fn outside(&self, mu: [f32; 2]) -> bool {
        let [w, h] = self.config.heatmap_size;
        let r = self.radius();
        mu[0] - r >= w as f32 || mu[1] - r >= h as f32 || mu[0] + r + 1.0 < 0.0 || mu[1] + r + 1.0 < 0.0
    }

    /// Biased target: Gaussian patch centred on the rounded keypoint.
    fn draw_biased(&self, mut plane: ndarray::ArrayViewMut2<f32>, mu: [f32; 2]) {
        let (h, w) = plane.dim();
        let r = self.radius() as isize;
        let denom = 2.0 * self.config.sigma * self.config.sigma;
        let (cx, cy) = (mu[0] as isize, mu[1] as isize);
        for dy in -r..=r {
            let y = cy + dy;
            if y < 0 || y >= h as isize {
                continue;
            }
            for dx in -r..=r {
                let x = cx + dx;
                if x < 0 || x >= w as isize {
                    continue;
                }
                let g = (-((dx * dx + dy * dy) as f32) / denom).exp();
                let cell = &mut plane[[y as usize, x as usize]];
                *cell = cell.max(g);
            }
        }
    }

    /// Unbiased target: Gaussian evaluated at the exact sub-pixel centre.
    fn draw_unbiased(&self, mut plane: ndarray::ArrayViewMut2<f32>, mu: [f32; 2]) {
        let denom = 2.0 * self.config.sigma * self.config.sigma;
        plane.indexed_iter_mut().for_each(|((y, x), cell)| {
            let dx = x as f32 - mu[0];
            let dy = y as f32 - mu[1];
            *cell = cell.max((-(dx * dx + dy * dy) / denom).exp());
        });
    }
}

impl KeypointCodec for MsraHeatmap {
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
            let scaled = [keypoints[[j, 0]] / self.stride[0], keypoints[[j, 1]] / self.stride[1]];
            let mu = if self.config.unbiased {
                scaled
            } else {
                [(scaled[0] + 0.5).floor(), (scaled[1] + 0.5).floor()]
            };
            if self.outside(mu) {
                tracing::trace!(keypoint = j, ?mu, "keypoint outside heatmap, weight 0");
                keypoint_weights[j] = 0.0;
                continue;
            }
            if self.config.unbiased {
                self.draw_unbiased(plane.view_mut(), mu);
            } else {
                self.draw_biased(plane.view_mut(), mu);
            }
        }
        Ok(EncodedHeatmaps {
            heatmaps,
            keypoint_weights,
        })
    }

    fn decode(&self, heatmaps: ArrayView3<f32>) -> Result<(Array2<f32>, Array1<f32>)> {
        check_decode_input(&heatmaps, self.config.heatmap_size)?;
        let k = heatmaps.len_of(Axis(0));
        let mut coords = Array2::<f32>::zeros((k, 2));
        let mut scores = Array1::<f32>::zeros(k);
        for (j, plane) in heatmaps.axis_iter(Axis(0)).enumerate() {
            let (xy, v) = heatmap_maximum(plane);
            coords[[j, 0]] = xy[0];
            coords[[j, 1]] = xy[1];
            scores[j] = v;
        }
        let mut keypoints = if self.config.unbiased {
            refine_taylor(coords.view(), heatmaps, self.config.blur_kernel_size)?
        } else {
            refine_shift(coords.view(), heatmaps)
        };
        for mut row in keypoints.rows_mut() {
            if !is_sentinel([row[0], row[1]]) {
                row[0] *= self.stride[0];
                row[1] *= self.stride[1];
            }
        }
        Ok((keypoints, scores))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn codec(unbiased: bool) -> MsraHeatmap {
        MsraHeatmap::new(MsraHeatmapConfig {
            input_size: [192, 256],
            heatmap_size: [48, 64],
            sigma: 2.0,
            unbiased,
            blur_kernel_size: 11,
        })
        .unwrap()
    }

    #[test]
    fn biased_target_peaks_at_rounded_keypoint() {
        let kps = ndarray::arr2(&[[42.0f32, 90.0]]);
        let vis = ndarray::arr1(&[1.0f32]);
        let enc = codec(false).encode(kps.view(), vis.view()).unwrap();
        // 42 / 4 + 0.5 = 11.0, 90 / 4 + 0.5 = 23.0
        assert_eq!(enc.heatmaps[[0, 23, 11]], 1.0);
        assert_abs_diff_eq!(enc.heatmaps[[0, 23, 12]], (-1.0f32 / 8.0).exp());
        assert_eq!(enc.heatmaps[[0, 23, 18]], 0.0);
    }

    #[test]
    fn unbiased_target_is_subpixel_and_decodes_tightly() {
        let kps = ndarray::arr2(&[[81.0f32, 130.0]]);
        let vis = ndarray::arr1(&[1.0f32]);
        let c = codec(true);
        let enc = c.encode(kps.view(), vis.view()).unwrap();
        assert!(enc.heatmaps[[0, 32, 20]] < 1.0);
        let (dec, scores) = c.decode(enc.heatmaps.view()).unwrap();
        assert_abs_diff_eq!(dec[[0, 0]], 81.0, epsilon = 1.0);
        assert_abs_diff_eq!(dec[[0, 1]], 130.0, epsilon = 1.0);
        assert!(scores[0] > 0.9);
    }

    #[test]
    fn invisible_and_far_keypoints_get_zero_weight() {
        let kps = ndarray::arr2(&[[10.0f32, 10.0], [1000.0, 10.0], [-200.0, 5.0]]);
        let vis = ndarray::arr1(&[0.0f32, 1.0, 1.0]);
        for unbiased in [false, true] {
            let enc = codec(unbiased).encode(kps.view(), vis.view()).unwrap();
            assert_eq!(enc.keypoint_weights.to_vec(), vec![0.0, 0.0, 0.0]);
            assert!(enc.heatmaps.iter().all(|v| *v == 0.0));
        }
    }

    #[test]
    fn empty_channel_keeps_sentinel() {
        let heatmaps = Array3::<f32>::zeros((2, 64, 48));
        for unbiased in [false, true] {
            let (dec, scores) = codec(unbiased).decode(heatmaps.view()).unwrap();
            assert_eq!(dec.row(1).to_vec(), vec![-1.0, -1.0]);
            assert_eq!(scores[1], 0.0);
        }
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let bad_sigma = MsraHeatmapConfig {
            input_size: [192, 256],
            heatmap_size: [48, 64],
            sigma: 0.0,
            unbiased: false,
            blur_kernel_size: 11,
        };
        assert!(matches!(MsraHeatmap::new(bad_sigma), Err(Error::InvalidArgument(_))));
        let even = MsraHeatmapConfig {
            sigma: 2.0,
            unbiased: true,
            blur_kernel_size: 10,
            input_size: [192, 256],
            heatmap_size: [48, 64],
        };
        assert!(matches!(MsraHeatmap::new(even), Err(Error::EvenKernel { kernel: 10 })));
    }
}
