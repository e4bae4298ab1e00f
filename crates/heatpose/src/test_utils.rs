//! Synthetic heatmaps shared by the unit tests.

use ndarray::{Array2, Array4, Axis};

/// Render an unnormalized Gaussian `exp(-d² / 2σ²)` centred at `center`
/// (x, y) on a `height × width` grid.
pub(crate) fn gaussian_plane(width: usize, height: usize, center: [f32; 2], sigma: f32) -> Array2<f32> {
    let denom = 2.0 * sigma * sigma;
    Array2::from_shape_fn((height, width), |(y, x)| {
        let dx = x as f32 - center[0];
        let dy = y as f32 - center[1];
        (-(dx * dx + dy * dy) / denom).exp()
    })
}

/// Stack Gaussian planes into `[N, K, H, W]`, one instance per slice of
/// keypoint centers. Every instance must have the same keypoint count.
pub(crate) fn gaussian_heatmaps(
    width: usize,
    height: usize,
    instances: &[&[[f32; 2]]],
    sigma: f32,
) -> Array4<f32> {
    let k = instances.first().map_or(0, |kps| kps.len());
    let mut out = Array4::<f32>::zeros((instances.len(), k, height, width));
    for (mut inst, kps) in out.axis_iter_mut(Axis(0)).zip(instances) {
        for (mut plane, center) in inst.axis_iter_mut(Axis(0)).zip(kps.iter()) {
            plane.assign(&gaussian_plane(width, height, *center, sigma));
        }
    }
    out
}

/// `[1, K, H, W]` batch with a single one-hot peak of `value` per channel.
pub(crate) fn one_hot_heatmaps(
    width: usize,
    height: usize,
    peaks: &[[usize; 2]],
    value: f32,
) -> Array4<f32> {
    let mut out = Array4::<f32>::zeros((1, peaks.len(), height, width));
    for (k, p) in peaks.iter().enumerate() {
        out[[0, k, p[1], p[0]]] = value;
    }
    out
}
