//! Separable Gaussian blur and heatmap modulation.
//!
//! Decode-time blur has to match the sigma used when training targets were
//! generated (kernel 11 for sigma 2, kernel 17 for sigma 3). Modulation
//! smooths quantization noise while keeping each plane's peak confidence.

use ndarray::{Array2, Array4, ArrayView2, ArrayView4, Axis};

use crate::error::{ensure_odd_kernel, Result};

mod kernel;

pub use kernel::{gaussian_kernel_1d, kernel_for_sigma, sigma_for_kernel};

/// How samples outside the plane are synthesized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BorderMode {
    /// Zero outside the plane.
    Constant,
    /// Mirror without repeating the edge sample (`dcb|abcd|cba`).
    #[default]
    Reflect101,
    /// Repeat the edge sample (`aaa|abcd|ddd`).
    Replicate,
}

impl BorderMode {
    /// Map a possibly out-of-range index onto `[0, n)`, or `None` for
    /// [`BorderMode::Constant`] outside the plane.
    #[inline]
    fn resolve(self, i: isize, n: usize) -> Option<usize> {
        let n_i = n as isize;
        if (0..n_i).contains(&i) {
            return Some(i as usize);
        }
        match self {
            Self::Constant => None,
            Self::Replicate => Some(i.clamp(0, n_i - 1) as usize),
            Self::Reflect101 => {
                if n == 1 {
                    return Some(0);
                }
                let period = 2 * (n_i - 1);
                let mut j = i.rem_euclid(period);
                if j >= n_i {
                    j = period - j;
                }
                Some(j as usize)
            }
        }
    }
}

/// Blur one plane with an odd `ksize` Gaussian.
///
/// `sigma <= 0` derives sigma from the kernel size.
pub fn gaussian_blur_2d(
    plane: ArrayView2<f32>,
    ksize: usize,
    sigma: f64,
    border: BorderMode,
) -> Result<Array2<f32>> {
    let kernel = gaussian_kernel_1d(ksize, sigma)?;
    let (h, w) = plane.dim();
    let r = (ksize / 2) as isize;

    let mut rows = Array2::<f64>::zeros((h, w));
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (t, &kv) in kernel.iter().enumerate() {
                if let Some(xs) = border.resolve(x as isize + t as isize - r, w) {
                    acc += kv * plane[[y, xs]] as f64;
                }
            }
            rows[[y, x]] = acc;
        }
    }

    let mut out = Array2::<f32>::zeros((h, w));
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (t, &kv) in kernel.iter().enumerate() {
                if let Some(ys) = border.resolve(y as isize + t as isize - r, h) {
                    acc += kv * rows[[ys, x]];
                }
            }
            out[[y, x]] = acc as f32;
        }
    }
    Ok(out)
}

/// Largest non-NaN value of a plane, or `None` when there is none.
pub(crate) fn plane_max(plane: ArrayView2<f32>) -> Option<f32> {
    plane
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .fold(None, |acc, v| Some(acc.map_or(v, |a: f32| a.max(v))))
}

/// Apply `f` to every `[H, W]` plane of a batch, collecting a new batch.
pub(crate) fn map_planes<F>(heatmaps: ArrayView4<f32>, mut f: F) -> Result<Array4<f32>>
where
    F: FnMut(ArrayView2<f32>) -> Result<Array2<f32>>,
{
    let mut out = Array4::<f32>::zeros(heatmaps.raw_dim());
    for (mut dst, src) in out
        .axis_iter_mut(Axis(0))
        .zip(heatmaps.axis_iter(Axis(0)))
    {
        for (mut dst_plane, src_plane) in dst.axis_iter_mut(Axis(0)).zip(src.axis_iter(Axis(0))) {
            dst_plane.assign(&f(src_plane)?);
        }
    }
    Ok(out)
}

/// Blur every plane of a batch without renormalization.
pub fn blur_heatmaps(
    heatmaps: ArrayView4<f32>,
    ksize: usize,
    border: BorderMode,
) -> Result<Array4<f32>> {
    ensure_odd_kernel(ksize)?;
    map_planes(heatmaps, |plane| gaussian_blur_2d(plane, ksize, 0.0, border))
}

/// Modulate one plane: zero-pad by `(kernel - 1) / 2`, blur, crop, and
/// rescale so the blurred maximum equals the original maximum.
///
/// A plane whose blurred maximum is not positive is returned blurred but
/// unscaled.
pub fn modulate_plane(plane: ArrayView2<f32>, kernel: usize) -> Result<Array2<f32>> {
    let origin_max = plane_max(plane).unwrap_or(0.0);
    let mut blurred = gaussian_blur_2d(plane, kernel, 0.0, BorderMode::Constant)?;
    if let Some(blurred_max) = plane_max(blurred.view()).filter(|m| *m > 0.0) {
        let gain = origin_max / blurred_max;
        blurred.mapv_inplace(|v| v * gain);
    }
    Ok(blurred)
}

/// Gaussian modulation of a `[N, K, H, W]` batch; see [`modulate_plane`].
///
/// `kernel` must be odd.
pub fn modulate_heatmaps(heatmaps: ArrayView4<f32>, kernel: usize) -> Result<Array4<f32>> {
    ensure_odd_kernel(kernel)?;
    map_planes(heatmaps, |plane| modulate_plane(plane, kernel))
}
