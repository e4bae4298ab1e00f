use ndarray::{Array2, ArrayView2, ArrayView3, Axis};

use super::newton::LocalDerivatives;
use crate::blur::{gaussian_blur_2d, BorderMode};
use crate::error::Result;
use crate::heatmap::is_sentinel;

/// DARK always smooths with a 3×3 Gaussian, whatever the decode kernel.
const DARK_KERNEL: usize = 3;
const CLAMP_MIN: f32 = 0.001;
const CLAMP_MAX: f32 = 50.0;
/// Diagonal regularizer that keeps the Hessian invertible.
const HESSIAN_RIDGE: f64 = 1e-8;

/// Replicate the border of `plane` outward by `pad` pixels.
fn pad_edge(plane: ArrayView2<f32>, pad: usize) -> Array2<f32> {
    let (h, w) = plane.dim();
    Array2::from_shape_fn((h + 2 * pad, w + 2 * pad), |(y, x)| {
        let sy = y.saturating_sub(pad).min(h - 1);
        let sx = x.saturating_sub(pad).min(w - 1);
        plane[[sy, sx]]
    })
}

/// Blur with [`DARK_KERNEL`], clamp to `[0.001, 50]`, log-transform and
/// edge-pad a plane by 1 px.
fn dark_log_plane(plane: ArrayView2<f32>) -> Result<Array2<f32>> {
    let blurred = gaussian_blur_2d(plane, DARK_KERNEL, 0.0, BorderMode::Reflect101)?;
    let log_plane = blurred.mapv(|v| v.clamp(CLAMP_MIN, CLAMP_MAX).ln());
    Ok(pad_edge(log_plane.view(), 1))
}

/// DARK Newton step from the 3×3 neighbourhood of a padded log-heatmap.
///
/// The integer part of `xy` selects the peak; peaks on the plane border are
/// supported through the padding. Coordinates outside the plane are
/// returned unchanged.
fn dark_keypoint(padded: ArrayView2<f32>, xy: [f32; 2]) -> [f32; 2] {
    if is_sentinel(xy) {
        return xy;
    }
    let (ph, pw) = padded.dim();
    let px = xy[0] as usize;
    let py = xy[1] as usize;
    if px + 2 >= pw || py + 2 >= ph {
        return xy;
    }
    let (cx, cy) = (px + 1, py + 1);
    let at = |y: usize, x: usize| padded[[y, x]] as f64;
    let i = at(cy, cx);
    let ix1 = at(cy, cx + 1);
    let ix1_ = at(cy, cx - 1);
    let iy1 = at(cy + 1, cx);
    let iy1_ = at(cy - 1, cx);
    let ix1y1 = at(cy + 1, cx + 1);
    let ix1_y1_ = at(cy - 1, cx - 1);
    let d = LocalDerivatives {
        dx: 0.5 * (ix1 - ix1_),
        dy: 0.5 * (iy1 - iy1_),
        dxx: ix1 - 2.0 * i + ix1_,
        dxy: 0.5 * (ix1y1 - ix1 - iy1 + 2.0 * i - ix1_ - iy1_ + ix1_y1_),
        dyy: iy1 - 2.0 * i + iy1_,
    };
    let base = [px as f32, py as f32];
    match d.newton_offset(HESSIAN_RIDGE) {
        Some(off) => [base[0] + off[0] as f32, base[1] + off[1] as f32],
        None => {
            tracing::trace!(x = xy[0], y = xy[1], "dark: degenerate hessian, keeping peak");
            base
        }
    }
}

/// DARK-refine `[K, 2]` coordinates against their `[K, H, W]` heatmaps.
pub fn refine_dark(coords: ArrayView2<f32>, heatmaps: ArrayView3<f32>) -> Result<Array2<f32>> {
    let mut out = coords.to_owned();
    for (k, plane) in heatmaps.axis_iter(Axis(0)).enumerate() {
        let xy = [coords[[k, 0]], coords[[k, 1]]];
        if is_sentinel(xy) {
            continue;
        }
        let padded = dark_log_plane(plane)?;
        let refined = dark_keypoint(padded.view(), xy);
        out[[k, 0]] = refined[0];
        out[[k, 1]] = refined[1];
    }
    Ok(out)
}
