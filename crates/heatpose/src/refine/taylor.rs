use ndarray::{Array2, ArrayView2, ArrayView3, Axis};

use super::newton::LocalDerivatives;
use crate::blur::modulate_plane;
use crate::error::{ensure_odd_kernel, Result};
use crate::heatmap::is_sentinel;

/// Floor applied before taking the log of a modulated heatmap.
const LOG_FLOOR: f32 = 1e-10;

/// Modulate a plane with `kernel`, floor it and take the natural log.
fn log_modulated(plane: ArrayView2<f32>, kernel: usize) -> Result<Array2<f32>> {
    Ok(modulate_plane(plane, kernel)?.mapv(|v| v.max(LOG_FLOOR).ln()))
}

/// Second-order Taylor refinement of one keypoint on a log-heatmap.
///
/// Needs the peak at least two pixels inside the plane
/// (`1 < px < W - 2`, `1 < py < H - 2`); a singular Hessian skips the step.
fn taylor_keypoint(log_plane: ArrayView2<f32>, xy: [f32; 2]) -> [f32; 2] {
    if is_sentinel(xy) {
        return xy;
    }
    let (h, w) = log_plane.dim();
    let px = xy[0] as usize;
    let py = xy[1] as usize;
    if !(1 < px && px + 2 < w && 1 < py && py + 2 < h) {
        return xy;
    }
    let at = |y: usize, x: usize| log_plane[[y, x]] as f64;
    let d = LocalDerivatives {
        dx: 0.5 * (at(py, px + 1) - at(py, px - 1)),
        dy: 0.5 * (at(py + 1, px) - at(py - 1, px)),
        dxx: 0.25 * (at(py, px + 2) - 2.0 * at(py, px) + at(py, px - 2)),
        dxy: 0.25
            * (at(py + 1, px + 1) - at(py - 1, px + 1) - at(py + 1, px - 1)
                + at(py - 1, px - 1)),
        dyy: 0.25 * (at(py + 2, px) - 2.0 * at(py, px) + at(py - 2, px)),
    };
    match d.newton_offset(0.0) {
        Some(off) => [xy[0] + off[0] as f32, xy[1] + off[1] as f32],
        None => {
            tracing::trace!(x = xy[0], y = xy[1], "taylor: singular hessian, keeping peak");
            xy
        }
    }
}

/// Taylor-refine `[K, 2]` coordinates against their `[K, H, W]` heatmaps.
///
/// Each plane is modulated with `kernel` (odd) before the log transform.
pub fn refine_taylor(
    coords: ArrayView2<f32>,
    heatmaps: ArrayView3<f32>,
    kernel: usize,
) -> Result<Array2<f32>> {
    ensure_odd_kernel(kernel)?;
    let mut out = coords.to_owned();
    for (k, plane) in heatmaps.axis_iter(Axis(0)).enumerate() {
        let xy = [coords[[k, 0]], coords[[k, 1]]];
        if is_sentinel(xy) {
            continue;
        }
        let log_plane = log_modulated(plane, kernel)?;
        let refined = taylor_keypoint(log_plane.view(), xy);
        out[[k, 0]] = refined[0];
        out[[k, 1]] = refined[1];
    }
    Ok(out)
}
