use ndarray::{Array2, ArrayView2, ArrayView3, Axis};

use crate::heatmap::is_sentinel;

/// Quarter-pixel shift toward the higher neighbour on each axis.
///
/// Applied only when `1 < px < W - 1` and `1 < py < H - 1`; the gradient
/// sign is read from the raw heatmap and a zero difference leaves that axis
/// unchanged.
pub(crate) fn shift_keypoint(plane: ArrayView2<f32>, xy: [f32; 2]) -> [f32; 2] {
    if is_sentinel(xy) {
        return xy;
    }
    let (h, w) = plane.dim();
    let px = xy[0] as usize;
    let py = xy[1] as usize;
    if !(1 < px && px + 1 < w && 1 < py && py + 1 < h) {
        return xy;
    }
    let diff_x = plane[[py, px + 1]] - plane[[py, px - 1]];
    let diff_y = plane[[py + 1, px]] - plane[[py - 1, px]];
    [xy[0] + 0.25 * sign(diff_x), xy[1] + 0.25 * sign(diff_y)]
}

#[inline]
fn sign(v: f32) -> f32 {
    if v > 0.0 {
        1.0
    } else if v < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Shift-refine `[K, 2]` coordinates against their `[K, H, W]` heatmaps.
pub fn refine_shift(coords: ArrayView2<f32>, heatmaps: ArrayView3<f32>) -> Array2<f32> {
    let mut out = coords.to_owned();
    for (k, plane) in heatmaps.axis_iter(Axis(0)).enumerate() {
        let xy = shift_keypoint(plane, [coords[[k, 0]], coords[[k, 1]]]);
        out[[k, 0]] = xy[0];
        out[[k, 1]] = xy[1];
    }
    out
}
