use ndarray::{Array2, Array3, ArrayView2, ArrayView4, Axis};

/// Peak location and value of one heatmap plane.
///
/// The first occurrence of the maximum wins and NaN values are never
/// selected. When the maximum is not strictly positive the location is the
/// `(-1, -1)` sentinel. An empty or all-NaN plane reports a value of `0`.
pub fn heatmap_maximum(plane: ArrayView2<f32>) -> ([f32; 2], f32) {
    let w = plane.ncols();
    let mut best: Option<(usize, f32)> = None;
    for (idx, &v) in plane.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        if best.map_or(true, |(_, b)| v > b) {
            best = Some((idx, v));
        }
    }
    match best {
        Some((idx, v)) if v > 0.0 => ([(idx % w) as f32, (idx / w) as f32], v),
        Some((_, v)) => ([-1.0, -1.0], v),
        None => ([-1.0, -1.0], 0.0),
    }
}

/// Per-channel peak locations and values for a `[N, K, H, W]` batch.
///
/// Returns `(coords [N, K, 2], maxvals [N, K])`; channels whose maximum is
/// `<= 0` carry the `(-1, -1)` sentinel.
pub fn get_max_preds(heatmaps: ArrayView4<f32>) -> (Array3<f32>, Array2<f32>) {
    let (n, k, _, _) = heatmaps.dim();
    let mut coords = Array3::<f32>::zeros((n, k, 2));
    let mut maxvals = Array2::<f32>::zeros((n, k));
    for (i, instance) in heatmaps.axis_iter(Axis(0)).enumerate() {
        for (j, plane) in instance.axis_iter(Axis(0)).enumerate() {
            let (xy, v) = heatmap_maximum(plane);
            coords[[i, j, 0]] = xy[0];
            coords[[i, j, 1]] = xy[1];
            maxvals[[i, j]] = v;
        }
    }
    (coords, maxvals)
}
