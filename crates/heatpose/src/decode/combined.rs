//! Combined classification + offset target decoding (UDP).

use ndarray::{Array1, Array2, ArrayView3, Axis};

use crate::blur::{gaussian_blur_2d, BorderMode};
use crate::error::{Error, Result};
use crate::heatmap::{heatmap_maximum, is_sentinel};

/// Decode one instance of a `[3K, H, W]` combined target.
///
/// Channel `3k` is the response map, `3k + 1` / `3k + 2` the x / y offset
/// maps in units of `kpd / 64 * H` pixels. The response is blurred with
/// `2 * kernel + 1`, offsets with `kernel`; the peak is then moved by the
/// offsets sampled at its location.
pub(crate) fn decode_combined_instance(
    net_output: ArrayView3<f32>,
    kernel: usize,
    kpd: f32,
) -> Result<(Array2<f32>, Array1<f32>)> {
    let (channels, h, _) = net_output.dim();
    if channels % 3 != 0 {
        return Err(Error::CombinedTargetChannels { channels });
    }
    let k = channels / 3;
    let distance = kpd / 64.0 * h as f32;

    let mut coords = Array2::<f32>::zeros((k, 2));
    let mut maxvals = Array1::<f32>::zeros(k);
    for j in 0..k {
        let heat = gaussian_blur_2d(
            net_output.index_axis(Axis(0), 3 * j),
            2 * kernel + 1,
            0.0,
            BorderMode::Reflect101,
        )?;
        let (xy, v) = heatmap_maximum(heat.view());
        maxvals[j] = v;
        coords[[j, 0]] = xy[0];
        coords[[j, 1]] = xy[1];
        if is_sentinel(xy) {
            continue;
        }
        let (px, py) = (xy[0] as usize, xy[1] as usize);
        let offset_x = gaussian_blur_2d(
            net_output.index_axis(Axis(0), 3 * j + 1),
            kernel,
            0.0,
            BorderMode::Reflect101,
        )?;
        let offset_y = gaussian_blur_2d(
            net_output.index_axis(Axis(0), 3 * j + 2),
            kernel,
            0.0,
            BorderMode::Reflect101,
        )?;
        coords[[j, 0]] += offset_x[[py, px]] * distance;
        coords[[j, 1]] += offset_y[[py, px]] * distance;
    }
    Ok((coords, maxvals))
}
