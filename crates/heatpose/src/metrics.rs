//! Keypoint accuracy metrics: PCK, AUC and EPE.
//!
//! All metrics are built on [`calc_distances`], which produces a `[K, N]`
//! table of normalized prediction errors. Entries that cannot be measured
//! (masked out, or a non-positive normalize factor) hold `-1` and are left
//! out of every average.

use ndarray::{Array2, ArrayView1, ArrayView2, ArrayView3, ArrayView4, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::heatmap::{ensure_non_empty, get_max_preds};

/// Per-keypoint and averaged PCK.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PckAccuracy {
    /// Accuracy per keypoint channel; `-1` when the channel had no valid
    /// keypoint.
    pub per_keypoint: Vec<f32>,
    /// Mean over the non-negative entries of `per_keypoint`, `0` if none.
    pub mean: f32,
    /// Number of channels that contributed to `mean`.
    pub count: usize,
}

fn check_shape(what: &'static str, expected: &[usize], got: &[usize]) -> Result<()> {
    if expected == got {
        Ok(())
    } else {
        Err(Error::ShapeMismatch {
            what,
            expected: expected.to_vec(),
            got: got.to_vec(),
        })
    }
}

fn check_inputs(
    pred: &ArrayView3<f32>,
    gt: &ArrayView3<f32>,
    mask: &ArrayView2<bool>,
) -> Result<(usize, usize)> {
    let (n, k, c) = pred.dim();
    check_shape("prediction coordinates", &[n, k, 2], &[n, k, c])?;
    check_shape("ground-truth coordinates", pred.shape(), gt.shape())?;
    check_shape("visibility mask", &[n, k], mask.shape())?;
    Ok((n, k))
}

/// Normalized distances between predictions and ground truth.
///
/// `pred`/`gt` are `[N, K, 2]`, `mask` is `[N, K]` and `normalize` is
/// `[N, 2]` (x and y factor per instance). Returns `[K, N]`.
pub fn calc_distances(
    pred: ArrayView3<f32>,
    gt: ArrayView3<f32>,
    mask: ArrayView2<bool>,
    normalize: ArrayView2<f32>,
) -> Result<Array2<f32>> {
    let (n, k) = check_inputs(&pred, &gt, &mask)?;
    check_shape("normalize factors", &[n, 2], normalize.shape())?;

    let mut distances = Array2::<f32>::from_elem((k, n), -1.0);
    for i in 0..n {
        let (sx, sy) = (normalize[[i, 0]], normalize[[i, 1]]);
        if !(sx > 0.0 && sy > 0.0) {
            continue;
        }
        for j in 0..k {
            if !mask[[i, j]] {
                continue;
            }
            let dx = (pred[[i, j, 0]] - gt[[i, j, 0]]) / sx;
            let dy = (pred[[i, j, 1]] - gt[[i, j, 1]]) / sy;
            distances[[j, i]] = dx.hypot(dy);
        }
    }
    Ok(distances)
}

/// Fraction of valid distances strictly below `thr`; `-1` when none is
/// valid.
pub fn distance_acc(distances: ArrayView1<f32>, thr: f32) -> f32 {
    let (valid, hits) = distances
        .iter()
        .filter(|d| **d >= 0.0)
        .fold((0usize, 0usize), |(v, h), &d| (v + 1, h + usize::from(d < thr)));
    if valid == 0 {
        -1.0
    } else {
        hits as f32 / valid as f32
    }
}

fn pck_from_distances(distances: &Array2<f32>, thr: f32) -> PckAccuracy {
    let per_keypoint: Vec<f32> = distances
        .axis_iter(Axis(0))
        .map(|d| distance_acc(d, thr))
        .collect();
    let valid: Vec<f32> = per_keypoint.iter().copied().filter(|a| *a >= 0.0).collect();
    let count = valid.len();
    let mean = if count > 0 {
        valid.iter().sum::<f32>() / count as f32
    } else {
        0.0
    };
    PckAccuracy {
        per_keypoint,
        mean,
        count,
    }
}

/// PCK of coordinate predictions.
pub fn keypoint_pck_accuracy(
    pred: ArrayView3<f32>,
    gt: ArrayView3<f32>,
    mask: ArrayView2<bool>,
    thr: f32,
    normalize: ArrayView2<f32>,
) -> Result<PckAccuracy> {
    let distances = calc_distances(pred, gt, mask, normalize)?;
    Ok(pck_from_distances(&distances, thr))
}

/// PCK computed from predicted and ground-truth heatmaps.
///
/// Peaks are taken with [`get_max_preds`]. Without an explicit `normalize`
/// every instance uses `[H, W] / 10` as its `(x, y)` factors, so the x error
/// is scaled by the heatmap height and the y error by its width.
pub fn pose_pck_accuracy(
    output: ArrayView4<f32>,
    target: ArrayView4<f32>,
    mask: ArrayView2<bool>,
    thr: f32,
    normalize: Option<ArrayView2<f32>>,
) -> Result<PckAccuracy> {
    let (n, k, h, w) = output.dim();
    check_shape("target heatmaps", output.shape(), target.shape())?;
    if k == 0 {
        return Ok(PckAccuracy {
            per_keypoint: Vec::new(),
            mean: 0.0,
            count: 0,
        });
    }
    ensure_non_empty(&output)?;
    let default_norm = Array2::from_shape_fn((n, 2), |(_, c)| {
        if c == 0 {
            h as f32 / 10.0
        } else {
            w as f32 / 10.0
        }
    });
    let normalize = match normalize {
        Some(v) => v.reborrow(),
        None => default_norm.view(),
    };
    let (pred, _) = get_max_preds(output);
    let (gt, _) = get_max_preds(target);
    keypoint_pck_accuracy(pred.view(), gt.view(), mask, thr, normalize)
}

/// Area under the PCK curve for thresholds `i / num_step`,
/// `i in [0, num_step)`, with one scalar normalize factor.
pub fn keypoint_auc(
    pred: ArrayView3<f32>,
    gt: ArrayView3<f32>,
    mask: ArrayView2<bool>,
    normalize: f32,
    num_step: usize,
) -> Result<f32> {
    if num_step == 0 {
        return Err(Error::InvalidArgument("num_step must be positive".into()));
    }
    let n = pred.len_of(Axis(0));
    let norm = Array2::<f32>::from_elem((n, 2), normalize);
    let distances = calc_distances(pred, gt, mask, norm.view())?;
    let step = 1.0 / num_step as f32;
    let auc = (0..num_step)
        .map(|i| pck_from_distances(&distances, i as f32 * step).mean)
        .sum::<f32>()
        * step;
    Ok(auc.clamp(0.0, 1.0))
}

/// Mean end-point error in pixels over valid keypoints.
///
/// Returns `None` when the mask leaves no keypoint to average.
pub fn keypoint_epe(
    pred: ArrayView3<f32>,
    gt: ArrayView3<f32>,
    mask: ArrayView2<bool>,
) -> Result<Option<f32>> {
    let n = pred.len_of(Axis(0));
    let ones = Array2::<f32>::ones((n, 2));
    let distances = calc_distances(pred, gt, mask, ones.view())?;
    let (sum, count) = distances
        .iter()
        .filter(|d| **d >= 0.0)
        .fold((0.0f64, 0usize), |(s, c), &d| (s + d as f64, c + 1));
    Ok((count > 0).then(|| (sum / count as f64) as f32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::gaussian_heatmaps;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array3, Array4};
    use rand::{Rng, SeedableRng};

    fn noisy_batch(n: usize, k: usize, noise: f32, seed: u64) -> (Array3<f32>, Array3<f32>) {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        let gt = Array3::from_shape_fn((n, k, 2), |_| rng.gen_range(0.0f32..64.0));
        let pred = gt.mapv(|v| v + rng.gen_range(-noise..noise));
        (pred, gt)
    }

    #[test]
    fn distances_are_keypoint_major_with_sentinels() {
        let gt = Array3::<f32>::zeros((2, 2, 2));
        let mut pred = Array3::<f32>::zeros((2, 2, 2));
        pred[[0, 1, 0]] = 3.0;
        pred[[0, 1, 1]] = 4.0;
        let mut mask = Array2::from_elem((2, 2), true);
        mask[[1, 0]] = false;
        let mut norm = Array2::<f32>::ones((2, 2));
        norm[[0, 0]] = 2.0;

        let d = calc_distances(pred.view(), gt.view(), mask.view(), norm.view()).unwrap();
        assert_eq!(d.dim(), (2, 2));
        assert_abs_diff_eq!(d[[1, 0]], (1.5f32).hypot(4.0), epsilon = 1e-6);
        assert_eq!(d[[0, 1]], -1.0);
        assert_eq!(d[[1, 1]], 0.0);
    }

    #[test]
    fn non_positive_normalize_marks_instance_invalid() {
        let (pred, gt) = noisy_batch(2, 3, 1.0, 1);
        let mask = Array2::from_elem((2, 3), true);
        let mut norm = Array2::<f32>::ones((2, 2));
        norm[[1, 1]] = 0.0;
        let d = calc_distances(pred.view(), gt.view(), mask.view(), norm.view()).unwrap();
        assert!(d.column(1).iter().all(|v| *v == -1.0));
        assert!(d.column(0).iter().all(|v| *v >= 0.0));
    }

    #[test]
    fn distance_acc_ignores_sentinels() {
        let d = ndarray::arr1(&[0.1f32, -1.0, 0.7, 0.2]);
        assert_abs_diff_eq!(distance_acc(d.view(), 0.5), 2.0 / 3.0);
        let none = ndarray::arr1(&[-1.0f32, -1.0]);
        assert_eq!(distance_acc(none.view(), 0.5), -1.0);
    }

    #[test]
    fn pck_is_monotone_in_threshold() {
        let (pred, gt) = noisy_batch(8, 17, 6.0, 42);
        let mask = Array2::from_elem((8, 17), true);
        let norm = Array2::from_elem((8, 2), 6.4f32);
        let mut last = -1.0f32;
        for step in 0..=20 {
            let thr = step as f32 * 0.1;
            let acc = keypoint_pck_accuracy(pred.view(), gt.view(), mask.view(), thr, norm.view())
                .unwrap();
            assert!(acc.mean >= last, "pck dropped at thr {thr}");
            last = acc.mean;
        }
        assert_eq!(last, 1.0);
    }

    #[test]
    fn auc_stays_in_unit_interval() {
        let mask = Array2::from_elem((4, 5), true);
        let (pred, gt) = noisy_batch(4, 5, 0.5, 3);
        let good = keypoint_auc(pred.view(), gt.view(), mask.view(), 30.0, 20).unwrap();
        let (pred, gt) = noisy_batch(4, 5, 60.0, 4);
        let bad = keypoint_auc(pred.view(), gt.view(), mask.view(), 30.0, 20).unwrap();
        assert!((0.0..=1.0).contains(&good));
        assert!((0.0..=1.0).contains(&bad));
        assert!(good > bad);
        assert!(matches!(
            keypoint_auc(pred.view(), gt.view(), mask.view(), 30.0, 0),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn perfect_predictions_saturate_auc_except_zero_threshold() {
        let (pred, _) = noisy_batch(2, 3, 1.0, 5);
        let mask = Array2::from_elem((2, 3), true);
        let auc = keypoint_auc(pred.view(), pred.view(), mask.view(), 30.0, 10).unwrap();
        // distance 0 is not < 0 at the first threshold
        assert_abs_diff_eq!(auc, 0.9, epsilon = 1e-6);
    }

    #[test]
    fn all_invalid_mask_gives_sentinels_and_no_epe() {
        let (pred, gt) = noisy_batch(3, 4, 2.0, 9);
        let mask = Array2::from_elem((3, 4), false);
        let norm = Array2::<f32>::ones((3, 2));
        let acc =
            keypoint_pck_accuracy(pred.view(), gt.view(), mask.view(), 0.5, norm.view()).unwrap();
        assert_eq!(acc.per_keypoint, vec![-1.0; 4]);
        assert_eq!(acc.mean, 0.0);
        assert_eq!(acc.count, 0);
        assert_eq!(keypoint_epe(pred.view(), gt.view(), mask.view()).unwrap(), None);
    }

    #[test]
    fn epe_is_mean_pixel_distance() {
        let gt = Array3::<f32>::zeros((1, 3, 2));
        let mut pred = Array3::<f32>::zeros((1, 3, 2));
        pred[[0, 0, 0]] = 3.0;
        pred[[0, 0, 1]] = 4.0;
        pred[[0, 2, 1]] = 100.0;
        let mut mask = Array2::from_elem((1, 3), true);
        mask[[0, 2]] = false;
        let epe = keypoint_epe(pred.view(), gt.view(), mask.view()).unwrap();
        assert_abs_diff_eq!(epe.unwrap(), 2.5);
    }

    #[test]
    fn pose_pck_from_heatmaps() {
        let truth = [[10.0f32, 12.0], [30.0, 40.0]];
        let near = [[10.0f32, 13.0], [45.0, 20.0]];
        let target = gaussian_heatmaps(48, 64, &[&truth[..]], 2.0);
        let output = gaussian_heatmaps(48, 64, &[&near[..]], 2.0);
        let mask = Array2::from_elem((1, 2), true);
        let acc = pose_pck_accuracy(output.view(), target.view(), mask.view(), 0.5, None).unwrap();
        assert_eq!(acc.per_keypoint, vec![1.0, 0.0]);
        assert_abs_diff_eq!(acc.mean, 0.5);
        assert_eq!(acc.count, 2);

        let empty = Array4::<f32>::zeros((1, 0, 8, 8));
        let mask = Array2::from_elem((1, 0), true);
        let acc = pose_pck_accuracy(empty.view(), empty.view(), mask.view(), 0.5, None).unwrap();
        assert!(acc.per_keypoint.is_empty());
    }

    #[test]
    fn default_pose_normalize_is_height_then_width() {
        // W = 16, H = 64: the x error of 2 px is divided by 64 / 10
        let target = gaussian_heatmaps(16, 64, &[&[[5.0f32, 30.0]][..]], 2.0);
        let output = gaussian_heatmaps(16, 64, &[&[[7.0f32, 30.0]][..]], 2.0);
        let mask = Array2::from_elem((1, 1), true);
        let acc = pose_pck_accuracy(output.view(), target.view(), mask.view(), 0.5, None).unwrap();
        assert_eq!(acc.per_keypoint, vec![1.0]);

        let norm = Array2::from_shape_vec((1, 2), vec![1.6f32, 6.4]).unwrap();
        let acc = pose_pck_accuracy(output.view(), target.view(), mask.view(), 0.5, Some(norm.view()))
            .unwrap();
        assert_eq!(acc.per_keypoint, vec![0.0]);
    }

    #[test]
    fn shape_mismatch_is_reported() {
        let (pred, gt) = noisy_batch(2, 3, 1.0, 11);
        let mask = Array2::from_elem((2, 4), true);
        assert!(matches!(
            keypoint_epe(pred.view(), gt.view(), mask.view()),
            Err(Error::ShapeMismatch { .. })
        ));
        let mask = Array2::from_elem((2, 3), true);
        let norm = Array2::<f32>::ones((3, 2));
        assert!(matches!(
            calc_distances(pred.view(), gt.view(), mask.view(), norm.view()),
            Err(Error::ShapeMismatch { .. })
        ));
        let gt_short = Array3::<f32>::zeros((2, 2, 2));
        assert!(matches!(
            keypoint_epe(pred.view(), gt_short.view(), mask.view()),
            Err(Error::ShapeMismatch { .. })
        ));
    }
}
