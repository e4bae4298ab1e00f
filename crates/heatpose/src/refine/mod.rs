//! Sub-pixel refinement of integer heatmap peaks.
//!
//! Three interchangeable strategies share one entry point,
//! [`RefineMethod::refine`]:
//!
//! - **Shift** – a quarter-pixel nudge toward the higher neighbour.
//! - **Taylor** – a Newton step on the Gaussian-modulated log-heatmap using
//!   a 2×2 Hessian from two-pixel finite differences.
//! - **Dark** – distribution-aware Newton step on the 3×3-blurred,
//!   edge-padded log-heatmap with a small diagonal regularizer; works on
//!   border peaks. It ignores the configured kernel.
//!
//! Singular Hessians and border proximity silently skip the correction.
//! Sentinel `(-1, -1)` keypoints are never modified.

use std::fmt;
use std::str::FromStr;

use ndarray::{Array2, Array3, ArrayView2, ArrayView3, ArrayView4, Axis};

use crate::error::{Error, Result};

mod dark;
mod newton;
mod shift;
mod taylor;

pub use dark::refine_dark;
pub(crate) use shift::shift_keypoint;
pub use shift::refine_shift;
pub use taylor::refine_taylor;

/// Sub-pixel refinement strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefineMethod {
    /// ±0.25 px shift along the finite-difference gradient sign.
    #[default]
    Shift,
    /// Unbiased Taylor-expansion Newton step (DARK paper, biased grid).
    Taylor,
    /// Distribution-aware Newton step on an edge-padded log-heatmap.
    Dark,
}

impl RefineMethod {
    /// Whether the method blurs with the configured kernel.
    pub fn uses_kernel(self) -> bool {
        matches!(self, Self::Taylor)
    }

    /// Refine `[K, 2]` peak coordinates of one instance against its
    /// `[K, H, W]` heatmaps.
    pub fn refine(
        self,
        coords: ArrayView2<f32>,
        heatmaps: ArrayView3<f32>,
        kernel: usize,
    ) -> Result<Array2<f32>> {
        let k = heatmaps.len_of(Axis(0));
        if coords.dim() != (k, 2) {
            return Err(Error::ShapeMismatch {
                what: "refine coordinates",
                expected: vec![k, 2],
                got: coords.shape().to_vec(),
            });
        }
        match self {
            Self::Shift => Ok(refine_shift(coords, heatmaps)),
            Self::Taylor => refine_taylor(coords, heatmaps, kernel),
            Self::Dark => refine_dark(coords, heatmaps),
        }
    }

    /// Refine a whole `[N, K, 2]` batch against `[N, K, H, W]` heatmaps.
    pub fn refine_batch(
        self,
        coords: ArrayView3<f32>,
        heatmaps: ArrayView4<f32>,
        kernel: usize,
    ) -> Result<Array3<f32>> {
        let (n, k, _, _) = heatmaps.dim();
        if coords.dim() != (n, k, 2) {
            return Err(Error::ShapeMismatch {
                what: "refine coordinates",
                expected: vec![n, k, 2],
                got: coords.shape().to_vec(),
            });
        }
        let mut out = Array3::<f32>::zeros((n, k, 2));
        for (i, (c, hm)) in coords
            .axis_iter(Axis(0))
            .zip(heatmaps.axis_iter(Axis(0)))
            .enumerate()
        {
            let refined = self.refine(c, hm, kernel)?;
            out.index_axis_mut(Axis(0), i).assign(&refined);
        }
        Ok(out)
    }
}

impl fmt::Display for RefineMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Shift => "shift",
            Self::Taylor => "taylor",
            Self::Dark => "dark",
        };
        f.write_str(name)
    }
}

impl FromStr for RefineMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "shift" => Ok(Self::Shift),
            "taylor" | "unbiased" => Ok(Self::Taylor),
            "dark" | "dark_udp" => Ok(Self::Dark),
            _ => Err(Error::UnsupportedRefineMethod(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heatmap::get_max_preds;
    use crate::test_utils::gaussian_heatmaps;
    use approx::assert_abs_diff_eq;
    use ndarray::Array4;

    #[test]
    fn parses_method_names() {
        assert_eq!("shift".parse::<RefineMethod>().unwrap(), RefineMethod::Shift);
        assert_eq!("Unbiased".parse::<RefineMethod>().unwrap(), RefineMethod::Taylor);
        assert_eq!("dark_udp".parse::<RefineMethod>().unwrap(), RefineMethod::Dark);
        assert!(matches!(
            "megvii".parse::<RefineMethod>(),
            Err(Error::UnsupportedRefineMethod(_))
        ));
        for m in [RefineMethod::Shift, RefineMethod::Taylor, RefineMethod::Dark] {
            assert_eq!(m.to_string().parse::<RefineMethod>().unwrap(), m);
        }
    }

    #[test]
    fn batch_refinement_moves_toward_true_center() {
        let truth = [[17.4f32, 22.6], [30.2, 40.9]];
        let heatmaps = gaussian_heatmaps(48, 64, &[&truth[..]], 2.0);
        let (coords, _) = get_max_preds(heatmaps.view());
        for method in [RefineMethod::Shift, RefineMethod::Taylor, RefineMethod::Dark] {
            let refined = method.refine_batch(coords.view(), heatmaps.view(), 11).unwrap();
            for (k, t) in truth.iter().enumerate() {
                let before = (coords[[0, k, 0]] - t[0]).hypot(coords[[0, k, 1]] - t[1]);
                let after = (refined[[0, k, 0]] - t[0]).hypot(refined[[0, k, 1]] - t[1]);
                assert!(after <= before + 1e-4, "{method}: {after} > {before}");
            }
        }
    }

    #[test]
    fn dark_refines_each_instance_on_its_own_heatmaps() {
        let a = [[10.3f32, 12.6]];
        let b = [[30.7f32, 50.2]];
        let heatmaps = gaussian_heatmaps(48, 64, &[&a[..], &b[..]], 2.0);
        let (coords, _) = get_max_preds(heatmaps.view());
        let refined = RefineMethod::Dark
            .refine_batch(coords.view(), heatmaps.view(), 3)
            .unwrap();
        assert_abs_diff_eq!(refined[[1, 0, 0]], 30.7, epsilon = 0.2);
        assert_abs_diff_eq!(refined[[1, 0, 1]], 50.2, epsilon = 0.2);
    }

    #[test]
    fn dark_ignores_the_configured_kernel() {
        let truth = [[17.4f32, 22.6], [30.2, 40.9]];
        let heatmaps = gaussian_heatmaps(48, 64, &[&truth[..]], 2.0);
        let (coords, _) = get_max_preds(heatmaps.view());
        let inst = heatmaps.index_axis(Axis(0), 0);
        let c = coords.index_axis(Axis(0), 0);
        let direct = refine_dark(c, inst).unwrap();
        for kernel in [4, 11, 17] {
            let refined = RefineMethod::Dark.refine(c, inst, kernel).unwrap();
            assert_eq!(refined, direct);
        }
    }

    #[test]
    fn sentinel_keypoints_survive_every_method() {
        let heatmaps = Array4::<f32>::zeros((1, 1, 16, 16));
        let (coords, _) = get_max_preds(heatmaps.view());
        for method in [RefineMethod::Shift, RefineMethod::Taylor, RefineMethod::Dark] {
            let refined = method.refine_batch(coords.view(), heatmaps.view(), 3).unwrap();
            assert_eq!([refined[[0, 0, 0]], refined[[0, 0, 1]]], [-1.0, -1.0]);
        }
    }

    #[test]
    fn coordinate_shape_must_match() {
        let heatmaps = Array4::<f32>::zeros((1, 2, 8, 8));
        let coords = Array3::<f32>::zeros((1, 3, 2));
        let err = RefineMethod::Shift
            .refine_batch(coords.view(), heatmaps.view(), 3)
            .unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }
}
