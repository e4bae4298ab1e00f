//! Error type shared by the decode core, codecs and metrics.

use thiserror::Error;

/// Precondition failures reported by heatpose.
///
/// Numerical edge cases (singular Hessians, peaks near the border, channels
/// with no valid keypoints) are never reported here; they degrade to "no
/// correction" or to the `-1` sentinel instead.
#[derive(Error, Debug)]
pub enum Error {
    /// Gaussian kernels must have an odd, positive size.
    #[error("gaussian kernel size must be odd and positive, got {kernel}")]
    EvenKernel { kernel: usize },

    /// Heatmap input did not have the required number of dimensions.
    #[error("heatmaps must be {expected}-D, got {got}-D")]
    InvalidRank { expected: usize, got: usize },

    /// Heatmap planes have zero width or height.
    #[error("heatmap planes must have non-zero width and height")]
    EmptyHeatmap,

    /// Two inputs disagree on a dimension.
    #[error("shape mismatch for {what}: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("unsupported target type: {0:?}")]
    UnsupportedTargetType(String),

    #[error("unsupported refine method: {0:?}")]
    UnsupportedRefineMethod(String),

    /// Combined targets interleave (heat, offset-x, offset-y) channels.
    #[error("combined target needs a channel count divisible by 3, got {channels}")]
    CombinedTargetChannels { channels: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Fail with [`Error::EvenKernel`] unless `kernel` is odd and positive.
pub(crate) fn ensure_odd_kernel(kernel: usize) -> Result<()> {
    if kernel % 2 == 1 {
        Ok(())
    } else {
        Err(Error::EvenKernel { kernel })
    }
}
