//! heatpose: heatmap decoding and keypoint accuracy metrics for top-down
//! pose estimation.
//!
//! A top-down pose network emits one confidence heatmap per keypoint and per
//! detected person. The decode stages are:
//!
//! 1. **Maximum** – integer peak per channel, `(-1, -1)` when nothing fired.
//! 2. **Blur** – Gaussian modulation matching the training target sigma.
//! 3. **Refine** – sub-pixel correction (quarter-pixel shift, Taylor, DARK).
//! 4. **Transform** – heatmap grid → original image via the instance box
//!    (biased affine or UDP).
//!
//! On top of that:
//! - [`metrics`] – PCK, AUC and EPE over normalized keypoint distances;
//! - [`codec`] – MSRA and Megvii target encoders/decoders.
//!
//! # Public API
//! - [`Decoder`] / [`keypoints_from_heatmaps`] as entry points
//! - [`DecodeConfig`] for tuning
//! - lower-level building blocks in [`blur`], [`refine`] and [`transform`]
//!
//! Enable the `parallel` feature to decode instances on the rayon pool.

mod api;
pub mod blur;
pub mod codec;
mod decode;
mod error;
mod heatmap;
pub mod metrics;
pub mod refine;
pub mod transform;

#[cfg(test)]
pub(crate) mod test_utils;

pub use api::Decoder;
pub use decode::{
    keypoints_from_heatmaps, DecodeConfig, DecodedKeypoints, KeypointPrediction, TargetType,
};
pub use error::{Error, Result};
pub use heatmap::{get_max_preds, heatmap_maximum, heatmaps_from_shape_vec, Heatmaps};
pub use metrics::PckAccuracy;
pub use refine::RefineMethod;
pub use transform::{transform_preds, CenterScale};
