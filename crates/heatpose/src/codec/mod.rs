//! Keypoint ↔ heatmap codecs for single-instance training targets.
//!
//! A codec turns `[K, 2]` keypoints in input-image (crop) pixels into
//! `[K, H, W]` target heatmaps, and decodes network output back. Two
//! flavours are provided:
//!
//! - [`MsraHeatmap`] – Gaussian targets (SimpleBaseline/HRNet), optionally
//!   unbiased with DARK-style Taylor decoding;
//! - [`MegviiHeatmap`] – blurred one-hot targets scaled to 255 (CPN/MSPN).
//!
//! Codecs are selected from a tagged [`CodecConfig`]:
//!
//! ```
//! use heatpose::codec::{Codec, CodecConfig, KeypointCodec};
//!
//! let cfg: CodecConfig = serde_json::from_str(
//!     r#"{"type": "msra_heatmap", "input_size": [192, 256], "heatmap_size": [48, 64], "sigma": 2.0}"#,
//! ).unwrap();
//! let codec = Codec::build(&cfg).unwrap();
//! assert_eq!(codec.heatmap_size(), [48, 64]);
//! ```

use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView2, ArrayView3};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

mod megvii;
mod msra;

pub use megvii::{MegviiHeatmap, MegviiHeatmapConfig};
pub use msra::{MsraHeatmap, MsraHeatmapConfig};

/// Encoder output for one instance.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedHeatmaps {
    /// Target heatmaps, `[K, H, W]`.
    pub heatmaps: Array3<f32>,
    /// Per-keypoint loss weight; `0` for invisible or out-of-bounds
    /// keypoints.
    pub keypoint_weights: Array1<f32>,
}

/// Encode/decode pair shared by all codecs.
pub trait KeypointCodec {
    /// Heatmap size `[W, H]`.
    fn heatmap_size(&self) -> [usize; 2];

    /// Encode `[K, 2]` keypoints with `[K]` visibilities.
    fn encode(&self, keypoints: ArrayView2<f32>, visible: ArrayView1<f32>)
        -> Result<EncodedHeatmaps>;

    /// Decode `[K, H, W]` heatmaps into `([K, 2] keypoints, [K] scores)` in
    /// input-image pixels.
    fn decode(&self, heatmaps: ArrayView3<f32>) -> Result<(Array2<f32>, Array1<f32>)>;
}

/// Serializable codec selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CodecConfig {
    #[serde(alias = "MSRAHeatmap")]
    MsraHeatmap(MsraHeatmapConfig),
    #[serde(alias = "MegviiHeatmap")]
    MegviiHeatmap(MegviiHeatmapConfig),
}

/// A built, validated codec.
#[derive(Debug, Clone)]
pub enum Codec {
    Msra(MsraHeatmap),
    Megvii(MegviiHeatmap),
}

impl Codec {
    pub fn build(config: &CodecConfig) -> Result<Self> {
        Ok(match config {
            CodecConfig::MsraHeatmap(c) => Self::Msra(MsraHeatmap::new(c.clone())?),
            CodecConfig::MegviiHeatmap(c) => Self::Megvii(MegviiHeatmap::new(c.clone())?),
        })
    }

    fn inner(&self) -> &dyn KeypointCodec {
        match self {
            Self::Msra(c) => c as &dyn KeypointCodec,
            Self::Megvii(c) => c,
        }
    }
}

impl KeypointCodec for Codec {
    fn heatmap_size(&self) -> [usize; 2] {
        self.inner().heatmap_size()
    }

    fn encode(
        &self,
        keypoints: ArrayView2<f32>,
        visible: ArrayView1<f32>,
    ) -> Result<EncodedHeatmaps> {
        self.inner().encode(keypoints, visible)
    }

    fn decode(&self, heatmaps: ArrayView3<f32>) -> Result<(Array2<f32>, Array1<f32>)> {
        self.inner().decode(heatmaps)
    }
}

/// Input-to-heatmap stride `[sx, sy]` after checking both sizes are
/// non-zero.
pub(crate) fn feature_stride(input_size: [usize; 2], heatmap_size: [usize; 2]) -> Result<[f32; 2]> {
    if input_size.contains(&0) || heatmap_size.contains(&0) {
        return Err(Error::InvalidArgument(format!(
            "codec sizes must be non-zero, got input {input_size:?} heatmap {heatmap_size:?}"
        )));
    }
    Ok([
        input_size[0] as f32 / heatmap_size[0] as f32,
        input_size[1] as f32 / heatmap_size[1] as f32,
    ])
}

pub(crate) fn check_encode_inputs(keypoints: &ArrayView2<f32>, visible: &ArrayView1<f32>) -> Result<usize> {
    let k = keypoints.nrows();
    if keypoints.ncols() != 2 {
        return Err(Error::ShapeMismatch {
            what: "codec keypoints",
            expected: vec![k, 2],
            got: keypoints.shape().to_vec(),
        });
    }
    if visible.len() != k {
        return Err(Error::ShapeMismatch {
            what: "codec visibility",
            expected: vec![k],
            got: vec![visible.len()],
        });
    }
    Ok(k)
}

pub(crate) fn check_decode_input(heatmaps: &ArrayView3<f32>, heatmap_size: [usize; 2]) -> Result<()> {
    let (k, h, w) = heatmaps.dim();
    if [w, h] != heatmap_size {
        return Err(Error::ShapeMismatch {
            what: "codec heatmaps",
            expected: vec![k, heatmap_size[1], heatmap_size[0]],
            got: vec![k, h, w],
        });
    }
    Ok(())
}
