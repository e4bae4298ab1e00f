//! High-level decoding API.
//!
//! [`Decoder`] wraps a validated [`DecodeConfig`]; create it once and decode
//! many batches.

use std::path::Path;

use ndarray::ArrayView4;

use crate::decode::{keypoints_from_heatmaps, DecodeConfig, DecodedKeypoints};
use crate::error::Result;
use crate::transform::CenterScale;

/// Primary decoding interface.
///
/// # Examples
///
/// ```
/// use heatpose::{CenterScale, DecodeConfig, Decoder};
/// use ndarray::Array4;
///
/// let decoder = Decoder::new(DecodeConfig::default()).unwrap();
/// let mut heatmaps = Array4::<f32>::zeros((1, 17, 64, 48));
/// heatmaps[[0, 0, 32, 24]] = 0.9;
/// let boxes = [CenterScale::from_box_px([24.0, 32.0], [48.0, 64.0])];
/// let out = decoder.decode(heatmaps.view(), &boxes).unwrap();
/// assert_eq!(out.keypoints.dim(), (1, 17, 2));
/// ```
#[derive(Debug, Clone)]
pub struct Decoder {
    config: DecodeConfig,
}

impl Decoder {
    /// Validate `config` and wrap it.
    pub fn new(config: DecodeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Load and validate a JSON configuration file.
    pub fn from_config_json_file(path: &Path) -> Result<Self> {
        Self::new(DecodeConfig::from_json_file(path)?)
    }

    /// Access the current configuration.
    pub fn config(&self) -> &DecodeConfig {
        &self.config
    }

    /// Decode a `[N, K, H, W]` batch with one box per instance.
    pub fn decode(
        &self,
        heatmaps: ArrayView4<f32>,
        center_scales: &[CenterScale],
    ) -> Result<DecodedKeypoints> {
        keypoints_from_heatmaps(heatmaps, center_scales, &self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::refine::RefineMethod;

    #[test]
    fn rejects_invalid_config_up_front() {
        let cfg = DecodeConfig {
            refine: RefineMethod::Taylor,
            blur_kernel: 4,
            ..DecodeConfig::default()
        };
        assert!(matches!(Decoder::new(cfg), Err(Error::EvenKernel { kernel: 4 })));
    }

    #[test]
    fn loads_config_from_json_file() {
        let path = std::env::temp_dir().join(format!("heatpose-decoder-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"refine": "dark", "blur_kernel": 17, "use_udp": true}"#).unwrap();
        let decoder = Decoder::from_config_json_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(decoder.config().refine, RefineMethod::Dark);
        assert_eq!(decoder.config().blur_kernel, 17);
        assert!(decoder.config().use_udp);
        assert!(decoder.config().post_process);
    }
}
