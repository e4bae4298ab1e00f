use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ensure_odd_kernel, Error, Result};
use crate::refine::RefineMethod;

/// Layout of the network output fed to the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    /// One Gaussian heatmap per keypoint.
    #[default]
    GaussianHeatmap,
    /// Interleaved `(heat, offset-x, offset-y)` channels per keypoint
    /// (UDP classification + regression target). Requires `use_udp`.
    CombinedTarget,
}

impl TargetType {
    /// Network channels emitted per keypoint.
    pub fn channels_per_keypoint(self) -> usize {
        match self {
            Self::GaussianHeatmap => 1,
            Self::CombinedTarget => 3,
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::GaussianHeatmap => "gaussian_heatmap",
            Self::CombinedTarget => "combined_target",
        })
    }
}

impl FromStr for TargetType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "GaussianHeatMap" | "GaussianHeatmap" | "gaussian_heatmap" => Ok(Self::GaussianHeatmap),
            "CombinedTarget" | "combined_target" => Ok(Self::CombinedTarget),
            _ => Err(Error::UnsupportedTargetType(s.to_string())),
        }
    }
}

/// Heatmap decoding options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeConfig {
    /// Apply sub-pixel refinement after peak finding.
    pub post_process: bool,
    /// Refinement strategy when `post_process` is on.
    pub refine: RefineMethod,
    /// Odd Gaussian kernel size used by Taylor refinement and by the
    /// combined-target decoder. It should match the training sigma
    /// (11 for sigma 2, 17 for sigma 3).
    pub blur_kernel: usize,
    /// Use the unbiased (UDP) coordinate transform.
    pub use_udp: bool,
    /// Network output layout.
    pub target_type: TargetType,
    /// Keypoint pose distance scaling the combined-target offset maps,
    /// expressed for a 64-pixel heatmap height.
    pub kpd: f32,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            post_process: true,
            refine: RefineMethod::Shift,
            blur_kernel: 11,
            use_udp: false,
            target_type: TargetType::GaussianHeatmap,
            kpd: 3.5,
        }
    }
}

impl DecodeConfig {
    /// Check preconditions that would otherwise fail mid-decode.
    pub fn validate(&self) -> Result<()> {
        let needs_kernel = match self.target_type {
            TargetType::GaussianHeatmap => self.post_process && self.refine.uses_kernel(),
            TargetType::CombinedTarget => true,
        };
        if needs_kernel {
            ensure_odd_kernel(self.blur_kernel)?;
        }
        if self.target_type == TargetType::CombinedTarget && !self.use_udp {
            return Err(Error::InvalidArgument(
                "combined targets are only defined for the UDP transform (set use_udp)".into(),
            ));
        }
        if self.target_type == TargetType::CombinedTarget && !(self.kpd.is_finite() && self.kpd > 0.0) {
            return Err(Error::InvalidArgument(format!(
                "kpd must be finite and positive, got {}",
                self.kpd
            )));
        }
        Ok(())
    }

    /// Parse a config from JSON; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load a config from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        DecodeConfig::default().validate().unwrap();
    }

    #[test]
    fn even_kernel_only_matters_when_used() {
        let cfg = DecodeConfig {
            blur_kernel: 10,
            ..DecodeConfig::default()
        };
        cfg.validate().unwrap();

        let cfg = DecodeConfig {
            refine: RefineMethod::Taylor,
            ..cfg
        };
        assert!(matches!(cfg.validate(), Err(Error::EvenKernel { kernel: 10 })));

        // DARK blurs with its own 3×3 kernel
        let cfg = DecodeConfig {
            refine: RefineMethod::Dark,
            ..cfg
        };
        cfg.validate().unwrap();
    }

    #[test]
    fn combined_target_requires_udp() {
        let cfg = DecodeConfig {
            target_type: TargetType::CombinedTarget,
            ..DecodeConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(Error::InvalidArgument(_))));
        DecodeConfig { use_udp: true, ..cfg }.validate().unwrap();
        assert!(DecodeConfig::from_json_str(r#"{ "target_type": "combined_target" }"#).is_err());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let cfg = DecodeConfig::from_json_str(r#"{ "refine": "dark", "use_udp": true }"#).unwrap();
        assert_eq!(cfg.refine, RefineMethod::Dark);
        assert!(cfg.use_udp);
        assert_eq!(cfg.blur_kernel, 11);
        assert!(cfg.post_process);
    }

    #[test]
    fn unknown_target_type_is_rejected() {
        assert_eq!(
            "GaussianHeatMap".parse::<TargetType>().unwrap(),
            TargetType::GaussianHeatmap
        );
        assert_eq!(
            "CombinedTarget".parse::<TargetType>().unwrap(),
            TargetType::CombinedTarget
        );
        assert!(matches!(
            "Heatmap3D".parse::<TargetType>(),
            Err(Error::UnsupportedTargetType(_))
        ));
        assert!(DecodeConfig::from_json_str(r#"{ "target_type": "heatmap3d" }"#).is_err());
    }
}
