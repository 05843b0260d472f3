//! Configuration parsing and validation.
//!
//! Every tunable constant of the pipeline lives here so callers can adjust
//! thresholds without touching the algorithms.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub mask: MaskConfig,
    pub warp: WarpConfig,
    pub mouth: MouthConfig,
    pub assets: AssetConfig,
    pub frames: FrameConfig,
    pub layout: LandmarkLayout,
}

/// Alpha mask derivation for deformable assets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskConfig {
    /// Segmentation probabilities strictly above this are foreground.
    pub segmentation_threshold: f32,
    /// Pixels with luminance strictly above this are treated as background.
    pub white_level: u8,
    /// Side of the square smoothing kernel; odd, 1 disables smoothing.
    pub blur_kernel: u32,
    /// Category whose assets skip the jaw polygon and white exclusion.
    pub animals_category: String,
}

impl Default for MaskConfig {
    fn default() -> Self {
        Self {
            segmentation_threshold: 0.4,
            white_level: 240,
            blur_kernel: 5,
            animals_category: "animals".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarpConfig {
    /// Growth of the live landmark box on each side, as a fraction of its size.
    pub boundary_margin: f64,
}

impl Default for WarpConfig {
    fn default() -> Self {
        Self {
            boundary_margin: 0.6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MouthConfig {
    /// Lip gap over face height above which the mouth counts as open.
    pub open_threshold: f64,
}

impl Default for MouthConfig {
    fn default() -> Self {
        Self {
            open_threshold: 0.02,
        }
    }
}

/// Asset library layout and preprocessing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    pub thumbnail_size: u32,
    /// Accepted image extensions, matched case-insensitively.
    pub image_extensions: Vec<String>,
    /// Audio extensions in lookup priority order.
    pub audio_extensions: Vec<String>,
    /// Categories holding rigid overlays instead of deformable masks.
    pub overlay_categories: Vec<String>,
    /// Upscale factor for the second landmark detection attempt.
    pub detection_upscale: u32,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            thumbnail_size: 60,
            image_extensions: ["png", "webp", "jpg", "jpeg"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            audio_extensions: vec!["wav".to_string(), "mp3".to_string()],
            overlay_categories: vec!["Male".to_string(), "Female".to_string()],
            detection_upscale: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// Quality of encoded output frames.
    pub jpeg_quality: u8,
    /// Frames older than this when they reach a session are dropped; 0 disables.
    pub frame_budget_ms: u64,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: 95,
            frame_budget_ms: 250,
        }
    }
}

/// Semantic roles of landmark indices in the detector's output.
///
/// Defaults follow the 468-point face mesh topology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LandmarkLayout {
    /// Jaw contour from one ear, around the chin, to the other ear.
    pub jawline: Vec<usize>,
    pub upper_lip: usize,
    pub lower_lip: usize,
    pub chin: usize,
    pub forehead: usize,
    pub nose_tip: usize,
    pub philtrum: usize,
    pub inner_eye_left: usize,
    pub inner_eye_right: usize,
    pub outer_eye_left: usize,
    pub outer_eye_right: usize,
    pub mouth_left: usize,
    pub mouth_right: usize,
    pub face_left: usize,
    pub face_right: usize,
}

impl Default for LandmarkLayout {
    fn default() -> Self {
        Self {
            jawline: vec![
                234, 93, 132, 58, 172, 136, 150, 149, 176, 148, 152, 377, 400, 378, 379, 365, 397,
                288, 361, 323, 454,
            ],
            upper_lip: 13,
            lower_lip: 14,
            chin: 152,
            forehead: 10,
            nose_tip: 1,
            philtrum: 164,
            inner_eye_left: 33,
            inner_eye_right: 263,
            outer_eye_left: 130,
            outer_eye_right: 359,
            mouth_left: 61,
            mouth_right: 291,
            face_left: 234,
            face_right: 454,
        }
    }
}

#[cfg(test)]
impl LandmarkLayout {
    /// Smallest landmark count every index in the layout fits into.
    fn required_len(&self) -> usize {
        let named = [
            self.upper_lip,
            self.lower_lip,
            self.chin,
            self.forehead,
            self.nose_tip,
            self.philtrum,
            self.inner_eye_left,
            self.inner_eye_right,
            self.outer_eye_left,
            self.outer_eye_right,
            self.mouth_left,
            self.mouth_right,
            self.face_left,
            self.face_right,
        ];
        named
            .iter()
            .chain(self.jawline.iter())
            .max()
            .map_or(0, |m| m + 1)
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_str(&contents)?;
        tracing::info!("Loaded config from {}", path.as_ref().display());
        Ok(config)
    }

    /// Parse and validate configuration from a JSON string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the default paths, falling back to defaults.
    pub fn load() -> Result<Self> {
        let paths = [
            PathBuf::from("facelock.json"),
            PathBuf::from("config/facelock.json"),
        ];

        for path in &paths {
            if path.exists() {
                return Self::from_file(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn validate(&self) -> Result<()> {
        let t = self.mask.segmentation_threshold;
        if !(0.0..=1.0).contains(&t) {
            return Err(invalid("mask.segmentation_threshold", "must be within [0, 1]"));
        }
        if self.mask.blur_kernel == 0 || self.mask.blur_kernel % 2 == 0 {
            return Err(invalid("mask.blur_kernel", "must be odd and at least 1"));
        }
        if self.mask.blur_kernel > 15 {
            return Err(invalid("mask.blur_kernel", "must not exceed 15"));
        }
        if !(self.warp.boundary_margin >= 0.0) {
            return Err(invalid("warp.boundary_margin", "must be non-negative"));
        }
        if !(self.mouth.open_threshold > 0.0) {
            return Err(invalid("mouth.open_threshold", "must be positive"));
        }
        if self.assets.thumbnail_size == 0 {
            return Err(invalid("assets.thumbnail_size", "must be greater than 0"));
        }
        if self.assets.image_extensions.is_empty() {
            return Err(invalid("assets.image_extensions", "must not be empty"));
        }
        if self.assets.detection_upscale == 0 {
            return Err(invalid("assets.detection_upscale", "must be at least 1"));
        }
        if !(1..=100).contains(&self.frames.jpeg_quality) {
            return Err(invalid("frames.jpeg_quality", "must be within 1..=100"));
        }
        if self.layout.jawline.len() < 2 {
            return Err(invalid("layout.jawline", "needs at least two points"));
        }
        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> Error {
    Error::InvalidConfig(format!("{}: {}", field, message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.layout.jawline.len(), 21);
        assert_eq!(config.layout.required_len(), 455);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = Config::from_str(r#"{ "mouth": { "open_threshold": 0.05 } }"#).unwrap();
        assert_eq!(config.mouth.open_threshold, 0.05);
        assert_eq!(config.mask.white_level, 240);
        assert_eq!(config.assets.thumbnail_size, 60);
    }

    #[test]
    fn rejects_even_blur_kernel() {
        let err = Config::from_str(r#"{ "mask": { "blur_kernel": 4 } }"#).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        assert!(Config::from_str(r#"{ "mask": { "segmentation_threshold": 1.5 } }"#).is_err());
    }

    #[test]
    fn reads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("facelock.json");
        std::fs::write(&path, r#"{ "warp": { "boundary_margin": 0.3 } }"#).unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.warp.boundary_margin, 0.3);
    }
}
