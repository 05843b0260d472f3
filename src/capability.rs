//! Seams to the external models.
//!
//! The compositing core never calls a model directly: landmark detection and
//! segmentation are supplied per call through these traits, so everything
//! downstream stays a pure pixels-in, pixels-out computation.

use std::path::{Path, PathBuf};

use image::{GrayImage, RgbImage};

use crate::error::{Error, Result};
use crate::types::{coordinate_in_range, Point, PointSet};

/// Detects facial landmarks in a color image.
///
/// Implementations return points in the pixel coordinates of the image they
/// were given, always in the same semantic order.
pub trait LandmarkDetector {
    fn detect(&self, image: &RgbImage) -> Option<PointSet>;
}

/// Produces a per-pixel foreground probability map.
pub trait Segmenter {
    fn segment(&self, image: &RgbImage) -> Option<ProbabilityMap>;
}

/// Foreground probabilities in `[0, 1]`, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityMap {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl ProbabilityMap {
    pub fn new(width: u32, height: u32, data: Vec<f32>) -> Result<Self> {
        if data.len() != (width as usize) * (height as usize) {
            return Err(Error::SegmentationSize {
                width,
                height,
                got_width: data.len() as u32,
                got_height: 1,
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn from_fn<F>(width: u32, height: u32, f: F) -> Self
    where
        F: Fn(u32, u32) -> f32,
    {
        let mut data = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Interpret an 8-bit grayscale image as probabilities (`v / 255`).
    pub fn from_luma(image: &GrayImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            data: image.pixels().map(|p| p[0] as f32 / 255.0).collect(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.data[(y * self.width + x) as usize]
    }
}

/// A segmenter that never produces a map; callers fall back to all-foreground.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSegmentation;

impl Segmenter for NoSegmentation {
    fn segment(&self, _image: &RgbImage) -> Option<ProbabilityMap> {
        None
    }
}

/// A detector that reports a fixed landmark set, or nothing.
#[derive(Debug, Clone, Default)]
pub struct FixedLandmarks(pub Option<PointSet>);

impl FixedLandmarks {
    pub fn new(points: PointSet) -> Self {
        Self(Some(points))
    }

    pub fn none() -> Self {
        Self(None)
    }
}

impl LandmarkDetector for FixedLandmarks {
    fn detect(&self, _image: &RgbImage) -> Option<PointSet> {
        self.0.clone()
    }
}

impl Segmenter for Option<ProbabilityMap> {
    fn segment(&self, _image: &RgbImage) -> Option<ProbabilityMap> {
        self.clone()
    }
}

/// Path of a sidecar file sharing `image`'s stem: `dir/face.png` + `landmarks.json`
/// becomes `dir/face.landmarks.json`.
pub fn sidecar_path(image: &Path, suffix: &str) -> PathBuf {
    let stem = image
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    image.with_file_name(format!("{}.{}", stem, suffix))
}

/// Read a landmark list stored as a JSON array of `[x, y]` pairs.
///
/// Fractional coordinates are truncated to whole pixels; coordinates beyond
/// [`MAX_COORDINATE`](crate::types::MAX_COORDINATE) are rejected.
pub fn read_landmarks_json<P: AsRef<Path>>(path: P) -> Result<PointSet> {
    let contents = std::fs::read_to_string(path)?;
    let raw: Vec<[f64; 2]> = serde_json::from_str(&contents)?;
    raw.into_iter()
        .enumerate()
        .map(|(index, [x, y])| {
            if coordinate_in_range(x, y) {
                Ok(Point::new(x as i32, y as i32))
            } else {
                Err(Error::CoordinateOutOfRange { index, x, y })
            }
        })
        .collect::<Result<Vec<_>>>()
        .map(PointSet::new)
}

/// Write a landmark list in the format [`read_landmarks_json`] accepts.
pub fn write_landmarks_json<P: AsRef<Path>>(path: P, points: &PointSet) -> Result<()> {
    let raw: Vec<[i32; 2]> = points.iter().map(|p| [p.x, p.y]).collect();
    std::fs::write(path, serde_json::to_string(&raw)?)?;
    Ok(())
}

/// Landmarks precomputed by an external detector and stored next to the
/// image as `<stem>.landmarks.json`.
#[derive(Debug, Clone, Default)]
pub struct SidecarLandmarks {
    points: Option<PointSet>,
}

impl SidecarLandmarks {
    pub const SUFFIX: &'static str = "landmarks.json";

    /// Load the sidecar for `image_path`. A missing sidecar means "no detection";
    /// a malformed one is an error.
    pub fn for_image(image_path: &Path) -> Result<Self> {
        let path = sidecar_path(image_path, Self::SUFFIX);
        if !path.exists() {
            return Ok(Self::default());
        }
        Ok(Self {
            points: Some(read_landmarks_json(&path)?),
        })
    }
}

impl LandmarkDetector for SidecarLandmarks {
    fn detect(&self, _image: &RgbImage) -> Option<PointSet> {
        self.points.clone()
    }
}

/// Segmentation stored next to the image as an 8-bit `<stem>.segmentation.png`.
#[derive(Debug, Clone, Default)]
pub struct SidecarSegmentation {
    map: Option<ProbabilityMap>,
}

impl SidecarSegmentation {
    pub const SUFFIX: &'static str = "segmentation.png";

    pub fn for_image(image_path: &Path) -> Result<Self> {
        let path = sidecar_path(image_path, Self::SUFFIX);
        if !path.exists() {
            return Ok(Self::default());
        }
        let gray = image::open(&path)?.to_luma8();
        Ok(Self {
            map: Some(ProbabilityMap::from_luma(&gray)),
        })
    }
}

impl Segmenter for SidecarSegmentation {
    fn segment(&self, _image: &RgbImage) -> Option<ProbabilityMap> {
        self.map.clone()
    }
}

/// Supplies the detection capabilities used for one asset file.
///
/// Library scans run in parallel, so providers are shared across threads and
/// hand out owned capabilities per image.
pub trait CapabilityProvider: Sync {
    fn detector(&self, image_path: &Path) -> Result<Box<dyn LandmarkDetector>>;
    fn segmenter(&self, image_path: &Path) -> Result<Box<dyn Segmenter>>;
}

/// Reads `<stem>.landmarks.json` and `<stem>.segmentation.png` next to each image.
#[derive(Debug, Clone, Copy, Default)]
pub struct SidecarProvider;

impl CapabilityProvider for SidecarProvider {
    fn detector(&self, image_path: &Path) -> Result<Box<dyn LandmarkDetector>> {
        Ok(Box::new(SidecarLandmarks::for_image(image_path)?))
    }

    fn segmenter(&self, image_path: &Path) -> Result<Box<dyn Segmenter>> {
        Ok(Box::new(SidecarSegmentation::for_image(image_path)?))
    }
}

/// Hands the same detector and segmenter to every image.
#[derive(Debug, Clone)]
pub struct SharedCapabilities<D, S> {
    detector: D,
    segmenter: S,
}

impl<D, S> SharedCapabilities<D, S> {
    pub fn new(detector: D, segmenter: S) -> Self {
        Self {
            detector,
            segmenter,
        }
    }
}

impl<D, S> CapabilityProvider for SharedCapabilities<D, S>
where
    D: LandmarkDetector + Clone + Sync + 'static,
    S: Segmenter + Clone + Sync + 'static,
{
    fn detector(&self, _image_path: &Path) -> Result<Box<dyn LandmarkDetector>> {
        Ok(Box::new(self.detector.clone()))
    }

    fn segmenter(&self, _image_path: &Path) -> Result<Box<dyn Segmenter>> {
        Ok(Box::new(self.segmenter.clone()))
    }
}

/// Whether `path` is one of the sidecar files rather than an asset image.
pub fn is_sidecar(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|n| {
            n.ends_with(&format!(".{}", SidecarLandmarks::SUFFIX))
                || n.ends_with(&format!(".{}", SidecarSegmentation::SUFFIX))
        })
}
