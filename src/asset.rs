//! Prepared assets and the preprocessing that builds them.
//!
//! An [`Asset`] is immutable once built. Deformable (mask) assets carry their
//! landmarks followed by the eight image boundary points and a Delaunay mesh
//! over them; rigid overlays carry only pixels and an [`AnchorRule`].

use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, Rgba, RgbImage, RgbaImage};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::boundary::{image_boundary, BOUNDARY_POINT_COUNT};
use crate::capability::{LandmarkDetector, Segmenter};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::geometry::fill_disk;
use crate::mask::derive_alpha_mask;
use crate::triangulate::triangulate;
use crate::types::{Point, PointSet, Triangle};

/// How an asset is composited onto a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    /// Deformed through the face mesh.
    Mask,
    /// Rigid image placed at a facial anchor.
    Overlay,
    /// Rigid image placed at a facial anchor; kept distinct for callers that
    /// group accessories separately from overlays.
    Prop,
}

impl AssetKind {
    pub fn is_rigid(self) -> bool {
        !matches!(self, AssetKind::Mask)
    }
}

/// Placement rule for rigid assets, fixed at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AnchorRule {
    /// Between the inner eye corners, sized to the outer eye span.
    Glasses,
    /// On the philtrum, sized to the mouth width.
    Mustache,
    /// On the forehead, sized to the face width.
    Hat,
    /// On the nose tip, sized to the face width.
    #[default]
    Generic,
}

impl AnchorRule {
    /// Tag an asset from its file name, for libraries that encode the role
    /// there (`round_glasses.png`, `top_hat.webp`).
    pub fn from_file_stem(stem: &str) -> Self {
        let stem = stem.to_ascii_lowercase();
        if stem.contains("glasses") {
            AnchorRule::Glasses
        } else if stem.contains("mustache") {
            AnchorRule::Mustache
        } else if stem.contains("hat") {
            AnchorRule::Hat
        } else {
            AnchorRule::Generic
        }
    }
}

mod rgba_serde {
    use image::RgbaImage;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize)]
    struct RawRef<'a> {
        width: u32,
        height: u32,
        data: &'a [u8],
    }

    #[derive(Deserialize)]
    struct Raw {
        width: u32,
        height: u32,
        data: Vec<u8>,
    }

    pub fn serialize<S: Serializer>(image: &RgbaImage, s: S) -> Result<S::Ok, S::Error> {
        RawRef {
            width: image.width(),
            height: image.height(),
            data: image.as_raw(),
        }
        .serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<RgbaImage, D::Error> {
        let raw = Raw::deserialize(d)?;
        RgbaImage::from_raw(raw.width, raw.height, raw.data)
            .ok_or_else(|| D::Error::custom("pixel buffer does not match its dimensions"))
    }
}

/// A prepared, immutable asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    id: String,
    name: String,
    category: String,
    kind: AssetKind,
    anchor: AnchorRule,
    #[serde(with = "rgba_serde")]
    image: RgbaImage,
    points: PointSet,
    triangles: Vec<Triangle>,
    #[serde(with = "rgba_serde")]
    thumbnail: RgbaImage,
    sound: Option<PathBuf>,
}

impl Asset {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn kind(&self) -> AssetKind {
        self.kind
    }

    pub fn anchor(&self) -> AnchorRule {
        self.anchor
    }

    /// RGBA pixels; for masks the alpha channel is the derived face mask.
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Landmarks followed by the eight boundary points. Empty for rigid assets.
    pub fn points(&self) -> &PointSet {
        &self.points
    }

    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    pub fn thumbnail(&self) -> &RgbaImage {
        &self.thumbnail
    }

    /// Co-located audio file, referenced but never loaded.
    pub fn sound(&self) -> Option<&Path> {
        self.sound.as_deref()
    }

    /// Number of detector landmarks, excluding boundary points.
    pub fn num_landmarks(&self) -> usize {
        self.points.len().saturating_sub(BOUNDARY_POINT_COUNT)
    }
}

/// Builder for [`Asset`]; validates the mesh invariants on `build`.
pub struct AssetBuilder {
    id: String,
    name: Option<String>,
    category: String,
    kind: AssetKind,
    anchor: Option<AnchorRule>,
    image: Option<RgbaImage>,
    landmarks: Option<PointSet>,
    thumbnail: Option<RgbaImage>,
    thumbnail_size: u32,
    sound: Option<PathBuf>,
}

impl AssetBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            category: String::new(),
            kind: AssetKind::Mask,
            anchor: None,
            image: None,
            landmarks: None,
            thumbnail: None,
            thumbnail_size: 60,
            sound: None,
        }
    }

    /// Display name; defaults to the id.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn kind(mut self, kind: AssetKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn anchor(mut self, anchor: AnchorRule) -> Self {
        self.anchor = Some(anchor);
        self
    }

    pub fn image(mut self, image: RgbaImage) -> Self {
        self.image = Some(image);
        self
    }

    /// Detector landmarks in image coordinates, without boundary points.
    pub fn landmarks(mut self, landmarks: PointSet) -> Self {
        self.landmarks = Some(landmarks);
        self
    }

    /// Explicit thumbnail; otherwise one is generated on `build`.
    pub fn thumbnail(mut self, thumbnail: RgbaImage) -> Self {
        self.thumbnail = Some(thumbnail);
        self
    }

    pub fn thumbnail_size(mut self, size: u32) -> Self {
        self.thumbnail_size = size;
        self
    }

    pub fn sound(mut self, sound: Option<PathBuf>) -> Self {
        self.sound = sound;
        self
    }

    pub fn build(self) -> Result<Asset> {
        let image = self.image.ok_or(Error::EmptyImage)?;
        if image.width() == 0 || image.height() == 0 {
            return Err(Error::EmptyImage);
        }

        let (points, triangles) = match self.kind {
            AssetKind::Mask => {
                let landmarks = self.landmarks.ok_or(Error::NoFaceDetected)?;
                landmarks.check_range()?;
                let points =
                    landmarks.with_appended(&image_boundary(image.width(), image.height()));
                let triangles = triangulate(&points);
                if triangles.is_empty() {
                    return Err(Error::EmptyMesh);
                }
                for t in &triangles {
                    t.validate(points.len())?;
                }
                (points, triangles)
            }
            AssetKind::Overlay | AssetKind::Prop => (PointSet::default(), Vec::new()),
        };

        let thumbnail = match self.thumbnail {
            Some(t) => t,
            None if self.kind.is_rigid() => fitted_thumbnail(&image, self.thumbnail_size),
            None => circular_thumbnail(&image, self.thumbnail_size),
        };

        Ok(Asset {
            name: self.name.unwrap_or_else(|| self.id.clone()),
            id: self.id,
            category: self.category,
            kind: self.kind,
            anchor: self.anchor.unwrap_or_default(),
            image,
            points,
            triangles,
            thumbnail,
            sound: self.sound,
        })
    }
}

/// Square thumbnail whose alpha is additionally clipped to the inscribed disk.
pub fn circular_thumbnail(image: &RgbaImage, size: u32) -> RgbaImage {
    let mut thumb = imageops::resize(image, size, size, FilterType::Triangle);
    let mut disk = GrayImage::new(size, size);
    let r = (size / 2) as i32;
    fill_disk(&mut disk, Point::new(r, r), r, 255);
    for (px, d) in thumb.pixels_mut().zip(disk.pixels()) {
        if d[0] == 0 {
            px[3] = 0;
        }
    }
    thumb
}

/// Aspect-preserving fit, centred on a transparent `size` x `size` canvas.
pub fn fitted_thumbnail(image: &RgbaImage, size: u32) -> RgbaImage {
    let (w, h) = image.dimensions();
    let scale = size as f64 / w.max(h) as f64;
    let tw = ((w as f64 * scale) as u32).clamp(1, size);
    let th = ((h as f64 * scale) as u32).clamp(1, size);
    let resized = imageops::resize(image, tw, th, FilterType::Triangle);

    let mut canvas = RgbaImage::from_pixel(size, size, Rgba([0, 0, 0, 0]));
    imageops::replace(
        &mut canvas,
        &resized,
        ((size - tw) / 2) as i64,
        ((size - th) / 2) as i64,
    );
    canvas
}

/// Join color channels with an alpha mask of the same size.
pub fn merge_alpha(image: &RgbImage, alpha: &GrayImage) -> RgbaImage {
    RgbaImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b] = image.get_pixel(x, y).0;
        let Luma([a]) = *alpha.get_pixel(x, y);
        Rgba([r, g, b, a])
    })
}

/// Builds assets from raw images using the injected detection capabilities.
pub struct AssetPreprocessor<'a> {
    config: &'a Config,
}

impl<'a> AssetPreprocessor<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Run the detector, retrying once on an upscaled copy when nothing is
    /// found. Points from the retry are mapped back to original coordinates.
    pub fn detect_landmarks(
        &self,
        image: &RgbImage,
        detector: &dyn LandmarkDetector,
    ) -> Result<PointSet> {
        if let Some(points) = detector.detect(image) {
            return Ok(points);
        }

        let factor = self.config.assets.detection_upscale;
        if factor > 1 {
            debug!(factor, "no landmarks, retrying on upscaled image");
            let upscaled = imageops::resize(
                image,
                image.width() * factor,
                image.height() * factor,
                FilterType::Triangle,
            );
            if let Some(points) = detector.detect(&upscaled) {
                return Ok(points.downscaled(factor as i32));
            }
        }
        Err(Error::NoFaceDetected)
    }

    /// Prepare a deformable mask asset. `builder` supplies identity, category
    /// and sound; pixels, mesh and thumbnail are filled in here.
    pub fn prepare_mask(
        &self,
        builder: AssetBuilder,
        category: &str,
        image: &RgbImage,
        detector: &dyn LandmarkDetector,
        segmenter: &dyn Segmenter,
    ) -> Result<Asset> {
        if image.width() == 0 || image.height() == 0 {
            return Err(Error::EmptyImage);
        }
        let landmarks = self.detect_landmarks(image, detector)?;
        let segmentation = segmenter.segment(image);
        let alpha = derive_alpha_mask(
            image,
            &landmarks,
            category,
            segmentation.as_ref(),
            &self.config.mask,
            &self.config.layout,
        )?;

        builder
            .category(category)
            .kind(AssetKind::Mask)
            .image(merge_alpha(image, &alpha))
            .landmarks(landmarks)
            .thumbnail_size(self.config.assets.thumbnail_size)
            .build()
    }

    /// Prepare a rigid overlay. RGB sources become fully opaque.
    pub fn prepare_overlay(
        &self,
        builder: AssetBuilder,
        category: &str,
        image: RgbaImage,
    ) -> Result<Asset> {
        builder
            .category(category)
            .kind(AssetKind::Overlay)
            .image(image)
            .thumbnail_size(self.config.assets.thumbnail_size)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{FixedLandmarks, NoSegmentation};
    use image::Rgb;

    /// Detector that only succeeds on images at least `min_width` wide.
    struct NeedsLargeImage {
        min_width: u32,
        points: PointSet,
    }

    impl LandmarkDetector for NeedsLargeImage {
        fn detect(&self, image: &RgbImage) -> Option<PointSet> {
            (image.width() >= self.min_width).then(|| self.points.clone())
        }
    }

    fn square_landmarks() -> PointSet {
        PointSet::from(vec![(20, 20), (80, 20), (20, 80), (80, 80)])
    }

    #[test]
    fn anchor_rule_from_name() {
        assert_eq!(AnchorRule::from_file_stem("Round_Glasses"), AnchorRule::Glasses);
        assert_eq!(AnchorRule::from_file_stem("big-mustache"), AnchorRule::Mustache);
        assert_eq!(AnchorRule::from_file_stem("tophat"), AnchorRule::Hat);
        assert_eq!(AnchorRule::from_file_stem("crown"), AnchorRule::Generic);
    }

    #[test]
    fn mask_asset_gets_boundary_and_mesh() {
        let asset = AssetBuilder::new("people_0")
            .image(RgbaImage::from_pixel(100, 100, Rgba([10, 20, 30, 255])))
            .landmarks(square_landmarks())
            .build()
            .unwrap();

        assert_eq!(asset.points().len(), 4 + BOUNDARY_POINT_COUNT);
        assert_eq!(asset.num_landmarks(), 4);
        assert_eq!(asset.points()[4], Point::new(0, 0));
        assert_eq!(asset.points()[8], Point::new(99, 99));
        assert!(!asset.triangles().is_empty());
        for t in asset.triangles() {
            t.validate(asset.points().len()).unwrap();
        }
        assert_eq!(asset.name(), "people_0");
        assert_eq!(asset.thumbnail().dimensions(), (60, 60));
        assert_eq!(asset.thumbnail().get_pixel(0, 0)[3], 0);
        assert_eq!(asset.thumbnail().get_pixel(30, 30)[3], 255);
    }

    #[test]
    fn mask_asset_requires_landmarks() {
        let err = AssetBuilder::new("x")
            .image(RgbaImage::new(10, 10))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::NoFaceDetected));
    }

    #[test]
    fn overlay_asset_has_no_mesh() {
        let asset = AssetBuilder::new("Male_0_overlay")
            .kind(AssetKind::Overlay)
            .anchor(AnchorRule::Hat)
            .image(RgbaImage::from_pixel(120, 40, Rgba([1, 2, 3, 255])))
            .build()
            .unwrap();
        assert!(asset.points().is_empty());
        assert!(asset.triangles().is_empty());
        assert_eq!(asset.anchor(), AnchorRule::Hat);
        // 120x40 fits as 60x20, centred vertically
        let thumb = asset.thumbnail();
        assert_eq!(thumb.get_pixel(30, 10)[3], 0);
        assert_eq!(thumb.get_pixel(30, 30)[3], 255);
    }

    #[test]
    fn detection_retries_upscaled() {
        let config = Config::default();
        let pre = AssetPreprocessor::new(&config);
        let detector = NeedsLargeImage {
            min_width: 150,
            points: PointSet::from(vec![(41, 60), (160, 61)]),
        };
        let image = RgbImage::new(100, 100);
        let points = pre.detect_landmarks(&image, &detector).unwrap();
        assert_eq!(points, PointSet::from(vec![(20, 30), (80, 30)]));

        let never = FixedLandmarks::none();
        assert!(matches!(
            pre.detect_landmarks(&image, &never),
            Err(Error::NoFaceDetected)
        ));
    }

    #[test]
    fn prepare_animal_mask_keeps_full_alpha() {
        let config = Config::default();
        let pre = AssetPreprocessor::new(&config);
        let image = RgbImage::from_pixel(100, 100, Rgb([200, 100, 50]));
        let asset = pre
            .prepare_mask(
                AssetBuilder::new("animals_0").name("cat.png"),
                "animals",
                &image,
                &FixedLandmarks::new(square_landmarks()),
                &NoSegmentation,
            )
            .unwrap();
        assert_eq!(asset.kind(), AssetKind::Mask);
        assert_eq!(asset.category(), "animals");
        assert!(asset.image().pixels().all(|p| p.0 == [200, 100, 50, 255]));
    }

    #[test]
    fn asset_survives_bincode() {
        let asset = AssetBuilder::new("a")
            .image(RgbaImage::from_pixel(100, 100, Rgba([5, 6, 7, 200])))
            .landmarks(square_landmarks())
            .sound(Some(PathBuf::from("a.wav")))
            .build()
            .unwrap();
        let bytes = bincode::serialize(&asset).unwrap();
        let back: Asset = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, asset);
    }
}
