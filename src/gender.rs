//! Gender classification glue, independent of the warp pipeline.
//!
//! Faces are located with a [`FaceLocator`] (SeetaFace via `rustface` by
//! default); the largest face, padded and clamped to the frame, is handed to
//! a [`GenderClassifier`] capability.

use std::path::Path;

use image::{imageops, RgbImage};
use rustface::{Detector, ImageData};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::Rect;

/// Pixels added around the detected face before classification.
pub const FACE_PADDING: i32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
    /// No face was found.
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenderPrediction {
    pub gender: Gender,
    /// In `[0, 1]`.
    pub confidence: f32,
}

impl GenderPrediction {
    pub fn unknown() -> Self {
        Self {
            gender: Gender::Unknown,
            confidence: 0.0,
        }
    }
}

/// Finds face rectangles in a frame.
pub trait FaceLocator {
    fn locate(&mut self, frame: &RgbImage) -> Result<Vec<Rect>>;
}

/// Two-class classifier over a cropped face.
pub trait GenderClassifier {
    fn classify(&self, face: &RgbImage) -> Result<(Gender, f32)>;
}

/// SeetaFace frontal detector.
pub struct RustfaceLocator {
    detector: Box<dyn Detector>,
}

impl RustfaceLocator {
    pub fn from_model<P: AsRef<Path>>(path: P, min_face_size: u32) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path
            .to_str()
            .ok_or_else(|| Error::FaceDetector(format!("invalid model path {:?}", path)))?;
        let mut detector = rustface::create_detector(path_str)
            .map_err(|e| Error::FaceDetector(format!("failed to load face detector: {}", e)))?;
        detector.set_min_face_size(min_face_size);
        detector.set_score_thresh(2.0);
        detector.set_pyramid_scale_factor(0.8);
        detector.set_slide_window_step(4, 4);
        Ok(Self { detector })
    }
}

impl FaceLocator for RustfaceLocator {
    fn locate(&mut self, frame: &RgbImage) -> Result<Vec<Rect>> {
        let gray = imageops::grayscale(frame);
        let image_data = ImageData::new(gray.as_raw(), gray.width(), gray.height());
        let faces = self.detector.detect(&image_data);
        Ok(faces
            .iter()
            .map(|face| {
                let bbox = face.bbox();
                Rect::new(bbox.x(), bbox.y(), bbox.width() as i32, bbox.height() as i32)
            })
            .collect())
    }
}

/// The largest face grown by [`FACE_PADDING`] on every side, clamped to the
/// frame. `None` when there is no face or the clamped crop is empty.
pub fn padded_face_region(faces: &[Rect], frame_width: u32, frame_height: u32) -> Option<Rect> {
    let face = faces.iter().max_by_key(|r| r.area())?;
    let padded = Rect::new(
        face.x - FACE_PADDING,
        face.y - FACE_PADDING,
        face.width + 2 * FACE_PADDING,
        face.height + 2 * FACE_PADDING,
    );
    let region = padded.intersect(&Rect::new(0, 0, frame_width as i32, frame_height as i32));
    (!region.is_empty()).then_some(region)
}

/// Classify the most prominent face in `frame`.
pub fn classify_gender(
    frame: &RgbImage,
    locator: &mut dyn FaceLocator,
    classifier: &dyn GenderClassifier,
) -> Result<GenderPrediction> {
    let faces = locator.locate(frame)?;
    debug!(faces = faces.len(), "located faces");
    let Some(region) = padded_face_region(&faces, frame.width(), frame.height()) else {
        return Ok(GenderPrediction::unknown());
    };

    let crop = imageops::crop_imm(
        frame,
        region.x as u32,
        region.y as u32,
        region.width as u32,
        region.height as u32,
    )
    .to_image();
    let (gender, confidence) = classifier.classify(&crop)?;
    Ok(GenderPrediction {
        gender,
        confidence: confidence.clamp(0.0, 1.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_largest_face_and_pads() {
        let faces = [Rect::new(10, 10, 20, 20), Rect::new(50, 40, 40, 40)];
        assert_eq!(
            padded_face_region(&faces, 100, 100),
            Some(Rect::new(30, 20, 70, 80))
        );
    }

    #[test]
    fn no_face_no_region() {
        assert_eq!(padded_face_region(&[], 100, 100), None);
        let outside = [Rect::new(500, 500, 10, 10)];
        assert_eq!(padded_face_region(&outside, 100, 100), None);
    }
}
