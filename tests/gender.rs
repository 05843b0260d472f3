//! Gender classification with stub capabilities, plus a SeetaFace smoke test
//! when the model file is available.

use std::cell::Cell;
use std::path::PathBuf;

use facelock::gender::{FaceLocator, RustfaceLocator};
use facelock::{classify_gender, Gender, GenderClassifier, Rect, Result};
use image::{Rgb, RgbImage};

struct FixedFaces(Vec<Rect>);

impl FaceLocator for FixedFaces {
    fn locate(&mut self, _frame: &RgbImage) -> Result<Vec<Rect>> {
        Ok(self.0.clone())
    }
}

/// Says "female" and remembers the size of the crop it was given.
struct RecordingClassifier {
    seen: Cell<Option<(u32, u32)>>,
    confidence: f32,
}

impl GenderClassifier for RecordingClassifier {
    fn classify(&self, face: &RgbImage) -> Result<(Gender, f32)> {
        self.seen.set(Some(face.dimensions()));
        Ok((Gender::Female, self.confidence))
    }
}

#[test]
fn classifies_padded_largest_face() {
    let frame = RgbImage::from_pixel(200, 150, Rgb([120, 100, 90]));
    let mut locator = FixedFaces(vec![Rect::new(100, 50, 60, 60), Rect::new(5, 5, 10, 10)]);
    let classifier = RecordingClassifier {
        seen: Cell::new(None),
        confidence: 1.7,
    };

    let prediction = classify_gender(&frame, &mut locator, &classifier).unwrap();
    assert_eq!(prediction.gender, Gender::Female);
    assert_eq!(prediction.confidence, 1.0);
    // 60 + 2 * 20 on each axis
    assert_eq!(classifier.seen.get(), Some((100, 100)));
}

#[test]
fn no_face_is_unknown_without_classifying() {
    let frame = RgbImage::new(64, 64);
    let classifier = RecordingClassifier {
        seen: Cell::new(None),
        confidence: 0.9,
    };
    let prediction = classify_gender(&frame, &mut FixedFaces(Vec::new()), &classifier).unwrap();
    assert_eq!(prediction.gender, Gender::Unknown);
    assert_eq!(prediction.confidence, 0.0);
    assert!(classifier.seen.get().is_none());
}

#[test]
fn seeta_locator_on_blank_frame() {
    let model = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("seeta_fd_frontal_v1.0.bin");
    if !model.exists() {
        eprintln!("Skipping test: seeta_fd_frontal_v1.0.bin not found");
        return;
    }

    let mut locator = RustfaceLocator::from_model(&model, 20).expect("Failed to load model");
    let faces = locator.locate(&RgbImage::new(120, 120)).unwrap();
    assert!(faces.is_empty());
}

#[test]
fn missing_model_is_an_error() {
    let result = RustfaceLocator::from_model("/nonexistent/seeta.bin", 20);
    assert!(result.is_err());
}
