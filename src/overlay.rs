//! Rigid overlay placement.
//!
//! A rigid asset is rotated to follow the eye line, uniformly scaled to a
//! facial measurement chosen by its [`AnchorRule`], centred on an anchor
//! landmark and blended onto the frame. Nothing is deformed.

use image::RgbImage;
use tracing::trace;

use crate::asset::{AnchorRule, Asset};
use crate::composite::{blend_onto, warp_affine, Crop};
use crate::config::LandmarkLayout;
use crate::error::Result;
use crate::geometry::AffineTransform;
use crate::types::{Point, PointSet, Rect};

/// Where and how large an overlay lands on the frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub anchor: Point,
    pub scale: f64,
    /// Eye-line tilt in degrees, y pointing down.
    pub angle_deg: f64,
}

/// Resolve the anchor rule against live landmarks for an overlay
/// `asset_width` pixels wide.
pub fn compute_placement(
    rule: AnchorRule,
    landmarks: &PointSet,
    layout: &LandmarkLayout,
    asset_width: u32,
) -> Result<Placement> {
    let width = asset_width.max(1) as f64;
    let span = |a: usize, b: usize| -> Result<f64> {
        Ok(landmarks.get(a)?.distance(&landmarks.get(b)?))
    };

    let (anchor, scale) = match rule {
        AnchorRule::Glasses => {
            let left = landmarks.get(layout.inner_eye_left)?;
            let right = landmarks.get(layout.inner_eye_right)?;
            let eyes = span(layout.outer_eye_left, layout.outer_eye_right)?;
            (left.midpoint(&right), eyes / (width * 0.45))
        }
        AnchorRule::Mustache => {
            let mouth = span(layout.mouth_left, layout.mouth_right)?;
            (landmarks.get(layout.philtrum)?, mouth / (width * 0.6))
        }
        AnchorRule::Hat => {
            let face = span(layout.face_left, layout.face_right)?;
            (landmarks.get(layout.forehead)?, face / (width * 0.6))
        }
        AnchorRule::Generic => {
            let face = span(layout.face_left, layout.face_right)?;
            (landmarks.get(layout.nose_tip)?, face / width)
        }
    };

    let left = landmarks.get(layout.inner_eye_left)?;
    let right = landmarks.get(layout.inner_eye_right)?;
    let angle_deg = ((right.y - left.y) as f64)
        .atan2((right.x - left.x) as f64)
        .to_degrees();

    Ok(Placement {
        anchor,
        scale,
        angle_deg,
    })
}

/// Place `asset` on a copy of `frame`. An overlay entirely outside the frame
/// leaves it unchanged.
pub fn place_overlay(
    frame: &RgbImage,
    asset: &Asset,
    landmarks: &PointSet,
    layout: &LandmarkLayout,
    opacity: f32,
) -> Result<RgbImage> {
    landmarks.check_range()?;
    let image = asset.image();
    let placement = compute_placement(asset.anchor(), landmarks, layout, image.width())?;
    let mut out = frame.clone();

    let (w, h) = image.dimensions();
    let center = ((w / 2) as f64, (h / 2) as f64);
    // Counter-rotate so the overlay follows the measured tilt on screen.
    let rotation = AffineTransform::rotation(center, -placement.angle_deg, placement.scale);
    let cos = rotation.m[0].abs();
    let sin = rotation.m[1].abs();
    let new_w = (h as f64 * sin + w as f64 * cos) as i64;
    let new_h = (h as f64 * cos + w as f64 * sin) as i64;
    if new_w <= 0 || new_h <= 0 {
        trace!(id = asset.id(), "overlay scaled to nothing");
        return Ok(out);
    }

    // Rotated canvas in frame coordinates; only its on-frame part is rendered.
    let left = placement.anchor.x as i64 - new_w / 2;
    let top = placement.anchor.y as i64 - new_h / 2;
    let Some(visible) = visible_window(left, top, new_w, new_h, frame.dimensions()) else {
        trace!(id = asset.id(), "overlay off frame");
        return Ok(out);
    };

    let transform = rotation.translated(
        new_w as f64 / 2.0 - center.0 - (visible.x as i64 - left) as f64,
        new_h as f64 / 2.0 - center.1 - (visible.y as i64 - top) as f64,
    );
    let Some(rotated) = warp_affine(
        &Crop::whole(image),
        &transform,
        visible.width as u32,
        visible.height as u32,
    ) else {
        return Ok(out);
    };

    let overlap = blend_onto(&mut out, &rotated, visible.origin(), opacity);
    trace!(id = asset.id(), overlap, "placed overlay");
    Ok(out)
}

/// Intersection of a `width` x `height` canvas at (`left`, `top`) with the frame.
fn visible_window(
    left: i64,
    top: i64,
    width: i64,
    height: i64,
    frame: (u32, u32),
) -> Option<Rect> {
    let x0 = left.max(0);
    let y0 = top.max(0);
    let x1 = (left + width).min(frame.0 as i64);
    let y1 = (top + height).min(frame.1 as i64);
    (x1 > x0 && y1 > y0).then(|| {
        Rect::new(x0 as i32, y0 as i32, (x1 - x0) as i32, (y1 - y0) as i32)
    })
}
