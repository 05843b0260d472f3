//! Pixel-level operations shared by the warp engine and the overlay placer:
//! bilinear resampling through an affine map and opacity-weighted blending.

use image::{Rgb, RgbImage, Rgba, RgbaImage};

use crate::geometry::AffineTransform;
use crate::types::{Point, Rect};

/// Sub-pixel offsets closer than this to a whole pixel are treated as exact.
const SNAP_EPSILON: f64 = 1e-6;

/// Read-only view of a rectangular crop of an RGBA image.
///
/// Coordinates are crop-local; anything outside the crop, or outside the
/// underlying image, reads as fully transparent black.
pub struct Crop<'a> {
    image: &'a RgbaImage,
    rect: Rect,
}

impl<'a> Crop<'a> {
    pub fn new(image: &'a RgbaImage, rect: Rect) -> Self {
        Self { image, rect }
    }

    pub fn whole(image: &'a RgbaImage) -> Self {
        let rect = Rect::new(0, 0, image.width() as i32, image.height() as i32);
        Self { image, rect }
    }

    #[inline]
    fn get(&self, x: i32, y: i32) -> [f32; 4] {
        if x < 0 || y < 0 || x >= self.rect.width || y >= self.rect.height {
            return [0.0; 4];
        }
        let gx = self.rect.x + x;
        let gy = self.rect.y + y;
        if gx < 0 || gy < 0 || gx >= self.image.width() as i32 || gy >= self.image.height() as i32
        {
            return [0.0; 4];
        }
        let p = self.image.get_pixel(gx as u32, gy as u32).0;
        [p[0] as f32, p[1] as f32, p[2] as f32, p[3] as f32]
    }

    /// Sample with bilinear interpolation for sub-pixel accuracy.
    pub fn sample_bilinear(&self, x: f64, y: f64) -> Rgba<u8> {
        let x = snap(x);
        let y = snap(y);
        let x0 = x.floor() as i32;
        let y0 = y.floor() as i32;
        let fx = (x - x0 as f64) as f32;
        let fy = (y - y0 as f64) as f32;

        let p00 = self.get(x0, y0);
        let p10 = self.get(x0 + 1, y0);
        let p01 = self.get(x0, y0 + 1);
        let p11 = self.get(x0 + 1, y0 + 1);

        let mut out = [0u8; 4];
        for c in 0..4 {
            let top = p00[c] * (1.0 - fx) + p10[c] * fx;
            let bottom = p01[c] * (1.0 - fx) + p11[c] * fx;
            out[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
        }
        Rgba(out)
    }
}

#[inline]
fn snap(v: f64) -> f64 {
    let r = v.round();
    if (v - r).abs() < SNAP_EPSILON {
        r
    } else {
        v
    }
}

/// Resample `src` through `transform` (source-local to output coordinates)
/// into a `width` x `height` RGBA patch. Output pixels that map outside the
/// source are transparent. Returns `None` for a non-invertible transform.
///
/// To render only part of a larger output, translate `transform` so the
/// window's top-left lands on the origin.
pub fn warp_affine(
    src: &Crop<'_>,
    transform: &AffineTransform,
    width: u32,
    height: u32,
) -> Option<RgbaImage> {
    let inverse = transform.invert()?;
    let mut out = RgbaImage::new(width, height);
    for (x, y, px) in out.enumerate_pixels_mut() {
        let (sx, sy) = inverse.apply(x as f64, y as f64);
        *px = src.sample_bilinear(sx, sy);
    }
    Some(out)
}

/// Alpha-composite `patch` onto `frame` with its top-left at `origin`:
/// `out = src * (a * opacity) + dst * (1 - a * opacity)` per channel, where
/// `a` is the patch's own alpha. Pixels outside the frame are ignored.
///
/// Returns the number of frame pixels the patch overlapped.
pub fn blend_onto(frame: &mut RgbImage, patch: &RgbaImage, origin: Point, opacity: f32) -> usize {
    let frame_rect = Rect::new(0, 0, frame.width() as i32, frame.height() as i32);
    let patch_rect = Rect::new(
        origin.x,
        origin.y,
        patch.width() as i32,
        patch.height() as i32,
    );
    let visible = frame_rect.intersect(&patch_rect);
    if visible.is_empty() {
        return 0;
    }

    let opacity = opacity.clamp(0.0, 1.0);
    for y in visible.y..visible.bottom() {
        for x in visible.x..visible.right() {
            let src = patch.get_pixel((x - origin.x) as u32, (y - origin.y) as u32);
            let weight = (src[3] as f32 / 255.0) * opacity;
            if weight <= 0.0 {
                continue;
            }
            let dst = frame.get_pixel_mut(x as u32, y as u32);
            *dst = blend_pixel(src, dst, weight);
        }
    }
    visible.area() as usize
}

#[inline]
fn blend_pixel(src: &Rgba<u8>, dst: &Rgb<u8>, weight: f32) -> Rgb<u8> {
    let mut out = [0u8; 3];
    for c in 0..3 {
        let v = src[c] as f32 * weight + dst[c] as f32 * (1.0 - weight);
        out[c] = v.clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}
