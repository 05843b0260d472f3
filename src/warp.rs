//! Piecewise affine warp of a mask asset onto a live frame.
//!
//! Every triangle of the asset mesh is mapped independently: the source crop
//! is resampled through the exact affine map between the asset's triangle and
//! the live one, then written into a transparent accumulation buffer inside the
//! destination triangle only. Later triangles overwrite earlier ones along
//! shared edges; seams are not blended. The buffer is finally alpha-composited
//! onto the frame.

use image::{RgbImage, RgbaImage};
use tracing::trace;

use crate::asset::Asset;
use crate::boundary::landmark_boundary;
use crate::composite::{blend_onto, warp_affine, Crop};
use crate::error::{Error, Result};
use crate::geometry::{triangle_contains, AffineTransform};
use crate::types::{Point, PointSet, Rect};

/// Warp `asset` onto `frame` following `live_landmarks`.
///
/// `live_landmarks` must have the same cardinality as the landmarks the asset
/// was built from; the boundary points are appended here with the live rule.
pub fn warp_face(
    frame: &RgbImage,
    asset: &Asset,
    live_landmarks: &PointSet,
    opacity: f32,
    margin: f64,
) -> Result<RgbImage> {
    let expected = asset.num_landmarks();
    if live_landmarks.len() != expected {
        return Err(Error::PointCountMismatch {
            expected,
            got: live_landmarks.len(),
        });
    }
    live_landmarks.check_range()?;

    let (width, height) = frame.dimensions();
    let live = live_landmarks.with_appended(&landmark_boundary(
        live_landmarks,
        width,
        height,
        margin,
    ));
    let accumulated = rasterize_mesh(asset, &live, width, height)?;

    let mut out = frame.clone();
    blend_onto(&mut out, &accumulated, Point::new(0, 0), opacity);
    Ok(out)
}

/// Warp every triangle into a transparent `width` x `height` buffer.
pub fn rasterize_mesh(
    asset: &Asset,
    live: &PointSet,
    width: u32,
    height: u32,
) -> Result<RgbaImage> {
    let source_points = asset.points();
    let frame_rect = Rect::new(0, 0, width as i32, height as i32);
    let mut accumulated = RgbaImage::new(width, height);

    for triangle in asset.triangles() {
        triangle.validate(source_points.len())?;
        triangle.validate(live.len())?;
        let [a, b, c] = triangle.indices();
        let src = [source_points[a], source_points[b], source_points[c]];
        let dst = [live[a], live[b], live[c]];

        let src_rect = Rect::bounding(&src);
        let dst_rect = Rect::bounding(&dst);
        if is_flat(&src_rect) || is_flat(&dst_rect) {
            trace!(?triangle, "skipping flat triangle");
            continue;
        }

        let src_local = src.map(|p| p - src_rect.origin());
        let dst_local = dst.map(|p| p - dst_rect.origin());
        let Some(transform) =
            AffineTransform::from_triangles(src_local.map(as_f64), dst_local.map(as_f64))
        else {
            continue;
        };
        // Only the part of the destination rect inside the frame is resampled.
        let visible = dst_rect.intersect(&frame_rect);
        if visible.is_empty() {
            continue;
        }
        let window = visible.origin() - dst_rect.origin();
        let Some(patch) = warp_affine(
            &Crop::new(asset.image(), src_rect),
            &transform.translated(-window.x as f64, -window.y as f64),
            visible.width as u32,
            visible.height as u32,
        ) else {
            continue;
        };

        for y in visible.y..visible.bottom() {
            for x in visible.x..visible.right() {
                let local = Point::new(x - dst_rect.x, y - dst_rect.y);
                if triangle_contains(&dst_local, local) {
                    let px = *patch.get_pixel((x - visible.x) as u32, (y - visible.y) as u32);
                    accumulated.put_pixel(x as u32, y as u32, px);
                }
            }
        }
    }
    Ok(accumulated)
}

/// Zero geometric extent along either axis.
fn is_flat(rect: &Rect) -> bool {
    rect.width <= 1 || rect.height <= 1
}

fn as_f64(p: Point) -> (f64, f64) {
    (p.x as f64, p.y as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::AssetBuilder;
    use image::{Rgb, Rgba};

    fn gradient_asset() -> Asset {
        AssetBuilder::new("t_0")
            .image(RgbaImage::from_fn(100, 100, |x, y| {
                Rgba([x as u8 * 2, y as u8 * 2, 77, 255])
            }))
            .landmarks(PointSet::from(vec![(20, 20), (80, 20), (20, 80), (80, 80)]))
            .build()
            .unwrap()
    }

    fn live() -> PointSet {
        PointSet::from(vec![(20, 20), (80, 20), (20, 80), (80, 80)])
    }

    #[test]
    fn identity_mesh_reproduces_asset() {
        let asset = gradient_asset();
        let frame = RgbImage::from_pixel(100, 100, Rgb([0, 0, 255]));
        let out = warp_face(&frame, &asset, &live(), 1.0, 0.6).unwrap();
        for (x, y, px) in out.enumerate_pixels() {
            let src = asset.image().get_pixel(x, y);
            assert_eq!(px.0, [src[0], src[1], src[2]], "at ({}, {})", x, y);
        }
    }

    #[test]
    fn zero_opacity_is_identity() {
        let asset = gradient_asset();
        let frame = RgbImage::from_fn(100, 100, |x, y| Rgb([x as u8, 3, y as u8]));
        let out = warp_face(&frame, &asset, &live(), 0.0, 0.6).unwrap();
        assert_eq!(out, frame);
    }

    #[test]
    fn landmark_count_must_match() {
        let asset = gradient_asset();
        let frame = RgbImage::new(100, 100);
        let err = warp_face(&frame, &asset, &PointSet::from(vec![(1, 1)]), 1.0, 0.6).unwrap_err();
        assert!(matches!(
            err,
            Error::PointCountMismatch {
                expected: 4,
                got: 1
            }
        ));
    }

    #[test]
    fn extreme_landmarks_are_rejected() {
        let asset = gradient_asset();
        let frame = RgbImage::new(100, 100);
        let extreme = PointSet::from(vec![(i32::MIN, 20), (i32::MAX, 20), (20, 80), (80, 80)]);
        let err = warp_face(&frame, &asset, &extreme, 1.0, 0.6).unwrap_err();
        assert!(matches!(err, Error::CoordinateOutOfRange { index: 0, .. }));
    }

    #[test]
    fn shifted_face_moves_pixels() {
        let asset = gradient_asset();
        let frame = RgbImage::from_pixel(200, 200, Rgb([0, 0, 0]));
        let shifted = PointSet::from(vec![(70, 70), (130, 70), (70, 130), (130, 130)]);
        let out = warp_face(&frame, &asset, &shifted, 1.0, 0.6).unwrap();
        // the asset's landmark at (20, 20) now sits at (70, 70)
        assert_eq!(*out.get_pixel(70, 70), Rgb([40, 40, 77]));
        assert_eq!(*out.get_pixel(100, 100), Rgb([100, 100, 77]));
    }

    #[test]
    fn partially_offscreen_face_keeps_visible_pixels() {
        let asset = gradient_asset();
        let frame = RgbImage::from_pixel(100, 100, Rgb([0, 0, 0]));
        let clipped = PointSet::from(vec![(-30, 20), (30, 20), (-30, 80), (30, 80)]);
        let out = warp_face(&frame, &asset, &clipped, 1.0, 0.6).unwrap();
        // asset (80, 20) and (60, 50), shifted left by 50
        assert_eq!(*out.get_pixel(30, 20), Rgb([160, 40, 77]));
        assert_eq!(*out.get_pixel(10, 50), Rgb([120, 100, 77]));
    }

    #[test]
    fn flat_rects_are_detected() {
        assert!(is_flat(&Rect::bounding(&[
            Point::new(0, 5),
            Point::new(3, 5),
            Point::new(9, 5)
        ])));
        assert!(!is_flat(&Rect::bounding(&[
            Point::new(0, 0),
            Point::new(1, 0),
            Point::new(0, 1)
        ])));
    }
}
