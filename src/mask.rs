//! Alpha mask derivation for deformable assets.
//!
//! Three cues are combined by logical AND: the segmentation foreground, a
//! polygon covering everything above the jaw, and a near-white exclusion that
//! strips studio backdrops. The "animals" category keeps only the
//! segmentation cue. The result is smoothed with a small binomial kernel and
//! then forced back to zero wherever the hard mask was zero, so smoothing only
//! softens edges inward.

use image::{GrayImage, Luma, RgbImage};
use tracing::debug;

use crate::capability::ProbabilityMap;
use crate::config::{LandmarkLayout, MaskConfig};
use crate::error::{Error, Result};
use crate::geometry::fill_polygon;
use crate::types::{Point, PointSet};

const OPAQUE: u8 = 255;

/// Derive the final 8-bit alpha mask for `image`.
///
/// `segmentation`, when present, must match the image dimensions; when absent
/// every pixel counts as foreground.
pub fn derive_alpha_mask(
    image: &RgbImage,
    landmarks: &PointSet,
    category: &str,
    segmentation: Option<&ProbabilityMap>,
    config: &MaskConfig,
    layout: &LandmarkLayout,
) -> Result<GrayImage> {
    let hard = hard_mask(image, landmarks, category, segmentation, config, layout)?;
    let mut soft = binomial_blur(&hard, config.blur_kernel);
    for (s, h) in soft.pixels_mut().zip(hard.pixels()) {
        if h[0] == 0 {
            s[0] = 0;
        }
    }
    Ok(soft)
}

/// The unsmoothed binary mask (0 or 255 per pixel).
pub fn hard_mask(
    image: &RgbImage,
    landmarks: &PointSet,
    category: &str,
    segmentation: Option<&ProbabilityMap>,
    config: &MaskConfig,
    layout: &LandmarkLayout,
) -> Result<GrayImage> {
    let (width, height) = image.dimensions();
    let mut mask = segmentation_mask(width, height, segmentation, config.segmentation_threshold)?;

    if category.eq_ignore_ascii_case(&config.animals_category) {
        debug!(category, "animal asset, segmentation only");
        return Ok(mask);
    }

    let polygon = jaw_polygon(landmarks, layout, width)?;
    let mut face = GrayImage::new(width, height);
    fill_polygon(&mut face, &polygon, OPAQUE);

    for (x, y, px) in mask.enumerate_pixels_mut() {
        if px[0] == 0 {
            continue;
        }
        if face.get_pixel(x, y)[0] == 0 || luminance(image.get_pixel(x, y).0) > config.white_level
        {
            px[0] = 0;
        }
    }
    Ok(mask)
}

fn segmentation_mask(
    width: u32,
    height: u32,
    segmentation: Option<&ProbabilityMap>,
    threshold: f32,
) -> Result<GrayImage> {
    let Some(map) = segmentation else {
        return Ok(GrayImage::from_pixel(width, height, Luma([OPAQUE])));
    };
    if map.width() != width || map.height() != height {
        return Err(Error::SegmentationSize {
            width,
            height,
            got_width: map.width(),
            got_height: map.height(),
        });
    }
    Ok(GrayImage::from_fn(width, height, |x, y| {
        Luma([if map.get(x, y) > threshold { OPAQUE } else { 0 }])
    }))
}

/// Polygon covering the image above the jaw line: the two top corners, down
/// the right edge to the last jaw point, back along the jaw, and up the left
/// edge from the first jaw point.
fn jaw_polygon(landmarks: &PointSet, layout: &LandmarkLayout, width: u32) -> Result<Vec<Point>> {
    let jaw = layout
        .jawline
        .iter()
        .map(|&i| landmarks.get(i))
        .collect::<Result<Vec<_>>>()?;
    let (Some(&first), Some(&last)) = (jaw.first(), jaw.last()) else {
        return Ok(Vec::new());
    };

    let w = width as i32;
    let mut polygon = Vec::with_capacity(jaw.len() + 4);
    polygon.push(Point::new(0, 0));
    polygon.push(Point::new(w, 0));
    polygon.push(Point::new(w, last.y));
    polygon.extend(jaw.iter().rev().copied());
    polygon.push(Point::new(0, first.y));
    Ok(polygon)
}

/// ITU-R BT.601 luma, rounded.
#[inline]
fn luminance([r, g, b]: [u8; 3]) -> u8 {
    ((299 * r as u32 + 587 * g as u32 + 114 * b as u32 + 500) / 1000) as u8
}

fn binomial_row(size: u32) -> Vec<u32> {
    let mut row = vec![1u32];
    for _ in 1..size {
        let mut next = vec![1u32; row.len() + 1];
        for i in 1..row.len() {
            next[i] = row[i - 1] + row[i];
        }
        row = next;
    }
    row
}

/// Mirror an out-of-range index back into `0..len` without repeating the edge.
fn reflect_101(i: i64, len: i64) -> usize {
    if len == 1 {
        return 0;
    }
    let period = 2 * (len - 1);
    let m = i.rem_euclid(period);
    (if m < len { m } else { period - m }) as usize
}

/// Separable binomial (Gaussian approximation) blur of side `size`.
pub fn binomial_blur(mask: &GrayImage, size: u32) -> GrayImage {
    if size <= 1 || mask.width() == 0 || mask.height() == 0 {
        return mask.clone();
    }
    let kernel = binomial_row(size);
    let norm: u32 = kernel.iter().sum();
    let radius = (size / 2) as i64;
    let (w, h) = mask.dimensions();

    let pass = |src: &GrayImage, horizontal: bool| -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            let mut acc = 0u32;
            for (k, &weight) in kernel.iter().enumerate() {
                let offset = k as i64 - radius;
                let v = if horizontal {
                    src.get_pixel(reflect_101(x as i64 + offset, w as i64) as u32, y)[0]
                } else {
                    src.get_pixel(x, reflect_101(y as i64 + offset, h as i64) as u32)[0]
                };
                acc += weight * v as u32;
            }
            Luma([((acc + norm / 2) / norm) as u8])
        })
    };

    let horizontal = pass(mask, true);
    pass(&horizontal, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    /// Layout with a three-point "jaw" at indices 0..3.
    fn small_layout() -> LandmarkLayout {
        LandmarkLayout {
            jawline: vec![0, 1, 2],
            ..LandmarkLayout::default()
        }
    }

    fn jaw_landmarks() -> PointSet {
        // left ear, chin, right ear: the polygon keeps everything above
        PointSet::from(vec![(0, 20), (20, 30), (39, 20)])
    }

    #[test]
    fn binomial_rows() {
        assert_eq!(binomial_row(5), vec![1, 4, 6, 4, 1]);
        assert_eq!(binomial_row(3), vec![1, 2, 1]);
    }

    #[test]
    fn reflection_skips_edge() {
        assert_eq!(reflect_101(-1, 5), 1);
        assert_eq!(reflect_101(-2, 5), 2);
        assert_eq!(reflect_101(5, 5), 3);
        assert_eq!(reflect_101(6, 5), 2);
        assert_eq!(reflect_101(3, 1), 0);
    }

    #[test]
    fn blur_preserves_flat_regions() {
        let flat = GrayImage::from_pixel(9, 9, Luma([200]));
        assert_eq!(binomial_blur(&flat, 5), flat);
    }

    #[test]
    fn blur_softens_step() {
        let step = GrayImage::from_fn(10, 1, |x, _| Luma([if x < 5 { 0 } else { 255 }]));
        let out = binomial_blur(&step, 5);
        assert!(out.get_pixel(4, 0)[0] > 0);
        assert!(out.get_pixel(5, 0)[0] < 255);
        assert_eq!(out.get_pixel(0, 0)[0], 0);
        assert_eq!(out.get_pixel(9, 0)[0], 255);
    }

    #[test]
    fn polygon_cuts_below_jaw() {
        let image = RgbImage::from_pixel(40, 40, Rgb([120, 90, 80]));
        let mask = derive_alpha_mask(
            &image,
            &jaw_landmarks(),
            "people",
            None,
            &MaskConfig::default(),
            &small_layout(),
        )
        .unwrap();
        assert_eq!(mask.get_pixel(20, 5)[0], 255);
        assert_eq!(mask.get_pixel(20, 38)[0], 0);
        assert_eq!(mask.get_pixel(2, 36)[0], 0);
    }

    #[test]
    fn white_background_is_stripped() {
        let image = RgbImage::from_fn(40, 40, |x, _| {
            if x < 10 {
                Rgb([250, 250, 250])
            } else {
                Rgb([120, 90, 80])
            }
        });
        let mask = derive_alpha_mask(
            &image,
            &jaw_landmarks(),
            "people",
            None,
            &MaskConfig::default(),
            &small_layout(),
        )
        .unwrap();
        for y in 0..40 {
            for x in 0..10 {
                assert_eq!(mask.get_pixel(x, y)[0], 0);
            }
        }
        assert_eq!(mask.get_pixel(25, 5)[0], 255);
    }

    #[test]
    fn segmentation_zero_means_alpha_zero() {
        let image = RgbImage::from_pixel(40, 40, Rgb([120, 90, 80]));
        let seg = ProbabilityMap::from_fn(40, 40, |x, _| if x >= 30 { 0.2 } else { 0.9 });
        let mask = derive_alpha_mask(
            &image,
            &jaw_landmarks(),
            "people",
            Some(&seg),
            &MaskConfig::default(),
            &small_layout(),
        )
        .unwrap();
        for y in 0..40 {
            for x in 30..40 {
                assert_eq!(mask.get_pixel(x, y)[0], 0);
            }
        }
        assert_eq!(mask.get_pixel(15, 5)[0], 255);
    }

    #[test]
    fn animals_skip_polygon_and_white_tests() {
        let image = RgbImage::from_pixel(40, 40, Rgb([255, 255, 255]));
        let mask = derive_alpha_mask(
            &image,
            &jaw_landmarks(),
            "animals",
            None,
            &MaskConfig::default(),
            &small_layout(),
        )
        .unwrap();
        assert!(mask.pixels().all(|p| p[0] == 255));

        let seg = ProbabilityMap::from_fn(40, 40, |_, y| if y < 20 { 0.5 } else { 0.4 });
        let mask = hard_mask(
            &image,
            &PointSet::default(),
            "Animals",
            Some(&seg),
            &MaskConfig::default(),
            &small_layout(),
        )
        .unwrap();
        assert_eq!(mask.get_pixel(3, 3)[0], 255);
        // exactly at the threshold is background
        assert_eq!(mask.get_pixel(3, 30)[0], 0);
    }

    #[test]
    fn mismatched_segmentation_is_rejected() {
        let image = RgbImage::new(10, 10);
        let seg = ProbabilityMap::from_fn(5, 5, |_, _| 1.0);
        let err = hard_mask(
            &image,
            &jaw_landmarks(),
            "animals",
            Some(&seg),
            &MaskConfig::default(),
            &small_layout(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::SegmentationSize { .. }));
    }

    #[test]
    fn missing_jaw_landmark_is_an_error() {
        let image = RgbImage::new(10, 10);
        let err = hard_mask(
            &image,
            &PointSet::from(vec![(1, 1)]),
            "people",
            None,
            &MaskConfig::default(),
            &small_layout(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::LandmarkIndex { index: 1, len: 1 }));
    }
}
