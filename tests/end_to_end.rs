//! End-to-end warp properties on synthetic assets.

use facelock::capability::ProbabilityMap;
use facelock::{
    triangulate, warp_face, AssetBuilder, AssetPreprocessor, Config, FixedLandmarks,
    NoSegmentation, PointSet, BOUNDARY_POINT_COUNT,
};
use image::{Rgb, RgbImage, Rgba, RgbaImage};

fn corner_landmarks() -> PointSet {
    PointSet::from(vec![(20, 20), (80, 20), (20, 80), (80, 80)])
}

/// 100x100 asset: a colour pattern, opaque except for a transparent band.
fn pattern_asset() -> RgbaImage {
    RgbaImage::from_fn(100, 100, |x, y| {
        let alpha = if (40..50).contains(&y) { 0 } else { 255 };
        Rgba([(x * 2) as u8, (y * 2) as u8, ((x + y) % 256) as u8, alpha])
    })
}

#[test]
fn identical_landmarks_reproduce_opaque_pixels() {
    let asset = AssetBuilder::new("synthetic_0")
        .image(pattern_asset())
        .landmarks(corner_landmarks())
        .build()
        .unwrap();
    assert_eq!(asset.points().len(), 4 + BOUNDARY_POINT_COUNT);

    let frame = RgbImage::from_pixel(100, 100, Rgb([12, 200, 34]));
    let out = warp_face(&frame, &asset, &corner_landmarks(), 1.0, 0.6).unwrap();

    for (x, y, px) in out.enumerate_pixels() {
        let src = asset.image().get_pixel(x, y);
        if src[3] == 255 {
            assert_eq!(px.0, [src[0], src[1], src[2]], "opaque pixel ({}, {})", x, y);
        } else {
            assert_eq!(px.0, [12, 200, 34], "transparent pixel ({}, {})", x, y);
        }
    }
}

#[test]
fn zero_opacity_is_byte_identical() {
    let asset = AssetBuilder::new("synthetic_0")
        .image(pattern_asset())
        .landmarks(corner_landmarks())
        .build()
        .unwrap();
    let frame = RgbImage::from_fn(100, 100, |x, y| Rgb([y as u8, x as u8, 99]));

    let moved = PointSet::from(vec![(25, 18), (77, 24), (22, 83), (81, 78)]);
    let out = warp_face(&frame, &asset, &moved, 0.0, 0.6).unwrap();
    assert_eq!(out, frame);
}

#[test]
fn triangulation_is_repeatable_on_asset_points() {
    let asset = AssetBuilder::new("synthetic_0")
        .image(pattern_asset())
        .landmarks(corner_landmarks())
        .build()
        .unwrap();
    assert_eq!(triangulate(asset.points()), asset.triangles());
}

#[test]
fn prepared_asset_respects_segmentation() {
    let config = Config::default();
    let preprocessor = AssetPreprocessor::new(&config);
    let image = RgbImage::from_pixel(100, 100, Rgb([90, 60, 30]));

    // background on the right third
    struct RightThird;
    impl facelock::Segmenter for RightThird {
        fn segment(&self, image: &RgbImage) -> Option<ProbabilityMap> {
            Some(ProbabilityMap::from_fn(image.width(), image.height(), |x, _| {
                if x >= 66 {
                    0.1
                } else {
                    0.95
                }
            }))
        }
    }

    let asset = preprocessor
        .prepare_mask(
            AssetBuilder::new("animals_0"),
            "animals",
            &image,
            &FixedLandmarks::new(corner_landmarks()),
            &RightThird,
        )
        .unwrap();
    for (x, _, px) in asset.image().enumerate_pixels() {
        if x >= 66 {
            assert_eq!(px[3], 0);
        }
    }
    assert_eq!(asset.image().get_pixel(20, 50)[3], 255);

    let plain = preprocessor
        .prepare_mask(
            AssetBuilder::new("animals_1"),
            "animals",
            &image,
            &FixedLandmarks::new(corner_landmarks()),
            &NoSegmentation,
        )
        .unwrap();
    assert!(plain.image().pixels().all(|p| p[3] == 255));
}
