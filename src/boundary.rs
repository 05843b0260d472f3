//! Boundary points appended after the landmarks so the mesh covers the frame.
//!
//! Both rules emit the same eight slots in the same order, which is what keeps
//! an asset's triangle indices valid against live point sets:
//!
//! ```text
//! 0 top-left      1 top-middle     2 top-right
//! 7 middle-left                    3 middle-right
//! 6 bottom-left   5 bottom-middle  4 bottom-right
//! ```

use crate::types::{Point, PointSet};

/// Number of boundary points appended to every landmark set.
pub const BOUNDARY_POINT_COUNT: usize = 8;

fn ring(x1: i32, y1: i32, x2: i32, y2: i32, cx: i32, cy: i32) -> [Point; BOUNDARY_POINT_COUNT] {
    [
        Point::new(x1, y1),
        Point::new(cx, y1),
        Point::new(x2, y1),
        Point::new(x2, cy),
        Point::new(x2, y2),
        Point::new(cx, y2),
        Point::new(x1, y2),
        Point::new(x1, cy),
    ]
}

/// Boundary points of a whole `width` x `height` image: corners and edge midpoints.
pub fn image_boundary(width: u32, height: u32) -> [Point; BOUNDARY_POINT_COUNT] {
    let (w, h) = (width as i32, height as i32);
    ring(0, 0, (w - 1).max(0), (h - 1).max(0), w / 2, h / 2)
}

/// Boundary points around live landmarks: the landmark bounding box grown by
/// `margin` of its width/height on every side, clamped to the frame.
pub fn landmark_boundary(
    landmarks: &PointSet,
    frame_width: u32,
    frame_height: u32,
    margin: f64,
) -> [Point; BOUNDARY_POINT_COUNT] {
    let max_x = (frame_width as i32 - 1).max(0);
    let max_y = (frame_height as i32 - 1).max(0);

    let bounds = landmarks.bounding_rect();
    if bounds.is_empty() {
        return image_boundary(frame_width, frame_height);
    }
    let (x_min, y_min) = (bounds.x, bounds.y);
    let (x_max, y_max) = (bounds.right() - 1, bounds.bottom() - 1);
    let face_w = (x_max - x_min) as f64;
    let face_h = (y_max - y_min) as f64;

    let cx = (x_min + x_max).div_euclid(2).clamp(0, max_x);
    let cy = (y_min + y_max).div_euclid(2).clamp(0, max_y);
    let reach_x = (face_w * (0.5 + margin)) as i32;
    let reach_y = (face_h * (0.5 + margin)) as i32;

    ring(
        (cx - reach_x).clamp(0, max_x),
        (cy - reach_y).clamp(0, max_y),
        (cx + reach_x).clamp(0, max_x),
        (cy + reach_y).clamp(0, max_y),
        cx,
        cy,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_boundary_slots() {
        let b = image_boundary(100, 80);
        assert_eq!(b[0], Point::new(0, 0));
        assert_eq!(b[1], Point::new(50, 0));
        assert_eq!(b[2], Point::new(99, 0));
        assert_eq!(b[3], Point::new(99, 40));
        assert_eq!(b[4], Point::new(99, 79));
        assert_eq!(b[5], Point::new(50, 79));
        assert_eq!(b[6], Point::new(0, 79));
        assert_eq!(b[7], Point::new(0, 40));
    }

    #[test]
    fn landmark_boundary_expands_around_face() {
        let lm = PointSet::from(vec![(300, 200), (340, 200), (320, 260)]);
        let b = landmark_boundary(&lm, 640, 480, 0.6);
        // width 40 -> reach 44, height 60 -> reach 66, centre (320, 230)
        assert_eq!(b[0], Point::new(276, 164));
        assert_eq!(b[4], Point::new(364, 296));
        assert_eq!(b[1], Point::new(320, 164));
        assert_eq!(b[7], Point::new(276, 230));
    }

    #[test]
    fn landmark_boundary_stays_in_frame() {
        let lm = PointSet::from(vec![(5, 5), (90, 8), (50, 95), (-3, 40)]);
        for p in landmark_boundary(&lm, 100, 100, 0.6) {
            assert!(p.x >= 0 && p.x < 100 && p.y >= 0 && p.y < 100, "{:?}", p);
        }
    }

    #[test]
    fn both_rules_share_slot_order() {
        // a face spanning most of the frame clamps to the image boundary exactly
        let lm = PointSet::from(vec![(20, 20), (80, 20), (20, 80), (80, 80)]);
        assert_eq!(landmark_boundary(&lm, 100, 100, 0.6), image_boundary(100, 100));
    }
}
