//! Planar geometry helpers: 2x3 affine maps and polygon rasterisation.

use image::{GrayImage, Luma};

use crate::types::Point;

/// A 2x3 affine transform mapping `(x, y)` to
/// `(m[0]*x + m[1]*y + m[2], m[3]*x + m[4]*y + m[5])`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform {
    pub m: [f64; 6],
}

impl AffineTransform {
    pub const IDENTITY: AffineTransform = AffineTransform {
        m: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
    };

    pub const fn new(m: [f64; 6]) -> Self {
        Self { m }
    }

    /// Solve the unique affine map taking each `src[i]` exactly onto `dst[i]`.
    ///
    /// Six equations, six unknowns, solved with Cramer's rule. Returns `None`
    /// when the source points are collinear.
    pub fn from_triangles(src: [(f64, f64); 3], dst: [(f64, f64); 3]) -> Option<Self> {
        let [(x0, y0), (x1, y1), (x2, y2)] = src;
        let det = x0 * (y1 - y2) - y0 * (x1 - x2) + (x1 * y2 - x2 * y1);
        if det == 0.0 {
            return None;
        }

        // Each output coordinate is an independent 3x3 system
        // [x_i y_i 1] * [a b c]^T = u_i.
        let solve = |u0: f64, u1: f64, u2: f64| -> (f64, f64, f64) {
            let a = (u0 * (y1 - y2) - y0 * (u1 - u2) + (u1 * y2 - u2 * y1)) / det;
            let b = (x0 * (u1 - u2) - u0 * (x1 - x2) + (x1 * u2 - x2 * u1)) / det;
            let c = (x0 * (y1 * u2 - y2 * u1) - y0 * (x1 * u2 - x2 * u1) + u0 * (x1 * y2 - x2 * y1))
                / det;
            (a, b, c)
        };

        let (a, b, c) = solve(dst[0].0, dst[1].0, dst[2].0);
        let (d, e, f) = solve(dst[0].1, dst[1].1, dst[2].1);
        Some(Self::new([a, b, c, d, e, f]))
    }

    /// Rotation by `angle_deg` (counter-clockwise as displayed, y pointing down)
    /// and uniform `scale` about `center`.
    pub fn rotation(center: (f64, f64), angle_deg: f64, scale: f64) -> Self {
        let theta = angle_deg.to_radians();
        let alpha = scale * theta.cos();
        let beta = scale * theta.sin();
        let (cx, cy) = center;
        Self::new([
            alpha,
            beta,
            (1.0 - alpha) * cx - beta * cy,
            -beta,
            alpha,
            beta * cx + (1.0 - alpha) * cy,
        ])
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let m = &self.m;
        (m[0] * x + m[1] * y + m[2], m[3] * x + m[4] * y + m[5])
    }

    pub fn translated(&self, dx: f64, dy: f64) -> Self {
        let mut m = self.m;
        m[2] += dx;
        m[5] += dy;
        Self::new(m)
    }

    pub fn invert(&self) -> Option<Self> {
        let [a, b, c, d, e, f] = self.m;
        let det = a * e - b * d;
        if det == 0.0 {
            return None;
        }
        let ia = e / det;
        let ib = -b / det;
        let id = -d / det;
        let ie = a / det;
        Some(Self::new([
            ia,
            ib,
            -(ia * c + ib * f),
            id,
            ie,
            -(id * c + ie * f),
        ]))
    }
}

/// Twice the signed area of triangle `abc`; positive when counter-clockwise
/// in a y-up frame.
pub fn orient2d(a: Point, b: Point, c: Point) -> i64 {
    (b.x as i64 - a.x as i64) * (c.y as i64 - a.y as i64)
        - (b.y as i64 - a.y as i64) * (c.x as i64 - a.x as i64)
}

/// Whether `p` lies inside triangle `abc` or on its boundary.
pub fn triangle_contains(tri: &[Point; 3], p: Point) -> bool {
    let [a, b, c] = *tri;
    let d0 = orient2d(a, b, p);
    let d1 = orient2d(b, c, p);
    let d2 = orient2d(c, a, p);
    let has_neg = d0 < 0 || d1 < 0 || d2 < 0;
    let has_pos = d0 > 0 || d1 > 0 || d2 > 0;
    !(has_neg && has_pos)
}

/// Rasterise a closed polygon into `mask`, writing `value` into every pixel
/// whose centre lies inside it and every pixel on its outline.
pub fn fill_polygon(mask: &mut GrayImage, polygon: &[Point], value: u8) {
    if polygon.len() < 3 {
        return;
    }
    let (w, h) = mask.dimensions();
    let n = polygon.len();
    let y_min = polygon.iter().map(|p| p.y).min().unwrap_or(0).max(0);
    let y_max = polygon
        .iter()
        .map(|p| p.y)
        .max()
        .unwrap_or(0)
        .min(h as i32 - 1);

    let mut crossings: Vec<f64> = Vec::with_capacity(n);
    for y in y_min..=y_max {
        crossings.clear();
        let yf = y as f64;
        for i in 0..n {
            let p0 = polygon[i];
            let p1 = polygon[(i + 1) % n];
            if p0.y == p1.y {
                continue;
            }
            let (lo, hi) = if p0.y < p1.y { (p0, p1) } else { (p1, p0) };
            // Half-open so shared vertices are counted once.
            if y >= lo.y && y < hi.y {
                let t = (yf - lo.y as f64) / (hi.y - lo.y) as f64;
                crossings.push(lo.x as f64 + t * (hi.x - lo.x) as f64);
            }
        }
        crossings.sort_by(|a, b| a.total_cmp(b));
        for pair in crossings.chunks_exact(2) {
            let x0 = (pair[0].ceil() as i32).max(0);
            let x1 = (pair[1].floor() as i32).min(w as i32 - 1);
            for x in x0..=x1 {
                mask.put_pixel(x as u32, y as u32, Luma([value]));
            }
        }
    }

    for i in 0..n {
        draw_line(mask, polygon[i], polygon[(i + 1) % n], value);
    }
}

/// Bresenham line, clipped to the mask.
fn draw_line(mask: &mut GrayImage, from: Point, to: Point, value: u8) {
    let (w, h) = (mask.width() as i32, mask.height() as i32);
    let (mut x, mut y) = (from.x, from.y);
    let dx = (to.x - from.x).abs();
    let dy = -(to.y - from.y).abs();
    let sx = if from.x < to.x { 1 } else { -1 };
    let sy = if from.y < to.y { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if x >= 0 && y >= 0 && x < w && y < h {
            mask.put_pixel(x as u32, y as u32, Luma([value]));
        }
        if x == to.x && y == to.y {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

/// Filled disk of `radius` around `center`.
pub fn fill_disk(mask: &mut GrayImage, center: Point, radius: i32, value: u8) {
    let r2 = radius as i64 * radius as i64;
    for (x, y, px) in mask.enumerate_pixels_mut() {
        let dx = x as i64 - center.x as i64;
        let dy = y as i64 - center.y as i64;
        if dx * dx + dy * dy <= r2 {
            *px = Luma([value]);
        }
    }
}
