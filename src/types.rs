use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Largest landmark coordinate magnitude accepted by the pipeline. Keeps the
/// triangulator's exact in-circle determinant within `i128`.
pub const MAX_COORDINATE: i32 = 1 << 16;

/// Whether `(x, y)` lies within [`MAX_COORDINATE`] on both axes.
pub fn coordinate_in_range(x: f64, y: f64) -> bool {
    let limit = MAX_COORDINATE as f64;
    x.abs() <= limit && y.abs() <= limit
}

/// A 2D point in integer pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        let dx = self.x as f64 - other.x as f64;
        let dy = self.y as f64 - other.y as f64;
        (dx * dx + dy * dy).sqrt()
    }

    /// Integer midpoint, rounding toward negative infinity.
    pub fn midpoint(&self, other: &Point) -> Point {
        let mid = |a: i32, b: i32| (a as i64 + b as i64).div_euclid(2) as i32;
        Point::new(mid(self.x, other.x), mid(self.y, other.y))
    }
}

impl std::ops::Add for Point {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl std::ops::Sub for Point {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

impl From<(i32, i32)> for Point {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

/// An axis-aligned rectangle defined by top-left corner, width, and height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Smallest rectangle containing every point, counting pixels inclusively:
    /// a single point yields a 1x1 rect. Empty input yields a zero-area rect.
    pub fn bounding<'a, I>(points: I) -> Self
    where
        I: IntoIterator<Item = &'a Point>,
    {
        let mut iter = points.into_iter();
        let Some(first) = iter.next() else {
            return Self::default();
        };
        let (mut x0, mut y0, mut x1, mut y1) = (first.x, first.y, first.x, first.y);
        for p in iter {
            x0 = x0.min(p.x);
            y0 = y0.min(p.y);
            x1 = x1.max(p.x);
            y1 = y1.max(p.y);
        }
        Self::new(x0, y0, extent(x0, x1), extent(y0, y1))
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn area(&self) -> i64 {
        if self.is_empty() {
            0
        } else {
            self.width as i64 * self.height as i64
        }
    }

    /// Exclusive right edge, saturating at `i32::MAX`.
    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Overlap of two rectangles; zero-area when they do not intersect.
    pub fn intersect(&self, other: &Rect) -> Rect {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        let span = |a: i32, b: i32| (b as i64 - a as i64).clamp(0, i32::MAX as i64) as i32;
        Rect::new(x0, y0, span(x0, x1), span(y0, y1))
    }
}

/// Inclusive pixel count between `lo` and `hi`, saturating at `i32::MAX`.
fn extent(lo: i32, hi: i32) -> i32 {
    (hi as i64 - lo as i64 + 1).min(i32::MAX as i64) as i32
}

/// A triangle expressed as three indices into a point set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Triangle(pub [usize; 3]);

impl Triangle {
    pub const fn new(a: usize, b: usize, c: usize) -> Self {
        Self([a, b, c])
    }

    pub fn indices(&self) -> [usize; 3] {
        self.0
    }

    /// Checks the triangle references three distinct indices below `len`.
    pub fn validate(&self, len: usize) -> Result<()> {
        let [a, b, c] = self.0;
        if a == b || b == c || a == c || a >= len || b >= len || c >= len {
            return Err(Error::InvalidTriangle(a, b, c));
        }
        Ok(())
    }
}

/// An ordered set of points. Index `i` always denotes the same logical
/// landmark or boundary role.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PointSet {
    pub points: Vec<Point>,
}

impl PointSet {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Point> {
        self.points.iter()
    }

    /// Checked access, reporting the offending index.
    pub fn get(&self, index: usize) -> Result<Point> {
        self.points.get(index).copied().ok_or(Error::LandmarkIndex {
            index,
            len: self.points.len(),
        })
    }

    /// Returns a new set with `extra` appended after the existing points.
    pub fn with_appended(&self, extra: &[Point]) -> PointSet {
        let mut points = Vec::with_capacity(self.points.len() + extra.len());
        points.extend_from_slice(&self.points);
        points.extend_from_slice(extra);
        PointSet { points }
    }

    /// Rejects the first point farther than [`MAX_COORDINATE`] from the origin
    /// on either axis.
    pub fn check_range(&self) -> Result<()> {
        match self
            .points
            .iter()
            .position(|p| !coordinate_in_range(p.x as f64, p.y as f64))
        {
            Some(index) => Err(Error::CoordinateOutOfRange {
                index,
                x: self.points[index].x as f64,
                y: self.points[index].y as f64,
            }),
            None => Ok(()),
        }
    }

    pub fn bounding_rect(&self) -> Rect {
        Rect::bounding(&self.points)
    }

    /// Divide every coordinate by `factor`, truncating toward zero.
    pub fn downscaled(&self, factor: i32) -> PointSet {
        PointSet::new(
            self.points
                .iter()
                .map(|p| Point::new(p.x / factor, p.y / factor))
                .collect(),
        )
    }
}

impl From<Vec<(i32, i32)>> for PointSet {
    fn from(v: Vec<(i32, i32)>) -> Self {
        Self::new(v.into_iter().map(Point::from).collect())
    }
}

impl std::ops::Index<usize> for PointSet {
    type Output = Point;

    fn index(&self, idx: usize) -> &Self::Output {
        &self.points[idx]
    }
}
