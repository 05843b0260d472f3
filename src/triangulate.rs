//! Delaunay triangulation of an ordered point set.
//!
//! Incremental Bowyer-Watson construction seeded with an oversized super
//! triangle. All predicates run on exact integer arithmetic, so the result
//! only depends on the input order. Every triangle touching a super vertex is
//! removed before returning; duplicate points keep their first index.

use std::collections::HashSet;

use crate::types::{Point, PointSet, Triangle};

/// Super triangle half-extent, in multiples of the input's bounding size.
const SUPER_SCALE: i64 = 4096;

#[derive(Debug, Clone, Copy)]
struct Vertex {
    x: i64,
    y: i64,
}

impl From<Point> for Vertex {
    fn from(p: Point) -> Self {
        Self {
            x: p.x as i64,
            y: p.y as i64,
        }
    }
}

fn orient(a: Vertex, b: Vertex, c: Vertex) -> i128 {
    (b.x - a.x) as i128 * (c.y - a.y) as i128 - (b.y - a.y) as i128 * (c.x - a.x) as i128
}

/// Whether `d` lies strictly inside the circumcircle of counter-clockwise `abc`.
fn in_circumcircle(a: Vertex, b: Vertex, c: Vertex, d: Vertex) -> bool {
    let (adx, ady) = ((a.x - d.x) as i128, (a.y - d.y) as i128);
    let (bdx, bdy) = ((b.x - d.x) as i128, (b.y - d.y) as i128);
    let (cdx, cdy) = ((c.x - d.x) as i128, (c.y - d.y) as i128);

    let alift = adx * adx + ady * ady;
    let blift = bdx * bdx + bdy * bdy;
    let clift = cdx * cdx + cdy * cdy;

    let det = alift * (bdx * cdy - cdx * bdy) - blift * (adx * cdy - cdx * ady)
        + clift * (adx * bdy - bdx * ady);
    det > 0
}

/// Triangulate `points`, returning triangles as index triples into `points`.
///
/// Fewer than three distinct points, or an all-collinear set, yields no
/// triangles.
pub fn triangulate(points: &PointSet) -> Vec<Triangle> {
    let n = points.len();
    if n < 3 {
        return Vec::new();
    }

    let bounds = points.bounding_rect();
    let size = bounds.width.max(bounds.height).max(1) as i64;
    let mid_x = bounds.x as i64 + bounds.width as i64 / 2;
    let mid_y = bounds.y as i64 + bounds.height as i64 / 2;
    let reach = SUPER_SCALE * size;

    let mut vertices: Vec<Vertex> = points.iter().map(|&p| Vertex::from(p)).collect();
    vertices.push(Vertex {
        x: mid_x - reach,
        y: mid_y - reach,
    });
    vertices.push(Vertex {
        x: mid_x + reach,
        y: mid_y - reach,
    });
    vertices.push(Vertex {
        x: mid_x,
        y: mid_y + reach,
    });

    let mut triangles: Vec<[usize; 3]> = vec![[n, n + 1, n + 2]];
    let mut seen: HashSet<Point> = HashSet::with_capacity(n);

    let mut bad: Vec<usize> = Vec::new();
    let mut edges: Vec<(usize, usize)> = Vec::new();

    for (i, &p) in points.iter().enumerate() {
        if !seen.insert(p) {
            continue;
        }
        let v = vertices[i];

        bad.clear();
        for (t, tri) in triangles.iter().enumerate() {
            let [a, b, c] = *tri;
            if in_circumcircle(vertices[a], vertices[b], vertices[c], v) {
                bad.push(t);
            }
        }

        edges.clear();
        for &t in &bad {
            let [a, b, c] = triangles[t];
            for edge in [(a, b), (b, c), (c, a)] {
                edges.push(edge);
            }
        }

        // An edge on the cavity boundary belongs to exactly one bad triangle;
        // shared edges appear once in each direction.
        let boundary: Vec<(usize, usize)> = edges
            .iter()
            .copied()
            .filter(|&(a, b)| !edges.contains(&(b, a)))
            .collect();

        let mut t = 0usize;
        triangles.retain(|_| {
            let keep = !bad.contains(&t);
            t += 1;
            keep
        });

        for (a, b) in boundary {
            let o = orient(vertices[a], vertices[b], v);
            if o > 0 {
                triangles.push([a, b, i]);
            } else if o < 0 {
                triangles.push([b, a, i]);
            }
        }
    }

    triangles
        .into_iter()
        .filter(|tri| tri.iter().all(|&idx| idx < n))
        .map(|[a, b, c]| Triangle::new(a, b, c))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::orient2d;

    /// Twice the total area covered by `triangles`.
    fn covered_area2(points: &PointSet, triangles: &[Triangle]) -> i64 {
        triangles
            .iter()
            .map(|t| {
                let [a, b, c] = t.indices();
                orient2d(points[a], points[b], points[c]).abs()
            })
            .sum()
    }

    /// Deterministic scatter for property checks.
    fn scatter(n: usize, w: i32, h: i32, seed: u64) -> PointSet {
        let mut state = seed;
        let mut next = move || {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (state >> 33) as i32
        };
        PointSet::new(
            (0..n)
                .map(|_| Point::new(next().rem_euclid(w), next().rem_euclid(h)))
                .collect(),
        )
    }

    fn assert_delaunay(points: &PointSet, triangles: &[Triangle]) {
        for t in triangles {
            let [a, b, c] = t.indices();
            let (mut va, mut vb, vc) = (
                Vertex::from(points[a]),
                Vertex::from(points[b]),
                Vertex::from(points[c]),
            );
            if orient(va, vb, vc) < 0 {
                std::mem::swap(&mut va, &mut vb);
            }
            for p in points.iter() {
                assert!(
                    !in_circumcircle(va, vb, vc, Vertex::from(*p)),
                    "point {:?} inside circumcircle of {:?}",
                    p,
                    t
                );
            }
        }
    }

    #[test]
    fn single_triangle() {
        let points = PointSet::from(vec![(0, 0), (10, 0), (0, 10)]);
        let tris = triangulate(&points);
        assert_eq!(tris.len(), 1);
        let mut idx = tris[0].indices();
        idx.sort();
        assert_eq!(idx, [0, 1, 2]);
    }

    #[test]
    fn degenerate_inputs_yield_nothing() {
        assert!(triangulate(&PointSet::from(vec![(0, 0), (1, 1)])).is_empty());
        assert!(triangulate(&PointSet::from(vec![(0, 0), (1, 1), (2, 2), (3, 3)])).is_empty());
    }

    #[test]
    fn cocircular_square_gives_two_triangles() {
        let points = PointSet::from(vec![(0, 0), (10, 0), (10, 10), (0, 10)]);
        let tris = triangulate(&points);
        assert_eq!(tris.len(), 2);
        assert_eq!(covered_area2(&points, &tris), 200);
    }

    #[test]
    fn duplicate_points_are_not_referenced_twice() {
        let points = PointSet::from(vec![(0, 0), (10, 0), (0, 10), (10, 0), (10, 10)]);
        let tris = triangulate(&points);
        assert!(!tris.is_empty());
        for t in &tris {
            assert!(t.validate(points.len()).is_ok());
            assert!(!t.indices().contains(&3));
        }
    }

    #[test]
    fn output_is_deterministic() {
        let points = scatter(200, 640, 480, 7);
        let first = triangulate(&points);
        for _ in 0..3 {
            assert_eq!(triangulate(&points), first);
        }
    }

    #[test]
    fn indices_are_valid_and_real() {
        let points = scatter(150, 300, 300, 11);
        let tris = triangulate(&points);
        assert!(!tris.is_empty());
        for t in &tris {
            t.validate(points.len()).unwrap();
        }
    }

    #[test]
    fn satisfies_empty_circumcircle_property() {
        let points = scatter(120, 400, 300, 42);
        let tris = triangulate(&points);
        assert_delaunay(&points, &tris);
    }

    #[test]
    fn framed_points_cover_whole_rectangle() {
        // interior points plus the eight boundary slots of a 100x100 image
        let points = PointSet::from(vec![
            (20, 20),
            (80, 20),
            (20, 80),
            (80, 80),
            (50, 45),
            (0, 0),
            (50, 0),
            (99, 0),
            (99, 50),
            (99, 99),
            (50, 99),
            (0, 99),
            (0, 50),
        ]);
        let tris = triangulate(&points);
        assert_eq!(covered_area2(&points, &tris), 2 * 99 * 99);
        assert_delaunay(&points, &tris);
    }
}
