//! Planar geometry for distribution network design
//!
//! All coordinates live in a single projected metric CRS (Web Mercator
//! style, metres), so distances are plain Euclidean. Provides the point,
//! polyline and polygon operations the design pipeline needs, plus r-tree
//! backed spatial indexes for vertex coalescing and envelope queries.

use serde::{Deserialize, Serialize};

pub mod index;

pub use index::{PointIndex, RectIndex};

/// A point in the projected metric plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: Point) -> f64 {
        ((other.x - self.x).powi(2) + (other.y - self.y).powi(2)).sqrt()
    }

    pub fn to_array(self) -> [f64; 2] {
        [self.x, self.y]
    }
}

impl From<[f64; 2]> for Point {
    fn from(v: [f64; 2]) -> Self {
        Self { x: v[0], y: v[1] }
    }
}

/// An axis-aligned bounding box in metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bbox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bbox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// A square box of side `size` centred on `center`.
    pub fn from_center(center: Point, size: f64) -> Self {
        let half = size / 2.0;
        Self {
            min_x: center.x - half,
            min_y: center.y - half,
            max_x: center.x + half,
            max_y: center.y + half,
        }
    }

    /// Corners rounded to `step` metres, for stable cache keys.
    pub fn quantised(&self, step: f64) -> [i64; 4] {
        let q = |v: f64| (v / step).round() as i64 * step as i64;
        [
            q(self.min_x),
            q(self.min_y),
            q(self.max_x),
            q(self.max_y),
        ]
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.min_x && p.x <= self.max_x && p.y >= self.min_y && p.y <= self.max_y
    }
}

// ---- Segment operations ----

/// Nearest point on segment `a`-`b` to `p`.
pub fn nearest_point_on_segment(p: Point, a: Point, b: Point) -> Point {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len_sq = dx * dx + dy * dy;
    if len_sq == 0.0 {
        return a;
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq).clamp(0.0, 1.0);
    Point::new(a.x + t * dx, a.y + t * dy)
}

/// Nearest point on a polyline to `p`, with the distance and the index of
/// the segment the point falls on.
pub fn nearest_point_on_polyline(p: Point, line: &[Point]) -> Option<(Point, f64, usize)> {
    if line.len() < 2 {
        return None;
    }
    let mut best: Option<(Point, f64, usize)> = None;
    for i in 0..line.len() - 1 {
        let candidate = nearest_point_on_segment(p, line[i], line[i + 1]);
        let d = p.distance_to(candidate);
        if best.map_or(true, |(_, bd, _)| d < bd) {
            best = Some((candidate, d, i));
        }
    }
    best
}

fn orientation(a: Point, b: Point, c: Point) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

/// Proper crossing of two segments: the interiors intersect. Shared
/// endpoints and collinear touches do not count.
pub fn segments_cross(a1: Point, a2: Point, b1: Point, b2: Point) -> bool {
    let o1 = orientation(a1, a2, b1);
    let o2 = orientation(a1, a2, b2);
    let o3 = orientation(b1, b2, a1);
    let o4 = orientation(b1, b2, a2);
    o1 * o2 < 0.0 && o3 * o4 < 0.0
}

/// Intersection point of two properly crossing segments.
pub fn segment_crossing_point(a1: Point, a2: Point, b1: Point, b2: Point) -> Option<Point> {
    if !segments_cross(a1, a2, b1, b2) {
        return None;
    }
    let d = (a2.x - a1.x) * (b2.y - b1.y) - (a2.y - a1.y) * (b2.x - b1.x);
    if d == 0.0 {
        return None;
    }
    let t = ((b1.x - a1.x) * (b2.y - b1.y) - (b1.y - a1.y) * (b2.x - b1.x)) / d;
    Some(Point::new(
        a1.x + t * (a2.x - a1.x),
        a1.y + t * (a2.y - a1.y),
    ))
}

/// All proper crossing points between two polylines.
pub fn polyline_crossings(a: &[Point], b: &[Point]) -> Vec<Point> {
    let mut out = Vec::new();
    if a.len() < 2 || b.len() < 2 {
        return out;
    }
    for i in 0..a.len() - 1 {
        for j in 0..b.len() - 1 {
            if let Some(p) = segment_crossing_point(a[i], a[i + 1], b[j], b[j + 1]) {
                out.push(p);
            }
        }
    }
    out
}

// ---- Polygon operations ----

/// Ray-cast containment test against a closed ring. Points on the
/// boundary are not considered strictly inside.
pub fn point_in_ring(p: Point, ring: &[Point]) -> bool {
    if ring.len() < 3 {
        return false;
    }
    let mut inside = false;
    let n = ring.len();
    let mut j = n - 1;
    for i in 0..n {
        let (pi, pj) = (ring[i], ring[j]);
        if ((pi.y > p.y) != (pj.y > p.y))
            && (p.x < (pj.x - pi.x) * (p.y - pi.y) / (pj.y - pi.y) + pi.x)
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// True when the open segment `a`-`b` passes through the polygon: it
/// properly crosses an edge, or runs through the interior. Grazing a
/// vertex or running along the boundary does not count.
pub fn segment_intersects_ring(a: Point, b: Point, ring: &[Point]) -> bool {
    if ring.len() < 3 {
        return false;
    }
    let n = ring.len();
    let mut j = n - 1;
    for i in 0..n {
        if segments_cross(a, b, ring[j], ring[i]) {
            return true;
        }
        j = i;
    }
    // No edge crossing: the segment is either fully outside or fully
    // inside. Probe the midpoint for the inside case.
    let mid = Point::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0);
    point_in_ring(mid, ring)
}

/// Exterior bounding box of a ring.
pub fn ring_envelope(ring: &[Point]) -> Option<Bbox> {
    envelope(ring)
}

/// Bounding box of any point sequence.
pub fn envelope(points: &[Point]) -> Option<Bbox> {
    let first = points.first()?;
    let mut bbox = Bbox::new(first.x, first.y, first.x, first.y);
    for p in &points[1..] {
        bbox.min_x = bbox.min_x.min(p.x);
        bbox.min_y = bbox.min_y.min(p.y);
        bbox.max_x = bbox.max_x.max(p.x);
        bbox.max_y = bbox.max_y.max(p.y);
    }
    Some(bbox)
}

/// Convex hull (Andrew monotone chain), counter-clockwise, no duplicate
/// closing point.
pub fn convex_hull(points: &[Point]) -> Vec<Point> {
    let mut pts: Vec<Point> = points.to_vec();
    pts.sort_by(|a, b| {
        a.x.partial_cmp(&b.x)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.y.partial_cmp(&b.y).unwrap_or(std::cmp::Ordering::Equal))
    });
    pts.dedup_by(|a, b| a.x == b.x && a.y == b.y);
    if pts.len() < 3 {
        return pts;
    }
    let mut lower: Vec<Point> = Vec::new();
    for &p in &pts {
        while lower.len() >= 2
            && orientation(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0.0
        {
            lower.pop();
        }
        lower.push(p);
    }
    let mut upper: Vec<Point> = Vec::new();
    for &p in pts.iter().rev() {
        while upper.len() >= 2
            && orientation(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0.0
        {
            upper.pop();
        }
        upper.push(p);
    }
    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

/// Centroid of a point set.
pub fn centroid(points: &[Point]) -> Option<Point> {
    if points.is_empty() {
        return None;
    }
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    let n = points.len() as f64;
    Some(Point::new(sx / n, sy / n))
}

// ---- Polyline measures ----

/// Total length of a polyline.
pub fn polyline_length(line: &[Point]) -> f64 {
    line.windows(2).map(|w| w[0].distance_to(w[1])).sum()
}

/// Point at `distance` along the polyline from its first vertex. Clamps
/// to the endpoints.
pub fn interpolate_along(line: &[Point], distance: f64) -> Option<Point> {
    if line.is_empty() {
        return None;
    }
    if line.len() == 1 || distance <= 0.0 {
        return Some(line[0]);
    }
    let mut remaining = distance;
    for w in line.windows(2) {
        let seg = w[0].distance_to(w[1]);
        if remaining <= seg {
            if seg == 0.0 {
                return Some(w[0]);
            }
            let t = remaining / seg;
            return Some(Point::new(
                w[0].x + t * (w[1].x - w[0].x),
                w[0].y + t * (w[1].y - w[0].y),
            ));
        }
        remaining -= seg;
    }
    line.last().copied()
}

/// Interior angle at `b` formed by `a`-`b`-`c`, in degrees (0-180).
/// 180 means the three points are collinear.
pub fn turn_angle_deg(a: Point, b: Point, c: Point) -> f64 {
    let v1 = (a.x - b.x, a.y - b.y);
    let v2 = (c.x - b.x, c.y - b.y);
    let mag1 = (v1.0 * v1.0 + v1.1 * v1.1).sqrt();
    let mag2 = (v2.0 * v2.0 + v2.1 * v2.1).sqrt();
    if mag1 == 0.0 || mag2 == 0.0 {
        return 0.0;
    }
    let cos = ((v1.0 * v2.0 + v1.1 * v2.1) / (mag1 * mag2)).clamp(-1.0, 1.0);
    cos.acos().to_degrees()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert!((a.distance_to(b) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_bbox_quantisation() {
        let bbox = Bbox::new(101.0, 204.9, 312.3, 418.0);
        assert_eq!(bbox.quantised(10.0), [100, 200, 310, 420]);
        // Nearby boxes collapse onto the same key
        let nudged = Bbox::new(103.0, 201.2, 308.0, 421.0);
        assert_eq!(bbox.quantised(10.0), nudged.quantised(10.0));
    }

    #[test]
    fn test_nearest_point_on_segment() {
        let p = Point::new(5.0, 5.0);
        let near = nearest_point_on_segment(p, Point::new(0.0, 0.0), Point::new(10.0, 0.0));
        assert!((near.x - 5.0).abs() < 1e-9);
        assert!(near.y.abs() < 1e-9);

        // Beyond the segment end it clamps
        let near = nearest_point_on_segment(p, Point::new(0.0, 0.0), Point::new(2.0, 0.0));
        assert!((near.x - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_segments_cross() {
        let cross = segments_cross(
            Point::new(0.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
            Point::new(10.0, 0.0),
        );
        assert!(cross);

        // Shared endpoint is a touch, not a crossing
        let touch = segments_cross(
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(20.0, 0.0),
        );
        assert!(!touch);
    }

    #[test]
    fn test_crossing_point() {
        let p = segment_crossing_point(
            Point::new(0.0, -5.0),
            Point::new(0.0, 5.0),
            Point::new(-5.0, 0.0),
            Point::new(5.0, 0.0),
        )
        .unwrap();
        assert!(p.x.abs() < 1e-9 && p.y.abs() < 1e-9);
    }

    #[test]
    fn test_point_in_ring() {
        let ring = vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
        ];
        assert!(point_in_ring(Point::new(5.0, 5.0), &ring));
        assert!(!point_in_ring(Point::new(15.0, 5.0), &ring));
    }

    #[test]
    fn test_segment_intersects_ring() {
        let ring = vec![
            Point::new(4.0, -2.0),
            Point::new(6.0, -2.0),
            Point::new(6.0, 2.0),
            Point::new(4.0, 2.0),
        ];
        // Passes straight through the square
        assert!(segment_intersects_ring(
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            &ring
        ));
        // Clears it entirely
        assert!(!segment_intersects_ring(
            Point::new(0.0, 5.0),
            Point::new(10.0, 5.0),
            &ring
        ));
    }

    #[test]
    fn test_polyline_length_and_interpolate() {
        let line = vec![
            Point::new(0.0, 0.0),
            Point::new(100.0, 0.0),
            Point::new(100.0, 50.0),
        ];
        assert!((polyline_length(&line) - 150.0).abs() < 1e-9);

        let p = interpolate_along(&line, 120.0).unwrap();
        assert!((p.x - 100.0).abs() < 1e-9);
        assert!((p.y - 20.0).abs() < 1e-9);

        // Past the end clamps to the last vertex
        let p = interpolate_along(&line, 500.0).unwrap();
        assert!((p.y - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_turn_angle() {
        let straight = turn_angle_deg(
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(20.0, 0.0),
        );
        assert!((straight - 180.0).abs() < 1e-6);

        let right = turn_angle_deg(
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
        );
        assert!((right - 90.0).abs() < 1e-6);
    }

    #[test]
    fn test_convex_hull() {
        let pts = vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
            Point::new(5.0, 5.0), // interior
        ];
        let hull = convex_hull(&pts);
        assert_eq!(hull.len(), 4);
        assert!(!hull.iter().any(|p| p.x == 5.0 && p.y == 5.0));
    }
}
