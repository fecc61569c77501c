//! R-tree spatial indexes
//!
//! Two wrappers over `rstar`: a point index used for graph-vertex
//! coalescing and radius queries, and a rectangle index used for
//! line-envelope and building lookups. Coordinate equality is never
//! compared directly; every lookup goes through a metric tolerance.

use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{RTree, AABB};

use crate::{Bbox, Point};

/// Point payload index with tolerance-based lookup.
pub struct PointIndex<T> {
    tree: RTree<GeomWithData<[f64; 2], T>>,
}

impl<T> Default for PointIndex<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PointIndex<T> {
    pub fn new() -> Self {
        Self { tree: RTree::new() }
    }

    pub fn insert(&mut self, point: Point, data: T) {
        self.tree.insert(GeomWithData::new(point.to_array(), data));
    }

    /// Nearest payload within `tolerance` metres of `point`, if any.
    pub fn nearest_within(&self, point: Point, tolerance: f64) -> Option<&T> {
        let query = point.to_array();
        self.tree.nearest_neighbor(&query).and_then(|hit| {
            let hp = Point::from(*hit.geom());
            if hp.distance_to(point) <= tolerance {
                Some(&hit.data)
            } else {
                None
            }
        })
    }

    /// All payloads within `radius` metres of `point`.
    pub fn within_radius(&self, point: Point, radius: f64) -> Vec<&T> {
        self.tree
            .locate_within_distance(point.to_array(), radius * radius)
            .map(|hit| &hit.data)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

/// Envelope (bounding-rectangle) index for polylines and polygons.
pub struct RectIndex<T> {
    tree: RTree<GeomWithData<Rectangle<[f64; 2]>, T>>,
}

impl<T> Default for RectIndex<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RectIndex<T> {
    pub fn new() -> Self {
        Self { tree: RTree::new() }
    }

    pub fn insert(&mut self, bbox: Bbox, data: T) {
        let rect = Rectangle::from_corners([bbox.min_x, bbox.min_y], [bbox.max_x, bbox.max_y]);
        self.tree.insert(GeomWithData::new(rect, data));
    }

    /// Payloads whose envelope intersects `bbox`.
    pub fn intersecting(&self, bbox: Bbox) -> Vec<&T> {
        let query = AABB::from_corners([bbox.min_x, bbox.min_y], [bbox.max_x, bbox.max_y]);
        self.tree
            .locate_in_envelope_intersecting(&query)
            .map(|hit| &hit.data)
            .collect()
    }

    /// Payloads whose envelope intersects a square buffer around `point`.
    pub fn around_point(&self, point: Point, radius: f64) -> Vec<&T> {
        self.intersecting(Bbox::new(
            point.x - radius,
            point.y - radius,
            point.x + radius,
            point.y + radius,
        ))
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_index_tolerance() {
        let mut index = PointIndex::new();
        index.insert(Point::new(100.0, 100.0), "a");
        index.insert(Point::new(200.0, 100.0), "b");

        // Within 1m tolerance coalesces onto the existing vertex
        assert_eq!(
            index.nearest_within(Point::new(100.4, 100.3), 1.0),
            Some(&"a")
        );
        // 2m off misses at 1m tolerance
        assert_eq!(index.nearest_within(Point::new(102.0, 100.0), 1.0), None);
    }

    #[test]
    fn test_point_index_radius() {
        let mut index = PointIndex::new();
        for i in 0..5 {
            index.insert(Point::new(i as f64 * 10.0, 0.0), i);
        }
        let mut hits: Vec<i32> = index
            .within_radius(Point::new(0.0, 0.0), 21.0)
            .into_iter()
            .copied()
            .collect();
        hits.sort();
        assert_eq!(hits, vec![0, 1, 2]);
    }

    #[test]
    fn test_rect_index() {
        let mut index = RectIndex::new();
        index.insert(Bbox::new(0.0, 0.0, 10.0, 10.0), 1u32);
        index.insert(Bbox::new(100.0, 100.0, 110.0, 110.0), 2u32);

        let hits = index.around_point(Point::new(11.0, 5.0), 2.5);
        assert_eq!(hits, vec![&1]);
        assert!(index.around_point(Point::new(50.0, 50.0), 2.5).is_empty());
    }
}
