//! Building-avoiding direct connections
//!
//! For very short hops that skip the road graph, a conductor may still
//! have to get around a building. The fallbacks run in a fixed order:
//! straight line, then an L-shape with one axis-aligned corner in both
//! orientations, then a detour over the blocking buildings' convex
//! hull with a small outward buffer. Each hull waypoint is tested for
//! visibility from both ends and the shortest clear detour wins.

use grid_geometry::{centroid, convex_hull, polyline_length, segment_intersects_ring, Point};
use grid_topology::Building;
use tracing::debug;

/// Outward clearance from a hull corner when detouring (m).
const HULL_BUFFER_M: f64 = 5.0;

fn blocked(a: Point, b: Point, buildings: &[Building]) -> bool {
    buildings
        .iter()
        .any(|building| segment_intersects_ring(a, b, &building.ring))
}

fn clear_chain(points: &[Point], buildings: &[Building]) -> bool {
    points.windows(2).all(|w| !blocked(w[0], w[1], buildings))
}

/// Plan a direct conductor from `start` to `end` avoiding buildings.
/// Returns the polyline, or `None` when no fallback clears the way.
pub fn plan_direct(start: Point, end: Point, buildings: &[Building]) -> Option<Vec<Point>> {
    if !blocked(start, end, buildings) {
        return Some(vec![start, end]);
    }

    // One corner, horizontal leg first
    let corner = Point::new(end.x, start.y);
    let l_shape = vec![start, corner, end];
    if clear_chain(&l_shape, buildings) {
        debug!("Direct connection bends once (horizontal first)");
        return Some(l_shape);
    }

    // One corner, vertical leg first
    let corner = Point::new(start.x, end.y);
    let l_shape = vec![start, corner, end];
    if clear_chain(&l_shape, buildings) {
        debug!("Direct connection bends once (vertical first)");
        return Some(l_shape);
    }

    hull_detour(start, end, buildings)
}

/// Detour around the convex hull of the buildings blocking the
/// straight segment. Tries single waypoints first, then adjacent
/// waypoint pairs, and returns the shortest clear path.
fn hull_detour(start: Point, end: Point, buildings: &[Building]) -> Option<Vec<Point>> {
    let blocking: Vec<&Building> = buildings
        .iter()
        .filter(|b| segment_intersects_ring(start, end, &b.ring))
        .collect();
    if blocking.is_empty() {
        return Some(vec![start, end]);
    }

    let corners: Vec<Point> = blocking.iter().flat_map(|b| b.ring.iter().copied()).collect();
    let hull = convex_hull(&corners);
    let center = centroid(&hull)?;

    let waypoints: Vec<Point> = hull
        .iter()
        .map(|corner| {
            let dx = corner.x - center.x;
            let dy = corner.y - center.y;
            let magnitude = (dx * dx + dy * dy).sqrt();
            if magnitude == 0.0 {
                *corner
            } else {
                Point::new(
                    corner.x + dx / magnitude * HULL_BUFFER_M,
                    corner.y + dy / magnitude * HULL_BUFFER_M,
                )
            }
        })
        .collect();

    let mut best: Option<Vec<Point>> = None;
    fn consider(best: &mut Option<Vec<Point>>, candidate: Vec<Point>, buildings: &[Building]) {
        if !clear_chain(&candidate, buildings) {
            return;
        }
        let length = polyline_length(&candidate);
        if best
            .as_ref()
            .map_or(true, |b| length < polyline_length(b))
        {
            *best = Some(candidate);
        }
    }

    for &waypoint in &waypoints {
        consider(&mut best, vec![start, waypoint, end], buildings);
    }
    if best.is_none() {
        // Two corners along the hull
        for i in 0..waypoints.len() {
            let j = (i + 1) % waypoints.len();
            consider(&mut best, vec![start, waypoints[i], waypoints[j], end], buildings);
        }
    }

    if best.is_none() {
        debug!("No building bypass found between {start:?} and {end:?}");
    }
    best
}
