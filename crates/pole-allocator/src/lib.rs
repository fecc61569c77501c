//! New-pole placement
//!
//! Walks a surviving route and decides where new poles stand. The
//! consumer end always gets one. Further poles go at uniform spacing
//! along the effective length (the route length minus a no-placement
//! buffer in front of the terminating existing pole), and sharp
//! interior turns force junction poles that win over nearby uniform
//! positions. Fast-track routes get exactly one pole at the consumer.

use grid_geometry::{interpolate_along, polyline_length, turn_angle_deg, Point};
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct AllocatorConfig {
    /// Uniform pole spacing (m).
    pub pole_interval_m: f64,
    /// Longest allowed first span from the consumer (m).
    pub first_pole_max_m: f64,
    /// No-placement buffer in front of the terminating existing pole (m).
    pub existing_pole_buffer_m: f64,
    /// A junction this close to a uniform position replaces it (m).
    pub junction_merge_m: f64,
    /// Interior angles below this are junctions (degrees).
    pub turn_angle_threshold_deg: f64,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            pole_interval_m: 40.0,
            first_pole_max_m: 30.0,
            existing_pole_buffer_m: 15.0,
            junction_merge_m: 10.0,
            turn_angle_threshold_deg: 150.0,
        }
    }
}

/// A planned new pole on the route.
#[derive(Debug, Clone, Serialize)]
pub struct NewPole {
    pub point: Point,
    /// 1-based order from the consumer end.
    pub sequence: usize,
    pub distance_from_consumer_m: f64,
    pub is_junction: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Allocation {
    pub new_poles: Vec<NewPole>,
    pub wire_length_m: f64,
    pub turn_count: usize,
}

pub struct PoleAllocator {
    config: AllocatorConfig,
}

impl Default for PoleAllocator {
    fn default() -> Self {
        Self::new(AllocatorConfig::default())
    }
}

impl PoleAllocator {
    pub fn new(config: AllocatorConfig) -> Self {
        Self { config }
    }

    /// Expected pole count for a route of `distance_m`:
    /// one consumer pole, plus one per started interval past the first
    /// span.
    pub fn expected_pole_count(&self, distance_m: f64) -> usize {
        if distance_m <= self.config.first_pole_max_m {
            return 1;
        }
        let remaining = distance_m - self.config.first_pole_max_m;
        1 + (remaining / self.config.pole_interval_m).ceil() as usize
    }

    /// Place poles along `path` (consumer first, existing pole last).
    pub fn allocate(&self, path: &[Point], fast_track: bool) -> Allocation {
        let total_length = polyline_length(path);

        if fast_track || path.len() < 2 {
            return Allocation {
                new_poles: vec![NewPole {
                    point: path.first().copied().unwrap_or(Point::new(0.0, 0.0)),
                    sequence: 1,
                    distance_from_consumer_m: 0.0,
                    is_junction: false,
                }],
                wire_length_m: total_length,
                turn_count: 0,
            };
        }

        let effective_length = total_length - self.config.existing_pole_buffer_m;
        let uniform = self.uniform_positions(total_length, effective_length);
        let junctions = self.junction_positions(path);
        // Turns are counted before the buffer filter: a bend close to
        // the existing pole still bends the wire
        let turn_count = junctions.len();
        let placeable_junctions: Vec<f64> = junctions
            .into_iter()
            .filter(|&pos| pos <= effective_length)
            .collect();

        let merged = self.merge_positions(&uniform, &placeable_junctions);
        debug!(
            "Pole placement: {} uniform, {} junction, {} after merge",
            uniform.len(),
            placeable_junctions.len(),
            merged.len()
        );

        let new_poles: Vec<NewPole> = merged
            .iter()
            .enumerate()
            .filter_map(|(i, &(pos, is_junction))| {
                interpolate_along(path, pos).map(|point| NewPole {
                    point,
                    sequence: i + 1,
                    distance_from_consumer_m: pos,
                    is_junction,
                })
            })
            .collect();

        info!(
            "Allocated {} new poles over {:.1}m ({} turns)",
            new_poles.len(),
            total_length,
            turn_count
        );

        Allocation {
            new_poles,
            wire_length_m: total_length,
            turn_count,
        }
    }

    /// Uniform positions: the consumer end, then every interval up to
    /// the effective length. When the span from the last pole to the
    /// existing pole would reach a full interval, one more pole goes at
    /// the effective-length boundary.
    fn uniform_positions(&self, total_length: f64, effective_length: f64) -> Vec<f64> {
        let mut positions = vec![0.0];
        if total_length <= self.config.existing_pole_buffer_m
            || effective_length <= self.config.pole_interval_m
        {
            return positions;
        }

        let mut pos = self.config.pole_interval_m;
        while pos <= effective_length {
            positions.push(pos);
            pos += self.config.pole_interval_m;
        }

        if let Some(&last) = positions.last() {
            if total_length - last >= self.config.pole_interval_m && effective_length > last {
                positions.push(effective_length);
            }
        }
        positions
    }

    /// Distances along the path of interior vertices that turn sharply
    /// enough to need a pole.
    fn junction_positions(&self, path: &[Point]) -> Vec<f64> {
        let mut junctions = Vec::new();
        if path.len() < 3 {
            return junctions;
        }
        let mut cumulative = 0.0;
        for i in 1..path.len() - 1 {
            cumulative += path[i - 1].distance_to(path[i]);
            // Coincident vertices have no defined turn direction
            if path[i - 1].distance_to(path[i]) < 1e-9
                || path[i].distance_to(path[i + 1]) < 1e-9
            {
                continue;
            }
            let angle = turn_angle_deg(path[i - 1], path[i], path[i + 1]);
            if angle < self.config.turn_angle_threshold_deg {
                debug!("Junction at {cumulative:.1}m (angle {angle:.1} deg)");
                junctions.push(cumulative);
            }
        }
        junctions
    }

    /// Merge uniform and junction positions; a junction within the
    /// merge threshold of a uniform position replaces it, because the
    /// junction is a physical turning requirement.
    fn merge_positions(&self, uniform: &[f64], junctions: &[f64]) -> Vec<(f64, bool)> {
        let mut all: Vec<(f64, bool)> = uniform.iter().map(|&p| (p, false)).collect();
        all.extend(junctions.iter().map(|&p| (p, true)));
        all.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        let mut merged: Vec<(f64, bool)> = Vec::new();
        for (pos, is_junction) in all {
            match merged.last_mut() {
                Some((last_pos, last_is_junction))
                    if (pos - *last_pos).abs() < self.config.junction_merge_m =>
                {
                    if is_junction && !*last_is_junction {
                        *last_pos = pos;
                        *last_is_junction = true;
                    }
                }
                _ => merged.push((pos, is_junction)),
            }
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn straight(length: f64) -> Vec<Point> {
        vec![Point::new(0.0, 0.0), Point::new(length, 0.0)]
    }

    #[test]
    fn test_pole_count_formula() {
        let allocator = PoleAllocator::default();
        assert_eq!(allocator.expected_pole_count(30.0), 1);
        assert_eq!(allocator.expected_pole_count(70.0), 2);
        assert_eq!(allocator.expected_pole_count(120.0), 4);
        assert_eq!(allocator.expected_pole_count(400.0), 11);
    }

    #[test]
    fn test_linear_120m_placement() {
        let allocator = PoleAllocator::default();
        let allocation = allocator.allocate(&straight(120.0), false);

        let positions: Vec<f64> = allocation
            .new_poles
            .iter()
            .map(|p| p.distance_from_consumer_m)
            .collect();
        assert_eq!(positions.len(), 4);
        assert!((positions[0] - 0.0).abs() < 1e-9);
        assert!((positions[1] - 40.0).abs() < 1e-9);
        assert!((positions[2] - 80.0).abs() < 1e-9);
        // Last pole at the effective-length boundary, 15m short of the
        // existing pole
        assert!((positions[3] - 105.0).abs() < 1e-9);
        assert!((allocation.wire_length_m - 120.0).abs() < 1e-9);
    }

    #[test]
    fn test_placement_matches_count_formula() {
        let allocator = PoleAllocator::default();
        for distance in [30.0, 70.0, 120.0, 200.0, 400.0] {
            let allocation = allocator.allocate(&straight(distance), false);
            assert_eq!(
                allocation.new_poles.len(),
                allocator.expected_pole_count(distance),
                "pole count mismatch at {distance}m"
            );
        }
    }

    #[test]
    fn test_spacing_and_buffer_invariants() {
        let allocator = PoleAllocator::default();
        let config = AllocatorConfig::default();
        for distance in [55.0, 87.0, 120.0, 143.0, 256.0, 399.0] {
            let allocation = allocator.allocate(&straight(distance), false);
            let positions: Vec<f64> = allocation
                .new_poles
                .iter()
                .map(|p| p.distance_from_consumer_m)
                .collect();

            for pair in positions.windows(2) {
                assert!(
                    pair[1] - pair[0] <= config.pole_interval_m + 1e-6,
                    "spacing violated at {distance}m: {pair:?}"
                );
            }
            let last = positions.last().copied().unwrap();
            assert!(
                distance - last >= config.existing_pole_buffer_m - 1e-6,
                "buffer violated at {distance}m: last pole {last}"
            );
        }
    }

    #[test]
    fn test_fast_track_single_pole() {
        let allocator = PoleAllocator::default();
        let allocation = allocator.allocate(&straight(30.0), true);
        assert_eq!(allocation.new_poles.len(), 1);
        assert_eq!(allocation.new_poles[0].distance_from_consumer_m, 0.0);
        assert_eq!(allocation.turn_count, 0);
    }

    #[test]
    fn test_junction_forces_pole_and_wins_merge() {
        // Right-angle bend at 35m, within 10m of the uniform 40m slot
        let path = vec![
            Point::new(0.0, 0.0),
            Point::new(35.0, 0.0),
            Point::new(35.0, 85.0),
        ];
        let allocator = PoleAllocator::default();
        let allocation = allocator.allocate(&path, false);

        assert_eq!(allocation.turn_count, 1);
        let junction = allocation
            .new_poles
            .iter()
            .find(|p| p.is_junction)
            .expect("junction pole placed");
        // The junction position replaced the 40m uniform slot
        assert!((junction.distance_from_consumer_m - 35.0).abs() < 1e-9);
        assert!(!allocation
            .new_poles
            .iter()
            .any(|p| (p.distance_from_consumer_m - 40.0).abs() < 1e-9));
    }

    #[test]
    fn test_gentle_bend_is_not_a_junction() {
        // 170 degree bend stays above the 150 degree threshold
        let path = vec![
            Point::new(0.0, 0.0),
            Point::new(50.0, 0.0),
            Point::new(100.0, 8.8),
        ];
        let allocator = PoleAllocator::default();
        let allocation = allocator.allocate(&path, false);
        assert_eq!(allocation.turn_count, 0);
        assert!(allocation.new_poles.iter().all(|p| !p.is_junction));
    }

    #[test]
    fn test_junction_inside_buffer_counts_as_turn_only() {
        // Bend 5m before the existing pole: inside the 15m buffer
        let path = vec![
            Point::new(0.0, 0.0),
            Point::new(55.0, 0.0),
            Point::new(55.0, 5.0),
        ];
        let allocator = PoleAllocator::default();
        let allocation = allocator.allocate(&path, false);

        assert_eq!(allocation.turn_count, 1);
        assert!(allocation.new_poles.iter().all(|p| !p.is_junction));
    }

    #[test]
    fn test_very_short_route_single_pole() {
        // Existing pole only 12m away: inside the buffer, consumer pole only
        let allocator = PoleAllocator::default();
        let allocation = allocator.allocate(&straight(12.0), false);
        assert_eq!(allocation.new_poles.len(), 1);
    }
}
