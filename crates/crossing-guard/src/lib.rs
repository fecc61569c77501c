//! Conductor crossing validation
//!
//! A routed polyline is rejected when the new conductor would cross an
//! existing one at an incompatible height. Crossings are ignored when
//! the existing line is not an obstacle (service drops, ground wires at
//! the routing level), when the intersection sits at the path's own
//! endpoints (that is the connection to a pole), or when the estimated
//! installed heights differ by enough to pass as a safe 3-D crossing.

use grid_geometry::{polyline_crossings, Point};
use grid_topology::{Line, PhaseClass, ProcessedTopology};
use serde::Serialize;
use tracing::{debug, info};

/// Estimated installed heights by conductor class (m).
pub const GROUND_WIRE_HEIGHT_M: f64 = 12.0;
pub const HV_TRUNK_HEIGHT_M: f64 = 10.5;
pub const LV_TRUNK_HEIGHT_M: f64 = 8.5;

#[derive(Debug, Clone)]
pub struct CrossingConfig {
    /// Minimum height difference for a safe 3-D crossing (m).
    pub safe_clearance_m: f64,
    /// Intersections this close to the path ends are connections.
    pub endpoint_tolerance_m: f64,
}

impl Default for CrossingConfig {
    fn default() -> Self {
        Self {
            safe_clearance_m: 1.5,
            endpoint_tolerance_m: 1.0,
        }
    }
}

/// One disqualifying crossing.
#[derive(Debug, Clone, Serialize)]
pub struct Crossing {
    pub line_id: String,
    pub point: Point,
    pub existing_height_m: f64,
    pub new_height_m: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CrossingReport {
    pub clear: bool,
    pub crossings: Vec<Crossing>,
}

/// Estimated installed height of an existing conductor.
///
/// Ground-wire annotations sit above everything; otherwise the trunk
/// class decides, with annotation keywords re-deriving lines whose
/// layer said LV but whose conductor spec says otherwise.
pub fn installed_height_m(line: &Line) -> f64 {
    let annotation = line
        .annotation
        .as_deref()
        .unwrap_or("")
        .to_ascii_uppercase();
    if annotation.contains("GW") {
        return GROUND_WIRE_HEIGHT_M;
    }
    if line.is_high_voltage() {
        return HV_TRUNK_HEIGHT_M;
    }
    if annotation.contains("ACSR") || annotation.contains("AL") {
        return HV_TRUNK_HEIGHT_M;
    }
    LV_TRUNK_HEIGHT_M
}

/// Installed height of the conductor being designed. Three-phase
/// supply strings at HV trunk height, single-phase at LV height.
pub fn new_conductor_height_m(phase: PhaseClass) -> f64 {
    match phase {
        PhaseClass::Three => HV_TRUNK_HEIGHT_M,
        PhaseClass::Single => LV_TRUNK_HEIGHT_M,
    }
}

pub struct CrossingGuard<'a> {
    lines: &'a [Line],
    config: CrossingConfig,
}

impl<'a> CrossingGuard<'a> {
    pub fn new(topology: &'a ProcessedTopology, config: CrossingConfig) -> Self {
        Self {
            lines: &topology.lines,
            config,
        }
    }

    pub fn from_lines(lines: &'a [Line], config: CrossingConfig) -> Self {
        Self { lines, config }
    }

    /// Check one routed polyline against every existing conductor.
    pub fn validate_path(&self, path: &[Point], request_phase: PhaseClass) -> CrossingReport {
        if path.len() < 2 {
            return CrossingReport {
                clear: true,
                crossings: Vec::new(),
            };
        }

        let new_height = new_conductor_height_m(request_phase);
        let start = path[0];
        let end = path[path.len() - 1];

        let mut crossings = Vec::new();
        for line in self.lines {
            if !line.is_obstacle {
                continue;
            }
            for point in polyline_crossings(path, &line.points) {
                if point.distance_to(start) <= self.config.endpoint_tolerance_m
                    || point.distance_to(end) <= self.config.endpoint_tolerance_m
                {
                    continue;
                }
                let existing_height = installed_height_m(line);
                if (existing_height - new_height).abs() >= self.config.safe_clearance_m {
                    debug!(
                        "Safe 3-D crossing of {} ({existing_height}m vs {new_height}m)",
                        line.id
                    );
                    continue;
                }
                crossings.push(Crossing {
                    line_id: line.id.clone(),
                    point,
                    existing_height_m: existing_height,
                    new_height_m: new_height,
                });
            }
        }

        if !crossings.is_empty() {
            info!(
                "Path rejected: {} incompatible crossing(s), first with line {}",
                crossings.len(),
                crossings[0].line_id
            );
        }
        CrossingReport {
            clear: crossings.is_empty(),
            crossings,
        }
    }
}
