//! Typed network entities
//!
//! Raw upstream codes are normalised into these sum types at the
//! preprocessing boundary; nothing downstream looks at stringly-typed
//! codes again.

use std::collections::HashSet;

use grid_geometry::{
    envelope, point_in_ring, polyline_length, segment_intersects_ring, Point, RectIndex,
};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{LayerCounts, Result, TopologyError};

/// Requested or observed supply phase class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseClass {
    Single,
    Three,
}

impl PhaseClass {
    /// Parse an upstream phase code (`"1"`, `"3"`, `"ABC"`, `"single"`,
    /// `"three"`). Unknown codes default to single phase, matching the
    /// upstream data where the field is frequently absent.
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_ascii_uppercase().as_str() {
            "3" | "THREE" | "ABC" => PhaseClass::Three,
            _ => PhaseClass::Single,
        }
    }

    /// Strict parse for request input, where an unknown class is an
    /// input error rather than a data quirk.
    pub fn parse_request(code: &str) -> Result<Self> {
        match code.trim().to_ascii_lowercase().as_str() {
            "1" | "single" => Ok(PhaseClass::Single),
            "3" | "three" => Ok(PhaseClass::Three),
            other => Err(TopologyError::UnknownPhaseClass(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LineClass {
    Hv,
    Lv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PoleClass {
    Hv,
    Lv,
    Support,
}

/// Derived electrical role of a pole, cached process-wide by pole id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoleRole {
    pub class: PoleClass,
    pub phase: PhaseClass,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pole {
    pub id: String,
    pub point: Point,
    /// Derived by spatial enrichment; `None` only before preprocessing.
    pub class: Option<PoleClass>,
    pub phase: Option<PhaseClass>,
    pub voltage: Option<f64>,
    pub has_transformer: bool,
    #[serde(default)]
    pub properties: serde_json::Map<String, Value>,
}

impl Pole {
    /// A measured voltage value wins over the derived class.
    pub fn is_high_voltage(&self) -> bool {
        if let Some(v) = self.voltage {
            return v >= 1000.0;
        }
        self.class == Some(PoleClass::Hv)
    }

    pub fn is_three_phase(&self) -> bool {
        self.phase == Some(PhaseClass::Three)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Line {
    pub id: String,
    pub points: Vec<Point>,
    pub class: LineClass,
    pub phase: PhaseClass,
    pub wire_spec: Option<String>,
    pub voltage: Option<f64>,
    pub start_pole_id: Option<String>,
    pub end_pole_id: Option<String>,
    /// Trunk conductors obstruct new routing; service drops and ground
    /// wires do not.
    pub is_obstacle: bool,
    pub is_service_drop: bool,
    pub annotation: Option<String>,
}

impl Line {
    /// Layer of origin is authoritative, but a measured voltage value of
    /// 1 kV or more re-derives the line as high voltage.
    pub fn is_high_voltage(&self) -> bool {
        if let Some(v) = self.voltage {
            return v >= 1000.0;
        }
        self.class == LineClass::Hv
    }

    pub fn length_m(&self) -> f64 {
        polyline_length(&self.points)
    }

    pub fn endpoint_pole_ids(&self) -> impl Iterator<Item = &str> {
        self.start_pole_id
            .iter()
            .chain(self.end_pole_id.iter())
            .map(|s| s.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transformer {
    pub id: String,
    pub point: Point,
    pub capacity_kva: f64,
    pub phase: PhaseClass,
    pub pole_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Road {
    pub id: String,
    pub points: Vec<Point>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Building {
    pub id: String,
    /// Exterior ring; interior rings are not needed by the pipeline.
    pub ring: Vec<Point>,
}

impl Building {
    pub fn contains(&self, p: Point) -> bool {
        point_in_ring(p, &self.ring)
    }
}

/// The processed model one design request works against.
///
/// Entity vectors are immutable after preprocessing; the derived views
/// (building index, HV-connected pole set) are materialised on first
/// access and cached for the life of the request.
#[derive(Default)]
pub struct ProcessedTopology {
    pub poles: Vec<Pole>,
    pub lines: Vec<Line>,
    pub transformers: Vec<Transformer>,
    pub roads: Vec<Road>,
    pub buildings: Vec<Building>,
    pub raw_counts: LayerCounts,
    pub filtered_counts: LayerCounts,

    building_index: OnceCell<RectIndex<usize>>,
    hv_connected_poles: OnceCell<HashSet<String>>,
}

impl ProcessedTopology {
    pub fn new(
        poles: Vec<Pole>,
        lines: Vec<Line>,
        transformers: Vec<Transformer>,
        roads: Vec<Road>,
        buildings: Vec<Building>,
    ) -> Self {
        Self {
            poles,
            lines,
            transformers,
            roads,
            buildings,
            ..Default::default()
        }
    }

    fn building_index(&self) -> &RectIndex<usize> {
        self.building_index.get_or_init(|| {
            let mut index = RectIndex::new();
            for (i, building) in self.buildings.iter().enumerate() {
                if let Some(bbox) = envelope(&building.ring) {
                    index.insert(bbox, i);
                }
            }
            index
        })
    }

    /// Pole ids touching at least one high-voltage conductor.
    pub fn hv_connected_pole_ids(&self) -> &HashSet<String> {
        self.hv_connected_poles.get_or_init(|| {
            self.lines
                .iter()
                .filter(|line| line.is_high_voltage())
                .flat_map(|line| line.endpoint_pole_ids().map(str::to_string))
                .collect()
        })
    }

    pub fn point_in_any_building(&self, p: Point) -> bool {
        self.building_index()
            .around_point(p, 0.0)
            .into_iter()
            .any(|&i| self.buildings[i].contains(p))
    }

    /// True when the straight segment `a`-`b` passes through a building.
    pub fn sight_line_blocked(&self, a: Point, b: Point) -> bool {
        let Some(query) = envelope(&[a, b]) else {
            return false;
        };
        self.building_index()
            .intersecting(query)
            .into_iter()
            .any(|&i| segment_intersects_ring(a, b, &self.buildings[i].ring))
    }

    pub fn pole_by_id(&self, id: &str) -> Option<&Pole> {
        self.poles.iter().find(|p| p.id == id)
    }

    pub fn transformer_on_pole(&self, pole_id: &str) -> Option<&Transformer> {
        self.transformers
            .iter()
            .find(|t| t.pole_id.as_deref() == Some(pole_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(id: &str, x: f64, y: f64, side: f64) -> Building {
        Building {
            id: id.to_string(),
            ring: vec![
                Point::new(x, y),
                Point::new(x + side, y),
                Point::new(x + side, y + side),
                Point::new(x, y + side),
            ],
        }
    }

    #[test]
    fn test_phase_class_parsing() {
        assert_eq!(PhaseClass::from_code("3"), PhaseClass::Three);
        assert_eq!(PhaseClass::from_code("ABC"), PhaseClass::Three);
        assert_eq!(PhaseClass::from_code("1"), PhaseClass::Single);
        assert_eq!(PhaseClass::from_code(""), PhaseClass::Single);

        assert!(PhaseClass::parse_request("three").is_ok());
        assert!(PhaseClass::parse_request("two").is_err());
    }

    #[test]
    fn test_voltage_overrides_class() {
        let line = Line {
            id: "L1".into(),
            points: vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0)],
            class: LineClass::Lv,
            phase: PhaseClass::Single,
            wire_spec: None,
            voltage: Some(22900.0),
            start_pole_id: None,
            end_pole_id: None,
            is_obstacle: true,
            is_service_drop: false,
            annotation: None,
        };
        assert!(line.is_high_voltage());
    }

    #[test]
    fn test_sight_line_blocked() {
        let topology = ProcessedTopology::new(
            vec![],
            vec![],
            vec![],
            vec![],
            vec![square("B1", 40.0, -5.0, 10.0)],
        );
        assert!(topology.sight_line_blocked(Point::new(0.0, 0.0), Point::new(100.0, 0.0)));
        assert!(!topology.sight_line_blocked(Point::new(0.0, 20.0), Point::new(100.0, 20.0)));
    }

    #[test]
    fn test_hv_connected_pole_ids() {
        let mk_line = |id: &str, class: LineClass, start: &str, end: &str| Line {
            id: id.into(),
            points: vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0)],
            class,
            phase: PhaseClass::Single,
            wire_spec: None,
            voltage: None,
            start_pole_id: Some(start.into()),
            end_pole_id: Some(end.into()),
            is_obstacle: true,
            is_service_drop: false,
            annotation: None,
        };
        let topology = ProcessedTopology::new(
            vec![],
            vec![
                mk_line("L1", LineClass::Hv, "P1", "P2"),
                mk_line("L2", LineClass::Lv, "P2", "P3"),
            ],
            vec![],
            vec![],
            vec![],
        );
        let hv = topology.hv_connected_pole_ids();
        assert!(hv.contains("P1") && hv.contains("P2"));
        assert!(!hv.contains("P3"));
    }
}
