//! Raw features as returned by the tile server
//!
//! The wire format is GeoJSON-shaped: a geometry plus a flat property
//! map. Property values arrive as strings or numbers depending on the
//! deployment, so the accessors normalise both.

use grid_geometry::Point;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single feature from one tile layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawFeature {
    #[serde(default)]
    pub geometry: Option<RawGeometry>,
    #[serde(default)]
    pub properties: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum RawGeometry {
    Point([f64; 2]),
    LineString(Vec<[f64; 2]>),
    Polygon(Vec<Vec<[f64; 2]>>),
}

impl RawFeature {
    /// First non-empty property among `keys`, normalised to a string.
    pub fn prop_str(&self, keys: &[&str]) -> Option<String> {
        for key in keys {
            match self.properties.get(*key) {
                Some(Value::String(s)) if !s.trim().is_empty() => {
                    return Some(s.trim().to_string())
                }
                Some(Value::Number(n)) => return Some(n.to_string()),
                _ => {}
            }
        }
        None
    }

    /// First parseable numeric property among `keys`.
    pub fn prop_f64(&self, keys: &[&str]) -> Option<f64> {
        for key in keys {
            match self.properties.get(*key) {
                Some(Value::Number(n)) => return n.as_f64(),
                Some(Value::String(s)) => {
                    if let Ok(v) = s.trim().parse::<f64>() {
                        return Some(v);
                    }
                }
                _ => {}
            }
        }
        None
    }

    pub fn point(&self) -> Option<Point> {
        match &self.geometry {
            Some(RawGeometry::Point(c)) => Some(Point::from(*c)),
            _ => None,
        }
    }

    pub fn polyline(&self) -> Option<Vec<Point>> {
        match &self.geometry {
            Some(RawGeometry::LineString(coords)) => {
                Some(coords.iter().map(|c| Point::from(*c)).collect())
            }
            _ => None,
        }
    }

    /// Exterior ring of a polygon geometry.
    pub fn exterior_ring(&self) -> Option<Vec<Point>> {
        match &self.geometry {
            Some(RawGeometry::Polygon(rings)) => rings
                .first()
                .map(|ring| ring.iter().map(|c| Point::from(*c)).collect()),
            _ => None,
        }
    }
}

/// One bounding box worth of raw features, keyed by layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TileSet {
    pub poles: Vec<RawFeature>,
    pub lines_hv: Vec<RawFeature>,
    pub lines_lv: Vec<RawFeature>,
    pub transformers: Vec<RawFeature>,
    pub roads: Vec<RawFeature>,
    pub buildings: Vec<RawFeature>,
    #[serde(default)]
    pub railways: Vec<RawFeature>,
    #[serde(default)]
    pub rivers: Vec<RawFeature>,
}
