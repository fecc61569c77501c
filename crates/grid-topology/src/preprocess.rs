//! Raw feature preprocessing (topology reconstruction)
//!
//! Turns one `TileSet` of raw features into a `ProcessedTopology`:
//! filters demolished/support/degenerate facilities, classifies
//! conductors, infers missing line-to-pole and transformer-to-pole
//! links by snapping, and derives each pole's electrical role from the
//! conductors around it. Derived roles are cached process-wide by pole
//! id; once an id is enriched its classification is reused for every
//! later request.

use dashmap::DashMap;
use grid_geometry::{envelope, Point, PointIndex, RectIndex};
use once_cell::sync::Lazy;
use tracing::{debug, info, warn};

use crate::entities::{
    Building, Line, LineClass, PhaseClass, Pole, PoleRole, ProcessedTopology, Road, Transformer,
};
use crate::raw::{RawFeature, TileSet};
use crate::{LayerCounts, PoleClass};

/// Process-wide pole role cache (write-once per pole id).
static POLE_ROLE_CACHE: Lazy<DashMap<String, PoleRole>> = Lazy::new(DashMap::new);

/// Cached derived role for a pole id, if one has been computed in this
/// process.
pub fn cached_role(pole_id: &str) -> Option<PoleRole> {
    POLE_ROLE_CACHE.get(pole_id).map(|entry| *entry.value())
}

/// Upstream status codes marking demolished or removed facilities.
const REMOVED_STATUS_CODES: [&str; 4] = ["D", "R", "DD", "RR"];

#[derive(Debug, Clone)]
pub struct PreprocessConfig {
    /// Snapping radius for inferring missing line endpoint pole ids.
    pub link_radius_m: f64,
    /// Snapping radius for attaching transformers to poles.
    pub transformer_snap_m: f64,
    /// Buffer around a pole when deriving its role from nearby lines.
    pub enrich_radius_m: f64,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            link_radius_m: 15.0,
            transformer_snap_m: 20.0,
            enrich_radius_m: 2.5,
        }
    }
}

pub struct Preprocessor {
    config: PreprocessConfig,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new(PreprocessConfig::default())
    }
}

impl Preprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    pub fn process(&self, tiles: &TileSet) -> ProcessedTopology {
        let raw_counts = LayerCounts {
            poles: tiles.poles.len(),
            lines_hv: tiles.lines_hv.len(),
            lines_lv: tiles.lines_lv.len(),
            transformers: tiles.transformers.len(),
            roads: tiles.roads.len(),
            buildings: tiles.buildings.len(),
        };

        let mut poles = parse_poles(&tiles.poles);
        let hv_lines = parse_lines(&tiles.lines_hv, LineClass::Hv);
        let lv_lines = parse_lines(&tiles.lines_lv, LineClass::Lv);
        let mut lines = hv_lines;
        lines.extend(lv_lines);
        let mut transformers = parse_transformers(&tiles.transformers);
        let roads = parse_roads(&tiles.roads);
        let buildings = parse_buildings(&tiles.buildings);

        let before = poles.len();
        remove_poles_in_buildings(&mut poles, &buildings);
        if poles.len() < before {
            debug!("Dropped {} poles inside buildings", before - poles.len());
        }

        link_lines_to_poles(&mut lines, &poles, self.config.link_radius_m);
        link_transformers_to_poles(&mut transformers, &mut poles, self.config.transformer_snap_m);
        enrich_poles(&mut poles, &lines, self.config.enrich_radius_m);

        let filtered_counts = LayerCounts {
            poles: poles.len(),
            lines_hv: lines.iter().filter(|l| l.class == LineClass::Hv).count(),
            lines_lv: lines.iter().filter(|l| l.class == LineClass::Lv).count(),
            transformers: transformers.len(),
            roads: roads.len(),
            buildings: buildings.len(),
        };

        info!(
            "Preprocessed tile: {} poles, {} lines ({} HV / {} LV), {} transformers, {} roads, {} buildings",
            filtered_counts.poles,
            lines.len(),
            filtered_counts.lines_hv,
            filtered_counts.lines_lv,
            filtered_counts.transformers,
            filtered_counts.roads,
            filtered_counts.buildings,
        );

        let mut topology = ProcessedTopology::new(poles, lines, transformers, roads, buildings);
        topology.raw_counts = raw_counts;
        topology.filtered_counts = filtered_counts;
        topology
    }
}

fn is_removed(feature: &RawFeature) -> bool {
    if let Some(status) = feature.prop_str(&["FAC_STAT_CD"]) {
        if REMOVED_STATUS_CODES.contains(&status.as_str()) {
            return true;
        }
    }
    feature.prop_str(&["REMOVE_YN"]).as_deref() == Some("Y")
}

/// At least two distinct vertices make a proper polyline.
fn has_two_distinct_vertices(points: &[Point]) -> bool {
    points.len() >= 2 && points.iter().any(|p| *p != points[0])
}

fn parse_poles(features: &[RawFeature]) -> Vec<Pole> {
    let mut poles = Vec::new();
    for (i, feature) in features.iter().enumerate() {
        if is_removed(feature) {
            continue;
        }
        // Support poles carry no conductors of their own
        if feature.prop_str(&["POLE_FORM_CD", "POLE_TYPE"]).as_deref() == Some("G") {
            continue;
        }
        let Some(point) = feature.point() else {
            continue;
        };
        let id = feature
            .prop_str(&["GID", "POLE_ID", "FTR_IDN"])
            .unwrap_or_else(|| format!("pole-{i}"));
        let voltage = feature.prop_f64(&["VOLT_VAL"]).filter(|v| *v > 0.0);

        poles.push(Pole {
            id,
            point,
            class: None, // derived from nearby conductors during enrichment
            phase: None,
            voltage,
            has_transformer: false,
            properties: feature.properties.clone(),
        });
    }
    poles
}

fn parse_lines(features: &[RawFeature], class: LineClass) -> Vec<Line> {
    let mut lines = Vec::new();
    for (i, feature) in features.iter().enumerate() {
        if is_removed(feature) {
            continue;
        }
        let Some(points) = feature.polyline() else {
            continue;
        };
        if !has_two_distinct_vertices(&points) {
            debug!("Dropping degenerate line feature #{i}");
            continue;
        }

        let id = feature
            .prop_str(&["GID", "LINE_ID", "FTR_IDN"])
            .unwrap_or_else(|| format!("line-{i}"));
        let phase = feature
            .prop_str(&["PHAR_CLCD"])
            .map(|c| PhaseClass::from_code(&c))
            .unwrap_or(PhaseClass::Single);
        let annotation = feature.prop_str(&["TEXT_GIS_ANNXN"]);
        let kind_code = feature.prop_str(&["PRWR_KND_CD"]).unwrap_or_default();

        // Service drops only exist on the LV layer and never obstruct
        // new routing
        let is_service_drop = class == LineClass::Lv
            && (kind_code.to_ascii_uppercase().contains("DV")
                || annotation
                    .as_deref()
                    .is_some_and(|a| a.to_ascii_uppercase().contains("DV")));
        let is_obstacle = match class {
            LineClass::Hv => true,
            LineClass::Lv => !is_service_drop,
        };

        let voltage = feature
            .prop_f64(&["VOLT_VAL"])
            .filter(|v| *v > 0.0)
            .or(match class {
                // LV standard service voltages when nothing is measured
                LineClass::Lv => Some(if phase == PhaseClass::Three { 380.0 } else { 220.0 }),
                LineClass::Hv => None,
            });

        lines.push(Line {
            id,
            points,
            class,
            phase,
            wire_spec: feature.prop_str(&["PRWR_SPEC_CD"]),
            voltage,
            start_pole_id: feature.prop_str(&["LWER_FAC_GID", "ST_POLE_ID", "FR_POLE_ID"]),
            end_pole_id: feature.prop_str(&["UPPO_FAC_GID", "ED_POLE_ID", "TO_POLE_ID"]),
            is_obstacle,
            is_service_drop,
            annotation,
        });
    }
    lines
}

/// Total capacity from compact `"AxB"` annotations, e.g.
/// `"30X1|20X2"` → 30·1 + 20·2 = 70 kVA. Tokens may be separated by
/// `|` or whitespace; malformed tokens are skipped.
pub fn parse_capacity_annotation(text: &str) -> f64 {
    let mut total = 0.0;
    for token in text.split(|c: char| c == '|' || c.is_whitespace()) {
        let token = token.trim().to_ascii_uppercase();
        if let Some((cap, count)) = token.split_once('X') {
            if let (Ok(cap), Ok(count)) = (cap.trim().parse::<f64>(), count.trim().parse::<f64>())
            {
                total += cap * count;
            }
        }
    }
    total
}

fn parse_transformers(features: &[RawFeature]) -> Vec<Transformer> {
    let mut transformers = Vec::new();
    for (i, feature) in features.iter().enumerate() {
        if is_removed(feature) {
            continue;
        }
        let Some(point) = feature.point() else {
            continue;
        };
        let id = feature
            .prop_str(&["GID", "FTR_IDN"])
            .unwrap_or_else(|| format!("tx-{i}"));

        let mut capacity = feature
            .prop_str(&["TEXT_GIS_ANNXN"])
            .map(|a| parse_capacity_annotation(&a))
            .unwrap_or(0.0);
        if capacity == 0.0 {
            capacity = feature.prop_f64(&["CAP_KVA", "KVA"]).unwrap_or(0.0);
        }

        let phase = feature
            .prop_str(&["PHAR_CLCD"])
            .map(|c| PhaseClass::from_code(&c))
            .unwrap_or(PhaseClass::Single);

        transformers.push(Transformer {
            id,
            point,
            capacity_kva: capacity,
            phase,
            pole_id: feature.prop_str(&["POLE_ID"]),
        });
    }
    transformers
}

fn parse_roads(features: &[RawFeature]) -> Vec<Road> {
    let mut roads = Vec::new();
    for (i, feature) in features.iter().enumerate() {
        let Some(points) = feature.polyline() else {
            continue;
        };
        if !has_two_distinct_vertices(&points) {
            continue;
        }
        roads.push(Road {
            id: feature
                .prop_str(&["ROAD_ID", "FTR_IDN"])
                .unwrap_or_else(|| format!("road-{i}")),
            points,
            category: feature.prop_str(&["ROAD_TYPE", "ROAD_TP"]),
        });
    }
    roads
}

fn parse_buildings(features: &[RawFeature]) -> Vec<Building> {
    let mut buildings = Vec::new();
    for (i, feature) in features.iter().enumerate() {
        let Some(ring) = feature.exterior_ring() else {
            continue;
        };
        if ring.len() < 3 {
            continue;
        }
        buildings.push(Building {
            id: feature
                .prop_str(&["BLDG_ID", "FTR_IDN"])
                .unwrap_or_else(|| format!("bldg-{i}")),
            ring,
        });
    }
    buildings
}

fn remove_poles_in_buildings(poles: &mut Vec<Pole>, buildings: &[Building]) {
    if buildings.is_empty() {
        return;
    }
    let mut index = RectIndex::new();
    for (i, building) in buildings.iter().enumerate() {
        if let Some(bbox) = envelope(&building.ring) {
            index.insert(bbox, i);
        }
    }
    poles.retain(|pole| {
        let inside = index
            .around_point(pole.point, 0.0)
            .into_iter()
            .any(|&i| buildings[i].contains(pole.point));
        if inside {
            debug!("Dropping pole {} inside building", pole.id);
        }
        !inside
    });
}

/// Infer missing endpoint pole ids by snapping line ends to the nearest
/// pole within `radius`.
fn link_lines_to_poles(lines: &mut [Line], poles: &[Pole], radius: f64) {
    if poles.is_empty() {
        return;
    }
    let mut index = PointIndex::new();
    for (i, pole) in poles.iter().enumerate() {
        index.insert(pole.point, i);
    }

    let mut linked = 0usize;
    for line in lines.iter_mut() {
        if line.start_pole_id.is_some() && line.end_pole_id.is_some() {
            continue;
        }
        let (first, last) = (line.points[0], line.points[line.points.len() - 1]);
        if line.start_pole_id.is_none() {
            if let Some(&i) = index.nearest_within(first, radius) {
                line.start_pole_id = Some(poles[i].id.clone());
                linked += 1;
            }
        }
        if line.end_pole_id.is_none() {
            if let Some(&i) = index.nearest_within(last, radius) {
                line.end_pole_id = Some(poles[i].id.clone());
                linked += 1;
            }
        }
    }
    if linked > 0 {
        info!("Linked {linked} line endpoints to poles by proximity");
    }
}

fn link_transformers_to_poles(transformers: &mut [Transformer], poles: &mut [Pole], radius: f64) {
    if transformers.is_empty() || poles.is_empty() {
        return;
    }
    let mut index = PointIndex::new();
    for (i, pole) in poles.iter().enumerate() {
        index.insert(pole.point, i);
    }

    let mut linked = 0usize;
    for transformer in transformers.iter_mut() {
        let pole_idx = match &transformer.pole_id {
            Some(id) => poles.iter().position(|p| &p.id == id),
            None => index.nearest_within(transformer.point, radius).copied(),
        };
        match pole_idx {
            Some(i) => {
                transformer.pole_id = Some(poles[i].id.clone());
                poles[i].has_transformer = true;
                linked += 1;
            }
            None => {
                warn!(
                    "Transformer {} has no pole within {radius}m",
                    transformer.id
                );
            }
        }
    }
    if linked > 0 {
        info!("Attached {linked} transformers to poles (radius {radius}m)");
    }
}

/// Derive each pole's electrical role from conductors within
/// `radius` metres. Cached roles are applied without re-analysis.
fn enrich_poles(poles: &mut [Pole], lines: &[Line], radius: f64) {
    if poles.is_empty() {
        return;
    }

    let mut line_index = RectIndex::new();
    for (i, line) in lines.iter().enumerate() {
        if let Some(bbox) = envelope(&line.points) {
            line_index.insert(bbox, i);
        }
    }

    let mut from_cache = 0usize;
    let mut analysed = 0usize;
    for pole in poles.iter_mut() {
        if let Some(role) = cached_role(&pole.id) {
            pole.class = Some(role.class);
            pole.phase = Some(role.phase);
            from_cache += 1;
            continue;
        }

        let mut nearby_hv = false;
        let mut nearby_three = false;
        for &i in line_index.around_point(pole.point, radius) {
            let line = &lines[i];
            if line.is_high_voltage() {
                nearby_hv = true;
            }
            if line.phase == PhaseClass::Three {
                nearby_three = true;
            }
        }

        let role = PoleRole {
            class: if nearby_hv { PoleClass::Hv } else { PoleClass::Lv },
            phase: if nearby_three {
                PhaseClass::Three
            } else {
                PhaseClass::Single
            },
        };
        pole.class = Some(role.class);
        pole.phase = Some(role.phase);
        // First writer wins; later requests reuse the stored role
        POLE_ROLE_CACHE.entry(pole.id.clone()).or_insert(role);
        analysed += 1;
    }

    info!("Pole enrichment: {analysed} analysed, {from_cache} from cache");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn point_feature(id: &str, x: f64, y: f64, extra: serde_json::Value) -> RawFeature {
        let mut props = extra;
        props["GID"] = json!(id);
        serde_json::from_value(json!({
            "geometry": {"type": "Point", "coordinates": [x, y]},
            "properties": props
        }))
        .unwrap()
    }

    fn line_feature(id: &str, coords: Vec<[f64; 2]>, extra: serde_json::Value) -> RawFeature {
        let mut props = extra;
        props["GID"] = json!(id);
        serde_json::from_value(json!({
            "geometry": {"type": "LineString", "coordinates": coords},
            "properties": props
        }))
        .unwrap()
    }

    fn building_feature(id: &str, x: f64, y: f64, side: f64) -> RawFeature {
        serde_json::from_value(json!({
            "geometry": {"type": "Polygon", "coordinates": [[
                [x, y], [x + side, y], [x + side, y + side], [x, y + side], [x, y]
            ]]},
            "properties": {"BLDG_ID": id}
        }))
        .unwrap()
    }

    #[test]
    fn test_status_and_support_filtering() {
        let tiles = TileSet {
            poles: vec![
                point_feature("P1", 0.0, 0.0, json!({"FAC_STAT_CD": "EI"})),
                point_feature("P2", 10.0, 0.0, json!({"FAC_STAT_CD": "D"})),
                point_feature("P3", 20.0, 0.0, json!({"REMOVE_YN": "Y"})),
                point_feature("P4", 30.0, 0.0, json!({"POLE_FORM_CD": "G"})),
            ],
            ..Default::default()
        };
        let topology = Preprocessor::default().process(&tiles);
        assert_eq!(topology.poles.len(), 1);
        assert_eq!(topology.poles[0].id, "P1");
        assert_eq!(topology.raw_counts.poles, 4);
        assert_eq!(topology.filtered_counts.poles, 1);
    }

    #[test]
    fn test_pole_inside_building_dropped() {
        let tiles = TileSet {
            poles: vec![
                point_feature("IN", 5.0, 5.0, json!({})),
                point_feature("OUT", 50.0, 50.0, json!({})),
            ],
            buildings: vec![building_feature("B1", 0.0, 0.0, 10.0)],
            ..Default::default()
        };
        let topology = Preprocessor::default().process(&tiles);
        let ids: Vec<&str> = topology.poles.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["OUT"]);
    }

    #[test]
    fn test_degenerate_lines_dropped() {
        let tiles = TileSet {
            lines_lv: vec![
                line_feature("flat", vec![[0.0, 0.0], [0.0, 0.0]], json!({})),
                line_feature("ok", vec![[0.0, 0.0], [10.0, 0.0]], json!({})),
            ],
            ..Default::default()
        };
        let topology = Preprocessor::default().process(&tiles);
        assert_eq!(topology.lines.len(), 1);
        assert_eq!(topology.lines[0].id, "ok");
    }

    #[test]
    fn test_service_drop_never_obstacle() {
        let tiles = TileSet {
            lines_lv: vec![
                line_feature(
                    "drop",
                    vec![[0.0, 0.0], [10.0, 0.0]],
                    json!({"PRWR_KND_CD": "DV2"}),
                ),
                line_feature(
                    "trunk",
                    vec![[0.0, 10.0], [10.0, 10.0]],
                    json!({"PRWR_KND_CD": "OW"}),
                ),
            ],
            ..Default::default()
        };
        let topology = Preprocessor::default().process(&tiles);
        let drop = topology.lines.iter().find(|l| l.id == "drop").unwrap();
        let trunk = topology.lines.iter().find(|l| l.id == "trunk").unwrap();
        assert!(drop.is_service_drop && !drop.is_obstacle);
        assert!(!trunk.is_service_drop && trunk.is_obstacle);
    }

    #[test]
    fn test_line_endpoint_linking() {
        let tiles = TileSet {
            poles: vec![
                point_feature("NEAR", 2.0, 0.0, json!({})),
                point_feature("FAR", 200.0, 0.0, json!({})),
            ],
            lines_hv: vec![line_feature("L1", vec![[0.0, 0.0], [100.0, 0.0]], json!({}))],
            ..Default::default()
        };
        let topology = Preprocessor::default().process(&tiles);
        let line = &topology.lines[0];
        assert_eq!(line.start_pole_id.as_deref(), Some("NEAR"));
        // 100m from FAR is outside the 15m linking radius
        assert_eq!(line.end_pole_id, None);
    }

    #[test]
    fn test_transformer_snapping_marks_pole() {
        let tiles = TileSet {
            poles: vec![point_feature("P1", 0.0, 0.0, json!({}))],
            transformers: vec![point_feature(
                "TX1",
                3.0,
                0.0,
                json!({"TEXT_GIS_ANNXN": "30X1|20X2"}),
            )],
            ..Default::default()
        };
        let topology = Preprocessor::default().process(&tiles);
        assert_eq!(topology.transformers[0].pole_id.as_deref(), Some("P1"));
        assert!((topology.transformers[0].capacity_kva - 70.0).abs() < 1e-9);
        assert!(topology.poles[0].has_transformer);
    }

    #[test]
    fn test_capacity_annotation_parsing() {
        assert!((parse_capacity_annotation("30X1|20X2") - 70.0).abs() < 1e-9);
        assert!((parse_capacity_annotation("30X1 20X2") - 70.0).abs() < 1e-9);
        assert!((parse_capacity_annotation("50x3") - 150.0).abs() < 1e-9);
        assert_eq!(parse_capacity_annotation("no-capacity-here"), 0.0);
    }

    #[test]
    fn test_enrichment_is_deterministic_across_runs() {
        let tiles = TileSet {
            poles: vec![point_feature("ENRICH-1", 0.0, 0.0, json!({}))],
            lines_hv: vec![line_feature(
                "HV1",
                vec![[0.0, 1.0], [50.0, 1.0]],
                json!({"PHAR_CLCD": "3"}),
            )],
            ..Default::default()
        };

        let preprocessor = Preprocessor::default();
        let first = preprocessor.process(&tiles);
        assert_eq!(first.poles[0].class, Some(PoleClass::Hv));
        assert_eq!(first.poles[0].phase, Some(PhaseClass::Three));

        // Second run resolves from the process-wide cache and must agree
        let second = preprocessor.process(&tiles);
        assert_eq!(second.poles[0].class, first.poles[0].class);
        assert_eq!(second.poles[0].phase, first.poles[0].phase);
        assert_eq!(
            cached_role("ENRICH-1"),
            Some(PoleRole {
                class: PoleClass::Hv,
                phase: PhaseClass::Three
            })
        );
    }
}
