//! Request and response DTOs

use chrono::Utc;
use design_costing::{CapacityReport, CostBreakdown, VoltageDropReport};
use grid_geometry::Point;
use grid_topology::{Building, LayerCounts, Line, PhaseClass, Pole, Road, Transformer};
use pole_allocator::NewPole;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A design request from the outer HTTP surface.
#[derive(Debug, Clone, Deserialize)]
pub struct DesignRequest {
    /// Consumer coordinate in the projected metric CRS.
    pub x: f64,
    pub y: f64,
    /// `"single"`/`"1"` or `"three"`/`"3"`.
    pub phase: String,
    /// Requested load (kW); the configured default applies when absent.
    pub load_kw: Option<f64>,
    /// Per-request server overrides.
    pub gis_url: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DesignStatus {
    Success,
    Failed,
    NoRoute,
}

/// One ranked route in the response.
#[derive(Debug, Clone, Serialize)]
pub struct RouteSummary {
    pub rank: usize,
    pub cost_index: u64,
    pub total_cost: u64,
    pub total_distance_m: f64,
    pub source_pole_id: String,
    pub source_pole_coord: [f64; 2],
    /// HV or LV at the source pole.
    pub source_voltage_class: String,
    pub source_phase: Option<PhaseClass>,
    pub new_pole_count: usize,
    pub new_poles: Vec<NewPole>,
    pub path: Vec<[f64; 2]>,
    pub turn_count: usize,
    pub wire_spec: &'static str,
    pub breakdown: CostBreakdown,
    pub voltage_drop: VoltageDropReport,
    pub capacity: Option<CapacityReport>,
    pub fast_track: bool,
    pub remark: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DesignResponse {
    pub request_id: String,
    pub status: DesignStatus,
    pub phase: Option<PhaseClass>,
    pub consumer: [f64; 2],
    pub requested_load_kw: f64,
    pub routes: Vec<RouteSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub processing_time_ms: u64,
    pub generated_at: String,
}

impl DesignResponse {
    pub fn success(
        consumer: Point,
        phase: PhaseClass,
        load_kw: f64,
        routes: Vec<RouteSummary>,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            status: DesignStatus::Success,
            phase: Some(phase),
            consumer: [consumer.x, consumer.y],
            requested_load_kw: load_kw,
            routes,
            reason: None,
            processing_time_ms: 0,
            generated_at: Utc::now().to_rfc3339(),
        }
    }

    pub fn failure(
        status: DesignStatus,
        consumer: Point,
        phase: Option<PhaseClass>,
        load_kw: f64,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            status,
            phase,
            consumer: [consumer.x, consumer.y],
            requested_load_kw: load_kw,
            routes: Vec::new(),
            reason: Some(reason.into()),
            processing_time_ms: 0,
            generated_at: Utc::now().to_rfc3339(),
        }
    }
}

/// Bounding-box facility listing request.
#[derive(Debug, Clone, Deserialize)]
pub struct FacilityRequest {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

#[derive(Debug, Serialize)]
pub struct FacilityResponse {
    pub poles: Vec<Pole>,
    pub lines_hv: Vec<Line>,
    pub lines_lv: Vec<Line>,
    pub transformers: Vec<Transformer>,
    pub roads: Vec<Road>,
    pub buildings: Vec<Building>,
    pub raw_counts: LayerCounts,
    pub filtered_counts: LayerCounts,
    pub processing_time_ms: u64,
    pub generated_at: String,
}
