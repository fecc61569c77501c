//! HTTP handlers

use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use grid_geometry::Bbox;
use grid_topology::{LineClass, Preprocessor};
use tile_fetcher::CacheStats;
use tracing::info;

use crate::engine::DesignEngine;
use crate::models::{DesignRequest, DesignResponse, FacilityRequest, FacilityResponse};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<DesignEngine>,
}

/// Run one design request through the pipeline.
pub async fn run_design(
    State(state): State<AppState>,
    Json(request): Json<DesignRequest>,
) -> Json<DesignResponse> {
    Json(state.engine.run(&request).await)
}

/// Processed facility listing for a bounding box (exercises the fetch
/// and preprocessing stages only).
pub async fn list_facilities(
    State(state): State<AppState>,
    Json(request): Json<FacilityRequest>,
) -> Result<Json<FacilityResponse>, (StatusCode, String)> {
    let started = Instant::now();
    let bbox = Bbox::new(request.min_x, request.min_y, request.max_x, request.max_y);

    let tiles = state
        .engine
        .fetcher()
        .fetch_all_bbox(bbox)
        .await
        .map_err(|e| (StatusCode::BAD_GATEWAY, format!("Facility fetch failed: {e}")))?;

    let settings = state.engine.settings();
    let topology = Preprocessor::new(settings.preprocess.clone()).process(&tiles);
    info!(
        "Facility listing for {:?}: {} poles, {} lines",
        bbox,
        topology.poles.len(),
        topology.lines.len()
    );

    let (lines_hv, lines_lv): (Vec<_>, Vec<_>) = topology
        .lines
        .iter()
        .cloned()
        .partition(|line| line.class == LineClass::Hv);

    Ok(Json(FacilityResponse {
        poles: topology.poles.clone(),
        lines_hv,
        lines_lv,
        transformers: topology.transformers.clone(),
        roads: topology.roads.clone(),
        buildings: topology.buildings.clone(),
        raw_counts: topology.raw_counts.clone(),
        filtered_counts: topology.filtered_counts.clone(),
        processing_time_ms: started.elapsed().as_millis() as u64,
        generated_at: Utc::now().to_rfc3339(),
    }))
}

/// Tile-cache observability.
pub async fn cache_stats(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.engine.fetcher().cache_stats())
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "design-gateway",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
