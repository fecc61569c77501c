//! Runtime settings
//!
//! One flat settings object aggregating every stage's config, with the
//! design constants baked into the per-crate `Default` impls. Environment
//! variables override individual values at startup; thresholds shared
//! by several stages (maximum reach, pole interval) are kept in sync
//! here.

use std::time::Duration;

use candidate_selector::SelectorConfig;
use crossing_guard::CrossingConfig;
use design_costing::{CapacityConfig, CostConfig, VoltageConfig};
use feeder_advisor::AdvisorConfig;
use grid_topology::PreprocessConfig;
use pole_allocator::AllocatorConfig;
use route_graph::{GraphConfig, PathfinderConfig};
use tile_fetcher::FetcherConfig;

#[derive(Debug, Clone)]
pub struct Settings {
    /// Side of the square fetched around the consumer (m).
    pub bbox_size_m: f64,
    /// Load assumed when the request does not state one (kW).
    pub default_load_kw: f64,
    /// Candidates cross-checked against the duplicate-feeder service.
    pub advisory_top_k: usize,

    pub fetcher: FetcherConfig,
    pub preprocess: PreprocessConfig,
    pub selector: SelectorConfig,
    pub graph: GraphConfig,
    pub pathfinder: PathfinderConfig,
    pub crossing: CrossingConfig,
    pub allocator: AllocatorConfig,
    pub cost: CostConfig,
    pub voltage: VoltageConfig,
    pub capacity: CapacityConfig,
    pub advisor: AdvisorConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bbox_size_m: 400.0,
            default_load_kw: 5.0,
            advisory_top_k: 5,
            fetcher: FetcherConfig::default(),
            preprocess: PreprocessConfig::default(),
            selector: SelectorConfig::default(),
            graph: GraphConfig::default(),
            pathfinder: PathfinderConfig::default(),
            crossing: CrossingConfig::default(),
            allocator: AllocatorConfig::default(),
            cost: CostConfig::default(),
            voltage: VoltageConfig::default(),
            capacity: CapacityConfig::default(),
            advisor: AdvisorConfig::default(),
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_f64(key: &str) -> Option<f64> {
    env_string(key).and_then(|v| v.parse().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_string(key).and_then(|v| v.parse().ok())
}

impl Settings {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let mut settings = Self::default();

        if let Some(url) = env_string("GRID_GIS_WFS_URL") {
            settings.fetcher.gis_url = url;
        }
        if let Some(url) = env_string("GRID_BASE_WFS_URL") {
            settings.fetcher.base_url = url;
        }
        if let Some(url) = env_string("GRID_TRACE_URL") {
            settings.advisor.base_url = url;
        }
        if let Some(secs) = env_f64("GRID_HTTP_TIMEOUT_S") {
            let timeout = Duration::from_secs_f64(secs);
            settings.fetcher.http_timeout = timeout;
            settings.advisor.http_timeout = timeout;
        }
        if let Some(secs) = env_f64("GRID_TILE_CACHE_TTL_S") {
            settings.fetcher.cache_ttl = Duration::from_secs_f64(secs);
        }
        if let Some(capacity) = env_usize("GRID_TILE_CACHE_CAPACITY") {
            settings.fetcher.cache_capacity = capacity;
        }

        if let Some(size) = env_f64("GRID_BBOX_SIZE_M") {
            settings.bbox_size_m = size;
        }
        if let Some(reach) = env_f64("GRID_MAX_REACH_M") {
            settings.set_max_reach_m(reach);
        }
        if let Some(fast_track) = env_f64("GRID_FAST_TRACK_M") {
            settings.selector.fast_track_m = fast_track;
        }
        if let Some(interval) = env_f64("GRID_POLE_INTERVAL_M") {
            settings.set_pole_interval_m(interval);
        }
        if let Some(access) = env_f64("GRID_ROAD_ACCESS_M") {
            settings.graph.road_access_m = access;
        }
        if let Some(snap) = env_f64("GRID_ROAD_SNAP_M") {
            settings.graph.road_snap_m = snap;
        }
        if let Some(buffer) = env_f64("GRID_EXISTING_POLE_BUFFER_M") {
            settings.allocator.existing_pole_buffer_m = buffer;
        }
        if let Some(load) = env_f64("GRID_DEFAULT_LOAD_KW") {
            settings.default_load_kw = load;
        }

        settings
    }

    /// The maximum conductor reach gates candidate selection and the
    /// pathfinder's distance bound together.
    pub fn set_max_reach_m(&mut self, reach: f64) {
        self.selector.max_reach_m = reach;
        self.pathfinder.max_reach_m = reach;
    }

    /// The pole interval drives both edge weighting and allocation.
    pub fn set_pole_interval_m(&mut self, interval: f64) {
        self.graph.pole_interval_m = interval;
        self.allocator.pole_interval_m = interval;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_the_design_constants() {
        let settings = Settings::default();
        assert_eq!(settings.selector.max_reach_m, 400.0);
        assert_eq!(settings.pathfinder.max_reach_m, 400.0);
        assert_eq!(settings.selector.fast_track_m, 40.0);
        assert_eq!(settings.graph.pole_interval_m, 40.0);
        assert_eq!(settings.allocator.existing_pole_buffer_m, 15.0);
        assert_eq!(settings.allocator.turn_angle_threshold_deg, 150.0);
        assert_eq!(settings.cost.score_weight_pole, 10_000);
        assert_eq!(settings.cost.score_weight_turn, 50);
        assert_eq!(settings.voltage.limit_lv_percent, 6.0);
        assert_eq!(settings.voltage.limit_hv_percent, 3.0);
        assert_eq!(settings.capacity.power_factor, 0.9);
    }

    #[test]
    fn test_shared_thresholds_stay_in_sync() {
        let mut settings = Settings::default();
        settings.set_max_reach_m(250.0);
        assert_eq!(settings.selector.max_reach_m, 250.0);
        assert_eq!(settings.pathfinder.max_reach_m, 250.0);

        settings.set_pole_interval_m(35.0);
        assert_eq!(settings.graph.pole_interval_m, 35.0);
        assert_eq!(settings.allocator.pole_interval_m, 35.0);
    }
}
