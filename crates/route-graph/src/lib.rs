//! Road network routing
//!
//! Builds an undirected weighted graph from road centrelines, attaches
//! the consumer and the candidate source poles to it, and finds
//! minimum-weight conductor routes with a distance-bounded A*.
//!
//! Graph identity is spatial: every vertex insertion goes through an
//! r-tree with a 1 m tolerance, so road polylines that share endpoints
//! only up to floating-point noise still weld into one network.

use thiserror::Error;

pub mod bypass;
pub mod graph;
pub mod pathfind;

pub use bypass::plan_direct;
pub use graph::{EdgeAttr, EdgeKind, RoadGraphBuilder, RouteGraph, Vertex, VertexKind};
pub use pathfind::{Pathfinder, PathfinderConfig, RoutedPath};

#[derive(Error, Debug)]
pub enum RouteError {
    #[error("No roads in the working area")]
    NoRoads,
    #[error("Consumer is {distance_m:.1}m from the nearest road (limit {limit_m:.0}m)")]
    ConsumerUnreachable { distance_m: f64, limit_m: f64 },
    #[error("No route to pole {0}")]
    NoPath(String),
}

pub type Result<T> = std::result::Result<T, RouteError>;

/// Graph construction tuning.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    /// Vertices closer than this weld into one (m).
    pub vertex_merge_m: f64,
    /// Degree-1 road endpoints within this distance are snapped (m).
    pub road_snap_m: f64,
    /// Maximum distance from a consumer or pole to the road network (m).
    pub road_access_m: f64,
    /// Nominal spacing of new poles, for amortised pole cost (m).
    pub pole_interval_m: f64,
    /// Weight added per amortised pole.
    pub pole_cost_coefficient: f64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            vertex_merge_m: 1.0,
            road_snap_m: 10.0,
            road_access_m: 100.0,
            pole_interval_m: 40.0,
            pole_cost_coefficient: 5000.0,
        }
    }
}

impl GraphConfig {
    /// Edge weight: length plus the amortised cost of the poles that
    /// length will need. Always >= the geometric length, which keeps
    /// the Euclidean A* heuristic admissible.
    pub fn edge_weight(&self, length_m: f64) -> f64 {
        length_m + (length_m / self.pole_interval_m) * self.pole_cost_coefficient
    }
}
