//! Electrical network topology
//!
//! Typed entities for the distribution network (poles, conductors,
//! transformers, roads, buildings), the raw feature model coming off the
//! tile server, and the preprocessor that reconstructs electrical
//! topology from raw geometry:
//!
//! - status/support/degenerate filtering
//! - HV vs LV classification and service-drop detection
//! - line-to-pole and transformer-to-pole snapping
//! - spatial pole enrichment with a process-wide role cache

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod entities;
pub mod preprocess;
pub mod raw;

pub use entities::{
    Building, Line, LineClass, PhaseClass, Pole, PoleClass, PoleRole, ProcessedTopology, Road,
    Transformer,
};
pub use preprocess::{PreprocessConfig, Preprocessor};
pub use raw::{RawFeature, RawGeometry, TileSet};

#[derive(Error, Debug)]
pub enum TopologyError {
    #[error("Unknown phase class: {0}")]
    UnknownPhaseClass(String),
    #[error("Malformed feature geometry: {0}")]
    MalformedGeometry(String),
}

pub type Result<T> = std::result::Result<T, TopologyError>;

/// Per-layer feature counts, reported raw and after filtering.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayerCounts {
    pub poles: usize,
    pub lines_hv: usize,
    pub lines_lv: usize,
    pub transformers: usize,
    pub roads: usize,
    pub buildings: usize,
}
