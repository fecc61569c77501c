//! Source-pole candidate selection
//!
//! Produces a ranked set of existing poles a new consumer can be fed
//! from. Eligibility depends on the requested phase class (three-phase
//! supply requires a high-voltage source), candidates beyond the
//! maximum conductor reach are dropped, and each survivor is scored by
//! straight-line distance minus engineering bonuses that reflect
//! downstream construction savings. Very close candidates with a clear
//! sight-line are flagged Fast-Track and can skip road routing
//! entirely.

use grid_geometry::Point;
use grid_topology::{PhaseClass, Pole, ProcessedTopology};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod selector;

pub use selector::TargetSelector;

#[derive(Error, Debug)]
pub enum SelectorError {
    #[error("No poles in range carry a conductor suitable for {0:?} supply")]
    NoEligiblePoles(PhaseClass),
    #[error("No eligible pole within {max_reach_m:.0}m of the consumer")]
    NoneInReach { max_reach_m: f64 },
}

pub type Result<T> = std::result::Result<T, SelectorError>;

/// Scoring bonuses in metres subtracted from the straight-line
/// distance. A bonus models work the grid already did for us: an
/// existing transformer or a matching conductor saves new plant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorConfig {
    pub max_reach_m: f64,
    pub fast_track_m: f64,
    /// Three-phase request, candidate carries a three-phase transformer.
    pub bonus_three_phase_transformer: f64,
    /// Three-phase request, candidate touches an HV three-phase conductor.
    pub bonus_hv_three_conductor: f64,
    /// Single-phase request, candidate carries any transformer.
    pub bonus_single_transformer: f64,
    /// Single-phase request, candidate touches an LV conductor.
    pub bonus_lv_conductor: f64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            max_reach_m: 400.0,
            fast_track_m: 40.0,
            bonus_three_phase_transformer: 150.0,
            bonus_hv_three_conductor: 100.0,
            bonus_single_transformer: 100.0,
            bonus_lv_conductor: 50.0,
        }
    }
}

/// A candidate source pole with its ranking score.
#[derive(Debug, Clone, Serialize)]
pub struct TargetPole {
    pub pole: Pole,
    /// Straight-line distance to the consumer (m).
    pub distance_m: f64,
    /// Ranking score: distance minus bonuses; lower is better.
    pub score: f64,
    /// Within the fast-track threshold with a building-free sight-line.
    pub fast_track: bool,
}

impl TargetPole {
    pub fn id(&self) -> &str {
        &self.pole.id
    }

    pub fn point(&self) -> Point {
        self.pole.point
    }
}

/// Ranked selection for one consumer.
#[derive(Debug, Clone, Serialize)]
pub struct SelectionOutcome {
    pub targets: Vec<TargetPole>,
    pub phase: PhaseClass,
    pub consumer: Point,
}

impl SelectionOutcome {
    pub fn fast_track_targets(&self) -> impl Iterator<Item = &TargetPole> {
        self.targets.iter().filter(|t| t.fast_track)
    }
}

/// Conductor exposure of one pole, derived from line endpoints.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct PoleConnections {
    pub has_hv: bool,
    pub has_lv: bool,
    pub has_hv_three: bool,
}

impl PoleConnections {
    pub fn any(&self) -> bool {
        self.has_hv || self.has_lv
    }
}

pub(crate) fn three_phase_transformer_on(topology: &ProcessedTopology, pole_id: &str) -> bool {
    topology
        .transformer_on_pole(pole_id)
        .is_some_and(|t| t.phase == PhaseClass::Three)
}
