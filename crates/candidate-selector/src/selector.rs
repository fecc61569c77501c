//! Selection and scoring

use std::collections::HashMap;

use grid_geometry::Point;
use grid_topology::{PhaseClass, ProcessedTopology};
use tracing::{debug, info};

use crate::{
    three_phase_transformer_on, PoleConnections, Result, SelectionOutcome, SelectorConfig,
    SelectorError, TargetPole,
};

pub struct TargetSelector<'a> {
    topology: &'a ProcessedTopology,
    config: SelectorConfig,
    connections: HashMap<&'a str, PoleConnections>,
}

impl<'a> TargetSelector<'a> {
    pub fn new(topology: &'a ProcessedTopology, config: SelectorConfig) -> Self {
        Self {
            topology,
            config,
            connections: build_connection_map(topology),
        }
    }

    /// Select and rank candidate source poles for one consumer.
    pub fn select(&self, consumer: Point, phase: PhaseClass) -> Result<SelectionOutcome> {
        let eligible: Vec<_> = self
            .topology
            .poles
            .iter()
            .filter(|pole| self.is_eligible(&pole.id, phase))
            .collect();

        if eligible.is_empty() {
            info!("No eligible poles for {:?} supply", phase);
            return Err(SelectorError::NoEligiblePoles(phase));
        }

        let mut targets: Vec<TargetPole> = eligible
            .into_iter()
            .filter_map(|pole| {
                let distance = consumer.distance_to(pole.point);
                if distance > self.config.max_reach_m {
                    return None;
                }
                let score = distance - self.bonus_for(&pole.id, phase);
                let fast_track = distance <= self.config.fast_track_m
                    && !self.topology.sight_line_blocked(consumer, pole.point);
                Some(TargetPole {
                    pole: pole.clone(),
                    distance_m: distance,
                    score,
                    fast_track,
                })
            })
            .collect();

        if targets.is_empty() {
            return Err(SelectorError::NoneInReach {
                max_reach_m: self.config.max_reach_m,
            });
        }

        // Ascending by score, straight-line distance as tiebreaker
        targets.sort_by(|a, b| {
            a.score
                .partial_cmp(&b.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(
                    a.distance_m
                        .partial_cmp(&b.distance_m)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
        });

        let fast_track_count = targets.iter().filter(|t| t.fast_track).count();
        info!(
            "Selected {} candidates for {:?} supply ({} fast-track)",
            targets.len(),
            phase,
            fast_track_count
        );
        for target in targets.iter().take(5) {
            debug!(
                "  candidate {} dist={:.1}m score={:.1}{}",
                target.id(),
                target.distance_m,
                target.score,
                if target.fast_track { " [fast-track]" } else { "" }
            );
        }

        Ok(SelectionOutcome {
            targets,
            phase,
            consumer,
        })
    }

    /// Three-phase supply needs a high-voltage source; poles reachable
    /// only through LV conductors are out. Single-phase accepts any
    /// conductor-connected pole.
    fn is_eligible(&self, pole_id: &str, phase: PhaseClass) -> bool {
        let Some(conn) = self.connections.get(pole_id) else {
            return false;
        };
        match phase {
            PhaseClass::Three => conn.has_hv,
            PhaseClass::Single => conn.any(),
        }
    }

    fn bonus_for(&self, pole_id: &str, phase: PhaseClass) -> f64 {
        let conn = self.connections.get(pole_id).copied().unwrap_or_default();
        let pole = self.topology.pole_by_id(pole_id);
        let has_transformer = pole.is_some_and(|p| p.has_transformer);

        let mut bonus = 0.0;
        match phase {
            PhaseClass::Three => {
                if has_transformer && three_phase_transformer_on(self.topology, pole_id) {
                    bonus += self.config.bonus_three_phase_transformer;
                }
                if conn.has_hv_three {
                    bonus += self.config.bonus_hv_three_conductor;
                }
            }
            PhaseClass::Single => {
                if has_transformer {
                    bonus += self.config.bonus_single_transformer;
                }
                if conn.has_lv {
                    bonus += self.config.bonus_lv_conductor;
                }
            }
        }
        bonus
    }
}

fn build_connection_map(topology: &ProcessedTopology) -> HashMap<&str, PoleConnections> {
    let mut map: HashMap<&str, PoleConnections> = HashMap::new();
    for line in &topology.lines {
        for pole_id in line.endpoint_pole_ids() {
            let entry = map.entry(pole_id).or_default();
            if line.is_high_voltage() {
                entry.has_hv = true;
                if line.phase == PhaseClass::Three {
                    entry.has_hv_three = true;
                }
            } else {
                entry.has_lv = true;
            }
        }
    }
    map
}
