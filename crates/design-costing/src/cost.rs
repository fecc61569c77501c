//! Itemised construction cost and the composite cost index
//!
//! Quantities derive deterministically from the allocation: every new
//! pole carries 3 insulators, 2 clamps and 1 arm-tie; each route uses
//! one connector at the source. Overhead and profit are fractions of
//! the material+labour subtotal, and every junction adds a
//! road-crossing surcharge.
//!
//! The cost index ranks designs and is not the monetary total:
//!
//! ```text
//! index = poles * W_pole + round(distance_m) * W_dist + turns * W_turn
//! ```
//!
//! The default weights make one extra pole worse than any plausible
//! amount of extra wire, implementing "prefer fewer poles even over
//! slightly shorter wire". Fast-track routes skip road routing and are
//! ranked by rounded distance alone.

use grid_topology::PhaseClass;
use serde::Serialize;

/// Unit rates and ranking weights.
#[derive(Debug, Clone)]
pub struct CostConfig {
    pub pole_unit_cost: u64,
    pub wire_cost_lv_per_m: u64,
    pub wire_cost_hv_per_m: u64,
    pub insulator_unit_cost: u64,
    pub arm_tie_unit_cost: u64,
    pub clamp_unit_cost: u64,
    pub connector_unit_cost: u64,
    pub labor_pole_install: u64,
    pub labor_wire_stretch_per_m: u64,
    pub labor_insulator_install: u64,
    pub labor_base: u64,
    pub overhead_rate: f64,
    pub profit_rate: f64,
    pub road_crossing_cost: u64,
    pub score_weight_pole: u64,
    pub score_weight_distance: f64,
    pub score_weight_turn: u64,
    pub insulators_per_pole: u64,
    pub clamps_per_pole: u64,
    pub arm_ties_per_pole: u64,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            pole_unit_cost: 500_000,
            wire_cost_lv_per_m: 5_000,
            wire_cost_hv_per_m: 8_000,
            insulator_unit_cost: 25_000,
            arm_tie_unit_cost: 35_000,
            clamp_unit_cost: 15_000,
            connector_unit_cost: 8_000,
            labor_pole_install: 250_000,
            labor_wire_stretch_per_m: 15_000,
            labor_insulator_install: 20_000,
            labor_base: 200_000,
            overhead_rate: 0.15,
            profit_rate: 0.10,
            road_crossing_cost: 100_000,
            score_weight_pole: 10_000,
            score_weight_distance: 1.0,
            score_weight_turn: 50,
            insulators_per_pole: 3,
            clamps_per_pole: 2,
            arm_ties_per_pole: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MaterialCosts {
    pub pole_count: u64,
    pub pole_unit_cost: u64,
    pub pole_cost: u64,
    pub wire_length_m: f64,
    pub wire_unit_cost: u64,
    pub wire_cost: u64,
    pub insulator_count: u64,
    pub insulator_cost: u64,
    pub arm_tie_count: u64,
    pub arm_tie_cost: u64,
    pub clamp_count: u64,
    pub clamp_cost: u64,
    pub connector_count: u64,
    pub connector_cost: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LaborCosts {
    pub pole_install_cost: u64,
    pub wire_stretch_cost: u64,
    pub insulator_install_cost: u64,
    pub base_cost: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CostBreakdown {
    pub material: MaterialCosts,
    pub labor: LaborCosts,
    pub overhead_rate: f64,
    pub overhead_cost: u64,
    pub profit_rate: f64,
    pub profit_cost: u64,
    /// Road-crossing surcharges.
    pub extra_cost: u64,
    pub subtotal: u64,
    pub total: u64,
}

pub struct CostCalculator {
    config: CostConfig,
}

impl Default for CostCalculator {
    fn default() -> Self {
        Self::new(CostConfig::default())
    }
}

impl CostCalculator {
    pub fn new(config: CostConfig) -> Self {
        Self { config }
    }

    pub fn itemised(
        &self,
        pole_count: usize,
        wire_length_m: f64,
        turn_count: usize,
        phase: PhaseClass,
    ) -> CostBreakdown {
        let c = &self.config;
        let poles = pole_count as u64;

        let wire_unit_cost = match phase {
            PhaseClass::Three => c.wire_cost_hv_per_m,
            PhaseClass::Single => c.wire_cost_lv_per_m,
        };
        let wire_cost = (wire_length_m * wire_unit_cost as f64).round() as u64;

        let insulator_count = poles * c.insulators_per_pole;
        let clamp_count = poles * c.clamps_per_pole;
        let arm_tie_count = poles * c.arm_ties_per_pole;
        let connector_count = 1;

        let material = MaterialCosts {
            pole_count: poles,
            pole_unit_cost: c.pole_unit_cost,
            pole_cost: poles * c.pole_unit_cost,
            wire_length_m,
            wire_unit_cost,
            wire_cost,
            insulator_count,
            insulator_cost: insulator_count * c.insulator_unit_cost,
            arm_tie_count,
            arm_tie_cost: arm_tie_count * c.arm_tie_unit_cost,
            clamp_count,
            clamp_cost: clamp_count * c.clamp_unit_cost,
            connector_count,
            connector_cost: connector_count * c.connector_unit_cost,
            total: 0,
        };
        let material = MaterialCosts {
            total: material.pole_cost
                + material.wire_cost
                + material.insulator_cost
                + material.arm_tie_cost
                + material.clamp_cost
                + material.connector_cost,
            ..material
        };

        let labor = LaborCosts {
            pole_install_cost: poles * c.labor_pole_install,
            wire_stretch_cost: (wire_length_m * c.labor_wire_stretch_per_m as f64).round() as u64,
            insulator_install_cost: insulator_count * c.labor_insulator_install,
            base_cost: c.labor_base,
            total: 0,
        };
        let labor = LaborCosts {
            total: labor.pole_install_cost
                + labor.wire_stretch_cost
                + labor.insulator_install_cost
                + labor.base_cost,
            ..labor
        };

        let subtotal = material.total + labor.total;
        let overhead_cost = (subtotal as f64 * c.overhead_rate).round() as u64;
        let profit_cost = (subtotal as f64 * c.profit_rate).round() as u64;
        let extra_cost = turn_count as u64 * c.road_crossing_cost;

        CostBreakdown {
            material,
            labor,
            overhead_rate: c.overhead_rate,
            overhead_cost,
            profit_rate: c.profit_rate,
            profit_cost,
            extra_cost,
            subtotal,
            total: subtotal + overhead_cost + profit_cost + extra_cost,
        }
    }

    /// Composite ranking index; lower is better. Fast-track routes are
    /// ranked by rounded distance alone.
    pub fn cost_index(
        &self,
        pole_count: usize,
        distance_m: f64,
        turn_count: usize,
        fast_track: bool,
    ) -> u64 {
        let distance_part = (distance_m * self.config.score_weight_distance).round() as u64;
        if fast_track {
            return distance_part;
        }
        pole_count as u64 * self.config.score_weight_pole
            + distance_part
            + turn_count as u64 * self.config.score_weight_turn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cost_index_prefers_fewer_poles() {
        let calc = CostCalculator::default();
        // Route A: 2 poles over 100m; route B: 3 poles over 98m
        let a = calc.cost_index(2, 100.0, 0, false);
        let b = calc.cost_index(3, 98.0, 0, false);
        assert_eq!(a, 20_100);
        assert_eq!(b, 30_098);
        assert!(a < b);
    }

    #[test]
    fn test_cost_index_counts_turns() {
        let calc = CostCalculator::default();
        assert_eq!(calc.cost_index(4, 120.0, 0, false), 40_120);
        assert_eq!(calc.cost_index(4, 120.0, 2, false), 40_220);
    }

    #[test]
    fn test_fast_track_index_is_distance_only() {
        let calc = CostCalculator::default();
        assert_eq!(calc.cost_index(1, 30.0, 0, true), 30);
        assert_eq!(calc.cost_index(1, 30.4, 0, true), 30);
    }

    #[test]
    fn test_itemised_quantities() {
        let calc = CostCalculator::default();
        let breakdown = calc.itemised(4, 120.0, 1, PhaseClass::Single);

        assert_eq!(breakdown.material.pole_count, 4);
        assert_eq!(breakdown.material.insulator_count, 12);
        assert_eq!(breakdown.material.clamp_count, 8);
        assert_eq!(breakdown.material.arm_tie_count, 4);
        assert_eq!(breakdown.material.connector_count, 1);
        assert_eq!(breakdown.material.wire_cost, 600_000);
        assert_eq!(breakdown.extra_cost, 100_000);
    }

    #[test]
    fn test_overhead_and_profit_are_fractions_of_subtotal() {
        let calc = CostCalculator::default();
        let breakdown = calc.itemised(2, 80.0, 0, PhaseClass::Single);

        let subtotal = breakdown.material.total + breakdown.labor.total;
        assert_eq!(breakdown.subtotal, subtotal);
        assert_eq!(
            breakdown.overhead_cost,
            (subtotal as f64 * 0.15).round() as u64
        );
        assert_eq!(
            breakdown.profit_cost,
            (subtotal as f64 * 0.10).round() as u64
        );
        assert_eq!(
            breakdown.total,
            subtotal + breakdown.overhead_cost + breakdown.profit_cost
        );
    }

    #[test]
    fn test_three_phase_uses_hv_wire_rate() {
        let calc = CostCalculator::default();
        let lv = calc.itemised(1, 100.0, 0, PhaseClass::Single);
        let hv = calc.itemised(1, 100.0, 0, PhaseClass::Three);
        assert_eq!(lv.material.wire_unit_cost, 5_000);
        assert_eq!(hv.material.wire_unit_cost, 8_000);
        assert!(hv.material.wire_cost > lv.material.wire_cost);
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Within the routable distance range, one extra pole always
        /// outranks whatever wire length the shorter route saved.
        #[test]
        fn prop_an_extra_pole_outweighs_any_wire_saving(
            poles in 1usize..12,
            longer in 0.0..400.0f64,
            shorter in 0.0..400.0f64,
            turns in 0usize..6,
        ) {
            let calc = CostCalculator::default();
            let fewer = calc.cost_index(poles, longer, turns, false);
            let more = calc.cost_index(poles + 1, shorter, turns, false);
            prop_assert!(fewer < more);
        }

        #[test]
        fn prop_index_is_monotonic_in_every_term(
            poles in 1usize..12,
            distance in 0.0..400.0f64,
            turns in 0usize..6,
        ) {
            let calc = CostCalculator::default();
            let base = calc.cost_index(poles, distance, turns, false);
            prop_assert!(calc.cost_index(poles + 1, distance, turns, false) > base);
            prop_assert!(calc.cost_index(poles, distance + 10.0, turns, false) > base);
            prop_assert!(calc.cost_index(poles, distance, turns + 1, false) > base);
        }

        #[test]
        fn prop_breakdown_totals_add_up(
            poles in 1usize..12,
            length in 1.0..400.0f64,
            turns in 0usize..6,
        ) {
            let calc = CostCalculator::default();
            let breakdown = calc.itemised(poles, length, turns, PhaseClass::Single);
            prop_assert_eq!(
                breakdown.subtotal,
                breakdown.material.total + breakdown.labor.total
            );
            prop_assert_eq!(
                breakdown.total,
                breakdown.subtotal
                    + breakdown.overhead_cost
                    + breakdown.profit_cost
                    + breakdown.extra_cost
            );
        }
    }
}
