//! Transformer capacity validation
//!
//! Converts the requested load to apparent power through the power
//! factor, adds it to the transformer's current load, and grades the
//! resulting utilisation. When utilisation leaves the comfortable
//! band, the smallest standard capacity that brings it back is
//! recommended along with its upgrade price.

use grid_topology::Transformer;
use serde::Serialize;
use tracing::debug;

/// Standard transformer capacities (kVA) with unit prices.
pub const STANDARD_CAPACITIES: [(f64, u64); 6] = [
    (10.0, 2_500_000),
    (20.0, 3_000_000),
    (30.0, 3_500_000),
    (50.0, 4_500_000),
    (100.0, 6_500_000),
    (200.0, 9_500_000),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacityStatus {
    Ok,
    Warning,
    Overload,
}

#[derive(Debug, Clone)]
pub struct CapacityConfig {
    /// Utilisation above this is a warning.
    pub warning_utilisation: f64,
    /// Utilisation above this is an overload.
    pub overload_utilisation: f64,
    pub power_factor: f64,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            warning_utilisation: 0.75,
            overload_utilisation: 1.0,
            power_factor: 0.9,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CapacityReport {
    pub transformer_id: String,
    pub pole_id: Option<String>,
    pub capacity_kva: f64,
    pub current_load_kva: f64,
    pub requested_load_kva: f64,
    pub total_load_kva: f64,
    pub utilisation: f64,
    pub status: CapacityStatus,
    pub recommended_capacity_kva: Option<f64>,
    pub upgrade_cost: Option<u64>,
    pub message: String,
}

pub struct CapacityValidator {
    config: CapacityConfig,
}

impl Default for CapacityValidator {
    fn default() -> Self {
        Self::new(CapacityConfig::default())
    }
}

impl CapacityValidator {
    pub fn new(config: CapacityConfig) -> Self {
        Self { config }
    }

    pub fn validate(
        &self,
        transformer: &Transformer,
        current_load_kva: f64,
        requested_load_kw: f64,
    ) -> CapacityReport {
        let requested_kva = requested_load_kw / self.config.power_factor;
        let total_kva = current_load_kva + requested_kva;
        let utilisation = if transformer.capacity_kva > 0.0 {
            total_kva / transformer.capacity_kva
        } else {
            f64::INFINITY
        };

        let status = if utilisation <= self.config.warning_utilisation {
            CapacityStatus::Ok
        } else if utilisation <= self.config.overload_utilisation {
            CapacityStatus::Warning
        } else {
            CapacityStatus::Overload
        };

        let (recommended, upgrade_cost) = if status == CapacityStatus::Ok {
            (None, None)
        } else {
            match self.recommend_capacity(total_kva) {
                Some((kva, cost)) if kva > transformer.capacity_kva => (Some(kva), Some(cost)),
                _ => (None, None),
            }
        };

        let message = match status {
            CapacityStatus::Ok => format!(
                "Transformer {:.0}kVA at {:.1}% utilisation",
                transformer.capacity_kva,
                utilisation * 100.0
            ),
            CapacityStatus::Warning => format!(
                "Transformer {:.0}kVA at {:.1}% utilisation (above the {:.0}% comfort band)",
                transformer.capacity_kva,
                utilisation * 100.0,
                self.config.warning_utilisation * 100.0
            ),
            CapacityStatus::Overload => format!(
                "Transformer {:.0}kVA overloaded: {:.1}kVA total ({:.1}%)",
                transformer.capacity_kva,
                total_kva,
                utilisation * 100.0
            ),
        };
        debug!("Capacity check {}: {message}", transformer.id);

        CapacityReport {
            transformer_id: transformer.id.clone(),
            pole_id: transformer.pole_id.clone(),
            capacity_kva: transformer.capacity_kva,
            current_load_kva,
            requested_load_kva: requested_kva,
            total_load_kva: total_kva,
            utilisation,
            status,
            recommended_capacity_kva: recommended,
            upgrade_cost,
            message,
        }
    }

    /// Smallest standard capacity that keeps `required_kva` inside the
    /// comfort band.
    pub fn recommend_capacity(&self, required_kva: f64) -> Option<(f64, u64)> {
        STANDARD_CAPACITIES
            .iter()
            .find(|(kva, _)| required_kva / kva <= self.config.warning_utilisation)
            .copied()
            .or_else(|| STANDARD_CAPACITIES.last().copied())
    }
}
