//! Voltage-drop calculation
//!
//! Single phase: `ΔV = 2 · I · (R·cosθ + X·sinθ) · L_km`
//! Three phase:  `ΔV = √3 · I · (R·cosθ + X·sinθ) · L_km`
//!
//! R and X come from per-km conductor tables at 20°C. The recommender
//! walks the wire list thinnest-first and returns the first spec whose
//! drop stays inside the tolerance, falling back to the largest.

use grid_topology::PhaseClass;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{CostingError, Result};

/// Conductor specs, ascending by cross-section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireSpec {
    Ow22,
    Ow38,
    Acsr58,
    Acsr95,
    Acsr160,
}

impl WireSpec {
    pub const ASCENDING: [WireSpec; 5] = [
        WireSpec::Ow22,
        WireSpec::Ow38,
        WireSpec::Acsr58,
        WireSpec::Acsr95,
        WireSpec::Acsr160,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WireSpec::Ow22 => "OW_22",
            WireSpec::Ow38 => "OW_38",
            WireSpec::Acsr58 => "ACSR_58",
            WireSpec::Acsr95 => "ACSR_95",
            WireSpec::Acsr160 => "ACSR_160",
        }
    }

    pub fn parse(spec: &str) -> Result<Self> {
        match spec.trim().to_ascii_uppercase().as_str() {
            "OW_22" | "OW22" => Ok(WireSpec::Ow22),
            "OW_38" | "OW38" => Ok(WireSpec::Ow38),
            "ACSR_58" | "ACSR58" => Ok(WireSpec::Acsr58),
            "ACSR_95" | "ACSR95" => Ok(WireSpec::Acsr95),
            "ACSR_160" | "ACSR160" => Ok(WireSpec::Acsr160),
            other => Err(CostingError::UnknownWireSpec(other.to_string())),
        }
    }

    /// Resistance at 20°C (Ω/km).
    pub fn resistance_ohm_per_km(&self) -> f64 {
        match self {
            WireSpec::Ow22 => 0.827,
            WireSpec::Ow38 => 0.480,
            WireSpec::Acsr58 => 0.595,
            WireSpec::Acsr95 => 0.363,
            WireSpec::Acsr160 => 0.215,
        }
    }

    /// Reactance (Ω/km).
    pub fn reactance_ohm_per_km(&self) -> f64 {
        match self {
            WireSpec::Ow22 => 0.400,
            WireSpec::Ow38 => 0.380,
            WireSpec::Acsr58 => 0.380,
            WireSpec::Acsr95 => 0.355,
            WireSpec::Acsr160 => 0.330,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VoltageConfig {
    pub power_factor: f64,
    pub nominal_lv_single_v: f64,
    pub nominal_lv_three_v: f64,
    pub nominal_hv_v: f64,
    pub limit_lv_percent: f64,
    pub limit_hv_percent: f64,
}

impl Default for VoltageConfig {
    fn default() -> Self {
        Self {
            power_factor: 0.9,
            nominal_lv_single_v: 220.0,
            nominal_lv_three_v: 380.0,
            nominal_hv_v: 22900.0,
            limit_lv_percent: 6.0,
            limit_hv_percent: 3.0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VoltageDropReport {
    pub distance_m: f64,
    pub load_kw: f64,
    pub phase: PhaseClass,
    pub wire_spec: &'static str,
    pub nominal_voltage_v: f64,
    pub load_current_a: f64,
    pub drop_v: f64,
    pub drop_percent: f64,
    pub limit_percent: f64,
    pub acceptable: bool,
}

pub struct VoltageCalculator {
    config: VoltageConfig,
}

impl Default for VoltageCalculator {
    fn default() -> Self {
        Self::new(VoltageConfig::default())
    }
}

impl VoltageCalculator {
    pub fn new(config: VoltageConfig) -> Self {
        Self { config }
    }

    fn nominal_and_limit(&self, phase: PhaseClass, source_voltage: Option<f64>) -> (f64, f64) {
        match source_voltage {
            // A measured source voltage wins; the tolerance follows its
            // service class
            Some(v) if v >= 1000.0 => (v, self.config.limit_hv_percent),
            Some(v) if v > 0.0 => (v, self.config.limit_lv_percent),
            _ => match phase {
                PhaseClass::Three => (self.config.nominal_lv_three_v, self.config.limit_lv_percent),
                PhaseClass::Single => {
                    (self.config.nominal_lv_single_v, self.config.limit_lv_percent)
                }
            },
        }
    }

    fn load_current_a(&self, load_kw: f64, phase: PhaseClass, nominal_v: f64) -> f64 {
        let watts = load_kw * 1000.0;
        match phase {
            PhaseClass::Three => watts / (3f64.sqrt() * nominal_v * self.config.power_factor),
            PhaseClass::Single => watts / (nominal_v * self.config.power_factor),
        }
    }

    pub fn calculate(
        &self,
        distance_m: f64,
        load_kw: f64,
        phase: PhaseClass,
        wire: WireSpec,
        source_voltage: Option<f64>,
    ) -> VoltageDropReport {
        let (nominal_v, limit_percent) = self.nominal_and_limit(phase, source_voltage);
        let current = self.load_current_a(load_kw, phase, nominal_v);

        let cos_theta = self.config.power_factor;
        let sin_theta = (1.0 - cos_theta * cos_theta).sqrt();
        let z = wire.resistance_ohm_per_km() * cos_theta + wire.reactance_ohm_per_km() * sin_theta;
        let distance_km = distance_m / 1000.0;

        let drop_v = match phase {
            PhaseClass::Three => 3f64.sqrt() * current * z * distance_km,
            PhaseClass::Single => 2.0 * current * z * distance_km,
        };
        let drop_percent = drop_v / nominal_v * 100.0;
        let acceptable = drop_percent <= limit_percent;

        debug!(
            "Voltage drop: {distance_m:.1}m {load_kw}kW {:?} {} -> {drop_percent:.2}% (limit {limit_percent}%)",
            phase,
            wire.as_str()
        );

        VoltageDropReport {
            distance_m,
            load_kw,
            phase,
            wire_spec: wire.as_str(),
            nominal_voltage_v: nominal_v,
            load_current_a: current,
            drop_v,
            drop_percent,
            limit_percent,
            acceptable,
        }
    }

    /// Longest run that stays inside the tolerance for this wire and
    /// load.
    pub fn max_distance_m(
        &self,
        load_kw: f64,
        phase: PhaseClass,
        wire: WireSpec,
        source_voltage: Option<f64>,
    ) -> f64 {
        let (nominal_v, limit_percent) = self.nominal_and_limit(phase, source_voltage);
        let current = self.load_current_a(load_kw, phase, nominal_v);
        let cos_theta = self.config.power_factor;
        let sin_theta = (1.0 - cos_theta * cos_theta).sqrt();
        let z = wire.resistance_ohm_per_km() * cos_theta + wire.reactance_ohm_per_km() * sin_theta;

        let max_drop_v = limit_percent / 100.0 * nominal_v;
        let factor = match phase {
            PhaseClass::Three => 3f64.sqrt(),
            PhaseClass::Single => 2.0,
        };
        max_drop_v / (factor * current * z) * 1000.0
    }

    /// Smallest spec that meets the tolerance, else the largest.
    pub fn recommend(
        &self,
        distance_m: f64,
        load_kw: f64,
        phase: PhaseClass,
        source_voltage: Option<f64>,
    ) -> (WireSpec, VoltageDropReport) {
        for wire in WireSpec::ASCENDING {
            let report = self.calculate(distance_m, load_kw, phase, wire, source_voltage);
            if report.acceptable {
                return (wire, report);
            }
        }
        let largest = WireSpec::Acsr160;
        warn!(
            "No wire spec meets the drop tolerance over {distance_m:.0}m; falling back to {}",
            largest.as_str()
        );
        (
            largest,
            self.calculate(distance_m, load_kw, phase, largest, source_voltage),
        )
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_wire() -> impl Strategy<Value = WireSpec> {
        prop::sample::select(WireSpec::ASCENDING.to_vec())
    }

    fn arb_phase() -> impl Strategy<Value = PhaseClass> {
        prop::sample::select(vec![PhaseClass::Single, PhaseClass::Three])
    }

    proptest! {
        #[test]
        fn prop_drop_grows_with_distance(
            distance in 1.0..400.0f64,
            extra in 1.0..400.0f64,
            load in 1.0..50.0f64,
            phase in arb_phase(),
            wire in arb_wire(),
        ) {
            let calc = VoltageCalculator::default();
            let near = calc.calculate(distance, load, phase, wire, None);
            let far = calc.calculate(distance + extra, load, phase, wire, None);
            prop_assert!(near.drop_v > 0.0);
            prop_assert!(far.drop_v > near.drop_v);
        }

        #[test]
        fn prop_recommendation_is_acceptable_or_largest(
            distance in 1.0..400.0f64,
            load in 1.0..50.0f64,
            phase in arb_phase(),
        ) {
            let calc = VoltageCalculator::default();
            let (wire, report) = calc.recommend(distance, load, phase, None);
            prop_assert!(report.acceptable || wire == WireSpec::Acsr160);
        }

        #[test]
        fn prop_max_distance_sits_on_the_limit(
            load in 1.0..50.0f64,
            phase in arb_phase(),
            wire in arb_wire(),
        ) {
            let calc = VoltageCalculator::default();
            let max = calc.max_distance_m(load, phase, wire, None);
            let at_max = calc.calculate(max, load, phase, wire, None);
            prop_assert!((at_max.drop_percent - at_max.limit_percent).abs() < 1e-6);
        }
    }
}
