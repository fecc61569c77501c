//! Cost and feasibility validation
//!
//! The money side of a finished design: the itemised construction cost
//! (materials, labour, overhead, profit, crossing surcharges), the
//! composite cost index used for ranking, the voltage-drop feasibility
//! check with a wire recommender, and the transformer capacity check.

use thiserror::Error;

pub mod capacity;
pub mod cost;
pub mod voltage;

pub use capacity::{CapacityConfig, CapacityReport, CapacityStatus, CapacityValidator};
pub use cost::{CostBreakdown, CostCalculator, CostConfig, LaborCosts, MaterialCosts};
pub use voltage::{VoltageCalculator, VoltageConfig, VoltageDropReport, WireSpec};

#[derive(Error, Debug)]
pub enum CostingError {
    #[error("Unknown wire spec: {0}")]
    UnknownWireSpec(String),
}

pub type Result<T> = std::result::Result<T, CostingError>;
