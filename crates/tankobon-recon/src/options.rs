use serde::{Deserialize, Serialize};
use tankobon_core::MatchingConfig;

use crate::{ReconError, Result};

pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.85;
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.87;

/// Operator thresholds for one reconciliation run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReconcileOptions {
    pub min_confidence: f64,
    pub fuzzy_threshold: f64,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
        }
    }
}

impl From<&MatchingConfig> for ReconcileOptions {
    fn from(config: &MatchingConfig) -> Self {
        Self {
            min_confidence: config.min_confidence,
            fuzzy_threshold: config.fuzzy_threshold,
        }
    }
}

impl ReconcileOptions {
    pub fn with_min_confidence(mut self, value: f64) -> Self {
        self.min_confidence = value;
        self
    }

    pub fn with_fuzzy_threshold(mut self, value: f64) -> Self {
        self.fuzzy_threshold = value;
        self
    }

    /// Both thresholds must be finite and inside [0, 1].
    pub fn validate(&self) -> Result<()> {
        check_unit_range("min_confidence", self.min_confidence)?;
        check_unit_range("fuzzy_threshold", self.fuzzy_threshold)
    }
}

fn check_unit_range(name: &str, value: f64) -> Result<()> {
    if value.is_nan() || !(0.0..=1.0).contains(&value) {
        return Err(ReconError::Configuration(format!(
            "{name} must be within [0, 1], got {value}"
        )));
    }
    Ok(())
}
