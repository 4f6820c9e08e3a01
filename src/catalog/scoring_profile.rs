//! Scoring profile definitions (spec.md §3 "Scoring profile", §4.5).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Aggregation {
    Sum,
    Average,
    Minimum,
    Maximum,
    FirstMatching,
}

impl Default for Aggregation {
    fn default() -> Self {
        Aggregation::Sum
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Interpolation {
    Linear,
    Constant,
    Quadratic,
    Logarithmic,
}

impl Interpolation {
    /// Applies this interpolation shape to a normalized input in `[0, 1]`.
    pub fn apply(&self, x: f64) -> f64 {
        let x = x.clamp(0.0, 1.0);
        match self {
            Interpolation::Linear => x,
            Interpolation::Constant => {
                if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Interpolation::Quadratic => x * x,
            Interpolation::Logarithmic => {
                if x <= 0.0 {
                    0.0
                } else {
                    (x * (std::f64::consts::E - 1.0) + 1.0).ln()
                }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScoringFunction {
    Freshness {
        field_name: String,
        boost: f64,
        interpolation: Interpolation,
        boosting_duration_secs: f64,
    },
    Magnitude {
        field_name: String,
        boost: f64,
        interpolation: Interpolation,
        range_start: f64,
        range_end: f64,
        constant_boost_beyond_range: bool,
    },
    Distance {
        field_name: String,
        boost: f64,
        interpolation: Interpolation,
        reference_point_parameter: String,
        boosting_distance_km: f64,
    },
    Tag {
        field_name: String,
        boost: f64,
        interpolation: Interpolation,
        tags_parameter: String,
    },
}

impl ScoringFunction {
    pub fn field_name(&self) -> &str {
        match self {
            ScoringFunction::Freshness { field_name, .. }
            | ScoringFunction::Magnitude { field_name, .. }
            | ScoringFunction::Distance { field_name, .. }
            | ScoringFunction::Tag { field_name, .. } => field_name,
        }
    }

    pub fn boost(&self) -> f64 {
        match self {
            ScoringFunction::Freshness { boost, .. }
            | ScoringFunction::Magnitude { boost, .. }
            | ScoringFunction::Distance { boost, .. }
            | ScoringFunction::Tag { boost, .. } => *boost,
        }
    }

    pub fn interpolation(&self) -> Interpolation {
        match self {
            ScoringFunction::Freshness { interpolation, .. }
            | ScoringFunction::Magnitude { interpolation, .. }
            | ScoringFunction::Distance { interpolation, .. }
            | ScoringFunction::Tag { interpolation, .. } => *interpolation,
        }
    }

    /// Validates the function's own constraints (boost != 0, != 1.0;
    /// tag interpolation restricted to linear/constant).
    pub fn validate(&self) -> Result<(), String> {
        if self.boost() == 0.0 || self.boost() == 1.0 {
            return Err(format!(
                "scoring function on '{}': boost must be != 0 and != 1.0",
                self.field_name()
            ));
        }
        if matches!(self, ScoringFunction::Tag { .. })
            && !matches!(self.interpolation(), Interpolation::Linear | Interpolation::Constant)
        {
            return Err(format!(
                "scoring function on '{}': tag interpolation must be linear or constant",
                self.field_name()
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoringProfile {
    pub name: String,
    /// field -> positive weight
    pub text_weights: BTreeMap<String, f64>,
    pub functions: Vec<ScoringFunction>,
    pub aggregation: Aggregation,
}

impl ScoringProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}
