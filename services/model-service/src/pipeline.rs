//! Fitted preprocessing pipeline.
//!
//! The artifact is a JSON document listing output columns in order. Each column reads a
//! schema feature (or the ratio of two numeric features) and applies a transform whose
//! parameters were fitted at training time:
//!
//! ```json
//! {"columns": [
//!   {"source": {"feature": "ocean_proximity"}, "transform": {"type": "one_hot", "categories": ["<1h_ocean", "inland", "near_bay", "near_ocean"]}},
//!   {"source": {"feature": "median_income"},   "transform": {"type": "standard", "mean": 3.87, "scale": 1.9}},
//!   {"source": {"ratio": {"numerator": "total_rooms", "denominator": "households"}}, "transform": {"type": "log_standard", "mean": 1.7, "scale": 0.25}}
//! ]}
//! ```

use homelens_core::features::{self, FeatureKind};
use homelens_core::{FeatureRecord, OceanProximity};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum PipelineError {
    #[error("pipeline artifact is not valid JSON: {0}")]
    Decode(String),
    #[error("invalid pipeline: {0}")]
    Invalid(String),
    #[error("column {column}: division by zero in ratio")]
    DivisionByZero { column: usize },
    #[error("column {column}: log1p undefined for {value}")]
    LogDomain { column: usize, value: f64 },
    #[error("column {column}: category {value:?} was not seen during fitting")]
    UnseenCategory { column: usize, value: String },
    #[error("column {column}: transform produced a non-finite value")]
    NonFinite { column: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Feature(String),
    Ratio { numerator: String, denominator: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Transform {
    Passthrough,
    Standard { mean: f64, scale: f64 },
    /// `(ln(1 + x) - mean) / scale`
    LogStandard { mean: f64, scale: f64 },
    MinMax { min: f64, max: f64 },
    OneHot { categories: Vec<String> },
}

impl Transform {
    fn width(&self) -> usize {
        match self { Transform::OneHot { categories } => categories.len(), _ => 1 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub source: Source,
    pub transform: Transform,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub columns: Vec<Column>,
}

enum Cell {
    Num(f64),
    Cat(&'static str),
}

impl Pipeline {
    pub fn from_json(bytes: &[u8]) -> Result<Self, PipelineError> {
        let pipeline: Pipeline = serde_json::from_slice(bytes).map_err(|e| PipelineError::Decode(e.to_string()))?;
        pipeline.validate()?;
        Ok(pipeline)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        let invalid = |i: usize, msg: String| Err(PipelineError::Invalid(format!("column {i}: {msg}")));
        if self.columns.is_empty() { return Err(PipelineError::Invalid("no columns".into())); }
        for (i, col) in self.columns.iter().enumerate() {
            let categorical = match &col.source {
                Source::Feature(name) => match features::spec(name) {
                    Some(spec) => spec.kind == FeatureKind::Categorical,
                    None => return invalid(i, format!("unknown feature {name:?}")),
                },
                Source::Ratio { numerator, denominator } => {
                    for name in [numerator, denominator] {
                        match features::spec(name) {
                            Some(spec) if matches!(spec.kind, FeatureKind::Numeric { .. }) => {}
                            _ => return invalid(i, format!("ratio operand {name:?} is not a numeric feature")),
                        }
                    }
                    false
                }
            };
            match &col.transform {
                Transform::OneHot { categories } => {
                    if !categorical { return invalid(i, "one_hot applied to a numeric source".into()); }
                    if categories.is_empty() { return invalid(i, "one_hot without categories".into()); }
                    if let Some(bad) = categories.iter().find(|c| c.parse::<OceanProximity>().is_err()) {
                        return invalid(i, format!("unknown category {bad:?}"));
                    }
                }
                _ if categorical => return invalid(i, "categorical source needs one_hot".into()),
                Transform::Standard { scale, .. } | Transform::LogStandard { scale, .. } => {
                    if *scale == 0.0 || !scale.is_finite() { return invalid(i, format!("bad scale {scale}")); }
                }
                Transform::MinMax { min, max } => {
                    if !(max > min) { return invalid(i, format!("min {min} must be below max {max}")); }
                }
                Transform::Passthrough => {}
            }
        }
        Ok(())
    }

    /// Number of values `transform` emits per record.
    pub fn width(&self) -> usize { self.columns.iter().map(|c| c.transform.width()).sum() }

    pub fn transform(&self, record: &FeatureRecord) -> Result<Vec<f32>, PipelineError> {
        let mut row = Vec::with_capacity(self.width());
        for (column, col) in self.columns.iter().enumerate() {
            let cell = match &col.source {
                Source::Feature(name) => match record.category(name) {
                    Some(c) => Cell::Cat(c),
                    None => Cell::Num(record.numeric(name).ok_or_else(|| PipelineError::Invalid(format!("unknown feature {name:?}")))?),
                },
                Source::Ratio { numerator, denominator } => {
                    let (n, d) = (record.numeric(numerator), record.numeric(denominator));
                    match (n, d) {
                        (Some(_), Some(d)) if d == 0.0 => return Err(PipelineError::DivisionByZero { column }),
                        (Some(n), Some(d)) => Cell::Num(n / d),
                        _ => return Err(PipelineError::Invalid(format!("column {column}: ratio operands not numeric"))),
                    }
                }
            };
            match (&col.transform, cell) {
                (Transform::OneHot { categories }, Cell::Cat(value)) => {
                    let hit = categories.iter().position(|c| c == value)
                        .ok_or_else(|| PipelineError::UnseenCategory { column, value: value.to_string() })?;
                    row.extend((0..categories.len()).map(|k| if k == hit { 1.0 } else { 0.0 }));
                }
                (transform, Cell::Num(x)) => {
                    let v = match *transform {
                        Transform::Passthrough => x,
                        Transform::Standard { mean, scale } => (x - mean) / scale,
                        Transform::LogStandard { mean, scale } => {
                            if x <= -1.0 { return Err(PipelineError::LogDomain { column, value: x }); }
                            (x.ln_1p() - mean) / scale
                        }
                        Transform::MinMax { min, max } => (x - min) / (max - min),
                        Transform::OneHot { .. } => return Err(PipelineError::Invalid(format!("column {column}: one_hot on numeric value"))),
                    };
                    let v = v as f32;
                    if !v.is_finite() { return Err(PipelineError::NonFinite { column }); }
                    row.push(v);
                }
                (_, Cell::Cat(_)) => return Err(PipelineError::Invalid(format!("column {column}: categorical value needs one_hot"))),
            }
        }
        Ok(row)
    }
}
