//! Housing-block feature schema shared by the prediction service and the form front-end.
//!
//! The schema is ordered; records are always assembled in `FEATURE_NAMES` order, never in
//! the iteration order of whatever mapping the caller sent.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const FEATURE_NAMES: [&str; 9] = [
    "ocean_proximity",
    "longitude",
    "latitude",
    "housing_median_age",
    "total_rooms",
    "total_bedrooms",
    "population",
    "households",
    "median_income",
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeatureKind {
    Categorical,
    Numeric { min: f64, max: f64, integer: bool },
}

/// Static description of one input column, including the value range observed in the
/// training data.
#[derive(Debug, Clone, Copy)]
pub struct FeatureSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub info: &'static str,
    pub kind: FeatureKind,
}

const fn numeric(name: &'static str, label: &'static str, info: &'static str, min: f64, max: f64, integer: bool) -> FeatureSpec {
    FeatureSpec { name, label, info, kind: FeatureKind::Numeric { min, max, integer } }
}

pub const FEATURES: [FeatureSpec; 9] = [
    FeatureSpec { name: "ocean_proximity", label: "Ocean Proximity", info: "Proximity of the block to the ocean.", kind: FeatureKind::Categorical },
    numeric("longitude", "Longitude", "Geographical longitude of the block location.", -124.3, -114.31, false),
    numeric("latitude", "Latitude", "Geographical latitude of the block location.", 32.54, 41.95, false),
    numeric("housing_median_age", "Housing Median Age", "Median age of the houses in the block.", 1.0, 51.0, true),
    numeric("total_rooms", "Total Rooms", "Total number of rooms in the block.", 32.0, 37937.0, true),
    numeric("total_bedrooms", "Total Bedrooms", "Total number of bedrooms in the block.", 7.0, 5471.0, true),
    numeric("population", "Population", "Population of the block.", 13.0, 16122.0, true),
    numeric("households", "Households", "Number of households in the block.", 6.0, 5189.0, true),
    numeric("median_income", "Median Income [k$]", "Median income of the households in the block (in thousands of $).", 0.49, 13.11, false),
];

pub fn spec(name: &str) -> Option<&'static FeatureSpec> { FEATURES.iter().find(|f| f.name == name) }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OceanProximity {
    #[serde(rename = "near_bay")]
    NearBay,
    #[serde(rename = "<1h_ocean")]
    UnderHourToOcean,
    #[serde(rename = "inland")]
    Inland,
    #[serde(rename = "near_ocean")]
    NearOcean,
}

impl OceanProximity {
    pub const ALL: [OceanProximity; 4] = [Self::NearBay, Self::UnderHourToOcean, Self::Inland, Self::NearOcean];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NearBay => "near_bay",
            Self::UnderHourToOcean => "<1h_ocean",
            Self::Inland => "inland",
            Self::NearOcean => "near_ocean",
        }
    }
}

impl fmt::Display for OceanProximity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OceanProximity {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|c| c.as_str() == s).ok_or_else(|| s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("no features supplied")]
    Empty,
    #[error("missing feature {0:?}")]
    Missing(String),
    #[error("unexpected feature {0:?}")]
    Unexpected(String),
    #[error("feature {feature:?} must be a {expected}")]
    InvalidType { feature: String, expected: &'static str },
    #[error("feature {feature:?} has unknown category {value:?}")]
    UnknownCategory { feature: String, value: String },
}

/// One housing block, validated against the schema.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRecord {
    pub ocean_proximity: OceanProximity,
    pub longitude: f64,
    pub latitude: f64,
    pub housing_median_age: f64,
    pub total_rooms: f64,
    pub total_bedrooms: f64,
    pub population: f64,
    pub households: f64,
    pub median_income: f64,
}

impl FeatureRecord {
    /// Builds a record from a JSON object. Every schema feature must be present, no other
    /// keys are allowed, numerics must be JSON numbers and the category must be known.
    pub fn from_map(map: &Map<String, Value>) -> Result<Self, SchemaError> {
        if map.is_empty() { return Err(SchemaError::Empty); }
        if let Some(extra) = map.keys().find(|k| !FEATURE_NAMES.contains(&k.as_str())) {
            return Err(SchemaError::Unexpected(extra.clone()));
        }
        let get = |name: &str| map.get(name).ok_or_else(|| SchemaError::Missing(name.to_string()));
        let num = |name: &str| -> Result<f64, SchemaError> {
            get(name)?.as_f64().ok_or_else(|| SchemaError::InvalidType { feature: name.to_string(), expected: "number" })
        };
        let category = get("ocean_proximity")?
            .as_str()
            .ok_or_else(|| SchemaError::InvalidType { feature: "ocean_proximity".into(), expected: "string" })?;
        let ocean_proximity = category.parse().map_err(|value| SchemaError::UnknownCategory { feature: "ocean_proximity".into(), value })?;
        Ok(Self {
            ocean_proximity,
            longitude: num("longitude")?,
            latitude: num("latitude")?,
            housing_median_age: num("housing_median_age")?,
            total_rooms: num("total_rooms")?,
            total_bedrooms: num("total_bedrooms")?,
            population: num("population")?,
            households: num("households")?,
            median_income: num("median_income")?,
        })
    }

    pub fn numeric(&self, name: &str) -> Option<f64> {
        Some(match name {
            "longitude" => self.longitude,
            "latitude" => self.latitude,
            "housing_median_age" => self.housing_median_age,
            "total_rooms" => self.total_rooms,
            "total_bedrooms" => self.total_bedrooms,
            "population" => self.population,
            "households" => self.households,
            "median_income" => self.median_income,
            _ => return None,
        })
    }

    pub fn category(&self, name: &str) -> Option<&'static str> {
        (name == "ocean_proximity").then(|| self.ocean_proximity.as_str())
    }
}

/// Pairs the ordered feature names with positional values.
pub fn zip_features(values: impl IntoIterator<Item = Value>) -> Map<String, Value> {
    FEATURE_NAMES.iter().map(|n| n.to_string()).zip(values).collect()
}

/// Pre-filled rows offered by the form.
#[derive(Debug, Clone, Copy)]
pub struct ExampleRow {
    pub ocean_proximity: OceanProximity,
    pub numeric: [f64; 8],
}

impl ExampleRow {
    pub fn values(&self) -> Vec<Value> {
        let mut out = vec![Value::from(self.ocean_proximity.as_str())];
        for (spec, v) in FEATURES[1..].iter().zip(self.numeric) {
            out.push(match spec.kind {
                FeatureKind::Numeric { integer: true, .. } => Value::from(v as i64),
                _ => Value::from(v),
            });
        }
        out
    }
}

pub const EXAMPLE_ROWS: [ExampleRow; 4] = [
    ExampleRow { ocean_proximity: OceanProximity::NearBay, numeric: [-122.23, 37.88, 41.0, 880.0, 129.0, 322.0, 126.0, 8.3252] },
    ExampleRow { ocean_proximity: OceanProximity::Inland, numeric: [-119.02, 35.36, 48.0, 1833.0, 396.0, 947.0, 363.0, 2.2827] },
    ExampleRow { ocean_proximity: OceanProximity::UnderHourToOcean, numeric: [-118.59, 34.14, 19.0, 1303.0, 155.0, 450.0, 145.0, 10.5511] },
    ExampleRow { ocean_proximity: OceanProximity::NearOcean, numeric: [-118.31, 33.73, 49.0, 1642.0, 287.0, 692.0, 288.0, 4.1812] },
];
