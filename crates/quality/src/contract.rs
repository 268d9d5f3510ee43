//! Declarative quality contracts.

use crate::error::QualityError;
use marine_risk_types::{BoundingBox, FeatureName};
use serde::{Deserialize, Serialize};

/// One contract rule. Rules on fields that do not apply to a value pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Rule {
    /// The field must be present and non-empty.
    Required { field: String },
    /// Numeric field within an inclusive range; either bound may be open.
    Range {
        field: String,
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    /// Numeric field must not be NaN or infinite.
    Finite { field: String },
    /// Track segments must have `start <= end`, and consecutive segments of
    /// the same track must not go back in time.
    TimeOrdered,
    /// Geometry must be structurally valid and non-self-intersecting.
    ValidGeometry,
    /// Geometry must lie entirely inside the extent.
    WithinExtent { extent: BoundingBox },
    /// Every declared feature must be present, and observed values finite.
    FeaturesPresent,
}

impl Rule {
    /// Stable key used to group violations.
    pub fn key(&self) -> String {
        match self {
            Rule::Required { field } => format!("required:{field}"),
            Rule::Range { field, .. } => format!("range:{field}"),
            Rule::Finite { field } => format!("finite:{field}"),
            Rule::TimeOrdered => "time_ordered".into(),
            Rule::ValidGeometry => "valid_geometry".into(),
            Rule::WithinExtent { .. } => "within_extent".into(),
            Rule::FeaturesPresent => "features_present".into(),
        }
    }

    fn range(field: &str, min: Option<f64>, max: Option<f64>) -> Self {
        Rule::Range {
            field: field.to_string(),
            min,
            max,
        }
    }
}

/// A named set of rules applied to one stage of the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub name: String,
    pub rules: Vec<Rule>,
}

impl Contract {
    pub fn new(name: impl Into<String>, rules: Vec<Rule>) -> Self {
        Self {
            name: name.into(),
            rules,
        }
    }

    /// Contract for adapter output.
    pub fn input(max_speed_mps: f64) -> Self {
        Self::new(
            "input",
            vec![
                Rule::Required {
                    field: "source_id".into(),
                },
                Rule::Required {
                    field: "vessel_id".into(),
                },
                Rule::Required {
                    field: "zone_id".into(),
                },
                Rule::Finite {
                    field: "speed_mps".into(),
                },
                Rule::range("speed_mps", Some(0.0), Some(max_speed_mps)),
                Rule::range("heading_deg", Some(0.0), Some(360.0)),
                Rule::range("observer_confidence", Some(0.0), Some(1.0)),
                Rule::Finite {
                    field: "depth_m".into(),
                },
                Rule::range("depth_m", None, Some(0.0)),
                Rule::TimeOrdered,
                Rule::ValidGeometry,
            ],
        )
    }

    /// Contract for extracted feature vectors.
    pub fn output() -> Self {
        let mut rules = vec![
            Rule::FeaturesPresent,
            Rule::range("coverage", Some(0.0), Some(1.0)),
        ];
        for name in [
            FeatureName::VesselCount,
            FeatureName::VesselDensity,
            FeatureName::VesselHours,
            FeatureName::VesselSpeedMean,
            FeatureName::VesselSpeedP90,
            FeatureName::WhaleDensity,
        ] {
            rules.push(Rule::range(name.as_str(), Some(0.0), None));
        }
        for name in [
            FeatureName::WhaleRecency,
            FeatureName::ProtectionFraction,
            FeatureName::ProtectionFlag,
            FeatureName::ProtectionLevel,
        ] {
            rules.push(Rule::range(name.as_str(), Some(0.0), Some(1.0)));
        }
        Self::new("output", rules)
    }

    pub fn validate(&self) -> Result<(), QualityError> {
        for rule in &self.rules {
            let invalid = |message: String| QualityError::InvalidRule {
                contract: self.name.clone(),
                message,
            };
            match rule {
                Rule::Range { field, min, max } => {
                    if min.is_none() && max.is_none() {
                        return Err(invalid(format!("range on {field} has no bounds")));
                    }
                    if let (Some(lo), Some(hi)) = (min, max) {
                        if lo > hi {
                            return Err(invalid(format!("range on {field} has min > max")));
                        }
                    }
                }
                Rule::WithinExtent { extent } => {
                    extent.validate().map_err(|e| invalid(e.to_string()))?;
                }
                Rule::Required { field } | Rule::Finite { field } if field.is_empty() => {
                    return Err(invalid("rule with empty field name".into()));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_contracts_are_valid() {
        Contract::input(30.0).validate().unwrap();
        Contract::output().validate().unwrap();
    }

    #[test]
    fn contracts_load_from_toml() {
        let contract: Contract = toml::from_str(
            r#"
            name = "strict"

            [[rules]]
            rule = "range"
            field = "speed_mps"
            max = 15.0

            [[rules]]
            rule = "within_extent"
            extent = { min_lon = -71.0, min_lat = 40.0, max_lon = -69.0, max_lat = 42.0 }

            [[rules]]
            rule = "time_ordered"
            "#,
        )
        .unwrap();
        assert_eq!(contract.rules.len(), 3);
        assert_eq!(contract.rules[0].key(), "range:speed_mps");
        contract.validate().unwrap();
    }

    #[test]
    fn unbounded_range_is_invalid() {
        let contract = Contract::new("bad", vec![Rule::range("x", None, None)]);
        assert!(contract.validate().is_err());
    }
}
