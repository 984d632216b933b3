use serde::{Deserialize, Serialize};

use crate::config::{KEY_DEPTH, KEY_FILTER, KEY_QUAL, KEY_TYPE};
use crate::store::DecodedVariant;
use crate::variant::VariantType;

/// Comparison against a numeric bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RangeOp {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
}
impl RangeOp {
    #[must_use]
    pub fn test(self, value: f64, bound: f64) -> bool {
        match self {
            Self::Lt => value < bound,
            Self::Le => value <= bound,
            Self::Gt => value > bound,
            Self::Ge => value >= bound,
        }
    }
}

/// A condition on the annotation or on the per-file attributes of a sample's call
///
/// Value-set predicates match when the variant carries at least one of the values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum Predicate {
    ConsequenceType { values: Vec<String> },
    Biotype { values: Vec<String> },
    ClinicalSignificance { values: Vec<String> },
    ClinicalSource { values: Vec<String> },
    PopulationFrequency {
        study: String,
        population: String,
        op: RangeOp,
        value: f64,
    },
    /// A categorical field of the file index, such as `FILTER`
    FileCategorical { key: String, values: Vec<String> },
    /// A range field of the file index, such as `QUAL` or `DP`
    FileRange { key: String, op: RangeOp, value: f64 },
    VariantType { values: Vec<VariantType> },
}

fn strings<S: AsRef<str>>(values: &[S]) -> Vec<String> {
    values.iter().map(|v| v.as_ref().to_string()).collect()
}

fn any_of(have: &[String], wanted: &[String]) -> bool {
    have.iter().any(|h| wanted.contains(h))
}

impl Predicate {
    pub fn consequence_type<S: AsRef<str>>(values: &[S]) -> Self {
        Self::ConsequenceType {
            values: strings(values),
        }
    }

    pub fn biotype<S: AsRef<str>>(values: &[S]) -> Self {
        Self::Biotype {
            values: strings(values),
        }
    }

    pub fn clinical_significance<S: AsRef<str>>(values: &[S]) -> Self {
        Self::ClinicalSignificance {
            values: strings(values),
        }
    }

    pub fn clinical_source<S: AsRef<str>>(values: &[S]) -> Self {
        Self::ClinicalSource {
            values: strings(values),
        }
    }

    pub fn population_frequency(study: &str, population: &str, op: RangeOp, value: f64) -> Self {
        Self::PopulationFrequency {
            study: study.to_string(),
            population: population.to_string(),
            op,
            value,
        }
    }

    pub fn filter<S: AsRef<str>>(values: &[S]) -> Self {
        Self::FileCategorical {
            key: KEY_FILTER.to_string(),
            values: strings(values),
        }
    }

    pub fn qual(op: RangeOp, value: f64) -> Self {
        Self::FileRange {
            key: KEY_QUAL.to_string(),
            op,
            value,
        }
    }

    pub fn depth(op: RangeOp, value: f64) -> Self {
        Self::FileRange {
            key: KEY_DEPTH.to_string(),
            op,
            value,
        }
    }

    #[must_use]
    pub fn variant_type(values: &[VariantType]) -> Self {
        Self::VariantType {
            values: values.to_vec(),
        }
    }

    /// Evaluates the predicate on a fully decoded variant
    ///
    /// `missing` is the value a missing numeric attribute is compared as; with `None`
    /// a missing attribute never matches.
    #[must_use]
    pub fn test_full(&self, decoded: &DecodedVariant, missing: Option<f64>) -> bool {
        let annotation = &decoded.annotation;
        match self {
            Self::ConsequenceType { values } => any_of(&annotation.consequence_types, values),
            Self::Biotype { values } => any_of(&annotation.biotypes, values),
            Self::ClinicalSignificance { values } => {
                any_of(&annotation.clinical_significances, values)
            }
            Self::ClinicalSource { values } => any_of(&annotation.clinical_sources, values),
            Self::PopulationFrequency {
                study,
                population,
                op,
                value,
            } => op.test(annotation.frequency(study, population), *value),
            Self::FileCategorical { key, values } if key == KEY_TYPE => values
                .iter()
                .any(|v| v == decoded.variant.variant_type().as_str()),
            Self::FileCategorical { key, values } => decoded
                .file
                .text(key)
                .is_some_and(|v| values.iter().any(|w| w == v)),
            Self::FileRange { key, op, value } => decoded
                .file
                .numeric(key)
                .or(missing)
                .is_some_and(|v| op.test(v, *value)),
            Self::VariantType { values } => values.contains(&decoded.variant.variant_type()),
        }
    }
}
