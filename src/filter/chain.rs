use std::ops::Range;

use tracing::debug;

use super::{IndexFieldFilter, Match, Predicate};
use crate::config::KEY_TYPE;
use crate::error::{QueryError, Result};
use crate::index::{IndexField, IndexSchema};
use crate::schema::{
    SampleIndexSchema, ANNOTATION_BIOTYPE, ANNOTATION_CLINICAL_SIGNIFICANCE,
    ANNOTATION_CLINICAL_SOURCE, ANNOTATION_CONSEQUENCE_TYPE,
};
use crate::store::DecodedVariant;

/// The packed code a filter reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    File,
    Annotation,
}

#[derive(Debug, Clone)]
struct FieldFilter {
    kind: IndexKind,
    field: usize,
    offset: u8,
    bits: u8,
    multi_value: bool,
    counters: Range<usize>,
    filter: IndexFieldFilter,
}
impl FieldFilter {
    fn sub_code(&self, code: u64) -> u64 {
        crate::codec::bits::read_bits(code, self.offset, self.bits)
    }
}

#[derive(Debug, Clone)]
struct Condition {
    predicate: Predicate,
    missing: Option<f64>,
}

/// Predicates compiled against a [`SampleIndexSchema`]
///
/// Predicates on the same field are merged into a single filter. The chain is immutable
/// and can be shared between iterators.
#[derive(Debug, Clone, Default)]
pub struct FilterChain {
    fields: Vec<FieldFilter>,
    conditions: Vec<Condition>,
    file_counters: usize,
}
impl FilterChain {
    /// An empty chain accepting every variant exactly
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compile(schema: &SampleIndexSchema, predicates: &[Predicate]) -> Result<Self> {
        let mut chain = Self {
            fields: Vec::new(),
            conditions: Vec::with_capacity(predicates.len()),
            file_counters: schema.file_index().histogram_len(),
        };
        for predicate in predicates {
            let (kind, field) = locate(schema, predicate)?;
            let index = match kind {
                IndexKind::File => schema.file_index(),
                IndexKind::Annotation => schema.annotation_index(),
            };
            let definition = &index.fields()[field];
            let filter = compile_predicate(definition, predicate)?;
            let missing = match definition {
                IndexField::Range(range) => range.missing_value(),
                IndexField::Categorical(_) => None,
            };
            chain.conditions.push(Condition {
                predicate: predicate.clone(),
                missing,
            });
            chain.push(kind, index, field, filter);
        }

        let before = chain.fields.len();
        chain.fields.retain(|f| !f.filter.all_valid());
        if chain.fields.len() != before {
            debug!(
                dropped = before - chain.fields.len(),
                "dropped filters accepting every code"
            );
        }
        Ok(chain)
    }

    fn push(&mut self, kind: IndexKind, index: &IndexSchema, field: usize, filter: IndexFieldFilter) {
        if let Some(existing) = self
            .fields
            .iter_mut()
            .find(|f| f.kind == kind && f.field == field)
        {
            let previous = std::mem::replace(&mut existing.filter, IndexFieldFilter::NoOp);
            existing.filter = previous.and(filter);
            return;
        }
        let definition = &index.fields()[field];
        let base = match kind {
            IndexKind::File => 0,
            IndexKind::Annotation => self.file_counters,
        };
        let counters = index.histogram_range(field);
        self.fields.push(FieldFilter {
            kind,
            field,
            offset: index.offset(field),
            bits: definition.bits(),
            multi_value: definition.is_multi_value(),
            counters: base + counters.start..base + counters.end,
            filter,
        });
    }

    /// Whether no predicate constrains the index codes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    #[must_use]
    pub fn predicates(&self) -> impl Iterator<Item = &Predicate> {
        self.conditions.iter().map(|c| &c.predicate)
    }

    /// Tests the codes of one variant against every field filter
    #[must_use]
    pub fn test(&self, file_code: u64, annotation_code: u64) -> Match {
        let mut result = Match::Exact;
        for field in &self.fields {
            let code = match field.kind {
                IndexKind::File => file_code,
                IndexKind::Annotation => annotation_code,
            };
            result = result.and(field.filter.test_match(field.sub_code(code)));
            if result == Match::None {
                break;
            }
        }
        result
    }

    /// Whether every match of the chain is exact
    #[must_use]
    pub fn is_exact(&self) -> bool {
        self.fields.iter().all(|f| f.filter.is_exact())
    }

    /// Whether no variant can satisfy the chain
    #[must_use]
    pub fn none_valid(&self) -> bool {
        self.fields.iter().any(|f| f.filter.none_valid())
    }

    /// Whether a genotype bucket with this histogram may hold a matching variant
    #[must_use]
    pub fn may_contain(&self, histogram: &[u32]) -> bool {
        self.fields.iter().all(|f| {
            let counters = histogram.get(f.counters.clone()).unwrap_or(&[]);
            f.filter.any_in_histogram(f.multi_value, counters)
        })
    }

    /// Re-evaluates every predicate on the fully decoded variant
    #[must_use]
    pub fn confirm(&self, decoded: &DecodedVariant) -> bool {
        self.conditions
            .iter()
            .all(|c| c.predicate.test_full(decoded, c.missing))
    }
}

/// Index and field position constrained by a predicate
fn locate(schema: &SampleIndexSchema, predicate: &Predicate) -> Result<(IndexKind, usize)> {
    let file_field = |key: &str| -> Result<(IndexKind, usize)> {
        schema
            .file_index()
            .field(key)
            .map(|(index, _)| (IndexKind::File, index))
            .ok_or_else(|| QueryError::UnknownField(key.to_string()).into())
    };
    match predicate {
        Predicate::ConsequenceType { .. } => {
            Ok((IndexKind::Annotation, ANNOTATION_CONSEQUENCE_TYPE))
        }
        Predicate::Biotype { .. } => Ok((IndexKind::Annotation, ANNOTATION_BIOTYPE)),
        Predicate::ClinicalSignificance { .. } => {
            Ok((IndexKind::Annotation, ANNOTATION_CLINICAL_SIGNIFICANCE))
        }
        Predicate::ClinicalSource { .. } => Ok((IndexKind::Annotation, ANNOTATION_CLINICAL_SOURCE)),
        Predicate::PopulationFrequency {
            study, population, ..
        } => schema
            .population_field(study, population)
            .map(|index| (IndexKind::Annotation, index))
            .ok_or_else(|| QueryError::UnknownPopulation(format!("{study}:{population}")).into()),
        Predicate::FileCategorical { key, .. } | Predicate::FileRange { key, .. } => file_field(key),
        Predicate::VariantType { .. } => file_field(KEY_TYPE),
    }
}

fn compile_predicate(field: &IndexField, predicate: &Predicate) -> Result<IndexFieldFilter> {
    let mismatch = || QueryError::InvalidPredicate(format!("{predicate:?} on field {}", field.key()));
    match (field, predicate) {
        (
            IndexField::Categorical(categorical),
            Predicate::ConsequenceType { values }
            | Predicate::Biotype { values }
            | Predicate::ClinicalSignificance { values }
            | Predicate::ClinicalSource { values }
            | Predicate::FileCategorical { values, .. },
        ) => Ok(IndexFieldFilter::categorical(categorical, values)),
        (IndexField::Categorical(categorical), Predicate::VariantType { values }) => {
            let values: Vec<&str> = values.iter().map(|v| v.as_str()).collect();
            Ok(IndexFieldFilter::categorical(categorical, &values))
        }
        (
            IndexField::Range(range),
            Predicate::PopulationFrequency { op, value, .. } | Predicate::FileRange { op, value, .. },
        ) => Ok(IndexFieldFilter::range(range, *op, *value)),
        _ => Err(mismatch().into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SampleIndexConfiguration;
    use crate::filter::RangeOp;
    use crate::variant::{FileAttributes, PopulationFrequency, Variant, VariantAnnotation, VariantType};

    fn schema() -> anyhow::Result<SampleIndexSchema> {
        Ok(SampleIndexSchema::new(SampleIndexConfiguration::default())?)
    }

    fn codes(schema: &SampleIndexSchema, variant: &DecodedVariant) -> anyhow::Result<(u64, u64)> {
        Ok((
            schema.encode_file(&variant.variant, &variant.file)?,
            schema.encode_annotation(&variant.annotation)?,
        ))
    }

    fn decoded(ct: &str, freq: f64, qual: f64) -> DecodedVariant {
        DecodedVariant {
            variant: Variant::new("1", 100, "A", "G"),
            genotype: "0/1".to_string(),
            annotation: VariantAnnotation {
                consequence_types: vec![ct.to_string()],
                biotypes: vec!["protein_coding".to_string()],
                population_frequencies: vec![PopulationFrequency {
                    study: "GNOMAD_GENOMES".into(),
                    population: "ALL".into(),
                    alt_allele_freq: freq,
                }],
                ..VariantAnnotation::default()
            },
            file: FileAttributes {
                filter: Some("PASS".into()),
                qual: Some(qual),
                ..FileAttributes::default()
            },
        }
    }

    #[test]
    fn test_exact_chain() -> anyhow::Result<()> {
        let schema = schema()?;
        let chain = FilterChain::compile(
            &schema,
            &[
                Predicate::consequence_type(&["missense_variant"]),
                Predicate::filter(&["PASS"]),
                Predicate::qual(RangeOp::Ge, 20.0),
            ],
        )?;
        assert!(chain.is_exact());
        let hit = decoded("missense_variant", 0.0, 25.0);
        let (file, annotation) = codes(&schema, &hit)?;
        assert_eq!(chain.test(file, annotation), Match::Exact);
        assert!(chain.confirm(&hit));

        let miss = decoded("intron_variant", 0.0, 25.0);
        let (file, annotation) = codes(&schema, &miss)?;
        assert_eq!(chain.test(file, annotation), Match::None);
        assert!(!chain.confirm(&miss));
        Ok(())
    }

    #[test]
    fn test_approximate_chain() -> anyhow::Result<()> {
        let schema = schema()?;
        let chain = FilterChain::compile(
            &schema,
            &[Predicate::population_frequency(
                "GNOMAD_GENOMES",
                "ALL",
                RangeOp::Lt,
                0.002,
            )],
        )?;
        assert!(!chain.is_exact());

        // 0.003 and 0.0015 share the bucket [0.001, 0.005)
        for (freq, truth) in [(0.003, false), (0.0015, true)] {
            let variant = decoded("intron_variant", freq, 50.0);
            let (file, annotation) = codes(&schema, &variant)?;
            assert_eq!(chain.test(file, annotation), Match::Approximate);
            assert_eq!(chain.confirm(&variant), truth);
        }
        let rare = decoded("intron_variant", 0.0, 50.0);
        let (file, annotation) = codes(&schema, &rare)?;
        assert_eq!(chain.test(file, annotation), Match::Exact);
        Ok(())
    }

    #[test]
    fn test_merged_and_pruned() -> anyhow::Result<()> {
        let schema = schema()?;
        let chain = FilterChain::compile(
            &schema,
            &[
                Predicate::qual(RangeOp::Ge, 10.0),
                Predicate::qual(RangeOp::Lt, 10.0),
            ],
        )?;
        assert!(chain.none_valid());

        let all = FilterChain::compile(&schema, &[Predicate::qual(RangeOp::Ge, f64::NEG_INFINITY)])?;
        assert!(all.is_empty());
        assert_eq!(all.predicates().count(), 1);
        Ok(())
    }

    #[test]
    fn test_histogram_pruning() -> anyhow::Result<()> {
        let schema = schema()?;
        let chain = FilterChain::compile(&schema, &[Predicate::consequence_type(&["stop_gained"])])?;
        let file_len = schema.file_index().histogram_len();
        let mut histogram = vec![0u32; file_len + schema.annotation_index().histogram_len()];

        let intronic = decoded("intron_variant", 0.0, 50.0);
        let (file, annotation) = codes(&schema, &intronic)?;
        schema.file_index().count(file, &mut histogram[..file_len]);
        schema.annotation_index().count(annotation, &mut histogram[file_len..]);
        assert!(!chain.may_contain(&histogram));

        let stop = decoded("stop_gained", 0.0, 50.0);
        let (file, annotation) = codes(&schema, &stop)?;
        schema.file_index().count(file, &mut histogram[..file_len]);
        schema.annotation_index().count(annotation, &mut histogram[file_len..]);
        assert!(chain.may_contain(&histogram));

        // no histogram, no pruning
        assert!(chain.may_contain(&[]));
        Ok(())
    }

    #[test]
    fn test_invalid_predicates() -> anyhow::Result<()> {
        let schema = schema()?;
        assert!(FilterChain::compile(
            &schema,
            &[Predicate::population_frequency("EXAC", "AFR", RangeOp::Lt, 0.1)]
        )
        .is_err());
        assert!(FilterChain::compile(
            &schema,
            &[Predicate::FileRange {
                key: "FILTER".into(),
                op: RangeOp::Lt,
                value: 1.0
            }]
        )
        .is_err());
        let chain = FilterChain::compile(&schema, &[Predicate::variant_type(&[VariantType::Snv])])?;
        assert!(chain.is_exact());
        Ok(())
    }
}
