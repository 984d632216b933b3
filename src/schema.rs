//! The compiled form of a [`SampleIndexConfiguration`].
//!
//! A [`SampleIndexSchema`] is built once and shared read-only (usually behind an `Arc`) by
//! builders, entries, filters and iterators. Entries only hold codes and never refer back
//! to the schema.

use crate::codec::{DataField, DataSchema};
use crate::config::{Population, SampleIndexConfiguration, KEY_TYPE};
use crate::error::{ConfigError, EncodeError, Result};
use crate::index::{CategoricalIndexField, IndexField, IndexSchema};
use crate::variant::{FileAttributes, Variant, VariantAnnotation, SNV_CODES};

/// Width in bytes of the relative position stored per variant
pub const OFFSET_WIDTH: usize = 3;

/// Field positions within a variant document
pub const FIELD_OFFSET: usize = 0;
pub const FIELD_SNV: usize = 1;
pub const FIELD_FILE: usize = 2;
pub const FIELD_ANNOTATION: usize = 3;
pub const FIELD_REFERENCE: usize = 4;
pub const FIELD_ALTERNATE: usize = 5;

/// Position of the fixed annotation fields within the annotation index
pub const ANNOTATION_CONSEQUENCE_TYPE: usize = 0;
pub const ANNOTATION_BIOTYPE: usize = 1;
pub const ANNOTATION_CLINICAL_SIGNIFICANCE: usize = 2;
pub const ANNOTATION_CLINICAL_SOURCE: usize = 3;
const ANNOTATION_POPULATIONS: usize = 4;

#[derive(Debug, Clone)]
pub struct SampleIndexSchema {
    configuration: SampleIndexConfiguration,
    file_index: IndexSchema,
    annotation_index: IndexSchema,
    genotype: CategoricalIndexField,
    populations: Vec<Population>,
    variant_schema: DataSchema,
}
impl SampleIndexSchema {
    /// Validates the configuration and builds every encoder
    pub fn new(configuration: SampleIndexConfiguration) -> Result<Self> {
        configuration.validate()?;

        let file_fields = configuration
            .file_index
            .custom_fields
            .iter()
            .map(crate::config::IndexFieldConfiguration::to_field)
            .collect::<Result<Vec<_>>>()?;
        let file_index = IndexSchema::new("fileIndex", file_fields)?;

        let annotation = &configuration.annotation_index;
        let mut annotation_fields = vec![
            annotation.consequence_type.to_field()?,
            annotation.biotype.to_field()?,
            annotation.clinical_significance.to_field()?,
            annotation.clinical_source.to_field()?,
        ];
        let frequencies = &annotation.population_frequency;
        for population in &frequencies.populations {
            let mut field = crate::config::IndexFieldConfiguration::range(
                &population.key(),
                &frequencies.thresholds,
            );
            field.nullable = false;
            annotation_fields.push(field.to_field()?);
        }
        let annotation_index = IndexSchema::new("annotationIndex", annotation_fields)?;

        let IndexField::Categorical(genotype) = configuration.genotype.to_field()? else {
            return Err(ConfigError::InvalidField {
                field: configuration.genotype.key.clone(),
                reason: "genotype encoding must be categorical".to_string(),
            }
            .into());
        };

        let variant_schema = DataSchema::new(vec![
            DataField::integer("offset", OFFSET_WIDTH),
            DataField::categorical("snv", 5, Some(SNV_CODES)),
            DataField::categorical("fileIndex", file_index.bit_length(), None),
            DataField::categorical("annotationIndex", annotation_index.bit_length(), None),
            DataField::bytes("reference"),
            DataField::bytes("alternate"),
        ]);

        Ok(Self {
            populations: frequencies.populations.clone(),
            configuration,
            file_index,
            annotation_index,
            genotype,
            variant_schema,
        })
    }

    #[must_use]
    pub fn configuration(&self) -> &SampleIndexConfiguration {
        &self.configuration
    }

    #[must_use]
    pub fn chunk_size(&self) -> u32 {
        self.configuration.chunk_size
    }

    /// Start of the chunk holding `position`
    #[must_use]
    pub fn chunk_start(&self, position: u32) -> u32 {
        position - position % self.chunk_size()
    }

    #[must_use]
    pub fn file_index(&self) -> &IndexSchema {
        &self.file_index
    }

    #[must_use]
    pub fn annotation_index(&self) -> &IndexSchema {
        &self.annotation_index
    }

    #[must_use]
    pub fn genotype(&self) -> &CategoricalIndexField {
        &self.genotype
    }

    #[must_use]
    pub fn variant_schema(&self) -> &DataSchema {
        &self.variant_schema
    }

    #[must_use]
    pub fn populations(&self) -> &[Population] {
        &self.populations
    }

    /// Annotation field index of a population frequency
    #[must_use]
    pub fn population_field(&self, study: &str, population: &str) -> Option<usize> {
        self.populations
            .iter()
            .position(|p| p.study == study && p.population == population)
            .map(|i| ANNOTATION_POPULATIONS + i)
    }

    /// Packs the per-file attributes of one call
    pub fn encode_file(&self, variant: &Variant, file: &FileAttributes) -> Result<u64> {
        let mut code = 0;
        for (index, field) in self.file_index.fields().iter().enumerate() {
            let value = match field {
                IndexField::Categorical(categorical) => {
                    if field.key() == KEY_TYPE {
                        categorical.encode(variant.variant_type().as_str())?
                    } else {
                        encode_optional(categorical, file.text(field.key()))?
                    }
                }
                IndexField::Range(range) => range.encode(file.numeric(field.key())),
            };
            self.file_index.write(&mut code, index, value)?;
        }
        Ok(code)
    }

    /// Packs the annotation of one variant
    pub fn encode_annotation(&self, annotation: &VariantAnnotation) -> Result<u64> {
        let mut code = 0;
        let sets = [
            (ANNOTATION_CONSEQUENCE_TYPE, &annotation.consequence_types),
            (ANNOTATION_BIOTYPE, &annotation.biotypes),
            (ANNOTATION_CLINICAL_SIGNIFICANCE, &annotation.clinical_significances),
            (ANNOTATION_CLINICAL_SOURCE, &annotation.clinical_sources),
        ];
        for (index, values) in sets {
            if let IndexField::Categorical(field) = &self.annotation_index.fields()[index] {
                self.annotation_index
                    .write(&mut code, index, field.encode_all(values)?)?;
            }
        }
        for (i, population) in self.populations.iter().enumerate() {
            let index = ANNOTATION_POPULATIONS + i;
            if let IndexField::Range(field) = &self.annotation_index.fields()[index] {
                let frequency = annotation.frequency(&population.study, &population.population);
                self.annotation_index
                    .write(&mut code, index, field.encode(Some(frequency)))?;
            }
        }
        Ok(code)
    }

    /// Genotype code used in parents columns; unknown genotypes are null
    pub fn encode_genotype(&self, genotype: Option<&str>) -> Result<u8> {
        let code = encode_optional(&self.genotype, genotype)?;
        Ok(code as u8)
    }
}

/// Encodes a possibly missing value: null when nullable, else the catch-all slot
fn encode_optional(field: &CategoricalIndexField, value: Option<&str>) -> Result<u64> {
    match value {
        Some(value) => field.encode(value),
        None => field
            .null_code()
            .or_else(|| {
                field
                    .slots()
                    .iter()
                    .position(|slot| slot.catch_all)
                    .map(|slot| field.slot_code(slot))
            })
            .ok_or_else(|| {
                EncodeError::OutOfDomain {
                    field: field.key().to_string(),
                    value: String::new(),
                }
                .into()
            }),
    }
}
