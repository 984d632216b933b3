//! Index configuration.
//!
//! The configuration decides which properties are indexed and at which granularity. It is
//! serialized as camelCase JSON and every section has defaults, so a partial document only
//! overrides what it names.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::index::{CategoricalIndexField, CategoricalKind, IndexField, RangeIndexField};

/// Default width of a locus chunk in bases
pub const DEFAULT_CHUNK_SIZE: u32 = 10_000;

/// Chunk size limit imposed by the 24-bit relative offset
pub const MAX_CHUNK_SIZE: u32 = 1 << 24;

/// Largest genotype code that still fits in a parents nibble
pub const MAX_GENOTYPE_CODES: u64 = 16;

pub const KEY_FILTER: &str = "FILTER";
pub const KEY_QUAL: &str = "QUAL";
pub const KEY_DEPTH: &str = "DP";
pub const KEY_TYPE: &str = "TYPE";

const QUAL_THRESHOLDS: [f64; 3] = [10.0, 20.0, 30.0];
const DP_THRESHOLDS: [f64; 6] = [5.0, 10.0, 15.0, 20.0, 30.0, 50.0];
const POPULATION_FREQUENCY_THRESHOLDS: [f64; 7] =
    [0.000_000_1, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05];

const CONSEQUENCE_TYPES: [&str; 24] = [
    "missense_variant",
    "frameshift_variant",
    "inframe_deletion",
    "inframe_insertion",
    "start_lost",
    "stop_gained",
    "stop_lost",
    "splice_acceptor_variant",
    "splice_donor_variant",
    "transcript_ablation",
    "transcript_amplification",
    "initiator_codon_variant",
    "splice_region_variant",
    "incomplete_terminal_codon_variant",
    "feature_truncation",
    "synonymous_variant",
    "regulatory_region_variant",
    "TF_binding_site_variant",
    "mature_miRNA_variant",
    "upstream_gene_variant",
    "downstream_gene_variant",
    "3_prime_UTR_variant",
    "5_prime_UTR_variant",
    "intron_variant",
];

const BIOTYPES: [&str; 8] = [
    "nonsense_mediated_decay",
    "lincRNA",
    "miRNA",
    "retained_intron",
    "snRNA",
    "snoRNA",
    "other_non_pseudo_gene",
    "protein_coding",
];

const LINCRNA_BIOTYPES: [&str; 9] = [
    "lncRNA",
    "non_coding",
    "lincRNA",
    "macro_lncRNA",
    "antisense",
    "sense_intronic",
    "sense_overlapping",
    "3prime_overlapping_ncRNA",
    "bidirectional_promoter_lncRNA",
];

const OTHER_NON_PSEUDO_GENE_BIOTYPES: [&str; 20] = [
    "processed_transcript",
    "non_stop_decay",
    "misc_RNA",
    "rRNA",
    "Mt_rRNA",
    "Mt_tRNA",
    "IG_C_gene",
    "IG_D_gene",
    "IG_J_gene",
    "IG_V_gene",
    "TR_C_gene",
    "TR_D_gene",
    "TR_J_gene",
    "TR_V_gene",
    "nmd_transcript_variant",
    "transcribed_unprocessed_pseudogene",
    "ambiguous_orf",
    "known_ncrna",
    "retrotransposed",
    "LRG_gene",
];

const CLINICAL_SIGNIFICANCES: [&str; 5] = [
    "benign",
    "likely_benign",
    "uncertain_significance",
    "likely_pathogenic",
    "pathogenic",
];

const CLINICAL_SOURCES: [&str; 2] = ["clinvar", "cosmic"];

const GENOTYPES: [&str; 9] = ["0/1", "1/1", "1/2", "0|1", "1|0", "1|1", "0/0", "0|0", "./."];

const VARIANT_TYPES: [&str; 6] = ["SNV", "MNV", "INSERTION", "DELETION", "INDEL", "OTHER"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IndexFieldType {
    #[default]
    Categorical,
    CategoricalMultiValue,
    Range,
}

/// Definition of one indexed property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct IndexFieldConfiguration {
    pub key: String,
    #[serde(rename = "type")]
    pub kind: IndexFieldType,
    /// Slots of a categorical field, in code order
    pub values: Vec<String>,
    /// Raw values grouped under a slot label
    pub values_mapping: BTreeMap<String, Vec<String>>,
    /// Ascending thresholds of a range field
    pub thresholds: Vec<f64>,
    pub nullable: bool,
    /// Whether undeclared values fall into an ambiguous catch-all slot
    pub other: bool,
}
impl IndexFieldConfiguration {
    pub fn categorical<S: AsRef<str>>(key: &str, values: &[S]) -> Self {
        Self {
            key: key.to_string(),
            kind: IndexFieldType::Categorical,
            values: values.iter().map(|v| v.as_ref().to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn multi_value<S: AsRef<str>>(key: &str, values: &[S]) -> Self {
        Self {
            kind: IndexFieldType::CategoricalMultiValue,
            ..Self::categorical(key, values)
        }
    }

    pub fn range(key: &str, thresholds: &[f64]) -> Self {
        Self {
            key: key.to_string(),
            kind: IndexFieldType::Range,
            thresholds: thresholds.to_vec(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    #[must_use]
    pub fn with_other(mut self, other: bool) -> Self {
        self.other = other;
        self
    }

    #[must_use]
    pub fn with_mapping<S: AsRef<str>>(mut self, label: &str, values: &[S]) -> Self {
        self.values_mapping.insert(
            label.to_string(),
            values.iter().map(|v| v.as_ref().to_string()).collect(),
        );
        self
    }

    /// Builds the encoder described by this configuration
    pub fn to_field(&self) -> Result<IndexField> {
        match self.kind {
            IndexFieldType::Range => {
                Ok(RangeIndexField::new(&self.key, self.thresholds.clone(), self.nullable)?.into())
            }
            IndexFieldType::Categorical | IndexFieldType::CategoricalMultiValue => {
                if let Some(label) = self
                    .values_mapping
                    .keys()
                    .find(|label| !self.values.contains(label))
                {
                    return Err(ConfigError::InvalidField {
                        field: self.key.clone(),
                        reason: format!("mapping {label:?} is not a declared value"),
                    }
                    .into());
                }
                let kind = if self.kind == IndexFieldType::Categorical {
                    CategoricalKind::SingleValue
                } else {
                    CategoricalKind::MultiValue
                };
                let slots = self
                    .values
                    .iter()
                    .map(|label| {
                        let raw = self.values_mapping.get(label).cloned().unwrap_or_default();
                        (label.clone(), raw)
                    })
                    .collect();
                Ok(
                    CategoricalIndexField::new(&self.key, kind, slots, self.other, self.nullable)?
                        .into(),
                )
            }
        }
    }
}

/// A population of a frequency study
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Population {
    pub study: String,
    pub population: String,
}
impl Population {
    pub fn new(study: &str, population: &str) -> Self {
        Self {
            study: study.to_string(),
            population: population.to_string(),
        }
    }

    /// `study:population`, the key of the population's index field
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}:{}", self.study, self.population)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PopulationFrequencyIndexConfiguration {
    pub populations: Vec<Population>,
    pub thresholds: Vec<f64>,
}
impl Default for PopulationFrequencyIndexConfiguration {
    fn default() -> Self {
        Self {
            populations: vec![
                Population::new("1kG_phase3", "ALL"),
                Population::new("GNOMAD_GENOMES", "ALL"),
            ],
            thresholds: POPULATION_FREQUENCY_THRESHOLDS.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileIndexConfiguration {
    pub custom_fields: Vec<IndexFieldConfiguration>,
}
impl Default for FileIndexConfiguration {
    fn default() -> Self {
        Self {
            custom_fields: vec![
                IndexFieldConfiguration::categorical(KEY_FILTER, &["PASS"]).with_other(true),
                IndexFieldConfiguration::range(KEY_QUAL, &QUAL_THRESHOLDS),
                IndexFieldConfiguration::range(KEY_DEPTH, &DP_THRESHOLDS).with_nullable(true),
                IndexFieldConfiguration::categorical(KEY_TYPE, &VARIANT_TYPES),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnnotationIndexConfiguration {
    pub consequence_type: IndexFieldConfiguration,
    pub biotype: IndexFieldConfiguration,
    pub clinical_significance: IndexFieldConfiguration,
    pub clinical_source: IndexFieldConfiguration,
    pub population_frequency: PopulationFrequencyIndexConfiguration,
}
impl Default for AnnotationIndexConfiguration {
    fn default() -> Self {
        Self {
            consequence_type: IndexFieldConfiguration::multi_value(
                "consequenceType",
                &CONSEQUENCE_TYPES,
            )
            .with_other(true),
            biotype: IndexFieldConfiguration::multi_value("biotype", &BIOTYPES)
                .with_mapping("lincRNA", &LINCRNA_BIOTYPES)
                .with_mapping("other_non_pseudo_gene", &OTHER_NON_PSEUDO_GENE_BIOTYPES)
                .with_other(true),
            clinical_significance: IndexFieldConfiguration::multi_value(
                "clinicalSignificance",
                &CLINICAL_SIGNIFICANCES,
            )
            .with_other(true),
            clinical_source: IndexFieldConfiguration::multi_value(
                "clinicalSource",
                &CLINICAL_SOURCES,
            ),
            population_frequency: PopulationFrequencyIndexConfiguration::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SampleIndexConfiguration {
    pub chunk_size: u32,
    pub file_index: FileIndexConfiguration,
    pub annotation_index: AnnotationIndexConfiguration,
    /// Genotype encoding used for parent genotype codes
    pub genotype: IndexFieldConfiguration,
}
impl Default for SampleIndexConfiguration {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            file_index: FileIndexConfiguration::default(),
            annotation_index: AnnotationIndexConfiguration::default(),
            genotype: IndexFieldConfiguration::categorical("genotype", &GENOTYPES)
                .with_other(true)
                .with_nullable(true),
        }
    }
}
impl SampleIndexConfiguration {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path).map(std::io::BufReader::new)?;
        Ok(serde_json::from_reader(file)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Checks the settings that the field encoders cannot check on their own
    ///
    /// Field-level problems (duplicated values, bad thresholds, too many bits) are reported
    /// when the schema is built.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(ConfigError::InvalidChunkSize(self.chunk_size).into());
        }

        let mut seen = HashSet::new();
        for population in &self.annotation_index.population_frequency.populations {
            if !seen.insert(population.key()) {
                return Err(ConfigError::DuplicatedPopulation(population.key()).into());
            }
        }

        if self.genotype.kind != IndexFieldType::Categorical {
            return Err(ConfigError::InvalidField {
                field: self.genotype.key.clone(),
                reason: "genotype encoding must be single-valued categorical".to_string(),
            }
            .into());
        }
        let slots = self.genotype.values.len() as u64
            + u64::from(self.genotype.other)
            + u64::from(self.genotype.nullable);
        if slots > MAX_GENOTYPE_CODES {
            return Err(ConfigError::InvalidField {
                field: self.genotype.key.clone(),
                reason: format!("{slots} genotype codes do not fit in 4 bits"),
            }
            .into());
        }
        Ok(())
    }
}
