use serde::{Deserialize, Serialize};

use crate::variant::{FileAttributes, Variant, VariantAnnotation};

/// One call of a sample as read from the primary variant store
///
/// This is the input of index construction: the variant, the sample's genotype, the
/// variant annotation, the attributes of the file the call came from, and the parents'
/// genotypes at the same variant when the sample belongs to a trio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleVariantRecord {
    pub variant: Variant,
    pub genotype: String,
    #[serde(default)]
    pub annotation: VariantAnnotation,
    #[serde(default)]
    pub file: FileAttributes,
    #[serde(default)]
    pub father_genotype: Option<String>,
    #[serde(default)]
    pub mother_genotype: Option<String>,
}
impl SampleVariantRecord {
    pub fn new(variant: Variant, genotype: &str) -> Self {
        Self {
            variant,
            genotype: genotype.to_string(),
            annotation: VariantAnnotation::default(),
            file: FileAttributes::default(),
            father_genotype: None,
            mother_genotype: None,
        }
    }

    #[must_use]
    pub fn with_annotation(mut self, annotation: VariantAnnotation) -> Self {
        self.annotation = annotation;
        self
    }

    #[must_use]
    pub fn with_file(mut self, file: FileAttributes) -> Self {
        self.file = file;
        self
    }

    #[must_use]
    pub fn with_parents(mut self, father: Option<&str>, mother: Option<&str>) -> Self {
        self.father_genotype = father.map(str::to_string);
        self.mother_genotype = mother.map(str::to_string);
        self
    }

    /// Whether any parent genotype is known
    #[must_use]
    pub fn has_parents(&self) -> bool {
        self.father_genotype.is_some() || self.mother_genotype.is_some()
    }
}
