use std::collections::HashMap;

use auto_impl::auto_impl;
use parking_lot::RwLock;

use crate::error::Result;
use crate::record::SampleVariantRecord;
use crate::variant::{FileAttributes, Variant, VariantAnnotation};

/// A full variant as held by the primary variant store
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedVariant {
    pub variant: Variant,
    pub genotype: String,
    pub annotation: VariantAnnotation,
    pub file: FileAttributes,
}

/// Access to the primary variant store
///
/// Used to confirm matches the index can only answer approximately.
#[auto_impl(&, Box, Arc)]
pub trait VariantDecoder: Send + Sync {
    /// The call of `sample_id` at `variant`, if the store has one
    fn decode(&self, sample_id: u32, variant: &Variant) -> Result<Option<DecodedVariant>>;

    fn decode_many(
        &self,
        sample_id: u32,
        variants: &[Variant],
    ) -> Result<Vec<Option<DecodedVariant>>> {
        variants
            .iter()
            .map(|variant| self.decode(sample_id, variant))
            .collect()
    }
}

/// An in-memory [`VariantDecoder`] filled from the same records used to build the index
#[derive(Debug, Default)]
pub struct MemoryVariantStore {
    calls: RwLock<HashMap<(u32, Variant), SampleVariantRecord>>,
}
impl MemoryVariantStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, sample_id: u32, record: &SampleVariantRecord) {
        self.calls
            .write()
            .insert((sample_id, record.variant.clone()), record.clone());
    }

    pub fn len(&self) -> usize {
        self.calls.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.read().is_empty()
    }
}
impl VariantDecoder for MemoryVariantStore {
    fn decode(&self, sample_id: u32, variant: &Variant) -> Result<Option<DecodedVariant>> {
        Ok(self
            .calls
            .read()
            .get(&(sample_id, variant.clone()))
            .map(|record| DecodedVariant {
                variant: record.variant.clone(),
                genotype: record.genotype.clone(),
                annotation: record.annotation.clone(),
                file: record.file.clone(),
            }))
    }
}
