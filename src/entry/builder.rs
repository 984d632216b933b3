use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, trace};

use super::{GtEntry, MendelianBitset, SampleIndexEntry, SampleIndexVariant};
use crate::codec::DocumentWriter;
use crate::error::{EncodeError, Result};
use crate::genotype::{is_mendelian_error, Genotype};
use crate::record::SampleVariantRecord;
use crate::schema::SampleIndexSchema;
use crate::variant::Variant;

#[derive(Debug, Clone)]
struct BucketVariant {
    variant: SampleIndexVariant,
    parents: Option<u8>,
}

/// Accumulates the calls of one sample within one locus chunk
///
/// Each genotype bucket is kept sorted by (position, reference, alternate). A variant is
/// located by binary searching the first entry at its position and comparing alleles from
/// there, so distinct alleles at one position (an indel and an SNV sharing a start) are
/// separate entries while re-adding the same allele is rejected.
///
/// A builder is owned by one thread for one chunk. [`Self::build_entry`] consumes it.
#[derive(Debug, Clone)]
pub struct SampleIndexEntryBuilder {
    schema: Arc<SampleIndexSchema>,
    sample_id: u32,
    chromosome: String,
    chunk_start: u32,
    buckets: BTreeMap<String, Vec<BucketVariant>>,
    mendelian: MendelianBitset,
}
impl SampleIndexEntryBuilder {
    /// Creates an empty builder for chunk `chromosome:chunk_start` of `sample_id`
    ///
    /// # Errors
    ///
    /// Returns an [`EncodeError`] if the chromosome cannot be stored in a row key or
    /// `chunk_start` is not a multiple of the chunk size.
    pub fn new(
        schema: Arc<SampleIndexSchema>,
        sample_id: u32,
        chromosome: &str,
        chunk_start: u32,
    ) -> Result<Self> {
        Variant::check_chromosome(chromosome)?;
        if schema.chunk_start(chunk_start) != chunk_start {
            return Err(EncodeError::UnalignedChunk {
                chunk_start,
                chunk_size: schema.chunk_size(),
            }
            .into());
        }
        Ok(Self {
            schema,
            sample_id,
            chromosome: chromosome.to_string(),
            chunk_start,
            buckets: BTreeMap::new(),
            mendelian: MendelianBitset::default(),
        })
    }

    #[must_use]
    pub fn sample_id(&self) -> u32 {
        self.sample_id
    }

    #[must_use]
    pub fn chromosome(&self) -> &str {
        &self.chromosome
    }

    #[must_use]
    pub fn chunk_start(&self) -> u32 {
        self.chunk_start
    }

    /// Number of variants over every bucket
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn genotypes(&self) -> impl Iterator<Item = &str> {
        self.buckets.keys().map(String::as_str)
    }

    fn check_position(&self, variant: &Variant) -> Result<()> {
        if variant.chromosome != self.chromosome
            || self.schema.chunk_start(variant.position) != self.chunk_start
        {
            return Err(EncodeError::OutsideChunk {
                variant: variant.to_string(),
                chromosome: self.chromosome.clone(),
                chunk_start: self.chunk_start,
            }
            .into());
        }
        Ok(())
    }

    fn check_codes(&self, variant: &SampleIndexVariant) -> Result<()> {
        let checks = [
            (self.schema.file_index(), variant.file_code),
            (self.schema.annotation_index(), variant.annotation_code),
        ];
        for (index, code) in checks {
            if index.validate(code).is_err() {
                return Err(EncodeError::CodeOutOfDomain {
                    field: index.name().to_string(),
                    code,
                }
                .into());
            }
        }
        Ok(())
    }

    /// `Ok(index)` of `variant` in `bucket`, or `Err(insertion point)`
    fn locate(bucket: &[BucketVariant], variant: &Variant) -> std::result::Result<usize, usize> {
        let mut index = bucket.partition_point(|b| b.variant.variant.position < variant.position);
        while let Some(candidate) = bucket.get(index) {
            let candidate = &candidate.variant.variant;
            if candidate.position != variant.position {
                break;
            }
            match (candidate.reference.as_str(), candidate.alternate.as_str())
                .cmp(&(variant.reference.as_str(), variant.alternate.as_str()))
            {
                std::cmp::Ordering::Less => index += 1,
                std::cmp::Ordering::Equal => return Ok(index),
                std::cmp::Ordering::Greater => break,
            }
        }
        Err(index)
    }

    fn insert(&mut self, gt: &str, variant: SampleIndexVariant, parents: Option<u8>) -> Result<bool> {
        self.check_position(&variant.variant)?;
        self.check_codes(&variant)?;
        let bucket = self.buckets.entry(gt.to_string()).or_default();
        match Self::locate(bucket, &variant.variant) {
            Ok(_) => {
                trace!(gt, variant = %variant.variant, "duplicated variant ignored");
                Ok(false)
            }
            Err(index) => {
                bucket.insert(index, BucketVariant { variant, parents });
                Ok(true)
            }
        }
    }

    /// Inserts `variant` into the bucket of `gt`
    ///
    /// Returns `false`, leaving the builder unchanged, if the bucket already holds the same
    /// (position, reference, alternate).
    ///
    /// # Errors
    ///
    /// Returns an [`EncodeError`] if the variant lies outside the builder's chunk or one of
    /// its codes is outside the schema's domain.
    pub fn add(&mut self, gt: &str, variant: SampleIndexVariant) -> Result<bool> {
        self.insert(gt, variant, None)
    }

    /// Inserts `variant` with the genotypes of the sample's parents
    ///
    /// The parents' genotype codes are stored with the variant and the Mendelian error bitset
    /// is updated when the call cannot be inherited from the known parents.
    pub fn add_with_parents(
        &mut self,
        gt: &str,
        variant: SampleIndexVariant,
        father: Option<&str>,
        mother: Option<&str>,
    ) -> Result<bool> {
        let child: Genotype = gt.parse()?;
        let father_gt = father.map(str::parse::<Genotype>).transpose()?;
        let mother_gt = mother.map(str::parse::<Genotype>).transpose()?;
        let code = self.schema.encode_genotype(father)? << 4 | self.schema.encode_genotype(mother)?;

        let position = variant.variant.position;
        if !self.insert(gt, variant, Some(code))? {
            return Ok(false);
        }
        if is_mendelian_error(&child, father_gt.as_ref(), mother_gt.as_ref()) {
            self.mendelian.insert(position - self.chunk_start);
        }
        Ok(true)
    }

    /// Encodes and inserts a call read from the primary store
    ///
    /// Calls without an alternate allele (hom-ref, missing) are not indexed and return `false`.
    pub fn add_record(&mut self, record: &SampleVariantRecord) -> Result<bool> {
        let genotype: Genotype = record.genotype.parse()?;
        if !genotype.is_indexable() {
            trace!(gt = %record.genotype, variant = %record.variant, "call not indexed");
            return Ok(false);
        }
        let variant = SampleIndexVariant::new(
            record.variant.clone(),
            self.schema.encode_file(&record.variant, &record.file)?,
            self.schema.encode_annotation(&record.annotation)?,
        );
        if record.has_parents() {
            self.add_with_parents(
                &record.genotype,
                variant,
                record.father_genotype.as_deref(),
                record.mother_genotype.as_deref(),
            )
        } else {
            self.add(&record.genotype, variant)
        }
    }

    /// Whether any bucket holds the same (position, reference, alternate)
    #[must_use]
    pub fn contains_variant(&self, variant: &Variant) -> bool {
        variant.chromosome == self.chromosome
            && self
                .buckets
                .values()
                .any(|bucket| Self::locate(bucket, variant).is_ok())
    }

    /// Whether the bucket of `gt` holds the same (position, reference, alternate)
    #[must_use]
    pub fn contains(&self, gt: &str, variant: &Variant) -> bool {
        variant.chromosome == self.chromosome
            && self
                .buckets
                .get(gt)
                .is_some_and(|bucket| Self::locate(bucket, variant).is_ok())
    }

    /// Flags `position` as inconsistent with the sample's parents
    pub fn mark_mendelian_error(&mut self, position: u32) -> Result<()> {
        if self.schema.chunk_start(position) != self.chunk_start {
            return Err(EncodeError::OutsideChunk {
                variant: position.to_string(),
                chromosome: self.chromosome.clone(),
                chunk_start: self.chunk_start,
            }
            .into());
        }
        self.mendelian.insert(position - self.chunk_start);
        Ok(())
    }

    /// Encodes every bucket and returns the finished entry
    pub fn build_entry(self) -> Result<SampleIndexEntry> {
        let schema = &self.schema;
        let file_len = schema.file_index().histogram_len();
        let histogram_len = file_len + schema.annotation_index().histogram_len();

        let stored: usize = self.buckets.values().map(Vec::len).sum();
        let distinct = self
            .buckets
            .values()
            .flatten()
            .map(|item| &item.variant.variant)
            .collect::<BTreeSet<_>>()
            .len();
        let discrepancies = (stored - distinct) as u32;

        let mut gts = BTreeMap::new();
        for (genotype, bucket) in self.buckets {
            let mut writer = DocumentWriter::new();
            let mut counts = vec![0u32; histogram_len];
            let mut parents = Vec::with_capacity(bucket.len());
            let has_parents = bucket.iter().any(|b| b.parents.is_some());
            for item in &bucket {
                writer.write_document(
                    schema.variant_schema(),
                    &item.variant.document_values(self.chunk_start),
                )?;
                let (file_counts, annotation_counts) = counts.split_at_mut(file_len);
                schema.file_index().count(item.variant.file_code, file_counts);
                schema
                    .annotation_index()
                    .count(item.variant.annotation_code, annotation_counts);
                parents.push(item.parents.unwrap_or(0));
            }
            gts.insert(
                genotype.clone(),
                GtEntry {
                    genotype,
                    count: bucket.len() as u32,
                    variants: writer.finish(),
                    counts,
                    parents: has_parents.then_some(parents),
                },
            );
        }

        debug!(
            sample = self.sample_id,
            chromosome = %self.chromosome,
            chunk_start = self.chunk_start,
            genotypes = gts.len(),
            mendelian_errors = self.mendelian.len(),
            discrepancies,
            "built sample index entry"
        );
        Ok(SampleIndexEntry {
            sample_id: self.sample_id,
            chromosome: self.chromosome,
            chunk_start: self.chunk_start,
            gts,
            mendelian: self.mendelian,
            discrepancies,
        })
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::config::SampleIndexConfiguration;
    use crate::variant::VariantAnnotation;

    fn builder() -> Result<SampleIndexEntryBuilder> {
        let schema = Arc::new(SampleIndexSchema::new(SampleIndexConfiguration::default())?);
        SampleIndexEntryBuilder::new(schema, 3, "1", 10_000)
    }

    fn iv(position: u32, reference: &str, alternate: &str) -> SampleIndexVariant {
        SampleIndexVariant::new(Variant::new("1", position, reference, alternate), 0, 0)
    }

    #[test]
    fn test_dedup_idempotence() -> anyhow::Result<()> {
        let mut builder = builder()?;
        let mut rng = SmallRng::seed_from_u64(42);
        for _ in 0..500 {
            let position = rng.random_range(10_000..10_200);
            let alternate = ["C", "G", "T", "AT"][rng.random_range(0..4)];
            let variant = iv(position, "A", alternate);
            builder.add("0/1", variant.clone())?;
            let snapshot = builder.clone().build_entry()?;
            assert!(!builder.add("0/1", variant)?);
            assert_eq!(builder.clone().build_entry()?, snapshot);
        }
        Ok(())
    }

    #[test]
    fn test_duplicate_add_returns_false() -> anyhow::Result<()> {
        let mut builder = builder()?;
        assert!(builder.add("0/1", iv(10_100, "A", "T"))?);
        assert!(!builder.add("0/1", iv(10_100, "A", "T"))?);
        // same allele in another bucket is a distinct entry
        assert!(builder.add("1/1", iv(10_100, "A", "T"))?);
        assert_eq!(builder.len(), 2);

        assert!(builder.add("1/1", iv(10_200, "C", "G"))?);
        let entry = builder.build_entry()?;
        assert_eq!(entry.discrepancies(), 1);
        assert_eq!(entry.count(), 2);
        Ok(())
    }

    #[test]
    fn test_containment_symmetry() -> anyhow::Result<()> {
        let mut builder = builder()?;
        let mut rng = SmallRng::seed_from_u64(7);
        let mut added = Vec::new();
        for _ in 0..200 {
            let gt = ["0/1", "1/1", "1/2"][rng.random_range(0..3)];
            let variant = iv(rng.random_range(10_000..20_000), "G", "C");
            if builder.add(gt, variant.clone())? {
                added.push((gt, variant.variant));
            }
            for (gt, variant) in &added {
                assert!(builder.contains_variant(variant));
                assert!(builder.contains(gt, variant));
            }
        }
        assert!(!builder.contains_variant(&Variant::new("1", 10_000, "G", "A")));
        assert!(!builder.contains_variant(&Variant::new("2", 10_000, "G", "C")));
        Ok(())
    }

    #[test]
    fn test_indel_and_snv_at_same_start_are_both_kept() -> anyhow::Result<()> {
        // insertion order must not matter
        for order in [[0, 1, 2], [2, 1, 0], [1, 2, 0]] {
            let mut builder = builder()?;
            let alleles = [("A", "G"), ("A", "AGG"), ("AC", "A")];
            for i in order {
                let (reference, alternate) = alleles[i];
                assert!(builder.add("0/1", iv(10_500, reference, alternate))?);
            }
            for (reference, alternate) in alleles {
                assert!(!builder.add("0/1", iv(10_500, reference, alternate))?);
                assert!(builder.contains_variant(&Variant::new("1", 10_500, reference, alternate)));
            }
            let entry = builder.build_entry()?;
            let schema = SampleIndexSchema::new(SampleIndexConfiguration::default())?;
            let stored: Vec<String> = entry
                .gt("0/1")
                .unwrap()
                .decode_all(&schema, "1", 10_000)?
                .into_iter()
                .map(|v| v.variant.to_string())
                .collect();
            assert_eq!(stored, vec!["1:10500:A:AGG", "1:10500:A:G", "1:10500:AC:A"]);
        }
        Ok(())
    }

    #[test]
    fn test_outside_chunk() -> anyhow::Result<()> {
        let mut builder = builder()?;
        assert!(builder.add("0/1", iv(20_000, "A", "T")).is_err());
        assert!(builder.add("0/1", iv(9_999, "A", "T")).is_err());
        let other = SampleIndexVariant::new(Variant::new("2", 10_001, "A", "T"), 0, 0);
        assert!(builder.add("0/1", other).is_err());
        let bad_code = SampleIndexVariant::new(Variant::new("1", 10_001, "A", "T"), 1 << 20, 0);
        assert!(builder.add("0/1", bad_code).is_err());
        assert!(builder.is_empty());

        let schema = Arc::new(SampleIndexSchema::new(SampleIndexConfiguration::default())?);
        assert!(SampleIndexEntryBuilder::new(schema, 3, "1", 10_001).is_err());
        Ok(())
    }

    #[test]
    fn test_mendelian_flags() -> anyhow::Result<()> {
        let mut builder = builder()?;
        assert!(builder.add_with_parents("1/1", iv(10_010, "C", "T"), Some("0/0"), Some("0/0"))?);
        assert!(builder.add_with_parents("0/1", iv(10_020, "C", "T"), Some("0/0"), Some("1/1"))?);
        assert!(builder.add("0/1", iv(10_030, "C", "T"))?);
        let entry = builder.build_entry()?;
        assert!(entry.mendelian().contains(10));
        assert!(!entry.mendelian().contains(20));
        assert_eq!(entry.mendelian().len(), 1);

        let het = entry.gt("0/1").unwrap();
        let schema = SampleIndexSchema::new(SampleIndexConfiguration::default())?;
        let father = schema.encode_genotype(Some("0/0"))?;
        let mother = schema.encode_genotype(Some("1/1"))?;
        assert_eq!(het.parent_codes(0), Some((father, mother)));
        assert_eq!(het.parent_codes(1), Some((0, 0)));
        Ok(())
    }

    #[test]
    fn test_add_record_skips_reference_calls() -> anyhow::Result<()> {
        let mut builder = builder()?;
        let record = SampleVariantRecord::new(Variant::new("1", 10_001, "A", "T"), "0/0");
        assert!(!builder.add_record(&record)?);
        let record = SampleVariantRecord::new(Variant::new("1", 10_001, "A", "T"), "./.");
        assert!(!builder.add_record(&record)?);

        let record = SampleVariantRecord::new(Variant::new("1", 10_001, "A", "T"), "0/1")
            .with_annotation(VariantAnnotation {
                consequence_types: vec!["stop_gained".into()],
                ..VariantAnnotation::default()
            });
        assert!(builder.add_record(&record)?);
        assert!(!builder.add_record(&record)?);

        let entry = builder.build_entry()?;
        let het = entry.gt("0/1").unwrap();
        let schema = SampleIndexSchema::new(SampleIndexConfiguration::default())?;
        let ct = schema.annotation_index().histogram_range(0);
        let file_len = schema.file_index().histogram_len();
        // stop_gained is the sixth consequence type
        assert_eq!(het.counts()[file_len + ct.start + 5], 1);
        // one consequence type bit and one bucket per population
        assert_eq!(het.counts()[file_len..].iter().sum::<u32>(), 3);
        Ok(())
    }
}
