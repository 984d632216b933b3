use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info};

use crate::entry::{GtEntry, SampleIndexEntry, SampleIndexEntryBuilder};
use crate::error::{QueryError, Result};
use crate::filter::FilterChain;
use crate::genotype::Genotype;
use crate::iter::{
    IntersectIterator, ListIterator, SingleSampleIterator, UnionIterator, VariantIterator,
};
use crate::key::{KeyRange, RowKey};
use crate::policy::DecodePolicy;
use crate::query::{QueryOperation, SampleIndexQuery, SampleQuery};
use crate::schema::SampleIndexSchema;
use crate::store::{KeyValueStore, MetadataResolver, VariantDecoder};
use crate::variant::Region;

/// Entry point to a sample genotype index held in a [`KeyValueStore`]
///
/// Cloning is cheap; clones share the store, schema and collaborators.
#[derive(Clone)]
pub struct SampleIndex {
    store: Arc<dyn KeyValueStore>,
    schema: Arc<SampleIndexSchema>,
    metadata: Arc<dyn MetadataResolver>,
    decoder: Option<Arc<dyn VariantDecoder>>,
    allow_approximate: bool,
}
impl SampleIndex {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        schema: Arc<SampleIndexSchema>,
        metadata: Arc<dyn MetadataResolver>,
    ) -> Self {
        Self {
            store,
            schema,
            metadata,
            decoder: None,
            allow_approximate: false,
        }
    }

    /// Confirms approximate matches through `decoder`
    #[must_use]
    pub fn with_decoder(mut self, decoder: Arc<dyn VariantDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    /// Returns approximate matches unconfirmed when no decoder is configured
    ///
    /// Off by default: without a decoder, a query whose predicates are not exact is rejected
    /// with [`QueryError::UnconfirmedPredicates`].
    #[must_use]
    pub fn allow_approximate(mut self, allow: bool) -> Self {
        self.allow_approximate = allow;
        self
    }

    #[must_use]
    pub fn schema(&self) -> &Arc<SampleIndexSchema> {
        &self.schema
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    #[must_use]
    pub fn metadata(&self) -> &Arc<dyn MetadataResolver> {
        &self.metadata
    }

    pub fn sample_id(&self, name: &str) -> Result<u32> {
        self.metadata.sample_id(name)
    }

    /// An empty builder for one chunk of `sample_id`
    pub fn builder(
        &self,
        sample_id: u32,
        chromosome: &str,
        chunk_start: u32,
    ) -> Result<SampleIndexEntryBuilder> {
        SampleIndexEntryBuilder::new(Arc::clone(&self.schema), sample_id, chromosome, chunk_start)
    }

    /// Stores an entry, replacing the whole chunk row
    pub fn write_entry(&self, entry: &SampleIndexEntry) -> Result<()> {
        self.store.put(&entry.key()?.to_bytes(), entry.to_row())
    }

    pub fn read_entry(
        &self,
        sample_id: u32,
        chromosome: &str,
        chunk_start: u32,
    ) -> Result<Option<SampleIndexEntry>> {
        let key = RowKey::new(sample_id, chromosome, chunk_start)?.to_bytes();
        self.store
            .get(&key)?
            .map(|row| SampleIndexEntry::from_row(&key, &row, &self.schema))
            .transpose()
    }

    fn sample_iterator(
        &self,
        sample: &SampleQuery,
        regions: &[Region],
        chain: &Arc<FilterChain>,
        policy: DecodePolicy,
    ) -> Result<Box<dyn VariantIterator>> {
        let mut iterator = SingleSampleIterator::new(
            Arc::clone(&self.store),
            Arc::clone(&self.schema),
            Arc::clone(chain),
            sample.clone(),
            regions,
        )?
        .with_policy(policy)
        .with_approximate(self.allow_approximate);
        if let Some(decoder) = &self.decoder {
            iterator = iterator.with_decoder(Arc::clone(decoder));
        }
        Ok(Box::new(iterator))
    }

    /// Opens the stream of variants answering `query`
    ///
    /// Negated samples exclude every variant they carry with one of their genotypes; the
    /// annotation predicates only constrain the positive samples.
    ///
    /// # Errors
    ///
    /// Fails with [`QueryError::UnconfirmedPredicates`] when the predicates are approximate,
    /// no decoder is configured and approximate results were not allowed.
    pub fn iterator(&self, query: &SampleIndexQuery) -> Result<Box<dyn VariantIterator>> {
        query.validate()?;
        let chain = Arc::new(FilterChain::compile(&self.schema, &query.predicates)?);
        if !chain.is_exact() && self.decoder.is_none() && !self.allow_approximate {
            return Err(QueryError::UnconfirmedPredicates.into());
        }
        let unfiltered = Arc::new(FilterChain::new());
        let regions = query.normalized_regions();

        let positive = query
            .positive()
            .map(|s| self.sample_iterator(s, &regions, &chain, query.policy))
            .collect::<Result<Vec<_>>>()?;
        let negated = query
            .negated()
            .map(|s| self.sample_iterator(s, &regions, &unfiltered, query.policy))
            .collect::<Result<Vec<_>>>()?;

        info!(
            operation = ?query.operation,
            samples = positive.len(),
            negated = negated.len(),
            regions = regions.len(),
            exact = chain.is_exact(),
            "sample index query"
        );
        Ok(match (positive.len(), query.operation) {
            (0, _) => Box::new(ListIterator::default()),
            (1, _) if negated.is_empty() => match positive.into_iter().next() {
                Some(single) => single,
                None => Box::new(ListIterator::default()),
            },
            (_, QueryOperation::And) => {
                Box::new(IntersectIterator::with_negated(positive, negated))
            }
            (_, QueryOperation::Or) => Box::new(UnionIterator::with_negated(positive, negated)),
        })
    }

    /// Number of variants answering `query`
    ///
    /// A single sample without predicates, regions, negations or Mendelian restriction is
    /// counted from the stored bucket sizes; any other query is iterated.
    pub fn count(&self, query: &SampleIndexQuery) -> Result<u64> {
        query.validate()?;
        let samples: Vec<&SampleQuery> = query.positive().collect();
        if let [sample] = samples[..] {
            if query.predicates.is_empty()
                && query.regions.is_empty()
                && query.negated().next().is_none()
                && !sample.mendelian_only
            {
                return self.count_buckets(sample, query.policy);
            }
        }
        let mut count = 0;
        for variant in self.iterator(query)? {
            variant?;
            count += 1;
        }
        Ok(count)
    }

    fn count_buckets(&self, sample: &SampleQuery, policy: DecodePolicy) -> Result<u64> {
        let mut total = 0u64;
        let mut chunks = 0usize;
        let mut scanner = self.store.scan(&KeyRange::sample(sample.sample_id))?;
        for row in scanner.by_ref() {
            let (key, row) = row?;
            let counted = SampleIndexEntry::from_row(&key, &row, &self.schema)
                .and_then(|entry| self.entry_count(&entry, sample));
            match counted {
                Ok(count) => {
                    chunks += 1;
                    total += count;
                }
                Err(err) => policy.handle(&key, err)?,
            }
        }
        scanner.close();
        debug!(sample = sample.sample_id, chunks, total, "counted from bucket sizes");
        Ok(total)
    }

    /// Distinct variants of `entry` within the genotypes of `sample`
    ///
    /// Bucket sizes are summed unless a variant may sit in more than one of the selected
    /// buckets, in which case the selected buckets are decoded.
    fn entry_count(&self, entry: &SampleIndexEntry, sample: &SampleQuery) -> Result<u64> {
        let selected: Vec<&GtEntry> = entry
            .gts()
            .filter(|gt| {
                sample.genotypes.is_empty() || sample.genotypes.iter().any(|g| g == gt.genotype())
            })
            .collect();
        if selected.len() < 2 || entry.discrepancies() == 0 {
            return Ok(selected.iter().map(|gt| u64::from(gt.count())).sum());
        }
        if selected.len() == entry.gts().count() {
            return Ok(entry.count());
        }
        let mut distinct = BTreeSet::new();
        for gt in selected {
            for document in gt.documents(&self.schema)? {
                distinct.insert(document.to_variant(entry.chromosome(), entry.chunk_start())?);
            }
        }
        Ok(distinct.len() as u64)
    }

    /// Query over a child and its registered parents
    ///
    /// Each parent is left unconstrained (`None`), required to carry one of the given
    /// genotypes, or, when only reference or missing genotypes are given, required to carry
    /// no indexed call at the variant.
    pub fn family_query<S: AsRef<str>>(
        &self,
        child: &str,
        child_genotypes: &[S],
        father_genotypes: Option<&[S]>,
        mother_genotypes: Option<&[S]>,
    ) -> Result<SampleIndexQuery> {
        let child_id = self.metadata.sample_id(child)?;
        let (father, mother) = self.metadata.parents(child_id)?;
        if father.is_none() && mother.is_none() {
            return Err(QueryError::MissingParents(child.to_string()).into());
        }

        let mut query = SampleIndexQuery::new().sample(child_id, child_genotypes);
        for (parent, genotypes) in [(father, father_genotypes), (mother, mother_genotypes)] {
            let Some(genotypes) = genotypes else {
                continue;
            };
            let Some(parent) = parent else {
                return Err(QueryError::MissingParents(child.to_string()).into());
            };
            let mut alternate = Vec::new();
            let mut reference = false;
            for genotype in genotypes {
                let parsed: Genotype = genotype.as_ref().parse()?;
                if parsed.is_indexable() {
                    alternate.push(genotype.as_ref().to_string());
                } else {
                    reference = true;
                }
            }
            query = match (reference, alternate.is_empty()) {
                (false, _) => query.sample(parent, &alternate),
                (true, true) => query.negated_sample::<&str>(parent, &[]),
                (true, false) => {
                    return Err(QueryError::InvalidPredicate(format!(
                        "parent {parent} mixes reference and alternate genotypes"
                    ))
                    .into())
                }
            };
        }
        Ok(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SampleIndexConfiguration;
    use crate::filter::{Predicate, RangeOp};
    use crate::record::SampleVariantRecord;
    use crate::store::{MemoryStore, MemoryVariantStore, SampleRegistry};
    use crate::variant::{FileAttributes, Variant, VariantAnnotation};
    use crate::Error;

    struct Cohort {
        index: SampleIndex,
        registry: SampleRegistry,
    }

    fn call(position: u32, alternate: &str, genotype: &str, ct: &str) -> SampleVariantRecord {
        SampleVariantRecord::new(Variant::new("1", position, "A", alternate), genotype)
            .with_annotation(VariantAnnotation {
                consequence_types: vec![ct.to_string()],
                ..VariantAnnotation::default()
            })
    }

    fn cohort(samples: &[(&str, Vec<SampleVariantRecord>)]) -> anyhow::Result<Cohort> {
        let config = SampleIndexConfiguration {
            chunk_size: 1000,
            ..SampleIndexConfiguration::default()
        };
        let schema = Arc::new(SampleIndexSchema::new(config)?);
        let mut registry = SampleRegistry::new();
        registry.register_trio("child", Some("father"), Some("mother"));
        let decoder = Arc::new(MemoryVariantStore::new());
        let index_store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let index = SampleIndex::new(index_store, schema, Arc::new(registry.clone()))
            .with_decoder(decoder.clone());

        for (name, records) in samples {
            let sample_id = registry.register(name);
            let mut builders = std::collections::BTreeMap::new();
            for record in records {
                let chunk = index.schema().chunk_start(record.variant.position);
                if !builders.contains_key(&chunk) {
                    builders.insert(chunk, index.builder(sample_id, "1", chunk)?);
                }
                if let Some(builder) = builders.get_mut(&chunk) {
                    builder.add_record(record)?;
                }
                decoder.insert(sample_id, record);
            }
            for builder in builders.into_values() {
                index.write_entry(&builder.build_entry()?)?;
            }
        }
        Ok(Cohort { index, registry })
    }

    fn positions(iter: Box<dyn VariantIterator>) -> anyhow::Result<Vec<u32>> {
        Ok(iter.map(|v| v.map(|v| v.position)).collect::<Result<Vec<_>>>()?)
    }

    #[test]
    fn test_two_sample_and() -> anyhow::Result<()> {
        let cohort = cohort(&[
            ("S1", [100, 200, 300].map(|p| call(p, "T", "0/1", "intron_variant")).to_vec()),
            ("S2", [150, 200, 300, 400].map(|p| call(p, "T", "0/1", "intron_variant")).to_vec()),
        ])?;
        let s1 = cohort.registry.sample_id("S1")?;
        let s2 = cohort.registry.sample_id("S2")?;
        let query = SampleIndexQuery::new()
            .sample(s1, &["0/1"])
            .sample(s2, &["0/1"]);
        assert_eq!(positions(cohort.index.iterator(&query)?)?, vec![200, 300]);
        assert_eq!(cohort.index.count(&query)?, 2);

        let union = query.clone().operation(QueryOperation::Or);
        assert_eq!(positions(cohort.index.iterator(&union)?)?, vec![100, 150, 200, 300, 400]);

        let minus = SampleIndexQuery::new()
            .sample(s2, &["0/1"])
            .negated_sample(s1, &["0/1"]);
        assert_eq!(positions(cohort.index.iterator(&minus)?)?, vec![150, 400]);
        assert!(cohort.index.iterator(&SampleIndexQuery::new())?.next().is_none());
        Ok(())
    }

    #[test]
    fn test_count_fast_path() -> anyhow::Result<()> {
        let cohort = cohort(&[(
            "S1",
            vec![
                call(100, "T", "0/1", "intron_variant"),
                call(1500, "T", "1/1", "missense_variant"),
                call(2500, "G", "0/1", "missense_variant"),
                call(2600, "G", "0/0", "missense_variant"),
            ],
        )])?;
        let s1 = cohort.registry.sample_id("S1")?;
        assert_eq!(cohort.index.count(&SampleIndexQuery::new().sample::<&str>(s1, &[]))?, 3);
        assert_eq!(cohort.index.count(&SampleIndexQuery::new().sample(s1, &["0/1"]))?, 2);
        let filtered = SampleIndexQuery::new()
            .sample(s1, &["0/1", "1/1"])
            .predicate(Predicate::consequence_type(&["missense_variant"]));
        assert_eq!(cohort.index.count(&filtered)?, 2);

        let entry = cohort.index.read_entry(s1, "1", 2000)?;
        assert_eq!(entry.map(|e| e.count()), Some(1));
        assert!(cohort.index.read_entry(s1, "1", 9000)?.is_none());
        Ok(())
    }

    #[test]
    fn test_count_allele_in_two_buckets() -> anyhow::Result<()> {
        let cohort = cohort(&[(
            "S1",
            vec![
                call(100, "T", "0/1", "intron_variant"),
                call(100, "T", "1/1", "intron_variant"),
                call(200, "G", "1/1", "intron_variant"),
                call(300, "C", "1/2", "intron_variant"),
            ],
        )])?;
        let s1 = cohort.registry.sample_id("S1")?;
        let entry = cohort.index.read_entry(s1, "1", 0)?;
        assert_eq!(entry.as_ref().map(SampleIndexEntry::discrepancies), Some(1));
        assert_eq!(entry.map(|e| e.count()), Some(3));

        for genotypes in [&[][..], &["0/1", "1/1"][..], &["0/1", "1/2"][..], &["1/1"][..]] {
            let query = SampleIndexQuery::new().sample(s1, genotypes);
            let iterated = positions(cohort.index.iterator(&query)?)?;
            assert_eq!(cohort.index.count(&query)?, iterated.len() as u64);
        }
        let het_or_hom = SampleIndexQuery::new().sample(s1, &["0/1", "1/1"]);
        assert_eq!(cohort.index.count(&het_or_hom)?, 2);
        Ok(())
    }

    #[test]
    fn test_approximate_predicates_need_a_decoder() -> anyhow::Result<()> {
        let with_qual = |position: u32, qual: f64| {
            call(position, "T", "0/1", "missense_variant").with_file(FileAttributes {
                qual: Some(qual),
                ..FileAttributes::default()
            })
        };
        let cohort = cohort(&[("S1", vec![with_qual(100, 25.0), with_qual(200, 40.0)])])?;
        let s1 = cohort.registry.sample_id("S1")?;
        let confident = SampleIndexQuery::new()
            .sample::<&str>(s1, &[])
            .predicate(Predicate::qual(RangeOp::Ge, 27.0));
        assert_eq!(positions(cohort.index.iterator(&confident)?)?, vec![200]);

        let index = &cohort.index;
        let undecoded = SampleIndex::new(
            Arc::clone(index.store()),
            Arc::clone(index.schema()),
            Arc::clone(index.metadata()),
        );
        assert!(matches!(
            undecoded.iterator(&confident),
            Err(Error::QueryError(QueryError::UnconfirmedPredicates))
        ));
        assert!(undecoded.count(&confident).is_err());

        // consequence types have one code each, so no confirmation is needed
        let missense = SampleIndexQuery::new()
            .sample::<&str>(s1, &[])
            .predicate(Predicate::consequence_type(&["missense_variant"]));
        assert_eq!(undecoded.count(&missense)?, 2);

        let superset = undecoded.allow_approximate(true);
        assert_eq!(positions(superset.iterator(&confident)?)?, vec![100, 200]);
        Ok(())
    }

    #[test]
    fn test_family_query() -> anyhow::Result<()> {
        let with_parents = |father: &str, mother: &str| {
            let mut record = call(500, "T", "0/1", "missense_variant");
            record = record.with_parents(Some(father), Some(mother));
            record
        };
        let cohort = cohort(&[
            (
                "child",
                vec![
                    with_parents("0/1", "0/0"),
                    call(600, "T", "0/1", "missense_variant").with_parents(Some("0/0"), Some("0/0")),
                    call(700, "T", "1/1", "missense_variant"),
                ],
            ),
            ("father", vec![call(500, "T", "0/1", "missense_variant")]),
            ("mother", vec![call(700, "T", "0/1", "missense_variant")]),
        ])?;

        // de novo: child carries it, neither parent does
        let de_novo = cohort.index.family_query(
            "child",
            &["0/1"],
            Some(&["0/0"][..]),
            Some(&["0/0"][..]),
        )?;
        assert_eq!(positions(cohort.index.iterator(&de_novo)?)?, vec![600]);

        // inherited from the father
        let paternal =
            cohort
                .index
                .family_query("child", &["0/1"], Some(&["0/1"][..]), None)?;
        assert_eq!(positions(cohort.index.iterator(&paternal)?)?, vec![500]);

        let child = cohort.registry.sample_id("child")?;
        let mendelian = SampleIndexQuery::new()
            .sample::<&str>(child, &[])
            .mendelian_errors(child);
        assert_eq!(positions(cohort.index.iterator(&mendelian)?)?, vec![600]);
        assert_eq!(cohort.index.count(&mendelian)?, 1);

        assert!(cohort
            .index
            .family_query("father", &["0/1"], Some(&["0/1"][..]), None)
            .is_err());
        assert!(cohort
            .index
            .family_query("child", &["0/1"], Some(&["0/0", "0/1"][..]), None)
            .is_err());
        Ok(())
    }
}
