use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, trace};

use super::VariantIterator;
use crate::entry::SampleIndexEntry;
use crate::error::{QueryError, Result};
use crate::filter::{FilterChain, Match};
use crate::key::KeyRange;
use crate::policy::DecodePolicy;
use crate::query::SampleQuery;
use crate::schema::SampleIndexSchema;
use crate::store::{KeyValueStore, Row, RowScanner, VariantDecoder};
use crate::variant::{Region, Variant};

/// Counters of one single-sample scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IteratorStats {
    pub chunks: usize,
    pub skipped_chunks: usize,
    pub pruned_buckets: usize,
    pub exact: usize,
    pub approximate: usize,
    pub confirmed: usize,
}

/// Ascending stream of the variants of one sample matching its genotypes and a filter chain
///
/// Regions are scanned in order, one store scan at a time. Variants matched exactly by the
/// chain are emitted directly; approximate matches are confirmed in batches of one chunk
/// through the [`VariantDecoder`]. Without a decoder an approximate match fails the scan with
/// [`QueryError::UnconfirmedPredicates`], unless unconfirmed matches were allowed with
/// [`SingleSampleIterator::with_approximate`].
///
/// A sample restricted to Mendelian errors keeps every allele at a flagged position: the
/// bitset is indexed by position, not by allele.
pub struct SingleSampleIterator {
    store: Arc<dyn KeyValueStore>,
    schema: Arc<SampleIndexSchema>,
    chain: Arc<FilterChain>,
    decoder: Option<Arc<dyn VariantDecoder>>,
    approximate: bool,
    sample: SampleQuery,
    policy: DecodePolicy,
    ranges: VecDeque<(KeyRange, Option<Region>)>,
    scanner: Option<(Box<dyn RowScanner>, Option<Region>)>,
    buffer: VecDeque<Variant>,
    last: Option<Variant>,
    stats: IteratorStats,
    closed: bool,
}
impl SingleSampleIterator {
    /// Creates the iterator; `regions` must be disjoint and ascending, and an empty list
    /// scans the whole sample
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        schema: Arc<SampleIndexSchema>,
        chain: Arc<FilterChain>,
        sample: SampleQuery,
        regions: &[Region],
    ) -> Result<Self> {
        let ranges = if regions.is_empty() {
            VecDeque::from([(KeyRange::sample(sample.sample_id), None)])
        } else {
            regions
                .iter()
                .map(|region| {
                    KeyRange::region(sample.sample_id, region, schema.chunk_size())
                        .map(|range| (range, Some(region.clone())))
                })
                .collect::<Result<VecDeque<_>>>()?
        };
        let closed = chain.none_valid();
        if closed {
            debug!(sample = sample.sample_id, "filter chain matches nothing");
        }
        Ok(Self {
            store,
            schema,
            chain,
            decoder: None,
            approximate: false,
            sample,
            policy: DecodePolicy::default(),
            ranges,
            scanner: None,
            buffer: VecDeque::new(),
            last: None,
            stats: IteratorStats::default(),
            closed,
        })
    }

    #[must_use]
    pub fn with_decoder(mut self, decoder: Arc<dyn VariantDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    /// Emits approximate matches unconfirmed when no decoder is configured
    #[must_use]
    pub fn with_approximate(mut self, allow: bool) -> Self {
        self.approximate = allow;
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: DecodePolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn sample_id(&self) -> u32 {
        self.sample.sample_id
    }

    #[must_use]
    pub fn stats(&self) -> IteratorStats {
        self.stats
    }

    fn accepts(&self, genotype: &str) -> bool {
        self.sample.genotypes.is_empty() || self.sample.genotypes.iter().any(|g| g == genotype)
    }

    /// Matching variants of one row, in ascending order
    fn process(&mut self, key: &[u8], row: &Row, region: Option<&Region>) -> Result<Vec<Variant>> {
        let entry = SampleIndexEntry::from_row(key, row, &self.schema)?;
        let chunk_start = entry.chunk_start();
        let mut exact = Vec::new();
        let mut approximate = Vec::new();

        for gt in entry.gts() {
            if !self.accepts(gt.genotype()) {
                continue;
            }
            if !self.chain.is_empty() && !self.chain.may_contain(gt.counts()) {
                self.stats.pruned_buckets += 1;
                trace!(chunk = chunk_start, genotype = gt.genotype(), "pruned bucket");
                continue;
            }
            for document in gt.documents(&self.schema)? {
                if self.sample.mendelian_only
                    && !entry.mendelian().contains(document.offset()?)
                {
                    continue;
                }
                let matched = if self.chain.is_empty() {
                    Match::Exact
                } else {
                    self.chain
                        .test(document.file_code()?, document.annotation_code()?)
                };
                if matched == Match::None {
                    continue;
                }
                let variant = document.to_variant(entry.chromosome(), chunk_start)?;
                if region.is_some_and(|r| !r.contains(&variant)) {
                    continue;
                }
                match matched {
                    Match::Exact => exact.push(variant),
                    _ => approximate.push(variant),
                }
            }
        }

        self.stats.exact += exact.len();
        self.stats.approximate += approximate.len();
        if !approximate.is_empty() {
            if self.decoder.is_none() && !self.approximate {
                return Err(QueryError::UnconfirmedPredicates.into());
            }
            if let Some(decoder) = &self.decoder {
                let decoded = decoder.decode_many(self.sample.sample_id, &approximate)?;
                let before = approximate.len();
                approximate = approximate
                    .into_iter()
                    .zip(decoded)
                    .filter(|(_, full)| full.as_ref().is_some_and(|d| self.chain.confirm(d)))
                    .map(|(variant, _)| variant)
                    .collect();
                self.stats.confirmed += approximate.len();
                debug!(
                    chunk = chunk_start,
                    candidates = before,
                    confirmed = approximate.len(),
                    "confirmed approximate matches"
                );
            }
            exact.append(&mut approximate);
        }
        exact.sort();
        exact.dedup();
        Ok(exact)
    }

    /// Pulls one row from the current scan, opening the next one when needed
    ///
    /// Returns `Ok(false)` once every range is exhausted.
    fn advance(&mut self) -> Result<bool> {
        loop {
            if self.scanner.is_none() {
                let Some((range, region)) = self.ranges.pop_front() else {
                    return Ok(false);
                };
                self.scanner = Some((self.store.scan(&range)?, region));
            }
            let Some((scanner, region)) = &mut self.scanner else {
                continue;
            };
            match scanner.next() {
                None => {
                    scanner.close();
                    self.scanner = None;
                }
                Some(Err(err)) => return Err(err),
                Some(Ok((key, row))) => {
                    let region = region.clone();
                    self.stats.chunks += 1;
                    match self.process(&key, &row, region.as_ref()) {
                        Ok(variants) => {
                            let last = self.last.clone();
                            self.buffer.extend(
                                variants
                                    .into_iter()
                                    .filter(|v| last.as_ref().is_none_or(|l| v > l)),
                            );
                        }
                        Err(err) => {
                            self.policy.handle(&key, err)?;
                            self.stats.skipped_chunks += 1;
                        }
                    }
                    return Ok(true);
                }
            }
        }
    }
}
impl Iterator for SingleSampleIterator {
    type Item = Result<Variant>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.closed {
                return None;
            }
            if let Some(variant) = self.buffer.pop_front() {
                self.last = Some(variant.clone());
                return Some(Ok(variant));
            }
            match self.advance() {
                Ok(true) => {}
                Ok(false) => self.close(),
                Err(err) => {
                    self.close();
                    return Some(Err(err));
                }
            }
        }
    }
}
impl VariantIterator for SingleSampleIterator {
    fn close(&mut self) {
        if let Some((mut scanner, _)) = self.scanner.take() {
            scanner.close();
        }
        if !self.closed {
            debug!(sample = self.sample.sample_id, stats = ?self.stats, "closed sample iterator");
        }
        self.ranges.clear();
        self.buffer.clear();
        self.closed = true;
    }
}
