//! Description of a sample index query.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{QueryError, Result};
use crate::filter::Predicate;
use crate::policy::DecodePolicy;
use crate::variant::Region;

/// How the streams of the positive samples are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueryOperation {
    /// Variants carried by every sample
    #[default]
    And,
    /// Variants carried by any sample
    Or,
}

/// One participating sample
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleQuery {
    pub sample_id: u32,
    /// Accepted genotypes; empty accepts every indexed genotype
    #[serde(default)]
    pub genotypes: Vec<String>,
    /// Variants of a negated sample are removed from the result
    #[serde(default)]
    pub negated: bool,
    /// Only variants at positions flagged as Mendelian errors
    #[serde(default)]
    pub mendelian_only: bool,
}

/// A compiled query: samples and their genotypes, regions, and annotation predicates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SampleIndexQuery {
    pub samples: Vec<SampleQuery>,
    pub regions: Vec<Region>,
    pub predicates: Vec<Predicate>,
    pub operation: QueryOperation,
    #[serde(skip)]
    pub policy: DecodePolicy,
}
impl SampleIndexQuery {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn sample<S: AsRef<str>>(mut self, sample_id: u32, genotypes: &[S]) -> Self {
        self.samples.push(SampleQuery {
            sample_id,
            genotypes: genotypes.iter().map(|g| g.as_ref().to_string()).collect(),
            negated: false,
            mendelian_only: false,
        });
        self
    }

    #[must_use]
    pub fn negated_sample<S: AsRef<str>>(mut self, sample_id: u32, genotypes: &[S]) -> Self {
        self.samples.push(SampleQuery {
            sample_id,
            genotypes: genotypes.iter().map(|g| g.as_ref().to_string()).collect(),
            negated: true,
            mendelian_only: false,
        });
        self
    }

    /// Restricts a sample already in the query to its Mendelian errors
    ///
    /// The Mendelian bitset is indexed by position: when one allele at a position is flagged,
    /// every allele the sample carries at that position is returned.
    #[must_use]
    pub fn mendelian_errors(mut self, sample_id: u32) -> Self {
        for sample in &mut self.samples {
            if sample.sample_id == sample_id && !sample.negated {
                sample.mendelian_only = true;
            }
        }
        self
    }

    #[must_use]
    pub fn region(mut self, region: Region) -> Self {
        self.regions.push(region);
        self
    }

    #[must_use]
    pub fn predicate(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    #[must_use]
    pub fn operation(mut self, operation: QueryOperation) -> Self {
        self.operation = operation;
        self
    }

    #[must_use]
    pub fn decode_policy(mut self, policy: DecodePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn positive(&self) -> impl Iterator<Item = &SampleQuery> {
        self.samples.iter().filter(|s| !s.negated)
    }

    pub fn negated(&self) -> impl Iterator<Item = &SampleQuery> {
        self.samples.iter().filter(|s| s.negated)
    }

    /// Rejects samples that are both required and negated
    pub fn validate(&self) -> Result<()> {
        let positive: HashSet<u32> = self.positive().map(|s| s.sample_id).collect();
        if let Some(conflict) = self.negated().find(|s| positive.contains(&s.sample_id)) {
            return Err(QueryError::ConflictingSample(conflict.sample_id).into());
        }
        Ok(())
    }

    /// Regions sorted and merged so that they are disjoint and ascending
    #[must_use]
    pub fn normalized_regions(&self) -> Vec<Region> {
        let mut regions = self.regions.clone();
        regions.sort();
        let mut merged: Vec<Region> = Vec::with_capacity(regions.len());
        for region in regions {
            match merged.last_mut() {
                Some(last)
                    if last.chromosome == region.chromosome
                        && region.start <= last.end.saturating_add(1) =>
                {
                    last.end = last.end.max(region.end);
                }
                _ => merged.push(region),
            }
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() -> anyhow::Result<()> {
        let query = SampleIndexQuery::new()
            .sample(1, &["0/1", "1/1"])
            .sample(2, &["0/1"])
            .negated_sample(3, &["0/1"])
            .mendelian_errors(1)
            .mendelian_errors(3);
        query.validate()?;
        assert_eq!(query.positive().count(), 2);
        assert_eq!(query.negated().count(), 1);
        assert!(query.samples[0].mendelian_only);
        assert!(!query.samples[2].mendelian_only);

        let conflict = SampleIndexQuery::new()
            .sample(1, &["0/1"])
            .negated_sample(1, &["1/1"]);
        assert!(conflict.validate().is_err());
        Ok(())
    }

    #[test]
    fn test_normalized_regions() -> anyhow::Result<()> {
        let query = SampleIndexQuery::new()
            .region("2:100-200".parse()?)
            .region("1:500-600".parse()?)
            .region("1:100-200".parse()?)
            .region("1:150-300".parse()?)
            .region("1:301-400".parse()?);
        let regions = query.normalized_regions();
        assert_eq!(
            regions,
            vec![
                Region::new("1", 100, 400),
                Region::new("1", 500, 600),
                Region::new("2", 100, 200),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_json() -> anyhow::Result<()> {
        let query: SampleIndexQuery = serde_json::from_str(
            r#"{
                "samples": [{"sampleId": 4, "genotypes": ["0/1"]}],
                "regions": [{"chromosome": "1", "start": 1, "end": 1000}],
                "predicates": [{"type": "biotype", "values": ["protein_coding"]}],
                "operation": "OR"
            }"#,
        )?;
        assert_eq!(query.operation, QueryOperation::Or);
        assert_eq!(query.samples[0].sample_id, 4);
        assert_eq!(query.predicates, vec![Predicate::biotype(&["protein_coding"])]);
        Ok(())
    }
}
