//! Genomic variants, their annotation, and per-file call attributes.
//!
//! [`Variant`] ordering is total: chromosome, then position, then reference, then
//! alternate. Every sorted stream in the crate uses this ordering, so two iterators never
//! disagree about the relative order of distinct alleles at the same position.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EncodeError, QueryError, Result};

/// Number of valid SNV allele codes: "not coded" plus one per nucleotide pair
pub const SNV_CODES: u64 = 17;

#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Variant {
    pub chromosome: String,
    pub position: u32,
    pub reference: String,
    pub alternate: String,
}
impl Variant {
    pub fn new(chromosome: &str, position: u32, reference: &str, alternate: &str) -> Self {
        Self {
            chromosome: chromosome.to_string(),
            position,
            reference: reference.to_string(),
            alternate: alternate.to_string(),
        }
    }

    #[must_use]
    pub fn variant_type(&self) -> VariantType {
        VariantType::of(self.reference.as_bytes(), self.alternate.as_bytes())
    }

    /// Whether `self` and `other` are the same genomic variant
    #[must_use]
    pub fn same_allele(&self, other: &Self) -> bool {
        self.position == other.position
            && self.reference == other.reference
            && self.alternate == other.alternate
            && self.chromosome == other.chromosome
    }

    /// Rejects chromosome names that cannot be placed in a row key
    pub fn check_chromosome(chromosome: &str) -> Result<()> {
        if chromosome.is_empty() || chromosome.bytes().any(|b| b == 0 || b == b':') {
            return Err(EncodeError::InvalidChromosome(chromosome.to_string()).into());
        }
        Ok(())
    }
}
impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buffer = itoa::Buffer::new();
        write!(
            f,
            "{}:{}:{}:{}",
            self.chromosome,
            buffer.format(self.position),
            self.reference,
            self.alternate
        )
    }
}
impl FromStr for Variant {
    type Err = crate::Error;

    /// Parses `chromosome:position:reference:alternate`; an empty allele may be written as `-`
    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        let [chromosome, position, reference, alternate] = parts[..] else {
            return Err(EncodeError::OutOfDomain {
                field: "variant".to_string(),
                value: s.to_string(),
            }
            .into());
        };
        Self::check_chromosome(chromosome)?;
        let position = position.parse().map_err(|_| EncodeError::OutOfDomain {
            field: "position".to_string(),
            value: position.to_string(),
        })?;
        let allele = |a: &str| if a == "-" { String::new() } else { a.to_string() };
        Ok(Self {
            chromosome: chromosome.to_string(),
            position,
            reference: allele(reference),
            alternate: allele(alternate),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VariantType {
    Snv,
    Mnv,
    Insertion,
    Deletion,
    Indel,
    Other,
}
impl VariantType {
    #[must_use]
    pub fn of(reference: &[u8], alternate: &[u8]) -> Self {
        let symbolic = |a: &[u8]| a.first().is_some_and(|b| *b == b'<' || *b == b'*');
        if symbolic(reference) || symbolic(alternate) {
            return Self::Other;
        }
        match (reference.len(), alternate.len()) {
            (1, 1) => Self::Snv,
            (r, a) if r == a && r > 1 => Self::Mnv,
            (r, a) if r < a && alternate.starts_with(reference) => Self::Insertion,
            (r, a) if r > a && reference.starts_with(alternate) => Self::Deletion,
            (r, a) if r != a => Self::Indel,
            _ => Self::Other,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Snv => "SNV",
            Self::Mnv => "MNV",
            Self::Insertion => "INSERTION",
            Self::Deletion => "DELETION",
            Self::Indel => "INDEL",
            Self::Other => "OTHER",
        }
    }
}
impl fmt::Display for VariantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Packs a single-nucleotide substitution into a 2-bit pair code
///
/// Returns 0 when the alleles are not a pair of `ACGT` bases, in which case the alleles
/// are stored verbatim.
#[must_use]
pub fn snv_code(reference: &str, alternate: &str) -> u64 {
    let (r, a) = (reference.as_bytes(), alternate.as_bytes());
    let is_base = |b: &[u8]| matches!(b, [b'A' | b'C' | b'G' | b'T']);
    if !is_base(r) || !is_base(a) {
        return 0;
    }
    let mut ebuf = Vec::with_capacity(1);
    match bitnuc::encode(&[r[0], a[0]], &mut ebuf) {
        Ok(_) if ebuf.len() == 1 && ebuf[0] < SNV_CODES - 1 => ebuf[0] + 1,
        _ => 0,
    }
}

/// Recovers the alleles of a non-zero SNV pair code
pub fn snv_alleles(code: u64) -> Result<(String, String)> {
    if code == 0 || code >= SNV_CODES {
        return Err(crate::error::DecodeError::InvalidCode {
            field: "snv".to_string(),
            code,
        }
        .into());
    }
    let bases = bitnuc::from_2bit_alloc(code - 1, 2)?;
    Ok((
        String::from_utf8_lossy(&bases[..1]).into_owned(),
        String::from_utf8_lossy(&bases[1..2]).into_owned(),
    ))
}

/// Alternate allele frequency of one population
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopulationFrequency {
    pub study: String,
    pub population: String,
    pub alt_allele_freq: f64,
}

/// The annotation properties covered by the annotation index
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VariantAnnotation {
    pub consequence_types: Vec<String>,
    pub biotypes: Vec<String>,
    pub population_frequencies: Vec<PopulationFrequency>,
    pub clinical_significances: Vec<String>,
    pub clinical_sources: Vec<String>,
}
impl VariantAnnotation {
    /// Frequency of `study:population`; unreported populations have frequency zero
    #[must_use]
    pub fn frequency(&self, study: &str, population: &str) -> f64 {
        self.population_frequencies
            .iter()
            .find(|p| p.study == study && p.population == population)
            .map_or(0.0, |p| p.alt_allele_freq)
    }
}

/// Per-file attributes of one sample's call
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileAttributes {
    pub filter: Option<String>,
    pub qual: Option<f64>,
    /// Other FILE and FORMAT attributes by key, such as `DP`
    pub attributes: BTreeMap<String, String>,
}
impl FileAttributes {
    #[must_use]
    pub fn numeric(&self, key: &str) -> Option<f64> {
        match key {
            crate::config::KEY_QUAL => self.qual,
            _ => self.attributes.get(key).and_then(|v| v.parse().ok()),
        }
    }

    #[must_use]
    pub fn text(&self, key: &str) -> Option<&str> {
        match key {
            crate::config::KEY_FILTER => self.filter.as_deref(),
            _ => self.attributes.get(key).map(String::as_str),
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, key: &str, value: &str) -> Self {
        self.attributes.insert(key.to_string(), value.to_string());
        self
    }
}

/// An inclusive, 1-based locus range on one chromosome
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Region {
    pub chromosome: String,
    pub start: u32,
    pub end: u32,
}
impl Region {
    pub fn new(chromosome: &str, start: u32, end: u32) -> Self {
        Self {
            chromosome: chromosome.to_string(),
            start,
            end,
        }
    }

    /// The whole chromosome
    pub fn chromosome(chromosome: &str) -> Self {
        Self::new(chromosome, 0, u32::MAX)
    }

    #[must_use]
    pub fn contains(&self, variant: &Variant) -> bool {
        variant.chromosome == self.chromosome
            && variant.position >= self.start
            && variant.position <= self.end
    }
}
impl FromStr for Region {
    type Err = crate::Error;

    /// Parses `chr`, `chr:position` or `chr:start-end`
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || QueryError::InvalidRegion(s.to_string());
        let Some((chromosome, range)) = s.split_once(':') else {
            Variant::check_chromosome(s).map_err(|_| invalid())?;
            return Ok(Self::chromosome(s));
        };
        Variant::check_chromosome(chromosome).map_err(|_| invalid())?;
        let parse = |v: &str| v.replace(',', "").parse::<u32>().map_err(|_| invalid());
        let (start, end) = match range.split_once('-') {
            Some((start, end)) => (parse(start)?, parse(end)?),
            None => {
                let position = parse(range)?;
                (position, position)
            }
        };
        if start > end {
            return Err(invalid().into());
        }
        Ok(Self::new(chromosome, start, end))
    }
}
impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.chromosome, self.start, self.end)
    }
}
