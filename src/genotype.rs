//! Genotype calls and Mendelian inheritance checks.

use std::fmt;
use std::str::FromStr;

use crate::error::{EncodeError, Result};

/// A parsed genotype call such as `0/1`, `1|0`, `./.` or the haploid `1`
///
/// Missing alleles are `None`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Genotype {
    alleles: Vec<Option<u8>>,
    phased: bool,
}
impl Genotype {
    #[must_use]
    pub fn alleles(&self) -> &[Option<u8>] {
        &self.alleles
    }

    #[must_use]
    pub fn is_phased(&self) -> bool {
        self.phased
    }

    #[must_use]
    pub fn is_missing(&self) -> bool {
        self.alleles.iter().all(Option::is_none)
    }

    /// Whether the call carries at least one alternate allele
    ///
    /// Only these calls are stored in the sample index; reference and missing calls are not.
    #[must_use]
    pub fn is_indexable(&self) -> bool {
        self.alleles.iter().any(|a| a.is_some_and(|a| a > 0))
    }

    fn has_allele(&self, allele: u8) -> bool {
        self.alleles.contains(&Some(allele))
    }
}
impl FromStr for Genotype {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || EncodeError::InvalidGenotype(s.to_string());
        if s.is_empty() || (s.contains('/') && s.contains('|')) {
            return Err(invalid().into());
        }
        let phased = s.contains('|');
        let alleles = s
            .split(['/', '|'])
            .map(|a| match a {
                "." => Ok(None),
                a => a.parse::<u8>().map(Some).map_err(|_| invalid()),
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { alleles, phased })
    }
}
impl fmt::Display for Genotype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let separator = if self.phased { '|' } else { '/' };
        for (i, allele) in self.alleles.iter().enumerate() {
            if i > 0 {
                write!(f, "{separator}")?;
            }
            match allele {
                Some(a) => write!(f, "{a}")?,
                None => f.write_str(".")?,
            }
        }
        Ok(())
    }
}

/// Whether a child's call cannot be inherited from its parents' calls
///
/// Each child allele must come from a distinct parent. An unknown or missing parent and
/// missing child alleles never constrain the check, so without parents no call is an error.
#[must_use]
pub fn is_mendelian_error(
    child: &Genotype,
    father: Option<&Genotype>,
    mother: Option<&Genotype>,
) -> bool {
    fn known(parent: Option<&Genotype>) -> Option<&Genotype> {
        parent.filter(|p| !p.is_missing())
    }
    let (father, mother) = (known(father), known(mother));
    if child.is_missing() || (father.is_none() && mother.is_none()) {
        return false;
    }
    let from = |parent: Option<&Genotype>, allele: Option<u8>| match (parent, allele) {
        (None, _) | (_, None) => true,
        (Some(parent), Some(allele)) => parent.has_allele(allele),
    };

    match child.alleles() {
        [allele] => !(from(father, *allele) || from(mother, *allele)),
        [first, second] => {
            let direct = from(father, *first) && from(mother, *second);
            let swapped = from(father, *second) && from(mother, *first);
            !(direct || swapped)
        }
        _ => false,
    }
}
