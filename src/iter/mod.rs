//! # iter
//!
//! Pull-based variant streams over the sample index.
//!
//! Every stream yields [`Variant`]s in strictly ascending order (see the ordering documented
//! on [`Variant`]) and can be closed early, releasing any open store scan:
//!
//! * [`SingleSampleIterator`]: one sample, region scans, genotype buckets, filter chain.
//! * [`IntersectIterator`]: variants present in every input (AND).
//! * [`UnionIterator`]: variants present in any input (OR), deduplicated.
//!
//! Both merge iterators accept negated inputs whose variants are removed from the output.

mod intersect;
mod single;
mod union;

pub use intersect::IntersectIterator;
pub use single::{IteratorStats, SingleSampleIterator};
pub use union::UnionIterator;

use std::collections::VecDeque;

use crate::error::Result;
use crate::variant::Variant;

/// A closable, ascending stream of variants
pub trait VariantIterator: Iterator<Item = Result<Variant>> + Send {
    /// Releases the resources of the stream; `next` returns `None` afterwards
    fn close(&mut self);
}
impl<I: VariantIterator + ?Sized> VariantIterator for Box<I> {
    fn close(&mut self) {
        (**self).close();
    }
}

/// A stream over variants already in memory
///
/// The variants are sorted and deduplicated on construction.
#[derive(Debug, Default)]
pub struct ListIterator {
    variants: VecDeque<Variant>,
}
impl ListIterator {
    #[must_use]
    pub fn new(mut variants: Vec<Variant>) -> Self {
        variants.sort();
        variants.dedup();
        Self {
            variants: variants.into(),
        }
    }
}
impl Iterator for ListIterator {
    type Item = Result<Variant>;

    fn next(&mut self) -> Option<Self::Item> {
        self.variants.pop_front().map(Ok)
    }
}
impl VariantIterator for ListIterator {
    fn close(&mut self) {
        self.variants.clear();
    }
}

/// Removes the variants of negated streams from an ascending sequence of candidates
///
/// Each negated stream is advanced lazily, never past the latest candidate.
struct Exclusion {
    iterators: Vec<Box<dyn VariantIterator>>,
    heads: Vec<Option<Variant>>,
    exhausted: Vec<bool>,
}
impl Exclusion {
    fn new(iterators: Vec<Box<dyn VariantIterator>>) -> Self {
        let len = iterators.len();
        Self {
            iterators,
            heads: vec![None; len],
            exhausted: vec![false; len],
        }
    }

    /// Whether `candidate` appears in any negated stream
    fn excludes(&mut self, candidate: &Variant) -> Result<bool> {
        let mut excluded = false;
        for (i, iterator) in self.iterators.iter_mut().enumerate() {
            while !self.exhausted[i] && self.heads[i].as_ref().is_none_or(|h| h < candidate) {
                match iterator.next() {
                    Some(Ok(variant)) => self.heads[i] = Some(variant),
                    Some(Err(err)) => return Err(err),
                    None => {
                        self.exhausted[i] = true;
                        iterator.close();
                    }
                }
            }
            excluded |= self.heads[i].as_ref() == Some(candidate);
        }
        Ok(excluded)
    }

    fn close(&mut self) {
        for iterator in &mut self.iterators {
            iterator.close();
        }
        self.exhausted.fill(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(position: u32) -> Variant {
        Variant::new("1", position, "A", "T")
    }

    #[test]
    fn test_list_iterator() -> anyhow::Result<()> {
        let mut iter = ListIterator::new(vec![at(3), at(1), at(3), at(2)]);
        assert_eq!(iter.next().transpose()?, Some(at(1)));
        iter.close();
        assert!(iter.next().is_none());
        Ok(())
    }

    #[test]
    fn test_exclusion() -> anyhow::Result<()> {
        let mut exclusion = Exclusion::new(vec![
            Box::new(ListIterator::new(vec![at(2), at(5)])),
            Box::new(ListIterator::new(vec![at(4)])),
        ]);
        let excluded = [1, 2, 3, 4, 5, 6]
            .into_iter()
            .map(|p| exclusion.excludes(&at(p)))
            .collect::<Result<Vec<_>>>()?;
        assert_eq!(excluded, vec![false, true, false, true, true, false]);
        Ok(())
    }
}
