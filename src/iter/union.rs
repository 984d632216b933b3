use std::cmp::Reverse;
use std::collections::BinaryHeap;

use super::{Exclusion, VariantIterator};
use crate::error::Result;
use crate::variant::Variant;

/// Variants present in any input stream, deduplicated
///
/// A k-way merge over the heads of the inputs.
pub struct UnionIterator {
    iterators: Vec<Box<dyn VariantIterator>>,
    heap: BinaryHeap<Reverse<(Variant, usize)>>,
    exclusion: Exclusion,
    last: Option<Variant>,
    started: bool,
    done: bool,
}
impl UnionIterator {
    #[must_use]
    pub fn new(iterators: Vec<Box<dyn VariantIterator>>) -> Self {
        Self::with_negated(iterators, Vec::new())
    }

    #[must_use]
    pub fn with_negated(
        iterators: Vec<Box<dyn VariantIterator>>,
        negated: Vec<Box<dyn VariantIterator>>,
    ) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(iterators.len()),
            iterators,
            exclusion: Exclusion::new(negated),
            last: None,
            started: false,
            done: false,
        }
    }

    fn refill(&mut self, index: usize) -> Result<()> {
        match self.iterators[index].next() {
            Some(Ok(variant)) => self.heap.push(Reverse((variant, index))),
            Some(Err(err)) => return Err(err),
            None => self.iterators[index].close(),
        }
        Ok(())
    }

    fn next_distinct(&mut self) -> Result<Option<Variant>> {
        if !self.started {
            self.started = true;
            for index in 0..self.iterators.len() {
                self.refill(index)?;
            }
        }
        while let Some(Reverse((variant, index))) = self.heap.pop() {
            self.refill(index)?;
            if self.last.as_ref() != Some(&variant) {
                self.last = Some(variant.clone());
                return Ok(Some(variant));
            }
        }
        Ok(None)
    }
}
impl Iterator for UnionIterator {
    type Item = Result<Variant>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let result = self.next_distinct().and_then(|candidate| match candidate {
                Some(candidate) => Ok((self.exclusion.excludes(&candidate)?, Some(candidate))),
                None => Ok((false, None)),
            });
            match result {
                Ok((false, Some(candidate))) => return Some(Ok(candidate)),
                Ok((true, Some(_))) => {}
                Ok((_, None)) => {
                    self.close();
                    return None;
                }
                Err(err) => {
                    self.close();
                    return Some(Err(err));
                }
            }
        }
        None
    }
}
impl VariantIterator for UnionIterator {
    fn close(&mut self) {
        if !self.done {
            self.done = true;
            self.heap.clear();
            for iterator in &mut self.iterators {
                iterator.close();
            }
        }
        self.exclusion.close();
    }
}
