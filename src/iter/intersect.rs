use std::cmp::Ordering;

use tracing::trace;

use super::{Exclusion, VariantIterator};
use crate::error::Result;
use crate::variant::Variant;

/// Variants present in every input stream
///
/// Inputs are advanced round-robin: the current target is replaced whenever an input
/// overshoots it, and emitted once every input has produced it. No intermediate set is
/// materialized and each input is read once.
///
/// The iterator stops at the first exhausted input and closes every input.
pub struct IntersectIterator {
    iterators: Vec<Box<dyn VariantIterator>>,
    exclusion: Exclusion,
    done: bool,
}
impl IntersectIterator {
    #[must_use]
    pub fn new(iterators: Vec<Box<dyn VariantIterator>>) -> Self {
        Self::with_negated(iterators, Vec::new())
    }

    /// Intersection of `iterators` minus the variants of `negated`
    #[must_use]
    pub fn with_negated(
        iterators: Vec<Box<dyn VariantIterator>>,
        negated: Vec<Box<dyn VariantIterator>>,
    ) -> Self {
        let done = iterators.is_empty();
        Self {
            iterators,
            exclusion: Exclusion::new(negated),
            done,
        }
    }

    fn pull(&mut self, index: usize) -> Result<Option<Variant>> {
        match self.iterators[index].next() {
            Some(Ok(variant)) => Ok(Some(variant)),
            Some(Err(err)) => Err(err),
            None => Ok(None),
        }
    }

    /// Next variant shared by all inputs, before exclusion
    fn next_match(&mut self) -> Result<Option<Variant>> {
        let n = self.iterators.len();
        let Some(mut target) = self.pull(0)? else {
            return Ok(None);
        };
        let mut matches = 1;
        let mut index = 1 % n;
        while matches < n {
            loop {
                let Some(variant) = self.pull(index)? else {
                    return Ok(None);
                };
                match variant.cmp(&target) {
                    Ordering::Less => {}
                    Ordering::Equal => {
                        matches += 1;
                        break;
                    }
                    Ordering::Greater => {
                        trace!(from = %target, to = %variant, "intersection target moved");
                        target = variant;
                        matches = 1;
                        break;
                    }
                }
            }
            index = (index + 1) % n;
        }
        Ok(Some(target))
    }
}
impl Iterator for IntersectIterator {
    type Item = Result<Variant>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let candidate = match self.next_match() {
                Ok(Some(candidate)) => candidate,
                Ok(None) => {
                    self.close();
                    return None;
                }
                Err(err) => {
                    self.close();
                    return Some(Err(err));
                }
            };
            match self.exclusion.excludes(&candidate) {
                Ok(false) => return Some(Ok(candidate)),
                Ok(true) => {}
                Err(err) => {
                    self.close();
                    return Some(Err(err));
                }
            }
        }
        None
    }
}
impl VariantIterator for IntersectIterator {
    fn close(&mut self) {
        if !self.done {
            self.done = true;
            for iterator in &mut self.iterators {
                iterator.close();
            }
        }
        self.exclusion.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iter::ListIterator;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};
    use std::collections::BTreeSet;

    fn at(position: u32) -> Variant {
        Variant::new("1", position, "A", "T")
    }

    fn list(variants: Vec<Variant>) -> Box<dyn VariantIterator> {
        Box::new(ListIterator::new(variants))
    }

    fn positions(iter: impl Iterator<Item = Result<Variant>>) -> anyhow::Result<Vec<u32>> {
        Ok(iter
            .map(|v| v.map(|v| v.position))
            .collect::<Result<Vec<_>>>()?)
    }

    #[test]
    fn test_two_samples() -> anyhow::Result<()> {
        let s1 = list([100, 200, 300].map(at).to_vec());
        let s2 = list([150, 200, 300, 400].map(at).to_vec());
        let iter = IntersectIterator::new(vec![s1, s2]);
        assert_eq!(positions(iter)?, vec![200, 300]);
        Ok(())
    }

    #[test]
    fn test_edge_cases() -> anyhow::Result<()> {
        assert_eq!(positions(IntersectIterator::new(Vec::new()))?, Vec::<u32>::new());
        let single = IntersectIterator::new(vec![list([5, 1].map(at).to_vec())]);
        assert_eq!(positions(single)?, vec![1, 5]);
        let disjoint = IntersectIterator::new(vec![
            list([1, 3, 5].map(at).to_vec()),
            list([2, 4, 6].map(at).to_vec()),
        ]);
        assert_eq!(positions(disjoint)?, Vec::<u32>::new());
        let with_empty = IntersectIterator::new(vec![list(vec![at(1)]), list(Vec::new())]);
        assert_eq!(positions(with_empty)?, Vec::<u32>::new());
        Ok(())
    }

    #[test]
    fn test_multi_allelic_collision() -> anyhow::Result<()> {
        let a = list(vec![
            Variant::new("1", 100, "A", "G"),
            Variant::new("1", 100, "A", "T"),
            Variant::new("1", 200, "C", "G"),
        ]);
        let b = list(vec![
            Variant::new("1", 100, "A", "C"),
            Variant::new("1", 100, "A", "T"),
            Variant::new("1", 200, "C", "CA"),
        ]);
        let result = IntersectIterator::new(vec![a, b]).collect::<Result<Vec<_>>>()?;
        assert_eq!(result, vec![Variant::new("1", 100, "A", "T")]);
        Ok(())
    }

    #[test]
    fn test_negated() -> anyhow::Result<()> {
        let iter = IntersectIterator::with_negated(
            vec![
                list([1, 2, 3, 4].map(at).to_vec()),
                list([2, 3, 4, 5].map(at).to_vec()),
            ],
            vec![list([3].map(at).to_vec())],
        );
        assert_eq!(positions(iter)?, vec![2, 4]);
        Ok(())
    }

    #[test]
    fn test_close() -> anyhow::Result<()> {
        let mut iter = IntersectIterator::new(vec![
            list([1, 2, 3].map(at).to_vec()),
            list([1, 2, 3].map(at).to_vec()),
        ]);
        assert_eq!(iter.next().transpose()?, Some(at(1)));
        iter.close();
        assert!(iter.next().is_none());
        Ok(())
    }

    fn random_stream(rng: &mut SmallRng, universe: &[Variant], density: f64) -> BTreeSet<Variant> {
        universe
            .iter()
            .filter(|_| rng.random_bool(density))
            .cloned()
            .collect()
    }

    #[test]
    fn test_randomized_intersection() -> anyhow::Result<()> {
        let mut rng = SmallRng::seed_from_u64(0xA11CE);
        let alleles = [("A", "C"), ("A", "G"), ("A", "AT"), ("AT", "A")];
        let universe: Vec<Variant> = (0..60)
            .flat_map(|p| {
                let chromosome = if p < 30 { "1" } else { "2" };
                alleles
                    .iter()
                    .map(move |(r, a)| Variant::new(chromosome, 1000 + p * 7, r, a))
            })
            .collect();

        for round in 0..50 {
            let n = rng.random_range(1..5);
            let density = match round % 3 {
                0 => 0.2,
                1 => 0.6,
                _ => 1.0,
            };
            let streams: Vec<BTreeSet<Variant>> = (0..n)
                .map(|_| random_stream(&mut rng, &universe, density))
                .collect();
            let expected: Vec<Variant> = streams[0]
                .iter()
                .filter(|v| streams.iter().all(|s| s.contains(*v)))
                .cloned()
                .collect();
            let iterators = streams
                .into_iter()
                .map(|s| list(s.into_iter().collect()))
                .collect();
            let result = IntersectIterator::new(iterators).collect::<Result<Vec<_>>>()?;
            assert_eq!(result, expected, "round {round}");
        }
        Ok(())
    }
}
