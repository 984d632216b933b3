//! # filter
//!
//! Compilation of query predicates into constant-time tests over packed index codes.
//!
//! Every [`IndexFieldFilter`] answers two questions about a field sub-code: whether a variant
//! with that code *may* satisfy the predicate, and whether the code alone *proves* it. The
//! answer is a [`Match`]. Codes that only may match are [`Match::Approximate`] and must be
//! confirmed against the fully decoded variant before they are reported.
//!
//! A [`FilterChain`] holds one filter per constrained field of the file and annotation
//! indexes and combines their answers.

mod chain;
mod predicate;

pub use chain::{FilterChain, IndexKind};
pub use predicate::{Predicate, RangeOp};

use crate::index::{CategoricalIndexField, CategoricalKind, RangeIndexField, DELTA};

/// Largest code space compiled into a lookup table
const MAX_TABLE_CODES: u64 = 1 << 16;

/// Outcome of testing a code against a filter, ordered from weakest to strongest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Match {
    /// No variant with this code satisfies the predicate
    None,
    /// Some variants with this code satisfy the predicate
    Approximate,
    /// Every variant with this code satisfies the predicate
    Exact,
}
impl Match {
    /// Conjunction of two outcomes
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        self.min(other)
    }

    #[must_use]
    pub fn is_match(self) -> bool {
        self != Self::None
    }
}

/// A compiled test over the sub-code of one index field
#[derive(Debug, Clone, PartialEq)]
pub enum IndexFieldFilter {
    /// Accepts every code
    NoOp,
    /// Accepts exactly one single-valued code
    Single { code: u64, exact: bool },
    /// Lookup table over the whole code space of a single-valued or range field
    Multi { table: Vec<Match> },
    /// Bitmask test over a multi-valued field: any accepted bit matches, and bits whose
    /// slot lies entirely inside the accepted values match exactly
    Bits { mask: u64, exact_mask: u64 },
    /// Conjunction of filters over the same field
    And(Vec<IndexFieldFilter>),
}
impl IndexFieldFilter {
    #[must_use]
    pub fn test_match(&self, code: u64) -> Match {
        match self {
            Self::NoOp => Match::Exact,
            Self::Single { code: expected, exact } => match (code == *expected, exact) {
                (false, _) => Match::None,
                (true, true) => Match::Exact,
                (true, false) => Match::Approximate,
            },
            Self::Multi { table } => usize::try_from(code)
                .ok()
                .and_then(|code| table.get(code).copied())
                .unwrap_or(Match::None),
            Self::Bits { mask, exact_mask } => {
                if code & exact_mask != 0 {
                    Match::Exact
                } else if code & mask != 0 {
                    Match::Approximate
                } else {
                    Match::None
                }
            }
            Self::And(filters) => filters
                .iter()
                .fold(Match::Exact, |acc, f| acc.and(f.test_match(code))),
        }
    }

    #[must_use]
    pub fn test(&self, code: u64) -> bool {
        self.test_match(code).is_match()
    }

    /// Whether every accepted code proves the predicate
    #[must_use]
    pub fn is_exact(&self) -> bool {
        match self {
            Self::NoOp => true,
            Self::Single { exact, .. } => *exact,
            Self::Multi { table } => !table.contains(&Match::Approximate),
            Self::Bits { mask, exact_mask } => mask == exact_mask,
            Self::And(filters) => filters.iter().all(Self::is_exact),
        }
    }

    /// Whether every code of the field matches exactly, so the field needs no test
    #[must_use]
    pub fn all_valid(&self) -> bool {
        match self {
            Self::NoOp => true,
            Self::Single { .. } | Self::Bits { .. } => false,
            Self::Multi { table } => table.iter().all(|m| *m == Match::Exact),
            Self::And(filters) => filters.iter().all(Self::all_valid),
        }
    }

    /// Whether no code of the field can match
    #[must_use]
    pub fn none_valid(&self) -> bool {
        match self {
            Self::NoOp | Self::Single { .. } => false,
            Self::Multi { table } => table.iter().all(|m| *m == Match::None),
            Self::Bits { mask, .. } => *mask == 0,
            Self::And(filters) => filters.iter().any(Self::none_valid),
        }
    }

    /// Whether a bucket with these histogram counters may hold a matching variant
    ///
    /// Multi-valued fields keep one counter per bit, other fields one counter per code. An
    /// empty counter slice carries no information.
    #[must_use]
    pub fn any_in_histogram(&self, multi_value: bool, counters: &[u32]) -> bool {
        if counters.is_empty() {
            return true;
        }
        match self {
            Self::NoOp => true,
            Self::And(filters) => filters
                .iter()
                .all(|f| f.any_in_histogram(multi_value, counters)),
            _ => counters.iter().enumerate().any(|(slot, count)| {
                let code = if multi_value { 1u64 << slot } else { slot as u64 };
                *count > 0 && self.test(code)
            }),
        }
    }

    /// Conjunction with another filter on the same field
    ///
    /// Two lookup tables are merged into one.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        match (self, other) {
            (Self::NoOp, f) | (f, Self::NoOp) => f,
            (Self::Multi { table: a }, Self::Multi { table: b }) => Self::Multi {
                table: a.iter().zip(&b).map(|(x, y)| x.and(*y)).collect(),
            },
            (Self::And(mut filters), Self::And(more)) => {
                filters.extend(more);
                Self::And(filters)
            }
            (Self::And(mut filters), f) | (f, Self::And(mut filters)) => {
                filters.push(f);
                Self::And(filters)
            }
            (a, b) => Self::And(vec![a, b]),
        }
    }

    /// Filter accepting variants with at least one of `values`
    ///
    /// A slot matches exactly when it is not the catch-all slot and every raw value it
    /// stands for was requested. Values with no slot in a closed domain can never match.
    #[must_use]
    pub fn categorical<S: AsRef<str>>(field: &CategoricalIndexField, values: &[S]) -> Self {
        let mut accepted: Vec<usize> = values
            .iter()
            .filter_map(|v| field.slot_of(v.as_ref()))
            .collect();
        accepted.sort_unstable();
        accepted.dedup();

        let exact = |slot: usize| {
            let slot = &field.slots()[slot];
            !slot.catch_all
                && slot
                    .values
                    .iter()
                    .all(|v| values.iter().any(|r| r.as_ref() == v.as_str()))
        };

        match field.kind() {
            CategoricalKind::MultiValue => {
                let mut mask = 0;
                let mut exact_mask = 0;
                for slot in accepted {
                    mask |= field.slot_code(slot);
                    if exact(slot) {
                        exact_mask |= field.slot_code(slot);
                    }
                }
                Self::Bits { mask, exact_mask }
            }
            CategoricalKind::SingleValue => {
                if let [slot] = accepted[..] {
                    return Self::Single {
                        code: field.slot_code(slot),
                        exact: exact(slot),
                    };
                }
                let mut table = vec![Match::None; field.code_count() as usize];
                for slot in accepted {
                    table[field.slot_code(slot) as usize] = if exact(slot) {
                        Match::Exact
                    } else {
                        Match::Approximate
                    };
                }
                Self::Multi { table }
            }
        }
    }

    /// Filter over the buckets of a range field
    ///
    /// `<=` and `>` are shifted by [`DELTA`] into `<` and `>=`. A bucket `[lower, upper)`
    /// matches when it overlaps the accepted interval and matches exactly when it lies inside
    /// it. The null code never matches.
    #[must_use]
    pub fn range(field: &RangeIndexField, op: RangeOp, value: f64) -> Self {
        let (below, bound) = match op {
            RangeOp::Lt => (true, value),
            RangeOp::Le => (true, value + DELTA),
            RangeOp::Ge => (false, value),
            RangeOp::Gt => (false, value + DELTA),
        };
        let codes = field.code_count().min(MAX_TABLE_CODES);
        let table = (0..codes)
            .map(|code| match field.decode(code) {
                Ok(Some((lower, upper))) => {
                    let (overlaps, inside) = if below {
                        (lower < bound, upper <= bound)
                    } else {
                        (upper > bound, lower >= bound)
                    };
                    match (overlaps, inside) {
                        (_, true) => Match::Exact,
                        (true, false) => Match::Approximate,
                        (false, false) => Match::None,
                    }
                }
                Ok(None) | Err(_) => Match::None,
            })
            .collect();
        Self::Multi { table }
    }
}
