//! # store
//!
//! The collaborators the index talks to:
//!
//! * [`KeyValueStore`]: the ordered, column-family store holding one row per locus chunk.
//!   Only point get/put and range scans are required.
//! * [`MetadataResolver`]: sample names, ids and parents.
//! * [`VariantDecoder`]: the primary variant store, used to confirm approximate matches.
//!
//! In-memory implementations of each are provided: [`MemoryStore`], [`SampleRegistry`]
//! and [`MemoryVariantStore`].

mod decoder;
mod header;
mod memory;
mod metadata;

pub use decoder::{DecodedVariant, MemoryVariantStore, VariantDecoder};
pub use header::{StoreHeader, SIZE_HEADER};
pub use memory::{MemoryStore, DEFAULT_SCAN_BATCH};
pub use metadata::{MetadataResolver, SampleMetadata, SampleRegistry};

use std::collections::BTreeMap;

use auto_impl::auto_impl;

use crate::error::Result;
use crate::key::KeyRange;

/// Columns of one row, by column name
pub type Row = BTreeMap<Vec<u8>, Vec<u8>>;

/// A pull-based scan over a key range, in ascending key order
///
/// Dropping a scanner releases it; [`RowScanner::close`] does so early and makes every
/// further `next` return `None`.
pub trait RowScanner: Iterator<Item = Result<(Vec<u8>, Row)>> + Send {
    fn close(&mut self);
}

/// An ordered map from row keys to rows
#[auto_impl(&, Box, Arc)]
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Row>>;

    /// Replaces the whole row stored under `key`
    fn put(&self, key: &[u8], row: Row) -> Result<()>;

    fn scan(&self, range: &KeyRange) -> Result<Box<dyn RowScanner>>;
}
