//! # gtindex
//!
//! A per-sample genotype index for variant stores.
//!
//! For every sample, chromosome and fixed-width locus chunk the index keeps one row holding the
//! sample's non-reference calls bucketed by genotype, each call carrying a bit-packed summary of
//! its file attributes and annotation, plus the parents' genotypes and a Mendelian error bitset
//! for trio members. Queries stream ascending variants per sample and combine samples by
//! intersection or union without materializing intermediate sets.
//!
//! ```no_run
//! use std::sync::Arc;
//! use gtindex::{
//!     Predicate, SampleIndex, SampleIndexConfiguration, SampleIndexQuery, SampleIndexSchema,
//!     store::{KeyValueStore, MemoryStore, SampleRegistry},
//! };
//!
//! # fn main() -> gtindex::Result<()> {
//! let schema = Arc::new(SampleIndexSchema::new(SampleIndexConfiguration::default())?);
//! let mut registry = SampleRegistry::new();
//! let sample = registry.register("NA12878");
//! let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
//! let index = SampleIndex::new(store, schema, Arc::new(registry));
//!
//! let query = SampleIndexQuery::new()
//!     .sample(sample, &["0/1", "1/1"])
//!     .predicate(Predicate::consequence_type(&["missense_variant"]));
//! for variant in index.iterator(&query)? {
//!     println!("{}", variant?);
//! }
//! # Ok(())
//! # }
//! ```

mod adaptor;
pub mod codec;
mod config;
pub mod entry;
mod error;
pub mod filter;
mod genotype;
pub mod index;
pub mod iter;
mod key;
mod parallel;
mod policy;
mod query;
mod record;
mod schema;
pub mod store;
mod variant;

pub use adaptor::SampleIndex;
pub use config::{
    AnnotationIndexConfiguration, FileIndexConfiguration, IndexFieldConfiguration, IndexFieldType,
    Population, PopulationFrequencyIndexConfiguration, SampleIndexConfiguration,
    DEFAULT_CHUNK_SIZE, KEY_DEPTH, KEY_FILTER, KEY_QUAL, KEY_TYPE, MAX_CHUNK_SIZE,
};
pub use error::{ConfigError, DecodeError, EncodeError, Error, QueryError, Result, StoreError};
pub use filter::{FilterChain, Match, Predicate, RangeOp};
pub use genotype::{is_mendelian_error, Genotype};
pub use key::{KeyRange, RowKey};
pub use parallel::{build_parallel, chunk_tasks, ChunkTask, EntryProcessor, StoreWriter};
pub use policy::DecodePolicy;
pub use query::{QueryOperation, SampleIndexQuery, SampleQuery};
pub use record::SampleVariantRecord;
pub use schema::SampleIndexSchema;
pub use variant::{
    FileAttributes, PopulationFrequency, Region, Variant, VariantAnnotation, VariantType,
};
