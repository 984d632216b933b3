/// Custom Result type for gtindex operations, wrapping the custom [`Error`] type
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for the gtindex library, encompassing every failure that can
/// occur while building, persisting, or querying a sample genotype index.
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub enum Error {
    /// Errors raised while decoding stored bytes back into index structures
    DecodeError(#[from] DecodeError),
    /// Errors raised while encoding values into index structures
    EncodeError(#[from] EncodeError),
    /// Errors in the index configuration
    ConfigError(#[from] ConfigError),
    /// Errors reported by the key-value store
    StoreError(#[from] StoreError),
    /// Errors in the query description
    QueryError(#[from] QueryError),
    /// Standard I/O errors from the Rust standard library
    IoError(#[from] std::io::Error),
    /// JSON (de)serialization errors for configurations and registries
    JsonError(#[from] serde_json::Error),
    /// Errors from the bitnuc nucleotide packing library
    BitnucError(#[from] bitnuc::NucleotideError),
    /// Generic errors that can occur in any part of the system
    AnyhowError(#[from] anyhow::Error),
}
impl Error {
    /// Whether the failure is transient and the caller may retry the operation.
    ///
    /// Only storage availability failures are retryable. The library itself never retries.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::StoreError(err) => err.is_retryable(),
            Self::IoError(err) => matches!(
                err.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }

    /// Whether the failure concerns a single corrupt record or chunk
    #[must_use]
    pub fn is_decode_error(&self) -> bool {
        matches!(self, Self::DecodeError(_))
    }
}

/// Errors that can occur while decoding stored bytes
#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    /// The buffer ended before the requested bytes
    ///
    /// # Fields
    /// * `offset` - The byte position where the read started
    /// * `needed` - The number of bytes requested
    /// * `available` - The number of bytes left in the buffer
    #[error("Buffer truncated at byte {offset}: needed {needed} bytes, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// A categorical code was read that lies outside the field's domain
    #[error("Code {code} is outside the domain of field {field}")]
    InvalidCode { field: String, code: u64 },

    /// A field index beyond the schema was requested
    ///
    /// # Arguments
    /// * First `usize` - The requested field index
    /// * Second `usize` - The number of fields in the schema
    #[error("Requested field index ({0}) is out of field range ({1})")]
    FieldOutOfRange(usize, usize),

    /// A document index beyond the buffer was requested
    ///
    /// # Arguments
    /// * First `usize` - The requested document index
    /// * Second `usize` - The number of documents in the buffer
    #[error("Requested document index ({0}) is out of document range ({1})")]
    DocumentOutOfRange(usize, usize),

    /// The document offset table is not monotonic or points outside the buffer
    #[error("Corrupt document table: {0}")]
    CorruptDocumentTable(String),

    /// The row key could not be parsed
    #[error("Invalid row key: {0}")]
    InvalidRowKey(String),

    /// A stored column has an unexpected size
    #[error("Column {column} has {got} bytes, expected {expected}")]
    ColumnSize {
        column: String,
        expected: usize,
        got: usize,
    },

    /// A stored column name is not recognized
    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    /// Stored text is not valid UTF-8
    #[error(transparent)]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// The magic number of a persisted store does not match
    ///
    /// # Arguments
    /// * `u32` - The invalid magic number that was found
    #[error("Invalid magic number: {0}")]
    InvalidMagicNumber(u32),

    /// The format version of a persisted store is not supported
    #[error("Invalid format version: {0}")]
    InvalidFormatVersion(u8),
}

/// Errors that can occur while encoding values
#[derive(thiserror::Error, Debug)]
pub enum EncodeError {
    /// A domain value is not part of a categorical field
    #[error("Value {value:?} is outside the domain of field {field}")]
    OutOfDomain { field: String, value: String },

    /// A code does not fit in the declared width of a codec field
    #[error("Code {code} does not fit in field {field}")]
    CodeOutOfDomain { field: String, code: u64 },

    /// An integer does not fit in the declared width of a codec field
    #[error("Integer {value} does not fit in {width} bytes of field {field}")]
    IntegerOverflow {
        field: String,
        value: u64,
        width: usize,
    },

    /// A variable-length value exceeds the maximum length of its field
    #[error("Value of {len} bytes exceeds the maximum length of field {field}")]
    ValueTooLong { field: String, len: usize },

    /// A value of the wrong kind was supplied for a codec field
    #[error("Field {0} received a value of the wrong kind")]
    KindMismatch(String),

    /// The record does not provide one value per schema field
    ///
    /// # Fields
    /// * `expected` - The number of fields in the schema
    /// * `got` - The number of values provided
    #[error("Record has {got} values, schema has {expected} fields")]
    FieldCount { expected: usize, got: usize },

    /// A variant was added to a builder for a different chunk
    #[error("Variant {variant} is outside chunk {chromosome}:{chunk_start}")]
    OutsideChunk {
        variant: String,
        chromosome: String,
        chunk_start: u32,
    },

    /// A chunk start that is not a multiple of the chunk size
    #[error("Chunk start {chunk_start} is not aligned to chunk size {chunk_size}")]
    UnalignedChunk { chunk_start: u32, chunk_size: u32 },

    /// The chromosome name cannot be used inside a row key
    #[error("Invalid chromosome name: {0:?}")]
    InvalidChromosome(String),

    /// The genotype cannot be parsed
    #[error("Invalid genotype: {0:?}")]
    InvalidGenotype(String),
}

/// Errors in the index configuration
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// Chunk size is zero or exceeds the relative offset width
    #[error("Invalid chunk size: {0}")]
    InvalidChunkSize(u32),

    /// A packed code would not fit into 64 bits
    #[error("Index {index} requires {bits} bits, at most 64 are available")]
    TooManyBits { index: String, bits: u32 },

    /// Range thresholds must be finite and strictly ascending
    #[error("Thresholds of field {0} must be finite and strictly ascending")]
    InvalidThresholds(String),

    /// A categorical field declares no values
    #[error("Field {0} declares no values")]
    EmptyValues(String),

    /// A value is declared twice within a field
    #[error("Value {value:?} is declared twice in field {field}")]
    DuplicatedValue { field: String, value: String },

    /// A population is configured twice
    #[error("Population {0} is configured twice")]
    DuplicatedPopulation(String),

    /// A field has an unusable combination of settings
    #[error("Field {field}: {reason}")]
    InvalidField { field: String, reason: String },
}

/// Errors reported by the key-value store
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// The backend could not serve the request right now
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The scanner was used after being closed
    #[error("Scanner is closed")]
    Closed,

    /// A stored row could not be interpreted
    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}
impl StoreError {
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Errors in the query description
#[derive(thiserror::Error, Debug)]
pub enum QueryError {
    /// The sample name is not registered
    #[error("Unknown sample: {0}")]
    UnknownSample(String),

    /// The sample id is not registered
    #[error("Unknown sample id: {0}")]
    UnknownSampleId(u32),

    /// The population is not part of the annotation index
    #[error("Population {0} is not indexed")]
    UnknownPopulation(String),

    /// No index field is configured under this key
    #[error("Field {0} is not indexed")]
    UnknownField(String),

    /// The predicate does not apply to the kind of field it targets
    #[error("Invalid predicate: {0}")]
    InvalidPredicate(String),

    /// The region string cannot be parsed
    #[error("Invalid region: {0:?}")]
    InvalidRegion(String),

    /// A family query was requested for a sample without registered parents
    #[error("Sample {0} has no registered parents")]
    MissingParents(String),

    /// A sample appears both as a positive and as a negated sample
    #[error("Sample {0} is both required and negated")]
    ConflictingSample(u32),

    /// The predicates match approximately and no variant decoder can confirm them
    #[error("Approximate predicates cannot be confirmed without a variant decoder")]
    UnconfirmedPredicates,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let err: Error = StoreError::Unavailable("region server down".into()).into();
        assert!(err.is_retryable());
        let err: Error = StoreError::Closed.into();
        assert!(!err.is_retryable());
        let err: Error = DecodeError::InvalidMagicNumber(7).into();
        assert!(!err.is_retryable());
        assert!(err.is_decode_error());
    }

    #[test]
    fn test_transparent_messages() {
        let err: Error = QueryError::UnknownSample("NA12878".into()).into();
        assert_eq!(err.to_string(), "Unknown sample: NA12878");
    }
}
