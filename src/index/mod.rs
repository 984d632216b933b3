//! # index
//!
//! Categorical and range encodings of per-variant properties, and their composition into
//! a single packed `u64` code.
//!
//! An [`IndexSchema`] places each [`IndexField`] at a fixed bit range. The file index code
//! holds per-file properties of a sample's call (FILTER, QUAL, DP, variant type) and the
//! annotation index code holds the variant's annotation (consequence types, biotypes,
//! population frequencies, clinical flags).
//!
//! Each schema also defines the layout of the per-genotype annotation histogram: one counter
//! per bit of every multi-valued field and one counter per code of every other field.

mod categorical;
mod range;

pub use categorical::{CategoricalIndexField, CategoricalKind, Slot, OTHER};
pub use range::{RangeIndexField, DELTA};

use std::collections::HashMap;
use std::ops::Range;

use crate::codec::bits::{read_bits, write_bits};
use crate::error::{ConfigError, DecodeError, EncodeError, Result};

/// Largest histogram section kept for a single-valued field
///
/// Wider fields are not summarized.
const MAX_HISTOGRAM_CODES: u64 = 256;

#[derive(Debug, Clone)]
pub enum IndexField {
    Categorical(CategoricalIndexField),
    Range(RangeIndexField),
}
impl IndexField {
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Categorical(field) => field.key(),
            Self::Range(field) => field.key(),
        }
    }

    #[must_use]
    pub fn bits(&self) -> u8 {
        match self {
            Self::Categorical(field) => field.bits(),
            Self::Range(field) => field.bits(),
        }
    }

    #[must_use]
    pub fn is_multi_value(&self) -> bool {
        matches!(self, Self::Categorical(f) if f.kind() == CategoricalKind::MultiValue)
    }

    #[must_use]
    pub fn is_valid_code(&self, code: u64) -> bool {
        match self {
            Self::Categorical(field) => field.is_valid_code(code),
            Self::Range(field) => code < field.code_count(),
        }
    }

    #[must_use]
    pub fn ambiguous(&self, code: u64) -> bool {
        match self {
            Self::Categorical(field) => field.ambiguous(code),
            Self::Range(field) => field.ambiguous(code),
        }
    }

    /// Number of histogram counters of this field
    #[must_use]
    pub fn histogram_len(&self) -> usize {
        match self {
            Self::Categorical(field) if field.kind() == CategoricalKind::MultiValue => {
                usize::from(field.bits())
            }
            Self::Categorical(field) if field.code_count() <= MAX_HISTOGRAM_CODES => {
                field.code_count() as usize
            }
            Self::Range(field) if field.code_count() <= MAX_HISTOGRAM_CODES => {
                field.code_count() as usize
            }
            _ => 0,
        }
    }

    /// Histogram counters incremented by `code`
    fn histogram_slots(&self, code: u64) -> impl Iterator<Item = usize> + '_ {
        let multi = self.is_multi_value();
        let len = self.histogram_len();
        (0..len).filter(move |slot| {
            if multi {
                code & (1 << slot) != 0
            } else {
                code == *slot as u64
            }
        })
    }
}
impl From<CategoricalIndexField> for IndexField {
    fn from(field: CategoricalIndexField) -> Self {
        Self::Categorical(field)
    }
}
impl From<RangeIndexField> for IndexField {
    fn from(field: RangeIndexField) -> Self {
        Self::Range(field)
    }
}

/// Ordered fields packed into one `u64` code
#[derive(Debug, Clone)]
pub struct IndexSchema {
    name: String,
    fields: Vec<IndexField>,
    offsets: Vec<u8>,
    bit_length: u8,
    histogram_offsets: Vec<usize>,
    histogram_len: usize,
    lookup: HashMap<String, usize>,
}
impl IndexSchema {
    /// Lays out `fields` from the least significant bit upwards
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::TooManyBits`] if the fields need more than 64 bits, or
    /// [`ConfigError::DuplicatedValue`] if two fields share a key.
    pub fn new(name: &str, fields: Vec<IndexField>) -> Result<Self> {
        let total: u32 = fields.iter().map(|f| u32::from(f.bits())).sum();
        if total > 64 {
            return Err(ConfigError::TooManyBits {
                index: name.to_string(),
                bits: total,
            }
            .into());
        }
        let mut offsets = Vec::with_capacity(fields.len());
        let mut histogram_offsets = Vec::with_capacity(fields.len());
        let mut lookup = HashMap::new();
        let mut bit = 0u8;
        let mut counter = 0usize;
        for (index, field) in fields.iter().enumerate() {
            if lookup.insert(field.key().to_string(), index).is_some() {
                return Err(ConfigError::DuplicatedValue {
                    field: name.to_string(),
                    value: field.key().to_string(),
                }
                .into());
            }
            offsets.push(bit);
            histogram_offsets.push(counter);
            bit += field.bits();
            counter += field.histogram_len();
        }
        Ok(Self {
            name: name.to_string(),
            fields,
            offsets,
            bit_length: bit,
            histogram_offsets,
            histogram_len: counter,
            lookup,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn fields(&self) -> &[IndexField] {
        &self.fields
    }

    #[must_use]
    pub fn bit_length(&self) -> u8 {
        self.bit_length
    }

    /// Position and definition of the field named `key`
    #[must_use]
    pub fn field(&self, key: &str) -> Option<(usize, &IndexField)> {
        self.lookup.get(key).map(|i| (*i, &self.fields[*i]))
    }

    /// First bit of field `index` within the packed code
    #[must_use]
    pub fn offset(&self, index: usize) -> u8 {
        self.offsets[index]
    }

    /// Extracts the sub-code of field `index`
    #[must_use]
    pub fn read(&self, code: u64, index: usize) -> u64 {
        read_bits(code, self.offsets[index], self.fields[index].bits())
    }

    /// Stores `value` as the sub-code of field `index`
    pub fn write(&self, code: &mut u64, index: usize, value: u64) -> Result<()> {
        let field = &self.fields[index];
        if !field.is_valid_code(value) {
            return Err(EncodeError::CodeOutOfDomain {
                field: field.key().to_string(),
                code: value,
            }
            .into());
        }
        write_bits(code, self.offsets[index], field.bits(), value);
        Ok(())
    }

    /// Checks that every sub-code of `code` is valid and no bit is set past the layout
    pub fn validate(&self, code: u64) -> Result<()> {
        if self.bit_length < 64 && code >> self.bit_length != 0 {
            return Err(DecodeError::InvalidCode {
                field: self.name.clone(),
                code,
            }
            .into());
        }
        for (index, field) in self.fields.iter().enumerate() {
            let sub = self.read(code, index);
            if !field.is_valid_code(sub) {
                return Err(DecodeError::InvalidCode {
                    field: field.key().to_string(),
                    code: sub,
                }
                .into());
            }
        }
        Ok(())
    }

    /// Whether any sub-code of `code` is ambiguous
    #[must_use]
    pub fn ambiguous(&self, code: u64) -> bool {
        self.fields
            .iter()
            .enumerate()
            .any(|(i, field)| field.ambiguous(self.read(code, i)))
    }

    /// Total number of histogram counters
    #[must_use]
    pub fn histogram_len(&self) -> usize {
        self.histogram_len
    }

    /// Counters of field `index` within the histogram
    #[must_use]
    pub fn histogram_range(&self, index: usize) -> Range<usize> {
        let start = self.histogram_offsets[index];
        start..start + self.fields[index].histogram_len()
    }

    /// Adds one code to a histogram of [`Self::histogram_len`] counters
    pub fn count(&self, code: u64, histogram: &mut [u32]) {
        for (index, field) in self.fields.iter().enumerate() {
            let start = self.histogram_offsets[index];
            for slot in field.histogram_slots(self.read(code, index)) {
                histogram[start + slot] = histogram[start + slot].saturating_add(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Result<IndexSchema> {
        IndexSchema::new(
            "file",
            vec![
                CategoricalIndexField::with_values(
                    "FILTER",
                    CategoricalKind::SingleValue,
                    &["PASS"],
                    true,
                    false,
                )?
                .into(),
                RangeIndexField::new("QUAL", vec![10.0, 20.0, 30.0], false)?.into(),
                CategoricalIndexField::with_values(
                    "CT",
                    CategoricalKind::MultiValue,
                    &["missense_variant", "stop_gained", "intron_variant"],
                    false,
                    false,
                )?
                .into(),
            ],
        )
    }

    #[test]
    fn test_layout() -> anyhow::Result<()> {
        let schema = schema()?;
        assert_eq!(schema.bit_length(), 1 + 2 + 3);
        assert_eq!(schema.histogram_len(), 2 + 4 + 3);
        assert_eq!(schema.histogram_range(1), 2..6);

        let mut code = 0;
        schema.write(&mut code, 0, 1)?;
        schema.write(&mut code, 1, 3)?;
        schema.write(&mut code, 2, 0b101)?;
        assert_eq!(schema.read(code, 0), 1);
        assert_eq!(schema.read(code, 1), 3);
        assert_eq!(schema.read(code, 2), 0b101);
        schema.validate(code)?;
        assert!(schema.validate(code | 1 << 6).is_err());
        assert!(schema.write(&mut code, 1, 4).is_err());
        Ok(())
    }

    #[test]
    fn test_histogram() -> anyhow::Result<()> {
        let schema = schema()?;
        let mut histogram = vec![0; schema.histogram_len()];
        let mut code = 0;
        schema.write(&mut code, 1, 2)?;
        schema.write(&mut code, 2, 0b011)?;
        schema.count(code, &mut histogram);
        schema.count(code, &mut histogram);
        assert_eq!(histogram, vec![2, 0, 0, 0, 2, 0, 2, 2, 0]);
        Ok(())
    }

    #[test]
    fn test_too_many_bits() -> anyhow::Result<()> {
        let values: Vec<String> = (0..40).map(|i| format!("v{i}")).collect();
        let wide = |key: &str| -> Result<IndexField> {
            Ok(CategoricalIndexField::with_values(
                key,
                CategoricalKind::MultiValue,
                &values,
                false,
                false,
            )?
            .into())
        };
        assert!(IndexSchema::new("annotation", vec![wide("a")?, wide("b")?]).is_err());
        Ok(())
    }
}
