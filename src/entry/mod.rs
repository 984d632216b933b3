//! # entry
//!
//! One [`SampleIndexEntry`] holds every indexed call of one sample within one locus chunk,
//! bucketed by genotype. Each [`GtEntry`] stores its variants as a packed document buffer
//! in ascending ([`Variant`]) order, a histogram of the index codes of those variants, and
//! optionally one parents genotype byte per variant.
//!
//! Entries are produced by the [`SampleIndexEntryBuilder`] and are immutable afterwards.
//!
//! ## Row layout
//!
//! | column      | content                                             |
//! |-------------|-----------------------------------------------------|
//! | `V:<gt>`    | variant documents                                   |
//! | `C:<gt>`    | file + annotation code histogram, `u32` LE counters |
//! | `P:<gt>`    | parents codes (father high nibble, mother low)      |
//! | `M`         | Mendelian error bitset over relative offsets        |
//! | `D`         | discrepancies, `u32` LE (omitted when zero)         |
//!
//! A variant called with two different genotypes in one chunk sits in both buckets. The `D`
//! column counts those extra copies so that [`SampleIndexEntry::count`] stays a count of
//! distinct variants.

mod builder;
mod mendelian;

pub use builder::SampleIndexEntryBuilder;
pub use mendelian::MendelianBitset;

use std::collections::BTreeMap;

use byteorder::{ByteOrder, LittleEndian};

use crate::codec::{DocumentBuffer, FieldValue};
use crate::error::{DecodeError, Result};
use crate::key::RowKey;
use crate::schema::{
    SampleIndexSchema, FIELD_ALTERNATE, FIELD_ANNOTATION, FIELD_FILE, FIELD_OFFSET,
    FIELD_REFERENCE, FIELD_SNV,
};
use crate::store::Row;
use crate::variant::{snv_alleles, snv_code, Variant};

pub const COLUMN_VARIANTS: &[u8] = b"V:";
pub const COLUMN_COUNTS: &[u8] = b"C:";
pub const COLUMN_PARENTS: &[u8] = b"P:";
pub const COLUMN_MENDELIAN: &[u8] = b"M";
pub const COLUMN_DISCREPANCIES: &[u8] = b"D";

/// A variant of one sample with its packed index codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleIndexVariant {
    pub variant: Variant,
    pub file_code: u64,
    pub annotation_code: u64,
}
impl SampleIndexVariant {
    pub fn new(variant: Variant, file_code: u64, annotation_code: u64) -> Self {
        Self {
            variant,
            file_code,
            annotation_code,
        }
    }

    /// Field values of the variant's document within chunk `chunk_start`
    fn document_values(&self, chunk_start: u32) -> [FieldValue<'_>; 6] {
        let snv = snv_code(&self.variant.reference, &self.variant.alternate);
        let (reference, alternate) = if snv == 0 {
            (
                self.variant.reference.as_bytes(),
                self.variant.alternate.as_bytes(),
            )
        } else {
            (&b""[..], &b""[..])
        };
        [
            FieldValue::Integer(u64::from(self.variant.position - chunk_start)),
            FieldValue::Code(snv),
            FieldValue::Code(self.file_code),
            FieldValue::Code(self.annotation_code),
            FieldValue::Bytes(reference),
            FieldValue::Bytes(alternate),
        ]
    }
}

/// Borrowed view of one encoded variant inside a genotype bucket
#[derive(Debug, Clone, Copy)]
pub struct VariantDocument<'a> {
    schema: &'a SampleIndexSchema,
    bytes: &'a [u8],
}
impl<'a> VariantDocument<'a> {
    fn code(&self, field: usize) -> Result<u64> {
        Ok(self
            .schema
            .variant_schema()
            .read_field(self.bytes, field)?
            .as_code()
            .unwrap_or_default())
    }

    /// Position relative to the chunk start
    pub fn offset(&self) -> Result<u32> {
        let value = self
            .schema
            .variant_schema()
            .read_field(self.bytes, FIELD_OFFSET)?;
        Ok(value.as_integer().unwrap_or_default() as u32)
    }

    pub fn file_code(&self) -> Result<u64> {
        let code = self.code(FIELD_FILE)?;
        self.schema.file_index().validate(code)?;
        Ok(code)
    }

    pub fn annotation_code(&self) -> Result<u64> {
        let code = self.code(FIELD_ANNOTATION)?;
        self.schema.annotation_index().validate(code)?;
        Ok(code)
    }

    fn allele(&self, field: usize) -> Result<String> {
        let value = self.schema.variant_schema().read_field(self.bytes, field)?;
        let bytes = value.as_bytes().unwrap_or_default();
        Ok(std::str::from_utf8(bytes)
            .map_err(DecodeError::from)?
            .to_string())
    }

    /// Rebuilds the genomic variant
    pub fn to_variant(&self, chromosome: &str, chunk_start: u32) -> Result<Variant> {
        let position = chunk_start
            .checked_add(self.offset()?)
            .ok_or_else(|| DecodeError::InvalidRowKey(format!("offset past chunk {chunk_start}")))?;
        let snv = self.code(FIELD_SNV)?;
        let (reference, alternate) = if snv == 0 {
            (self.allele(FIELD_REFERENCE)?, self.allele(FIELD_ALTERNATE)?)
        } else {
            snv_alleles(snv)?
        };
        Ok(Variant {
            chromosome: chromosome.to_string(),
            position,
            reference,
            alternate,
        })
    }

    /// Rebuilds the variant with its codes
    pub fn to_index_variant(&self, chromosome: &str, chunk_start: u32) -> Result<SampleIndexVariant> {
        Ok(SampleIndexVariant {
            variant: self.to_variant(chromosome, chunk_start)?,
            file_code: self.file_code()?,
            annotation_code: self.annotation_code()?,
        })
    }
}

/// The variants of one genotype within one chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GtEntry {
    genotype: String,
    count: u32,
    variants: Vec<u8>,
    counts: Vec<u32>,
    parents: Option<Vec<u8>>,
}
impl GtEntry {
    #[must_use]
    pub fn genotype(&self) -> &str {
        &self.genotype
    }

    /// Number of variants in the bucket
    #[must_use]
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Code histogram: file index counters followed by annotation index counters
    #[must_use]
    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    /// One byte per variant: father genotype code high nibble, mother low nibble
    #[must_use]
    pub fn parents(&self) -> Option<&[u8]> {
        self.parents.as_deref()
    }

    /// Father and mother genotype codes of variant `index`
    #[must_use]
    pub fn parent_codes(&self, index: usize) -> Option<(u8, u8)> {
        let byte = *self.parents.as_ref()?.get(index)?;
        Some((byte >> 4, byte & 0x0F))
    }

    #[must_use]
    pub fn raw_variants(&self) -> &[u8] {
        &self.variants
    }

    /// Encoded variants, in ascending order
    pub fn documents<'a>(
        &'a self,
        schema: &'a SampleIndexSchema,
    ) -> Result<impl Iterator<Item = VariantDocument<'a>> + 'a> {
        let buffer = DocumentBuffer::parse(&self.variants)?;
        let mut cursor = 0;
        Ok(std::iter::from_fn(move || {
            buffer
                .read_next_document(&mut cursor)
                .map(|bytes| VariantDocument { schema, bytes })
        }))
    }

    /// Decodes every variant of the bucket
    pub fn decode_all(
        &self,
        schema: &SampleIndexSchema,
        chromosome: &str,
        chunk_start: u32,
    ) -> Result<Vec<SampleIndexVariant>> {
        self.documents(schema)?
            .map(|doc| doc.to_index_variant(chromosome, chunk_start))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleIndexEntry {
    sample_id: u32,
    chromosome: String,
    chunk_start: u32,
    gts: BTreeMap<String, GtEntry>,
    mendelian: MendelianBitset,
    discrepancies: u32,
}
impl SampleIndexEntry {
    #[must_use]
    pub fn sample_id(&self) -> u32 {
        self.sample_id
    }

    #[must_use]
    pub fn chromosome(&self) -> &str {
        &self.chromosome
    }

    #[must_use]
    pub fn chunk_start(&self) -> u32 {
        self.chunk_start
    }

    pub fn key(&self) -> Result<RowKey> {
        RowKey::new(self.sample_id, &self.chromosome, self.chunk_start)
    }

    #[must_use]
    pub fn gt(&self, genotype: &str) -> Option<&GtEntry> {
        self.gts.get(genotype)
    }

    pub fn gts(&self) -> impl Iterator<Item = &GtEntry> {
        self.gts.values()
    }

    #[must_use]
    pub fn mendelian(&self) -> &MendelianBitset {
        &self.mendelian
    }

    /// Bucket copies of variants already present in another bucket of this entry
    #[must_use]
    pub fn discrepancies(&self) -> u32 {
        self.discrepancies
    }

    /// Number of distinct variants over every genotype
    #[must_use]
    pub fn count(&self) -> u64 {
        let total: u64 = self.gts.values().map(|gt| u64::from(gt.count)).sum();
        total.saturating_sub(u64::from(self.discrepancies))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.gts.is_empty()
    }

    /// Serializes the entry into store columns
    #[must_use]
    pub fn to_row(&self) -> Row {
        let mut row = Row::new();
        for (genotype, gt) in &self.gts {
            row.insert(column(COLUMN_VARIANTS, genotype), gt.variants.clone());
            let mut counts = vec![0u8; gt.counts.len() * 4];
            LittleEndian::write_u32_into(&gt.counts, &mut counts);
            row.insert(column(COLUMN_COUNTS, genotype), counts);
            if let Some(parents) = &gt.parents {
                row.insert(column(COLUMN_PARENTS, genotype), parents.clone());
            }
        }
        if !self.mendelian.is_empty() {
            row.insert(COLUMN_MENDELIAN.to_vec(), self.mendelian.as_bytes().to_vec());
        }
        if self.discrepancies > 0 {
            let mut value = vec![0u8; 4];
            LittleEndian::write_u32(&mut value, self.discrepancies);
            row.insert(COLUMN_DISCREPANCIES.to_vec(), value);
        }
        row
    }

    /// Parses and validates a stored row
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] if the key is malformed, a column is unknown, or the columns
    /// of a genotype disagree on the number of variants. Document contents are decoded
    /// lazily while iterating.
    pub fn from_row(key: &[u8], row: &Row, schema: &SampleIndexSchema) -> Result<Self> {
        let key = RowKey::from_bytes(key)?;
        let histogram_len =
            schema.file_index().histogram_len() + schema.annotation_index().histogram_len();

        let mut gts = BTreeMap::new();
        let mut mendelian = MendelianBitset::default();
        let mut discrepancies = 0;
        for (name, value) in row {
            if name.as_slice() == COLUMN_MENDELIAN {
                mendelian = MendelianBitset::from_bytes(value.clone());
                continue;
            }
            if name.as_slice() == COLUMN_DISCREPANCIES {
                if value.len() != 4 {
                    return Err(DecodeError::ColumnSize {
                        column: String::from_utf8_lossy(name).into_owned(),
                        expected: 4,
                        got: value.len(),
                    }
                    .into());
                }
                discrepancies = LittleEndian::read_u32(value);
                continue;
            }
            let Some(genotype) = name.strip_prefix(COLUMN_VARIANTS) else {
                if !name.starts_with(COLUMN_COUNTS) && !name.starts_with(COLUMN_PARENTS) {
                    return Err(
                        DecodeError::UnknownColumn(String::from_utf8_lossy(name).into_owned())
                            .into(),
                    );
                }
                continue;
            };
            let genotype = std::str::from_utf8(genotype).map_err(DecodeError::from)?;
            let count = DocumentBuffer::parse(value)?.len();

            let counts_column = column(COLUMN_COUNTS, genotype);
            let raw_counts = row.get(&counts_column).map_or(&[][..], Vec::as_slice);
            if raw_counts.len() != histogram_len * 4 {
                return Err(DecodeError::ColumnSize {
                    column: String::from_utf8_lossy(&counts_column).into_owned(),
                    expected: histogram_len * 4,
                    got: raw_counts.len(),
                }
                .into());
            }
            let mut counts = vec![0u32; histogram_len];
            LittleEndian::read_u32_into(raw_counts, &mut counts);

            let parents_column = column(COLUMN_PARENTS, genotype);
            let parents = row.get(&parents_column).cloned();
            if let Some(parents) = &parents {
                if parents.len() != count {
                    return Err(DecodeError::ColumnSize {
                        column: String::from_utf8_lossy(&parents_column).into_owned(),
                        expected: count,
                        got: parents.len(),
                    }
                    .into());
                }
            }

            gts.insert(
                genotype.to_string(),
                GtEntry {
                    genotype: genotype.to_string(),
                    count: count as u32,
                    variants: value.clone(),
                    counts,
                    parents,
                },
            );
        }
        Ok(Self {
            sample_id: key.sample_id,
            chromosome: key.chromosome,
            chunk_start: key.chunk_start,
            gts,
            mendelian,
            discrepancies,
        })
    }
}

fn column(prefix: &[u8], genotype: &str) -> Vec<u8> {
    let mut name = prefix.to_vec();
    name.extend_from_slice(genotype.as_bytes());
    name
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::SampleIndexConfiguration;
    use crate::Error;

    fn schema() -> Result<Arc<SampleIndexSchema>> {
        Ok(Arc::new(SampleIndexSchema::new(
            SampleIndexConfiguration::default(),
        )?))
    }

    fn entry(schema: &Arc<SampleIndexSchema>) -> Result<SampleIndexEntry> {
        let mut builder = SampleIndexEntryBuilder::new(schema.clone(), 1, "7", 20_000)?;
        for (gt, position, reference, alternate) in [
            ("0/1", 20_010, "A", "G"),
            ("0/1", 20_005, "CTT", "C"),
            ("1/1", 29_999, "T", "TAAAAAAAAA"),
            ("0/1", 20_010, "A", "AC"),
        ] {
            let variant = Variant::new("7", position, reference, alternate);
            builder.add(gt, SampleIndexVariant::new(variant, 0, 0))?;
        }
        builder.mark_mendelian_error(29_999)?;
        builder.build_entry()
    }

    #[test]
    fn test_row_round_trip() -> anyhow::Result<()> {
        let schema = schema()?;
        let entry = entry(&schema)?;
        let row = entry.to_row();
        assert!(row.contains_key(&b"V:0/1"[..]));
        assert!(row.contains_key(COLUMN_MENDELIAN));
        let parsed = SampleIndexEntry::from_row(&entry.key()?.to_bytes(), &row, &schema)?;
        assert_eq!(parsed, entry);

        let het = parsed.gt("0/1").unwrap();
        let variants: Vec<String> = het
            .decode_all(&schema, "7", 20_000)?
            .iter()
            .map(|v| v.variant.to_string())
            .collect();
        assert_eq!(variants, vec!["7:20005:CTT:C", "7:20010:A:AC", "7:20010:A:G"]);
        assert!(parsed.mendelian().contains(9_999));
        assert_eq!(parsed.count(), 4);
        Ok(())
    }

    #[test]
    fn test_discrepancies_column() -> anyhow::Result<()> {
        let schema = schema()?;
        assert!(!entry(&schema)?.to_row().contains_key(COLUMN_DISCREPANCIES));

        let mut builder = SampleIndexEntryBuilder::new(schema.clone(), 3, "7", 20_000)?;
        let variant = Variant::new("7", 20_010, "A", "G");
        builder.add("0/1", SampleIndexVariant::new(variant.clone(), 0, 0))?;
        builder.add("1/1", SampleIndexVariant::new(variant, 0, 0))?;
        let entry = builder.build_entry()?;
        let key = entry.key()?.to_bytes();

        let mut row = entry.to_row();
        assert_eq!(row.get(COLUMN_DISCREPANCIES), Some(&vec![1, 0, 0, 0]));
        let parsed = SampleIndexEntry::from_row(&key, &row, &schema)?;
        assert_eq!(parsed.discrepancies(), 1);
        assert_eq!(parsed.count(), 1);

        row.insert(COLUMN_DISCREPANCIES.to_vec(), vec![1]);
        assert!(matches!(
            SampleIndexEntry::from_row(&key, &row, &schema),
            Err(Error::DecodeError(DecodeError::ColumnSize { .. }))
        ));
        Ok(())
    }

    #[test]
    fn test_snv_alleles_are_packed() -> anyhow::Result<()> {
        let schema = schema()?;
        let entry = entry(&schema)?;
        let het = entry.gt("0/1").unwrap();
        let snv = het.documents(&schema)?.nth(2).unwrap();
        let indel = het.documents(&schema)?.next().unwrap();
        assert!(snv.bytes.len() < indel.bytes.len());
        assert_eq!(snv.to_variant("7", 20_000)?.alternate, "G");
        Ok(())
    }

    #[test]
    fn test_corrupt_rows() -> anyhow::Result<()> {
        let schema = schema()?;
        let entry = entry(&schema)?;
        let key = entry.key()?.to_bytes();

        let mut row = entry.to_row();
        row.get_mut(&b"C:0/1"[..]).unwrap().pop();
        assert!(matches!(
            SampleIndexEntry::from_row(&key, &row, &schema),
            Err(Error::DecodeError(DecodeError::ColumnSize { .. }))
        ));

        let mut row = entry.to_row();
        row.get_mut(&b"V:1/1"[..]).unwrap().truncate(6);
        assert!(SampleIndexEntry::from_row(&key, &row, &schema).is_err());

        let mut row = entry.to_row();
        row.insert(b"X:0/1".to_vec(), vec![]);
        assert!(matches!(
            SampleIndexEntry::from_row(&key, &row, &schema),
            Err(Error::DecodeError(DecodeError::UnknownColumn(_)))
        ));

        // a corrupt document only fails when read
        let mut row = entry.to_row();
        let variants = row.get_mut(&b"V:1/1"[..]).unwrap();
        let last = variants.len() - 1;
        variants[last - 9] = 0xFF;
        let parsed = SampleIndexEntry::from_row(&key, &row, &schema)?;
        assert!(parsed.gt("1/1").unwrap().decode_all(&schema, "7", 20_000).is_err());
        assert_eq!(parsed.gt("0/1").unwrap().decode_all(&schema, "7", 20_000)?.len(), 3);
        Ok(())
    }
}
