use std::collections::HashMap;

use crate::codec::bits::bits_for;
use crate::error::{ConfigError, DecodeError, EncodeError, Result};

/// Label of the catch-all slot
pub const OTHER: &str = "other";

/// Whether a field stores exactly one value or a set of values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CategoricalKind {
    /// The code is the slot number
    #[default]
    SingleValue,
    /// The code is a bitmask with one bit per slot
    MultiValue,
}

/// One code slot of a categorical field
///
/// A slot stands for one or more raw domain values. Slots with more than one value,
/// and the catch-all slot, are ambiguous.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub label: String,
    pub values: Vec<String>,
    pub catch_all: bool,
}
impl Slot {
    #[must_use]
    pub fn is_ambiguous(&self) -> bool {
        self.catch_all || self.values.len() > 1
    }
}

/// Maps domain values (consequence types, biotypes, genotypes, ...) to small bit codes.
///
/// Single-valued layout: code 0 is null when the field is nullable, then one code per slot in
/// declaration order, then the catch-all slot.
///
/// Multi-valued layout: one bit per slot in declaration order, catch-all last. Code 0 is the
/// empty set.
#[derive(Debug, Clone)]
pub struct CategoricalIndexField {
    key: String,
    kind: CategoricalKind,
    nullable: bool,
    slots: Vec<Slot>,
    lookup: HashMap<String, usize>,
    bits: u8,
}
impl CategoricalIndexField {
    /// Builds a field from `(label, raw values)` slots
    ///
    /// A slot with no raw values stands for its own label. When `other` is set an ambiguous
    /// catch-all slot receives every value not declared in a slot.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if no slot is declared, a raw value appears twice,
    /// or the code does not fit in 64 bits.
    pub fn new(
        key: &str,
        kind: CategoricalKind,
        slots: Vec<(String, Vec<String>)>,
        other: bool,
        nullable: bool,
    ) -> Result<Self> {
        if slots.is_empty() && !other {
            return Err(ConfigError::EmptyValues(key.to_string()).into());
        }
        let mut lookup = HashMap::new();
        let mut built = Vec::with_capacity(slots.len() + usize::from(other));
        for (index, (label, values)) in slots.into_iter().enumerate() {
            let values = if values.is_empty() {
                vec![label.clone()]
            } else {
                values
            };
            for value in &values {
                if lookup.insert(value.clone(), index).is_some() {
                    return Err(ConfigError::DuplicatedValue {
                        field: key.to_string(),
                        value: value.clone(),
                    }
                    .into());
                }
            }
            built.push(Slot {
                label,
                values,
                catch_all: false,
            });
        }
        if other {
            built.push(Slot {
                label: OTHER.to_string(),
                values: Vec::new(),
                catch_all: true,
            });
        }

        let bits = match kind {
            CategoricalKind::SingleValue => {
                bits_for(built.len() as u64 + u64::from(nullable))
            }
            CategoricalKind::MultiValue => {
                if built.len() > 64 {
                    return Err(ConfigError::TooManyBits {
                        index: key.to_string(),
                        bits: built.len() as u32,
                    }
                    .into());
                }
                built.len() as u8
            }
        };
        Ok(Self {
            key: key.to_string(),
            kind,
            nullable,
            slots: built,
            lookup,
            bits,
        })
    }

    /// Field with one unambiguous slot per value
    pub fn with_values<S: AsRef<str>>(
        key: &str,
        kind: CategoricalKind,
        values: &[S],
        other: bool,
        nullable: bool,
    ) -> Result<Self> {
        let slots = values
            .iter()
            .map(|v| (v.as_ref().to_string(), Vec::new()))
            .collect();
        Self::new(key, kind, slots, other, nullable)
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn kind(&self) -> CategoricalKind {
        self.kind
    }

    #[must_use]
    pub fn bits(&self) -> u8 {
        self.bits
    }

    #[must_use]
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    #[must_use]
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Number of valid codes of a single-valued field
    #[must_use]
    pub fn code_count(&self) -> u64 {
        match self.kind {
            CategoricalKind::SingleValue => self.slots.len() as u64 + u64::from(self.nullable),
            CategoricalKind::MultiValue => 1u64.checked_shl(u32::from(self.bits)).unwrap_or(0),
        }
    }

    /// Slot receiving `value`, falling back to the catch-all slot
    #[must_use]
    pub fn slot_of(&self, value: &str) -> Option<usize> {
        self.lookup.get(value).copied().or_else(|| {
            self.slots
                .last()
                .filter(|slot| slot.catch_all)
                .map(|_| self.slots.len() - 1)
        })
    }

    /// Code (single-valued) or bit (multi-valued) of slot number `slot`
    #[must_use]
    pub fn slot_code(&self, slot: usize) -> u64 {
        match self.kind {
            CategoricalKind::SingleValue => slot as u64 + u64::from(self.nullable),
            CategoricalKind::MultiValue => 1u64 << slot,
        }
    }

    /// Code representing "no value"
    #[must_use]
    pub fn null_code(&self) -> Option<u64> {
        match self.kind {
            CategoricalKind::SingleValue => self.nullable.then_some(0),
            CategoricalKind::MultiValue => Some(0),
        }
    }

    /// Encodes a single value
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::OutOfDomain`] if the value has no slot and the field has no
    /// catch-all slot.
    pub fn encode(&self, value: &str) -> Result<u64> {
        self.slot_of(value)
            .map(|slot| self.slot_code(slot))
            .ok_or_else(|| {
                EncodeError::OutOfDomain {
                    field: self.key.clone(),
                    value: value.to_string(),
                }
                .into()
            })
    }

    /// Encodes an absent value
    pub fn encode_null(&self) -> Result<u64> {
        self.null_code().ok_or_else(|| {
            EncodeError::OutOfDomain {
                field: self.key.clone(),
                value: String::new(),
            }
            .into()
        })
    }

    /// Encodes a set of values
    ///
    /// Multi-valued fields set one bit per distinct slot. Single-valued fields accept an
    /// empty set (null) or values that all share one slot.
    pub fn encode_all<I, S>(&self, values: I) -> Result<u64>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut code = None;
        for value in values {
            let value_code = self.encode(value.as_ref())?;
            code = Some(match (self.kind, code) {
                (CategoricalKind::MultiValue, Some(c)) => c | value_code,
                (CategoricalKind::SingleValue, Some(c)) if c != value_code => {
                    return Err(EncodeError::OutOfDomain {
                        field: self.key.clone(),
                        value: value.as_ref().to_string(),
                    }
                    .into())
                }
                _ => value_code,
            });
        }
        match code {
            Some(code) => Ok(code),
            None => self.encode_null(),
        }
    }

    /// Whether `code` belongs to the field's code space
    #[must_use]
    pub fn is_valid_code(&self, code: u64) -> bool {
        match self.kind {
            CategoricalKind::SingleValue => code < self.code_count(),
            CategoricalKind::MultiValue => {
                self.bits >= 64 || code >> self.bits == 0
            }
        }
    }

    /// Slots stored in `code`; empty for null
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidCode`] for codes outside the field's domain.
    pub fn decode(&self, code: u64) -> Result<Vec<&Slot>> {
        if !self.is_valid_code(code) {
            return Err(DecodeError::InvalidCode {
                field: self.key.clone(),
                code,
            }
            .into());
        }
        Ok(match self.kind {
            CategoricalKind::SingleValue => {
                if self.nullable && code == 0 {
                    Vec::new()
                } else {
                    vec![&self.slots[(code - u64::from(self.nullable)) as usize]]
                }
            }
            CategoricalKind::MultiValue => self
                .slots
                .iter()
                .enumerate()
                .filter(|(i, _)| code & (1 << i) != 0)
                .map(|(_, slot)| slot)
                .collect(),
        })
    }

    /// Whether decoding `code` is many-to-one
    #[must_use]
    pub fn ambiguous(&self, code: u64) -> bool {
        self.decode(code)
            .map(|slots| slots.iter().any(|slot| slot.is_ambiguous()))
            .unwrap_or(true)
    }

    /// Whether the raw `value` falls into `slot`
    #[must_use]
    pub fn slot_contains(&self, slot: &Slot, value: &str) -> bool {
        if slot.catch_all {
            !self.lookup.contains_key(value)
        } else {
            slot.values.iter().any(|v| v == value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn biotype() -> Result<CategoricalIndexField> {
        CategoricalIndexField::new(
            "BIOTYPE",
            CategoricalKind::MultiValue,
            vec![
                ("protein_coding".into(), vec![]),
                (
                    "lincRNA".into(),
                    vec!["lincRNA".into(), "antisense".into(), "sense_intronic".into()],
                ),
                ("miRNA".into(), vec![]),
            ],
            true,
            false,
        )
    }

    #[test]
    fn test_single_value_round_trip() -> anyhow::Result<()> {
        let gts = ["0/1", "1/1", "1/2"];
        let field =
            CategoricalIndexField::with_values("GT", CategoricalKind::SingleValue, &gts, true, true)?;
        // null + 3 values + other
        assert_eq!(field.code_count(), 5);
        assert_eq!(field.bits(), 3);
        for gt in gts {
            let code = field.encode(gt)?;
            assert!(!field.ambiguous(code));
            let slots = field.decode(code)?;
            assert_eq!(slots.len(), 1);
            assert_eq!(slots[0].values, vec![gt.to_string()]);
        }
        let other = field.encode("0|1")?;
        assert!(field.ambiguous(other));
        assert!(field.decode(other)?[0].catch_all);
        assert!(field.decode(field.encode_null()?)?.is_empty());
        assert!(field.decode(5).is_err());
        Ok(())
    }

    #[test]
    fn test_ambiguity_class() -> anyhow::Result<()> {
        let field = biotype()?;
        assert_eq!(field.bits(), 4);
        let antisense = field.encode("antisense")?;
        assert_eq!(antisense, field.encode("lincRNA")?);
        assert!(field.ambiguous(antisense));
        let slots = field.decode(antisense)?;
        assert!(field.slot_contains(slots[0], "antisense"));

        let coding = field.encode("protein_coding")?;
        assert!(!field.ambiguous(coding));

        let unknown = field.encode("IG_C_gene")?;
        assert_eq!(unknown, 1 << 3);
        assert!(field.slot_contains(field.decode(unknown)?[0], "IG_C_gene"));
        assert!(!field.slot_contains(field.decode(unknown)?[0], "miRNA"));

        let mixed = field.encode_all(["protein_coding", "miRNA"])?;
        assert_eq!(mixed, 0b101);
        assert!(!field.ambiguous(mixed));
        assert_eq!(field.encode_all(Vec::<&str>::new())?, 0);
        Ok(())
    }

    #[test]
    fn test_out_of_domain() -> anyhow::Result<()> {
        let field = CategoricalIndexField::with_values(
            "FILTER",
            CategoricalKind::SingleValue,
            &["PASS"],
            false,
            false,
        )?;
        assert!(field.encode("LowQual").is_err());
        assert!(field.encode_null().is_err());
        assert!(field.encode_all(Vec::<&str>::new()).is_err());
        assert_eq!(field.bits(), 0);
        Ok(())
    }

    #[test]
    fn test_invalid_configurations() {
        assert!(CategoricalIndexField::with_values(
            "CT",
            CategoricalKind::MultiValue,
            &["a", "a"],
            false,
            false
        )
        .is_err());
        assert!(CategoricalIndexField::with_values::<&str>(
            "CT",
            CategoricalKind::MultiValue,
            &[],
            false,
            false
        )
        .is_err());
    }
}
