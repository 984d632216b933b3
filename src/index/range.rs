use crate::codec::bits::bits_for;
use crate::error::{ConfigError, DecodeError, Result};

/// Shift applied to `<=` and `>` bounds so they can be expressed as `<` and `>=`
pub const DELTA: f64 = 0.000_000_1;

/// Buckets a numeric value by a list of ascending thresholds.
///
/// Bucket `b` covers `[t(b-1), t(b))` with open ends on both sides. When nullable,
/// code 0 is reserved for missing values and bucket `b` is stored as `b + 1`.
#[derive(Debug, Clone)]
pub struct RangeIndexField {
    key: String,
    thresholds: Vec<f64>,
    nullable: bool,
    bits: u8,
}
impl RangeIndexField {
    pub fn new(key: &str, thresholds: Vec<f64>, nullable: bool) -> Result<Self> {
        let ascending = thresholds.windows(2).all(|w| w[0] < w[1]);
        if thresholds.is_empty() || !ascending || thresholds.iter().any(|t| !t.is_finite()) {
            return Err(ConfigError::InvalidThresholds(key.to_string()).into());
        }
        let codes = thresholds.len() as u64 + 1 + u64::from(nullable);
        Ok(Self {
            key: key.to_string(),
            bits: bits_for(codes),
            thresholds,
            nullable,
        })
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn thresholds(&self) -> &[f64] {
        &self.thresholds
    }

    #[must_use]
    pub fn bits(&self) -> u8 {
        self.bits
    }

    #[must_use]
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Number of valid codes
    #[must_use]
    pub fn code_count(&self) -> u64 {
        self.thresholds.len() as u64 + 1 + u64::from(self.nullable)
    }

    fn bucket(&self, value: f64) -> u64 {
        self.thresholds.partition_point(|t| *t <= value) as u64
    }

    /// Encodes a value; a missing value is null when nullable, and zero otherwise
    #[must_use]
    pub fn encode(&self, value: Option<f64>) -> u64 {
        match (value, self.nullable) {
            (None, true) => 0,
            (None, false) => self.bucket(0.0),
            (Some(v), nullable) => self.bucket(v) + u64::from(nullable),
        }
    }

    /// Value a missing input is compared as, if any
    #[must_use]
    pub fn missing_value(&self) -> Option<f64> {
        (!self.nullable).then_some(0.0)
    }

    /// Half-open `[lower, upper)` interval of `code`; `None` for the null code
    pub fn decode(&self, code: u64) -> Result<Option<(f64, f64)>> {
        if code >= self.code_count() {
            return Err(DecodeError::InvalidCode {
                field: self.key.clone(),
                code,
            }
            .into());
        }
        if self.nullable && code == 0 {
            return Ok(None);
        }
        let bucket = (code - u64::from(self.nullable)) as usize;
        let lower = if bucket == 0 {
            f64::NEG_INFINITY
        } else {
            self.thresholds[bucket - 1]
        };
        let upper = self
            .thresholds
            .get(bucket)
            .copied()
            .unwrap_or(f64::INFINITY);
        Ok(Some((lower, upper)))
    }

    /// Every non-null code spans a range of values
    #[must_use]
    pub fn ambiguous(&self, code: u64) -> bool {
        !(self.nullable && code == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buckets() -> anyhow::Result<()> {
        let qual = RangeIndexField::new("QUAL", vec![10.0, 20.0, 30.0], false)?;
        assert_eq!(qual.bits(), 2);
        assert_eq!(qual.encode(Some(5.0)), 0);
        assert_eq!(qual.encode(Some(10.0)), 1);
        assert_eq!(qual.encode(Some(29.9)), 2);
        assert_eq!(qual.encode(Some(1000.0)), 3);
        assert_eq!(qual.encode(None), 0);
        assert_eq!(qual.decode(1)?, Some((10.0, 20.0)));
        assert_eq!(qual.decode(3)?, Some((30.0, f64::INFINITY)));
        assert!(qual.decode(4).is_err());
        Ok(())
    }

    #[test]
    fn test_nullable() -> anyhow::Result<()> {
        let dp = RangeIndexField::new("DP", vec![5.0, 10.0, 15.0, 20.0, 30.0, 50.0], true)?;
        assert_eq!(dp.bits(), 3);
        assert_eq!(dp.encode(None), 0);
        assert_eq!(dp.decode(0)?, None);
        assert_eq!(dp.encode(Some(0.0)), 1);
        assert_eq!(dp.encode(Some(60.0)), 7);
        for value in [0.0, 4.0, 5.0, 17.0, 49.0, 80.0] {
            let (lower, upper) = dp.decode(dp.encode(Some(value)))?.unwrap();
            assert!(lower <= value && value < upper);
        }
        Ok(())
    }

    #[test]
    fn test_invalid_thresholds() {
        assert!(RangeIndexField::new("X", vec![], false).is_err());
        assert!(RangeIndexField::new("X", vec![2.0, 1.0], false).is_err());
        assert!(RangeIndexField::new("X", vec![1.0, f64::NAN], false).is_err());
    }
}
