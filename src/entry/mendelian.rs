/// Relative offsets within a chunk where the sample's call is inconsistent with its parents
///
/// Bit `i` of byte `i / 8` (least significant first) marks offset `i`. The buffer ends at the
/// byte holding the highest marked offset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MendelianBitset {
    bytes: Vec<u8>,
}
impl MendelianBitset {
    #[must_use]
    pub fn from_bytes(mut bytes: Vec<u8>) -> Self {
        while bytes.last() == Some(&0) {
            bytes.pop();
        }
        Self { bytes }
    }

    pub fn insert(&mut self, offset: u32) {
        let byte = offset as usize / 8;
        if self.bytes.len() <= byte {
            self.bytes.resize(byte + 1, 0);
        }
        self.bytes[byte] |= 1 << (offset % 8);
    }

    #[must_use]
    pub fn contains(&self, offset: u32) -> bool {
        self.bytes
            .get(offset as usize / 8)
            .is_some_and(|byte| byte & (1 << (offset % 8)) != 0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Marked offsets in ascending order
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.bytes.iter().enumerate().flat_map(|(i, byte)| {
            (0..8u32)
                .filter(move |bit| byte & (1 << bit) != 0)
                .map(move |bit| i as u32 * 8 + bit)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitset() {
        let mut bitset = MendelianBitset::default();
        assert!(bitset.is_empty());
        for offset in [9_999, 0, 17] {
            bitset.insert(offset);
        }
        assert!(bitset.contains(0) && bitset.contains(17) && bitset.contains(9_999));
        assert!(!bitset.contains(16) && !bitset.contains(1_000_000));
        assert_eq!(bitset.iter().collect::<Vec<_>>(), vec![0, 17, 9_999]);
        assert_eq!(bitset.as_bytes().len(), 9_999 / 8 + 1);

        let parsed = MendelianBitset::from_bytes(vec![0b10, 0, 0]);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed.as_bytes(), &[0b10]);
    }
}
