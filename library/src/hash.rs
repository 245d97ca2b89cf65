//! Content digests.
//!
//! Hashes stand in for computed values: two plugs with equal hashes are
//! assumed to produce identical values. Every `append_*` call writes a type
//! tag and, for variable-length data, a length prefix, so the encoding is
//! injective and the combination is order-sensitive.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A 256-bit BLAKE3 digest.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Digest of a single byte string.
    pub fn of(bytes: &[u8]) -> Self {
        Hash(*blake3::hash(bytes).as_bytes())
    }

    /// Leading eight bytes, used to pick cache shards.
    pub(crate) fn prefix(&self) -> u64 {
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&self.0[..8]);
        u64::from_le_bytes(prefix)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form keeps plug dumps readable.
        write!(f, "Hash(")?;
        for byte in &self.0[..6] {
            write!(f, "{byte:02x}")?;
        }
        write!(f, "…)")
    }
}

const TAG_BYTES: u8 = 1;
const TAG_STR: u8 = 2;
const TAG_U64: u8 = 3;
const TAG_I64: u8 = 4;
const TAG_F64: u8 = 5;
const TAG_BOOL: u8 = 6;
const TAG_HASH: u8 = 7;

/// Incremental, order-sensitive hasher.
#[derive(Clone)]
pub struct Hasher {
    inner: blake3::Hasher,
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher {
    pub fn new() -> Self {
        Self {
            inner: blake3::Hasher::new(),
        }
    }

    pub fn append_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.inner.update(&[TAG_BYTES]);
        self.inner.update(&(bytes.len() as u64).to_le_bytes());
        self.inner.update(bytes);
        self
    }

    pub fn append_str(&mut self, s: &str) -> &mut Self {
        self.inner.update(&[TAG_STR]);
        self.inner.update(&(s.len() as u64).to_le_bytes());
        self.inner.update(s.as_bytes());
        self
    }

    pub fn append_u64(&mut self, v: u64) -> &mut Self {
        self.inner.update(&[TAG_U64]);
        self.inner.update(&v.to_le_bytes());
        self
    }

    pub fn append_i64(&mut self, v: i64) -> &mut Self {
        self.inner.update(&[TAG_I64]);
        self.inner.update(&v.to_le_bytes());
        self
    }

    /// Appends the exact bit pattern, so `-0.0` and `0.0` (or two NaN
    /// payloads) stay distinct.
    pub fn append_f64(&mut self, v: f64) -> &mut Self {
        self.inner.update(&[TAG_F64]);
        self.inner.update(&v.to_bits().to_le_bytes());
        self
    }

    pub fn append_bool(&mut self, v: bool) -> &mut Self {
        self.inner.update(&[TAG_BOOL, v as u8]);
        self
    }

    pub fn append_hash(&mut self, hash: &Hash) -> &mut Self {
        self.inner.update(&[TAG_HASH]);
        self.inner.update(&hash.0);
        self
    }

    pub fn finish(&self) -> Hash {
        Hash(*self.inner.finalize().as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_order_matters() {
        let mut a = Hasher::new();
        a.append_u64(1).append_u64(2);
        let mut b = Hasher::new();
        b.append_u64(2).append_u64(1);
        assert_ne!(a.finish(), b.finish());
    }

    #[test]
    fn test_string_boundaries_are_unambiguous() {
        let mut a = Hasher::new();
        a.append_str("ab").append_str("c");
        let mut b = Hasher::new();
        b.append_str("a").append_str("bc");
        assert_ne!(a.finish(), b.finish());
    }

    #[test]
    fn test_type_tags_separate_equal_bits() {
        let mut a = Hasher::new();
        a.append_u64(5);
        let mut b = Hasher::new();
        b.append_i64(5);
        assert_ne!(a.finish(), b.finish());
    }

    #[test]
    fn test_negative_zero_keeps_its_sign() {
        let mut a = Hasher::new();
        a.append_f64(0.0);
        let mut b = Hasher::new();
        b.append_f64(-0.0);
        assert_ne!(a.finish(), b.finish());
    }

    #[test]
    fn test_display_is_lowercase_hex() {
        let hash = Hash([0xab; 32]);
        let text = hash.to_string();
        assert_eq!(text.len(), 64);
        assert!(text.chars().all(|c| c == 'a' || c == 'b'));
    }
}
