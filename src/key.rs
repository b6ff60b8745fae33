//! Attribute keys.
//!
//! A key is a 64-bit integer. Keys with the top bit set are hashed identity
//! keys produced by interning; the remaining space is reserved for
//! positional keys, which no public operation currently produces.

use core::fmt;

/// Identifies an attribute slot on a node.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(u64);

impl Key {
    pub const HASH_FLAG: u64 = 1 << 63;

    /// A hashed identity key with the given low bits.
    #[inline]
    pub const fn hashed(bits: u64) -> Self {
        Key(bits | Self::HASH_FLAG)
    }

    /// A key in the reserved positional space.
    #[inline]
    pub const fn positional(index: u64) -> Self {
        Key(index & !Self::HASH_FLAG)
    }

    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_hashed(self) -> bool {
        self.0 & Self::HASH_FLAG != 0
    }

    #[inline]
    pub const fn is_positional(self) -> bool {
        !self.is_hashed()
    }

    /// Next probe position. Stays inside the hashed space on wrap-around.
    #[inline]
    pub(crate) const fn next(self) -> Self {
        Key::hashed(self.0.wrapping_add(1))
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_hashed() {
            write!(f, "Key(#{:016x})", self.0 & !Self::HASH_FLAG)
        } else {
            write!(f, "Key(@{})", self.0)
        }
    }
}

/// Polynomial (x31) hash over codepoints, continuing from `seed`.
#[inline]
pub(crate) fn hash_chars_from<I>(seed: u64, chars: I) -> u64
where
    I: IntoIterator<Item = char>,
{
    chars
        .into_iter()
        .fold(seed, |h, c| h.wrapping_mul(31).wrapping_add(c as u64))
}

/// Hash of a UTF-32 sequence as an interning start key.
#[inline]
pub(crate) fn hash_chars<I>(chars: I) -> Key
where
    I: IntoIterator<Item = char>,
{
    Key::hashed(hash_chars_from(0, chars))
}

/// Same polynomial over raw bytes, used for blob content.
#[inline]
pub(crate) fn hash_bytes(bytes: &[u8]) -> Key {
    Key::hashed(
        bytes
            .iter()
            .fold(0u64, |h, &b| h.wrapping_mul(31).wrapping_add(b as u64)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashed_and_positional_are_disjoint() {
        let h = Key::hashed(7);
        let p = Key::positional(7);
        assert!(h.is_hashed());
        assert!(p.is_positional());
        assert_ne!(h, p);
        assert_eq!(Key::positional(Key::HASH_FLAG | 3), Key::positional(3));
    }

    #[test]
    fn polynomial_matches_manual_fold() {
        // "ab" = 'a' * 31 + 'b'
        let expected = (97u64 * 31 + 98) | Key::HASH_FLAG;
        assert_eq!(hash_chars("ab".chars()).raw(), expected);
        assert_eq!(hash_chars("".chars()), Key::hashed(0));
    }

    #[test]
    fn next_wraps_inside_hashed_space() {
        let last = Key::hashed(u64::MAX);
        let wrapped = last.next();
        assert!(wrapped.is_hashed());
        assert_eq!(wrapped, Key::hashed(0));
        assert_eq!(Key::hashed(5).next(), Key::hashed(6));
    }

    #[test]
    fn byte_hash_is_content_based() {
        assert_eq!(hash_bytes(b"xyz"), hash_bytes(b"xyz"));
        assert_ne!(hash_bytes(b"xyz"), hash_bytes(b"xzy"));
    }
}
