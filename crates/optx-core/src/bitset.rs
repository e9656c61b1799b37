//! # Index Bitset
//!
//! A growable set of small non-negative integers, used as the identity of join
//! components (which base inputs they cover) and of edges (which components they touch).
//!
//! The set is stored as 64-bit words with trailing zero words trimmed, so two sets with
//! the same members always compare and hash equal regardless of how they were built.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

const WORD_BITS: usize = 64;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct BitSet {
    words: Vec<u64>,
}

impl BitSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn singleton(bit: usize) -> Self {
        let mut set = Self::new();
        set.insert(bit);
        set
    }

    /// Add `bit`, returning `true` if it was not already present.
    pub fn insert(&mut self, bit: usize) -> bool {
        let (word, mask) = Self::locate(bit);
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        let was_set = self.words[word] & mask != 0;
        self.words[word] |= mask;
        !was_set
    }

    pub fn contains(&self, bit: usize) -> bool {
        let (word, mask) = Self::locate(bit);
        self.words.get(word).is_some_and(|w| w & mask != 0)
    }

    pub fn union_with(&mut self, other: &BitSet) {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (w, o) in self.words.iter_mut().zip(&other.words) {
            *w |= *o;
        }
    }

    pub fn union(&self, other: &BitSet) -> BitSet {
        let mut result = self.clone();
        result.union_with(other);
        result
    }

    /// Whether every member of `other` is also a member of `self`.
    pub fn contains_all(&self, other: &BitSet) -> bool {
        other.words.iter().enumerate().all(|(i, o)| {
            let w = self.words.get(i).copied().unwrap_or(0);
            o & !w == 0
        })
    }

    pub fn is_disjoint(&self, other: &BitSet) -> bool {
        self.words
            .iter()
            .zip(&other.words)
            .all(|(w, o)| w & o == 0)
    }

    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Iterate over members in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &word)| {
            let mut rest = word;
            std::iter::from_fn(move || {
                if rest == 0 {
                    return None;
                }
                let bit = rest.trailing_zeros() as usize;
                rest &= rest - 1;
                Some(i * WORD_BITS + bit)
            })
        })
    }

    /// Content hash, stable for equal sets within one process.
    pub fn hash_value(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }

    fn locate(bit: usize) -> (usize, u64) {
        (bit / WORD_BITS, 1u64 << (bit % WORD_BITS))
    }
}

impl FromIterator<usize> for BitSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut set = BitSet::new();
        for bit in iter {
            set.insert(bit);
        }
        set
    }
}

impl fmt::Display for BitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, b) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", b)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_reports_new_members() {
        let mut s = BitSet::new();
        assert!(s.insert(3));
        assert!(!s.insert(3));
        assert!(s.contains(3));
        assert!(!s.contains(2));
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn test_members_beyond_one_word() {
        let s: BitSet = [1, 64, 130].into_iter().collect();
        assert_eq!(s.iter().collect::<Vec<_>>(), vec![1, 64, 130]);
        assert!(s.contains(130));
        assert!(!s.contains(129));
        assert!(!s.contains(10_000));
    }

    #[test]
    fn test_union_and_containment() {
        let a: BitSet = [0, 2].into_iter().collect();
        let b: BitSet = [2, 70].into_iter().collect();
        let u = a.union(&b);
        assert_eq!(u.to_string(), "{0, 2, 70}");
        assert!(u.contains_all(&a));
        assert!(u.contains_all(&b));
        assert!(!a.contains_all(&b));
        assert!(a.contains_all(&BitSet::new()));
    }

    #[test]
    fn test_disjoint() {
        let a: BitSet = [0, 65].into_iter().collect();
        let b: BitSet = [1, 64].into_iter().collect();
        let c = BitSet::singleton(65);
        assert!(a.is_disjoint(&b));
        assert!(!a.is_disjoint(&c));
        assert!(a.is_disjoint(&BitSet::new()));
    }

    #[test]
    fn test_equal_sets_hash_equal() {
        let mut grown = BitSet::singleton(100);
        grown.union_with(&BitSet::singleton(1));
        let mut small = BitSet::singleton(1);
        small.insert(100);
        assert_eq!(grown, small);
        assert_eq!(grown.hash_value(), small.hash_value());
        assert!(BitSet::new().is_empty());
    }
}
