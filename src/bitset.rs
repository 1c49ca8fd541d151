//! Compact bitset representation for taxon subsets.
//!
//! # Overview
//! Every taxon of a [`TaxonNamespace`](crate::taxa::TaxonNamespace) owns one bit
//! position. A split (bipartition) is stored as the bitset of one of its sides.
//!
//! # Example
//! For a namespace [A, B, C, D] mapped to indices [0, 1, 2, 3]:
//! - Side {C, D} → bitset `0b1100` (bits 2 and 3 set)
//! - Leaf mask of a tree containing all four taxa → `0b1111`

/// A compact bitset for representing which taxa belong to one side of a split.
///
/// Internally stores bits in `Vec<u64>` words to support arbitrarily large
/// namespaces. Each u64 word holds 64 taxon indices. The derived `Ord` gives the
/// deterministic order used when split tables are printed.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Bitset(pub Vec<u64>);

impl Bitset {
    /// Creates a new bitset with all bits set to 0.
    ///
    /// `words` is `(num_taxa + 63) / 64`.
    ///
    /// ```
    /// # use phylo_posterior_compare::bitset::Bitset;
    /// let bs = Bitset::zeros(2);
    /// assert_eq!(bs.0.len(), 2);
    /// ```
    pub fn zeros(words: usize) -> Self {
        Bitset(vec![0u64; words])
    }

    /// Sets the bit at the given index to 1.
    #[inline]
    pub fn set(&mut self, idx: usize) {
        let word = idx >> 6;
        let bit = idx & 63;
        self.0[word] |= 1u64 << bit;
    }

    #[inline]
    pub fn contains(&self, idx: usize) -> bool {
        let word = idx >> 6;
        word < self.0.len() && (self.0[word] >> (idx & 63)) & 1 == 1
    }

    /// Bitwise OR with another bitset: `self` becomes `self ∪ other`.
    ///
    /// ```
    /// # use phylo_posterior_compare::bitset::Bitset;
    /// let mut left = Bitset::zeros(1);
    /// left.set(0);
    /// let mut right = Bitset::zeros(1);
    /// right.set(1);
    /// left.or_assign(&right);
    /// assert_eq!(left.0[0], 0b11);
    /// ```
    #[inline]
    pub fn or_assign(&mut self, other: &Bitset) {
        for (a, b) in self.0.iter_mut().zip(&other.0) {
            *a |= *b;
        }
    }

    /// Number of set bits, i.e. how many taxa are on this side.
    #[inline]
    pub fn count_ones(&self) -> usize {
        self.0.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Complement relative to `mask` (the taxa actually present in a tree):
    /// `mask \ self`.
    pub fn complement_within(&self, mask: &Bitset) -> Bitset {
        Bitset(
            mask.0
                .iter()
                .zip(&self.0)
                .map(|(m, s)| m & !s)
                .collect(),
        )
    }

    /// Index of the lowest set bit, if any.
    pub fn first_one(&self) -> Option<usize> {
        self.0
            .iter()
            .enumerate()
            .find(|(_, w)| **w != 0)
            .map(|(i, w)| (i << 6) + w.trailing_zeros() as usize)
    }

    /// Iterates over the indices of set bits in increasing order.
    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().enumerate().flat_map(|(i, &w)| {
            (0..64).filter(move |b| (w >> b) & 1 == 1).map(move |b| (i << 6) + b)
        })
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|w| *w == 0)
    }
}
