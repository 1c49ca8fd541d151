//! Tree distance metrics over bipartition snapshots.
//!
//! This module implements the three per-tree statistics the comparison driver
//! averages under importance weights:
//!
//! 1. **Robinson-Foulds (RF)**: number of non-trivial splits found in exactly
//!    one of the two trees (symmetric difference).
//!
//! 2. **Weighted Robinson-Foulds**: for every split (pendant edges included),
//!    |length_a - length_b|, where a split missing from a tree has length 0.
//!
//! 3. **Euclidean (Kuhner-Felsenstein branch score)**: sqrt(Σ(length_a - length_b)²)
//!    over the same union of splits.
//!
//! All metrics are unrooted and require both trees to cover the same taxa.

use crate::error::{Error, Result};
use crate::snapshot::TreeSnapshot;

#[cfg(test)]
use itertools::Itertools;

/// The per-tree distances reported for every candidate.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Metric {
    Rf,
    WeightedRf,
    Euclidean,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Rf, Metric::WeightedRf, Metric::Euclidean];

    /// Evaluate the metric, refusing trees over different taxon sets.
    pub fn evaluate(self, tree: &TreeSnapshot, reference: &TreeSnapshot) -> Result<f64> {
        check_same_taxa(tree, reference)?;
        Ok(match self {
            Metric::Rf => rf_from_snapshots(tree, reference) as f64,
            Metric::WeightedRf => weighted_rf_from_snapshots(tree, reference),
            Metric::Euclidean => euclidean_from_snapshots(tree, reference),
        })
    }
}

/// Comparison across mismatched taxon sets is undefined.
pub fn check_same_taxa(a: &TreeSnapshot, b: &TreeSnapshot) -> Result<()> {
    if a.same_taxa(b) {
        Ok(())
    } else {
        Err(Error::TaxonMismatch(format!(
            "trees cover different taxa ({} vs {} leaves)",
            a.num_leaves, b.num_leaves
        )))
    }
}

/// Robinson-Foulds distance from two pre-computed snapshots.
///
/// # Algorithm
/// ```text
/// intersection = A.parts ∩ B.parts
/// RF = len(A) + len(B) - 2 * len(intersection)
/// ```
///
/// # Example
/// ```text
/// Tree 1:  ((A,B),(C,D))     Splits: {A,B}|{C,D}
/// Tree 2:  ((A,C),(B,D))     Splits: {A,C}|{B,D}
/// RF = 1 + 1 - 2*0 = 2
/// ```
pub fn rf_from_snapshots(a: &TreeSnapshot, b: &TreeSnapshot) -> usize {
    let inter = a.parts.intersection(&b.parts).count();
    a.parts.len() + b.parts.len() - 2 * inter
}

/// Weighted RF distance from two pre-computed snapshots.
///
/// For each split:
/// - in both trees: add |length_a - length_b|
/// - only in A: add length_a
/// - only in B: add length_b
pub fn weighted_rf_from_snapshots(a: &TreeSnapshot, b: &TreeSnapshot) -> f64 {
    let mut distance: f64 = 0.0;

    for (split, length_a) in &a.lengths {
        match b.lengths.get(split) {
            Some(length_b) => distance += (length_a - length_b).abs(),
            None => distance += length_a.abs(),
        }
    }

    for (split, length_b) in &b.lengths {
        if !a.lengths.contains_key(split) {
            distance += length_b.abs();
        }
    }

    distance
}

/// Euclidean (branch score) distance from two pre-computed snapshots:
/// sqrt(Σ (length_a - length_b)²), absent splits counting as length 0.
pub fn euclidean_from_snapshots(a: &TreeSnapshot, b: &TreeSnapshot) -> f64 {
    let mut sum_squared: f64 = 0.0;

    for (split, length_a) in &a.lengths {
        let diff = length_a - b.lengths.get(split).unwrap_or(&0.0);
        sum_squared += diff * diff;
    }

    for (split, length_b) in &b.lengths {
        if !a.lengths.contains_key(split) {
            sum_squared += length_b * length_b;
        }
    }

    sum_squared.sqrt()
}
