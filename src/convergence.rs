//! Split-frequency convergence diagnostic (ASDSF / MSDSF).
//!
//! # Algorithm
//! ```text
//! f_k(s) = Σ_{trees t in sample k containing s} w_t / Σ w_t
//! included  ⇔ max(f1(s), f2(s)) >= min_support
//! sd(s)     = sqrt(((f1 - m)² + (f2 - m)²) / 2),   m = (f1 + f2) / 2
//! ASDSF     = mean sd over included splits
//! MSDSF     = max  sd over included splits
//! ```
//!
//! Only non-trivial splits take part; pendant edges are in every tree.

use crate::bitset::Bitset;
use crate::error::{Error, Result};
use crate::sample::PosteriorSample;
use std::collections::{BTreeSet, HashMap};

/// Weighted split frequencies of one sample.
#[derive(Debug, Clone)]
pub struct SplitFrequencies {
    pub frequencies: HashMap<Bitset, f64>,
    pub leaf_mask: Bitset,
    /// Trees counted after `skip`.
    pub trees: usize,
}

impl SplitFrequencies {
    pub fn get(&self, split: &Bitset) -> f64 {
        self.frequencies.get(split).copied().unwrap_or(0.0)
    }
}

/// Frequency of every non-trivial split in `sample`, ignoring the first
/// `skip` trees and renormalising the weights of the rest.
pub fn split_frequencies(sample: &PosteriorSample, skip: usize) -> Result<SplitFrequencies> {
    let trees = sample.trees().get(skip..).unwrap_or(&[]);
    let first = trees
        .first()
        .ok_or_else(|| Error::EmptySample(sample.source.clone()))?;
    let leaf_mask = first.snapshot.leaf_mask.clone();

    let total: f64 = trees.iter().map(|t| t.weight).sum();
    if !(total.is_finite() && total > 0.0) {
        return Err(Error::degenerate(
            &sample.source,
            format!("weight sum after skipping {skip} trees is {total}"),
        ));
    }

    let mut frequencies: HashMap<Bitset, f64> = HashMap::new();
    for tree in trees {
        if tree.snapshot.leaf_mask != leaf_mask {
            return Err(Error::TaxonMismatch(format!(
                "{}: trees cover different taxa",
                sample.source
            )));
        }
        for part in &tree.snapshot.parts {
            *frequencies.entry(part.clone()).or_insert(0.0) += tree.weight;
        }
    }
    for f in frequencies.values_mut() {
        *f /= total;
    }

    Ok(SplitFrequencies {
        frequencies,
        leaf_mask,
        trees: trees.len(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvergenceOptions {
    pub min_support: f64,
    /// Leading trees dropped from each sample before counting.
    pub skip: usize,
    /// Added to both counts in the log-odds table.
    pub pseudocount: f64,
}

impl Default for ConvergenceOptions {
    fn default() -> Self {
        ConvergenceOptions {
            min_support: 0.1,
            skip: 0,
            pseudocount: 1.0,
        }
    }
}

/// One split of the union of both samples.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitRow {
    pub split: Bitset,
    pub freq1: f64,
    pub freq2: f64,
    pub sd: f64,
    pub included: bool,
    pub lod1: f64,
    pub lod2: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConvergenceReport {
    pub asdsf: f64,
    pub msdsf: f64,
    /// Union of splits, highest frequency first.
    pub table: Vec<SplitRow>,
}

impl ConvergenceReport {
    pub fn included(&self) -> impl Iterator<Item = &SplitRow> {
        self.table.iter().filter(|r| r.included)
    }

    pub fn lod_table(&self) -> Vec<LodPair> {
        self.included()
            .map(|r| LodPair {
                lod1: r.lod1,
                lod2: r.lod2,
            })
            .collect()
    }
}

/// ASDSF / MSDSF between two samples over the same taxa.
pub fn convergence(
    sample1: &PosteriorSample,
    sample2: &PosteriorSample,
    opts: &ConvergenceOptions,
) -> Result<ConvergenceReport> {
    let f1 = split_frequencies(sample1, opts.skip)?;
    let f2 = split_frequencies(sample2, opts.skip)?;
    compare_frequencies(&f1, &f2, opts)
}

/// Same as [`convergence`] on precomputed frequencies.
pub fn compare_frequencies(
    f1: &SplitFrequencies,
    f2: &SplitFrequencies,
    opts: &ConvergenceOptions,
) -> Result<ConvergenceReport> {
    if f1.leaf_mask != f2.leaf_mask {
        return Err(Error::TaxonMismatch(
            "samples cover different taxa".to_string(),
        ));
    }

    let union: BTreeSet<&Bitset> = f1.frequencies.keys().chain(f2.frequencies.keys()).collect();
    let mut table: Vec<SplitRow> = union
        .into_iter()
        .map(|split| {
            let (a, b) = (f1.get(split), f2.get(split));
            let mean = (a + b) / 2.0;
            let sd = (((a - mean).powi(2) + (b - mean).powi(2)) / 2.0).sqrt();
            SplitRow {
                split: split.clone(),
                freq1: a,
                freq2: b,
                sd,
                included: a.max(b) >= opts.min_support,
                lod1: log_odds(a, f1.trees, opts.pseudocount),
                lod2: log_odds(b, f2.trees, opts.pseudocount),
            }
        })
        .collect();
    table.sort_by(|x, y| {
        y.freq1
            .max(y.freq2)
            .total_cmp(&x.freq1.max(x.freq2))
            .then_with(|| x.split.cmp(&y.split))
    });

    let sds: Vec<f64> = table.iter().filter(|r| r.included).map(|r| r.sd).collect();
    if sds.is_empty() {
        return Err(Error::NoQualifyingSplits {
            min_support: opts.min_support,
        });
    }
    let asdsf = sds.iter().sum::<f64>() / sds.len() as f64;
    let msdsf = sds.iter().copied().fold(0.0, f64::max);
    log::debug!(
        "{} of {} splits reach min_support={}",
        sds.len(),
        table.len(),
        opts.min_support
    );

    Ok(ConvergenceReport {
        asdsf,
        msdsf,
        table,
    })
}

/// `log10((f·n + c) / ((1 - f)·n + c))`
pub fn log_odds(freq: f64, trees: usize, pseudocount: f64) -> f64 {
    let n = trees as f64;
    ((freq * n + pseudocount) / ((1.0 - freq) * n + pseudocount)).log10()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LodPair {
    pub lod1: f64,
    pub lod2: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PpPair {
    pub pp1: f64,
    pub pp2: f64,
}

/// Posterior probability of a log10-odds value: `10^x / (1 + 10^x)`.
pub fn pp_of_lod(x: f64) -> f64 {
    let odds = 10f64.powf(x);
    odds / (1.0 + odds)
}

pub fn pp_table_of_lod_table(table: &[LodPair]) -> Vec<PpPair> {
    table
        .iter()
        .map(|r| PpPair {
            pp1: pp_of_lod(r.lod1),
            pp2: pp_of_lod(r.lod2),
        })
        .collect()
}
