//! Importance-weighted expectations of per-tree statistics.
//!
//! ```text
//! E[s] = Σ s(tree_i, ref) · w_i / Σ w_i
//! ```
//!
//! The weights are the ones the loader computed; nothing is renormalised
//! here. Any [`Statistic`] works: the three [`Metric`]s, tree length, or a
//! plain closure.

use crate::distances::Metric;
use crate::error::{Error, Result};
use crate::sample::{PosteriorSample, WeightedTree};
use crate::snapshot::TreeSnapshot;

/// A per-tree quantity evaluated against some reference value.
pub trait Statistic<R: ?Sized> {
    fn evaluate(&mut self, tree: &TreeSnapshot, reference: &R) -> Result<f64>;
}

impl<R: ?Sized, F> Statistic<R> for F
where
    F: FnMut(&TreeSnapshot, &R) -> Result<f64>,
{
    fn evaluate(&mut self, tree: &TreeSnapshot, reference: &R) -> Result<f64> {
        self(tree, reference)
    }
}

impl Statistic<TreeSnapshot> for Metric {
    fn evaluate(&mut self, tree: &TreeSnapshot, reference: &TreeSnapshot) -> Result<f64> {
        Metric::evaluate(*self, tree, reference)
    }
}

/// Total branch length; ignores the reference.
pub fn tree_length<R: ?Sized>(tree: &TreeSnapshot, _reference: &R) -> Result<f64> {
    Ok(tree.tree_length())
}

/// Weighted mean of `statistic` over `sample`.
pub fn expectation<R, S>(statistic: S, sample: &PosteriorSample, reference: &R) -> Result<f64>
where
    R: ?Sized,
    S: Statistic<R>,
{
    let mut stats = [statistic];
    let values = expectations(&mut stats, sample, reference)?;
    Ok(values[0])
}

/// Several expectations in one pass over the sample, in `statistics` order.
pub fn expectations<R, S>(
    statistics: &mut [S],
    sample: &PosteriorSample,
    reference: &R,
) -> Result<Vec<f64>>
where
    R: ?Sized,
    S: Statistic<R>,
{
    weighted_means(statistics, sample.trees(), &sample.source, reference)
}

fn weighted_means<R, S>(
    statistics: &mut [S],
    trees: &[WeightedTree],
    source: &str,
    reference: &R,
) -> Result<Vec<f64>>
where
    R: ?Sized,
    S: Statistic<R>,
{
    if trees.is_empty() {
        return Err(Error::EmptySample(source.to_string()));
    }
    let weight_sum: f64 = trees.iter().map(|t| t.weight).sum();
    if !(weight_sum.is_finite() && weight_sum > 0.0) {
        return Err(Error::degenerate(source, format!("weight sum is {weight_sum}")));
    }

    let mut totals = vec![0.0; statistics.len()];
    for tree in trees {
        for (total, statistic) in totals.iter_mut().zip(statistics.iter_mut()) {
            *total += statistic.evaluate(&tree.snapshot, reference)? * tree.weight;
        }
    }
    Ok(totals.into_iter().map(|t| t / weight_sum).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::RawRecord;
    use crate::taxa::TaxonNamespace;
    use proptest::prelude::*;

    fn ns4() -> TaxonNamespace {
        TaxonNamespace::from_labels(["A", "B", "C", "D"]).unwrap()
    }

    fn sample(ns: &TaxonNamespace, records: &[(f64, &str)]) -> PosteriorSample {
        let records = records
            .iter()
            .enumerate()
            .map(|(i, (lw, nwk))| RawRecord {
                record: i + 1,
                log_weight: *lw,
                newick: nwk.to_string(),
            })
            .collect();
        PosteriorSample::from_records("mem", records, ns, 0, true).unwrap()
    }

    #[test]
    fn constant_statistic() {
        let ns = ns4();
        let s = sample(
            &ns,
            &[(-1.3, "((A,B),(C,D));"), (0.2, "((A,C),(B,D));"), (-7.0, "((A,D),(B,C));")],
        );
        let constant = |_: &TreeSnapshot, _: &()| -> Result<f64> { Ok(4.25) };
        let e = expectation(constant, &s, &()).unwrap();
        assert!((e - 4.25).abs() < 1e-12);
    }

    #[test]
    fn identical_two_taxon_trees_are_at_distance_zero() {
        let ns = TaxonNamespace::from_labels(["A", "B"]).unwrap();
        let s = sample(&ns, &[(0.0, "(A:1,B:1);"), (0.0, "(A:1,B:1);")]);
        let reference = TreeSnapshot::from_newick("(A:1,B:1);", &ns).unwrap();
        let mut metrics = [Metric::Rf, Metric::Euclidean];
        let values = expectations(&mut metrics, &s, &reference).unwrap();
        assert_eq!(values, vec![0.0, 0.0]);
    }

    #[test]
    fn rf_is_weighted_by_posterior_mass() {
        let ns = ns4();
        // weights 3:1 after exponentiation
        let s = sample(
            &ns,
            &[(3f64.ln(), "((A,B),(C,D));"), (0.0, "((A,C),(B,D));")],
        );
        let reference = TreeSnapshot::from_newick("((A,B),(C,D));", &ns).unwrap();
        let rf = expectation(Metric::Rf, &s, &reference).unwrap();
        assert!((rf - 0.5).abs() < 1e-12);
    }

    #[test]
    fn tree_length_statistic() {
        let ns = ns4();
        let s = sample(
            &ns,
            &[(0.0, "((A:1,B:1):1,C:1,D:1);"), (0.0, "((A:2,B:2):2,C:2,D:2);")],
        );
        let e = expectation(tree_length::<()>, &s, &()).unwrap();
        assert!((e - 7.5).abs() < 1e-12);
    }

    #[test]
    fn statistic_errors_propagate() {
        let ns = ns4();
        let s = sample(&ns, &[(0.0, "((A,B),(C,D));")]);
        let other = TaxonNamespace::from_labels(["A", "B", "C"]).unwrap();
        let reference = TreeSnapshot::from_newick("((A,B),C);", &other).unwrap();
        let err = expectation(Metric::Rf, &s, &reference).unwrap_err();
        assert!(matches!(err, Error::TaxonMismatch(_)));
    }

    #[test]
    fn empty_tree_list() {
        let mut stats = [Metric::Rf];
        let reference = TreeSnapshot::from_newick("((A,B),(C,D));", &ns4()).unwrap();
        let err = weighted_means(&mut stats, &[], "mem", &reference).unwrap_err();
        assert!(matches!(err, Error::EmptySample(_)));
    }

    #[test]
    fn zero_weights_are_degenerate() {
        let ns = ns4();
        let snapshot = TreeSnapshot::from_newick("((A,B),(C,D));", &ns).unwrap();
        let trees = vec![WeightedTree {
            snapshot: snapshot.clone(),
            newick: "((A,B),(C,D));".to_string(),
            log_weight: 0.0,
            weight: 0.0,
        }];
        let mut stats = [Metric::Rf];
        let err = weighted_means(&mut stats, &trees, "mem", &snapshot).unwrap_err();
        assert!(matches!(err, Error::DegenerateWeight { .. }));
    }

    proptest! {
        #[test]
        fn expectation_ignores_log_weight_shift(
            lws in proptest::collection::vec(-20.0f64..20.0, 3),
            shift in -200.0f64..200.0,
        ) {
            let ns = ns4();
            let topologies = ["((A,B),(C,D));", "((A,C),(B,D));", "((A,D),(B,C));"];
            let reference = TreeSnapshot::from_newick("((A,B),(C,D));", &ns).unwrap();
            let build = |delta: f64| {
                let recs: Vec<(f64, &str)> = lws
                    .iter()
                    .zip(topologies)
                    .map(|(lw, t)| (lw + delta, t))
                    .collect();
                sample(&ns, &recs)
            };
            let a = expectation(Metric::Rf, &build(0.0), &reference).unwrap();
            let b = expectation(Metric::Rf, &build(shift), &reference).unwrap();
            prop_assert!((a - b).abs() < 1e-9);
            prop_assert!((0.0..=2.0).contains(&a));
        }
    }
}
