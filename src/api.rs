//! Python binding layer for posterior comparisons.
//!
//! Errors surface as `ValueError` (bad input, taxon or weight problems),
//! `OSError` (file access) or `RuntimeError` (external tools).

use pyo3::exceptions::{PyOSError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use std::path::PathBuf;

use crate::compare::{CompareOptions, ComparisonRun, PosteriorComparison, PosteriorOptions};
use crate::convergence::ConvergenceOptions;
use crate::error::Error;
use crate::sample::{PosteriorSample, RawRecord};

fn to_py_err(e: Error) -> PyErr {
    match e {
        Error::Io(_) => PyOSError::new_err(e.to_string()),
        Error::ExternalTool { .. } => PyRuntimeError::new_err(e.to_string()),
        _ => PyValueError::new_err(e.to_string()),
    }
}

/// Expected RF, weighted RF and Euclidean distance of a weighted sample to a
/// reference tree.
///
/// Args:
///     reference: Newick string of the reference tree
///     trees: List of (log_weight, newick) pairs
///
/// Returns:
///     A tuple (rf, weighted_rf, euclidean)
///
/// Raises:
///     ValueError: On unparseable trees, foreign taxa, or degenerate weights
#[pyfunction]
fn expected_distances(reference: &str, trees: Vec<(f64, String)>) -> PyResult<(f64, f64, f64)> {
    let run = ComparisonRun::from_newick("reference", reference).map_err(to_py_err)?;
    let records = trees
        .into_iter()
        .enumerate()
        .map(|(i, (log_weight, newick))| RawRecord {
            record: i + 1,
            log_weight,
            newick,
        })
        .collect();
    let sample = PosteriorSample::from_records("trees", records, run.namespace(), 0, true)
        .map_err(to_py_err)?;
    let [rf, weighted_rf, euclidean] = run.expected_distances(&sample).map_err(to_py_err)?;
    Ok((rf, weighted_rf, euclidean))
}

/// Comparison rows for candidate files against the first tree of `reference`.
///
/// Returns:
///     A list of (file, log_weight, rf_distance, weighted_rf, euclidean);
///     log_weight is None for unweighted sources
#[pyfunction]
#[pyo3(signature = (reference, candidates, burnin=0))]
fn compare_files(
    reference: PathBuf,
    candidates: Vec<PathBuf>,
    burnin: usize,
) -> PyResult<Vec<(String, Option<f64>, f64, f64, f64)>> {
    let run = ComparisonRun::new(&reference).map_err(to_py_err)?;
    let opts = CompareOptions {
        burnin,
        format: None,
    };
    let rows = run.compare(&candidates, &opts).map_err(to_py_err)?;
    Ok(rows
        .into_iter()
        .map(|r| (r.file, r.log_weight, r.rf_distance, r.weighted_rf, r.euclidean))
        .collect())
}

/// ASDSF/MSDSF of two MCMC runs and of the first run against each candidate.
///
/// Returns:
///     A list of (type, file1, file2, asdsf, msdsf); the first row is the
///     mcmc-mcmc baseline
#[pyfunction]
#[pyo3(signature = (ref1, ref2, candidates, burnin=250, min_support=0.1))]
fn asdsf(
    ref1: PathBuf,
    ref2: PathBuf,
    candidates: Vec<PathBuf>,
    burnin: usize,
    min_support: f64,
) -> PyResult<Vec<(String, String, String, f64, f64)>> {
    let opts = PosteriorOptions {
        burnin,
        convergence: ConvergenceOptions {
            min_support,
            ..Default::default()
        },
        format: None,
    };
    let report =
        PosteriorComparison::run(&ref1, &ref2, &candidates, &opts).map_err(to_py_err)?;
    Ok(report
        .asdsf
        .into_iter()
        .map(|r| (r.kind, r.file1, r.file2, r.asdsf, r.msdsf))
        .collect())
}

/// Python module definition
#[pymodule]
fn phylo_posterior_compare(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(expected_distances, m)?)?;
    m.add_function(wrap_pyfunction!(compare_files, m)?)?;
    m.add_function(wrap_pyfunction!(asdsf, m)?)?;
    Ok(())
}
