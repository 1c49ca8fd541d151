//! Crate root: module orchestration and public re-exports.
//!
//! Modules:
//! - `bitset`, `taxa`, `snapshot`: split encoding over a shared taxon namespace.
//! - `distances`: RF / weighted RF / Euclidean distances between snapshots.
//! - `io`: Newick/NEXUS text handling and (gzip-aware) file access.
//! - `sample`: weighted, SMC JSON, NEXUS and Newick loaders → `PosteriorSample`.
//! - `expectation`: importance-weighted expectation of a per-tree statistic.
//! - `convergence`: ASDSF / MSDSF and LOD / posterior-probability tables.
//! - `bootstrap`: adapter for the external `trees-bootstrap` program.
//! - `compare`: reference × candidates drivers and CSV rows.
//! - `control`: per-run control records and the ESS / pendant-length reports.
//! - `sweep`: the simulate → MCMC → SMC experiment grid.
//! - `api`: Python bindings via `pyo3` (gated behind "python" feature).

pub mod bitset;
pub mod bootstrap;
pub mod compare;
pub mod control;
pub mod convergence;
pub mod distances;
pub mod error;
pub mod expectation;
pub mod io;
pub mod sample;
pub mod snapshot;
pub mod sweep;
pub mod taxa;

#[cfg(feature = "python")]
pub mod api;

pub use bitset::Bitset;
pub use compare::{ComparisonRun, PosteriorComparison};
pub use convergence::{ConvergenceOptions, ConvergenceReport, convergence};
pub use error::{Error, Result};
pub use expectation::{Statistic, expectation};
pub use sample::{PosteriorSample, SampleFormat};
pub use snapshot::TreeSnapshot;
pub use taxa::TaxonNamespace;
