//! Comparison driver: reference tree × candidate samples → CSV rows.
//!
//! Two modes:
//! - [`ComparisonRun`]: expected RF / weighted RF / Euclidean distance of each
//!   candidate sample to one reference tree (e.g. the ML tree).
//! - [`PosteriorComparison`]: ASDSF/MSDSF of each candidate against a
//!   reference MCMC run, preceded by the MCMC-vs-MCMC baseline.
//!
//! The taxon namespace is built once per run and threaded through every load.

use crate::convergence::{ConvergenceOptions, convergence, pp_table_of_lod_table};
use crate::distances::Metric;
use crate::error::{Error, Result};
use crate::expectation::expectations;
use crate::io::create_output;
use crate::sample::{PosteriorSample, RawSample, SampleFormat};
use crate::snapshot::TreeSnapshot;
use crate::taxa::TaxonNamespace;
use serde::Serialize;
use std::path::Path;
use std::time::Instant;

/// `(file, log_weight, rf_distance, weighted_rf, euclidean)`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonRow {
    pub file: String,
    pub log_weight: Option<f64>,
    pub rf_distance: f64,
    pub weighted_rf: f64,
    pub euclidean: f64,
}

/// `(euclidean_distance, rf_distance)` of a single posterior.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpectedDistanceRow {
    pub euclidean_distance: f64,
    pub rf_distance: f64,
}

/// `(type, file1, file2, asdsf, msdsf)`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AsdsfRow {
    #[serde(rename = "type")]
    pub kind: String,
    pub file1: String,
    pub file2: String,
    pub asdsf: f64,
    pub msdsf: f64,
}

/// `(type, file1, file2, pp1, pp2)`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PpRow {
    #[serde(rename = "type")]
    pub kind: String,
    pub file1: String,
    pub file2: String,
    pub pp1: f64,
    pub pp2: f64,
}

#[derive(Debug, Clone, Default)]
pub struct CompareOptions {
    /// Leading trees discarded from every candidate.
    pub burnin: usize,
    /// Force a format instead of detecting it from the extension.
    pub format: Option<SampleFormat>,
}

/// One reference tree, its namespace, and its snapshot.
#[derive(Debug, Clone)]
pub struct ComparisonRun {
    pub reference_name: String,
    namespace: TaxonNamespace,
    reference: TreeSnapshot,
}

impl ComparisonRun {
    /// Read the first tree of `reference_path` and build the namespace from it.
    pub fn new<P: AsRef<Path>>(reference_path: P) -> Result<Self> {
        let raw = RawSample::read(reference_path, None)?;
        let namespace = raw.namespace()?;
        let reference_name = raw.source.clone();
        let sample = raw.into_sample(&namespace, 0)?;
        let reference = sample.trees()[0].snapshot.clone();
        Ok(ComparisonRun {
            reference_name,
            namespace,
            reference,
        })
    }

    pub fn from_newick(name: &str, newick: &str) -> Result<Self> {
        let tree = crate::snapshot::parse_newick(newick)
            .map_err(|reason| Error::malformed(name, 1, reason))?;
        let namespace = TaxonNamespace::from_tree(&tree)?;
        let reference = TreeSnapshot::from_tree(&tree, &namespace)?;
        Ok(ComparisonRun {
            reference_name: name.to_string(),
            namespace,
            reference,
        })
    }

    pub fn namespace(&self) -> &TaxonNamespace {
        &self.namespace
    }

    pub fn reference(&self) -> &TreeSnapshot {
        &self.reference
    }

    /// Expected values of [`Metric::ALL`] over `sample`, in that order.
    pub fn expected_distances(&self, sample: &PosteriorSample) -> Result<[f64; 3]> {
        let mut metrics = Metric::ALL;
        let values = expectations(&mut metrics, sample, &self.reference)?;
        Ok([values[0], values[1], values[2]])
    }

    pub fn compare_sample(&self, file: &str, sample: &PosteriorSample) -> Result<ComparisonRow> {
        let [rf_distance, weighted_rf, euclidean] = self.expected_distances(sample)?;
        Ok(ComparisonRow {
            file: file.to_string(),
            log_weight: sample.weighted.then(|| sample.log_weight_sum()),
            rf_distance,
            weighted_rf,
            euclidean,
        })
    }

    /// Expected Euclidean and weighted RF distance of one posterior.
    pub fn expected_distance_row(&self, sample: &PosteriorSample) -> Result<ExpectedDistanceRow> {
        let [_, weighted_rf, euclidean] = self.expected_distances(sample)?;
        Ok(ExpectedDistanceRow {
            euclidean_distance: euclidean,
            rf_distance: weighted_rf,
        })
    }

    fn load(&self, path: &Path, opts: &CompareOptions) -> Result<PosteriorSample> {
        let t0 = Instant::now();
        let sample = PosteriorSample::load(path, opts.format, &self.namespace, opts.burnin)?;
        log::info!(
            "Read {} trees from {} in {:.3}s",
            sample.len(),
            path.display(),
            t0.elapsed().as_secs_f64()
        );
        Ok(sample)
    }

    /// One row per candidate, in input order.
    pub fn compare<P: AsRef<Path>>(
        &self,
        candidates: &[P],
        opts: &CompareOptions,
    ) -> Result<Vec<ComparisonRow>> {
        candidates
            .iter()
            .map(|path| {
                let path = path.as_ref();
                let sample = self.load(path, opts)?;
                self.compare_sample(&path.display().to_string(), &sample)
            })
            .collect()
    }

    /// One row per retained tree of every candidate, with the tree's own log
    /// weight (0 for unweighted sources).
    pub fn compare_per_tree<P: AsRef<Path>>(
        &self,
        candidates: &[P],
        opts: &CompareOptions,
    ) -> Result<Vec<ComparisonRow>> {
        let mut rows = Vec::new();
        for path in candidates {
            let path = path.as_ref();
            let file = path.display().to_string();
            let sample = self.load(path, opts)?;
            for tree in sample.trees() {
                let mut values = [0.0; 3];
                for (value, metric) in values.iter_mut().zip(Metric::ALL) {
                    *value = metric.evaluate(&tree.snapshot, &self.reference)?;
                }
                rows.push(ComparisonRow {
                    file: file.clone(),
                    log_weight: Some(tree.log_weight),
                    rf_distance: values[0],
                    weighted_rf: values[1],
                    euclidean: values[2],
                });
            }
        }
        Ok(rows)
    }
}

#[derive(Debug, Clone)]
pub struct PosteriorOptions {
    /// Trees discarded from the start of each reference MCMC run.
    pub burnin: usize,
    pub convergence: ConvergenceOptions,
    pub format: Option<SampleFormat>,
}

impl Default for PosteriorOptions {
    fn default() -> Self {
        PosteriorOptions {
            burnin: 250,
            convergence: ConvergenceOptions::default(),
            format: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PosteriorReport {
    pub asdsf: Vec<AsdsfRow>,
    pub pp: Vec<PpRow>,
}

pub const MCMC_MCMC: &str = "mcmc-mcmc";
pub const MCMC_SMC: &str = "mcmc-smc";

/// A reference MCMC run loaded once and compared against other samples.
#[derive(Debug, Clone)]
pub struct PosteriorComparison {
    pub reference_name: String,
    namespace: TaxonNamespace,
    reference: PosteriorSample,
    opts: PosteriorOptions,
}

impl PosteriorComparison {
    /// Load `ref1` with burn-in and build the namespace from its first tree.
    pub fn new(ref1: &Path, opts: &PosteriorOptions) -> Result<Self> {
        let raw = RawSample::read(ref1, opts.format)?;
        let namespace = raw.namespace()?;
        let reference = raw.into_sample(&namespace, opts.burnin)?;
        Ok(PosteriorComparison {
            reference_name: ref1.display().to_string(),
            namespace,
            reference,
            opts: opts.clone(),
        })
    }

    pub fn namespace(&self) -> &TaxonNamespace {
        &self.namespace
    }

    /// `mcmc-mcmc` rows against a second reference run (burn-in applied).
    pub fn add_baseline(&self, ref2: &Path, report: &mut PosteriorReport) -> Result<()> {
        let other =
            PosteriorSample::load(ref2, self.opts.format, &self.namespace, self.opts.burnin)?;
        log::info!(
            "Reference runs: {} and {} trees after burn-in",
            self.reference.len(),
            other.len()
        );
        self.push_rows(report, MCMC_MCMC, &ref2.display().to_string(), &other)
    }

    /// `mcmc-smc` rows against a candidate sample, used whole.
    pub fn add_candidate(&self, path: &Path, report: &mut PosteriorReport) -> Result<()> {
        let t0 = Instant::now();
        let candidate = PosteriorSample::load(path, None, &self.namespace, 0)?;
        self.push_rows(report, MCMC_SMC, &path.display().to_string(), &candidate)?;
        log::info!(
            "Compared {} in {:.3}s",
            path.display(),
            t0.elapsed().as_secs_f64()
        );
        Ok(())
    }

    /// Baseline `ref1` vs `ref2`, then `ref1` vs every candidate.
    pub fn run<P: AsRef<Path>>(
        ref1: &Path,
        ref2: &Path,
        candidates: &[P],
        opts: &PosteriorOptions,
    ) -> Result<PosteriorReport> {
        let comparison = PosteriorComparison::new(ref1, opts)?;
        let mut report = PosteriorReport::default();
        comparison.add_baseline(ref2, &mut report)?;
        for path in candidates {
            comparison.add_candidate(path.as_ref(), &mut report)?;
        }
        Ok(report)
    }

    fn push_rows(
        &self,
        report: &mut PosteriorReport,
        kind: &str,
        file2: &str,
        other: &PosteriorSample,
    ) -> Result<()> {
        let result = convergence(&self.reference, other, &self.opts.convergence)?;
        for row in result.included() {
            log::debug!(
                "{kind} {file2} [{}]: {:.4} vs {:.4}",
                self.namespace.describe(&row.split),
                row.freq1,
                row.freq2
            );
        }
        report.asdsf.push(AsdsfRow {
            kind: kind.to_string(),
            file1: self.reference_name.clone(),
            file2: file2.to_string(),
            asdsf: result.asdsf,
            msdsf: result.msdsf,
        });
        report.pp.extend(
            pp_table_of_lod_table(&result.lod_table())
                .into_iter()
                .map(|pp| PpRow {
                    kind: kind.to_string(),
                    file1: self.reference_name.clone(),
                    file2: file2.to_string(),
                    pp1: pp.pp1,
                    pp2: pp.pp2,
                }),
        );
        Ok(())
    }
}

/// A serialisable output row with a fixed column list.
pub trait CsvRecord: Serialize {
    /// Column names, in serialisation order.
    const HEADER: &'static [&'static str];
}

impl CsvRecord for ComparisonRow {
    const HEADER: &'static [&'static str] =
        &["file", "log_weight", "rf_distance", "weighted_rf", "euclidean"];
}

impl CsvRecord for ExpectedDistanceRow {
    const HEADER: &'static [&'static str] = &["euclidean_distance", "rf_distance"];
}

impl CsvRecord for AsdsfRow {
    const HEADER: &'static [&'static str] = &["type", "file1", "file2", "asdsf", "msdsf"];
}

impl CsvRecord for PpRow {
    const HEADER: &'static [&'static str] = &["type", "file1", "file2", "pp1", "pp2"];
}

/// Write rows as CSV with a header. `-` is stdout, `.gz` is compressed.
///
/// An empty table still gets its header line.
pub fn write_csv<T: CsvRecord, P: AsRef<Path>>(path: P, rows: &[T]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(create_output(path)?);
    if rows.is_empty() {
        wtr.write_record(T::HEADER)?;
    }
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const NEXUS_RUN: &str = "#NEXUS
begin trees;
   tree gen.0 = [&U] ((A:0.1,C:0.1):0.2,B:0.1,D:0.1);
   tree gen.1 = [&U] ((A:0.1,B:0.1):0.2,C:0.1,D:0.1);
   tree gen.2 = [&U] ((A:0.1,B:0.1):0.2,C:0.1,D:0.1);
end;
";

    fn write(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn expected_distances_for_mixed_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let reference = write(dir.path(), "ml.tre", "((A:0.1,B:0.1):0.2,C:0.1,D:0.1);\n");
        let weighted = write(
            dir.path(),
            "smc.tsv",
            "0.0\t((A:0.1,B:0.1):0.2,C:0.1,D:0.1);\n0.0\t((A:0.1,C:0.1):0.2,B:0.1,D:0.1);\n",
        );
        let nexus = write(dir.path(), "run1.t", NEXUS_RUN);

        let run = ComparisonRun::new(&reference).unwrap();
        assert_eq!(run.namespace().len(), 4);

        let opts = CompareOptions {
            burnin: 1,
            format: None,
        };
        let rows = run.compare(&[&weighted, &nexus], &opts).unwrap();
        assert_eq!(rows.len(), 2);

        // weighted candidate: burn-in drops the matching tree
        assert_eq!(rows[0].rf_distance, 2.0);
        assert!((rows[0].log_weight.unwrap() - 0.0).abs() < 1e-12);
        // nexus candidate: both retained trees match the reference
        assert_eq!(rows[1].file, nexus.display().to_string());
        assert_eq!(rows[1].log_weight, None);
        assert_eq!(rows[1].rf_distance, 0.0);
        assert!(rows[1].euclidean.abs() < 1e-12);
    }

    #[test]
    fn per_tree_rows_keep_their_log_weights() {
        let dir = tempfile::tempdir().unwrap();
        let weighted = write(
            dir.path(),
            "smc.tsv",
            "-1.5\t((A,B),(C,D));\n-0.5\t((A,C),(B,D));\n",
        );
        let run = ComparisonRun::from_newick("ref", "((A,B),(C,D));").unwrap();
        let rows = run
            .compare_per_tree(&[&weighted], &CompareOptions::default())
            .unwrap();
        let summary: Vec<(Option<f64>, f64)> =
            rows.iter().map(|r| (r.log_weight, r.rf_distance)).collect();
        assert_eq!(summary, vec![(Some(-1.5), 0.0), (Some(-0.5), 2.0)]);
    }

    #[test]
    fn single_posterior_distances() {
        let run = ComparisonRun::from_newick("ref", "(A:1,B:1);").unwrap();
        let sample = PosteriorSample::from_weighted_reader(
            std::io::Cursor::new("0\t(A:1,B:1);\n0\t(A:1,B:1);\n"),
            "stdin",
            run.namespace(),
            0,
        )
        .unwrap();
        let row = run.expected_distance_row(&sample).unwrap();
        assert_eq!(row.euclidean_distance, 0.0);
        assert_eq!(row.rf_distance, 0.0);
    }

    #[test]
    fn candidate_with_foreign_taxa_fails() {
        let dir = tempfile::tempdir().unwrap();
        let bad = write(dir.path(), "bad.tsv", "0\t((A,B),(C,E));\n");
        let run = ComparisonRun::from_newick("ref", "((A,B),(C,D));").unwrap();
        let err = run.compare(&[&bad], &CompareOptions::default()).unwrap_err();
        assert!(matches!(err, Error::TaxonMismatch(_)));
    }

    #[test]
    fn posterior_comparison_rows() {
        let dir = tempfile::tempdir().unwrap();
        let run1 = write(dir.path(), "run1.t", NEXUS_RUN);
        let run2 = write(dir.path(), "run2.t", NEXUS_RUN);
        let smc = write(
            dir.path(),
            "out.sts.json",
            r#"{"trees": [
                {"newickString": "((A:1,C:1):1,B:1,D:1);", "logWeight": -2.0},
                {"newickString": "((A:1,B:1):1,C:1,D:1);", "logWeight": -2.0}
            ]}"#,
        );
        let opts = PosteriorOptions {
            burnin: 1,
            ..Default::default()
        };
        let report = PosteriorComparison::run(&run1, &run2, &[&smc], &opts).unwrap();

        assert_eq!(report.asdsf.len(), 2);
        assert_eq!(report.asdsf[0].kind, MCMC_MCMC);
        assert_eq!(report.asdsf[0].asdsf, 0.0);
        assert_eq!(report.asdsf[1].kind, MCMC_SMC);
        assert_eq!(report.asdsf[1].file2, smc.display().to_string());
        // {A,B} at 1.0 vs 0.5 and {A,C} at 0.0 vs 0.5
        assert!((report.asdsf[1].asdsf - 0.25).abs() < 1e-12);
        assert!((report.asdsf[1].msdsf - 0.25).abs() < 1e-12);

        assert_eq!(report.pp.iter().filter(|r| r.kind == MCMC_MCMC).count(), 1);
        assert_eq!(report.pp.iter().filter(|r| r.kind == MCMC_SMC).count(), 2);
        assert!(report.pp.iter().all(|r| (0.0..=1.0).contains(&r.pp1)));
    }

    #[test]
    fn csv_output_has_schema_header() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("rows.csv");
        let rows = vec![ComparisonRow {
            file: "a.t".to_string(),
            log_weight: None,
            rf_distance: 2.0,
            weighted_rf: 0.5,
            euclidean: 0.25,
        }];
        write_csv(&out, &rows).unwrap();
        let text = fs::read_to_string(&out).unwrap();
        assert_eq!(
            text,
            "file,log_weight,rf_distance,weighted_rf,euclidean\na.t,,2.0,0.5,0.25\n"
        );

        let asdsf = vec![AsdsfRow {
            kind: MCMC_MCMC.to_string(),
            file1: "r1".to_string(),
            file2: "r2".to_string(),
            asdsf: 0.0,
            msdsf: 0.0,
        }];
        write_csv(&out, &asdsf).unwrap();
        let text = fs::read_to_string(&out).unwrap();
        assert!(text.starts_with("type,file1,file2,asdsf,msdsf\n"));
    }

    /// The header `csv` derives from a serialised row.
    fn serialized_header<T: CsvRecord>(row: &T) -> Vec<String> {
        let mut wtr = csv::Writer::from_writer(vec![]);
        wtr.serialize(row).unwrap();
        let bytes = wtr.into_inner().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let first = text.lines().next().unwrap_or_default();
        first.split(',').map(str::to_string).collect()
    }

    #[test]
    fn empty_tables_keep_their_header() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("asdsf.csv");
        write_csv::<AsdsfRow, _>(&out, &[]).unwrap();
        assert_eq!(
            fs::read_to_string(&out).unwrap(),
            "type,file1,file2,asdsf,msdsf\n"
        );

        let out = dir.path().join("comp.csv");
        write_csv::<ComparisonRow, _>(&out, &[]).unwrap();
        assert_eq!(
            fs::read_to_string(&out).unwrap(),
            "file,log_weight,rf_distance,weighted_rf,euclidean\n"
        );
    }

    #[test]
    fn fixed_headers_match_serialized_fields() {
        let comparison = ComparisonRow {
            file: "a".to_string(),
            log_weight: Some(0.0),
            rf_distance: 0.0,
            weighted_rf: 0.0,
            euclidean: 0.0,
        };
        assert_eq!(serialized_header(&comparison), ComparisonRow::HEADER);
        let expected = ExpectedDistanceRow {
            euclidean_distance: 0.0,
            rf_distance: 0.0,
        };
        assert_eq!(serialized_header(&expected), ExpectedDistanceRow::HEADER);
        let asdsf = AsdsfRow {
            kind: MCMC_MCMC.to_string(),
            file1: "a".to_string(),
            file2: "b".to_string(),
            asdsf: 0.0,
            msdsf: 0.0,
        };
        assert_eq!(serialized_header(&asdsf), AsdsfRow::HEADER);
        let pp = PpRow {
            kind: MCMC_MCMC.to_string(),
            file1: "a".to_string(),
            file2: "b".to_string(),
            pp1: 0.5,
            pp2: 0.5,
        };
        assert_eq!(serialized_header(&pp), PpRow::HEADER);
    }
}
