//! Weighted posterior samples.
//!
//! A [`PosteriorSample`] is the loaded, normalised form of one tree file:
//! every retained tree encoded against the run's [`TaxonNamespace`] plus its
//! importance weight. Burn-in is discarded in encounter order *before* the
//! weights are normalised, and normalisation happens exactly once, here.
//!
//! Supported inputs ([`SampleFormat`]):
//! - `Weighted`: `<log_weight>\t<newick>` lines (SMC text output)
//! - `SmcJson`: the online sampler's JSON document (`trees[].newickString`,
//!   `trees[].logWeight`)
//! - `Nexus`: MrBayes / BEAST tree blocks, unweighted
//! - `Newick`: one unweighted tree per line

use crate::error::{Error, Result};
use crate::io::{clean_newick, open_input, parse_nexus_trees, translate_newick};
use crate::snapshot::{TreeSnapshot, encode_all, parse_newick};
use crate::taxa::TaxonNamespace;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{BufRead, Read};
use std::path::Path;

/// Input layouts understood by the loader.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum SampleFormat {
    Weighted,
    SmcJson,
    Nexus,
    Newick,
}

impl SampleFormat {
    /// Guess the layout from the file extension, ignoring a trailing `.gz`.
    ///
    /// Standard input (`-`) is read as a NEXUS tree block, the MCMC output
    /// usually piped in.
    pub fn detect<P: AsRef<Path>>(path: P) -> SampleFormat {
        if path.as_ref() == Path::new("-") {
            return SampleFormat::Nexus;
        }
        let name = path.as_ref().to_string_lossy().to_ascii_lowercase();
        let name = name.trim_end_matches(".gz");
        match name.rsplit_once('.').map(|(_, ext)| ext) {
            Some("json") => SampleFormat::SmcJson,
            Some("t" | "trees" | "nex" | "nexus") => SampleFormat::Nexus,
            Some("tsv" | "sts") => SampleFormat::Weighted,
            _ => SampleFormat::Newick,
        }
    }

    pub fn is_weighted(self) -> bool {
        matches!(self, SampleFormat::Weighted | SampleFormat::SmcJson)
    }
}

/// One tree of the online sampler's JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmcTree {
    pub newick_string: String,
    pub log_weight: f64,
    #[serde(rename = "particleID", default)]
    pub particle_id: Option<usize>,
    #[serde(default)]
    pub tree_length: Option<f64>,
}

/// Per-generation diagnostics of the online sampler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmcGeneration {
    #[serde(rename = "T", default)]
    pub t: usize,
    pub ess: f64,
    #[serde(default)]
    pub unique_particles: usize,
    #[serde(default)]
    pub sequence: String,
    #[serde(default)]
    pub total_update_partials_calls: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmcProposal {
    #[serde(rename = "T")]
    pub t: usize,
    #[serde(rename = "particleID", default)]
    pub particle_id: Option<usize>,
    pub new_log_like: f64,
}

/// The online sampler's JSON document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SmcOutput {
    pub trees: Vec<SmcTree>,
    #[serde(default)]
    pub generations: Vec<SmcGeneration>,
    #[serde(default)]
    pub proposals: Vec<SmcProposal>,
}

impl SmcOutput {
    pub fn from_reader<R: Read>(reader: R, source: &str) -> Result<Self> {
        serde_json::from_reader(reader)
            .map_err(|e| Error::malformed(source, e.line(), e.to_string()))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let source = path.as_ref().display().to_string();
        Self::from_reader(open_input(&path)?, &source)
    }
}

/// A weight/topology pair as read from disk, before encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    /// 1-based position in the source (line number or tree ordinal).
    pub record: usize,
    pub log_weight: f64,
    pub newick: String,
}

/// Records of one source, not yet bound to a namespace.
#[derive(Debug, Clone)]
pub struct RawSample {
    pub source: String,
    pub weighted: bool,
    pub records: Vec<RawRecord>,
    pub translate: Option<HashMap<String, String>>,
}

impl RawSample {
    pub fn read<P: AsRef<Path>>(path: P, format: Option<SampleFormat>) -> Result<Self> {
        let path = path.as_ref();
        let format = format.unwrap_or_else(|| SampleFormat::detect(path));
        let source = path.display().to_string();
        Self::from_reader(open_input(path)?, &source, format)
    }

    pub fn from_reader<R: BufRead>(
        mut reader: R,
        source: &str,
        format: SampleFormat,
    ) -> Result<Self> {
        let mut translate = None;
        let records = match format {
            SampleFormat::Weighted => read_weighted_lines(reader, source)?,
            SampleFormat::SmcJson => SmcOutput::from_reader(reader, source)?
                .trees
                .into_iter()
                .enumerate()
                .map(|(i, t)| RawRecord {
                    record: i + 1,
                    log_weight: t.log_weight,
                    newick: t.newick_string,
                })
                .collect(),
            SampleFormat::Nexus => {
                let mut content = String::new();
                reader.read_to_string(&mut content)?;
                let nexus = parse_nexus_trees(&content);
                if !nexus.translate.is_empty() {
                    translate = Some(nexus.translate);
                }
                nexus
                    .trees
                    .into_iter()
                    .enumerate()
                    .map(|(i, t)| RawRecord {
                        record: i + 1,
                        log_weight: 0.0,
                        newick: t.newick,
                    })
                    .collect()
            }
            SampleFormat::Newick => read_newick_lines(reader)?,
        };
        Ok(RawSample {
            source: source.to_string(),
            weighted: format.is_weighted(),
            records,
            translate,
        })
    }

    /// Namespace spanning the leaves of the first record.
    pub fn namespace(&self) -> Result<TaxonNamespace> {
        let first = self
            .records
            .first()
            .ok_or_else(|| Error::EmptySample(self.source.clone()))?;
        let mut tree = parse_newick(&first.newick)
            .map_err(|reason| Error::malformed(&self.source, first.record, reason))?;
        if let Some(table) = &self.translate {
            crate::io::rename_leaf_nodes(&mut tree, table);
        }
        TaxonNamespace::from_tree(&tree)
    }

    pub fn into_sample(self, ns: &TaxonNamespace, burnin: usize) -> Result<PosteriorSample> {
        PosteriorSample::build(
            &self.source,
            self.records,
            ns,
            burnin,
            self.weighted,
            self.translate.as_ref(),
        )
    }
}

fn read_weighted_lines<R: BufRead>(reader: R, source: &str) -> Result<Vec<RawRecord>> {
    let mut records = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(parse_weighted_line(&line, i + 1, source)?);
    }
    Ok(records)
}

/// Parse `<log_weight>\t<newick>`.
pub fn parse_weighted_line(line: &str, record: usize, source: &str) -> Result<RawRecord> {
    let (weight, newick) = line
        .split_once('\t')
        .ok_or_else(|| Error::malformed(source, record, "expected '<log_weight>\\t<newick>'"))?;
    let newick = newick.trim();
    if newick.is_empty() || newick.contains('\t') {
        return Err(Error::malformed(
            source,
            record,
            "expected exactly one weight and one tree",
        ));
    }
    let log_weight = weight
        .trim()
        .parse::<f64>()
        .map_err(|e| Error::malformed(source, record, format!("bad log weight '{weight}': {e}")))?;
    Ok(RawRecord {
        record,
        log_weight,
        newick: newick.to_string(),
    })
}

fn read_newick_lines<R: BufRead>(reader: R) -> Result<Vec<RawRecord>> {
    let mut records = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(RawRecord {
            record: i + 1,
            log_weight: 0.0,
            newick: line.trim().to_string(),
        });
    }
    Ok(records)
}

/// One retained tree and its weights.
#[derive(Debug, Clone)]
pub struct WeightedTree {
    pub snapshot: TreeSnapshot,
    /// Comment-free Newick with leaves already renamed through TRANSLATE.
    pub newick: String,
    pub log_weight: f64,
    /// `exp(log_weight - max_log_weight)`, not normalised.
    pub weight: f64,
}

/// A loaded, burn-in-trimmed, normalised tree sample.
#[derive(Debug, Clone)]
pub struct PosteriorSample {
    pub source: String,
    pub weighted: bool,
    pub burnin: usize,
    trees: Vec<WeightedTree>,
    max_log_weight: f64,
    weight_sum: f64,
}

impl PosteriorSample {
    pub fn from_weighted_reader<R: BufRead>(
        reader: R,
        source: &str,
        ns: &TaxonNamespace,
        burnin: usize,
    ) -> Result<Self> {
        RawSample::from_reader(reader, source, SampleFormat::Weighted)?.into_sample(ns, burnin)
    }

    pub fn from_smc_json_reader<R: BufRead>(
        reader: R,
        source: &str,
        ns: &TaxonNamespace,
        burnin: usize,
    ) -> Result<Self> {
        RawSample::from_reader(reader, source, SampleFormat::SmcJson)?.into_sample(ns, burnin)
    }

    pub fn from_nexus_reader<R: BufRead>(
        reader: R,
        source: &str,
        ns: &TaxonNamespace,
        burnin: usize,
    ) -> Result<Self> {
        RawSample::from_reader(reader, source, SampleFormat::Nexus)?.into_sample(ns, burnin)
    }

    pub fn from_newick_reader<R: BufRead>(
        reader: R,
        source: &str,
        ns: &TaxonNamespace,
        burnin: usize,
    ) -> Result<Self> {
        RawSample::from_reader(reader, source, SampleFormat::Newick)?.into_sample(ns, burnin)
    }

    /// Load a file, detecting the format from its extension unless given.
    pub fn load<P: AsRef<Path>>(
        path: P,
        format: Option<SampleFormat>,
        ns: &TaxonNamespace,
        burnin: usize,
    ) -> Result<Self> {
        RawSample::read(path, format)?.into_sample(ns, burnin)
    }

    /// Build a sample from already-split records.
    pub fn from_records(
        source: &str,
        records: Vec<RawRecord>,
        ns: &TaxonNamespace,
        burnin: usize,
        weighted: bool,
    ) -> Result<Self> {
        Self::build(source, records, ns, burnin, weighted, None)
    }

    fn build(
        source: &str,
        records: Vec<RawRecord>,
        ns: &TaxonNamespace,
        burnin: usize,
        weighted: bool,
        translate: Option<&HashMap<String, String>>,
    ) -> Result<Self> {
        let retained: Vec<RawRecord> = records.into_iter().skip(burnin).collect();
        if retained.is_empty() {
            return Err(Error::EmptySample(source.to_string()));
        }

        let newicks: Vec<&str> = retained.iter().map(|r| r.newick.as_str()).collect();
        let snapshots = encode_all(&newicks, ns, translate);

        let mut trees = Vec::with_capacity(retained.len());
        for (raw, snapshot) in retained.iter().zip(snapshots) {
            let snapshot = snapshot.map_err(|e| locate(e, source, raw.record))?;
            let log_weight = if weighted { raw.log_weight } else { 0.0 };
            let cleaned = clean_newick(&raw.newick);
            let newick = match translate {
                Some(table) => translate_newick(&cleaned, table),
                None => cleaned,
            };
            trees.push(WeightedTree {
                snapshot,
                newick,
                log_weight,
                weight: 0.0,
            });
        }

        let (max_log_weight, weight_sum) = normalize(&mut trees, source)?;
        log::debug!(
            "{source}: kept {} trees after discarding {burnin}",
            trees.len()
        );

        Ok(PosteriorSample {
            source: source.to_string(),
            weighted,
            burnin,
            trees,
            max_log_weight,
            weight_sum,
        })
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    pub fn trees(&self) -> &[WeightedTree] {
        &self.trees
    }

    pub fn weight_sum(&self) -> f64 {
        self.weight_sum
    }

    pub fn max_log_weight(&self) -> f64 {
        self.max_log_weight
    }

    pub fn normalized_weight(&self, i: usize) -> f64 {
        self.trees[i].weight / self.weight_sum
    }

    pub fn normalized_weights(&self) -> Vec<f64> {
        self.trees
            .iter()
            .map(|t| t.weight / self.weight_sum)
            .collect()
    }

    /// `log Σ exp(log_weight)` over the retained trees.
    pub fn log_weight_sum(&self) -> f64 {
        self.max_log_weight + self.weight_sum.ln()
    }

    /// Kish effective sample size, `(Σw)² / Σw²`.
    pub fn effective_sample_size(&self) -> f64 {
        let sum_sq: f64 = self.trees.iter().map(|t| t.weight * t.weight).sum();
        self.weight_sum * self.weight_sum / sum_sq
    }
}

/// Rewrite an encoding error so it names the file and record.
fn locate(err: Error, source: &str, record: usize) -> Error {
    match err {
        Error::MalformedRecord { reason, .. } => Error::malformed(source, record, reason),
        Error::Tree(e) => Error::malformed(source, record, e.to_string()),
        Error::TaxonMismatch(msg) => {
            Error::TaxonMismatch(format!("{source} record {record}: {msg}"))
        }
        other => other,
    }
}

/// Fill in `weight = exp(log_weight - max)`; returns `(max, Σ weight)`.
///
/// A log weight of `-inf` is a zero weight; NaN or `+inf` is rejected.
fn normalize(trees: &mut [WeightedTree], source: &str) -> Result<(f64, f64)> {
    if let Some(bad) = trees
        .iter()
        .find(|t| t.log_weight.is_nan() || t.log_weight == f64::INFINITY)
    {
        return Err(Error::degenerate(
            source,
            format!("log weight {} is not usable", bad.log_weight),
        ));
    }
    let max = trees
        .iter()
        .map(|t| t.log_weight)
        .fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return Err(Error::degenerate(source, "every log weight is -inf"));
    }

    let mut sum: f64 = 0.0;
    for t in trees.iter_mut() {
        t.weight = (t.log_weight - max).exp();
        sum += t.weight;
    }
    if !(sum.is_finite() && sum > 0.0) {
        return Err(Error::degenerate(source, format!("weight sum is {sum}")));
    }
    Ok((max, sum))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::{Cursor, Write};

    fn ns4() -> TaxonNamespace {
        TaxonNamespace::from_labels(["A", "B", "C", "D"]).unwrap()
    }

    fn rec(record: usize, log_weight: f64, newick: &str) -> RawRecord {
        RawRecord {
            record,
            log_weight,
            newick: newick.to_string(),
        }
    }

    #[test]
    fn weighted_lines_are_normalised() {
        let text = "0.0\t((A,B),(C,D));\n\n-0.6931471805599453\t((A,C),(B,D));\n";
        let sample =
            PosteriorSample::from_weighted_reader(Cursor::new(text), "mem", &ns4(), 0).unwrap();
        assert_eq!(sample.len(), 2);
        let w = sample.normalized_weights();
        assert!((w[0] - 2.0 / 3.0).abs() < 1e-12);
        assert!((w[1] - 1.0 / 3.0).abs() < 1e-12);
        assert!((w.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!((sample.log_weight_sum() - 1.5f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn burnin_discards_leading_records_before_normalising() {
        let records = vec![
            rec(1, 50.0, "((A,B),(C,D));"),
            rec(2, 0.0, "((A,B),(C,D));"),
            rec(3, 0.0, "((A,C),(B,D));"),
            rec(4, 0.0, "((A,D),(B,C));"),
        ];
        let sample = PosteriorSample::from_records("mem", records, &ns4(), 1, true).unwrap();
        assert_eq!(sample.len(), 3);
        for w in sample.normalized_weights() {
            assert!((w - 1.0 / 3.0).abs() < 1e-12);
        }
        assert_eq!(sample.trees()[0].newick, "((A,B),(C,D));");
        assert_eq!(sample.max_log_weight(), 0.0);
    }

    #[test]
    fn burnin_past_the_end_is_an_empty_sample() {
        let records = vec![rec(1, 0.0, "((A,B),(C,D));")];
        let err = PosteriorSample::from_records("mem", records, &ns4(), 1, true).unwrap_err();
        assert!(matches!(err, Error::EmptySample(_)));
    }

    #[test]
    fn missing_tab_is_malformed() {
        let err = PosteriorSample::from_weighted_reader(
            Cursor::new("0.0 ((A,B),(C,D));\n"),
            "mem",
            &ns4(),
            0,
        )
        .unwrap_err();
        assert!(matches!(err, Error::MalformedRecord { record: 1, .. }));
    }

    #[test]
    fn unparsable_weight_is_malformed() {
        let err = parse_weighted_line("heavy\t(A,B);", 7, "mem").unwrap_err();
        assert!(matches!(err, Error::MalformedRecord { record: 7, .. }));
    }

    #[test]
    fn bad_newick_reports_its_record() {
        let text = "0.0\t((A,B),(C,D));\n0.0\t((A,B),(C,D)\n";
        let err =
            PosteriorSample::from_weighted_reader(Cursor::new(text), "mem", &ns4(), 0).unwrap_err();
        match err {
            Error::MalformedRecord {
                source_name,
                record,
                ..
            } => {
                assert_eq!(source_name, "mem");
                assert_eq!(record, 2);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn foreign_taxon_is_a_mismatch() {
        let records = vec![rec(1, 0.0, "((A,B),(C,E));")];
        let err = PosteriorSample::from_records("mem", records, &ns4(), 0, true).unwrap_err();
        assert!(matches!(err, Error::TaxonMismatch(_)));
    }

    #[test]
    fn nan_log_weight_is_degenerate() {
        let records = vec![rec(1, f64::NAN, "((A,B),(C,D));")];
        let err = PosteriorSample::from_records("mem", records, &ns4(), 0, true).unwrap_err();
        assert!(matches!(err, Error::DegenerateWeight { .. }));
    }

    #[test]
    fn negative_infinity_is_a_zero_weight() {
        let records = vec![
            rec(1, f64::NEG_INFINITY, "((A,B),(C,D));"),
            rec(2, -3.0, "((A,C),(B,D));"),
        ];
        let sample = PosteriorSample::from_records("mem", records, &ns4(), 0, true).unwrap();
        assert_eq!(sample.normalized_weights(), vec![0.0, 1.0]);
        assert_eq!(sample.effective_sample_size(), 1.0);
    }

    #[test]
    fn unweighted_sources_ignore_log_weights() {
        let records = vec![rec(1, 5.0, "((A,B),(C,D));"), rec(2, 0.0, "((A,C),(B,D));")];
        let sample = PosteriorSample::from_records("mem", records, &ns4(), 0, false).unwrap();
        assert_eq!(sample.normalized_weights(), vec![0.5, 0.5]);
        assert_eq!(sample.effective_sample_size(), 2.0);
    }

    #[test]
    fn smc_json_document() {
        let json = r#"{
            "trees": [
                {"newickString": "((A:1,B:1):1,C:1,D:1);", "logWeight": -1.0, "particleID": 3},
                {"newickString": "((A:1,C:1):1,B:1,D:1);", "logWeight": -1.0, "treeLength": 5.0}
            ],
            "generations": [{"T": 1, "ess": 1.8, "uniqueParticles": 2, "sequence": "D"}]
        }"#;
        let sample =
            PosteriorSample::from_smc_json_reader(Cursor::new(json), "run.json", &ns4(), 0)
                .unwrap();
        assert!(sample.weighted);
        assert_eq!(sample.normalized_weights(), vec![0.5, 0.5]);

        let doc = SmcOutput::from_reader(Cursor::new(json), "run.json").unwrap();
        assert_eq!(doc.trees[0].particle_id, Some(3));
        assert_eq!(doc.generations[0].sequence, "D");
        assert!(doc.proposals.is_empty());
    }

    #[test]
    fn smc_json_missing_field_is_malformed() {
        let json = r#"{"trees": [{"newickString": "((A,B),(C,D));"}]}"#;
        let err = PosteriorSample::from_smc_json_reader(Cursor::new(json), "run.json", &ns4(), 0)
            .unwrap_err();
        assert!(matches!(err, Error::MalformedRecord { .. }));
    }

    #[test]
    fn nexus_file_with_translate_and_burnin() {
        let nexus = "#NEXUS
begin trees;
   translate
       1 A,
       2 B,
       3 C,
       4 D;
   tree gen.0 = [&U] ((1:0.1,3:0.1):0.2,2:0.1,4:0.1);
   tree gen.100 = [&U] ((1:0.1,2:0.1):0.2,3:0.1,4:0.1);
   tree gen.200 = [&U] ((1:0.1,2:0.1):0.2,3:0.1,4:0.1);
end;
";
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run1.t");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(nexus.as_bytes())
            .unwrap();

        let raw = RawSample::read(&path, None).unwrap();
        assert!(!raw.weighted);
        assert_eq!(raw.namespace().unwrap().labels(), ["A", "B", "C", "D"]);

        let sample = PosteriorSample::load(&path, None, &ns4(), 1).unwrap();
        assert_eq!(sample.len(), 2);
        assert_eq!(sample.trees()[0].snapshot.parts.len(), 1);
        assert_eq!(
            sample.trees()[0].newick,
            "((A:0.1,B:0.1):0.2,C:0.1,D:0.1);"
        );
    }

    #[test]
    fn beast_trees_with_annotated_headers() {
        let beast = "#NEXUS
Begin trees;
\tTranslate
\t\t1 A,
\t\t2 B,
\t\t3 C,
\t\t4 D
\t\t;
tree STATE_0 [&lnP=-1234.5,posterior=-1200.0] = [&R] ((1:1,2:1):1,(3:1,4:1):1);
tree STATE_1000 [&lnP=-1230.0,posterior=-1190.0] = [&R] ((1:1,3:1):1,(2:1,4:1):1);
End;
";
        let sample =
            PosteriorSample::from_nexus_reader(Cursor::new(beast), "beast.trees", &ns4(), 0)
                .unwrap();
        assert_eq!(sample.len(), 2);
        assert_eq!(sample.normalized_weights(), vec![0.5, 0.5]);
    }

    #[test]
    fn newick_lines() {
        let text = "((A,B),(C,D));\n((A,B),(C,D));\n";
        let sample =
            PosteriorSample::from_newick_reader(Cursor::new(text), "mem", &ns4(), 0).unwrap();
        assert_eq!(sample.len(), 2);
        assert!(!sample.weighted);
    }

    #[test]
    fn format_detection() {
        assert_eq!(SampleFormat::detect("a/run.sts.json"), SampleFormat::SmcJson);
        assert_eq!(SampleFormat::detect("a/run1.t"), SampleFormat::Nexus);
        assert_eq!(SampleFormat::detect("a/run1.trees.gz"), SampleFormat::Nexus);
        assert_eq!(SampleFormat::detect("a/out.tsv"), SampleFormat::Weighted);
        assert_eq!(SampleFormat::detect("a/ml.tre"), SampleFormat::Newick);
        assert_eq!(SampleFormat::detect("-"), SampleFormat::Nexus);
    }

    proptest! {
        #[test]
        fn shifting_log_weights_keeps_normalised_weights(
            lws in proptest::collection::vec(-50.0f64..50.0, 1..8),
            shift in -100.0f64..100.0,
        ) {
            let make = |delta: f64| {
                lws.iter()
                    .enumerate()
                    .map(|(i, lw)| rec(i + 1, lw + delta, "((A,B),(C,D));"))
                    .collect::<Vec<_>>()
            };
            let a = PosteriorSample::from_records("a", make(0.0), &ns4(), 0, true).unwrap();
            let b = PosteriorSample::from_records("b", make(shift), &ns4(), 0, true).unwrap();
            let total: f64 = a.normalized_weights().iter().sum();
            prop_assert!((total - 1.0).abs() < 1e-9);
            for (wa, wb) in a.normalized_weights().iter().zip(b.normalized_weights()) {
                prop_assert!(*wa >= 0.0);
                prop_assert!((wa - wb).abs() < 1e-9);
            }
        }
    }
}
