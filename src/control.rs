//! Control records written per SMC run, and the reports derived from them.

use crate::compare::CsvRecord;
use crate::error::{Error, Result};
use crate::io::{create_output, open_input, rename_leaf_nodes};
use crate::sample::{RawSample, SmcOutput};
use crate::snapshot::parse_newick;
use crate::taxa::normalize_label;
use phylotree::tree::Tree as PhyloTree;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Metadata of one SMC run, saved as `control.json` next to its output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlRecord {
    pub proposal_method_name: String,
    pub trim_count: usize,
    pub keep_count: usize,
    pub trim_taxon: String,
    pub particle_factor: usize,
    pub n_taxa: usize,
    pub tree: String,
    pub sts_online: Vec<String>,
    /// Wall-clock seconds of the SMC run.
    pub time: f64,
}

impl ControlRecord {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(serde_json::from_reader(open_input(path)?)?)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut out = create_output(path)?;
        serde_json::to_writer(&mut out, self)?;
        out.flush()?;
        Ok(())
    }

    /// SMC outputs resolved against the control file's directory.
    fn outputs(&self, control_path: &Path) -> Vec<PathBuf> {
        let dir = control_path.parent().unwrap_or(Path::new(""));
        self.sts_online
            .iter()
            .map(|f| match Path::new(f).file_name() {
                Some(name) => dir.join(name),
                None => PathBuf::from(f),
            })
            .collect()
    }
}

/// Diagnostics of one SMC generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EssRow {
    pub proposal_method_name: String,
    pub trim_count: usize,
    pub trim_taxon: String,
    pub particle_factor: usize,
    pub n_taxa: usize,
    pub generation: usize,
    pub ess: f64,
    pub unique_particles: usize,
    pub sequence: String,
}

/// Final-generation summary of one SMC output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LastEssRow {
    pub proposal_method_name: String,
    pub trim_count: usize,
    pub keep_count: usize,
    pub trim_taxon: String,
    pub particle_factor: usize,
    pub n_taxa: usize,
    pub tree: String,
    pub last_ess: f64,
    pub likelihood_calls: u64,
    pub sts_json: String,
}

/// Pendant edge length, in the reference tree, of the taxon added at each
/// SMC generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendantRow {
    pub tree: String,
    pub posterior: String,
    pub generation: usize,
    pub pruned_taxon: String,
    pub pendant_bl: f64,
    pub ess: f64,
}

/// Proposal log-likelihood of each final particle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbRow {
    pub trim_taxon: String,
    pub n_taxa: usize,
    pub trim_count: usize,
    pub particle_factor: usize,
    pub proposal_method_name: String,
    #[serde(rename = "logP")]
    pub log_p: f64,
}

impl CsvRecord for EssRow {
    const HEADER: &'static [&'static str] = &[
        "proposal_method_name",
        "trim_count",
        "trim_taxon",
        "particle_factor",
        "n_taxa",
        "generation",
        "ess",
        "unique_particles",
        "sequence",
    ];
}

impl CsvRecord for LastEssRow {
    const HEADER: &'static [&'static str] = &[
        "proposal_method_name",
        "trim_count",
        "keep_count",
        "trim_taxon",
        "particle_factor",
        "n_taxa",
        "tree",
        "last_ess",
        "likelihood_calls",
        "sts_json",
    ];
}

impl CsvRecord for PendantRow {
    const HEADER: &'static [&'static str] = &[
        "tree",
        "posterior",
        "generation",
        "pruned_taxon",
        "pendant_bl",
        "ess",
    ];
}

impl CsvRecord for ProbRow {
    const HEADER: &'static [&'static str] = &[
        "trim_taxon",
        "n_taxa",
        "trim_count",
        "particle_factor",
        "proposal_method_name",
        "logP",
    ];
}

/// Every SMC output listed by `controls`, paired with its record.
///
/// Outputs that cannot be read are logged and skipped; a bad control file
/// is an error.
fn smc_outputs<P: AsRef<Path>>(
    controls: &[P],
) -> Result<Vec<(ControlRecord, PathBuf, SmcOutput)>> {
    let mut found = Vec::new();
    for control_path in controls {
        let control_path = control_path.as_ref();
        let record = ControlRecord::load(control_path)?;
        for path in record.outputs(control_path) {
            match SmcOutput::load(&path) {
                Ok(output) => found.push((record.clone(), path, output)),
                Err(e) => log::warn!("Skipping {}: {e}", path.display()),
            }
        }
    }
    Ok(found)
}

/// One row per generation of every SMC output.
pub fn ess_rows<P: AsRef<Path>>(controls: &[P]) -> Result<Vec<EssRow>> {
    let mut rows = Vec::new();
    for (record, _, output) in smc_outputs(controls)? {
        rows.extend(output.generations.iter().map(|g| EssRow {
            proposal_method_name: record.proposal_method_name.clone(),
            trim_count: record.trim_count,
            trim_taxon: record.trim_taxon.clone(),
            particle_factor: record.particle_factor,
            n_taxa: record.n_taxa,
            generation: g.t,
            ess: g.ess,
            unique_particles: g.unique_particles,
            sequence: g.sequence.clone(),
        }));
    }
    Ok(rows)
}

/// One row per SMC output, from its last generation.
pub fn last_ess_rows<P: AsRef<Path>>(controls: &[P]) -> Result<Vec<LastEssRow>> {
    let mut rows = Vec::new();
    for (record, path, output) in smc_outputs(controls)? {
        let Some(last) = output.generations.last() else {
            log::warn!("Skipping {}: no generations", path.display());
            continue;
        };
        rows.push(LastEssRow {
            proposal_method_name: record.proposal_method_name.clone(),
            trim_count: record.trim_count,
            keep_count: record.keep_count,
            trim_taxon: record.trim_taxon.clone(),
            particle_factor: record.particle_factor,
            n_taxa: record.n_taxa,
            tree: record.tree.clone(),
            last_ess: last.ess,
            likelihood_calls: last.total_update_partials_calls,
            sts_json: path.display().to_string(),
        });
    }
    Ok(rows)
}

/// Own edge length of every named leaf of `tree`, keyed by normalised label.
///
/// Read from the rooted node graph, so a leaf hanging off a bifurcating root
/// keeps its own edge instead of the merged root split.
fn leaf_edge_lengths(tree: &PhyloTree) -> Result<HashMap<String, f64>> {
    let mut lengths = HashMap::new();
    for id in tree.get_leaves() {
        let node = tree.get(&id)?;
        if let Some(name) = node.name.as_deref() {
            lengths.insert(
                normalize_label(name).to_string(),
                node.parent_edge.unwrap_or(0.0),
            );
        }
    }
    Ok(lengths)
}

/// Pendant branch length of each generation's added taxon in `reference_tree`.
pub fn pendant_rows<P: AsRef<Path>>(
    reference_tree: &Path,
    outputs: &[P],
) -> Result<Vec<PendantRow>> {
    let raw = RawSample::read(reference_tree, None)?;
    let first = raw
        .records
        .first()
        .ok_or_else(|| Error::EmptySample(raw.source.clone()))?;
    let mut parsed = parse_newick(&first.newick)
        .map_err(|reason| Error::malformed(&raw.source, first.record, reason))?;
    if let Some(table) = &raw.translate {
        rename_leaf_nodes(&mut parsed, table);
    }
    let pendant = leaf_edge_lengths(&parsed)?;
    let tree = reference_tree.display().to_string();

    let mut rows = Vec::new();
    for path in outputs {
        let path = path.as_ref();
        let output = SmcOutput::load(path)?;
        for (generation, g) in output.generations.iter().enumerate() {
            let pendant_bl = *pendant.get(normalize_label(&g.sequence)).ok_or_else(|| {
                Error::TaxonMismatch(format!("'{}' is not a leaf of {tree}", g.sequence))
            })?;
            rows.push(PendantRow {
                tree: tree.clone(),
                posterior: path.display().to_string(),
                generation,
                pruned_taxon: g.sequence.clone(),
                pendant_bl,
                ess: g.ess,
            });
        }
    }
    Ok(rows)
}

/// `newLogLike` of the generation-`trim_count` proposal behind each final
/// particle, in tree order.
pub fn proposal_log_likelihoods(
    output: &SmcOutput,
    trim_count: usize,
    source: &str,
) -> Result<Vec<f64>> {
    let log_likes: Vec<f64> = output
        .proposals
        .iter()
        .filter(|p| p.t == trim_count)
        .map(|p| p.new_log_like)
        .collect();
    output
        .trees
        .iter()
        .enumerate()
        .map(|(i, tree)| {
            let id = tree
                .particle_id
                .ok_or_else(|| Error::malformed(source, i + 1, "tree has no particleID"))?;
            log_likes.get(id).copied().ok_or_else(|| {
                Error::malformed(
                    source,
                    i + 1,
                    format!("no generation-{trim_count} proposal for particle {id}"),
                )
            })
        })
        .collect()
}

impl ControlRecord {
    pub fn prob_rows(&self, log_likes: &[f64]) -> Vec<ProbRow> {
        log_likes
            .iter()
            .map(|&log_p| ProbRow {
                trim_taxon: self.trim_taxon.clone(),
                n_taxa: self.n_taxa,
                trim_count: self.trim_count,
                particle_factor: self.particle_factor,
                proposal_method_name: self.proposal_method_name.clone(),
                log_p,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const SMC_JSON: &str = r#"{
        "trees": [
            {"newickString": "((A:1,B:1):1,C:1,D:1);", "logWeight": -1.0, "particleID": 1},
            {"newickString": "((A:1,B:1):1,C:1,D:1);", "logWeight": -1.0, "particleID": 0}
        ],
        "generations": [
            {"T": 1, "ess": 1.5, "uniqueParticles": 2, "sequence": "C", "totalUpdatePartialsCalls": 10},
            {"T": 2, "ess": 1.9, "uniqueParticles": 1, "sequence": "D", "totalUpdatePartialsCalls": 25}
        ],
        "proposals": [
            {"T": 1, "newLogLike": -100.0},
            {"T": 2, "newLogLike": -20.0},
            {"T": 2, "newLogLike": -21.0}
        ]
    }"#;

    fn record(outputs: Vec<String>) -> ControlRecord {
        ControlRecord {
            proposal_method_name: "lcfit".to_string(),
            trim_count: 2,
            keep_count: 2,
            trim_taxon: "t3-t4".to_string(),
            particle_factor: 5,
            n_taxa: 4,
            tree: "trees/4taxon-01.nwk".to_string(),
            sts_online: outputs,
            time: 1.25,
        }
    }

    #[test]
    fn control_record_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("control.json");
        let rec = record(vec!["x.sts.json".to_string()]);
        rec.write(&path).unwrap();
        assert_eq!(ControlRecord::load(&path).unwrap(), rec);
    }

    #[test]
    fn ess_rows_skip_missing_outputs() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("run.sts.json"), SMC_JSON).unwrap();
        let control = dir.path().join("control.json");
        // stored paths are resolved against the control file's directory
        record(vec![
            "elsewhere/run.sts.json".to_string(),
            "missing.sts.json".to_string(),
        ])
        .write(&control)
        .unwrap();

        let rows = ess_rows(&[&control]).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].generation, 2);
        assert_eq!(rows[1].sequence, "D");
        assert_eq!(rows[0].unique_particles, 2);

        let last = last_ess_rows(&[&control]).unwrap();
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].last_ess, 1.9);
        assert_eq!(last[0].likelihood_calls, 25);
    }

    #[test]
    fn pendant_branch_lengths() {
        let dir = tempfile::tempdir().unwrap();
        let tree = dir.path().join("ref.nwk");
        fs::write(&tree, "((A:1,B:2):0.5,C:3,D:4);\n").unwrap();
        let sts = dir.path().join("run.sts.json");
        fs::write(&sts, SMC_JSON).unwrap();

        let rows = pendant_rows(&tree, &[&sts]).unwrap();
        let got: Vec<(usize, &str, f64)> = rows
            .iter()
            .map(|r| (r.generation, r.pruned_taxon.as_str(), r.pendant_bl))
            .collect();
        assert_eq!(got, vec![(0, "C", 3.0), (1, "D", 4.0)]);
        assert_eq!(rows[1].ess, 1.9);
    }

    #[test]
    fn pendant_length_next_to_a_rooted_split_is_the_leaf_edge() {
        let dir = tempfile::tempdir().unwrap();
        let tree = dir.path().join("rooted.nwk");
        fs::write(&tree, "(A:1,((B:1,C:1):1,D:1):2);\n").unwrap();
        let sts = dir.path().join("run.sts.json");
        fs::write(
            &sts,
            r#"{"trees": [], "generations": [
                {"T": 1, "ess": 2.0, "uniqueParticles": 2, "sequence": "A"},
                {"T": 2, "ess": 1.5, "uniqueParticles": 1, "sequence": "D"}
            ]}"#,
        )
        .unwrap();

        let rows = pendant_rows(&tree, &[&sts]).unwrap();
        assert_eq!(rows[0].pendant_bl, 1.0);
        assert_eq!(rows[1].pendant_bl, 1.0);
    }

    #[test]
    fn pendant_length_of_unknown_taxon_fails() {
        let dir = tempfile::tempdir().unwrap();
        let tree = dir.path().join("ref.nwk");
        fs::write(&tree, "((A:1,B:2):0.5,C:3,D:4);\n").unwrap();
        let sts = dir.path().join("run.sts.json");
        fs::write(
            &sts,
            r#"{"trees": [], "generations": [{"T": 1, "ess": 2.0, "uniqueParticles": 2, "sequence": "Z"}]}"#,
        )
        .unwrap();
        let err = pendant_rows(&tree, &[&sts]).unwrap_err();
        assert!(matches!(err, Error::TaxonMismatch(_)));
    }

    #[test]
    fn proposal_log_likelihoods_follow_particle_ids() {
        let output: SmcOutput = serde_json::from_str(SMC_JSON).unwrap();
        let lls = proposal_log_likelihoods(&output, 2, "run").unwrap();
        assert_eq!(lls, vec![-21.0, -20.0]);

        let rows = record(vec![]).prob_rows(&lls);
        assert_eq!(rows[0].log_p, -21.0);
        assert_eq!(rows[0].trim_taxon, "t3-t4");

        let err = proposal_log_likelihoods(&output, 1, "run").unwrap_err();
        assert!(matches!(err, Error::MalformedRecord { record: 1, .. }));
    }

    fn header_line<T: CsvRecord>(row: &T) -> String {
        let mut wtr = csv::Writer::from_writer(vec![]);
        wtr.serialize(row).unwrap();
        let text = String::from_utf8(wtr.into_inner().unwrap()).unwrap();
        text.lines().next().unwrap_or_default().to_string()
    }

    #[test]
    fn report_headers_match_serialized_fields() {
        let ess = EssRow {
            proposal_method_name: "m".to_string(),
            trim_count: 1,
            trim_taxon: "t".to_string(),
            particle_factor: 1,
            n_taxa: 4,
            generation: 0,
            ess: 1.0,
            unique_particles: 1,
            sequence: "s".to_string(),
        };
        assert_eq!(header_line(&ess), EssRow::HEADER.join(","));
        let last = LastEssRow {
            proposal_method_name: "m".to_string(),
            trim_count: 1,
            keep_count: 3,
            trim_taxon: "t".to_string(),
            particle_factor: 1,
            n_taxa: 4,
            tree: "tree0".to_string(),
            last_ess: 1.0,
            likelihood_calls: 10,
            sts_json: "x.json".to_string(),
        };
        assert_eq!(header_line(&last), LastEssRow::HEADER.join(","));
        let pendant = PendantRow {
            tree: "tree0".to_string(),
            posterior: "x.json".to_string(),
            generation: 1,
            pruned_taxon: "D".to_string(),
            pendant_bl: 0.5,
            ess: 1.0,
        };
        assert_eq!(header_line(&pendant), PendantRow::HEADER.join(","));
        let prob = ProbRow {
            trim_taxon: "t".to_string(),
            n_taxa: 4,
            trim_count: 1,
            particle_factor: 1,
            proposal_method_name: "m".to_string(),
            log_p: -1.0,
        };
        assert_eq!(header_line(&prob), ProbRow::HEADER.join(","));
    }

    #[test]
    fn ess_report_without_controls_is_a_bare_header() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("ess.csv");
        crate::compare::write_csv(&out, &ess_rows::<PathBuf>(&[]).unwrap()).unwrap();
        assert_eq!(
            fs::read_to_string(&out).unwrap(),
            format!("{}\n", EssRow::HEADER.join(","))
        );
    }
}
