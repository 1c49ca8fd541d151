//! Adapter for the external `trees-bootstrap` program.
//!
//! The in-process [`convergence`](crate::convergence) engine is the source of
//! truth; this wrapper only exists to cross-check it against the reference
//! tool. Trees are written to temporary files, the tool is invoked, and its
//! summary line and LOD table are scraped back.
//!
//! The tool counts every tree once, so only unweighted samples (NEXUS or
//! Newick) can be handed to it.

use crate::convergence::{ConvergenceOptions, LodPair};
use crate::error::{Error, Result};
use crate::sample::PosteriorSample;
use regex::Regex;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::NamedTempFile;

pub const DEFAULT_PROGRAM: &str = "trees-bootstrap";

const SUMMARY_PATTERN: &str =
    r"ASDSF\[min=\d+(?:\.\d+)?\]\s*=\s*(\d+(?:\.\d+)?(?:[eE][-+]?\d+)?)\s+MSDSF\s*=\s*(\d+(?:\.\d+)?(?:[eE][-+]?\d+)?)";

#[derive(Debug, Clone, PartialEq)]
pub struct OracleResult {
    pub asdsf: f64,
    pub msdsf: f64,
    pub lod_table: Vec<LodPair>,
}

#[derive(Debug, Clone)]
pub struct BootstrapOracle {
    program: PathBuf,
}

impl Default for BootstrapOracle {
    fn default() -> Self {
        BootstrapOracle::new(DEFAULT_PROGRAM)
    }
}

impl BootstrapOracle {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        BootstrapOracle {
            program: program.into(),
        }
    }

    /// Run the tool on two tree files.
    pub fn run(
        &self,
        trees1: &Path,
        trees2: &Path,
        opts: &ConvergenceOptions,
    ) -> Result<OracleResult> {
        let tool = self.program.display().to_string();
        let lod_file = tempfile::Builder::new()
            .prefix("LOD_")
            .suffix(".txt")
            .tempfile()?;

        let mut cmd = Command::new(&self.program);
        cmd.arg("--min-support")
            .arg(opts.min_support.to_string())
            .arg("--skip")
            .arg(opts.skip.to_string())
            .arg(trees1)
            .arg(trees2)
            .arg("--LOD-table")
            .arg(lod_file.path());
        log::info!("Running: {cmd:?}");

        let output = cmd
            .output()
            .map_err(|e| Error::external(&tool, format!("could not start: {e}")))?;
        if !output.status.success() {
            return Err(Error::external(
                &tool,
                format!(
                    "exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let (asdsf, msdsf) = parse_summary(&stdout).map_err(|reason| Error::external(&tool, reason))?;
        let lod_text = std::fs::read_to_string(lod_file.path())
            .map_err(|e| Error::external(&tool, format!("unreadable LOD table: {e}")))?;
        let lod_table = parse_lod_table(&lod_text).map_err(|reason| Error::external(&tool, reason))?;

        Ok(OracleResult {
            asdsf,
            msdsf,
            lod_table,
        })
    }

    /// Write the retained trees of both samples as Newick and run the tool.
    ///
    /// Burn-in has already been applied by the loader, so only `opts.skip`
    /// is forwarded. Weighted samples are refused.
    pub fn run_on_samples(
        &self,
        sample1: &PosteriorSample,
        sample2: &PosteriorSample,
        opts: &ConvergenceOptions,
    ) -> Result<OracleResult> {
        for sample in [sample1, sample2] {
            if sample.weighted {
                return Err(Error::Config(format!(
                    "{}: {} ignores tree weights; pass an unweighted sample",
                    sample.source,
                    self.program.display()
                )));
            }
        }
        let f1 = write_newick_trees(sample1)?;
        let f2 = write_newick_trees(sample2)?;
        self.run(f1.path(), f2.path(), opts)
    }
}

fn write_newick_trees(sample: &PosteriorSample) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("trees-")
        .suffix(".nwk")
        .tempfile()?;
    for tree in sample.trees() {
        writeln!(file, "{}", tree.newick)?;
    }
    file.flush()?;
    log::debug!(
        "Wrote {} trees of {} to {}",
        sample.len(),
        sample.source,
        file.path().display()
    );
    Ok(file)
}

/// Extract `(asdsf, msdsf)` from the tool's standard output.
pub fn parse_summary(output: &str) -> std::result::Result<(f64, f64), String> {
    let re = Regex::new(SUMMARY_PATTERN).map_err(|e| e.to_string())?;
    let caps = re
        .captures(output)
        .ok_or_else(|| "no ASDSF/MSDSF summary in output".to_string())?;
    let number = |i: usize| -> std::result::Result<f64, String> {
        caps[i].parse::<f64>().map_err(|e| format!("{}: {e}", &caps[i]))
    };
    Ok((number(1)?, number(2)?))
}

/// Parse LOD table rows `lod1 lod2 <split>`; the trailing split column is
/// dropped.
pub fn parse_lod_table(text: &str) -> std::result::Result<Vec<LodPair>, String> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(i, line)| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let values = fields
                .get(..fields.len().saturating_sub(1))
                .unwrap_or(&[])
                .iter()
                .map(|f| f.parse::<f64>())
                .collect::<std::result::Result<Vec<f64>, _>>()
                .map_err(|e| format!("LOD table line {}: {e}", i + 1))?;
            match values.as_slice() {
                [lod1, lod2] => Ok(LodPair {
                    lod1: *lod1,
                    lod2: *lod2,
                }),
                _ => Err(format!(
                    "LOD table line {}: expected two values and a split",
                    i + 1
                )),
            }
        })
        .collect()
}
