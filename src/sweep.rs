//! Simulation sweep: simulate → MCMC reference → trimmed SMC runs → reports.
//!
//! # Layout
//! ```text
//! <out>/<n>taxon-<rep>/                    simulated data, ML tree, MCMC runs,
//!                                          baseline asdsf.csv / pp.csv
//! <out>/<n>taxon-<rep>/<trim>/<pf>/<method>/
//!     <n>tax_trim_<trim>.sts.json          SMC output
//!     control.json, probs.csv, asdsf.csv, pp.csv, <n>tax_trim_<trim>.sts.comp.csv
//! <out>/ess.csv, <out>/ess_calls.csv
//! ```
//!
//! Tools run one after another through a [`ToolRunner`]. Only
//! [`Error::ExternalTool`] is recovered from: at the cell level for SMC runs
//! and at the replicate level for setup commands.

use crate::compare::{
    CompareOptions, ComparisonRun, PosteriorComparison, PosteriorOptions, PosteriorReport,
    write_csv,
};
use crate::control::{ControlRecord, ess_rows, last_ess_rows, proposal_log_likelihoods};
use crate::convergence::ConvergenceOptions;
use crate::error::{Error, Result};
use crate::io::open_input;
use crate::sample::SmcOutput;
use itertools::Itertools;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

/// One command as an argv template; `{name}` placeholders are substituted
/// and an argument that is exactly `{method_args}` expands to the method's
/// argument list.
pub type CommandTemplate = Vec<String>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandTemplates {
    /// Per replicate: simulate `{fasta}` / `{nexus}` on `{tree}`.
    pub simulate: Vec<CommandTemplate>,
    /// Per replicate: write the ML tree to `{ml_tree}`.
    pub estimate_ml: Vec<CommandTemplate>,
    /// Per replicate and MCMC run: write `{mcmc_trees}`.
    pub mcmc: Vec<CommandTemplate>,
    /// Per trim combination: write `{trim_trees}` for the reduced taxon set.
    pub trim: Vec<CommandTemplate>,
    /// Per cell: write the SMC JSON to `{output}`.
    pub smc: Vec<CommandTemplate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub taxon_counts: Vec<usize>,
    pub tree_replicates: Vec<usize>,
    pub trim_counts: Vec<usize>,
    /// How many taxon combinations to try per trim count.
    pub trim_replicates: usize,
    pub particle_factors: Vec<usize>,
    /// Proposal method name → extra SMC arguments.
    pub methods: BTreeMap<String, Vec<String>>,
    pub mcmc_runs: usize,
    pub burnin: usize,
    pub min_support: f64,
    /// Directory holding the `<n>taxon-<rep>.nwk` source trees.
    pub trees_dir: PathBuf,
    pub commands: CommandTemplates,
}

impl Default for SweepConfig {
    fn default() -> Self {
        let methods = [
            ("lcfit", vec!["--proposal-method", "lcfit"]),
            ("uniform-length", vec!["--proposal-method", "uniform-length"]),
            ("guided-parsimony", vec!["--proposal-method", "guided-parsimony"]),
            ("guided", vec!["--proposal-method", "guided", "-e", "1"]),
            ("lcfit2", vec!["--proposal-method", "lcfit", "-e", "1"]),
        ]
        .into_iter()
        .map(|(name, args)| {
            (
                name.to_string(),
                args.into_iter().map(String::from).collect(),
            )
        })
        .collect();

        SweepConfig {
            taxon_counts: vec![10, 50, 100],
            tree_replicates: (1..=5).collect(),
            trim_counts: vec![1, 2, 5],
            trim_replicates: 3,
            particle_factors: vec![1, 5, 10, 50, 100],
            methods,
            mcmc_runs: 2,
            burnin: 250,
            min_support: 0.1,
            trees_dir: PathBuf::from("trees"),
            commands: CommandTemplates::default(),
        }
    }
}

impl SweepConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: SweepConfig = serde_json::from_reader(open_input(path)?)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let steps = [
            ("simulate", &self.commands.simulate),
            ("estimate_ml", &self.commands.estimate_ml),
            ("mcmc", &self.commands.mcmc),
            ("smc", &self.commands.smc),
        ];
        for (name, commands) in steps {
            if commands.is_empty() {
                return Err(Error::Config(format!("no '{name}' command configured")));
            }
        }
        if let Some(empty) = self
            .all_commands()
            .find(|c| c.is_empty() || c[0].is_empty())
        {
            return Err(Error::Config(format!("empty command template {empty:?}")));
        }
        if self.mcmc_runs == 0 {
            return Err(Error::Config("mcmc_runs must be at least 1".to_string()));
        }
        Ok(())
    }

    fn all_commands(&self) -> impl Iterator<Item = &CommandTemplate> {
        let c = &self.commands;
        c.simulate
            .iter()
            .chain(&c.estimate_ml)
            .chain(&c.mcmc)
            .chain(&c.trim)
            .chain(&c.smc)
    }

    /// The first `trim_replicates` combinations of `trim_count` labels out of
    /// `t1..tn`, each joined with `-`.
    pub fn trim_schedule(&self, n_taxa: usize, trim_count: usize) -> Vec<String> {
        (1..=n_taxa)
            .map(|i| format!("t{i}"))
            .combinations(trim_count)
            .take(self.trim_replicates)
            .map(|c| c.join("-"))
            .collect()
    }
}

/// Executes external programs.
pub trait ToolRunner {
    /// Run `argv` to completion. A non-zero exit is [`Error::ExternalTool`].
    fn run(&mut self, argv: &[String]) -> Result<()>;
}

/// Runs commands with [`std::process::Command`], inheriting stdio.
#[derive(Debug, Default)]
pub struct ProcessRunner;

impl ToolRunner for ProcessRunner {
    fn run(&mut self, argv: &[String]) -> Result<()> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| Error::Config("empty command".to_string()))?;
        log::info!("Running: {}", argv.join(" "));
        let status = Command::new(program)
            .args(args)
            .status()
            .map_err(|e| Error::external(program, format!("could not start: {e}")))?;
        if status.success() {
            Ok(())
        } else {
            Err(Error::external(program, format!("exited with {status}")))
        }
    }
}

/// Outcome counts of a sweep.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepSummary {
    pub completed: usize,
    pub failed: usize,
    pub skipped_replicates: usize,
    pub controls: Vec<PathBuf>,
}

/// Placeholder values for command templates.
#[derive(Debug, Clone, Default)]
struct Vars {
    values: HashMap<&'static str, String>,
    method_args: Vec<String>,
}

impl Vars {
    fn with(mut self, key: &'static str, value: impl ToString) -> Self {
        self.values.insert(key, value.to_string());
        self
    }

    fn path(self, key: &'static str, value: &Path) -> Self {
        self.with(key, value.display())
    }

    fn expand(&self, template: &[String], placeholder: &Regex) -> Result<Vec<String>> {
        let mut argv = Vec::with_capacity(template.len());
        for arg in template {
            if arg == "{method_args}" {
                argv.extend(self.method_args.iter().cloned());
                continue;
            }
            let mut out = String::with_capacity(arg.len());
            let mut last = 0;
            for caps in placeholder.captures_iter(arg) {
                let (Some(whole), Some(key)) = (caps.get(0), caps.get(1)) else {
                    continue;
                };
                let value = self.values.get(key.as_str()).ok_or_else(|| {
                    Error::Config(format!("unknown placeholder {{{}}} in '{arg}'", key.as_str()))
                })?;
                out.push_str(&arg[last..whole.start()]);
                out.push_str(value);
                last = whole.end();
            }
            out.push_str(&arg[last..]);
            argv.push(out);
        }
        Ok(argv)
    }
}

/// Drives the whole experiment grid.
pub struct Sweep {
    config: SweepConfig,
    output: PathBuf,
    placeholder: Regex,
}

impl Sweep {
    pub fn new(config: SweepConfig, output: impl Into<PathBuf>) -> Result<Self> {
        config.validate()?;
        let placeholder =
            Regex::new(r"\{([a-z_]+)\}").map_err(|e| Error::Config(e.to_string()))?;
        Ok(Sweep {
            config,
            output: output.into(),
            placeholder,
        })
    }

    fn run_step<R: ToolRunner>(
        &self,
        runner: &mut R,
        commands: &[CommandTemplate],
        vars: &Vars,
    ) -> Result<()> {
        for template in commands {
            let argv = vars.expand(template, &self.placeholder)?;
            runner.run(&argv)?;
        }
        Ok(())
    }

    pub fn run<R: ToolRunner>(&self, runner: &mut R) -> Result<SweepSummary> {
        fs::create_dir_all(&self.output)?;
        let mut summary = SweepSummary::default();

        for (&n, &rep) in self
            .config
            .taxon_counts
            .iter()
            .cartesian_product(&self.config.tree_replicates)
        {
            match self.run_replicate(runner, n, rep, &mut summary) {
                Err(e) if e.is_external_tool() => {
                    log::warn!("Skipping {n} taxa, replicate {rep}: {e}");
                    summary.skipped_replicates += 1;
                }
                other => other?,
            }
        }

        write_csv(self.output.join("ess.csv"), &ess_rows(&summary.controls)?)?;
        write_csv(
            self.output.join("ess_calls.csv"),
            &last_ess_rows(&summary.controls)?,
        )?;
        log::info!(
            "Sweep finished: {} cells completed, {} failed, {} replicates skipped",
            summary.completed,
            summary.failed,
            summary.skipped_replicates
        );
        Ok(summary)
    }

    fn run_replicate<R: ToolRunner>(
        &self,
        runner: &mut R,
        n: usize,
        rep: usize,
        summary: &mut SweepSummary,
    ) -> Result<()> {
        let name = format!("{n}taxon-{rep:02}");
        let dir = self.output.join(&name);
        fs::create_dir_all(&dir)?;
        let stem = dir.join(&name);
        let tree = self.config.trees_dir.join(format!("{name}.nwk"));
        let fasta = with_suffix(&stem, ".fasta");
        let ml_tree = with_suffix(&stem, ".ml.nwk");

        let vars = Vars::default()
            .path("tree", &tree)
            .path("stem", &stem)
            .path("fasta", &fasta)
            .path("nexus", &with_suffix(&stem, ".nex"))
            .path("ml_tree", &ml_tree)
            .with("n_taxa", n)
            .with("replicate", rep)
            .with("burnin", self.config.burnin);

        self.run_step(runner, &self.config.commands.simulate, &vars)?;
        self.run_step(runner, &self.config.commands.estimate_ml, &vars)?;
        let mut runs = Vec::with_capacity(self.config.mcmc_runs);
        for run in 1..=self.config.mcmc_runs {
            let trees = with_suffix(&stem, &format!(".run{run}.t"));
            let run_vars = vars.clone().with("run", run).path("mcmc_trees", &trees);
            self.run_step(runner, &self.config.commands.mcmc, &run_vars)?;
            runs.push(trees);
        }

        let ml = ComparisonRun::new(&ml_tree)?;
        let mcmc_opts = CompareOptions {
            burnin: self.config.burnin,
            format: None,
        };
        for (j, run) in runs.iter().enumerate() {
            let rows = ml.compare(std::slice::from_ref(run), &mcmc_opts)?;
            write_csv(with_suffix(&stem, &format!(".run{}.comp.csv", j + 1)), &rows)?;
        }

        let posterior_opts = PosteriorOptions {
            burnin: self.config.burnin,
            convergence: ConvergenceOptions {
                min_support: self.config.min_support,
                ..Default::default()
            },
            format: None,
        };
        let posterior = PosteriorComparison::new(&runs[0], &posterior_opts)?;
        if let Some(run2) = runs.get(1) {
            let mut baseline = PosteriorReport::default();
            posterior.add_baseline(run2, &mut baseline)?;
            write_csv(dir.join("asdsf.csv"), &baseline.asdsf)?;
            write_csv(dir.join("pp.csv"), &baseline.pp)?;
        }

        let cell = Cell {
            n,
            tree: &tree,
            ml: &ml,
            posterior: &posterior,
        };
        for &trim_count in &self.config.trim_counts {
            for trim in self.config.trim_schedule(n, trim_count) {
                self.run_trim(runner, &cell, &dir, &vars, trim_count, &trim, summary)?;
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn run_trim<R: ToolRunner>(
        &self,
        runner: &mut R,
        cell: &Cell<'_>,
        dir: &Path,
        vars: &Vars,
        trim_count: usize,
        trim: &str,
        summary: &mut SweepSummary,
    ) -> Result<()> {
        let n = cell.n;
        let trim_dir = dir.join(trim);
        fs::create_dir_all(&trim_dir)?;
        let trim_stem = trim_dir.join(format!("{n}tax_trim_{trim}"));
        let trim_trees = with_suffix(&trim_stem, ".t");
        let vars = vars
            .clone()
            .with("trim_taxa", trim)
            .with("trim_pattern", trim.replace('-', "|"))
            .with("trim_count", trim_count)
            .path("trim_stem", &trim_stem)
            .path("trim_nexus", &with_suffix(&trim_stem, ".nex"))
            .path("trim_trees", &trim_trees);

        if let Err(e) = self.run_step(runner, &self.config.commands.trim, &vars) {
            if e.is_external_tool() {
                log::warn!("Skipping trim {trim}: {e}");
                summary.failed += self.config.methods.len() * self.config.particle_factors.len();
                return Ok(());
            }
            return Err(e);
        }

        for ((method, args), &pf) in self
            .config
            .methods
            .iter()
            .cartesian_product(&self.config.particle_factors)
        {
            let cell_dir = trim_dir.join(pf.to_string()).join(method);
            fs::create_dir_all(&cell_dir)?;
            let output = cell_dir.join(format!("{n}tax_trim_{trim}.sts.json"));
            let mut cell_vars = vars
                .clone()
                .with("method", method)
                .with("particle_factor", pf)
                .path("output", &output);
            cell_vars.method_args = args.clone();

            let t0 = Instant::now();
            match self.run_step(runner, &self.config.commands.smc, &cell_vars) {
                Err(e) if e.is_external_tool() => {
                    log::warn!("FAILED {method} pf={pf} trim={trim}: {e}");
                    summary.failed += 1;
                    continue;
                }
                other => other?,
            }
            let time = t0.elapsed().as_secs_f64();
            log::info!("SMC {method} pf={pf} trim={trim} took {time:.3}s");

            let control = ControlRecord {
                proposal_method_name: method.clone(),
                trim_count,
                keep_count: n - trim_count,
                trim_taxon: trim.to_string(),
                particle_factor: pf,
                n_taxa: n,
                tree: cell.tree.display().to_string(),
                sts_online: vec![output.display().to_string()],
                time,
            };
            let control_path = cell_dir.join("control.json");
            control.write(&control_path)?;

            let source = output.display().to_string();
            let smc = SmcOutput::load(&output)?;
            let log_likes = proposal_log_likelihoods(&smc, trim_count, &source)?;
            write_csv(cell_dir.join("probs.csv"), &control.prob_rows(&log_likes))?;

            let rows = cell
                .ml
                .compare(std::slice::from_ref(&output), &CompareOptions::default())?;
            write_csv(
                cell_dir.join(format!("{n}tax_trim_{trim}.sts.comp.csv")),
                &rows,
            )?;

            let mut report = PosteriorReport::default();
            cell.posterior.add_candidate(&output, &mut report)?;
            write_csv(cell_dir.join("asdsf.csv"), &report.asdsf)?;
            write_csv(cell_dir.join("pp.csv"), &report.pp)?;

            summary.controls.push(control_path);
            summary.completed += 1;
        }
        Ok(())
    }
}

/// Per-replicate state shared by every trimmed cell.
struct Cell<'a> {
    n: usize,
    tree: &'a Path,
    ml: &'a ComparisonRun,
    posterior: &'a PosteriorComparison,
}

fn with_suffix(stem: &Path, suffix: &str) -> PathBuf {
    let mut s = stem.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}
