use clap::{Parser, Subcommand};
use phylo_posterior_compare::compare::{
    CompareOptions, ComparisonRun, PosteriorComparison, PosteriorOptions, write_csv,
};
use phylo_posterior_compare::control::{ess_rows, last_ess_rows, pendant_rows};
use phylo_posterior_compare::convergence::ConvergenceOptions;
use phylo_posterior_compare::error::Result;
use phylo_posterior_compare::sample::{PosteriorSample, SampleFormat};
use phylo_posterior_compare::sweep::{ProcessRunner, Sweep, SweepConfig};
use std::path::PathBuf;
use std::time::Instant;

/// Compare weighted tree samples against reference trees and MCMC posteriors.
#[derive(Parser, Debug)]
#[command(
    name = "posterior-compare",
    version,
    about = "Expected tree distances and ASDSF/MSDSF for weighted posterior samples"
)]
struct Args {
    /// Quiet mode: only warnings and errors are logged
    #[arg(short = 'q', long = "quiet", global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose mode: debug logging
    #[arg(short = 'v', long = "verbose", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Expected Euclidean and RF distance of one posterior to a reference tree
    CompareTree {
        /// Reference tree (first tree of the file is used)
        reference: PathBuf,

        /// Posterior sample; stdin (read as NEXUS) when omitted
        #[arg(default_value = "-")]
        posterior: PathBuf,

        /// Read `<log_weight>\t<newick>` lines
        #[arg(long = "weighted", default_value_t = false, conflicts_with = "format")]
        weighted: bool,

        /// Input format; detected from the extension by default
        #[arg(long = "format", value_enum)]
        format: Option<SampleFormat>,

        /// Drop the first N trees of the posterior
        #[arg(short = 'b', long = "burnin", default_value_t = 0)]
        burnin: usize,

        /// Output CSV path (`-` for stdout)
        #[arg(short = 'o', long = "output", default_value = "-")]
        output: PathBuf,
    },

    /// Expected RF / weighted RF / Euclidean distance of each candidate
    Compare {
        reference: PathBuf,

        #[arg(required = true)]
        candidates: Vec<PathBuf>,

        #[arg(short = 'b', long = "burnin", default_value_t = 0)]
        burnin: usize,

        /// One row per tree instead of per file
        #[arg(long = "per-tree", default_value_t = false)]
        per_tree: bool,

        /// Input format; detected from the extension by default
        #[arg(long = "format", value_enum)]
        format: Option<SampleFormat>,

        #[arg(short = 'o', long = "output", default_value = "-")]
        output: PathBuf,
    },

    /// ASDSF/MSDSF of two MCMC runs, then of the first run against each candidate
    Asdsf {
        ref1: PathBuf,
        ref2: PathBuf,
        candidates: Vec<PathBuf>,

        /// Trees dropped from each MCMC run (candidates are used whole)
        #[arg(short = 'b', long = "burnin", default_value_t = 250)]
        burnin: usize,

        #[arg(long = "min-support", default_value_t = 0.1)]
        min_support: f64,

        /// Write posterior-probability rows here
        #[arg(long = "pp-table")]
        pp_table: Option<PathBuf>,

        #[arg(short = 'o', long = "output", default_value = "-")]
        output: PathBuf,
    },

    /// Per-generation ESS of the SMC outputs listed in control files
    ExtractEss {
        #[arg(required = true)]
        controls: Vec<PathBuf>,

        /// Only the final generation, with likelihood call counts
        #[arg(long = "last", default_value_t = false)]
        last: bool,

        #[arg(short = 'o', long = "output", default_value = "-")]
        output: PathBuf,
    },

    /// Pendant branch length of each generation's added taxon
    PendantBl {
        reference: PathBuf,

        #[arg(required = true)]
        outputs: Vec<PathBuf>,

        #[arg(short = 'o', long = "output", default_value = "-")]
        output: PathBuf,
    },

    /// Run the simulate → MCMC → SMC experiment grid
    Sweep {
        /// JSON sweep configuration
        #[arg(short = 'c', long = "config")]
        config: PathBuf,

        /// Output directory
        #[arg(short = 'o', long = "output", default_value = ".")]
        output: PathBuf,
    },
}

fn main() {
    let args = Args::parse();
    let level = if args.quiet {
        log::LevelFilter::Warn
    } else if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    let t0 = Instant::now();
    if let Err(e) = run(args.command) {
        log::error!("{e}");
        std::process::exit(1);
    }
    log::debug!("Finished in {:.3}s", t0.elapsed().as_secs_f64());
}

fn run(command: Cmd) -> Result<()> {
    match command {
        Cmd::CompareTree {
            reference,
            posterior,
            weighted,
            format,
            burnin,
            output,
        } => {
            let run = ComparisonRun::new(&reference)?;
            let format = format.or(weighted.then_some(SampleFormat::Weighted));
            let sample = PosteriorSample::load(&posterior, format, run.namespace(), burnin)?;
            log::info!(
                "{}: {} trees, ESS {:.2}",
                sample.source,
                sample.len(),
                sample.effective_sample_size()
            );
            write_csv(&output, &[run.expected_distance_row(&sample)?])
        }
        Cmd::Compare {
            reference,
            candidates,
            burnin,
            per_tree,
            format,
            output,
        } => {
            let run = ComparisonRun::new(&reference)?;
            let opts = CompareOptions { burnin, format };
            let rows = if per_tree {
                run.compare_per_tree(&candidates, &opts)?
            } else {
                run.compare(&candidates, &opts)?
            };
            write_csv(&output, &rows)
        }
        Cmd::Asdsf {
            ref1,
            ref2,
            candidates,
            burnin,
            min_support,
            pp_table,
            output,
        } => {
            let opts = PosteriorOptions {
                burnin,
                convergence: ConvergenceOptions {
                    min_support,
                    ..Default::default()
                },
                format: None,
            };
            let report = PosteriorComparison::run(&ref1, &ref2, &candidates, &opts)?;
            write_csv(&output, &report.asdsf)?;
            if let Some(path) = pp_table {
                write_csv(&path, &report.pp)?;
            }
            Ok(())
        }
        Cmd::ExtractEss {
            controls,
            last,
            output,
        } => {
            if last {
                write_csv(&output, &last_ess_rows(&controls)?)
            } else {
                write_csv(&output, &ess_rows(&controls)?)
            }
        }
        Cmd::PendantBl {
            reference,
            outputs,
            output,
        } => write_csv(&output, &pendant_rows(&reference, &outputs)?),
        Cmd::Sweep { config, output } => {
            let config = SweepConfig::load(&config)?;
            let summary = Sweep::new(config, output)?.run(&mut ProcessRunner)?;
            println!(
                "completed={} failed={} skipped_replicates={}",
                summary.completed, summary.failed, summary.skipped_replicates
            );
            Ok(())
        }
    }
}
