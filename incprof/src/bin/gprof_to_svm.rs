//! Turn a sequence of cumulative gprof reports into libSVM-style lines.
//!
//! Each output line describes one interval between consecutive reports.
//! Reports are taken in the order given on the command line; reports
//! without a complete call graph are skipped.
//!
//! # Usage
//!
//! ```bash
//! gprof_to_svm gprof-0.out gprof-1.out gprof-2.out -o profile.svm --map svmfmap.json
//! gprof_to_svm gprof-*.out --mode timecalls --reduce 4 --ranks rank.svm
//! ```

use clap::Parser;
use gprof_parse::{Config, FeatureMode, FeatureOptions, write_features, write_identity_map};
use incprof::sequence::{ReportSequence, feature_ranks, write_ranks};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "gprof_to_svm")]
#[command(about = "Convert a sequence of gprof reports to interval feature vectors")]
#[command(version)]
struct Args {
    /// gprof reports, oldest first
    #[arg(required = true)]
    reports: Vec<PathBuf>,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Config file (defaults to ./gprof.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Feature layout: time or timecalls
    #[arg(short, long)]
    mode: Option<FeatureMode>,

    /// Deepest call depth that still produces a feature
    #[arg(short = 'd', long)]
    max_depth: Option<u32>,

    /// Combine this many consecutive intervals into one line
    #[arg(short, long)]
    reduce: Option<usize>,

    /// Fraction of total time a function needs to be kept
    #[arg(short, long)]
    threshold: Option<f64>,

    /// Express times as a fraction of the interval's total time
    #[arg(long)]
    normalize: bool,

    /// Write the identity map (feature index -> function name) here
    #[arg(long)]
    map: Option<PathBuf>,

    /// Write per-feature interval counts here
    #[arg(long)]
    ranks: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn load_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_optional(Path::new("gprof.toml")),
    };
    if let Some(mode) = args.mode {
        config.mode = mode;
    }
    if let Some(depth) = args.max_depth {
        config.max_depth = depth;
    }
    if let Some(factor) = args.reduce {
        config.reduction_factor = Some(factor);
    }
    if let Some(threshold) = args.threshold {
        config.time_threshold = threshold;
    }
    if args.normalize {
        config.normalize_time = true;
    }
    Ok(config)
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(&args)?;
    let mut seq = ReportSequence::new(config);

    for path in &args.reports {
        seq.push_path(path)?;
    }
    if !seq.skipped().is_empty() {
        warn!(
            skipped = seq.skipped().len(),
            total = args.reports.len(),
            "some reports were skipped"
        );
    }

    let lines = seq.feature_lines()?;
    info!(lines = lines.len(), functions = seq.registry().len(), "computed intervals");

    match &args.output {
        Some(path) => {
            let mut writer = BufWriter::new(File::create(path)?);
            write_features(&mut writer, &lines)?;
            writer.flush()?;
            info!("wrote features to {}", path.display());
        }
        None => write_features(std::io::stdout().lock(), &lines)?,
    }

    if let Some(path) = &args.map {
        let options = FeatureOptions::from(seq.config());
        let (factor, replicate) = match options.mode {
            FeatureMode::Time => (1, 1),
            FeatureMode::TimeCalls => (options.stride, 3),
        };
        let mut writer = BufWriter::new(File::create(path)?);
        write_identity_map(seq.registry(), factor, replicate, &mut writer)?;
        writer.flush()?;
        info!("wrote identity map to {}", path.display());
    }

    if let Some(path) = &args.ranks {
        let mut writer = BufWriter::new(File::create(path)?);
        write_ranks(&feature_ranks(&lines), &mut writer)?;
        writer.flush()?;
        info!("wrote ranks to {}", path.display());
    }

    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    incprof::init_tracing(args.verbose);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
