//! Compare two gprof reports of the same program.
//!
//! This tool computes which functions grew between a baseline and a target
//! report and outputs NDJSON records showing:
//! - Functions whose time or call count grew (before, after and delta)
//! - Caller relations that only exist in the target, with a call path
//!
//! # Usage
//!
//! ```bash
//! gprof_delta gprof-0.out gprof-5.out -o delta.ndjson
//! ```

use clap::Parser;
use gprof_parse::{Config, FunctionRegistry, ReportParser};
use incprof::delta::GraphDelta;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "gprof_delta")]
#[command(about = "Compare two gprof reports")]
#[command(version)]
struct Args {
    /// Baseline report (earlier)
    baseline: PathBuf,

    /// Target report (later)
    target: PathBuf,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Maximum number of new caller relations to report
    #[arg(short = 'n', long, default_value = "100")]
    max_new_calls: usize,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();
    let mut registry = FunctionRegistry::new();

    let mut graphs = Vec::with_capacity(2);
    for (graph_id, path) in [&args.baseline, &args.target].into_iter().enumerate() {
        let file = File::open(path)?;
        let parsed = ReportParser::with_config(&mut registry, &config)
            .parse(graph_id as u64, BufReader::new(file))?;
        if !parsed.is_complete() {
            warn!(status = ?parsed.status, "{} is incomplete", path.display());
        }
        info!(
            functions = parsed.graph.node_count(),
            edges = parsed.graph.edge_count(),
            "loaded {}",
            path.display()
        );
        graphs.push(parsed.graph);
    }

    let diff = GraphDelta::compute(
        &graphs[0],
        &graphs[1],
        args.baseline.to_str().unwrap_or("baseline"),
        args.target.to_str().unwrap_or("target"),
        args.max_new_calls,
    );
    info!(
        growing = diff.growth.len(),
        new_calls = diff.new_calls.len(),
        "computed delta"
    );

    match args.output {
        Some(path) => {
            let file = File::create(&path)?;
            let writer = BufWriter::new(file);
            diff.write_ndjson(writer)?;
            info!("wrote delta to {}", path.display());
        }
        None => {
            diff.write_ndjson(std::io::stdout())?;
        }
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
