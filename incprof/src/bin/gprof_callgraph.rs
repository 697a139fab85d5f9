//! Render the call graph of one gprof report.
//!
//! # Usage
//!
//! ```bash
//! gprof_callgraph gprof-0.out -o callgraph.dot
//! gprof_callgraph gprof-0.out --format summary
//! ```

use clap::{Parser, ValueEnum};
use gprof_parse::{
    CallGraph, Config, FeatureLine, FeatureOptions, FunctionRegistry, ReportParser, write_dot,
    write_features, write_identity_map, write_summary,
};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    /// Graphviz dot
    Dot,
    /// Per-function statistics and edges
    Summary,
    /// A single feature line
    Features,
}

#[derive(Parser, Debug)]
#[command(name = "gprof_callgraph")]
#[command(about = "Build the call graph of a gprof report")]
#[command(version)]
struct Args {
    /// gprof report
    input: PathBuf,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(short, long, value_enum, default_value = "dot")]
    format: Format,

    /// Config file (defaults to ./gprof.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the identity map (function id -> name) here
    #[arg(long)]
    map: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn render<W: Write>(
    args: &Args,
    config: &Config,
    graph: &CallGraph,
    writer: W,
) -> Result<(), Box<dyn std::error::Error>> {
    match args.format {
        Format::Dot => write_dot(graph, writer)?,
        Format::Summary => write_summary(graph, writer)?,
        Format::Features => {
            let line = FeatureLine::from_graph(graph, &FeatureOptions::from(config));
            write_features(writer, [&line])?;
        }
    }
    Ok(())
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_optional(Path::new("gprof.toml")),
    };

    let input = File::open(&args.input).map_err(|e| {
        format!(
            "Failed to open input file '{}': {}",
            args.input.display(),
            e
        )
    })?;

    let mut registry = FunctionRegistry::with_base(config.id_base);
    let parsed =
        ReportParser::with_config(&mut registry, &config).parse(0, BufReader::new(input))?;
    if !parsed.is_complete() {
        warn!(status = ?parsed.status, "report is incomplete, graph may be partial");
    }
    info!(
        functions = parsed.graph.node_count(),
        edges = parsed.graph.edge_count(),
        "parsed {}",
        args.input.display()
    );

    match &args.output {
        Some(path) => {
            let mut writer = BufWriter::new(File::create(path)?);
            render(&args, &config, &parsed.graph, &mut writer)?;
            writer.flush()?;
        }
        None => render(&args, &config, &parsed.graph, std::io::stdout().lock())?,
    }

    if let Some(path) = &args.map {
        let mut writer = BufWriter::new(File::create(path)?);
        write_identity_map(&registry, 1, 1, &mut writer)?;
        writer.flush()?;
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
