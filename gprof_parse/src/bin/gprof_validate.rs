use gprof_parse::{FunctionRegistry, ReportParser, ReportStatus};
use std::env;
use std::fs::File;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();

    if args.len() != 2 {
        eprintln!("Usage: {} <gprof-report.out>", args[0]);
        return ExitCode::from(2);
    }

    let path = &args[1];

    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening '{}': {}", path, e);
            return ExitCode::FAILURE;
        }
    };

    let mut registry = FunctionRegistry::new();
    match ReportParser::new(&mut registry).parse(0, file) {
        Ok(parsed) => {
            let graph = &parsed.graph;
            let stats = &parsed.stats;
            match parsed.status {
                ReportStatus::Complete => println!("Complete gprof report: {}", path),
                ReportStatus::MissingCallGraph => println!("Flat profile only: {}", path),
                ReportStatus::Truncated(section) => {
                    println!("Truncated gprof report: {} (inside {:?})", path, section)
                }
            }
            println!("  Total time: {:.4}s", graph.total_time());
            println!("  Functions: {}", graph.node_count());
            println!("  Edges: {}", graph.edge_count());
            println!("  Lines: {}", stats.lines);
            if stats.unrecognized > 0 {
                println!("  Unrecognized lines: {}", stats.unrecognized);
            }
            if stats.rejected_entries > 0 {
                println!("  Entries below threshold: {}", stats.rejected_entries);
            }
            if stats.duplicate_nodes > 0 {
                println!("  Duplicate entries: {}", stats.duplicate_nodes);
            }
            if stats.flat_only_nodes > 0 {
                println!("  Flat-profile-only functions: {}", stats.flat_only_nodes);
            }
            if parsed.is_complete() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            eprintln!("Failed to read '{}': {}", path, e);
            ExitCode::FAILURE
        }
    }
}
