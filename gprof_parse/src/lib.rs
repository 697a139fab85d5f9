//! gprof report parser library.
//!
//! This library reads the text reports produced by `gprof` (a flat profile
//! followed by a call graph table) from any `Read`-able source and builds an
//! in-memory call graph per report. Graphs from successive reports of one
//! run can be merged or subtracted, and exported as dot, libSVM-style
//! feature lines and an identity map.
//!
//! Function identities come from a [`FunctionRegistry`] shared by every
//! report of a run, so the same function has the same identity in every
//! graph even though gprof's own `[index]` numbers differ between reports.
//!
//! # Example
//!
//! ```no_run
//! use std::fs::File;
//! use gprof_parse::{FeatureLine, FeatureOptions, FunctionRegistry, ReportParser};
//!
//! let mut registry = FunctionRegistry::new();
//! let report = File::open("gprof-0.out").unwrap();
//! let parsed = ReportParser::new(&mut registry).parse(0, report).unwrap();
//!
//! println!("Status: {:?}", parsed.status);
//! println!("Functions: {}", parsed.graph.node_count());
//! println!("{}", FeatureLine::from_graph(&parsed.graph, &FeatureOptions::default()));
//! ```

pub mod classify;
pub mod config;
pub mod export;
pub mod graph;
pub mod parser;
pub mod registry;

pub use config::{Config, ConfigError, FeatureMode, MIN_FEATURE_STRIDE};
pub use export::{
    ExportError, FeatureIndex, FeatureLine, FeatureOptions, read_features, read_identity_map,
    write_dot, write_features, write_identity_map, write_summary,
};
pub use graph::{CallGraph, Edge, EdgeId, Endpoint, GraphError, GraphId, Node, NodeStats};
pub use parser::{
    ParseError, ParsedReport, ReportParser, ReportStats, ReportStatus, Result, Section,
    parse_report,
};
pub use registry::{FunctionId, FunctionRegistry, Identities, SharedRegistry, clean_name};
