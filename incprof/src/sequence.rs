//! Ordered sequences of cumulative gprof reports.
//!
//! gprof reports taken during one run are cumulative: each report covers
//! everything since the start. This module parses such a sequence with one
//! shared registry, turns the cumulative graphs into per-interval graphs,
//! optionally combines runs of consecutive intervals, and produces one
//! feature line per interval.

use gprof_parse::export::FeatureIndex;
use gprof_parse::{
    CallGraph, Config, ExportError, FeatureLine, FeatureOptions, FunctionRegistry, GraphError,
    GraphId, ParseError, ParsedReport, ReportParser, ReportStatus,
};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum SequenceError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("export error: {0}")]
    Export(#[from] ExportError),
}

pub type Result<T> = std::result::Result<T, SequenceError>;

/// Minimum change in a function's time for an interval to count toward the
/// function's rank.
pub const RANK_EPSILON: f64 = 0.001;

/// A report that was left out of the sequence, and why.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedReport {
    pub source: String,
    pub status: ReportStatus,
}

/// Cumulative reports of one run, parsed with a shared registry.
pub struct ReportSequence {
    config: Config,
    registry: FunctionRegistry,
    graphs: Vec<CallGraph>,
    skipped: Vec<SkippedReport>,
}

impl ReportSequence {
    pub fn new(config: Config) -> Self {
        Self {
            registry: FunctionRegistry::with_base(config.id_base),
            config,
            graphs: Vec::new(),
            skipped: Vec::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    /// Cumulative graphs in the order they were added.
    pub fn graphs(&self) -> &[CallGraph] {
        &self.graphs
    }

    pub fn skipped(&self) -> &[SkippedReport] {
        &self.skipped
    }

    /// Parse one report and append it. Reports without a complete call graph
    /// are recorded as skipped and `false` is returned.
    pub fn push_report<R: Read>(&mut self, source: &str, reader: R) -> Result<bool> {
        let graph_id = self.graphs.len() as GraphId;
        let parsed = ReportParser::with_config(&mut self.registry, &self.config).parse(graph_id, reader)?;
        Ok(self.accept(source, parsed))
    }

    /// Open and parse one report file.
    pub fn push_path(&mut self, path: &Path) -> Result<bool> {
        let file = File::open(path).map_err(|source| SequenceError::Io {
            path: path.display().to_string(),
            source,
        })?;
        self.push_report(&path.display().to_string(), BufReader::new(file))
    }

    fn accept(&mut self, source: &str, parsed: ParsedReport) -> bool {
        if !parsed.is_complete() {
            warn!(source, status = ?parsed.status, "skipping incomplete report");
            self.skipped.push(SkippedReport {
                source: source.to_string(),
                status: parsed.status,
            });
            return false;
        }
        info!(
            source,
            graph = parsed.graph.id,
            functions = parsed.graph.node_count(),
            edges = parsed.graph.edge_count(),
            unrecognized = parsed.stats.unrecognized,
            "parsed report"
        );
        self.graphs.push(parsed.graph);
        true
    }

    /// Per-interval graphs, combined by the configured reduction factor.
    pub fn interval_graphs(&self) -> Result<Vec<CallGraph>> {
        let intervals = into_intervals(self.graphs.clone());
        match self.config.reduction_factor {
            Some(factor) if factor > 1 => Ok(reduce(intervals, factor)?),
            _ => Ok(intervals),
        }
    }

    /// One feature line per interval that has any feature, numbered
    /// consecutively from 0.
    pub fn feature_lines(&self) -> Result<Vec<FeatureLine>> {
        let options = FeatureOptions::from(&self.config);
        let mut lines = Vec::new();
        let mut empty = 0;
        for graph in self.interval_graphs()? {
            let mut line = FeatureLine::from_graph(&graph, &options);
            if line.is_empty() {
                empty += 1;
                continue;
            }
            line.graph_id = lines.len() as GraphId;
            lines.push(line);
        }
        if empty > 0 {
            debug!(empty, "skipped intervals without features");
        }
        Ok(lines)
    }
}

/// Turn cumulative graphs into interval graphs in place: every graph after
/// the first loses its predecessor's times and calls. Walking backwards means
/// each predecessor is still cumulative when it is subtracted.
pub fn into_intervals(mut graphs: Vec<CallGraph>) -> Vec<CallGraph> {
    for i in (1..graphs.len()).rev() {
        let (before, after) = graphs.split_at_mut(i);
        let previous = &before[i - 1];
        let current = &mut after[0];
        current.subtract(previous);
        current.set_total_time(current.total_time() - previous.total_time());
    }
    graphs
}

/// Combine each run of `factor` consecutive graphs into one. Times, calls
/// and total time are summed over the group, so time fractions stay the
/// same scale as a single interval's; percentages are averaged. The last
/// group may be shorter. Graphs are renumbered by group.
pub fn reduce(graphs: Vec<CallGraph>, factor: usize) -> std::result::Result<Vec<CallGraph>, GraphError> {
    if factor == 0 {
        return Err(GraphError::ZeroMergeFactor);
    }
    let mut reduced = Vec::with_capacity(graphs.len().div_ceil(factor));
    for (group_idx, group) in graphs.chunks(factor).enumerate() {
        let Some((first, rest)) = group.split_first() else {
            continue;
        };
        let mut merged = first.clone();
        let mut total = first.total_time();
        for graph in rest {
            merged.merge(graph);
            total += graph.total_time();
        }
        merged.apply_merge_factor(group.len())?;
        merged.set_total_time(total);
        merged.id = group_idx as GraphId;
        reduced.push(merged);
    }
    Ok(reduced)
}

/// Number of feature lines in which each feature changed by more than
/// [`RANK_EPSILON`].
pub fn feature_ranks(lines: &[FeatureLine]) -> BTreeMap<FeatureIndex, usize> {
    let mut ranks = BTreeMap::new();
    for line in lines {
        for &(index, value) in &line.features {
            if value.abs() > RANK_EPSILON {
                *ranks.entry(index).or_insert(0) += 1;
            }
        }
    }
    ranks
}

/// Write ranks as `FID:Rank` lines under a header.
pub fn write_ranks<W: Write>(ranks: &BTreeMap<FeatureIndex, usize>, mut writer: W) -> std::io::Result<()> {
    writeln!(writer, "FID:Rank")?;
    for (index, rank) in ranks {
        writeln!(writer, "{index}:{rank}")?;
    }
    Ok(())
}
