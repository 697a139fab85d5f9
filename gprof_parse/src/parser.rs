//! Line-oriented state machine turning one gprof report into a [`CallGraph`].
//!
//! The parser walks the report once. Flat-profile rows are staged by
//! normalized name, call graph entries are buffered until their closing rule
//! line and then committed into the graph. Malformed input never aborts a
//! parse: lines that match no shape are counted and skipped, and running out
//! of input inside a table yields the partial graph with a
//! [`ReportStatus::Truncated`] status.

use std::collections::{HashMap, HashSet};
use std::io::{BufRead, BufReader, Read};
use thiserror::Error;
use tracing::{debug, warn};

use crate::classify::{
    ArcLine, CallGraphLine, FlatEntry, FlatLine, FunctionLine, classify_call_graph_line,
    classify_flat_line, is_call_graph_header, is_flat_header, parse_granularity,
};
use crate::config::Config;
use crate::graph::{CallGraph, Endpoint, GraphError, GraphId, Node, NodeStats, count_to_i64};
use crate::registry::{FunctionId, Identities, clean_name};

/// Errors that abort a parse. Malformed report content is not one of them.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ParseError>;

/// The part of a report the parser was in when input ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    FlatProfile,
    /// After the call graph header, before any entry was closed.
    CallGraph,
    /// Inside an entry that had no closing rule line.
    CallGraphEntry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportStatus {
    Complete,
    /// No call graph table was found. The graph holds flat-profile nodes only.
    MissingCallGraph,
    Truncated(Section),
}

/// Counters describing what was skipped or dropped during a parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReportStats {
    pub lines: usize,
    /// Lines inside a table that matched no known shape.
    pub unrecognized: usize,
    /// Committed entries below the time threshold.
    pub rejected_entries: usize,
    /// Entries discarded because their function already had one.
    pub duplicate_nodes: usize,
    pub missing_endpoints: usize,
    /// Nodes added from the flat profile alone.
    pub flat_only_nodes: usize,
}

/// A parsed report: the graph plus how cleanly it was read.
#[derive(Debug, Clone)]
pub struct ParsedReport {
    pub graph: CallGraph,
    pub status: ReportStatus,
    pub stats: ReportStats,
}

impl ParsedReport {
    pub fn is_complete(&self) -> bool {
        self.status == ReportStatus::Complete
    }
}

// ============================================================================
// Parser state
// ============================================================================

/// Where inside a call graph entry the parser is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryState {
    /// Before the function line: arc lines are callers.
    ExpectCallers,
    /// After the function line: arc lines are callees.
    ExpectCallees,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Seeking,
    InFlatProfile,
    InCallGraph(EntryState),
    Done,
}

#[derive(Debug)]
enum Caller {
    Spontaneous,
    Arc(ArcLine),
}

#[derive(Debug, Default)]
struct PendingEntry {
    callers: Vec<Caller>,
    function: Option<FunctionLine>,
}

impl PendingEntry {
    fn is_empty(&self) -> bool {
        self.callers.is_empty() && self.function.is_none()
    }
}

/// Flat-profile rows waiting to be matched with call graph entries, in
/// report order.
#[derive(Debug, Default)]
struct StagedFlat {
    entries: Vec<Option<FlatEntry>>,
    by_name: HashMap<String, usize>,
}

impl StagedFlat {
    fn insert(&mut self, entry: FlatEntry) {
        let name = clean_name(&entry.name);
        self.by_name.insert(name, self.entries.len());
        self.entries.push(Some(entry));
    }

    fn take(&mut self, name: &str) -> Option<FlatEntry> {
        let idx = self.by_name.remove(name)?;
        self.entries.get_mut(idx)?.take()
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn into_remaining(self) -> impl Iterator<Item = FlatEntry> {
        self.entries.into_iter().flatten()
    }
}

/// Everything that lives for one parse.
struct ParseRun {
    graph: CallGraph,
    state: State,
    entry: PendingEntry,
    flat: StagedFlat,
    committed: HashSet<FunctionId>,
    entries_closed: usize,
    stats: ReportStats,
}

// ============================================================================
// ReportParser
// ============================================================================

/// Parser for gprof reports, resolving names through a shared registry.
///
/// ```
/// use gprof_parse::{FunctionRegistry, ReportParser};
/// use std::io::Cursor;
///
/// let report = " time   seconds   seconds    calls  ms/call  ms/call  name\n\
///               100.00     1.00     1.00        1  1000.00  1000.00  main\n";
///
/// let mut registry = FunctionRegistry::new();
/// let parsed = ReportParser::new(&mut registry).parse(0, Cursor::new(report)).unwrap();
/// assert_eq!(parsed.graph.node_count(), 1);
/// ```
pub struct ReportParser<'r, I: Identities + ?Sized> {
    registry: &'r mut I,
    time_threshold: f64,
    strict_endpoints: bool,
    flat_only_nodes: bool,
}

impl<'r, I: Identities + ?Sized> ReportParser<'r, I> {
    /// Create a parser with default options.
    pub fn new(registry: &'r mut I) -> Self {
        Self::with_config(registry, &Config::default())
    }

    pub fn with_config(registry: &'r mut I, config: &Config) -> Self {
        Self {
            registry,
            time_threshold: config.time_threshold,
            strict_endpoints: config.strict_endpoints,
            flat_only_nodes: config.flat_only_nodes,
        }
    }

    /// Parse one report into a graph identified by `graph_id`.
    ///
    /// Invalid UTF-8 is replaced rather than rejected. Only I/O failures
    /// return an error.
    pub fn parse<R: Read>(&mut self, graph_id: GraphId, reader: R) -> Result<ParsedReport> {
        let mut reader = BufReader::new(reader);
        let mut run = ParseRun {
            graph: CallGraph::new(graph_id)
                .with_time_threshold(self.time_threshold)
                .with_strict_endpoints(self.strict_endpoints),
            state: State::Seeking,
            entry: PendingEntry::default(),
            flat: StagedFlat::default(),
            committed: HashSet::new(),
            entries_closed: 0,
            stats: ReportStats::default(),
        };

        let mut buf = Vec::new();
        while run.state != State::Done {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            run.stats.lines += 1;
            let text = String::from_utf8_lossy(&buf);
            self.step(&mut run, text.trim_end_matches(['\n', '\r']));
        }

        Ok(self.finish(run))
    }

    fn step(&mut self, run: &mut ParseRun, line: &str) {
        match run.state {
            State::Seeking => {
                if is_flat_header(line) && run.flat.is_empty() {
                    run.state = State::InFlatProfile;
                } else if is_call_graph_header(line) {
                    run.state = State::InCallGraph(EntryState::ExpectCallers);
                } else if let Some(total) = parse_granularity(line) {
                    // The flat profile's last cumulative time is more precise.
                    if run.flat.is_empty() {
                        run.graph.set_total_time(total);
                    }
                }
            }
            State::InFlatProfile => match classify_flat_line(line) {
                FlatLine::Entry(entry) => {
                    run.graph.set_total_time(entry.cumulative_secs);
                    run.flat.insert(entry);
                }
                FlatLine::Blank => run.state = State::Seeking,
                FlatLine::Unrecognized => {
                    run.stats.unrecognized += 1;
                    debug!(line = run.stats.lines, text = line, "unrecognized flat profile line");
                }
            },
            State::InCallGraph(phase) => self.step_call_graph(run, phase, line),
            State::Done => {}
        }
    }

    fn step_call_graph(&mut self, run: &mut ParseRun, phase: EntryState, line: &str) {
        match (classify_call_graph_line(line), phase) {
            (CallGraphLine::Rule, _) => {
                let entry = std::mem::take(&mut run.entry);
                self.commit(run, entry);
                run.entries_closed += 1;
                run.state = State::InCallGraph(EntryState::ExpectCallers);
            }
            (CallGraphLine::Blank, _) => {
                if !run.entry.is_empty() {
                    warn!(line = run.stats.lines, "blank line inside call graph entry, discarding it");
                    run.entry = PendingEntry::default();
                    run.state = State::Done;
                } else if run.entries_closed > 0 {
                    run.state = State::Done;
                }
            }
            (CallGraphLine::Spontaneous, EntryState::ExpectCallers) => {
                run.entry.callers.push(Caller::Spontaneous);
            }
            (CallGraphLine::Arc(arc), EntryState::ExpectCallers) => {
                run.entry.callers.push(Caller::Arc(arc));
            }
            // Callees show up again as callers in their own entry.
            (CallGraphLine::Arc(_), EntryState::ExpectCallees) => {}
            (CallGraphLine::Function(function), EntryState::ExpectCallers) => {
                run.entry.function = Some(function);
                run.state = State::InCallGraph(EntryState::ExpectCallees);
            }
            (CallGraphLine::Spontaneous | CallGraphLine::Function(_), EntryState::ExpectCallees)
            | (CallGraphLine::Unrecognized, _) => {
                run.stats.unrecognized += 1;
                debug!(line = run.stats.lines, text = line, "unrecognized call graph line");
            }
        }
    }

    /// Fold one closed entry into the graph.
    fn commit(&mut self, run: &mut ParseRun, entry: PendingEntry) {
        let Some(function) = entry.function else {
            if !entry.callers.is_empty() {
                warn!(line = run.stats.lines, "call graph entry without a function line, discarding it");
            }
            return;
        };

        let graph = &mut run.graph;
        if !graph.passes_threshold(function.self_secs + function.child_secs) {
            run.stats.rejected_entries += 1;
            debug!(name = %function.name, "entry below time threshold");
            return;
        }

        let name = clean_name(&function.name);
        let id = self.registry.identity_for(&name);
        if !run.committed.insert(id) {
            run.stats.duplicate_nodes += 1;
            warn!(graph = graph.id, function = id, name = %name, "second call graph entry for function, keeping the first");
            return;
        }

        let mut stats = NodeStats::new(
            function.time_pct.unwrap_or(0.0),
            function.self_secs,
            function.child_secs,
            count_to_i64(function.calls.unwrap_or(0)),
        );
        if let Some(flat) = run.flat.take(&name) {
            stats = stats.with_flat_profile(&flat);
        }

        // A node may already exist as a placeholder for an earlier caller.
        match graph.node_mut(id) {
            Some(node) => {
                node.stats = stats;
                node.recursive_calls = function.recursive_calls;
            }
            None => {
                let mut node = Node::new(id, name, stats);
                node.recursive_calls = function.recursive_calls;
                record_duplicate(graph.add_node(node), &mut run.stats);
            }
        }

        let calls = function.calls.unwrap_or(0);
        let total_calls = calls.saturating_add(function.recursive_calls);
        for caller in entry.callers {
            let (endpoint, reported) = match caller {
                Caller::Spontaneous => (Endpoint::Spontaneous, None),
                Caller::Arc(arc) => {
                    let caller_name = clean_name(&arc.name);
                    let caller_id = self.registry.identity_for(&caller_name);
                    if !graph.contains(caller_id) {
                        let placeholder = Node::new(caller_id, caller_name, NodeStats::default());
                        record_duplicate(graph.add_node(placeholder), &mut run.stats);
                    }
                    (Endpoint::Function(caller_id), Some(arc.calls))
                }
            };
            if let Err(GraphError::MissingEndpoint(_)) =
                graph.add_edge(endpoint, id, calls, total_calls, reported)
            {
                run.stats.missing_endpoints += 1;
            }
        }
    }

    fn finish(&mut self, mut run: ParseRun) -> ParsedReport {
        let status = match run.state {
            State::Done => ReportStatus::Complete,
            State::Seeking => ReportStatus::MissingCallGraph,
            State::InFlatProfile => ReportStatus::Truncated(Section::FlatProfile),
            State::InCallGraph(_) if !run.entry.is_empty() => {
                warn!(graph = run.graph.id, "input ended inside a call graph entry, discarding it");
                ReportStatus::Truncated(Section::CallGraphEntry)
            }
            State::InCallGraph(_) if run.entries_closed == 0 => {
                ReportStatus::Truncated(Section::CallGraph)
            }
            State::InCallGraph(_) => ReportStatus::Complete,
        };

        if self.flat_only_nodes {
            let flat = std::mem::take(&mut run.flat);
            for entry in flat.into_remaining() {
                self.add_flat_only(&mut run, &entry);
            }
        }

        run.graph.resolve_depths();
        debug!(
            graph = run.graph.id,
            nodes = run.graph.node_count(),
            edges = run.graph.edge_count(),
            ?status,
            "parsed report"
        );

        ParsedReport {
            graph: run.graph,
            status,
            stats: run.stats,
        }
    }

    /// Functions that were sampled but never given a call graph entry.
    fn add_flat_only(&mut self, run: &mut ParseRun, entry: &FlatEntry) {
        if !run.graph.passes_threshold(entry.self_secs) {
            return;
        }
        let name = clean_name(&entry.name);
        let id = self.registry.identity_for(&name);
        if run.committed.contains(&id) {
            return;
        }
        match run.graph.node_mut(id) {
            Some(node) => node.stats = node.stats.with_flat_profile(entry),
            None => {
                let node = Node::new(id, name, NodeStats::default().with_flat_profile(entry));
                record_duplicate(run.graph.add_node(node), &mut run.stats);
            }
        }
        run.committed.insert(id);
        run.stats.flat_only_nodes += 1;
    }
}

fn record_duplicate(result: std::result::Result<FunctionId, GraphError>, stats: &mut ReportStats) {
    if let Err(GraphError::DuplicateNode(_)) = result {
        stats.duplicate_nodes += 1;
    }
}

/// Parse one report with options from `config`.
pub fn parse_report<R: Read, I: Identities + ?Sized>(
    registry: &mut I,
    config: &Config,
    graph_id: GraphId,
    reader: R,
) -> Result<ParsedReport> {
    ReportParser::with_config(registry, config).parse(graph_id, reader)
}
