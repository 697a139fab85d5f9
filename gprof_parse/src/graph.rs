//! Call graph model: nodes, edges, minimum depth and graph algebra.
//!
//! A [`CallGraph`] owns its [`Node`]s (keyed by [`FunctionId`]) and [`Edge`]s
//! (keyed by a sequential [`EdgeId`]). Edges refer to their endpoints by
//! identity, and nodes list the ids of their incoming and outgoing edges, so
//! the graph can hold cycles without any shared ownership.

use crate::classify::FlatEntry;
use crate::registry::{FunctionId, display_name};
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, warn};

/// Identity of a graph within a sequence, e.g. the interval index.
pub type GraphId = u64;

/// Identity of an edge, unique within its graph.
pub type EdgeId = u32;

/// Floor for every division by the total execution time.
pub const TIME_EPSILON: f64 = 0.001;

/// Fraction of total time a function needs to be kept as a node.
pub const DEFAULT_TIME_THRESHOLD: f64 = 0.05;

/// Flat-profile figures at or below this are treated as absent.
const FLAT_PRECISION: f64 = 0.0001;

/// Errors raised while building or combining call graphs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("function with ID {0} already exists")]
    DuplicateNode(FunctionId),

    #[error("edge endpoint {0} has no node in the graph")]
    MissingEndpoint(FunctionId),

    #[error("merge factor must be at least 1")]
    ZeroMergeFactor,
}

// ============================================================================
// Statistics
// ============================================================================

/// Per-function timing figures.
///
/// All combination operations are pure, so they can be tested without a graph.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NodeStats {
    /// The `% time` column.
    pub time_pct: f64,
    pub self_time: f64,
    /// Time spent in descendants.
    pub child_time: f64,
    /// Signed, since interval deltas can come out negative.
    pub calls: i64,
}

impl NodeStats {
    pub fn new(time_pct: f64, self_time: f64, child_time: f64, calls: i64) -> Self {
        Self {
            time_pct,
            self_time,
            child_time,
            calls,
        }
    }

    /// Self time plus time in descendants.
    pub fn combined_time(&self) -> f64 {
        self.self_time + self.child_time
    }

    /// Sum of both sides. Percentages are summed too; divide them afterwards
    /// with [`NodeStats::with_pct_divided`].
    pub fn merged(self, other: &NodeStats) -> NodeStats {
        NodeStats {
            time_pct: self.time_pct + other.time_pct,
            self_time: self.self_time + other.self_time,
            child_time: self.child_time + other.child_time,
            calls: self.calls + other.calls,
        }
    }

    /// Difference of times and calls. The percentage is left as is.
    pub fn subtracted(self, other: &NodeStats) -> NodeStats {
        NodeStats {
            time_pct: self.time_pct,
            self_time: self.self_time - other.self_time,
            child_time: self.child_time - other.child_time,
            calls: self.calls - other.calls,
        }
    }

    pub fn with_pct_divided(self, factor: f64) -> NodeStats {
        NodeStats {
            time_pct: self.time_pct / factor,
            ..self
        }
    }

    /// Overlay flat-profile figures, which carry more precision than the call
    /// graph table, wherever the flat profile has a non-zero value.
    pub fn with_flat_profile(self, flat: &FlatEntry) -> NodeStats {
        let mut stats = self;
        if flat.time_pct > FLAT_PRECISION {
            stats.time_pct = flat.time_pct;
        }
        if flat.self_secs > FLAT_PRECISION {
            stats.self_time = flat.self_secs;
        }
        if let Some(calls) = flat.calls.filter(|&c| c > 0) {
            stats.calls = count_to_i64(calls);
        }
        stats
    }
}

/// Call counts are parsed unsigned but kept signed so interval deltas can go
/// negative. Counts beyond `i64::MAX` saturate.
pub(crate) fn count_to_i64(count: u64) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

// ============================================================================
// Nodes and edges
// ============================================================================

/// Memoization state of a node's minimum depth during a traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthState {
    Unvisited,
    InProgress,
    Resolved(u32),
}

/// One function within one call graph.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: FunctionId,
    /// Full normalized name.
    pub name: String,
    pub stats: NodeStats,
    /// Self-recursive calls, the `+N` of the called column.
    pub recursive_calls: u64,
    depth: OnceLock<u32>,
    callers: Vec<EdgeId>,
    callees: Vec<EdgeId>,
}

impl Node {
    pub fn new(id: FunctionId, name: impl Into<String>, stats: NodeStats) -> Self {
        Self {
            id,
            name: name.into(),
            stats,
            recursive_calls: 0,
            depth: OnceLock::new(),
            callers: Vec::new(),
            callees: Vec::new(),
        }
    }

    pub fn display_name(&self) -> &str {
        display_name(&self.name)
    }

    /// Incoming edges, in construction order.
    pub fn callers(&self) -> &[EdgeId] {
        &self.callers
    }

    /// Outgoing edges, in construction order.
    pub fn callees(&self) -> &[EdgeId] {
        &self.callees
    }

    /// The minimum depth if it has been resolved already.
    pub fn resolved_depth(&self) -> Option<u32> {
        self.depth.get().copied()
    }

    pub fn depth_state(&self) -> DepthState {
        match self.depth.get() {
            Some(&depth) => DepthState::Resolved(depth),
            None => DepthState::Unvisited,
        }
    }
}

/// One end of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Function(FunctionId),
    /// gprof's `<spontaneous>` caller. Never a node.
    Spontaneous,
    /// A node that was absent when the edge was built in lenient mode.
    Missing,
}

impl Endpoint {
    pub fn function(self) -> Option<FunctionId> {
        match self {
            Endpoint::Function(id) => Some(id),
            Endpoint::Spontaneous | Endpoint::Missing => None,
        }
    }
}

/// One caller to callee relationship.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub id: EdgeId,
    pub caller: Endpoint,
    pub callee: Endpoint,
    /// Calls into the callee, as reported on its function line.
    pub calls: u64,
    /// Calls including recursive ones.
    pub total_calls: u64,
    /// The count on the caller's own line, when it had one.
    pub reported_calls: Option<u64>,
}

// ============================================================================
// CallGraph
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct DepthFrame {
    id: FunctionId,
    next_edge: usize,
    best: Option<u32>,
    /// Called from `<spontaneous>`, so a root whatever its other callers.
    rooted: bool,
}

/// The call graph of one report.
#[derive(Debug, Clone)]
pub struct CallGraph {
    pub id: GraphId,
    nodes: BTreeMap<FunctionId, Node>,
    edges: BTreeMap<EdgeId, Edge>,
    next_edge_id: EdgeId,
    total_time: f64,
    time_threshold: f64,
    strict_endpoints: bool,
}

impl CallGraph {
    pub fn new(id: GraphId) -> Self {
        Self {
            id,
            nodes: BTreeMap::new(),
            edges: BTreeMap::new(),
            next_edge_id: 1,
            total_time: TIME_EPSILON,
            time_threshold: DEFAULT_TIME_THRESHOLD,
            strict_endpoints: false,
        }
    }

    pub fn with_time_threshold(mut self, threshold: f64) -> Self {
        self.time_threshold = threshold;
        self
    }

    /// In strict mode an edge with a missing endpoint is dropped; otherwise
    /// it is kept with an [`Endpoint::Missing`] end.
    pub fn with_strict_endpoints(mut self, strict: bool) -> Self {
        self.strict_endpoints = strict;
        self
    }

    /// Total execution time in seconds.
    pub fn total_time(&self) -> f64 {
        self.total_time
    }

    pub fn set_total_time(&mut self, seconds: f64) {
        self.total_time = seconds;
    }

    pub fn time_threshold(&self) -> f64 {
        self.time_threshold
    }

    /// `seconds` as a fraction of the total execution time.
    pub fn time_fraction(&self, seconds: f64) -> f64 {
        seconds / self.total_time.max(TIME_EPSILON)
    }

    /// Whether a function spending `seconds` is dense enough to keep.
    pub fn passes_threshold(&self, seconds: f64) -> bool {
        self.time_fraction(seconds) >= self.time_threshold
    }

    pub fn node(&self, id: FunctionId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub(crate) fn node_mut(&mut self, id: FunctionId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn contains(&self, id: FunctionId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Node> {
        self.nodes.values().find(|n| n.name == name)
    }

    /// Nodes in ascending identity order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Edges in construction order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(&id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Insert a node. A second node for the same identity is rejected and the
    /// first one is kept unchanged.
    pub fn add_node(&mut self, node: Node) -> Result<FunctionId, GraphError> {
        let id = node.id;
        if self.nodes.contains_key(&id) {
            warn!(graph = self.id, function = id, name = %node.name, "duplicate node construction, keeping the first");
            return Err(GraphError::DuplicateNode(id));
        }
        self.nodes.insert(id, node);
        Ok(id)
    }

    /// Build an edge and register it with both endpoints.
    pub fn add_edge(
        &mut self,
        caller: Endpoint,
        callee: FunctionId,
        calls: u64,
        total_calls: u64,
        reported_calls: Option<u64>,
    ) -> Result<EdgeId, GraphError> {
        let caller = match caller {
            Endpoint::Function(id) if !self.nodes.contains_key(&id) => {
                warn!(graph = self.id, caller = id, callee, "edge caller has no node");
                if self.strict_endpoints {
                    return Err(GraphError::MissingEndpoint(id));
                }
                Endpoint::Missing
            }
            other => other,
        };
        let callee_end = if self.nodes.contains_key(&callee) {
            Endpoint::Function(callee)
        } else {
            warn!(graph = self.id, callee, "edge callee has no node");
            if self.strict_endpoints {
                return Err(GraphError::MissingEndpoint(callee));
            }
            Endpoint::Missing
        };

        let id = self.next_edge_id;
        self.next_edge_id += 1;

        if let Some(node) = caller.function().and_then(|c| self.nodes.get_mut(&c)) {
            node.callees.push(id);
        }
        if let Some(node) = callee_end.function().and_then(|c| self.nodes.get_mut(&c)) {
            node.callers.push(id);
        }
        self.edges.insert(
            id,
            Edge {
                id,
                caller,
                callee: callee_end,
                calls,
                total_calls,
                reported_calls,
            },
        );
        Ok(id)
    }

    /// Shortest caller chain from `id` back to a root: a function with no
    /// recorded caller or one called from `<spontaneous>`. Roots have depth 0.
    ///
    /// Resolved lazily with an explicit stack and memoized on the node. A
    /// caller that is still being resolved further up the stack (a call
    /// cycle) contributes no candidate, and a node whose callers all lie on
    /// cycles resolves to 0.
    pub fn min_depth(&self, id: FunctionId) -> Option<u32> {
        let target = self.nodes.get(&id)?;
        if let Some(depth) = target.resolved_depth() {
            return Some(depth);
        }

        let mut states: HashMap<FunctionId, DepthState> = HashMap::new();
        let mut stack = vec![DepthFrame {
            id,
            next_edge: 0,
            best: None,
            rooted: false,
        }];
        states.insert(id, DepthState::InProgress);

        while let Some(frame) = stack.last_mut() {
            let Some(node) = self.nodes.get(&frame.id) else {
                stack.pop();
                continue;
            };

            if let Some(&edge_id) = node.callers.get(frame.next_edge) {
                frame.next_edge += 1;
                let caller_id = match self.edges.get(&edge_id).map(|edge| edge.caller) {
                    Some(Endpoint::Function(caller_id)) => caller_id,
                    Some(Endpoint::Spontaneous) => {
                        frame.rooted = true;
                        continue;
                    }
                    Some(Endpoint::Missing) | None => continue,
                };
                let Some(caller) = self.nodes.get(&caller_id) else {
                    continue;
                };

                let state = match caller.depth_state() {
                    DepthState::Unvisited => states
                        .get(&caller.id)
                        .copied()
                        .unwrap_or(DepthState::Unvisited),
                    resolved => resolved,
                };
                match state {
                    DepthState::Resolved(depth) => {
                        frame.best = Some(frame.best.map_or(depth, |best| best.min(depth)));
                    }
                    DepthState::InProgress => {}
                    DepthState::Unvisited => {
                        states.insert(caller.id, DepthState::InProgress);
                        stack.push(DepthFrame {
                            id: caller.id,
                            next_edge: 0,
                            best: None,
                            rooted: false,
                        });
                    }
                }
                continue;
            }

            let candidate = if frame.rooted {
                0
            } else {
                frame.best.map_or(0, |best| best.saturating_add(1))
            };
            let depth = *node.depth.get_or_init(|| candidate);
            states.insert(node.id, DepthState::Resolved(depth));
            stack.pop();
            if let Some(parent) = stack.last_mut() {
                parent.best = Some(parent.best.map_or(depth, |best| best.min(depth)));
            }
        }

        target.resolved_depth()
    }

    /// Resolve every node's depth in ascending identity order, so the result
    /// does not depend on which node an exporter happens to ask about first.
    pub fn resolve_depths(&self) {
        for &id in self.nodes.keys() {
            self.min_depth(id);
        }
    }

    /// Add the statistics of every node of `other` onto the matching node
    /// here. Nodes without a counterpart are skipped, and edges are not
    /// merged. Returns the number of nodes updated.
    pub fn merge(&mut self, other: &CallGraph) -> usize {
        self.combine(other, NodeStats::merged)
    }

    /// Subtract the times and call counts of every node of `other` from the
    /// matching node here, leaving percentages alone. Used to turn a later
    /// cumulative report into the delta since an earlier one.
    pub fn subtract(&mut self, other: &CallGraph) -> usize {
        self.combine(other, NodeStats::subtracted)
    }

    /// Divide every node's percentage by `factor`, turning the sum left by
    /// merging `factor` graphs back into an average.
    pub fn apply_merge_factor(&mut self, factor: usize) -> Result<(), GraphError> {
        if factor == 0 {
            return Err(GraphError::ZeroMergeFactor);
        }
        for node in self.nodes.values_mut() {
            node.stats = node.stats.with_pct_divided(factor as f64);
        }
        Ok(())
    }

    fn combine(&mut self, other: &CallGraph, op: fn(NodeStats, &NodeStats) -> NodeStats) -> usize {
        let mut matched = 0;
        for other_node in other.nodes.values() {
            let Some(id) = self.counterpart(other_node) else {
                continue;
            };
            if id != other_node.id {
                debug!(
                    graph = self.id,
                    other = other.id,
                    function = id,
                    other_function = other_node.id,
                    name = %other_node.name,
                    "identity drift, matched by name"
                );
            }
            if let Some(node) = self.nodes.get_mut(&id) {
                node.stats = op(node.stats, &other_node.stats);
                matched += 1;
            }
        }
        matched
    }

    /// The node here describing the same function as `other`: same identity
    /// and name, or failing that the first node with the same name.
    fn counterpart(&self, other: &Node) -> Option<FunctionId> {
        match self.nodes.get(&other.id) {
            Some(node) if node.name == other.name => Some(node.id),
            _ => self
                .nodes
                .values()
                .find(|node| node.name == other.name)
                .map(|node| node.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(self_time: f64, child_time: f64, calls: i64) -> NodeStats {
        NodeStats::new(self_time * 10.0, self_time, child_time, calls)
    }

    /// main (spontaneous) -> a -> b -> c
    fn chain_graph() -> CallGraph {
        let mut graph = CallGraph::new(0);
        for (id, name) in [(0, "main"), (1, "a"), (2, "b"), (3, "c")] {
            graph.add_node(Node::new(id, name, stats(1.0, 0.0, 1))).unwrap();
        }
        graph.add_edge(Endpoint::Spontaneous, 0, 0, 0, None).unwrap();
        graph.add_edge(Endpoint::Function(0), 1, 1, 1, Some(1)).unwrap();
        graph.add_edge(Endpoint::Function(1), 2, 1, 1, Some(1)).unwrap();
        graph.add_edge(Endpoint::Function(2), 3, 1, 1, Some(1)).unwrap();
        graph
    }

    #[test]
    fn edges_are_registered_with_both_endpoints() {
        let graph = chain_graph();
        let a = graph.node(1).unwrap();

        assert_eq!(a.callers().len(), 1);
        assert_eq!(a.callees().len(), 1);
        let incoming = graph.edge(a.callers()[0]).unwrap();
        assert_eq!(incoming.caller, Endpoint::Function(0));
        assert_eq!(incoming.callee, Endpoint::Function(1));
        assert_eq!(graph.edge_count(), 4);
    }

    #[test]
    fn duplicate_node_keeps_first() {
        let mut graph = CallGraph::new(0);
        graph.add_node(Node::new(0, "main", stats(1.0, 0.0, 1))).unwrap();
        let result = graph.add_node(Node::new(0, "main", stats(9.0, 9.0, 9)));

        assert_eq!(result, Err(GraphError::DuplicateNode(0)));
        assert_eq!(graph.node(0).unwrap().stats.self_time, 1.0);
    }

    #[test]
    fn missing_endpoint_lenient_keeps_edge() {
        let mut graph = CallGraph::new(0);
        graph.add_node(Node::new(1, "f", NodeStats::default())).unwrap();

        let id = graph.add_edge(Endpoint::Function(7), 1, 1, 1, None).unwrap();
        let edge = graph.edge(id).unwrap();

        assert_eq!(edge.caller, Endpoint::Missing);
        assert_eq!(graph.node(1).unwrap().callers(), &[id]);
    }

    #[test]
    fn missing_endpoint_strict_drops_edge() {
        let mut graph = CallGraph::new(0).with_strict_endpoints(true);
        graph.add_node(Node::new(1, "f", NodeStats::default())).unwrap();

        assert_eq!(
            graph.add_edge(Endpoint::Function(7), 1, 1, 1, None),
            Err(GraphError::MissingEndpoint(7))
        );
        assert_eq!(
            graph.add_edge(Endpoint::Spontaneous, 9, 1, 1, None),
            Err(GraphError::MissingEndpoint(9))
        );
        assert_eq!(graph.edge_count(), 0);
        assert!(graph.node(1).unwrap().callers().is_empty());
    }

    #[test]
    fn depth_follows_shortest_chain() {
        let mut graph = chain_graph();
        // shortcut main -> c
        graph.add_edge(Endpoint::Function(0), 3, 1, 1, Some(1)).unwrap();

        assert_eq!(graph.min_depth(0), Some(0));
        assert_eq!(graph.min_depth(1), Some(1));
        assert_eq!(graph.min_depth(2), Some(2));
        assert_eq!(graph.min_depth(3), Some(1));
        assert_eq!(graph.min_depth(42), None);
    }

    #[test]
    fn depth_terminates_on_mutual_recursion_without_root() {
        let mut graph = CallGraph::new(0);
        graph.add_node(Node::new(0, "ping", NodeStats::default())).unwrap();
        graph.add_node(Node::new(1, "pong", NodeStats::default())).unwrap();
        graph.add_edge(Endpoint::Function(0), 1, 1, 1, None).unwrap();
        graph.add_edge(Endpoint::Function(1), 0, 1, 1, None).unwrap();

        let ping = graph.min_depth(0).unwrap();
        let pong = graph.min_depth(1).unwrap();

        // pong only sees ping, which is in progress, so it resolves as a root.
        assert_eq!(pong, 0);
        assert_eq!(ping, 1);
    }

    #[test]
    fn depth_with_cycle_below_root() {
        let mut graph = CallGraph::new(0);
        for (id, name) in [(0, "main"), (1, "a"), (2, "b")] {
            graph.add_node(Node::new(id, name, NodeStats::default())).unwrap();
        }
        graph.add_edge(Endpoint::Spontaneous, 0, 1, 1, None).unwrap();
        graph.add_edge(Endpoint::Function(0), 1, 1, 1, None).unwrap();
        graph.add_edge(Endpoint::Function(1), 2, 1, 1, None).unwrap();
        graph.add_edge(Endpoint::Function(2), 1, 1, 1, None).unwrap();

        assert_eq!(graph.min_depth(2), Some(2));
        assert_eq!(graph.min_depth(1), Some(1));
        assert_eq!(graph.node(1).unwrap().depth_state(), DepthState::Resolved(1));
    }

    #[test]
    fn spontaneous_caller_makes_a_root() {
        let mut graph = chain_graph();
        // c is also entered from outside the program
        graph.add_edge(Endpoint::Spontaneous, 3, 0, 0, None).unwrap();

        assert_eq!(graph.min_depth(3), Some(0));
        assert_eq!(graph.min_depth(2), Some(2));
    }

    #[test]
    fn depth_is_memoized() {
        let graph = chain_graph();
        assert_eq!(graph.node(3).unwrap().depth_state(), DepthState::Unvisited);

        graph.min_depth(3);

        // resolving c resolves the whole chain above it
        for id in 0..4 {
            assert_eq!(graph.node(id).unwrap().resolved_depth(), Some(id));
        }
    }

    #[test]
    fn depth_of_deep_chain_does_not_recurse() {
        let mut graph = CallGraph::new(0);
        let len: u32 = 200_000;
        for id in 0..len {
            graph.add_node(Node::new(id, format!("f{id}"), NodeStats::default())).unwrap();
        }
        graph.add_edge(Endpoint::Spontaneous, 0, 1, 1, None).unwrap();
        for id in 1..len {
            graph.add_edge(Endpoint::Function(id - 1), id, 1, 1, None).unwrap();
        }

        assert_eq!(graph.min_depth(len - 1), Some(len - 1));
    }

    #[test]
    fn threshold_uses_epsilon_floor() {
        let mut graph = CallGraph::new(0).with_time_threshold(0.5);
        graph.set_total_time(0.0);
        assert!(graph.time_fraction(1.0).is_finite());

        graph.set_total_time(1.0);
        assert!(!graph.passes_threshold(0.10));
        assert!(graph.passes_threshold(0.5));
    }

    #[test]
    fn stats_merge_then_subtract_is_identity() {
        let g = NodeStats::new(40.0, 1.25, 0.5, 7);
        let h = NodeStats::new(10.0, 0.75, 2.0, 3);

        let back = g.merged(&h).subtracted(&h);

        assert!((back.self_time - g.self_time).abs() < 1e-9);
        assert!((back.child_time - g.child_time).abs() < 1e-9);
        assert_eq!(back.calls, g.calls);
        // subtraction leaves the percentage alone
        assert_eq!(back.time_pct, 50.0);
    }

    #[test]
    fn flat_profile_overrides_only_present_figures() {
        let flat = FlatEntry {
            time_pct: 12.5,
            cumulative_secs: 3.0,
            self_secs: 0.0,
            calls: None,
            self_ms_per_call: None,
            total_ms_per_call: None,
            name: "f".into(),
        };
        let stats = NodeStats::new(12.0, 0.4, 0.1, 5).with_flat_profile(&flat);

        assert_eq!(stats.time_pct, 12.5);
        assert_eq!(stats.self_time, 0.4);
        assert_eq!(stats.calls, 5);
    }

    #[test]
    fn graph_merge_and_subtract_are_inverse() {
        let g = chain_graph();
        let mut h = chain_graph();
        h.node_mut(2).unwrap().stats = NodeStats::new(5.0, 0.3, 0.7, 11);

        let mut combined = g.clone();
        assert_eq!(combined.merge(&h), 4);
        assert_eq!(combined.subtract(&h), 4);

        for node in g.nodes() {
            let back = combined.node(node.id).unwrap();
            assert!((back.stats.self_time - node.stats.self_time).abs() < 1e-9);
            assert!((back.stats.child_time - node.stats.child_time).abs() < 1e-9);
            assert_eq!(back.stats.calls, node.stats.calls);
        }
    }

    #[test]
    fn merge_skips_nodes_without_counterpart() {
        let mut g = chain_graph();
        let mut other = CallGraph::new(1);
        other.add_node(Node::new(9, "elsewhere", stats(1.0, 1.0, 1))).unwrap();
        other.add_node(Node::new(1, "not_a", stats(1.0, 1.0, 1))).unwrap();

        assert_eq!(g.merge(&other), 0);
        assert_eq!(g.node_count(), 4);
        assert_eq!(g.node(1).unwrap().stats.self_time, 1.0);
    }

    #[test]
    fn merge_falls_back_to_name() {
        let mut g = chain_graph();
        let mut other = CallGraph::new(1);
        // identities shifted against g
        other.add_node(Node::new(7, "b", stats(2.0, 0.5, 3))).unwrap();
        other.add_node(Node::new(1, "c", stats(4.0, 0.0, 1))).unwrap();

        assert_eq!(g.merge(&other), 2);
        assert_eq!(g.node(2).unwrap().stats.self_time, 3.0);
        assert_eq!(g.node(2).unwrap().stats.calls, 4);
        assert_eq!(g.node(3).unwrap().stats.self_time, 5.0);
        assert_eq!(g.node(1).unwrap().stats.self_time, 1.0);
    }

    #[test]
    fn merge_factor_averages_percentages() {
        let graphs: Vec<CallGraph> = [10.0, 20.0, 60.0]
            .iter()
            .enumerate()
            .map(|(i, pct)| {
                let mut graph = CallGraph::new(i as GraphId);
                graph
                    .add_node(Node::new(0, "main", NodeStats::new(*pct, 1.0, 0.0, 1)))
                    .unwrap();
                graph
            })
            .collect();

        let mut acc = graphs[0].clone();
        for graph in &graphs[1..] {
            acc.merge(graph);
        }
        acc.apply_merge_factor(graphs.len()).unwrap();

        assert!((acc.node(0).unwrap().stats.time_pct - 30.0).abs() < 1e-9);
        assert_eq!(acc.apply_merge_factor(0), Err(GraphError::ZeroMergeFactor));
    }
}
