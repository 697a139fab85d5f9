//! Call graph diff between two gprof reports.
//!
//! Compares a baseline report with a later target report of the same program
//! and lists which functions grew (time and calls) and which caller relations
//! only appear in the target, each with the shortest call path leading to it.

use gprof_parse::{CallGraph, Endpoint, FunctionId, Node};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::io::Write;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeltaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DeltaError>;

/// Longest call path reported for a new caller relation.
const MAX_PATH_LEN: usize = 20;

/// Growth of one function between the two reports.
#[derive(Debug, Clone, Serialize)]
pub struct FunctionGrowth {
    pub function: String,
    pub self_before: f64,
    pub self_after: f64,
    pub self_delta: f64,
    /// Self plus child time.
    pub time_before: f64,
    pub time_after: f64,
    pub time_delta: f64,
    pub calls_before: i64,
    pub calls_after: i64,
    pub calls_delta: i64,
}

/// A caller relation present only in the target report.
#[derive(Debug, Clone, Serialize)]
pub struct NewCall {
    pub caller: String,
    pub callee: String,
    pub calls: u64,
    /// Function names from a root down to the callee.
    pub call_path: Vec<String>,
}

/// Diff result.
pub struct GraphDelta {
    pub baseline_path: String,
    pub target_path: String,
    pub growth: Vec<FunctionGrowth>,
    pub new_calls: Vec<NewCall>,
}

impl GraphDelta {
    /// Compute the diff between two graphs. Functions are matched by name, so
    /// the graphs need not share a registry.
    pub fn compute(
        baseline: &CallGraph,
        target: &CallGraph,
        baseline_path: &str,
        target_path: &str,
        max_new_calls: usize,
    ) -> Self {
        let before: HashMap<&str, &Node> =
            baseline.nodes().map(|n| (n.name.as_str(), n)).collect();

        let mut growth = Vec::new();
        for node in target.nodes() {
            let after = node.stats;
            let prior = before
                .get(node.name.as_str())
                .map(|n| n.stats)
                .unwrap_or_default();
            let delta = after.subtracted(&prior);

            // Only include functions that grew
            if delta.combined_time() > 0.0 || delta.calls > 0 {
                growth.push(FunctionGrowth {
                    function: node.name.clone(),
                    self_before: prior.self_time,
                    self_after: after.self_time,
                    self_delta: delta.self_time,
                    time_before: prior.combined_time(),
                    time_after: after.combined_time(),
                    time_delta: delta.combined_time(),
                    calls_before: prior.calls,
                    calls_after: after.calls,
                    calls_delta: delta.calls,
                });
            }
        }
        growth.sort_by(|a, b| b.time_delta.total_cmp(&a.time_delta));

        let known: HashSet<(String, String)> = baseline
            .edges()
            .filter_map(|edge| {
                Some((
                    endpoint_name(baseline, edge.caller)?,
                    endpoint_name(baseline, edge.callee)?,
                ))
            })
            .collect();

        let mut new_calls = Vec::new();
        for edge in target.edges() {
            if new_calls.len() >= max_new_calls {
                break;
            }
            let (Some(caller), Some(callee)) = (
                endpoint_name(target, edge.caller),
                endpoint_name(target, edge.callee),
            ) else {
                continue;
            };
            if known.contains(&(caller.clone(), callee.clone())) {
                continue;
            }
            let call_path = edge
                .callee
                .function()
                .map(|id| shortest_call_path(target, id))
                .unwrap_or_default();
            new_calls.push(NewCall {
                caller,
                callee,
                calls: edge.calls,
                call_path,
            });
        }

        GraphDelta {
            baseline_path: baseline_path.to_string(),
            target_path: target_path.to_string(),
            growth,
            new_calls,
        }
    }

    /// Write diff as NDJSON.
    pub fn write_ndjson<W: Write>(&self, mut writer: W) -> Result<()> {
        let header = serde_json::json!({
            "type": "header",
            "format": "gprof-delta",
            "version": "0.1",
            "baseline": self.baseline_path,
            "target": self.target_path
        });
        writeln!(writer, "{}", serde_json::to_string(&header)?)?;

        for growth in &self.growth {
            let record = serde_json::json!({
                "type": "growth",
                "function": growth.function,
                "self_before": growth.self_before,
                "self_after": growth.self_after,
                "self_delta": growth.self_delta,
                "time_before": growth.time_before,
                "time_after": growth.time_after,
                "time_delta": growth.time_delta,
                "calls_before": growth.calls_before,
                "calls_after": growth.calls_after,
                "calls_delta": growth.calls_delta
            });
            writeln!(writer, "{}", serde_json::to_string(&record)?)?;
        }

        for call in &self.new_calls {
            let record = serde_json::json!({
                "type": "new_call",
                "caller": call.caller,
                "callee": call.callee,
                "calls": call.calls,
                "call_path": call.call_path
            });
            writeln!(writer, "{}", serde_json::to_string(&record)?)?;
        }

        Ok(())
    }
}

fn endpoint_name(graph: &CallGraph, endpoint: Endpoint) -> Option<String> {
    match endpoint {
        Endpoint::Function(id) => graph.node(id).map(|n| n.name.clone()),
        Endpoint::Spontaneous => Some("<spontaneous>".to_string()),
        Endpoint::Missing => None,
    }
}

/// Walk from `id` towards a root, always stepping to the caller with the
/// smallest minimum depth. Returns names root first.
fn shortest_call_path(graph: &CallGraph, id: FunctionId) -> Vec<String> {
    let mut path = Vec::new();
    let mut visited = HashSet::new();
    let mut current = graph.node(id);

    while let Some(node) = current {
        if !visited.insert(node.id) {
            break;
        }
        path.push(node.name.clone());
        if path.len() > MAX_PATH_LEN {
            path.push("...".to_string());
            break;
        }
        current = node
            .callers()
            .iter()
            .filter_map(|&edge_id| graph.edge(edge_id)?.caller.function())
            .filter(|caller| !visited.contains(caller))
            .filter_map(|caller| Some((graph.min_depth(caller)?, caller)))
            .min()
            .and_then(|(_, caller)| graph.node(caller));
    }

    path.reverse();
    path
}
