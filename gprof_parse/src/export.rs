//! Text outputs for built call graphs.
//!
//! - dot: a `digraph` with one labeled node per function and one labeled
//!   edge per caller relation.
//! - feature lines: libSVM-style sparse vectors, `<graph id> <index>:<value> ...`,
//!   one per graph, indices ascending.
//! - identity map: a JSON object from identity to full function name, so
//!   feature indices can be turned back into names.
//! - summary: a human-readable per-node dump for debugging.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::{BufRead, BufReader, Read, Write};
use thiserror::Error;

use crate::config::{Config, FeatureMode, MIN_FEATURE_STRIDE};
use crate::graph::{CallGraph, Endpoint, GraphId};
use crate::registry::{FunctionId, FunctionRegistry, display_name};

/// Errors that can occur while writing or reading exported data.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed feature line {line}: {message}")]
    FeatureLine { line: usize, message: String },

    #[error("identity map key '{0}' is not a function identity")]
    IdentityKey(String),
}

pub type Result<T> = std::result::Result<T, ExportError>;

/// Index of one value within a feature line.
pub type FeatureIndex = u64;

/// Combined times at or below this are left out of feature lines.
pub const MIN_FEATURE_TIME: f64 = 0.0001;

/// Options controlling which nodes become features and how.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureOptions {
    pub max_depth: u32,
    pub mode: FeatureMode,
    /// Raised to [`MIN_FEATURE_STRIDE`] when smaller.
    pub stride: u32,
    pub normalize_time: bool,
}

impl From<&Config> for FeatureOptions {
    fn from(config: &Config) -> Self {
        Self {
            max_depth: config.max_depth,
            mode: config.mode,
            stride: config.feature_stride.max(MIN_FEATURE_STRIDE),
            normalize_time: config.normalize_time,
        }
    }
}

impl Default for FeatureOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

// ============================================================================
// dot
// ============================================================================

/// Write the graph in Graphviz dot syntax. Node labels carry self plus child
/// time and edge labels the call count.
pub fn write_dot<W: Write>(graph: &CallGraph, mut writer: W) -> Result<()> {
    writeln!(writer, "digraph {{")?;
    for node in graph.nodes() {
        writeln!(
            writer,
            "{0} [label=\"{0}\\n{1:.4}\"]",
            node.display_name(),
            node.stats.combined_time()
        )?;
    }
    for edge in graph.edges() {
        let Some(callee) = edge.callee.function().and_then(|id| graph.node(id)) else {
            continue;
        };
        let caller = match edge.caller {
            Endpoint::Function(id) => match graph.node(id) {
                Some(node) => node.display_name(),
                None => continue,
            },
            Endpoint::Spontaneous => "_spontaneous_",
            Endpoint::Missing => continue,
        };
        writeln!(
            writer,
            "{}->{} [label=\"{}\"]",
            caller,
            callee.display_name(),
            edge.calls
        )?;
    }
    writeln!(writer, "}}")?;
    Ok(())
}

// ============================================================================
// Feature lines
// ============================================================================

/// One sparse feature vector.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureLine {
    pub graph_id: GraphId,
    /// Ascending by index.
    pub features: Vec<(FeatureIndex, f64)>,
}

impl FeatureLine {
    /// Build the feature vector of a graph.
    ///
    /// A node contributes when its minimum depth is within `max_depth` and
    /// its combined time exceeds [`MIN_FEATURE_TIME`]. In `time` mode the
    /// index is the node identity; in `timecalls` mode a node with identity
    /// `id` yields `id*stride+1` (time) and `id*stride+2` (calls).
    pub fn from_graph(graph: &CallGraph, options: &FeatureOptions) -> Self {
        let stride = FeatureIndex::from(options.stride.max(MIN_FEATURE_STRIDE));
        let mut features = Vec::new();
        for node in graph.nodes() {
            match graph.min_depth(node.id) {
                Some(depth) if depth <= options.max_depth => {}
                _ => continue,
            }
            let time = node.stats.combined_time();
            if time <= MIN_FEATURE_TIME {
                continue;
            }
            let value = if options.normalize_time {
                graph.time_fraction(time)
            } else {
                time
            };
            let id = FeatureIndex::from(node.id);
            match options.mode {
                FeatureMode::Time => features.push((id, value)),
                FeatureMode::TimeCalls => {
                    let base = id * stride;
                    features.push((base + 1, value));
                    features.push((base + 2, node.stats.calls as f64));
                }
            }
        }
        Self {
            graph_id: graph.id,
            features,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn get(&self, index: FeatureIndex) -> Option<f64> {
        self.features
            .binary_search_by_key(&index, |&(i, _)| i)
            .ok()
            .map(|pos| self.features[pos].1)
    }

    /// Parse one line as written by the `Display` impl. `line_num` is only
    /// used for error messages.
    pub fn parse(line_num: usize, line: &str) -> Result<Self> {
        let malformed = |message: String| ExportError::FeatureLine {
            line: line_num,
            message,
        };
        let mut tokens = line.split_whitespace();
        let graph_id = tokens
            .next()
            .ok_or_else(|| malformed("empty line".to_string()))?
            .parse::<GraphId>()
            .map_err(|e| malformed(format!("bad graph id: {e}")))?;

        let mut features = Vec::new();
        for token in tokens {
            let (index, value) = token
                .split_once(':')
                .ok_or_else(|| malformed(format!("expected index:value, got '{token}'")))?;
            let index = index
                .parse::<FeatureIndex>()
                .map_err(|e| malformed(format!("bad index '{index}': {e}")))?;
            let value = value
                .parse::<f64>()
                .map_err(|e| malformed(format!("bad value '{value}': {e}")))?;
            if features.last().is_some_and(|&(prev, _)| prev >= index) {
                return Err(malformed(format!("index {index} out of order")));
            }
            features.push((index, value));
        }
        Ok(Self { graph_id, features })
    }
}

impl fmt::Display for FeatureLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.graph_id)?;
        for (index, value) in &self.features {
            write!(f, " {index}:{value:.4}")?;
        }
        Ok(())
    }
}

/// Write feature lines, one per line.
pub fn write_features<'a, W, I>(mut writer: W, lines: I) -> Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a FeatureLine>,
{
    for line in lines {
        writeln!(writer, "{line}")?;
    }
    Ok(())
}

/// Read feature lines back, skipping blank lines.
pub fn read_features<R: Read>(reader: R) -> Result<Vec<FeatureLine>> {
    let mut lines = Vec::new();
    for (idx, line) in BufReader::new(reader).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        lines.push(FeatureLine::parse(idx + 1, &line)?);
    }
    Ok(lines)
}

// ============================================================================
// Identity map
// ============================================================================

/// Write `{"<id>":"<name>",...}` for every identity in the registry, in
/// ascending order.
///
/// With `replicate > 1`, every identity is written at `id*factor + k` for
/// `k` in `0..replicate`, matching the layout of `timecalls` feature indices.
pub fn write_identity_map<W: Write>(
    registry: &FunctionRegistry,
    factor: u32,
    replicate: u32,
    mut writer: W,
) -> Result<()> {
    let replicate = replicate.max(1);
    let factor = if replicate > 1 { factor.max(1) } else { 1 };

    write!(writer, "{{")?;
    let mut first = true;
    for (id, name) in registry.iter() {
        let name = serde_json::to_string(name)?;
        for k in 0..replicate {
            let key = FeatureIndex::from(id) * FeatureIndex::from(factor) + FeatureIndex::from(k);
            if !first {
                write!(writer, ",")?;
            }
            first = false;
            write!(writer, "\n\"{key}\":{name}")?;
        }
    }
    writeln!(writer, "\n}}")?;
    Ok(())
}

/// Read an identity map written by [`write_identity_map`].
pub fn read_identity_map<R: Read>(reader: R) -> Result<BTreeMap<FeatureIndex, String>> {
    let raw: HashMap<String, String> = serde_json::from_reader(reader)?;
    raw.into_iter()
        .map(|(key, name)| match key.parse::<FeatureIndex>() {
            Ok(id) => Ok((id, name)),
            Err(_) => Err(ExportError::IdentityKey(key)),
        })
        .collect()
}

// ============================================================================
// Summary
// ============================================================================

/// Human-readable dump of every node with its statistics and edges.
pub fn write_summary<W: Write>(graph: &CallGraph, mut writer: W) -> Result<()> {
    writeln!(
        writer,
        "graph {}: {} nodes, {} edges, total time {:.4}s",
        graph.id,
        graph.node_count(),
        graph.edge_count(),
        graph.total_time()
    )?;
    for node in graph.nodes() {
        let stats = &node.stats;
        writeln!(writer, "node {} {}", node.id, node.display_name())?;
        writeln!(
            writer,
            "  stats: pct:{:.2} self:{:.4} children:{:.4} calls:{}",
            stats.time_pct, stats.self_time, stats.child_time, stats.calls
        )?;
        match graph.min_depth(node.id) {
            Some(depth) => writeln!(writer, "  depth: {depth}")?,
            None => writeln!(writer, "  depth: unresolved")?,
        }
        for (label, edges) in [("callers", node.callers()), ("callees", node.callees())] {
            writeln!(writer, "  {label}:")?;
            for edge in edges.iter().filter_map(|&id| graph.edge(id)) {
                writeln!(
                    writer,
                    "    count {} from {} to {}",
                    edge.calls,
                    endpoint_name(graph, edge.caller),
                    endpoint_name(graph, edge.callee)
                )?;
            }
        }
    }
    Ok(())
}

fn endpoint_name(graph: &CallGraph, endpoint: Endpoint) -> String {
    match endpoint {
        Endpoint::Function(id) => match graph.node(id) {
            Some(node) => format!("{}:{}", id, node.display_name()),
            None => format!("{id}:?"),
        },
        Endpoint::Spontaneous => "<spontaneous>".to_string(),
        Endpoint::Missing => "<missing>".to_string(),
    }
}

/// Name recorded for a feature index, undoing the `timecalls` layout when a
/// stride is given.
pub fn function_for_feature(
    registry: &FunctionRegistry,
    index: FeatureIndex,
    stride: Option<u32>,
) -> Option<&str> {
    let id = match stride {
        Some(stride) if stride > 0 => index / FeatureIndex::from(stride),
        _ => index,
    };
    FunctionId::try_from(id)
        .ok()
        .and_then(|id| registry.name_of(id))
        .map(display_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Node, NodeStats};
    use crate::parser::ReportParser;
    use crate::registry::Identities;
    use std::io::Cursor;

    const REPORT: &str = r#" time   seconds   seconds    calls  ms/call  ms/call  name
 50.00      1.00     1.00        1  1000.00  2000.00  main
 30.00      1.60     0.60        3   200.00   200.00  std::vector<int>::push_back(int const&)
 20.00      2.00     0.40        2   200.00   200.00  deep

index % time    self  children    called     name
                                                 <spontaneous>
[1]    100.0    1.00    1.00                 main [1]
-----------------------------------------------
                0.60    0.00       3/3           main [1]
[2]     30.0    0.60    0.00       3         std::vector<int>::push_back(int const&) [2]
-----------------------------------------------
                0.40    0.00       2/2           std::vector<int>::push_back(int const&) [2]
[3]     20.0    0.40    0.00       2         deep [3]
-----------------------------------------------
"#;

    fn parsed() -> (CallGraph, FunctionRegistry) {
        let mut registry = FunctionRegistry::new();
        let parsed = ReportParser::new(&mut registry)
            .parse(7, Cursor::new(REPORT))
            .unwrap();
        (parsed.graph, registry)
    }

    #[test]
    fn test_dot_output() {
        let (graph, _) = parsed();
        let mut out = Vec::new();
        write_dot(&graph, &mut out).unwrap();
        let dot = String::from_utf8(out).unwrap();

        assert!(dot.starts_with("digraph {\n"));
        assert!(dot.ends_with("}\n"));
        assert!(dot.contains("main [label=\"main\\n2.0000\"]"));
        // names are cleaned and cut to the display length
        assert!(dot.contains("std__vector_int___push_back_in [label="));
        assert!(dot.contains("_spontaneous_->main [label=\"0\"]"));
        assert!(dot.contains("main->std__vector_int___push_back_in [label=\"3\"]"));
    }

    #[test]
    fn test_feature_line_time_mode() {
        let (graph, _) = parsed();
        let line = FeatureLine::from_graph(&graph, &FeatureOptions::default());

        assert_eq!(line.to_string(), "7 0:2.0000 1:0.6000 2:0.4000");
    }

    #[test]
    fn test_feature_line_respects_max_depth() {
        let (graph, _) = parsed();
        let options = FeatureOptions {
            max_depth: 1,
            ..FeatureOptions::default()
        };
        let line = FeatureLine::from_graph(&graph, &options);

        assert_eq!(line.features.len(), 2);
        assert_eq!(line.get(2), None);
    }

    #[test]
    fn test_feature_line_timecalls_mode() {
        let (graph, _) = parsed();
        let options = FeatureOptions {
            mode: FeatureMode::TimeCalls,
            normalize_time: true,
            ..FeatureOptions::default()
        };
        let line = FeatureLine::from_graph(&graph, &options);

        assert_eq!(
            line.to_string(),
            "7 1:1.0000 2:1.0000 11:0.3000 12:3.0000 21:0.2000 22:2.0000"
        );
    }

    #[test]
    fn test_feature_line_small_stride_is_raised() {
        let (graph, _) = parsed();
        let config = Config {
            mode: FeatureMode::TimeCalls,
            feature_stride: 1,
            ..Config::default()
        };
        assert_eq!(FeatureOptions::from(&config).stride, MIN_FEATURE_STRIDE);

        let options = FeatureOptions {
            stride: 1,
            ..FeatureOptions::from(&config)
        };
        let line = FeatureLine::from_graph(&graph, &options);
        let text = line.to_string();

        assert_eq!(text, "7 1:2.0000 2:1.0000 4:0.6000 5:3.0000 7:0.4000 8:2.0000");
        assert_eq!(FeatureLine::parse(1, &text).unwrap(), line);
    }

    #[test]
    fn test_feature_line_skips_negligible_time() {
        let mut graph = CallGraph::new(0);
        graph
            .add_node(Node::new(0, "idle", NodeStats::new(0.0, 0.00005, 0.0, 1)))
            .unwrap();
        graph
            .add_node(Node::new(1, "busy", NodeStats::new(0.0, 0.5, 0.0, 1)))
            .unwrap();

        let line = FeatureLine::from_graph(&graph, &FeatureOptions::default());
        assert_eq!(line.features, vec![(1, 0.5)]);
    }

    #[test]
    fn test_feature_lines_read_back() {
        let (graph, _) = parsed();
        let options = FeatureOptions::default();
        let written = vec![
            FeatureLine::from_graph(&graph, &options),
            FeatureLine {
                graph_id: 8,
                features: vec![],
            },
        ];

        let mut out = Vec::new();
        write_features(&mut out, &written).unwrap();
        let read = read_features(Cursor::new(out)).unwrap();

        assert_eq!(read.len(), 2);
        assert_eq!(read[0].graph_id, 7);
        assert_eq!(read[1].graph_id, 8);
        assert!(read[1].is_empty());
        for (&(wi, wv), &(ri, rv)) in written[0].features.iter().zip(&read[0].features) {
            assert_eq!(wi, ri);
            assert!((wv - rv).abs() <= 0.00005);
        }
    }

    #[test]
    fn test_feature_line_parse_errors() {
        assert!(matches!(
            FeatureLine::parse(3, "x 1:2.0"),
            Err(ExportError::FeatureLine { line: 3, .. })
        ));
        assert!(FeatureLine::parse(1, "0 1-2.0").is_err());
        assert!(FeatureLine::parse(1, "0 2:1.0 1:1.0").is_err());
        assert!(FeatureLine::parse(1, "").is_err());
    }

    #[test]
    fn test_identity_map_round_trip() {
        let mut registry = FunctionRegistry::new();
        registry.identity_for("main");
        registry.identity_for("say \"hi\"");

        let mut out = Vec::new();
        write_identity_map(&registry, 1, 1, &mut out).unwrap();
        let text = String::from_utf8(out.clone()).unwrap();
        assert!(text.starts_with("{\n\"0\":\"main\""));

        let map = read_identity_map(Cursor::new(out)).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map[&0], "main");
        assert_eq!(map[&1], "say_\"hi\"");
    }

    #[test]
    fn test_identity_map_replication() {
        let mut registry = FunctionRegistry::new();
        registry.identity_for("main");
        registry.identity_for("work");

        let mut out = Vec::new();
        write_identity_map(&registry, 10, 3, &mut out).unwrap();
        let map = read_identity_map(Cursor::new(out)).unwrap();

        let keys: Vec<_> = map.keys().copied().collect();
        assert_eq!(keys, vec![0, 1, 2, 10, 11, 12]);
        assert_eq!(map[&11], "work");
    }

    #[test]
    fn test_identity_map_rejects_bad_key() {
        let result = read_identity_map(Cursor::new(r#"{"main":"0"}"#));
        assert!(matches!(result, Err(ExportError::IdentityKey(k)) if k == "main"));
    }

    #[test]
    fn test_function_for_feature() {
        let (_, registry) = parsed();
        assert_eq!(function_for_feature(&registry, 0, None), Some("main"));
        assert_eq!(function_for_feature(&registry, 21, Some(10)), Some("deep"));
        assert_eq!(function_for_feature(&registry, 99, None), None);
    }

    #[test]
    fn test_summary_lists_edges() {
        let (graph, _) = parsed();
        let mut out = Vec::new();
        write_summary(&graph, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("graph 7: 3 nodes, 3 edges"));
        assert!(text.contains("node 2 deep"));
        assert!(text.contains("  depth: 2"));
        assert!(text.contains("count 0 from <spontaneous> to 0:main"));
    }
}
