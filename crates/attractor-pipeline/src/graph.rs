//! In-memory graph model: nodes, edges, and their typed attributes.
//!
//! This module is a pure data structure with accessors; it owns no execution
//! logic. Node type resolution, retry counts, and routing attributes are all
//! read directly from the attribute map rather than from any DOT-specific
//! concept such as node shape.

use std::collections::HashMap;

use attractor_dot::{AttributeValue, DotGraph, EdgeDef, NodeDef};

/// A typed attribute value attached to a node, edge, or graph.
///
/// Missing keys resolve to the typed zero value (`""`, `0`, `false`, `[]`) at
/// the accessor layer — missing and empty are intentionally indistinguishable
/// for routing purposes.
#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    String(String),
    Integer(i64),
    Boolean(bool),
    StringList(Vec<String>),
}

impl Attribute {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Attribute::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Attribute::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Attribute::Boolean(b) => Some(*b),
            Attribute::String(s) => Some(s == "true"),
            _ => None,
        }
    }

    pub fn as_string_list(&self) -> Option<&[String]> {
        match self {
            Attribute::StringList(v) => Some(v),
            _ => None,
        }
    }
}

/// Converts the DOT parser's richer `AttributeValue` (which also carries
/// `Float`/`Duration`) into the graph model's 4-variant `Attribute`. Float
/// and duration values degrade to their string representation.
impl From<&AttributeValue> for Attribute {
    fn from(v: &AttributeValue) -> Self {
        match v {
            AttributeValue::String(s) => Attribute::String(s.clone()),
            AttributeValue::Integer(i) => Attribute::Integer(*i),
            AttributeValue::Boolean(b) => Attribute::Boolean(*b),
            AttributeValue::Float(f) => Attribute::String(f.to_string()),
            AttributeValue::Duration(d) => Attribute::String(format!("{}ms", d.as_millis())),
        }
    }
}

fn convert_attrs(attrs: &HashMap<String, AttributeValue>) -> HashMap<String, Attribute> {
    attrs.iter().map(|(k, v)| (k.clone(), v.into())).collect()
}

/// A single node in the pipeline graph.
#[derive(Debug, Clone)]
pub struct PipelineNode {
    pub id: String,
    pub attributes: HashMap<String, Attribute>,
}

impl PipelineNode {
    pub fn attr_string(&self, key: &str) -> String {
        self.attributes
            .get(key)
            .and_then(Attribute::as_str)
            .map(str::to_owned)
            .unwrap_or_default()
    }

    pub fn attr_int(&self, key: &str) -> i64 {
        self.attributes.get(key).and_then(Attribute::as_int).unwrap_or(0)
    }

    pub fn attr_bool(&self, key: &str) -> bool {
        self.attributes
            .get(key)
            .and_then(Attribute::as_bool)
            .unwrap_or(false)
    }

    /// The handler-dispatch type. Required to select a handler; resolved
    /// purely from the `type` attribute (no shape-based fallback).
    pub fn node_type(&self) -> String {
        self.attr_string("type")
    }

    pub fn label(&self) -> String {
        let label = self.attr_string("label");
        if label.is_empty() {
            self.id.clone()
        } else {
            label
        }
    }

    pub fn max_retries(&self) -> usize {
        let attrs = &self.attributes;
        match attrs.get("max_retries").and_then(Attribute::as_int) {
            Some(v) if v >= 0 => v as usize,
            _ => 3,
        }
    }

    pub fn timeout_ms(&self) -> Option<u64> {
        self.attributes
            .get("timeout_ms")
            .and_then(Attribute::as_int)
            .map(|v| v.max(0) as u64)
    }

    pub fn is_parallel(&self) -> bool {
        self.node_type() == "parallel"
    }
}

/// A directed edge between two nodes.
#[derive(Debug, Clone)]
pub struct PipelineEdge {
    pub from: String,
    pub to: String,
    pub attributes: HashMap<String, Attribute>,
}

impl PipelineEdge {
    pub fn label(&self) -> Option<&str> {
        self.attributes.get("label").and_then(Attribute::as_str)
    }

    pub fn condition(&self) -> Option<&str> {
        self.attributes.get("condition").and_then(Attribute::as_str)
    }

    pub fn priority(&self) -> i64 {
        self.attributes
            .get("priority")
            .and_then(Attribute::as_int)
            .unwrap_or(0)
    }

    pub fn is_parallel(&self) -> bool {
        self.attributes
            .get("parallel")
            .and_then(Attribute::as_bool)
            .unwrap_or(false)
    }
}

/// The full pipeline graph: nodes, edges in insertion order, and graph-level
/// attributes.
#[derive(Debug, Clone)]
pub struct PipelineGraph {
    pub name: String,
    pub attributes: HashMap<String, Attribute>,
    nodes: HashMap<String, PipelineNode>,
    /// Insertion order is authoritative: it determines routing tie-breaks.
    edges: Vec<PipelineEdge>,
    /// Maps node_id to a range (start, count) into `edges`. `edges` is kept
    /// sorted (stably, so within-node order is preserved) by `from` so each
    /// node's outgoing edges form a contiguous slice.
    adjacency: HashMap<String, (usize, usize)>,
    incoming_counts: HashMap<String, usize>,
}

fn node_def_to_pipeline_node(
    id: &str,
    node_def: &NodeDef,
    graph_defaults: &HashMap<String, AttributeValue>,
    subgraph_defaults: Option<&HashMap<String, AttributeValue>>,
) -> PipelineNode {
    let mut attrs = graph_defaults.clone();
    if let Some(sg_defaults) = subgraph_defaults {
        attrs.extend(sg_defaults.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    attrs.extend(node_def.attrs.iter().map(|(k, v)| (k.clone(), v.clone())));

    PipelineNode {
        id: id.to_string(),
        attributes: convert_attrs(&attrs),
    }
}

fn edge_def_to_pipeline_edge(
    edge_def: &EdgeDef,
    edge_defaults: &HashMap<String, AttributeValue>,
) -> PipelineEdge {
    let mut attrs = edge_defaults.clone();
    attrs.extend(edge_def.attrs.iter().map(|(k, v)| (k.clone(), v.clone())));

    PipelineEdge {
        from: edge_def.from.clone(),
        to: edge_def.to.clone(),
        attributes: convert_attrs(&attrs),
    }
}

impl PipelineGraph {
    pub fn from_dot(graph: DotGraph) -> attractor_types::Result<Self> {
        let mut nodes = HashMap::new();
        let mut all_edges = Vec::new();

        for (id, node_def) in &graph.nodes {
            let pn = node_def_to_pipeline_node(id, node_def, &graph.node_defaults, None);
            nodes.insert(id.clone(), pn);
        }

        for sg in &graph.subgraphs {
            for (id, node_def) in &sg.nodes {
                let pn = node_def_to_pipeline_node(
                    id,
                    node_def,
                    &graph.node_defaults,
                    Some(&sg.node_defaults),
                );
                nodes.insert(id.clone(), pn);
            }
        }

        for edge_def in &graph.edges {
            all_edges.push(edge_def_to_pipeline_edge(edge_def, &graph.edge_defaults));
        }

        for sg in &graph.subgraphs {
            let mut sg_edge_defaults = graph.edge_defaults.clone();
            sg_edge_defaults.extend(sg.edge_defaults.iter().map(|(k, v)| (k.clone(), v.clone())));
            for edge_def in &sg.edges {
                all_edges.push(edge_def_to_pipeline_edge(edge_def, &sg_edge_defaults));
            }
        }

        // Ensure every edge endpoint has a node entry, even if only referenced
        // implicitly (DOT allows bare `A -> B` without a node statement).
        for edge in &all_edges {
            nodes.entry(edge.from.clone()).or_insert_with(|| PipelineNode {
                id: edge.from.clone(),
                attributes: HashMap::new(),
            });
            nodes.entry(edge.to.clone()).or_insert_with(|| PipelineNode {
                id: edge.to.clone(),
                attributes: HashMap::new(),
            });
        }

        let mut incoming_counts: HashMap<String, usize> =
            nodes.keys().map(|id| (id.clone(), 0)).collect();
        for edge in &all_edges {
            *incoming_counts.entry(edge.to.clone()).or_insert(0) += 1;
        }

        // Stable sort by `from` so each node's outgoing edges form a
        // contiguous slice while preserving within-node insertion order.
        all_edges.sort_by(|a, b| a.from.cmp(&b.from));

        let mut adjacency: HashMap<String, (usize, usize)> = HashMap::new();
        let mut i = 0;
        while i < all_edges.len() {
            let start = i;
            let from = &all_edges[i].from;
            while i < all_edges.len() && all_edges[i].from == *from {
                i += 1;
            }
            adjacency.insert(from.clone(), (start, i - start));
        }

        Ok(PipelineGraph {
            name: graph.name,
            attributes: convert_attrs(&graph.attrs),
            nodes,
            edges: all_edges,
            adjacency,
            incoming_counts,
        })
    }

    /// The start node: the node whose `type = "start"`. Failing that, any
    /// node with zero incoming edges. Failing that, `None`.
    pub fn start_node(&self) -> Option<&PipelineNode> {
        self.nodes
            .values()
            .find(|n| n.node_type() == "start")
            .or_else(|| {
                let mut zero_incoming: Vec<&PipelineNode> = self
                    .nodes
                    .values()
                    .filter(|n| self.incoming_counts.get(&n.id).copied().unwrap_or(0) == 0)
                    .collect();
                zero_incoming.sort_by(|a, b| a.id.cmp(&b.id));
                zero_incoming.into_iter().next()
            })
    }

    /// The exit node: the node whose `type = "exit"`.
    pub fn exit_node(&self) -> Option<&PipelineNode> {
        self.nodes.values().find(|n| n.node_type() == "exit")
    }

    pub fn is_exit_node(&self, node_id: &str) -> bool {
        self.nodes
            .get(node_id)
            .map(|n| n.node_type() == "exit")
            .unwrap_or(false)
    }

    pub fn node(&self, id: &str) -> Option<&PipelineNode> {
        self.nodes.get(id)
    }

    pub fn outgoing_edges(&self, node_id: &str) -> &[PipelineEdge] {
        match self.adjacency.get(node_id) {
            Some(&(start, count)) => &self.edges[start..start + count],
            None => &[],
        }
    }

    pub fn all_nodes(&self) -> impl Iterator<Item = &PipelineNode> {
        self.nodes.values()
    }

    pub fn all_edges(&self) -> &[PipelineEdge] {
        &self.edges
    }

    /// A stable identity for this graph, used to validate checkpoint resume.
    pub fn identity(&self) -> String {
        let mut node_ids: Vec<&str> = self.nodes.keys().map(String::as_str).collect();
        node_ids.sort_unstable();
        format!("{}:{}:{}", self.name, node_ids.join(","), self.edges.len())
    }
}
