//! Graph Model (§4.1): immutable adjacency + reverse adjacency over nodes and edges, starting-node
//! detection, and the deterministic fan-in ordering used by the input combiner.

use crate::error::EngineError;
use crate::model::{FlowEdge, FlowNode, STICKY_NOTE};
use std::collections::HashMap;

/// A loaded flow definition plus its derived adjacency.
#[derive(Clone, Debug)]
pub struct FlowGraph {
    pub nodes: HashMap<String, FlowNode>,
    pub edges: Vec<FlowEdge>,
    /// forward adjacency: nodeId -> [childId], edges ordered by `FlowEdge::source_index`
    pub graph: HashMap<String, Vec<String>>,
    /// reverse adjacency: nodeId -> [predecessorId]
    pub reversed_graph: HashMap<String, Vec<String>>,
    /// nodeId -> indegree (count of incoming edges from non-sticky-note sources)
    pub node_dependencies: HashMap<String, usize>,
}

impl FlowGraph {
    /// Builds the graph from nodes and edges, deriving adjacency, reverse adjacency, and
    /// indegree. Sticky-note nodes are kept in `nodes` (for lookup) but excluded from adjacency
    /// traversal, matching §4.1's "filtered out during traversal".
    pub fn build(nodes: Vec<FlowNode>, edges: Vec<FlowEdge>) -> Result<Self, EngineError> {
        let nodes: HashMap<String, FlowNode> =
            nodes.into_iter().map(|n| (n.id.clone(), n)).collect();

        for edge in &edges {
            if !nodes.contains_key(&edge.source) {
                return Err(EngineError::Graph(format!(
                    "edge references unknown source node {}",
                    edge.source
                )));
            }
            if !nodes.contains_key(&edge.target) {
                return Err(EngineError::Graph(format!(
                    "edge references unknown target node {}",
                    edge.target
                )));
            }
        }

        let mut sorted_edges = edges.clone();
        sorted_edges.sort_by_key(|e| e.source_index());

        let mut graph: HashMap<String, Vec<String>> = HashMap::new();
        let mut reversed_graph: HashMap<String, Vec<String>> = HashMap::new();
        let mut node_dependencies: HashMap<String, usize> =
            nodes.keys().map(|id| (id.clone(), 0)).collect();

        for edge in &sorted_edges {
            if is_sticky(&nodes, &edge.source) {
                continue;
            }
            graph
                .entry(edge.source.clone())
                .or_default()
                .push(edge.target.clone());
            reversed_graph
                .entry(edge.target.clone())
                .or_default()
                .push(edge.source.clone());
            *node_dependencies.entry(edge.target.clone()).or_insert(0) += 1;
        }

        Ok(Self {
            nodes,
            edges: sorted_edges,
            graph,
            reversed_graph,
            node_dependencies,
        })
    }

    fn is_sticky_note(&self, node_id: &str) -> bool {
        is_sticky(&self.nodes, node_id)
    }

    /// All non-sticky-note nodes with indegree 0.
    pub fn starting_nodes(&self) -> Vec<String> {
        self.node_dependencies
            .iter()
            .filter(|(id, &deg)| deg == 0 && !self.is_sticky_note(id))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// True if at least one indegree-0 node declares a `start_input_type` (§6: a fresh run is
    /// rejected with `StartInput` unless one exists).
    pub fn has_declared_start_input(&self) -> bool {
        self.starting_nodes()
            .iter()
            .any(|id| self.node(id).map(FlowNode::declares_start_input).unwrap_or(false))
    }

    pub fn successors(&self, node_id: &str) -> &[String] {
        self.graph.get(node_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn predecessors(&self, node_id: &str) -> &[String] {
        self.reversed_graph
            .get(node_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn node(&self, node_id: &str) -> Option<&FlowNode> {
        self.nodes.get(node_id)
    }

    /// Outgoing edges from `node_id`, ordered by source handle index (deterministic fan-in
    /// positioning, §4.1).
    pub fn outgoing_edges(&self, node_id: &str) -> Vec<&FlowEdge> {
        self.edges.iter().filter(|e| e.source == node_id).collect()
    }
}

fn is_sticky(nodes: &HashMap<String, FlowNode>, node_id: &str) -> bool {
    nodes
        .get(node_id)
        .map(|n| n.name == STICKY_NOTE)
        .unwrap_or(false)
}
