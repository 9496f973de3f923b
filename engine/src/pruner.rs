//! Branch Pruner (§4.6): inspects decision-node output, computes the set of successor edges to
//! skip for this dispatch.

use crate::graph::FlowGraph;
use crate::model::{FlowNode, NodeOutput};
use std::collections::HashSet;

/// Successor node ids to skip for this dispatch only (they may still be reached via other
/// paths; no retroactive removal of already-scheduled branches).
pub fn pruned_successors(graph: &FlowGraph, node: &FlowNode, output: &NodeOutput) -> HashSet<String> {
    if !node.is_decision() || output.conditions.is_empty() {
        return HashSet::new();
    }

    let mut skip = HashSet::new();
    for (index, condition) in output.conditions.iter().enumerate() {
        if condition.is_fullfilled {
            continue;
        }
        for edge in graph.outgoing_edges(&node.id) {
            if edge.source_index() == index as u32 {
                skip.insert(edge.target.clone());
            }
        }
    }
    skip
}
