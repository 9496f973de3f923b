//! Dependency Analyzer (§4.4): for a target node, partitions its predecessors into unconditional
//! `expectedInputs` and per-decision-ancestor `conditionalGroups`.

use crate::graph::FlowGraph;
use crate::model::WaitingNodeRecord;
use std::collections::HashSet;

/// Builds the waiting record for `target` by classifying every incoming predecessor.
pub fn analyze(graph: &FlowGraph, target: &str) -> WaitingNodeRecord {
    let mut record = WaitingNodeRecord::new(target);

    for pred in graph.predecessors(target) {
        if graph.node(pred).map(|n| n.is_decision()).unwrap_or(false) {
            // A predecessor that is itself a decision-set node is its own conditional group.
            record
                .conditional_groups
                .entry(pred.clone())
                .or_default()
                .push(pred.clone());
            continue;
        }

        match nearest_decision_ancestor(graph, pred) {
            Some(decision) => record
                .conditional_groups
                .entry(decision)
                .or_default()
                .push(pred.clone()),
            None => {
                record.expected_inputs.insert(pred.clone());
            }
        }
    }

    record
}

/// Depth-first walk of `node_id`'s ancestors (not including `node_id` itself), guarding against
/// revisits, stopping at the nearest decision-set node.
fn nearest_decision_ancestor(graph: &FlowGraph, node_id: &str) -> Option<String> {
    let mut visited: HashSet<String> = HashSet::new();
    let mut stack: Vec<String> = graph.predecessors(node_id).to_vec();

    while let Some(current) = stack.pop() {
        if !visited.insert(current.clone()) {
            continue;
        }
        if graph.node(&current).map(|n| n.is_decision()).unwrap_or(false) {
            return Some(current);
        }
        stack.extend(graph.predecessors(&current).iter().cloned());
    }

    None
}
