// src/wiring.rs
//
// =============================================================================
// ODLC: WIRING CHECKER
// =============================================================================
//
// Builds the data-flow graph implied by resolved inputs (`stack_path` ->
// `stack_path` edges) and confirms it's acyclic. Resolve has already
// guaranteed every input points at a real producer; this stage re-confirms
// that as a defense, then runs the actual graph check `petgraph` can't give
// us a readable path for on its own.

use std::collections::{HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::error::{CompileError, CompileErrorKind};
use crate::model::Node;

pub fn check(root: &Node) -> Result<(), CompileError> {
    let mut graph = DiGraph::<String, ()>::new();
    let mut index_of: HashMap<String, NodeIndex> = HashMap::new();
    let mut has_output: HashSet<String> = HashSet::new();
    let mut is_consumed: HashSet<String> = HashSet::new();

    collect_nodes(root, &mut graph, &mut index_of);
    collect_edges(
        root,
        &mut graph,
        &index_of,
        &mut has_output,
        &mut is_consumed,
    )?;

    if toposort(&graph, None).is_err() {
        let cycle = find_cycle_path(&graph, &index_of).unwrap_or_default();
        return Err(CompileError::without_path(CompileErrorKind::CircularDependency(
            cycle,
        )));
    }

    for path in has_output.difference(&is_consumed) {
        log::debug!("orphan subtree at '{path}': produces an output with no in-tree consumer");
    }

    Ok(())
}

fn collect_nodes(node: &Node, graph: &mut DiGraph<String, ()>, index_of: &mut HashMap<String, NodeIndex>) {
    let path = node.stack_path.clone().expect("path assigned by expand");
    let idx = graph.add_node(path.clone());
    index_of.insert(path, idx);
    for child in &node.children {
        collect_nodes(child, graph, index_of);
    }
}

fn collect_edges(
    node: &Node,
    graph: &mut DiGraph<String, ()>,
    index_of: &HashMap<String, NodeIndex>,
    has_output: &mut HashSet<String>,
    is_consumed: &mut HashSet<String>,
) -> Result<(), CompileError> {
    let consumer_path = node.stack_path.clone().expect("path assigned by expand");

    if node.wiring.output.is_some() {
        has_output.insert(consumer_path.clone());
    }

    for input in &node.wiring.inputs {
        if let Some(producer_path) = producer_path_of(input) {
            let producer_idx = *index_of.get(producer_path).ok_or_else(|| {
                CompileError::at(
                    consumer_path.clone(),
                    CompileErrorKind::UndefinedReference(input.clone()),
                )
            })?;
            let consumer_idx = *index_of
                .get(&consumer_path)
                .expect("consumer was registered by collect_nodes");
            is_consumed.insert(producer_path.to_string());
            graph.add_edge(producer_idx, consumer_idx, ());
        }
    }

    for child in &node.children {
        collect_edges(child, graph, index_of, has_output, is_consumed)?;
    }
    Ok(())
}

/// Pull the `stack_path` portion out of a resolved `Name#path` input.
/// Returns `None` for external references (`Name:ResID@Version`),
/// dynamic-variable tokens, and `@history`/`@prev`-modified references:
/// those name a loop-carried value from a *previous* iteration of a
/// subtree the compiler never unrolls, so they are not structural edges
/// the static acyclicity check should reason about — the execution kernel
/// is responsible for sequencing them correctly across iterations.
fn producer_path_of(resolved_input: &str) -> Option<&str> {
    let (_, rest) = resolved_input.split_once('#')?;
    if rest.contains('@') {
        return None;
    }
    Some(rest)
}

fn find_cycle_path(graph: &DiGraph<String, ()>, index_of: &HashMap<String, NodeIndex>) -> Option<Vec<String>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Gray,
        Black,
    }

    let mut color: HashMap<NodeIndex, Color> = graph.node_indices().map(|i| (i, Color::White)).collect();
    let mut stack: Vec<NodeIndex> = Vec::new();

    fn visit(
        graph: &DiGraph<String, ()>,
        node: NodeIndex,
        color: &mut HashMap<NodeIndex, Color>,
        stack: &mut Vec<NodeIndex>,
    ) -> Option<Vec<NodeIndex>> {
        color.insert(node, Color::Gray);
        stack.push(node);

        for neighbor in graph.neighbors(node) {
            match color.get(&neighbor).copied().unwrap_or(Color::White) {
                Color::White => {
                    if let Some(cycle) = visit(graph, neighbor, color, stack) {
                        return Some(cycle);
                    }
                }
                Color::Gray => {
                    let start = stack.iter().position(|&n| n == neighbor).unwrap_or(0);
                    let mut cycle = stack[start..].to_vec();
                    cycle.push(neighbor);
                    return Some(cycle);
                }
                Color::Black => {}
            }
        }

        stack.pop();
        color.insert(node, Color::Black);
        None
    }

    for start in graph.node_indices() {
        if color[&start] == Color::White {
            if let Some(cycle) = visit(graph, start, &mut color, &mut stack) {
                let _ = index_of;
                return Some(cycle.into_iter().map(|i| graph[i].clone()).collect());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expand::expand;
    use crate::parse::parse_tree;
    use crate::resolve::resolve;
    use serde_json::json;

    fn wired(tree: serde_json::Value) -> Node {
        let parsed = parse_tree(&tree).expect("parses");
        let expanded = expand(parsed).expect("expands");
        resolve(expanded).expect("resolves")
    }

    #[test]
    fn acyclic_graph_passes() {
        let node = wired(json!({
            "serial": {
                "contents": [
                    {"worker": {"agent": "A", "output": "X"}},
                    {"worker": {"agent": "B", "output": "Y", "inputs": ["X"]}}
                ]
            }
        }));
        check(&node).expect("should be acyclic");
    }

    #[test]
    fn hand_built_cycle_in_a_resolved_tree_is_caught() {
        // Resolve's visibility rule (producers must be structurally earlier
        // than their consumer) makes a genuine cycle unreachable through the
        // real pipeline: every edge in a correctly resolved graph respects
        // the same order `stack_path`s are assigned in, so no sequence of
        // `compile()` inputs can ever produce one. This test bypasses Resolve
        // and hand-builds a tree that violates that invariant directly, to
        // confirm the checker's own cycle detection still fires as a
        // defense in depth rather than being dead code.
        use crate::model::{Node as RawNode, OpCode, Wiring};

        let mut a = RawNode::new(OpCode::Worker);
        a.stack_path = Some("root/worker_0".to_string());
        a.wiring = Wiring {
            inputs: vec!["B#root/worker_1".to_string()],
            output: Some("A".to_string()),
        };

        let mut b = RawNode::new(OpCode::Worker);
        b.stack_path = Some("root/worker_1".to_string());
        b.wiring = Wiring {
            inputs: vec!["A#root/worker_0".to_string()],
            output: Some("B".to_string()),
        };

        let mut root = RawNode::new(OpCode::Serial);
        root.stack_path = Some("root".to_string());
        root.children = vec![a, b];

        let err = check(&root).unwrap_err();
        assert!(matches!(err.kind, CompileErrorKind::CircularDependency(_)));
    }

    #[test]
    fn self_referencing_loop_through_history_is_not_flagged_as_a_cycle() {
        // @history/@prev edges still point from an earlier iteration to a
        // later consumer in the static tree; they never point backward.
        let node = wired(json!({
            "fan_out": {
                "source": "RegionList",
                "item_key": "region",
                "strategy": "serial",
                "worker": {"agent": "W", "output": "Report", "inputs": ["Report@history"]}
            }
        }));
        check(&node).expect("history edges are not a structural cycle");
    }
}
