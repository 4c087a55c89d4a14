// src/resolve.rs
//
// =============================================================================
// ODLC: SCOPE RESOLVER
// =============================================================================
//
// Maps every logical `inputs` entry to its physical producer, or to a
// Project Document's external reference form. Visibility is decided purely
// from `stack_path` segment comparison — no name lookup walks the tree
// structure directly, so the algorithm is a flat index built once up front.
//
// Batches every error in the tree (like Syntax), since a single bad
// reference shouldn't hide the next one.

use std::collections::HashMap;

use crate::error::{CompileError, CompileErrorKind, CompileErrors};
use crate::model::{Node, OpCode};
use crate::names::{self, NameClass};
use crate::paths;

const LOOP_VARS: &[&str] = &["$LOOP", "$PREV", "$HISTORY"];
const ITERATE_VARS: &[&str] = &["$KEY", "$ITEM"];

#[derive(Default)]
struct Index {
    opcode_by_path: HashMap<String, OpCode>,
    producers: Vec<(String, String)>, // (artifact name, producer path)
}

pub fn resolve(mut root: Node) -> Result<Node, CompileErrors> {
    let mut index = Index::default();
    build_index(&root, &mut index);

    let mut errors = Vec::new();
    resolve_node(&mut root, &index, &mut errors);
    CompileErrors::into_result(errors, root)
}

fn build_index(node: &Node, index: &mut Index) {
    let path = node
        .stack_path
        .as_ref()
        .expect("stack_path must be assigned before resolve runs");
    index.opcode_by_path.insert(path.clone(), node.opcode);
    if let Some(output) = &node.wiring.output {
        index.producers.push((output.clone(), path.clone()));
    }
    for child in &node.children {
        build_index(child, index);
    }
}

fn resolve_node(node: &mut Node, index: &Index, errors: &mut Vec<CompileError>) {
    let consumer_path = node
        .stack_path
        .clone()
        .expect("stack_path must be assigned before resolve runs");

    let mut resolved = Vec::with_capacity(node.wiring.inputs.len());
    for input in &node.wiring.inputs {
        match resolve_input(input, &consumer_path, index) {
            Ok(rewritten) => resolved.push(rewritten),
            Err(kind) => {
                errors.push(CompileError::at(consumer_path.clone(), kind));
                resolved.push(input.clone());
            }
        }
    }
    node.wiring.inputs = resolved;

    for child in &mut node.children {
        resolve_node(child, index, errors);
    }
}

fn resolve_input(
    input: &str,
    consumer_path: &str,
    index: &Index,
) -> Result<String, CompileErrorKind> {
    if LOOP_VARS.contains(&input) {
        return check_dynamic_var(input, consumer_path, index, OpCode::Loop);
    }
    if ITERATE_VARS.contains(&input) {
        return check_dynamic_var(input, consumer_path, index, OpCode::Iterate);
    }
    if input.starts_with('$') {
        return Err(CompileErrorKind::UnboundDynamicVariable(input.to_string()));
    }

    let (base, modifier) = match input.split_once('@') {
        Some((base, modifier)) => (base, Some(modifier)),
        None => (input, None),
    };

    if let Some(modifier) = modifier {
        if modifier != "history" && modifier != "prev" {
            return Err(CompileErrorKind::InvalidModifier(modifier.to_string()));
        }
        if !in_serial_under_loop_or_iterate(consumer_path, index) {
            return Err(CompileErrorKind::InvalidModifier(modifier.to_string()));
        }
    }

    match names::classify(base) {
        NameClass::ProjectDocument {
            name,
            resource_id,
            version,
        } => Ok(names::external_reference(&name, &resource_id, &version)),
        NameClass::Reserved | NameClass::Private => {
            // Already rejected for author-declared outputs at Syntax; an
            // internal-only name (the Expander's own `__` artifacts) is
            // allowed to be *referenced* here, just not declared by a user.
            resolve_producer(base, consumer_path, index, modifier)
        }
        NameClass::JobDocument => resolve_producer(base, consumer_path, index, modifier),
    }
}

fn check_dynamic_var(
    token: &str,
    consumer_path: &str,
    index: &Index,
    required_ancestor: OpCode,
) -> Result<String, CompileErrorKind> {
    if ancestor_has_opcode(consumer_path, required_ancestor, index) {
        Ok(token.to_string())
    } else {
        Err(CompileErrorKind::UnboundDynamicVariable(token.to_string()))
    }
}

fn ancestor_has_opcode(consumer_path: &str, target: OpCode, index: &Index) -> bool {
    let mut current = consumer_path;
    while let Some(parent) = paths::parent_path(current) {
        if index.opcode_by_path.get(parent) == Some(&target) {
            return true;
        }
        current = parent;
    }
    false
}

/// The nearest `loop`/`iterate` ancestor's path, if any — the body that gets
/// repeated without being unrolled at compile time, and so the scope within
/// which `@history`/`@prev` references are temporal rather than structural.
fn nearest_loop_or_iterate_ancestor(path: &str, index: &Index) -> Option<String> {
    let mut current = path;
    while let Some(parent) = paths::parent_path(current) {
        if matches!(
            index.opcode_by_path.get(parent),
            Some(OpCode::Loop) | Some(OpCode::Iterate)
        ) {
            return Some(parent.to_string());
        }
        current = parent;
    }
    None
}

fn in_serial_under_loop_or_iterate(consumer_path: &str, index: &Index) -> bool {
    let Some(parent) = paths::parent_path(consumer_path) else {
        return false;
    };
    if index.opcode_by_path.get(parent) != Some(&OpCode::Serial) {
        return false;
    }
    let Some(grandparent) = paths::parent_path(parent) else {
        return false;
    };
    matches!(
        index.opcode_by_path.get(grandparent),
        Some(OpCode::Loop) | Some(OpCode::Iterate)
    )
}

fn resolve_producer(
    name: &str,
    consumer_path: &str,
    index: &Index,
    modifier: Option<&str>,
) -> Result<String, CompileErrorKind> {
    // `@history`/`@prev` name the *temporal* predecessor of an artifact
    // produced by a subtree a loop or iterate repeats without unrolling at
    // compile time. Two shapes of "previous iteration" reference fall out of
    // that: the producer node's own `stack_path` ("my previous iteration's
    // output") and a different node sharing the same enclosing loop/iterate
    // body (e.g. a gate's verdict feeding the next iteration's generator) —
    // structurally a younger sibling, but temporally already-ran by the time
    // the consumer's next iteration reads it back.
    let self_allowed = modifier.is_some();
    let temporal_scope =
        modifier.and_then(|_| nearest_loop_or_iterate_ancestor(consumer_path, index));

    let candidates: Vec<&str> = index
        .producers
        .iter()
        .filter(|(n, path)| {
            if n != name {
                return false;
            }
            if path == consumer_path {
                return self_allowed;
            }
            if visible(path, consumer_path, index) {
                return true;
            }
            match &temporal_scope {
                Some(scope) => {
                    nearest_loop_or_iterate_ancestor(path, index).as_deref() == Some(scope.as_str())
                }
                None => false,
            }
        })
        .map(|(_, path)| path.as_str())
        .collect();

    let winner = match candidates.len() {
        0 => return Err(CompileErrorKind::UndefinedReference(name.to_string())),
        1 => candidates[0],
        _ => pick_producer(name, consumer_path, &candidates, index)?,
    };

    Ok(match modifier {
        Some(m) => format!("{name}#{winner}@{m}"),
        None => format!("{name}#{winner}"),
    })
}

/// Rank candidates by "nearest enclosing scope, then latest sibling";
/// siblings always outrank ancestors at the same scope depth. A tie with
/// no `scope_resolve` mediator among the candidates is ambiguous.
fn pick_producer<'a>(
    name: &str,
    consumer_path: &str,
    candidates: &[&'a str],
    index: &Index,
) -> Result<&'a str, CompileErrorKind> {
    let consumer_segments = paths::segments(consumer_path);

    let ranked: Vec<(&str, (usize, i64))> = candidates
        .iter()
        .map(|&path| (path, rank(path, &consumer_segments)))
        .collect();

    let best_rank = ranked.iter().map(|(_, r)| *r).max().unwrap();
    let mut tied: Vec<&str> = ranked
        .iter()
        .filter(|(_, r)| *r == best_rank)
        .map(|(path, _)| *path)
        .collect();

    if tied.len() == 1 {
        return Ok(tied[0]);
    }

    if let Some(mediator) = tied
        .iter()
        .find(|path| index.opcode_by_path.get(**path) == Some(&OpCode::ScopeResolve))
    {
        return Ok(mediator);
    }

    tied.sort_unstable();
    Err(CompileErrorKind::AmbiguousProducer {
        name: name.to_string(),
        producers: tied.into_iter().map(str::to_string).collect(),
    })
}

fn rank(producer_path: &str, consumer_segments: &[&str]) -> (usize, i64) {
    let producer_segments = paths::segments(producer_path);
    let common = common_prefix_len(&producer_segments, consumer_segments);

    if common == producer_segments.len() {
        // producer is a strict ancestor of the consumer
        (common, -1)
    } else {
        let divergence_index = paths::sibling_index(producer_segments[common]).unwrap_or(0) as i64;
        (common, divergence_index)
    }
}

fn common_prefix_len(a: &[&str], b: &[&str]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

/// Visibility per §4.5: older siblings and their subtrees, plus ancestors
/// and the older siblings of each ancestor (and their subtrees). Direct
/// children of a `parallel` node are mutually invisible regardless of
/// sibling order — concurrency gives them no defined relative order.
fn visible(producer_path: &str, consumer_path: &str, index: &Index) -> bool {
    if producer_path == consumer_path {
        return false;
    }
    let producer_segments = paths::segments(producer_path);
    let consumer_segments = paths::segments(consumer_path);
    let common = common_prefix_len(&producer_segments, &consumer_segments);

    if common == producer_segments.len() {
        return true; // ancestor (or root) of the consumer
    }
    if common == consumer_segments.len() {
        return false; // producer is a descendant of the consumer
    }

    let branch_parent = consumer_segments[..common].join("/");
    if index.opcode_by_path.get(&branch_parent) == Some(&OpCode::Parallel) {
        return false;
    }

    match (
        paths::sibling_index(producer_segments[common]),
        paths::sibling_index(consumer_segments[common]),
    ) {
        (Some(p), Some(c)) => p < c,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expand::expand;
    use crate::parse::parse_tree;
    use serde_json::json;

    fn resolved(tree: serde_json::Value) -> Node {
        let parsed = parse_tree(&tree).expect("parses");
        let expanded = expand(parsed).expect("expands");
        resolve(expanded).expect("resolves")
    }

    #[test]
    fn older_sibling_output_resolves_to_producer_path() {
        let tree = json!({
            "serial": {
                "contents": [
                    {"worker": {"agent": "A", "output": "X"}},
                    {"worker": {"agent": "B", "output": "Y", "inputs": ["X"]}}
                ]
            }
        });
        let node = resolved(tree);
        assert_eq!(
            node.children[1].wiring.inputs,
            vec!["X#root/worker_0".to_string()]
        );
    }

    #[test]
    fn younger_sibling_is_undefined_reference() {
        let tree = json!({
            "serial": {
                "contents": [
                    {"worker": {"agent": "A", "output": "X", "inputs": ["Y"]}},
                    {"worker": {"agent": "B", "output": "Y"}}
                ]
            }
        });
        let parsed = parse_tree(&tree).expect("parses");
        let expanded = expand(parsed).expect("expands");
        let errs = resolve(expanded).unwrap_err();
        assert!(errs
            .0
            .iter()
            .any(|e| matches!(e.kind, CompileErrorKind::UndefinedReference(_))));
    }

    #[test]
    fn cousins_across_parallel_arms_are_undefined_not_ambiguous() {
        let tree = json!({
            "parallel": {
                "contents": [
                    {"worker": {"agent": "A", "output": "X"}},
                    {"worker": {"agent": "B", "output": "Y", "inputs": ["X"]}}
                ]
            }
        });
        let parsed = parse_tree(&tree).expect("parses");
        let expanded = expand(parsed).expect("expands");
        let errs = resolve(expanded).unwrap_err();
        assert_eq!(errs.0.len(), 1);
        assert!(matches!(
            errs.0[0].kind,
            CompileErrorKind::UndefinedReference(_)
        ));
    }

    #[test]
    fn project_document_input_needs_no_producer() {
        let tree = json!({
            "worker": {"agent": "A", "output": "Draft", "inputs": ["Acme:report@v1"]}
        });
        let node = resolved(tree);
        assert_eq!(node.wiring.inputs, vec!["Acme:report@v1".to_string()]);
    }

    #[test]
    fn prev_modifier_outside_loop_is_invalid() {
        let tree = json!({
            "serial": {
                "contents": [
                    {"worker": {"agent": "A", "output": "X"}},
                    {"worker": {"agent": "B", "output": "Y", "inputs": ["X@prev"]}}
                ]
            }
        });
        let parsed = parse_tree(&tree).expect("parses");
        let expanded = expand(parsed).expect("expands");
        let errs = resolve(expanded).unwrap_err();
        assert!(errs
            .0
            .iter()
            .any(|e| matches!(e.kind, CompileErrorKind::InvalidModifier(_))));
    }

    #[test]
    fn gate_feedback_resolves_back_into_the_next_iterations_generator() {
        // generate_team's gate sits after the generator in the same serial
        // body; the generator's `@prev` reference to the gate's feedback
        // artifact is a younger-sibling reference made legal by sharing the
        // same loop body, not by self-reference.
        let tree = json!({
            "generate_team": {
                "generator": "D",
                "validators": ["R"],
                "loop": 2,
                "output": "Draft"
            }
        });
        let node = resolved(tree);
        let loop_node = &node.children[0];
        let body = &loop_node.children[0];
        let generator_worker = &body.children[0];
        assert!(generator_worker
            .wiring
            .inputs
            .iter()
            .any(|i| i.starts_with("Draft__feedback#") && i.ends_with("@prev")));
    }

    #[test]
    fn loop_var_outside_loop_is_unbound() {
        let tree = json!({"worker": {"agent": "A", "output": "X", "inputs": ["$LOOP"]}});
        let parsed = parse_tree(&tree).expect("parses");
        let expanded = expand(parsed).expect("expands");
        let errs = resolve(expanded).unwrap_err();
        assert!(errs
            .0
            .iter()
            .any(|e| matches!(e.kind, CompileErrorKind::UnboundDynamicVariable(_))));
    }
}
