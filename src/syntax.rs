// src/syntax.rs
//
// =============================================================================
// ODLC: SYNTAX VALIDATOR
// =============================================================================
//
// Per-opcode schema checks plus artifact-name classification (§3, §4.3).
// Collects every error found in the tree rather than failing on the first
// one, so a single `odlc check` run reports a batched diagnostic. Runs
// before Expand, so `stack_path` doesn't exist yet; errors are located with
// a lightweight breadcrumb (opcode + sibling index per level) instead.

use serde_json::Value;

use crate::error::{CompileError, CompileErrorKind, CompileErrors};
use crate::model::{FanOutStrategy, Node, OpCode, WorkerTemplate};
use crate::names::{classify, NameClass};

/// Check the whole tree, returning every violation found.
pub fn check(root: &Node) -> Result<(), CompileErrors> {
    let mut errors = Vec::new();
    check_node(root, "root", &mut errors);
    CompileErrors::into_result(errors, ())
}

fn locator(parent: &str, opcode: OpCode, index: usize) -> String {
    format!("{parent}/{}[{index}]", opcode.as_str())
}

fn check_node(node: &Node, here: &str, errors: &mut Vec<CompileError>) {
    check_wiring_names(node, here, errors);
    check_opcode_schema(node, here, errors);

    for (i, child) in node.children.iter().enumerate() {
        let child_here = locator(here, child.opcode, i);
        check_node(child, &child_here, errors);
    }
}

fn check_wiring_names(node: &Node, here: &str, errors: &mut Vec<CompileError>) {
    for input in &node.wiring.inputs {
        let base = strip_modifier(input);
        match classify(base) {
            NameClass::Reserved => errors.push(CompileError::at(
                here,
                CompileErrorKind::ReservedName(base.to_string()),
            )),
            NameClass::Private => errors.push(CompileError::at(
                here,
                CompileErrorKind::PrivateName(base.to_string()),
            )),
            _ => {}
        }
    }

    if let Some(output) = &node.wiring.output {
        match classify(output) {
            NameClass::Reserved => errors.push(CompileError::at(
                here,
                CompileErrorKind::ReservedName(output.clone()),
            )),
            NameClass::Private => errors.push(CompileError::at(
                here,
                CompileErrorKind::PrivateName(output.clone()),
            )),
            NameClass::ProjectDocument { .. } => errors.push(CompileError::at(
                here,
                CompileErrorKind::ExternalWriteAttempt(output.clone()),
            )),
            NameClass::JobDocument => {}
        }
    }
}

/// Strip a trailing `@history`/`@prev` wiring modifier to get the base name.
fn strip_modifier(input: &str) -> &str {
    input
        .split_once('@')
        .map(|(base, _)| base)
        .unwrap_or(input)
}

fn check_opcode_schema(node: &Node, here: &str, errors: &mut Vec<CompileError>) {
    match node.opcode {
        OpCode::Worker => {
            require_string_param(node, "agent", here, errors);
            require_output(node, here, errors);
        }
        OpCode::Dialogue | OpCode::Approver => {
            // No required params beyond what the data model already enforces.
        }
        OpCode::Serial | OpCode::Parallel | OpCode::Loop | OpCode::Iterate => {
            require_children(node, here, errors);
            if node.opcode == OpCode::Loop {
                require_u64_at_least_one(node, "count", here, errors);
            }
        }
        OpCode::ScopeResolve | OpCode::IteratorInit | OpCode::Gate => {}
        OpCode::GenerateTeam => {
            require_string_param(node, "generator", here, errors);
            require_nonempty_string_list(node, "validators", here, errors);
            require_u64_at_least_one(node, "loop", here, errors);
            require_output(node, here, errors);
        }
        OpCode::ApprovalGate => {
            require_string_param(node, "approver", here, errors);
            require_string_param(node, "target", here, errors);
            require_children(node, here, errors);
        }
        OpCode::Ensemble => {
            require_nonempty_string_list(node, "generators", here, errors);
            require_string_param(node, "consolidator", here, errors);
            require_u64_at_least_one(node, "samples", here, errors);
            require_output(node, here, errors);
        }
        OpCode::FanOut => check_fan_out(node, here, errors),
    }
}

fn require_output(node: &Node, here: &str, errors: &mut Vec<CompileError>) {
    if node.wiring.output.is_none() {
        errors.push(CompileError::at(
            here,
            CompileErrorKind::MissingRequiredField("output".to_string()),
        ));
    }
}

fn require_children(node: &Node, here: &str, errors: &mut Vec<CompileError>) {
    if node.children.is_empty() {
        errors.push(CompileError::at(
            here,
            CompileErrorKind::MissingRequiredField("contents".to_string()),
        ));
    }
}

fn require_string_param(node: &Node, key: &str, here: &str, errors: &mut Vec<CompileError>) {
    match node.params.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => {}
        _ => errors.push(CompileError::at(
            here,
            CompileErrorKind::MissingRequiredField(key.to_string()),
        )),
    }
}

fn require_nonempty_string_list(
    node: &Node,
    key: &str,
    here: &str,
    errors: &mut Vec<CompileError>,
) {
    match node.params.get(key) {
        Some(Value::Array(items)) if !items.is_empty() && items.iter().all(Value::is_string) => {}
        _ => errors.push(CompileError::at(
            here,
            CompileErrorKind::MissingRequiredField(key.to_string()),
        )),
    }
}

fn require_u64_at_least_one(node: &Node, key: &str, here: &str, errors: &mut Vec<CompileError>) {
    match node.params.get(key).and_then(Value::as_u64) {
        Some(n) if n >= 1 => {}
        _ => errors.push(CompileError::at(
            here,
            CompileErrorKind::MissingRequiredField(key.to_string()),
        )),
    }
}

fn check_fan_out(node: &Node, here: &str, errors: &mut Vec<CompileError>) {
    require_string_param(node, "source", here, errors);
    require_string_param(node, "item_key", here, errors);

    match node.params.get("strategy").and_then(Value::as_str) {
        Some(s) if FanOutStrategy::parse(s).is_some() => {}
        _ => errors.push(CompileError::at(
            here,
            CompileErrorKind::MissingRequiredField("strategy".to_string()),
        )),
    }

    match node.params.get("worker") {
        None => errors.push(CompileError::at(
            here,
            CompileErrorKind::MissingRequiredField("worker".to_string()),
        )),
        Some(worker_value) => {
            if contains_fan_out_key(worker_value) {
                errors.push(CompileError::at(here, CompileErrorKind::NestedFanOut));
            }
            match serde_json::from_value::<WorkerTemplate>(worker_value.clone()) {
                Ok(template) => {
                    if template.agent.trim().is_empty() {
                        errors.push(CompileError::at(
                            here,
                            CompileErrorKind::MissingRequiredField("worker.agent".to_string()),
                        ));
                    }
                    if template.output.trim().is_empty() {
                        errors.push(CompileError::at(
                            here,
                            CompileErrorKind::MissingRequiredField("worker.output".to_string()),
                        ));
                    }
                }
                Err(_) => errors.push(CompileError::at(
                    here,
                    CompileErrorKind::MissingRequiredField("worker".to_string()),
                )),
            }
        }
    }
}

/// Recursively scan an arbitrary JSON value for a nested `fan_out` key,
/// however deeply it's buried inside the worker template.
fn contains_fan_out_key(value: &Value) -> bool {
    match value {
        Value::Object(map) => {
            map.contains_key("fan_out") || map.values().any(contains_fan_out_key)
        }
        Value::Array(items) => items.iter().any(contains_fan_out_key),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_tree;
    use serde_json::json;

    fn ok(tree: Value) -> Node {
        let node = parse_tree(&tree).expect("parses");
        check(&node).expect("should pass syntax");
        node
    }

    fn err(tree: Value) -> CompileErrors {
        let node = parse_tree(&tree).expect("parses");
        check(&node).expect_err("should fail syntax")
    }

    #[test]
    fn worker_requires_agent_and_output() {
        ok(json!({"worker": {"agent": "D", "output": "Draft"}}));
        let errs = err(json!({"worker": {"agent": "D"}}));
        assert!(errs
            .0
            .iter()
            .any(|e| matches!(&e.kind, CompileErrorKind::MissingRequiredField(f) if f == "output")));
    }

    #[test]
    fn reserved_and_private_output_names_rejected() {
        let errs = err(json!({"worker": {"agent": "D", "output": "foo__bar"}}));
        assert!(errs.0.iter().any(|e| matches!(e.kind, CompileErrorKind::ReservedName(_))));

        let errs = err(json!({"worker": {"agent": "D", "output": "_hidden"}}));
        assert!(errs.0.iter().any(|e| matches!(e.kind, CompileErrorKind::PrivateName(_))));
    }

    #[test]
    fn project_document_output_is_external_write_attempt() {
        let errs = err(json!({"worker": {"agent": "D", "output": "Acme:report@v1"}}));
        assert!(errs
            .0
            .iter()
            .any(|e| matches!(e.kind, CompileErrorKind::ExternalWriteAttempt(_))));
    }

    #[test]
    fn fan_out_requires_fields_and_rejects_nesting() {
        ok(json!({
            "fan_out": {
                "source": "RegionList",
                "item_key": "region",
                "strategy": "parallel",
                "worker": {"agent": "W", "output": "Report"}
            }
        }));

        let errs = err(json!({
            "fan_out": {
                "source": "RegionList",
                "item_key": "region",
                "strategy": "parallel",
                "worker": {
                    "agent": "W",
                    "output": "Report",
                    "briefing": {"fan_out": {"source": "X", "item_key": "y", "strategy": "serial", "worker": {}}}
                }
            }
        }));
        assert!(errs.0.iter().any(|e| matches!(e.kind, CompileErrorKind::NestedFanOut)));
    }

    #[test]
    fn serial_and_loop_require_at_least_one_child() {
        let errs = err(json!({"serial": {}}));
        assert!(errs
            .0
            .iter()
            .any(|e| matches!(&e.kind, CompileErrorKind::MissingRequiredField(f) if f == "contents")));

        let errs = err(json!({"loop": {"count": 2}}));
        assert!(errs
            .0
            .iter()
            .any(|e| matches!(&e.kind, CompileErrorKind::MissingRequiredField(f) if f == "contents")));
    }

    #[test]
    fn errors_are_batched_not_fail_fast() {
        let tree = json!({
            "serial": {
                "contents": [
                    {"worker": {"agent": "A"}},
                    {"worker": {"agent": "B", "output": "_bad"}}
                ]
            }
        });
        let node = parse_tree(&tree).expect("parses");
        let errs = check(&node).unwrap_err();
        assert_eq!(errs.0.len(), 2);
    }
}
