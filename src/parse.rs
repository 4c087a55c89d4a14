// src/parse.rs
//
// =============================================================================
// ODLC: PARSER / NORMALIZER
// =============================================================================
//
// Consumes the raw tree-of-mappings (see `SourceTree`) and produces `Node`s:
// splits the shorthand `inputs`/`output` keys into `wiring`, recognizes
// opcode-specific child-bearing fields (`contents`), and leaves everything
// else in `params`. Does not validate opcode schemas — that's Syntax's job.

use serde_json::Value;

use crate::error::{CompileError, CompileErrorKind, CompileErrors};
use crate::model::{Node, OpCode, Wiring};

/// Opcodes whose `contents` param holds genuine child nodes.
fn takes_contents_children(opcode: OpCode) -> bool {
    matches!(
        opcode,
        OpCode::Serial | OpCode::Parallel | OpCode::Loop | OpCode::Iterate | OpCode::ApprovalGate
    )
}

/// Parse a whole source document into its root `Node`.
pub fn parse_tree(source: &Value) -> Result<Node, CompileErrors> {
    parse_node(source).map_err(CompileErrors::from)
}

fn parse_node(value: &Value) -> Result<Node, CompileError> {
    let obj = value.as_object().ok_or_else(|| {
        CompileError::without_path(CompileErrorKind::MalformedNode(
            "expected a single-keyed mapping".to_string(),
        ))
    })?;

    if obj.len() != 1 {
        return Err(CompileError::without_path(CompileErrorKind::MalformedNode(
            format!("expected exactly one opcode key, found {}", obj.len()),
        )));
    }

    let (key, body) = obj.iter().next().expect("len checked above");
    let opcode = OpCode::from_key(key)
        .ok_or_else(|| CompileError::without_path(CompileErrorKind::UnknownOpCode(key.clone())))?;

    let mut params = match body {
        Value::Object(map) => map.clone(),
        Value::Null => serde_json::Map::new(),
        other => {
            return Err(CompileError::without_path(CompileErrorKind::MalformedNode(
                format!("opcode '{key}' body must be a mapping, found {other}"),
            )))
        }
    };

    let inputs = extract_inputs(&mut params)?;
    let output = extract_output(&mut params)?;
    let children = extract_children(opcode, &mut params)?;

    Ok(Node {
        opcode,
        params,
        wiring: Wiring { inputs, output },
        children,
        stack_path: None,
    })
}

fn extract_inputs(params: &mut serde_json::Map<String, Value>) -> Result<Vec<String>, CompileError> {
    match params.remove("inputs") {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                other => Err(CompileError::without_path(CompileErrorKind::MalformedNode(
                    format!("inputs entries must be strings, found {other}"),
                ))),
            })
            .collect(),
        Some(other) => Err(CompileError::without_path(CompileErrorKind::MalformedNode(
            format!("inputs must be a list of strings, found {other}"),
        ))),
    }
}

fn extract_output(
    params: &mut serde_json::Map<String, Value>,
) -> Result<Option<String>, CompileError> {
    match params.remove("output") {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(other) => Err(CompileError::without_path(CompileErrorKind::MalformedNode(
            format!("output must be a string, found {other}"),
        ))),
    }
}

fn extract_children(
    opcode: OpCode,
    params: &mut serde_json::Map<String, Value>,
) -> Result<Vec<Node>, CompileError> {
    if !takes_contents_children(opcode) {
        return Ok(Vec::new());
    }
    match params.remove("contents") {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => items.iter().map(parse_node).collect(),
        Some(other) => Err(CompileError::without_path(CompileErrorKind::MalformedNode(
            format!("contents must be a list of nodes, found {other}"),
        ))),
    }
}
