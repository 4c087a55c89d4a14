// src/ir.rs
//
// =============================================================================
// ODLC: ASSEMBLER / IR TYPES
// =============================================================================
//
// The immutable output of a successful compilation. Assembly is a mechanical
// copy of the (by now fully desugared, path-assigned, resolved) `Node` tree
// into a typed, `Serialize`-able shape — no decisions are made here, only
// validated. Anything that fails the checks below is a compiler bug, not a
// user-facing error: every sugar opcode should already be gone (Expand) and
// every `stack_path` already assigned (Expand) by the time we get here.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{CompileError, CompileErrorKind};
use crate::model::Node;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct IrWiring {
    pub inputs: Vec<String>,
    pub output: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct IrNode {
    pub stack_path: String,
    pub opcode: String,
    pub params: Map<String, Value>,
    pub wiring: IrWiring,
    pub children: Vec<IrNode>,
}

pub fn assemble(node: &Node) -> Result<IrNode, CompileError> {
    let stack_path = node.stack_path.clone().ok_or_else(|| {
        CompileError::without_path(CompileErrorKind::InternalAssemblyError(
            "node reached Assemble with no stack_path".to_string(),
        ))
    })?;

    if !node.opcode.is_primitive() {
        return Err(CompileError::at(
            stack_path,
            CompileErrorKind::InternalAssemblyError(format!(
                "sugar opcode '{}' survived Expand",
                node.opcode.as_str()
            )),
        ));
    }

    if node.opcode.is_atom() && !node.children.is_empty() {
        return Err(CompileError::at(
            stack_path,
            CompileErrorKind::InternalAssemblyError(format!(
                "atom opcode '{}' has children",
                node.opcode.as_str()
            )),
        ));
    }

    let children = node
        .children
        .iter()
        .map(assemble)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(IrNode {
        stack_path,
        opcode: node.opcode.as_str().to_string(),
        params: node.params.clone(),
        wiring: IrWiring {
            inputs: node.wiring.inputs.clone(),
            output: node.wiring.output.clone(),
        },
        children,
    })
}
