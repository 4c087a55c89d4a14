// src/lib.rs
//
// =============================================================================
// ODLC: LIBRARY ROOT
// =============================================================================
//
// Declares the module tree and the single pure entry point, `compile`.
// Everything downstream of Parse operates on the same `model::Node` shape,
// mutated stage by stage; nothing here touches a filesystem.

pub mod error;
pub mod expand;
pub mod ir;
pub mod model;
pub mod names;
pub mod parse;
pub mod paths;
pub mod resolve;
pub mod syntax;
pub mod wiring;
pub mod yaml;

pub use error::{CompileError, CompileErrorKind, CompileErrors, OdlError};
pub use ir::{IrNode, IrWiring};
pub use model::{Node, OpCode, Wiring};

/// The raw tree-of-mappings produced by a concrete-syntax front end (today,
/// only `yaml::load_source`) and consumed by `parse::parse_tree`.
pub type SourceTree = serde_json::Value;

/// Compile a source tree into a validated IR, or a batched diagnostic.
///
/// Runs the six stages in order: Parse, Syntax Check, Expand, Resolve,
/// Wiring Check, Assemble. Parse and Assemble use `stack_path`-less /
/// `stack_path`-bearing single errors respectively; Syntax and Resolve
/// collect every violation in the tree before returning.
pub fn compile(source: &SourceTree) -> Result<IrNode, OdlError> {
    let parsed = parse::parse_tree(source)?;
    log::debug!("parse: produced root opcode '{}'", parsed.opcode.as_str());

    syntax::check(&parsed)?;
    log::debug!("syntax: no schema or naming violations");

    let expanded = expand::expand(parsed).map_err(CompileErrors::from)?;
    log::debug!("expand: desugared into primitive tree rooted at '{}'", expanded.opcode.as_str());

    let resolved = resolve::resolve(expanded)?;
    log::debug!("resolve: every input bound to a producer or external reference");

    wiring::check(&resolved).map_err(CompileErrors::from)?;
    log::debug!("wiring: data-flow graph is acyclic");

    let ir = ir::assemble(&resolved).map_err(CompileErrors::from)?;
    log::debug!("assemble: IR materialized at '{}'", ir.stack_path);

    Ok(ir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn compiles_generate_team_end_to_end() {
        let source = json!({
            "generate_team": {
                "generator": "Drafter",
                "validators": ["Reviewer"],
                "loop": 2,
                "inputs": ["Spec"],
                "output": "Draft"
            }
        });
        let ir = compile(&source).expect("should compile");
        assert_eq!(ir.stack_path, "root");
        assert_eq!(ir.opcode, "serial");
    }

    #[test]
    fn undefined_reference_surfaces_through_odl_error() {
        let source = json!({"worker": {"agent": "A", "output": "X", "inputs": ["Ghost"]}});
        let err = compile(&source).unwrap_err();
        match err {
            OdlError::Compile(errors) => assert!(errors
                .0
                .iter()
                .any(|e| matches!(e.kind, CompileErrorKind::UndefinedReference(_)))),
            other => panic!("expected OdlError::Compile, got {other:?}"),
        }
    }
}
