// src/model.rs
//
// =============================================================================
// ODLC: PRIMITIVE MODEL
// =============================================================================
//
// The shared node shape used across the whole pipeline. A single tagged
// struct rather than a class hierarchy: per-opcode logic lives in
// pattern-matched functions in parse/syntax/expand/resolve, not in methods
// dispatched per variant.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Every opcode the compiler recognizes, sugar and primitive alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    // Atoms
    Worker,
    Dialogue,
    Approver,
    // Control
    Serial,
    Parallel,
    Loop,
    Iterate,
    // Logic (synthesized by Expand, but also directly authorable)
    ScopeResolve,
    IteratorInit,
    Gate,
    // Sugar
    GenerateTeam,
    ApprovalGate,
    Ensemble,
    FanOut,
}

impl OpCode {
    /// Parse a surface mapping key into an opcode. Returns `None` for
    /// unrecognized keys (callers turn that into `UnknownOpCode`).
    pub fn from_key(key: &str) -> Option<Self> {
        Some(match key {
            "worker" => OpCode::Worker,
            "dialogue" => OpCode::Dialogue,
            "approver" => OpCode::Approver,
            "serial" => OpCode::Serial,
            "parallel" => OpCode::Parallel,
            "loop" => OpCode::Loop,
            "iterate" => OpCode::Iterate,
            "scope_resolve" => OpCode::ScopeResolve,
            "iterator_init" => OpCode::IteratorInit,
            "gate" => OpCode::Gate,
            "generate_team" => OpCode::GenerateTeam,
            "approval_gate" => OpCode::ApprovalGate,
            "ensemble" => OpCode::Ensemble,
            "fan_out" => OpCode::FanOut,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OpCode::Worker => "worker",
            OpCode::Dialogue => "dialogue",
            OpCode::Approver => "approver",
            OpCode::Serial => "serial",
            OpCode::Parallel => "parallel",
            OpCode::Loop => "loop",
            OpCode::Iterate => "iterate",
            OpCode::ScopeResolve => "scope_resolve",
            OpCode::IteratorInit => "iterator_init",
            OpCode::Gate => "gate",
            OpCode::GenerateTeam => "generate_team",
            OpCode::ApprovalGate => "approval_gate",
            OpCode::Ensemble => "ensemble",
            OpCode::FanOut => "fan_out",
        }
    }

    /// Opcodes allowed to survive Expand and appear in the IR.
    pub fn is_primitive(&self) -> bool {
        !matches!(
            self,
            OpCode::GenerateTeam | OpCode::ApprovalGate | OpCode::Ensemble | OpCode::FanOut
        )
    }

    pub fn is_sugar(&self) -> bool {
        !self.is_primitive()
    }

    /// Whether this opcode is a leaf (no children permitted in the IR).
    pub fn is_atom(&self) -> bool {
        matches!(self, OpCode::Worker | OpCode::Dialogue | OpCode::Approver)
    }
}

/// `inputs`/`output` declarations on a node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Wiring {
    pub inputs: Vec<String>,
    pub output: Option<String>,
}

/// The universal node shape, mutated in place through Parse -> Expand ->
/// Resolve, then frozen into `ir::IrNode` at Assemble.
#[derive(Debug, Clone)]
pub struct Node {
    pub opcode: OpCode,
    pub params: Map<String, Value>,
    pub wiring: Wiring,
    pub children: Vec<Node>,
    pub stack_path: Option<String>,
}

impl Node {
    pub fn new(opcode: OpCode) -> Self {
        Self {
            opcode,
            params: Map::new(),
            wiring: Wiring::default(),
            children: Vec::new(),
            stack_path: None,
        }
    }
}

/// The fan_out worker template: not parsed into a `Node` by the Parser
/// (it isn't a real child yet, only a stencil cloned once per dynamic item
/// at Expand time), but shaped identically to what a `worker` node needs.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorkerTemplate {
    pub agent: String,
    #[serde(default)]
    pub inputs: Vec<String>,
    pub output: String,
    #[serde(default)]
    pub briefing: Value,
}

/// `fan_out.strategy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FanOutStrategy {
    Serial,
    Parallel,
}

impl FanOutStrategy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "serial" => Some(FanOutStrategy::Serial),
            "parallel" => Some(FanOutStrategy::Parallel),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FanOutStrategy::Serial => "serial",
            FanOutStrategy::Parallel => "parallel",
        }
    }
}

/// System-injected `mode` values for workers synthesized during expansion of
/// `generate_team` / `ensemble` / `approval_gate`. These cannot be overridden
/// by user-authored `briefing` keys (see the briefing merge rules in §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemMode {
    Generate,
    Validate,
    Consolidate,
    Approve,
}

impl SystemMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemMode::Generate => "generate",
            SystemMode::Validate => "validate",
            SystemMode::Consolidate => "consolidate",
            SystemMode::Approve => "approve",
        }
    }
}
