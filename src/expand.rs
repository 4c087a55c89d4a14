// src/expand.rs
//
// =============================================================================
// ODLC: EXPANDER (DESUGARING + PATH ASSIGNMENT)
// =============================================================================
//
// Rewrites sugar opcodes into primitive subtrees, then assigns every node's
// `stack_path` in a second pass. Expansion is bottom-up: a sugar node's own
// children (if it has real ones, as `approval_gate` does) are desugared
// before the sugar itself is rewritten, so nested sugars compose without
// special-casing. Path assignment is a separate, purely structural pass —
// it never looks at `params`, only at opcode and sibling position, per the
// determinism requirement.

use serde_json::{Map, Value};

use crate::error::{CompileError, CompileErrorKind};
use crate::model::{FanOutStrategy, Node, OpCode, SystemMode, Wiring, WorkerTemplate};
use crate::paths::{self, SiblingCounter};

/// Desugar and path-assign a whole tree rooted at `root`.
pub fn expand(root: Node) -> Result<Node, CompileError> {
    let desugared = desugar_node(root)?;
    Ok(assign_paths(desugared, paths::ROOT_PATH.to_string()))
}

fn desugar_node(node: Node) -> Result<Node, CompileError> {
    match node.opcode {
        OpCode::GenerateTeam => rewrite_generate_team(node),
        OpCode::ApprovalGate => rewrite_approval_gate(node),
        OpCode::Ensemble => rewrite_ensemble(node),
        OpCode::FanOut => rewrite_fan_out(node),
        _ => {
            let children = node
                .children
                .into_iter()
                .map(desugar_node)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Node { children, ..node })
        }
    }
}

fn assign_paths(mut node: Node, here: String) -> Node {
    let mut counter = SiblingCounter::new();
    let children = std::mem::take(&mut node.children);
    node.children = children
        .into_iter()
        .map(|child| {
            let segment = counter.next_segment(child.opcode);
            let child_path = paths::child_path(&here, &segment);
            assign_paths(child, child_path)
        })
        .collect();
    node.stack_path = Some(here);
    node
}

// ---------------------------------------------------------------------------
// param extraction helpers
// ---------------------------------------------------------------------------

fn get_str(params: &Map<String, Value>, key: &str) -> Result<String, CompileError> {
    match params.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        _ => Err(CompileError::without_path(
            CompileErrorKind::MissingRequiredField(key.to_string()),
        )),
    }
}

fn get_u64(params: &Map<String, Value>, key: &str) -> Result<u64, CompileError> {
    match params.get(key).and_then(Value::as_u64) {
        Some(n) => Ok(n),
        None => Err(CompileError::without_path(
            CompileErrorKind::MissingRequiredField(key.to_string()),
        )),
    }
}

fn get_str_list(params: &Map<String, Value>, key: &str) -> Result<Vec<String>, CompileError> {
    match params.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| {
                v.as_str().map(str::to_string).ok_or_else(|| {
                    CompileError::without_path(CompileErrorKind::MissingRequiredField(
                        key.to_string(),
                    ))
                })
            })
            .collect(),
        _ => Err(CompileError::without_path(
            CompileErrorKind::MissingRequiredField(key.to_string()),
        )),
    }
}

/// Merge a sugar's `briefing` block for one named agent, with precedence
/// Global < Agent-Specific < System. `mode` is injected last and always
/// wins, regardless of what the author wrote under either tier.
fn build_briefing(briefing_param: Option<&Value>, agent_key: &str, mode: SystemMode) -> Value {
    let mut merged = Map::new();
    if let Some(Value::Object(outer)) = briefing_param {
        if let Some(Value::Object(global)) = outer.get("global") {
            merged.extend(global.clone());
        }
        if let Some(Value::Object(specific)) = outer.get(agent_key) {
            merged.extend(specific.clone());
        }
    }
    merged.insert("mode".to_string(), Value::String(mode.as_str().to_string()));
    Value::Object(merged)
}

fn worker(agent: &str, inputs: Vec<String>, output: String, briefing: Value) -> Node {
    let mut params = Map::new();
    params.insert("agent".to_string(), Value::String(agent.to_string()));
    params.insert("briefing".to_string(), briefing);
    Node {
        opcode: OpCode::Worker,
        params,
        wiring: Wiring {
            inputs,
            output: Some(output),
        },
        children: Vec::new(),
        stack_path: None,
    }
}

fn control(opcode: OpCode, params: Map<String, Value>, children: Vec<Node>) -> Node {
    Node {
        opcode,
        params,
        wiring: Wiring::default(),
        children,
        stack_path: None,
    }
}

fn leaf(opcode: OpCode, params: Map<String, Value>, wiring: Wiring) -> Node {
    Node {
        opcode,
        params,
        wiring,
        children: Vec::new(),
        stack_path: None,
    }
}

// ---------------------------------------------------------------------------
// generate_team ⇒ serial { loop { serial { worker, parallel, gate } }, scope_resolve }
// ---------------------------------------------------------------------------
//
// The generator's draft is kept under an internal (`__`) name scoped to the
// loop body, since the same subtree is reused across every iteration and an
// outside consumer can only ever see what the loop's own external sibling
// (the trailing `scope_resolve`) elects. That election is what finally binds
// the team's declared `output`.
//
// The `gate` node closes the self-correcting loop: it consumes every
// validator's verdict and produces a feedback artifact that the *next*
// iteration's generator reads back via `@prev`, alongside its own prior
// draft. Without it the verdicts would be dead ends and the generator would
// never actually see what the validators said.

fn rewrite_generate_team(node: Node) -> Result<Node, CompileError> {
    let generator = get_str(&node.params, "generator")?;
    let validators = get_str_list(&node.params, "validators")?;
    let loop_count = get_u64(&node.params, "loop")?;
    let output = node
        .wiring
        .output
        .clone()
        .ok_or_else(|| CompileError::without_path(CompileErrorKind::MissingRequiredField(
            "output".to_string(),
        )))?;
    let briefing_param = node.params.get("briefing").cloned();

    let internal_draft = format!("{output}__iteration_draft");
    let feedback = format!("{output}__feedback");

    let mut generator_inputs = node.wiring.inputs.clone();
    generator_inputs.push(format!("{internal_draft}@prev"));
    generator_inputs.push(format!("{feedback}@prev"));

    let generator_worker = worker(
        &generator,
        generator_inputs,
        internal_draft.clone(),
        build_briefing(briefing_param.as_ref(), &generator, SystemMode::Generate),
    );

    let mut verdict_names = Vec::with_capacity(validators.len());
    let validator_workers: Vec<Node> = validators
        .iter()
        .enumerate()
        .map(|(i, validator)| {
            let verdict_name = format!("{output}__verdict_{i}");
            verdict_names.push(verdict_name.clone());
            worker(
                validator,
                vec![internal_draft.clone()],
                verdict_name,
                build_briefing(briefing_param.as_ref(), validator, SystemMode::Validate),
            )
        })
        .collect();
    let validators_parallel = control(OpCode::Parallel, Map::new(), validator_workers);

    let gate_node = leaf(
        OpCode::Gate,
        Map::new(),
        Wiring {
            inputs: verdict_names,
            output: Some(feedback),
        },
    );

    let serial_body = control(
        OpCode::Serial,
        Map::new(),
        vec![generator_worker, validators_parallel, gate_node],
    );

    let mut loop_params = Map::new();
    loop_params.insert("count".to_string(), Value::from(loop_count));
    let loop_node = control(OpCode::Loop, loop_params, vec![serial_body]);

    // No `@prev` here: `scope_resolve` sits *after* the loop, as its older
    // sibling, so the internal draft's whole subtree is already visible to
    // it under the ordinary older-sibling rule — no modifier needed.
    let scope_resolve = leaf(
        OpCode::ScopeResolve,
        Map::new(),
        Wiring {
            inputs: vec![internal_draft],
            output: Some(output),
        },
    );

    Ok(control(OpCode::Serial, Map::new(), vec![loop_node, scope_resolve]))
}

// ---------------------------------------------------------------------------
// approval_gate ⇒ loop { serial { ...contents, approver } }
// ---------------------------------------------------------------------------
//
// Only `contents` is rerun on rejection; the gate itself carries no output
// of its own (rejection/acceptance is a runtime signal the kernel reads off
// the `approver` atom), preserving scope isolation for anything the author
// wired up outside `contents`.

const APPROVAL_GATE_DEFAULT_ATTEMPTS: u64 = 64;

fn rewrite_approval_gate(node: Node) -> Result<Node, CompileError> {
    let approver = get_str(&node.params, "approver")?;
    let target = get_str(&node.params, "target")?;
    let max_attempts = node
        .params
        .get("max_attempts")
        .and_then(Value::as_u64)
        .unwrap_or(APPROVAL_GATE_DEFAULT_ATTEMPTS);

    let contents = node
        .children
        .into_iter()
        .map(desugar_node)
        .collect::<Result<Vec<_>, _>>()?;

    let mut approver_params = Map::new();
    approver_params.insert("approver".to_string(), Value::String(approver));
    let approver_atom = leaf(
        OpCode::Approver,
        approver_params,
        Wiring {
            inputs: vec![target.clone()],
            output: Some(format!("{target}__approval")),
        },
    );

    let mut serial_children = contents;
    serial_children.push(approver_atom);
    let serial_body = control(OpCode::Serial, Map::new(), serial_children);

    let mut loop_params = Map::new();
    loop_params.insert("count".to_string(), Value::from(max_attempts));
    Ok(control(OpCode::Loop, loop_params, vec![serial_body]))
}

// ---------------------------------------------------------------------------
// ensemble ⇒ serial { parallel { generators x samples }, consolidator worker }
// ---------------------------------------------------------------------------

fn rewrite_ensemble(node: Node) -> Result<Node, CompileError> {
    let generators = get_str_list(&node.params, "generators")?;
    let consolidator = get_str(&node.params, "consolidator")?;
    let samples = get_u64(&node.params, "samples")?;
    let output = node
        .wiring
        .output
        .clone()
        .ok_or_else(|| CompileError::without_path(CompileErrorKind::MissingRequiredField(
            "output".to_string(),
        )))?;
    let briefing_param = node.params.get("briefing").cloned();
    let inputs = node.wiring.inputs.clone();

    let mut draft_names = Vec::new();
    let mut draft_workers = Vec::new();
    for (gi, generator) in generators.iter().enumerate() {
        for si in 0..samples {
            let draft_name = format!("{output}__draft_{gi}_{si}");
            draft_workers.push(worker(
                generator,
                inputs.clone(),
                draft_name.clone(),
                build_briefing(briefing_param.as_ref(), generator, SystemMode::Generate),
            ));
            draft_names.push(draft_name);
        }
    }
    let samples_parallel = control(OpCode::Parallel, Map::new(), draft_workers);

    let consolidator_worker = worker(
        &consolidator,
        draft_names,
        output,
        build_briefing(briefing_param.as_ref(), &consolidator, SystemMode::Consolidate),
    );

    Ok(control(
        OpCode::Serial,
        Map::new(),
        vec![samples_parallel, consolidator_worker],
    ))
}

// ---------------------------------------------------------------------------
// fan_out ⇒ serial { iterator_init, iterate { worker-from-template } }
// ---------------------------------------------------------------------------
//
// The per-item worker is kept as a single template child, not cloned N
// times: the number of items in `source` is runtime data, unknown at
// compile time. The execution kernel repeats the template once per item;
// `$KEY`/`$ITEM` stay symbolic until then.

fn rewrite_fan_out(node: Node) -> Result<Node, CompileError> {
    let source = get_str(&node.params, "source")?;
    let item_key = get_str(&node.params, "item_key")?;
    let strategy_str = get_str(&node.params, "strategy")?;
    let strategy = FanOutStrategy::parse(&strategy_str).ok_or_else(|| {
        CompileError::without_path(CompileErrorKind::MissingRequiredField("strategy".to_string()))
    })?;
    let template_value = node.params.get("worker").cloned().ok_or_else(|| {
        CompileError::without_path(CompileErrorKind::MissingRequiredField("worker".to_string()))
    })?;
    let template: WorkerTemplate = serde_json::from_value(template_value)
        .map_err(|e| CompileError::without_path(CompileErrorKind::MissingRequiredField(e.to_string())))?;

    let iterator_output = format!("{item_key}__iterator");
    let mut iterator_params = Map::new();
    iterator_params.insert("source".to_string(), Value::String(source.clone()));
    iterator_params.insert("item_key".to_string(), Value::String(item_key.clone()));
    let iterator_init = leaf(
        OpCode::IteratorInit,
        iterator_params,
        Wiring {
            inputs: vec![source.clone()],
            output: Some(iterator_output.clone()),
        },
    );

    let template_worker = worker(
        &template.agent,
        template.inputs,
        template.output,
        template.briefing,
    );
    // Wrapped in a `serial` so a `@history`/`@prev` reference on the
    // per-item worker sits where the resolver expects those modifiers:
    // a serial body nested directly under the `iterate`.
    let template_body = control(OpCode::Serial, Map::new(), vec![template_worker]);

    let mut iterate_params = Map::new();
    iterate_params.insert("strategy".to_string(), Value::String(strategy.as_str().to_string()));
    iterate_params.insert("item_key".to_string(), Value::String(item_key));
    let iterate = control(
        OpCode::Iterate,
        iterate_params,
        vec![template_body],
    );

    Ok(control(OpCode::Serial, Map::new(), vec![iterator_init, iterate]))
}
