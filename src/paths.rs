// src/paths.rs
//
// =============================================================================
// ODLC: PATH GENERATOR
// =============================================================================
//
// `stack_path` assignment is a pure function of tree shape and sibling
// index, never of parameter values, so renaming an agent never perturbs
// identity (invariant 8). A `SiblingCounter` is local to one parent: each
// node that gains children starts a fresh counter for them.

use std::collections::HashMap;

use crate::model::OpCode;

pub const ROOT_PATH: &str = "root";

/// Counts how many children of each opcode a parent has produced so far,
/// so the next one gets `{opcode}_{n}`.
#[derive(Debug, Default)]
pub struct SiblingCounter(HashMap<&'static str, usize>);

impl SiblingCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next segment for a child of the given opcode.
    pub fn next_segment(&mut self, opcode: OpCode) -> String {
        let slot = self.0.entry(opcode.as_str()).or_insert(0);
        let segment = format!("{}_{}", opcode.as_str(), *slot);
        *slot += 1;
        segment
    }
}

pub fn child_path(parent_path: &str, segment: &str) -> String {
    format!("{parent_path}/{segment}")
}

/// Split a `stack_path` into its `/`-delimited segments, `"root"` first.
pub fn segments(path: &str) -> Vec<&str> {
    path.split('/').collect()
}

/// Parse the trailing `_{n}` sibling index off a non-root segment, e.g.
/// `"worker_3"` -> `Some(3)`.
pub fn sibling_index(segment: &str) -> Option<usize> {
    segment.rsplit_once('_').and_then(|(_, n)| n.parse().ok())
}

/// The path of `path`'s parent, or `None` if `path` is the root.
pub fn parent_path(path: &str) -> Option<&str> {
    path.rsplit_once('/').map(|(parent, _)| parent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sibling_counter_increments_per_opcode() {
        let mut c = SiblingCounter::new();
        assert_eq!(c.next_segment(OpCode::Worker), "worker_0");
        assert_eq!(c.next_segment(OpCode::Worker), "worker_1");
        assert_eq!(c.next_segment(OpCode::Serial), "serial_0");
    }

    #[test]
    fn child_path_appends_segment() {
        assert_eq!(child_path(ROOT_PATH, "loop_0"), "root/loop_0");
        assert_eq!(
            child_path("root/loop_0", "serial_0"),
            "root/loop_0/serial_0"
        );
    }

    #[test]
    fn parent_path_strips_last_segment() {
        assert_eq!(parent_path("root/loop_0/serial_0"), Some("root/loop_0"));
        assert_eq!(parent_path(ROOT_PATH), None);
    }
}
