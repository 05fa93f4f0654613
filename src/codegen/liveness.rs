//! Per-block next-use analysis.
//!
//! Each basic block is analysed independently, in a single backward scan.
//! The entry stored for an instruction describes what happens *after* that
//! point: whether each variable is read again within the block and, if so,
//! at which position. This is deliberately local; no liveness flows across
//! block boundaries, because the translator flushes every register-resident
//! variable to memory at each boundary.

use std::collections::HashMap;

use log::trace;

use crate::{listing::Position, tac::Program};

use super::blocks::BasicBlock;

/// The next-use state of a variable at a given point in a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// No further use in this block.
    Dead,
    /// Next read at the given position.
    Live(Position),
}

/// The completed next-use table for one basic block, consumed read-only
/// during forward translation.
pub struct LivenessTable {
    start: Position,
    entries: Vec<HashMap<String, Liveness>>,
}

impl LivenessTable {
    /// Analyse one block of the given program.
    pub fn analyze(program: &Program, block: &BasicBlock) -> Self {
        let length = block.end.0 - block.start.0;

        // Seed the state table with every variable the block mentions, so
        // that a lookup for anything else can be rejected as a defect.
        let mut state: HashMap<String, Liveness> = HashMap::new();
        for offset in 0..length {
            let instr = program.line_at(block.start + offset);
            for name in instr.kind.reads() {
                state.insert(name.to_string(), Liveness::Dead);
            }
            if let Some(name) = instr.kind.write() {
                state.insert(name.to_string(), Liveness::Dead);
            }
        }

        let mut entries = vec![HashMap::new(); length];
        for offset in (0..length).rev() {
            let position = block.start + offset;
            let instr = program.line_at(position);

            // The snapshot *before* applying this instruction's effects
            // answers "what happens after this point".
            entries[offset] = state.clone();

            if let Some(name) = instr.kind.write() {
                state.insert(name.to_string(), Liveness::Dead);
            }
            for name in instr.kind.reads() {
                state.insert(name.to_string(), Liveness::Live(position));
            }
            trace!("liveness after {}: {:?}", instr, entries[offset]);
        }

        Self {
            start: block.start,
            entries,
        }
    }

    /// The next-use state of `variable` immediately after `position`.
    /// Panics when the variable is not mentioned anywhere in the block;
    /// a register-resident variable unknown to the block's table indicates
    /// a defect in the translator, not a recoverable condition.
    pub fn entry(&self, position: Position, variable: &str) -> Liveness {
        let offset = position.0 - self.start.0;
        *self.entries[offset]
            .get(variable)
            .unwrap_or_else(|| panic!("no liveness entry for '{}' at {}", variable, position))
    }
}
