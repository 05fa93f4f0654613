//! Basic block partitioning.
//!
//! The first instruction of the program is a leader, every jump target is a
//! leader, every instruction following a jump is a leader, and `label` and
//! `function` instructions lead their own blocks. Slicing the instruction
//! list at leader boundaries yields the basic blocks.

use std::collections::{BTreeSet, HashMap};

use log::debug;

use crate::{
    listing::Position,
    tac::{InstrKind, JumpTarget, LineNumber, Program},
};

use super::error::CodegenError;

/// A maximal straight-line instruction sequence: the half-open index range
/// `[start, end)`, entered only at `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasicBlock {
    pub start: Position,
    pub end: Position,
    /// The TAC line number of the leader, used to label the block `L{n}`.
    pub leader_line: LineNumber,
}

/// The full partition of a program into basic blocks, plus the resolved
/// jump-target table used when jumps are emitted.
#[derive(Debug)]
pub struct BlockPartition {
    pub blocks: Vec<BasicBlock>,
    resolved: HashMap<JumpTarget, LineNumber>,
}

impl BlockPartition {
    /// Partition a program into basic blocks. Every jump target is resolved
    /// here, up front, so an unresolvable target fails the whole unit before
    /// any code is emitted.
    pub fn partition(program: &Program) -> Result<Self, CodegenError> {
        let mut line_index = HashMap::new();
        let mut label_index = HashMap::new();
        for (position, instr) in program.iter_lines() {
            line_index.insert(instr.line, position);
            if let InstrKind::Label(name) = &instr.kind {
                label_index.insert(name.as_str(), position);
            }
        }

        let mut leaders = BTreeSet::new();
        let mut resolved = HashMap::new();
        if !program.is_empty() {
            leaders.insert(Position(0));
        }
        for (position, instr) in program.iter_lines() {
            let target = match &instr.kind {
                InstrKind::Goto(target) => target,
                InstrKind::IfGoto { target, .. } => target,
                InstrKind::Label(_) | InstrKind::Function(_) => {
                    leaders.insert(position);
                    continue;
                }
                _ => continue,
            };

            let target_pos = match target {
                JumpTarget::Line(line) => line_index.get(line).copied(),
                JumpTarget::Symbolic(name) => label_index.get(name.as_str()).copied(),
            }
            .ok_or_else(|| CodegenError::UnresolvedTarget {
                line: instr.line,
                target: target.to_string(),
            })?;

            leaders.insert(target_pos);
            if position + 1 < Position(program.len()) {
                leaders.insert(position + 1);
            }
            resolved.insert(target.clone(), program.line_at(target_pos).line);
        }

        debug!("partitioned {} instructions into {} blocks", program.len(), leaders.len());

        let leaders: Vec<Position> = leaders.into_iter().collect();
        let blocks = leaders
            .iter()
            .enumerate()
            .map(|(index, &start)| BasicBlock {
                start,
                end: leaders
                    .get(index + 1)
                    .copied()
                    .unwrap_or(Position(program.len())),
                leader_line: program.line_at(start).line,
            })
            .collect();

        Ok(Self { blocks, resolved })
    }

    /// The TAC line number a jump target resolves to. Targets were validated
    /// during partitioning, so an unknown target is a programming defect.
    pub fn target_line(&self, target: &JumpTarget) -> LineNumber {
        self.resolved[target]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tac;

    fn blocks_of(source: &str) -> (BlockPartition, usize) {
        let program = tac::parse(source).expect("program should parse");
        let len = program.len();
        let partition = BlockPartition::partition(&program).expect("partition should succeed");
        (partition, len)
    }

    #[test]
    fn straight_line_code_is_one_block() {
        let (partition, _) = blocks_of("1, =, x, 5\n2, =, y, x\n3, print, y");

        assert_eq!(1, partition.blocks.len());
        assert_eq!(Position(0), partition.blocks[0].start);
        assert_eq!(Position(3), partition.blocks[0].end);
    }

    #[test]
    fn jump_targets_and_successors_are_leaders() {
        let (partition, _) = blocks_of(
            "1, ifgoto, <, a, b, 5\n\
             2, =, x, 1\n\
             3, =, y, 2\n\
             4, goto, 5\n\
             5, label, L5",
        );

        let starts: Vec<Position> = partition.blocks.iter().map(|b| b.start).collect();
        assert_eq!(vec![Position(0), Position(1), Position(4)], starts);
    }

    #[test]
    fn blocks_partition_the_program_exactly() {
        let (partition, len) = blocks_of(
            "1, =, x, 0\n\
             2, label, top\n\
             3, +, x, x, 1\n\
             4, ifgoto, <, x, 10, 2\n\
             5, print, x",
        );

        let mut covered = Position(0);
        for block in &partition.blocks {
            assert_eq!(covered, block.start, "blocks must not leave gaps");
            assert!(block.start < block.end, "blocks must not be empty");
            covered = block.end;
        }
        assert_eq!(Position(len), covered);
    }

    #[test]
    fn function_instructions_lead_blocks() {
        let (partition, _) = blocks_of(
            "1, =, x, 1\n\
             2, function, f\n\
             3, arg, 1, a",
        );

        let starts: Vec<Position> = partition.blocks.iter().map(|b| b.start).collect();
        assert_eq!(vec![Position(0), Position(1)], starts);
    }

    #[test]
    fn symbolic_targets_resolve_to_label_lines() {
        let (partition, _) = blocks_of(
            "1, goto, done\n\
             2, =, x, 1\n\
             3, label, done",
        );

        assert_eq!(
            LineNumber(3),
            partition.target_line(&JumpTarget::Symbolic("done".to_string()))
        );
    }

    #[test]
    fn unresolved_target_is_fatal() {
        let program = tac::parse("1, goto, 99").expect("program should parse");
        let err = BlockPartition::partition(&program).unwrap_err();

        assert_eq!(
            CodegenError::UnresolvedTarget {
                line: LineNumber(1),
                target: "99".to_string(),
            },
            err
        );
    }
}
