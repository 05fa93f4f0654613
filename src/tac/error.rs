//! Error handling for TAC parsing.
use thiserror::Error;

/// An error encountered while parsing a TAC listing. All parse errors are
/// fatal; the generator never proceeds with a partially parsed program.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("line {line}: expected {expected} fields for '{opcode}', found {found}")]
    FieldCount {
        line: usize,
        opcode: String,
        expected: &'static str,
        found: usize,
    },
    #[error("line {line}: unknown opcode '{opcode}'")]
    UnknownOpcode { line: usize, opcode: String },
    #[error("line {line}: expected instruction number {expected}, found '{found}'")]
    InstructionNumber {
        line: usize,
        expected: usize,
        found: String,
    },
    #[error("line {line}: malformed operand '{operand}'")]
    Operand { line: usize, operand: String },
    #[error("line {line}: '{op}' is not a relational operator")]
    Relation { line: usize, op: String },
    #[error("line {line}: unsupported element type '{name}' in array declaration")]
    ElementType { line: usize, name: String },
}
