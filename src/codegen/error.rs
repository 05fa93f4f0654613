//! Error handling for code generation.
use thiserror::Error;

use crate::tac::LineNumber;

/// A fatal code generation error. These indicate contract violations by the
/// upstream TAC producer; generation is aborted for the whole unit.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodegenError {
    #[error("line {line}: jump to unresolved target '{target}'")]
    UnresolvedTarget { line: LineNumber, target: String },
    #[error("line {line}: division by constant zero")]
    DivisionByZero { line: LineNumber },
    #[error("line {line}: array '{name}' used without a storage declaration")]
    UndeclaredArray { line: LineNumber, name: String },
}
