//! Target code generation.
//!
//! The TAC program is partitioned into basic blocks, each block gets a
//! backward next-use analysis, and a forward pass translates each block
//! while allocating registers on the fly. Finally the data, bss and text
//! sections are assembled into a single output file.

mod allocator;
mod assembly;
mod blocks;
mod descriptors;
mod error;
mod labels;
mod liveness;
mod translator;
mod x86;

pub use error::CodegenError;

use std::collections::{BTreeMap, BTreeSet};

use assembly::{Assembly, Bss, Data, PRINT_FORMAT};
use blocks::BlockPartition;
use translator::InstructionTranslator;
use x86::WORD_BYTES;

use crate::tac::{InstrKind, Program};

/// Generate assembly for a complete TAC program.
pub fn generate(program: &Program) -> Result<Assembly, CodegenError> {
    let arrays = declared_arrays(program);
    validate_elements(program, &arrays)?;

    let partition = BlockPartition::partition(program)?;
    let text = InstructionTranslator::translate(program, &partition)?;

    let mut data = Data::new();
    for variable in scalar_variables(program) {
        data.int(variable);
    }
    for (name, length) in &arrays {
        data.space(name.clone(), WORD_BYTES as usize * length);
    }
    data.string(PRINT_FORMAT, "%d\\n");

    Ok(Assembly {
        data,
        bss: Bss,
        text,
    })
}

/// Every distinct scalar variable in the program, in a deterministic
/// (sorted) declaration order.
fn scalar_variables(program: &Program) -> BTreeSet<String> {
    let mut variables = BTreeSet::new();
    for instr in program.iter_instructions() {
        for name in instr.kind.reads() {
            variables.insert(name.to_string());
        }
        if let Some(name) = instr.kind.write() {
            variables.insert(name.to_string());
        }
    }
    variables
}

fn declared_arrays(program: &Program) -> BTreeMap<String, usize> {
    let mut arrays = BTreeMap::new();
    for instr in program.iter_instructions() {
        if let InstrKind::Array { length, name } = &instr.kind {
            arrays.insert(name.clone(), *length);
        }
    }
    arrays
}

/// Reject element accesses into arrays that were never declared; without a
/// declaration there is no storage to address.
fn validate_elements(
    program: &Program,
    arrays: &BTreeMap<String, usize>,
) -> Result<(), CodegenError> {
    for instr in program.iter_instructions() {
        for element in instr.kind.elements() {
            if !arrays.contains_key(&element.base) {
                return Err(CodegenError::UndeclaredArray {
                    line: instr.line,
                    name: element.base.clone(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tac::{self, LineNumber};

    fn generate_source(source: &str) -> String {
        let program = tac::parse(source).expect("program should parse");
        generate(&program).expect("generation succeeds").to_string()
    }

    #[test]
    fn sections_appear_in_fixed_order() {
        let asm = generate_source("1, =, x, 5\n2, print, x");

        let data = asm.find(".section .data").unwrap();
        let bss = asm.find(".section .bss").unwrap();
        let text = asm.find(".section .text").unwrap();
        let entry = asm.find(".globl main").unwrap();
        assert!(data < bss && bss < text && text < entry, "{}", asm);
    }

    #[test]
    fn every_scalar_variable_gets_a_data_slot() {
        let asm = generate_source("1, +, t, a, b\n2, print, t");

        assert!(asm.contains("a:\n.int 0"), "{}", asm);
        assert!(asm.contains("b:\n.int 0"), "{}", asm);
        assert!(asm.contains("t:\n.int 0"), "{}", asm);
        assert!(asm.contains("printf_fmt:\n.string \"%d\\n\""), "{}", asm);
    }

    #[test]
    fn arrays_get_scaled_storage_instead_of_a_scalar_slot() {
        let asm = generate_source("1, array, int, 10, arr\n2, =, arr[0], 1");

        assert!(asm.contains("arr:\n.space 40"), "{}", asm);
        assert!(!asm.contains("arr:\n.int 0"), "{}", asm);
    }

    #[test]
    fn element_access_without_declaration_is_fatal() {
        let program = tac::parse("1, =, x, arr[0]").expect("program should parse");
        let err = generate(&program).unwrap_err();

        assert_eq!(
            CodegenError::UndeclaredArray {
                line: LineNumber(1),
                name: "arr".to_string(),
            },
            err
        );
    }

    #[test]
    fn generation_is_deterministic() {
        let source = "1, array, int, 4, arr\n\
                      2, =, i, 0\n\
                      3, label, top\n\
                      4, =, arr[i], i\n\
                      5, +, i, i, 1\n\
                      6, ifgoto, <, i, 4, 3\n\
                      7, print, i";

        assert_eq!(generate_source(source), generate_source(source));
    }
}
