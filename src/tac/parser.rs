//! A structured parser for the textual TAC format.
//!
//! Each input line holds one instruction as comma-separated fields:
//! `LineNumber, Opcode, Operand1, Operand2, …`. Field counts and operand
//! kinds are validated here, once, so the code generator can rely on a
//! well-formed [`Program`].

use super::error::ParseError;
use super::*;

/// Parse a complete TAC listing. Blank lines are skipped; instruction
/// numbers must run consecutively from 1.
pub fn parse(source: &str) -> Result<Program, ParseError> {
    let mut program = Program::empty();
    let mut expected = 1usize;

    for (index, raw) in source.lines().enumerate() {
        let line = index + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }

        let fields: Vec<&str> = trimmed.split(',').map(str::trim).collect();
        if fields.len() < 2 {
            return Err(ParseError::FieldCount {
                line,
                opcode: trimmed.to_string(),
                expected: "at least 2",
                found: fields.len(),
            });
        }
        let number: usize =
            fields[0]
                .parse()
                .map_err(|_| ParseError::InstructionNumber {
                    line,
                    expected,
                    found: fields[0].to_string(),
                })?;
        if number != expected {
            return Err(ParseError::InstructionNumber {
                line,
                expected,
                found: fields[0].to_string(),
            });
        }
        expected += 1;

        let kind = parse_kind(line, &fields[1..])?;
        program.push(Instruction {
            line: LineNumber(number),
            kind,
        });
    }

    Ok(program)
}

/// Parse the opcode and operand fields of a single instruction.
fn parse_kind(line: usize, fields: &[&str]) -> Result<InstrKind, ParseError> {
    let opcode = fields[0];
    let operands = &fields[1..];

    let kind = match opcode {
        "+" | "-" | "*" | "/" | "%" | "<<" | ">>" | "&&" | "||" | "<" | "<=" | ">" | ">="
        | "==" | "!=" => {
            expect_operands(line, opcode, operands, 3, "5")?;
            InstrKind::Bin {
                op: bin_op(opcode).unwrap(),
                dest: parse_var(line, operands[0])?,
                lhs: parse_value(line, operands[1])?,
                rhs: parse_value(line, operands[2])?,
            }
        }
        "~" => {
            expect_operands(line, opcode, operands, 2, "4")?;
            InstrKind::Not {
                dest: parse_var(line, operands[0])?,
                operand: parse_value(line, operands[1])?,
            }
        }
        "=" => {
            expect_operands(line, opcode, operands, 2, "4")?;
            InstrKind::Assign {
                dest: parse_place(line, operands[0])?,
                value: parse_expr(line, operands[1])?,
            }
        }
        "goto" => {
            expect_operands(line, opcode, operands, 1, "3")?;
            InstrKind::Goto(parse_target(line, operands[0])?)
        }
        "ifgoto" => {
            expect_operands(line, opcode, operands, 4, "6")?;
            let op = rel_op(operands[0]).ok_or_else(|| ParseError::Relation {
                line,
                op: operands[0].to_string(),
            })?;
            InstrKind::IfGoto {
                op,
                lhs: parse_value(line, operands[1])?,
                rhs: parse_value(line, operands[2])?,
                target: parse_target(line, operands[3])?,
            }
        }
        "label" => {
            expect_operands(line, opcode, operands, 1, "3")?;
            InstrKind::Label(parse_var(line, operands[0])?)
        }
        "function" => {
            expect_operands(line, opcode, operands, 1, "3")?;
            InstrKind::Function(parse_var(line, operands[0])?)
        }
        "return" => match operands {
            [] => InstrKind::Return(None),
            [value] => InstrKind::Return(Some(parse_value(line, value)?)),
            _ => {
                return Err(field_count(line, opcode, operands, "2 or 3"));
            }
        },
        "arg" => {
            expect_operands(line, opcode, operands, 2, "4")?;
            let slot = parse_slot(line, operands[0])?;
            InstrKind::Arg {
                slot,
                dest: parse_var(line, operands[1])?,
            }
        }
        "pop" => {
            expect_operands(line, opcode, operands, 1, "3")?;
            InstrKind::Pop(parse_var(line, operands[0])?)
        }
        "param" => {
            expect_operands(line, opcode, operands, 1, "3")?;
            InstrKind::Param(parse_value(line, operands[0])?)
        }
        "call" => match operands {
            [function, args] => InstrKind::Call {
                function: parse_var(line, function)?,
                args: parse_slot(line, args)?,
                dest: None,
            },
            [function, args, dest] => InstrKind::Call {
                function: parse_var(line, function)?,
                args: parse_slot(line, args)?,
                dest: Some(parse_var(line, dest)?),
            },
            _ => {
                return Err(field_count(line, opcode, operands, "4 or 5"));
            }
        },
        "print" => {
            expect_operands(line, opcode, operands, 1, "3")?;
            InstrKind::Print(parse_value(line, operands[0])?)
        }
        "exit" => {
            expect_operands(line, opcode, operands, 0, "2")?;
            InstrKind::Exit
        }
        "array" => {
            expect_operands(line, opcode, operands, 3, "5")?;
            if operands[0] != "int" {
                return Err(ParseError::ElementType {
                    line,
                    name: operands[0].to_string(),
                });
            }
            let length = parse_slot(line, operands[1])?;
            InstrKind::Array {
                length,
                name: parse_var(line, operands[2])?,
            }
        }
        other => {
            return Err(ParseError::UnknownOpcode {
                line,
                opcode: other.to_string(),
            });
        }
    };

    Ok(kind)
}

fn bin_op(opcode: &str) -> Option<BinOp> {
    let op = match opcode {
        "+" => BinOp::Arith(ArithOp::Add),
        "-" => BinOp::Arith(ArithOp::Sub),
        "*" => BinOp::Arith(ArithOp::Mul),
        "/" => BinOp::Arith(ArithOp::Div),
        "%" => BinOp::Arith(ArithOp::Rem),
        "<<" => BinOp::Shift(ShiftOp::Shl),
        ">>" => BinOp::Shift(ShiftOp::Shr),
        "&&" => BinOp::Logic(LogicOp::And),
        "||" => BinOp::Logic(LogicOp::Or),
        other => BinOp::Rel(rel_op(other)?),
    };
    Some(op)
}

fn rel_op(opcode: &str) -> Option<RelOp> {
    match opcode {
        "<" => Some(RelOp::Lt),
        "<=" => Some(RelOp::Le),
        ">" => Some(RelOp::Gt),
        ">=" => Some(RelOp::Ge),
        "==" => Some(RelOp::Eq),
        "!=" => Some(RelOp::Ne),
        _ => None,
    }
}

fn expect_operands(
    line: usize,
    opcode: &str,
    operands: &[&str],
    count: usize,
    fields: &'static str,
) -> Result<(), ParseError> {
    if operands.len() == count {
        Ok(())
    } else {
        Err(field_count(line, opcode, operands, fields))
    }
}

fn field_count(line: usize, opcode: &str, operands: &[&str], expected: &'static str) -> ParseError {
    ParseError::FieldCount {
        line,
        opcode: opcode.to_string(),
        expected,
        // The instruction number and opcode fields count too.
        found: operands.len() + 2,
    }
}

/// An identifier: starts with a letter or underscore, continues with
/// letters, digits or underscores.
fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

fn parse_var(line: usize, text: &str) -> Result<String, ParseError> {
    if is_identifier(text) {
        Ok(text.to_string())
    } else {
        Err(ParseError::Operand {
            line,
            operand: text.to_string(),
        })
    }
}

fn parse_value(line: usize, text: &str) -> Result<Value, ParseError> {
    if let Ok(literal) = text.parse::<TargetInt>() {
        Ok(Value::Const(literal))
    } else {
        parse_var(line, text).map(Value::Var)
    }
}

fn parse_slot(line: usize, text: &str) -> Result<usize, ParseError> {
    text.parse().map_err(|_| ParseError::Operand {
        line,
        operand: text.to_string(),
    })
}

/// A jump target: a TAC line number or the name of a `label` instruction.
fn parse_target(line: usize, text: &str) -> Result<JumpTarget, ParseError> {
    if let Ok(number) = text.parse::<usize>() {
        Ok(JumpTarget::Line(LineNumber(number)))
    } else {
        parse_var(line, text).map(JumpTarget::Symbolic)
    }
}

fn parse_element(line: usize, text: &str) -> Result<Element, ParseError> {
    let malformed = || ParseError::Operand {
        line,
        operand: text.to_string(),
    };
    let open = text.find('[').ok_or_else(malformed)?;
    if !text.ends_with(']') {
        return Err(malformed());
    }
    let base = parse_var(line, &text[..open])?;
    let index = parse_value(line, &text[open + 1..text.len() - 1])?;
    Ok(Element { base, index })
}

fn parse_expr(line: usize, text: &str) -> Result<Expr, ParseError> {
    if text.contains('[') {
        parse_element(line, text).map(Expr::Element)
    } else {
        parse_value(line, text).map(Expr::Value)
    }
}

fn parse_place(line: usize, text: &str) -> Result<Place, ParseError> {
    if text.contains('[') {
        parse_element(line, text).map(Place::Element)
    } else {
        parse_var(line, text).map(Place::Var)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    macro_rules! parse_single {
        ($text:expr) => {{
            let program = parse($text).expect("program should parse");
            assert_eq!(1, program.len());
            program.line_at(crate::listing::Position(0)).kind.clone()
        }};
    }

    #[test]
    fn parses_assignment() {
        let kind = parse_single!("1, =, x, 5");

        assert_eq!(
            InstrKind::Assign {
                dest: Place::Var("x".to_string()),
                value: Expr::Value(Value::Const(5)),
            },
            kind
        );
    }

    #[test]
    fn parses_binary_operation() {
        let kind = parse_single!("1, +, t1, a, -3");

        assert_eq!(
            InstrKind::Bin {
                op: BinOp::Arith(ArithOp::Add),
                dest: "t1".to_string(),
                lhs: Value::Var("a".to_string()),
                rhs: Value::Const(-3),
            },
            kind
        );
    }

    #[test]
    fn parses_conditional_jump() {
        let kind = parse_single!("1, ifgoto, <=, a, b, 5");

        assert_eq!(
            InstrKind::IfGoto {
                op: RelOp::Le,
                lhs: Value::Var("a".to_string()),
                rhs: Value::Var("b".to_string()),
                target: JumpTarget::Line(LineNumber(5)),
            },
            kind
        );
    }

    #[test]
    fn parses_symbolic_jump_target() {
        let kind = parse_single!("1, goto, L5");

        assert_eq!(
            InstrKind::Goto(JumpTarget::Symbolic("L5".to_string())),
            kind
        );
    }

    #[test]
    fn parses_call_with_result() {
        let kind = parse_single!("1, call, fib, 2, t3");

        assert_eq!(
            InstrKind::Call {
                function: "fib".to_string(),
                args: 2,
                dest: Some("t3".to_string()),
            },
            kind
        );
    }

    #[test]
    fn parses_element_access() {
        let kind = parse_single!("1, =, x, arr[i]");

        assert_eq!(
            InstrKind::Assign {
                dest: Place::Var("x".to_string()),
                value: Expr::Element(Element {
                    base: "arr".to_string(),
                    index: Value::Var("i".to_string()),
                }),
            },
            kind
        );
    }

    #[test]
    fn parses_array_declaration() {
        let kind = parse_single!("1, array, int, 10, arr");

        assert_eq!(
            InstrKind::Array {
                length: 10,
                name: "arr".to_string(),
            },
            kind
        );
    }

    #[test]
    fn rejects_unknown_opcode() {
        let err = parse("1, frobnicate, x").unwrap_err();

        assert_eq!(
            ParseError::UnknownOpcode {
                line: 1,
                opcode: "frobnicate".to_string(),
            },
            err
        );
    }

    #[test]
    fn rejects_wrong_field_count() {
        let err = parse("1, +, t1, a").unwrap_err();

        assert!(matches!(err, ParseError::FieldCount { found: 4, .. }));
    }

    #[test]
    fn rejects_gap_in_instruction_numbers() {
        let err = parse("1, =, x, 5\n3, print, x").unwrap_err();

        assert!(matches!(err, ParseError::InstructionNumber { expected: 2, .. }));
    }

    #[test]
    fn rejects_constant_assignment_target() {
        let err = parse("1, =, 5, x").unwrap_err();

        assert!(matches!(err, ParseError::Operand { .. }));
    }

    #[test]
    fn skips_blank_lines() {
        let program = parse("1, =, x, 5\n\n2, print, x\n").expect("program should parse");

        assert_eq!(2, program.len());
    }
}
