//! General assembly definitions, specific to GNU as (AT&T syntax).

use std::fmt::{self, Display, Formatter};

use super::x86::{Op, Register};

/// The label of the format string constant consumed by `print`.
pub const PRINT_FORMAT: &str = "printf_fmt";

/// A complete assembly file: a data section, an (empty) uninitialized-data
/// section and a text section, in fixed order.
#[derive(Debug)]
pub struct Assembly {
    pub data: Data,
    pub bss: Bss,
    pub text: Text,
}
impl Display for Assembly {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.data)?;
        write!(f, "{}", self.bss)?;
        write!(f, "{}", self.text)
    }
}

/// The `.data` section: one statically reserved slot per variable, plus the
/// print format string.
#[derive(Debug)]
pub struct Data {
    items: Vec<DataItem>,
}
impl Data {
    pub fn new() -> Self {
        Self { items: vec![] }
    }

    /// Reserve a word-sized integer slot.
    pub fn int<S: Into<String>>(&mut self, name: S) -> &mut Self {
        self.items.push(DataItem::Int(name.into()));
        self
    }

    /// Reserve `bytes` bytes of zeroed storage.
    pub fn space<S: Into<String>>(&mut self, name: S, bytes: usize) -> &mut Self {
        self.items.push(DataItem::Space(name.into(), bytes));
        self
    }

    /// Emit a zero-terminated string constant. The text is written verbatim,
    /// so assembler escapes like `\n` must already be escaped.
    pub fn string<S: Into<String>, T: Into<String>>(&mut self, name: S, text: T) -> &mut Self {
        self.items.push(DataItem::Str(name.into(), text.into()));
        self
    }
}
impl Display for Data {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        writeln!(f, ".section .data")?;
        for item in &self.items {
            writeln!(f, "{}", item)?;
        }
        Ok(())
    }
}

#[derive(Debug)]
enum DataItem {
    Int(String),
    Space(String, usize),
    Str(String, String),
}
impl Display for DataItem {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            DataItem::Int(name) => write!(f, "{}:\n.int 0", name),
            DataItem::Space(name, bytes) => write!(f, "{}:\n.space {}", name, bytes),
            DataItem::Str(name, text) => write!(f, "{}:\n.string \"{}\"", name, text),
        }
    }
}

/// The `.bss` section. The generator reserves all storage in `.data`, so
/// this section stays empty.
#[derive(Debug)]
pub struct Bss;
impl Display for Bss {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        writeln!(f, ".section .bss")
    }
}

/// The `.text` section: a single stream of labels and instructions covering
/// every basic block in program order.
#[derive(Debug)]
pub struct Text {
    lines: Vec<TextLine>,
}
impl Text {
    pub fn new() -> Self {
        Self { lines: vec![] }
    }

    pub fn label<S: Into<String>>(&mut self, name: S) -> &mut Self {
        self.lines.push(TextLine::Label(name.into()));
        self
    }

    pub fn push<V: Into<Vec<Operand>>>(&mut self, op: Op, operands: V) -> &mut Self {
        self.lines
            .push(TextLine::Line(Line::new(Instr::new(op, operands.into()))));
        self
    }

    pub fn push_cmt<V: Into<Vec<Operand>>, S: Into<String>>(
        &mut self,
        op: Op,
        operands: V,
        comment: S,
    ) -> &mut Self {
        self.lines.push(TextLine::Line(Line::new_cmt(
            Instr::new(op, operands.into()),
            comment.into(),
        )));
        self
    }

    pub fn cmt_only<S: Into<String>>(&mut self, comment: S) -> &mut Self {
        self.lines.push(TextLine::Line(Line::comment(comment.into())));
        self
    }

    pub fn blank(&mut self) -> &mut Self {
        self.lines.push(TextLine::Line(Line::new_blank()));
        self
    }
}
impl Display for Text {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        writeln!(f, ".section .text")?;
        writeln!(f, ".globl main")?;
        for line in &self.lines {
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}

#[derive(Debug)]
enum TextLine {
    Label(String),
    Line(Line<Instr>),
}
impl Display for TextLine {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            TextLine::Label(name) => write!(f, "{}:", name),
            TextLine::Line(line) => line.fmt(f),
        }
    }
}

/// A line of assembly, consisting of an optional instruction and optional
/// comment. When the instruction is [`None`], an empty line is emitted.
#[derive(Debug)]
pub struct Line<T> {
    line: Option<T>,
    comment: Option<String>,
}
impl<T> Line<T> {
    /// Construct a new line without comment.
    pub fn new(dir: T) -> Self {
        Self {
            line: Some(dir),
            comment: None,
        }
    }
    /// Construct a new line with a comment.
    pub fn new_cmt(dir: T, comment: String) -> Self {
        Self {
            line: Some(dir),
            comment: Some(comment),
        }
    }

    /// Construct a comment-only line.
    pub fn comment(comment: String) -> Self {
        Self {
            line: None,
            comment: Some(comment),
        }
    }

    /// Construct an empty line.
    pub fn new_blank() -> Self {
        Self {
            line: None,
            comment: None,
        }
    }
}
impl<T: Display> Display for Line<T> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match (&self.line, self.comment.as_ref()) {
            (None, None) => Ok(()),
            (None, Some(cmt)) => write!(f, "                                # {}", cmt),
            (Some(dir), None) => write!(f, "{}", dir),
            (Some(dir), Some(cmt)) => write!(f, "{:32}# {}", dir.to_string(), cmt),
        }
    }
}

/// A single instruction, consisting of an operator and zero or more
/// operands in AT&T order (source before destination).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instr {
    operator: Op,
    operands: Vec<Operand>,
}
impl Instr {
    pub fn new(operator: Op, operands: Vec<Operand>) -> Instr {
        Self { operator, operands }
    }
}
impl Display for Instr {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let operator = self.operator.to_string();
        write!(f, "    {:7} ", operator)?;
        let operands = self
            .operands
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        f.write_str(&operands)
    }
}

/// An operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// A register
    Reg(Register),
    /// The low byte of `%ecx`, the only register-resident shift count x86
    /// accepts
    Cl,
    /// An immediate value
    Imm(i32),
    /// The address of a symbol as an immediate
    Addr(String),
    /// The memory slot of a variable
    Mem(String),
    /// A memory slot at a constant offset from a symbol
    MemOffset(String, i32),
    /// A scaled indexed memory operand: `base(,index,scale)`
    Indexed {
        base: String,
        index: Register,
        scale: i32,
    },
    /// A memory operand at a displacement from a register
    BaseDisp { base: Register, disp: i32 },
    /// A label, as targeted by jumps and calls
    Lbl(String),
}
impl Display for Operand {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Operand::Reg(reg) => reg.fmt(f),
            Operand::Cl => f.write_str("%cl"),
            Operand::Imm(value) => write!(f, "${}", value),
            Operand::Addr(name) => write!(f, "${}", name),
            Operand::Mem(name) => f.write_str(name),
            Operand::MemOffset(name, 0) => f.write_str(name),
            Operand::MemOffset(name, offset) => write!(f, "{}+{}", name, offset),
            Operand::Indexed { base, index, scale } => {
                write!(f, "{}(,{},{})", base, index, scale)
            }
            Operand::BaseDisp { base, disp } => write!(f, "{}({})", disp, base),
            Operand::Lbl(name) => f.write_str(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use Operand::*;
    use Register::*;

    #[test]
    fn instr_serializes_correctly() {
        let instr = Instr::new(Op::Movl, vec![Imm(5), Reg(Eax)]);

        assert_eq!("    movl    $5, %eax", instr.to_string());
    }

    #[test]
    fn indexed_operand_serializes_correctly() {
        let operand = Indexed {
            base: "arr".to_string(),
            index: Ecx,
            scale: 4,
        };

        assert_eq!("arr(,%ecx,4)", operand.to_string());
    }

    #[test]
    fn base_displacement_serializes_correctly() {
        let operand = BaseDisp { base: Ebp, disp: 8 };

        assert_eq!("8(%ebp)", operand.to_string());
    }

    #[test]
    fn data_section_lists_variable_slots() {
        let mut data = Data::new();
        data.int("x").space("arr", 40).string(PRINT_FORMAT, "%d\\n");

        assert_eq!(
            ".section .data\n\
             x:\n.int 0\n\
             arr:\n.space 40\n\
             printf_fmt:\n.string \"%d\\n\"\n",
            data.to_string()
        );
    }
}
