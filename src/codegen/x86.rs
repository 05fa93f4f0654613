use std::fmt::{self, Display, Formatter};

/// The width of a machine word (and of every scalar storage slot), in bytes.
pub const WORD_BYTES: i32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Register {
    Eax,
    Ebx,
    Ecx,
    Edx,
    Ebp,
    Esp,
}
impl Register {
    /// The registers available to the allocator, in allocation (and spill
    /// tie-break) order. The frame and stack pointers are never allocated.
    pub fn allocatable() -> &'static [Register] {
        use Register::*;
        &[Eax, Ebx, Ecx, Edx]
    }
}
impl Display for Register {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(match self {
            Register::Eax => "%eax",
            Register::Ebx => "%ebx",
            Register::Ecx => "%ecx",
            Register::Edx => "%edx",
            Register::Ebp => "%ebp",
            Register::Esp => "%esp",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    // Copies
    Movl,
    // Arithmetic
    Addl,
    Subl,
    Imull,
    Idivl,
    // Bitwise operations
    Andl,
    Orl,
    Notl,
    Shll,
    Sarl,
    // Comparison
    Cmpl,
    // Jumps
    Jmp,
    Je,
    Jne,
    Jl,
    Jle,
    Jg,
    Jge,
    // Stack manipulation
    Pushl,
    Popl,
    Call,
    Ret,
}
impl Display for Op {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(match self {
            Op::Movl => "movl",
            Op::Addl => "addl",
            Op::Subl => "subl",
            Op::Imull => "imull",
            Op::Idivl => "idivl",
            Op::Andl => "andl",
            Op::Orl => "orl",
            Op::Notl => "notl",
            Op::Shll => "shll",
            Op::Sarl => "sarl",
            Op::Cmpl => "cmpl",
            Op::Jmp => "jmp",
            Op::Je => "je",
            Op::Jne => "jne",
            Op::Jl => "jl",
            Op::Jle => "jle",
            Op::Jg => "jg",
            Op::Jge => "jge",
            Op::Pushl => "pushl",
            Op::Popl => "popl",
            Op::Call => "call",
            Op::Ret => "ret",
        })
    }
}
