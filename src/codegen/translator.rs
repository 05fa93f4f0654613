//! Per-opcode translation of TAC instructions to target instructions.

use log::trace;

use crate::{
    listing::Position,
    tac::{
        ArithOp, BinOp, Element, Expr, InstrKind, Instruction, JumpTarget, LineNumber, LogicOp,
        Place, Program, RelOp, ShiftOp, Value,
    },
};

use super::{
    allocator::RegisterAllocator,
    assembly::{Operand, Text, PRINT_FORMAT},
    blocks::{BasicBlock, BlockPartition},
    descriptors::{DescriptorState, Location},
    error::CodegenError,
    labels::LabelGenerator,
    liveness::{Liveness, LivenessTable},
    x86::{Op, Register, WORD_BYTES},
};

use Op::*;
use Operand::*;
use Register::*;

/// Translates a partitioned program block by block, consulting the
/// per-block next-use tables and threading the descriptor state and label
/// counter through in program order.
pub struct InstructionTranslator<'p> {
    program: &'p Program,
    partition: &'p BlockPartition,
    allocator: RegisterAllocator,
    state: DescriptorState,
    labels: LabelGenerator,
    text: Text,
    current_line: LineNumber,
    /// Parameter slots consumed by `pop` since the current `function`.
    popped_params: usize,
}

impl<'p> InstructionTranslator<'p> {
    /// Translate the given program into a text section.
    pub fn translate(
        program: &'p Program,
        partition: &'p BlockPartition,
    ) -> Result<Text, CodegenError> {
        let mut translator = Self {
            program,
            partition,
            allocator: RegisterAllocator::new(),
            state: DescriptorState::new(),
            labels: LabelGenerator::new(),
            text: Text::new(),
            current_line: LineNumber(0),
            popped_params: 0,
        };
        translator.translate_program()?;
        Ok(translator.text)
    }

    fn translate_program(&mut self) -> Result<(), CodegenError> {
        let program = self.program;

        // Programs that open with a function bring their own entry label;
        // anything else is top-level code and becomes the body of main.
        let opens_with_function = matches!(
            program.iter_instructions().next().map(|instr| &instr.kind),
            Some(InstrKind::Function(_))
        );
        if !opens_with_function {
            self.text.label("main");
            self.emit_prologue();
        }

        let partition = self.partition;
        for block in &partition.blocks {
            self.translate_block(block)?;
        }

        // Top-level code that neither returns nor exits still has to leave
        // main through a well-formed epilogue.
        let falls_off_the_end = !matches!(
            program.iter_instructions().last().map(|instr| &instr.kind),
            Some(InstrKind::Return(_) | InstrKind::Exit)
        );
        if falls_off_the_end {
            self.text.blank();
            self.emit_cmt(Movl, [Imm(0), Reg(Eax)], "exit status");
            self.emit_epilogue();
        }

        Ok(())
    }

    fn translate_block(&mut self, block: &BasicBlock) -> Result<(), CodegenError> {
        let program = self.program;
        let liveness = LivenessTable::analyze(program, block);

        self.text.label(format!("L{}", block.leader_line));
        for offset in 0..(block.end.0 - block.start.0) {
            let position = block.start + offset;
            self.translate_instr(&liveness, position, program.line_at(position))?;
        }

        // Blocks end with every live value in memory, so control-flow joins
        // agree on where variables live.
        self.flush_registers();
        Ok(())
    }

    fn translate_instr(
        &mut self,
        live: &LivenessTable,
        position: Position,
        instr: &Instruction,
    ) -> Result<(), CodegenError> {
        trace!("translating {}", instr);
        self.current_line = instr.line;
        let comment = instr.to_string();

        match instr.kind.clone() {
            InstrKind::Bin {
                op,
                dest,
                lhs,
                rhs,
            } => self.compile_bin(live, position, op, dest, lhs, rhs, comment)?,
            InstrKind::Not { dest, operand } => {
                self.compile_not(live, position, dest, operand, comment)
            }
            InstrKind::Assign { dest, value } => {
                self.compile_assign(live, position, dest, value, comment)
            }
            InstrKind::Goto(target) => self.compile_goto(target, comment),
            InstrKind::IfGoto {
                op,
                lhs,
                rhs,
                target,
            } => self.compile_if_goto(live, position, op, lhs, rhs, target, comment),
            // The jump table routes every jump to the block-entry label, so
            // the symbolic name needs no emission of its own.
            InstrKind::Label(_) => {
                self.text.cmt_only(comment);
            }
            InstrKind::Function(name) => self.compile_function(name),
            InstrKind::Return(value) => self.compile_return(value, comment),
            InstrKind::Arg { slot, dest } => {
                self.compile_incoming(live, position, slot, dest, comment)
            }
            InstrKind::Pop(dest) => {
                self.popped_params += 1;
                let slot = self.popped_params;
                self.compile_incoming(live, position, slot, dest, comment)
            }
            InstrKind::Param(value) => self.compile_param(value, comment),
            InstrKind::Call {
                function,
                args,
                dest,
            } => self.compile_call(function, args, dest, comment),
            InstrKind::Print(value) => self.compile_print(value, comment),
            InstrKind::Exit => self.compile_exit(comment),
            InstrKind::Array { .. } => {
                self.text.cmt_only(comment);
            }
        }

        Ok(())
    }

    fn compile_bin(
        &mut self,
        live: &LivenessTable,
        position: Position,
        op: BinOp,
        dest: String,
        lhs: Value,
        rhs: Value,
        comment: String,
    ) -> Result<(), CodegenError> {
        match op {
            BinOp::Arith(ArithOp::Div) => {
                return self.compile_divmod(live, position, ArithOp::Div, dest, lhs, rhs, comment)
            }
            BinOp::Arith(ArithOp::Rem) => {
                return self.compile_divmod(live, position, ArithOp::Rem, dest, lhs, rhs, comment)
            }
            BinOp::Arith(ArithOp::Mul) => self.compile_mul(live, position, dest, lhs, rhs, comment),
            BinOp::Rel(rel) => self.compile_cmp(live, position, rel, dest, lhs, rhs, comment),
            BinOp::Shift(shift) if matches!(rhs, Value::Var(_)) => {
                self.compile_var_shift(live, position, shift, dest, lhs, rhs, comment)
            }
            BinOp::Arith(ArithOp::Add) => {
                self.compile_simple_bin(live, position, Addl, dest, lhs, rhs, comment)
            }
            BinOp::Arith(ArithOp::Sub) => {
                self.compile_simple_bin(live, position, Subl, dest, lhs, rhs, comment)
            }
            BinOp::Shift(ShiftOp::Shl) => {
                self.compile_simple_bin(live, position, Shll, dest, lhs, rhs, comment)
            }
            BinOp::Shift(ShiftOp::Shr) => {
                self.compile_simple_bin(live, position, Sarl, dest, lhs, rhs, comment)
            }
            BinOp::Logic(LogicOp::And) => {
                self.compile_simple_bin(live, position, Andl, dest, lhs, rhs, comment)
            }
            BinOp::Logic(LogicOp::Or) => {
                self.compile_simple_bin(live, position, Orl, dest, lhs, rhs, comment)
            }
        }

        Ok(())
    }

    /// Compile a binary operation whose destination may be any register:
    /// load the left operand into the destination, then apply the operator
    /// with the right operand as source.
    fn compile_simple_bin(
        &mut self,
        live: &LivenessTable,
        position: Position,
        op: Op,
        dest: String,
        lhs: Value,
        rhs: Value,
        comment: String,
    ) {
        let target = self.claim(live, position, &dest, &[]);
        let rhs_op = self.prepare_operands(target, &lhs, &rhs, &comment);
        self.emit_cmt(op, [rhs_op, Reg(target)], format!("<apply> {}", comment));
        self.state.bind(&dest, target);
        self.free_dead_operands(live, position, &[lhs, rhs], target);
    }

    /// Compile a comparison that materializes a 0/1 result: compare, jump
    /// to a fresh true-label, set 0 on the fall-through path, set 1 behind
    /// the true-label.
    fn compile_cmp(
        &mut self,
        live: &LivenessTable,
        position: Position,
        rel: RelOp,
        dest: String,
        lhs: Value,
        rhs: Value,
        comment: String,
    ) {
        let target = self.claim(live, position, &dest, &[]);
        let rhs_op = self.prepare_operands(target, &lhs, &rhs, &comment);
        self.emit_cmt(Cmpl, [rhs_op, Reg(target)], format!("<compare> {}", comment));

        let labels = self.labels.next_comparison();
        self.emit(jump_for(rel), [Lbl(labels.when_true.clone())]);
        self.emit_cmt(Movl, [Imm(0), Reg(target)], format!("<false> {}", comment));
        self.emit(Jmp, [Lbl(labels.next.clone())]);
        self.text.label(labels.when_true);
        self.emit_cmt(Movl, [Imm(1), Reg(target)], format!("<true> {}", comment));
        self.text.label(labels.next);

        self.state.bind(&dest, target);
        self.free_dead_operands(live, position, &[lhs, rhs], target);
    }

    /// Compile a multiplication. `imull` writes its double-width product to
    /// edx:eax, so both registers are reserved regardless of next use.
    fn compile_mul(
        &mut self,
        live: &LivenessTable,
        position: Position,
        dest: String,
        lhs: Value,
        rhs: Value,
        comment: String,
    ) {
        self.evict(Eax);
        self.evict(Edx);
        self.load_value(&lhs, Eax, &comment);

        // The multiplier cannot be an immediate; edx is free to hold it,
        // as the operation only clobbers it afterwards.
        let rhs_op = match self.value_operand(&rhs) {
            Imm(literal) => {
                self.emit_cmt(Movl, [Imm(literal), Reg(Edx)], format!("<load> {}", comment));
                Reg(Edx)
            }
            operand => operand,
        };
        self.emit_cmt(Imull, [rhs_op], format!("<apply> {}", comment));

        self.state.bind(&dest, Eax);
        self.free_dead_operands(live, position, &[lhs, rhs], Eax);
    }

    /// Compile a division or remainder. `idivl` divides edx:eax, leaving
    /// the quotient in eax and the remainder in edx; both registers are
    /// reserved regardless of next use, and edx is pre-cleared to zero.
    fn compile_divmod(
        &mut self,
        live: &LivenessTable,
        position: Position,
        op: ArithOp,
        dest: String,
        lhs: Value,
        rhs: Value,
        comment: String,
    ) -> Result<(), CodegenError> {
        if rhs == Value::Const(0) {
            return Err(CodegenError::DivisionByZero {
                line: self.current_line,
            });
        }

        self.evict(Eax);
        self.evict(Edx);
        self.load_value(&lhs, Eax, &comment);
        self.emit_cmt(Movl, [Imm(0), Reg(Edx)], "<div> clear upper half");

        // An immediate divisor is not encodable; materialize it outside
        // the reserved pair.
        let divisor = match self.value_operand(&rhs) {
            Imm(literal) => {
                let scratch = self.claim_scratch(live, position, &[Eax, Edx]);
                self.emit_cmt(Movl, [Imm(literal), Reg(scratch)], format!("<load> {}", comment));
                Reg(scratch)
            }
            operand => operand,
        };
        self.emit_cmt(Idivl, [divisor], format!("<apply> {}", comment));

        let target = match op {
            ArithOp::Div => Eax,
            ArithOp::Rem => Edx,
            _ => unreachable!("only division and remainder reserve the register pair"),
        };
        self.state.bind(&dest, target);
        self.free_dead_operands(live, position, &[lhs, rhs], target);
        Ok(())
    }

    /// Compile a shift by a variable count. x86 only accepts a
    /// register-resident count in %cl, so ecx is reserved first.
    fn compile_var_shift(
        &mut self,
        live: &LivenessTable,
        position: Position,
        shift: ShiftOp,
        dest: String,
        lhs: Value,
        rhs: Value,
        comment: String,
    ) {
        self.evict(Ecx);
        self.load_value(&rhs, Ecx, &comment);

        let target = self.claim(live, position, &dest, &[Ecx]);
        self.load_value(&lhs, target, &comment);
        let op = match shift {
            ShiftOp::Shl => Shll,
            ShiftOp::Shr => Sarl,
        };
        self.emit_cmt(op, [Cl, Reg(target)], format!("<apply> {}", comment));

        self.state.bind(&dest, target);
        self.free_dead_operands(live, position, &[lhs, rhs], target);
    }

    fn compile_not(
        &mut self,
        live: &LivenessTable,
        position: Position,
        dest: String,
        operand: Value,
        comment: String,
    ) {
        let target = self.claim(live, position, &dest, &[]);
        self.load_value(&operand, target, &comment);
        self.emit_cmt(Notl, [Reg(target)], format!("<apply> {}", comment));
        self.state.bind(&dest, target);
        self.free_dead_operands(live, position, &[operand], target);
    }

    /// Compile a copy. Assignments write through to the destination's
    /// memory slot, so a later flush has nothing left to do for it.
    fn compile_assign(
        &mut self,
        live: &LivenessTable,
        position: Position,
        dest: Place,
        value: Expr,
        comment: String,
    ) {
        match (dest, value) {
            (Place::Var(dest), Expr::Value(Value::Const(literal))) => {
                self.emit_cmt(Movl, [Imm(literal), Mem(dest.clone())], comment);
                self.release_stale(&dest);
            }
            (Place::Var(dest), Expr::Value(Value::Var(src))) => {
                let register = self.register_for(live, position, &src, &comment, &[]);
                self.emit_cmt(Movl, [Reg(register), Mem(dest.clone())], comment);
                if src != dest {
                    self.release_stale(&dest);
                }
            }
            (Place::Var(dest), Expr::Element(element)) => {
                let address = self.element_operand(live, position, &element, &comment, &[]);
                let scratch = self.claim_scratch(live, position, &index_registers(&address));
                self.emit_cmt(
                    Movl,
                    [address, Reg(scratch)],
                    format!("<load> {}", comment),
                );
                self.emit_cmt(Movl, [Reg(scratch), Mem(dest.clone())], comment);
                self.release_stale(&dest);
            }
            (Place::Element(element), value) => {
                // Secure the source in a register or immediate first, so
                // materializing the index cannot disturb it.
                let source = match value {
                    Expr::Value(Value::Const(literal)) => Imm(literal),
                    Expr::Value(Value::Var(src)) => {
                        Reg(self.register_for(live, position, &src, &comment, &[]))
                    }
                    Expr::Element(inner) => {
                        let address = self.element_operand(live, position, &inner, &comment, &[]);
                        let scratch =
                            self.claim_scratch(live, position, &index_registers(&address));
                        self.emit_cmt(
                            Movl,
                            [address, Reg(scratch)],
                            format!("<load> {}", comment),
                        );
                        Reg(scratch)
                    }
                };
                let pinned = index_registers(&source);
                let address = self.element_operand(live, position, &element, &comment, &pinned);
                self.emit_cmt(Movl, [source, address], comment);
            }
        }
    }

    fn compile_goto(&mut self, target: JumpTarget, comment: String) {
        self.flush_registers();
        let line = self.partition.target_line(&target);
        self.emit_cmt(Jmp, [Lbl(format!("L{}", line))], comment);
    }

    fn compile_if_goto(
        &mut self,
        live: &LivenessTable,
        position: Position,
        op: RelOp,
        lhs: Value,
        rhs: Value,
        target: JumpTarget,
        comment: String,
    ) {
        // Values cross block boundaries in memory; the comparison then runs
        // on memory operands and a transient scratch register.
        self.flush_registers();
        let scratch = self.claim_scratch(live, position, &[]);
        self.load_value(&lhs, scratch, &comment);
        let rhs_op = self.value_operand(&rhs);
        self.emit_cmt(Cmpl, [rhs_op, Reg(scratch)], format!("<compare> {}", comment));

        let line = self.partition.target_line(&target);
        self.emit_cmt(jump_for(op), [Lbl(format!("L{}", line))], comment);
    }

    fn compile_function(&mut self, name: String) {
        // A new frame begins; incoming parameter slots start over.
        self.popped_params = 0;
        self.text.label(name);
        self.emit_prologue();
    }

    fn compile_return(&mut self, value: Option<Value>, comment: String) {
        self.flush_registers();
        if let Some(value) = value {
            let operand = self.value_operand(&value);
            self.emit_cmt(Movl, [operand, Reg(Eax)], comment);
        } else {
            self.text.cmt_only(comment);
        }
        self.emit_epilogue();
    }

    /// Bind an incoming parameter slot to a local variable. The first
    /// parameter sits above the return address and the saved frame pointer,
    /// at 8(%ebp); later slots follow word by word.
    fn compile_incoming(
        &mut self,
        live: &LivenessTable,
        position: Position,
        slot: usize,
        dest: String,
        comment: String,
    ) {
        let disp = WORD_BYTES * (slot as i32 + 1);
        let register = self.claim(live, position, &dest, &[]);
        self.emit_cmt(Movl, [BaseDisp { base: Ebp, disp }, Reg(register)], comment);
        self.state.bind(&dest, register);
    }

    fn compile_param(&mut self, value: Value, comment: String) {
        let operand = self.value_operand(&value);
        self.emit_cmt(Pushl, [operand], comment);
    }

    /// Compile a call. The caller-saved convention is applied globally:
    /// every live value crosses the call in memory.
    fn compile_call(
        &mut self,
        function: String,
        args: usize,
        dest: Option<String>,
        comment: String,
    ) {
        self.flush_registers();
        self.emit_cmt(Call, [Lbl(function)], comment);
        if args > 0 {
            self.emit_cmt(
                Addl,
                [Imm(WORD_BYTES * args as i32), Reg(Esp)],
                "drop pushed arguments",
            );
        }
        if let Some(dest) = dest {
            // The return value arrives in eax.
            self.state.bind(&dest, Eax);
        }
    }

    fn compile_print(&mut self, value: Value, comment: String) {
        self.flush_registers();
        let operand = self.value_operand(&value);
        self.emit_cmt(Pushl, [operand], comment);
        self.emit(Pushl, [Addr(PRINT_FORMAT.to_string())]);
        self.emit(Call, [Lbl("printf".to_string())]);
        self.emit_cmt(Addl, [Imm(2 * WORD_BYTES), Reg(Esp)], "drop printf arguments");
    }

    fn compile_exit(&mut self, comment: String) {
        self.flush_registers();
        self.emit_cmt(Pushl, [Imm(0)], comment);
        self.emit(Call, [Lbl("exit".to_string())]);
    }

    /// Find a register for a variable, emitting the spill store when the
    /// allocator had to evict another variable.
    fn claim(
        &mut self,
        live: &LivenessTable,
        position: Position,
        variable: &str,
        exclude: &[Register],
    ) -> Register {
        let claim =
            self.allocator
                .get_register_excluding(variable, position, &mut self.state, live, exclude);
        if let Some(spilled) = claim.spilled {
            self.emit_cmt(
                Movl,
                [Reg(claim.register), Mem(spilled.clone())],
                format!("<spill> {}", spilled),
            );
        }
        claim.register
    }

    /// Find a register for a transient value, emitting the spill store when
    /// the allocator had to evict a variable.
    fn claim_scratch(
        &mut self,
        live: &LivenessTable,
        position: Position,
        exclude: &[Register],
    ) -> Register {
        let claim = self
            .allocator
            .get_scratch(position, &mut self.state, live, exclude);
        if let Some(spilled) = claim.spilled {
            self.emit_cmt(
                Movl,
                [Reg(claim.register), Mem(spilled.clone())],
                format!("<spill> {}", spilled),
            );
        }
        claim.register
    }

    /// Force a specific register free, storing its occupant to memory. Used
    /// where the hardware dictates the register, overriding the next-use
    /// heuristic.
    fn evict(&mut self, register: Register) {
        if let Some(variable) = self.state.contents_of(register).map(str::to_string) {
            self.emit_cmt(
                Movl,
                [Reg(register), Mem(variable.clone())],
                format!("<spill> {}", variable),
            );
            self.state.free(register);
        }
    }

    /// Store every register-resident variable to its memory slot and mark
    /// the registers free. Run before branches, calls and block ends.
    fn flush_registers(&mut self) {
        for (register, variable) in self.state.resident() {
            self.emit_cmt(
                Movl,
                [Reg(register), Mem(variable.clone())],
                format!("<flush> {}", variable),
            );
            self.state.free(register);
        }
    }

    /// Free the registers of operand variables that have no further use in
    /// the block, writing their values back first. The writeback keeps every
    /// value recoverable from memory once its register is handed out again.
    fn free_dead_operands(
        &mut self,
        live: &LivenessTable,
        position: Position,
        operands: &[Value],
        keep: Register,
    ) {
        for operand in operands {
            if let Value::Var(name) = operand {
                if let Location::InRegister(register) = self.state.location_of(name) {
                    if register != keep && live.entry(position, name) == Liveness::Dead {
                        self.emit_cmt(
                            Movl,
                            [Reg(register), Mem(name.clone())],
                            format!("<flush> {}", name),
                        );
                        self.state.free(register);
                    }
                }
            }
        }
    }

    /// Load the left operand into the destination register and return the
    /// operand for the right one. When the right operand currently lives in
    /// the destination register, its value is saved to memory first so the
    /// load cannot clobber it.
    fn prepare_operands(
        &mut self,
        target: Register,
        lhs: &Value,
        rhs: &Value,
        comment: &str,
    ) -> Operand {
        let mut rhs_op = self.value_operand(rhs);
        if rhs_op == Reg(target) && lhs != rhs {
            if let Value::Var(name) = rhs {
                self.emit_cmt(
                    Movl,
                    [Reg(target), Mem(name.clone())],
                    format!("<save> {}", name),
                );
                rhs_op = Mem(name.clone());
            }
        }
        self.load_value(lhs, target, comment);
        rhs_op
    }

    /// Ensure a variable's value is in a register, loading it from its
    /// memory slot if necessary, and return that register.
    fn register_for(
        &mut self,
        live: &LivenessTable,
        position: Position,
        variable: &str,
        comment: &str,
        exclude: &[Register],
    ) -> Register {
        if let Location::InRegister(register) = self.state.location_of(variable) {
            return register;
        }
        let register = self.claim(live, position, variable, exclude);
        self.emit_cmt(
            Movl,
            [Mem(variable.to_string()), Reg(register)],
            format!("<load> {}", comment),
        );
        self.state.bind(variable, register);
        register
    }

    /// Rewrite an element reference into a scaled addressing operand,
    /// materializing a non-constant index into a register first.
    fn element_operand(
        &mut self,
        live: &LivenessTable,
        position: Position,
        element: &Element,
        comment: &str,
        exclude: &[Register],
    ) -> Operand {
        match &element.index {
            Value::Const(literal) => MemOffset(element.base.clone(), literal * WORD_BYTES),
            Value::Var(index) => {
                let register = self.register_for(live, position, index, comment, exclude);
                Indexed {
                    base: element.base.clone(),
                    index: register,
                    scale: WORD_BYTES,
                }
            }
        }
    }

    fn value_operand(&self, value: &Value) -> Operand {
        match value {
            Value::Const(literal) => Imm(*literal),
            Value::Var(name) => match self.state.location_of(name) {
                Location::InRegister(register) => Reg(register),
                Location::InMemory => Mem(name.clone()),
            },
        }
    }

    /// Copy a value into the given register, unless it is already there.
    fn load_value(&mut self, value: &Value, target: Register, comment: &str) {
        let operand = self.value_operand(value);
        if operand == Reg(target) {
            return;
        }
        self.emit_cmt(Movl, [operand, Reg(target)], format!("<load> {}", comment));
    }

    /// Drop a stale register binding after the variable's slot was written
    /// directly. The slot already holds the new value, so no writeback.
    fn release_stale(&mut self, variable: &str) {
        if let Location::InRegister(register) = self.state.location_of(variable) {
            self.state.free(register);
        }
    }

    fn emit_prologue(&mut self) {
        self.emit_cmt(Pushl, [Reg(Ebp)], "store base pointer");
        self.emit_cmt(Movl, [Reg(Esp), Reg(Ebp)], "establish new frame");
    }

    fn emit_epilogue(&mut self) {
        self.emit_cmt(Movl, [Reg(Ebp), Reg(Esp)], "unwind frame");
        self.emit_cmt(Popl, [Reg(Ebp)], "restore previous base pointer");
        self.text.push(Ret, vec![]);
    }

    fn emit<V: Into<Vec<Operand>>>(&mut self, op: Op, operands: V) -> &mut Self {
        self.text.push(op, operands.into());
        self
    }

    fn emit_cmt<V: Into<Vec<Operand>>, S: Into<String>>(
        &mut self,
        op: Op,
        operands: V,
        comment: S,
    ) -> &mut Self {
        self.text.push_cmt(op, operands.into(), comment);
        self
    }
}

fn jump_for(op: RelOp) -> Op {
    match op {
        RelOp::Lt => Jl,
        RelOp::Le => Jle,
        RelOp::Gt => Jg,
        RelOp::Ge => Jge,
        RelOp::Eq => Je,
        RelOp::Ne => Jne,
    }
}

/// The registers an operand pins for the rest of its instruction.
fn index_registers(operand: &Operand) -> Vec<Register> {
    match operand {
        Indexed { index, .. } => vec![*index],
        Reg(register) => vec![*register],
        _ => vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tac;

    fn translate_source(source: &str) -> String {
        let program = tac::parse(source).expect("program should parse");
        let partition = BlockPartition::partition(&program).expect("partition should succeed");
        let text =
            InstructionTranslator::translate(&program, &partition).expect("translation succeeds");
        text.to_string()
    }

    fn translate_err(source: &str) -> CodegenError {
        let program = tac::parse(source).expect("program should parse");
        let partition = BlockPartition::partition(&program).expect("partition should succeed");
        InstructionTranslator::translate(&program, &partition).unwrap_err()
    }

    macro_rules! assert_emits {
        ($asm:expr, $($line:expr),+ $(,)?) => {
            $(assert!(
                $asm.contains($line),
                "expected {:?} in generated assembly:\n{}",
                $line,
                $asm
            );)+
        };
    }

    fn offset_of(asm: &str, needle: &str) -> usize {
        asm.find(needle)
            .unwrap_or_else(|| panic!("expected {:?} in generated assembly:\n{}", needle, asm))
    }

    #[test]
    fn constant_assignment_stores_through_to_memory() {
        let asm = translate_source("1, =, x, 5\n2, =, y, x\n3, print, y");

        assert_emits!(
            asm,
            "movl    $5, x",
            "movl    x, %eax",
            "movl    %eax, y",
            "pushl   y",
            "pushl   $printf_fmt",
            "call    printf",
            "addl    $8, %esp",
        );
    }

    #[test]
    fn binary_operation_loads_applies_and_binds() {
        let asm = translate_source("1, +, t, a, b\n2, print, t");

        assert_emits!(asm, "movl    a, %eax", "addl    b, %eax", "movl    %eax, t");
    }

    #[test]
    fn five_live_variables_force_exactly_one_spill() {
        let asm = translate_source(
            "1, arg, 1, a\n\
             2, arg, 2, b\n\
             3, arg, 3, c\n\
             4, arg, 4, d\n\
             5, +, e, a, b\n\
             6, print, a\n\
             7, print, b\n\
             8, print, c",
        );

        // d has no next use, so it is the one spilled, into its own slot.
        assert_eq!(1, asm.matches("<spill>").count(), "{}", asm);
        assert_emits!(asm, "movl    %edx, d");
    }

    #[test]
    fn comparison_materializes_a_boolean_with_fresh_labels() {
        let asm = translate_source("1, <, t, a, b");

        assert_emits!(
            asm,
            "movl    a, %eax",
            "cmpl    b, %eax",
            "jl      LT0",
            "movl    $0, %eax",
            "jmp     NLT0",
            "LT0:",
            "movl    $1, %eax",
            "NLT0:",
        );
    }

    #[test]
    fn comparison_labels_stay_unique() {
        let asm = translate_source("1, <, t, a, b\n2, >, u, c, d");

        assert_emits!(asm, "LT0:", "NLT0:", "LT1:", "NLT1:");
    }

    #[test]
    fn conditional_jump_flushes_then_compares_from_memory() {
        let asm = translate_source(
            "1, arg, 1, x\n\
             2, ifgoto, ==, x, 0, 4\n\
             3, print, x\n\
             4, label, done",
        );

        let flush = offset_of(&asm, "movl    %eax, x");
        let compare = offset_of(&asm, "cmpl    $0, %eax");
        let jump = offset_of(&asm, "je      L4");
        assert!(flush < compare && compare < jump, "{}", asm);
    }

    #[test]
    fn goto_flushes_live_registers_before_jumping() {
        let asm = translate_source(
            "1, arg, 1, x\n\
             2, goto, 4\n\
             3, =, y, 1\n\
             4, label, end",
        );

        let flush = offset_of(&asm, "movl    %eax, x");
        let jump = offset_of(&asm, "jmp     L4");
        assert!(flush < jump, "{}", asm);
    }

    #[test]
    fn blocks_are_labelled_by_leader_line() {
        let asm = translate_source(
            "1, ifgoto, <, a, b, 5\n\
             2, =, x, 1\n\
             3, =, y, 2\n\
             4, goto, 5\n\
             5, label, done",
        );

        assert_emits!(asm, "L1:", "L2:", "L5:", "jl      L5", "jmp     L5");
    }

    #[test]
    fn division_reserves_the_register_pair_and_clears_edx() {
        let asm = translate_source("1, =, a, 100\n2, /, q, a, 7\n3, print, q");

        assert_emits!(
            asm,
            "movl    a, %eax",
            "movl    $0, %edx",
            "movl    $7, %ebx",
            "idivl   %ebx",
            "movl    %eax, q",
        );
    }

    #[test]
    fn remainder_lands_in_edx() {
        let asm = translate_source("1, %, r, a, b\n2, print, r");

        assert_emits!(asm, "idivl   b", "movl    %edx, r");
    }

    #[test]
    fn division_by_constant_zero_is_rejected() {
        let err = translate_err("1, /, q, a, 0");

        assert_eq!(
            CodegenError::DivisionByZero {
                line: LineNumber(1)
            },
            err
        );
    }

    #[test]
    fn multiplication_spills_the_pair_regardless_of_next_use() {
        let asm = translate_source(
            "1, arg, 1, x\n\
             2, *, t, x, x\n\
             3, print, x",
        );

        // x is still live, but occupies eax and must leave anyway.
        let spill = offset_of(&asm, "movl    %eax, x");
        let multiply = offset_of(&asm, "imull   x");
        assert!(spill < multiply, "{}", asm);
    }

    #[test]
    fn variable_shift_count_moves_into_cl() {
        let asm = translate_source("1, arg, 1, n\n2, <<, t, x, n\n3, print, t");

        assert_emits!(asm, "movl    %eax, %ecx", "shll    %cl, %ebx");
    }

    #[test]
    fn constant_shift_count_stays_immediate() {
        let asm = translate_source("1, >>, t, x, 3");

        assert_emits!(asm, "movl    x, %eax", "sarl    $3, %eax");
    }

    #[test]
    fn function_binds_incoming_parameters_at_fixed_displacements() {
        let asm = translate_source(
            "1, function, f\n\
             2, arg, 1, p\n\
             3, arg, 2, q\n\
             4, return, p",
        );

        assert_emits!(
            asm,
            "f:",
            "pushl   %ebp",
            "movl    %esp, %ebp",
            "movl    8(%ebp), %eax",
            "movl    12(%ebp), %ebx",
            "movl    p, %eax",
            "movl    %ebp, %esp",
            "popl    %ebp",
            "ret",
        );
    }

    #[test]
    fn pop_consumes_parameter_slots_in_order() {
        let asm = translate_source(
            "1, function, f\n\
             2, pop, p\n\
             3, pop, q\n\
             4, return, q",
        );

        assert_emits!(asm, "movl    8(%ebp), %eax", "movl    12(%ebp), %ebx");
    }

    #[test]
    fn call_pushes_params_then_drops_them() {
        let asm = translate_source(
            "1, param, 3\n\
             2, param, x\n\
             3, call, f, 2, t\n\
             4, print, t",
        );

        let push_const = offset_of(&asm, "pushl   $3");
        let push_var = offset_of(&asm, "pushl   x");
        let call = offset_of(&asm, "call    f");
        let drop = offset_of(&asm, "addl    $8, %esp");
        assert!(push_const < push_var && push_var < call && call < drop, "{}", asm);
        // The result is bound to eax and flushed to t's slot before print.
        assert_emits!(asm, "movl    %eax, t");
    }

    #[test]
    fn element_load_uses_scaled_addressing() {
        let asm = translate_source("1, =, x, arr[i]\n2, print, x");

        assert_emits!(asm, "movl    i, %eax", "movl    arr(,%eax,4), %ebx");
    }

    #[test]
    fn element_store_with_constant_index_folds_the_offset() {
        let asm = translate_source("1, =, arr[2], 7");

        assert_emits!(asm, "movl    $7, arr+8");
    }

    #[test]
    fn element_store_keeps_source_and_index_apart() {
        let asm = translate_source("1, arg, 1, v\n2, =, arr[i], v");

        assert_emits!(asm, "movl    i, %ebx", "movl    %eax, arr(,%ebx,4)");
    }

    #[test]
    fn top_level_code_gets_a_synthesized_main() {
        let asm = translate_source("1, =, x, 1");

        let main = offset_of(&asm, "main:");
        let prologue = offset_of(&asm, "pushl   %ebp");
        assert!(main < prologue, "{}", asm);
        assert_emits!(asm, "movl    $0, %eax", "ret");
    }

    #[test]
    fn exit_calls_the_runtime() {
        let asm = translate_source("1, exit");

        assert_emits!(asm, "pushl   $0", "call    exit");
    }

    #[test]
    fn translation_is_deterministic() {
        let source = "1, arg, 1, a\n\
                      2, arg, 2, b\n\
                      3, <, t, a, b\n\
                      4, ifgoto, ==, t, 1, 6\n\
                      5, print, a\n\
                      6, label, done";

        assert_eq!(translate_source(source), translate_source(source));
    }

    #[test]
    fn re_emission_from_identical_state_is_identical() {
        let program = tac::parse("1, +, t, a, b").expect("program should parse");
        let partition = BlockPartition::partition(&program).expect("partition should succeed");
        let block = partition.blocks[0];
        let live = LivenessTable::analyze(&program, &block);

        let make = || InstructionTranslator {
            program: &program,
            partition: &partition,
            allocator: RegisterAllocator::new(),
            state: DescriptorState::new(),
            labels: LabelGenerator::new(),
            text: Text::new(),
            current_line: LineNumber(0),
            popped_params: 0,
        };
        let mut first = make();
        let mut second = make();
        first
            .translate_instr(&live, Position(0), program.line_at(Position(0)))
            .unwrap();
        second
            .translate_instr(&live, Position(0), program.line_at(Position(0)))
            .unwrap();

        assert_eq!(first.text.to_string(), second.text.to_string());
        assert_eq!(first.state.resident(), second.state.resident());
    }
}
