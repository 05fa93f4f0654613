//! On-the-fly register allocation.
//!
//! Allocation is greedy: a variable keeps its register while it has one, a
//! free register is handed out when available, and otherwise the resident
//! variable whose next use lies farthest in the future is spilled to its
//! memory slot. A variable with no further use in the block spills first.

use log::debug;

use crate::listing::Position;

use super::{
    descriptors::{DescriptorState, Location},
    liveness::{Liveness, LivenessTable},
    x86::Register,
};

/// The outcome of a register request. When a spill was needed, the caller
/// must immediately emit the store of `spilled` from `register` to its
/// memory slot; the descriptors already record the variable as in memory.
#[derive(Debug, PartialEq, Eq)]
pub struct Claim {
    pub register: Register,
    pub spilled: Option<String>,
}

/// Decides which physical register holds a requested variable.
pub struct RegisterAllocator {
    registers: Vec<Register>,
}

impl RegisterAllocator {
    pub fn new() -> Self {
        Self {
            registers: Register::allocatable().to_vec(),
        }
    }

    /// Find a register for `variable` at `position`. Returns the register
    /// the variable already occupies when there is one; otherwise a free
    /// register, or the register freed by spilling the resident variable
    /// with the farthest next use. Ties break towards the lowest register
    /// index, keeping allocation deterministic.
    pub fn get_register(
        &self,
        variable: &str,
        position: Position,
        state: &mut DescriptorState,
        liveness: &LivenessTable,
    ) -> Claim {
        self.get_register_excluding(variable, position, state, liveness, &[])
    }

    /// Like [`Self::get_register`], but never returns a register in
    /// `exclude`. Used when an instruction has already pinned registers
    /// (shift counts, the division pair) that must not be handed out again.
    pub fn get_register_excluding(
        &self,
        variable: &str,
        position: Position,
        state: &mut DescriptorState,
        liveness: &LivenessTable,
        exclude: &[Register],
    ) -> Claim {
        if let Location::InRegister(register) = state.location_of(variable) {
            debug_assert!(!exclude.contains(&register));
            return Claim {
                register,
                spilled: None,
            };
        }

        self.free_or_spill(position, state, liveness, exclude)
    }

    /// Acquire a register for a transient value that is not bound to any
    /// variable, such as an index calculation.
    pub fn get_scratch(
        &self,
        position: Position,
        state: &mut DescriptorState,
        liveness: &LivenessTable,
        exclude: &[Register],
    ) -> Claim {
        self.free_or_spill(position, state, liveness, exclude)
    }

    fn free_or_spill(
        &self,
        position: Position,
        state: &mut DescriptorState,
        liveness: &LivenessTable,
        exclude: &[Register],
    ) -> Claim {
        let candidates = || {
            self.registers
                .iter()
                .copied()
                .filter(|reg| !exclude.contains(reg))
        };

        if let Some(register) = candidates().find(|&reg| state.contents_of(reg).is_none()) {
            return Claim {
                register,
                spilled: None,
            };
        }

        // All candidates are occupied; spill the occupant whose next use is
        // farthest away, treating no next use as infinitely far.
        let mut best: Option<(Register, usize)> = None;
        for register in candidates() {
            let occupant = state
                .contents_of(register)
                .expect("occupied register must name its occupant");
            let distance = match liveness.entry(position, occupant) {
                Liveness::Dead => usize::MAX,
                Liveness::Live(next) => next.0,
            };
            if best.map_or(true, |(_, farthest)| distance > farthest) {
                best = Some((register, distance));
            }
        }

        let (register, _) =
            best.expect("the register set is non-empty, so a spill victim must exist");
        let spilled = state
            .contents_of(register)
            .expect("spill victim must hold a variable")
            .to_string();
        debug!("spilling {} from {}", spilled, register);
        state.free(register);

        Claim {
            register,
            spilled: Some(spilled),
        }
    }
}
