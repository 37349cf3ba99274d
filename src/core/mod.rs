//! Core types for the guest ARM processor: flags, state layout and decoded instructions.

pub mod condition;
pub mod decode;
pub mod instructions;
pub mod operand;

use bitflags::bitflags;

pub use condition::ARMCondition;
pub use instructions::{DataOp, Instruction, InstructionType};
pub use operand::{Operand2, ShiftType};

bitflags! {
    #[derive(Default)]
    pub struct CPSR: u32 {
        const N = 1 << 31;
        const Z = 1 << 30;
        const C = 1 << 29;
        const V = 1 << 28;
        const I = 1 << 7;
        const F = 1 << 6;
        const T = 1 << 5;
        const MODE = 0x1F;
    }
}

impl CPSR {
    /// Mask of the condition flags.
    pub const NZCV: u32 = 0xF000_0000;

    /// The condition flags as a 4-bit value (N in bit 3, V in bit 0).
    pub fn nzcv(self) -> u32 {
        self.bits() >> 28
    }

    pub fn carry(self) -> bool {
        self.contains(CPSR::C)
    }
}

pub mod constants {
    pub const SP_REG: usize = 13;
    pub const LINK_REG: usize = 14;
    pub const PC_REG: usize = 15;

    /// Size of an ARM instruction in bytes.
    pub const I_SIZE: u32 = 4;
    /// Size of a Thumb instruction in bytes.
    pub const T_SIZE: u32 = 2;
}

/// Why a compiled block handed control back to the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum ExitReason {
    /// PC holds the next address to run. Keep dispatching.
    Continue = 0,
    /// PC holds an instruction the translator can't handle. Interpret it.
    Interpret = 1,
    /// PC holds an undefined instruction. Raise the exception.
    Undefined = 2,
}

impl ExitReason {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(ExitReason::Continue),
            1 => Some(ExitReason::Interpret),
            2 => Some(ExitReason::Undefined),
            _ => None,
        }
    }
}

/// The canonical guest register storage.
///
/// Compiled blocks receive a pointer to this and read/write fields at fixed
/// offsets, so the layout must stay `repr(C)`.
#[repr(C)]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GuestState {
    pub regs: [u32; 16],
    pub cpsr: u32,
    pub exit: u32,
}

impl GuestState {
    pub const CPSR_OFFSET: i32 = 16 * 4;
    pub const EXIT_OFFSET: i32 = 17 * 4;

    pub const fn reg_offset(reg: usize) -> i32 {
        (reg * 4) as i32
    }

    pub fn new(pc: u32, thumb: bool) -> Self {
        let mut state = Self::default();
        state.regs[constants::PC_REG] = pc;
        state.set_thumb(thumb);
        state
    }

    pub fn read_cpsr(&self) -> CPSR {
        CPSR::from_bits_truncate(self.cpsr)
    }

    pub fn write_cpsr(&mut self, cpsr: CPSR) {
        self.cpsr = cpsr.bits();
    }

    pub fn pc(&self) -> u32 {
        self.regs[constants::PC_REG]
    }

    pub fn is_thumb(&self) -> bool {
        self.read_cpsr().contains(CPSR::T)
    }

    pub fn set_thumb(&mut self, thumb: bool) {
        let mut cpsr = self.read_cpsr();
        cpsr.set(CPSR::T, thumb);
        self.write_cpsr(cpsr);
    }

    pub fn exit_reason(&self) -> Option<ExitReason> {
        ExitReason::from_raw(self.exit)
    }
}
