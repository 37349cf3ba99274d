mod core;
mod common;
mod memory;
mod jit;

pub use crate::core::{
    ARMCondition, CPSR, DataOp, ExitReason, GuestState, Instruction, InstructionType,
    Operand2, ShiftType,
    constants,
    decode::{decode_arm, decode_thumb},
    instructions::add_with_carry,
    operand::{expand_imm, expand_imm_c, shift_c},
};

pub use crate::memory::Mem32;

pub use crate::jit::{
    BlockCache, BlockCompiler, CompiledBlock, CompilerError, Emitter, Jit, JitConfig,
    Subroutine, Translator,
    emitter::{HostReg, Label},
    regalloc::{AllocFlags, RegSupplier, Rejection, Resolved},
    trace::{HostOp, TraceBlock, TraceEmitter},
};

#[cfg(target_arch = "x86_64")]
pub use crate::jit::x64::{CodeGeneratorX64, X64Block};
