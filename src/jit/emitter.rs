//! Host code emission.
//!
//! Translators never produce machine code directly: they drive an `Emitter`.
//! The x86-64 backend assembles real code, the trace backend records the ops
//! and can replay them, which keeps translation testable on any host.

use std::fmt;

use crate::core::{ARMCondition, DataOp, ExitReason, Operand2};
use super::{CompiledBlock, CompilerError};

/// A host register, numbered by the backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HostReg(pub u8);

impl fmt::Display for HostReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}", self.0)
    }
}

/// A position in the emitted code that can be jumped to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Label(pub usize);

/// Primitives needed to translate a block.
///
/// Data ops read `src` and `op2` fully before writing `dst`, so any of them may alias.
/// A flag-setting op leaves its flags pending: `update_nzcv` must follow it directly
/// to commit them to the guest CPSR.
pub trait Emitter {
    type Block: CompiledBlock;

    fn new() -> Result<Self, CompilerError> where Self: Sized;

    /// Finalise the code into a runnable block.
    fn finish(self) -> Result<Self::Block, CompilerError>;

    /// Host registers the register supplier may hand out.
    fn allocatable_regs(&self) -> Vec<HostReg>;

    /// A fixed register never handed out by the supplier.
    /// Used for PC destinations and materialised PC values.
    fn scratch_reg(&self) -> HostReg;

    fn load_guest_reg(&mut self, dst: HostReg, reg: usize);
    fn store_guest_reg(&mut self, reg: usize, src: HostReg);

    /// dst = op(src, op2). Test ops pass no dst, MOV and MVN pass no src.
    fn data_op(&mut self, op: DataOp, set_flags: bool, dst: Option<HostReg>, src: Option<HostReg>, op2: &Operand2<HostReg>);

    /// Commit the flags of the last flag-setting op.
    fn update_nzcv(&mut self);

    /// MOVI2R
    fn mov_imm32(&mut self, dst: HostReg, value: u32);
    /// ADDI2R. Does not set flags.
    fn add_imm32(&mut self, dst: HostReg, src: HostReg, value: u32);

    /// SUBI2R. Does not set flags.
    fn sub_imm32(&mut self, dst: HostReg, src: HostReg, value: u32) {
        self.add_imm32(dst, src, value.wrapping_neg());
    }

    fn new_label(&mut self) -> Label;
    fn bind_label(&mut self, label: Label);

    /// Jump to `label` if `cond` fails against the guest CPSR.
    fn skip_unless(&mut self, cond: ARMCondition, label: Label);

    /// Write PC and the exit reason, then leave the block.
    fn exit_to(&mut self, pc: u32, reason: ExitReason);

    /// Interworking branch: bit 0 of `src` selects Thumb, then leave the block.
    fn exit_exchange(&mut self, src: HostReg);

    /// Leave the block with `addr` flagged as undefined.
    fn raise_undefined(&mut self, addr: u32) {
        self.exit_to(addr, ExitReason::Undefined);
    }

    fn mov(&mut self, dst: HostReg, op2: &Operand2<HostReg>) {
        self.data_op(DataOp::MOV, false, Some(dst), None, op2);
    }
    fn movs(&mut self, dst: HostReg, op2: &Operand2<HostReg>) {
        self.data_op(DataOp::MOV, true, Some(dst), None, op2);
    }
    fn mvn(&mut self, dst: HostReg, op2: &Operand2<HostReg>) {
        self.data_op(DataOp::MVN, false, Some(dst), None, op2);
    }
    fn mvns(&mut self, dst: HostReg, op2: &Operand2<HostReg>) {
        self.data_op(DataOp::MVN, true, Some(dst), None, op2);
    }
    fn add(&mut self, dst: HostReg, src: HostReg, op2: &Operand2<HostReg>) {
        self.data_op(DataOp::ADD, false, Some(dst), Some(src), op2);
    }
    fn adds(&mut self, dst: HostReg, src: HostReg, op2: &Operand2<HostReg>) {
        self.data_op(DataOp::ADD, true, Some(dst), Some(src), op2);
    }
    fn sub(&mut self, dst: HostReg, src: HostReg, op2: &Operand2<HostReg>) {
        self.data_op(DataOp::SUB, false, Some(dst), Some(src), op2);
    }
    fn subs(&mut self, dst: HostReg, src: HostReg, op2: &Operand2<HostReg>) {
        self.data_op(DataOp::SUB, true, Some(dst), Some(src), op2);
    }
    fn rsb(&mut self, dst: HostReg, src: HostReg, op2: &Operand2<HostReg>) {
        self.data_op(DataOp::RSB, false, Some(dst), Some(src), op2);
    }
    fn rsbs(&mut self, dst: HostReg, src: HostReg, op2: &Operand2<HostReg>) {
        self.data_op(DataOp::RSB, true, Some(dst), Some(src), op2);
    }
    fn and(&mut self, dst: HostReg, src: HostReg, op2: &Operand2<HostReg>) {
        self.data_op(DataOp::AND, false, Some(dst), Some(src), op2);
    }
    fn ands(&mut self, dst: HostReg, src: HostReg, op2: &Operand2<HostReg>) {
        self.data_op(DataOp::AND, true, Some(dst), Some(src), op2);
    }
    fn eor(&mut self, dst: HostReg, src: HostReg, op2: &Operand2<HostReg>) {
        self.data_op(DataOp::EOR, false, Some(dst), Some(src), op2);
    }
    fn eors(&mut self, dst: HostReg, src: HostReg, op2: &Operand2<HostReg>) {
        self.data_op(DataOp::EOR, true, Some(dst), Some(src), op2);
    }
    fn orr(&mut self, dst: HostReg, src: HostReg, op2: &Operand2<HostReg>) {
        self.data_op(DataOp::ORR, false, Some(dst), Some(src), op2);
    }
    fn orrs(&mut self, dst: HostReg, src: HostReg, op2: &Operand2<HostReg>) {
        self.data_op(DataOp::ORR, true, Some(dst), Some(src), op2);
    }
    fn bic(&mut self, dst: HostReg, src: HostReg, op2: &Operand2<HostReg>) {
        self.data_op(DataOp::BIC, false, Some(dst), Some(src), op2);
    }
    fn bics(&mut self, dst: HostReg, src: HostReg, op2: &Operand2<HostReg>) {
        self.data_op(DataOp::BIC, true, Some(dst), Some(src), op2);
    }
    fn cmp(&mut self, src: HostReg, op2: &Operand2<HostReg>) {
        self.data_op(DataOp::CMP, true, None, Some(src), op2);
    }
    fn cmn(&mut self, src: HostReg, op2: &Operand2<HostReg>) {
        self.data_op(DataOp::CMN, true, None, Some(src), op2);
    }
    fn tst(&mut self, src: HostReg, op2: &Operand2<HostReg>) {
        self.data_op(DataOp::TST, true, None, Some(src), op2);
    }
    fn teq(&mut self, src: HostReg, op2: &Operand2<HostReg>) {
        self.data_op(DataOp::TEQ, true, None, Some(src), op2);
    }
}
