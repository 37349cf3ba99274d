//! Translation of single guest instructions.
//!
//! One handler per opcode. Each handler returns Ok(true) if control falls
//! through to the next instruction, and Ok(false) if it was redirected (branch,
//! PC write or undefined trap).

mod branch;
mod data_processing;
mod thumb;

use crate::core::{
    DataOp, ExitReason, Instruction, InstructionType,
    constants::{I_SIZE, T_SIZE},
};
use super::{
    CompilerError,
    emitter::{Emitter, HostReg},
    regalloc::{RegSupplier, Resolved},
};

/// Translates instructions of one block.
///
/// Holds the register supplier and emitter exclusively for the block's lifetime.
pub struct Translator<'a, E: Emitter> {
    regs:       &'a mut RegSupplier,
    emitter:    &'a mut E,
    /// Address of the instruction being translated.
    addr:       u32,
    thumb:      bool,
}

impl<'a, E: Emitter> Translator<'a, E> {
    pub fn new(regs: &'a mut RegSupplier, emitter: &'a mut E, thumb: bool) -> Self {
        Self {
            regs,
            emitter,
            addr: 0,
            thumb,
        }
    }

    /// The value of PC as read by the current instruction.
    pub fn current_pc(&self) -> u32 {
        let pipeline = if self.thumb {T_SIZE * 2} else {I_SIZE * 2};
        self.addr.wrapping_add(pipeline)
    }

    /// Translate the instruction at addr.
    pub fn translate(&mut self, addr: u32, instr: &Instruction) -> Result<bool, CompilerError> {
        self.addr = addr;
        self.regs.begin_instruction();
        if instr.cond.is_always() {
            return self.dispatch(&instr.instr);
        }

        self.validate(&instr.instr)?;
        let skip = self.emitter.new_label();
        self.regs.flush(self.emitter);
        self.emitter.skip_unless(instr.cond, skip);
        self.dispatch(&instr.instr)?;
        self.regs.flush(self.emitter);
        self.emitter.bind_label(skip);
        // Not taken: continue with the next instruction.
        Ok(true)
    }

    /// End the block, continuing at pc.
    pub fn finish_block(&mut self, pc: u32, reason: ExitReason) {
        self.regs.flush(self.emitter);
        self.emitter.exit_to(pc, reason);
    }

    fn dispatch(&mut self, instr: &InstructionType) -> Result<bool, CompilerError> {
        use InstructionType::*;
        match *instr {
            DataProcessing{op, set_flags, rd, rn, op2} => match op {
                DataOp::MOV => self.arm_mov(set_flags, rd, op2),
                DataOp::MVN => self.arm_mvn(set_flags, rd, op2),
                DataOp::ADD => self.arm_add(set_flags, rd, rn, op2),
                DataOp::SUB => self.arm_sub(set_flags, rd, rn, op2),
                DataOp::RSB => self.arm_rsb(set_flags, rd, rn, op2),
                DataOp::AND => self.arm_and(set_flags, rd, rn, op2),
                DataOp::EOR => self.arm_eor(set_flags, rd, rn, op2),
                DataOp::ORR => self.arm_orr(set_flags, rd, rn, op2),
                DataOp::BIC => self.arm_bic(set_flags, rd, rn, op2),
                DataOp::CMP => self.arm_cmp(rn, op2),
                DataOp::CMN => self.arm_cmn(rn, op2),
                DataOp::TST => self.arm_tst(rn, op2),
                DataOp::TEQ => self.arm_teq(rn, op2),
            },
            B{offset} => self.arm_b(offset),
            BL{offset} => self.arm_bl(offset),
            BX{reg} => self.arm_bx(reg),

            TMOVImm{rd, imm8} => self.thumb16_mov_imm(rd, imm8),
            TShiftImm{rd, op2} => self.thumb16_shift_imm(rd, op2),
            TADDReg{rd, rn, rm} => self.thumb16_add_reg(rd, rn, rm),
            TSUBReg{rd, rn, rm} => self.thumb16_sub_reg(rd, rn, rm),
            TADDImm3{rd, rn, imm3} => self.thumb16_add_imm_t1(rd, rn, imm3),
            TSUBImm3{rd, rn, imm3} => self.thumb16_sub_imm_t1(rd, rn, imm3),
            TADDImm8{rdn, imm8} => self.thumb16_add_imm_t2(rdn, imm8),
            TSUBImm8{rdn, imm8} => self.thumb16_sub_imm_t2(rdn, imm8),
            TCMPImm{rn, imm8} => self.thumb16_cmp_imm(rn, imm8),
            TADDSPRel{rd, imm8} => self.thumb16_add_sp_t1(rd, imm8),
            TADDSP{imm7} => self.thumb16_add_sp_t2(imm7),
            TSUBSP{imm7} => self.thumb16_sub_sp(imm7),
            TBX{reg} => self.thumb16_bx(reg),
            TB{offset} => self.thumb16_b(offset),
        }
    }

    /// Checks that must pass before anything is emitted for the instruction.
    fn validate(&self, instr: &InstructionType) -> Result<(), CompilerError> {
        match *instr {
            InstructionType::DataProcessing{op, set_flags, rn, op2, ..} => self.validate_data_processing(op, set_flags, rn, &op2),
            _ => Ok(()),
        }
    }

    /// The host register holding a guest register's value.
    /// PC is materialised into the scratch register.
    fn read_reg(&mut self, reg: usize) -> Result<HostReg, CompilerError> {
        let pc = self.current_pc();
        match self.regs.resolve_read(self.emitter, reg, pc)? {
            Resolved::Mapped(host) => Ok(host),
            Resolved::Constant(value) => {
                let scratch = self.emitter.scratch_reg();
                self.emitter.mov_imm32(scratch, value);
                Ok(scratch)
            },
            Resolved::Rejected(never) => match never {},
        }
    }

    /// The host register to write a guest register's value to.
    /// PC is written to the scratch register, to be picked up by `emit_reg_link_exchange`.
    fn write_reg(&mut self, reg: usize) -> Result<HostReg, CompilerError> {
        match self.regs.resolve_write(self.emitter, reg)? {
            Resolved::Mapped(host) => Ok(host),
            Resolved::Constant(_) | Resolved::Rejected(_) => Ok(self.emitter.scratch_reg()),
        }
    }

    /// The guest flags were changed by the last emitted op.
    fn cpsr_nzcv_changed(&mut self) {
        self.emitter.update_nzcv();
    }

    /// Branch to the address in src, switching to Thumb if bit 0 is set.
    pub fn emit_reg_link_exchange(&mut self, src: HostReg) -> bool {
        self.regs.flush(self.emitter);
        self.emitter.exit_exchange(src);
        false
    }

    /// Branch to a known address, staying in the current instruction set.
    pub fn emit_direct_branch(&mut self, target: u32) -> bool {
        self.regs.flush(self.emitter);
        self.emitter.exit_to(target, ExitReason::Continue);
        false
    }

    /// Raise an undefined instruction exception at the current instruction.
    pub fn emit_undefined_instruction_handler(&mut self) -> bool {
        self.regs.flush(self.emitter);
        self.emitter.raise_undefined(self.addr);
        false
    }
}
