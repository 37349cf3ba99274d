use crate::core::{
    Operand2,
    constants::SP_REG,
};
use crate::jit::{
    CompilerError,
    emitter::Emitter,
    regalloc::AllocFlags,
};
use super::Translator;

// 16-bit Thumb data processing always sets flags, except for the SP forms.
impl<'a, E: Emitter> Translator<'a, E> {
    /// MOVS Rd, #imm8
    pub fn thumb16_mov_imm(&mut self, rd: usize, imm8: u8) -> Result<bool, CompilerError> {
        let dst = self.write_reg(rd)?;
        self.emitter.movs(dst, &Operand2::imm(imm8, 0));
        self.cpsr_nzcv_changed();
        Ok(true)
    }

    /// LSLS/LSRS/ASRS Rd, Rm, #imm5
    pub fn thumb16_shift_imm(&mut self, rd: usize, op2: Operand2<usize>) -> Result<bool, CompilerError> {
        let op2 = self.resolve_operand2(op2)?;
        let dst = self.write_reg(rd)?;
        self.emitter.movs(dst, &op2);
        self.cpsr_nzcv_changed();
        Ok(true)
    }

    /// ADDS Rd, Rn, Rm
    pub fn thumb16_add_reg(&mut self, rd: usize, rn: usize, rm: usize) -> Result<bool, CompilerError> {
        let src = self.read_reg(rn)?;
        let op2 = Operand2::reg(self.read_reg(rm)?);
        let dst = self.write_reg(rd)?;
        self.emitter.adds(dst, src, &op2);
        self.cpsr_nzcv_changed();
        Ok(true)
    }

    /// SUBS Rd, Rn, Rm
    pub fn thumb16_sub_reg(&mut self, rd: usize, rn: usize, rm: usize) -> Result<bool, CompilerError> {
        let src = self.read_reg(rn)?;
        let op2 = Operand2::reg(self.read_reg(rm)?);
        let dst = self.write_reg(rd)?;
        self.emitter.subs(dst, src, &op2);
        self.cpsr_nzcv_changed();
        Ok(true)
    }

    /// ADDS Rd, Rn, #imm3
    pub fn thumb16_add_imm_t1(&mut self, rd: usize, rn: usize, imm3: u8) -> Result<bool, CompilerError> {
        let src = self.read_reg(rn)?;
        let dst = self.write_reg(rd)?;
        self.emitter.adds(dst, src, &Operand2::imm(imm3, 0));
        self.cpsr_nzcv_changed();
        Ok(true)
    }

    /// SUBS Rd, Rn, #imm3
    pub fn thumb16_sub_imm_t1(&mut self, rd: usize, rn: usize, imm3: u8) -> Result<bool, CompilerError> {
        let src = self.read_reg(rn)?;
        let dst = self.write_reg(rd)?;
        self.emitter.subs(dst, src, &Operand2::imm(imm3, 0));
        self.cpsr_nzcv_changed();
        Ok(true)
    }

    /// ADDS Rdn, #imm8
    pub fn thumb16_add_imm_t2(&mut self, rdn: usize, imm8: u8) -> Result<bool, CompilerError> {
        let reg = self.regs.map(self.emitter, rdn, AllocFlags::DIRTY)?;
        self.emitter.adds(reg, reg, &Operand2::imm(imm8, 0));
        self.cpsr_nzcv_changed();
        Ok(true)
    }

    /// SUBS Rdn, #imm8
    pub fn thumb16_sub_imm_t2(&mut self, rdn: usize, imm8: u8) -> Result<bool, CompilerError> {
        let reg = self.regs.map(self.emitter, rdn, AllocFlags::DIRTY)?;
        self.emitter.subs(reg, reg, &Operand2::imm(imm8, 0));
        self.cpsr_nzcv_changed();
        Ok(true)
    }

    /// CMP Rn, #imm8
    pub fn thumb16_cmp_imm(&mut self, rn: usize, imm8: u8) -> Result<bool, CompilerError> {
        let src = self.read_reg(rn)?;
        self.emitter.cmp(src, &Operand2::imm(imm8, 0));
        self.cpsr_nzcv_changed();
        Ok(true)
    }

    /// ADD Rd, SP, #imm8 << 2
    pub fn thumb16_add_sp_t1(&mut self, rd: usize, imm8: u8) -> Result<bool, CompilerError> {
        let sp = self.regs.map(self.emitter, SP_REG, AllocFlags::empty())?;
        let dst = self.write_reg(rd)?;
        self.emitter.add_imm32(dst, sp, (imm8 as u32) << 2);
        Ok(true)
    }

    /// ADD SP, SP, #imm7 << 2
    pub fn thumb16_add_sp_t2(&mut self, imm7: u8) -> Result<bool, CompilerError> {
        let sp = self.regs.map(self.emitter, SP_REG, AllocFlags::DIRTY)?;
        self.emitter.add_imm32(sp, sp, (imm7 as u32) << 2);
        Ok(true)
    }

    /// SUB SP, SP, #imm7 << 2
    pub fn thumb16_sub_sp(&mut self, imm7: u8) -> Result<bool, CompilerError> {
        let sp = self.regs.map(self.emitter, SP_REG, AllocFlags::DIRTY)?;
        self.emitter.sub_imm32(sp, sp, (imm7 as u32) << 2);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use crate::core::{
        CPSR, ExitReason, GuestState,
        decode::decode_thumb,
    };
    use crate::jit::{
        CompiledBlock,
        emitter::Emitter,
        regalloc::RegSupplier,
        trace::{TraceBlock, TraceEmitter},
    };
    use super::Translator;

    /// Translate Thumb code at 0, ending the block after it.
    fn translate(code: &[u16]) -> TraceBlock {
        let mut emitter = TraceEmitter::new().unwrap();
        let mut regs = RegSupplier::new(emitter.allocatable_regs());
        {
            let mut translator = Translator::new(&mut regs, &mut emitter, true);
            let mut addr = 0;
            for &i in code {
                let instr = decode_thumb(i).unwrap();
                assert_eq!(translator.translate(addr, &instr), Ok(true));
                addr += 2;
            }
            translator.finish_block(addr, ExitReason::Continue);
        }
        emitter.finish().unwrap()
    }

    #[test]
    fn add_imm3_sets_flags() {
        // ADDS R1, R2, #3
        let block = translate(&[0x1CD1]);
        let mut state = GuestState::new(0, true);
        state.regs[2] = 0xFFFF_FFFD;
        block.run(&mut state);
        assert_eq!(state.regs[1], 0);
        assert_eq!(state.read_cpsr(), CPSR::Z | CPSR::C | CPSR::T);
    }

    #[test]
    fn sub_imm3_sets_flags() {
        // SUBS R0, R0, #7
        let block = translate(&[0x1FC0]);
        let mut state = GuestState::new(0, true);
        state.regs[0] = 5;
        block.run(&mut state);
        assert_eq!(state.regs[0], 0xFFFF_FFFE);
        assert_eq!(state.read_cpsr(), CPSR::N | CPSR::T);
    }

    #[test]
    fn mov_cmp_add_sub_imm8() {
        // MOVS R3, #10; ADDS R3, #0x20; SUBS R3, #2; CMP R3, #40
        let block = translate(&[0x230A, 0x3320, 0x3B02, 0x2B28]);
        let mut state = GuestState::new(0, true);
        block.run(&mut state);
        assert_eq!(state.regs[3], 40);
        assert_eq!(state.read_cpsr(), CPSR::Z | CPSR::C | CPSR::T);
        assert_eq!(state.pc(), 8);
    }

    #[test]
    fn shift_and_reg_ops() {
        // LSLS R0, R1, #4; ADDS R2, R0, R1; SUBS R3, R2, R1
        let block = translate(&[0x0108, 0x1842, 0x1A53]);
        let mut state = GuestState::new(0, true);
        state.regs[1] = 0x1000_0001;
        block.run(&mut state);
        assert_eq!(state.regs[0], 0x10);
        assert_eq!(state.regs[2], 0x1000_0011);
        assert_eq!(state.regs[3], 0x10);
        // SUBS without a borrow sets C.
        assert!(state.read_cpsr().carry());
    }

    #[test]
    fn add_sp_imm7() {
        // ADD SP, #12
        let block = translate(&[0xB003]);
        let mut state = GuestState::new(0, true);
        state.regs[13] = 0x8000;
        state.write_cpsr(CPSR::T | CPSR::N);
        block.run(&mut state);
        assert_eq!(state.regs[13], 0x800C);
        // No flags.
        assert_eq!(state.read_cpsr(), CPSR::T | CPSR::N);
    }

    #[test]
    fn sp_forms() {
        // SUB SP, #0x1FC; ADD R1, SP, #8
        let block = translate(&[0xB0FF, 0xA902]);
        let mut state = GuestState::new(0, true);
        state.regs[13] = 0x8000;
        block.run(&mut state);
        assert_eq!(state.regs[13], 0x8000 - 0x1FC);
        assert_eq!(state.regs[1], 0x8000 - 0x1FC + 8);
    }
}
