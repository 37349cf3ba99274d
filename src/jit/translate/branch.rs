use crate::core::constants::{LINK_REG, PC_REG};
use crate::jit::{
    CompilerError,
    emitter::Emitter,
    regalloc::AllocFlags,
};
use super::Translator;

impl<'a, E: Emitter> Translator<'a, E> {
    /// B
    pub fn arm_b(&mut self, offset: i32) -> Result<bool, CompilerError> {
        let target = self.current_pc().wrapping_add(offset as u32);
        Ok(self.emit_direct_branch(target))
    }

    /// BL: LR is the next instruction.
    pub fn arm_bl(&mut self, offset: i32) -> Result<bool, CompilerError> {
        let target = self.current_pc().wrapping_add(offset as u32);
        let lr = self.regs.map(self.emitter, LINK_REG, AllocFlags::DIRTY)?;
        self.emitter.mov_imm32(lr, self.addr.wrapping_add(4));
        Ok(self.emit_direct_branch(target))
    }

    /// BX
    pub fn arm_bx(&mut self, reg: usize) -> Result<bool, CompilerError> {
        self.branch_exchange(reg)
    }

    /// BX in Thumb. BX PC switches to ARM.
    pub fn thumb16_bx(&mut self, reg: usize) -> Result<bool, CompilerError> {
        self.branch_exchange(reg)
    }

    /// B, conditional or not.
    pub fn thumb16_b(&mut self, offset: i32) -> Result<bool, CompilerError> {
        let target = self.current_pc().wrapping_add(offset as u32);
        Ok(self.emit_direct_branch(target))
    }

    fn branch_exchange(&mut self, reg: usize) -> Result<bool, CompilerError> {
        debug_assert!(reg <= PC_REG);
        let src = self.read_reg(reg)?;
        Ok(self.emit_reg_link_exchange(src))
    }
}
