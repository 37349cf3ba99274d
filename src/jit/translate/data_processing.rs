use tracing::{error, trace};

use crate::core::{
    CPSR, DataOp, Operand2, ShiftType,
    constants::PC_REG,
    operand::shift_c,
};
use crate::jit::{
    CompilerError,
    emitter::{Emitter, HostReg},
};
use super::Translator;

/// Does the operand read PC?
fn uses_pc(op2: &Operand2<usize>) -> bool {
    op2.registers().any(|r| r == PC_REG)
}

/// Immediate forms with a PC first operand are folded at translation time.
fn folds_pc(op: DataOp, rn: usize, op2: &Operand2<usize>) -> bool {
    matches!(op2, Operand2::Imm{..}) && op.writes_dest() && op.reads_first_operand() && rn == PC_REG
}

/// MOV and MVN from PC with a constant shift are folded at translation time.
fn folds_pc_source(op: DataOp, op2: &Operand2<usize>) -> bool {
    !op.reads_first_operand() && match *op2 {
        Operand2::Reg{reg, shift, ..} => reg == PC_REG && shift != ShiftType::RRX,
        _ => false,
    }
}

impl<'a, E: Emitter> Translator<'a, E> {
    pub fn arm_mov(&mut self, set_flags: bool, rd: usize, op2: Operand2<usize>) -> Result<bool, CompilerError> {
        self.arm_move(DataOp::MOV, set_flags, rd, op2)
    }

    pub fn arm_mvn(&mut self, set_flags: bool, rd: usize, op2: Operand2<usize>) -> Result<bool, CompilerError> {
        self.arm_move(DataOp::MVN, set_flags, rd, op2)
    }

    pub fn arm_add(&mut self, set_flags: bool, rd: usize, rn: usize, op2: Operand2<usize>) -> Result<bool, CompilerError> {
        self.data_processing(DataOp::ADD, set_flags, rd, rn, op2)
    }

    pub fn arm_sub(&mut self, set_flags: bool, rd: usize, rn: usize, op2: Operand2<usize>) -> Result<bool, CompilerError> {
        self.data_processing(DataOp::SUB, set_flags, rd, rn, op2)
    }

    pub fn arm_rsb(&mut self, set_flags: bool, rd: usize, rn: usize, op2: Operand2<usize>) -> Result<bool, CompilerError> {
        self.data_processing(DataOp::RSB, set_flags, rd, rn, op2)
    }

    pub fn arm_and(&mut self, set_flags: bool, rd: usize, rn: usize, op2: Operand2<usize>) -> Result<bool, CompilerError> {
        self.data_processing(DataOp::AND, set_flags, rd, rn, op2)
    }

    pub fn arm_eor(&mut self, set_flags: bool, rd: usize, rn: usize, op2: Operand2<usize>) -> Result<bool, CompilerError> {
        self.data_processing(DataOp::EOR, set_flags, rd, rn, op2)
    }

    pub fn arm_orr(&mut self, set_flags: bool, rd: usize, rn: usize, op2: Operand2<usize>) -> Result<bool, CompilerError> {
        self.data_processing(DataOp::ORR, set_flags, rd, rn, op2)
    }

    pub fn arm_bic(&mut self, set_flags: bool, rd: usize, rn: usize, op2: Operand2<usize>) -> Result<bool, CompilerError> {
        self.data_processing(DataOp::BIC, set_flags, rd, rn, op2)
    }

    /// CMP always sets flags and never writes a register.
    pub fn arm_cmp(&mut self, rn: usize, op2: Operand2<usize>) -> Result<bool, CompilerError> {
        self.data_processing(DataOp::CMP, true, 0, rn, op2)
    }

    pub fn arm_cmn(&mut self, rn: usize, op2: Operand2<usize>) -> Result<bool, CompilerError> {
        self.data_processing(DataOp::CMN, true, 0, rn, op2)
    }

    pub fn arm_tst(&mut self, rn: usize, op2: Operand2<usize>) -> Result<bool, CompilerError> {
        self.data_processing(DataOp::TST, true, 0, rn, op2)
    }

    pub fn arm_teq(&mut self, rn: usize, op2: Operand2<usize>) -> Result<bool, CompilerError> {
        self.data_processing(DataOp::TEQ, true, 0, rn, op2)
    }

    pub(super) fn validate_data_processing(&self, op: DataOp, set_flags: bool, rn: usize, op2: &Operand2<usize>) -> Result<(), CompilerError> {
        if set_flags && (folds_pc(op, rn, op2) || folds_pc_source(op, op2)) {
            Err(CompilerError::FlagSetWithPcOperand{addr: self.addr})
        } else {
            Ok(())
        }
    }

    /// MOV and MVN.
    fn arm_move(&mut self, op: DataOp, set_flags: bool, rd: usize, op2: Operand2<usize>) -> Result<bool, CompilerError> {
        self.validate_data_processing(op, set_flags, 0, &op2)?;

        match op2 {
            Operand2::Imm{..} if rd == PC_REG => {
                trace!("{:08X}: {} immediate to PC is undefined", self.addr, op);
                return Ok(self.emit_undefined_instruction_handler());
            },
            Operand2::Reg{shift, amount, ..} if folds_pc_source(op, &op2) => {
                let (value, _) = shift_c(self.current_pc(), shift, amount, false);
                let value = if op == DataOp::MVN {!value} else {value};
                return self.write_constant(rd, value);
            },
            Operand2::Reg{reg, shift: ShiftType::LSL, amount: 0} if rd == PC_REG && !set_flags && op == DataOp::MOV => {
                // Exchange directly from the source.
                let src = self.read_reg(reg)?;
                return Ok(self.emit_reg_link_exchange(src));
            },
            _ => {},
        }

        self.data_processing(op, set_flags, rd, 0, op2)
    }

    /// Shared path for all data processing ops.
    fn data_processing(&mut self, op: DataOp, set_flags: bool, rd: usize, rn: usize, op2: Operand2<usize>) -> Result<bool, CompilerError> {
        self.validate_data_processing(op, set_flags, rn, &op2)?;
        let writes_pc = op.writes_dest() && rd == PC_REG;

        if writes_pc && set_flags {
            // Exception return. Needs banked registers.
            trace!("{:08X}: {}S to PC is undefined", self.addr, op);
            return Ok(self.emit_undefined_instruction_handler());
        }

        if folds_pc(op, rn, &op2) {
            let (imm, _) = op2.evaluate(|_| 0, false);
            let (value, _) = op.compute(self.current_pc(), imm, false, CPSR::default());
            return self.write_constant(rd, value);
        }

        let reads_pc = (op.reads_first_operand() && rn == PC_REG) || uses_pc(&op2);
        if op2.is_reg_shift_reg() && (reads_pc || writes_pc) {
            error!("{:08X}: register-shifted {} using PC is UNPREDICTABLE", self.addr, op);
        } else if reads_pc && !matches!(op2, Operand2::Imm{..}) {
            error!("Unsupported non-imm {} op that use PC! ({:08X})", op, self.addr);
        }

        let src = if op.reads_first_operand() {
            Some(self.read_reg(rn)?)
        } else {
            None
        };
        let op2 = self.resolve_operand2(op2)?;
        let dst = if op.writes_dest() {
            Some(self.write_reg(rd)?)
        } else {
            None
        };

        self.emitter.data_op(op, set_flags, dst, src, &op2);
        if set_flags {
            self.cpsr_nzcv_changed();
        }

        match dst {
            Some(dst) if writes_pc => Ok(self.emit_reg_link_exchange(dst)),
            _ => Ok(true),
        }
    }

    /// Write a value known at translation time.
    fn write_constant(&mut self, rd: usize, value: u32) -> Result<bool, CompilerError> {
        let dst = self.write_reg(rd)?;
        self.emitter.mov_imm32(dst, value);
        if rd == PC_REG {
            Ok(self.emit_reg_link_exchange(dst))
        } else {
            Ok(true)
        }
    }

    pub(super) fn resolve_operand2(&mut self, op2: Operand2<usize>) -> Result<Operand2<HostReg>, CompilerError> {
        Ok(match op2 {
            Operand2::Imm{imm8, rotate} => Operand2::Imm{imm8, rotate},
            Operand2::Reg{reg, shift, amount} => Operand2::Reg{
                reg: self.read_reg(reg)?,
                shift,
                amount,
            },
            Operand2::RegShiftReg{reg, shift, amount_reg} => Operand2::RegShiftReg{
                reg: self.read_reg(reg)?,
                shift,
                amount_reg: self.read_reg(amount_reg)?,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{GuestState, ExitReason, Instruction, InstructionType, ARMCondition};
    use crate::jit::{
        CompiledBlock,
        regalloc::RegSupplier,
        trace::{HostOp, TraceEmitter, TraceBlock},
    };

    fn dp(op: DataOp, set_flags: bool, rd: usize, rn: usize, op2: Operand2<usize>) -> Instruction {
        Instruction::always(InstructionType::DataProcessing{op, set_flags, rd, rn, op2})
    }

    /// Translate a single ARM instruction at addr, ending the block after it.
    fn translate(addr: u32, instr: Instruction) -> (Result<bool, CompilerError>, TraceBlock) {
        let mut emitter = TraceEmitter::new().unwrap();
        let mut regs = RegSupplier::new(emitter.allocatable_regs());
        let outcome = {
            let mut translator = Translator::new(&mut regs, &mut emitter, false);
            let outcome = translator.translate(addr, &instr);
            if let Ok(true) = outcome {
                translator.finish_block(addr + 4, ExitReason::Continue);
            }
            outcome
        };
        (outcome, emitter.finish().unwrap())
    }

    fn run(block: &TraceBlock, state: &mut GuestState) -> ExitReason {
        block.run(state)
    }

    #[test]
    fn add_imm() {
        let (outcome, block) = translate(0, dp(DataOp::ADD, false, 0, 1, Operand2::imm(5, 0)));
        assert_eq!(outcome, Ok(true));
        assert!(!block.ops().contains(&HostOp::UpdateNzcv));
        let mut state = GuestState::new(0, false);
        state.regs[1] = 10;
        run(&block, &mut state);
        assert_eq!(state.regs[0], 15);
        assert_eq!(state.regs[1], 10);
        assert_eq!(state.pc(), 4);
    }

    #[test]
    fn movs_imm_keeps_carry_and_overflow() {
        let (_, block) = translate(0, dp(DataOp::MOV, true, 2, 0, Operand2::imm(0, 0)));
        let mut state = GuestState::new(0, false);
        state.regs[2] = 0x1234;
        state.write_cpsr(CPSR::C | CPSR::V | CPSR::N);
        run(&block, &mut state);
        assert_eq!(state.regs[2], 0);
        assert_eq!(state.read_cpsr(), CPSR::Z | CPSR::C | CPSR::V);
    }

    #[test]
    fn mvns_shifter_carry() {
        // MVNS R0, R1, LSR #1
        let (_, block) = translate(0, dp(DataOp::MVN, true, 0, 0, Operand2::shifted(1, 0b01, 1)));
        let mut state = GuestState::new(0, false);
        state.regs[1] = 0x3;
        state.write_cpsr(CPSR::V);
        run(&block, &mut state);
        assert_eq!(state.regs[0], !0x1);
        assert_eq!(state.read_cpsr(), CPSR::N | CPSR::C | CPSR::V);
    }

    #[test]
    fn cmp_sets_flags_only() {
        let (outcome, block) = translate(0, dp(DataOp::CMP, true, 0, 1, Operand2::reg(2)));
        assert_eq!(outcome, Ok(true));
        let mut state = GuestState::new(0, false);
        state.regs[0] = 0xAAAA;
        state.regs[1] = 3;
        state.regs[2] = 5;
        run(&block, &mut state);
        assert_eq!(state.regs[0], 0xAAAA);
        assert_eq!(state.read_cpsr(), CPSR::N);
        assert!(!block.ops().iter().any(|op| matches!(op, HostOp::Store{..})));
    }

    #[test]
    fn add_pc_is_folded() {
        // ADD R0, PC, #4
        let (_, block) = translate(0x1000, dp(DataOp::ADD, false, 0, 15, Operand2::imm(4, 0)));
        assert!(block.ops().contains(&HostOp::MovImm{dst: crate::jit::emitter::HostReg(0), value: 0x100C}));
        let mut state = GuestState::new(0x1000, false);
        run(&block, &mut state);
        assert_eq!(state.regs[0], 0x100C);
    }

    #[test]
    fn orr_bic_pc_folded() {
        let (_, block) = translate(0x1000, dp(DataOp::ORR, false, 3, 15, Operand2::imm(1, 0)));
        let mut state = GuestState::new(0x1000, false);
        run(&block, &mut state);
        assert_eq!(state.regs[3], 0x1009);

        let (_, block) = translate(0x1000, dp(DataOp::BIC, false, 3, 15, Operand2::imm(0xFF, 0)));
        let mut state = GuestState::new(0x1000, false);
        run(&block, &mut state);
        assert_eq!(state.regs[3], 0x1000);
    }

    #[test]
    fn flag_set_with_pc_operand_is_rejected() {
        for op in [DataOp::ADD, DataOp::SUB, DataOp::BIC, DataOp::ORR].iter() {
            let (outcome, block) = translate(0x1000, dp(*op, true, 0, 15, Operand2::imm(4, 0)));
            assert_eq!(outcome, Err(CompilerError::FlagSetWithPcOperand{addr: 0x1000}));
            assert!(block.ops().is_empty());
        }
        // MOVS R0, PC
        let (outcome, _) = translate(0x1000, dp(DataOp::MOV, true, 0, 0, Operand2::reg(15)));
        assert_eq!(outcome, Err(CompilerError::FlagSetWithPcOperand{addr: 0x1000}));
    }

    #[test]
    fn conditional_rejection_emits_nothing() {
        let instr = Instruction::new(ARMCondition::EQ, InstructionType::DataProcessing{
            op: DataOp::SUB, set_flags: true, rd: 0, rn: 15, op2: Operand2::imm(4, 0)
        });
        let (outcome, block) = translate(0, instr);
        assert!(outcome.is_err());
        assert!(block.ops().is_empty());
    }

    #[test]
    fn mov_pc_exchange() {
        // MOV PC, R3
        let (outcome, block) = translate(0, dp(DataOp::MOV, false, 15, 0, Operand2::reg(3)));
        assert_eq!(outcome, Ok(false));
        let mut state = GuestState::new(0, false);
        state.regs[3] = 0x1001;
        assert_eq!(run(&block, &mut state), ExitReason::Continue);
        assert!(state.is_thumb());
        assert_eq!(state.pc(), 0x1000);
    }

    #[test]
    fn mov_imm_to_pc_is_undefined() {
        let (outcome, block) = translate(0x200, dp(DataOp::MOV, false, 15, 0, Operand2::imm(0, 0)));
        assert_eq!(outcome, Ok(false));
        let mut state = GuestState::new(0x200, false);
        assert_eq!(run(&block, &mut state), ExitReason::Undefined);
        assert_eq!(state.pc(), 0x200);
    }

    #[test]
    fn mov_from_pc_is_folded() {
        // MVN R1, PC, LSL #1
        let (_, block) = translate(0x10, dp(DataOp::MVN, false, 1, 0, Operand2::shifted(15, 0b00, 1)));
        let mut state = GuestState::new(0x10, false);
        run(&block, &mut state);
        assert_eq!(state.regs[1], !0x30);
    }

    #[test]
    fn sub_to_pc_redirects() {
        // SUB PC, LR, #4
        let (outcome, block) = translate(0, dp(DataOp::SUB, false, 15, 14, Operand2::imm(4, 0)));
        assert_eq!(outcome, Ok(false));
        let mut state = GuestState::new(0, false);
        state.regs[14] = 0x804;
        run(&block, &mut state);
        assert_eq!(state.pc(), 0x800);
        assert!(!state.is_thumb());
    }

    #[test]
    fn flag_set_to_pc_is_undefined() {
        // MOVS PC, LR
        let (outcome, block) = translate(0x40, dp(DataOp::MOV, true, 15, 0, Operand2::reg(14)));
        assert_eq!(outcome, Ok(false));
        let mut state = GuestState::new(0x40, false);
        assert_eq!(run(&block, &mut state), ExitReason::Undefined);
    }

    #[test]
    fn register_form_with_pc_is_best_effort() {
        // ADD R0, R1, PC
        let (outcome, block) = translate(0x100, dp(DataOp::ADD, false, 0, 1, Operand2::reg(15)));
        assert_eq!(outcome, Ok(true));
        let mut state = GuestState::new(0x100, false);
        state.regs[1] = 1;
        run(&block, &mut state);
        assert_eq!(state.regs[0], 0x109);
    }

    #[test]
    fn reg_shift_reg() {
        // ORR R0, R1, R2, LSL R3
        let (_, block) = translate(0, dp(DataOp::ORR, false, 0, 1, Operand2::reg_shifted(2, 0b00, 3)));
        let mut state = GuestState::new(0, false);
        state.regs[1] = 0x1;
        state.regs[2] = 0x1;
        state.regs[3] = 4;
        run(&block, &mut state);
        assert_eq!(state.regs[0], 0x11);

        // BICS R0, R1, R2, ROR PC: PC reads as address + 8.
        let (outcome, block) = translate(0x100, dp(DataOp::BIC, true, 0, 1, Operand2::reg_shifted(2, 0b11, 15)));
        assert_eq!(outcome, Ok(true));
        let mut state = GuestState::new(0x100, false);
        state.regs[1] = 0xFFFF_FFFF;
        state.regs[2] = 0x0000_01FF;
        run(&block, &mut state);
        // 0x1FF ROR 0x08 = 0xFF00_0001, carry from bit 31.
        assert_eq!(state.regs[0], 0x00FF_FFFE);
        assert_eq!(state.read_cpsr(), CPSR::C);
        assert_eq!(state.pc(), 0x104);
    }

    #[test]
    fn conditional_skip() {
        let instr = Instruction::new(ARMCondition::NE, InstructionType::DataProcessing{
            op: DataOp::MOV, set_flags: false, rd: 0, rn: 0, op2: Operand2::imm(1, 0)
        });
        let (outcome, block) = translate(0, instr);
        assert_eq!(outcome, Ok(true));

        let mut state = GuestState::new(0, false);
        state.write_cpsr(CPSR::Z);
        let before = state.clone();
        run(&block, &mut state);
        assert_eq!(state.regs[0], before.regs[0]);
        assert_eq!(state.cpsr, before.cpsr);
        assert_eq!(state.pc(), 4);

        let mut state = GuestState::new(0, false);
        run(&block, &mut state);
        assert_eq!(state.regs[0], 1);
    }

    #[test]
    fn conditional_pc_write_falls_through() {
        // MOVEQ PC, LR
        let instr = Instruction::new(ARMCondition::EQ, InstructionType::DataProcessing{
            op: DataOp::MOV, set_flags: false, rd: 15, rn: 0, op2: Operand2::reg(14)
        });
        let (outcome, block) = translate(0, instr);
        assert_eq!(outcome, Ok(true));

        let mut state = GuestState::new(0, false);
        state.regs[14] = 0x500;
        run(&block, &mut state);
        assert_eq!(state.pc(), 4);

        state = GuestState::new(0, false);
        state.regs[14] = 0x500;
        state.write_cpsr(CPSR::Z);
        run(&block, &mut state);
        assert_eq!(state.pc(), 0x500);
    }
}
