
use crate::{
    core::{
        ARMCondition,
        Operand2,
        instructions::*,
    },
    common::{bits, field, test_bit},
};

/// Decode an ARM instruction.
pub fn decode_arm(i: u32) -> Option<Instruction> {
    const BRANCH: u32 = 0b10 << 26;
    const ALU: u32 = 0b00 << 26;
    let cond = ARMCondition::from_bits(i >> 28);
    if cond == ARMCondition::NV {
        // Unconditional instruction space.
        return None;
    }
    let instr = match i & bits::<u32>(26, 27) {
        BRANCH  => decode_branch(i)?,
        ALU     => decode_alu(i)?,
        _       => return None,
    };
    Some(Instruction::new(cond, instr))
}

/// Decode a branch.
/// i has the value cccc101L...
fn decode_branch(i: u32) -> Option<InstructionType> {
    if !test_bit(i, 25) {
        // Block transfer.
        return None;
    }
    let offset = (((i & 0xFF_FFFF) << 8) as i32) >> 6;
    if test_bit(i, 24) {
        Some(InstructionType::BL{offset})
    } else {
        Some(InstructionType::B{offset})
    }
}

/// Decode a data processing instruction or BX.
/// i has the value cccc00...
fn decode_alu(i: u32) -> Option<InstructionType> {
    const BX_MASK: u32 = 0x0FFF_FFF0;
    const BX: u32 = 0x012F_FF10;
    if i & BX_MASK == BX {
        return Some(InstructionType::BX{reg: (i & 0xF) as usize});
    }

    let imm = test_bit(i, 25);
    if !imm && test_bit(i, 4) && test_bit(i, 7) {
        // Multiply, swap and halfword transfers.
        return None;
    }

    let op = DataOp::from_opcode(field(i, 21, 24))?;
    let set_flags = test_bit(i, 20);
    if op.is_test() && !set_flags {
        // PSR transfers and misc.
        return None;
    }

    let rn = field(i, 16, 19) as usize;
    let rd = field(i, 12, 15) as usize;
    let op2 = if imm {
        Operand2::imm((i & 0xFF) as u8, field(i, 8, 11) as u8)
    } else if test_bit(i, 4) {
        let rs = field(i, 8, 11) as usize;
        Operand2::reg_shifted((i & 0xF) as usize, field(i, 5, 6), rs)
    } else {
        Operand2::shifted((i & 0xF) as usize, field(i, 5, 6), field(i, 7, 11))
    };

    Some(InstructionType::DataProcessing{op, set_flags, rd, rn, op2})
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ShiftType;

    fn dp(i: u32) -> (DataOp, bool, usize, usize, Operand2<usize>) {
        match decode_arm(i).map(|i| i.instr) {
            Some(InstructionType::DataProcessing{op, set_flags, rd, rn, op2}) => (op, set_flags, rd, rn, op2),
            other => panic!("{:08X} decoded to {:?}", i, other),
        }
    }

    #[test]
    fn data_processing_imm() {
        // MOV R0, #123
        assert_eq!(dp(0xE3A0_007B), (DataOp::MOV, false, 0, 0, Operand2::imm(0x7B, 0)));
        // ADD R1, R0, #234
        assert_eq!(dp(0xE280_10EA), (DataOp::ADD, false, 1, 0, Operand2::imm(0xEA, 0)));
        // ANDS R1, R0, #0
        assert_eq!(dp(0xE210_1000), (DataOp::AND, true, 1, 0, Operand2::imm(0, 0)));
        // AND R1, R0, #0x1F0000
        assert_eq!(dp(0xE200_181F), (DataOp::AND, false, 1, 0, Operand2::imm(0x1F, 8)));
    }

    #[test]
    fn data_processing_reg() {
        // MOV R15, R14
        assert_eq!(dp(0xE1A0_F00E), (DataOp::MOV, false, 15, 0, Operand2::reg(14)));
        // ADD R12, R8, R9
        assert_eq!(dp(0xE088_C009), (DataOp::ADD, false, 12, 8, Operand2::reg(9)));
        // CMP R1, R2, LSR #32
        assert_eq!(dp(0xE151_0022), (DataOp::CMP, true, 0, 1, Operand2::Reg{reg: 2, shift: ShiftType::LSR, amount: 32}));
        // MOVS R0, R1, RRX
        assert_eq!(dp(0xE1B0_0061), (DataOp::MOV, true, 0, 0, Operand2::Reg{reg: 1, shift: ShiftType::RRX, amount: 1}));
    }

    #[test]
    fn data_processing_rsr() {
        // ORR R0, R1, R2, LSL R3
        assert_eq!(dp(0xE181_0312), (DataOp::ORR, false, 0, 1, Operand2::reg_shifted(2, 0b00, 3)));
        // BICS R4, R5, R6, ROR R7
        assert_eq!(dp(0xE1D5_4776), (DataOp::BIC, true, 4, 5, Operand2::reg_shifted(6, 0b11, 7)));
    }

    #[test]
    fn condition() {
        // MOVEQ R2, #1
        let i = decode_arm(0x03A0_2001).unwrap();
        assert_eq!(i.cond, ARMCondition::EQ);
    }

    #[test]
    fn branches() {
        // B #-8 (branch to self)
        assert_eq!(decode_arm(0xEAFF_FFFE).map(|i| i.instr), Some(InstructionType::B{offset: -8}));
        // BL #+0x100
        assert_eq!(decode_arm(0xEB00_0040).map(|i| i.instr), Some(InstructionType::BL{offset: 0x100}));
        // BX R3
        assert_eq!(decode_arm(0xE12F_FF13).map(|i| i.instr), Some(InstructionType::BX{reg: 3}));
    }

    #[test]
    fn not_translated() {
        // MUL R0, R1, R2
        assert_eq!(decode_arm(0xE000_0291), None);
        // ADC R0, R1, R2
        assert_eq!(decode_arm(0xE0A1_0002), None);
        // MRS R0, CPSR
        assert_eq!(decode_arm(0xE10F_0000), None);
        // LDR R0, [R1]
        assert_eq!(decode_arm(0xE591_0000), None);
        // STMFD SP!, {R4, LR}
        assert_eq!(decode_arm(0xE92D_4010), None);
        // Unconditional space
        assert_eq!(decode_arm(0xF3A0_0000), None);
    }
}
