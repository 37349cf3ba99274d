// Instructions

use std::fmt;

use super::{
    ARMCondition, CPSR, Operand2,
    constants::{LINK_REG, PC_REG, SP_REG},
};
use crate::common::test_bit;

/// Data processing opcodes handled by the translator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataOp {
    AND,
    EOR,
    SUB,
    RSB,
    ADD,
    TST,
    TEQ,
    CMP,
    CMN,
    ORR,
    MOV,
    BIC,
    MVN,
}

impl DataOp {
    /// Opcode from bits 21-24 of an ARM data processing instruction.
    /// ADC, SBC and RSC are not translated.
    pub fn from_opcode(opcode: u32) -> Option<Self> {
        use DataOp::*;
        match opcode & 0xF {
            0x0 => Some(AND),
            0x1 => Some(EOR),
            0x2 => Some(SUB),
            0x3 => Some(RSB),
            0x4 => Some(ADD),
            0x8 => Some(TST),
            0x9 => Some(TEQ),
            0xA => Some(CMP),
            0xB => Some(CMN),
            0xC => Some(ORR),
            0xD => Some(MOV),
            0xE => Some(BIC),
            0xF => Some(MVN),
            _ => None,
        }
    }

    /// Compare and test ops: no destination, always set flags.
    pub fn is_test(self) -> bool {
        matches!(self, DataOp::TST | DataOp::TEQ | DataOp::CMP | DataOp::CMN)
    }

    pub fn writes_dest(self) -> bool {
        !self.is_test()
    }

    /// MOV and MVN ignore the first operand.
    pub fn reads_first_operand(self) -> bool {
        !matches!(self, DataOp::MOV | DataOp::MVN)
    }

    /// Logical ops take C from the shifter and leave V alone.
    pub fn is_logical(self) -> bool {
        !matches!(self, DataOp::ADD | DataOp::SUB | DataOp::RSB | DataOp::CMP | DataOp::CMN)
    }

    /// Compute the op, returning the result and the flags it would set.
    ///
    /// `shifter_carry` is the carry-out of the second operand; it becomes C for logical ops.
    pub fn compute(self, op1: u32, op2: u32, shifter_carry: bool, flags: CPSR) -> (u32, CPSR) {
        use DataOp::*;
        let (result, carry, overflow) = match self {
            AND | TST => (op1 & op2, shifter_carry, None),
            EOR | TEQ => (op1 ^ op2, shifter_carry, None),
            ORR => (op1 | op2, shifter_carry, None),
            BIC => (op1 & !op2, shifter_carry, None),
            MOV => (op2, shifter_carry, None),
            MVN => (!op2, shifter_carry, None),
            ADD | CMN => {
                let (result, carry, overflow) = add_with_carry(op1, op2, false);
                (result, carry, Some(overflow))
            },
            SUB | CMP => {
                let (result, carry, overflow) = add_with_carry(op1, !op2, true);
                (result, carry, Some(overflow))
            },
            RSB => {
                let (result, carry, overflow) = add_with_carry(op2, !op1, true);
                (result, carry, Some(overflow))
            },
        };
        let mut out = flags;
        out.set(CPSR::N, test_bit(result, 31));
        out.set(CPSR::Z, result == 0);
        out.set(CPSR::C, carry);
        if let Some(overflow) = overflow {
            out.set(CPSR::V, overflow);
        }
        (result, out)
    }
}

/// ARM AddWithCarry: returns result, carry-out and signed overflow.
pub fn add_with_carry(a: u32, b: u32, carry_in: bool) -> (u32, bool, bool) {
    let sum = (a as u64) + (b as u64) + (carry_in as u64);
    let result = sum as u32;
    let overflow = test_bit((a ^ result) & (b ^ result), 31);
    (result, sum > (u32::MAX as u64), overflow)
}

impl fmt::Display for DataOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A decoded instruction, with its condition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Instruction {
    pub cond:   ARMCondition,
    pub instr:  InstructionType,
}

impl Instruction {
    pub fn new(cond: ARMCondition, instr: InstructionType) -> Self {
        Self {
            cond, instr
        }
    }

    /// Thumb instructions other than conditional branches always execute.
    pub fn always(instr: InstructionType) -> Self {
        Self::new(ARMCondition::AL, instr)
    }
}

/// Decoded instructions.
///
/// Branch offsets are relative to the PC value the instruction reads (address + 8 or + 4).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstructionType {
    // ARM
    DataProcessing{op: DataOp, set_flags: bool, rd: usize, rn: usize, op2: Operand2<usize>},
    B{offset: i32},
    BL{offset: i32},
    BX{reg: usize},

    // Thumb (16-bit)
    TMOVImm{rd: usize, imm8: u8},
    /// LSL/LSR/ASR by immediate, which is MOVS with a shifted register.
    TShiftImm{rd: usize, op2: Operand2<usize>},
    TADDReg{rd: usize, rn: usize, rm: usize},
    TSUBReg{rd: usize, rn: usize, rm: usize},
    TADDImm3{rd: usize, rn: usize, imm3: u8},
    TSUBImm3{rd: usize, rn: usize, imm3: u8},
    TADDImm8{rdn: usize, imm8: u8},
    TSUBImm8{rdn: usize, imm8: u8},
    TCMPImm{rn: usize, imm8: u8},
    /// ADD Rd, SP, #imm8 << 2
    TADDSPRel{rd: usize, imm8: u8},
    /// ADD SP, SP, #imm7 << 2
    TADDSP{imm7: u8},
    /// SUB SP, SP, #imm7 << 2
    TSUBSP{imm7: u8},
    TBX{reg: usize},
    TB{offset: i32},
}

/// Register name for display.
struct Reg(usize);

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            SP_REG => write!(f, "SP"),
            LINK_REG => write!(f, "LR"),
            PC_REG => write!(f, "PC"),
            n => write!(f, "R{}", n),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use InstructionType::*;
        let cond = self.cond;
        match self.instr {
            DataProcessing{op, set_flags, rd, rn, op2} => {
                let op2 = op2.map_regs(Reg);
                let s = if set_flags && !op.is_test() {"S"} else {""};
                if op.is_test() {
                    write!(f, "{}{} {},{}", op, cond, Reg(rn), op2)
                } else if !op.reads_first_operand() {
                    write!(f, "{}{}{} {},{}", op, cond, s, Reg(rd), op2)
                } else {
                    write!(f, "{}{}{} {},{},{}", op, cond, s, Reg(rd), Reg(rn), op2)
                }
            },
            B{offset} => write!(f, "B{} #{}", cond, offset),
            BL{offset} => write!(f, "BL{} #{}", cond, offset),
            BX{reg} => write!(f, "BX{} {}", cond, Reg(reg)),

            TMOVImm{rd, imm8} => write!(f, "MOVS {},#{:X}", Reg(rd), imm8),
            TShiftImm{rd, op2} => write!(f, "MOVS {},{}", Reg(rd), op2.map_regs(Reg)),
            TADDReg{rd, rn, rm} => write!(f, "ADDS {},{},{}", Reg(rd), Reg(rn), Reg(rm)),
            TSUBReg{rd, rn, rm} => write!(f, "SUBS {},{},{}", Reg(rd), Reg(rn), Reg(rm)),
            TADDImm3{rd, rn, imm3} => write!(f, "ADDS {},{},#{:X}", Reg(rd), Reg(rn), imm3),
            TSUBImm3{rd, rn, imm3} => write!(f, "SUBS {},{},#{:X}", Reg(rd), Reg(rn), imm3),
            TADDImm8{rdn, imm8} => write!(f, "ADDS {},#{:X}", Reg(rdn), imm8),
            TSUBImm8{rdn, imm8} => write!(f, "SUBS {},#{:X}", Reg(rdn), imm8),
            TCMPImm{rn, imm8} => write!(f, "CMP {},#{:X}", Reg(rn), imm8),
            TADDSPRel{rd, imm8} => write!(f, "ADD {},SP,#{:X}", Reg(rd), (imm8 as u32) << 2),
            TADDSP{imm7} => write!(f, "ADD SP,#{:X}", (imm7 as u32) << 2),
            TSUBSP{imm7} => write!(f, "SUB SP,#{:X}", (imm7 as u32) << 2),
            TBX{reg} => write!(f, "BX {}", Reg(reg)),
            TB{offset} => write!(f, "B{} #{}", cond, offset),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_flags() {
        let (r, c, v) = add_with_carry(0xFFFF_FFFF, 1, false);
        assert_eq!((r, c, v), (0, true, false));
        let (r, c, v) = add_with_carry(0x7FFF_FFFF, 1, false);
        assert_eq!((r, c, v), (0x8000_0000, false, true));
    }

    #[test]
    fn cmp_flags() {
        // 5 - 5
        let (_, flags) = DataOp::CMP.compute(5, 5, false, CPSR::default());
        assert_eq!(flags, CPSR::Z | CPSR::C);
        // 3 - 5
        let (_, flags) = DataOp::CMP.compute(3, 5, false, CPSR::default());
        assert_eq!(flags, CPSR::N);
        // 0x8000_0000 - 1 overflows
        let (_, flags) = DataOp::CMP.compute(0x8000_0000, 1, false, CPSR::default());
        assert_eq!(flags, CPSR::C | CPSR::V);
    }

    #[test]
    fn logical_keeps_v() {
        let (r, flags) = DataOp::MOV.compute(0, 0, true, CPSR::V);
        assert_eq!(r, 0);
        assert_eq!(flags, CPSR::Z | CPSR::C | CPSR::V);
        let (r, flags) = DataOp::MVN.compute(0, 0, false, CPSR::V | CPSR::C);
        assert_eq!(r, 0xFFFF_FFFF);
        assert_eq!(flags, CPSR::N | CPSR::V);
    }

    #[test]
    fn rsb_bic() {
        assert_eq!(DataOp::RSB.compute(3, 10, false, CPSR::default()).0, 7);
        assert_eq!(DataOp::BIC.compute(0xFF, 0x0F, false, CPSR::default()).0, 0xF0);
    }

    #[test]
    fn display() {
        let i = Instruction::new(ARMCondition::NE, InstructionType::DataProcessing{
            op: DataOp::ADD, set_flags: true, rd: 0, rn: 15, op2: Operand2::imm(5, 0)
        });
        assert_eq!(i.to_string(), "ADDNES R0,PC,#5");
        let i = Instruction::always(InstructionType::DataProcessing{
            op: DataOp::CMP, set_flags: true, rd: 0, rn: 1, op2: Operand2::shifted(2, 0b01, 0)
        });
        assert_eq!(i.to_string(), "CMP R1,R2,LSR #32");
    }
}
