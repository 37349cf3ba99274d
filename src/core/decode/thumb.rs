//! ARM Thumb Instruction Set

use crate::{
    core::{
        ARMCondition,
        Operand2,
        instructions::*,
    },
    common::{bits, field, test_bit},
};

/// Decode the thumb instruction.
pub fn decode_thumb(i: u16) -> Option<Instruction> {
    const ALU: u16          = 0b000 << 13;
    const ALU_IMM: u16      = 0b001 << 13;
    const OTHER_LO: u16     = 0b010 << 13;
    const STACK: u16        = 0b101 << 13;
    const OTHER_HI: u16     = 0b110 << 13;
    const BRANCH: u16       = 0b111 << 13;
    match i & bits::<u16>(13, 15) {
        ALU =>          Some(Instruction::always(decode_thumb_alu(i))),
        ALU_IMM =>      Some(Instruction::always(decode_thumb_alu_imm(i))),
        OTHER_LO =>     decode_thumb_bx(i).map(Instruction::always),
        STACK =>        decode_thumb_stack(i).map(Instruction::always),
        OTHER_HI =>     decode_thumb_cond_branch(i),
        BRANCH =>       decode_thumb_branch(i).map(Instruction::always),
        _ => None,
    }
}

/// Decode shift & arithmetic
fn decode_thumb_alu(i: u16) -> InstructionType {
    let rs = field(i, 3, 5) as usize;
    let rd = field(i, 0, 2) as usize;
    match field(i, 11, 12) {
        0b11 => {
            let op2 = field(i, 6, 8);
            match field(i, 9, 10) {
                0b00 => InstructionType::TADDReg{rd, rn: rs, rm: op2 as usize},
                0b01 => InstructionType::TSUBReg{rd, rn: rs, rm: op2 as usize},
                0b10 => InstructionType::TADDImm3{rd, rn: rs, imm3: op2 as u8},
                _ => InstructionType::TSUBImm3{rd, rn: rs, imm3: op2 as u8},
            }
        },
        shift_bits => {
            let imm5 = field(i, 6, 10);
            let op2 = Operand2::shifted(rs, shift_bits as u32, imm5 as u32);
            InstructionType::TShiftImm{rd, op2}
        }
    }
}

/// Decode move/compare/arith with 8-bit immediate
fn decode_thumb_alu_imm(i: u16) -> InstructionType {
    let rd = field(i, 8, 10) as usize;
    let imm8 = (i & 0xFF) as u8;
    match field(i, 11, 12) {
        0b00 => InstructionType::TMOVImm{rd, imm8},
        0b01 => InstructionType::TCMPImm{rn: rd, imm8},
        0b10 => InstructionType::TADDImm8{rdn: rd, imm8},
        _ => InstructionType::TSUBImm8{rdn: rd, imm8},
    }
}

/// Decode branch exchange. Other hi-register ops, ALU ops and loads are not translated.
fn decode_thumb_bx(i: u16) -> Option<InstructionType> {
    const BX_MASK: u16 = 0xFF87;
    const BX: u16 = 0x4700;
    if i & BX_MASK == BX {
        Some(InstructionType::TBX{reg: field(i, 3, 6) as usize})
    } else {
        None
    }
}

/// Decode SP-relative address generation and SP adjustment.
fn decode_thumb_stack(i: u16) -> Option<InstructionType> {
    if test_bit(i, 12) {
        if i & bits::<u16>(8, 11) != 0 {
            // Push/pop, breakpoint
            return None;
        }
        let imm7 = (i & 0x7F) as u8;
        if test_bit(i, 7) {
            Some(InstructionType::TSUBSP{imm7})
        } else {
            Some(InstructionType::TADDSP{imm7})
        }
    } else if test_bit(i, 11) {
        let rd = field(i, 8, 10) as usize;
        Some(InstructionType::TADDSPRel{rd, imm8: (i & 0xFF) as u8})
    } else {
        // ADD Rd, PC, #imm
        None
    }
}

/// Decode conditional branch. Loads and stores multiple are not translated.
fn decode_thumb_cond_branch(i: u16) -> Option<Instruction> {
    if !test_bit(i, 12) {
        return None;
    }
    let cond = ARMCondition::from_bits(field(i, 8, 11) as u32);
    if cond.is_always() {
        // Undefined, SWI
        return None;
    }
    let offset = ((i as u8 as i8) as i32) << 1;
    Some(Instruction::new(cond, InstructionType::TB{offset}))
}

/// Decode unconditional branch. Long branches are not translated.
fn decode_thumb_branch(i: u16) -> Option<InstructionType> {
    if field(i, 11, 12) != 0b00 {
        return None;
    }
    let offset = (((i & 0x7FF) as i32) << 21) >> 20;
    Some(InstructionType::TB{offset})
}
