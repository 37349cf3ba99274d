//! ALU 2nd operand and barrel shifter semantics.

use std::fmt;

use crate::common::test_bit;

/// Barrel shifter operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShiftType {
    LSL,
    LSR,
    ASR,
    ROR,
    /// Rotate right by one through carry.
    RRX,
}

impl ShiftType {
    /// Shift type from the 2-bit encoding.
    /// RRX is never returned here: it is only reachable through `decode_imm`.
    pub fn from_bits(shift_bits: u32) -> Self {
        match shift_bits & 0b11 {
            0b00 => ShiftType::LSL,
            0b01 => ShiftType::LSR,
            0b10 => ShiftType::ASR,
            _ => ShiftType::ROR,
        }
    }

    /// Canonicalise an immediate shift.
    ///
    /// LSR #0 and ASR #0 encode a shift by 32, ROR #0 encodes RRX.
    pub fn decode_imm(shift_bits: u32, imm5: u32) -> (ShiftType, u32) {
        match (ShiftType::from_bits(shift_bits), imm5 & 0x1F) {
            (ShiftType::LSR, 0) => (ShiftType::LSR, 32),
            (ShiftType::ASR, 0) => (ShiftType::ASR, 32),
            (ShiftType::ROR, 0) => (ShiftType::RRX, 1),
            (shift, imm5) => (shift, imm5),
        }
    }
}

impl fmt::Display for ShiftType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ShiftType::*;
        match self {
            LSL => write!(f, "LSL"),
            LSR => write!(f, "LSR"),
            ASR => write!(f, "ASR"),
            ROR => write!(f, "ROR"),
            RRX => write!(f, "RRX"),
        }
    }
}

/// Expand a rotated 8-bit immediate.
pub const fn expand_imm(imm8: u8, rotate: u8) -> u32 {
    (imm8 as u32).rotate_right((rotate as u32 & 0xF) * 2)
}

/// Expand a rotated 8-bit immediate, with the shifter carry-out.
pub fn expand_imm_c(imm8: u8, rotate: u8, carry_in: bool) -> (u32, bool) {
    let value = expand_imm(imm8, rotate);
    if rotate & 0xF == 0 {
        (value, carry_in)
    } else {
        (value, test_bit(value, 31))
    }
}

/// Shift a value, returning the result and the shifter carry-out.
///
/// `amount` is the full shift amount: 0-32 for immediate shifts after `decode_imm`,
/// or the bottom byte of the shift register for register shifts.
pub fn shift_c(value: u32, shift: ShiftType, amount: u32, carry_in: bool) -> (u32, bool) {
    if amount == 0 && shift != ShiftType::RRX {
        return (value, carry_in);
    }
    match shift {
        ShiftType::LSL => match amount {
            1..=31 => (value << amount, test_bit(value, (32 - amount) as usize)),
            32 => (0, test_bit(value, 0)),
            _ => (0, false),
        },
        ShiftType::LSR => match amount {
            1..=31 => (value >> amount, test_bit(value, (amount - 1) as usize)),
            32 => (0, test_bit(value, 31)),
            _ => (0, false),
        },
        ShiftType::ASR => match amount {
            1..=31 => (((value as i32) >> amount) as u32, test_bit(value, (amount - 1) as usize)),
            _ => (((value as i32) >> 31) as u32, test_bit(value, 31)),
        },
        ShiftType::ROR => {
            let result = value.rotate_right(amount & 0x1F);
            (result, test_bit(result, 31))
        },
        ShiftType::RRX => {
            let carry = if carry_in {1 << 31} else {0};
            ((value >> 1) | carry, test_bit(value, 0))
        },
    }
}

/// ARM's flexible second operand.
///
/// `R` is the register type: guest register indices when decoded,
/// host registers once the operand has been resolved for emission.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operand2<R> {
    /// 8-bit value rotated right by twice `rotate`.
    Imm{imm8: u8, rotate: u8},
    /// Register shifted by an immediate amount (canonicalised, 0-32).
    Reg{reg: R, shift: ShiftType, amount: u32},
    /// Register shifted by the bottom byte of another register.
    RegShiftReg{reg: R, shift: ShiftType, amount_reg: R},
}

impl<R: Copy> Operand2<R> {
    pub fn imm(imm8: u8, rotate: u8) -> Self {
        Operand2::Imm{imm8, rotate: rotate & 0xF}
    }

    /// Plain register, no shift.
    pub fn reg(reg: R) -> Self {
        Operand2::Reg{reg, shift: ShiftType::LSL, amount: 0}
    }

    /// Register with an encoded immediate shift.
    pub fn shifted(reg: R, shift_bits: u32, imm5: u32) -> Self {
        let (shift, amount) = ShiftType::decode_imm(shift_bits, imm5);
        Operand2::Reg{reg, shift, amount}
    }

    pub fn reg_shifted(reg: R, shift_bits: u32, amount_reg: R) -> Self {
        Operand2::RegShiftReg{reg, shift: ShiftType::from_bits(shift_bits), amount_reg}
    }

    pub fn is_reg_shift_reg(&self) -> bool {
        matches!(self, Operand2::RegShiftReg{..})
    }

    /// Visit every register the operand reads.
    pub fn registers(&self) -> impl Iterator<Item = R> {
        let (a, b) = match *self {
            Operand2::Imm{..} => (None, None),
            Operand2::Reg{reg, ..} => (Some(reg), None),
            Operand2::RegShiftReg{reg, amount_reg, ..} => (Some(reg), Some(amount_reg)),
        };
        a.into_iter().chain(b)
    }

    /// Replace the registers, keeping the shape of the operand.
    pub fn map_regs<S, F: FnMut(R) -> S>(self, mut f: F) -> Operand2<S> {
        match self {
            Operand2::Imm{imm8, rotate} => Operand2::Imm{imm8, rotate},
            Operand2::Reg{reg, shift, amount} => Operand2::Reg{reg: f(reg), shift, amount},
            Operand2::RegShiftReg{reg, shift, amount_reg} => {
                let reg = f(reg);
                Operand2::RegShiftReg{reg, shift, amount_reg: f(amount_reg)}
            },
        }
    }

    /// Evaluate the operand, returning its value and the shifter carry-out.
    pub fn evaluate<F: Fn(R) -> u32>(&self, read: F, carry_in: bool) -> (u32, bool) {
        match *self {
            Operand2::Imm{imm8, rotate} => expand_imm_c(imm8, rotate, carry_in),
            Operand2::Reg{reg, shift, amount} => shift_c(read(reg), shift, amount, carry_in),
            Operand2::RegShiftReg{reg, shift, amount_reg} => {
                let amount = read(amount_reg) & 0xFF;
                shift_c(read(reg), shift, amount, carry_in)
            },
        }
    }
}

impl<R: fmt::Display> fmt::Display for Operand2<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand2::Imm{imm8, rotate} => write!(f, "#{:X}", expand_imm(*imm8, *rotate)),
            Operand2::Reg{reg, amount: 0, shift: ShiftType::LSL} => write!(f, "{}", reg),
            Operand2::Reg{reg, shift: ShiftType::RRX, ..} => write!(f, "{},RRX", reg),
            Operand2::Reg{reg, shift, amount} => write!(f, "{},{} #{}", reg, shift, amount),
            Operand2::RegShiftReg{reg, shift, amount_reg} => write!(f, "{},{} {}", reg, shift, amount_reg),
        }
    }
}
