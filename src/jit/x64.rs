//! x86-64 backend.
//!
//! Register usage inside a block:
//! rdi = guest state, rax = op2 / result, rcx and rdx = temps (rdx holds the shifter carry),
//! rbp = scratch, everything else is handed to the register supplier.

use dynasmrt::{
    dynasm, DynasmApi, DynasmLabelApi, Assembler, AssemblyOffset, DynamicLabel, ExecutableBuffer,
    x64::X64Relocation,
};

use crate::core::{
    ARMCondition, CPSR, DataOp, ExitReason, GuestState, Operand2, ShiftType,
    constants::PC_REG,
};
use super::{
    CompiledBlock, CompilerError,
    emitter::{Emitter, HostReg, Label},
};

const RBP: u8 = 5;

const ALLOCATABLE: [u8; 10] = [
    8, 9, 10, 11,   // r8-r11
    6,              // rsi
    3,              // rbx
    12, 13, 14, 15, // r12-r15
];

const CPSR_OFFSET: i32 = GuestState::CPSR_OFFSET;
const EXIT_OFFSET: i32 = GuestState::EXIT_OFFSET;
const PC_OFFSET: i32 = GuestState::reg_offset(PC_REG);

/// Where the shifter carry-out ends up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Carry {
    /// C flag is left alone.
    Unchanged,
    Const(bool),
    /// 0 or 1 in edx.
    Edx,
}

pub struct CodeGeneratorX64 {
    assembler:  Assembler<X64Relocation>,
    entry:      AssemblyOffset,
    epilogue:   DynamicLabel,
    labels:     Vec<DynamicLabel>,
    /// Mask of the CPSR bits held in ecx by the last flag-setting op.
    pending:    Option<u32>,
}

impl CodeGeneratorX64 {
    fn prelude(&mut self) {
        dynasm!(self.assembler
            ; .arch x64
            // rdi = guest state
            ; push rbx
            ; push rbp
            ; push r12
            ; push r13
            ; push r14
            ; push r15
        );
    }

    fn epilogue(&mut self) {
        let epilogue = self.epilogue;
        dynasm!(self.assembler
            ; .arch x64
            ; =>epilogue
            ; pop r15
            ; pop r14
            ; pop r13
            ; pop r12
            ; pop rbp
            ; pop rbx
            ; ret
        );
    }

    /// Load the guest C flag into edx.
    fn carry_to_edx(&mut self) {
        dynasm!(self.assembler
            ; .arch x64
            ; mov edx, DWORD [rdi + CPSR_OFFSET]
            ; shr edx, 29
            ; and edx, 1
        );
    }

    fn setc_edx(&mut self) {
        dynasm!(self.assembler
            ; .arch x64
            ; setc dl
            ; movzx edx, dl
        );
    }

    /// Code-gen for an ALU operand.
    /// The value is left in eax.
    fn operand2(&mut self, op2: &Operand2<HostReg>, want_carry: bool) -> Carry {
        match *op2 {
            Operand2::Imm{imm8, rotate} => {
                let value = crate::core::operand::expand_imm(imm8, rotate);
                dynasm!(self.assembler
                    ; .arch x64
                    ; mov eax, value as i32
                );
                if rotate == 0 {
                    Carry::Unchanged
                } else {
                    Carry::Const(value & 0x8000_0000 != 0)
                }
            },
            Operand2::Reg{reg, shift, amount} => self.shift_imm(reg.0, shift, amount, want_carry),
            Operand2::RegShiftReg{reg, shift, amount_reg} => {
                self.shift_reg(reg.0, shift, amount_reg.0);
                Carry::Edx
            },
        }
    }

    fn shift_imm(&mut self, reg: u8, shift: ShiftType, amount: u32, want_carry: bool) -> Carry {
        let count = amount as i8;
        match (shift, amount) {
            (ShiftType::RRX, _) => {
                dynasm!(self.assembler
                    ; .arch x64
                    ; mov eax, Rd(reg)
                    ; mov ecx, DWORD [rdi + CPSR_OFFSET]
                    ; bt ecx, 29
                    ; rcr eax, 1
                );
                self.setc_edx();
                return Carry::Edx;
            },
            (_, 0) => {
                dynasm!(self.assembler
                    ; .arch x64
                    ; mov eax, Rd(reg)
                );
                return Carry::Unchanged;
            },
            (ShiftType::LSL, 32) => {
                dynasm!(self.assembler
                    ; .arch x64
                    ; mov edx, Rd(reg)
                    ; and edx, 1
                    ; xor eax, eax
                );
            },
            (ShiftType::LSR, 32) => {
                dynasm!(self.assembler
                    ; .arch x64
                    ; mov edx, Rd(reg)
                    ; shr edx, 31
                    ; xor eax, eax
                );
            },
            (ShiftType::ASR, 32) => {
                dynasm!(self.assembler
                    ; .arch x64
                    ; mov eax, Rd(reg)
                    ; sar eax, 31
                    ; mov edx, eax
                    ; and edx, 1
                );
            },
            (ShiftType::LSL, _) => {
                dynasm!(self.assembler
                    ; .arch x64
                    ; mov eax, Rd(reg)
                    ; shl eax, count
                );
                if want_carry {
                    self.setc_edx();
                }
            },
            (ShiftType::LSR, _) => {
                dynasm!(self.assembler
                    ; .arch x64
                    ; mov eax, Rd(reg)
                    ; shr eax, count
                );
                if want_carry {
                    self.setc_edx();
                }
            },
            (ShiftType::ASR, _) => {
                dynasm!(self.assembler
                    ; .arch x64
                    ; mov eax, Rd(reg)
                    ; sar eax, count
                );
                if want_carry {
                    self.setc_edx();
                }
            },
            (ShiftType::ROR, _) => {
                dynasm!(self.assembler
                    ; .arch x64
                    ; mov eax, Rd(reg)
                    ; ror eax, count
                );
                if want_carry {
                    self.setc_edx();
                }
            },
        }
        Carry::Edx
    }

    /// Shift by the bottom byte of a register.
    /// Shifts by 0 keep the guest carry, so edx always ends up valid.
    fn shift_reg(&mut self, reg: u8, shift: ShiftType, amount_reg: u8) {
        dynasm!(self.assembler
            ; .arch x64
            ; mov ecx, Rd(amount_reg)
            ; and ecx, 0xFF
            ; mov eax, Rd(reg)
        );
        self.carry_to_edx();
        dynasm!(self.assembler
            ; .arch x64
            ; test ecx, ecx
            ; jz >done
        );
        match shift {
            // 64-bit shifts give the right result and carry for counts up to 32.
            ShiftType::LSL => dynasm!(self.assembler
                ; .arch x64
                ; cmp ecx, 32
                ; ja >zero
                ; shl rax, cl
                ; mov rdx, rax
                ; shr rdx, 32
                ; and edx, 1
                ; jmp >done
                ; zero:
                ; xor eax, eax
                ; xor edx, edx
            ),
            ShiftType::LSR => dynasm!(self.assembler
                ; .arch x64
                ; cmp ecx, 32
                ; ja >zero
                ; shr rax, cl
                ; setc dl
                ; movzx edx, dl
                ; jmp >done
                ; zero:
                ; xor eax, eax
                ; xor edx, edx
            ),
            ShiftType::ASR => dynasm!(self.assembler
                ; .arch x64
                ; movsxd rax, eax
                ; cmp ecx, 32
                ; jbe >shift
                ; mov ecx, 32
                ; shift:
                ; sar rax, cl
                ; setc dl
                ; movzx edx, dl
            ),
            ShiftType::ROR | ShiftType::RRX => dynasm!(self.assembler
                ; .arch x64
                ; ror eax, cl
                ; mov edx, eax
                ; shr edx, 31
            ),
        }
        dynasm!(self.assembler
            ; .arch x64
            ; done:
        );
    }

    /// Leave N and Z of eax in ecx, plus the carry.
    fn logical_flags(&mut self, carry: Carry) -> u32 {
        let n = CPSR::N.bits() as i32;
        let z = CPSR::Z.bits() as i32;
        dynasm!(self.assembler
            ; .arch x64
            ; mov ecx, eax
            ; and ecx, n
            ; test eax, eax
            ; jnz >nonzero
            ; or ecx, z
            ; nonzero:
        );
        match carry {
            Carry::Unchanged => return (CPSR::N | CPSR::Z).bits(),
            Carry::Const(true) => {
                let c = CPSR::C.bits() as i32;
                dynasm!(self.assembler
                    ; .arch x64
                    ; or ecx, c
                );
            },
            Carry::Const(false) => {},
            Carry::Edx => dynasm!(self.assembler
                ; .arch x64
                ; shl edx, 29
                ; or ecx, edx
            ),
        }
        (CPSR::N | CPSR::Z | CPSR::C).bits()
    }

    /// Capture the host flags of the last op into ecx, as guest NZCV.
    /// Must directly follow the op.
    fn arithmetic_flags(&mut self, borrow: bool) -> u32 {
        if borrow {
            dynasm!(self.assembler
                ; .arch x64
                ; setnc cl
            );
        } else {
            dynasm!(self.assembler
                ; .arch x64
                ; setc cl
            );
        }
        let n = CPSR::N.bits() as i32;
        let z = CPSR::Z.bits() as i32;
        dynasm!(self.assembler
            ; .arch x64
            ; seto dl
            ; movzx ecx, cl
            ; movzx edx, dl
            ; shl ecx, 29
            ; shl edx, 28
            ; or ecx, edx
            ; mov edx, eax
            ; and edx, n
            ; or ecx, edx
            ; test eax, eax
            ; jnz >nonzero
            ; or ecx, z
            ; nonzero:
        );
        CPSR::NZCV
    }
}

impl Emitter for CodeGeneratorX64 {
    type Block = X64Block;

    fn new() -> Result<Self, CompilerError> {
        let mut assembler = Assembler::new()
            .map_err(|e| CompilerError::Assembler(e.to_string()))?;
        let entry = assembler.offset();
        let epilogue = assembler.new_dynamic_label();
        let mut codegen = Self {
            assembler,
            entry,
            epilogue,
            labels: Vec::new(),
            pending: None,
        };
        codegen.prelude();
        Ok(codegen)
    }

    fn finish(mut self) -> Result<X64Block, CompilerError> {
        self.epilogue();
        let buffer = self.assembler.finalize()
            .map_err(|_| CompilerError::Assembler("could not finalize code buffer".to_string()))?;
        Ok(X64Block {
            buffer,
            entry: self.entry,
        })
    }

    fn allocatable_regs(&self) -> Vec<HostReg> {
        ALLOCATABLE.iter().copied().map(HostReg).collect()
    }

    fn scratch_reg(&self) -> HostReg {
        HostReg(RBP)
    }

    fn load_guest_reg(&mut self, dst: HostReg, reg: usize) {
        let offset = GuestState::reg_offset(reg);
        dynasm!(self.assembler
            ; .arch x64
            ; mov Rd(dst.0), DWORD [rdi + offset]
        );
    }

    fn store_guest_reg(&mut self, reg: usize, src: HostReg) {
        let offset = GuestState::reg_offset(reg);
        dynasm!(self.assembler
            ; .arch x64
            ; mov DWORD [rdi + offset], Rd(src.0)
        );
    }

    fn data_op(&mut self, op: DataOp, set_flags: bool, dst: Option<HostReg>, src: Option<HostReg>, op2: &Operand2<HostReg>) {
        debug_assert!(self.pending.is_none());
        let logical = op.is_logical();
        let carry = self.operand2(op2, set_flags && logical);
        let src = src.map_or(0, |r| r.0);

        use DataOp::*;
        match op {
            MOV => {},
            MVN => dynasm!(self.assembler
                ; .arch x64
                ; not eax
            ),
            AND | TST => dynasm!(self.assembler
                ; .arch x64
                ; and eax, Rd(src)
            ),
            EOR | TEQ => dynasm!(self.assembler
                ; .arch x64
                ; xor eax, Rd(src)
            ),
            ORR => dynasm!(self.assembler
                ; .arch x64
                ; or eax, Rd(src)
            ),
            BIC => dynasm!(self.assembler
                ; .arch x64
                ; not eax
                ; and eax, Rd(src)
            ),
            ADD | CMN => dynasm!(self.assembler
                ; .arch x64
                ; add eax, Rd(src)
            ),
            SUB | CMP => dynasm!(self.assembler
                ; .arch x64
                ; mov ecx, eax
                ; mov eax, Rd(src)
                ; sub eax, ecx
            ),
            RSB => dynasm!(self.assembler
                ; .arch x64
                ; sub eax, Rd(src)
            ),
        }

        if set_flags {
            let mask = if logical {
                self.logical_flags(carry)
            } else {
                self.arithmetic_flags(matches!(op, SUB | CMP | RSB))
            };
            self.pending = Some(mask);
        }

        if let Some(dst) = dst {
            dynasm!(self.assembler
                ; .arch x64
                ; mov Rd(dst.0), eax
            );
        }
    }

    fn update_nzcv(&mut self) {
        if let Some(mask) = self.pending.take() {
            let keep = !mask as i32;
            dynasm!(self.assembler
                ; .arch x64
                ; and DWORD [rdi + CPSR_OFFSET], keep
                ; or DWORD [rdi + CPSR_OFFSET], ecx
            );
        }
    }

    fn mov_imm32(&mut self, dst: HostReg, value: u32) {
        dynasm!(self.assembler
            ; .arch x64
            ; mov Rd(dst.0), value as i32
        );
    }

    fn add_imm32(&mut self, dst: HostReg, src: HostReg, value: u32) {
        if dst != src {
            dynasm!(self.assembler
                ; .arch x64
                ; mov Rd(dst.0), Rd(src.0)
            );
        }
        dynasm!(self.assembler
            ; .arch x64
            ; add Rd(dst.0), value as i32
        );
    }

    fn new_label(&mut self) -> Label {
        let label = self.assembler.new_dynamic_label();
        self.labels.push(label);
        Label(self.labels.len() - 1)
    }

    fn bind_label(&mut self, label: Label) {
        let label = self.labels[label.0];
        dynasm!(self.assembler
            ; .arch x64
            ; =>label
        );
    }

    fn skip_unless(&mut self, cond: ARMCondition, label: Label) {
        let label = self.labels[label.0];
        let mask = cond.pass_mask() as i32;
        dynasm!(self.assembler
            ; .arch x64
            ; mov eax, DWORD [rdi + CPSR_OFFSET]
            ; shr eax, 28
            ; mov ecx, mask
            ; bt ecx, eax
            ; jnc =>label
        );
    }

    fn exit_to(&mut self, pc: u32, reason: ExitReason) {
        debug_assert!(self.pending.is_none());
        let epilogue = self.epilogue;
        let reason = reason as i32;
        dynasm!(self.assembler
            ; .arch x64
            ; mov DWORD [rdi + PC_OFFSET], pc as i32
            ; mov DWORD [rdi + EXIT_OFFSET], reason
            ; jmp =>epilogue
        );
    }

    fn exit_exchange(&mut self, src: HostReg) {
        debug_assert!(self.pending.is_none());
        let epilogue = self.epilogue;
        let not_t = !CPSR::T.bits() as i32;
        let continue_ = ExitReason::Continue as i32;
        dynasm!(self.assembler
            ; .arch x64
            ; mov eax, Rd(src.0)
            // T = bit 0
            ; mov ecx, DWORD [rdi + CPSR_OFFSET]
            ; and ecx, not_t
            ; mov edx, eax
            ; and edx, 1
            ; shl edx, 5
            ; or ecx, edx
            ; mov DWORD [rdi + CPSR_OFFSET], ecx
            ; test eax, 1
            ; jz >arm
            ; and eax, -2
            ; jmp >store
            ; arm:
            ; and eax, -4
            ; store:
            ; mov DWORD [rdi + PC_OFFSET], eax
            ; mov DWORD [rdi + EXIT_OFFSET], continue_
            ; jmp =>epilogue
        );
    }
}

/// A block of x86-64 code.
pub struct X64Block {
    buffer: ExecutableBuffer,
    entry:  AssemblyOffset,
}

impl CompiledBlock for X64Block {
    fn run(&self, state: &mut GuestState) -> ExitReason {
        let routine: extern "sysv64" fn(state: *mut GuestState) = unsafe {
            std::mem::transmute(self.buffer.ptr(self.entry))
        };
        routine(state);
        state.exit_reason().unwrap_or(ExitReason::Interpret)
    }
}
