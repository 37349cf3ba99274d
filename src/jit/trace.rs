//! A portable backend.
//!
//! Records the emitted ops instead of assembling them. The recorded block can
//! be replayed against a guest state, so translation can be tested and used on
//! hosts without a native backend.

use crate::core::{
    ARMCondition, CPSR, DataOp, ExitReason, GuestState, Operand2,
    constants::PC_REG,
};
use super::{
    CompiledBlock, CompilerError,
    emitter::{Emitter, HostReg, Label},
};

/// Host registers 0-7 are handed out, 8 is the scratch register.
const NUM_REGS: usize = 9;
const SCRATCH: HostReg = HostReg(8);

/// A recorded host operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostOp {
    Load{dst: HostReg, reg: usize},
    Store{reg: usize, src: HostReg},
    DataOp{op: DataOp, set_flags: bool, dst: Option<HostReg>, src: Option<HostReg>, op2: Operand2<HostReg>},
    UpdateNzcv,
    MovImm{dst: HostReg, value: u32},
    AddImm{dst: HostReg, src: HostReg, value: u32},
    SkipUnless{cond: ARMCondition, label: Label},
    Bind(Label),
    Exit{pc: u32, reason: ExitReason},
    ExitExchange{src: HostReg},
}

pub struct TraceEmitter {
    ops:    Vec<HostOp>,
    labels: Vec<Option<usize>>,
}

impl TraceEmitter {
    pub fn ops(&self) -> &[HostOp] {
        &self.ops
    }
}

impl Emitter for TraceEmitter {
    type Block = TraceBlock;

    fn new() -> Result<Self, CompilerError> {
        Ok(Self {
            ops:    Vec::new(),
            labels: Vec::new(),
        })
    }

    fn finish(self) -> Result<TraceBlock, CompilerError> {
        let labels = self.labels.into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| CompilerError::Assembler("unbound label".to_string()))?;
        Ok(TraceBlock {
            ops: self.ops,
            labels,
        })
    }

    fn allocatable_regs(&self) -> Vec<HostReg> {
        (0..SCRATCH.0).map(HostReg).collect()
    }

    fn scratch_reg(&self) -> HostReg {
        SCRATCH
    }

    fn load_guest_reg(&mut self, dst: HostReg, reg: usize) {
        self.ops.push(HostOp::Load{dst, reg});
    }

    fn store_guest_reg(&mut self, reg: usize, src: HostReg) {
        self.ops.push(HostOp::Store{reg, src});
    }

    fn data_op(&mut self, op: DataOp, set_flags: bool, dst: Option<HostReg>, src: Option<HostReg>, op2: &Operand2<HostReg>) {
        self.ops.push(HostOp::DataOp{op, set_flags, dst, src, op2: *op2});
    }

    fn update_nzcv(&mut self) {
        self.ops.push(HostOp::UpdateNzcv);
    }

    fn mov_imm32(&mut self, dst: HostReg, value: u32) {
        self.ops.push(HostOp::MovImm{dst, value});
    }

    fn add_imm32(&mut self, dst: HostReg, src: HostReg, value: u32) {
        self.ops.push(HostOp::AddImm{dst, src, value});
    }

    fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    fn bind_label(&mut self, label: Label) {
        self.labels[label.0] = Some(self.ops.len());
        self.ops.push(HostOp::Bind(label));
    }

    fn skip_unless(&mut self, cond: ARMCondition, label: Label) {
        self.ops.push(HostOp::SkipUnless{cond, label});
    }

    fn exit_to(&mut self, pc: u32, reason: ExitReason) {
        self.ops.push(HostOp::Exit{pc, reason});
    }

    fn exit_exchange(&mut self, src: HostReg) {
        self.ops.push(HostOp::ExitExchange{src});
    }
}

/// A recorded block, run by replaying its ops.
pub struct TraceBlock {
    ops:    Vec<HostOp>,
    labels: Vec<usize>,
}

impl TraceBlock {
    pub fn ops(&self) -> &[HostOp] {
        &self.ops
    }
}

impl CompiledBlock for TraceBlock {
    fn run(&self, state: &mut GuestState) -> ExitReason {
        let mut host = [0_u32; NUM_REGS];
        let mut pending = None;
        let mut idx = 0;
        while let Some(op) = self.ops.get(idx) {
            idx += 1;
            match *op {
                HostOp::Load{dst, reg} => host[dst.0 as usize] = state.regs[reg],
                HostOp::Store{reg, src} => state.regs[reg] = host[src.0 as usize],
                HostOp::DataOp{op, set_flags, dst, src, op2} => {
                    let cpsr = state.read_cpsr();
                    let (op2, carry) = op2.evaluate(|r| host[r.0 as usize], cpsr.carry());
                    let op1 = src.map_or(0, |r| host[r.0 as usize]);
                    let (result, flags) = op.compute(op1, op2, carry, cpsr);
                    if let Some(dst) = dst {
                        host[dst.0 as usize] = result;
                    }
                    if set_flags {
                        pending = Some(flags);
                    }
                },
                HostOp::UpdateNzcv => if let Some(flags) = pending.take() {
                    let cpsr = (state.cpsr & !CPSR::NZCV) | (flags.bits() & CPSR::NZCV);
                    state.cpsr = cpsr;
                },
                HostOp::MovImm{dst, value} => host[dst.0 as usize] = value,
                HostOp::AddImm{dst, src, value} => host[dst.0 as usize] = host[src.0 as usize].wrapping_add(value),
                HostOp::SkipUnless{cond, label} => if !cond.passes(state.read_cpsr()) {
                    idx = self.labels[label.0];
                },
                HostOp::Bind(_) => {},
                HostOp::Exit{pc, reason} => {
                    state.regs[PC_REG] = pc;
                    state.exit = reason as u32;
                    return reason;
                },
                HostOp::ExitExchange{src} => {
                    let target = host[src.0 as usize];
                    let thumb = target & 1 == 1;
                    state.set_thumb(thumb);
                    state.regs[PC_REG] = if thumb {target & !1} else {target & !3};
                    state.exit = ExitReason::Continue as u32;
                    return ExitReason::Continue;
                },
            }
        }
        // Blocks always end in an exit.
        state.exit = ExitReason::Interpret as u32;
        ExitReason::Interpret
    }
}
