//! Guest to host register mapping for a single block.

use std::convert::Infallible;

use bitflags::bitflags;
use tracing::trace;

use crate::core::constants::PC_REG;
use super::{
    CompilerError,
    emitter::{Emitter, HostReg},
};

bitflags! {
    #[derive(Default)]
    pub struct AllocFlags: u8 {
        /// The mapping will be written, and must be stored back on flush.
        const DIRTY = 1 << 0;
    }
}

/// Why a register can't be used as a normal register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rejection {
    /// Writing PC redirects control flow.
    ProgramCounterWrite,
}

/// Where a guest register operand comes from.
///
/// Reads can't be rejected, so `resolve_read` uses `Infallible` for `R`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolved<R = Rejection> {
    Mapped(HostReg),
    /// Known at translation time (reads of PC).
    Constant(u32),
    Rejected(R),
}

#[derive(Clone, Copy, Debug)]
struct Mapping {
    guest:      usize,
    dirty:      bool,
    last_use:   usize,
    locked:     bool,
}

/// Supplies host registers for guest registers.
///
/// Values are loaded from the guest state on first use and written back on
/// eviction or flush if dirty. Registers mapped for the current instruction
/// are locked until `begin_instruction`.
pub struct RegSupplier {
    host_regs:  Vec<HostReg>,
    slots:      Vec<Option<Mapping>>,
    clock:      usize,
}

impl RegSupplier {
    pub fn new(host_regs: Vec<HostReg>) -> Self {
        let slots = vec![None; host_regs.len()];
        Self {
            host_regs,
            slots,
            clock: 0,
        }
    }

    /// Release the locks held by the previous instruction.
    pub fn begin_instruction(&mut self) {
        for mapping in self.slots.iter_mut().flatten() {
            mapping.locked = false;
        }
    }

    /// Map a guest register to a host register.
    ///
    /// PC is never mapped: use `resolve_read` or `resolve_write`.
    pub fn map<E: Emitter>(&mut self, emitter: &mut E, reg: usize, flags: AllocFlags) -> Result<HostReg, CompilerError> {
        debug_assert_ne!(reg, PC_REG);
        self.clock += 1;
        let dirty = flags.contains(AllocFlags::DIRTY);

        if let Some(idx) = self.slot_of(reg) {
            if let Some(mapping) = self.slots[idx].as_mut() {
                mapping.dirty |= dirty;
                mapping.last_use = self.clock;
                mapping.locked = true;
            }
            return Ok(self.host_regs[idx]);
        }

        let idx = self.free_slot(emitter)?;
        let host = self.host_regs[idx];
        emitter.load_guest_reg(host, reg);
        self.slots[idx] = Some(Mapping {
            guest:      reg,
            dirty,
            last_use:   self.clock,
            locked:     true,
        });
        Ok(host)
    }

    /// Resolve a guest register that is read.
    pub fn resolve_read<E: Emitter>(&mut self, emitter: &mut E, reg: usize, pc_value: u32) -> Result<Resolved<Infallible>, CompilerError> {
        if reg == PC_REG {
            Ok(Resolved::Constant(pc_value))
        } else {
            self.map(emitter, reg, AllocFlags::empty()).map(Resolved::Mapped)
        }
    }

    /// Resolve a guest register that is written.
    pub fn resolve_write<E: Emitter>(&mut self, emitter: &mut E, reg: usize) -> Result<Resolved, CompilerError> {
        if reg == PC_REG {
            Ok(Resolved::Rejected(Rejection::ProgramCounterWrite))
        } else {
            self.map(emitter, reg, AllocFlags::DIRTY).map(Resolved::Mapped)
        }
    }

    /// Store every dirty mapping to the guest state, and forget all mappings.
    pub fn flush<E: Emitter>(&mut self, emitter: &mut E) {
        for (slot, host) in self.slots.iter_mut().zip(self.host_regs.iter()) {
            if let Some(mapping) = slot.take() {
                if mapping.dirty {
                    emitter.store_guest_reg(mapping.guest, *host);
                }
            }
        }
    }

    pub fn host_of(&self, reg: usize) -> Option<HostReg> {
        self.slot_of(reg).map(|idx| self.host_regs[idx])
    }

    pub fn is_dirty(&self, reg: usize) -> bool {
        self.slot_of(reg)
            .and_then(|idx| self.slots[idx])
            .map_or(false, |mapping| mapping.dirty)
    }

    fn slot_of(&self, reg: usize) -> Option<usize> {
        self.slots.iter().position(|slot| slot.map_or(false, |m| m.guest == reg))
    }

    /// Find an empty slot, evicting the least recently used unlocked mapping if needed.
    fn free_slot<E: Emitter>(&mut self, emitter: &mut E) -> Result<usize, CompilerError> {
        if let Some(idx) = self.slots.iter().position(Option::is_none) {
            return Ok(idx);
        }

        let (idx, victim) = self.slots.iter()
            .enumerate()
            .filter_map(|(idx, slot)| slot.map(|m| (idx, m)))
            .filter(|(_, m)| !m.locked)
            .min_by_key(|(_, m)| m.last_use)
            .ok_or(CompilerError::OutOfHostRegisters)?;

        trace!("evicting R{} from {}", victim.guest, self.host_regs[idx]);
        if victim.dirty {
            emitter.store_guest_reg(victim.guest, self.host_regs[idx]);
        }
        self.slots[idx] = None;
        Ok(idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jit::trace::{HostOp, TraceEmitter};

    fn supplier(emitter: &TraceEmitter, count: usize) -> RegSupplier {
        RegSupplier::new(emitter.allocatable_regs().into_iter().take(count).collect())
    }

    #[test]
    fn read_map_is_clean() {
        let mut emitter = TraceEmitter::new().unwrap();
        let mut regs = supplier(&emitter, 4);
        let host = regs.map(&mut emitter, 3, AllocFlags::empty()).unwrap();
        assert_eq!(regs.host_of(3), Some(host));
        assert!(!regs.is_dirty(3));
        // Mapping again reuses the register and doesn't reload.
        assert_eq!(regs.map(&mut emitter, 3, AllocFlags::empty()).unwrap(), host);
        regs.flush(&mut emitter);
        assert_eq!(emitter.ops(), &[HostOp::Load{dst: host, reg: 3}]);
        assert_eq!(regs.host_of(3), None);
    }

    #[test]
    fn dirty_map_is_stored() {
        let mut emitter = TraceEmitter::new().unwrap();
        let mut regs = supplier(&emitter, 4);
        let src = regs.map(&mut emitter, 1, AllocFlags::empty()).unwrap();
        let dst = regs.map(&mut emitter, 0, AllocFlags::DIRTY).unwrap();
        assert!(regs.is_dirty(0));
        regs.flush(&mut emitter);
        let ops = emitter.ops();
        assert!(ops.contains(&HostOp::Store{reg: 0, src: dst}));
        assert!(!ops.contains(&HostOp::Store{reg: 1, src}));
    }

    #[test]
    fn eviction_writes_back() {
        let mut emitter = TraceEmitter::new().unwrap();
        let mut regs = supplier(&emitter, 2);
        let r0 = regs.map(&mut emitter, 0, AllocFlags::DIRTY).unwrap();
        regs.map(&mut emitter, 1, AllocFlags::empty()).unwrap();
        regs.begin_instruction();
        regs.map(&mut emitter, 1, AllocFlags::empty()).unwrap();
        // R0 is least recently used.
        let r2 = regs.map(&mut emitter, 2, AllocFlags::empty()).unwrap();
        assert_eq!(r2, r0);
        assert_eq!(regs.host_of(0), None);
        assert!(emitter.ops().contains(&HostOp::Store{reg: 0, src: r0}));
    }

    #[test]
    fn locked_registers_are_kept() {
        let mut emitter = TraceEmitter::new().unwrap();
        let mut regs = supplier(&emitter, 2);
        regs.map(&mut emitter, 0, AllocFlags::empty()).unwrap();
        regs.map(&mut emitter, 1, AllocFlags::empty()).unwrap();
        assert_eq!(regs.map(&mut emitter, 2, AllocFlags::empty()), Err(CompilerError::OutOfHostRegisters));
    }

    #[test]
    fn program_counter() {
        let mut emitter = TraceEmitter::new().unwrap();
        let mut regs = supplier(&emitter, 4);
        assert_eq!(regs.resolve_read(&mut emitter, 15, 0x108).unwrap(), Resolved::Constant(0x108));
        assert_eq!(regs.resolve_write(&mut emitter, 15).unwrap(), Resolved::Rejected(Rejection::ProgramCounterWrite));
        assert!(emitter.ops().is_empty());
        match regs.resolve_write(&mut emitter, 4).unwrap() {
            Resolved::Mapped(_) => assert!(regs.is_dirty(4)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn resolve_read_maps_guest_register() {
        let mut emitter = TraceEmitter::new().unwrap();
        let mut regs = supplier(&emitter, 4);
        match regs.resolve_read(&mut emitter, 3, 0x108).unwrap() {
            Resolved::Mapped(host) => {
                assert_eq!(regs.host_of(3), Some(host));
                assert!(!regs.is_dirty(3));
                assert_eq!(emitter.ops(), &[HostOp::Load{dst: host, reg: 3}]);
            },
            Resolved::Constant(value) => panic!("unexpected constant {:X}", value),
            Resolved::Rejected(never) => match never {},
        }
    }
}
