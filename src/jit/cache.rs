use std::{
    collections::HashMap,
    rc::Rc,
};

use tracing::debug;

use crate::core::constants::{I_SIZE, T_SIZE};

/// A block to execute.
pub enum Subroutine<B> {
    /// This block has been entered n times.
    Run(usize),
    /// This block cannot be compiled.
    CannotCompile,
    /// This block has been JIT-compiled.
    Compiled(Rc<B>),
}

impl<B> Clone for Subroutine<B> {
    fn clone(&self) -> Self {
        use Subroutine::*;
        match self {
            Run(n) => Run(*n),
            CannotCompile => CannotCompile,
            Compiled(r) => Compiled(r.clone()),
        }
    }
}

struct Entry<B> {
    subroutine: Subroutine<B>,
    /// Address after the last guest instruction this entry was built from.
    end:        u32,
}

/// Blocks, keyed by entry point and instruction set.
pub struct BlockCache<B> {
    blocks: HashMap<(u32, bool), Entry<B>>,
}

impl<B> BlockCache<B> {
    pub fn new() -> Self {
        Self {
            blocks: HashMap::new(),
        }
    }

    /// Look up a block, counting the visit if it isn't compiled.
    pub fn visit(&mut self, addr: u32, thumb: bool) -> Subroutine<B> {
        let entry = self.blocks.entry((addr, thumb)).or_insert_with(|| Entry {
            subroutine: Subroutine::Run(0),
            end:        first_instruction_end(addr, thumb),
        });
        if let Subroutine::Run(n) = &mut entry.subroutine {
            *n += 1;
        }
        entry.subroutine.clone()
    }

    /// Insert an entry covering only the instruction at addr.
    pub fn insert(&mut self, addr: u32, thumb: bool, subroutine: Subroutine<B>) {
        let end = first_instruction_end(addr, thumb);
        self.blocks.insert((addr, thumb), Entry { subroutine, end });
    }

    /// Insert a compiled block built from the guest code in [addr, end).
    pub fn insert_compiled(&mut self, addr: u32, thumb: bool, block: Rc<B>, end: u32) {
        self.blocks.insert((addr, thumb), Entry {
            subroutine: Subroutine::Compiled(block),
            end,
        });
    }

    pub fn get(&self, addr: u32, thumb: bool) -> Option<&Subroutine<B>> {
        self.blocks.get(&(addr, thumb)).map(|entry| &entry.subroutine)
    }

    /// Forget blocks built from guest code overlapping [start, end).
    pub fn invalidate(&mut self, start: u32, end: u32) {
        let before = self.blocks.len();
        self.blocks.retain(|&(addr, _), entry| entry.end <= start || addr >= end);
        debug!("invalidated {} blocks in {:08X}-{:08X}", before - self.blocks.len(), start, end);
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

fn first_instruction_end(addr: u32, thumb: bool) -> u32 {
    addr.wrapping_add(if thumb {T_SIZE} else {I_SIZE})
}

impl<B> Default for BlockCache<B> {
    fn default() -> Self {
        Self::new()
    }
}
