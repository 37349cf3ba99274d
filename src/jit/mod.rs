// Just-in-time compilation

mod block;
mod cache;
pub mod emitter;
pub mod regalloc;
pub mod trace;
mod translate;
#[cfg(target_arch = "x86_64")]
pub mod x64;

#[cfg(test)]
mod test_utils;

use std::rc::Rc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    core::{ExitReason, GuestState},
    memory::Mem32,
};

pub use block::BlockCompiler;
pub use cache::{BlockCache, Subroutine};
pub use emitter::Emitter;
pub use translate::Translator;

/// Possible reasons why a block could not be compiled.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CompilerError {
    /// The first instruction of the block can't be translated.
    #[error("instruction {instr:08X} at {addr:08X} cannot be translated")]
    Untranslatable{addr: u32, instr: u32},
    /// S bit set on a form that folds PC into a constant.
    #[error("flag-setting instruction at {addr:08X} uses PC as an operand")]
    FlagSetWithPcOperand{addr: u32},
    /// Every host register is in use by the current instruction.
    #[error("out of host registers")]
    OutOfHostRegisters,
    #[error("assembler error: {0}")]
    Assembler(String),
}

/// Tuning for the compiler.
#[derive(Clone, Debug)]
pub struct JitConfig {
    /// Blocks are cut after this many instructions.
    pub max_block_instructions: usize,
    /// When a block has been entered this many times, compile it.
    pub run_threshold: usize,
}

impl Default for JitConfig {
    fn default() -> Self {
        Self {
            max_block_instructions: 256,
            run_threshold:          2,
        }
    }
}

/// Compiled code for a block.
pub trait CompiledBlock {
    /// Run the block, leaving the next PC and the exit reason in the state.
    fn run(&self, state: &mut GuestState) -> ExitReason;
}

/// Ties the block compiler and the block cache together.
pub struct Jit<E: Emitter> {
    compiler:   BlockCompiler,
    cache:      BlockCache<E::Block>,
    config:     JitConfig,
}

impl<E: Emitter> Jit<E> {
    pub fn new(config: JitConfig) -> Self {
        Self {
            compiler:   BlockCompiler::new(config.clone()),
            cache:      BlockCache::new(),
            config,
        }
    }

    /// Run the block at the current PC.
    ///
    /// Returns None if the block isn't compiled (yet), in which case the caller
    /// should interpret it.
    pub fn run_block<M: Mem32<Addr = u32>>(&mut self, state: &mut GuestState, mem: &mut M) -> Option<ExitReason> {
        let addr = state.pc();
        let thumb = state.is_thumb();
        match self.cache.visit(addr, thumb) {
            Subroutine::Compiled(block) => Some(block.run(state)),
            Subroutine::CannotCompile => None,
            Subroutine::Run(n) if n >= self.config.run_threshold => {
                match self.compiler.compile::<E, M>(addr, thumb, mem) {
                    Ok((block, end)) => {
                        debug!("compiled block {:08X}-{:08X} after {} runs", addr, end, n);
                        let block = Rc::new(block);
                        self.cache.insert_compiled(addr, thumb, block.clone(), end);
                        Some(block.run(state))
                    },
                    Err(e) => {
                        warn!("block at {:08X} cannot be compiled: {}", addr, e);
                        self.cache.insert(addr, thumb, Subroutine::CannotCompile);
                        None
                    }
                }
            },
            Subroutine::Run(_) => None,
        }
    }

    /// Drop compiled code for blocks built from guest code in [start, end), after it is modified.
    pub fn invalidate(&mut self, start: u32, end: u32) {
        self.cache.invalidate(start, end);
    }

    pub fn cache(&self) -> &BlockCache<E::Block> {
        &self.cache
    }
}
