use tracing::trace;

use crate::{
    core::{
        ExitReason, Instruction,
        constants::{I_SIZE, T_SIZE},
        decode::{decode_arm, decode_thumb},
    },
    memory::Mem32,
};
use super::{
    CompilerError, JitConfig,
    emitter::Emitter,
    regalloc::RegSupplier,
    translate::Translator,
};

/// Compiles guest code into host blocks.
///
/// A block runs until the first redirect, the first instruction that can't be
/// translated, or the size limit.
pub struct BlockCompiler {
    config: JitConfig,
}

impl BlockCompiler {
    pub fn new(config: JitConfig) -> Self {
        Self {
            config
        }
    }

    /// Try and compile the block at addr.
    ///
    /// Returns the block, and the address after the last guest instruction it
    /// was built from.
    pub fn compile<E: Emitter, M: Mem32<Addr = u32>>(&self, addr: u32, thumb: bool, mem: &mut M) -> Result<(E::Block, u32), CompilerError> {
        let mut emitter = E::new()?;
        let mut regs = RegSupplier::new(emitter.allocatable_regs());
        let step = if thumb {T_SIZE} else {I_SIZE};
        let mut translator = Translator::new(&mut regs, &mut emitter, thumb);

        let mut pc = addr;
        let mut count = 0;
        let end = loop {
            let (raw, decoded) = fetch(mem, pc, thumb);
            let instr = match decoded {
                Some(instr) => instr,
                None if count == 0 => return Err(CompilerError::Untranslatable{addr: pc, instr: raw}),
                None => {
                    trace!("{:08X}: {:08X} left for the interpreter", pc, raw);
                    translator.finish_block(pc, ExitReason::Interpret);
                    break pc;
                }
            };
            trace!("{:08X}: {}", pc, instr);

            match translator.translate(pc, &instr) {
                Ok(true) => {},
                Ok(false) => {
                    count += 1;
                    break pc.wrapping_add(step);
                },
                // Rejected before anything was emitted for it.
                Err(e @ CompilerError::FlagSetWithPcOperand{..}) if count > 0 => {
                    trace!("{:08X}: {} left for the interpreter", pc, e);
                    translator.finish_block(pc, ExitReason::Interpret);
                    break pc;
                },
                Err(e) => return Err(e),
            }
            count += 1;
            pc = pc.wrapping_add(step);
            if count >= self.config.max_block_instructions {
                translator.finish_block(pc, ExitReason::Continue);
                break pc;
            }
        };

        trace!("block at {:08X}: {} instructions", addr, count);
        Ok((emitter.finish()?, end))
    }
}

fn fetch<M: Mem32<Addr = u32>>(mem: &mut M, pc: u32, thumb: bool) -> (u32, Option<Instruction>) {
    if thumb {
        let i = mem.load_halfword(pc);
        (i as u32, decode_thumb(i))
    } else {
        let i = mem.load_word(pc);
        (i, decode_arm(i))
    }
}
