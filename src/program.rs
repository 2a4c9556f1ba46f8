//! The compiled artifact produced by the assembler.

use crate::source_map::SourceMap;

/// Capacity of the machine's memory, in 16-bit words.
///
/// Code and stack share this one address space; nothing is reserved for
/// either. Programs are responsible for not letting them overlap.
pub const MEMORY_WORDS: usize = 1024;

/// A compiled memory image together with the metadata needed to load it.
///
/// Produced by [compile](crate::assembler::compile) and consumed by
/// [Machine::new](crate::emulator::Machine::new), which takes over the
/// memory without copying it.
#[derive(Debug, Clone)]
pub struct Program {
    /// The memory image, [MEMORY_WORDS] long. Words past [Program::size]
    /// are zero and free for the program's stack.
    pub memory: Vec<u16>,

    /// The address execution starts at: the procedure named `main`, or 0
    /// if the program defines none.
    pub entrypoint: u16,

    /// The first free word after the assembled program. The loader points
    /// `sp` here.
    pub size: u16,

    /// Address-to-source-line mapping for diagnostics.
    pub source_map: SourceMap,
}

impl Program {
    /// The assembled part of the memory image. Capped at the capacity for
    /// programs whose write pointer ran past it.
    pub fn words(&self) -> &[u16] {
        let size = (self.size as usize).min(self.memory.len());
        &self.memory[..size]
    }
}
