//! Mapping between memory addresses and source lines.

use std::collections::HashMap;
use std::iter::FromIterator;

/// Mapping from memory addresses to the 1-based source line whose
/// instruction was assembled there.
///
/// Recorded by the assembler for every opcode word and carried through to
/// the machine for diagnostics; execution itself never consults it.
#[derive(Debug, Clone, Default)]
pub struct SourceMap {
    inner: HashMap<u16, usize>,
}

impl SourceMap {
    /// Returns the source line that produced the instruction at `address`,
    /// if the address holds the first word of an assembled instruction.
    pub fn source_line(&self, address: u16) -> Option<usize> {
        self.inner.get(&address).copied()
    }

    pub(crate) fn insert(&mut self, address: u16, line: usize) {
        self.inner.insert(address, line);
    }
}

impl FromIterator<(u16, usize)> for SourceMap {
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = (u16, usize)>,
    {
        SourceMap {
            inner: HashMap::from_iter(iter),
        }
    }
}
