//! ELF32 data structures and bounds-checked readers.

mod defs;
mod ehdr;
mod file;

pub(crate) use defs::{Shdr, Phdr};
pub(crate) use file::ElfFile;

/// Relocation and symbol records handed to architecture relocators.
pub use defs::{ElfRela, ElfSymbol, RELA_SIZE, SYM_SIZE};
pub use ehdr::ElfHeader;
/// ELF ABI constants and definitions from the elf crate.
pub use elf::abi::*;
