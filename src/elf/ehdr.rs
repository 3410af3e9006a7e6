//! ELF header parsing and validation

use super::defs::{EHDR_SIZE, Ehdr, PHDR_SIZE, SHDR_SIZE, read_record};
use crate::{Result, parse_ehdr_error};
use core::ops::Deref;
use elf::abi::{EI_CLASS, EI_DATA, EI_VERSION, ELFCLASS32, ELFDATA2LSB, ELFMAGIC, EV_CURRENT};

/// A copy of the ELF32 file header.
#[repr(transparent)]
pub struct ElfHeader {
    ehdr: Ehdr,
}

impl Deref for ElfHeader {
    type Target = Ehdr;

    fn deref(&self) -> &Self::Target {
        &self.ehdr
    }
}

impl ElfHeader {
    /// Parses and validates the header at the start of `data`.
    pub(crate) fn new(data: &[u8]) -> Result<Self> {
        let ehdr: Ehdr = read_record(data, 0)
            .ok_or_else(|| parse_ehdr_error("buffer is smaller than an ELF header"))?;
        let ehdr = ElfHeader { ehdr };
        ehdr.vaildate()?;
        Ok(ehdr)
    }

    pub(crate) fn vaildate(&self) -> Result<()> {
        if self.e_ident[0..4] != ELFMAGIC {
            return Err(parse_ehdr_error("invalid ELF magic"));
        }
        if self.e_ident[EI_CLASS] != ELFCLASS32 {
            return Err(parse_ehdr_error("file class mismatch"));
        }
        if self.e_ident[EI_DATA] != ELFDATA2LSB {
            return Err(parse_ehdr_error("only little-endian files are supported"));
        }
        if self.e_ident[EI_VERSION] != EV_CURRENT {
            return Err(parse_ehdr_error("invalid ELF version"));
        }
        if self.e_phnum != 0 && self.e_phentsize() != PHDR_SIZE {
            return Err(parse_ehdr_error("unexpected program header entry size"));
        }
        if self.e_shnum != 0 && self.e_shentsize() != SHDR_SIZE {
            return Err(parse_ehdr_error("unexpected section header entry size"));
        }
        Ok(())
    }

    /// Rejects files built for another machine.
    pub(crate) fn check_machine(&self, machine: u16) -> Result<()> {
        if self.e_machine != machine {
            return Err(parse_ehdr_error("file arch mismatch"));
        }
        Ok(())
    }

    /// File virtual address of the entry point.
    #[inline]
    pub fn e_entry(&self) -> usize {
        self.ehdr.e_entry as usize
    }

    #[inline]
    pub(crate) fn e_phnum(&self) -> usize {
        self.ehdr.e_phnum as usize
    }

    #[inline]
    pub(crate) fn e_phentsize(&self) -> usize {
        self.ehdr.e_phentsize as usize
    }

    #[inline]
    pub(crate) fn e_phoff(&self) -> usize {
        self.ehdr.e_phoff as usize
    }

    #[inline]
    pub(crate) fn e_shoff(&self) -> usize {
        self.ehdr.e_shoff as usize
    }

    #[inline]
    pub(crate) fn e_shentsize(&self) -> usize {
        self.ehdr.e_shentsize as usize
    }

    #[inline]
    pub(crate) fn e_shnum(&self) -> usize {
        self.ehdr.e_shnum as usize
    }

    #[inline]
    pub(crate) fn e_shstrndx(&self) -> usize {
        self.ehdr.e_shstrndx as usize
    }
}

const _: () = assert!(EHDR_SIZE == 52);
