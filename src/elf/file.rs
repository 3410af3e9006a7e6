use super::{
    ElfHeader, ElfRela, ElfSymbol,
    defs::{PHDR_SIZE, Phdr, RELA_SIZE, SHDR_SIZE, SYM_SIZE, Shdr, read_record},
};
use crate::{Result, segment_error};
use alloc::vec::Vec;
use core::ffi::CStr;
use elf::abi::SHN_UNDEF;

/// A borrowed ELF32 file with bounds-checked accessors.
pub(crate) struct ElfFile<'data> {
    data: &'data [u8],
    ehdr: ElfHeader,
}

impl<'data> ElfFile<'data> {
    pub(crate) fn parse(data: &'data [u8]) -> Result<Self> {
        let ehdr = ElfHeader::new(data)?;
        Ok(Self { data, ehdr })
    }

    #[inline]
    pub(crate) fn ehdr(&self) -> &ElfHeader {
        &self.ehdr
    }

    /// Returns `len` bytes at file offset `offset`.
    pub(crate) fn bytes(&self, offset: usize, len: usize) -> Result<&'data [u8]> {
        offset
            .checked_add(len)
            .and_then(|end| self.data.get(offset..end))
            .ok_or_else(|| segment_error("file range lies outside the buffer"))
    }

    pub(crate) fn phdrs(&self) -> Result<Vec<Phdr>> {
        let phoff = self.ehdr.e_phoff();
        (0..self.ehdr.e_phnum())
            .map(|idx| {
                read_record(self.data, phoff.saturating_add(idx * PHDR_SIZE))
                    .ok_or_else(|| segment_error("program header table lies outside the buffer"))
            })
            .collect()
    }

    pub(crate) fn shdrs(&self) -> Result<Vec<Shdr>> {
        let shoff = self.ehdr.e_shoff();
        (0..self.ehdr.e_shnum())
            .map(|idx| {
                read_record(self.data, shoff.saturating_add(idx * SHDR_SIZE))
                    .ok_or_else(|| segment_error("section header table lies outside the buffer"))
            })
            .collect()
    }

    /// The section header string table, if the file names its sections.
    pub(crate) fn shstrtab<'s>(&self, shdrs: &'s [Shdr]) -> Option<&'s Shdr> {
        let idx = self.ehdr.e_shstrndx();
        if idx == SHN_UNDEF as usize {
            return None;
        }
        shdrs.get(idx)
    }

    /// Reads the NUL terminated string at `offset` in string table `strtab`.
    pub(crate) fn str_at(&self, strtab: &Shdr, offset: usize) -> Result<&'data str> {
        let table = self.bytes(strtab.sh_offset as usize, strtab.sh_size as usize)?;
        let tail = table
            .get(offset..)
            .ok_or_else(|| segment_error("string offset lies outside its table"))?;
        CStr::from_bytes_until_nul(tail)
            .ok()
            .and_then(|name| name.to_str().ok())
            .ok_or_else(|| segment_error("malformed string table entry"))
    }

    /// The raw contents of a file-backed section.
    #[inline]
    pub(crate) fn section_data(&self, shdr: &Shdr) -> Result<&'data [u8]> {
        self.bytes(shdr.sh_offset as usize, shdr.sh_size as usize)
    }

    /// Copies relocation record `idx` out of relocation section `shdr`.
    pub(crate) fn rela(&self, shdr: &Shdr, idx: usize) -> Result<ElfRela> {
        let table = self.section_data(shdr)?;
        read_record(table, idx.saturating_mul(RELA_SIZE))
            .map(ElfRela::from_raw)
            .ok_or_else(|| segment_error("relocation record lies outside its section"))
    }

    /// Number of entries in a symbol table section.
    #[inline]
    pub(crate) fn symbol_count(&self, symtab: &Shdr) -> usize {
        symtab.sh_size as usize / SYM_SIZE
    }

    /// Copies symbol `idx` out of symbol table `symtab`.
    pub(crate) fn symbol(&self, symtab: &Shdr, idx: usize) -> Result<ElfSymbol> {
        let table = self.section_data(symtab)?;
        read_record(table, idx.saturating_mul(SYM_SIZE))
            .map(ElfSymbol::from_raw)
            .ok_or_else(|| segment_error("symbol index lies outside its table"))
    }
}
