//! Relocation of a loaded image.
//!
//! Every `SHT_RELA` section of the file is walked record by record. The symbol a
//! record refers to is resolved either against the host (through a
//! [`SymbolLookup`]) or against the image itself, and the record is then handed
//! to the [`ArchRelocator`] of the target.

mod traits;

pub use traits::SymbolLookup;

use crate::{
    Result,
    arch::ArchRelocator,
    elf::{ElfFile, ElfSymbol, RELA_SIZE, Shdr},
    segment::AddressSpace,
    segment_error,
    symbol::ElfExport,
    unresolved_symbol,
};
use alloc::{string::ToString, vec::Vec};
use elf::abi::{
    SHT_DYNSYM, SHT_REL, SHT_RELA, SHT_SYMTAB, STT_COMMON, STT_FILE, STT_FUNC, STT_NOTYPE,
    STT_OBJECT, STT_SECTION,
};

/// Symbol table and string table a relocation section refers to.
struct SymbolTables<'a> {
    symtab: &'a Shdr,
    strtab: &'a Shdr,
}

impl<'a> SymbolTables<'a> {
    fn linked(shdrs: &'a [Shdr], rela: &Shdr) -> Result<Self> {
        let symtab = shdrs
            .get(rela.sh_link as usize)
            .ok_or_else(|| segment_error("relocation section links to a missing symbol table"))?;
        let strtab = shdrs
            .get(symtab.sh_link as usize)
            .ok_or_else(|| segment_error("symbol table links to a missing string table"))?;
        Ok(Self { symtab, strtab })
    }
}

/// Computes the address a relocation against `sym` must use.
fn resolve(
    image: &dyn AddressSpace,
    resolver: &dyn SymbolLookup,
    sym: &ElfSymbol,
    name: &str,
) -> Result<usize> {
    match sym.st_type() {
        STT_COMMON | STT_OBJECT | STT_SECTION | STT_NOTYPE => {
            if name.is_empty() {
                return Ok(0);
            }
            if let Some(addr) = resolver.lookup(name) {
                return Ok(addr as usize);
            }
            if sym.is_defined() {
                if let Some(addr) = image.map_symbol(sym.st_value()) {
                    return Ok(addr);
                }
            }
            Err(unresolved_symbol(name))
        }
        STT_FUNC | STT_FILE => {
            if sym.st_value() != 0 {
                image
                    .map_symbol(sym.st_value())
                    .ok_or_else(|| unresolved_symbol(name))
            } else {
                resolver
                    .lookup(name)
                    .map(|addr| addr as usize)
                    .ok_or_else(|| unresolved_symbol(name))
            }
        }
        _ => Err(unresolved_symbol(name)),
    }
}

/// Applies every `SHT_RELA` record of `file` to `image`.
///
/// The first failure aborts the walk; the caller drops the image, which returns
/// all of its memory.
pub(crate) fn relocate_sections(
    file: &ElfFile,
    image: &dyn AddressSpace,
    resolver: &dyn SymbolLookup,
    relocator: &dyn ArchRelocator,
) -> Result<()> {
    let shdrs = file.shdrs()?;
    for shdr in shdrs.iter() {
        match shdr.sh_type {
            SHT_RELA => {}
            SHT_REL => {
                #[cfg(feature = "log")]
                log::warn!("[reloc] ignoring SHT_REL section at offset {:#x}", shdr.sh_offset);
                continue;
            }
            _ => continue,
        }
        let tables = SymbolTables::linked(&shdrs, shdr)?;
        let count = shdr.sh_size as usize / RELA_SIZE;
        for idx in 0..count {
            let rela = file.rela(shdr, idx)?;
            let (sym, addr) = match rela.r_symbol() {
                0 => (ElfSymbol::null(), 0),
                sym_idx => {
                    let sym = file.symbol(tables.symtab, sym_idx)?;
                    let name = file.str_at(tables.strtab, sym.st_name())?;
                    let addr = resolve(image, resolver, &sym, name)?;
                    (sym, addr)
                }
            };
            relocator.relocate(image, &rela, &sym, addr)?;
        }
        #[cfg(feature = "log")]
        log::trace!("[reloc] applied {} records from section at offset {:#x}", count, shdr.sh_offset);
    }
    Ok(())
}

/// Collects the symbols `file` exports, mapped to the addresses running code uses.
///
/// The full symbol table is preferred; stripped files fall back to the
/// dynamic symbol table.
pub(crate) fn collect_exports(file: &ElfFile, image: &dyn AddressSpace) -> Result<Vec<ElfExport>> {
    let shdrs = file.shdrs()?;
    let Some(symtab) = shdrs
        .iter()
        .find(|shdr| shdr.sh_type == SHT_SYMTAB)
        .or_else(|| shdrs.iter().find(|shdr| shdr.sh_type == SHT_DYNSYM))
    else {
        return Ok(Vec::new());
    };
    let strtab = shdrs
        .get(symtab.sh_link as usize)
        .ok_or_else(|| segment_error("symbol table links to a missing string table"))?;

    let mut exports = Vec::new();
    for idx in 1..file.symbol_count(symtab) {
        let sym = file.symbol(symtab, idx)?;
        if !sym.is_export() {
            continue;
        }
        let name = file.str_at(strtab, sym.st_name())?;
        if name.is_empty() {
            continue;
        }
        if let Some(addr) = image.map_symbol(sym.st_value()) {
            exports.push(ElfExport {
                name: name.to_string(),
                addr,
            });
        }
    }
    Ok(exports)
}
