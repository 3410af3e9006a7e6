//! ELF32 record definitions.
//!
//! The loader only understands 32-bit little-endian ELF files. Every record is
//! copied out of the source buffer before use, so the buffer may be arbitrarily
//! aligned.

use elf::abi::{SHN_LORESERVE, SHN_UNDEF, STB_GLOBAL, STB_WEAK, STT_FUNC, STT_OBJECT};

pub(crate) type Ehdr = elf::file::Elf32_Ehdr;
pub(crate) type Phdr = elf::segment::Elf32_Phdr;
pub(crate) type Shdr = elf::section::Elf32_Shdr;
pub(crate) type Rela = elf::relocation::Elf32_Rela;
pub(crate) type Sym = Elf32Sym;

pub(crate) const EHDR_SIZE: usize = core::mem::size_of::<Ehdr>();
pub(crate) const PHDR_SIZE: usize = core::mem::size_of::<Phdr>();
pub(crate) const SHDR_SIZE: usize = core::mem::size_of::<Shdr>();
/// Size of one `Elf32_Rela` record.
pub const RELA_SIZE: usize = core::mem::size_of::<Rela>();
/// Size of one `Elf32_Sym` record.
pub const SYM_SIZE: usize = core::mem::size_of::<Sym>();

const REL_MASK: u32 = 0xFF;
const REL_BIT: u32 = 8;

/// 32-bit ELF symbol table entry.
#[repr(C)]
pub(crate) struct Elf32Sym {
    pub st_name: u32,
    pub st_value: u32,
    pub st_size: u32,
    pub st_info: u8,
    pub st_other: u8,
    pub st_shndx: u16,
}

/// Plain ELF records that may be read from any byte pattern.
///
/// # Safety
/// Implementors must be `repr(C)` structs made of integers only.
pub(crate) unsafe trait ElfPod: Sized {}

unsafe impl ElfPod for Ehdr {}
unsafe impl ElfPod for Phdr {}
unsafe impl ElfPod for Shdr {}
unsafe impl ElfPod for Rela {}
unsafe impl ElfPod for Sym {}

/// Copies a record out of `bytes` at `offset`, returning `None` when it does not fit.
#[inline]
pub(crate) fn read_record<T: ElfPod>(bytes: &[u8], offset: usize) -> Option<T> {
    let end = offset.checked_add(size_of::<T>())?;
    if end > bytes.len() {
        return None;
    }
    // SAFETY: the range was checked above and `T` accepts any bit pattern.
    Some(unsafe { core::ptr::read_unaligned(bytes.as_ptr().add(offset).cast::<T>()) })
}

/// ELF RELA relocation entry.
#[repr(transparent)]
pub struct ElfRela {
    rela: Rela,
}

impl ElfRela {
    /// Builds a relocation record from its unpacked fields.
    pub fn new(r_offset: u32, r_type: u32, r_symbol: u32, r_addend: i32) -> Self {
        Self {
            rela: Rela {
                r_offset,
                r_info: (r_symbol << REL_BIT) | (r_type & REL_MASK),
                r_addend,
            },
        }
    }

    pub(crate) fn from_raw(rela: Rela) -> Self {
        Self { rela }
    }

    /// Returns the relocation type.
    #[inline]
    pub fn r_type(&self) -> u32 {
        self.rela.r_info & REL_MASK
    }

    /// Returns the symbol index.
    #[inline]
    pub fn r_symbol(&self) -> usize {
        (self.rela.r_info >> REL_BIT) as usize
    }

    /// Returns the file virtual address of the fixup site.
    #[inline]
    pub fn r_offset(&self) -> usize {
        self.rela.r_offset as usize
    }

    /// Returns the explicit addend.
    #[inline]
    pub fn r_addend(&self) -> i32 {
        self.rela.r_addend
    }
}

/// ELF symbol table entry.
#[repr(transparent)]
pub struct ElfSymbol {
    sym: Sym,
}

impl ElfSymbol {
    /// Builds a symbol entry. `st_info` packs the binding in the high and the type in the low nibble.
    pub fn new(st_name: u32, st_value: u32, st_size: u32, st_info: u8, st_shndx: u16) -> Self {
        Self {
            sym: Sym {
                st_name,
                st_value,
                st_size,
                st_info,
                st_other: 0,
                st_shndx,
            },
        }
    }

    /// The reserved symbol at index 0.
    #[inline]
    pub fn null() -> Self {
        Self::new(0, 0, 0, 0, SHN_UNDEF)
    }

    pub(crate) fn from_raw(sym: Sym) -> Self {
        Self { sym }
    }

    /// Offset of the symbol name in the associated string table.
    #[inline]
    pub fn st_name(&self) -> usize {
        self.sym.st_name as usize
    }

    /// Symbol value, a file virtual address for defined symbols.
    #[inline]
    pub fn st_value(&self) -> usize {
        self.sym.st_value as usize
    }

    #[inline]
    pub fn st_size(&self) -> usize {
        self.sym.st_size as usize
    }

    /// Symbol type (`STT_*`).
    #[inline]
    pub fn st_type(&self) -> u8 {
        self.sym.st_info & 0xf
    }

    /// Symbol binding (`STB_*`).
    #[inline]
    pub fn st_bind(&self) -> u8 {
        self.sym.st_info >> 4
    }

    #[inline]
    pub fn st_shndx(&self) -> u16 {
        self.sym.st_shndx
    }

    /// Whether the symbol lives in a regular section of this object.
    #[inline]
    pub fn is_defined(&self) -> bool {
        self.sym.st_shndx != SHN_UNDEF && self.sym.st_shndx < SHN_LORESERVE
    }

    /// Whether the symbol is a defined global or weak function or object.
    #[inline]
    pub(crate) fn is_export(&self) -> bool {
        self.is_defined()
            && matches!(self.st_bind(), STB_GLOBAL | STB_WEAK)
            && matches!(self.st_type(), STT_FUNC | STT_OBJECT)
    }
}
