//! Architecture relocators.
//!
//! A relocator applies one relocation record to a loaded image once the
//! relocation engine has resolved the referenced symbol. The crate ships
//! relocators for RISC-V and Xtensa; other targets implement [`ArchRelocator`]
//! themselves, using [`read_u32`] and [`write_u32`] to touch the image.

mod riscv32;
mod xtensa;

pub use riscv32::Riscv32;
pub use xtensa::{EM_XTENSA, Xtensa};

use crate::{
    Result,
    elf::{ElfRela, ElfSymbol},
    relocate_error,
    segment::AddressSpace,
};

cfg_if::cfg_if! {
    if #[cfg(target_arch = "riscv32")] {
        /// The relocator of the target this crate is compiled for.
        pub type NativeRelocator = Riscv32;
    } else if #[cfg(target_arch = "xtensa")] {
        /// The relocator of the target this crate is compiled for.
        pub type NativeRelocator = Xtensa;
    }
}

/// Applies relocation records for one instruction set.
pub trait ArchRelocator: Send + Sync {
    /// The `e_machine` value of files this relocator understands.
    fn machine(&self) -> u16;

    /// Applies `rela` to `image`.
    ///
    /// `addr` is the resolved address of `sym`, or `0` when the record has no
    /// symbol. The fixup site `rela.r_offset()` is a file virtual address and
    /// must be reached through `image`; nothing outside the image may be written.
    ///
    /// Returns [`crate::Error::UnsupportedRelocation`] for unknown types.
    fn relocate(
        &self,
        image: &dyn AddressSpace,
        rela: &ElfRela,
        sym: &ElfSymbol,
        addr: usize,
    ) -> Result<()>;

    /// Human readable name of a relocation type.
    fn rel_type_to_str(&self, _r_type: u32) -> &'static str {
        "UNKNOWN"
    }
}

impl<R: ArchRelocator + ?Sized> ArchRelocator for alloc::sync::Arc<R> {
    fn machine(&self) -> u16 {
        (**self).machine()
    }

    fn relocate(
        &self,
        image: &dyn AddressSpace,
        rela: &ElfRela,
        sym: &ElfSymbol,
        addr: usize,
    ) -> Result<()> {
        (**self).relocate(image, rela, sym, addr)
    }

    fn rel_type_to_str(&self, r_type: u32) -> &'static str {
        (**self).rel_type_to_str(r_type)
    }
}

/// Reads the 32-bit word at file virtual address `vaddr`.
pub fn read_u32(image: &dyn AddressSpace, vaddr: usize) -> Result<u32> {
    let addr = image
        .translate_range(vaddr, 4)
        .ok_or_else(|| relocate_error("fixup site lies outside the image"))?;
    // SAFETY: `AddressSpace` guarantees the range is owned, mapped memory.
    Ok(unsafe { core::ptr::read_unaligned(addr as *const u32) })
}

/// Writes the 32-bit word at file virtual address `vaddr`.
pub fn write_u32(image: &dyn AddressSpace, vaddr: usize, value: u32) -> Result<()> {
    let addr = image
        .translate_range(vaddr, 4)
        .ok_or_else(|| relocate_error("fixup site lies outside the image"))?;
    // SAFETY: `AddressSpace` guarantees the range is owned, mapped memory.
    unsafe { core::ptr::write_unaligned(addr as *mut u32, value) };
    Ok(())
}

/// Address that running code uses for file virtual address `vaddr`, as a 32-bit word.
pub(crate) fn target_of(image: &dyn AddressSpace, vaddr: usize) -> Result<u32> {
    image
        .map_symbol(vaddr)
        .map(|addr| addr as u32)
        .ok_or_else(|| relocate_error("relative relocation target lies outside the image"))
}
