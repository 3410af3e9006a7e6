use super::{ArchRelocator, target_of, write_u32};
use crate::{
    Result,
    elf::{ElfRela, ElfSymbol},
    segment::AddressSpace,
    unsupported_relocation,
};
use elf::abi::*;

/// Relocator for RV32 modules linked as position independent shared objects.
#[derive(Debug, Default, Clone, Copy)]
pub struct Riscv32;

impl ArchRelocator for Riscv32 {
    fn machine(&self) -> u16 {
        EM_RISCV
    }

    fn relocate(
        &self,
        image: &dyn AddressSpace,
        rela: &ElfRela,
        _sym: &ElfSymbol,
        addr: usize,
    ) -> Result<()> {
        let site = rela.r_offset();
        match rela.r_type() {
            R_RISCV_NONE => {}
            R_RISCV_32 => {
                write_u32(image, site, (addr as u32).wrapping_add(rela.r_addend() as u32))?
            }
            R_RISCV_RELATIVE => {
                let target = target_of(image, rela.r_addend() as u32 as usize)?;
                write_u32(image, site, target)?
            }
            R_RISCV_JUMP_SLOT => write_u32(image, site, addr as u32)?,
            r_type => {
                return Err(unsupported_relocation(r_type, self.rel_type_to_str(r_type)));
            }
        }
        #[cfg(feature = "log")]
        log::trace!(
            "[riscv32] {} at {:#x} -> {:#x}",
            self.rel_type_to_str(rela.r_type()),
            site,
            addr
        );
        Ok(())
    }

    fn rel_type_to_str(&self, r_type: u32) -> &'static str {
        match r_type {
            R_RISCV_NONE => "R_RISCV_NONE",
            R_RISCV_32 => "R_RISCV_32",
            R_RISCV_RELATIVE => "R_RISCV_RELATIVE",
            R_RISCV_COPY => "R_RISCV_COPY",
            R_RISCV_JUMP_SLOT => "R_RISCV_JUMP_SLOT",
            R_RISCV_IRELATIVE => "R_RISCV_IRELATIVE",
            _ => "UNKNOWN",
        }
    }
}
