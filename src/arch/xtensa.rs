use super::{ArchRelocator, read_u32, target_of, write_u32};
use crate::{
    Result,
    elf::{ElfRela, ElfSymbol},
    segment::AddressSpace,
    unsupported_relocation,
};

pub const EM_XTENSA: u16 = 94;

const R_XTENSA_NONE: u32 = 0;
const R_XTENSA_32: u32 = 1;
const R_XTENSA_RTLD: u32 = 2;
const R_XTENSA_GLOB_DAT: u32 = 3;
const R_XTENSA_JMP_SLOT: u32 = 4;
const R_XTENSA_RELATIVE: u32 = 5;
const R_XTENSA_PLT: u32 = 6;

/// Relocator for Xtensa modules linked as position independent shared objects.
#[derive(Debug, Default, Clone, Copy)]
pub struct Xtensa;

impl ArchRelocator for Xtensa {
    fn machine(&self) -> u16 {
        EM_XTENSA
    }

    fn relocate(
        &self,
        image: &dyn AddressSpace,
        rela: &ElfRela,
        _sym: &ElfSymbol,
        addr: usize,
    ) -> Result<()> {
        let site = rela.r_offset();
        let addend = rela.r_addend() as u32;
        match rela.r_type() {
            R_XTENSA_NONE | R_XTENSA_RTLD => {}
            // The link-time value of the word is a file virtual address.
            R_XTENSA_RELATIVE => {
                let vaddr = read_u32(image, site)?.wrapping_add(addend);
                let target = target_of(image, vaddr as usize)?;
                write_u32(image, site, target)?
            }
            R_XTENSA_GLOB_DAT | R_XTENSA_JMP_SLOT => {
                write_u32(image, site, (addr as u32).wrapping_add(addend))?
            }
            R_XTENSA_32 => {
                let value = read_u32(image, site)?
                    .wrapping_add(addr as u32)
                    .wrapping_add(addend);
                write_u32(image, site, value)?
            }
            r_type => {
                return Err(unsupported_relocation(r_type, self.rel_type_to_str(r_type)));
            }
        }
        #[cfg(feature = "log")]
        log::trace!(
            "[xtensa] {} at {:#x} -> {:#x}",
            self.rel_type_to_str(rela.r_type()),
            site,
            addr
        );
        Ok(())
    }

    fn rel_type_to_str(&self, r_type: u32) -> &'static str {
        match r_type {
            R_XTENSA_NONE => "R_XTENSA_NONE",
            R_XTENSA_32 => "R_XTENSA_32",
            R_XTENSA_RTLD => "R_XTENSA_RTLD",
            R_XTENSA_GLOB_DAT => "R_XTENSA_GLOB_DAT",
            R_XTENSA_JMP_SLOT => "R_XTENSA_JMP_SLOT",
            R_XTENSA_RELATIVE => "R_XTENSA_RELATIVE",
            R_XTENSA_PLT => "R_XTENSA_PLT",
            _ => "UNKNOWN",
        }
    }
}
