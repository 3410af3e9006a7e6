//! Section layout: `.text` in executable memory, the data sections packed
//! into one writable block.

use super::{
    AddressSpace, ElfMemory, ElfSection, LoadedImage, SECTION_COUNT, SectionKind, SectionTable,
};
use crate::{
    Layout, Result,
    elf::{ElfFile, Shdr},
    os::{Allocator, CacheMirror, MemCaps},
    segment_error,
};
use alloc::{sync::Arc, vec::Vec};
use elf::abi::{SHF_ALLOC, SHF_EXECINSTR, SHF_WRITE, SHT_NOBITS, SHT_PROGBITS};

/// Order of the sub-regions inside the data block.
const DATA_ORDER: [SectionKind; 4] = [
    SectionKind::Data,
    SectionKind::Rodata,
    SectionKind::DataRelRo,
    SectionKind::Bss,
];

const FLAGS_MASK: u32 = (SHF_ALLOC | SHF_WRITE | SHF_EXECINSTR) as u32;
const TEXT_FLAGS: u32 = (SHF_ALLOC | SHF_EXECINSTR) as u32;
const DATA_FLAGS: u32 = (SHF_ALLOC | SHF_WRITE) as u32;
const RODATA_FLAGS: u32 = SHF_ALLOC as u32;

/// Decides which slot of the section table a section header fills.
fn classify(name: &str, shdr: &Shdr) -> Option<SectionKind> {
    let flags = shdr.sh_flags & FLAGS_MASK;
    let kind = match (shdr.sh_type, flags, name) {
        (SHT_PROGBITS, TEXT_FLAGS, ".text") => SectionKind::Text,
        (SHT_PROGBITS, DATA_FLAGS, ".data") => SectionKind::Data,
        (SHT_PROGBITS, DATA_FLAGS, ".data.rel.ro") => SectionKind::DataRelRo,
        (SHT_PROGBITS, RODATA_FLAGS, ".rodata") => SectionKind::Rodata,
        (SHT_NOBITS, DATA_FLAGS, ".bss") => SectionKind::Bss,
        _ => return None,
    };
    Some(kind)
}

/// An image whose text lives apart from its data.
pub struct SectionImage {
    text: ElfMemory,
    data: Option<ElfMemory>,
    table: SectionTable,
    entry: Option<usize>,
    cache: Arc<dyn CacheMirror>,
    mapped: bool,
}

impl SectionImage {
    /// Places the `.text`, `.data`, `.rodata`, `.data.rel.ro` and `.bss` sections of `file`.
    pub(crate) fn load(
        file: &ElfFile,
        allocator: &Arc<dyn Allocator>,
        cache: Arc<dyn CacheMirror>,
    ) -> Result<Self> {
        let shdrs = file.shdrs()?;
        let shstrtab = file
            .shstrtab(&shdrs)
            .ok_or_else(|| segment_error("missing section header string table"))?;

        let mut table = SectionTable::default();
        let mut contents: [&[u8]; SECTION_COUNT] = [&[]; SECTION_COUNT];
        for shdr in shdrs.iter() {
            if shdr.sh_type == SHT_PROGBITS && shdr.sh_size == 0 {
                continue;
            }
            let name = file.str_at(shstrtab, shdr.sh_name as usize)?;
            let Some(kind) = classify(name, shdr) else {
                continue;
            };
            let size = match kind {
                SectionKind::Text => shdr
                    .sh_size
                    .checked_add(3)
                    .map(|size| size & !3)
                    .ok_or_else(|| segment_error(".text size overflows the address space"))?,
                _ => shdr.sh_size,
            } as usize;
            if kind != SectionKind::Bss {
                contents[kind as usize] = file.section_data(shdr)?;
            }
            table.set(
                kind,
                ElfSection {
                    v_addr: shdr.sh_addr as usize,
                    offset: shdr.sh_offset as usize,
                    addr: 0,
                    size,
                },
            );
        }

        let text_size = table.get(SectionKind::Text).size;
        if text_size == 0 {
            return Err(segment_error("no .text section to load"));
        }
        // Sizes come from 32-bit headers; the packed data block must fit in 32 bits too.
        let data_size = DATA_ORDER
            .iter()
            .try_fold(0u32, |total, kind| {
                u32::try_from(table.get(*kind).size)
                    .ok()
                    .and_then(|size| total.checked_add(size))
            })
            .ok_or_else(|| segment_error("data sections overflow the address space"))?
            as usize;

        let text = ElfMemory::zeroed(allocator, text_size, MemCaps::EXEC)?;
        text.copy_in(0, contents[SectionKind::Text as usize])?;
        table.get_mut(SectionKind::Text).addr = text.addr();

        let data = if data_size != 0 {
            let data = ElfMemory::zeroed(allocator, data_size, MemCaps::DATA)?;
            let mut offset = 0;
            for kind in DATA_ORDER {
                let sec = table.get_mut(kind);
                if sec.size == 0 {
                    continue;
                }
                sec.addr = data.addr() + offset;
                if kind != SectionKind::Bss {
                    data.copy_in(offset, contents[kind as usize])?;
                }
                offset += sec.size;
            }
            Some(data)
        } else {
            None
        };

        #[cfg(feature = "log")]
        for (kind, sec) in table.iter().filter(|(_, sec)| sec.size != 0) {
            log::trace!(
                "[section] {} vaddr {:#x} size {:#x} placed at {:#x}",
                kind.name(),
                sec.v_addr,
                sec.size,
                sec.addr
            );
        }

        let mut image = Self {
            text,
            data,
            table,
            entry: None,
            cache,
            mapped: false,
        };
        let text = *image.table.get(SectionKind::Text);
        let e_entry = file.ehdr().e_entry();
        if e_entry >= text.v_addr && e_entry - text.v_addr < text.size {
            image.entry = Some(e_entry - text.v_addr + image.cache.to_ibus(text.addr));
        } else {
            #[cfg(feature = "log")]
            log::warn!("[section] entry {:#x} lies outside .text", e_entry);
        }
        Ok(image)
    }

    #[inline]
    pub fn text(&self) -> &ElfMemory {
        &self.text
    }

    #[inline]
    pub fn data(&self) -> Option<&ElfMemory> {
        self.data.as_ref()
    }
}

unsafe impl AddressSpace for SectionImage {
    fn translate(&self, vaddr: usize) -> Option<usize> {
        self.table.find(vaddr).map(|(_, addr)| addr)
    }

    fn map_symbol(&self, vaddr: usize) -> Option<usize> {
        self.table.find(vaddr).map(|(kind, addr)| match kind {
            SectionKind::Text => self.cache.to_ibus(addr),
            _ => addr,
        })
    }
}

impl LoadedImage for SectionImage {
    fn layout(&self) -> Layout {
        Layout::Sections
    }

    fn entry(&self) -> Option<usize> {
        self.entry
    }

    fn regions(&self) -> Vec<&ElfMemory> {
        let mut regions = Vec::with_capacity(2);
        regions.push(&self.text);
        regions.extend(self.data.as_ref());
        regions
    }

    fn sections(&self) -> Option<&SectionTable> {
        Some(&self.table)
    }

    fn finalize(&mut self) -> Result<()> {
        // The instruction bus must not see the text before the writes reach memory.
        self.cache.writeback(self.text.addr(), self.text.len());
        if let Some(data) = &self.data {
            self.cache.writeback(data.addr(), data.len());
        }
        self.cache.map_text(self.text.addr(), self.text.len())?;
        self.mapped = true;
        Ok(())
    }
}

impl Drop for SectionImage {
    fn drop(&mut self) {
        if self.mapped {
            self.cache.unmap_text(self.text.addr(), self.text.len());
        }
    }
}
