//! Segment layout: one contiguous block following the program headers.

use super::{AddressSpace, ElfMemory, LoadedImage};
use crate::{
    Layout, Result,
    elf::{ElfFile, Phdr},
    os::{Allocator, CacheMirror, MemCaps},
    segment_error,
};
use alloc::{sync::Arc, vec, vec::Vec};
use core::ops::Range;
use elf::abi::PT_LOAD;

/// Padding before a segment above which the layout is reported as suspicious.
pub const SEGMENT_GAP: usize = 1024;

/// Computes the virtual address span `[start, end)` covered by the loadable segments.
///
/// Segments must be ordered and must not overlap. A gap wider than
/// [`SEGMENT_GAP`] is allowed but logged, since it usually means the linker
/// script and the loader disagree.
pub(crate) fn segment_span(phdrs: &[Phdr]) -> Result<Range<usize>> {
    let mut span: Option<Range<usize>> = None;
    for phdr in phdrs.iter().filter(|phdr| phdr.p_type == PT_LOAD) {
        if phdr.p_memsz < phdr.p_filesz {
            return Err(segment_error("p_memsz is smaller than p_filesz"));
        }
        let start = phdr.p_vaddr as usize;
        let end = phdr
            .p_vaddr
            .checked_add(phdr.p_memsz)
            .ok_or_else(|| segment_error("segment address range overflows"))? as usize;
        span = Some(match span {
            None => start..end,
            Some(prev) => {
                if start < prev.end {
                    return Err(segment_error("loadable segments overlap or are out of order"));
                }
                if start - prev.end > SEGMENT_GAP {
                    #[cfg(feature = "log")]
                    log::warn!(
                        "[segment] gap of {:#x} bytes before segment at {:#x}",
                        start - prev.end,
                        start
                    );
                }
                prev.start..end
            }
        });
    }
    match span {
        Some(span) if !span.is_empty() => Ok(span),
        _ => Err(segment_error("loadable segments span no memory")),
    }
}

/// An image placed in one executable and writable block.
pub struct SegmentImage {
    memory: ElfMemory,
    svaddr: usize,
    entry: Option<usize>,
    cache: Arc<dyn CacheMirror>,
}

impl SegmentImage {
    /// Copies every loadable segment of `file` into a freshly allocated block.
    ///
    /// All structural checks happen before the block is allocated.
    pub(crate) fn load(
        file: &ElfFile,
        allocator: &Arc<dyn Allocator>,
        cache: Arc<dyn CacheMirror>,
    ) -> Result<Self> {
        let phdrs = file.phdrs()?;
        let span = segment_span(&phdrs)?;
        let contents = phdrs
            .iter()
            .filter(|phdr| phdr.p_type == PT_LOAD)
            .map(|phdr| {
                let bytes = file.bytes(phdr.p_offset as usize, phdr.p_filesz as usize)?;
                Ok((phdr.p_vaddr as usize - span.start, bytes))
            })
            .collect::<Result<Vec<_>>>()?;

        let memory = ElfMemory::zeroed(allocator, span.len(), MemCaps::EXEC | MemCaps::DATA)?;
        for (offset, bytes) in contents {
            memory.copy_in(offset, bytes)?;
            #[cfg(feature = "log")]
            log::trace!(
                "[segment] copied {:#x} bytes to {:#x}",
                bytes.len(),
                memory.addr() + offset
            );
        }

        let mut image = Self {
            memory,
            svaddr: span.start,
            entry: None,
            cache,
        };
        image.entry = image.map_symbol(file.ehdr().e_entry());
        if image.entry.is_none() {
            #[cfg(feature = "log")]
            log::warn!(
                "[segment] entry {:#x} lies outside the loaded image",
                file.ehdr().e_entry()
            );
        }
        Ok(image)
    }

    /// Lowest virtual address covered by the block.
    #[inline]
    pub fn svaddr(&self) -> usize {
        self.svaddr
    }

    #[inline]
    pub fn memory(&self) -> &ElfMemory {
        &self.memory
    }
}

unsafe impl AddressSpace for SegmentImage {
    fn translate(&self, vaddr: usize) -> Option<usize> {
        let offset = vaddr.checked_sub(self.svaddr)?;
        (offset < self.memory.len()).then(|| self.memory.addr() + offset)
    }
}

impl LoadedImage for SegmentImage {
    fn layout(&self) -> Layout {
        Layout::Segments
    }

    fn entry(&self) -> Option<usize> {
        self.entry
    }

    fn regions(&self) -> Vec<&ElfMemory> {
        vec![&self.memory]
    }

    fn finalize(&mut self) -> Result<()> {
        self.cache.writeback(self.memory.addr(), self.memory.len());
        Ok(())
    }
}
