//! Memory regions and address translation of a loaded ELF image.
//!
//! An image is produced by one of two strategies:
//! * [`SegmentImage`] copies every `PT_LOAD` segment into one block.
//! * [`SectionImage`] copies `.text` into executable memory and the data
//!   sections into a second, writable block.
//!
//! Both expose the same [`AddressSpace`], so relocation and execution never
//! care which one was used.

mod phdr;
mod shdr;

pub use phdr::{SEGMENT_GAP, SegmentImage};
pub use shdr::SectionImage;

use crate::{
    Layout, Result,
    os::{Allocator, MemCaps},
    out_of_memory, segment_error,
};
use alloc::{sync::Arc, vec::Vec};
use core::{fmt::Debug, ptr::NonNull};

/// One region of memory obtained from an [`Allocator`] and returned to it on drop.
pub struct ElfMemory {
    ptr: NonNull<u8>,
    len: usize,
    caps: MemCaps,
    allocator: Arc<dyn Allocator>,
}

// The region is plain memory exclusively owned by this value.
unsafe impl Send for ElfMemory {}
unsafe impl Sync for ElfMemory {}

impl Debug for ElfMemory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ElfMemory")
            .field("addr", &self.ptr)
            .field("len", &self.len)
            .field("caps", &self.caps)
            .finish()
    }
}

impl ElfMemory {
    /// Allocates `len` zero-filled bytes.
    pub(crate) fn zeroed(allocator: &Arc<dyn Allocator>, len: usize, caps: MemCaps) -> Result<Self> {
        let ptr = unsafe { allocator.allocate(len, caps) }.ok_or_else(|| out_of_memory(len))?;
        unsafe { ptr.as_ptr().write_bytes(0, len) };
        #[cfg(feature = "log")]
        log::trace!("allocated {:?} region of {:#x} bytes at {:p}", caps, len, ptr);
        Ok(Self {
            ptr,
            len,
            caps,
            allocator: allocator.clone(),
        })
    }

    /// Copies `src` into the region at `offset`.
    pub(crate) fn copy_in(&self, offset: usize, src: &[u8]) -> Result<()> {
        if offset.checked_add(src.len()).is_none_or(|end| end > self.len) {
            return Err(segment_error("copy exceeds the allocated region"));
        }
        unsafe {
            core::ptr::copy_nonoverlapping(src.as_ptr(), self.ptr.as_ptr().add(offset), src.len())
        };
        Ok(())
    }

    /// Host address of the first byte.
    #[inline]
    pub fn addr(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn caps(&self) -> MemCaps {
        self.caps
    }

    /// Views the region as bytes.
    ///
    /// # Safety
    /// Nothing may write to the region (relocation, loaded code) while the
    /// returned slice is alive.
    #[inline]
    pub unsafe fn as_slice(&self) -> &[u8] {
        unsafe { core::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for ElfMemory {
    fn drop(&mut self) {
        #[cfg(feature = "log")]
        log::trace!("freeing region of {:#x} bytes at {:p}", self.len, self.ptr);
        unsafe { self.allocator.deallocate(self.ptr, self.len, self.caps) };
    }
}

/// Translation from file virtual addresses to host addresses.
///
/// # Safety
/// Every address returned by [`AddressSpace::translate`] must point into memory
/// owned by the implementor that is valid for reads and writes while `self` is
/// borrowed. Relocators write through these addresses.
pub unsafe trait AddressSpace {
    /// Host address at which the byte with file virtual address `vaddr` was placed.
    fn translate(&self, vaddr: usize) -> Option<usize>;

    /// Address that running code must use to reach `vaddr`.
    ///
    /// This differs from [`AddressSpace::translate`] only for text seen through an
    /// instruction-bus alias.
    fn map_symbol(&self, vaddr: usize) -> Option<usize> {
        self.translate(vaddr)
    }

    /// Host address of `[vaddr, vaddr + len)` if the whole range is contiguous and mapped.
    fn translate_range(&self, vaddr: usize, len: usize) -> Option<usize> {
        let start = self.translate(vaddr)?;
        if len == 0 {
            return Some(start);
        }
        let last = self.translate(vaddr.checked_add(len - 1)?)?;
        (last.checked_sub(start)? == len - 1).then_some(start)
    }
}

/// A loaded, relocatable image: one of the two layout strategies.
pub trait LoadedImage: AddressSpace + Send + Sync {
    /// The strategy that produced this image.
    fn layout(&self) -> Layout;

    /// Host address of the entry point, if the file's entry lies inside the image.
    fn entry(&self) -> Option<usize>;

    /// Every memory region owned by the image.
    fn regions(&self) -> Vec<&ElfMemory>;

    /// Section table, for images placed section by section.
    fn sections(&self) -> Option<&SectionTable> {
        None
    }

    /// Called once after all relocations were applied: writes back caches and
    /// engages any instruction-bus mapping.
    fn finalize(&mut self) -> Result<()>;
}

/// Number of entries in a [`SectionTable`].
pub const SECTION_COUNT: usize = 5;

/// The sections placed by the section layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(usize)]
pub enum SectionKind {
    Text = 0,
    Bss,
    Data,
    Rodata,
    DataRelRo,
}

impl SectionKind {
    pub const ALL: [SectionKind; SECTION_COUNT] = [
        SectionKind::Text,
        SectionKind::Bss,
        SectionKind::Data,
        SectionKind::Rodata,
        SectionKind::DataRelRo,
    ];

    /// Section name in the ELF file.
    pub fn name(self) -> &'static str {
        match self {
            SectionKind::Text => ".text",
            SectionKind::Bss => ".bss",
            SectionKind::Data => ".data",
            SectionKind::Rodata => ".rodata",
            SectionKind::DataRelRo => ".data.rel.ro",
        }
    }
}

/// Placement of one section.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ElfSection {
    /// Virtual address declared in the file.
    pub v_addr: usize,
    /// Byte offset of the contents in the file.
    pub offset: usize,
    /// Host address after loading.
    pub addr: usize,
    /// Size in bytes.
    pub size: usize,
}

impl ElfSection {
    #[inline]
    fn contains(&self, vaddr: usize) -> bool {
        vaddr >= self.v_addr && vaddr - self.v_addr < self.size
    }
}

/// Fixed table of section placements, indexed by [`SectionKind`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SectionTable {
    secs: [ElfSection; SECTION_COUNT],
}

impl SectionTable {
    #[inline]
    pub fn get(&self, kind: SectionKind) -> &ElfSection {
        &self.secs[kind as usize]
    }

    #[inline]
    pub fn get_mut(&mut self, kind: SectionKind) -> &mut ElfSection {
        &mut self.secs[kind as usize]
    }

    #[inline]
    pub fn set(&mut self, kind: SectionKind, sec: ElfSection) {
        self.secs[kind as usize] = sec;
    }

    pub fn iter(&self) -> impl Iterator<Item = (SectionKind, &ElfSection)> {
        SectionKind::ALL.into_iter().zip(self.secs.iter())
    }

    /// Finds the section holding `vaddr` and the host address it maps to.
    pub fn find(&self, vaddr: usize) -> Option<(SectionKind, usize)> {
        self.iter()
            .find(|(_, sec)| sec.contains(vaddr))
            .map(|(kind, sec)| (kind, vaddr - sec.v_addr + sec.addr))
    }

    /// Maps a file virtual address to its host address, `0` if no section holds it.
    pub fn map_sym(&self, vaddr: usize) -> usize {
        self.find(vaddr).map_or(0, |(_, addr)| addr)
    }
}
