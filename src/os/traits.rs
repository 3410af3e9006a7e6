use crate::Result;
use bitflags::bitflags;
use core::ptr::NonNull;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    /// Capabilities requested for an allocation.
    ///
    /// On targets that enforce execute-only or no-execute memory attributes the
    /// distinction is load-bearing: code must come from `EXEC` memory, data from
    /// `DATA` memory.
    pub struct MemCaps: u32 {
        /// The region will be fetched as instructions.
        const EXEC = 1;
        /// The region will be read and written as data.
        const DATA = 2;
    }
}

/// A trait for the memory the loader places images in.
///
/// The loader has no virtual memory to work with, so every image region comes
/// from this allocator and goes back to it when the image is dropped.
///
/// # Example
/// ```rust
/// use core::ptr::NonNull;
/// use elf_dlmod::os::{Allocator, MemCaps};
///
/// struct Iram;
///
/// impl Allocator for Iram {
///     unsafe fn allocate(&self, size: usize, caps: MemCaps) -> Option<NonNull<u8>> {
///         // Platform-specific heap with capability selection
///         None
///     }
///
///     unsafe fn deallocate(&self, ptr: NonNull<u8>, size: usize, caps: MemCaps) {}
/// }
/// ```
pub trait Allocator: Send + Sync {
    /// Allocates `size` bytes with the requested capabilities.
    ///
    /// # Safety
    /// Implementations must return memory that is valid for reads and writes of
    /// `size` bytes and is not handed out again until it is deallocated.
    unsafe fn allocate(&self, size: usize, caps: MemCaps) -> Option<NonNull<u8>>;

    /// Returns a region obtained from [`Allocator::allocate`].
    ///
    /// # Safety
    /// `ptr`, `size` and `caps` must match the original allocation, and the
    /// region must not be accessed afterwards.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, size: usize, caps: MemCaps);
}

/// Cache and bus-mirror control for targets whose instruction bus sees the
/// bytes written over the data bus at another address.
///
/// Every method has a default suitable for unified memory, so implementors
/// only override what their hardware needs.
pub trait CacheMirror: Send + Sync {
    /// Returns the instruction-bus alias of a data-bus address.
    fn to_ibus(&self, daddr: usize) -> usize {
        daddr
    }

    /// Writes back any data cache lines covering `[addr, addr + len)`.
    fn writeback(&self, _addr: usize, _len: usize) {}

    /// Makes the text written at `[daddr, daddr + len)` fetchable through the
    /// instruction bus. Called only after [`CacheMirror::writeback`].
    ///
    /// Returns [`crate::Error::NoMmuSlot`] when no mapping unit is free.
    fn map_text(&self, _daddr: usize, _len: usize) -> Result<()> {
        Ok(())
    }

    /// Releases a mapping created by [`CacheMirror::map_text`].
    fn unmap_text(&self, _daddr: usize, _len: usize) {}
}
