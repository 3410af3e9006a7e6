use super::{Allocator, CacheMirror, MemCaps};
use alloc::alloc::{alloc, dealloc};
use core::{alloc::Layout, ptr::NonNull};

/// Alignment of every region handed out by [`HeapAllocator`].
pub const REGION_ALIGN: usize = 16;

/// An [`Allocator`] backed by the global `alloc` heap.
///
/// Capabilities are ignored, which is correct for targets whose heap is both
/// executable and writable (and for hosted tests).
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapAllocator;

impl Allocator for HeapAllocator {
    unsafe fn allocate(&self, size: usize, _caps: MemCaps) -> Option<NonNull<u8>> {
        if size == 0 {
            return None;
        }
        let layout = Layout::from_size_align(size, REGION_ALIGN).ok()?;
        NonNull::new(unsafe { alloc(layout) })
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, size: usize, _caps: MemCaps) {
        unsafe {
            dealloc(
                ptr.as_ptr(),
                Layout::from_size_align_unchecked(size, REGION_ALIGN),
            )
        };
    }
}

/// A [`CacheMirror`] for unified memory: one address per byte, nothing to flush.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unified;

impl CacheMirror for Unified {}
