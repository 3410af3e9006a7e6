//! Platform capabilities consumed by the loader: memory allocation and
//! cache/bus-mirror control.

mod heap;
mod traits;

pub use heap::{HeapAllocator, REGION_ALIGN, Unified};
pub use traits::{Allocator, CacheMirror, MemCaps};
