//! Access to module files.
//!
//! The registry only deals in paths; a [`FileAccessor`] turns a path into the
//! bytes of an ELF file, whether they come from memory or a file system.

#[cfg(feature = "std")]
pub use backend::StdFiles;
pub use backend::MemoryFiles;
pub use traits::FileAccessor;

mod backend;
mod traits;
