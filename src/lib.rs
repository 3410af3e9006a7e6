//! # elf_dlmod
//! A small ELF32 relocating loader for targets that have no operating-system loader
//! and no virtual memory, together with a `dlopen`-style module registry.
//!
//! ## Layouts
//! Two memory layouts are supported behind the [`segment::LoadedImage`] trait:
//! * [`Layout::Segments`] follows the program headers and places the whole image in one
//!   executable and writable block. This is what targets with unified RAM use.
//! * [`Layout::Sections`] follows the section headers and places `.text` in executable
//!   memory and `.data`/`.rodata`/`.data.rel.ro`/`.bss` in one data block. Targets whose
//!   instruction bus mirrors the data bus use this one.
//!
//! ## Usage
//! ```no_run
//! use elf_dlmod::{Loader, object::ElfObject, arch::Riscv32};
//!
//! fn puts(_s: *const u8) -> i32 { 0 }
//!
//! let bytes: &[u8] = &[]; // ELF32 bytes of the module
//! let loader = Loader::new(Riscv32)
//!     .with_resolver(|name: &str| match name {
//!         "puts" => Some(puts as *const ()),
//!         _ => None,
//!     });
//! let mut object = ElfObject::new();
//! object.relocate(&loader, bytes).unwrap();
//! let ret = unsafe { object.request(0, &[]) }.unwrap();
//! ```
#![no_std]
extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

pub mod arch;
#[cfg(feature = "capi")]
pub mod capi;
pub mod dlfcn;
pub mod elf;
mod error;
pub mod input;
mod loader;
mod macros;
pub mod object;
pub mod os;
pub mod registry;
pub mod relocation;
pub mod segment;
pub mod symbol;

pub use error::*;
pub use loader::{Layout, Loader};

#[doc(hidden)]
pub mod __private {
    pub use alloc::vec::Vec;
}

/// The result type used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;
