//! A loaded ELF module and its lifecycle.
use crate::{
    Loader, Result, invalid_argument,
    segment::LoadedImage,
    symbol::ElfExport,
};
use alloc::{boxed::Box, vec::Vec};
use core::{
    ffi::{CStr, c_char, c_int},
    fmt::Debug,
};

/// Signature of a module entry point.
pub type EntryFn = unsafe extern "C" fn(c_int, *mut *mut c_char) -> c_int;

/// Calls the entry point at `entry` with `argc = args.len()` and a NULL terminated `argv`.
///
/// # Safety
/// `entry` must be the relocated entry point of a module that stays loaded
/// until the call returns.
pub(crate) unsafe fn call_entry(entry: usize, args: &[&CStr]) -> Result<i32> {
    let argc = c_int::try_from(args.len()).map_err(|_| invalid_argument("too many arguments"))?;
    let mut argv: Vec<*mut c_char> = args
        .iter()
        .map(|arg| arg.as_ptr().cast_mut())
        .chain(core::iter::once(core::ptr::null_mut()))
        .collect();
    #[cfg(feature = "log")]
    log::trace!("calling entry {:#x} with {} arguments", entry, argc);
    // SAFETY: `entry` lies inside relocated text that outlives the call.
    let entry: EntryFn = unsafe { core::mem::transmute(entry) };
    Ok(unsafe { entry(argc, argv.as_mut_ptr()) })
}

/// Lifecycle state of an [`ElfObject`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectState {
    /// Ready to be loaded.
    Initialized,
    /// Loaded and relocated; the entry point may be called.
    Relocated,
    /// Memory returned; must be initialized again before reuse.
    Deinitialized,
}

/// An ELF module: its image, exported symbols and entry point.
///
/// # Examples
/// ```no_run
/// use elf_dlmod::{Loader, arch::Riscv32, object::{ElfObject, ObjectState}};
///
/// let bytes = std::fs::read("hello.so").unwrap();
/// let loader = Loader::new(Riscv32);
/// let mut object = ElfObject::new();
/// object.relocate(&loader, &bytes).unwrap();
/// assert_eq!(object.state(), ObjectState::Relocated);
/// let ret = unsafe { object.request(0, &[c"hello"]) }.unwrap();
/// object.deinit();
/// ```
pub struct ElfObject {
    state: ObjectState,
    image: Option<Box<dyn LoadedImage>>,
    symbols: Vec<ElfExport>,
}

impl Debug for ElfObject {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ElfObject")
            .field("state", &self.state)
            .field("entry", &self.entry())
            .field("symbols", &self.symbols.len())
            .finish()
    }
}

impl Default for ElfObject {
    fn default() -> Self {
        Self::new()
    }
}

impl ElfObject {
    pub const fn new() -> Self {
        Self {
            state: ObjectState::Initialized,
            image: None,
            symbols: Vec::new(),
        }
    }

    /// Resets the object, releasing anything it still holds.
    pub fn init(&mut self) {
        self.image = None;
        self.symbols.clear();
        self.state = ObjectState::Initialized;
    }

    /// Loads and relocates the module in `bytes`.
    ///
    /// On failure the object stays [`ObjectState::Initialized`] and holds no memory.
    pub fn relocate(&mut self, loader: &Loader, bytes: &[u8]) -> Result<()> {
        if self.state != ObjectState::Initialized {
            return Err(invalid_argument("object must be initialized before relocation"));
        }
        let (image, symbols) = loader.load(bytes)?;
        self.image = Some(image);
        self.symbols = symbols;
        self.state = ObjectState::Relocated;
        Ok(())
    }

    /// Calls the entry point with `argc = args.len()` and a NULL terminated `argv`.
    ///
    /// `opt` is reserved and ignored.
    ///
    /// # Safety
    /// This runs module code. The module must have been built for the running
    /// target and must honour the C entry point ABI.
    pub unsafe fn request(&self, opt: i32, args: &[&CStr]) -> Result<i32> {
        let _ = opt;
        if self.state != ObjectState::Relocated {
            return Err(invalid_argument("object is not relocated"));
        }
        let entry = self
            .entry()
            .ok_or_else(|| invalid_argument("module has no entry point"))?;
        unsafe { call_entry(entry, args) }
    }

    /// Returns all memory to the allocator.
    pub fn deinit(&mut self) {
        self.image = None;
        self.symbols.clear();
        self.state = ObjectState::Deinitialized;
    }

    #[inline]
    pub fn state(&self) -> ObjectState {
        self.state
    }

    /// Address of the entry point, once relocated.
    pub fn entry(&self) -> Option<usize> {
        match self.state {
            ObjectState::Relocated => self.image.as_ref().and_then(|image| image.entry()),
            _ => None,
        }
    }

    /// Maps a file virtual address to the address running code uses, `0` if unmapped.
    pub fn map_sym(&self, vaddr: usize) -> usize {
        self.image
            .as_ref()
            .and_then(|image| image.map_symbol(vaddr))
            .unwrap_or(0)
    }

    /// Address of an exported symbol.
    pub fn symbol(&self, name: &str) -> Option<usize> {
        self.symbols
            .iter()
            .find(|sym| sym.name == name)
            .map(|sym| sym.addr)
    }

    #[inline]
    pub fn symbols(&self) -> &[ElfExport] {
        &self.symbols
    }

    #[inline]
    pub fn image(&self) -> Option<&dyn LoadedImage> {
        self.image.as_deref()
    }
}
