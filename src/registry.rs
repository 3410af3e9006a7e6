//! The module registry: at most one loaded copy of each module name.
//!
//! Loading happens outside the registry lock, so two threads opening the same
//! name may both load it. The second to finish finds the first one's entry when
//! it re-checks under the lock, discards its own copy and returns the winner.

use crate::{
    Loader, Result,
    input::FileAccessor,
    invalid_argument, not_found,
    object::{ElfObject, call_entry},
    symbol::ElfExport,
};
use alloc::{boxed::Box, format, string::String, sync::Arc, vec::Vec};
use core::{
    ffi::{CStr, c_void},
    fmt::Debug,
    sync::atomic::{AtomicU32, Ordering},
};
use spin::Mutex;

/// Tag carried by every live module.
pub const MODULE_MAGIC: u32 = 0x6d6f_646c;

/// Longest module name accepted, in bytes.
pub const MODULE_NAME_MAX: usize = 63;

/// A module owned by a [`ModuleRegistry`].
///
/// The exported symbols are copied out of the object when the module is
/// registered, so lookups never wait on a running entry point.
pub struct Module {
    magic: AtomicU32,
    name: String,
    symbols: Vec<ElfExport>,
    object: Mutex<Option<ElfObject>>,
}

/// Handle to a registered module.
///
/// A handle outlives the module: once the module is removed the handle stays
/// memory safe, but [`Module::is_live`] turns false and every lookup through it fails.
pub type ModuleHandle = Arc<Module>;

impl Debug for Module {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("live", &self.is_live())
            .finish()
    }
}

impl Module {
    fn new(name: String, object: ElfObject) -> Self {
        Self {
            magic: AtomicU32::new(MODULE_MAGIC),
            name,
            symbols: object.symbols().to_vec(),
            object: Mutex::new(Some(object)),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the module is still registered.
    #[inline]
    pub fn is_live(&self) -> bool {
        self.magic.load(Ordering::Acquire) == MODULE_MAGIC
    }

    /// Address of a symbol exported by this module.
    pub fn symbol(&self, name: &str) -> Option<usize> {
        if !self.is_live() {
            return None;
        }
        self.symbols
            .iter()
            .find(|sym| sym.name == name)
            .map(|sym| sym.addr)
    }

    /// Every symbol the module exports, empty once it was removed.
    pub fn symbols(&self) -> &[ElfExport] {
        if self.is_live() { &self.symbols[..] } else { &[] }
    }

    /// Calls the module entry point.
    ///
    /// No lock is held while the entry point runs, so it may call back into
    /// the registry. The module must not be removed before the call returns.
    ///
    /// # Safety
    /// See [`ElfObject::request`].
    pub unsafe fn request(&self, opt: i32, args: &[&CStr]) -> Result<i32> {
        let _ = opt;
        let entry = {
            let object = self.object.lock();
            let object = object
                .as_ref()
                .ok_or_else(|| not_found(format!("module {} was removed", self.name)))?;
            object
                .entry()
                .ok_or_else(|| invalid_argument(format!("module {} has no entry point", self.name)))?
        };
        unsafe { call_entry(entry, args) }
    }

    fn take_object(&self) -> Option<ElfObject> {
        self.object.lock().take()
    }
}

/// Derives a module name from a path: the file name without its extension.
///
/// # Examples
/// ```rust
/// use elf_dlmod::registry::module_name;
///
/// assert_eq!(module_name("/spiffs/apps/hello.so").unwrap(), "hello");
/// assert_eq!(module_name("console.app.elf").unwrap(), "console.app");
/// assert!(module_name("/spiffs/").is_err());
/// ```
pub fn module_name(path: &str) -> Result<String> {
    let file = path.rsplit('/').next().unwrap_or(path);
    let stem = match file.rfind('.') {
        Some(0) | None => file,
        Some(dot) => &file[..dot],
    };
    if stem.is_empty() {
        return Err(invalid_argument(format!("no module name in path {}", path)));
    }
    if stem.len() > MODULE_NAME_MAX {
        return Err(invalid_argument(format!(
            "module name {} is longer than {} bytes",
            stem, MODULE_NAME_MAX
        )));
    }
    Ok(String::from(stem))
}

/// Registered modules, most recently inserted first.
pub struct ModuleRegistry {
    loader: Loader,
    files: Box<dyn FileAccessor>,
    modules: Mutex<Vec<ModuleHandle>>,
}

impl Debug for ModuleRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("loader", &self.loader)
            .field("modules", &*self.modules.lock())
            .finish()
    }
}

impl ModuleRegistry {
    pub fn new(loader: Loader, files: impl FileAccessor + 'static) -> Self {
        Self {
            loader,
            files: Box::new(files),
            modules: Mutex::new(Vec::new()),
        }
    }

    #[inline]
    pub fn loader(&self) -> &Loader {
        &self.loader
    }

    fn find(modules: &[ModuleHandle], name: &str) -> Option<ModuleHandle> {
        modules.iter().find(|module| module.name == name).cloned()
    }

    /// Returns the module called `name`, loading it from `path` if it is not registered yet.
    pub fn insert(&self, path: &str, name: &str) -> Result<ModuleHandle> {
        if let Some(module) = Self::find(&self.modules.lock(), name) {
            #[cfg(feature = "log")]
            log::debug!("[registry] {} already loaded", name);
            return Ok(module);
        }

        let bytes = self.files.open(path)?;
        let mut object = ElfObject::new();
        object.relocate(&self.loader, &bytes)?;
        drop(bytes);
        let module = Arc::new(Module::new(String::from(name), object));

        let mut modules = self.modules.lock();
        if let Some(winner) = Self::find(&modules, name) {
            drop(modules);
            #[cfg(feature = "log")]
            log::debug!("[registry] lost the race to load {}", name);
            drop(module);
            return Ok(winner);
        }
        modules.insert(0, module.clone());
        drop(modules);
        #[cfg(feature = "log")]
        log::debug!("[registry] inserted {} from {}", name, path);
        Ok(module)
    }

    /// Unregisters `handle` and frees its object.
    pub fn remove(&self, handle: &ModuleHandle) -> Result<()> {
        let module = {
            let mut modules = self.modules.lock();
            let idx = modules
                .iter()
                .position(|module| Arc::ptr_eq(module, handle))
                .filter(|_| handle.is_live())
                .ok_or_else(|| not_found(format!("module {} is not registered", handle.name)))?;
            let module = modules.remove(idx);
            module.magic.store(0, Ordering::Release);
            module
        };
        let object = module.take_object();
        drop(object);
        #[cfg(feature = "log")]
        log::debug!("[registry] removed {}", module.name);
        Ok(())
    }

    pub fn get_handle(&self, name: &str) -> Option<ModuleHandle> {
        Self::find(&self.modules.lock(), name)
    }

    /// Looks `symbol` up in every module, most recently inserted first.
    pub fn get_address(&self, symbol: &str) -> Option<*const ()> {
        self.modules
            .lock()
            .iter()
            .find_map(|module| module.symbol(symbol))
            .map(|addr| addr as *const ())
    }

    /// Whether `handle` is a live module of this registry.
    pub fn validate_handle(&self, handle: &Module) -> bool {
        handle.is_live()
            && self
                .modules
                .lock()
                .iter()
                .any(|module| core::ptr::eq(Arc::as_ptr(module), handle))
    }

    /// Finds the module an opaque pointer refers to.
    pub fn find_by_ptr(&self, ptr: *const c_void) -> Option<ModuleHandle> {
        self.modules
            .lock()
            .iter()
            .find(|module| Arc::as_ptr(module).cast::<c_void>() == ptr)
            .filter(|module| module.is_live())
            .cloned()
    }

    /// Snapshot of the registered modules, most recently inserted first.
    pub fn modules(&self) -> Vec<ModuleHandle> {
        self.modules.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.modules.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.lock().is_empty()
    }
}
