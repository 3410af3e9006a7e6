//! `dlopen`-style access to a [`ModuleRegistry`].
//!
//! Failures are recorded in a last-error slot shared by every caller of one
//! [`Dlfcn`]; [`Dlfcn::dlerror`] hands the message out once.

use crate::{
    Error, Result, not_found,
    registry::{ModuleHandle, ModuleRegistry, module_name},
};
use alloc::{
    format,
    string::{String, ToString},
    vec::Vec,
};
use bitflags::bitflags;
use spin::Mutex;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    /// Flags accepted by [`Dlfcn::dlopen`].
    ///
    /// They are accepted for source compatibility only: every relocation is
    /// always resolved when the module is opened.
    pub struct OpenFlags: i32 {
        const RTLD_LAZY = 0x1;
        const RTLD_NOW = 0x2;
        const RTLD_NOLOAD = 0x4;
        const RTLD_DEEPBIND = 0x8;
    }
}

/// What [`Dlfcn::dllist`] reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListKind {
    /// One line per loaded module.
    Module,
    /// One line per symbol exported by a loaded module.
    Symbol,
}

/// The dynamic-loading front end.
///
/// # Examples
/// ```no_run
/// use elf_dlmod::{Loader, arch::Riscv32, dlfcn::{Dlfcn, OpenFlags}, input::StdFiles, registry::ModuleRegistry};
///
/// let dl = Dlfcn::new(ModuleRegistry::new(Loader::new(Riscv32), StdFiles));
/// match dl.dlopen("/spiffs/hello.so", OpenFlags::RTLD_NOW) {
///     Some(handle) => {
///         let main = dl.dlsym(&handle, "main");
///         assert_eq!(dl.dlclose(&handle), 0);
///     }
///     None => println!("{}", dl.dlerror().unwrap()),
/// }
/// ```
#[derive(Debug)]
pub struct Dlfcn {
    registry: ModuleRegistry,
    last_error: Mutex<Option<String>>,
}

impl Dlfcn {
    pub fn new(registry: ModuleRegistry) -> Self {
        Self {
            registry,
            last_error: Mutex::new(None),
        }
    }

    #[inline]
    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    fn set_error(&self, err: &Error) {
        #[cfg(feature = "log")]
        log::error!("{}", err);
        *self.last_error.lock() = Some(err.to_string());
    }

    fn record<T>(&self, result: Result<T>) -> Option<T> {
        result.map_err(|err| self.set_error(&err)).ok()
    }

    /// Opens the module at `path`, loading it unless a module of the same name is registered.
    ///
    /// A successful open clears any pending error message.
    pub fn dlopen(&self, path: &str, flags: OpenFlags) -> Option<ModuleHandle> {
        let _ = flags;
        let result = module_name(path).and_then(|name| self.registry.insert(path, &name));
        let handle = self.record(result)?;
        *self.last_error.lock() = None;
        Some(handle)
    }

    /// Address of `name` among the symbols `handle` exports.
    pub fn dlsym(&self, handle: &ModuleHandle, name: &str) -> Option<*const ()> {
        let result = if !self.registry.validate_handle(handle) {
            Err(not_found("invalid module handle"))
        } else {
            handle.symbol(name).map(|addr| addr as *const ()).ok_or_else(|| {
                not_found(format!("symbol {} not found in {}", name, handle.name()))
            })
        };
        self.record(result)
    }

    /// Unloads the module behind `handle`. Returns `0` on success and `-1` otherwise.
    pub fn dlclose(&self, handle: &ModuleHandle) -> i32 {
        match self.record(self.registry.remove(handle)) {
            Some(()) => 0,
            None => -1,
        }
    }

    /// Takes the pending error message, if any.
    pub fn dlerror(&self) -> Option<String> {
        self.last_error.lock().take()
    }

    /// Lists loaded modules or their exported symbols, logging each line.
    pub fn dllist(&self, kind: ListKind) -> Vec<String> {
        let modules = self.registry.modules();
        let lines: Vec<String> = match kind {
            ListKind::Module => modules
                .iter()
                .map(|module| module.name().to_string())
                .collect(),
            ListKind::Symbol => modules
                .iter()
                .flat_map(|module| {
                    module
                        .symbols()
                        .iter()
                        .map(|sym| format!("{}: {} {:#x}", module.name(), sym.name, sym.addr))
                        .collect::<Vec<_>>()
                })
                .collect(),
        };
        #[cfg(feature = "log")]
        for line in lines.iter() {
            log::info!("{}", line);
        }
        lines
    }
}
