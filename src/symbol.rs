//! Host symbols offered to modules and symbols exported by modules.

use crate::relocation::SymbolLookup;
use alloc::{borrow::Cow, string::String, sync::Arc, vec::Vec};
use core::fmt::Debug;

/// One entry of the host symbol table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostSymbol {
    pub name: Cow<'static, str>,
    pub addr: usize,
}

impl HostSymbol {
    pub fn new(name: impl Into<Cow<'static, str>>, addr: *const ()) -> Self {
        Self {
            name: name.into(),
            addr: addr as usize,
        }
    }
}

/// A symbol exported by a loaded module.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElfExport {
    /// Symbol name.
    pub name: String,
    /// Address running code uses to reach the symbol.
    pub addr: usize,
}

/// The table of host functions and objects modules may import.
///
/// Lookups scan the builtin table linearly. An optional custom resolver is
/// consulted first and may override any builtin entry.
///
/// # Examples
/// ```rust
/// use elf_dlmod::{host_symbols, relocation::SymbolLookup, symbol::HostSymbols};
///
/// extern "C" fn answer() -> i32 { 42 }
///
/// let symbols = HostSymbols::new(host_symbols![answer]);
/// assert_eq!(symbols.lookup("answer"), Some(answer as *const ()));
/// assert_eq!(symbols.lookup("question"), None);
/// ```
#[derive(Clone, Default)]
pub struct HostSymbols {
    builtin: Vec<HostSymbol>,
    custom: Option<Arc<dyn SymbolLookup + Send + Sync>>,
}

impl Debug for HostSymbols {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HostSymbols")
            .field("builtin", &self.builtin.len())
            .field("custom", &self.custom.is_some())
            .finish()
    }
}

impl HostSymbols {
    pub fn new(builtin: Vec<HostSymbol>) -> Self {
        Self {
            builtin,
            custom: None,
        }
    }

    /// Installs a resolver that is asked before the builtin table.
    pub fn with_custom<S>(mut self, custom: S) -> Self
    where
        S: SymbolLookup + Send + Sync + 'static,
    {
        self.custom = Some(Arc::new(custom));
        self
    }

    /// Adds an entry to the builtin table.
    pub fn push(&mut self, symbol: HostSymbol) {
        self.builtin.push(symbol);
    }

    #[inline]
    pub fn builtin(&self) -> &[HostSymbol] {
        &self.builtin
    }
}

impl SymbolLookup for HostSymbols {
    fn lookup(&self, name: &str) -> Option<*const ()> {
        if let Some(addr) = self.custom.as_ref().and_then(|custom| custom.lookup(name)) {
            return Some(addr);
        }
        self.builtin
            .iter()
            .find(|sym| sym.name == name)
            .map(|sym| sym.addr as *const ())
    }
}
