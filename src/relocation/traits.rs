use alloc::sync::Arc;

/// A trait for looking up host symbols during relocation.
///
/// The relocation engine asks it for every named symbol a module imports from
/// the host image. The answer must not change for the duration of one load.
///
/// # Examples
///
/// Using a closure for simple lookups:
/// ```rust
/// use elf_dlmod::relocation::SymbolLookup;
///
/// let lookup = |name: &str| {
///     match name {
///         "malloc" => Some(0x1234 as *const ()),
///         "free" => Some(0x5678 as *const ()),
///         _ => None,
///     }
/// };
/// assert_eq!(lookup.lookup("free"), Some(0x5678 as *const ()));
/// ```
pub trait SymbolLookup {
    /// Finds the address of a symbol by its name.
    ///
    /// # Returns
    /// * `Some(ptr)` - The symbol's address if found.
    /// * `None` - Symbol not found.
    fn lookup(&self, name: &str) -> Option<*const ()>;
}

impl<F: ?Sized> SymbolLookup for F
where
    F: Fn(&str) -> Option<*const ()>,
{
    fn lookup(&self, name: &str) -> Option<*const ()> {
        self(name)
    }
}

impl<S: SymbolLookup + ?Sized> SymbolLookup for Arc<S> {
    fn lookup(&self, name: &str) -> Option<*const ()> {
        (**self).lookup(name)
    }
}

impl SymbolLookup for () {
    fn lookup(&self, _name: &str) -> Option<*const ()> {
        None
    }
}
