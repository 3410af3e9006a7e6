//! C ABI exports of the dynamic-loading functions.
//!
//! The exported functions operate on one process-wide [`Dlfcn`] set up by
//! [`install`]. Until then every call fails. Handles handed to C are module
//! addresses and are checked against the registry before use.

use crate::{
    dlfcn::{Dlfcn, ListKind, OpenFlags},
    registry::ModuleHandle,
};
use alloc::ffi::CString;
use core::{
    ffi::{CStr, c_char, c_int, c_void},
    ptr,
};
use spin::{Mutex, Once};

static DLFCN: Once<Dlfcn> = Once::new();

/// Message returned by the last `dlerror` call, kept alive until the next one.
static ERROR_MESSAGE: Mutex<Option<CString>> = Mutex::new(None);

/// Installs the instance the C functions use. Returns `false` if one is already installed.
pub fn install(dlfcn: Dlfcn) -> bool {
    let mut installed = false;
    DLFCN.call_once(|| {
        installed = true;
        dlfcn
    });
    installed
}

/// The installed instance, if any.
pub fn instance() -> Option<&'static Dlfcn> {
    DLFCN.get()
}

fn handle_of(dl: &Dlfcn, handle: *mut c_void) -> Option<ModuleHandle> {
    dl.registry().find_by_ptr(handle.cast_const())
}

/// # Safety
/// `path` must be NULL or a valid NUL terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn dlopen(path: *const c_char, mode: c_int) -> *mut c_void {
    let Some(dl) = instance() else {
        return ptr::null_mut();
    };
    if path.is_null() {
        return ptr::null_mut();
    }
    let Ok(path) = unsafe { CStr::from_ptr(path) }.to_str() else {
        return ptr::null_mut();
    };
    dl.dlopen(path, OpenFlags::from_bits_retain(mode))
        .map_or(ptr::null_mut(), |module| {
            ModuleHandle::as_ptr(&module).cast_mut().cast()
        })
}

/// # Safety
/// `name` must be NULL or a valid NUL terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn dlsym(handle: *mut c_void, name: *const c_char) -> *mut c_void {
    let Some(dl) = instance() else {
        return ptr::null_mut();
    };
    if name.is_null() {
        return ptr::null_mut();
    }
    let Ok(name) = unsafe { CStr::from_ptr(name) }.to_str() else {
        return ptr::null_mut();
    };
    let Some(module) = handle_of(dl, handle) else {
        return ptr::null_mut();
    };
    dl.dlsym(&module, name)
        .map_or(ptr::null_mut(), |addr| addr.cast_mut().cast())
}

#[unsafe(no_mangle)]
pub extern "C" fn dlclose(handle: *mut c_void) -> c_int {
    let Some(dl) = instance() else {
        return -1;
    };
    match handle_of(dl, handle) {
        Some(module) => dl.dlclose(&module),
        None => -1,
    }
}

/// Returns the pending error message or NULL.
///
/// The string stays valid until the next call.
#[unsafe(no_mangle)]
pub extern "C" fn dlerror() -> *const c_char {
    let message = instance()
        .and_then(Dlfcn::dlerror)
        .map(|msg| CString::new(msg.replace('\0', " ")).unwrap_or_default());
    let mut slot = ERROR_MESSAGE.lock();
    *slot = message;
    slot.as_ref().map_or(ptr::null(), |msg| msg.as_ptr())
}

/// Logs the loaded modules (`0`) or their exported symbols (any other value).
#[unsafe(no_mangle)]
pub extern "C" fn dllist(kind: c_int) {
    if let Some(dl) = instance() {
        let kind = match kind {
            0 => ListKind::Module,
            _ => ListKind::Symbol,
        };
        dl.dllist(kind);
    }
}
