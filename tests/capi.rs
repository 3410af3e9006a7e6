#![cfg(feature = "capi")]

mod common;

use common::{CountingFiles, init_logger, simple_module};
use elf_dlmod::{Layout, Loader, arch::Riscv32, capi, dlfcn::Dlfcn, registry::ModuleRegistry};
use std::{ffi::CStr, ptr};

const RTLD_NOW: i32 = 0x2;

fn install() {
    let files = CountingFiles::default();
    files.insert("/spiffs/hello.so", simple_module(&[0x13; 8]));
    let loader = Loader::new(Riscv32).with_layout(Layout::Segments);
    assert!(capi::install(Dlfcn::new(ModuleRegistry::new(loader, files))));
    assert!(capi::instance().is_some());
}

// The exported functions share one process-wide instance, so every case runs
// in order inside a single test.
#[test]
fn c_abi() {
    init_logger();
    assert!(unsafe { capi::dlopen(c"/spiffs/hello.so".as_ptr(), RTLD_NOW) }.is_null());
    install();
    let fresh = Loader::new(Riscv32);
    let other = Dlfcn::new(ModuleRegistry::new(fresh, CountingFiles::default()));
    assert!(!capi::install(other));

    unsafe {
        assert!(capi::dlopen(ptr::null(), RTLD_NOW).is_null());

        let handle = capi::dlopen(c"/spiffs/hello.so".as_ptr(), RTLD_NOW);
        assert!(!handle.is_null());
        assert!(capi::dlerror().is_null());
        assert_eq!(capi::dlopen(c"/other/hello.so".as_ptr(), RTLD_NOW), handle);

        let main = capi::dlsym(handle, c"main".as_ptr());
        assert!(!main.is_null());
        assert!(capi::dlsym(handle, ptr::null()).is_null());
        assert!(capi::dlsym(handle, c"printf".as_ptr()).is_null());
        assert!(capi::dlsym(ptr::null_mut(), c"main".as_ptr()).is_null());
        assert_eq!(capi::dlclose(ptr::null_mut()), -1);
        capi::dllist(0);
        capi::dllist(1);

        // The message stays readable until the next dlerror call.
        assert!(capi::dlopen(c"/spiffs/missing.so".as_ptr(), RTLD_NOW).is_null());
        let msg = capi::dlerror();
        assert!(!msg.is_null());
        let text = CStr::from_ptr(msg).to_str().unwrap().to_owned();
        assert!(text.contains("missing.so"), "{text}");
        assert_eq!(CStr::from_ptr(msg).to_str().unwrap(), text);
        assert!(capi::dlerror().is_null());

        assert_eq!(capi::dlclose(handle), 0);
        assert_eq!(capi::dlclose(handle), -1);
        assert!(capi::dlsym(handle, c"main".as_ptr()).is_null());
    }
}
