#![cfg(all(unix, target_arch = "x86_64"))]

mod common;

use common::{CountingFiles, ElfBuilder, ExecAllocator, STT_FUNC, init_logger};
use elf_dlmod::{
    Layout, Loader, Result,
    arch::ArchRelocator,
    elf::{EM_X86_64, ElfRela, ElfSymbol},
    object::{ElfObject, ObjectState},
    registry::ModuleRegistry,
    segment::AddressSpace,
    unsupported_relocation,
};
use rstest::rstest;
use std::{
    ffi::{CStr, c_char, c_int},
    sync::OnceLock,
};

/// Runs modules whose text is host machine code and that carry no relocations.
struct HostRelocator;

impl ArchRelocator for HostRelocator {
    fn machine(&self) -> u16 {
        EM_X86_64
    }

    fn relocate(
        &self,
        _image: &dyn AddressSpace,
        rela: &ElfRela,
        _sym: &ElfSymbol,
        _addr: usize,
    ) -> Result<()> {
        Err(unsupported_relocation(rela.r_type(), "UNKNOWN"))
    }
}

/// `movabs rax, target; jmp rax`
fn jump_to(target: usize) -> Vec<u8> {
    let mut code = vec![0x48, 0xb8];
    code.extend_from_slice(&(target as u64).to_le_bytes());
    code.extend_from_slice(&[0xff, 0xe0]);
    code
}

fn module_jumping_to(target: usize) -> Vec<u8> {
    let code = jump_to(target);
    let mut builder = ElfBuilder::new().machine(EM_X86_64).entry(0);
    builder.export("main", 0, STT_FUNC);
    builder.segment(0, &code, code.len() as u32).build()
}

fn loader() -> Loader {
    Loader::new(HostRelocator)
        .with_allocator(ExecAllocator)
        .with_layout(Layout::Segments)
}

/// Returns `argc * 100` plus the total length of the arguments, or `-1` when
/// `argv` is not NULL terminated.
extern "C" fn count_args(argc: c_int, argv: *mut *mut c_char) -> c_int {
    let argv = unsafe { std::slice::from_raw_parts(argv, argc as usize + 1) };
    if !argv[argc as usize].is_null() {
        return -1;
    }
    let total: usize = argv[..argc as usize]
        .iter()
        .map(|arg| unsafe { CStr::from_ptr(*arg) }.to_bytes().len())
        .sum();
    argc * 100 + total as c_int
}

#[rstest]
#[case(&[], 0)]
#[case(&[c"hello"], 105)]
#[case(&[c"hello", c"-v", c""], 307)]
fn request_passes_argc_and_argv(#[case] args: &[&CStr], #[case] expected: i32) {
    init_logger();
    let mut object = ElfObject::new();
    object
        .relocate(&loader(), &module_jumping_to(count_args as usize))
        .unwrap();
    assert_eq!(unsafe { object.request(0, args) }.unwrap(), expected);
    assert_eq!(object.state(), ObjectState::Relocated);
    object.deinit();
}

static REGISTRY: OnceLock<ModuleRegistry> = OnceLock::new();

/// Looks its own module up in the registry while running.
extern "C" fn look_up_self(_argc: c_int, _argv: *mut *mut c_char) -> c_int {
    let Some(registry) = REGISTRY.get() else {
        return -1;
    };
    let Some(module) = registry.get_handle("callback") else {
        return -2;
    };
    match (registry.get_address("main"), module.symbols().len()) {
        (Some(_), 1) => 1,
        _ => -3,
    }
}

#[rstest]
fn entry_may_call_back_into_the_registry() {
    init_logger();
    let registry = REGISTRY.get_or_init(|| {
        let files = CountingFiles::default();
        files.insert("/fs/callback.so", module_jumping_to(look_up_self as usize));
        ModuleRegistry::new(loader(), files)
    });
    let handle = registry.insert("/fs/callback.so", "callback").unwrap();

    let ret = std::thread::scope(|scope| {
        let worker = scope.spawn(|| unsafe { handle.request(0, &[c"callback"]) });
        // Lookups from other threads do not wait on the running entry point.
        assert!(registry.get_address("main").is_some());
        worker.join().unwrap()
    });
    assert_eq!(ret.unwrap(), 1);

    registry.remove(&handle).unwrap();
    assert!(unsafe { handle.request(0, &[]) }.is_err());
}
