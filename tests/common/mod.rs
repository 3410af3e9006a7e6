#![allow(dead_code)]

use elf_dlmod::{
    Error, Result,
    elf::{EM_RISCV, SHT_NOBITS, SHT_PROGBITS, SHT_RELA, SHT_STRTAB, SHT_SYMTAB},
    input::{FileAccessor, MemoryFiles},
    os::{Allocator, CacheMirror, HeapAllocator, MemCaps},
};
use std::{
    borrow::Cow,
    ptr::NonNull,
    sync::{
        Arc, Mutex,
        atomic::{AtomicIsize, AtomicUsize, Ordering},
    },
};

pub const SHF_WRITE: u32 = 0x1;
pub const SHF_ALLOC: u32 = 0x2;
pub const SHF_EXECINSTR: u32 = 0x4;

pub const STB_LOCAL: u8 = 0;
pub const STB_GLOBAL: u8 = 1;
pub const STT_NOTYPE: u8 = 0;
pub const STT_OBJECT: u8 = 1;
pub const STT_FUNC: u8 = 2;

const EHDR_SIZE: u32 = 52;
const PHDR_SIZE: u32 = 32;
const SHDR_SIZE: u32 = 40;
const SYM_SIZE: u32 = 16;
const RELA_SIZE: u32 = 12;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

struct Segment {
    vaddr: u32,
    data: Vec<u8>,
    memsz: u32,
}

struct Section {
    name: String,
    sh_type: u32,
    flags: u32,
    addr: u32,
    data: Vec<u8>,
    size: u32,
}

struct Symbol {
    name: String,
    value: u32,
    info: u8,
    defined: bool,
}

struct Reloc {
    offset: u32,
    r_type: u32,
    symbol: u32,
    addend: i32,
}

/// Builds little-endian ELF32 shared objects.
///
/// The file holds the header, the program headers, every segment and section
/// body, then the section header table. Section index 0 is the null section,
/// user sections follow in insertion order, then `.symtab`, `.strtab`,
/// `.rela.dyn` (only when relocations were added) and `.shstrtab`.
pub struct ElfBuilder {
    machine: u16,
    entry: u32,
    segments: Vec<Segment>,
    sections: Vec<Section>,
    symbols: Vec<Symbol>,
    relocs: Vec<Reloc>,
}

impl Default for ElfBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ElfBuilder {
    pub fn new() -> Self {
        Self {
            machine: EM_RISCV,
            entry: 0,
            segments: Vec::new(),
            sections: Vec::new(),
            symbols: Vec::new(),
            relocs: Vec::new(),
        }
    }

    pub fn machine(mut self, machine: u16) -> Self {
        self.machine = machine;
        self
    }

    pub fn entry(mut self, entry: u32) -> Self {
        self.entry = entry;
        self
    }

    /// Adds a `PT_LOAD` segment.
    pub fn segment(mut self, vaddr: u32, data: &[u8], memsz: u32) -> Self {
        self.segments.push(Segment {
            vaddr,
            data: data.to_vec(),
            memsz,
        });
        self
    }

    /// Adds a file-backed section.
    pub fn section(mut self, name: &str, sh_type: u32, flags: u32, addr: u32, data: &[u8]) -> Self {
        self.sections.push(Section {
            name: name.to_string(),
            sh_type,
            flags,
            addr,
            data: data.to_vec(),
            size: data.len() as u32,
        });
        self
    }

    pub fn text(self, addr: u32, data: &[u8]) -> Self {
        self.section(".text", SHT_PROGBITS, SHF_ALLOC | SHF_EXECINSTR, addr, data)
    }

    pub fn data(self, addr: u32, data: &[u8]) -> Self {
        self.section(".data", SHT_PROGBITS, SHF_ALLOC | SHF_WRITE, addr, data)
    }

    pub fn rodata(self, addr: u32, data: &[u8]) -> Self {
        self.section(".rodata", SHT_PROGBITS, SHF_ALLOC, addr, data)
    }

    pub fn data_rel_ro(self, addr: u32, data: &[u8]) -> Self {
        self.section(".data.rel.ro", SHT_PROGBITS, SHF_ALLOC | SHF_WRITE, addr, data)
    }

    pub fn bss(mut self, addr: u32, size: u32) -> Self {
        self.sections.push(Section {
            name: ".bss".to_string(),
            sh_type: SHT_NOBITS,
            flags: SHF_ALLOC | SHF_WRITE,
            addr,
            data: Vec::new(),
            size,
        });
        self
    }

    /// Adds a symbol and returns its index in the symbol table.
    pub fn symbol(&mut self, name: &str, value: u32, bind: u8, ty: u8, defined: bool) -> u32 {
        self.symbols.push(Symbol {
            name: name.to_string(),
            value,
            info: (bind << 4) | (ty & 0xf),
            defined,
        });
        self.symbols.len() as u32
    }

    /// Adds a symbol imported from the host.
    pub fn import(&mut self, name: &str, ty: u8) -> u32 {
        self.symbol(name, 0, STB_GLOBAL, ty, false)
    }

    /// Adds a global symbol defined by the module.
    pub fn export(&mut self, name: &str, value: u32, ty: u8) -> u32 {
        self.symbol(name, value, STB_GLOBAL, ty, true)
    }

    pub fn rela(mut self, offset: u32, r_type: u32, symbol: u32, addend: i32) -> Self {
        self.relocs.push(Reloc {
            offset,
            r_type,
            symbol,
            addend,
        });
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut strtab = vec![0u8];
        let mut symtab = vec![0u8; SYM_SIZE as usize];
        for sym in self.symbols.iter() {
            let name = push_str(&mut strtab, &sym.name);
            put_u32(&mut symtab, name);
            put_u32(&mut symtab, sym.value);
            put_u32(&mut symtab, 0);
            symtab.push(sym.info);
            symtab.push(0);
            put_u16(&mut symtab, if sym.defined { 1 } else { 0 });
        }
        let mut rela = Vec::new();
        for reloc in self.relocs.iter() {
            put_u32(&mut rela, reloc.offset);
            put_u32(&mut rela, (reloc.symbol << 8) | (reloc.r_type & 0xff));
            put_u32(&mut rela, reloc.addend as u32);
        }

        // (name, type, flags, addr, body, size, link, entsize)
        let mut headers: Vec<(String, u32, u32, u32, Vec<u8>, u32, u32, u32)> = self
            .sections
            .iter()
            .map(|sec| {
                (
                    sec.name.clone(),
                    sec.sh_type,
                    sec.flags,
                    sec.addr,
                    sec.data.clone(),
                    sec.size,
                    0,
                    0,
                )
            })
            .collect();
        let symtab_idx = headers.len() as u32 + 1;
        let strtab_idx = symtab_idx + 1;
        let symtab_len = symtab.len() as u32;
        let strtab_len = strtab.len() as u32;
        headers.push((".symtab".into(), SHT_SYMTAB, 0, 0, symtab, symtab_len, strtab_idx, SYM_SIZE));
        headers.push((".strtab".into(), SHT_STRTAB, 0, 0, strtab, strtab_len, 0, 0));
        if !rela.is_empty() {
            let rela_len = rela.len() as u32;
            headers.push((".rela.dyn".into(), SHT_RELA, SHF_ALLOC, 0, rela, rela_len, symtab_idx, RELA_SIZE));
        }
        let mut shstrtab = vec![0u8];
        let names: Vec<u32> = headers
            .iter()
            .map(|header| push_str(&mut shstrtab, &header.0))
            .collect();
        let shstrtab_name = push_str(&mut shstrtab, ".shstrtab");
        let shstrtab_len = shstrtab.len() as u32;
        headers.push((".shstrtab".into(), SHT_STRTAB, 0, 0, shstrtab, shstrtab_len, 0, 0));

        let phnum = self.segments.len() as u32;
        let mut out = vec![0u8; (EHDR_SIZE + phnum * PHDR_SIZE) as usize];

        let mut seg_offsets = Vec::new();
        for seg in self.segments.iter() {
            seg_offsets.push(out.len() as u32);
            out.extend_from_slice(&seg.data);
        }
        let mut sec_offsets = Vec::new();
        for header in headers.iter() {
            align(&mut out, 4);
            sec_offsets.push(out.len() as u32);
            out.extend_from_slice(&header.4);
        }
        align(&mut out, 4);
        let shoff = out.len() as u32;
        let shnum = headers.len() as u32 + 1;

        out.extend_from_slice(&[0u8; SHDR_SIZE as usize]);
        for (idx, header) in headers.iter().enumerate() {
            let name = names.get(idx).copied().unwrap_or(shstrtab_name);
            put_u32(&mut out, name);
            put_u32(&mut out, header.1);
            put_u32(&mut out, header.2);
            put_u32(&mut out, header.3);
            put_u32(&mut out, sec_offsets[idx]);
            put_u32(&mut out, header.5);
            put_u32(&mut out, header.6);
            put_u32(&mut out, 0);
            put_u32(&mut out, 4);
            put_u32(&mut out, header.7);
        }

        let mut ehdr = Vec::new();
        ehdr.extend_from_slice(&[0x7f, b'E', b'L', b'F', 1, 1, 1]);
        ehdr.resize(16, 0);
        put_u16(&mut ehdr, 3);
        put_u16(&mut ehdr, self.machine);
        put_u32(&mut ehdr, 1);
        put_u32(&mut ehdr, self.entry);
        put_u32(&mut ehdr, if phnum == 0 { 0 } else { EHDR_SIZE });
        put_u32(&mut ehdr, shoff);
        put_u32(&mut ehdr, 0);
        put_u16(&mut ehdr, EHDR_SIZE as u16);
        put_u16(&mut ehdr, PHDR_SIZE as u16);
        put_u16(&mut ehdr, phnum as u16);
        put_u16(&mut ehdr, SHDR_SIZE as u16);
        put_u16(&mut ehdr, shnum as u16);
        put_u16(&mut ehdr, (shnum - 1) as u16);
        out[..EHDR_SIZE as usize].copy_from_slice(&ehdr);

        for (idx, seg) in self.segments.iter().enumerate() {
            let mut phdr = Vec::new();
            put_u32(&mut phdr, 1);
            put_u32(&mut phdr, seg_offsets[idx]);
            put_u32(&mut phdr, seg.vaddr);
            put_u32(&mut phdr, seg.vaddr);
            put_u32(&mut phdr, seg.data.len() as u32);
            put_u32(&mut phdr, seg.memsz);
            put_u32(&mut phdr, 7);
            put_u32(&mut phdr, 4);
            let start = (EHDR_SIZE + idx as u32 * PHDR_SIZE) as usize;
            out[start..start + PHDR_SIZE as usize].copy_from_slice(&phdr);
        }
        out
    }
}

fn put_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn push_str(table: &mut Vec<u8>, s: &str) -> u32 {
    let offset = table.len() as u32;
    table.extend_from_slice(s.as_bytes());
    table.push(0);
    offset
}

fn align(buf: &mut Vec<u8>, align: usize) {
    while buf.len() % align != 0 {
        buf.push(0);
    }
}

/// A module with one segment, a global `main` at its start and no relocations.
pub fn simple_module(payload: &[u8]) -> Vec<u8> {
    let mut builder = ElfBuilder::new().entry(0);
    builder.export("main", 0, STT_FUNC);
    builder.segment(0, payload, payload.len() as u32).build()
}

#[derive(Default)]
struct AllocState {
    sizes: Mutex<Vec<(usize, MemCaps)>>,
    live: AtomicIsize,
    frees: AtomicUsize,
    fail_at: Option<usize>,
}

/// An allocator that records every request and how many regions are still live.
#[derive(Clone, Default)]
pub struct CountingAllocator {
    state: Arc<AllocState>,
}

impl CountingAllocator {
    /// An allocator whose `nth` request (counting from 1) fails.
    pub fn failing_at(nth: usize) -> Self {
        Self {
            state: Arc::new(AllocState {
                fail_at: Some(nth),
                ..AllocState::default()
            }),
        }
    }

    pub fn allocations(&self) -> Vec<(usize, MemCaps)> {
        self.state.sizes.lock().unwrap().clone()
    }

    pub fn live(&self) -> isize {
        self.state.live.load(Ordering::SeqCst)
    }

    pub fn frees(&self) -> usize {
        self.state.frees.load(Ordering::SeqCst)
    }
}

impl Allocator for CountingAllocator {
    unsafe fn allocate(&self, size: usize, caps: MemCaps) -> Option<NonNull<u8>> {
        let mut sizes = self.state.sizes.lock().unwrap();
        sizes.push((size, caps));
        if self.state.fail_at == Some(sizes.len()) {
            return None;
        }
        drop(sizes);
        let ptr = unsafe { HeapAllocator.allocate(size, caps) }?;
        self.state.live.fetch_add(1, Ordering::SeqCst);
        Some(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, size: usize, caps: MemCaps) {
        self.state.live.fetch_sub(1, Ordering::SeqCst);
        self.state.frees.fetch_add(1, Ordering::SeqCst);
        unsafe { HeapAllocator.deallocate(ptr, size, caps) };
    }
}

/// Readable, writable and executable pages from `mmap`, so the host can run
/// code placed by the loader.
#[cfg(unix)]
#[derive(Clone, Copy, Default)]
pub struct ExecAllocator;

#[cfg(unix)]
impl Allocator for ExecAllocator {
    unsafe fn allocate(&self, size: usize, _caps: MemCaps) -> Option<NonNull<u8>> {
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return None;
        }
        NonNull::new(ptr.cast())
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, size: usize, _caps: MemCaps) {
        unsafe { libc::munmap(ptr.as_ptr().cast(), size) };
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheEvent {
    Writeback(usize, usize),
    MapText(usize, usize),
    UnmapText(usize, usize),
}

/// A cache mirror that records every call and aliases text at a fixed offset.
#[derive(Clone, Default)]
pub struct RecordingCache {
    events: Arc<Mutex<Vec<CacheEvent>>>,
    ibus_offset: usize,
    refuse_map: bool,
}

impl RecordingCache {
    pub fn with_ibus_offset(ibus_offset: usize) -> Self {
        Self {
            ibus_offset,
            ..Self::default()
        }
    }

    pub fn refusing() -> Self {
        Self {
            refuse_map: true,
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<CacheEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl CacheMirror for RecordingCache {
    fn to_ibus(&self, daddr: usize) -> usize {
        daddr + self.ibus_offset
    }

    fn writeback(&self, addr: usize, len: usize) {
        self.events.lock().unwrap().push(CacheEvent::Writeback(addr, len));
    }

    fn map_text(&self, daddr: usize, len: usize) -> Result<()> {
        if self.refuse_map {
            return Err(elf_dlmod::no_mmu_slot("all mapping units are in use"));
        }
        self.events.lock().unwrap().push(CacheEvent::MapText(daddr, len));
        Ok(())
    }

    fn unmap_text(&self, daddr: usize, len: usize) {
        self.events.lock().unwrap().push(CacheEvent::UnmapText(daddr, len));
    }
}

/// In-memory module files that count how often they were opened.
#[derive(Clone, Default)]
pub struct CountingFiles {
    files: Arc<Mutex<MemoryFiles>>,
    opens: Arc<AtomicUsize>,
}

impl CountingFiles {
    pub fn insert(&self, path: &str, bytes: Vec<u8>) {
        self.files.lock().unwrap().insert(path, bytes);
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl FileAccessor for CountingFiles {
    fn open(&self, path: &str) -> Result<Cow<'_, [u8]>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let files = self.files.lock().unwrap();
        let bytes = files.open(path)?.into_owned();
        Ok(Cow::Owned(bytes))
    }
}

pub fn is_not_found(err: &Error) -> bool {
    matches!(err, Error::NotFound { .. })
}
