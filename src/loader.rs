use crate::{
    Result,
    arch::ArchRelocator,
    elf::ElfFile,
    os::{Allocator, CacheMirror, HeapAllocator, Unified},
    relocation::{SymbolLookup, collect_exports, relocate_sections},
    segment::{LoadedImage, SectionImage, SegmentImage},
    symbol::ElfExport,
};
use alloc::{boxed::Box, sync::Arc, vec::Vec};
use core::fmt::Debug;

/// How a module is placed in memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layout {
    /// One executable and writable block following the program headers.
    Segments,
    /// `.text` in executable memory, the data sections in a second block.
    Sections,
}

impl Default for Layout {
    fn default() -> Self {
        cfg_if::cfg_if! {
            if #[cfg(feature = "section-layout")] {
                Layout::Sections
            } else {
                Layout::Segments
            }
        }
    }
}

/// The ELF module loader.
///
/// `Loader` holds the platform capabilities an image needs (memory, caches, the
/// relocator of the target and the host symbols) and turns ELF bytes into a
/// relocated image.
///
/// # Examples
/// ```no_run
/// use elf_dlmod::{Layout, Loader, arch::Riscv32, object::ElfObject};
///
/// let loader = Loader::new(Riscv32)
///     .with_layout(Layout::Sections)
///     .with_resolver(|_: &str| -> Option<*const ()> { None });
/// let bytes = std::fs::read("hello.so").unwrap();
/// let mut object = ElfObject::new();
/// object.relocate(&loader, &bytes).unwrap();
/// ```
#[derive(Clone)]
pub struct Loader {
    allocator: Arc<dyn Allocator>,
    relocator: Arc<dyn ArchRelocator>,
    resolver: Arc<dyn SymbolLookup + Send + Sync>,
    cache: Arc<dyn CacheMirror>,
    layout: Layout,
}

impl Debug for Loader {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Loader")
            .field("machine", &self.relocator.machine())
            .field("layout", &self.layout)
            .finish()
    }
}

impl Loader {
    /// Creates a loader for the target `relocator` handles.
    ///
    /// Images come from the global heap, caches are treated as unified and no
    /// host symbol resolves until [`Loader::with_resolver`] is called.
    pub fn new(relocator: impl ArchRelocator + 'static) -> Self {
        Self {
            allocator: Arc::new(HeapAllocator),
            relocator: Arc::new(relocator),
            resolver: Arc::new(()),
            cache: Arc::new(Unified),
            layout: Layout::default(),
        }
    }

    pub fn with_allocator(mut self, allocator: impl Allocator + 'static) -> Self {
        self.allocator = Arc::new(allocator);
        self
    }

    /// Sets the lookup used for symbols the module imports from the host.
    pub fn with_resolver(mut self, resolver: impl SymbolLookup + Send + Sync + 'static) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    pub fn with_cache(mut self, cache: impl CacheMirror + 'static) -> Self {
        self.cache = Arc::new(cache);
        self
    }

    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    #[inline]
    pub fn layout(&self) -> Layout {
        self.layout
    }

    #[inline]
    pub fn relocator(&self) -> &dyn ArchRelocator {
        &*self.relocator
    }

    /// Loads, relocates and finalizes the module in `bytes`.
    ///
    /// On error every region allocated so far has already been returned.
    pub(crate) fn load(&self, bytes: &[u8]) -> Result<(Box<dyn LoadedImage>, Vec<ElfExport>)> {
        let file = ElfFile::parse(bytes)?;
        file.ehdr().check_machine(self.relocator.machine())?;
        let mut image: Box<dyn LoadedImage> = match self.layout {
            Layout::Segments => Box::new(SegmentImage::load(
                &file,
                &self.allocator,
                self.cache.clone(),
            )?),
            Layout::Sections => Box::new(SectionImage::load(
                &file,
                &self.allocator,
                self.cache.clone(),
            )?),
        };
        relocate_sections(&file, &*image, &*self.resolver, &*self.relocator)?;
        image.finalize()?;
        let exports = collect_exports(&file, &*image)?;
        #[cfg(feature = "log")]
        log::debug!(
            "loaded {:?} image: entry {:x?}, {} exports, regions {:?}",
            image.layout(),
            image.entry(),
            exports.len(),
            image.regions()
        );
        Ok((image, exports))
    }
}
