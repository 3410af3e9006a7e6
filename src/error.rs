use alloc::{borrow::Cow, string::String};
use core::fmt::{Debug, Display};

const ENOENT: i32 = 2;
const EIO: i32 = 5;
const ENOEXEC: i32 = 8;
const ENOMEM: i32 = 12;
const EINVAL: i32 = 22;
const ENOSPC: i32 = 28;
const ENOSYS: i32 = 38;

/// Error types used throughout the `elf_dlmod` library.
/// These errors represent the failure conditions that can occur while
/// parsing, loading, relocating and registering ELF modules.
#[derive(Debug)]
pub enum Error {
    /// A required argument was missing or the object was in the wrong state.
    InvalidArgument {
        /// A descriptive message about the invalid argument.
        msg: Cow<'static, str>,
    },

    /// The ELF input is structurally inconsistent.
    ///
    /// This covers:
    /// * `p_memsz < p_filesz`
    /// * overlapping, unordered or overflowing segments
    /// * a missing or empty `.text` section
    /// * file ranges that lie outside the buffer
    InvalidSegment {
        /// A descriptive message about the inconsistency.
        msg: Cow<'static, str>,
    },

    /// The allocator could not provide memory.
    OutOfMemory {
        /// Number of bytes that were requested.
        size: usize,
    },

    /// A relocation refers to a symbol that could not be resolved.
    UnresolvedSymbol {
        /// Name of the symbol.
        name: String,
    },

    /// The architecture relocator does not know this relocation type.
    UnsupportedRelocation {
        /// The raw relocation type.
        r_type: u32,
        /// Human readable name of the type, `UNKNOWN` if it has none.
        name: &'static str,
    },

    /// A relocation site or target lies outside the loaded image.
    Relocation {
        /// A descriptive message about the relocation error.
        msg: Cow<'static, str>,
    },

    /// A module, handle or symbol lookup missed.
    NotFound {
        /// A descriptive message about what was not found.
        msg: Cow<'static, str>,
    },

    /// The MMU has no free mapping unit for the text section.
    NoMmuSlot {
        /// A descriptive message about the exhausted resource.
        msg: Cow<'static, str>,
    },

    /// An error occurred while parsing the ELF header.
    ///
    /// This error typically indicates issues with the ELF header such as:
    /// * Invalid magic bytes
    /// * A class, data encoding or machine the loader does not support
    ParseEhdr {
        /// A descriptive message about the ELF header parsing error.
        msg: Cow<'static, str>,
    },

    /// An error occurred while opening or reading a module file.
    Io {
        /// A descriptive message about the I/O error.
        msg: Cow<'static, str>,
    },
}

impl Error {
    /// Returns the negative `errno` value reported through the C style API.
    pub fn errno(&self) -> i32 {
        let code = match self {
            Error::InvalidArgument { .. }
            | Error::InvalidSegment { .. }
            | Error::UnsupportedRelocation { .. }
            | Error::Relocation { .. } => EINVAL,
            Error::OutOfMemory { .. } => ENOMEM,
            Error::UnresolvedSymbol { .. } => ENOSYS,
            Error::NotFound { .. } => ENOENT,
            Error::NoMmuSlot { .. } => ENOSPC,
            Error::ParseEhdr { .. } => ENOEXEC,
            Error::Io { .. } => EIO,
        };
        -code
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::InvalidArgument { msg } => write!(f, "Invalid argument: {msg}"),
            Error::InvalidSegment { msg } => write!(f, "Invalid segment: {msg}"),
            Error::OutOfMemory { size } => write!(f, "Out of memory: failed to allocate {size} bytes"),
            Error::UnresolvedSymbol { name } => write!(f, "Unresolved symbol: {name}"),
            Error::UnsupportedRelocation { r_type, name } => {
                write!(f, "Unsupported relocation type: {name} ({r_type})")
            }
            Error::Relocation { msg } => write!(f, "Relocation error: {msg}"),
            Error::NotFound { msg } => write!(f, "Not found: {msg}"),
            Error::NoMmuSlot { msg } => write!(f, "No free MMU slot: {msg}"),
            Error::ParseEhdr { msg } => write!(f, "ELF header parsing error: {msg}"),
            Error::Io { msg } => write!(f, "I/O error: {msg}"),
        }
    }
}

impl core::error::Error for Error {}

#[cfg(feature = "std")]
impl From<std::io::Error> for Error {
    #[cold]
    fn from(value: std::io::Error) -> Self {
        use alloc::string::ToString;
        Error::Io {
            msg: value.to_string().into(),
        }
    }
}

#[cold]
#[inline(never)]
pub(crate) fn invalid_argument(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::InvalidArgument { msg: msg.into() }
}

#[cold]
#[inline(never)]
pub(crate) fn segment_error(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::InvalidSegment { msg: msg.into() }
}

#[cold]
#[inline(never)]
pub(crate) fn out_of_memory(size: usize) -> Error {
    Error::OutOfMemory { size }
}

#[cold]
#[inline(never)]
pub(crate) fn unresolved_symbol(name: &str) -> Error {
    use alloc::string::ToString;
    Error::UnresolvedSymbol {
        name: name.to_string(),
    }
}

/// Creates an unsupported relocation error.
///
/// Relocators outside this crate use it to report types they do not handle.
#[cold]
#[inline(never)]
pub fn unsupported_relocation(r_type: u32, name: &'static str) -> Error {
    Error::UnsupportedRelocation { r_type, name }
}

/// Creates a relocation error with the specified message.
#[cold]
#[inline(never)]
pub fn relocate_error(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::Relocation { msg: msg.into() }
}

#[cold]
#[inline(never)]
pub(crate) fn not_found(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::NotFound { msg: msg.into() }
}

/// Creates an MMU exhaustion error.
///
/// Used by [`crate::os::CacheMirror`] implementations when no mapping unit is free.
#[cold]
#[inline(never)]
pub fn no_mmu_slot(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::NoMmuSlot { msg: msg.into() }
}

#[cold]
#[inline(never)]
pub(crate) fn parse_ehdr_error(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::ParseEhdr { msg: msg.into() }
}

/// Creates an I/O error with the specified message.
///
/// File accessors outside this crate use it to report open failures.
#[cold]
#[inline(never)]
pub fn io_error(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::Io { msg: msg.into() }
}
