use super::FileAccessor;
use crate::{Result, not_found};
use alloc::{borrow::Cow, format, string::String, vec::Vec};
use hashbrown::HashMap;

/// Module files held in memory, keyed by path.
#[derive(Debug, Default, Clone)]
pub struct MemoryFiles {
    files: HashMap<String, Vec<u8>>,
}

impl MemoryFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the file at `path`.
    pub fn insert(&mut self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), bytes.into());
    }

    pub fn remove(&mut self, path: &str) -> Option<Vec<u8>> {
        self.files.remove(path)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FileAccessor for MemoryFiles {
    fn open(&self, path: &str) -> Result<Cow<'_, [u8]>> {
        self.files
            .get(path)
            .map(|bytes| Cow::Borrowed(bytes.as_slice()))
            .ok_or_else(|| not_found(format!("no file at {}", path)))
    }
}

#[cfg(feature = "std")]
mod std_files {
    use super::FileAccessor;
    use crate::{Result, not_found};
    use alloc::{borrow::Cow, format};

    /// Module files read from the host file system.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct StdFiles;

    impl FileAccessor for StdFiles {
        fn open(&self, path: &str) -> Result<Cow<'_, [u8]>> {
            match std::fs::read(path) {
                Ok(bytes) => Ok(Cow::Owned(bytes)),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    Err(not_found(format!("no file at {}", path)))
                }
                Err(err) => Err(err.into()),
            }
        }
    }
}

#[cfg(feature = "std")]
pub use std_files::StdFiles;
