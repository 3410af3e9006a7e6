use crate::Result;
use alloc::borrow::Cow;

/// A trait for reading whole module files by path.
///
/// The module registry opens a module through this trait before loading it.
/// Implementations may hand out borrowed bytes (images linked into flash,
/// an in-memory table) or owned bytes (a file system read).
pub trait FileAccessor: Send + Sync {
    /// Returns the contents of the file at `path`.
    ///
    /// # Returns
    /// * `Ok(bytes)` - The complete file.
    /// * `Err(Error::NotFound)` - No file exists at `path`.
    /// * `Err(Error::Io)` - The file exists but could not be read.
    fn open(&self, path: &str) -> Result<Cow<'_, [u8]>>;
}

impl<F: FileAccessor + ?Sized> FileAccessor for alloc::sync::Arc<F> {
    fn open(&self, path: &str) -> Result<Cow<'_, [u8]>> {
        (**self).open(path)
    }
}
