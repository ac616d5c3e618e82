//! Storage abstraction for the removable medium
//!
//! Paths are absolute and `/`-separated (`/Data/65A1B2C3.txt`). Directory
//! enumeration is index based so callers can interleave listing with other
//! file operations without holding a borrow of the medium.

/// Longest file or directory name the medium reports.
pub const MAX_NAME_LEN: usize = 64;

/// A single path component.
pub type FileName = heapless::String<MAX_NAME_LEN>;

/// How a file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OpenMode {
    /// Read from the start; fails if the file does not exist.
    Read,
    /// Create if missing, position writes at the end.
    Append,
    /// Create if missing, discard existing contents.
    Truncate,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Entry name without its parent path.
    pub name: FileName,
    /// `true` for directories.
    pub is_dir: bool,
    /// File size in bytes (0 for directories).
    pub size: u64,
}

/// Removable storage medium.
pub trait StorageMedium {
    /// Error type
    type Error: core::fmt::Debug;
    /// Open file handle
    type Handle;

    /// Open `path` in `mode`.
    async fn open(&mut self, path: &str, mode: OpenMode) -> Result<Self::Handle, Self::Error>;

    /// Check if a file or directory exists at `path`.
    async fn exists(&mut self, path: &str) -> Result<bool, Self::Error>;

    /// Create directory `path`. Succeeds if it already exists.
    async fn mkdir(&mut self, path: &str) -> Result<(), Self::Error>;

    /// Delete the file at `path`.
    async fn remove(&mut self, path: &str) -> Result<(), Self::Error>;

    /// Current size of an open file in bytes.
    async fn size(&mut self, handle: &Self::Handle) -> Result<u64, Self::Error>;

    /// Write all of `bytes` at the handle's position.
    async fn write(&mut self, handle: &mut Self::Handle, bytes: &[u8]) -> Result<(), Self::Error>;

    /// Read from the handle's position; returns 0 at end of file.
    async fn read(&mut self, handle: &mut Self::Handle, buf: &mut [u8])
        -> Result<usize, Self::Error>;

    /// Flush and release a handle.
    async fn close(&mut self, handle: Self::Handle) -> Result<(), Self::Error>;

    /// The `index`-th entry of directory `dir`, or `None` past the last
    /// entry.
    ///
    /// The order is the medium's own (FAT lists in creation order, the
    /// host backends by name). Creating an entry may shift indices, but
    /// entries already present keep their relative order.
    async fn dir_entry(&mut self, dir: &str, index: usize) -> Result<Option<DirEntry>, Self::Error>;
}
