//! Local filesystem storage medium for the desktop emulator.
//!
//! `LocalStorage` implements [`StorageMedium`] using `std::fs`.
//! Used when the `std` feature is enabled (emulator builds only).
//! All paths are resolved relative to the card root provided at construction,
//! so `/Data/1.txt` lands in `<root>/Data/1.txt`.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::storage::{DirEntry, FileName, OpenMode, StorageMedium};

/// Error type for local filesystem operations.
#[derive(Debug)]
pub struct LocalStorageError(pub std::io::Error);

impl core::fmt::Display for LocalStorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "local storage error: {}", self.0)
    }
}

impl std::error::Error for LocalStorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl From<std::io::Error> for LocalStorageError {
    fn from(e: std::io::Error) -> Self {
        Self(e)
    }
}

/// An open file on the local filesystem.
pub struct LocalHandle {
    inner: fs::File,
}

/// A [`StorageMedium`] backed by a directory on the host.
///
/// # Example
/// ```no_run
/// # async fn example() {
/// use platform::storage_local::LocalStorage;
/// use platform::{OpenMode, StorageMedium};
/// let mut card = LocalStorage::new("/tmp/card");
/// let handle = card.open("/README.txt", OpenMode::Read).await.unwrap();
/// card.close(handle).await.unwrap();
/// # }
/// ```
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Create a new medium rooted at `card_root`.
    #[must_use]
    pub fn new(card_root: impl AsRef<Path>) -> Self {
        Self {
            root: card_root.as_ref().to_path_buf(),
        }
    }

    /// Create from the `CARD_PATH` environment variable.
    ///
    /// Returns `None` if `CARD_PATH` is not set or is not valid UTF-8.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        std::env::var("CARD_PATH").ok().map(Self::new)
    }

    /// Directory that backs the card root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

impl StorageMedium for LocalStorage {
    type Error = LocalStorageError;
    type Handle = LocalHandle;

    async fn open(&mut self, path: &str, mode: OpenMode) -> Result<Self::Handle, Self::Error> {
        let full = self.resolve(path);
        let inner = match mode {
            OpenMode::Read => fs::File::open(&full)?,
            OpenMode::Append => fs::OpenOptions::new().create(true).append(true).open(&full)?,
            OpenMode::Truncate => fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&full)?,
        };
        Ok(LocalHandle { inner })
    }

    async fn exists(&mut self, path: &str) -> Result<bool, Self::Error> {
        Ok(self.resolve(path).exists())
    }

    async fn mkdir(&mut self, path: &str) -> Result<(), Self::Error> {
        fs::create_dir_all(self.resolve(path))?;
        Ok(())
    }

    async fn remove(&mut self, path: &str) -> Result<(), Self::Error> {
        fs::remove_file(self.resolve(path))?;
        Ok(())
    }

    async fn size(&mut self, handle: &Self::Handle) -> Result<u64, Self::Error> {
        Ok(handle.inner.metadata()?.len())
    }

    async fn write(&mut self, handle: &mut Self::Handle, bytes: &[u8]) -> Result<(), Self::Error> {
        handle.inner.write_all(bytes)?;
        Ok(())
    }

    async fn read(
        &mut self,
        handle: &mut Self::Handle,
        buf: &mut [u8],
    ) -> Result<usize, Self::Error> {
        Ok(Read::read(&mut handle.inner, buf)?)
    }

    async fn close(&mut self, mut handle: Self::Handle) -> Result<(), Self::Error> {
        handle.inner.flush()?;
        handle.inner.sync_all()?;
        Ok(())
    }

    async fn dir_entry(&mut self, dir: &str, index: usize) -> Result<Option<DirEntry>, Self::Error> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(self.resolve(dir))? {
            let entry = entry?;
            // Names that are not UTF-8 or too long cannot be requested by a client.
            let Some(name) = entry
                .file_name()
                .to_str()
                .and_then(|n| FileName::try_from(n).ok())
            else {
                continue;
            };
            let meta = entry.metadata()?;
            entries.push(DirEntry {
                name,
                is_dir: meta.is_dir(),
                size: if meta.is_dir() { 0 } else { meta.len() },
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries.into_iter().nth(index))
    }
}
