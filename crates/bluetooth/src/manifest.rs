//! Manifest generation: the file listing a client downloads before choosing
//! which files to fetch.
//!
//! The listing is written as one or more chunk files at the card root
//! (`/filelist0.txt`, `/filelist1.txt`, ...), each no larger than the
//! configured bound. Every line is `"{path},{size}\n"`.
//!
//! The walk is index based (see [`StorageMedium::dir_entry`]) and makes no
//! assumption about listing order. Chunk files are written into `/` while
//! `/` may still be being walked, which can shift the root's indices. After
//! every flush the root level looks its last handled entry up again and
//! carries on just past it.

use core::fmt::Write as _;

use platform::{FileName, OpenMode, StorageMedium};

/// Request token that asks for a fresh manifest.
pub const MANIFEST_TOKEN: &str = "filelist.txt";

/// Largest manifest chunk this build can hold in memory.
pub const MAX_MANIFEST_CHUNK: usize = 4096;

/// Deepest directory nesting the walk descends into (the root is level 1).
pub const MAX_WALK_DEPTH: usize = 4;

/// Upper bound on chunk files, old or new.
pub const MAX_MANIFEST_CHUNKS: u32 = 256;

/// An absolute path on the medium.
pub type CardPath = heapless::String<128>;

/// Why a manifest could not be produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestError<E> {
    /// The medium failed.
    Storage(E),
    /// A path does not fit in [`CardPath`].
    PathTooLong,
    /// A single line is longer than the chunk bound.
    LineTooLong,
    /// More than [`MAX_MANIFEST_CHUNKS`] chunks would be needed.
    TooManyChunks,
}

impl<E> From<E> for ManifestError<E> {
    fn from(e: E) -> Self {
        Self::Storage(e)
    }
}

impl<E: core::fmt::Debug> core::fmt::Display for ManifestError<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "storage error: {e:?}"),
            Self::PathTooLong => f.write_str("path too long"),
            Self::LineTooLong => f.write_str("manifest line exceeds chunk bound"),
            Self::TooManyChunks => f.write_str("too many manifest chunks"),
        }
    }
}

/// Whether the client asked for the manifest.
pub fn is_manifest_request(name: &str) -> bool {
    name.trim_start_matches('/') == MANIFEST_TOKEN
}

/// Path of manifest chunk `index`.
pub fn chunk_path(index: u32) -> CardPath {
    let mut p = CardPath::new();
    // "/filelist4294967295.txt" is 23 bytes.
    let _ = write!(p, "/filelist{index}.txt");
    p
}

/// Whether a directory entry is left out of the manifest: previous
/// manifests and file-system metadata.
pub fn is_excluded(name: &str) -> bool {
    let manifest = name.starts_with("filelist")
        && name.ends_with(".txt")
        && name
            .get("filelist".len()..name.len().saturating_sub(".txt".len()))
            .is_some_and(|mid| mid.bytes().all(|b| b.is_ascii_digit()));
    manifest || name.starts_with('.') || name == "System Volume Information"
}

/// `dir` joined with `name`.
pub fn join(dir: &str, name: &str) -> Option<CardPath> {
    let mut p = CardPath::new();
    if dir != "/" {
        p.push_str(dir.trim_end_matches('/')).ok()?;
    }
    p.push('/').ok()?;
    p.push_str(name).ok()?;
    Some(p)
}

/// Directory the chunk files are written to.
const CHUNK_DIR: &str = "/";

struct Level {
    dir: CardPath,
    /// Next index to read.
    index: usize,
    /// Entry read at `index - 1`.
    last: Option<FileName>,
    /// Chunks written when `index` was last known to be right.
    synced: u32,
}

/// Builds manifest chunks into a fixed buffer and flushes each one as a
/// file when the next line would cross the bound.
pub struct ManifestBuilder {
    bound: usize,
    chunk: heapless::String<MAX_MANIFEST_CHUNK>,
    chunks: u32,
}

impl ManifestBuilder {
    /// Builder with chunks of at most `bound` bytes (clamped to
    /// [`MAX_MANIFEST_CHUNK`]).
    pub fn new(bound: usize) -> Self {
        Self {
            bound: bound.clamp(1, MAX_MANIFEST_CHUNK),
            chunk: heapless::String::new(),
            chunks: 0,
        }
    }

    /// Remove any previous manifest, walk the medium and write the new
    /// chunks. Returns the number of chunk files written (at least one; an
    /// empty card yields a single empty chunk).
    pub async fn build<S: StorageMedium>(
        mut self,
        storage: &mut S,
    ) -> Result<u32, ManifestError<S::Error>> {
        remove_previous(storage).await?;

        let mut stack: heapless::Vec<Level, MAX_WALK_DEPTH> = heapless::Vec::new();
        let root = Level {
            dir: join(CHUNK_DIR, "").ok_or(ManifestError::PathTooLong)?,
            index: 0,
            last: None,
            synced: 0,
        };
        stack.push(root).map_err(|_| ManifestError::PathTooLong)?;

        while let Some(level) = stack.last_mut() {
            if level.synced != self.chunks {
                if level.dir.as_str() == CHUNK_DIR {
                    if let Some(last) = &level.last {
                        if let Some(next) = index_after(storage, &level.dir, last).await? {
                            level.index = next;
                        }
                    }
                }
                level.synced = self.chunks;
            }
            let Some(entry) = storage.dir_entry(&level.dir, level.index).await? else {
                stack.pop();
                continue;
            };
            level.index = level.index.saturating_add(1);
            level.last = Some(entry.name.clone());
            if is_excluded(&entry.name) {
                continue;
            }
            let path = join(&level.dir, &entry.name).ok_or(ManifestError::PathTooLong)?;
            if entry.is_dir {
                // Deeper trees are not produced by the logger itself.
                let _ = stack.push(Level {
                    dir: path,
                    index: 0,
                    last: None,
                    synced: self.chunks,
                });
                continue;
            }
            let mut line = heapless::String::<160>::new();
            writeln!(line, "{path},{}", entry.size).map_err(|_| ManifestError::PathTooLong)?;
            self.push_line(storage, &line).await?;
        }

        if !self.chunk.is_empty() || self.chunks == 0 {
            self.flush(storage).await?;
        }
        Ok(self.chunks)
    }

    async fn push_line<S: StorageMedium>(
        &mut self,
        storage: &mut S,
        line: &str,
    ) -> Result<(), ManifestError<S::Error>> {
        if line.len() > self.bound {
            return Err(ManifestError::LineTooLong);
        }
        if self.chunk.len().saturating_add(line.len()) > self.bound {
            self.flush(storage).await?;
        }
        self.chunk
            .push_str(line)
            .map_err(|_| ManifestError::LineTooLong)
    }

    async fn flush<S: StorageMedium>(
        &mut self,
        storage: &mut S,
    ) -> Result<(), ManifestError<S::Error>> {
        if self.chunks >= MAX_MANIFEST_CHUNKS {
            return Err(ManifestError::TooManyChunks);
        }
        let path = chunk_path(self.chunks);
        let mut handle = storage.open(&path, OpenMode::Truncate).await?;
        let written = storage.write(&mut handle, self.chunk.as_bytes()).await;
        storage.close(handle).await?;
        written?;
        self.chunks = self.chunks.saturating_add(1);
        self.chunk.clear();
        Ok(())
    }
}

/// Index just past `name` in `dir`, or `None` if it is no longer listed.
async fn index_after<S: StorageMedium>(
    storage: &mut S,
    dir: &str,
    name: &FileName,
) -> Result<Option<usize>, S::Error> {
    let mut index = 0usize;
    while let Some(entry) = storage.dir_entry(dir, index).await? {
        index = index.saturating_add(1);
        if entry.name == *name {
            return Ok(Some(index));
        }
    }
    Ok(None)
}

async fn remove_previous<S: StorageMedium>(storage: &mut S) -> Result<(), S::Error> {
    for index in 0..MAX_MANIFEST_CHUNKS {
        let path = chunk_path(index);
        if !storage.exists(&path).await? {
            break;
        }
        storage.remove(&path).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_token_matches_with_or_without_slash() {
        assert!(is_manifest_request("filelist.txt"));
        assert!(is_manifest_request("/filelist.txt"));
        assert!(!is_manifest_request("filelist0.txt"));
    }

    #[test]
    fn excludes_manifests_and_metadata() {
        assert!(is_excluded("filelist0.txt"));
        assert!(is_excluded("filelist12.txt"));
        assert!(is_excluded(".Trashes"));
        assert!(is_excluded("._65A1B2C3.txt"));
        assert!(is_excluded("System Volume Information"));
        assert!(!is_excluded("filelist_notes.txt"));
        assert!(!is_excluded("65A1B2C3.txt"));
        assert!(!is_excluded("README.txt"));
    }

    #[test]
    fn joins_paths() {
        assert_eq!(join("/", "README.txt").as_deref(), Some("/README.txt"));
        assert_eq!(join("/Data", "1.txt").as_deref(), Some("/Data/1.txt"));
        assert_eq!(join("/", "").as_deref(), Some("/"));
    }

    #[test]
    fn chunk_paths_are_numbered() {
        assert_eq!(chunk_path(0).as_str(), "/filelist0.txt");
        assert_eq!(chunk_path(11).as_str(), "/filelist11.txt");
    }
}
