//! Manifest generation against an in-memory card.
//!
//! Covers the listing contents, exclusion of prior manifests and metadata,
//! chunking at the configured bound, index shifts caused by writing chunk
//! files into the directory being walked, and media that do not list
//! entries in name order.
//!
//! Run with: cargo test -p bluetooth --test manifest

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::arithmetic_side_effects
)]

use bluetooth::manifest::{chunk_path, ManifestBuilder, ManifestError};
use platform::mocks::MemoryStorage;
use platform::{DirEntry, OpenMode, StorageMedium};

/// Card that lists every directory in reverse name order. New entries keep
/// the relative order of existing ones, as on any real medium.
struct ReverseListing(MemoryStorage);

impl StorageMedium for ReverseListing {
    type Error = <MemoryStorage as StorageMedium>::Error;
    type Handle = <MemoryStorage as StorageMedium>::Handle;

    async fn open(&mut self, path: &str, mode: OpenMode) -> Result<Self::Handle, Self::Error> {
        self.0.open(path, mode).await
    }

    async fn exists(&mut self, path: &str) -> Result<bool, Self::Error> {
        self.0.exists(path).await
    }

    async fn mkdir(&mut self, path: &str) -> Result<(), Self::Error> {
        self.0.mkdir(path).await
    }

    async fn remove(&mut self, path: &str) -> Result<(), Self::Error> {
        self.0.remove(path).await
    }

    async fn size(&mut self, handle: &Self::Handle) -> Result<u64, Self::Error> {
        self.0.size(handle).await
    }

    async fn write(&mut self, handle: &mut Self::Handle, bytes: &[u8]) -> Result<(), Self::Error> {
        self.0.write(handle, bytes).await
    }

    async fn read(&mut self, handle: &mut Self::Handle, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.0.read(handle, buf).await
    }

    async fn close(&mut self, handle: Self::Handle) -> Result<(), Self::Error> {
        self.0.close(handle).await
    }

    async fn dir_entry(&mut self, dir: &str, index: usize) -> Result<Option<DirEntry>, Self::Error> {
        let mut count = 0;
        while self.0.dir_entry(dir, count).await?.is_some() {
            count += 1;
        }
        if index >= count {
            return Ok(None);
        }
        self.0.dir_entry(dir, count - 1 - index).await
    }
}

fn logger_card() -> MemoryStorage {
    let mut card = MemoryStorage::new();
    card.insert_file("/README.txt", b"Data File format: ...\n");
    card.insert_file("/logFile.txt", b"Wake Count, ...\n");
    card.insert_file("/Data/65A1B2C3.txt", b"1700000000, 2450, 3.912, 81.0\n");
    card.insert_file("/Data/65A1B2C3_1.txt", b"1700000060, 2451, 3.911, 80.9\n");
    card.insert_file("/GNSS_Data/0_1700000000.ubx", &[0xB5, 0x62, 0x01]);
    card
}

fn all_lines(card: &MemoryStorage, chunks: u32) -> Vec<String> {
    (0..chunks)
        .flat_map(|i| {
            card.text(&chunk_path(i))
                .expect("chunk file exists")
                .lines()
                .map(str::to_owned)
                .collect::<Vec<_>>()
        })
        .collect()
}

#[tokio::test]
async fn manifest_lists_every_stored_file_with_size() {
    let mut card = logger_card();
    let chunks = ManifestBuilder::new(4096).build(&mut card).await.unwrap();
    assert_eq!(chunks, 1);
    assert_eq!(
        all_lines(&card, chunks),
        vec![
            "/Data/65A1B2C3.txt,30",
            "/Data/65A1B2C3_1.txt,30",
            "/GNSS_Data/0_1700000000.ubx,3",
            "/README.txt,22",
            "/logFile.txt,16",
        ]
    );
}

#[tokio::test]
async fn manifest_excludes_prior_manifests_and_metadata() {
    let mut card = logger_card();
    card.insert_file("/filelist0.txt", b"stale\n");
    card.insert_file("/filelist1.txt", b"stale\n");
    card.insert_file("/filelist2.txt", b"stale\n");
    card.insert_file("/._README.txt", b"mac metadata");
    card.insert_file("/System Volume Information/IndexerVolumeGuid", b"x");
    card.insert_file("/.Trashes/junk", b"x");

    let chunks = ManifestBuilder::new(4096).build(&mut card).await.unwrap();
    assert_eq!(chunks, 1);
    let lines = all_lines(&card, chunks);
    assert_eq!(lines.len(), 5);
    assert!(lines.iter().all(|l| !l.contains("filelist")));
    assert!(lines.iter().all(|l| !l.contains("System Volume")));
    assert!(lines.iter().all(|l| !l.contains("/.")));
    // Stale chunks beyond the new count are gone.
    assert!(card.file("/filelist1.txt").is_none());
    assert!(card.file("/filelist2.txt").is_none());
}

#[tokio::test]
async fn manifest_chunks_respect_bound() {
    let mut card = MemoryStorage::new();
    for i in 0..40 {
        card.insert_file(&format!("/Data/{:08X}.txt", 0x65A1_0000 + i), b"0123456789");
    }
    // Each line is "/Data/XXXXXXXX.txt,10\n" = 22 bytes; 100-byte chunks
    // hold four lines.
    let chunks = ManifestBuilder::new(100).build(&mut card).await.unwrap();
    assert_eq!(chunks, 10);
    for i in 0..chunks {
        let chunk = card.file(&chunk_path(i)).unwrap();
        assert!(chunk.len() <= 100, "chunk {i} is {} bytes", chunk.len());
    }
    let lines = all_lines(&card, chunks);
    assert_eq!(lines.len(), 40);
    let mut sorted = lines.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(sorted.len(), 40, "no line listed twice");
}

#[tokio::test]
async fn chunk_files_written_mid_walk_do_not_duplicate_root_entries() {
    // Root entries sort as: Data, filelistN.txt, g.txt, h.txt, m.txt, z.txt.
    // A chunk flushed while the walk sits on g.txt lands before the cursor.
    let mut card = MemoryStorage::new();
    for i in 0..20 {
        card.insert_file(&format!("/Data/{i:02}.txt"), b"x");
    }
    for name in ["g.txt", "h.txt", "m.txt", "z.txt"] {
        card.insert_file(&format!("/{name}"), b"y");
    }
    let chunks = ManifestBuilder::new(32).build(&mut card).await.unwrap();
    let lines = all_lines(&card, chunks);
    assert_eq!(lines.len(), 24);
    let mut sorted = lines.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(sorted.len(), 24);
}

#[tokio::test]
async fn empty_card_yields_one_empty_chunk() {
    let mut card = MemoryStorage::new();
    let chunks = ManifestBuilder::new(4096).build(&mut card).await.unwrap();
    assert_eq!(chunks, 1);
    assert_eq!(card.file("/filelist0.txt"), Some(&b""[..]));
}

#[tokio::test]
async fn line_longer_than_bound_is_an_error() {
    let mut card = logger_card();
    let result = ManifestBuilder::new(8).build(&mut card).await;
    assert!(matches!(result, Err(ManifestError::LineTooLong)));
}

#[tokio::test]
async fn unwritable_chunk_reports_storage_error() {
    let mut card = logger_card();
    card.fail_open("/filelist0.txt");
    let result = ManifestBuilder::new(4096).build(&mut card).await;
    assert!(matches!(result, Err(ManifestError::Storage(_))));
}

#[tokio::test]
async fn reverse_listing_still_walks_every_directory() {
    let mut inner = MemoryStorage::new();
    for name in ["A", "B", "C"] {
        inner.insert_file(&format!("/Data/{name}.txt"), b"1700000000, 2450, 3.912, 81.0\n");
    }
    inner.insert_file("/README.txt", b"legend\n");
    let mut card = ReverseListing(inner);

    let chunks = ManifestBuilder::new(4096).build(&mut card).await.unwrap();
    assert_eq!(chunks, 1);
    let mut lines = all_lines(&card.0, chunks);
    lines.sort();
    assert_eq!(
        lines,
        vec!["/Data/A.txt,30", "/Data/B.txt,30", "/Data/C.txt,30", "/README.txt,7"]
    );
}

#[tokio::test]
async fn reverse_listing_survives_chunks_written_mid_walk() {
    // In reverse order the root reads z.txt, ..., filelistN.txt, ..., Data,
    // so chunks flushed while the walk is on the root files land before the
    // cursor.
    let mut inner = MemoryStorage::new();
    for i in 0..12 {
        inner.insert_file(&format!("/Data/{i:02}.txt"), b"x");
    }
    for name in ["g.txt", "h.txt", "m.txt", "p.txt", "t.txt", "z.txt"] {
        inner.insert_file(&format!("/{name}"), b"y");
    }
    let mut card = ReverseListing(inner);

    let chunks = ManifestBuilder::new(32).build(&mut card).await.unwrap();
    assert!(chunks > 3);
    let lines = all_lines(&card.0, chunks);
    assert_eq!(lines.len(), 18);
    let mut sorted = lines.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(sorted.len(), 18, "no line listed twice");
    assert!(sorted.contains(&"/Data/00.txt,1".to_owned()));
    assert!(sorted.contains(&"/z.txt,1".to_owned()));
}
