//! A single file transfer: what was requested, how far it got, and how it
//! ended.

use core::ops::Range;

use crate::checksum::checksum;
use crate::manifest::CardPath;
use crate::status::{parse_checksum, ChecksumParseError};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionPhase {
    /// Chunks are being notified.
    Sending,
    /// All chunks sent; waiting for the client's checksum.
    AwaitingChecksum,
}

/// Result of comparing the client's checksum with ours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Verdict {
    /// Client received exactly what was sent.
    Match,
    /// Client computed a different value.
    Mismatch {
        /// Value the client reported.
        received: u32,
    },
    /// Client wrote something that is not a checksum.
    Malformed(ChecksumParseError),
}

/// State of one transfer. The file bytes themselves live in the caller's
/// buffer; the session only tracks how many of them are valid and sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSession {
    path: CardPath,
    len: usize,
    offset: usize,
    expected: u32,
    received: Option<u32>,
    phase: SessionPhase,
}

impl TransferSession {
    /// Session for `path` whose first `loaded.len()` bytes have been read
    /// into memory.
    pub fn new(path: CardPath, loaded: &[u8]) -> Self {
        Self {
            path,
            len: loaded.len(),
            offset: 0,
            expected: checksum(loaded),
            received: None,
            phase: SessionPhase::Sending,
        }
    }

    /// Requested path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// File length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the file is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes already handed out by [`next_chunk`](Self::next_chunk).
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Checksum over the whole loaded file.
    pub fn expected(&self) -> u32 {
        self.expected
    }

    /// Last checksum the client reported, if it parsed.
    pub fn received(&self) -> Option<u32> {
        self.received
    }

    /// Current phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Byte range of the next chunk of at most `chunk` bytes, advancing the
    /// offset. Returns `None` once everything has been handed out and moves
    /// the session to [`SessionPhase::AwaitingChecksum`].
    pub fn next_chunk(&mut self, chunk: usize) -> Option<Range<usize>> {
        if self.offset >= self.len || chunk == 0 {
            self.phase = SessionPhase::AwaitingChecksum;
            return None;
        }
        let end = self.offset.saturating_add(chunk).min(self.len);
        let range = self.offset..end;
        self.offset = end;
        Some(range)
    }

    /// Compare the client's raw checksum write with the expected value.
    pub fn verify(&mut self, raw: &[u8]) -> Verdict {
        match parse_checksum(raw) {
            Ok(value) => {
                self.received = Some(value);
                if value == self.expected {
                    Verdict::Match
                } else {
                    Verdict::Mismatch { received: value }
                }
            }
            Err(e) => Verdict::Malformed(e),
        }
    }
}
