//! Status strings published on the status characteristic, and parsing of the
//! checksum the client writes back.

use core::fmt::Write as _;

/// Rendered status text.
pub type StatusText = heapless::String<32>;

/// Everything the device reports on the status characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Status {
    /// Manifest written as this many chunk files.
    FileListsMade(u32),
    /// Manifest generation failed.
    FileListsFailed,
    /// Requested file missing, unreadable or above the size ceiling.
    FileLoadFailed,
    /// All chunks sent; the checksum follows on the checksum characteristic.
    TransferComplete,
    /// Client checksum matched.
    TransferSuccess,
    /// Client checksum mismatched or malformed; request the file again.
    RetryTransfer,
    /// Session-level error.
    Error,
}

impl Status {
    /// Wire form of this status.
    pub fn render(self) -> StatusText {
        let mut s = StatusText::new();
        // Longest rendering is "FILELISTS_MADE 4294967295" (25 bytes).
        let _ = match self {
            Self::FileListsMade(n) => write!(s, "FILELISTS_MADE {n}"),
            Self::FileListsFailed => s.write_str("FILELISTS_FAILED"),
            Self::FileLoadFailed => s.write_str("FILE_LOAD_FAILED"),
            Self::TransferComplete => s.write_str("TRANSFER_COMPLETE"),
            Self::TransferSuccess => s.write_str("TRANSFER_SUCCESS"),
            Self::RetryTransfer => s.write_str("RETRY_TRANSFER"),
            Self::Error => s.write_str("BLE_ERR"),
        };
        s
    }
}

/// Decimal rendering of a checksum for the checksum characteristic.
pub fn render_checksum(value: u32) -> heapless::String<10> {
    let mut s = heapless::String::new();
    // u32::MAX has 10 digits.
    let _ = write!(s, "{value}");
    s
}

/// Why a client checksum could not be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChecksumParseError {
    /// Nothing but padding was written.
    Empty,
    /// Something other than decimal digits.
    Malformed,
    /// More than fits in 32 bits.
    Overflow,
}

impl core::fmt::Display for ChecksumParseError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Empty => f.write_str("empty checksum"),
            Self::Malformed => f.write_str("checksum is not a decimal number"),
            Self::Overflow => f.write_str("checksum does not fit in 32 bits"),
        }
    }
}

/// Parse the client's checksum: an unsigned decimal number, optionally
/// padded with ASCII whitespace or trailing NULs.
pub fn parse_checksum(raw: &[u8]) -> Result<u32, ChecksumParseError> {
    let text = core::str::from_utf8(raw).map_err(|_| ChecksumParseError::Malformed)?;
    let digits = text.trim_matches(|c: char| c == '\0' || c.is_ascii_whitespace());
    if digits.is_empty() {
        return Err(ChecksumParseError::Empty);
    }
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ChecksumParseError::Malformed);
    }
    digits.parse::<u32>().map_err(|_| ChecksumParseError::Overflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_wire_strings() {
        assert_eq!(Status::FileListsMade(3).render().as_str(), "FILELISTS_MADE 3");
        assert_eq!(Status::Error.render().as_str(), "BLE_ERR");
        assert_eq!(Status::RetryTransfer.render().as_str(), "RETRY_TRANSFER");
        assert_eq!(
            Status::FileListsMade(u32::MAX).render().as_str(),
            "FILELISTS_MADE 4294967295"
        );
    }

    #[test]
    fn checksum_renders_decimal() {
        assert_eq!(render_checksum(u32::MAX).as_str(), "4294967295");
        assert_eq!(render_checksum(0).as_str(), "0");
    }

    #[test]
    fn parses_plain_and_padded_checksums() {
        assert_eq!(parse_checksum(b"196"), Ok(196));
        assert_eq!(parse_checksum(b" 196\n"), Ok(196));
        assert_eq!(parse_checksum(b"196\0\0"), Ok(196));
        assert_eq!(parse_checksum(b"4294967295"), Ok(u32::MAX));
    }

    #[test]
    fn rejects_malformed_checksums() {
        assert_eq!(parse_checksum(b""), Err(ChecksumParseError::Empty));
        assert_eq!(parse_checksum(b"\0"), Err(ChecksumParseError::Empty));
        assert_eq!(parse_checksum(b"12a"), Err(ChecksumParseError::Malformed));
        assert_eq!(parse_checksum(b"+12"), Err(ChecksumParseError::Malformed));
        assert_eq!(parse_checksum(b"-1"), Err(ChecksumParseError::Malformed));
        assert_eq!(parse_checksum(&[0xC3]), Err(ChecksumParseError::Malformed));
        assert_eq!(parse_checksum(b"4294967296"), Err(ChecksumParseError::Overflow));
    }
}
