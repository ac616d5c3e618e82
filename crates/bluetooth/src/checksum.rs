//! Rolling checksum shared with the field client.
//!
//! `c' = ((c << 1) + byte) ^ (c >> 31)` over every byte, 32-bit wrapping,
//! bytes taken as unsigned. Each step is a bijection on `u32`, so two
//! inputs of equal length that differ in exactly one byte never collide.

/// Incremental form of [`checksum`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RollingChecksum(u32);

impl RollingChecksum {
    /// Checksum of the empty sequence.
    pub const fn new() -> Self {
        Self(0)
    }

    /// Fold one byte in.
    pub fn push(&mut self, byte: u8) {
        let c = self.0;
        self.0 = c.wrapping_shl(1).wrapping_add(u32::from(byte)) ^ c.wrapping_shr(31);
    }

    /// Fold a slice in.
    pub fn update(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.push(b);
        }
    }

    /// Current value.
    pub const fn value(self) -> u32 {
        self.0
    }
}

/// Checksum of a complete byte sequence.
pub fn checksum(bytes: &[u8]) -> u32 {
    let mut c = RollingChecksum::new();
    c.update(bytes);
    c.value()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_zero() {
        assert_eq!(checksum(&[]), 0);
    }

    #[test]
    fn known_values() {
        assert_eq!(checksum(b"A"), 65);
        // (65 << 1) + 66
        assert_eq!(checksum(b"AB"), 196);
    }

    #[test]
    fn high_bit_folds_into_bit_zero() {
        // 32 shifts of a leading 0x01 move its bit out of the top; the
        // carry is fed back in as bit 0.
        let mut bytes = [0u8; 33];
        bytes[0] = 1;
        let mut c = RollingChecksum::new();
        c.update(&bytes[..32]);
        assert_eq!(c.value(), 0x8000_0000);
        c.update(&bytes[32..]);
        assert_eq!(c.value(), 1);
    }

    #[test]
    fn incremental_matches_one_shot() {
        let data = b"1700000000, 2450, 3.912, 81.0\n";
        let mut c = RollingChecksum::new();
        for part in data.chunks(7) {
            c.update(part);
        }
        assert_eq!(c.value(), checksum(data));
    }

    #[test]
    fn bytes_are_unsigned() {
        // 0xFF must add 255, not -1.
        assert_eq!(checksum(&[0xFF]), 255);
    }
}
