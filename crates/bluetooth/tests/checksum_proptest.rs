//! Property tests for the transfer checksum.
//!
//! Run with: cargo test -p bluetooth --test checksum_proptest

#![allow(clippy::indexing_slicing, clippy::arithmetic_side_effects)]

use bluetooth::checksum::{checksum, RollingChecksum};
use bluetooth::session::{TransferSession, Verdict};
use bluetooth::status::render_checksum;
use bluetooth::CardPath;
use proptest::prelude::*;

proptest! {
    /// Computing the checksum twice over the same bytes agrees.
    #[test]
    fn checksum_is_deterministic(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
        prop_assert_eq!(checksum(&data), checksum(&data));
    }

    /// Equal-length inputs differing in exactly one byte never collide:
    /// every step of the recurrence is a bijection on u32.
    #[test]
    fn single_byte_change_changes_checksum(
        data in proptest::collection::vec(any::<u8>(), 1..2048),
        index in any::<prop::sample::Index>(),
        delta in 1u8..=255,
    ) {
        let i = index.index(data.len());
        let mut other = data.clone();
        other[i] = other[i].wrapping_add(delta);
        prop_assert_ne!(checksum(&data), checksum(&other));
    }

    /// Feeding the bytes in arbitrary splits matches the one-shot value.
    #[test]
    fn incremental_equals_one_shot(
        data in proptest::collection::vec(any::<u8>(), 0..1024),
        split in 1usize..128,
    ) {
        let mut c = RollingChecksum::new();
        for part in data.chunks(split) {
            c.update(part);
        }
        prop_assert_eq!(c.value(), checksum(&data));
    }

    /// A client that echoes the rendered checksum always verifies.
    #[test]
    fn echoed_checksum_verifies(data in proptest::collection::vec(any::<u8>(), 0..512)) {
        let path = CardPath::try_from("/Data/1.txt").unwrap_or_default();
        let mut session = TransferSession::new(path, &data);
        let echoed = render_checksum(session.expected());
        prop_assert_eq!(session.verify(echoed.as_bytes()), Verdict::Match);
    }
}
