//! Wireless file transfer protocol: checksum, status vocabulary, manifest
//! generation and session bookkeeping.
//!
//! Nothing here touches task state or the radio; the firmware's transfer
//! task drives these pieces through the `platform::WirelessStack` and
//! `platform::StorageMedium` traits.
//!
//! This crate is `no_std` by default; it only uses `core` + `heapless`.

#![cfg_attr(not(test), no_std)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![allow(async_fn_in_trait)]

pub mod checksum;
pub mod manifest;
pub mod session;
pub mod state;
pub mod status;

pub use checksum::{checksum, RollingChecksum};
pub use manifest::{is_manifest_request, CardPath, ManifestBuilder, ManifestError, MANIFEST_TOKEN};
pub use session::{SessionPhase, TransferSession, Verdict};
pub use state::LinkState;
pub use status::{parse_checksum, render_checksum, ChecksumParseError, Status};
