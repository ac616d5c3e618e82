//! State that survives deep sleep.
//!
//! Written once, right before deep-sleep entry, into the platform's
//! retained region; read once at process start. Everything else is
//! rebuilt from scratch on every wake.
//!
//! Image layout (little endian):
//!
//! ```text
//! [0..4)   magic
//! [4..6)   payload length
//! [6..10)  CRC-32 of the payload
//! [10..)   postcard-encoded RetainedState
//! ```
//!
//! A zeroed, corrupt or foreign image restores as the default state, which
//! is indistinguishable from a cold boot.

use platform::{RetainedRegion, RETAINED_REGION_BYTES};
use serde::{Deserialize, Serialize};

const MAGIC: u32 = 0x5444_4C31; // "TDL1"
const HEADER_BYTES: usize = 10;
const PAYLOAD_BYTES: usize = RETAINED_REGION_BYTES - HEADER_BYTES;

/// Which clock the device trusted when it went to sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockMode {
    /// Satellite receiver.
    #[default]
    External,
    /// Internal fallback clock.
    Internal,
}

impl ClockMode {
    /// Short name for log output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::External => "external",
            Self::Internal => "internal",
        }
    }
}

/// The handful of values carried from one wake cycle to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RetainedState {
    /// Completed wake cycles since cold boot.
    pub wake_count: u32,
    /// Last trusted epoch seconds, from either clock.
    pub last_known_unix: u32,
    /// Clock in use when the device went to sleep.
    pub clock_mode: ClockMode,
    /// Whether the last acquisition attempt produced a fix.
    pub last_fix_ok: bool,
    /// Epoch seconds at the start of the last survey window (0 = never).
    pub last_survey_unix: u32,
}

/// How the process came up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootKind {
    /// No valid image: first power-up, reset, or corruption.
    Cold,
    /// Woke from deep sleep with a valid image.
    Warm,
}

impl BootKind {
    /// Short name for log output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cold => "cold",
            Self::Warm => "warm",
        }
    }
}

/// Failure to write the retained image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RetainedError {
    /// The encoded state does not fit the region.
    Encode,
}

impl core::fmt::Display for RetainedError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Encode => f.write_str("retained state does not fit the region"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for RetainedError {}

/// Reads and writes [`RetainedState`] images in a [`RetainedRegion`].
pub struct RetainedStore<R> {
    region: R,
}

impl<R: RetainedRegion> RetainedStore<R> {
    /// Store backed by `region`.
    pub fn new(region: R) -> Self {
        Self { region }
    }

    /// Decode the stored image, falling back to the default state.
    pub fn restore(&mut self) -> (RetainedState, BootKind) {
        let mut image = [0u8; RETAINED_REGION_BYTES];
        self.region.load(&mut image);
        match decode(&image) {
            Some(state) => (state, BootKind::Warm),
            None => (RetainedState::default(), BootKind::Cold),
        }
    }

    /// Encode `state` and overwrite the region.
    pub fn save(&mut self, state: &RetainedState) -> Result<(), RetainedError> {
        let mut image = [0u8; RETAINED_REGION_BYTES];
        encode(state, &mut image)?;
        self.region.store(&image);
        Ok(())
    }

    /// The backing region.
    pub fn region(&self) -> &R {
        &self.region
    }

    /// Give the backing region back.
    pub fn into_inner(self) -> R {
        self.region
    }
}

fn encode(state: &RetainedState, image: &mut [u8; RETAINED_REGION_BYTES]) -> Result<(), RetainedError> {
    let (header, payload) = image.split_at_mut(HEADER_BYTES);
    let used = postcard::to_slice(state, payload)
        .map_err(|_| RetainedError::Encode)?
        .len();
    let body = payload.get(..used).ok_or(RetainedError::Encode)?;
    let crc = crc32fast::hash(body);
    let len = u16::try_from(used).map_err(|_| RetainedError::Encode)?;

    let mut fields = [0u8; HEADER_BYTES];
    let (magic, rest) = fields.split_at_mut(4);
    let (len_bytes, crc_bytes) = rest.split_at_mut(2);
    magic.copy_from_slice(&MAGIC.to_le_bytes());
    len_bytes.copy_from_slice(&len.to_le_bytes());
    crc_bytes.copy_from_slice(&crc.to_le_bytes());
    header.copy_from_slice(&fields);
    Ok(())
}

fn decode(image: &[u8; RETAINED_REGION_BYTES]) -> Option<RetainedState> {
    let magic = u32::from_le_bytes(image.get(0..4)?.try_into().ok()?);
    if magic != MAGIC {
        return None;
    }
    let len = usize::from(u16::from_le_bytes(image.get(4..6)?.try_into().ok()?));
    if len > PAYLOAD_BYTES {
        return None;
    }
    let crc = u32::from_le_bytes(image.get(6..10)?.try_into().ok()?);
    let body = image.get(HEADER_BYTES..HEADER_BYTES.checked_add(len)?)?;
    if crc32fast::hash(body) != crc {
        return None;
    }
    postcard::from_bytes(body).ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use platform::mocks::MockRetainedRegion;

    fn sample() -> RetainedState {
        RetainedState {
            wake_count: 42,
            last_known_unix: 1_700_000_000,
            clock_mode: ClockMode::Internal,
            last_fix_ok: true,
            last_survey_unix: 1_699_000_000,
        }
    }

    #[test]
    fn zeroed_region_is_a_cold_boot() {
        let mut store = RetainedStore::new(MockRetainedRegion::new());
        let (state, boot) = store.restore();
        assert_eq!(boot, BootKind::Cold);
        assert_eq!(state, RetainedState::default());
        assert_eq!(state.wake_count, 0);
    }

    #[test]
    fn saved_state_survives_a_sleep() {
        let mut store = RetainedStore::new(MockRetainedRegion::new());
        store.save(&sample()).unwrap();
        let mut woken = RetainedStore::new(store.into_inner());
        assert_eq!(woken.restore(), (sample(), BootKind::Warm));
    }

    #[test]
    fn corrupted_image_restores_defaults() {
        let mut store = RetainedStore::new(MockRetainedRegion::new());
        store.save(&sample()).unwrap();
        let mut region = store.into_inner();
        region.corrupt();
        let (state, boot) = RetainedStore::new(region).restore();
        assert_eq!(boot, BootKind::Cold);
        assert_eq!(state, RetainedState::default());
    }

    #[test]
    fn flipped_payload_byte_fails_crc() {
        let mut image = [0u8; RETAINED_REGION_BYTES];
        encode(&sample(), &mut image).unwrap();
        assert!(decode(&image).is_some());
        image[HEADER_BYTES] ^= 0x01;
        assert!(decode(&image).is_none());
    }

    #[test]
    fn worst_case_state_fits_the_region() {
        let state = RetainedState {
            wake_count: u32::MAX,
            last_known_unix: u32::MAX,
            clock_mode: ClockMode::Internal,
            last_fix_ok: true,
            last_survey_unix: u32::MAX,
        };
        let mut image = [0u8; RETAINED_REGION_BYTES];
        assert!(encode(&state, &mut image).is_ok());
        assert_eq!(decode(&image), Some(state));
    }
}
