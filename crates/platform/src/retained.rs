//! Memory preserved across deep sleep

/// Size of the retained region in bytes.
pub const RETAINED_REGION_BYTES: usize = 64;

/// A small region of memory the platform keeps powered through deep sleep
/// and clears only on cold boot.
///
/// The firmware owns the layout: it writes one image right before entering
/// deep sleep and reads it back once at process start.
pub trait RetainedRegion {
    /// Copy the region into `buf` (at most [`RETAINED_REGION_BYTES`]).
    fn load(&mut self, buf: &mut [u8]);

    /// Overwrite the region with `bytes` (at most [`RETAINED_REGION_BYTES`]).
    fn store(&mut self, bytes: &[u8]);
}
