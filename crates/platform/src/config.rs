//! Application identity constants
//!
//! Branding and naming shared by the firmware banner and the wireless
//! service. Reference these rather than hardcoding values.

/// The application name
pub const APP_NAME: &str = "Tide Logger";

/// Application version (synchronized with Cargo.toml)
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name the wireless service advertises under.
///
/// Field clients filter on this exact string.
pub const DEVICE_NAME: &str = "WaterSense";
