//! # pilot-settings
//!
//! Layered configuration for the Figma Pilot relay.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`RelaySettings::default()`]
//! 2. **Settings file**: `~/.figma-pilot/settings.json`, or the path in
//!    `FIGMA_PILOT_SETTINGS` (deep-merged over defaults)
//! 3. **Environment variables**: `FIGMA_*` overrides (highest priority)
//!
//! Command-line flags are applied on top by the binary.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings_from_path, settings_path};
pub use types::{LogFormat, RelaySettings};
