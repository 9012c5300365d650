//! # cubelink-settings
//!
//! Connection and timing settings for the cubelink client.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** — [`ClientSettings::default()`]
//! 2. **User file** — `~/.cubelink/settings.json` (deep-merged over defaults)
//! 3. **Environment variables** — `CUBELINK_*` overrides (highest priority)
//!
//! Settings are plain values handed to the client when it is spawned; there
//! is no process-wide settings singleton.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::{ClientSettings, ConnectionSettings, Scheme, TimingSettings};
