//! # volcon-settings
//!
//! Layered configuration for the volume-control service.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** ([`VolconSettings::default()`])
//! 2. **User file** `~/.volcon/settings.json`, deep-merged over defaults
//! 3. **Environment variables** `VOLCON_*` (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, deep_merge, load_settings, load_settings_from_path, settings_path, validate};
pub use types::*;
