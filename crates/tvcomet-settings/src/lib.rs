//! # tvcomet-settings
//!
//! Configuration for the comet client and mailbox server.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`CometSettings::default()`]
//! 2. **User file**: `~/.tvcomet/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `TVCOMET_*` overrides (highest priority)
//!
//! There is no global instance: the binary loads settings once and passes
//! them down explicitly.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, deep_merge, load_settings, load_settings_from_path,
    load_with_env, settings_path,
};
pub use types::*;
