//! # cadence-settings
//!
//! Configuration management with layered sources for the Cadence engine.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`CadenceSettings::default()`]
//! 2. **User file**: `~/.cadence/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `CADENCE_*` overrides (highest priority)
//!
//! There is no process-wide cache. The host loads settings once and hands
//! them to the registry, which copies what each session needs.
//!
//! ## Crate Position
//!
//! Depends on nothing inside the workspace. Depended on by `cadence-runtime`.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides_with, deep_merge, load_settings, load_settings_from_path,
    load_settings_with, settings_path,
};
pub use types::*;

/// Load settings, falling back to compiled defaults on any error.
pub fn load_settings_or_default() -> CadenceSettings {
    match load_settings() {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "failed to load settings, using defaults");
            CadenceSettings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let _settings = CadenceSettings::default();
        let path = settings_path();
        assert!(path.ends_with("settings.json"));
    }

    #[test]
    fn deep_merge_re_exported() {
        let merged = deep_merge(serde_json::json!({"x": 1}), serde_json::json!({"y": 2}));
        assert_eq!(merged["x"], 1);
        assert_eq!(merged["y"], 2);
    }
}
