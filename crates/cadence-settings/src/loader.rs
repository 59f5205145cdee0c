//! Layered settings loading.
//!
//! Compiled defaults, then the user file deep-merged on top, then `CADENCE_*`
//! environment overrides. The result is validated before it is returned.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::errors::{Result, SettingsError};
use crate::types::CadenceSettings;

/// Environment variable that points at an alternate settings file.
pub const SETTINGS_PATH_ENV: &str = "CADENCE_SETTINGS";

/// Resolve the settings file path.
///
/// `CADENCE_SETTINGS` wins; otherwise `~/.cadence/settings.json`. Falls back
/// to a relative `.cadence/settings.json` when `HOME` is unset.
pub fn settings_path() -> PathBuf {
    if let Some(explicit) = std::env::var_os(SETTINGS_PATH_ENV) {
        return PathBuf::from(explicit);
    }
    let home = std::env::var_os("HOME").map_or_else(PathBuf::new, PathBuf::from);
    home.join(".cadence").join("settings.json")
}

/// Load settings from the default path with env overrides.
pub fn load_settings() -> Result<CadenceSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from `path` with env overrides.
///
/// A missing file is not an error: compiled defaults are used.
pub fn load_settings_from_path(path: &Path) -> Result<CadenceSettings> {
    load_settings_with(path, |key| std::env::var(key).ok())
}

/// Load settings from `path`, resolving overrides through `lookup`.
pub fn load_settings_with(
    path: &Path,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<CadenceSettings> {
    let defaults = serde_json::to_value(CadenceSettings::default())?;

    let merged = match std::fs::read_to_string(path) {
        Ok(raw) => {
            let user: Value = serde_json::from_str(&raw)?;
            tracing::debug!(?path, "loaded user settings");
            deep_merge(defaults, user)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(?path, "no settings file, using defaults");
            defaults
        }
        Err(source) => {
            return Err(SettingsError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let mut settings: CadenceSettings = serde_json::from_value(merged)?;
    apply_env_overrides_with(&mut settings, lookup);
    settings.validate();
    Ok(settings)
}

/// Recursively merge `overlay` into `base`.
///
/// Objects merge key by key; any other overlay value replaces the base value.
/// `null` in the overlay leaves the base value in place.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_val) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_val) => deep_merge(base_val, overlay_val),
                    None => overlay_val,
                };
                let _ = base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (base, Value::Null) => base,
        (_, overlay) => overlay,
    }
}

/// Apply `CADENCE_*` overrides, reading variables through `lookup`.
///
/// Unparseable values are ignored with a warning.
pub fn apply_env_overrides_with(
    settings: &mut CadenceSettings,
    lookup: impl Fn(&str) -> Option<String>,
) {
    fn parse<T: std::str::FromStr>(
        lookup: &impl Fn(&str) -> Option<String>,
        key: &str,
    ) -> Option<T> {
        let raw = lookup(key)?;
        match raw.trim().parse() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(key, value = %raw, "ignoring unparseable env override");
                None
            }
        }
    }

    if let Some(v) = parse(&lookup, "CADENCE_CONTROL_HZ") {
        settings.loops.control_frequency_hz = v;
    }
    if let Some(v) = parse(&lookup, "CADENCE_INFERENCE_HZ") {
        settings.loops.inference_frequency_hz = v;
    }
    if let Some(v) = parse(&lookup, "CADENCE_N_ACTION_STEPS") {
        settings.loops.n_action_steps = v;
    }
    if let Some(v) = parse(&lookup, "CADENCE_QUEUE_CAP") {
        settings.loops.queue_cap = v;
    }
    if let Some(v) = parse(&lookup, "CADENCE_PREDICT_TIMEOUT_MS") {
        settings.timeouts.predict_timeout_ms = v;
    }
    if let Some(v) = parse(&lookup, "CADENCE_IDLE_TIMEOUT_SECS") {
        settings.registry.idle_timeout_secs = v;
    }
    if let Some(v) = parse(&lookup, "CADENCE_MAX_SESSIONS") {
        settings.registry.max_sessions = v;
    }
    if let Some(level) = lookup("CADENCE_LOG_LEVEL") {
        settings.logging.level = level;
    }
    if let Some(v) = parse(&lookup, "CADENCE_LOG_JSON") {
        settings.logging.json = v;
    }
}
