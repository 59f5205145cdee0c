//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a settings
//! file may be partial. Missing fields get their compiled default.

mod loops;
mod registry;

pub use loops::*;
pub use registry::*;

use serde::{Deserialize, Serialize};

/// Root settings type for the Cadence engine.
///
/// Loaded from `~/.cadence/settings.json` with defaults applied for
/// missing fields. Environment variables can override specific values.
///
/// # JSON Format
///
/// ```json
/// {
///   "loops": { "controlFrequencyHz": 30, "nActionSteps": 20 },
///   "registry": { "idleTimeoutSecs": 300 }
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CadenceSettings {
    /// Settings schema version.
    pub version: String,
    /// Application name.
    pub name: String,
    /// Loop cadence and queue policy.
    pub loops: LoopSettings,
    /// Bounds on external calls.
    pub timeouts: TimeoutSettings,
    /// Registry limits and idle sweep.
    pub registry: RegistrySettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl Default for CadenceSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            name: "cadence".to_string(),
            loops: LoopSettings::default(),
            timeouts: TimeoutSettings::default(),
            registry: RegistrySettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl CadenceSettings {
    /// Correct out-of-range values in place.
    ///
    /// Called automatically during loading. Out-of-range values are replaced
    /// with a warning rather than rejected.
    pub fn validate(&mut self) {
        fn loop_hz(val: &mut f64, fallback: f64, name: &str) {
            let clamped = clamp_hz(*val, fallback);
            if clamped.to_bits() != val.to_bits() {
                tracing::warn!("{name} out of range ({val}), using {clamped}");
                *val = clamped;
            }
        }

        fn at_least<T: PartialOrd + Copy + std::fmt::Display>(val: &mut T, min: T, name: &str) {
            if *val < min {
                tracing::warn!("{name} below minimum ({val}), raised to {min}");
                *val = min;
            }
        }

        let defaults = LoopSettings::default();
        let loops = &mut self.loops;
        loop_hz(
            &mut loops.control_frequency_hz,
            defaults.control_frequency_hz,
            "control_frequency_hz",
        );
        loop_hz(
            &mut loops.inference_frequency_hz,
            defaults.inference_frequency_hz,
            "inference_frequency_hz",
        );
        at_least(&mut loops.n_action_steps, 1, "n_action_steps");
        at_least(&mut loops.max_queue_len, 1, "max_queue_len");
        at_least(&mut loops.max_consecutive_failures, 1, "max_consecutive_failures");
        if loops.queue_cap > loops.max_queue_len {
            tracing::warn!(
                "queue_cap ({}) > max_queue_len ({}), correcting",
                loops.queue_cap,
                loops.max_queue_len
            );
            loops.queue_cap = loops.max_queue_len;
        }

        let t = &mut self.timeouts;
        at_least(&mut t.predict_timeout_ms, 1, "predict_timeout_ms");
        at_least(&mut t.transport_timeout_ms, 1, "transport_timeout_ms");
        at_least(&mut t.publish_timeout_ms, 1, "publish_timeout_ms");
        at_least(&mut t.policy_load_timeout_ms, 1, "policy_load_timeout_ms");

        let r = &mut self.registry;
        at_least(&mut r.max_sessions, 1, "max_sessions");
        at_least(&mut r.sweep_interval_secs, 1, "sweep_interval_secs");
    }
}

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_version() {
        let s = CadenceSettings::default();
        assert_eq!(s.version, "0.1.0");
        assert_eq!(s.name, "cadence");
        assert_eq!(s.logging.level, "info");
        assert!(!s.logging.json);
    }

    #[test]
    fn default_settings_serde_roundtrip() {
        let defaults = CadenceSettings::default();
        let json = serde_json::to_string(&defaults).unwrap();
        let back: CadenceSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back, defaults);
    }

    #[test]
    fn default_settings_json_field_names() {
        let json = serde_json::to_value(CadenceSettings::default()).unwrap();
        assert_eq!(json["loops"]["controlFrequencyHz"], 20.0);
        assert_eq!(json["loops"]["nActionSteps"], 10);
        assert_eq!(json["registry"]["idleTimeoutSecs"], 600);
        assert_eq!(json["registry"]["maxSessions"], 32);
        assert_eq!(json["timeouts"]["publishTimeoutMs"], 200);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: CadenceSettings =
            serde_json::from_str(r#"{"loops": {"nActionSteps": 25}}"#).unwrap();
        assert_eq!(s.loops.n_action_steps, 25);
        assert_eq!(s.loops.queue_cap, 10);
        assert_eq!(s.registry.sweep_interval_secs, 60);
    }

    #[test]
    fn validate_replaces_non_positive_frequencies() {
        let mut s = CadenceSettings::default();
        s.loops.control_frequency_hz = 0.0;
        s.loops.inference_frequency_hz = -3.0;
        s.validate();
        assert!((s.loops.control_frequency_hz - 20.0).abs() < f64::EPSILON);
        assert!((s.loops.inference_frequency_hz - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn validate_caps_extreme_frequencies() {
        let mut s = CadenceSettings::default();
        s.loops.control_frequency_hz = 5e9;
        s.loops.inference_frequency_hz = 1e-9;
        s.validate();
        assert!((s.loops.control_frequency_hz - MAX_LOOP_HZ).abs() < f64::EPSILON);
        assert!((s.loops.inference_frequency_hz - MIN_LOOP_HZ).abs() < f64::EPSILON);
        assert_eq!(s.loops.control_period(), std::time::Duration::from_millis(1));
    }

    #[test]
    fn validate_clamps_queue_cap_to_max_len() {
        let mut s = CadenceSettings::default();
        s.loops.queue_cap = 500;
        s.validate();
        assert_eq!(s.loops.queue_cap, 100);
    }

    #[test]
    fn validate_raises_zero_minimums() {
        let mut s = CadenceSettings::default();
        s.loops.n_action_steps = 0;
        s.loops.max_consecutive_failures = 0;
        s.registry.max_sessions = 0;
        s.timeouts.predict_timeout_ms = 0;
        s.validate();
        assert_eq!(s.loops.n_action_steps, 1);
        assert_eq!(s.loops.max_consecutive_failures, 1);
        assert_eq!(s.registry.max_sessions, 1);
        assert_eq!(s.timeouts.predict_timeout_ms, 1);
    }

    #[test]
    fn validate_keeps_defaults_untouched() {
        let mut s = CadenceSettings::default();
        s.validate();
        assert_eq!(s, CadenceSettings::default());
    }
}
