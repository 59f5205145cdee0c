//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` a host uses to render a scrape endpoint.
/// Call once at startup before any metrics are recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across modules.

/// Registered sessions (gauge).
pub const SESSIONS_ACTIVE: &str = "sessions_active";
/// Successful policy calls (counter, labels: `policy_type`).
pub const INFERENCE_TOTAL: &str = "inference_total";
/// Failed policy calls (counter, labels: `policy_type`, reason).
pub const INFERENCE_ERRORS_TOTAL: &str = "inference_errors_total";
/// Policy call latency seconds (histogram, labels: `policy_type`).
pub const INFERENCE_DURATION_SECONDS: &str = "inference_duration_seconds";
/// Commands published (counter).
pub const COMMANDS_SENT_TOTAL: &str = "commands_sent_total";
/// Control ticks with an empty queue (counter).
pub const CONTROL_UNDERRUNS_TOTAL: &str = "control_underruns_total";
/// Failed or timed-out transport operations (counter, labels: operation).
pub const TRANSPORT_ERRORS_TOTAL: &str = "transport_errors_total";
/// Sessions removed by the idle sweeper (counter).
pub const SESSIONS_IDLE_DELETED_TOTAL: &str = "sessions_idle_deleted_total";
/// Session state transitions (counter, labels: state).
pub const SESSION_TRANSITIONS_TOTAL: &str = "session_transitions_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorded_counter_is_rendered() {
        // Local recorder only, to avoid conflicts between tests.
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        ::metrics::with_local_recorder(&recorder, || {
            ::metrics::counter!(COMMANDS_SENT_TOTAL).increment(3);
        });

        let output = render(&handle);
        assert!(output.contains("# TYPE commands_sent_total counter"), "{output}");
        assert!(output.contains("commands_sent_total 3"), "{output}");
    }

    #[test]
    fn metric_constants_are_snake_case() {
        let names = [
            SESSIONS_ACTIVE,
            INFERENCE_TOTAL,
            INFERENCE_ERRORS_TOTAL,
            INFERENCE_DURATION_SECONDS,
            COMMANDS_SENT_TOTAL,
            CONTROL_UNDERRUNS_TOTAL,
            TRANSPORT_ERRORS_TOTAL,
            SESSIONS_IDLE_DELETED_TOTAL,
            SESSION_TRANSITIONS_TOTAL,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
