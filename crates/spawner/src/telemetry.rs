use std::time::Duration;

use metrics::{counter, histogram};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json())
        .init();
}

pub fn record_start_result(result: &str) {
    counter!(
        "spawner_start_total",
        "result" => result.to_string()
    )
    .increment(1);
}

pub fn record_start_duration(result: &str, duration: Duration) {
    histogram!(
        "spawner_start_duration_ms",
        "result" => result.to_string()
    )
    .record(duration.as_secs_f64() * 1000.0);
}

pub fn record_stop_result(result: &str) {
    counter!(
        "spawner_stop_total",
        "result" => result.to_string()
    )
    .increment(1);
}

pub fn record_poll_status(status: &str) {
    counter!(
        "spawner_poll_total",
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_convergence_attempts(loop_name: &str, attempts: u64) {
    histogram!(
        "spawner_convergence_attempts",
        "loop" => loop_name.to_string()
    )
    .record(attempts as f64);
}

pub fn record_remote_call(operation: &str, result: &str) {
    counter!(
        "spawner_marathon_requests_total",
        "operation" => operation.to_string(),
        "result" => result.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusBuilder;

    #[test]
    fn lifecycle_counters_are_rendered_with_labels() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            record_start_result("ready");
            record_stop_result("drained");
            record_poll_status("shutting_down");
            record_remote_call("get_app", "not_found");
        });

        let rendered = handle.render();
        assert!(
            rendered.contains("spawner_start_total{result=\"ready\"} 1"),
            "start counter missing: {rendered}"
        );
        assert!(
            rendered.contains("spawner_stop_total{result=\"drained\"} 1"),
            "stop counter missing: {rendered}"
        );
        assert!(
            rendered.contains("spawner_poll_total{status=\"shutting_down\"} 1"),
            "poll counter missing: {rendered}"
        );
        assert!(
            rendered.contains("spawner_marathon_requests_total"),
            "remote call counter missing: {rendered}"
        );
    }

    #[test]
    fn convergence_histograms_are_recorded() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            record_convergence_attempts("start", 4);
            record_start_duration("ready", Duration::from_millis(12));
        });

        let rendered = handle.render();
        assert!(
            rendered.contains("spawner_convergence_attempts"),
            "attempts histogram missing: {rendered}"
        );
        assert!(
            rendered.contains("spawner_start_duration_ms"),
            "duration histogram missing: {rendered}"
        );
    }
}
