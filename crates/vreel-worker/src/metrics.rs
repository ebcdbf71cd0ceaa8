//! Prometheus metrics for the job pipeline.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_TOTAL: &str = "vreel_jobs_total";
    pub const STAGE_DURATION_SECONDS: &str = "vreel_stage_duration_seconds";
    pub const JOB_DURATION_SECONDS: &str = "vreel_job_duration_seconds";
}

/// Install the Prometheus recorder and serve `/metrics` on `port`.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(port: u16) -> Result<(), BuildError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new().with_http_listener(addr).install()
}

/// Record a finished job; `outcome` is `done` or a failure kind.
pub fn record_job(outcome: &str, duration_secs: f64) {
    let labels = [("outcome", outcome.to_string())];
    counter!(names::JOBS_TOTAL, &labels).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record the wall-clock time of one pipeline stage.
pub fn record_stage(stage: &str, duration_secs: f64) {
    let labels = [("stage", stage.to_string())];
    histogram!(names::STAGE_DURATION_SECONDS, &labels).record(duration_secs);
}
