//! Prometheus metrics for the bracket scheduler.
//!
//! Metrics are exposed in Prometheus text format for scraping by monitoring
//! systems. Recording is a no-op until [`init_metrics`] installs the exporter.
//!
//! # Metrics
//!
//! - `scheduler_callbacks_total{event, outcome}`
//! - `tournaments_cancelled_total{source}`
//! - `rounds_generated_total`
//! - `pending_tournaments`, `scheduled_timers`
//! - `sweep_duration_ms`

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Initialize Prometheus metrics exporter.
///
/// Metrics will be available at `http://<addr>/metrics`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {}", e))
}

// ============================================================================
// Scheduler Metrics
// ============================================================================

/// Record a fired scheduler callback.
pub fn scheduler_callbacks_total(event: &str, outcome: &str) {
    metrics::counter!("scheduler_callbacks_total",
        "event" => event.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Set the number of armed deadline timers.
pub fn scheduled_timers(count: usize) {
    metrics::gauge!("scheduled_timers").set(count as f64);
}

/// Record sweep duration in milliseconds.
pub fn sweep_duration_ms(duration_ms: f64) {
    metrics::histogram!("sweep_duration_ms").record(duration_ms);
}

// ============================================================================
// Tournament Metrics
// ============================================================================

/// Set the number of tournaments still waiting on deadlines.
pub fn pending_tournaments(count: usize) {
    metrics::gauge!("pending_tournaments").set(count as f64);
}

/// Increment generated rounds counter.
pub fn rounds_generated_total() {
    metrics::counter!("rounds_generated_total").increment(1);
}

/// Increment cancelled tournaments counter.
pub fn tournaments_cancelled_total(source: &str) {
    metrics::counter!("tournaments_cancelled_total",
        "source" => source.to_string()
    )
    .increment(1);
}
