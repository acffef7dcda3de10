use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;

use crate::audio_cache::CacheStats;

/// Metric name prefix for all moodplayer metrics
const PREFIX: &str = "moodplayer";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Request Metrics
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "path", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["method", "path"]
    ).expect("Failed to create http_request_duration_seconds metric");

    // Recommendation Metrics
    pub static ref RECOMMENDATIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_recommendations_total"), "Recommendations served by source"),
        &["source"]
    ).expect("Failed to create recommendations_total metric");

    pub static ref MOOD_DETECTIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_mood_detections_total"), "Mood detections by outcome"),
        &["mood"]
    ).expect("Failed to create mood_detections_total metric");

    // Audio Cache Metrics
    pub static ref AUDIO_CACHE_EVENTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_audio_cache_events_total"), "Audio cache lookups and extractions"),
        &["event"]
    ).expect("Failed to create audio_cache_events_total metric");

    pub static ref AUDIO_CACHE_ENTRIES: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_audio_cache_entries"), "Audio cache entries by state"),
        &["state"]
    ).expect("Failed to create audio_cache_entries metric");

    // Error Metrics
    pub static ref ERRORS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_errors_total"), "Total errors by type and endpoint"),
        &["error_type", "endpoint"]
    ).expect("Failed to create errors_total metric");

    pub static ref PROCESS_MEMORY_BYTES: Gauge = Gauge::new(
        format!("{PREFIX}_process_memory_bytes"),
        "Process memory usage in bytes"
    ).expect("Failed to create process_memory_bytes metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Register all metrics - ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(RECOMMENDATIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(MOOD_DETECTIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(AUDIO_CACHE_EVENTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(AUDIO_CACHE_ENTRIES.clone()));
    let _ = REGISTRY.register(Box::new(ERRORS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(PROCESS_MEMORY_BYTES.clone()));

    tracing::info!("Metrics system initialized successfully");
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration.as_secs_f64());
}

/// Record a served recommendation, labelled "search" or "fallback"
pub fn record_recommendation(source: &str) {
    RECOMMENDATIONS_TOTAL.with_label_values(&[source]).inc();
}

pub fn record_mood_detection(mood: &str) {
    MOOD_DETECTIONS_TOTAL.with_label_values(&[mood]).inc();
}

/// Record an audio cache event (hit, join, miss, extraction, failure, eviction)
pub fn record_audio_cache_event(event: &str) {
    AUDIO_CACHE_EVENTS_TOTAL.with_label_values(&[event]).inc();
}

/// Mirror the current entry counts of the audio cache
pub fn set_audio_cache_entries(stats: &CacheStats) {
    AUDIO_CACHE_ENTRIES
        .with_label_values(&["ready"])
        .set(stats.ready as f64);
    AUDIO_CACHE_ENTRIES
        .with_label_values(&["pending"])
        .set(stats.pending as f64);
    AUDIO_CACHE_ENTRIES
        .with_label_values(&["failed"])
        .set(stats.failed as f64);
}

/// Record an error
pub fn record_error(error_type: &str, endpoint: &str) {
    ERRORS_TOTAL
        .with_label_values(&[error_type, endpoint])
        .inc();
}

/// Update process memory usage
pub fn update_memory_usage() {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            for line in status.lines() {
                if line.starts_with("VmRSS:") {
                    // RSS is reported in kB
                    if let Some(kb_str) = line.split_whitespace().nth(1) {
                        if let Ok(kb) = kb_str.parse::<f64>() {
                            PROCESS_MEMORY_BYTES.set(kb * 1024.0);
                            return;
                        }
                    }
                }
            }
        }
    }
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    update_memory_usage();

    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_else(|_| String::from(""));
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}
