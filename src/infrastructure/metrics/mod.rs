//! Prometheus Metrics Module
//!
//! Provides application-wide metrics collection using Prometheus.
//!
//! # Metrics Collected
//! - Friend graph events processed by the synchronizer, by kind and outcome
//! - Rate limit rejections by tag
//! - Fanout pushes by notification type
//! - Rows removed by the maintenance workers
//! - HTTP request counts by method, path, and status

use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

/// Friend graph events handled by the synchronizer
pub static EVENTS_PROCESSED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("events_processed_total", "Friend graph events handled").namespace("chat_core"),
        &["kind", "outcome"], // outcome: "ok", "error"
    )
    .expect("Failed to create EVENTS_PROCESSED_TOTAL metric")
});

/// Requests rejected by the rate limiter, by the tag that tripped
pub static RATELIMIT_REJECTIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("ratelimit_rejections_total", "Requests rejected by the rate limiter")
            .namespace("chat_core"),
        &["tag"],
    )
    .expect("Failed to create RATELIMIT_REJECTIONS_TOTAL metric")
});

/// Notifications pushed to present users
pub static FANOUT_PUSHES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("fanout_pushes_total", "Notifications pushed to present users")
            .namespace("chat_core"),
        &["event"],
    )
    .expect("Failed to create FANOUT_PUSHES_TOTAL metric")
});

/// Rows removed by background maintenance
pub static MAINTENANCE_REMOVED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("maintenance_removed_total", "Rows removed by background maintenance")
            .namespace("chat_core"),
        &["task"], // "user_purge", "invitation_gc"
    )
    .expect("Failed to create MAINTENANCE_REMOVED_TOTAL metric")
});

/// HTTP request counter - tracks total requests by method, path, and status code
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("http_requests_total", "Total number of HTTP requests").namespace("chat_core"),
        &["method", "path", "status"],
    )
    .expect("Failed to create HTTP_REQUESTS_TOTAL metric")
});

/// Register all metrics with the registry
fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(EVENTS_PROCESSED_TOTAL.clone()))
        .expect("Failed to register EVENTS_PROCESSED_TOTAL");
    registry
        .register(Box::new(RATELIMIT_REJECTIONS_TOTAL.clone()))
        .expect("Failed to register RATELIMIT_REJECTIONS_TOTAL");
    registry
        .register(Box::new(FANOUT_PUSHES_TOTAL.clone()))
        .expect("Failed to register FANOUT_PUSHES_TOTAL");
    registry
        .register(Box::new(MAINTENANCE_REMOVED_TOTAL.clone()))
        .expect("Failed to register MAINTENANCE_REMOVED_TOTAL");
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .expect("Failed to register HTTP_REQUESTS_TOTAL");
}

/// Collect and encode all metrics as Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

pub fn record_event(kind: &str, ok: bool) {
    EVENTS_PROCESSED_TOTAL
        .with_label_values(&[kind, if ok { "ok" } else { "error" }])
        .inc();
}

pub fn record_rate_limit_rejection(tag: &str) {
    RATELIMIT_REJECTIONS_TOTAL.with_label_values(&[tag]).inc();
}

pub fn record_fanout(event: &str, pushes: usize) {
    FANOUT_PUSHES_TOTAL
        .with_label_values(&[event])
        .inc_by(pushes as u64);
}

pub fn record_maintenance(task: &str, removed: usize) {
    MAINTENANCE_REMOVED_TOTAL
        .with_label_values(&[task])
        .inc_by(removed as u64);
}

/// Helper to record HTTP request metrics
pub fn record_http_request(method: &str, path: &str, status: u16) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
}
