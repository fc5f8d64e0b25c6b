// src/core/metrics.rs

//! Defines and registers Prometheus metrics for server monitoring.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only once
//! globally for the entire application lifecycle.

use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Gauge, HistogramVec, TextEncoder, register_counter_vec, register_gauge,
    register_histogram_vec,
};

lazy_static! {
    /// The number of clients currently connected to either listener.
    pub static ref CONNECTED_CLIENTS: Gauge =
        register_gauge!("cortado_connected_clients", "Number of currently connected clients.").unwrap();

    /// The total number of connections accepted since startup, labeled by encoding.
    pub static ref CONNECTIONS_RECEIVED_TOTAL: CounterVec =
        register_counter_vec!("cortado_connections_received_total", "Total number of connections received.", &["encoding"]).unwrap();

    /// The total number of requests dispatched to the backend.
    pub static ref REQUESTS_TOTAL: CounterVec =
        register_counter_vec!("cortado_requests_total", "Total number of requests handled.", &["operation", "encoding"]).unwrap();

    /// Requests whose backend call returned an error.
    pub static ref REQUEST_ERRORS_TOTAL: CounterVec =
        register_counter_vec!("cortado_request_errors_total", "Total number of requests that failed.", &["operation"]).unwrap();

    pub static ref REQUEST_LATENCY_SECONDS: HistogramVec =
        register_histogram_vec!("cortado_request_latency_seconds", "Latency of request processing in seconds.", &["operation"]).unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
