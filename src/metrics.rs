// src/metrics.rs

#[cfg(feature = "observability")]
pub use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};

// NOTE: When observability feature is disabled, provide stub implementations
#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! counter {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
    ($name:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! histogram {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_counter {
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_histogram {
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
use crate::{counter, describe_counter, describe_histogram, histogram};

use std::time::Duration;

/// Registers metric descriptions. Call once at startup.
pub fn describe_metrics() {
    describe_counter!("price_cache_hits_total", "Price cache lookups served from an unexpired entry.");
    describe_counter!("price_cache_misses_total", "Price cache lookups that required a live resolution.");
    describe_counter!(
        "price_cache_stale_served_total",
        "Expired cache entries served because live resolution failed."
    );
    describe_counter!("price_adapter_failures_total", "Failed price adapter calls by adapter.");
    describe_histogram!("price_adapter_latency_seconds", "Latency of price adapter calls.");
    describe_counter!(
        "price_unresolvable_total",
        "Requests that failed live resolution with no cached value."
    );
}

pub fn increment_cache_hit(cache_name: &str) {
    counter!("price_cache_hits_total", 1, "cache" => cache_name.to_string());
}

pub fn increment_cache_miss(cache_name: &str) {
    counter!("price_cache_misses_total", 1, "cache" => cache_name.to_string());
}

pub fn increment_stale_served(cache_name: &str) {
    counter!("price_cache_stale_served_total", 1, "cache" => cache_name.to_string());
}

pub fn increment_adapter_failure(adapter: &str, category: &str) {
    counter!(
        "price_adapter_failures_total",
        1,
        "adapter" => adapter.to_string(),
        "category" => category.to_string()
    );
}

pub fn record_adapter_latency(adapter: &str, duration: Duration) {
    histogram!(
        "price_adapter_latency_seconds",
        duration.as_secs_f64(),
        "adapter" => adapter.to_string()
    );
}

pub fn increment_unresolvable(category: &str) {
    counter!("price_unresolvable_total", 1, "category" => category.to_string());
}
