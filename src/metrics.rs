// src/metrics.rs

#[cfg(feature = "observability")]
pub use metrics::{
    counter, describe_counter, describe_gauge, gauge, increment_counter, Unit,
};

// NOTE: When observability feature is disabled, provide stub implementations
#[cfg(not(feature = "observability"))]
pub enum Unit {}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! counter {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {{
        let _ = &$value;
    }};
    ($name:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! gauge {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {{
        let _ = &$value;
    }};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! increment_counter {
    ($name:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_counter {
    ($name:expr, $unit:expr, $desc:expr) => {};
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_gauge {
    ($name:expr, $desc:expr) => {};
}

// Re-export macros for use in this module when observability is disabled
#[cfg(not(feature = "observability"))]
use crate::{counter, describe_counter, describe_gauge, gauge, increment_counter};

/// Initializes the descriptions for all the metrics in the application.
/// This should be called once at startup.
pub fn describe_metrics() {
    describe_gauge!(
        "sync_safe_block_number",
        "Latest block considered final (chain head minus confirmation offset)."
    );
    describe_gauge!(
        "sync_job_queue_queued",
        "Jobs waiting for an execution slot."
    );
    describe_gauge!("sync_job_queue_in_flight", "Jobs currently executing.");
    describe_counter!(
        "sync_job_queue_failed_total",
        "Total jobs that failed or panicked."
    );
    describe_counter!(
        "sync_prices_upserted_total",
        "Total price records written to the repository."
    );
    describe_counter!(
        "sync_block_numbers_resolved_total",
        "Total target timestamps resolved to block numbers."
    );
    describe_counter!(
        "sync_price_overlap_skips_total",
        "Update triggers skipped because the same token was already in flight."
    );
    describe_gauge!(
        "sync_price_stream_subscribers",
        "Active subscribers on the price event channels."
    );
}

pub fn set_safe_block_number(value: f64) {
    gauge!("sync_safe_block_number", value);
}

pub fn set_job_queue_queued(value: f64) {
    gauge!("sync_job_queue_queued", value);
}

pub fn set_job_queue_in_flight(value: f64) {
    gauge!("sync_job_queue_in_flight", value);
}

pub fn increment_job_queue_failed() {
    increment_counter!("sync_job_queue_failed_total");
}

pub fn increment_prices_upserted(count: u64) {
    counter!("sync_prices_upserted_total", count);
}

pub fn increment_block_numbers_resolved() {
    increment_counter!("sync_block_numbers_resolved_total");
}

pub fn increment_price_overlap_skips() {
    increment_counter!("sync_price_overlap_skips_total");
}

pub fn set_price_stream_subscribers(value: f64) {
    gauge!("sync_price_stream_subscribers", value);
}
