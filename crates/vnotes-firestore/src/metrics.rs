//! Store metrics.

use metrics::{counter, histogram};

pub mod names {
    /// Store requests by operation and HTTP status.
    pub const REQUESTS_TOTAL: &str = "vnotes_store_requests_total";

    /// Store request latency in seconds by operation.
    pub const LATENCY_SECONDS: &str = "vnotes_store_latency_seconds";

    /// Retried store requests by operation.
    pub const RETRIES_TOTAL: &str = "vnotes_store_retries_total";

    /// Documents returned by equality queries, by collection.
    pub const QUERY_DOCUMENTS_TOTAL: &str = "vnotes_store_query_documents_total";

    /// Guarded updates skipped because the guard field had moved on.
    pub const GUARD_MISSES_TOTAL: &str = "vnotes_store_guard_misses_total";
}

pub fn record_request(operation: &str, status: u16, latency_secs: f64) {
    counter!(
        names::REQUESTS_TOTAL,
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(names::LATENCY_SECONDS, "operation" => operation.to_string()).record(latency_secs);
}

pub fn record_retry(operation: &str) {
    counter!(names::RETRIES_TOTAL, "operation" => operation.to_string()).increment(1);
}

pub fn record_query_results(collection: &str, returned: usize) {
    counter!(names::QUERY_DOCUMENTS_TOTAL, "collection" => collection.to_string())
        .increment(returned as u64);
}

pub fn record_guard_miss(collection: &str) {
    counter!(names::GUARD_MISSES_TOTAL, "collection" => collection.to_string()).increment(1);
}
