//! Metrics and observability utilities
//!
//! Thin helpers over the `metrics` facade with standardized naming.
//! Without an installed recorder every call is a no-op.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};

/// Metrics prefix for all AgentRAG metrics
pub const METRICS_PREFIX: &str = "agentrag";

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_retrieval_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of retrieval requests"
    );

    describe_histogram!(
        format!("{}_retrieval_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Retrieval latency in seconds"
    );

    describe_counter!(
        format!("{}_tool_calls_total", METRICS_PREFIX),
        Unit::Count,
        "Retrieval tool invocations"
    );

    describe_histogram!(
        format!("{}_tool_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Retrieval tool latency in seconds"
    );

    describe_counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API requests"
    );

    describe_histogram!(
        format!("{}_embedding_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Embedding generation latency in seconds"
    );

    describe_counter!(
        format!("{}_answers_total", METRICS_PREFIX),
        Unit::Count,
        "Answers produced, by generation source"
    );

    describe_counter!(
        format!("{}_conversation_evictions_total", METRICS_PREFIX),
        Unit::Count,
        "Messages evicted from conversation windows"
    );

    describe_gauge!(
        format!("{}_requests_in_flight", METRICS_PREFIX),
        Unit::Count,
        "Queries currently being processed"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record retrieval metrics
pub fn record_retrieval(duration_secs: f64, strategy: &str, result_count: usize) {
    counter!(
        format!("{}_retrieval_queries_total", METRICS_PREFIX),
        "strategy" => strategy.to_string(),
        "empty" => (result_count == 0).to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_retrieval_duration_seconds", METRICS_PREFIX),
        "strategy" => strategy.to_string()
    )
    .record(duration_secs);
}

/// Helper to record a tool invocation
pub fn record_tool_call(tool: &str, duration_secs: f64, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_tool_calls_total", METRICS_PREFIX),
        "tool" => tool.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_tool_duration_seconds", METRICS_PREFIX),
        "tool" => tool.to_string()
    )
    .record(duration_secs);
}

/// Helper to record embedding metrics
pub fn record_embedding(duration_secs: f64, model: &str, batch_size: usize, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_embedding_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string(),
            "batch" => if batch_size > 1 { "batch" } else { "single" }
        )
        .record(duration_secs);
    }
}

/// Helper to record how an answer was produced ("model", "extractive", "error")
pub fn record_answer(source: &str) {
    counter!(
        format!("{}_answers_total", METRICS_PREFIX),
        "source" => source.to_string()
    )
    .increment(1);
}

/// Helper to record conversation window evictions
pub fn record_eviction(count: u64) {
    counter!(format!("{}_conversation_evictions_total", METRICS_PREFIX)).increment(count);
}

/// Helper to publish the in-flight request count
pub fn set_in_flight(count: usize) {
    gauge!(format!("{}_requests_in_flight", METRICS_PREFIX)).set(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helpers_without_recorder() {
        register_metrics();
        record_retrieval(0.012, "hybrid", 4);
        record_tool_call("vector_search", 0.004, false);
        record_answer("extractive");
        record_eviction(1);
        set_in_flight(0);
    }
}
