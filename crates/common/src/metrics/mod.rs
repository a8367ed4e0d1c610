//! Metrics and observability utilities
//!
//! Prometheus metrics with latency histograms and standardized naming.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all Foodgram metrics
pub const METRICS_PREFIX: &str = "foodgram";

/// Histogram buckets for request latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001,  // 1ms
    0.005,  // 5ms
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Membership toggles
    describe_counter!(
        format!("{}_toggles_total", METRICS_PREFIX),
        Unit::Count,
        "Favorite, shopping cart and subscription changes by outcome"
    );

    // Shopping list
    describe_counter!(
        format!("{}_shopping_list_downloads_total", METRICS_PREFIX),
        Unit::Count,
        "Shopping list downloads by outcome"
    );

    describe_histogram!(
        format!("{}_shopping_list_ingredients", METRICS_PREFIX),
        Unit::Count,
        "Distinct ingredient lines per generated shopping list"
    );

    // Recipes
    describe_counter!(
        format!("{}_recipes_written_total", METRICS_PREFIX),
        Unit::Count,
        "Recipes created, updated or deleted"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Record a favorite/cart/subscription change.
///
/// `kind` is the membership ("favorite", "shopping_cart", "subscription"),
/// `action` is "add" or "remove", `outcome` is "ok", "conflict", "not_found"...
pub fn record_toggle(kind: &'static str, action: &'static str, outcome: &'static str) {
    counter!(
        format!("{}_toggles_total", METRICS_PREFIX),
        "kind" => kind,
        "action" => action,
        "outcome" => outcome
    )
    .increment(1);
}

/// Record a shopping list download. `None` means the cart was empty.
pub fn record_shopping_list(ingredient_lines: Option<usize>) {
    let outcome = if ingredient_lines.is_some() { "ok" } else { "empty" };

    counter!(
        format!("{}_shopping_list_downloads_total", METRICS_PREFIX),
        "outcome" => outcome
    )
    .increment(1);

    if let Some(lines) = ingredient_lines {
        histogram!(format!("{}_shopping_list_ingredients", METRICS_PREFIX)).record(lines as f64);
    }
}

/// Record a recipe write (`action`: "create", "update", "delete")
pub fn record_recipe_write(action: &'static str) {
    counter!(
        format!("{}_recipes_written_total", METRICS_PREFIX),
        "action" => action
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_buckets() {
        let mut prev = 0.0;
        for &bucket in LATENCY_BUCKETS {
            assert!(bucket > prev);
            prev = bucket;
        }
    }

    #[test]
    fn test_recorders_without_exporter() {
        // No recorder installed: calls are no-ops
        let metrics = RequestMetrics::start("GET", "/api/recipes");
        metrics.finish(200);
        record_toggle("favorite", "add", "ok");
        record_shopping_list(Some(3));
        record_shopping_list(None);
        record_recipe_write("create");
    }
}
