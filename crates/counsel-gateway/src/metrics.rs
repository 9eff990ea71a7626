//! Gateway metrics
//!
//! Emitted through the `metrics` facade; they are no-ops unless the
//! embedding application installs a recorder.
//!
//! - `gateway_requests_total` (counter): labels `method`, `status`
//! - `gateway_refresh_total` (counter): label `outcome` (`success`, `failure`, `timeout`)
//! - `gateway_refresh_followers_total` (counter): requests that waited on another caller's refresh

/// Record a response received from the API (every attempt, including retries).
pub fn record_response(method: &str, status: u16) {
    metrics::counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record the outcome of one refresh exchange.
pub fn record_refresh(outcome: &'static str) {
    metrics::counter!("gateway_refresh_total", "outcome" => outcome).increment(1);
}

/// Record requests that joined an in-flight refresh instead of starting one.
pub fn record_followers(count: usize) {
    if count > 0 {
        metrics::counter!("gateway_refresh_followers_total").increment(count as u64);
    }
}
