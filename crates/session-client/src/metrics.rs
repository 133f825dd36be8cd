//! Client metrics
//!
//! Emitted through the `metrics` facade; the embedding application decides
//! whether a recorder is installed.
//!
//! - `session_requests_total` (counter): label `outcome`
//! - `session_token_refresh_total` (counter): label `outcome`
//! - `session_requests_queued_total` (counter)
//! - `session_sign_out_total` (counter): label `reason`

/// Record a completed `send` with its outcome label.
pub fn record_request(outcome: &'static str) {
    metrics::counter!("session_requests_total", "outcome" => outcome).increment(1);
}

/// Record a settled refresh exchange.
pub fn record_refresh(outcome: &'static str) {
    metrics::counter!("session_token_refresh_total", "outcome" => outcome).increment(1);
}

/// Record a request parked behind an in-flight refresh.
pub fn record_queued() {
    metrics::counter!("session_requests_queued_total").increment(1);
}

/// Record a sign-out with the reason it was triggered.
pub fn record_sign_out(reason: &'static str) {
    metrics::counter!("session_sign_out_total", "reason" => reason).increment(1);
}
