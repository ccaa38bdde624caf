use metrics::{Counter, Histogram};
use metrics_derive::Metrics;

/// Metrics for a [`RedemptionSubmitter`](crate::submitter::RedemptionSubmitter).
#[derive(Metrics)]
#[metrics(scope = "redemption")]
pub struct SubmitterMetrics {
    /// Number of user operations accepted by the bundler.
    pub sent: Counter,
    /// Number of retried send attempts.
    pub retried: Counter,
    /// Number of confirmed redemptions.
    pub confirmed: Counter,
    /// Number of failed redemptions.
    pub failed: Counter,
    /// Number of requests answered from an earlier submission.
    pub deduplicated: Counter,
    /// Time it takes to include user operations, in milliseconds.
    pub confirmation_time: Histogram,
}
