//! Prometheus metrics for allocation and payment processing.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `exam_seating_allocations_total{outcome}` - allocation attempts by outcome
//! - `exam_seating_notices_total{outcome}` - gateway notices by audit outcome
//! - `exam_seating_revenue_cents_total` - gross revenue booked, in cents
//! - `exam_seating_seats_released_total` - seats given back
//! - `exam_seating_retry_attempts_total` / `_successes_total` / `_exhausted_total`
//!
//! ## Histograms
//! - `exam_seating_allocation_duration_seconds` - allocation latency
//!
//! # Example
//!
//! ```rust,no_run
//! use exam_seating_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics server.
///
/// Exposes metrics on an HTTP endpoint for Prometheus scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Install the global recorder and spawn the HTTP exporter.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or a recorder is
    /// already installed.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let (recorder, exporter) = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?
            .build()
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        let handle = recorder.handle();
        metrics::set_global_recorder(recorder).map_err(|e| MetricsError::Install(e.to_string()))?;

        tokio::spawn(async move {
            if exporter.await.is_err() {
                tracing::error!("Metrics exporter stopped");
            }
        });

        self.handle = Some(handle);
        tracing::info!(addr = %self.addr, "Metrics server started - available at http://{}/metrics", self.addr);
        Ok(())
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if server hasn't been started.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(
        "exam_seating_allocations_total",
        "Allocation attempts by outcome (allocated, duplicate, capacity_exhausted, ...)"
    );
    describe_histogram!(
        "exam_seating_allocation_duration_seconds",
        "Time taken to allocate a seat, retries included"
    );
    describe_counter!(
        "exam_seating_notices_total",
        "Gateway payment notices by audit outcome"
    );
    describe_counter!(
        "exam_seating_revenue_cents_total",
        "Gross revenue booked on first confirmed payment, in cents"
    );
    describe_counter!(
        "exam_seating_seats_released_total",
        "Seats given back on rejection, chargeback, expiry or reschedule"
    );
    describe_counter!(
        "exam_seating_retry_attempts_total",
        "Transactions retried after a lock timeout"
    );
    describe_counter!(
        "exam_seating_retry_successes_total",
        "Transactions that succeeded after at least one retry"
    );
    describe_counter!(
        "exam_seating_retry_exhausted_total",
        "Transactions that still failed after the last retry"
    );
}

/// Allocation metrics recorder.
pub struct AllocationMetrics;

impl AllocationMetrics {
    /// Record an allocation attempt.
    pub fn record(outcome: &'static str, duration: Duration) {
        counter!("exam_seating_allocations_total", "outcome" => outcome).increment(1);
        histogram!("exam_seating_allocation_duration_seconds").record(duration.as_secs_f64());
    }
}

/// Payment-notice metrics recorder.
pub struct NoticeMetrics;

impl NoticeMetrics {
    /// Record a processed notice.
    pub fn record(outcome: &'static str) {
        counter!("exam_seating_notices_total", "outcome" => outcome).increment(1);
    }

    /// Record booked revenue.
    pub fn record_revenue(cents: u64) {
        counter!("exam_seating_revenue_cents_total").increment(cents);
    }
}

/// Seat metrics recorder.
pub struct SeatMetrics;

impl SeatMetrics {
    /// Record a released seat.
    pub fn record_release() {
        counter!("exam_seating_seats_released_total").increment(1);
    }
}

/// Retry metrics recorder.
pub struct RetryMetrics;

impl RetryMetrics {
    /// Record a retry attempt.
    pub fn record_attempt() {
        counter!("exam_seating_retry_attempts_total").increment(1);
    }

    /// Record a successful retry.
    pub fn record_success() {
        counter!("exam_seating_retry_successes_total").increment(1);
    }

    /// Record exhausted retries.
    pub fn record_exhausted() {
        counter!("exam_seating_retry_exhausted_total").increment(1);
    }
}
