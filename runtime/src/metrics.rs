//! Prometheus metrics for observability and monitoring.
//!
//! This module provides metric collection for the request lifecycle:
//! - Registry size and churn
//! - Sub-operation outcomes
//! - Tick duration
//!
//! Recording is always safe: without an installed recorder the macros are
//! no-ops.
//!
//! # Example
//!
//! ```rust,no_run
//! use tickwire_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub use metrics::{counter, gauge, histogram};

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

/// Prometheus metrics exporter.
///
/// Serves the scrape endpoint on `addr` once started.
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

    /// Install the recorder and start serving `/metrics`.
    ///
    /// Must be called from inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed. A recorder
    /// that is already installed is not an error.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.000_1, 0.000_5, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        let (recorder, exporter) = builder
            .build()
            .map_err(|e| MetricsError::Build(e.to_string()))?;
        let handle = recorder.handle();

        match metrics::set_global_recorder(recorder) {
            Ok(()) => {
                tokio::spawn(async move {
                    if let Err(_e) = exporter.await {
                        tracing::error!("Metrics exporter stopped");
                    }
                });
                self.handle = Some(handle);
                tracing::info!(
                    addr = %self.addr,
                    "Metrics server started - available at http://{}/metrics",
                    self.addr
                );
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Address the exporter listens on.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this server did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    // Registry
    describe_counter!(
        "tickwire_requests_registered_total",
        "Total number of requests registered"
    );
    describe_counter!(
        "tickwire_requests_reaped_total",
        "Total number of completed requests removed from the registry"
    );
    describe_gauge!(
        "tickwire_registry_size",
        "Number of requests currently tracked"
    );

    // Sub-operations
    describe_counter!(
        "tickwire_sub_operations_issued_total",
        "Total number of sub-operations handed to the transport"
    );
    describe_counter!(
        "tickwire_sub_operations_completed_total",
        "Total number of sub-operations that completed with a response"
    );
    describe_counter!(
        "tickwire_sub_operations_failed_total",
        "Total number of sub-operations that completed without a response"
    );
    describe_counter!(
        "tickwire_cancellations_total",
        "Total number of sub-operation cancellations requested"
    );

    // Tick
    describe_histogram!(
        "tickwire_tick_duration_seconds",
        "Time taken by one tick, callbacks included"
    );
    describe_counter!(
        "tickwire_callbacks_panicked_total",
        "Total number of callbacks that panicked"
    );
}

/// Registry metrics recorder.
pub struct RegistryMetrics;

impl RegistryMetrics {
    /// Record a new registration.
    pub fn record_registered() {
        counter!("tickwire_requests_registered_total").increment(1);
    }

    /// Record requests removed by a reap pass.
    pub fn record_reaped(count: usize) {
        counter!("tickwire_requests_reaped_total").increment(count as u64);
    }

    /// Record the current registry size.
    pub fn record_size(size: usize) {
        // Registry sizes are far below 2^53
        #[allow(clippy::cast_precision_loss)]
        gauge!("tickwire_registry_size").set(size as f64);
    }
}

/// Sub-operation metrics recorder.
pub struct SubOperationMetrics;

impl SubOperationMetrics {
    /// Record sub-operations handed to the transport.
    pub fn record_issued(count: usize) {
        counter!("tickwire_sub_operations_issued_total").increment(count as u64);
    }

    /// Record a terminal event.
    pub fn record_completed(succeeded: bool) {
        if succeeded {
            counter!("tickwire_sub_operations_completed_total").increment(1);
        } else {
            counter!("tickwire_sub_operations_failed_total").increment(1);
        }
    }

    /// Record a cancel request.
    pub fn record_cancel(count: usize) {
        counter!("tickwire_cancellations_total").increment(count as u64);
    }
}

/// Tick metrics recorder.
pub struct TickMetrics;

impl TickMetrics {
    /// Record a tick.
    pub fn record_tick(duration: Duration) {
        histogram!("tickwire_tick_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a callback that panicked.
    pub fn record_callback_panic() {
        counter!("tickwire_callbacks_panicked_total").increment(1);
    }
}
