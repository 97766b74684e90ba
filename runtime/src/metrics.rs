//! Prometheus metrics for observability and monitoring.
//!
//! The runtime records through the `metrics` facade; nothing is exported
//! unless the host installs a recorder. [`install_prometheus`] installs the
//! Prometheus recorder globally, [`prometheus_recorder`] builds one for
//! scoped use.
//!
//! # Example
//!
//! ```rust,no_run
//! use tessera_runtime::metrics::install_prometheus;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let handle = install_prometheus()?;
//!
//! // ... run stores ...
//!
//! println!("{}", handle.render());
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
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

fn builder() -> Result<PrometheusBuilder, MetricsError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            &[
                0.000_01, 0.000_05, 0.000_1, 0.000_5, 0.001, 0.005, 0.01, 0.05, 0.1,
            ],
        )
        .map_err(|e| MetricsError::Build(e.to_string()))
}

/// Build a Prometheus recorder without installing it.
///
/// Use with [`metrics::with_local_recorder`] or install it yourself.
///
/// # Errors
///
/// Returns [`MetricsError::Build`] if the histogram buckets are rejected.
pub fn prometheus_recorder() -> Result<PrometheusRecorder, MetricsError> {
    Ok(builder()?.build_recorder())
}

/// Register metric descriptions and install the Prometheus recorder globally.
///
/// # Errors
///
/// Returns [`MetricsError::Install`] if a global recorder is already installed.
pub fn install_prometheus() -> Result<PrometheusHandle, MetricsError> {
    let handle = builder()?
        .install_recorder()
        .map_err(|e| MetricsError::Install(e.to_string()))?;
    register_metrics();
    tracing::info!("Prometheus metrics recorder installed");
    Ok(handle)
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!("store.actions.total", "Total number of actions reduced by stores");
    describe_counter!(
        "store.actions.rejected",
        "Actions rejected because the store was shutting down"
    );
    describe_counter!("store.effects.started", "Effects started, by effect type");
    describe_histogram!(
        "store.reducer.duration_seconds",
        "Time spent inside reducers per action"
    );
    describe_counter!("effects.cancelled", "Effects stopped by cancellation");
    describe_counter!("effects.failed", "Effects that ended with a failure");
    describe_gauge!(
        "effects.registry.live",
        "Cancellable effects currently registered"
    );
    describe_counter!("throttle.emitted", "Throttled values delivered, by leading/trailing mode");
    describe_counter!("throttle.scheduled", "Throttled values held for a trailing emission");
}

/// Store metrics recorder.
pub struct StoreMetrics;

impl StoreMetrics {
    /// Record an action reduced.
    pub fn record_action(duration: Duration) {
        counter!("store.actions.total").increment(1);
        histogram!("store.reducer.duration_seconds").record(duration.as_secs_f64());
    }

    /// Record an action rejected during shutdown.
    pub fn record_rejected() {
        counter!("store.actions.rejected").increment(1);
    }

    /// Record an effect started.
    pub fn record_effect_started(kind: &'static str) {
        counter!("store.effects.started", "type" => kind).increment(1);
    }
}

/// Effect outcome metrics recorder.
pub struct EffectMetrics;

impl EffectMetrics {
    /// Record an effect failure.
    pub fn record_failure() {
        counter!("effects.failed").increment(1);
    }
}

/// Cancellation registry metrics recorder.
pub struct RegistryMetrics;

impl RegistryMetrics {
    /// Record tokens cancelled.
    pub fn record_cancelled(count: usize) {
        counter!("effects.cancelled").increment(count as u64);
    }

    /// Record the number of live registrations.
    #[allow(clippy::cast_precision_loss)] // Registry sizes stay far below 2^52
    pub fn record_live(live: usize) {
        gauge!("effects.registry.live").set(live as f64);
    }
}

/// Throttle metrics recorder.
pub struct ThrottleMetrics;

impl ThrottleMetrics {
    /// Record a value delivered as soon as it arrived.
    pub fn record_leading() {
        counter!("throttle.emitted", "mode" => "leading").increment(1);
    }

    /// Record a pending value delivered when its window closed.
    pub fn record_trailing() {
        counter!("throttle.emitted", "mode" => "trailing").increment(1);
    }

    /// Record a value held back by an open window.
    pub fn record_scheduled() {
        counter!("throttle.scheduled").increment(1);
    }
}
