/*!
Observability for the Folio engine.

- Tracing subscriber setup (human-readable or JSON lines, filtered by `RUST_LOG`)
- Prometheus counters for commits, restores and conflicts (`metrics` feature)

The engine calls the crate-internal `record_*` helpers unconditionally; without
the `metrics` feature they compile to nothing.
*/

#[cfg(feature = "metrics")]
use prometheus::{Counter, Encoder, Histogram, HistogramOpts, Registry, TextEncoder};
#[cfg(feature = "metrics")]
use std::sync::OnceLock;
use tracing::subscriber::set_global_default;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry as TracingRegistry};

use crate::{FolioError, Result};

#[cfg(feature = "metrics")]
static METRICS: OnceLock<Option<FolioMetrics>> = OnceLock::new();

/// Metrics collection for versioning operations
#[cfg(feature = "metrics")]
#[derive(Debug)]
pub struct FolioMetrics {
    pub versions_committed_total: Counter,
    pub restores_total: Counter,
    pub restore_failures_total: Counter,
    pub version_conflicts_total: Counter,
    pub snapshot_size_bytes: Histogram,

    registry: Registry,
}

#[cfg(feature = "metrics")]
impl FolioMetrics {
    fn new() -> Result<Self> {
        let registry = Registry::new();

        let versions_committed_total = counter(
            &registry,
            "folio_versions_committed_total",
            "Versions appended to either ledger",
        )?;
        let restores_total = counter(
            &registry,
            "folio_restores_total",
            "Restores that reached the committed phase",
        )?;
        let restore_failures_total = counter(
            &registry,
            "folio_restore_failures_total",
            "Restores that ended in the failed phase",
        )?;
        let version_conflicts_total = counter(
            &registry,
            "folio_version_conflicts_total",
            "Transactions rejected with a version conflict",
        )?;

        let snapshot_size_bytes = Histogram::with_opts(
            HistogramOpts::new(
                "folio_snapshot_size_bytes",
                "Canonical JSON size of committed snapshots",
            )
            .buckets(prometheus::exponential_buckets(256.0, 4.0, 8).map_err(|e| {
                FolioError::storage(format!("Failed to build snapshot size buckets: {e}"))
            })?),
        )
        .map_err(|e| {
            FolioError::storage(format!("Failed to create snapshot_size_bytes metric: {e}"))
        })?;
        registry
            .register(Box::new(snapshot_size_bytes.clone()))
            .map_err(|e| {
                FolioError::storage(format!("Failed to register snapshot_size_bytes: {e}"))
            })?;

        Ok(Self {
            versions_committed_total,
            restores_total,
            restore_failures_total,
            version_conflicts_total,
            snapshot_size_bytes,
            registry,
        })
    }

    /// Get or initialize the global metrics instance
    ///
    /// `None` if the registry could not be built; the failure is logged once.
    pub fn global() -> Option<&'static FolioMetrics> {
        METRICS
            .get_or_init(|| match Self::new() {
                Ok(metrics) => Some(metrics),
                Err(e) => {
                    tracing::warn!(error = %e, "Metrics disabled");
                    None
                }
            })
            .as_ref()
    }

    /// Gather metrics in Prometheus text format
    pub fn gather_metrics(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| FolioError::storage(format!("Failed to encode metrics: {e}")))?;

        String::from_utf8(buffer)
            .map_err(|e| FolioError::storage(format!("Failed to convert metrics to string: {e}")))
    }
}

#[cfg(feature = "metrics")]
fn counter(registry: &Registry, name: &str, help: &str) -> Result<Counter> {
    let counter = Counter::new(name, help)
        .map_err(|e| FolioError::storage(format!("Failed to create {name} metric: {e}")))?;
    registry
        .register(Box::new(counter.clone()))
        .map_err(|e| FolioError::storage(format!("Failed to register {name}: {e}")))?;
    Ok(counter)
}

/// Gather the global metrics in Prometheus text format
#[cfg(feature = "metrics")]
pub fn gather_metrics() -> Result<String> {
    FolioMetrics::global()
        .ok_or_else(|| FolioError::storage("metrics registry unavailable"))?
        .gather_metrics()
}

#[cfg(feature = "metrics")]
pub(crate) fn record_version_committed(size_bytes: usize) {
    if let Some(metrics) = FolioMetrics::global() {
        metrics.versions_committed_total.inc();
        metrics.snapshot_size_bytes.observe(size_bytes as f64);
    }
}

#[cfg(feature = "metrics")]
pub(crate) fn record_restore(succeeded: bool) {
    if let Some(metrics) = FolioMetrics::global() {
        if succeeded {
            metrics.restores_total.inc();
        } else {
            metrics.restore_failures_total.inc();
        }
    }
}

#[cfg(feature = "metrics")]
pub(crate) fn record_conflict() {
    if let Some(metrics) = FolioMetrics::global() {
        metrics.version_conflicts_total.inc();
    }
}

#[cfg(not(feature = "metrics"))]
pub(crate) fn record_version_committed(_size_bytes: usize) {}

#[cfg(not(feature = "metrics"))]
pub(crate) fn record_restore(_succeeded: bool) {}

#[cfg(not(feature = "metrics"))]
pub(crate) fn record_conflict() {}

/// Install the global tracing subscriber
///
/// # Arguments
/// * `json` - Emit JSON lines instead of human-readable output
/// * `level` - Level for every `folio*` target when `RUST_LOG` is unset
///
/// Logs go to stderr. Fails if a global subscriber is already installed.
pub fn init_observability(json: bool, level: Level) -> Result<()> {
    #[cfg(feature = "metrics")]
    FolioMetrics::global();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("folio={}", level.as_str().to_ascii_lowercase())));

    let result = if json {
        let subscriber = TracingRegistry::default().with(filter).with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_target(false)
                .with_current_span(true)
                .with_writer(std::io::stderr),
        );
        set_global_default(subscriber)
    } else {
        let subscriber = TracingRegistry::default()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            );
        set_global_default(subscriber)
    };

    result.map_err(|e| {
        FolioError::storage(format!("Failed to set global tracing subscriber: {e}"))
    })?;

    tracing::info!("Folio observability initialized");
    Ok(())
}

/// Initialize observability with human-readable output
pub fn init_default_observability() -> Result<()> {
    init_observability(false, Level::INFO)
}

#[cfg(all(test, feature = "metrics"))]
mod tests {
    use super::*;

    #[test]
    fn test_recorders_feed_the_registry() {
        record_version_committed(2048);
        record_restore(true);
        record_restore(false);
        record_conflict();

        let text = gather_metrics().unwrap();
        assert!(text.contains("folio_versions_committed_total"));
        assert!(text.contains("folio_restore_failures_total"));
        assert!(text.contains("folio_snapshot_size_bytes_bucket"));
    }

    #[test]
    fn test_global_is_shared() {
        let first = FolioMetrics::global().map(|m| m as *const FolioMetrics);
        let second = FolioMetrics::global().map(|m| m as *const FolioMetrics);
        assert!(first.is_some());
        assert_eq!(first, second);
    }
}
