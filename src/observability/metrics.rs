//! Prometheus export for the engine's `metrics` facade.
//!
//! Library code records through `metrics::counter!` and friends whether or not
//! a recorder exists. Installing one here makes those series scrapeable.

use crate::config::ObservabilitySettings;
use crate::{Error, Result};
use metrics::Unit;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::{Ipv4Addr, SocketAddr};

/// Metrics configuration.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Whether a Prometheus recorder is installed.
    pub enabled: bool,
    /// Address for the HTTP scrape listener.
    pub listen_addr: SocketAddr,
}

impl MetricsConfig {
    /// Resolves settings, letting `MEMCONSULT_METRICS_ENABLED` and
    /// `MEMCONSULT_METRICS_PORT` override the file.
    #[must_use]
    pub fn from_settings(settings: &ObservabilitySettings) -> Self {
        let enabled = std::env::var("MEMCONSULT_METRICS_ENABLED")
            .ok()
            .map_or(settings.metrics_enabled, |v| {
                matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
            });
        let port = std::env::var("MEMCONSULT_METRICS_PORT")
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(settings.metrics_port);

        Self {
            enabled,
            listen_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)),
        }
    }
}

/// Handle to the installed recorder.
#[derive(Debug, Clone)]
pub struct MetricsHandle {
    prometheus: PrometheusHandle,
}

impl MetricsHandle {
    /// Renders the current metrics in Prometheus text format.
    #[must_use]
    pub fn render(&self) -> String {
        self.prometheus.render()
    }
}

/// Installs the Prometheus recorder.
///
/// With `expose`, an HTTP scrape listener is spawned on the current Tokio
/// runtime, which must exist.
///
/// # Errors
///
/// Returns an error if a recorder is already installed, the listener cannot
/// bind, or `expose` is requested outside a runtime.
pub fn install_prometheus(config: &MetricsConfig, expose: bool) -> Result<Option<MetricsHandle>> {
    if !config.enabled {
        return Ok(None);
    }

    let prometheus = if expose {
        let runtime = tokio::runtime::Handle::try_current().map_err(install_error)?;
        let (recorder, exporter) = {
            let _entered = runtime.enter();
            PrometheusBuilder::new()
                .with_http_listener(config.listen_addr)
                .build()
                .map_err(install_error)?
        };
        let handle = recorder.handle();
        metrics::set_global_recorder(recorder).map_err(install_error)?;
        runtime.spawn(exporter);
        tracing::info!(addr = %config.listen_addr, "prometheus listener started");
        handle
    } else {
        PrometheusBuilder::new()
            .install_recorder()
            .map_err(install_error)?
    };

    describe_engine_metrics();
    Ok(Some(MetricsHandle { prometheus }))
}

/// Registers help text for the series the engine records.
fn describe_engine_metrics() {
    metrics::describe_counter!(
        "consultations_total",
        "Consultations by outcome (success, failure, cache)"
    );
    metrics::describe_histogram!(
        "consultation_duration_ms",
        Unit::Milliseconds,
        "Wall-clock time of one consultation"
    );
    metrics::describe_gauge!(
        "consultation_confidence",
        "Confidence score of the latest consultation"
    );
    metrics::describe_counter!(
        "strategy_runs_total",
        "Strategy executions by strategy and status"
    );
    metrics::describe_counter!("strategy_timeouts_total", "Strategy runs cut off by the timeout");
    metrics::describe_counter!(
        "bridge_requests_total",
        "Bridge calls by component, method and answer origin"
    );
    metrics::describe_histogram!(
        "bridge_request_duration_ms",
        Unit::Milliseconds,
        "Latency of one bridge attempt"
    );
    metrics::describe_gauge!(
        "bridge_circuit_breaker_state",
        "Breaker state per component (0 closed, 1 open, 2 half-open)"
    );
    metrics::describe_counter!("bridge_fallbacks_total", "Bridge calls answered by a fallback stage");
    metrics::describe_counter!("cache_hits_total", "Result cache hits by tier");
    metrics::describe_counter!("ultimate_fallbacks_total", "Consultations nothing could answer");
}

fn install_error(e: impl std::fmt::Display) -> Error {
    Error::OperationFailed {
        operation: "metrics_install".to_string(),
        cause: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_metrics_install_nothing() {
        let config = MetricsConfig {
            enabled: false,
            listen_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
        };
        assert!(install_prometheus(&config, false).unwrap().is_none());
    }

    #[test]
    fn test_expose_requires_runtime() {
        let config = MetricsConfig {
            enabled: true,
            listen_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
        };
        assert!(install_prometheus(&config, true).is_err());
    }

    #[test]
    fn test_engine_series_render() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            describe_engine_metrics();
            metrics::counter!("strategy_runs_total", "strategy" => "memory_recall", "status" => "success")
                .increment(2);
        });
        let rendered = handle.render();
        assert!(rendered.contains("strategy_runs_total"));
        assert!(rendered.contains("memory_recall"));
    }
}
