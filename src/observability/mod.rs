//! Logging and metrics.
//!
//! Library code only emits `tracing` events and `metrics` macros. The binary
//! calls [`init_from_config`] once to install a subscriber and, when enabled,
//! a Prometheus recorder.

mod logging;
mod metrics;

pub use logging::LoggingConfig;
pub use metrics::{MetricsConfig, MetricsHandle};

use crate::config::{LogFormat, ObservabilitySettings};
use crate::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};
use tracing_subscriber::Registry;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

/// Full observability configuration.
#[derive(Debug)]
pub struct ObservabilityConfig {
    /// Logging configuration.
    pub logging: LoggingConfig,
    /// Metrics configuration.
    pub metrics: MetricsConfig,
    /// Whether to expose metrics via HTTP listener.
    pub metrics_expose: bool,
}

/// Options for initialization from the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct InitOptions {
    /// Whether verbose output was requested.
    pub verbose: bool,
    /// Whether to expose metrics via HTTP listener.
    pub metrics_expose: bool,
}

/// Handle for observability runtime components.
#[derive(Debug)]
pub struct ObservabilityHandle {
    metrics_handle: Option<MetricsHandle>,
}

impl ObservabilityHandle {
    /// Renders the current Prometheus metrics, if a recorder is installed.
    #[must_use]
    pub fn render_metrics(&self) -> Option<String> {
        self.metrics_handle.as_ref().map(MetricsHandle::render)
    }
}

static OBSERVABILITY_INIT: OnceLock<()> = OnceLock::new();

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Initializes observability from config settings with env overrides.
///
/// # Errors
///
/// Returns an error if observability has already been initialized or if the
/// log file or metrics recorder cannot be set up.
pub fn init_from_config(
    settings: &ObservabilitySettings,
    options: InitOptions,
) -> Result<ObservabilityHandle> {
    init(ObservabilityConfig {
        logging: LoggingConfig::from_settings(settings, options.verbose),
        metrics: MetricsConfig::from_settings(settings),
        metrics_expose: options.metrics_expose,
    })
}

/// Installs the global subscriber and, when enabled, the metrics recorder.
///
/// # Errors
///
/// Returns an error on a second call, or if the log file, subscriber or
/// recorder cannot be installed.
pub fn init(config: ObservabilityConfig) -> Result<ObservabilityHandle> {
    if OBSERVABILITY_INIT.get().is_some() {
        return Err(init_error("observability already initialized"));
    }

    let metrics_handle = metrics::install_prometheus(&config.metrics, config.metrics_expose)?;
    let LoggingConfig {
        filter,
        format,
        file,
    } = config.logging;

    tracing_subscriber::registry()
        .with(fmt_layer(format, file.as_deref())?.with_filter(filter))
        .try_init()
        .map_err(init_error)?;

    OBSERVABILITY_INIT
        .set(())
        .map_err(|()| init_error("observability initialized concurrently"))?;
    tracing::debug!(?format, log_file = ?file, metrics = metrics_handle.is_some(), "observability ready");

    Ok(ObservabilityHandle { metrics_handle })
}

/// Builds the formatting layer. Files never get ANSI colours.
fn fmt_layer(format: LogFormat, file: Option<&Path>) -> Result<BoxedLayer> {
    let base = tracing_subscriber::fmt::layer().with_target(true);
    let layer: BoxedLayer = match (format, file) {
        (LogFormat::Json, Some(path)) => base
            .json()
            .with_current_span(true)
            .with_writer(open_log_file(path)?)
            .boxed(),
        (LogFormat::Json, None) => base
            .json()
            .with_current_span(true)
            .with_writer(io::stderr)
            .boxed(),
        (LogFormat::Pretty, Some(path)) => base
            .with_ansi(false)
            .with_writer(open_log_file(path)?)
            .boxed(),
        (LogFormat::Pretty, None) => base.with_writer(io::stderr).boxed(),
    };
    Ok(layer)
}

/// Append-mode log file shared by every event.
#[derive(Clone)]
struct SharedLogFile(Arc<Mutex<File>>);

impl Write for SharedLogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        crate::acquire_lock(&self.0).write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        crate::acquire_lock(&self.0).flush()
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SharedLogFile {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn open_log_file(path: &Path) -> Result<SharedLogFile> {
    let io_error = |e: io::Error| Error::OperationFailed {
        operation: "open_log_file".to_string(),
        cause: format!("{}: {e}", path.display()),
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_error)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_error)?;
    Ok(SharedLogFile(Arc::new(Mutex::new(file))))
}

fn init_error(e: impl std::fmt::Display) -> Error {
    Error::OperationFailed {
        operation: "observability_init".to_string(),
        cause: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_appends_across_clones() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("engine.log");
        let mut writer = open_log_file(&path).unwrap();
        writer.write_all(b"first\n").unwrap();
        let mut second = writer.clone();
        second.write_all(b"second\n").unwrap();
        second.flush().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "first\nsecond\n");
    }

    #[test]
    fn test_fmt_layer_builds_for_every_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.log");
        for format in [LogFormat::Pretty, LogFormat::Json] {
            assert!(fmt_layer(format, None).is_ok());
            assert!(fmt_layer(format, Some(&path)).is_ok());
        }
    }
}
