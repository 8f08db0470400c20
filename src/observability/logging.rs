//! Structured logging configuration.

use crate::config::{LogFormat, ObservabilitySettings};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Logging configuration resolved from settings and environment.
#[derive(Debug)]
pub struct LoggingConfig {
    /// Filter applied to every layer.
    pub filter: EnvFilter,
    /// Output format.
    pub format: LogFormat,
    /// Optional append-mode log file.
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    /// Resolves logging configuration.
    ///
    /// `MEMCONSULT_LOG` wins over `RUST_LOG`, which wins over the configured
    /// level. `verbose` raises the crate level to debug.
    #[must_use]
    pub fn from_settings(settings: &ObservabilitySettings, verbose: bool) -> Self {
        let directive = std::env::var("MEMCONSULT_LOG")
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or_else(|_| {
                if verbose {
                    "memconsult=debug".to_string()
                } else {
                    settings.log_level.clone()
                }
            });
        let filter = EnvFilter::try_new(&directive).unwrap_or_else(|e| {
            tracing::warn!(directive = %directive, error = %e, "invalid log filter, using info");
            EnvFilter::new("memconsult=info")
        });

        let format = match std::env::var("MEMCONSULT_LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("pretty") => LogFormat::Pretty,
            _ => settings.log_format,
        };

        Self {
            filter,
            format,
            file: settings.log_file.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_file_carried() {
        let settings = ObservabilitySettings {
            log_file: Some(PathBuf::from("/tmp/memconsult.log")),
            log_format: LogFormat::Json,
            ..ObservabilitySettings::default()
        };
        let config = LoggingConfig::from_settings(&settings, false);
        assert_eq!(config.file, Some(PathBuf::from("/tmp/memconsult.log")));
    }
}
