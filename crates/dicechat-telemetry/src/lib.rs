//! Structured logging setup built on `tracing-subscriber`.

use dicechat_settings::LoggingSettings;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer};

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by RUST_LOG env var.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "dicechat_server" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// Emit JSON lines instead of the human-readable format.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            json: false,
        }
    }
}

impl From<&LoggingSettings> for TelemetryConfig {
    fn from(settings: &LoggingSettings) -> Self {
        Self {
            log_level: settings.level(),
            module_levels: settings.module_levels(),
            json: settings.json,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("failed to install tracing subscriber: {0}")]
    Init(#[from] TryInitError),
}

/// `EnvFilter` directives for the configured levels, e.g.
/// `"info,dicechat_server=debug"`.
pub fn filter_directives(config: &TelemetryConfig) -> String {
    let mut filter = config.log_level.to_string().to_lowercase();
    for (module, level) in &config.module_levels {
        filter.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
    }
    filter
}

/// Install the global subscriber. Call once at startup.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(config)));

    let fmt_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().with_target(true).boxed()
    };

    tracing_subscriber::registry()
        .with(fmt_layer.with_filter(env_filter))
        .try_init()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_is_info() {
        assert_eq!(filter_directives(&TelemetryConfig::default()), "info");
    }

    #[test]
    fn module_overrides_appended() {
        let config = TelemetryConfig {
            log_level: Level::WARN,
            module_levels: vec![
                ("dicechat_server".into(), Level::DEBUG),
                ("tower_http".into(), Level::TRACE),
            ],
            json: true,
        };
        assert_eq!(
            filter_directives(&config),
            "warn,dicechat_server=debug,tower_http=trace"
        );
    }

    #[test]
    fn built_from_logging_settings() {
        let mut settings = LoggingSettings::default();
        settings.level = "debug".into();
        settings.json = true;
        settings.modules.insert("hyper".into(), "warn".into());

        let config = TelemetryConfig::from(&settings);
        assert_eq!(config.log_level, Level::DEBUG);
        assert!(config.json);
        assert_eq!(config.module_levels, vec![("hyper".to_string(), Level::WARN)]);
    }

    #[test]
    fn second_init_fails() {
        let config = TelemetryConfig::default();
        let _ = init_telemetry(&config);
        assert!(matches!(init_telemetry(&config), Err(TelemetryError::Init(_))));
    }
}
