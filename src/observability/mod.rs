//! Tracing setup and span helpers.
//!
//! The library only emits `tracing` events and spans. Applications that
//! want them printed call [`init_tracing`] once at startup.

mod spans;

pub use spans::{SpanContext, ToolCallSpan, task_stream_span};

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TracingLevel {
    #[default]
    Info,
    Debug,
    Trace,
}

impl TracingLevel {
    fn as_directive(&self) -> &'static str {
        match self {
            TracingLevel::Info => "info",
            TracingLevel::Debug => "debug",
            TracingLevel::Trace => "trace",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Tracing configuration.
#[derive(Clone, Debug, Default)]
pub struct TracingConfig {
    pub enabled: bool,
    pub level: TracingLevel,
    pub format: LogFormat,
}

impl TracingConfig {
    pub fn new() -> Self {
        Self {
            enabled: true,
            ..Default::default()
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn level(mut self, level: TracingLevel) -> Self {
        self.level = level;
        self
    }

    pub fn json(mut self) -> Self {
        self.format = LogFormat::Json;
        self
    }
}

/// Installs a global fmt subscriber. `RUST_LOG` overrides the configured level.
pub fn init_tracing(config: &TracingConfig) -> crate::Result<()> {
    if !config.enabled {
        return Ok(());
    }

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_directive()));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = match config.format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init(),
    };

    result.map_err(|e| crate::Error::Config(format!("Failed to init subscriber: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_config_is_noop() {
        assert!(init_tracing(&TracingConfig::disabled()).is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = TracingConfig::new().level(TracingLevel::Debug).json();
        assert!(config.enabled);
        assert_eq!(config.level.as_directive(), "debug");
        assert_eq!(config.format, LogFormat::Json);
    }
}
