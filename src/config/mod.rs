//! Settings file, environment overrides and validation.
//!
//! ```rust,no_run
//! use mcp_conductor::config::{EnvOverrides, Settings, validate};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut settings = Settings::load("mcp_config.json").await?;
//! EnvOverrides::new().apply(&mut settings)?;
//! validate(&settings)?;
//! let model = settings.select_model(None)?;
//! # Ok(())
//! # }
//! ```

pub mod env;
pub mod settings;
pub mod validator;

pub use env::EnvOverrides;
pub use settings::{DEFAULT_SYSTEM_MESSAGE, ModelConfig, Settings};
pub use validator::validate;

use thiserror::Error;

/// Errors that can occur in configuration operations
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Key or file not found
    #[error("Key not found: {key}")]
    NotFound {
        /// The key that was not found
        key: String,
    },

    /// Invalid configuration value
    #[error("Invalid value for {key}: {message}")]
    InvalidValue {
        /// The key with invalid value
        key: String,
        /// Error message
        message: String,
    },

    /// No model entry matches the request and none is marked default
    #[error("No suitable model found in config.")]
    NoSuitableModel,

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Environment variable error
    #[error("Environment error: {0}")]
    Env(#[from] std::env::VarError),

    /// Multiple validation errors
    #[error("{0}")]
    ValidationErrors(ValidationErrors),
}

#[derive(Debug)]
pub struct ValidationErrors(pub Vec<ConfigError>);

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Validation failed: ")?;
        let msgs: Vec<String> = self.0.iter().map(|e| e.to_string()).collect();
        write!(f, "{}", msgs.join("; "))
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::NotFound {
            key: "mcpServers".to_string(),
        };
        assert!(err.to_string().contains("mcpServers"));
        assert_eq!(
            ConfigError::NoSuitableModel.to_string(),
            "No suitable model found in config."
        );
    }

    #[test]
    fn test_validation_errors_display() {
        let errors = ValidationErrors(vec![
            ConfigError::InvalidValue {
                key: "a".into(),
                message: "bad".into(),
            },
            ConfigError::NotFound { key: "b".into() },
        ]);
        let text = errors.to_string();
        assert!(text.starts_with("Validation failed: "));
        assert!(text.contains("Invalid value for a: bad; Key not found: b"));
    }
}
