//! Environment variable overrides
//!
//! Read-only: variables are looked up, never set, since mutating the process
//! environment is not thread-safe.

use std::path::PathBuf;

use super::{ConfigError, ConfigResult, Settings};

pub const DEFAULT_ENV_PREFIX: &str = "MCP_CONDUCTOR_";

/// Applies `<PREFIX>MODEL` and `<PREFIX>LOG_MESSAGES_PATH` on top of a
/// loaded [`Settings`].
#[derive(Debug, Clone)]
pub struct EnvOverrides {
    prefix: String,
}

impl EnvOverrides {
    pub fn new() -> Self {
        Self::prefixed(DEFAULT_ENV_PREFIX)
    }

    pub fn prefixed(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn env_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key.to_uppercase().replace('.', "_"))
    }

    /// Looks up one variable; unset is `None`.
    pub fn var(&self, key: &str) -> ConfigResult<Option<String>> {
        match std::env::var(self.env_key(key)) {
            Ok(value) if value.trim().is_empty() => Ok(None),
            Ok(value) => Ok(Some(value)),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(e) => Err(ConfigError::Env(e)),
        }
    }

    pub fn apply(&self, settings: &mut Settings) -> ConfigResult<()> {
        if let Some(model) = self.var("model")? {
            tracing::debug!(%model, "Model selected from environment");
            settings.model = Some(model);
        }
        if let Some(path) = self.var("log_messages_path")? {
            settings.log_messages_path = Some(PathBuf::from(path));
        }
        Ok(())
    }
}

impl Default for EnvOverrides {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_key() {
        let overrides = EnvOverrides::new();
        assert_eq!(overrides.env_key("model"), "MCP_CONDUCTOR_MODEL");
        assert_eq!(
            overrides.env_key("log_messages_path"),
            "MCP_CONDUCTOR_LOG_MESSAGES_PATH"
        );
    }

    #[test]
    fn test_unset_variables_leave_settings_alone() {
        let overrides = EnvOverrides::prefixed("MCP_CONDUCTOR_TEST_UNSET_7F3A_");
        let mut settings = Settings {
            model: Some("kept".into()),
            ..Default::default()
        };
        overrides.apply(&mut settings).unwrap();
        assert_eq!(settings.model.as_deref(), Some("kept"));
        assert!(settings.log_messages_path.is_none());
    }

    #[test]
    fn test_reads_existing_variable() {
        // PATH is set in every test environment; read it through an empty prefix.
        let overrides = EnvOverrides::prefixed("");
        assert!(overrides.var("path").unwrap().is_some());
    }
}
