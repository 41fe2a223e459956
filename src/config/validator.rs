//! Settings validation. Collects every problem instead of stopping at the first.

use super::{ConfigError, ConfigResult, Settings, ValidationErrors};
use crate::mcp::{McpServerConfig, validate_server_alias};

pub fn validate(settings: &Settings) -> ConfigResult<()> {
    let mut errors = Vec::new();

    for (alias, server) in &settings.mcp_servers {
        let key = format!("mcpServers.{}", alias);
        if let Err(message) = validate_server_alias(alias) {
            errors.push(ConfigError::InvalidValue {
                key: key.clone(),
                message,
            });
        }
        match server {
            McpServerConfig::Process { command, .. } if command.trim().is_empty() => {
                errors.push(ConfigError::InvalidValue {
                    key: format!("{}.command", key),
                    message: "command must not be empty".into(),
                });
            }
            McpServerConfig::Stream { url } => match url::Url::parse(url) {
                Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
                Ok(parsed) => errors.push(ConfigError::InvalidValue {
                    key: format!("{}.url", key),
                    message: format!("unsupported scheme '{}'", parsed.scheme()),
                }),
                Err(e) => errors.push(ConfigError::InvalidValue {
                    key: format!("{}.url", key),
                    message: e.to_string(),
                }),
            },
            _ => {}
        }
    }

    for (i, model) in settings.models.iter().enumerate() {
        if model.provider.trim().is_empty() {
            errors.push(ConfigError::InvalidValue {
                key: format!("models[{}].provider", i),
                message: "provider must not be empty".into(),
            });
        }
        if model.model.trim().is_empty() {
            errors.push(ConfigError::InvalidValue {
                key: format!("models[{}].model", i),
                message: "model must not be empty".into(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationErrors(ValidationErrors(errors)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;

    #[test]
    fn test_valid_settings() {
        let mut settings = Settings::default();
        settings
            .mcp_servers
            .insert("fs".into(), McpServerConfig::process("npx"));
        settings
            .mcp_servers
            .insert("web".into(), McpServerConfig::stream("https://example.com/mcp"));
        settings.models.push(ModelConfig::new("openai", "gpt-4o"));
        assert!(validate(&settings).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut settings = Settings::default();
        settings
            .mcp_servers
            .insert("my_fs".into(), McpServerConfig::process(" "));
        settings
            .mcp_servers
            .insert("ftp".into(), McpServerConfig::stream("ftp://example.com"));
        settings
            .mcp_servers
            .insert("bad".into(), McpServerConfig::stream("not a url"));
        settings.models.push(ModelConfig::new("", "m"));

        match validate(&settings) {
            Err(ConfigError::ValidationErrors(ValidationErrors(errors))) => {
                assert_eq!(errors.len(), 5);
            }
            other => panic!("expected validation errors, got {:?}", other),
        }
    }
}
