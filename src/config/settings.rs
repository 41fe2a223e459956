//! The JSON settings file: tool servers and model entries.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use super::{ConfigError, ConfigResult};
use crate::mcp::McpServerConfig;
use crate::types::Message;

pub const DEFAULT_SYSTEM_MESSAGE: &str = "You are a helpful assistant.";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub mcp_servers: BTreeMap<String, McpServerConfig>,
    #[serde(default)]
    pub models: Vec<ModelConfig>,
    /// Preferred model name or title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Audit log destination
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_messages_path: Option<PathBuf>,
}

impl Settings {
    pub fn from_json(content: &str) -> ConfigResult<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub async fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(ConfigError::NotFound {
                key: path.display().to_string(),
            });
        }
        let content = tokio::fs::read_to_string(path).await?;
        Self::from_json(&content)
    }

    /// Servers in alias order.
    pub fn servers(&self) -> Vec<(String, McpServerConfig)> {
        self.mcp_servers
            .iter()
            .map(|(alias, config)| (alias.clone(), config.clone()))
            .collect()
    }

    /// Picks a model by `model` or `title`, falling back to the entry marked
    /// `default`. Without a name (and no preferred model) the first entry is
    /// used when none is marked default.
    pub fn select_model(&self, name: Option<&str>) -> ConfigResult<&ModelConfig> {
        let default = || self.models.iter().find(|m| m.default);

        let chosen = match name.or(self.model.as_deref()) {
            Some(name) => self
                .models
                .iter()
                .find(|m| m.matches(name))
                .or_else(default),
            None => default().or_else(|| self.models.first()),
        };
        chosen.ok_or(ConfigError::NoSuitableModel)
    }
}

/// One entry of the `models` list.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    pub provider: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub default: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_message_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub system_message_files: Vec<PathBuf>,
    /// Provider-specific settings handed to the adapter untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ModelConfig {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        self.model == name || self.title.as_deref() == Some(name)
    }

    pub fn display_name(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.model)
    }

    /// System messages that open every conversation with this model.
    ///
    /// The primary prompt comes from `systemMessageFile` when readable,
    /// otherwise `systemMessage`, otherwise the default. Each readable
    /// `systemMessageFiles` entry adds one more message.
    pub async fn system_messages(&self) -> Vec<Message> {
        let fallback = || {
            self.system_message
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_MESSAGE.to_string())
        };

        let primary = match &self.system_message_file {
            Some(path) => match tokio::fs::read_to_string(path).await {
                Ok(content) => content,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to read system message file");
                    fallback()
                }
            },
            None => fallback(),
        };

        let mut messages = vec![Message::system(primary)];
        for path in &self.system_message_files {
            match tokio::fs::read_to_string(path).await {
                Ok(content) => messages.push(Message::system(format!(
                    "File: {}\n{}",
                    path.display(),
                    content
                ))),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to read system message file")
                }
            }
        }
        messages
    }
}
