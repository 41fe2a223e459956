//! Generation backend adapter trait and registry.

use std::collections::HashMap;
use std::fmt::Debug;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{Stream, stream};
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::config::ModelConfig;
use crate::mcp::FunctionDefinition;
use crate::types::{Message, ToolCall};

/// A complete response for one turn.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub text: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

impl Generation {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn with_tool_calls(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            text: text.into(),
            tool_calls,
        }
    }
}

/// One item of an incremental generation.
///
/// A well-formed stream ends with exactly one `Complete` carrying the full
/// text and any tool calls.
#[derive(Clone, Debug, PartialEq)]
pub enum GenerationChunk {
    Text(String),
    Reasoning(String),
    Complete(Generation),
}

pub type GenerationStream = Pin<Box<dyn Stream<Item = Result<GenerationChunk>> + Send>>;

#[async_trait]
pub trait GenerationAdapter: Send + Sync + Debug + 'static {
    fn name(&self) -> &str;

    async fn generate(
        &self,
        history: &[Message],
        tools: &[FunctionDefinition],
    ) -> Result<Generation>;

    /// Incremental variant. Backends without streaming get the complete
    /// response as a single `Complete` chunk.
    fn generate_stream(
        self: Arc<Self>,
        history: Vec<Message>,
        tools: Vec<FunctionDefinition>,
    ) -> GenerationStream {
        Box::pin(stream::once(async move {
            self.generate(&history, &tools)
                .await
                .map(GenerationChunk::Complete)
        }))
    }
}

/// Stand-in for providers nobody registered.
///
/// Answers every turn with a fixed notice and no tool calls instead of
/// failing the conversation.
#[derive(Clone, Debug)]
pub struct UnsupportedAdapter {
    provider: String,
}

impl UnsupportedAdapter {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
        }
    }

    pub fn message(&self) -> String {
        format!("Unsupported provider '{}'", self.provider)
    }
}

#[async_trait]
impl GenerationAdapter for UnsupportedAdapter {
    fn name(&self) -> &str {
        "unsupported"
    }

    async fn generate(
        &self,
        _history: &[Message],
        _tools: &[FunctionDefinition],
    ) -> Result<Generation> {
        Ok(Generation::text(self.message()))
    }
}

pub type AdapterFactory =
    Arc<dyn Fn(&ModelConfig) -> Arc<dyn GenerationAdapter> + Send + Sync>;

/// Maps provider names to adapter factories.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    factories: HashMap<String, AdapterFactory>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(mut self, provider: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&ModelConfig) -> Arc<dyn GenerationAdapter> + Send + Sync + 'static,
    {
        self.factories.insert(provider.into(), Arc::new(factory));
        self
    }

    pub fn providers(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Builds the adapter for a model; unknown providers get [`UnsupportedAdapter`].
    pub fn resolve(&self, model: &ModelConfig) -> Arc<dyn GenerationAdapter> {
        match self.factories.get(&model.provider) {
            Some(factory) => factory(model),
            None => {
                tracing::warn!(provider = %model.provider, "No adapter registered for provider");
                Arc::new(UnsupportedAdapter::new(&model.provider))
            }
        }
    }
}

impl Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("providers", &self.providers())
            .finish()
    }
}
