//! Provider call boundary and model catalog.
//!
//! The orchestration core never talks HTTP itself. Anything that can stream
//! tokens for a chat request plugs in through the [`Provider`] trait; the
//! [`ProviderRegistry`] maps model ids to their [`ModelConfig`] and owning
//! provider instance.

use crate::types::message::Message;
use crate::{BoxStream, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Per-request generation knobs passed through to the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f64,
    pub max_tokens: Option<u32>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: None,
        }
    }
}

/// Final non-streaming provider result.
#[derive(Debug, Clone, Default)]
pub struct ProviderResponse {
    pub content: String,
    /// Provider-computed overall probability, when available.
    pub probability: Option<f64>,
    /// Per-token log probabilities, when the provider exposes them.
    pub logprobs: Option<Vec<f64>>,
}

/// One unit of a provider's streaming output.
#[derive(Debug, Clone)]
pub enum ProviderEvent {
    Token { token: String },
    Complete { response: ProviderResponse },
}

/// An opaque generation backend. Implementations format requests for their
/// wire protocol; the core only consumes this uniform shape.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    /// Streaming call: token events followed by one `Complete`.
    async fn stream_chat(
        &self,
        messages: &[Message],
        model: &str,
        options: &GenerationOptions,
    ) -> Result<BoxStream<'static, ProviderEvent>>;

    /// Non-streaming call; used as the fallback path when streaming fails.
    async fn chat(
        &self,
        messages: &[Message],
        model: &str,
        options: &GenerationOptions,
    ) -> Result<ProviderResponse>;
}

/// Static description of one selectable model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model identifier as the provider expects it (e.g. `gpt-4o`).
    pub id: String,
    /// Owning provider name (e.g. `openai`).
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ModelConfig {
    pub fn new(id: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            provider: provider.into(),
            max_tokens: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Registered provider instances plus the model catalog.
///
/// Built once at the composition root and shared via `Arc`.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
    models: HashMap<String, ModelConfig>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_provider(&mut self, provider: Arc<dyn Provider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn register_model(&mut self, config: ModelConfig) {
        self.models.insert(config.id.clone(), config);
    }

    /// Resolve a model id to its config and owning provider. `None` when the
    /// model is unknown or its provider was never registered.
    pub fn resolve(&self, model: &str) -> Option<(&ModelConfig, Arc<dyn Provider>)> {
        let config = self.models.get(model)?;
        let provider = self.providers.get(&config.provider)?;
        Some((config, Arc::clone(provider)))
    }

    pub fn models(&self) -> impl Iterator<Item = &ModelConfig> {
        self.models.values()
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    struct NullProvider;

    #[async_trait]
    impl Provider for NullProvider {
        fn name(&self) -> &str {
            "null"
        }

        async fn stream_chat(
            &self,
            _messages: &[Message],
            _model: &str,
            _options: &GenerationOptions,
        ) -> Result<BoxStream<'static, ProviderEvent>> {
            Ok(Box::pin(stream::empty()))
        }

        async fn chat(
            &self,
            _messages: &[Message],
            _model: &str,
            _options: &GenerationOptions,
        ) -> Result<ProviderResponse> {
            Ok(ProviderResponse::default())
        }
    }

    #[test]
    fn test_resolve_known_model() {
        let mut registry = ProviderRegistry::new();
        registry.register_provider(Arc::new(NullProvider));
        registry.register_model(ModelConfig::new("null-mini", "null").with_max_tokens(2048));

        let (config, provider) = registry.resolve("null-mini").unwrap();
        assert_eq!(config.provider, "null");
        assert_eq!(config.max_tokens, Some(2048));
        assert_eq!(provider.name(), "null");
    }

    #[test]
    fn test_resolve_unknown_model_or_provider() {
        let mut registry = ProviderRegistry::new();
        assert!(registry.resolve("ghost").is_none());

        // Model registered but its provider missing.
        registry.register_model(ModelConfig::new("orphan", "absent"));
        assert!(registry.resolve("orphan").is_none());
    }
}
