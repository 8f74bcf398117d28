//! LLM provider implementations.
//!
//! Contains the Anthropic implementation of the [`LlmProvider`] trait defined
//! in `parley-core`, and a factory ([`create_provider`]) that picks the
//! provider to use from configuration and the resolved API key.

pub mod anthropic;

use secrecy::SecretString;
use tracing::warn;

use parley_core::llm::box_provider::BoxLlmProvider;
use parley_core::llm::provider::LlmProvider;
use parley_types::config::ModelConfig;
use parley_types::llm::{CompletionRequest, CompletionResponse, LlmError, Message};

use self::anthropic::AnthropicProvider;

/// Stand-in used when no API key is configured.
///
/// Every call fails with [`LlmError::AuthenticationFailed`], so the
/// orchestrator answers with the authentication apology while FAQ matches,
/// history and the rest of the service keep working.
pub struct UnconfiguredProvider;

impl LlmProvider for UnconfiguredProvider {
    fn name(&self) -> &str {
        "unconfigured"
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        Err(LlmError::AuthenticationFailed)
    }
}

/// Create a [`BoxLlmProvider`] from the model configuration.
///
/// A missing key is not fatal: the service starts with [`UnconfiguredProvider`].
pub fn create_provider(
    config: &ModelConfig,
    api_key: Option<SecretString>,
) -> Result<BoxLlmProvider, LlmError> {
    let Some(key) = api_key else {
        warn!("No Anthropic API key configured; model fallback is disabled");
        return Ok(BoxLlmProvider::new(UnconfiguredProvider));
    };

    let mut provider = AnthropicProvider::new(key, config.timeout())?;
    if let Some(base_url) = &config.base_url {
        provider = provider.with_base_url(base_url.clone());
    }
    Ok(BoxLlmProvider::new(provider))
}

/// Test provider connectivity by sending a minimal completion request.
pub async fn test_provider_connection(
    provider: &BoxLlmProvider,
    config: &ModelConfig,
) -> Result<(), LlmError> {
    let request = CompletionRequest {
        model: config.model.clone(),
        messages: vec![Message::user("Hello")],
        system: None,
        max_tokens: 10,
        temperature: Some(0.0),
    };
    provider.complete(&request).await?;
    Ok(())
}
