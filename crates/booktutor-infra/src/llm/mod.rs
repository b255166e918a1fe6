//! LLM provider implementations.
//!
//! [`create_provider`] builds the configured provider as a [`BoxLlmProvider`].

pub mod openai_compat;

use secrecy::SecretString;

use booktutor_core::llm::box_provider::BoxLlmProvider;
use booktutor_types::config::ProviderConfig;
use booktutor_types::llm::LlmError;

use self::openai_compat::OpenAiCompatibleProvider;
use self::openai_compat::config::defaults_for;

/// Create the provider named in `config`.
///
/// `base_url` in the config overrides the provider's default endpoint. A
/// missing key is only accepted for local servers (`ollama`).
pub fn create_provider(
    config: &ProviderConfig,
    api_key: Option<&str>,
) -> Result<BoxLlmProvider, LlmError> {
    let key = match (api_key, config.name.as_str()) {
        (Some(key), _) => key.to_string(),
        (None, "ollama") => "ollama".to_string(),
        (None, _) => return Err(LlmError::AuthenticationFailed),
    };

    let mut provider_config = defaults_for(&config.name, SecretString::from(key));
    if let Some(base_url) = &config.base_url {
        provider_config.base_url = base_url.clone();
    }
    tracing::debug!(
        provider = %provider_config.provider_name,
        base_url = %provider_config.base_url,
        "Creating LLM provider"
    );

    Ok(BoxLlmProvider::new(OpenAiCompatibleProvider::new(provider_config)))
}
