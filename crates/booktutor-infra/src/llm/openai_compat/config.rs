//! Configuration and per-provider defaults for OpenAI-compatible endpoints.
//!
//! Every provider that speaks the chat completions protocol with function
//! calling gets a factory returning an [`OpenAiCompatConfig`] with its base
//! URL and limits.

use secrecy::SecretString;

use booktutor_types::llm::ProviderCapabilities;

/// Configuration for an [`super::OpenAiCompatibleProvider`].
pub struct OpenAiCompatConfig {
    /// Human-readable provider name (e.g., "openai", "mistral").
    pub provider_name: String,
    /// Base URL of the API, without the `/chat/completions` suffix.
    pub base_url: String,
    pub api_key: SecretString,
    pub capabilities: ProviderCapabilities,
}

/// OpenAI: `https://api.openai.com/v1`, 128K context, 16K output.
pub fn openai_defaults(api_key: SecretString) -> OpenAiCompatConfig {
    OpenAiCompatConfig {
        provider_name: "openai".into(),
        base_url: "https://api.openai.com/v1".into(),
        api_key,
        capabilities: ProviderCapabilities {
            tool_calling: true,
            max_context_tokens: 128_000,
            max_output_tokens: 16_384,
        },
    }
}

/// Mistral AI: `https://api.mistral.ai/v1`, 128K context, 32K output.
pub fn mistral_defaults(api_key: SecretString) -> OpenAiCompatConfig {
    OpenAiCompatConfig {
        provider_name: "mistral".into(),
        base_url: "https://api.mistral.ai/v1".into(),
        api_key,
        capabilities: ProviderCapabilities {
            tool_calling: true,
            max_context_tokens: 128_000,
            max_output_tokens: 32_768,
        },
    }
}

/// Google Gemini (OpenAI-compatible beta endpoint), 1M context, 64K output.
pub fn gemini_defaults(api_key: SecretString) -> OpenAiCompatConfig {
    OpenAiCompatConfig {
        provider_name: "gemini".into(),
        base_url: "https://generativelanguage.googleapis.com/v1beta/openai".into(),
        api_key,
        capabilities: ProviderCapabilities {
            tool_calling: true,
            max_context_tokens: 1_000_000,
            max_output_tokens: 65_536,
        },
    }
}

/// A local Ollama server: `http://localhost:11434/v1`.
///
/// Ollama ignores the key; context size depends on the pulled model.
pub fn ollama_defaults(api_key: SecretString) -> OpenAiCompatConfig {
    OpenAiCompatConfig {
        provider_name: "ollama".into(),
        base_url: "http://localhost:11434/v1".into(),
        api_key,
        capabilities: ProviderCapabilities {
            tool_calling: true,
            max_context_tokens: 32_768,
            max_output_tokens: 8_192,
        },
    }
}

/// Defaults for a provider name; unknown names get OpenAI's.
pub fn defaults_for(name: &str, api_key: SecretString) -> OpenAiCompatConfig {
    match name {
        "mistral" => mistral_defaults(api_key),
        "gemini" => gemini_defaults(api_key),
        "ollama" => ollama_defaults(api_key),
        _ => openai_defaults(api_key),
    }
}
