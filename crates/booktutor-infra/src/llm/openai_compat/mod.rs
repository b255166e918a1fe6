//! OpenAI-compatible LLM provider with function calling.
//!
//! A single [`OpenAiCompatibleProvider`] serves OpenAI, Mistral, Gemini and
//! local Ollama servers. Requests and responses go through [`async_openai`]'s
//! chat completion types.
//!
//! The API key is wrapped in [`secrecy::SecretString`] until the client is
//! built.

pub mod config;

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionMessageToolCall, ChatCompletionMessageToolCalls,
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestToolMessageArgs,
    ChatCompletionRequestUserMessageArgs, ChatCompletionTool, ChatCompletionTools,
    CreateChatCompletionRequest, CreateChatCompletionRequestArgs, CreateChatCompletionResponse,
    FinishReason, FunctionCall, FunctionObjectArgs,
};
use secrecy::ExposeSecret;

use booktutor_core::llm::provider::LlmProvider;
use booktutor_types::llm::{
    CompletionRequest, CompletionResponse, LlmError, Message, MessageRole, ProviderCapabilities,
    StopReason, ToolCall, ToolDefinition, Usage,
};

use self::config::OpenAiCompatConfig;

/// Unified provider for any OpenAI-compatible chat completions API.
///
/// Does not derive `Debug`, so the key inside the client cannot end up in logs.
pub struct OpenAiCompatibleProvider {
    client: Client<OpenAIConfig>,
    provider_name: String,
    capabilities: ProviderCapabilities,
}

fn invalid(err: OpenAIError) -> LlmError {
    LlmError::InvalidRequest(err.to_string())
}

impl OpenAiCompatibleProvider {
    /// Create a provider. The per-call timeout is enforced by the engine's
    /// retry policy.
    pub fn new(config: OpenAiCompatConfig) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(config.api_key.expose_secret())
            .with_api_base(&config.base_url);
        Self {
            client: Client::with_config(openai_config),
            provider_name: config.provider_name,
            capabilities: config.capabilities,
        }
    }

    /// Convert a [`CompletionRequest`] into a chat completion request.
    fn build_request(
        &self,
        request: &CompletionRequest,
    ) -> Result<CreateChatCompletionRequest, LlmError> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system {
            messages.push(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system.as_str())
                    .build()
                    .map_err(invalid)?
                    .into(),
            );
        }
        for message in &request.messages {
            messages.push(wire_message(message)?);
        }

        let tools = request
            .tools
            .iter()
            .map(wire_tool)
            .collect::<Result<Vec<_>, _>>()?;

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(request.model.as_str())
            .messages(messages)
            .max_completion_tokens(request.max_tokens);
        if let Some(temperature) = request.temperature {
            args.temperature(temperature as f32);
        }
        if !tools.is_empty() {
            args.tools(tools);
        }
        args.build().map_err(invalid)
    }
}

fn wire_tool(tool: &ToolDefinition) -> Result<ChatCompletionTools, LlmError> {
    let function = FunctionObjectArgs::default()
        .name(tool.name.as_str())
        .description(tool.description.as_str())
        .parameters(tool.parameters.clone())
        .build()
        .map_err(invalid)?;
    let tool = ChatCompletionTool { function };
    Ok(ChatCompletionTools::Function(tool))
}

fn wire_message(message: &Message) -> Result<ChatCompletionRequestMessage, LlmError> {
    let content = message.content.as_str();
    let wire = match message.role {
        MessageRole::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(content)
            .build()
            .map_err(invalid)?
            .into(),
        MessageRole::User => ChatCompletionRequestUserMessageArgs::default()
            .content(content)
            .build()
            .map_err(invalid)?
            .into(),
        MessageRole::Assistant => {
            let mut args = ChatCompletionRequestAssistantMessageArgs::default();
            if !content.is_empty() || message.tool_calls.is_empty() {
                args.content(content);
            }
            if !message.tool_calls.is_empty() {
                let calls = message
                    .tool_calls
                    .iter()
                    .map(|call| {
                        ChatCompletionMessageToolCalls::Function(ChatCompletionMessageToolCall {
                            id: call.id.clone(),
                            function: FunctionCall {
                                name: call.name.clone(),
                                arguments: call.arguments.clone(),
                            },
                        })
                    })
                    .collect::<Vec<_>>();
                args.tool_calls(calls);
            }
            args.build().map_err(invalid)?.into()
        }
        MessageRole::Tool => ChatCompletionRequestToolMessageArgs::default()
            .content(content)
            .tool_call_id(message.tool_call_id.clone().unwrap_or_default())
            .build()
            .map_err(invalid)?
            .into(),
    };
    Ok(wire)
}

/// Map a chat completion response onto the provider-neutral [`CompletionResponse`].
fn into_completion(response: CreateChatCompletionResponse) -> Result<CompletionResponse, LlmError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::MalformedResponse("response has no choices".to_string()))?;

    let tool_calls: Vec<ToolCall> = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .filter_map(|call| match call {
            ChatCompletionMessageToolCalls::Function(call) => Some(ToolCall {
                id: call.id,
                name: call.function.name,
                arguments: call.function.arguments,
            }),
            _ => None,
        })
        .collect();

    let stop_reason = match choice.finish_reason {
        Some(FinishReason::ToolCalls | FinishReason::FunctionCall) => StopReason::ToolUse,
        Some(FinishReason::Length) => StopReason::MaxTokens,
        Some(FinishReason::ContentFilter) => StopReason::StopSequence,
        _ if !tool_calls.is_empty() => StopReason::ToolUse,
        _ => StopReason::EndTurn,
    };

    let usage = response
        .usage
        .map(|u| Usage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        })
        .unwrap_or_default();

    Ok(CompletionResponse {
        id: response.id,
        content: choice.message.content.unwrap_or_default(),
        tool_calls,
        model: response.model,
        stop_reason,
        usage,
    })
}

/// Map an [`OpenAIError`] onto an [`LlmError`].
fn map_openai_error(err: OpenAIError) -> LlmError {
    match &err {
        OpenAIError::ApiError(api) => {
            let code = api.code.as_deref().unwrap_or_default();
            let kind = api.r#type.as_deref().unwrap_or_default();
            if matches!(code, "invalid_api_key" | "authentication_error")
                || kind == "authentication_error"
                || api.message.contains("Incorrect API key")
            {
                LlmError::AuthenticationFailed
            } else if code == "rate_limit_exceeded" || kind == "rate_limit_error" {
                LlmError::RateLimited { retry_after_ms: None }
            } else if code == "context_length_exceeded"
                || api.message.contains("maximum context length")
            {
                LlmError::ContextLengthExceeded(api.message.clone())
            } else if code == "server_error" || kind == "overloaded_error" {
                LlmError::Overloaded(api.message.clone())
            } else if kind == "invalid_request_error" {
                LlmError::InvalidRequest(api.message.clone())
            } else {
                LlmError::Provider {
                    message: err.to_string(),
                }
            }
        }
        OpenAIError::Reqwest(http) => match http.status().map(|s| s.as_u16()) {
            Some(401 | 403) => LlmError::AuthenticationFailed,
            Some(429) => LlmError::RateLimited { retry_after_ms: None },
            Some(503 | 529) => LlmError::Overloaded(err.to_string()),
            Some(400..=499) => LlmError::InvalidRequest(err.to_string()),
            _ => LlmError::Provider {
                message: err.to_string(),
            },
        },
        OpenAIError::JSONDeserialize(_, content) => {
            LlmError::Deserialization(format!("failed to parse response: {content}"))
        }
        OpenAIError::InvalidArgument(message) => LlmError::InvalidRequest(message.clone()),
        _ => LlmError::Provider {
            message: err.to_string(),
        },
    }
}

impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.provider_name
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = self.build_request(request)?;
        let response = self
            .client
            .chat()
            .create(body)
            .await
            .map_err(map_openai_error)?;

        let completion = into_completion(response)?;
        tracing::debug!(
            provider = %self.provider_name,
            model = %completion.model,
            tool_calls = completion.tool_calls.len(),
            input_tokens = completion.usage.input_tokens,
            output_tokens = completion.usage.output_tokens,
            "Completion received"
        );
        Ok(completion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_openai::error::ApiError;
    use secrecy::SecretString;

    fn provider() -> OpenAiCompatibleProvider {
        OpenAiCompatibleProvider::new(config::openai_defaults(SecretString::from(
            "sk-test".to_string(),
        )))
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![
                Message::user("What is ownership?"),
                Message::assistant_tool_calls(
                    "",
                    vec![ToolCall {
                        id: "call_1".to_string(),
                        name: "get_table_of_contents".to_string(),
                        arguments: "{}".to_string(),
                    }],
                ),
                Message::tool_result("call_1", r#"{"ok":true}"#),
            ],
            system: Some("You are a tutor.".to_string()),
            max_tokens: 256,
            temperature: None,
            tools: vec![ToolDefinition {
                name: "get_table_of_contents".to_string(),
                description: "List chapters".to_string(),
                parameters: serde_json::json!({"type": "object", "properties": {}}),
            }],
        }
    }

    fn api_error(message: &str, kind: Option<&str>, code: Option<&str>) -> OpenAIError {
        OpenAIError::ApiError(ApiError {
            message: message.to_string(),
            r#type: kind.map(str::to_string),
            param: None,
            code: code.map(str::to_string),
        })
    }

    #[test]
    fn test_build_request_wire_shape() {
        let request = provider().build_request(&request()).unwrap();
        assert_eq!(request.messages.len(), 4);
        assert_eq!(request.max_completion_tokens, Some(256));
        assert!(request.temperature.is_none());

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "What is ownership?");
        assert_eq!(json["messages"][2]["tool_calls"][0]["type"], "function");
        assert_eq!(
            json["messages"][2]["tool_calls"][0]["function"]["name"],
            "get_table_of_contents"
        );
        assert_eq!(json["messages"][3]["role"], "tool");
        assert_eq!(json["messages"][3]["tool_call_id"], "call_1");
        assert_eq!(json["tools"][0]["function"]["name"], "get_table_of_contents");
    }

    #[test]
    fn test_no_tools_leaves_tools_unset() {
        let mut plain = request();
        plain.tools.clear();
        plain.temperature = Some(0.2);
        let request = provider().build_request(&plain).unwrap();
        assert!(request.tools.is_none());
        assert!(request.temperature.is_some());
    }

    #[test]
    fn test_parse_tool_call_response() {
        let body = r#"{
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 1700000000,
            "model": "gpt-4o-mini",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": {"name": "get_chapter_summary", "arguments": "{\"chapter_number\":\"1.\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 120, "completion_tokens": 12, "total_tokens": 132}
        }"#;
        let response = into_completion(serde_json::from_str(body).unwrap()).unwrap();

        assert!(response.has_tool_calls());
        assert_eq!(response.content, "");
        assert_eq!(response.stop_reason, StopReason::ToolUse);
        assert_eq!(response.tool_calls[0].name, "get_chapter_summary");
        assert_eq!(response.usage.input_tokens, 120);
    }

    #[test]
    fn test_parse_text_response() {
        let body = r#"{
            "id": "chatcmpl-2",
            "object": "chat.completion",
            "created": 1700000000,
            "model": "gpt-4o-mini",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Hello!"},
                "finish_reason": "stop"
            }]
        }"#;
        let response = into_completion(serde_json::from_str(body).unwrap()).unwrap();
        assert_eq!(response.content, "Hello!");
        assert_eq!(response.stop_reason, StopReason::EndTurn);
        assert_eq!(response.usage.output_tokens, 0);
    }

    #[test]
    fn test_empty_choices_is_malformed() {
        let body = r#"{"id": "x", "object": "chat.completion", "created": 0, "model": "m", "choices": []}"#;
        let err = into_completion(serde_json::from_str(body).unwrap()).unwrap_err();
        assert!(matches!(err, LlmError::MalformedResponse(_)));
        assert!(err.is_transient());
    }

    #[test]
    fn test_api_error_mapping() {
        assert!(matches!(
            map_openai_error(api_error("Incorrect API key provided", None, Some("invalid_api_key"))),
            LlmError::AuthenticationFailed
        ));
        assert!(matches!(
            map_openai_error(api_error("slow down", Some("rate_limit_error"), None)),
            LlmError::RateLimited { retry_after_ms: None }
        ));
        let context = map_openai_error(api_error("too long", None, Some("context_length_exceeded")));
        assert!(matches!(context, LlmError::ContextLengthExceeded(_)));
        assert!(!context.is_transient());

        let bad = map_openai_error(api_error("bad field", Some("invalid_request_error"), None));
        assert!(matches!(bad, LlmError::InvalidRequest(_)));
        assert!(!bad.is_transient());

        assert!(map_openai_error(api_error("oops", Some("server_error"), None)).is_transient());
    }

    #[test]
    fn test_invalid_argument_is_not_retried() {
        let err = map_openai_error(OpenAIError::InvalidArgument("bad arg".to_string()));
        assert!(matches!(err, LlmError::InvalidRequest(_)));
        assert!(!err.is_transient());
    }
}
