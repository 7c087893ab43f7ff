//! `OpenAI` provider implementation using the `async-openai` crate.
//!
//! Supports any `OpenAI`-compatible API (`OpenAI`, Azure, local proxies)
//! via the base URL override in [`EngineConfig`].

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessage,
    ChatCompletionRequestAssistantMessageContent, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessage, ChatCompletionRequestSystemMessageContent,
    ChatCompletionRequestToolMessage, ChatCompletionRequestToolMessageContent,
    ChatCompletionRequestUserMessage, ChatCompletionRequestUserMessageContent,
    ChatCompletionStreamOptions, ChatCompletionTool, ChatCompletionToolType,
    CreateChatCompletionRequest, CreateChatCompletionStreamResponse, FunctionCall,
    FinishReason, FunctionObject, ResponseFormat,
};
use async_trait::async_trait;
use futures_util::StreamExt;

use crate::error::LlmError;
use crate::llm::config::EngineConfig;
use crate::llm::delta::{StreamDelta, ToolCallDelta};
use crate::llm::message::{ChatMessage, ChatRequest, ChatResponse, Role, TokenUsage};
use crate::llm::provider::{DeltaStream, LlmProvider};
use crate::llm::tool::ToolCall;

/// `OpenAI`-compatible LLM provider.
///
/// Wraps the `async-openai` client for chat completions. Compatible
/// with any API that follows the `OpenAI` chat completion format.
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
}

impl OpenAiProvider {
    /// Creates a new provider from engine configuration.
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        let mut openai_config = OpenAIConfig::new().with_api_key(&config.api_key);

        if let Some(ref base_url) = config.base_url {
            openai_config = openai_config.with_api_base(base_url);
        }

        Self {
            client: Client::with_config(openai_config),
        }
    }

    /// Converts our message type to the `OpenAI` SDK type.
    fn convert_message(msg: &ChatMessage) -> ChatCompletionRequestMessage {
        match msg.role {
            Role::System => {
                ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                    content: ChatCompletionRequestSystemMessageContent::Text(msg.content.clone()),
                    name: None,
                })
            }
            Role::User => ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                content: ChatCompletionRequestUserMessageContent::Text(msg.content.clone()),
                name: None,
            }),
            Role::Assistant => {
                let tool_calls = if msg.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        msg.tool_calls
                            .iter()
                            .map(|tc| ChatCompletionMessageToolCall {
                                id: tc.id.clone(),
                                r#type: ChatCompletionToolType::Function,
                                function: FunctionCall {
                                    name: tc.name.clone(),
                                    arguments: tc.arguments.to_string(),
                                },
                            })
                            .collect(),
                    )
                };

                let content = if msg.content.is_empty() {
                    None
                } else {
                    Some(ChatCompletionRequestAssistantMessageContent::Text(
                        msg.content.clone(),
                    ))
                };

                #[allow(deprecated)]
                ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
                    content,
                    name: None,
                    tool_calls,
                    refusal: None,
                    audio: None,
                    function_call: None,
                })
            }
            Role::Tool => ChatCompletionRequestMessage::Tool(ChatCompletionRequestToolMessage {
                content: ChatCompletionRequestToolMessageContent::Text(msg.content.clone()),
                tool_call_id: msg.tool_call_id.clone().unwrap_or_default(),
            }),
        }
    }

    /// Builds an `OpenAI` chat completion request from our generic request.
    fn build_request(request: &ChatRequest) -> CreateChatCompletionRequest {
        let messages: Vec<_> = request.messages.iter().map(Self::convert_message).collect();

        let response_format = if request.json_mode {
            Some(ResponseFormat::JsonObject)
        } else {
            None
        };

        let tools = if request.tools.is_empty() {
            None
        } else {
            Some(
                request
                    .tools
                    .iter()
                    .map(|td| ChatCompletionTool {
                        r#type: ChatCompletionToolType::Function,
                        function: FunctionObject {
                            name: td.name.clone(),
                            description: Some(td.description.clone()),
                            parameters: Some(td.parameters.clone()),
                            strict: None,
                        },
                    })
                    .collect(),
            )
        };

        let (stream, stream_options) = if request.stream {
            (
                Some(true),
                Some(ChatCompletionStreamOptions {
                    include_usage: true,
                }),
            )
        } else {
            (None, None)
        };

        CreateChatCompletionRequest {
            model: request.model.clone(),
            messages,
            temperature: request.temperature,
            max_completion_tokens: request.max_tokens,
            stream,
            stream_options,
            response_format,
            tools,
            ..Default::default()
        }
    }

    /// Expands one SDK stream chunk into deltas.
    fn chunk_deltas(chunk: CreateChatCompletionStreamResponse) -> Vec<StreamDelta> {
        let mut deltas = Vec::new();

        if let Some(choice) = chunk.choices.into_iter().next() {
            if let Some(text) = choice.delta.content
                && !text.is_empty()
            {
                deltas.push(StreamDelta::Text(text));
            }
            for call in choice.delta.tool_calls.unwrap_or_default() {
                let (name, arguments) = call
                    .function
                    .map_or((None, None), |f| (f.name, f.arguments));
                deltas.push(StreamDelta::ToolCall(ToolCallDelta {
                    index: call.index,
                    id: call.id,
                    name,
                    arguments,
                }));
            }
            if let Some(reason) = choice.finish_reason {
                deltas.push(StreamDelta::Finish(finish_label(&reason)));
            }
        }

        if let Some(u) = chunk.usage {
            deltas.push(StreamDelta::Usage(TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }));
        }

        deltas
    }
}

/// Wire label of a finish reason (`tool_calls`, `content_filter`, ...).
fn finish_label(reason: &FinishReason) -> String {
    match serde_json::to_value(reason) {
        Ok(serde_json::Value::String(label)) => label,
        _ => format!("{reason:?}").to_lowercase(),
    }
}

/// Maps SDK errors onto our taxonomy, separating transport from API failures.
fn map_openai_error(e: OpenAIError) -> LlmError {
    match e {
        OpenAIError::Reqwest(err) => LlmError::Connection {
            message: err.to_string(),
        },
        OpenAIError::StreamError(message) => match http_status(&message) {
            Some(status) => LlmError::ApiRequest {
                message,
                status: Some(status),
            },
            None => LlmError::Stream { message },
        },
        OpenAIError::ApiError(api) => LlmError::ApiRequest {
            message: api.message,
            status: None,
        },
        other => LlmError::ApiRequest {
            message: other.to_string(),
            status: None,
        },
    }
}

/// HTTP status from an event-source rejection such as
/// `"Invalid status code: 401 Unauthorized"`.
fn http_status(message: &str) -> Option<u16> {
    let rest = message.strip_prefix("Invalid status code: ")?;
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("client", &"<async-openai::Client>")
            .finish()
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let mut request = request.clone();
        request.stream = false;
        let openai_request = Self::build_request(&request);

        let response = self
            .client
            .chat()
            .create(openai_request)
            .await
            .map_err(map_openai_error)?;

        let choice = response.choices.first();

        let content = choice
            .and_then(|c| c.message.content.as_ref())
            .cloned()
            .unwrap_or_default();

        let tool_calls = choice
            .and_then(|c| c.message.tool_calls.as_ref())
            .map(|tcs| {
                tcs.iter()
                    .map(|tc| ToolCall {
                        id: tc.id.clone(),
                        name: tc.function.name.clone(),
                        arguments: serde_json::from_str(&tc.function.arguments).unwrap_or_else(
                            |_| serde_json::Value::String(tc.function.arguments.clone()),
                        ),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let finish_reason = choice
            .and_then(|c| c.finish_reason.as_ref())
            .map(finish_label);

        let usage = response
            .usage
            .map_or_else(TokenUsage::default, |u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            });

        Ok(ChatResponse {
            content,
            usage,
            tool_calls,
            finish_reason,
        })
    }

    async fn chat_stream(&self, request: &ChatRequest) -> Result<DeltaStream, LlmError> {
        let mut stream_request = request.clone();
        stream_request.stream = true;
        let openai_request = Self::build_request(&stream_request);

        let stream = self
            .client
            .chat()
            .create_stream(openai_request)
            .await
            .map_err(map_openai_error)?;

        let mut mapped: DeltaStream = Box::pin(stream.flat_map(
            |result: Result<CreateChatCompletionStreamResponse, OpenAIError>| {
                let items: Vec<Result<StreamDelta, LlmError>> = match result {
                    Ok(chunk) => Self::chunk_deltas(chunk).into_iter().map(Ok).collect(),
                    Err(e) => vec![Err(map_openai_error(e))],
                };
                futures_util::stream::iter(items)
            },
        ));

        // The SDK opens the connection lazily: HTTP and connect failures
        // arrive as the first item, so they are surfaced here as open errors.
        match mapped.next().await {
            Some(Err(e)) => Err(e),
            Some(Ok(first)) => Ok(Box::pin(
                futures_util::stream::iter([Ok(first)]).chain(mapped),
            )),
            None => Ok(Box::pin(futures_util::stream::empty())),
        }
    }
}
