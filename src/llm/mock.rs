//! Scripted provider for tests.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use futures_util::StreamExt;

use crate::error::LlmError;
use crate::llm::delta::StreamDelta;
use crate::llm::message::{ChatRequest, ChatResponse, TokenUsage};
use crate::llm::provider::{DeltaStream, LlmProvider};

/// Failure kinds a scripted call can produce.
#[derive(Debug, Clone, Copy)]
pub(crate) enum MockFailure {
    Connection,
    Api,
}

impl MockFailure {
    fn into_error(self) -> LlmError {
        match self {
            Self::Connection => LlmError::Connection {
                message: "connection refused".to_string(),
            },
            Self::Api => LlmError::ApiRequest {
                message: "server error".to_string(),
                status: Some(500),
            },
        }
    }
}

/// Items a scripted stream yields. A stalled stream never ends after them.
struct ScriptedStream {
    items: Vec<Result<StreamDelta, MockFailure>>,
    stalls: bool,
}

/// Provider that replays scripted `chat` and `chat_stream` results in order
/// and records every request it receives.
#[derive(Default)]
pub(crate) struct MockProvider {
    chat_replies: Mutex<VecDeque<Result<String, MockFailure>>>,
    stream_replies: Mutex<VecDeque<Result<ScriptedStream, MockFailure>>>,
    chat_requests: Mutex<Vec<ChatRequest>>,
    stream_requests: Mutex<Vec<ChatRequest>>,
}

impl MockProvider {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_chat(self, reply: &str) -> Self {
        lock(&self.chat_replies).push_back(Ok(reply.to_string()));
        self
    }

    pub(crate) fn with_chat_error(self, failure: MockFailure) -> Self {
        lock(&self.chat_replies).push_back(Err(failure));
        self
    }

    pub(crate) fn with_stream(self, deltas: Vec<StreamDelta>) -> Self {
        self.push_stream(deltas.into_iter().map(Ok).collect(), false)
    }

    /// A stream that yields `deltas` and then stays pending.
    pub(crate) fn with_stalled_stream(self, deltas: Vec<StreamDelta>) -> Self {
        self.push_stream(deltas.into_iter().map(Ok).collect(), true)
    }

    fn push_stream(self, items: Vec<Result<StreamDelta, MockFailure>>, stalls: bool) -> Self {
        lock(&self.stream_replies).push_back(Ok(ScriptedStream { items, stalls }));
        self
    }

    pub(crate) fn with_text_stream(self, fragments: &[&str]) -> Self {
        let mut deltas: Vec<StreamDelta> = fragments.iter().map(|f| StreamDelta::text(*f)).collect();
        deltas.push(StreamDelta::Finish("stop".to_string()));
        deltas.push(StreamDelta::Usage(TokenUsage {
            prompt_tokens: 10,
            completion_tokens: 3,
            total_tokens: 13,
        }));
        self.with_stream(deltas)
    }

    /// A stream that yields `before` and then breaks.
    pub(crate) fn with_broken_stream(self, before: Vec<StreamDelta>, failure: MockFailure) -> Self {
        let mut items: Vec<Result<StreamDelta, MockFailure>> = before.into_iter().map(Ok).collect();
        items.push(Err(failure));
        self.push_stream(items, false)
    }

    pub(crate) fn with_stream_error(self, failure: MockFailure) -> Self {
        lock(&self.stream_replies).push_back(Err(failure));
        self
    }

    pub(crate) fn chat_requests(&self) -> Vec<ChatRequest> {
        lock(&self.chat_requests).clone()
    }

    pub(crate) fn stream_requests(&self) -> Vec<ChatRequest> {
        lock(&self.stream_requests).clone()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        lock(&self.chat_requests).push(request.clone());
        let next = lock(&self.chat_replies).pop_front();
        match next {
            Some(Ok(content)) => Ok(ChatResponse {
                content,
                usage: TokenUsage::default(),
                tool_calls: Vec::new(),
                finish_reason: Some("stop".to_string()),
            }),
            Some(Err(failure)) => Err(failure.into_error()),
            None => Err(LlmError::ApiRequest {
                message: "no scripted chat reply".to_string(),
                status: None,
            }),
        }
    }

    async fn chat_stream(&self, request: &ChatRequest) -> Result<DeltaStream, LlmError> {
        lock(&self.stream_requests).push(request.clone());
        let next = lock(&self.stream_replies).pop_front();
        match next {
            Some(Ok(script)) => {
                let items: Vec<Result<StreamDelta, LlmError>> = script
                    .items
                    .into_iter()
                    .map(|i| i.map_err(|f| match f {
                        MockFailure::Connection => LlmError::Stream {
                            message: "connection reset".to_string(),
                        },
                        MockFailure::Api => f.into_error(),
                    }))
                    .collect();
                let stream = futures_util::stream::iter(items);
                if script.stalls {
                    Ok(Box::pin(stream.chain(futures_util::stream::pending())))
                } else {
                    Ok(Box::pin(stream))
                }
            }
            Some(Err(failure)) => Err(failure.into_error()),
            None => Err(LlmError::ApiRequest {
                message: "no scripted stream".to_string(),
                status: None,
            }),
        }
    }
}
