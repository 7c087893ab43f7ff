//! Streaming completion driver.
//!
//! Opens a streamed model call, forwards text fragments to the progress
//! sink as they arrive, reassembles tool calls, and always comes back with
//! an assistant message. Provider failures become apology messages.

use std::sync::Arc;
use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use backoff::future::retry_notify;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::events::{ChatEvent, ProgressSink};
use super::stream::DeltaAccumulator;
use crate::core::VsMetadata;
use crate::error::LlmError;
use crate::llm::message::{
    ChatMessage, ChatRequest, TokenUsage, assistant_message, assistant_tool_calls_message,
};
use crate::llm::provider::{DeltaStream, LlmProvider};

/// Returned when the model produced neither text nor tool calls.
pub const FALLBACK_MESSAGE: &str = "I'm sorry, I was unable to produce a response.";
/// Returned when the provider could not be reached.
pub const TRANSPORT_APOLOGY: &str =
    "I'm sorry, there was a problem connecting to the language-model API. Please try again.";
/// Returned for any other provider failure.
pub const COMPLETION_APOLOGY: &str =
    "I'm sorry, there was a problem generating a completion. Please try again.";

/// How a completion ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    /// Plain text answer.
    Answered,
    /// The model asked for tools.
    ToolCalls,
    /// Nothing came back; the fallback message was used.
    Empty,
    /// Tools were offered but the model wrote the call as text.
    FunctionCallingUnsupported,
    /// The provider could not be reached.
    TransportFailure,
    /// The provider failed some other way.
    Failed,
    /// The turn was cancelled mid-stream.
    Cancelled,
}

impl CompletionStatus {
    /// Stable label for logs and JSON output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Answered => "answered",
            Self::ToolCalls => "tool_calls",
            Self::Empty => "empty",
            Self::FunctionCallingUnsupported => "function_calling_unsupported",
            Self::TransportFailure => "transport_failure",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Result of one driven completion.
#[derive(Debug, Clone)]
pub struct CompletionOutcome {
    /// Final assistant message.
    pub message: ChatMessage,
    /// How the completion ended.
    pub status: CompletionStatus,
}

/// Per-turn plumbing shared by every completion in the turn.
#[derive(Debug, Clone, Default)]
pub struct TurnIo {
    /// Event destination.
    pub sink: ProgressSink,
    /// Turn-scoped cancellation.
    pub cancel: CancellationToken,
    /// Running token usage across the turn.
    pub usage: TokenUsage,
}

impl TurnIo {
    /// Creates turn plumbing.
    #[must_use]
    pub fn new(sink: ProgressSink, cancel: CancellationToken) -> Self {
        Self {
            sink,
            cancel,
            usage: TokenUsage::default(),
        }
    }

    /// Emits an event unless the turn was cancelled.
    pub fn emit(&self, event: ChatEvent) {
        if !self.cancel.is_cancelled() {
            self.sink.emit(event);
        }
    }
}

/// Drives streamed completions against one provider.
pub struct CompletionDriver {
    provider: Arc<dyn LlmProvider>,
    max_retries: u32,
    retry_backoff: Duration,
}

impl CompletionDriver {
    /// Creates a driver.
    #[must_use]
    pub fn new(provider: Arc<dyn LlmProvider>, max_retries: u32, retry_backoff: Duration) -> Self {
        Self {
            provider,
            max_retries,
            retry_backoff,
        }
    }

    /// Runs one streamed completion.
    ///
    /// When `grounding` is set it is emitted before the call starts. Text is
    /// emitted as it arrives; synthesized messages (fallback, diagnostic,
    /// apology) are emitted whole.
    pub async fn complete(
        &self,
        request: &ChatRequest,
        grounding: Option<&VsMetadata>,
        io: &mut TurnIo,
    ) -> CompletionOutcome {
        if let Some(meta) = grounding {
            io.emit(ChatEvent::Grounding(meta.clone()));
        }

        let mut stream = match self.open_stream(request, &io.cancel).await {
            Ok(Some(s)) => s,
            Ok(None) => return cancelled(""),
            Err(e) => return self.failure(&e, io),
        };

        let mut acc = DeltaAccumulator::new();
        let mut was_cancelled = false;
        loop {
            let next = tokio::select! {
                biased;
                () = io.cancel.cancelled() => {
                    was_cancelled = true;
                    break;
                }
                item = stream.next() => item,
            };
            match next {
                None => break,
                Some(Ok(delta)) => {
                    if let Some(fragment) = acc.push(delta) {
                        io.emit(ChatEvent::Token(fragment));
                    }
                }
                Some(Err(e)) => return self.failure(&e, io),
            }
        }

        let out = acc.finalize();
        if let Some(u) = out.usage {
            io.usage.accumulate(u);
            io.emit(ChatEvent::Usage(io.usage));
        }
        if was_cancelled {
            debug!(chars = out.text.len(), "completion cancelled");
            return cancelled(&out.text);
        }

        debug!(
            chars = out.text.len(),
            tool_calls = out.tool_calls.len(),
            finish_reason = out.finish_reason.as_deref().unwrap_or("none"),
            "completion stream finished"
        );

        if !out.tool_calls.is_empty() {
            return CompletionOutcome {
                message: assistant_tool_calls_message(&out.text, out.tool_calls),
                status: CompletionStatus::ToolCalls,
            };
        }
        if !request.tools.is_empty() && looks_like_json_call(&out.text) {
            warn!(
                model = %request.model,
                provider = self.provider.name(),
                "model wrote a tool call as text"
            );
            let diagnostic = function_calling_diagnostic(&request.model, self.provider.name());
            io.emit(ChatEvent::Token(format!("\n\n{diagnostic}")));
            return CompletionOutcome {
                message: assistant_message(&diagnostic),
                status: CompletionStatus::FunctionCallingUnsupported,
            };
        }
        if out.text.trim().is_empty() {
            io.emit(ChatEvent::Token(FALLBACK_MESSAGE.to_string()));
            return CompletionOutcome {
                message: assistant_message(FALLBACK_MESSAGE),
                status: CompletionStatus::Empty,
            };
        }
        CompletionOutcome {
            message: assistant_message(&out.text),
            status: CompletionStatus::Answered,
        }
    }

    /// Opens the stream, retrying transport errors with exponential backoff.
    /// `Ok(None)` means the turn was cancelled while waiting.
    async fn open_stream(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<Option<DeltaStream>, LlmError> {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.retry_backoff)
            .with_multiplier(2.0)
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(None)
            .build();
        let max_retries = self.max_retries;
        let mut attempt: u32 = 0;
        let open = retry_notify(
            policy,
            || {
                attempt += 1;
                let tries = attempt;
                async move {
                    self.provider.chat_stream(request).await.map_err(|e| {
                        if e.is_transport() && tries <= max_retries {
                            backoff::Error::transient(e)
                        } else {
                            backoff::Error::permanent(e)
                        }
                    })
                }
            },
            |e: LlmError, delay: Duration| {
                warn!(delay_ms = delay.as_millis(), error = %e, "retrying completion stream");
            },
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => Ok(None),
            opened = open => opened.map(Some),
        }
    }

    fn failure(&self, e: &LlmError, io: &TurnIo) -> CompletionOutcome {
        let (text, status) = if e.is_transport() {
            (TRANSPORT_APOLOGY, CompletionStatus::TransportFailure)
        } else {
            (COMPLETION_APOLOGY, CompletionStatus::Failed)
        };
        error!(provider = self.provider.name(), error = %e, "completion failed");
        io.emit(ChatEvent::Token(text.to_string()));
        CompletionOutcome {
            message: assistant_message(text),
            status,
        }
    }
}

fn cancelled(text: &str) -> CompletionOutcome {
    CompletionOutcome {
        message: assistant_message(text),
        status: CompletionStatus::Cancelled,
    }
}

/// Message used when a model writes a tool call as text.
#[must_use]
pub fn function_calling_diagnostic(model: &str, provider: &str) -> String {
    format!(
        "The model `{model}` (provider `{provider}`) does not reliably support structured \
         function calling: it returned a tool call as plain text instead of invoking the tool. \
         Choose a model with tool-calling support or disable tools for this conversation."
    )
}

/// Whether `text` is a JSON object (or array of objects) shaped like a
/// function call. Markdown code fences are ignored.
#[must_use]
pub fn looks_like_json_call(text: &str) -> bool {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(strip_code_fence(text)) else {
        return false;
    };
    match &value {
        serde_json::Value::Object(_) => is_call_object(&value),
        serde_json::Value::Array(items) => !items.is_empty() && items.iter().all(is_call_object),
        _ => false,
    }
}

fn is_call_object(value: &serde_json::Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    (obj.contains_key("name") && (obj.contains_key("arguments") || obj.contains_key("parameters")))
        || obj.contains_key("function")
        || obj.contains_key("tool_calls")
        || obj.contains_key("tool_name")
}

/// Removes a surrounding Markdown code fence, if any.
pub(crate) fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map_or("", |(_, b)| b);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::delta::StreamDelta;
    use crate::llm::message::{Role, user_message};
    use crate::llm::mock::{MockFailure, MockProvider};
    use crate::llm::tool::ToolDefinition;
    use serde_json::json;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn driver(provider: MockProvider) -> (CompletionDriver, Arc<MockProvider>) {
        let provider = Arc::new(provider);
        let d = CompletionDriver::new(provider.clone(), 2, Duration::ZERO);
        (d, provider)
    }

    fn request(with_tools: bool) -> ChatRequest {
        let mut req = ChatRequest::new("gpt-test", vec![user_message("hi")]);
        req.stream = true;
        if with_tools {
            req.tools.push(ToolDefinition {
                name: "sql_query".to_string(),
                description: "Run SQL".to_string(),
                parameters: json!({"type": "object"}),
            });
        }
        req
    }

    fn drain(rx: &mut UnboundedReceiver<ChatEvent>) -> Vec<ChatEvent> {
        let mut events = Vec::new();
        while let Ok(e) = rx.try_recv() {
            events.push(e);
        }
        events
    }

    #[tokio::test]
    async fn test_text_stream_consolidates_and_emits() {
        let (d, _) = driver(MockProvider::new().with_text_stream(&["Hel", "lo", " world"]));
        let (sink, mut rx) = ProgressSink::channel();
        let mut io = TurnIo::new(sink, CancellationToken::new());
        let out = d.complete(&request(false), None, &mut io).await;

        assert_eq!(out.status, CompletionStatus::Answered);
        assert_eq!(out.message.content, "Hello world");
        assert_eq!(out.message.role, Role::Assistant);
        let events = drain(&mut rx);
        let tokens: Vec<&ChatEvent> = events.iter().filter(|e| matches!(e, ChatEvent::Token(_))).collect();
        assert_eq!(tokens.len(), 3);
        assert!(events.iter().any(|e| matches!(e, ChatEvent::Usage(u) if u.total_tokens == 13)));
        assert_eq!(io.usage.total_tokens, 13);
    }

    #[tokio::test]
    async fn test_tool_call_stream() {
        let (d, _) = driver(MockProvider::new().with_stream(vec![
            StreamDelta::tool_call(0, Some("call_1"), Some("sql_query"), Some("{\"sql\":")),
            StreamDelta::tool_call(0, None, None, Some("\"select 1\"}")),
            StreamDelta::Finish("tool_calls".to_string()),
        ]));
        let mut io = TurnIo::default();
        let out = d.complete(&request(true), None, &mut io).await;
        assert_eq!(out.status, CompletionStatus::ToolCalls);
        assert!(out.message.content.is_empty());
        assert_eq!(out.message.tool_calls[0].id, "call_1");
        assert_eq!(out.message.tool_calls[0].arguments, json!({"sql": "select 1"}));
    }

    #[tokio::test]
    async fn test_empty_stream_uses_fallback() {
        let (d, _) = driver(MockProvider::new().with_text_stream(&[]));
        let out = d.complete(&request(false), None, &mut TurnIo::default()).await;
        assert_eq!(out.status, CompletionStatus::Empty);
        assert_eq!(out.message.content, FALLBACK_MESSAGE);
    }

    #[tokio::test]
    async fn test_json_text_with_tools_yields_diagnostic() {
        let (d, _) = driver(
            MockProvider::new()
                .with_text_stream(&["{\"name\": \"sql_query\", ", "\"arguments\": {\"sql\": \"x\"}}"]),
        );
        let out = d.complete(&request(true), None, &mut TurnIo::default()).await;
        assert_eq!(out.status, CompletionStatus::FunctionCallingUnsupported);
        assert!(out.message.content.contains("`gpt-test`"));
        assert!(out.message.content.contains("`mock`"));
        assert!(out.message.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn test_json_text_without_tools_is_an_answer() {
        let (d, _) = driver(MockProvider::new().with_text_stream(&["{\"name\": \"a\", \"arguments\": {}}"]));
        let out = d.complete(&request(false), None, &mut TurnIo::default()).await;
        assert_eq!(out.status, CompletionStatus::Answered);
    }

    #[tokio::test]
    async fn test_transport_retry_then_success() {
        let (d, provider) = driver(
            MockProvider::new()
                .with_stream_error(MockFailure::Connection)
                .with_text_stream(&["ok"]),
        );
        let out = d.complete(&request(false), None, &mut TurnIo::default()).await;
        assert_eq!(out.message.content, "ok");
        assert_eq!(provider.stream_requests().len(), 2);
    }

    #[tokio::test]
    async fn test_retries_exhausted_gives_transport_apology() {
        let (d, provider) = driver(
            MockProvider::new()
                .with_stream_error(MockFailure::Connection)
                .with_stream_error(MockFailure::Connection)
                .with_stream_error(MockFailure::Connection),
        );
        let out = d.complete(&request(false), None, &mut TurnIo::default()).await;
        assert_eq!(out.status, CompletionStatus::TransportFailure);
        assert_eq!(out.message.content, TRANSPORT_APOLOGY);
        assert_eq!(provider.stream_requests().len(), 3);
    }

    #[tokio::test]
    async fn test_api_error_is_not_retried() {
        let (d, provider) = driver(MockProvider::new().with_stream_error(MockFailure::Api));
        let out = d.complete(&request(false), None, &mut TurnIo::default()).await;
        assert_eq!(out.status, CompletionStatus::Failed);
        assert_eq!(out.message.content, COMPLETION_APOLOGY);
        assert_eq!(provider.stream_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_mid_stream_break_gives_transport_apology() {
        let (d, _) = driver(
            MockProvider::new().with_broken_stream(vec![StreamDelta::text("par")], MockFailure::Connection),
        );
        let out = d.complete(&request(false), None, &mut TurnIo::default()).await;
        assert_eq!(out.status, CompletionStatus::TransportFailure);
    }

    #[tokio::test]
    async fn test_cancel_mid_stream_keeps_partial_text() {
        let (d, _) = driver(MockProvider::new().with_stalled_stream(vec![
            StreamDelta::text("par"),
            StreamDelta::Usage(TokenUsage {
                prompt_tokens: 4,
                completion_tokens: 1,
                total_tokens: 5,
            }),
        ]));
        let (sink, mut rx) = ProgressSink::channel();
        let cancel = CancellationToken::new();
        let mut io = TurnIo::new(sink, cancel.clone());

        let watcher = async {
            let first = rx.recv().await;
            cancel.cancel();
            first
        };
        let req = request(false);
        let (out, first) = tokio::join!(d.complete(&req, None, &mut io), watcher);

        assert_eq!(out.status, CompletionStatus::Cancelled);
        assert_eq!(out.message.content, "par");
        assert!(matches!(first, Some(ChatEvent::Token(ref t)) if t == "par"));
        drop(io);
        let rest = drain(&mut rx);
        assert!(!rest.iter().any(|e| matches!(e, ChatEvent::Usage(_) | ChatEvent::Finished)));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_emits_nothing() {
        let (d, provider) = driver(MockProvider::new().with_text_stream(&["never"]));
        let (sink, mut rx) = ProgressSink::channel();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut io = TurnIo::new(sink, cancel);
        let out = d.complete(&request(false), Some(&VsMetadata::default()), &mut io).await;
        assert_eq!(out.status, CompletionStatus::Cancelled);
        assert!(drain(&mut rx).is_empty());
        assert!(provider.stream_requests().is_empty());
    }

    #[tokio::test]
    async fn test_grounding_emitted_first() {
        let (d, _) = driver(MockProvider::new().with_text_stream(&["a"]));
        let (sink, mut rx) = ProgressSink::channel();
        let mut io = TurnIo::new(sink, CancellationToken::new());
        let meta = VsMetadata {
            documents: 2,
            ..VsMetadata::default()
        };
        d.complete(&request(false), Some(&meta), &mut io).await;
        let events = drain(&mut rx);
        assert!(matches!(events.first(), Some(ChatEvent::Grounding(m)) if m.documents == 2));
    }

    #[test]
    fn test_looks_like_json_call() {
        assert!(looks_like_json_call(r#"{"name": "f", "parameters": {}}"#));
        assert!(looks_like_json_call("```json\n{\"tool_name\": \"f\"}\n```"));
        assert!(looks_like_json_call(r#"[{"function": {"name": "f"}}]"#));
        assert!(!looks_like_json_call(r#"{"name": "Alice"}"#));
        assert!(!looks_like_json_call("The answer is 42."));
        assert!(!looks_like_json_call("[]"));
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fence("  [1] "), "[1]");
        assert_eq!(strip_code_fence("```\n{}```"), "{}");
    }
}
