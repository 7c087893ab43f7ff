//! The chat engine: one entry point per user turn.
//!
//! A turn is a small state machine. The router picks a route; vector-search
//! routes run the retrieval pipeline and record its output as a synthetic
//! retriever tool call; then completions and tool executions alternate
//! until the model answers or the iteration limit is hit.

use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::completion::{CompletionDriver, CompletionStatus, TurnIo};
use super::events::{ChatEvent, ProgressSink};
use super::history::build_messages;
use super::router::{Route, alternate_tools, route};
use crate::core::ConversationState;
use crate::embedding::EmbedderFactory;
use crate::llm::config::EngineConfig;
use crate::llm::message::{
    ChatMessage, ChatRequest, TokenUsage, assistant_message, assistant_tool_calls_message,
    tool_message, user_message,
};
use crate::llm::provider::LlmProvider;
use crate::llm::tool::{ALTERNATE_TOOL_PREFIX, RETRIEVER_TOOL_NAME, ToolCall, ToolExecutor, ToolResult};
use crate::prompt::PromptSet;
use crate::registry::{ClientSettings, SettingsRegistry, StoreRegistry};
use crate::retrieval::{RetrievalInput, RetrievalPipeline, VectorSearchResult};

/// Returned when a turn exceeds the completion cycle limit.
pub const ITERATION_LIMIT_MESSAGE: &str =
    "I'm sorry, the request needed too many tool calls to complete.";

/// One user turn.
#[derive(Debug, Clone, Default)]
pub struct TurnRequest {
    /// Thread state from previous turns.
    pub state: ConversationState,
    /// The user's message.
    pub message: String,
    /// Enabled tool capabilities; `None` uses the client's settings.
    pub tools: Option<Vec<String>>,
    /// Client whose settings and stores apply.
    pub client_id: Option<String>,
    /// Chat model override.
    pub model: Option<String>,
}

impl TurnRequest {
    /// A turn on a thread with the client's default settings.
    #[must_use]
    pub fn new(state: ConversationState, message: impl Into<String>) -> Self {
        Self {
            state,
            message: message.into(),
            ..Self::default()
        }
    }

    /// Sets the enabled tool capabilities.
    #[must_use]
    pub fn with_tools(mut self, tools: Vec<String>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Sets the client id.
    #[must_use]
    pub fn with_client(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Sets the chat model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStatus {
    /// The last completion ended this way.
    Completion(CompletionStatus),
    /// Retrieval found no grounding stores.
    NoGroundingStores,
    /// The store registry could not be read.
    RetrievalFailed,
    /// Conversation state had an orphaned tool result.
    InvalidHistory,
    /// Too many completion cycles.
    IterationLimit,
}

impl TurnStatus {
    /// Stable label for logs and JSON output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completion(status) => status.as_str(),
            Self::NoGroundingStores => "no_grounding_stores",
            Self::RetrievalFailed => "retrieval_failed",
            Self::InvalidHistory => "invalid_history",
            Self::IterationLimit => "iteration_limit",
        }
    }
}

/// Result of a turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Final assistant message.
    pub message: ChatMessage,
    /// Updated thread state, including the new messages.
    pub state: ConversationState,
    /// Route taken.
    pub route: Route,
    /// How the turn ended.
    pub status: TurnStatus,
    /// Token usage across the turn.
    pub usage: TokenUsage,
    /// Retrieval output, if retrieval ran.
    pub retrieval: Option<VectorSearchResult>,
}

enum Stage {
    Route,
    Retrieve,
    Complete,
    ExecuteTools(Vec<ToolCall>),
    Done(ChatMessage, TurnStatus),
}

/// Orchestrates turns against one provider and set of registries.
pub struct ChatEngine {
    config: EngineConfig,
    prompts: PromptSet,
    settings: Arc<dyn SettingsRegistry>,
    driver: CompletionDriver,
    pipeline: RetrievalPipeline,
    tools: Option<Arc<dyn ToolExecutor>>,
}

impl ChatEngine {
    /// Creates an engine. Prompts load from `config.prompt_dir` (or its
    /// fallbacks).
    #[must_use]
    pub fn new(
        config: EngineConfig,
        provider: Arc<dyn LlmProvider>,
        stores: Arc<dyn StoreRegistry>,
        embedders: Arc<dyn EmbedderFactory>,
        settings: Arc<dyn SettingsRegistry>,
    ) -> Self {
        let prompts = PromptSet::load(config.prompt_dir.as_deref());
        let driver = CompletionDriver::new(provider.clone(), config.max_retries, config.retry_backoff);
        let pipeline = RetrievalPipeline::new(provider, stores, embedders, config.utility_max_tokens);
        Self {
            config,
            prompts,
            settings,
            driver,
            pipeline,
            tools: None,
        }
    }

    /// Replaces the prompt set.
    #[must_use]
    pub fn with_prompts(mut self, prompts: PromptSet) -> Self {
        self.prompts = prompts;
        self
    }

    /// Sets the executor for alternate-family tools.
    #[must_use]
    pub fn with_tool_executor(mut self, executor: Arc<dyn ToolExecutor>) -> Self {
        self.tools = Some(executor);
        self
    }

    /// Runs one turn.
    ///
    /// Answer text streams to `sink` as [`ChatEvent::Token`]s, followed by
    /// [`ChatEvent::Finished`]. Never fails: every problem ends the turn
    /// with an explanatory assistant message.
    pub async fn turn(
        &self,
        request: TurnRequest,
        sink: ProgressSink,
        cancel: CancellationToken,
    ) -> TurnOutcome {
        let TurnRequest {
            mut state,
            message,
            tools,
            client_id,
            model,
        } = request;

        let settings = self.settings.settings(client_id.as_deref());
        let enabled = tools.unwrap_or_else(|| settings.tools.clone());
        let model = model
            .or_else(|| settings.model.clone())
            .unwrap_or_else(|| self.config.default_model.clone());
        let prompts = self
            .prompts
            .clone()
            .with_overrides(settings.system_prompt.as_deref(), settings.rephrase_prompt.as_deref());

        state.client_id.clone_from(&client_id);
        state.model = Some(model.clone());
        state.vs_metadata = None;
        state.push(user_message(&message));

        let mut io = TurnIo::new(sink, cancel);
        let mut current = Route::PlainCompletion;
        let mut retrieval: Option<VectorSearchResult> = None;
        let mut iterations = 0_usize;
        let mut stage = Stage::Route;

        loop {
            stage = match stage {
                Stage::Route => {
                    current = route(&enabled);
                    info!(thread = %state.thread_id, route = %current, model = %model, "routing turn");
                    if current.retrieves() {
                        Stage::Retrieve
                    } else {
                        Stage::Complete
                    }
                }

                Stage::Retrieve => {
                    let result = self
                        .retrieve(&state, &message, &settings, client_id.as_deref(), &model, &prompts)
                        .await;
                    let next = if let Some(err) = &result.error {
                        let status = if result.no_stores {
                            TurnStatus::NoGroundingStores
                        } else {
                            TurnStatus::RetrievalFailed
                        };
                        Stage::Done(
                            assistant_message(&format!("I'm sorry, I could not search for context: {err}.")),
                            status,
                        )
                    } else {
                        record_retrieval(&mut state, &result);
                        Stage::Complete
                    };
                    retrieval = Some(result);
                    next
                }

                Stage::Complete => {
                    if iterations >= self.config.max_tool_iterations {
                        warn!(iterations, "tool iteration limit reached");
                        Stage::Done(assistant_message(ITERATION_LIMIT_MESSAGE), TurnStatus::IterationLimit)
                    } else {
                        iterations += 1;
                        match build_messages(&state, &prompts.system, settings.use_history) {
                            Err(e) => {
                                error!(error = %e, "cannot assemble model input");
                                Stage::Done(
                                    assistant_message(&format!("I'm sorry, the conversation could not be sent: {e}.")),
                                    TurnStatus::InvalidHistory,
                                )
                            }
                            Ok(messages) => {
                                let request = self.completion_request(&model, messages, &settings, current, &enabled);
                                let grounding = if iterations == 1 { state.vs_metadata.clone() } else { None };
                                debug!(iteration = iterations, tools = request.tools.len(), "starting completion");
                                let outcome = self.driver.complete(&request, grounding.as_ref(), &mut io).await;
                                if outcome.status == CompletionStatus::ToolCalls {
                                    let calls = outcome.message.tool_calls.clone();
                                    state.push(outcome.message);
                                    Stage::ExecuteTools(calls)
                                } else {
                                    Stage::Done(outcome.message, TurnStatus::Completion(outcome.status))
                                }
                            }
                        }
                    }
                }

                Stage::ExecuteTools(calls) => {
                    for call in &calls {
                        let result = self.execute_tool(call, &enabled).await;
                        debug!(
                            tool = %call.name,
                            call_id = %call.id,
                            is_error = result.is_error,
                            "tool execution complete"
                        );
                        state.push(tool_message(&result.tool_call_id, &result.content));
                    }
                    if io.cancel.is_cancelled() {
                        Stage::Done(
                            assistant_message(""),
                            TurnStatus::Completion(CompletionStatus::Cancelled),
                        )
                    } else {
                        Stage::Complete
                    }
                }

                Stage::Done(message, status) => {
                    if !message.content.is_empty() {
                        state.push(message.clone());
                    }
                    if !matches!(status, TurnStatus::Completion(_)) {
                        io.emit(ChatEvent::Token(message.content.clone()));
                    }
                    io.emit(ChatEvent::Finished);
                    info!(thread = %state.thread_id, status = ?status, total_tokens = io.usage.total_tokens, "turn finished");
                    return TurnOutcome {
                        message,
                        state,
                        route: current,
                        status,
                        usage: io.usage,
                        retrieval,
                    };
                }
            };
        }
    }

    async fn retrieve(
        &self,
        state: &ConversationState,
        question: &str,
        settings: &ClientSettings,
        client_id: Option<&str>,
        model: &str,
        prompts: &PromptSet,
    ) -> VectorSearchResult {
        let prior = state.prior_turns();
        self.pipeline
            .run(RetrievalInput {
                question,
                prior_turns: &prior,
                settings,
                client_id,
                model,
                prompts,
            })
            .await
    }

    fn completion_request(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        settings: &ClientSettings,
        current: Route,
        enabled: &[String],
    ) -> ChatRequest {
        let mut request = ChatRequest::new(model, messages);
        request.stream = true;
        request.max_tokens = Some(self.config.max_tokens);
        request.temperature = settings.temperature;
        if current.offers_tools()
            && let Some(executor) = &self.tools
        {
            request.tools = executor.definitions(&alternate_tools(enabled));
        }
        request
    }

    async fn execute_tool(&self, call: &ToolCall, enabled: &[String]) -> ToolResult {
        let allowed = call.name.starts_with(ALTERNATE_TOOL_PREFIX) && enabled.iter().any(|t| t.trim() == call.name);
        match &self.tools {
            Some(executor) if allowed => executor.execute(call).await,
            _ => {
                warn!(tool = %call.name, "model requested an unavailable tool");
                ToolResult {
                    tool_call_id: call.id.clone(),
                    content: format!("Tool `{}` is not available.", call.name),
                    is_error: true,
                }
            }
        }
    }
}

/// Appends the synthetic retriever call and its result to the thread.
fn record_retrieval(state: &mut ConversationState, result: &VectorSearchResult) {
    let call = ToolCall {
        id: format!("call_{RETRIEVER_TOOL_NAME}_{}", state.messages.len()),
        name: RETRIEVER_TOOL_NAME.to_string(),
        arguments: json!({ "query": result.query }),
    };
    let id = call.id.clone();
    state.push(assistant_tool_calls_message("", vec![call]));
    state.push(tool_message(&id, &result.tool_content()));
    state.vs_metadata = Some(result.metadata());
}
