//! Pluggable LLM provider trait.
//!
//! Implementations translate provider-agnostic [`ChatRequest`]/[`ChatResponse`]
//! into provider-specific SDK calls. This keeps the chat engine and the
//! retrieval pipeline decoupled from any particular LLM vendor.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use super::delta::StreamDelta;
use super::message::{ChatRequest, ChatResponse};
use crate::error::LlmError;

/// Boxed stream of deltas returned by [`LlmProvider::chat_stream`].
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<StreamDelta, LlmError>> + Send>>;

/// Trait for LLM provider backends.
///
/// Implementations handle the transport layer for a specific provider
/// while presenting a uniform interface to the engine.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name (e.g., `"openai"`).
    fn name(&self) -> &'static str;

    /// Executes a non-streaming chat completion request.
    ///
    /// Used for the small deterministic calls of the retrieval pipeline
    /// (rephrase, table selection, grading).
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError>;

    /// Executes a streaming chat completion request.
    ///
    /// Returns a stream of text, tool-call fragment, usage and finish
    /// deltas in arrival order.
    async fn chat_stream(&self, request: &ChatRequest) -> Result<DeltaStream, LlmError>;
}
