//! Provider-agnostic LLM layer.
//!
//! Message, tool and delta types shared by the chat engine and the
//! retrieval pipeline, the [`LlmProvider`] trait, and an `async-openai`
//! backed implementation.

pub mod client;
pub mod config;
pub mod delta;
pub mod message;
#[cfg(test)]
pub(crate) mod mock;
pub mod provider;
pub mod providers;
pub mod tool;

pub use client::create_provider;
pub use config::EngineConfig;
pub use delta::{StreamDelta, ToolCallDelta};
pub use message::{ChatMessage, ChatRequest, ChatResponse, Role, TokenUsage};
pub use provider::{DeltaStream, LlmProvider};
pub use tool::{ToolCall, ToolDefinition, ToolExecutor, ToolResult};
