//! Tool type definitions for function-calling.
//!
//! Tools come in two families, told apart by name prefix: the
//! vector-search family (`vs_`), handled in-process by the retrieval
//! pipeline, and the alternate-tool family (`sql_`), executed by an
//! external [`ToolExecutor`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Name prefix of the vector-search tool family.
pub const VECTOR_SEARCH_PREFIX: &str = "vs_";
/// Name prefix of the alternate-tool family.
pub const ALTERNATE_TOOL_PREFIX: &str = "sql_";
/// Name of the synthetic tool call recorded when retrieval runs.
pub const RETRIEVER_TOOL_NAME: &str = "vs_retriever";

/// A tool definition that can be sent to an LLM for function-calling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name.
    pub name: String,
    /// Human-readable description of what the tool does.
    pub description: String,
    /// JSON Schema object describing the tool's parameters.
    pub parameters: serde_json::Value,
}

/// A tool call requested by the LLM, with materialized arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier for this call (assigned by the provider).
    pub id: String,
    /// Name of the tool to invoke.
    pub name: String,
    /// Parsed JSON arguments.
    pub arguments: serde_json::Value,
}

/// The result of executing a tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// ID of the tool call this result corresponds to.
    pub tool_call_id: String,
    /// Result content (JSON string on success, error message on failure).
    pub content: String,
    /// Whether this result represents an error.
    pub is_error: bool,
}

/// Executes alternate-family tool calls on behalf of the engine.
///
/// Implementations live outside this crate (SQL runners, MCP bridges).
/// `execute` must not fail: errors are reported through
/// [`ToolResult::is_error`] so the model can see them.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Tool schemas to offer the model for the given enabled tool names.
    fn definitions(&self, enabled: &[String]) -> Vec<ToolDefinition>;

    /// Runs one tool call.
    async fn execute(&self, call: &ToolCall) -> ToolResult;
}
